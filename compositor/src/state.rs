use std::num::NonZeroU64;

use euclid::default::Rect;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::{
    action::{ActionId, SurfaceAction},
    backend::{Backend, WindowId},
    buffer::{Buffer, BufferId},
    config::Config,
    role::{RoleId, RoleSlot},
    scene::Scene,
    shell::{DecorationMode, ToplevelStates, WmBase, WmBaseId, WmCapabilities},
    surface::{CallbackId, Surface, SurfaceId},
};

/// An event the protocol layer delivers to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A frame callback is done, with the frame time in milliseconds.
    FrameDone { callback: CallbackId, time: u32 },

    /// The compositor no longer reads from the buffer.
    BufferRelease { buffer: BufferId },

    /// xdg_surface.configure
    Configure { role: RoleId, serial: u32 },

    /// xdg_toplevel.configure, a size of zero lets the client decide.
    ToplevelConfigure {
        role: RoleId,
        width: i32,
        height: i32,
        states: ToplevelStates,
    },

    ToplevelWmCapabilities { role: RoleId, capabilities: WmCapabilities },

    /// zxdg_toplevel_decoration_v1.configure
    DecorationConfigure { role: RoleId, mode: DecorationMode },

    ToplevelClose { role: RoleId },

    /// xdg_popup.configure, the geometry is relative to the parent's window geometry.
    PopupConfigure { role: RoleId, geometry: Rect<i32> },

    PopupRepositioned { role: RoleId, token: u32 },

    PopupDone { role: RoleId },

    Ping { wm_base: WmBaseId, serial: u32 },
}

/// The state of the compositor.
///
/// Client requests and backend events are methods on this type. Events for clients are queued and taken with
/// [`Compositor::drain_events`].
#[derive(Debug)]
pub struct Compositor {
    pub(crate) config: Config,
    pub(crate) backend: Box<dyn Backend>,

    pub(crate) surfaces: SlotMap<SurfaceId, Surface>,
    pub(crate) roles: SlotMap<RoleId, RoleSlot>,
    pub(crate) buffers: SlotMap<BufferId, Buffer>,
    pub(crate) actions: SlotMap<ActionId, SurfaceAction>,
    pub(crate) wm_bases: SlotMap<WmBaseId, WmBase>,

    pub(crate) scene: Scene,

    /// Roles which own a window.
    pub(crate) windows: FxHashMap<WindowId, RoleId>,

    next_serial: u32,
    pub(crate) next_callback: NonZeroU64,
    pub(crate) next_decoration: NonZeroU64,
    pub(crate) events: Vec<ClientEvent>,
}

impl Compositor {
    pub fn new(config: Config, backend: impl Backend + 'static) -> Self {
        tracing::info!(backend = backend.name(), ?config, "Creating compositor");

        Self {
            config,
            backend: Box::new(backend),
            surfaces: SlotMap::with_key(),
            roles: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            actions: SlotMap::with_key(),
            wm_bases: SlotMap::with_key(),
            scene: Scene::new(),
            windows: FxHashMap::default(),
            next_serial: 1,
            next_callback: NonZeroU64::MIN,
            next_decoration: NonZeroU64::MIN,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &dyn Backend {
        &*self.backend
    }

    pub fn backend_mut(&mut self) -> &mut dyn Backend {
        &mut *self.backend
    }

    /// The view tree of every window.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Returns the backend as it's concrete type.
    pub fn downcast_backend<B: Backend>(&self) -> Option<&B> {
        self.backend.downcast_ref::<B>()
    }

    pub fn downcast_backend_mut<B: Backend>(&mut self) -> Option<&mut B> {
        self.backend.downcast_mut::<B>()
    }

    /// Takes every event queued for clients, oldest first.
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    /// Destroys every surface and every role object, which tears down every window.
    pub fn shutdown(&mut self) {
        let surfaces = self.surfaces.keys().collect::<Vec<_>>();

        for surface in surfaces {
            self.destroy_surface(surface);
        }

        let wm_bases = self.wm_bases.keys().collect::<Vec<_>>();

        for wm_base in wm_bases {
            self.destroy_wm_base(wm_base);
        }

        // Whatever is left is only held by client handles, which die with the clients.
        let roles = self.roles.keys().collect::<Vec<_>>();

        for role in roles {
            if let Some(slot) = self.roles.get_mut(role) {
                slot.refcount = 1;
            }

            self.release_role_ref(role);
        }

        tracing::info!(roles = self.roles.len(), windows = self.windows.len(), "Compositor shut down");
    }

    /// Returns the next serial for events which must be acknowledged, skipping zero.
    pub(crate) fn next_serial(&mut self) -> u32 {
        let serial = self.next_serial;
        self.next_serial = self.next_serial.wrapping_add(1);

        if self.next_serial == 0 {
            self.next_serial = 1;
        }

        serial
    }
}
