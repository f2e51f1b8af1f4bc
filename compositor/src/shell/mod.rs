//! Shell surfaces
//!
//! A shell surface owns a managed window. The window is only useful once the shell surface is given a toplevel or
//! popup implementation, which decides when the window is mapped and what the client is told about it's size and
//! position.
//!
//! # Configure handshake
//!
//! The compositor describes a new state of the window with a configure carrying a serial. The client must
//! acknowledge the serial before it may commit the state. Between the configure and the commit following the
//! acknowledgement, the window is neither resized nor redrawn, so the window manager never sees a state the client
//! has not drawn yet.
//!
//! ```text
//!             send configure                 ack configure             commit
//! [idle] -------------------> [wait for ack] --------------> [wait for commit] ------> [idle]
//!                                  |  ^
//!                                  \--/ send configure
//! ```
//!
//! While waiting, frame callbacks still run. Many clients wait for a frame callback before they acknowledge a
//! configure, and would otherwise never draw again.
//!
//! # Bounds
//!
//! The window covers the bounds of the view tree, which include subsurfaces placed outside of the surface. When
//! the top left corner of the bounds moves, the window is moved the other way, so the surface itself stays put on
//! the screen. Until the windowing system confirms such a move, the position the window was moved to is used as
//! the position of the window.

mod decoration;
mod popup;
mod toplevel;
mod wm_base;

use std::num::NonZeroU64;

use bitflags::bitflags;
use euclid::default::{Box2D, Point2D, Rect, Size2D};
use static_assertions::assert_not_impl_any;

pub use self::{
    decoration::{DecorationHandle, DecorationMode},
    popup::{PopupHandle, Positioner},
    toplevel::{ToplevelHandle, ToplevelStates, WmCapabilities},
    wm_base::WmBaseId,
};
pub(crate) use self::{popup::Popup, toplevel::Toplevel, wm_base::WmBase};

use crate::{
    backend::{ConfigureEvent, PingEvent, Property, ShapeKind, WindowId, WindowKind},
    error::{ProtocolError, Result},
    role::{Backing, RoleData, RoleId, RoleSlot, RoleType},
    scene::ViewIndex,
    state::Compositor,
    surface::{PendingFlags, SurfaceId},
    ClientEvent,
};

/// The client's reference to a shell surface.
///
/// Consumed by [`Compositor::destroy_shell_surface`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ShellHandle(RoleId);

assert_not_impl_any!(ShellHandle: Clone, Copy);

impl ShellHandle {
    pub fn id(&self) -> RoleId {
        self.0
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShellFlags: u32 {
        /// The client set a window geometry which is applied on the next commit.
        const PENDING_WINDOW_GEOMETRY = 1 << 0;

        /// A configure was sent and not yet acknowledged.
        const WAITING_FOR_ACK_CONFIGURE = 1 << 1;

        /// A configure was sent and no commit followed it's acknowledgement yet.
        const WAITING_FOR_ACK_COMMIT = 1 << 2;

        /// The window manager asked to synchronize a resize, which may not result in a configure.
        const MAYBE_CONFIGURE = 1 << 3;

        /// The window geometry changed and the frame extents of the window are stale.
        const DIRTY_FRAME_EXTENTS = 1 << 4;

        /// The bounds size was set from a configure notification and must not be undone by a redraw.
        const TEMPORARY_BOUNDS = 1 << 5;
    }
}

/// The implementation a shell surface was given.
///
/// A shell surface keeps the kind of it's first implementation for life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellKind {
    Toplevel,
    Popup,
}

#[derive(Debug)]
pub(crate) enum ShellImpl {
    Toplevel(Toplevel),
    Popup(Popup),
}

impl ShellImpl {
    fn kind(&self) -> ShellKind {
        match self {
            ShellImpl::Toplevel(_) => ShellKind::Toplevel,
            ShellImpl::Popup(_) => ShellKind::Popup,
        }
    }
}

/// Identifies an observer of the position and size of a shell surface's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReconstrainKey(NonZeroU64);

/// Why the observers of a shell surface are notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconstrain {
    /// The windowing system reported a new position or size.
    Configure(ConfigureEvent),

    /// The compositor resized or moved the window to follow it's bounds.
    Resized,
}

#[derive(Debug)]
struct ReconstrainCallback {
    key: ReconstrainKey,

    /// The popup placed relative to the window.
    popup: RoleId,
}

#[derive(Debug)]
pub(crate) struct ShellSurface {
    pub(crate) backing: Backing,
    wm_base: Option<WmBaseId>,
    flags: ShellFlags,
    kind: Option<ShellKind>,
    imp: Option<ShellImpl>,

    pending_geometry: Rect<i32>,
    /// The window geometry, an empty geometry covers the bounds.
    geometry: Rect<i32>,

    /// The bounds of the view tree the window was last sized to.
    bounds: Box2D<i32>,
    bounds_size: Size2D<i32>,

    /// The serial of the last configure.
    conf_serial: u32,

    /// The last serial acknowledged by the client.
    last_serial: u32,

    /// Where the window was last moved, used until the windowing system confirmed every move.
    pending_root: Point2D<i32>,
    pending_synth_configure: u32,

    reconstrain: Vec<ReconstrainCallback>,
    next_key: NonZeroU64,

    /// Pings of the window manager waiting for the client to answer.
    pings: Vec<PingEvent>,
}

impl Compositor {
    /// Gives the surface the shell surface role.
    pub fn get_shell_surface(&mut self, wm_base: WmBaseId, surface: SurfaceId) -> Result<ShellHandle> {
        self.check_role_free(surface, RoleType::Shell)?;

        if let Some(base) = self.wm_bases.get_mut(wm_base) {
            base.surfaces.try_reserve(1).map_err(|_| ProtocolError::NoMemory)?;
        }

        let backing = self.create_backing(WindowKind::Managed, Size2D::new(20, 20));
        let window = backing.window;

        // Frame synchronization breaks if the compositing manager unredirects the window.
        self.backend.change_property(window, Property::BypassCompositor(2));

        let role = self.roles.insert(RoleSlot::new(RoleData::Shell(Box::new(ShellSurface {
            backing,
            wm_base: None,
            flags: ShellFlags::empty(),
            kind: None,
            imp: None,
            pending_geometry: Rect::zero(),
            geometry: Rect::zero(),
            bounds: Box2D::zero(),
            bounds_size: Size2D::zero(),
            conf_serial: 0,
            last_serial: 0,
            pending_root: Point2D::zero(),
            pending_synth_configure: 0,
            reconstrain: Vec::new(),
            next_key: NonZeroU64::MIN,
            pings: Vec::new(),
        }))));
        self.windows.insert(window, role);

        if let Some(base) = self.wm_bases.get_mut(wm_base) {
            base.surfaces.push(role);

            if let Some(shell) = self.shell_surface_mut(role) {
                shell.wm_base = Some(wm_base);
            }
        }

        if let Err(err) = self.attach_role(surface, role) {
            self.release_role_ref(role);
            return Err(err);
        }

        tracing::debug!(?surface, %window, "Created shell surface");
        Ok(ShellHandle(role))
    }

    /// Destroys the shell surface.
    ///
    /// Destroying a shell surface before it's toplevel or popup is a protocol error. The shell surface is torn down
    /// regardless, since the client is disconnected anyway.
    pub fn destroy_shell_surface(&mut self, handle: ShellHandle) -> Result<()> {
        let role = handle.0;

        let had_impl = self.shell_surface(role).map_or(false, |shell| shell.imp.is_some());

        if had_impl {
            self.shell_detach_impl(role);
        }

        if let Some(surface) = self.role_surface(role) {
            self.release_role(surface);
        }

        self.release_role_ref(role);

        if had_impl {
            tracing::debug!(?role, "Shell surface destroyed before it's role object");
            return Err(ProtocolError::DestroyedWithRole);
        }

        Ok(())
    }

    /// Sets the part of the surface which is the window proper, excluding decorations and shadows.
    ///
    /// Applied on the next commit.
    pub fn set_window_geometry(&mut self, handle: &ShellHandle, x: i32, y: i32, width: i32, height: i32) {
        let Some(shell) = self.shell_surface_mut(handle.0) else {
            return;
        };

        let geometry = Rect::new(Point2D::new(x, y), Size2D::new(width, height));

        if shell.pending_geometry == geometry {
            return;
        }

        shell.pending_geometry = geometry;
        shell.flags.insert(ShellFlags::PENDING_WINDOW_GEOMETRY);
    }

    /// Acknowledges a configure.
    ///
    /// A serial of zero is always accepted. Any other serial must be greater than the last acknowledged serial.
    pub fn ack_configure(&mut self, handle: &ShellHandle, serial: u32) -> Result<()> {
        let role = handle.0;

        if self.role_surface(role).is_none() {
            return Ok(());
        }

        let Some(shell) = self.shell_surface_mut(role) else {
            return Ok(());
        };

        if serial != 0 && serial <= shell.last_serial {
            let last = shell.last_serial;
            tracing::debug!(?role, serial, last, "Rejected configure acknowledgement");
            return Err(ProtocolError::InvalidSerial { serial, last });
        }

        if serial == shell.conf_serial {
            shell.last_serial = serial;
            shell.flags.remove(ShellFlags::WAITING_FOR_ACK_CONFIGURE);

            // Changes in bounds may expose contents which were never drawn.
            let root = shell.backing.root;
            self.scene.garbage(root);

            tracing::debug!(?role, serial, "Configure acknowledged");
        }

        match self.shell_kind_attached(role) {
            Some(ShellKind::Toplevel) => self.toplevel_ack_configure(role, serial),
            Some(ShellKind::Popup) => self.popup_ack_configure(role, serial),
            None => (),
        }

        Ok(())
    }

    pub fn shell_flags(&self, handle: &ShellHandle) -> ShellFlags {
        self.shell_surface(handle.0).map_or(ShellFlags::empty(), |shell| shell.flags)
    }

    /// Returns the kind of implementation the shell surface is reserved for.
    pub fn shell_kind(&self, handle: &ShellHandle) -> Option<ShellKind> {
        self.shell_surface(handle.0).and_then(|shell| shell.kind)
    }

    /// Returns the window geometry clipped to the bounds of the view tree.
    pub fn window_geometry(&self, handle: &ShellHandle) -> Option<Rect<i32>> {
        self.shell_current_geometry(handle.0)
    }

    /// Moves the window by the opposite of the given distances.
    ///
    /// Used by interactive resize, where growing the window to the west or north must keep the opposite edge in
    /// place.
    pub fn move_shell_surface_by(&mut self, handle: &ShellHandle, west: i32, north: i32) {
        let role = handle.0;

        let root = self.shell_current_root_position(role);

        let Some(shell) = self.shell_surface_mut(role) else {
            return;
        };

        let position = Point2D::new(root.x - west, root.y - north);
        shell.pending_root = position;
        shell.pending_synth_configure += 1;

        let window = shell.backing.window;
        self.backend.move_window(window, position);
    }

    /// Called by the backend when the windowing system reports a new position or size of a window.
    pub fn configure_notify(&mut self, window: WindowId, event: ConfigureEvent) {
        let Some(role) = self.role_for_window(window) else {
            tracing::trace!(%window, "Configure notification for unknown window");
            return;
        };

        match self.shell_kind_attached(role) {
            Some(ShellKind::Toplevel) => self.toplevel_configure_notify(role, event),
            Some(ShellKind::Popup) => self.shell_note_configure(role, event),
            None => (),
        }
    }

    pub(crate) fn shell_surface(&self, role: RoleId) -> Option<&ShellSurface> {
        self.roles.get(role).and_then(RoleSlot::shell)
    }

    pub(crate) fn shell_surface_mut(&mut self, role: RoleId) -> Option<&mut ShellSurface> {
        self.roles.get_mut(role).and_then(RoleSlot::shell_mut)
    }

    /// Returns the kind of the implementation attached to the shell surface.
    fn shell_kind_attached(&self, role: RoleId) -> Option<ShellKind> {
        self.shell_surface(role)
            .and_then(|shell| shell.imp.as_ref())
            .map(ShellImpl::kind)
    }

    fn shell_window(&self, role: RoleId) -> Option<WindowId> {
        self.shell_surface(role).map(|shell| shell.backing.window)
    }

    /// Reserves the shell surface for an implementation of the given kind.
    ///
    /// Returns `Ok(false)` if the shell surface is inert because it's surface was destroyed.
    fn shell_reserve(&mut self, role: RoleId, kind: ShellKind) -> Result<bool> {
        if self.role_surface(role).is_none() {
            return Ok(false);
        }

        let Some(shell) = self.shell_surface_mut(role) else {
            return Ok(false);
        };

        match (shell.kind, kind) {
            (Some(ShellKind::Popup), ShellKind::Toplevel) => return Err(ProtocolError::ShellTypeMismatch("popup")),
            (Some(ShellKind::Toplevel), ShellKind::Popup) => return Err(ProtocolError::ShellTypeMismatch("toplevel")),
            _ => (),
        }

        if shell.imp.is_some() {
            return Err(ProtocolError::AlreadyConstructed);
        }

        shell.kind = Some(kind);
        Ok(true)
    }

    fn shell_attach_impl(&mut self, role: RoleId, imp: ShellImpl) {
        let kind = imp.kind();

        if let Some(shell) = self.shell_surface_mut(role) {
            shell.imp = Some(imp);
        }

        match kind {
            ShellKind::Toplevel => self.toplevel_attach(role),
            ShellKind::Popup => self.popup_attach(role),
        }

        tracing::debug!(?role, ?kind, "Attached shell implementation");
    }

    pub(crate) fn shell_detach_impl(&mut self, role: RoleId) {
        let Some(kind) = self.shell_kind_attached(role) else {
            return;
        };

        match kind {
            ShellKind::Toplevel => self.toplevel_detach(role),
            ShellKind::Popup => self.popup_detach(role),
        }

        if let Some(shell) = self.shell_surface_mut(role) {
            shell.imp = None;
        }

        tracing::debug!(?role, ?kind, "Detached shell implementation");
    }

    pub(crate) fn shell_setup(&mut self, role: RoleId, surface: SurfaceId) {
        self.insert_into_root(role, surface);
    }

    pub(crate) fn shell_teardown(&mut self, _role: RoleId, surface: SurfaceId) {
        self.remove_from_root(surface);
    }

    pub(crate) fn shell_commit(&mut self, role: RoleId, surface: SurfaceId) {
        let Some(shell) = self.shell_surface_mut(role) else {
            return;
        };

        let Some(kind) = shell.imp.as_ref().map(ShellImpl::kind) else {
            return;
        };

        if shell.flags.contains(ShellFlags::PENDING_WINDOW_GEOMETRY) {
            shell.geometry = shell.pending_geometry;
            shell.flags.remove(ShellFlags::PENDING_WINDOW_GEOMETRY);

            // The frame extents are updated once the window is really resized.
            shell.flags.insert(ShellFlags::DIRTY_FRAME_EXTENTS);
        }

        match kind {
            ShellKind::Toplevel => self.toplevel_commit(role, surface),
            ShellKind::Popup => self.popup_commit(role, surface),
        }

        let Some(shell) = self.shell_surface_mut(role) else {
            return;
        };

        if !shell.flags.contains(ShellFlags::WAITING_FOR_ACK_CONFIGURE) {
            shell.flags.remove(ShellFlags::WAITING_FOR_ACK_COMMIT);
        }

        let waiting = shell.flags.contains(ShellFlags::WAITING_FOR_ACK_COMMIT);
        let (window, root) = (shell.backing.window, shell.backing.root);

        self.shell_update_input_shape(window, root, surface);

        if waiting {
            self.sync_check_frame_callback(role);
        } else {
            self.sync_update(role);
        }
    }

    pub(crate) fn shell_subsurface_update(&mut self, role: RoleId) {
        let waiting = self
            .shell_surface(role)
            .map_or(false, |shell| shell.flags.contains(ShellFlags::WAITING_FOR_ACK_COMMIT));

        // Updates are postponed until the commit following the acknowledgement.
        if waiting {
            self.sync_check_frame_callback(role);
        } else {
            self.sync_update(role);
        }
    }

    pub(crate) fn shell_rescale(&mut self, role: RoleId) {
        self.shell_impl_geometry_change(role);
    }

    /// Resizes and moves the window to follow the bounds of the view tree.
    pub(crate) fn shell_note_bounds(&mut self, role: RoleId, bounds: Box2D<i32>) {
        let Some(shell) = self.shell_surface(role) else {
            return;
        };

        // The window is not resized before the client drew the acknowledged state.
        if shell
            .flags
            .intersects(ShellFlags::WAITING_FOR_ACK_COMMIT | ShellFlags::TEMPORARY_BOUNDS)
        {
            return;
        }

        let size = bounds.size();
        let window = shell.backing.window;
        let previous = shell.bounds;
        let resize = shell.bounds_size != size;
        let dirty = shell.flags.contains(ShellFlags::DIRTY_FRAME_EXTENTS);

        let mut root = None;
        let mut reconstrain = false;

        if resize {
            root = Some(self.shell_current_root_position(role));

            tracing::trace!(?role, ?size, "Resizing window to bounds");
            self.shell_impl_pre_resize(role, size);
            self.backend.resize_window(window, size);
            self.shell_impl_resized(role, size);
            reconstrain = true;
        }

        if dirty {
            self.shell_impl_geometry_change(role);

            if let Some(shell) = self.shell_surface_mut(role) {
                shell.flags.remove(ShellFlags::DIRTY_FRAME_EXTENTS);
            }
        }

        if bounds.min != previous.min {
            let root = root.unwrap_or_else(|| self.shell_current_root_position(role));
            let position = root + (bounds.min - previous.min);

            self.backend.move_window(window, position);
            reconstrain = true;

            if let Some(shell) = self.shell_surface_mut(role) {
                shell.pending_root = position;
                shell.pending_synth_configure += 1;
            }
        }

        if let Some(shell) = self.shell_surface_mut(role) {
            shell.bounds = bounds;
            shell.bounds_size = size;
        }

        self.shell_impl_note_size(role, size);

        if reconstrain {
            self.shell_run_reconstrain(role, Reconstrain::Resized);
        }
    }

    /// Called when the window manager froze the frame clock to resize the window.
    pub(crate) fn shell_handle_resize(&mut self, role: RoleId, only_frame: bool) {
        if only_frame {
            self.sync_check_frame_callback(role);
            return;
        }

        let Some(shell) = self.shell_surface_mut(role) else {
            return;
        };

        // A configure notification follows the request, which may or may not lead to a configure.
        shell.flags.insert(
            ShellFlags::WAITING_FOR_ACK_CONFIGURE | ShellFlags::WAITING_FOR_ACK_COMMIT | ShellFlags::MAYBE_CONFIGURE,
        );

        self.sync_clear_pending_frame(role);

        // A freeze between a commit and a configure must not leave the client waiting for a frame callback.
        self.sync_check_frame_callback(role);
    }

    /// Detaches everything the shell surface holds on other objects.
    pub(crate) fn shell_release_backing(&mut self, role: RoleId) {
        self.shell_detach_impl(role);

        let Some(shell) = self.shell_surface_mut(role) else {
            return;
        };

        let wm_base = shell.wm_base.take();
        shell.pings.clear();
        shell.reconstrain.clear();

        if let Some(base) = wm_base.and_then(|wm_base| self.wm_bases.get_mut(wm_base)) {
            base.surfaces.retain(|&other| other != role);
        }
    }

    /// Sends a configure with the given serial and waits for the client to draw it.
    pub(crate) fn shell_send_configure(&mut self, role: RoleId, serial: u32) {
        let Some(shell) = self.shell_surface_mut(role) else {
            return;
        };

        shell.conf_serial = serial;
        shell.flags.insert(ShellFlags::WAITING_FOR_ACK_CONFIGURE | ShellFlags::WAITING_FOR_ACK_COMMIT);

        // The configure was accepted, so the bounds no longer need pinning.
        shell.flags.remove(ShellFlags::TEMPORARY_BOUNDS | ShellFlags::MAYBE_CONFIGURE);

        // Nothing is drawn while a configure is outstanding.
        self.sync_clear_pending_frame(role);

        tracing::debug!(?role, serial, "Sent configure");
        self.events.push(ClientEvent::Configure { role, serial });
    }

    /// Unfreezes the frame clock if the window manager did not change the window after asking to synchronize.
    pub(crate) fn shell_note_rejected_configure(&mut self, role: RoleId) {
        let Some(shell) = self.shell_surface_mut(role) else {
            return;
        };

        if shell.flags.contains(ShellFlags::MAYBE_CONFIGURE) {
            shell.flags.remove(
                ShellFlags::WAITING_FOR_ACK_CONFIGURE
                    | ShellFlags::WAITING_FOR_ACK_COMMIT
                    | ShellFlags::MAYBE_CONFIGURE,
            );

            tracing::trace!(?role, "Configure after sync request rejected");
        }
    }

    /// Notes a configure notification sent by the window manager.
    pub(crate) fn shell_note_configure(&mut self, role: RoleId, event: ConfigureEvent) {
        if let Some(shell) = self.shell_surface_mut(role) {
            shell.pending_synth_configure = shell.pending_synth_configure.saturating_sub(1);
        }

        self.sync_note_configure_event(role);
        self.shell_run_reconstrain(role, Reconstrain::Configure(event));
    }

    /// Notes a configure notification generated by the windowing system.
    pub(crate) fn shell_reconstrain(&mut self, role: RoleId, event: ConfigureEvent) {
        self.shell_run_reconstrain(role, Reconstrain::Configure(event));
        self.sync_note_configure_event(role);
    }

    /// Returns the position of the window on the root window.
    pub(crate) fn shell_current_root_position(&self, role: RoleId) -> Point2D<i32> {
        let Some(shell) = self.shell_surface(role) else {
            return Point2D::zero();
        };

        if shell.pending_synth_configure > 0 {
            return shell.pending_root;
        }

        self.backend.root_position(shell.backing.window)
    }

    /// Returns the window geometry clipped to the bounds, or the bounds if the client never set a geometry.
    pub(crate) fn shell_current_geometry(&self, role: RoleId) -> Option<Rect<i32>> {
        let shell = self.shell_surface(role)?;
        let bounds = self.scene.bounds(shell.backing.root);
        let geometry = shell.geometry;

        if geometry.size.width == 0 {
            return Some(bounds.to_rect());
        }

        let min = geometry.min().max(bounds.min);
        let max = geometry.max().min(bounds.max);

        Some(Box2D::new(min, max).to_rect())
    }

    /// Returns the size of the window which gives the window geometry the requested size.
    pub(crate) fn shell_calc_new_window_size(&self, role: RoleId, requested: Size2D<i32>) -> Size2D<i32> {
        let Some(shell) = self.shell_surface(role) else {
            return requested;
        };

        if shell.geometry.size.width == 0 || self.role_surface(role).is_none() {
            return requested;
        }

        let current = self.scene.bounds(shell.backing.root).size();
        let Some(geometry) = self.shell_current_geometry(role) else {
            return requested;
        };

        requested - (current - geometry.size)
    }

    /// Pins the bounds size until the next configure, so a redraw does not undo a resize by the window manager.
    pub(crate) fn shell_set_bounds_size(&mut self, role: RoleId, size: Size2D<i32>) {
        if let Some(shell) = self.shell_surface_mut(role) {
            shell.bounds_size = size;
            shell.flags.insert(ShellFlags::TEMPORARY_BOUNDS);
        }
    }

    /// Sizes the window to the bounds before it is mapped.
    pub(crate) fn shell_resize_for_map(&mut self, role: RoleId) {
        let Some(shell) = self.shell_surface_mut(role) else {
            return;
        };

        shell.flags.remove(ShellFlags::TEMPORARY_BOUNDS);

        let (root, window) = (shell.backing.root, shell.backing.window);
        let bounds = self.scene.bounds(root);

        // Most likely still waiting for the commit following the acknowledgement, which makes this a no-op.
        self.shell_note_bounds(role, bounds);

        let dirty = self
            .shell_surface(role)
            .map_or(false, |shell| shell.flags.contains(ShellFlags::DIRTY_FRAME_EXTENTS));

        if dirty {
            self.shell_impl_geometry_change(role);

            if let Some(shell) = self.shell_surface_mut(role) {
                shell.flags.remove(ShellFlags::DIRTY_FRAME_EXTENTS);
            }
        }

        self.backend.resize_window(window, bounds.size());
        self.shell_impl_resized(role, bounds.size());
    }

    /// Registers a popup to be notified when the window of the shell surface moves or resizes.
    pub(crate) fn shell_run_on_reconstrain(&mut self, role: RoleId, popup: RoleId) -> Option<ReconstrainKey> {
        let shell = self.shell_surface_mut(role)?;

        let key = ReconstrainKey(shell.next_key);
        shell.next_key = shell.next_key.checked_add(1).unwrap_or(NonZeroU64::MIN);
        shell.reconstrain.push(ReconstrainCallback { key, popup });

        Some(key)
    }

    pub(crate) fn shell_cancel_reconstrain(&mut self, role: RoleId, key: ReconstrainKey) {
        if let Some(shell) = self.shell_surface_mut(role) {
            shell.reconstrain.retain(|callback| callback.key != key);
        }
    }

    /// Returns the number of observers registered on the shell surface.
    pub fn reconstrain_observers(&self, handle: &ShellHandle) -> usize {
        self.shell_surface(handle.0).map_or(0, |shell| shell.reconstrain.len())
    }

    fn shell_run_reconstrain(&mut self, role: RoleId, reason: Reconstrain) {
        let Some(shell) = self.shell_surface(role) else {
            return;
        };

        let popups = shell.reconstrain.iter().map(|callback| callback.popup).collect::<Vec<_>>();

        for popup in popups {
            self.popup_parent_reconstrained(popup, reason);
        }
    }

    fn shell_update_input_shape(&mut self, window: WindowId, root: ViewIndex, surface: SurfaceId) {
        let Some(data) = self.surfaces.get(surface) else {
            return;
        };

        if !data.current.flags.contains(PendingFlags::INPUT_REGION) {
            return;
        }

        match &data.current.input_region {
            Some(rects) => self.backend.set_shape(window, ShapeKind::Input, rects),
            None => {
                let whole = self.scene.bounds(root).to_rect();
                self.backend.set_shape(window, ShapeKind::Input, &[whole]);
            }
        }
    }

    fn shell_impl_pre_resize(&mut self, role: RoleId, size: Size2D<i32>) {
        if let Some(ShellKind::Toplevel) = self.shell_kind_attached(role) {
            self.toplevel_pre_resize(role, size);
        }
    }

    fn shell_impl_resized(&mut self, role: RoleId, size: Size2D<i32>) {
        if let Some(ShellKind::Toplevel) = self.shell_kind_attached(role) {
            self.toplevel_note_size(role, size);
        }
    }

    fn shell_impl_geometry_change(&mut self, role: RoleId) {
        match self.shell_kind_attached(role) {
            Some(ShellKind::Toplevel) => self.toplevel_geometry_change(role),
            Some(ShellKind::Popup) => self.popup_move_window(role),
            None => (),
        }
    }

    fn shell_impl_note_size(&mut self, role: RoleId, size: Size2D<i32>) {
        match self.shell_kind_attached(role) {
            Some(ShellKind::Toplevel) => self.toplevel_note_size(role, size),
            Some(ShellKind::Popup) => self.popup_note_size(role, size),
            None => (),
        }
    }
}
