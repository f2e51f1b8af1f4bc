//! Toplevel windows
//!
//! # Toplevel state machine
//!
//! A toplevel goes through three states: new, possible to map and mapped.
//!
//! ```text
//! /---> New ---> Possible to map ---> Mapped ---\
//! |              ^             |      ^    |    |
//! |              \-------------/      \----/    |
//! |                                             |
//! \---------------------------------------------/
//! ```
//!
//! A toplevel starts in the `New` state. The first commit of a new toplevel is answered with a configure, and
//! any buffer attached before the configure is ignored. Once the configure is acknowledged, a commit with a buffer
//! maps the window. A commit without a buffer unmaps the window and the toplevel is new again.
//!
//! While mapped, the window manager decides the size of the window. A configure notification with a new size is
//! turned into a configure for the client, with the size of the decorations drawn by the client taken off.
//!
//! # States and parents
//!
//! Every configure carries the states the window manager last announced, plus `resizing` while an interactive
//! resize started by the client is in progress. A toplevel may be transient for another mapped toplevel. When the
//! parent is unmapped, it's children become transient for the parent's own parent, or for nothing.
//!
//! Unmapping discards the states, the parent and any resize in progress, like the protocol asks.

use std::num::NonZeroU64;

use bitflags::bitflags;
use euclid::default::Size2D;
use static_assertions::assert_not_impl_any;

use super::{DecorationMode, ShellHandle, ShellImpl, ShellKind};
use crate::{
    backend::{
        AllowedActions, Capability, ConfigureEvent, MoveResize, Property, ResizeEdge, SizeHints, WindowId,
        WmProtocols, WmStateAction, WmStates,
    },
    error::{ProtocolError, Result},
    role::RoleId,
    state::Compositor,
    surface::SurfaceId,
    ClientEvent,
};

/// The client's reference to a toplevel.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ToplevelHandle(RoleId);

assert_not_impl_any!(ToplevelHandle: Clone, Copy);

impl ToplevelHandle {
    /// Returns the shell surface the toplevel was created for.
    pub fn id(&self) -> RoleId {
        self.0
    }
}

bitflags! {
    /// States of a toplevel sent with every `xdg_toplevel.configure`.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ToplevelStates: u32 {
        const MAXIMIZED = 1 << 0;
        const FULLSCREEN = 1 << 1;
        const ACTIVATED = 1 << 2;
        const RESIZING = 1 << 3;
    }
}

impl ToplevelStates {
    fn from_wm(states: WmStates) -> Self {
        let mut toplevel = Self::empty();
        toplevel.set(Self::MAXIMIZED, states.contains(WmStates::MAXIMIZED));
        toplevel.set(Self::FULLSCREEN, states.contains(WmStates::FULLSCREEN));
        toplevel.set(Self::ACTIVATED, states.contains(WmStates::FOCUSED));
        toplevel
    }
}

bitflags! {
    /// Requests the window manager is able to honor, sent as `xdg_toplevel.wm_capabilities`.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WmCapabilities: u32 {
        const WINDOW_MENU = 1 << 0;
        const MAXIMIZE = 1 << 1;
        const FULLSCREEN = 1 << 2;
        const MINIMIZE = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    struct ToplevelFlags: u32 {
        const MAPPED = 1 << 0;
        const WAITING_FOR_INITIAL_CONFIGURE = 1 << 1;
        const PENDING_MIN_SIZE = 1 << 2;
        const PENDING_MAX_SIZE = 1 << 3;
        const EVER_MAPPED = 1 << 4;

        /// The decoration mode was sent and is written to the window once every configure is acknowledged.
        const DECORATION_MODE_DIRTY = 1 << 5;

        /// The decoration mode goes out with the next configure.
        const NEED_DECORATION_CONFIGURE = 1 << 6;
    }
}

/// Window sizes last seen in each combination of the maximized and fullscreen states.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct StateSizes([Option<Size2D<i32>>; 4]);

impl StateSizes {
    fn slot(maximized: bool, fullscreen: bool) -> usize {
        usize::from(maximized) << 1 | usize::from(fullscreen)
    }

    fn get(&self, maximized: bool, fullscreen: bool) -> Option<Size2D<i32>> {
        self.0[Self::slot(maximized, fullscreen)]
    }

    fn record(&mut self, states: ToplevelStates, size: Size2D<i32>) {
        let slot = Self::slot(
            states.contains(ToplevelStates::MAXIMIZED),
            states.contains(ToplevelStates::FULLSCREEN),
        );

        self.0[slot] = Some(size);
    }
}

/// Guesses which of the maximized and fullscreen states a window left from the size the window manager gave it.
///
/// Returns `None` if nothing can be told, or the states don't change.
fn restore_states(states: ToplevelStates, sizes: &StateSizes, size: Size2D<i32>) -> Option<ToplevelStates> {
    let matches = |maximized, fullscreen| sizes.get(maximized, fullscreen) == Some(size);

    if matches(true, true) {
        return None;
    }

    let cleared = if matches(false, false) {
        ToplevelStates::MAXIMIZED | ToplevelStates::FULLSCREEN
    } else {
        match (matches(true, false), matches(false, true)) {
            (true, false) => ToplevelStates::FULLSCREEN,
            (false, true) => ToplevelStates::MAXIMIZED,
            // Ambiguous or unknown.
            _ => return None,
        }
    };

    let restored = states - cleared;
    (restored != states).then_some(restored)
}

#[derive(Debug)]
pub(crate) struct Toplevel {
    flags: ToplevelFlags,

    /// A configure was sent and not acknowledged yet.
    conf_reply: bool,
    conf_serial: u32,

    /// The size of the window as last configured by the window manager.
    size: Size2D<i32>,

    min_size: Size2D<i32>,
    /// A width of zero means there is no maximum.
    max_size: Size2D<i32>,
    pending_min: Size2D<i32>,
    pending_max: Size2D<i32>,

    /// The hints last written to the window.
    hints: SizeHints,

    /// States announced by the window manager.
    states: ToplevelStates,
    capabilities: WmCapabilities,

    /// Interactive resizes in progress.
    resizes: u32,
    state_sizes: StateSizes,

    /// The toplevel this one is transient for.
    parent: Option<RoleId>,
    children: Vec<RoleId>,

    pub(super) decor: DecorationMode,

    /// Key of the decoration object, if the client created one.
    pub(super) decoration: Option<NonZeroU64>,
}

impl Toplevel {
    fn new() -> Self {
        Self {
            flags: ToplevelFlags::WAITING_FOR_INITIAL_CONFIGURE,
            conf_reply: false,
            conf_serial: 0,
            size: Size2D::zero(),
            min_size: Size2D::zero(),
            max_size: Size2D::zero(),
            pending_min: Size2D::zero(),
            pending_max: Size2D::zero(),
            hints: SizeHints::default(),
            states: ToplevelStates::empty(),
            capabilities: WmCapabilities::empty(),
            resizes: 0,
            state_sizes: StateSizes::default(),
            parent: None,
            children: Vec::new(),
            decor: DecorationMode::ClientSide,
            decoration: None,
        }
    }

    /// The states sent with a configure.
    fn current_states(&self) -> ToplevelStates {
        let mut states = self.states;
        states.set(ToplevelStates::RESIZING, self.resizes > 0);
        states
    }
}

impl Compositor {
    /// Makes the shell surface a toplevel.
    ///
    /// If the surface of the shell surface was destroyed, the toplevel is inert.
    pub fn get_toplevel(&mut self, shell: &ShellHandle) -> Result<ToplevelHandle> {
        let role = shell.id();

        if self.shell_reserve(role, ShellKind::Toplevel)? {
            self.shell_attach_impl(role, ShellImpl::Toplevel(Toplevel::new()));
        }

        Ok(ToplevelHandle(role))
    }

    pub fn destroy_toplevel(&mut self, handle: ToplevelHandle) {
        let role = handle.0;

        if self.toplevel(role).is_some() {
            self.shell_detach_impl(role);
        }
    }

    /// Sets the minimum size of the window geometry, applied on the next commit.
    pub fn set_min_size(&mut self, handle: &ToplevelHandle, width: i32, height: i32) -> Result<()> {
        if width < 0 || height < 0 {
            return Err(ProtocolError::InvalidSize {
                which: "min",
                width,
                height,
            });
        }

        if let Some(toplevel) = self.toplevel_mut(handle.0) {
            toplevel.pending_min = Size2D::new(width, height);
            toplevel.flags.insert(ToplevelFlags::PENDING_MIN_SIZE);
        }

        Ok(())
    }

    /// Sets the maximum size of the window geometry, applied on the next commit.
    ///
    /// A width of zero removes the maximum.
    pub fn set_max_size(&mut self, handle: &ToplevelHandle, width: i32, height: i32) -> Result<()> {
        if width < 0 || height < 0 {
            return Err(ProtocolError::InvalidSize {
                which: "max",
                width,
                height,
            });
        }

        if let Some(toplevel) = self.toplevel_mut(handle.0) {
            toplevel.pending_max = Size2D::new(width, height);
            toplevel.flags.insert(ToplevelFlags::PENDING_MAX_SIZE);
        }

        Ok(())
    }

    pub fn toplevel_mapped(&self, handle: &ToplevelHandle) -> bool {
        self.toplevel_is_mapped(handle.0)
    }

    /// Returns the size of the window last configured by the window manager.
    pub fn toplevel_size(&self, handle: &ToplevelHandle) -> Option<Size2D<i32>> {
        self.toplevel(handle.0).map(|toplevel| toplevel.size)
    }

    /// Returns the size hints last written to the window.
    pub fn toplevel_size_hints(&self, handle: &ToplevelHandle) -> Option<SizeHints> {
        self.toplevel(handle.0).map(|toplevel| toplevel.hints)
    }

    /// Called by the backend when the window manager asks to close a window.
    pub fn delete_window(&mut self, window: WindowId) {
        let Some(role) = self.role_for_window(window) else {
            return;
        };

        if self.toplevel(role).is_some() {
            tracing::debug!(%window, "Window manager asked to close toplevel");
            self.events.push(ClientEvent::ToplevelClose { role });
        }
    }

    /// Returns the states sent with the last configure.
    pub fn toplevel_states(&self, handle: &ToplevelHandle) -> Option<ToplevelStates> {
        self.toplevel(handle.0).map(Toplevel::current_states)
    }

    pub fn toplevel_capabilities(&self, handle: &ToplevelHandle) -> Option<WmCapabilities> {
        self.toplevel(handle.0).map(|toplevel| toplevel.capabilities)
    }

    /// Returns the toplevel this toplevel is transient for.
    pub fn toplevel_parent(&self, handle: &ToplevelHandle) -> Option<RoleId> {
        self.toplevel(handle.0).and_then(|toplevel| toplevel.parent)
    }

    pub fn set_title(&mut self, handle: &ToplevelHandle, title: &str) {
        let role = handle.0;

        if self.toplevel(role).is_none() {
            return;
        }

        let Some(window) = self.shell_window(role) else {
            return;
        };

        // WM_NAME holds Latin-1, so the title is cut at the first character outside of it.
        let latin1: String = title.chars().take_while(|&c| u32::from(c) < 0x100).collect();

        self.backend.change_property(window, Property::NetWmName(title.to_owned()));
        self.backend.change_property(window, Property::WmName(latin1));
    }

    /// Sets the class of the window.
    ///
    /// The class of a mapped window cannot change, so this is ignored while the toplevel is mapped.
    pub fn set_app_id(&mut self, handle: &ToplevelHandle, app_id: &str) {
        let role = handle.0;

        let Some(toplevel) = self.toplevel(role) else {
            return;
        };

        if toplevel.flags.contains(ToplevelFlags::MAPPED) {
            tracing::debug!(?role, app_id, "Ignoring app id of mapped toplevel");
            return;
        }

        if let Some(window) = self.shell_window(role) {
            self.backend.change_property(
                window,
                Property::WmClass {
                    instance: app_id.to_owned(),
                    class: app_id.to_owned(),
                },
            );
        }
    }

    /// Makes the toplevel transient for another toplevel.
    ///
    /// A parent which is not mapped is treated like no parent at all.
    pub fn set_parent(&mut self, handle: &ToplevelHandle, parent: Option<&ToplevelHandle>) -> Result<()> {
        let role = handle.0;

        if self.toplevel(role).is_none() {
            return Ok(());
        }

        let parent = parent.map(ToplevelHandle::id).filter(|&parent| self.toplevel_is_mapped(parent));

        let mut ancestor = parent;

        while let Some(current) = ancestor {
            if current == role {
                return Err(ProtocolError::InvalidParent);
            }

            ancestor = self.toplevel(current).and_then(|toplevel| toplevel.parent);
        }

        self.toplevel_update_parent(role, parent);
        Ok(())
    }

    pub fn set_maximized(&mut self, handle: &ToplevelHandle) {
        self.toplevel_change_wm_state(handle.0, WmStateAction::Add, WmStates::MAXIMIZED);
    }

    pub fn unset_maximized(&mut self, handle: &ToplevelHandle) {
        self.toplevel_change_wm_state(handle.0, WmStateAction::Remove, WmStates::MAXIMIZED);
    }

    /// Asks the window manager to make the window fullscreen on whichever output it chooses.
    pub fn set_fullscreen(&mut self, handle: &ToplevelHandle) {
        self.toplevel_change_wm_state(handle.0, WmStateAction::Add, WmStates::FULLSCREEN);
    }

    pub fn unset_fullscreen(&mut self, handle: &ToplevelHandle) {
        self.toplevel_change_wm_state(handle.0, WmStateAction::Remove, WmStates::FULLSCREEN);
    }

    /// Iconifies the window.
    ///
    /// The client is never told whether the window is iconified.
    pub fn set_minimized(&mut self, handle: &ToplevelHandle) {
        let role = handle.0;

        if self.toplevel(role).is_none() {
            return;
        }

        if let Some(window) = self.shell_window(role) {
            self.backend.iconify_window(window);
        }
    }

    /// Starts an interactive move of the window.
    pub fn move_toplevel(&mut self, handle: &ToplevelHandle) {
        let role = handle.0;

        if self.toplevel(role).is_none() || self.role_surface(role).is_none() {
            return;
        }

        if let Some(window) = self.shell_window(role) {
            if !self.backend.begin_move_resize(window, MoveResize::Move) {
                tracing::debug!(?role, "Could not start interactive move");
            }
        }
    }

    /// Starts an interactive resize of the window from the given `xdg_toplevel.resize_edge`.
    ///
    /// The toplevel is `resizing` until the backend reports the end of the resize through
    /// [`Compositor::resize_done`].
    pub fn resize_toplevel(&mut self, handle: &ToplevelHandle, edges: u32) -> Result<()> {
        let Some(edge) = ResizeEdge::from_wire(edges) else {
            return Err(ProtocolError::InvalidResizeEdge(edges));
        };

        let role = handle.0;

        if self.toplevel(role).is_none() || self.role_surface(role).is_none() {
            return Ok(());
        }

        let Some(window) = self.shell_window(role) else {
            return Ok(());
        };

        if !self.backend.begin_move_resize(window, MoveResize::Resize(edge)) {
            tracing::debug!(?role, ?edge, "Could not start interactive resize");
            return Ok(());
        }

        if let Some(toplevel) = self.toplevel_mut(role) {
            toplevel.resizes += 1;
        }

        self.toplevel_send_states(role);
        Ok(())
    }

    /// Called by the backend when an interactive resize of a window ended.
    pub fn resize_done(&mut self, window: WindowId) {
        let Some(role) = self.role_for_window(window) else {
            return;
        };

        let Some(toplevel) = self.toplevel_mut(role) else {
            return;
        };

        if toplevel.resizes == 0 {
            return;
        }

        toplevel.resizes -= 1;

        if toplevel.resizes == 0 {
            self.toplevel_send_states(role);
        }
    }

    /// Called by the backend when the window manager changed the states of a window.
    pub fn wm_state_changed(&mut self, window: WindowId, states: WmStates) {
        let Some(role) = self.role_for_window(window) else {
            return;
        };

        let Some(toplevel) = self.toplevel_mut(role) else {
            return;
        };

        let states = ToplevelStates::from_wm(states);

        if toplevel.states == states {
            return;
        }

        toplevel.states = states;
        tracing::debug!(?role, ?states, "Window manager changed toplevel states");

        self.toplevel_send_states(role);
    }

    /// Called by the backend when the window manager changed the actions it allows on a window.
    pub fn allowed_actions_changed(&mut self, window: WindowId, actions: AllowedActions) {
        let Some(role) = self.role_for_window(window) else {
            return;
        };

        let Some(toplevel) = self.toplevel_mut(role) else {
            return;
        };

        // The window menu is not an action, so it stays as it was.
        let mut capabilities = toplevel.capabilities & WmCapabilities::WINDOW_MENU;
        capabilities.set(WmCapabilities::MAXIMIZE, actions.contains(AllowedActions::MAXIMIZE));
        capabilities.set(WmCapabilities::FULLSCREEN, actions.contains(AllowedActions::FULLSCREEN));
        capabilities.set(WmCapabilities::MINIMIZE, actions.contains(AllowedActions::MINIMIZE));

        if toplevel.capabilities == capabilities {
            return;
        }

        toplevel.capabilities = capabilities;
        self.events.push(ClientEvent::ToplevelWmCapabilities { role, capabilities });

        // The capabilities only apply once a configure follows them.
        self.toplevel_send_states(role);
    }

    pub(super) fn toplevel(&self, role: RoleId) -> Option<&Toplevel> {
        match self.shell_surface(role)?.imp.as_ref()? {
            ShellImpl::Toplevel(toplevel) => Some(toplevel),
            ShellImpl::Popup(_) => None,
        }
    }

    pub(super) fn toplevel_mut(&mut self, role: RoleId) -> Option<&mut Toplevel> {
        match self.shell_surface_mut(role)?.imp.as_mut()? {
            ShellImpl::Toplevel(toplevel) => Some(toplevel),
            ShellImpl::Popup(_) => None,
        }
    }

    pub(super) fn toplevel_attach(&mut self, role: RoleId) {
        let Some(window) = self.shell_window(role) else {
            return;
        };

        let mut protocols = WmProtocols::DELETE_WINDOW;

        if self.config.net_wm_ping {
            protocols |= WmProtocols::PING;
        }

        if self.config.sync_request && self.backend.supports(Capability::FrameSync) {
            protocols |= WmProtocols::SYNC_REQUEST;
        }

        self.backend.change_property(window, Property::WmProtocols(protocols));
        self.backend
            .change_property(window, Property::NormalHints(SizeHints::default()));

        // Client side decorations until the client asks otherwise.
        self.backend
            .change_property(window, Property::MotifWmHints { decorated: false });

        let mut capabilities = WmCapabilities::MINIMIZE;
        capabilities.set(WmCapabilities::MAXIMIZE, self.backend.supports(Capability::WmMaximize));
        capabilities.set(WmCapabilities::FULLSCREEN, self.backend.supports(Capability::WmFullscreen));
        capabilities.set(WmCapabilities::WINDOW_MENU, self.backend.supports(Capability::WmWindowMenu));

        if let Some(toplevel) = self.toplevel_mut(role) {
            toplevel.capabilities = capabilities;
        }

        self.events.push(ClientEvent::ToplevelWmCapabilities { role, capabilities });

        self.toplevel_geometry_change(role);
    }

    pub(super) fn toplevel_detach(&mut self, role: RoleId) {
        if self.toplevel_is_mapped(role) {
            self.toplevel_unmap(role);
        }

        self.toplevel_update_parent(role, None);

        if let Some(window) = self.shell_window(role) {
            self.backend
                .change_property(window, Property::WmProtocols(WmProtocols::empty()));
        }
    }

    pub(super) fn toplevel_commit(&mut self, role: RoleId, surface: SurfaceId) {
        let has_buffer = self
            .surfaces
            .get(surface)
            .map_or(false, |data| data.current.buffer.is_some());

        let Some(toplevel) = self.toplevel_mut(role) else {
            return;
        };

        let mut hints_changed = false;

        if toplevel.flags.contains(ToplevelFlags::PENDING_MIN_SIZE) {
            toplevel.min_size = toplevel.pending_min;
            toplevel.flags.remove(ToplevelFlags::PENDING_MIN_SIZE);
            hints_changed = true;
        }

        if toplevel.flags.contains(ToplevelFlags::PENDING_MAX_SIZE) {
            toplevel.max_size = toplevel.pending_max;
            toplevel.flags.remove(ToplevelFlags::PENDING_MAX_SIZE);
            hints_changed = true;
        }

        let waiting = toplevel.flags.contains(ToplevelFlags::WAITING_FOR_INITIAL_CONFIGURE);
        let mapped = toplevel.flags.contains(ToplevelFlags::MAPPED);
        let conf_reply = toplevel.conf_reply;

        if hints_changed {
            self.toplevel_geometry_change(role);
        }

        if !has_buffer || waiting {
            if mapped {
                self.toplevel_unmap(role);
            }

            if let Some(toplevel) = self.toplevel_mut(role) {
                toplevel.flags.remove(ToplevelFlags::WAITING_FOR_INITIAL_CONFIGURE);
            }

            // Let the client pick the size.
            self.toplevel_send_configure(role, Size2D::zero());
        } else if !conf_reply && !mapped {
            self.toplevel_map(role);
        }

        let Some(toplevel) = self.toplevel_mut(role) else {
            return;
        };

        if toplevel.conf_reply || !toplevel.flags.contains(ToplevelFlags::DECORATION_MODE_DIRTY) {
            return;
        }

        // Every configure was acknowledged, so the client drew the new mode.
        toplevel.flags.remove(ToplevelFlags::DECORATION_MODE_DIRTY);
        let decorated = toplevel.decor == DecorationMode::ServerSide;

        if let Some(window) = self.shell_window(role) {
            self.backend.change_property(window, Property::MotifWmHints { decorated });
        }
    }

    pub(super) fn toplevel_ack_configure(&mut self, role: RoleId, serial: u32) {
        if let Some(toplevel) = self.toplevel_mut(role) {
            if serial == toplevel.conf_serial {
                toplevel.conf_reply = false;
            }
        }
    }

    pub(super) fn toplevel_configure_notify(&mut self, role: RoleId, event: ConfigureEvent) {
        let Some(toplevel) = self.toplevel(role) else {
            return;
        };

        if !toplevel.flags.contains(ToplevelFlags::MAPPED) {
            return;
        }

        let size = toplevel.size;

        if event.synthetic {
            self.shell_note_configure(role, event);
        } else {
            self.shell_reconstrain(role, event);
        }

        if event.size == size {
            self.shell_note_rejected_configure(role);
            return;
        }

        let workaround = self.config.state_workaround;

        if let Some(toplevel) = self.toplevel_mut(role) {
            // Some window managers resize the window before they announce the states it left.
            if workaround {
                if let Some(states) = restore_states(toplevel.states, &toplevel.state_sizes, event.size) {
                    tracing::debug!(?role, ?states, "Restored toplevel states from the window size");
                    toplevel.states = states;
                }
            }

            toplevel.size = event.size;
        }

        tracing::debug!(?role, size = ?event.size, "Window manager resized toplevel");

        // Keep the bounds at the new size until the client draws it.
        self.shell_set_bounds_size(role, event.size);

        let size = self.shell_calc_new_window_size(role, event.size);
        self.toplevel_send_configure(role, size);
        self.toplevel_record_state_size(role);
    }

    /// Updates the frame extents before the window is resized to the given size.
    pub(super) fn toplevel_pre_resize(&mut self, role: RoleId, size: Size2D<i32>) {
        if self.toplevel(role).is_none() {
            return;
        }

        self.toplevel_write_frame_extents(role, size);
    }

    pub(super) fn toplevel_note_size(&mut self, role: RoleId, size: Size2D<i32>) {
        if let Some(toplevel) = self.toplevel_mut(role) {
            toplevel.size = size;
        }

        self.toplevel_record_state_size(role);
    }

    /// Writes the frame extents and the size hints after the window geometry or the bounds changed.
    pub(super) fn toplevel_geometry_change(&mut self, role: RoleId) {
        let Some(root) = self.role_root(role) else {
            return;
        };

        let size = self.scene.bounds(root).size();
        self.toplevel_write_frame_extents(role, size);

        let Some(geometry) = self.shell_current_geometry(role) else {
            return;
        };

        let Some(window) = self.shell_window(role) else {
            return;
        };

        let Some(toplevel) = self.toplevel_mut(role) else {
            return;
        };

        // The hints describe the window, which includes the decorations around the geometry.
        let decorations = size - geometry.size;
        let min = toplevel.min_size + decorations;
        let max = (toplevel.max_size.width != 0).then(|| toplevel.max_size + decorations);

        let hints = SizeHints { min: Some(min), max };

        if toplevel.hints == hints {
            return;
        }

        toplevel.hints = hints;
        self.backend.change_property(window, Property::NormalHints(hints));
    }

    fn toplevel_write_frame_extents(&mut self, role: RoleId, size: Size2D<i32>) {
        let (Some(geometry), Some(window)) = (self.shell_current_geometry(role), self.shell_window(role)) else {
            return;
        };

        let left = geometry.origin.x;
        let top = geometry.origin.y;
        let right = size.width - geometry.size.width - left;
        let bottom = size.height - geometry.size.height - top;

        self.backend.change_property(
            window,
            Property::GtkFrameExtents {
                left,
                right,
                top,
                bottom,
            },
        );
    }

    fn toplevel_send_configure(&mut self, role: RoleId, size: Size2D<i32>) {
        let serial = self.next_serial();

        let Some(toplevel) = self.toplevel_mut(role) else {
            return;
        };

        let states = toplevel.current_states();

        // A mode set before the toplevel was first mapped goes out with the next configure.
        let decoration = (toplevel.flags.contains(ToplevelFlags::NEED_DECORATION_CONFIGURE)
            && toplevel.decoration.is_some())
        .then_some(toplevel.decor);

        toplevel.flags.remove(ToplevelFlags::NEED_DECORATION_CONFIGURE);

        if decoration.is_some() {
            toplevel.flags.insert(ToplevelFlags::DECORATION_MODE_DIRTY);
        }

        toplevel.conf_reply = true;
        toplevel.conf_serial = serial;

        self.events.push(ClientEvent::ToplevelConfigure {
            role,
            width: size.width,
            height: size.height,
            states,
        });

        if let Some(mode) = decoration {
            self.events.push(ClientEvent::DecorationConfigure { role, mode });
        }

        self.shell_send_configure(role, serial);
    }

    /// Sends the current states with the size the window already has.
    fn toplevel_send_states(&mut self, role: RoleId) {
        let Some(toplevel) = self.toplevel(role) else {
            return;
        };

        // The initial configure carries them.
        if toplevel.flags.contains(ToplevelFlags::WAITING_FOR_INITIAL_CONFIGURE) {
            return;
        }

        let size = toplevel.size;

        let size = if size.is_empty() {
            Size2D::zero()
        } else {
            self.shell_calc_new_window_size(role, size)
        };

        self.toplevel_send_configure(role, size);
    }

    fn toplevel_record_state_size(&mut self, role: RoleId) {
        if self.role_surface(role).is_none() {
            return;
        }

        if let Some(toplevel) = self.toplevel_mut(role) {
            toplevel.state_sizes.record(toplevel.states, toplevel.size);
        }
    }

    fn toplevel_is_mapped(&self, role: RoleId) -> bool {
        self.toplevel(role)
            .map_or(false, |toplevel| toplevel.flags.contains(ToplevelFlags::MAPPED))
    }

    fn toplevel_change_wm_state(&mut self, role: RoleId, action: WmStateAction, states: WmStates) {
        if self.toplevel(role).is_none() {
            return;
        }

        if let Some(window) = self.shell_window(role) {
            self.backend.change_wm_state(window, action, states);
        }
    }

    /// Makes the toplevel transient for `parent` and writes `WM_TRANSIENT_FOR`.
    fn toplevel_update_parent(&mut self, role: RoleId, parent: Option<RoleId>) {
        let Some(toplevel) = self.toplevel_mut(role) else {
            return;
        };

        if toplevel.parent == parent {
            return;
        }

        let old = std::mem::replace(&mut toplevel.parent, parent);

        if let Some(old) = old.and_then(|old| self.toplevel_mut(old)) {
            old.children.retain(|&child| child != role);
        }

        if let Some(new) = parent.and_then(|parent| self.toplevel_mut(parent)) {
            new.children.push(role);
        }

        let transient_for = parent.and_then(|parent| self.shell_window(parent));

        if let Some(window) = self.shell_window(role) {
            self.backend
                .change_property(window, Property::WmTransientFor(transient_for));
        }

        tracing::debug!(?role, ?parent, "Changed toplevel parent");
    }

    /// Attaches a decoration object, which starts out asking for client side decorations.
    pub(super) fn toplevel_attach_decoration(&mut self, role: RoleId, key: NonZeroU64) {
        if let Some(toplevel) = self.toplevel_mut(role) {
            toplevel.decoration = Some(key);
        }
    }

    pub(super) fn toplevel_detach_decoration(&mut self, role: RoleId, key: NonZeroU64) {
        let Some(toplevel) = self.toplevel_mut(role) else {
            return;
        };

        if toplevel.decoration == Some(key) {
            toplevel.decoration = None;
            toplevel.flags.remove(ToplevelFlags::NEED_DECORATION_CONFIGURE);
        }
    }

    pub(super) fn toplevel_set_decor(&mut self, role: RoleId, mode: DecorationMode) {
        let Some(toplevel) = self.toplevel_mut(role) else {
            return;
        };

        toplevel.decor = mode;

        // Partially initialized toplevels get the mode with their next configure.
        if toplevel.flags.contains(ToplevelFlags::EVER_MAPPED) {
            self.toplevel_send_decoration_configure(role);
        } else {
            toplevel.flags.insert(ToplevelFlags::NEED_DECORATION_CONFIGURE);
        }
    }

    fn toplevel_send_decoration_configure(&mut self, role: RoleId) {
        let serial = self.next_serial();

        let Some(toplevel) = self.toplevel_mut(role) else {
            return;
        };

        toplevel.flags.insert(ToplevelFlags::DECORATION_MODE_DIRTY);
        toplevel.conf_reply = true;
        toplevel.conf_serial = serial;

        let mode = toplevel.decor;

        self.events.push(ClientEvent::DecorationConfigure { role, mode });
        self.shell_send_configure(role, serial);
    }

    fn toplevel_map(&mut self, role: RoleId) {
        let (Some(root), Some(window)) = (self.role_root(role), self.shell_window(role)) else {
            return;
        };

        self.scene.garbage(root);
        let size = self.scene.bounds(root).size();

        if let Some(toplevel) = self.toplevel_mut(role) {
            toplevel.flags.insert(ToplevelFlags::MAPPED | ToplevelFlags::EVER_MAPPED);
            toplevel.flags.remove(ToplevelFlags::WAITING_FOR_INITIAL_CONFIGURE);
            toplevel.size = size;
        }

        self.shell_resize_for_map(role);
        self.backend.map_window(window);

        tracing::debug!(?role, %window, "Mapped toplevel");
    }

    fn toplevel_unmap(&mut self, role: RoleId) {
        let Some(window) = self.shell_window(role) else {
            return;
        };

        let mut orphans = Vec::new();
        let mut grandparent = None;

        if let Some(toplevel) = self.toplevel_mut(role) {
            toplevel.flags = ToplevelFlags::WAITING_FOR_INITIAL_CONFIGURE;
            toplevel.conf_reply = false;
            toplevel.conf_serial = 0;
            toplevel.size = Size2D::zero();
            toplevel.min_size = Size2D::zero();
            toplevel.max_size = Size2D::zero();
            toplevel.hints = SizeHints::default();
            toplevel.states = ToplevelStates::empty();
            toplevel.resizes = 0;

            orphans = std::mem::take(&mut toplevel.children);
            grandparent = toplevel.parent;
        }

        self.backend.unmap_window(window);
        self.backend
            .change_property(window, Property::NormalHints(SizeHints::default()));

        self.toplevel_update_parent(role, None);

        let grandparent = grandparent.filter(|&grandparent| self.toplevel_is_mapped(grandparent));

        for child in orphans {
            self.toplevel_update_parent(child, grandparent);
        }

        tracing::debug!(?role, %window, "Unmapped toplevel");
    }
}
