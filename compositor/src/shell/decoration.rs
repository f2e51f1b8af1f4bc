//! Toplevel decoration objects
//!
//! A client tells whether it draws it's own window decorations through a decoration object created for a toplevel.
//! The chosen mode is sent back in a configure and written to the window as `_MOTIF_WM_HINTS` once the client
//! acknowledged it, so the window manager only draws a frame around windows whose client asked for one.

use std::num::NonZeroU64;

use static_assertions::assert_not_impl_any;

use super::ToplevelHandle;
use crate::{
    error::{ProtocolError, Result},
    role::RoleId,
    state::Compositor,
};

/// Who draws the decorations of a toplevel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecorationMode {
    #[default]
    ClientSide,

    /// The window manager draws a frame around the window.
    ServerSide,
}

/// The client's reference to the decoration object of a toplevel.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DecorationHandle {
    role: RoleId,
    key: NonZeroU64,
}

assert_not_impl_any!(DecorationHandle: Clone, Copy);

impl DecorationHandle {
    /// Returns the shell surface of the toplevel the decoration object was created for.
    pub fn id(&self) -> RoleId {
        self.role
    }
}

impl Compositor {
    /// Creates the decoration object of a toplevel.
    ///
    /// Fails if the toplevel already has one, or if it's surface already has a buffer.
    pub fn get_toplevel_decoration(&mut self, toplevel: &ToplevelHandle) -> Result<DecorationHandle> {
        let role = toplevel.id();
        let key = self.next_decoration;
        self.next_decoration = self.next_decoration.saturating_add(1);

        let handle = DecorationHandle { role, key };

        let Some(data) = self.toplevel(role) else {
            // The toplevel was destroyed, so the decoration object is inert.
            return Ok(handle);
        };

        if data.decoration.is_some() {
            return Err(ProtocolError::DecorationAlreadyConstructed);
        }

        let has_buffer = self
            .role_surface(role)
            .and_then(|surface| self.surfaces.get(surface))
            .map_or(false, |surface| surface.current.buffer.is_some());

        if has_buffer {
            return Err(ProtocolError::UnconfiguredBuffer);
        }

        self.toplevel_attach_decoration(role, key);
        tracing::debug!(?role, "Created toplevel decoration");

        Ok(handle)
    }

    pub fn destroy_decoration(&mut self, handle: DecorationHandle) {
        self.toplevel_detach_decoration(handle.role, handle.key);
    }

    pub fn set_decoration_mode(&mut self, handle: &DecorationHandle, mode: DecorationMode) {
        if self.decoration_attached(handle) {
            self.toplevel_set_decor(handle.role, mode);
        }
    }

    /// Lets the compositor pick the mode, which is always server side.
    pub fn unset_decoration_mode(&mut self, handle: &DecorationHandle) {
        if self.decoration_attached(handle) {
            self.toplevel_set_decor(handle.role, DecorationMode::ServerSide);
        }
    }

    /// Returns the decoration mode last asked for by the client.
    pub fn decoration_mode(&self, toplevel: &ToplevelHandle) -> Option<DecorationMode> {
        self.toplevel(toplevel.id()).map(|data| data.decor)
    }

    fn decoration_attached(&self, handle: &DecorationHandle) -> bool {
        self.toplevel(handle.role)
            .map_or(false, |data| data.decoration == Some(handle.key))
    }
}
