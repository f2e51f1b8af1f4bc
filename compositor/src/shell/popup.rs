//! Popups
//!
//! A popup is an override redirect window placed relative to the window geometry of it's parent. The position is
//! computed when the popup is configured and applied by the first commit after the client acknowledged it.

use bitflags::bitflags;
use euclid::default::{Point2D, Rect, Size2D, Vector2D};
use static_assertions::assert_not_impl_any;

use super::{Reconstrain, ReconstrainKey, ShellHandle, ShellImpl, ShellKind};
use crate::{
    backend::{Property, WmProtocols},
    error::{ProtocolError, Result},
    role::RoleId,
    state::Compositor,
    surface::SurfaceId,
    ClientEvent,
};

/// Describes where a popup is placed relative to it's parent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Positioner {
    /// The rectangle of the parent's window geometry the popup is anchored to.
    pub anchor_rect: Rect<i32>,

    pub size: Size2D<i32>,

    /// Offset of the popup from the anchor.
    pub offset: Vector2D<i32>,

    /// The popup is repositioned whenever the parent moves or resizes.
    pub reactive: bool,
}

impl Positioner {
    fn is_complete(&self) -> bool {
        self.size.width > 0 && self.size.height > 0
    }

    /// Returns the geometry of the popup relative to the parent's window geometry.
    fn geometry(&self) -> Rect<i32> {
        Rect::new(self.anchor_rect.origin + self.offset, self.size)
    }
}

/// The client's reference to a popup.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct PopupHandle(RoleId);

assert_not_impl_any!(PopupHandle: Clone, Copy);

impl PopupHandle {
    pub fn id(&self) -> RoleId {
        self.0
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    struct PopupFlags: u32 {
        const MAPPED = 1 << 0;

        /// A configure carrying a new position was sent.
        const ACK_POSITION = 1 << 1;

        /// The new position was acknowledged and is applied on the next commit.
        const PENDING_POSITION = 1 << 2;
    }
}

#[derive(Debug)]
pub(crate) struct Popup {
    flags: PopupFlags,
    parent: Option<RoleId>,
    reconstrain_key: Option<ReconstrainKey>,
    positioner: Positioner,

    conf_reply: bool,
    conf_serial: u32,
    position_serial: u32,

    /// Position relative to the parent's window geometry.
    position: Point2D<i32>,
    pending_position: Point2D<i32>,

    size: Size2D<i32>,
}

impl Compositor {
    /// Makes the shell surface a popup of another shell surface.
    ///
    /// A popup without a parent must be given one by other means before it can be placed. If the surface of the
    /// shell surface was destroyed, the popup is inert.
    pub fn get_popup(
        &mut self,
        shell: &ShellHandle,
        parent: Option<&ShellHandle>,
        positioner: Positioner,
    ) -> Result<PopupHandle> {
        let role = shell.id();
        let parent = parent.map(ShellHandle::id);

        if let Some(parent) = parent {
            let valid = parent != role
                && self
                    .shell_surface(parent)
                    .map_or(false, |shell| shell.imp.is_some());

            if !valid {
                return Err(ProtocolError::InvalidPopupParent);
            }
        }

        if !positioner.is_complete() {
            return Err(ProtocolError::IncompletePositioner);
        }

        if !self.shell_reserve(role, ShellKind::Popup)? {
            return Ok(PopupHandle(role));
        }

        let reconstrain_key = match parent {
            Some(parent) => {
                let key = self.shell_run_on_reconstrain(parent, role);
                self.retain_role(parent);
                key
            }

            None => None,
        };

        let popup = Popup {
            flags: PopupFlags::empty(),
            parent,
            reconstrain_key,
            positioner,
            conf_reply: false,
            conf_serial: 0,
            position_serial: 0,
            position: Point2D::zero(),
            pending_position: Point2D::zero(),
            size: Size2D::zero(),
        };

        self.shell_attach_impl(role, ShellImpl::Popup(popup));

        // The initial configure.
        self.popup_internal_reposition(role);

        Ok(PopupHandle(role))
    }

    pub fn destroy_popup(&mut self, handle: PopupHandle) {
        let role = handle.0;

        if self.popup(role).is_some() {
            self.shell_detach_impl(role);
        }
    }

    /// Places the popup with a new positioner.
    ///
    /// The client is told the token of the request before the new configure.
    pub fn reposition_popup(&mut self, handle: &PopupHandle, positioner: Positioner, token: u32) -> Result<()> {
        if !positioner.is_complete() {
            return Err(ProtocolError::IncompletePositioner);
        }

        let role = handle.0;

        let Some(popup) = self.popup_mut(role) else {
            return Ok(());
        };

        popup.positioner = positioner;

        self.events.push(ClientEvent::PopupRepositioned { role, token });
        self.popup_internal_reposition(role);
        Ok(())
    }

    /// Dismisses the popup, and optionally every popup it is a child of.
    pub fn dismiss_popup(&mut self, handle: &PopupHandle, include_parents: bool) {
        let mut next = Some(handle.0);

        while let Some(role) = next {
            let Some(popup) = self.popup(role) else {
                break;
            };

            let mapped = popup.flags.contains(PopupFlags::MAPPED);
            let parent = popup.parent;

            if mapped {
                self.popup_unmap(role);
            }

            tracing::debug!(?role, "Dismissed popup");
            self.events.push(ClientEvent::PopupDone { role });

            next = parent.filter(|_| include_parents);
        }
    }

    pub fn popup_mapped(&self, handle: &PopupHandle) -> bool {
        self.popup(handle.0)
            .map_or(false, |popup| popup.flags.contains(PopupFlags::MAPPED))
    }

    /// Returns the position of the popup relative to the parent's window geometry.
    pub fn popup_position(&self, handle: &PopupHandle) -> Option<Point2D<i32>> {
        self.popup(handle.0).map(|popup| popup.position)
    }

    fn popup(&self, role: RoleId) -> Option<&Popup> {
        match self.shell_surface(role)?.imp.as_ref()? {
            ShellImpl::Popup(popup) => Some(popup),
            ShellImpl::Toplevel(_) => None,
        }
    }

    fn popup_mut(&mut self, role: RoleId) -> Option<&mut Popup> {
        match self.shell_surface_mut(role)?.imp.as_mut()? {
            ShellImpl::Popup(popup) => Some(popup),
            ShellImpl::Toplevel(_) => None,
        }
    }

    pub(super) fn popup_attach(&mut self, role: RoleId) {
        let Some(window) = self.shell_window(role) else {
            return;
        };

        self.backend.change_property(window, Property::OverrideRedirect(true));
        self.backend
            .change_property(window, Property::WmProtocols(WmProtocols::SYNC_REQUEST));
    }

    pub(super) fn popup_detach(&mut self, role: RoleId) {
        let Some(popup) = self.popup_mut(role) else {
            return;
        };

        let mapped = popup.flags.contains(PopupFlags::MAPPED);
        let parent = popup.parent.take();
        let key = popup.reconstrain_key.take();

        if mapped {
            self.popup_unmap(role);
        }

        if let Some(parent) = parent {
            if let Some(key) = key {
                self.shell_cancel_reconstrain(parent, key);
            }

            self.release_role_ref(parent);
        }

        if let Some(window) = self.shell_window(role) {
            self.backend.change_property(window, Property::OverrideRedirect(false));
        }
    }

    pub(super) fn popup_commit(&mut self, role: RoleId, surface: SurfaceId) {
        let has_buffer = self
            .surfaces
            .get(surface)
            .map_or(false, |data| data.current.buffer.is_some());

        let Some(popup) = self.popup_mut(role) else {
            return;
        };

        let pending_position = popup.flags.contains(PopupFlags::PENDING_POSITION);
        popup.flags.remove(PopupFlags::PENDING_POSITION);

        let mapped = popup.flags.contains(PopupFlags::MAPPED);
        let conf_reply = popup.conf_reply;

        if pending_position {
            self.popup_move_window(role);
        }

        if !has_buffer {
            if mapped {
                self.popup_unmap(role);
            }
        } else if !conf_reply && !mapped {
            self.popup_map(role);
        }
    }

    pub(super) fn popup_ack_configure(&mut self, role: RoleId, serial: u32) {
        let Some(popup) = self.popup_mut(role) else {
            return;
        };

        if serial == popup.conf_serial {
            popup.conf_reply = false;
            popup.conf_serial = 0;
        }

        if serial == popup.position_serial && popup.flags.contains(PopupFlags::ACK_POSITION) {
            popup.position = popup.pending_position;
            popup.flags.remove(PopupFlags::ACK_POSITION);
            popup.flags.insert(PopupFlags::PENDING_POSITION);
            popup.position_serial = 0;
        }
    }

    pub(super) fn popup_note_size(&mut self, role: RoleId, size: Size2D<i32>) {
        if let Some(popup) = self.popup_mut(role) {
            popup.size = size;
        }
    }

    /// Called when the parent of the popup moved or resized.
    pub(super) fn popup_parent_reconstrained(&mut self, role: RoleId, reason: Reconstrain) {
        let Some(popup) = self.popup(role) else {
            return;
        };

        if popup.positioner.reactive {
            tracing::trace!(?role, ?reason, "Repositioning reactive popup");
            self.popup_internal_reposition(role);
        }
    }

    /// Moves the window so the popup sits at it's position relative to the parent's window geometry.
    pub(super) fn popup_move_window(&mut self, role: RoleId) {
        let Some(popup) = self.popup(role) else {
            return;
        };

        let Some(parent) = popup.parent else {
            return;
        };

        let position = popup.position;

        if self.role_surface(role).is_none() || self.role_surface(parent).is_none() {
            return;
        }

        let (Some(parent_geometry), Some(geometry), Some(window)) = (
            self.shell_current_geometry(parent),
            self.shell_current_geometry(role),
            self.shell_window(role),
        ) else {
            return;
        };

        let root = self.shell_current_root_position(parent);
        let origin = position + root.to_vector() + parent_geometry.origin.to_vector() - geometry.origin.to_vector();

        self.backend.move_window(window, origin);
    }

    fn popup_internal_reposition(&mut self, role: RoleId) {
        let Some(popup) = self.popup_mut(role) else {
            return;
        };

        // A popup without a parent has nothing to be placed relative to.
        if popup.parent.is_none() {
            return;
        }

        let geometry = popup.positioner.geometry();
        popup.pending_position = geometry.origin;

        self.popup_send_configure(role, geometry);
    }

    fn popup_send_configure(&mut self, role: RoleId, geometry: Rect<i32>) {
        let serial = self.next_serial();

        self.events.push(ClientEvent::PopupConfigure { role, geometry });

        if let Some(popup) = self.popup_mut(role) {
            popup.flags.insert(PopupFlags::ACK_POSITION);
        }

        self.shell_send_configure(role, serial);

        if let Some(popup) = self.popup_mut(role) {
            popup.conf_reply = true;
            popup.conf_serial = serial;
            popup.position_serial = serial;
        }
    }

    fn popup_map(&mut self, role: RoleId) {
        let (Some(root), Some(window)) = (self.role_root(role), self.shell_window(role)) else {
            return;
        };

        self.scene.garbage(root);

        if let Some(popup) = self.popup_mut(role) {
            popup.flags.insert(PopupFlags::MAPPED);
        }

        self.popup_move_window(role);
        self.backend.map_window(window);

        tracing::debug!(?role, %window, "Mapped popup");
    }

    fn popup_unmap(&mut self, role: RoleId) {
        if let Some(popup) = self.popup_mut(role) {
            popup.flags.remove(PopupFlags::MAPPED);
        }

        if let Some(window) = self.shell_window(role) {
            self.backend.unmap_window(window);
        }
    }
}
