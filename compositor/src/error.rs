//! Errors posted to clients.
//!
//! Every variant of [`ProtocolError`] is fatal to the client which made the offending request. The protocol layer
//! posts the error on the object returned by [`ProtocolError::interface`] using [`ProtocolError::code`], which
//! terminates the client.

use crate::role::RoleType;

/// A fatal error caused by a client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The surface already has a role attached.
    #[error("surface already has attached role")]
    RoleAlreadyAttached,

    /// The surface once held a role of a different type.
    #[error("surface previously held a {previous} role and cannot become a {requested}")]
    RoleTypeMismatch { previous: RoleType, requested: RoleType },

    /// The parent of a subsurface was the surface itself.
    #[error("surface cannot be its own parent")]
    SelfParent,

    /// The parent of a subsurface is a descendant of the surface.
    #[error("parent is a descendant of the surface")]
    AncestorCycle,

    /// The surface used for restacking is not a sibling or the parent.
    #[error("surface is not a sibling or the parent")]
    NotSibling,

    /// An acknowledged serial was not greater than the last acknowledged serial.
    #[error("same serial specified twice (serial {serial}, last acknowledged {last})")]
    InvalidSerial { serial: u32, last: u32 },

    /// A shell surface was destroyed before it's toplevel or popup.
    #[error("trying to destroy xdg surface with role")]
    DestroyedWithRole,

    /// A shell surface tried to become both a toplevel and a popup.
    #[error("surface was previously a {0}")]
    ShellTypeMismatch(&'static str),

    /// A shell surface tried to attach a second toplevel or popup.
    #[error("xdg surface already has a role object")]
    AlreadyConstructed,

    /// Negative minimum or maximum size.
    #[error("invalid {which} size {width} {height}")]
    InvalidSize {
        which: &'static str,
        width: i32,
        height: i32,
    },

    /// Setting the parent of a toplevel would make it an ancestor of itself.
    #[error("trying to set parent in a circular fashion")]
    InvalidParent,

    /// Not a value of `xdg_toplevel.resize_edge`.
    #[error("{0} is not a resize edge")]
    InvalidResizeEdge(u32),

    /// A toplevel tried to create a second decoration object.
    #[error("the given toplevel already has a decoration object")]
    DecorationAlreadyConstructed,

    /// A decoration object was created for a toplevel which already has a buffer.
    #[error("given toplevel already has attached buffer")]
    UnconfiguredBuffer,

    /// The parent of a popup is not a shell surface with a toplevel or popup.
    #[error("popup parent is not a valid xdg surface")]
    InvalidPopupParent,

    /// A popup was positioned without a size or an anchor rectangle.
    #[error("positioner is incomplete")]
    IncompletePositioner,

    /// Allocation failed while servicing the request.
    #[error("out of memory")]
    NoMemory,
}

impl ProtocolError {
    /// The interface of the object the error is posted on.
    pub fn interface(&self) -> &'static str {
        match self {
            Self::RoleAlreadyAttached | Self::RoleTypeMismatch { .. } => "wl_surface",
            Self::SelfParent | Self::AncestorCycle => "wl_subcompositor",
            Self::NotSibling => "wl_subsurface",
            Self::InvalidSerial { .. } | Self::DestroyedWithRole | Self::AlreadyConstructed => "xdg_surface",
            Self::ShellTypeMismatch(_) | Self::InvalidPopupParent | Self::IncompletePositioner => "xdg_wm_base",
            Self::InvalidSize { .. } | Self::InvalidParent | Self::InvalidResizeEdge(_) => "xdg_toplevel",
            Self::DecorationAlreadyConstructed | Self::UnconfiguredBuffer => "zxdg_toplevel_decoration_v1",
            Self::NoMemory => "wl_display",
        }
    }

    /// The wire error code on [`ProtocolError::interface`].
    pub fn code(&self) -> u32 {
        match self {
            // wl_surface has no role error of it's own, so the subcompositor's bad_surface is used.
            Self::RoleAlreadyAttached | Self::RoleTypeMismatch { .. } => 0,
            // wl_subcompositor.bad_parent
            Self::SelfParent | Self::AncestorCycle => 1,
            // wl_subsurface.bad_surface
            Self::NotSibling => 0,
            // xdg_surface.defunct_role_object
            Self::DestroyedWithRole => 1,
            // xdg_surface.already_constructed
            Self::AlreadyConstructed => 2,
            // xdg_surface.invalid_serial
            Self::InvalidSerial { .. } => 5,
            // xdg_wm_base.role
            Self::ShellTypeMismatch(_) => 0,
            // xdg_wm_base.invalid_popup_parent
            Self::InvalidPopupParent => 3,
            // xdg_wm_base.invalid_positioner
            Self::IncompletePositioner => 5,
            // xdg_toplevel.invalid_size
            Self::InvalidSize { .. } => 2,
            // xdg_toplevel.invalid_parent
            Self::InvalidParent => 1,
            // xdg_toplevel.invalid_resize_edge
            Self::InvalidResizeEdge(_) => 0,
            // zxdg_toplevel_decoration_v1.unconfigured_buffer
            Self::UnconfiguredBuffer => 0,
            // zxdg_toplevel_decoration_v1.already_constructed
            Self::DecorationAlreadyConstructed => 1,
            // wl_display.no_memory
            Self::NoMemory => 2,
        }
    }
}

pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;
