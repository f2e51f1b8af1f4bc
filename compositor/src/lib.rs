//! Surface roles of an X11 backed Wayland compositor.
//!
//! Every Wayland surface displayed by the compositor is given a role. Roles which stand on their own, drag icons
//! and shell surfaces, own a window created through the [`Backend`](backend::Backend). Subsurfaces are drawn into
//! the window of the role at the root of their tree.
//!
//! The [`Compositor`] receives client requests and backend events as method calls. Nothing here speaks the wire
//! protocol: events for clients are queued as [`ClientEvent`]s, and requests which violate the protocol return a
//! [`ProtocolError`] the caller posts to the client.

pub mod action;
pub mod backend;
pub mod buffer;
mod buffer_release;
mod config;
pub mod error;
pub mod forest;
pub mod icon_surface;
pub mod role;
pub mod scene;
pub mod shell;
pub mod state;
pub mod subsurface;
pub mod surface;
pub mod sync;

pub use config::Config;
pub use error::ProtocolError;
pub use icon_surface::IconHandle;
pub use shell::{
    DecorationHandle, DecorationMode, PopupHandle, Positioner, ShellHandle, ToplevelHandle, ToplevelStates, WmBaseId,
    WmCapabilities,
};
pub use state::{ClientEvent, Compositor};
pub use subsurface::SubsurfaceHandle;
