pub mod headless;

use std::{fmt, num::NonZeroU32};

use bitflags::bitflags;
use downcast_rs::{impl_downcast, Downcast};
use euclid::default::{Point2D, Rect, Size2D};

use crate::buffer::BufferId;

/// Identifies a window created by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId(pub NonZeroU32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Identifies the render target the backend draws a window's contents into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RenderTarget(pub NonZeroU32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// A window placed and decorated by the window manager.
    Managed,

    /// A window the window manager ignores, used for drag icons.
    OverrideRedirect,
}

bitflags! {
    /// Protocols a managed window participates in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WmProtocols: u32 {
        const DELETE_WINDOW = 1 << 0;
        const PING = 1 << 1;
        const SYNC_REQUEST = 1 << 2;
    }
}

/// Size hints given to the window manager.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SizeHints {
    pub min: Option<Size2D<i32>>,
    pub max: Option<Size2D<i32>>,
}

bitflags! {
    /// Window manager states of a window, as listed in `_NET_WM_STATE`.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WmStates: u32 {
        /// Either of the horizontal or vertical maximized states.
        const MAXIMIZED = 1 << 0;
        const FULLSCREEN = 1 << 1;
        const FOCUSED = 1 << 2;
    }
}

bitflags! {
    /// Actions the window manager allows on a window, as listed in `_NET_WM_ALLOWED_ACTIONS`.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AllowedActions: u32 {
        const MAXIMIZE = 1 << 0;
        const FULLSCREEN = 1 << 1;
        const MINIMIZE = 1 << 2;
    }
}

/// How a `_NET_WM_STATE` request changes the listed states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WmStateAction {
    Remove,
    Add,
}

/// The edge or corner of a window dragged by an interactive resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeEdge {
    None,
    Top,
    Bottom,
    Left,
    TopLeft,
    BottomLeft,
    Right,
    TopRight,
    BottomRight,
}

impl ResizeEdge {
    /// Converts an `xdg_toplevel.resize_edge` value.
    pub fn from_wire(edge: u32) -> Option<Self> {
        Some(match edge {
            0 => Self::None,
            1 => Self::Top,
            2 => Self::Bottom,
            4 => Self::Left,
            5 => Self::TopLeft,
            6 => Self::BottomLeft,
            8 => Self::Right,
            9 => Self::TopRight,
            10 => Self::BottomRight,
            _ => return None,
        })
    }
}

/// An interactive operation the window manager performs with the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveResize {
    Move,
    Resize(ResizeEdge),
}

/// A window property written by the compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    /// Extents of the client side decorations, in the order left, right, top, bottom.
    GtkFrameExtents { left: i32, right: i32, top: i32, bottom: i32 },

    NormalHints(SizeHints),

    /// Asks a compositing manager to not composite the window.
    BypassCompositor(u32),

    WmProtocols(WmProtocols),

    OverrideRedirect(bool),

    /// `_NET_WM_NAME`, in UTF-8.
    NetWmName(String),

    /// `WM_NAME`, in Latin-1 for older window managers and pagers.
    WmName(String),

    WmClass { instance: String, class: String },

    /// `None` deletes the property.
    WmTransientFor(Option<WindowId>),

    /// The decorations field of `_MOTIF_WM_HINTS`.
    MotifWmHints { decorated: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Input,
    Bounding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The backend supports the frame synchronization protocol used for interactive resize.
    FrameSync,

    /// The window manager supports maximizing windows.
    WmMaximize,

    WmFullscreen,

    /// The window manager can show a window menu on behalf of the client.
    WmWindowMenu,
}

/// A configure notification the windowing system delivered for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigureEvent {
    pub position: Point2D<i32>,
    pub size: Size2D<i32>,

    /// The event was sent by the window manager rather than generated by the windowing system.
    pub synthetic: bool,
}

/// A liveness check the window manager sent to a window.
///
/// The event is handed back to [`Backend::reply_ping`] once the client answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingEvent {
    pub timestamp: u32,
}

/// A trait specifying the implementation of a backend.
///
/// The backend owns the windows, the render targets and the frame clock. The compositor only asks it to act on
/// those and never receives windowing-system events through this trait; events are delivered through the backend
/// event entry points on [`Compositor`](crate::state::Compositor).
pub trait Backend: fmt::Debug + Downcast {
    /// Returns the name of the backend.
    ///
    /// This should be a lowercase string.
    fn name(&self) -> &str;

    fn create_window(&mut self, kind: WindowKind, geometry: Rect<i32>) -> WindowId;

    fn destroy_window(&mut self, window: WindowId);

    fn move_window(&mut self, window: WindowId, position: Point2D<i32>);

    fn resize_window(&mut self, window: WindowId, size: Size2D<i32>);

    fn map_window(&mut self, window: WindowId);

    fn unmap_window(&mut self, window: WindowId);

    fn change_property(&mut self, window: WindowId, property: Property);

    /// Asks the window manager to add or remove window manager states.
    fn change_wm_state(&mut self, window: WindowId, action: WmStateAction, states: WmStates);

    fn iconify_window(&mut self, window: WindowId);

    /// Hands the pointer to the window manager for an interactive move or resize.
    ///
    /// Returns false if the operation could not be started. Otherwise the end of a resize is reported through
    /// [`Compositor::resize_done`](crate::state::Compositor::resize_done).
    fn begin_move_resize(&mut self, window: WindowId, op: MoveResize) -> bool;

    fn set_shape(&mut self, window: WindowId, kind: ShapeKind, rects: &[Rect<i32>]);

    fn supports(&self, capability: Capability) -> bool;

    /// Returns the position of the window relative to the root window.
    fn root_position(&self, window: WindowId) -> Point2D<i32>;

    fn create_render_target(&mut self, window: WindowId) -> RenderTarget;

    fn destroy_render_target(&mut self, target: RenderTarget);

    /// Returns true if the renderer no longer reads from the buffer when drawing to the target.
    fn is_buffer_idle(&self, buffer: BufferId, target: RenderTarget) -> bool;

    /// Returns true if the renderer copied the buffer contents, so the buffer may be released right after commit.
    fn can_release_now(&self, buffer: BufferId) -> bool;

    /// Draws the window contents.
    ///
    /// Returns true if the frame is presented asynchronously. The backend must later report completion through
    /// [`Compositor::frame_drawn`](crate::state::Compositor::frame_drawn). Returns false if the frame completed
    /// immediately.
    fn start_frame(&mut self, window: WindowId, target: RenderTarget) -> bool;

    /// Answers a liveness check of the window manager.
    fn reply_ping(&mut self, window: WindowId, event: PingEvent);

    /// Monotonic time in microseconds.
    fn now_us(&self) -> u64;
}

impl_downcast!(Backend);
