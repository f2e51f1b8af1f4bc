//! A backend which draws nothing and records every request.
//!
//! The headless backend is used by the command line driver and by tests. Buffer idleness, content copies and the
//! frame clock are controlled by the caller.

use std::num::NonZeroU32;

use euclid::default::{Point2D, Rect, Size2D};
use rustc_hash::{FxHashMap, FxHashSet};

use super::{
    Backend, Capability, MoveResize, PingEvent, Property, RenderTarget, ShapeKind, WindowId, WindowKind, WmStateAction,
    WmStates,
};
use crate::buffer::BufferId;

/// A request the compositor made to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    CreateWindow { window: WindowId, kind: WindowKind, geometry: Rect<i32> },
    DestroyWindow(WindowId),
    MoveWindow { window: WindowId, position: Point2D<i32> },
    ResizeWindow { window: WindowId, size: Size2D<i32> },
    MapWindow(WindowId),
    UnmapWindow(WindowId),
    ChangeProperty { window: WindowId, property: Property },
    ChangeWmState { window: WindowId, action: WmStateAction, states: WmStates },
    IconifyWindow(WindowId),
    MoveResize { window: WindowId, op: MoveResize },
    SetShape { window: WindowId, kind: ShapeKind, rects: Vec<Rect<i32>> },
    CreateRenderTarget { window: WindowId, target: RenderTarget },
    DestroyRenderTarget(RenderTarget),
    StartFrame(WindowId),
    ReplyPing { window: WindowId, event: PingEvent },
}

#[derive(Debug)]
pub struct HeadlessWindow {
    pub kind: WindowKind,
    pub geometry: Rect<i32>,
    pub mapped: bool,
    pub properties: Vec<Property>,
}

#[derive(Debug)]
pub struct HeadlessBackend {
    next_id: NonZeroU32,
    windows: FxHashMap<WindowId, HeadlessWindow>,
    busy: FxHashSet<BufferId>,
    copied: FxHashSet<BufferId>,
    frame_clock: bool,
    capabilities: FxHashSet<Capability>,
    pointer_grab: bool,
    clock_us: u64,
    requests: Vec<Request>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            next_id: NonZeroU32::MIN,
            windows: FxHashMap::default(),
            busy: FxHashSet::default(),
            copied: FxHashSet::default(),
            frame_clock: false,
            capabilities: [
                Capability::FrameSync,
                Capability::WmMaximize,
                Capability::WmFullscreen,
                Capability::WmWindowMenu,
            ]
            .into_iter()
            .collect(),
            pointer_grab: true,
            clock_us: 0,
            requests: Vec::new(),
        }
    }

    /// Enables the asynchronous frame clock.
    ///
    /// When enabled, frames drawn for mapped windows complete only once the caller reports them through
    /// [`Compositor::frame_drawn`](crate::state::Compositor::frame_drawn).
    pub fn set_frame_clock(&mut self, enabled: bool) {
        self.frame_clock = enabled;
    }

    pub fn set_frame_sync(&mut self, supported: bool) {
        self.set_capability(Capability::FrameSync, supported);
    }

    /// Every capability is supported unless turned off.
    pub fn set_capability(&mut self, capability: Capability, supported: bool) {
        if supported {
            self.capabilities.insert(capability);
        } else {
            self.capabilities.remove(&capability);
        }
    }

    /// Whether interactive moves and resizes can be started.
    pub fn set_pointer_grab(&mut self, available: bool) {
        self.pointer_grab = available;
    }

    /// Marks a buffer as still being read by the renderer.
    pub fn set_busy(&mut self, buffer: BufferId, busy: bool) {
        if busy {
            self.busy.insert(buffer);
        } else {
            self.busy.remove(&buffer);
        }
    }

    /// Marks a buffer as copied by the renderer, allowing it to be released right after commit.
    pub fn set_copied(&mut self, buffer: BufferId, copied: bool) {
        if copied {
            self.copied.insert(buffer);
        } else {
            self.copied.remove(&buffer);
        }
    }

    pub fn advance(&mut self, us: u64) {
        self.clock_us += us;
    }

    pub fn window(&self, window: WindowId) -> Option<&HeadlessWindow> {
        self.windows.get(&window)
    }

    pub fn windows(&self) -> impl Iterator<Item = (WindowId, &HeadlessWindow)> {
        self.windows.iter().map(|(&id, window)| (id, window))
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn drain_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests)
    }

    fn next_id(&mut self) -> NonZeroU32 {
        let id = self.next_id;
        self.next_id = id.checked_add(1).unwrap_or(NonZeroU32::MIN);
        id
    }
}

impl Backend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_window(&mut self, kind: WindowKind, geometry: Rect<i32>) -> WindowId {
        let window = WindowId(self.next_id());
        self.windows.insert(
            window,
            HeadlessWindow {
                kind,
                geometry,
                mapped: false,
                properties: Vec::new(),
            },
        );
        self.requests.push(Request::CreateWindow { window, kind, geometry });
        window
    }

    fn destroy_window(&mut self, window: WindowId) {
        self.windows.remove(&window);
        self.requests.push(Request::DestroyWindow(window));
    }

    fn move_window(&mut self, window: WindowId, position: Point2D<i32>) {
        if let Some(state) = self.windows.get_mut(&window) {
            state.geometry.origin = position;
        }

        self.requests.push(Request::MoveWindow { window, position });
    }

    fn resize_window(&mut self, window: WindowId, size: Size2D<i32>) {
        if let Some(state) = self.windows.get_mut(&window) {
            state.geometry.size = size;
        }

        self.requests.push(Request::ResizeWindow { window, size });
    }

    fn map_window(&mut self, window: WindowId) {
        if let Some(state) = self.windows.get_mut(&window) {
            state.mapped = true;
        }

        self.requests.push(Request::MapWindow(window));
    }

    fn unmap_window(&mut self, window: WindowId) {
        if let Some(state) = self.windows.get_mut(&window) {
            state.mapped = false;
        }

        self.requests.push(Request::UnmapWindow(window));
    }

    fn change_property(&mut self, window: WindowId, property: Property) {
        if let Some(state) = self.windows.get_mut(&window) {
            // Replace any earlier value of the same property.
            state
                .properties
                .retain(|existing| std::mem::discriminant(existing) != std::mem::discriminant(&property));
            state.properties.push(property.clone());
        }

        self.requests.push(Request::ChangeProperty { window, property });
    }

    fn change_wm_state(&mut self, window: WindowId, action: WmStateAction, states: WmStates) {
        self.requests.push(Request::ChangeWmState { window, action, states });
    }

    fn iconify_window(&mut self, window: WindowId) {
        self.requests.push(Request::IconifyWindow(window));
    }

    fn begin_move_resize(&mut self, window: WindowId, op: MoveResize) -> bool {
        self.requests.push(Request::MoveResize { window, op });
        self.pointer_grab
    }

    fn set_shape(&mut self, window: WindowId, kind: ShapeKind, rects: &[Rect<i32>]) {
        self.requests.push(Request::SetShape {
            window,
            kind,
            rects: rects.to_vec(),
        });
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    fn root_position(&self, window: WindowId) -> Point2D<i32> {
        self.windows
            .get(&window)
            .map(|state| state.geometry.origin)
            .unwrap_or_else(Point2D::zero)
    }

    fn create_render_target(&mut self, window: WindowId) -> RenderTarget {
        let target = RenderTarget(self.next_id());
        self.requests.push(Request::CreateRenderTarget { window, target });
        target
    }

    fn destroy_render_target(&mut self, target: RenderTarget) {
        self.requests.push(Request::DestroyRenderTarget(target));
    }

    fn is_buffer_idle(&self, buffer: BufferId, _target: RenderTarget) -> bool {
        !self.busy.contains(&buffer)
    }

    fn can_release_now(&self, buffer: BufferId) -> bool {
        self.copied.contains(&buffer)
    }

    fn start_frame(&mut self, window: WindowId, _target: RenderTarget) -> bool {
        self.requests.push(Request::StartFrame(window));
        self.frame_clock && self.windows.get(&window).map_or(false, |state| state.mapped)
    }

    fn reply_ping(&mut self, window: WindowId, event: PingEvent) {
        self.requests.push(Request::ReplyPing { window, event });
    }

    fn now_us(&self) -> u64 {
        self.clock_us
    }
}
