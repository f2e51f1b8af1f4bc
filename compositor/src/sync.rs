//! Frame synchronization
//!
//! Every role which owns a window draws through a [`FrameSync`]. An update recomputes the bounds of the view tree,
//! lets the role resize and move it's window, then asks the backend to draw a frame. While a frame is in flight,
//! further updates are coalesced into a single update which runs once the frame completes. Frame callbacks run
//! when a frame completes without another update pending.
//!
//! ```text
//!  update ---> [idle] --start--> [started] --frame drawn--> frame callbacks
//!                                   |  ^
//!                            update |  | frame drawn
//!                                   v  |
//!                                [pending] --> start again
//! ```
//!
//! Frame times are microsecond timestamps whose millisecond part is confined to 32 bits, since clients receive
//! frame times as 32 bit millisecond values. Comparisons between frame times handle wraparound.

use std::mem;

use bitflags::bitflags;

use crate::{backend::WindowId, role::RoleId, role::RoleSlot, state::Compositor};

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FrameFlags: u32 {
        /// A frame was started and has not completed.
        const STARTED = 1 << 0;

        /// An update arrived while a frame was in flight.
        const PENDING = 1 << 1;

        /// The frame in flight is synchronized to the frame clock of the backend.
        const SYNCHRONIZED = 1 << 2;

        /// The window manager froze the frame clock to resize the window.
        const RESIZE = 1 << 3;
    }
}

#[derive(Debug)]
pub struct FrameSync {
    flags: FrameFlags,

    /// The last frame time handed out, in microseconds.
    server_time: u64,

    /// When the last frame time was computed, in microseconds of the backend clock.
    arrival_time: u64,

    /// Configure notifications seen by the window.
    configure_events: u32,
}

impl FrameSync {
    pub fn new(now_us: u64) -> Self {
        Self {
            flags: FrameFlags::empty(),
            server_time: 0,
            arrival_time: now_us,
            configure_events: 0,
        }
    }

    pub fn flags(&self) -> FrameFlags {
        self.flags
    }

    pub fn configure_events(&self) -> u32 {
        self.configure_events
    }

    /// Computes the time of a completed frame.
    ///
    /// A frame time reported by the backend is used if it is newer than the last frame time. Otherwise the last
    /// frame time is advanced by the time passed since it was computed, so frame times never go backwards.
    pub fn consider_frame_time(&mut self, frame_time_us: Option<u64>, now_us: u64) -> u64 {
        let previous_arrival = mem::replace(&mut self.arrival_time, now_us);

        self.server_time = match frame_time_us {
            Some(time) if timestamp_greater_than(time, self.server_time) => confine_time(time),
            _ => confine_time(
                self.server_time
                    .wrapping_add(now_us.saturating_sub(previous_arrival)),
            ),
        };

        self.server_time
    }
}

/// Confines the millisecond part of a microsecond time to 32 bits.
pub fn confine_time(time: u64) -> u64 {
    let milliseconds = (time / 1000) as u32;
    u64::from(milliseconds) * 1000 + time % 1000
}

/// Returns whether `a` is later than `b`, treating the millisecond parts as wrapping 32 bit values.
pub fn timestamp_greater_than(a: u64, b: u64) -> bool {
    let ms_a = (a / 1000) as u32;
    let ms_b = (b / 1000) as u32;

    if ms_a == ms_b {
        return a % 1000 > b % 1000;
    }

    ms_b.wrapping_sub(ms_a) > u32::MAX / 2
}

impl Compositor {
    /// Returns the frame synchronization state of a role which owns a window.
    pub fn frame_sync(&self, role: RoleId) -> Option<&FrameSync> {
        self.roles.get(role).and_then(RoleSlot::backing).map(|backing| &backing.sync)
    }

    fn frame_sync_mut(&mut self, role: RoleId) -> Option<&mut FrameSync> {
        self.roles
            .get_mut(role)
            .and_then(RoleSlot::backing_mut)
            .map(|backing| &mut backing.sync)
    }

    /// Draws the window of the role, or schedules a draw once the frame in flight completes.
    pub(crate) fn sync_update(&mut self, role: RoleId) {
        let Some(sync) = self.frame_sync_mut(role) else {
            return;
        };

        if sync.flags.contains(FrameFlags::STARTED) {
            sync.flags.insert(FrameFlags::PENDING);
            tracing::trace!(?role, "Deferring update until the frame in flight completes");
            return;
        }

        self.sync_draw(role);
    }

    /// Runs the frame callbacks of the role now.
    ///
    /// Used while the role withholds updates, so a client waiting for a frame callback before it commits the
    /// reply to a configure cannot deadlock.
    pub(crate) fn sync_check_frame_callback(&mut self, role: RoleId) {
        let now = self.backend.now_us();

        let Some(sync) = self.frame_sync_mut(role) else {
            return;
        };

        let time = sync.consider_frame_time(None, now);
        self.role_frame_callback(role, (time / 1000) as u32);
    }

    /// Drops an update waiting for the frame in flight.
    pub(crate) fn sync_clear_pending_frame(&mut self, role: RoleId) {
        if let Some(sync) = self.frame_sync_mut(role) {
            sync.flags.remove(FrameFlags::PENDING);
        }
    }

    pub(crate) fn sync_note_configure_event(&mut self, role: RoleId) {
        if let Some(sync) = self.frame_sync_mut(role) {
            sync.configure_events = sync.configure_events.wrapping_add(1);
        }
    }

    /// Called by the backend when the frame started for the window was presented.
    pub fn frame_drawn(&mut self, window: WindowId, time_us: u64) {
        let Some(role) = self.role_for_window(window) else {
            tracing::trace!(%window, "Frame drawn for unknown window");
            return;
        };

        let started = self
            .frame_sync(role)
            .map_or(false, |sync| sync.flags.contains(FrameFlags::STARTED));

        if !started {
            tracing::trace!(%window, "Frame drawn without a frame in flight");
            return;
        }

        self.sync_frame_completed(role, Some(time_us));
    }

    /// Called by the backend when the window manager asks to synchronize the next frame with a resize.
    pub fn sync_request(&mut self, window: WindowId) {
        let Some(role) = self.role_for_window(window) else {
            return;
        };

        let Some(sync) = self.frame_sync_mut(role) else {
            return;
        };

        sync.flags.remove(FrameFlags::PENDING);
        sync.flags.insert(FrameFlags::RESIZE);

        tracing::debug!(%window, "Frame clock frozen for resize");
        self.role_handle_resize(role, false);
    }

    fn sync_draw(&mut self, role: RoleId) {
        let Some(backing) = self.roles.get(role).and_then(RoleSlot::backing) else {
            return;
        };

        let (window, target, root) = (backing.window, backing.target, backing.root);

        let bounds = self.scene.bounds(root);
        self.role_note_bounds(role, bounds);

        let garbage = self.scene.take_garbage(root);

        if !self.scene.has_content(root) {
            tracing::trace!(?role, "Nothing to draw");
            self.sync_frame_completed(role, None);
            return;
        }

        tracing::trace!(?role, %window, garbage, "Starting frame");

        if self.backend.start_frame(window, target) {
            if let Some(sync) = self.frame_sync_mut(role) {
                sync.flags.insert(FrameFlags::STARTED | FrameFlags::SYNCHRONIZED);
                sync.flags.remove(FrameFlags::RESIZE);
            }
        } else {
            self.sync_frame_completed(role, None);
        }
    }

    fn sync_frame_completed(&mut self, role: RoleId, frame_time_us: Option<u64>) {
        let now = self.backend.now_us();

        let Some(sync) = self.frame_sync_mut(role) else {
            return;
        };

        sync.flags.remove(FrameFlags::STARTED | FrameFlags::SYNCHRONIZED);
        let time = sync.consider_frame_time(frame_time_us, now);

        if sync.flags.contains(FrameFlags::PENDING) {
            sync.flags.remove(FrameFlags::PENDING);
            self.sync_draw(role);
        } else {
            self.role_frame_callback(role, (time / 1000) as u32);
        }
    }
}
