//! Surfaces and the commit pipeline
//!
//! Every surface carries three copies of it's state. Requests write the pending state. A commit moves the
//! pending state into the current state, unless the role of the surface refuses the commit. A refused commit is
//! folded into the cached state, which is applied later on behalf of the surface (for example when the parent of
//! a synchronous subsurface commits).
//!
//! ```text
//! requests ---> pending ---commit---> current
//!                  |                     ^
//!                  | refused             | parent commit
//!                  v                     |
//!                cached -----------------/
//! ```
//!
//! Applying a state runs these steps in order:
//!
//! 1. Replace the buffer, releasing the replaced buffer through the role.
//! 2. Apply the attach offset, buffer scale, regions and damage, and queue the frame callbacks.
//! 3. Run the commit callbacks of the child subsurfaces in creation order.
//! 4. Run the restacking actions queued on the surface.
//! 5. Run the commit hook of the role.
//! 6. Release the buffer early if the renderer already copied it.

use std::{mem, num::NonZeroU64};

use bitflags::bitflags;
use euclid::default::{Rect, Size2D, Vector2D};
use slotmap::new_key_type;

use crate::{
    action::ActionId,
    buffer::BufferId,
    role::{RoleId, RoleType},
    scene::ViewIndex,
    state::Compositor,
    ClientEvent,
};

new_key_type! {
    pub struct SurfaceId;
}

/// Identifies a frame callback requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackId(pub NonZeroU64);

bitflags! {
    /// Which parts of a [`State`] were set by the client.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PendingFlags: u32 {
        const BUFFER = 1 << 0;
        const OFFSET = 1 << 1;
        const SCALE = 1 << 2;
        const DAMAGE = 1 << 3;
        const INPUT_REGION = 1 << 4;
        const OPAQUE_REGION = 1 << 5;
        const FRAME_CALLBACKS = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) struct SurfaceFlags: u32 {
        /// The current buffer was released right after it was committed.
        const BUFFER_ALREADY_RELEASED = 1 << 0;
    }
}

/// Double buffered surface state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    /// The fields set since the state was last applied.
    ///
    /// On the current state these are the fields applied by the last commit.
    pub flags: PendingFlags,
    pub buffer: Option<BufferId>,
    pub offset: Vector2D<i32>,
    pub scale: i32,
    pub damage: Vec<Rect<i32>>,
    /// `None` accepts input everywhere.
    pub input_region: Option<Vec<Rect<i32>>>,
    pub opaque_region: Vec<Rect<i32>>,
    pub frame_callbacks: Vec<CallbackId>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            flags: PendingFlags::empty(),
            buffer: None,
            offset: Vector2D::zero(),
            scale: 1,
            damage: Vec::new(),
            input_region: None,
            opaque_region: Vec::new(),
            frame_callbacks: Vec::new(),
        }
    }
}

impl State {
    /// Folds a newer state on top of this one.
    ///
    /// Returns the buffer which was set on this state and is replaced by the buffer of the newer state.
    pub fn merge(&mut self, newer: State) -> Option<BufferId> {
        let mut displaced = None;

        if newer.flags.contains(PendingFlags::BUFFER) {
            if self.flags.contains(PendingFlags::BUFFER) && self.buffer != newer.buffer {
                displaced = self.buffer;
            }

            self.buffer = newer.buffer;
        }

        if newer.flags.contains(PendingFlags::OFFSET) {
            // Attach offsets are relative to the previous attach.
            self.offset += newer.offset;
        }

        if newer.flags.contains(PendingFlags::SCALE) {
            self.scale = newer.scale;
        }

        if newer.flags.contains(PendingFlags::DAMAGE) {
            self.damage.extend(newer.damage);
        }

        if newer.flags.contains(PendingFlags::INPUT_REGION) {
            self.input_region = newer.input_region;
        }

        if newer.flags.contains(PendingFlags::OPAQUE_REGION) {
            self.opaque_region = newer.opaque_region;
        }

        if newer.flags.contains(PendingFlags::FRAME_CALLBACKS) {
            self.frame_callbacks.extend(newer.frame_callbacks);
        }

        self.flags |= newer.flags;
        displaced
    }
}

#[derive(Debug)]
pub(crate) struct Surface {
    pub(crate) pending: State,
    pub(crate) cached: State,
    pub(crate) current: State,

    /// The attached role.
    pub(crate) role: Option<RoleId>,

    /// The type of the first role ever attached. A surface may never hold a role of another type.
    pub(crate) role_type: Option<RoleType>,

    /// Subsurface roles of the children, in creation order.
    ///
    /// The commit callbacks of the children run in this order.
    pub(crate) subsurfaces: Vec<RoleId>,

    /// Restacking actions queued on this surface as a parent, newest first.
    pub(crate) actions: Vec<ActionId>,

    /// Actions on other queues which are placed relative to this surface.
    pub(crate) targeted_by: Vec<ActionId>,

    pub(crate) view: ViewIndex,
    pub(crate) under: ViewIndex,
    pub(crate) flags: SurfaceFlags,
}

impl Compositor {
    pub fn create_surface(&mut self) -> SurfaceId {
        self.surfaces.insert_with_key(|id| {
            let (view, under) = self.scene.create_surface_views(id);

            Surface {
                pending: State::default(),
                cached: State::default(),
                current: State::default(),
                role: None,
                role_type: None,
                subsurfaces: Vec::new(),
                actions: Vec::new(),
                targeted_by: Vec::new(),
                view,
                under,
                flags: SurfaceFlags::empty(),
            }
        })
    }

    /// Attaches a buffer, or detaches the buffer if `buffer` is `None`.
    pub fn attach(&mut self, surface: SurfaceId, buffer: Option<BufferId>, dx: i32, dy: i32) {
        let Some(surface) = self.surfaces.get_mut(surface) else {
            return;
        };

        let pending = &mut surface.pending;
        pending.buffer = buffer;
        pending.offset = Vector2D::new(dx, dy);
        pending.flags |= PendingFlags::BUFFER | PendingFlags::OFFSET;
    }

    pub fn damage(&mut self, surface: SurfaceId, rect: Rect<i32>) {
        let Some(surface) = self.surfaces.get_mut(surface) else {
            return;
        };

        surface.pending.damage.push(rect);
        surface.pending.flags |= PendingFlags::DAMAGE;
    }

    /// Requests a frame callback, fired once the next committed state was presented.
    pub fn frame(&mut self, surface: SurfaceId) -> CallbackId {
        let callback = CallbackId(self.next_callback);
        self.next_callback = self.next_callback.checked_add(1).unwrap_or(NonZeroU64::MIN);

        if let Some(surface) = self.surfaces.get_mut(surface) {
            surface.pending.frame_callbacks.push(callback);
            surface.pending.flags |= PendingFlags::FRAME_CALLBACKS;
        }

        callback
    }

    pub fn set_buffer_scale(&mut self, surface: SurfaceId, scale: i32) {
        if scale < 1 {
            tracing::warn!(?surface, scale, "Ignoring invalid buffer scale");
            return;
        }

        let Some(surface) = self.surfaces.get_mut(surface) else {
            return;
        };

        surface.pending.scale = scale;
        surface.pending.flags |= PendingFlags::SCALE;
    }

    /// Sets the input region. `None` accepts input on the whole surface.
    pub fn set_input_region(&mut self, surface: SurfaceId, region: Option<Vec<Rect<i32>>>) {
        let Some(surface) = self.surfaces.get_mut(surface) else {
            return;
        };

        surface.pending.input_region = region;
        surface.pending.flags |= PendingFlags::INPUT_REGION;
    }

    pub fn set_opaque_region(&mut self, surface: SurfaceId, region: Vec<Rect<i32>>) {
        let Some(surface) = self.surfaces.get_mut(surface) else {
            return;
        };

        surface.pending.opaque_region = region;
        surface.pending.flags |= PendingFlags::OPAQUE_REGION;
    }

    pub fn commit(&mut self, surface: SurfaceId) {
        let Some(role) = self.surfaces.get(surface).map(|data| data.role) else {
            tracing::trace!(?surface, "Commit on dead surface");
            return;
        };

        if let Some(role) = role {
            if !self.role_early_commit(role, surface) {
                self.cache_pending_state(surface);
                return;
            }
        }

        self.apply_state(surface, false);
    }

    /// Applies the cached state of the surface.
    pub(crate) fn commit_cached(&mut self, surface: SurfaceId) {
        self.apply_state(surface, true);
    }

    pub fn destroy_surface(&mut self, surface: SurfaceId) {
        if !self.surfaces.contains_key(surface) {
            return;
        }

        self.release_role(surface);

        let children = self
            .surfaces
            .get_mut(surface)
            .map(|data| mem::take(&mut data.subsurfaces))
            .unwrap_or_default();

        for child in children {
            self.subsurface_parent_destroyed(child);
        }

        self.free_action_queue(surface);
        self.cancel_actions_targeting(surface);

        if let Some(data) = self.surfaces.remove(surface) {
            self.scene.destroy(data.view);
            self.scene.destroy(data.under);
        }

        tracing::debug!(?surface, "Destroyed surface");
    }

    /// Returns the role attached to the surface.
    pub fn surface_role(&self, surface: SurfaceId) -> Option<RoleId> {
        self.surfaces.get(surface).and_then(|data| data.role)
    }

    /// Returns the type of the first role the surface ever held.
    pub fn surface_role_type(&self, surface: SurfaceId) -> Option<RoleType> {
        self.surfaces.get(surface).and_then(|data| data.role_type)
    }

    pub fn current_state(&self, surface: SurfaceId) -> Option<&State> {
        self.surfaces.get(surface).map(|data| &data.current)
    }

    pub fn cached_state(&self, surface: SurfaceId) -> Option<&State> {
        self.surfaces.get(surface).map(|data| &data.cached)
    }

    /// Returns the content view and the under view of the surface.
    pub fn surface_views(&self, surface: SurfaceId) -> Option<(ViewIndex, ViewIndex)> {
        self.surfaces.get(surface).map(|data| (data.view, data.under))
    }

    /// Sends the frame callbacks of the surface and every subsurface beneath it.
    pub(crate) fn run_frame_callbacks(&mut self, surface: SurfaceId, time: u32) {
        let mut stack = vec![surface];

        while let Some(surface) = stack.pop() {
            let Some(data) = self.surfaces.get_mut(surface) else {
                continue;
            };

            for callback in mem::take(&mut data.current.frame_callbacks) {
                self.events.push(ClientEvent::FrameDone { callback, time });
            }

            let children = data
                .subsurfaces
                .iter()
                .rev()
                .filter_map(|&child| self.roles.get(child).and_then(|slot| slot.surface));
            stack.extend(children);
        }
    }

    fn cache_pending_state(&mut self, surface: SurfaceId) {
        let Some(data) = self.surfaces.get_mut(surface) else {
            return;
        };

        let pending = mem::take(&mut data.pending);
        let displaced = data.cached.merge(pending);
        let current = data.current.buffer;
        let role = data.role;

        tracing::trace!(?surface, "Cached pending state");

        // A cached buffer never reached the screen, release it unless it is displayed through the current state.
        if let Some(buffer) = displaced.filter(|&buffer| Some(buffer) != current) {
            self.release_buffer_through(role, buffer);
        }
    }

    fn apply_state(&mut self, surface: SurfaceId, cached: bool) {
        let Some(data) = self.surfaces.get_mut(surface) else {
            return;
        };

        let state = if cached {
            mem::take(&mut data.cached)
        } else {
            mem::take(&mut data.pending)
        };

        let flags = state.flags;
        let mut replaced = None;

        if flags.contains(PendingFlags::BUFFER) {
            if data.current.buffer != state.buffer && !data.flags.contains(SurfaceFlags::BUFFER_ALREADY_RELEASED) {
                replaced = data.current.buffer;
            }

            data.flags.remove(SurfaceFlags::BUFFER_ALREADY_RELEASED);
            data.current.buffer = state.buffer;
        }

        let current = &mut data.current;

        if flags.contains(PendingFlags::OFFSET) {
            current.offset = state.offset;
        }

        if flags.contains(PendingFlags::SCALE) {
            current.scale = state.scale;
        }

        if flags.contains(PendingFlags::INPUT_REGION) {
            current.input_region = state.input_region;
        }

        if flags.contains(PendingFlags::OPAQUE_REGION) {
            current.opaque_region = state.opaque_region;
        }

        // Damage is not accumulated across commits.
        current.damage = state.damage;
        current.frame_callbacks.extend(state.frame_callbacks);
        current.flags = flags;

        let scale = current.scale.max(1);
        let size = current
            .buffer
            .and_then(|buffer| self.buffers.get(buffer))
            .map_or(Size2D::zero(), |buffer| buffer.size / scale);
        let view = data.view;
        let role = data.role;

        self.scene.set_size(view, size);

        if let Some(buffer) = replaced {
            self.release_buffer_through(role, buffer);
        }

        self.run_commit_callbacks(surface);
        self.run_surface_actions(surface);

        if let Some(role) = role {
            self.role_commit(role, surface);
        }

        self.maybe_release_early(surface);
    }

    fn run_commit_callbacks(&mut self, surface: SurfaceId) {
        let Some(children) = self.surfaces.get(surface).map(|data| data.subsurfaces.clone()) else {
            return;
        };

        for child in children {
            self.subsurface_after_parent_commit(child);
        }
    }

    fn maybe_release_early(&mut self, surface: SurfaceId) {
        if !self.config.early_release {
            return;
        }

        let Some(data) = self.surfaces.get(surface) else {
            return;
        };

        let Some(buffer) = data.current.buffer else {
            return;
        };

        if data.flags.contains(SurfaceFlags::BUFFER_ALREADY_RELEASED) || !self.backend.can_release_now(buffer) {
            return;
        }

        self.release_buffer_now(buffer);

        if let Some(data) = self.surfaces.get_mut(surface) {
            data.flags.insert(SurfaceFlags::BUFFER_ALREADY_RELEASED);
        }
    }

    fn release_buffer_through(&mut self, role: Option<RoleId>, buffer: BufferId) {
        match role {
            Some(role) => self.role_release_buffer(role, buffer),
            None => self.release_buffer_now(buffer),
        }
    }
}
