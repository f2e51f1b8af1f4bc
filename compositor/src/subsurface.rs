//! Subsurfaces
//!
//! A subsurface is displayed in the view tree of it's parent. Both views of the subsurface are inserted as
//! children of the parent's content view (above the parent) or the parent's under view (below the parent).
//!
//! A subsurface starts out synchronous. A commit on a synchronous subsurface is cached and applied when the parent
//! commits, so the parent and all of it's synchronous children update atomically. A subsurface is effectively
//! synchronous while any ancestor subsurface is synchronous, even if it asked to be desynchronized.
//!
//! The position of a subsurface and restacking requests are always applied when the parent commits, regardless of
//! the synchronization mode.

use euclid::default::Point2D;
use static_assertions::assert_not_impl_any;

use crate::{
    action::ActionKind,
    buffer::BufferId,
    error::{ProtocolError, Result},
    role::{RoleData, RoleId, RoleSlot, RoleType},
    state::Compositor,
    surface::SurfaceId,
};

/// The client's reference to a subsurface role.
///
/// Consumed by [`Compositor::destroy_subsurface`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SubsurfaceHandle(RoleId);

assert_not_impl_any!(SubsurfaceHandle: Clone, Copy);

impl SubsurfaceHandle {
    pub fn id(&self) -> RoleId {
        self.0
    }
}

#[derive(Debug, Default)]
struct Substate {
    position: Point2D<i32>,

    /// The position was set since the parent last committed.
    position_changed: bool,
}

#[derive(Debug)]
pub(crate) struct Subsurface {
    pub(crate) parent: Option<SurfaceId>,
    pending_state: Substate,
    current_state: Substate,

    /// The client asked for the subsurface to be desynchronized.
    should_be_desync: bool,

    /// Commits are cached until the parent commits.
    synchronous: bool,

    /// A cached commit is waiting for the parent to commit.
    pending_commit: bool,

    /// The views have not yet been inserted into the parent's view tree.
    pending_insert: bool,

    mapped: bool,
}

impl Compositor {
    /// Gives the surface the subsurface role, as a child of the parent.
    pub fn get_subsurface(&mut self, surface: SurfaceId, parent: SurfaceId) -> Result<SubsurfaceHandle> {
        self.check_role_free(surface, RoleType::Subsurface)?;

        if surface == parent {
            return Err(ProtocolError::SelfParent);
        }

        // The surface must not be an ancestor of the parent.
        let mut ancestor = Some(parent);

        while let Some(current) = ancestor {
            if current == surface {
                return Err(ProtocolError::AncestorCycle);
            }

            ancestor = self.surface_role(current).and_then(|role| self.subsurface_parent(role));
        }

        // A dead parent is reported like any other bad parent.
        let Some(parent_data) = self.surfaces.get_mut(parent) else {
            return Err(ProtocolError::SelfParent);
        };

        parent_data
            .subsurfaces
            .try_reserve(1)
            .map_err(|_| ProtocolError::NoMemory)?;

        let role = self.roles.insert(RoleSlot::new(RoleData::Subsurface(Subsurface {
            parent: Some(parent),
            pending_state: Substate::default(),
            current_state: Substate::default(),
            should_be_desync: false,
            synchronous: false,
            pending_commit: false,
            pending_insert: true,
            mapped: false,
        })));

        if let Err(err) = self.attach_role(surface, role) {
            self.roles.remove(role);
            return Err(err);
        }

        Ok(SubsurfaceHandle(role))
    }

    /// Destroys the subsurface role. The surface may be given another subsurface role afterwards.
    pub fn destroy_subsurface(&mut self, handle: SubsurfaceHandle) {
        let role = handle.0;

        if let Some(surface) = self.role_surface(role) {
            self.release_role(surface);
        }

        self.release_role_ref(role);
    }

    /// Sets the position of the subsurface relative to the parent, applied when the parent commits.
    pub fn set_position(&mut self, handle: &SubsurfaceHandle, x: i32, y: i32) {
        let Some(subsurface) = self.subsurface_mut(handle.0) else {
            return;
        };

        subsurface.pending_state.position = Point2D::new(x, y);
        subsurface.pending_state.position_changed = true;
    }

    /// Places the subsurface directly above a sibling, or above the parent and all other children.
    pub fn place_above(&mut self, handle: &SubsurfaceHandle, sibling: SurfaceId) -> Result<()> {
        self.place(handle, sibling, ActionKind::PlaceAbove)
    }

    /// Places the subsurface directly below a sibling, or below the parent and all other children.
    pub fn place_below(&mut self, handle: &SubsurfaceHandle, sibling: SurfaceId) -> Result<()> {
        self.place(handle, sibling, ActionKind::PlaceBelow)
    }

    pub fn set_sync(&mut self, handle: &SubsurfaceHandle) {
        let Some(subsurface) = self.subsurface_mut(handle.0) else {
            return;
        };

        subsurface.should_be_desync = false;
        self.make_synchronous(handle.0);
    }

    /// Asks for the subsurface to be desynchronized.
    ///
    /// Has no effect while the parent is synchronous. Otherwise the subsurface is desynchronized and it's cached
    /// state applied. Descendants which asked to be desynchronized are desynchronized too, but their cached state
    /// stays until they or their parent commit.
    pub fn set_desync(&mut self, handle: &SubsurfaceHandle) {
        let role = handle.0;

        let Some(subsurface) = self.subsurface_mut(role) else {
            return;
        };

        subsurface.should_be_desync = true;
        let parent = subsurface.parent;

        let parent_synchronous = parent
            .and_then(|parent| self.surface_role(parent))
            .and_then(|parent| self.subsurface(parent))
            .map_or(false, |parent| parent.synchronous);

        if parent_synchronous {
            return;
        }

        self.make_desynchronous(role, true);
    }

    /// Returns whether commits to the subsurface are currently cached.
    pub fn is_synchronous(&self, handle: &SubsurfaceHandle) -> bool {
        self.subsurface(handle.0).map_or(false, |subsurface| subsurface.synchronous)
    }

    pub(crate) fn subsurface(&self, role: RoleId) -> Option<&Subsurface> {
        self.roles.get(role).and_then(RoleSlot::subsurface)
    }

    fn subsurface_mut(&mut self, role: RoleId) -> Option<&mut Subsurface> {
        self.roles.get_mut(role).and_then(RoleSlot::subsurface_mut)
    }

    /// Returns the parent of a subsurface role.
    pub(crate) fn subsurface_parent(&self, role: RoleId) -> Option<SurfaceId> {
        self.subsurface(role).and_then(|subsurface| subsurface.parent)
    }

    fn place(&mut self, handle: &SubsurfaceHandle, other: SurfaceId, kind: ActionKind) -> Result<()> {
        let role = handle.0;

        if self.role_surface(role).is_none() {
            // Inert.
            return Ok(());
        }

        let Some(parent) = self.subsurface_parent(role) else {
            return Ok(());
        };

        if other != parent && !self.is_sibling(role, other) {
            return Err(ProtocolError::NotSibling);
        }

        self.enqueue_action(kind, role, parent, other)
    }

    /// Makes the subsurface and every subsurface beneath it synchronous.
    fn make_synchronous(&mut self, role: RoleId) {
        let mut stack = vec![role];

        while let Some(role) = stack.pop() {
            let Some(subsurface) = self.subsurface_mut(role) else {
                continue;
            };

            subsurface.synchronous = true;

            if let Some(data) = self.role_surface(role).and_then(|surface| self.surfaces.get(surface)) {
                stack.extend(data.subsurfaces.iter().copied());
            }
        }
    }

    /// Desynchronizes the subsurface and every descendant which asked to be desynchronized.
    ///
    /// If `apply` is true, a cached commit of the subsurface itself is applied. Cached commits of descendants are
    /// never applied here.
    fn make_desynchronous(&mut self, role: RoleId, apply: bool) {
        let mut stack = vec![(role, apply)];

        while let Some((role, apply)) = stack.pop() {
            let Some(subsurface) = self.subsurface_mut(role) else {
                continue;
            };

            subsurface.synchronous = false;

            let surface = self.role_surface(role);

            if apply {
                if let Some(subsurface) = self.subsurface_mut(role) {
                    if subsurface.pending_commit {
                        subsurface.pending_commit = false;

                        if let Some(surface) = surface {
                            self.commit_cached(surface);
                        }
                    }
                }
            }

            let Some(data) = surface.and_then(|surface| self.surfaces.get(surface)) else {
                continue;
            };

            let children = data
                .subsurfaces
                .iter()
                .copied()
                .filter(|&child| self.subsurface(child).map_or(false, |child| child.should_be_desync))
                .map(|child| (child, false));
            stack.extend(children.collect::<Vec<_>>());
        }
    }

    pub(crate) fn subsurface_setup(&mut self, role: RoleId, surface: SurfaceId) {
        let Some(parent) = self.subsurface_parent(role) else {
            return;
        };

        if let Some(parent) = self.surfaces.get_mut(parent) {
            parent.subsurfaces.push(role);
        }

        if let Some(data) = self.surfaces.get(surface) {
            let (view, under) = (data.view, data.under);
            self.scene.set_position(view, Point2D::zero());
            self.scene.set_position(under, Point2D::zero());
        }

        self.make_synchronous(role);
    }

    pub(crate) fn subsurface_teardown(&mut self, role: RoleId, surface: SurfaceId) {
        // Descendants must not stay synchronous to a parent which no longer commits on their behalf.
        if let Some(data) = self.surfaces.get(surface) {
            let children = data
                .subsurfaces
                .iter()
                .copied()
                .filter(|&child| self.subsurface(child).map_or(false, |child| child.should_be_desync))
                .collect::<Vec<_>>();

            for child in children {
                self.make_desynchronous(child, false);
            }
        }

        if let Some(data) = self.surfaces.get(surface) {
            let (view, under) = (data.view, data.under);
            self.scene.unparent(view);
            self.scene.unparent(under);
        }

        let Some(subsurface) = self.subsurface_mut(role) else {
            return;
        };

        let parent = subsurface.parent.take();

        if let Some(parent) = parent {
            if let Some(parent) = self.surfaces.get_mut(parent) {
                parent.subsurfaces.retain(|&child| child != role);
            }

            self.cancel_actions_of_subject(parent, role);

            // The removal is displayed without waiting for the parent to commit.
            if let Some(parent_role) = self.surface_role(parent) {
                self.role_subsurface_update(parent_role);
            }
        }
    }

    /// Called when the parent of the subsurface is destroyed.
    pub(crate) fn subsurface_parent_destroyed(&mut self, role: RoleId) {
        if let Some(data) = self.role_surface(role).and_then(|surface| self.surfaces.get(surface)) {
            let (view, under) = (data.view, data.under);
            self.scene.unparent(view);
            self.scene.unparent(under);
        }

        if let Some(subsurface) = self.subsurface_mut(role) {
            subsurface.parent = None;
        }
    }

    pub(crate) fn subsurface_early_commit(&mut self, role: RoleId, surface: SurfaceId) -> bool {
        let Some(subsurface) = self.subsurface_mut(role) else {
            return true;
        };

        if subsurface.synchronous {
            subsurface.pending_commit = true;
            return false;
        }

        if subsurface.pending_commit {
            subsurface.pending_commit = false;

            // Commits cached while synchronous come before this one.
            if let Some(data) = self.surfaces.get_mut(surface) {
                let pending = std::mem::take(&mut data.pending);
                let displaced = data.cached.merge(pending);
                data.pending = std::mem::take(&mut data.cached);
                let current = data.current.buffer;

                if let Some(buffer) = displaced.filter(|&buffer| Some(buffer) != current) {
                    self.role_release_buffer(role, buffer);
                }
            }
        }

        true
    }

    pub(crate) fn subsurface_commit(&mut self, role: RoleId, surface: SurfaceId) {
        let has_buffer = self
            .surfaces
            .get(surface)
            .map_or(false, |data| data.current.buffer.is_some());

        let Some(subsurface) = self.subsurface_mut(role) else {
            return;
        };

        let changed = subsurface.mapped != has_buffer;
        subsurface.mapped = has_buffer;
        let synchronous = subsurface.synchronous;

        if changed {
            if let Some(data) = self.surfaces.get(surface) {
                let (view, under) = (data.view, data.under);
                self.scene.set_mapped(view, has_buffer);
                self.scene.set_mapped(under, has_buffer);
            }

            tracing::debug!(?surface, mapped = has_buffer, "Subsurface mapping changed");
        }

        // A synchronous commit is applied as part of the parent's commit, which updates the window itself.
        if !synchronous {
            self.subsurface_forward_update(role);
        }
    }

    /// Applies the position, the first insertion and the cached commit of the subsurface.
    ///
    /// Runs on every commit of the parent.
    pub(crate) fn subsurface_after_parent_commit(&mut self, role: RoleId) {
        let Some(surface) = self.role_surface(role) else {
            return;
        };

        let Some(subsurface) = self.subsurface_mut(role) else {
            return;
        };

        let Some(parent) = subsurface.parent else {
            return;
        };

        let moved = subsurface.pending_state.position_changed;

        if moved {
            subsurface.current_state.position = subsurface.pending_state.position;
            subsurface.pending_state.position_changed = false;
        }

        let position = subsurface.current_state.position;
        let insert = std::mem::take(&mut subsurface.pending_insert);
        let pending_commit = std::mem::take(&mut subsurface.pending_commit);

        let (Some(data), Some(parent_data)) = (self.surfaces.get(surface), self.surfaces.get(parent)) else {
            return;
        };

        let (view, under) = (data.view, data.under);
        let parent_view = parent_data.view;

        if moved {
            self.scene.set_position(view, position);
            self.scene.set_position(under, position);
        }

        if insert {
            self.scene.insert(parent_view, under);
            self.scene.insert(parent_view, view);
            tracing::trace!(?surface, ?position, "Inserted subsurface");
        }

        if pending_commit {
            self.commit_cached(surface);
        }
    }

    /// Forwards an update to the role of the parent.
    pub(crate) fn subsurface_forward_update(&mut self, role: RoleId) {
        let Some(parent_role) = self.subsurface_parent(role).and_then(|parent| self.surface_role(parent)) else {
            return;
        };

        self.role_subsurface_update(parent_role);
    }

    pub(crate) fn subsurface_release_buffer(&mut self, role: RoleId, buffer: BufferId) {
        match self.subsurface_parent(role).and_then(|parent| self.surface_role(parent)) {
            Some(parent_role) => self.role_release_buffer(parent_role, buffer),
            None => self.release_buffer_now(buffer),
        }
    }

    pub(crate) fn subsurface_rescale(&mut self, role: RoleId) {
        self.subsurface_parent_rescale(role);
    }

    /// Moves the views to the current position again.
    pub(crate) fn subsurface_parent_rescale(&mut self, role: RoleId) {
        let Some(position) = self.subsurface(role).map(|subsurface| subsurface.current_state.position) else {
            return;
        };

        if let Some(data) = self.role_surface(role).and_then(|surface| self.surfaces.get(surface)) {
            let (view, under) = (data.view, data.under);
            self.scene.set_position(view, position);
            self.scene.set_position(under, position);
        }
    }
}
