//! Roles
//!
//! A role gives a surface it's meaning. A surface holds at most one role at a time, and the type of the first role
//! ever attached is reserved for the lifetime of the surface. A surface which was a subsurface can become a
//! subsurface again after the role was destroyed, but never a shell surface.
//!
//! Roles are reference counted. The client handle of the role holds one reference and the attachment to a surface
//! holds another. The backing state of a role is released once the last reference is dropped, which allows either
//! the role object or the surface to be destroyed first.
//!
//! Every role answers the same set of hooks, dispatched on the [`RoleData`] variant:
//!
//! | hook                | icon surface     | subsurface              | shell surface            |
//! |---------------------|------------------|-------------------------|--------------------------|
//! | setup / teardown    | root view        | parent's view tree      | root view                |
//! | early commit        | accept           | cache while synchronous | accept                   |
//! | commit              | move, map, draw  | map, notify parent      | configure handshake      |
//! | release buffer      | tracker          | parent's role           | tracker                  |
//! | subsurface update   | draw             | parent's role           | draw unless waiting      |
//! | window              | none             | parent's window         | own window               |

use std::fmt;

use bitflags::bitflags;
use euclid::default::{Box2D, Point2D, Rect, Size2D};
use slotmap::new_key_type;

use crate::{
    backend::{RenderTarget, WindowId, WindowKind},
    buffer::BufferId,
    buffer_release::BufferReleaseTracker,
    error::{ProtocolError, Result},
    icon_surface::IconSurface,
    scene::ViewIndex,
    shell::ShellSurface,
    state::Compositor,
    subsurface::Subsurface,
    surface::SurfaceId,
    sync::FrameSync,
};

new_key_type! {
    pub struct RoleId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleType {
    Icon,
    Subsurface,
    Shell,
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoleType::Icon => "icon surface",
            RoleType::Subsurface => "subsurface",
            RoleType::Shell => "shell surface",
        })
    }
}

#[derive(Debug)]
pub(crate) enum RoleData {
    Icon(IconSurface),
    Subsurface(Subsurface),
    Shell(Box<ShellSurface>),
}

#[derive(Debug)]
pub(crate) struct RoleSlot {
    pub(crate) refcount: u32,

    /// The surface the role is attached to.
    pub(crate) surface: Option<SurfaceId>,
    pub(crate) data: RoleData,
}

impl RoleSlot {
    pub(crate) fn new(data: RoleData) -> Self {
        Self {
            refcount: 1,
            surface: None,
            data,
        }
    }

    pub(crate) fn role_type(&self) -> RoleType {
        match self.data {
            RoleData::Icon(_) => RoleType::Icon,
            RoleData::Subsurface(_) => RoleType::Subsurface,
            RoleData::Shell(_) => RoleType::Shell,
        }
    }

    pub(crate) fn backing(&self) -> Option<&Backing> {
        match &self.data {
            RoleData::Icon(icon) => Some(&icon.backing),
            RoleData::Subsurface(_) => None,
            RoleData::Shell(shell) => Some(&shell.backing),
        }
    }

    pub(crate) fn backing_mut(&mut self) -> Option<&mut Backing> {
        match &mut self.data {
            RoleData::Icon(icon) => Some(&mut icon.backing),
            RoleData::Subsurface(_) => None,
            RoleData::Shell(shell) => Some(&mut shell.backing),
        }
    }

    pub(crate) fn release_tracker(&self) -> Option<&BufferReleaseTracker> {
        self.backing().map(|backing| &backing.release)
    }

    pub(crate) fn release_tracker_mut(&mut self) -> Option<&mut BufferReleaseTracker> {
        self.backing_mut().map(|backing| &mut backing.release)
    }

    pub(crate) fn subsurface(&self) -> Option<&Subsurface> {
        match &self.data {
            RoleData::Subsurface(subsurface) => Some(subsurface),
            _ => None,
        }
    }

    pub(crate) fn subsurface_mut(&mut self) -> Option<&mut Subsurface> {
        match &mut self.data {
            RoleData::Subsurface(subsurface) => Some(subsurface),
            _ => None,
        }
    }

    pub(crate) fn icon_mut(&mut self) -> Option<&mut IconSurface> {
        match &mut self.data {
            RoleData::Icon(icon) => Some(icon),
            _ => None,
        }
    }

    pub(crate) fn shell(&self) -> Option<&ShellSurface> {
        match &self.data {
            RoleData::Shell(shell) => Some(shell),
            _ => None,
        }
    }

    pub(crate) fn shell_mut(&mut self) -> Option<&mut ShellSurface> {
        match &mut self.data {
            RoleData::Shell(shell) => Some(shell),
            _ => None,
        }
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) struct BackingFlags: u32 {
        /// A replaced buffer is still being read by the renderer.
        const PENDING_BUFFER_RELEASE = 1 << 0;

        /// Frame callbacks were deferred until every replaced buffer is released.
        const PENDING_FRAME_CALLBACK = 1 << 1;
    }
}

/// The window and everything used to draw into it.
///
/// Owned by the roles which own a window, icon surfaces and shell surfaces.
#[derive(Debug)]
pub(crate) struct Backing {
    pub(crate) window: WindowId,
    pub(crate) target: RenderTarget,
    pub(crate) root: ViewIndex,
    pub(crate) release: BufferReleaseTracker,
    pub(crate) sync: FrameSync,
    pub(crate) flags: BackingFlags,

    /// The time of the deferred frame callbacks, in milliseconds.
    pub(crate) pending_frame_time: u32,
}

impl Compositor {
    /// Returns the type of the role.
    pub fn role_type(&self, role: RoleId) -> Option<RoleType> {
        self.roles.get(role).map(RoleSlot::role_type)
    }

    /// Returns the number of references held on the role, or `None` if the backing of the role was released.
    pub fn role_refcount(&self, role: RoleId) -> Option<u32> {
        self.roles.get(role).map(|slot| slot.refcount)
    }

    /// Returns the surface the role is attached to.
    pub fn role_surface(&self, role: RoleId) -> Option<SurfaceId> {
        self.roles.get(role).and_then(|slot| slot.surface)
    }

    /// Returns the root view of a role which owns a window.
    pub fn role_root(&self, role: RoleId) -> Option<ViewIndex> {
        self.roles.get(role).and_then(RoleSlot::backing).map(|backing| backing.root)
    }

    /// Returns the managed window the role is displayed in.
    ///
    /// Icon surfaces have no managed window. Subsurfaces are displayed in the window of their parent.
    pub fn role_window(&self, role: RoleId) -> Option<WindowId> {
        let mut role = role;

        // Walk up through parents of subsurfaces.
        loop {
            let slot = self.roles.get(role)?;

            match &slot.data {
                RoleData::Icon(_) => return None,
                RoleData::Shell(shell) => return Some(shell.backing.window),
                RoleData::Subsurface(subsurface) => {
                    let parent = subsurface.parent?;
                    role = self.surfaces.get(parent)?.role?;
                }
            }
        }
    }

    /// Returns the role which owns the window.
    pub fn role_for_window(&self, window: WindowId) -> Option<RoleId> {
        self.windows.get(&window).copied()
    }

    /// Checks whether a role of the given type may be attached to the surface.
    pub(crate) fn check_role_free(&self, surface: SurfaceId, requested: RoleType) -> Result<()> {
        let Some(data) = self.surfaces.get(surface) else {
            return Ok(());
        };

        if data.role.is_some() {
            return Err(ProtocolError::RoleAlreadyAttached);
        }

        match data.role_type {
            Some(previous) if previous != requested => Err(ProtocolError::RoleTypeMismatch { previous, requested }),
            _ => Ok(()),
        }
    }

    /// Attaches the role to the surface.
    ///
    /// The attachment takes a reference on the role.
    pub(crate) fn attach_role(&mut self, surface: SurfaceId, role: RoleId) -> Result<()> {
        let Some(role_type) = self.role_type(role) else {
            return Ok(());
        };

        self.check_role_free(surface, role_type)?;

        let (Some(data), Some(slot)) = (self.surfaces.get_mut(surface), self.roles.get_mut(role)) else {
            return Ok(());
        };

        slot.surface = Some(surface);
        slot.refcount += 1;
        data.role = Some(role);
        data.role_type = Some(role_type);

        match role_type {
            RoleType::Icon => self.icon_setup(role, surface),
            RoleType::Subsurface => self.subsurface_setup(role, surface),
            RoleType::Shell => self.shell_setup(role, surface),
        }

        tracing::debug!(?surface, ?role, %role_type, "Attached role");
        Ok(())
    }

    /// Detaches the role of the surface, dropping the reference held by the attachment.
    pub(crate) fn release_role(&mut self, surface: SurfaceId) {
        let Some(role) = self.surfaces.get(surface).and_then(|data| data.role) else {
            return;
        };

        let Some(role_type) = self.role_type(role) else {
            return;
        };

        match role_type {
            RoleType::Icon => self.icon_teardown(role, surface),
            RoleType::Subsurface => self.subsurface_teardown(role, surface),
            RoleType::Shell => self.shell_teardown(role, surface),
        }

        if let Some(slot) = self.roles.get_mut(role) {
            slot.surface = None;
        }

        if let Some(data) = self.surfaces.get_mut(surface) {
            data.role = None;
        }

        tracing::debug!(?surface, ?role, %role_type, "Detached role");
        self.release_role_ref(role);
    }

    pub(crate) fn retain_role(&mut self, role: RoleId) {
        if let Some(slot) = self.roles.get_mut(role) {
            slot.refcount += 1;
        }
    }

    /// Drops a reference to the role, releasing the backing of the role with the last reference.
    pub(crate) fn release_role_ref(&mut self, role: RoleId) {
        let Some(slot) = self.roles.get_mut(role) else {
            return;
        };

        slot.refcount = slot.refcount.saturating_sub(1);

        if slot.refcount > 0 {
            return;
        }

        if slot.role_type() == RoleType::Shell {
            self.shell_release_backing(role);
        }

        let Some(slot) = self.roles.remove(role) else {
            return;
        };

        let backing = match slot.data {
            RoleData::Icon(icon) => Some(icon.backing),
            RoleData::Subsurface(_) => None,
            RoleData::Shell(shell) => Some(shell.backing),
        };

        if let Some(backing) = backing {
            self.destroy_backing(backing);
        }

        tracing::debug!(?role, "Released role backing");
    }

    /// Creates a window, a render target and a root view for a role.
    pub(crate) fn create_backing(&mut self, kind: WindowKind, size: Size2D<i32>) -> Backing {
        let window = self.backend.create_window(kind, Rect::from_size(size));
        let target = self.backend.create_render_target(window);
        let root = self.scene.create_root();
        let sync = FrameSync::new(self.backend.now_us());

        Backing {
            window,
            target,
            root,
            release: BufferReleaseTracker::new(),
            sync,
            flags: BackingFlags::empty(),
            pending_frame_time: 0,
        }
    }

    /// Inserts the views of the surface into the root view of the role, the under view beneath the content view.
    pub(crate) fn insert_into_root(&mut self, role: RoleId, surface: SurfaceId) {
        let (Some(root), Some(data)) = (self.role_root(role), self.surfaces.get(surface)) else {
            return;
        };

        let (view, under) = (data.view, data.under);

        for view in [view, under] {
            self.scene.set_position(view, Point2D::zero());
            self.scene.set_mapped(view, true);
        }

        self.scene.insert(root, under);
        self.scene.insert(root, view);
    }

    pub(crate) fn remove_from_root(&mut self, surface: SurfaceId) {
        if let Some(data) = self.surfaces.get(surface) {
            let (view, under) = (data.view, data.under);
            self.scene.unparent(view);
            self.scene.unparent(under);
        }
    }

    fn destroy_backing(&mut self, mut backing: Backing) {
        // Nothing reads the buffers once the target is gone.
        for buffer in backing.release.drain() {
            self.release_buffer_now(buffer);
        }

        self.backend.destroy_render_target(backing.target);
        self.backend.destroy_window(backing.window);
        self.windows.remove(&backing.window);
        self.scene.destroy(backing.root);
    }

    pub(crate) fn role_early_commit(&mut self, role: RoleId, surface: SurfaceId) -> bool {
        match self.role_type(role) {
            Some(RoleType::Subsurface) => self.subsurface_early_commit(role, surface),
            Some(RoleType::Icon | RoleType::Shell) | None => true,
        }
    }

    pub(crate) fn role_commit(&mut self, role: RoleId, surface: SurfaceId) {
        match self.role_type(role) {
            Some(RoleType::Icon) => self.icon_commit(role, surface),
            Some(RoleType::Subsurface) => self.subsurface_commit(role, surface),
            Some(RoleType::Shell) => self.shell_commit(role, surface),
            None => (),
        }
    }

    /// Releases a buffer replaced by a commit of a surface with the role.
    pub(crate) fn role_release_buffer(&mut self, role: RoleId, buffer: BufferId) {
        match self.role_type(role) {
            Some(RoleType::Icon | RoleType::Shell) => self.backing_release_buffer(role, buffer),
            Some(RoleType::Subsurface) => self.subsurface_release_buffer(role, buffer),
            None => self.release_buffer_now(buffer),
        }
    }

    /// Called when a desynchronized subsurface beneath the role committed.
    pub(crate) fn role_subsurface_update(&mut self, role: RoleId) {
        match self.role_type(role) {
            Some(RoleType::Icon) => self.sync_update(role),
            Some(RoleType::Subsurface) => self.subsurface_forward_update(role),
            Some(RoleType::Shell) => self.shell_subsurface_update(role),
            None => (),
        }
    }

    /// Called when the scale of the outputs the role is displayed on changed.
    pub(crate) fn role_rescale(&mut self, role: RoleId) {
        match self.role_type(role) {
            Some(RoleType::Icon) | None => (),
            Some(RoleType::Subsurface) => self.subsurface_rescale(role),
            Some(RoleType::Shell) => self.shell_rescale(role),
        }
    }

    /// Called with the bounds of the view tree before a frame is drawn.
    pub(crate) fn role_note_bounds(&mut self, role: RoleId, bounds: Box2D<i32>) {
        match self.role_type(role) {
            Some(RoleType::Icon) => self.icon_note_bounds(role, bounds),
            Some(RoleType::Shell) => self.shell_note_bounds(role, bounds),
            Some(RoleType::Subsurface) | None => (),
        }
    }

    /// Called when the window manager froze the frame clock to resize the window.
    pub(crate) fn role_handle_resize(&mut self, role: RoleId, only_frame: bool) {
        if let Some(RoleType::Shell) = self.role_type(role) {
            self.shell_handle_resize(role, only_frame);
        }
    }

    /// Releases a buffer through the release tracker of a role which owns a window.
    fn backing_release_buffer(&mut self, role: RoleId, buffer: BufferId) {
        let Some(backing) = self.roles.get_mut(role).and_then(RoleSlot::backing_mut) else {
            self.release_buffer_now(buffer);
            return;
        };

        if self.backend.is_buffer_idle(buffer, backing.target) {
            self.release_buffer_now(buffer);
        } else {
            tracing::trace!(?role, ?buffer, "Deferring release of busy buffer");
            backing.release.track(buffer);
            backing.flags.insert(BackingFlags::PENDING_BUFFER_RELEASE);
        }
    }

    /// Runs the frame callbacks of the surface attached to the role.
    ///
    /// While a replaced buffer is still busy, the callbacks are deferred until it is released.
    pub(crate) fn role_frame_callback(&mut self, role: RoleId, time: u32) {
        let Some(slot) = self.roles.get_mut(role) else {
            return;
        };

        let surface = slot.surface;

        let Some(backing) = slot.backing_mut() else {
            return;
        };

        if backing.flags.contains(BackingFlags::PENDING_BUFFER_RELEASE) {
            backing.flags.insert(BackingFlags::PENDING_FRAME_CALLBACK);
            backing.pending_frame_time = time;
            tracing::trace!(?role, time, "Deferring frame callbacks until buffers are released");
            return;
        }

        if let Some(surface) = surface {
            self.run_frame_callbacks(surface, time);
        }
    }

    /// Called once every buffer tracked by the role was released.
    pub(crate) fn role_all_buffers_released(&mut self, role: RoleId) {
        let Some(slot) = self.roles.get_mut(role) else {
            return;
        };

        let surface = slot.surface;

        let Some(backing) = slot.backing_mut() else {
            return;
        };

        backing.flags.remove(BackingFlags::PENDING_BUFFER_RELEASE);

        if !backing.flags.contains(BackingFlags::PENDING_FRAME_CALLBACK) {
            return;
        }

        backing.flags.remove(BackingFlags::PENDING_FRAME_CALLBACK);
        let time = backing.pending_frame_time;

        if let Some(surface) = surface {
            self.run_frame_callbacks(surface, time);
        }
    }

    /// Called when the scale of the outputs changed.
    pub fn rescale(&mut self, surface: SurfaceId) {
        let Some(role) = self.surface_role(surface) else {
            return;
        };

        self.role_rescale(role);

        // Every subsurface beneath the surface keeps it's position in surface coordinates.
        let mut stack = self
            .surfaces
            .get(surface)
            .map(|data| data.subsurfaces.clone())
            .unwrap_or_default();

        while let Some(child) = stack.pop() {
            self.subsurface_parent_rescale(child);

            if let Some(data) = self.role_surface(child).and_then(|surface| self.surfaces.get(surface)) {
                stack.extend(data.subsurfaces.iter().copied());
            }
        }
    }
}
