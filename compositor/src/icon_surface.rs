//! Drag icons
//!
//! An icon surface is displayed in an override redirect window which follows the pointer during drag and drop.
//! The window accepts no input and is never managed by the window manager.

use bitflags::bitflags;
use euclid::default::{Box2D, Point2D, Size2D, Vector2D};
use static_assertions::assert_not_impl_any;

use crate::{
    backend::{Property, ShapeKind, WindowKind, WmProtocols},
    error::Result,
    role::{Backing, RoleData, RoleId, RoleSlot, RoleType},
    state::Compositor,
    surface::{PendingFlags, SurfaceId},
};

/// The reference to an icon surface held by the drag and drop machinery.
///
/// Consumed by [`Compositor::release_icon_surface`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct IconHandle(RoleId);

assert_not_impl_any!(IconHandle: Clone, Copy);

impl IconHandle {
    pub fn id(&self) -> RoleId {
        self.0
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    struct IconFlags: u32 {
        const MAPPED = 1 << 0;

        /// The drag ended, the window is never mapped again.
        const RELEASED = 1 << 1;
    }
}

#[derive(Debug)]
pub(crate) struct IconSurface {
    pub(crate) backing: Backing,
    flags: IconFlags,

    /// Position of the surface on the root window.
    position: Point2D<i32>,

    /// The last bounds of the view tree.
    bounds: Box2D<i32>,
}

impl Compositor {
    /// Gives the surface the icon surface role.
    pub fn get_icon_surface(&mut self, surface: SurfaceId) -> Result<IconHandle> {
        self.check_role_free(surface, RoleType::Icon)?;

        let backing = self.create_backing(WindowKind::OverrideRedirect, Size2D::new(1, 1));
        let window = backing.window;

        self.backend
            .change_property(window, Property::WmProtocols(WmProtocols::SYNC_REQUEST));
        // Frame synchronization breaks if the compositing manager unredirects the window.
        self.backend.change_property(window, Property::BypassCompositor(2));
        self.backend.set_shape(window, ShapeKind::Input, &[]);

        let role = self.roles.insert(RoleSlot::new(RoleData::Icon(IconSurface {
            backing,
            flags: IconFlags::empty(),
            position: Point2D::zero(),
            bounds: Box2D::zero(),
        })));
        self.windows.insert(window, role);

        if let Err(err) = self.attach_role(surface, role) {
            self.release_role_ref(role);
            return Err(err);
        }

        tracing::debug!(?surface, %window, "Created icon surface");
        Ok(IconHandle(role))
    }

    /// Moves the icon to a position on the root window.
    pub fn move_icon_surface(&mut self, handle: &IconHandle, x: i32, y: i32) {
        self.icon_move_to(handle.0, Point2D::new(x, y));
    }

    /// Ends the drag. The window is unmapped and never mapped again.
    pub fn release_icon_surface(&mut self, handle: IconHandle) {
        let role = handle.0;

        self.icon_unmap(role);

        if let Some(icon) = self.roles.get_mut(role).and_then(RoleSlot::icon_mut) {
            icon.flags.insert(IconFlags::RELEASED);
        }

        self.release_role_ref(role);
    }

    /// Returns whether the window of the icon is mapped.
    pub fn icon_mapped(&self, handle: &IconHandle) -> bool {
        self.roles
            .get(handle.0)
            .and_then(|slot| match &slot.data {
                RoleData::Icon(icon) => Some(icon.flags.contains(IconFlags::MAPPED)),
                _ => None,
            })
            .unwrap_or(false)
    }

    pub(crate) fn icon_setup(&mut self, role: RoleId, surface: SurfaceId) {
        self.insert_into_root(role, surface);
    }

    pub(crate) fn icon_teardown(&mut self, _role: RoleId, surface: SurfaceId) {
        self.remove_from_root(surface);
    }

    pub(crate) fn icon_commit(&mut self, role: RoleId, surface: SurfaceId) {
        let Some(data) = self.surfaces.get(surface) else {
            return;
        };

        let has_buffer = data.current.buffer.is_some();

        if data.current.flags.contains(PendingFlags::OFFSET) {
            if let Some(position) = self.icon(role).map(|icon| icon.position) {
                self.icon_place_window(role, position);
            }
        }

        if has_buffer {
            self.icon_map(role);
        } else {
            self.icon_unmap(role);
        }

        self.sync_update(role);
    }

    /// Moves and resizes the window to cover the bounds of the view tree.
    pub(crate) fn icon_note_bounds(&mut self, role: RoleId, bounds: Box2D<i32>) {
        let offset = self.icon_offset(role);

        let Some(icon) = self.roles.get_mut(role).and_then(RoleSlot::icon_mut) else {
            return;
        };

        if icon.bounds == bounds {
            return;
        }

        icon.bounds = bounds;

        let window = icon.backing.window;
        let position = icon.position + offset + bounds.min.to_vector();

        self.backend.move_window(window, position);
        self.backend.resize_window(window, bounds.size());
    }

    fn icon(&self, role: RoleId) -> Option<&IconSurface> {
        self.roles.get(role).and_then(|slot| match &slot.data {
            RoleData::Icon(icon) => Some(icon),
            _ => None,
        })
    }

    /// The attach offset of the current state of the surface.
    fn icon_offset(&self, role: RoleId) -> Vector2D<i32> {
        self.role_surface(role)
            .and_then(|surface| self.surfaces.get(surface))
            .map(|data| data.current.offset)
            .unwrap_or_default()
    }

    fn icon_move_to(&mut self, role: RoleId, position: Point2D<i32>) {
        let Some(icon) = self.icon(role) else {
            return;
        };

        if icon.position == position {
            return;
        }

        self.icon_place_window(role, position);
    }

    fn icon_place_window(&mut self, role: RoleId, position: Point2D<i32>) {
        let offset = self.icon_offset(role);

        let Some(icon) = self.roles.get_mut(role).and_then(RoleSlot::icon_mut) else {
            return;
        };

        icon.position = position;

        let window = icon.backing.window;
        let origin = position + offset + icon.bounds.min.to_vector();
        self.backend.move_window(window, origin);
    }

    fn icon_map(&mut self, role: RoleId) {
        let Some(icon) = self.roles.get_mut(role).and_then(RoleSlot::icon_mut) else {
            return;
        };

        if icon.flags.intersects(IconFlags::MAPPED | IconFlags::RELEASED) {
            return;
        }

        icon.flags.insert(IconFlags::MAPPED);
        let window = icon.backing.window;
        self.backend.map_window(window);
    }

    fn icon_unmap(&mut self, role: RoleId) {
        let Some(icon) = self.roles.get_mut(role).and_then(RoleSlot::icon_mut) else {
            return;
        };

        if !icon.flags.contains(IconFlags::MAPPED) {
            return;
        }

        icon.flags.remove(IconFlags::MAPPED);
        let window = icon.backing.window;
        self.backend.unmap_window(window);
    }
}
