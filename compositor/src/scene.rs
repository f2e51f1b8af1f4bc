//! The view tree
//!
//! Every surface owns two views. The content view displays the surface's buffer and parents the subsurfaces
//! placed above the surface. The under view has no content of it's own and parents the subsurfaces placed below
//! the surface. The under view is always inserted directly before the content view, so everything below a surface
//! paints before it.
//!
//! Roles which own a backend window (icon surfaces and shell surfaces) own a root view, which stands in for
//! that window. The bounds of a root are the union of every mapped content view beneath it.
//!
//! ```text
//!            root
//!          /      \
//!     S.under    S.view
//!        |       /     \
//!      B.view  A.under  A.view
//! ```
//!
//! Positions are relative to the parent view.

use euclid::default::{Box2D, Point2D, Size2D};

use crate::{
    forest::{Forest, Index},
    surface::SurfaceId,
};

/// A stable index to reference a [`View`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewIndex(Index);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Stands in for a backend window.
    Root,

    /// Displays the buffer of a surface.
    Content,

    /// Parents the subsurfaces placed below a surface.
    Under,
}

#[derive(Debug)]
pub struct View {
    kind: ViewKind,
    surface: Option<SurfaceId>,
    position: Point2D<i32>,
    size: Size2D<i32>,
    /// An unmapped view hides itself and all of it's children.
    mapped: bool,
    /// Set on roots when the cached paint state of the window can no longer be trusted.
    garbage: bool,
}

impl View {
    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    pub fn position(&self) -> Point2D<i32> {
        self.position
    }

    pub fn size(&self) -> Size2D<i32> {
        self.size
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }
}

#[derive(Debug, Default)]
pub struct Scene {
    forest: Forest<View>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, view: ViewIndex) -> Option<&View> {
        self.forest.get(view.0).map(|node| &**node)
    }

    /// Creates a root view for a role which owns a window.
    pub fn create_root(&mut self) -> ViewIndex {
        ViewIndex(self.forest.insert(View {
            kind: ViewKind::Root,
            surface: None,
            position: Point2D::zero(),
            size: Size2D::zero(),
            mapped: true,
            garbage: false,
        }))
    }

    /// Creates the content and under views of a surface.
    ///
    /// Both views start out unmapped and without a parent.
    pub fn create_surface_views(&mut self, surface: SurfaceId) -> (ViewIndex, ViewIndex) {
        let mut create = |kind| {
            ViewIndex(self.forest.insert(View {
                kind,
                surface: Some(surface),
                position: Point2D::zero(),
                size: Size2D::zero(),
                mapped: false,
                garbage: false,
            }))
        };

        (create(ViewKind::Content), create(ViewKind::Under))
    }

    /// Removes a view, the children of the view become unparented.
    pub fn destroy(&mut self, view: ViewIndex) {
        if let Err(error) = self.forest.remove(view.0) {
            tracing::warn!(%error, "Failed to destroy view");
        }
    }

    /// Appends the child to the end of the parent's children, placing it above all other children.
    pub fn insert(&mut self, parent: ViewIndex, child: ViewIndex) {
        if let Err(error) = self.forest.add_child(parent.0, child.0) {
            tracing::warn!(%error, "Failed to insert view");
        }
    }

    /// Places the child directly below the sibling.
    pub fn insert_before(&mut self, parent: ViewIndex, child: ViewIndex, sibling: ViewIndex) {
        if let Err(error) = self.forest.insert_before(parent.0, child.0, sibling.0) {
            tracing::warn!(%error, "Failed to insert view");
        }
    }

    /// Places the child directly above the sibling.
    pub fn insert_after(&mut self, parent: ViewIndex, child: ViewIndex, sibling: ViewIndex) {
        if let Err(error) = self.forest.insert_after(parent.0, child.0, sibling.0) {
            tracing::warn!(%error, "Failed to insert view");
        }
    }

    pub fn unparent(&mut self, view: ViewIndex) {
        // Views of dead surfaces may be unparented during teardown.
        let _ = self.forest.detach(view.0);
    }

    pub fn parent(&self, view: ViewIndex) -> Option<ViewIndex> {
        self.forest
            .get(view.0)
            .and_then(crate::forest::Node::parent)
            .map(ViewIndex)
    }

    pub fn root_of(&self, view: ViewIndex) -> Option<ViewIndex> {
        self.forest.root(view.0).map(ViewIndex)
    }

    pub fn children(&self, view: ViewIndex) -> Vec<ViewIndex> {
        self.forest.children(view.0).map(ViewIndex).collect()
    }

    pub fn set_position(&mut self, view: ViewIndex, position: Point2D<i32>) {
        if let Some(node) = self.forest.get_mut(view.0) {
            node.position = position;
        }
    }

    pub fn set_size(&mut self, view: ViewIndex, size: Size2D<i32>) {
        if let Some(node) = self.forest.get_mut(view.0) {
            node.size = size;
        }
    }

    pub fn set_mapped(&mut self, view: ViewIndex, mapped: bool) {
        if let Some(node) = self.forest.get_mut(view.0) {
            node.mapped = mapped;
        }
    }

    /// Returns the position of the view relative to it's root.
    pub fn absolute_position(&self, view: ViewIndex) -> Point2D<i32> {
        let mut position = Point2D::zero();
        let mut current = Some(view.0);

        while let Some(index) = current {
            let Some(node) = self.forest.get(index) else {
                break;
            };

            position += node.position.to_vector();
            current = crate::forest::Node::parent(node);
        }

        position
    }

    /// Marks the paint state of a root as stale.
    pub fn garbage(&mut self, root: ViewIndex) {
        if let Some(node) = self.forest.get_mut(root.0) {
            node.garbage = true;
        }
    }

    /// Returns whether the root was garbaged since the last call, clearing the flag.
    pub fn take_garbage(&mut self, root: ViewIndex) -> bool {
        self.forest
            .get_mut(root.0)
            .map(|node| std::mem::take(&mut node.garbage))
            .unwrap_or(false)
    }

    pub fn is_garbage(&self, root: ViewIndex) -> bool {
        self.forest.get(root.0).map(|node| node.garbage).unwrap_or(false)
    }

    /// Computes the bounding box of all mapped content beneath the root.
    ///
    /// A root with no visible content has a bounding box of 1x1 at the origin, since windows cannot be zero
    /// sized.
    pub fn bounds(&self, root: ViewIndex) -> Box2D<i32> {
        let mut bounds: Option<Box2D<i32>> = None;
        let mut stack = vec![(root.0, Point2D::zero())];

        while let Some((index, origin)) = stack.pop() {
            let Some(node) = self.forest.get(index) else {
                continue;
            };

            if !node.mapped {
                continue;
            }

            let origin = origin + node.position.to_vector();

            if node.kind == ViewKind::Content && node.size.width > 0 && node.size.height > 0 {
                let rect = Box2D::from_origin_and_size(origin, node.size);
                bounds = Some(bounds.map_or(rect, |bounds| bounds.union(&rect)));
            }

            stack.extend(self.forest.children(index).map(|child| (child, origin)));
        }

        bounds.unwrap_or_else(|| Box2D::from_size(Size2D::new(1, 1)))
    }

    /// Returns whether any mapped content with a size exists beneath the root.
    pub fn has_content(&self, root: ViewIndex) -> bool {
        !self.paint_order(root).is_empty()
    }

    /// Returns the surfaces beneath the root in the order they are painted, bottom first.
    pub fn paint_order(&self, root: ViewIndex) -> Vec<SurfaceId> {
        let mut order = Vec::new();
        let mut stack = vec![root.0];

        while let Some(index) = stack.pop() {
            let Some(node) = self.forest.get(index) else {
                continue;
            };

            if !node.mapped {
                continue;
            }

            if node.kind == ViewKind::Content && node.size.width > 0 && node.size.height > 0 {
                order.extend(node.surface);
            }

            // Children paint after the view itself, first child lowest.
            let children = self.forest.children(index).collect::<Vec<_>>();
            stack.extend(children.into_iter().rev());
        }

        order
    }
}
