use std::ops::{Deref, DerefMut};

use slotmap::{new_key_type, SlotMap};

/// An error from using a [`Forest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{0:?} is not present in the forest")]
    NotPresent(Index),

    #[error("{0:?} is not a child of the parent node")]
    NotChild(Index),

    #[error("a node cannot be placed relative to itself")]
    SelfSibling,

    #[error("failed to insert because the forest would become cyclic")]
    Cycle,
}

#[derive(Debug)]
pub struct Forest<T> {
    inner: SlotMap<Index, Node<T>>,
}

impl<T> Default for Forest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Forest<T> {
    pub fn new() -> Self {
        Self {
            inner: SlotMap::with_key(),
        }
    }

    /// Inserts a value into the forest, returning the index of the value.
    ///
    /// The value when inserted does not have any child or parent nodes.
    pub fn insert(&mut self, value: T) -> Index {
        self.insert_with(|_| value)
    }

    pub fn insert_with<F>(&mut self, f: F) -> Index
    where
        F: FnOnce(Index) -> T,
    {
        self.inner.insert_with_key(|index| Node {
            value: f(index),
            index,
            parent: None,
            prev: None,
            next: None,
            first_last_child: None,
        })
    }

    pub fn get(&self, index: Index) -> Option<&Node<T>> {
        self.inner.get(index)
    }

    pub fn get_mut(&mut self, index: Index) -> Option<&mut Node<T>> {
        self.inner.get_mut(index)
    }

    pub fn contains_index(&self, index: Index) -> bool {
        self.inner.contains_key(index)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes the index from the forest, returning the value stored with the index.
    ///
    /// Any children of the node become roots.
    pub fn remove(&mut self, index: Index) -> Result<T, Error> {
        // Detach the node before removing from the map.
        self.detach(index)?;

        let children = self.children(index).collect::<Vec<_>>();

        for child in children {
            let node = &mut self.inner[child];
            node.parent = None;
            node.prev = None;
            node.next = None;
        }

        let node = self.inner.remove(index).ok_or(Error::NotPresent(index))?;
        Ok(node.value)
    }

    /// Makes the `child` the last child of the node at `index`.
    ///
    /// If the child already has a parent, it is detached first.
    pub fn add_child(&mut self, index: Index, child: Index) -> Result<(), Error> {
        self.is_present(index)?;
        self.is_present(child)?;
        self.check_for_cycles(index, child)?;
        self.detach(child)?;

        let parent = &mut self.inner[index];

        match parent.first_last_child {
            // Create a triangle relationship:
            //
            //         a
            //     /   |   \
            //    /    |    \
            // ... <-> x <-> y
            //
            // where x is the previous last child of the parent
            // and y is the next last child of the parent.
            Some((first_child, prev_last_child)) => {
                parent.first_last_child = Some((first_child, child));
                self.inner[prev_last_child].next = Some(child);

                let child_node = &mut self.inner[child];
                child_node.prev = Some(prev_last_child);
                child_node.parent = Some(index);
            }

            // If the parent is receiving it's first child node, a lot of code can be skipped.
            None => {
                parent.first_last_child = Some((child, child));
                self.inner[child].parent = Some(index);
            }
        }

        Ok(())
    }

    /// Places `child` directly before `sibling` in the children of `index`.
    pub fn insert_before(&mut self, index: Index, child: Index, sibling: Index) -> Result<(), Error> {
        self.check_sibling(index, child, sibling)?;
        self.detach(child)?;

        let prev = self.inner[sibling].prev;
        self.inner[sibling].prev = Some(child);

        let child_node = &mut self.inner[child];
        child_node.parent = Some(index);
        child_node.prev = prev;
        child_node.next = Some(sibling);

        match prev {
            Some(prev) => self.inner[prev].next = Some(child),
            None => {
                let parent = &mut self.inner[index];
                let last = Node::last_child(parent).unwrap_or(sibling);
                parent.first_last_child = Some((child, last));
            }
        }

        Ok(())
    }

    /// Places `child` directly after `sibling` in the children of `index`.
    pub fn insert_after(&mut self, index: Index, child: Index, sibling: Index) -> Result<(), Error> {
        self.check_sibling(index, child, sibling)?;
        self.detach(child)?;

        let next = self.inner[sibling].next;
        self.inner[sibling].next = Some(child);

        let child_node = &mut self.inner[child];
        child_node.parent = Some(index);
        child_node.prev = Some(sibling);
        child_node.next = next;

        match next {
            Some(next) => self.inner[next].prev = Some(child),
            None => {
                let parent = &mut self.inner[index];
                let first = Node::first_child(parent).unwrap_or(sibling);
                parent.first_last_child = Some((first, child));
            }
        }

        Ok(())
    }

    /// Detaches the node from it's parent and siblings.
    ///
    /// The children of the node are not detached.
    pub fn detach(&mut self, index: Index) -> Result<(), Error> {
        self.is_present(index)?;

        let node = &mut self.inner[index];
        let parent = node.parent.take();
        let prev = node.prev.take();
        let next = node.next.take();

        // Relink the siblings around the node.
        if let Some(prev) = prev {
            self.inner[prev].next = next;
        }

        if let Some(next) = next {
            self.inner[next].prev = prev;
        }

        if let Some(parent) = parent {
            let parent = &mut self.inner[parent];

            if let Some((first, last)) = parent.first_last_child {
                let first = if first == index { next } else { Some(first) };
                let last = if last == index { prev } else { Some(last) };
                parent.first_last_child = first.zip(last);
            }
        }

        Ok(())
    }

    /// Returns the topmost ancestor of the node, or the node itself if it has no parent.
    pub fn root(&self, index: Index) -> Option<Index> {
        let mut current = self.get(index)?;

        while let Some(parent) = current.parent {
            current = self.get(parent)?;
        }

        Some(current.index)
    }

    pub fn children(&self, index: Index) -> Children<'_, T> {
        let (first_child, last_child) = self
            .get(index)
            .map(|node| (Node::first_child(node), Node::last_child(node)))
            .unzip();

        Children {
            forest: self,
            next: first_child.flatten(),
            last: last_child.flatten(),
        }
    }

    fn is_present(&self, index: Index) -> Result<(), Error> {
        if !self.contains_index(index) {
            return Err(Error::NotPresent(index));
        }

        Ok(())
    }

    fn check_sibling(&self, index: Index, child: Index, sibling: Index) -> Result<(), Error> {
        self.is_present(index)?;
        self.is_present(child)?;
        self.is_present(sibling)?;

        if child == sibling {
            return Err(Error::SelfSibling);
        }

        if self.inner[sibling].parent != Some(index) {
            return Err(Error::NotChild(sibling));
        }

        self.check_for_cycles(index, child)
    }

    fn check_for_cycles(&self, index: Index, inserting: Index) -> Result<(), Error> {
        // 1. If the two nodes are the same, then a cycle is guaranteed.
        if index == inserting {
            return Err(Error::Cycle);
        }

        // 2. If the node being inserted has no parents, siblings or children a cycle is impossible.
        let inserting_node = &self.inner[inserting];

        if inserting_node.parent.is_none()
            && inserting_node.prev.is_none()
            && inserting_node.next.is_none()
            && inserting_node.first_last_child.is_none()
        {
            return Ok(());
        }

        // 3. The node being inserted must not be an ancestor of the new parent.
        let mut ancestor = Some(index);

        while let Some(current) = ancestor {
            if current == inserting {
                return Err(Error::Cycle);
            }

            ancestor = self.inner[current].parent;
        }

        Ok(())
    }
}

new_key_type! {
    /// The index to a value in a [`Forest`].
    ///
    /// This type should be considered as raw, meaning that specific node types are given a special index type
    /// that wraps an instance of [`Index`].
    pub struct Index;
}

#[derive(Debug)]
pub struct Node<T> {
    value: T,
    index: Index,
    parent: Option<Index>,
    prev: Option<Index>,
    next: Option<Index>,
    /// The first and last children of the node (first, last).
    first_last_child: Option<(Index, Index)>,
}

impl<T> Node<T> {
    /// ```
    /// use aerugo_roles::forest::{Forest, Node};
    ///
    /// let mut forest = Forest::new();
    /// let index = forest.insert(());
    ///
    /// let node = forest.get(index).unwrap();
    /// assert_eq!(index, Node::index(node));
    /// ```
    pub fn index(self_: &Self) -> Index {
        self_.index
    }

    pub fn parent(self_: &Self) -> Option<Index> {
        self_.parent
    }

    pub fn prev_sibling(self_: &Self) -> Option<Index> {
        self_.prev
    }

    pub fn next_sibling(self_: &Self) -> Option<Index> {
        self_.next
    }

    pub fn first_child(self_: &Self) -> Option<Index> {
        self_.first_last_child.map(|(first, _)| first)
    }

    pub fn last_child(self_: &Self) -> Option<Index> {
        self_.first_last_child.map(|(_, last)| last)
    }
}

impl<T> Deref for Node<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> DerefMut for Node<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

#[derive(Clone)]
pub struct Children<'f, T> {
    forest: &'f Forest<T>,
    next: Option<Index>,
    last: Option<Index>,
}

impl<T> Iterator for Children<'_, T> {
    type Item = Index;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.next.take()?;

        if Some(next) != self.last {
            self.next = self.forest.get(next).and_then(Node::next_sibling);
        }

        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, Forest, Node};

    /// Ensure a node cannot become it's own child.
    #[test]
    fn self_cyclic_node() {
        let mut forest = Forest::new();
        let a = forest.insert(());

        assert!(matches!(forest.add_child(a, a), Err(Error::Cycle)));
    }

    /// Ensure a node does not form a parent-child loop.
    #[test]
    fn parent_cycle() {
        let mut forest = Forest::new();
        let a = forest.insert(());
        let b = forest.insert(());
        // a -> b
        forest.add_child(a, b).unwrap();
        assert!(matches!(forest.add_child(b, a), Err(Error::Cycle)));
    }

    /// a -> b -> c, then c may not adopt a.
    #[test]
    fn grandparent_cycle() {
        let mut forest = Forest::new();
        let a = forest.insert(());
        let b = forest.insert(());
        let c = forest.insert(());
        forest.add_child(a, b).unwrap();
        forest.add_child(b, c).unwrap();

        assert!(matches!(forest.add_child(c, a), Err(Error::Cycle)));
        assert_eq!(forest.root(c), Some(a));
    }

    #[test]
    fn triangle() {
        let mut forest = Forest::new();
        let a = forest.insert(0);
        let b = forest.insert(1);
        let c = forest.insert(2);

        //    a
        //  /   \
        // b <-> c
        forest.add_child(a, b).unwrap();
        forest.add_child(a, c).unwrap();

        let node_a = forest.get(a).unwrap();
        // a has two children, b and c. As such the first child should be b and last child c.
        assert_eq!(Node::first_child(node_a), Some(b));
        assert_eq!(Node::last_child(node_a), Some(c));

        // b's next sibling should be c.
        let node_b = forest.get(b).unwrap();
        assert_eq!(Node::parent(node_b), Some(a));
        assert_eq!(Node::prev_sibling(node_b), None);
        assert_eq!(Node::next_sibling(node_b), Some(c));

        // c's previous sibling should be b.
        let node_c = forest.get(c).unwrap();
        assert_eq!(Node::parent(node_c), Some(a));
        assert_eq!(Node::prev_sibling(node_c), Some(b));
        assert_eq!(Node::next_sibling(node_c), None);

        let mut children = forest.children(a);
        assert_eq!(children.next(), Some(b));
        assert_eq!(children.next(), Some(c));
        assert_eq!(children.next(), None);
    }

    /// Detaching the middle, first and last children keeps the sibling links consistent.
    #[test]
    fn detach_relinks_siblings() {
        let mut forest = Forest::new();
        let root = forest.insert(0);
        let [a, b, c, d] = [1, 2, 3, 4].map(|v| forest.insert(v));

        for child in [a, b, c, d] {
            forest.add_child(root, child).unwrap();
        }

        forest.detach(b).unwrap();
        assert_eq!(forest.children(root).collect::<Vec<_>>(), vec![a, c, d]);
        assert_eq!(Node::prev_sibling(forest.get(c).unwrap()), Some(a));

        forest.detach(a).unwrap();
        assert_eq!(forest.children(root).collect::<Vec<_>>(), vec![c, d]);
        assert_eq!(Node::prev_sibling(forest.get(c).unwrap()), None);

        forest.detach(d).unwrap();
        assert_eq!(forest.children(root).collect::<Vec<_>>(), vec![c]);

        forest.detach(c).unwrap();
        assert_eq!(forest.children(root).count(), 0);
        assert_eq!(Node::parent(forest.get(c).unwrap()), None);
    }

    /// Nodes can be placed directly next to an existing child.
    #[test]
    fn insert_relative_to_sibling() {
        let mut forest = Forest::new();
        let root = forest.insert(0);
        let [a, b, c, d] = [1, 2, 3, 4].map(|v| forest.insert(v));

        forest.add_child(root, a).unwrap();
        forest.insert_before(root, b, a).unwrap();
        assert_eq!(forest.children(root).collect::<Vec<_>>(), vec![b, a]);

        forest.insert_after(root, c, a).unwrap();
        assert_eq!(forest.children(root).collect::<Vec<_>>(), vec![b, a, c]);

        forest.insert_after(root, d, b).unwrap();
        assert_eq!(forest.children(root).collect::<Vec<_>>(), vec![b, d, a, c]);

        // Moving an attached node relinks it.
        forest.insert_before(root, c, b).unwrap();
        assert_eq!(forest.children(root).collect::<Vec<_>>(), vec![c, b, d, a]);

        assert_eq!(forest.insert_after(root, a, a), Err(Error::SelfSibling));
    }

    /// The sibling must belong to the parent.
    #[test]
    fn insert_relative_to_stranger() {
        let mut forest = Forest::new();
        let root = forest.insert(0);
        let a = forest.insert(1);
        let stranger = forest.insert(2);

        assert_eq!(forest.insert_before(root, a, stranger), Err(Error::NotChild(stranger)));
    }

    /// Removing a node turns its children into roots.
    #[test]
    fn remove_orphans_children() {
        let mut forest = Forest::new();
        let root = forest.insert(0);
        let a = forest.insert(1);
        let b = forest.insert(2);
        forest.add_child(root, a).unwrap();
        forest.add_child(a, b).unwrap();

        assert_eq!(forest.remove(a), Ok(1));
        assert_eq!(forest.children(root).count(), 0);
        assert_eq!(forest.root(b), Some(b));
        assert!(!forest.contains_index(a));
    }
}
