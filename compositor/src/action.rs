//! Deferred restacking of subsurfaces
//!
//! `place_above` and `place_below` do not restack immediately. The request is validated, then queued on the parent
//! and applied when the parent next commits. The queue is stored newest first and walked from the back, so actions
//! run in the order they were requested and the last request on a subsurface decides it's final position.
//!
//! An action is dropped when the surface it is placed relative to is destroyed. Actions are validated again when
//! they run, since the relationship between the surfaces may have changed in the meantime. An action which is no
//! longer valid is skipped without an error.

use std::mem;

use slotmap::new_key_type;

use crate::{
    error::{ProtocolError, Result},
    role::{RoleId, RoleType},
    state::Compositor,
    surface::SurfaceId,
};

new_key_type! {
    pub struct ActionId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    PlaceAbove,
    PlaceBelow,
}

#[derive(Debug)]
pub(crate) struct SurfaceAction {
    kind: ActionKind,

    /// The subsurface role being restacked.
    subject: RoleId,

    /// The surface whose queue holds the action.
    parent: SurfaceId,

    /// The sibling or the parent the subject is placed relative to.
    relative_to: SurfaceId,
}

impl Compositor {
    /// Queues a restacking action on the parent of the subsurface.
    pub(crate) fn enqueue_action(
        &mut self,
        kind: ActionKind,
        subject: RoleId,
        parent: SurfaceId,
        relative_to: SurfaceId,
    ) -> Result<()> {
        let Some(queue) = self.surfaces.get_mut(parent) else {
            return Ok(());
        };
        queue.actions.try_reserve(1).map_err(|_| ProtocolError::NoMemory)?;

        let Some(target) = self.surfaces.get_mut(relative_to) else {
            return Ok(());
        };
        target.targeted_by.try_reserve(1).map_err(|_| ProtocolError::NoMemory)?;

        let action = self.actions.insert(SurfaceAction {
            kind,
            subject,
            parent,
            relative_to,
        });

        if let Some(target) = self.surfaces.get_mut(relative_to) {
            target.targeted_by.push(action);
        }

        if let Some(queue) = self.surfaces.get_mut(parent) {
            queue.actions.insert(0, action);
        }

        tracing::trace!(?kind, ?subject, ?relative_to, "Queued surface action");
        Ok(())
    }

    /// Runs and drops every action queued on the surface, oldest first.
    pub(crate) fn run_surface_actions(&mut self, surface: SurfaceId) {
        let Some(queue) = self.surfaces.get_mut(surface).map(|data| mem::take(&mut data.actions)) else {
            return;
        };

        for id in queue.into_iter().rev() {
            let Some(action) = self.actions.remove(id) else {
                continue;
            };

            if let Some(target) = self.surfaces.get_mut(action.relative_to) {
                target.targeted_by.retain(|&other| other != id);
            }

            self.run_one_action(&action);
        }
    }

    /// Drops the queue of a surface which is being destroyed.
    pub(crate) fn free_action_queue(&mut self, surface: SurfaceId) {
        let Some(queue) = self.surfaces.get_mut(surface).map(|data| mem::take(&mut data.actions)) else {
            return;
        };

        for id in queue {
            if let Some(action) = self.actions.remove(id) {
                if let Some(target) = self.surfaces.get_mut(action.relative_to) {
                    target.targeted_by.retain(|&other| other != id);
                }
            }
        }
    }

    /// Drops every action placed relative to a surface which is being destroyed.
    pub(crate) fn cancel_actions_targeting(&mut self, surface: SurfaceId) {
        let Some(targeted_by) = self
            .surfaces
            .get_mut(surface)
            .map(|data| mem::take(&mut data.targeted_by))
        else {
            return;
        };

        for id in targeted_by {
            if let Some(action) = self.actions.remove(id) {
                if let Some(queue) = self.surfaces.get_mut(action.parent) {
                    queue.actions.retain(|&other| other != id);
                }

                tracing::trace!(?surface, "Dropped surface action with destroyed target");
            }
        }
    }

    /// Drops the actions of a subsurface which is being detached from the parent.
    pub(crate) fn cancel_actions_of_subject(&mut self, parent: SurfaceId, subject: RoleId) {
        let Some(queue) = self.surfaces.get_mut(parent) else {
            return;
        };

        let actions = &self.actions;
        let mut cancelled = Vec::new();

        queue.actions.retain(|&id| match actions.get(id) {
            Some(action) if action.subject == subject => {
                cancelled.push(id);
                false
            }
            _ => true,
        });

        for id in cancelled {
            if let Some(action) = self.actions.remove(id) {
                if let Some(target) = self.surfaces.get_mut(action.relative_to) {
                    target.targeted_by.retain(|&other| other != id);
                }
            }
        }
    }

    /// Returns the number of actions waiting on the queue of the surface.
    pub fn pending_actions(&self, surface: SurfaceId) -> usize {
        self.surfaces.get(surface).map_or(0, |data| data.actions.len())
    }

    fn run_one_action(&mut self, action: &SurfaceAction) {
        let Some(surface) = self.roles.get(action.subject).and_then(|slot| slot.surface) else {
            return;
        };

        if self.subsurface_parent(action.subject) != Some(action.parent) {
            return;
        }

        let other = action.relative_to;

        if other != action.parent && !self.is_sibling(action.subject, other) {
            tracing::trace!(?surface, ?other, "Skipping surface action on non sibling");
            return;
        }

        let (Some(subject), Some(other_data), Some(parent)) = (
            self.surfaces.get(surface),
            self.surfaces.get(other),
            self.surfaces.get(action.parent),
        ) else {
            return;
        };

        let (view, under) = (subject.view, subject.under);
        let (other_view, other_under) = (other_data.view, other_data.under);
        let (parent_view, parent_under) = (parent.view, parent.under);

        if other == action.parent {
            self.scene.unparent(view);
            self.scene.unparent(under);

            // Relative to the parent, the subject goes above or below every other child.
            let target = match action.kind {
                ActionKind::PlaceAbove => parent_view,
                ActionKind::PlaceBelow => parent_under,
            };

            self.scene.insert(target, under);
            self.scene.insert(target, view);
        } else {
            let Some(target) = self.scene.parent(other_view) else {
                return;
            };

            self.scene.unparent(view);
            self.scene.unparent(under);

            match action.kind {
                ActionKind::PlaceAbove => {
                    self.scene.insert_after(target, under, other_view);
                    self.scene.insert_after(target, view, under);
                }

                ActionKind::PlaceBelow => {
                    self.scene.insert_before(target, view, other_under);
                    self.scene.insert_before(target, under, view);
                }
            }
        }

        tracing::trace!(?surface, ?other, kind = ?action.kind, "Applied surface action");
    }

    /// Returns whether the surface holds a subsurface role with the same parent as the subsurface.
    pub(crate) fn is_sibling(&self, subsurface: RoleId, other: SurfaceId) -> bool {
        let Some(data) = self.surfaces.get(other) else {
            return false;
        };

        if data.role_type != Some(RoleType::Subsurface) {
            return false;
        }

        let Some(role) = data.role else {
            return false;
        };

        let parent = self.subsurface_parent(role);
        role != subsurface && parent.is_some() && parent == self.subsurface_parent(subsurface)
    }
}
