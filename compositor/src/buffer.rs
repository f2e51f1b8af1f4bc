//! Client buffers.
//!
//! The compositor only tracks the identity and size of a buffer. Reading the contents is the job of the renderer
//! behind the backend, which reports when it stops reading a buffer through [`Compositor::buffer_idle`].

use euclid::default::Size2D;
use slotmap::new_key_type;

use crate::{role::RoleSlot, state::Compositor, ClientEvent};

new_key_type! {
    pub struct BufferId;
}

#[derive(Debug)]
pub(crate) struct Buffer {
    pub(crate) size: Size2D<i32>,
}

impl Compositor {
    pub fn create_buffer(&mut self, width: i32, height: i32) -> BufferId {
        self.buffers.insert(Buffer {
            size: Size2D::new(width, height),
        })
    }

    pub fn buffer_size(&self, buffer: BufferId) -> Option<Size2D<i32>> {
        self.buffers.get(buffer).map(|buffer| buffer.size)
    }

    /// Destroys a buffer.
    ///
    /// A destroyed buffer is never read again, so every role waiting for it to become idle stops waiting.
    pub fn destroy_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(buffer).is_none() {
            return;
        }

        self.note_buffer_released(buffer);
    }

    /// Called by the backend when the renderer no longer reads from the buffer.
    pub fn buffer_idle(&mut self, buffer: BufferId) {
        self.note_buffer_released(buffer);
    }

    /// Sends the release event of a buffer, if the buffer still exists.
    pub(crate) fn release_buffer_now(&mut self, buffer: BufferId) {
        if self.buffers.contains_key(buffer) {
            tracing::trace!(?buffer, "Releasing buffer");
            self.events.push(ClientEvent::BufferRelease { buffer });
        }
    }

    fn note_buffer_released(&mut self, buffer: BufferId) {
        let roles = self
            .roles
            .iter()
            .filter(|(_, slot)| slot.release_tracker().map_or(false, |tracker| tracker.contains(buffer)))
            .map(|(role, _)| role)
            .collect::<Vec<_>>();

        for role in roles {
            let Some(tracker) = self.roles.get_mut(role).and_then(RoleSlot::release_tracker_mut) else {
                continue;
            };

            let records = tracker.remove(buffer);
            let empty = tracker.is_empty();

            for _ in 0..records {
                self.release_buffer_now(buffer);
            }

            if empty {
                self.role_all_buffers_released(role);
            }
        }
    }
}
