//! Deferred buffer release.
//!
//! A buffer replaced by a commit may still be read by the renderer. Such a buffer is recorded in the tracker of
//! the role owning the window and released once it becomes idle or is destroyed. The role defers frame callbacks
//! while any record exists, so clients never see a frame callback before the release of the buffer it replaced.

use crate::buffer::BufferId;

#[derive(Debug, Default)]
pub struct BufferReleaseTracker {
    records: Vec<BufferId>,
}

impl BufferReleaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a buffer which must be released once it becomes idle.
    ///
    /// A buffer may be recorded more than once if it was attached and replaced several times while busy. Each
    /// record produces one release.
    pub fn track(&mut self, buffer: BufferId) {
        self.records.push(buffer);
    }

    pub fn contains(&self, buffer: BufferId) -> bool {
        self.records.contains(&buffer)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Removes every record of the buffer, returning how many were removed.
    pub fn remove(&mut self, buffer: BufferId) -> usize {
        let before = self.records.len();
        self.records.retain(|&record| record != buffer);
        before - self.records.len()
    }

    /// Removes all records, in the order they were made.
    pub fn drain(&mut self) -> Vec<BufferId> {
        std::mem::take(&mut self.records)
    }
}
