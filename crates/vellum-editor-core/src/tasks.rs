//! Deferred work queue.
//!
//! Work that must happen after the current event has been fully handled
//! (clearing the suppression flag, restoring the caret, recomputing the
//! visible window) is scheduled here and drained by the host once the event
//! returns, the way a browser drains microtasks.

use std::collections::VecDeque;

/// A unit of deferred work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Microtask {
    /// Put the caret back after a programmatic write.
    RestoreCaret {
        /// Caret offset saved before the write.
        saved_offset: usize,
        /// Visible text before the write, used to transform the offset.
        previous_text: String,
    },
    /// End the echo-suppression window.
    ClearSuppression,
    /// Block sequence changed; the visible window must be recomputed.
    Rewindow,
}

/// FIFO queue of deferred work.
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    tasks: VecDeque<Microtask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, task: Microtask) {
        tracing::trace!(target: "vellum::tasks", ?task, "scheduled");
        self.tasks.push_back(task);
    }

    /// Schedule unless an equal task is already pending.
    pub fn schedule_once(&mut self, task: Microtask) {
        if !self.tasks.contains(&task) {
            self.schedule(task);
        }
    }

    pub fn pop(&mut self) -> Option<Microtask> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_pending(&self, task: &Microtask) -> bool {
        self.tasks.contains(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = TaskQueue::new();
        queue.schedule(Microtask::Rewindow);
        queue.schedule(Microtask::ClearSuppression);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(Microtask::Rewindow));
        assert_eq!(queue.pop(), Some(Microtask::ClearSuppression));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_schedule_once_dedupes() {
        let mut queue = TaskQueue::new();
        queue.schedule_once(Microtask::Rewindow);
        queue.schedule_once(Microtask::Rewindow);
        assert_eq!(queue.len(), 1);
        assert!(queue.is_pending(&Microtask::Rewindow));
    }
}
