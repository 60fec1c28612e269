//! Pending and completed work queues.
//!
//! Both queues live in one structure so that the engine can guard them with a
//! single lock. Moving an item from pending to completed is then atomic with
//! respect to every other producer and consumer.

use alloc::collections::VecDeque;

use axerrno::{ax_err_type, AxResult};

use super::work::WorkItem;

/// Queue that currently holds a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMembership {
    /// Not on any queue.
    Detached,
    /// Waiting for its deferred handler to run.
    Pending,
    /// Finished, waiting for the host to drain it.
    Completed,
}

/// FIFO pending and completed queues.
///
/// The structure does no locking of its own; the engine wraps it in its
/// state lock.
///
/// # Usage
///
/// ```rust,ignore
/// let mut queues = WorkQueues::new();
///
/// queues.push_pending(item)?;
/// let mut item = queues.pop_pending().unwrap();
/// item.mark_completed(Ok(()));
/// queues.push_completed(item)?;
/// ```
pub struct WorkQueues {
    pending: VecDeque<WorkItem>,
    completed: VecDeque<WorkItem>,
}

impl WorkQueues {
    /// Creates empty queues.
    pub const fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            completed: VecDeque::new(),
        }
    }

    /// Appends an item to the pending queue.
    ///
    /// # Errors
    ///
    /// Returns `NoMemory` if queue storage cannot grow. The item is dropped
    /// and nothing is queued.
    ///
    /// # Panics
    ///
    /// Panics if the item is already on a queue.
    pub fn push_pending(&mut self, mut item: WorkItem) -> AxResult {
        assert_eq!(
            item.membership(),
            QueueMembership::Detached,
            "work item {:?} enqueued while on another queue",
            item.id()
        );
        self.pending
            .try_reserve(1)
            .map_err(|_| ax_err_type!(NoMemory, "pending queue is full"))?;
        item.set_membership(QueueMembership::Pending);
        self.pending.push_back(item);
        Ok(())
    }

    /// Removes the oldest pending item.
    pub fn pop_pending(&mut self) -> Option<WorkItem> {
        let mut item = self.pending.pop_front()?;
        item.set_membership(QueueMembership::Detached);
        Some(item)
    }

    /// Appends a completed item to the completed queue.
    ///
    /// # Errors
    ///
    /// Returns `NoMemory` if queue storage cannot grow.
    ///
    /// # Panics
    ///
    /// Panics if the item is already on a queue or was never completed.
    pub fn push_completed(&mut self, mut item: WorkItem) -> AxResult {
        assert_eq!(
            item.membership(),
            QueueMembership::Detached,
            "work item {:?} enqueued while on another queue",
            item.id()
        );
        assert!(item.is_completed(), "work item {:?} queued before completion", item.id());
        self.completed
            .try_reserve(1)
            .map_err(|_| ax_err_type!(NoMemory, "completed queue is full"))?;
        item.set_membership(QueueMembership::Completed);
        self.completed.push_back(item);
        Ok(())
    }

    /// Removes the oldest completed item.
    pub fn pop_completed(&mut self) -> Option<WorkItem> {
        let mut item = self.completed.pop_front()?;
        item.set_membership(QueueMembership::Detached);
        Some(item)
    }

    /// Gets the number of pending items.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Gets the number of completed items.
    pub fn completed_len(&self) -> usize {
        self.completed.len()
    }

    /// Checks if both queues are empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.completed.is_empty()
    }

    /// Drops every completed item, returning how many were discarded.
    pub fn discard_completed(&mut self) -> usize {
        let count = self.completed.len();
        self.completed.clear();
        count
    }
}

impl Default for WorkQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::work::test_support::test_item;
    use crate::notify::WorkId;

    #[test]
    fn test_pending_fifo_order() {
        let mut queues = WorkQueues::new();
        for id in 0..5 {
            queues.push_pending(test_item(id)).unwrap();
        }
        assert_eq!(queues.pending_len(), 5);

        for id in 0..5 {
            let item = queues.pop_pending().unwrap();
            assert_eq!(item.id(), WorkId(id));
            assert_eq!(item.membership(), QueueMembership::Detached);
        }
        assert!(queues.pop_pending().is_none());
    }

    #[test]
    fn test_membership_follows_queue() {
        let mut queues = WorkQueues::new();
        queues.push_pending(test_item(1)).unwrap();

        let mut item = queues.pop_pending().unwrap();
        item.mark_completed(Ok(()));
        queues.push_completed(item).unwrap();
        assert_eq!(queues.pending_len(), 0);
        assert_eq!(queues.completed_len(), 1);

        let item = queues.pop_completed().unwrap();
        assert_eq!(item.membership(), QueueMembership::Detached);
        assert!(item.is_completed());
        assert!(queues.is_empty());
    }

    #[test]
    #[should_panic(expected = "enqueued while on another queue")]
    fn test_double_enqueue_rejected() {
        let mut queues = WorkQueues::new();
        let mut item = test_item(1);
        item.set_membership(QueueMembership::Pending);
        let _ = queues.push_pending(item);
    }

    #[test]
    #[should_panic(expected = "queued before completion")]
    fn test_incomplete_item_rejected() {
        let mut queues = WorkQueues::new();
        let _ = queues.push_completed(test_item(1));
    }

    #[test]
    fn test_discard_completed() {
        let mut queues = WorkQueues::new();
        for id in 0..3 {
            let mut item = test_item(id);
            item.mark_completed(Ok(()));
            queues.push_completed(item).unwrap();
        }
        assert_eq!(queues.discard_completed(), 3);
        assert!(queues.is_empty());
    }
}
