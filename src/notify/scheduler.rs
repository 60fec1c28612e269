//! Background execution of pending work.

use alloc::boxed::Box;
use alloc::sync::Arc;

use axerrno::{ax_err, AxResult};

use super::work::WorkTag;

/// Host task pool used to run deferred work.
pub trait TaskSpawner: Send + Sync {
    /// Starts `task` on a background task.
    ///
    /// # Errors
    ///
    /// Returns an error if no task could be created. The task is dropped
    /// without running.
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>) -> AxResult;
}

/// Task pool that never creates tasks.
///
/// With this pool every deferred handler runs on the dispatching thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTaskPool;

impl TaskSpawner for NoTaskPool {
    fn spawn(&self, _task: Box<dyn FnOnce() + Send + 'static>) -> AxResult {
        ax_err!(Unsupported, "no background task pool")
    }
}

/// Something with a pending queue to drain.
pub trait PendingWork: Send + Sync {
    /// Runs pending work until the queue is empty.
    fn drain_pending(&self);
}

/// Runs pending work on a background task, or inline when none is available.
pub struct WorkerScheduler {
    pool: Arc<dyn TaskSpawner>,
}

impl WorkerScheduler {
    /// Creates a scheduler over a task pool.
    pub fn new(pool: Arc<dyn TaskSpawner>) -> Self {
        Self { pool }
    }

    /// Schedules a drain of `target`'s pending queue.
    ///
    /// `trigger` identifies the item whose enqueue caused this call and is only
    /// used for logging. If the pool cannot create a task, the queue is drained
    /// on the calling thread before returning, so work pushed before this call
    /// is never stranded.
    pub fn run<T>(&self, target: &Arc<T>, trigger: WorkTag)
    where
        T: PendingWork + 'static,
    {
        let worker = Arc::clone(target);
        match self.pool.spawn(Box::new(move || worker.drain_pending())) {
            Ok(()) => {
                trace!("Scheduled background drain for {:?}", trigger);
            }
            Err(err) => {
                warn!(
                    "Worker task creation failed ({:?}); draining inline for {:?}",
                    err, trigger
                );
                target.drain_pending();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceHandle;
    use crate::notify::{NotificationCategory, NotificationId, WorkId};
    use alloc::vec::Vec;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use spin::Mutex;

    #[derive(Default)]
    struct CountingDrain {
        drains: AtomicUsize,
    }

    impl PendingWork for CountingDrain {
        fn drain_pending(&self) {
            self.drains.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct DeferredPool {
        tasks: Mutex<Vec<Box<dyn FnOnce() + Send + 'static>>>,
    }

    impl TaskSpawner for DeferredPool {
        fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>) -> AxResult {
            self.tasks.lock().push(task);
            Ok(())
        }
    }

    fn trigger() -> WorkTag {
        WorkTag {
            id: WorkId(1),
            category: NotificationCategory::Acpi,
            notification_id: NotificationId(7),
            device: DeviceHandle(1),
        }
    }

    #[test]
    fn test_scheduler_fallback_runs_inline() {
        let scheduler = WorkerScheduler::new(Arc::new(NoTaskPool));
        let target = Arc::new(CountingDrain::default());

        scheduler.run(&target, trigger());
        assert_eq!(target.drains.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scheduler_uses_pool() {
        let pool = Arc::new(DeferredPool::default());
        let scheduler = WorkerScheduler::new(pool.clone());
        let target = Arc::new(CountingDrain::default());

        scheduler.run(&target, trigger());
        assert_eq!(target.drains.load(Ordering::SeqCst), 0);

        let tasks: Vec<_> = pool.tasks.lock().drain(..).collect();
        assert_eq!(tasks.len(), 1);
        for task in tasks {
            task();
        }
        assert_eq!(target.drains.load(Ordering::SeqCst), 1);
    }
}
