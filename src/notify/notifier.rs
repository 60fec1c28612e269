//! Host-side callbacks.
//!
//! The host exposes a "request more work" hook. The engine calls it whenever a
//! completed item is waiting, and the host answers by sending a `WORK`
//! notification that drains one item.

use alloc::sync::Arc;
use core::fmt;

use super::scheduler::{NoTaskPool, TaskSpawner};

/// Hook invoked when completed work is ready for the host.
pub type RequestMoreWork = Arc<dyn Fn() + Send + Sync>;

/// Collaborators supplied by the host when the plugin registers.
///
/// # Usage
///
/// ```rust,ignore
/// let host = HostInterface::new(|| host_scheduler.request_worker())
///     .with_task_pool(Arc::new(ThreadPoolSpawner::new()));
/// ```
#[derive(Clone)]
pub struct HostInterface {
    request_more_work: RequestMoreWork,
    task_pool: Arc<dyn TaskSpawner>,
}

impl HostInterface {
    /// Creates a host interface with the given request-more-work hook.
    ///
    /// No task pool is configured, so deferred work runs inline.
    pub fn new<F>(request_more_work: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            request_more_work: Arc::new(request_more_work),
            task_pool: Arc::new(NoTaskPool),
        }
    }

    /// Sets the task pool used for deferred work.
    pub fn with_task_pool(mut self, task_pool: Arc<dyn TaskSpawner>) -> Self {
        self.task_pool = task_pool;
        self
    }

    /// Gets the task pool.
    pub fn task_pool(&self) -> &Arc<dyn TaskSpawner> {
        &self.task_pool
    }

    /// Asks the host to drain completed work.
    ///
    /// Must never be called with the engine lock held.
    pub(crate) fn request_more_work(&self) {
        trace!("Requesting more work from host");
        (self.request_more_work)();
    }
}

impl fmt::Debug for HostInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostInterface").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_request_more_work_invokes_hook() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let host = HostInterface::new(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        host.request_more_work();
        host.request_more_work();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
