//! Deferred work items.
//!
//! A [`WorkItem`] is created every time a handler's work is deferred. It owns
//! a copy of the caller's context, keeps its device alive, and records which
//! queue currently holds it.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use axerrno::{AxError, AxResult};
use spin::Mutex;

use crate::device::{DeviceHandle, PepDevice};

use super::queue::QueueMembership;
use super::routing::{HandlerRequest, HandlerResult, NotificationHandler};
use super::{NotificationCategory, NotificationId};

/// Unique identifier of a work item within one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkId(pub u64);

/// Identity of a work item, used for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkTag {
    /// Work item id.
    pub id: WorkId,
    /// Category the notification arrived on.
    pub category: NotificationCategory,
    /// Notification being serviced.
    pub notification_id: NotificationId,
    /// Device the work belongs to.
    pub device: DeviceHandle,
}

/// Status of a request as seen by the caller that dispatched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Nothing has been written yet.
    Idle,
    /// Work was deferred and has not finished.
    Pending,
    /// Handler finished successfully.
    Success,
    /// Handler finished with an error.
    Failed(AxError),
}

impl From<AxResult> for RequestStatus {
    fn from(result: AxResult) -> Self {
        match result {
            Ok(()) => RequestStatus::Success,
            Err(err) => RequestStatus::Failed(err),
        }
    }
}

/// Caller-owned result slot shared with a deferred work item.
///
/// The engine writes [`RequestStatus::Pending`] once, when the work is
/// scheduled. Handlers may overwrite it afterwards.
#[derive(Clone)]
pub struct StatusSlot(Arc<Mutex<RequestStatus>>);

impl StatusSlot {
    /// Creates a slot in the [`RequestStatus::Idle`] state.
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(RequestStatus::Idle)))
    }

    /// Reads the current status.
    pub fn get(&self) -> RequestStatus {
        *self.0.lock()
    }

    /// Overwrites the status.
    pub fn set(&self, status: RequestStatus) {
        *self.0.lock() = status;
    }
}

impl Default for StatusSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StatusSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StatusSlot").field(&self.get()).finish()
    }
}

/// Kind of work the host is asked to perform for a completed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkKind {
    /// The request finished; nothing else is needed.
    #[default]
    Completion,
    /// Deliver a device notify code on behalf of the device.
    DeviceNotify(u32),
    /// Plugin-specific work code.
    Custom(u32),
}

/// Output a deferred handler fills in for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkInfo {
    /// What the host should do with this report.
    pub kind: WorkKind,
    /// Final result of the request.
    pub result: AxResult,
    /// Handler output bytes.
    pub output: Vec<u8>,
}

impl Default for WorkInfo {
    fn default() -> Self {
        Self {
            kind: WorkKind::Completion,
            result: Ok(()),
            output: Vec::new(),
        }
    }
}

/// Deferred unit of work.
///
/// Items move by value between the pending and completed queues, so an item
/// can only be in one place at a time. The membership tag mirrors that and is
/// checked on every enqueue.
pub struct WorkItem {
    id: WorkId,
    category: NotificationCategory,
    notification_id: NotificationId,
    device: Arc<PepDevice>,
    handler: Arc<dyn NotificationHandler>,
    context: Vec<u8>,
    status: Option<StatusSlot>,
    completed: bool,
    membership: QueueMembership,
    info: WorkInfo,
}

impl WorkItem {
    pub(crate) fn new(
        id: WorkId,
        category: NotificationCategory,
        notification_id: NotificationId,
        device: Arc<PepDevice>,
        handler: Arc<dyn NotificationHandler>,
        context: Vec<u8>,
        status: Option<StatusSlot>,
    ) -> Self {
        Self {
            id,
            category,
            notification_id,
            device,
            handler,
            context,
            status,
            completed: false,
            membership: QueueMembership::Detached,
            info: WorkInfo::default(),
        }
    }

    /// Gets the work item id.
    #[inline]
    pub fn id(&self) -> WorkId {
        self.id
    }

    /// Gets the identity of this item for diagnostics.
    pub fn tag(&self) -> WorkTag {
        WorkTag {
            id: self.id,
            category: self.category,
            notification_id: self.notification_id,
            device: self.device.handle(),
        }
    }

    /// Gets the category the notification arrived on.
    #[inline]
    pub fn category(&self) -> NotificationCategory {
        self.category
    }

    /// Gets the notification id being serviced.
    #[inline]
    pub fn notification_id(&self) -> NotificationId {
        self.notification_id
    }

    /// Gets the owning device.
    #[inline]
    pub fn device(&self) -> &Arc<PepDevice> {
        &self.device
    }

    /// Gets the copied context.
    #[inline]
    pub fn context(&self) -> &[u8] {
        &self.context
    }

    /// Gets the caller's result slot, if one was supplied.
    #[inline]
    pub fn status(&self) -> Option<&StatusSlot> {
        self.status.as_ref()
    }

    /// Gets the output recorded for the host.
    #[inline]
    pub fn info(&self) -> &WorkInfo {
        &self.info
    }

    /// Returns whether the deferred handler has finished.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Returns the queue currently holding this item.
    #[inline]
    pub fn membership(&self) -> QueueMembership {
        self.membership
    }

    #[inline]
    pub(crate) fn set_membership(&mut self, membership: QueueMembership) {
        self.membership = membership;
    }

    /// Runs the deferred handler against the copied context.
    pub(crate) fn execute(&mut self) -> HandlerResult {
        let mut request = HandlerRequest {
            device: &self.device,
            category: self.category,
            notification_id: self.notification_id,
            context: &mut self.context,
            status: self.status.as_ref(),
        };
        self.handler.handle(&mut request, Some(&mut self.info))
    }

    /// Marks the item completed and records a failing result.
    ///
    /// # Panics
    ///
    /// Panics if the item was already completed.
    pub(crate) fn mark_completed(&mut self, result: AxResult) {
        assert!(!self.completed, "work item {:?} completed twice", self.id);
        self.completed = true;
        if result.is_err() {
            self.info.result = result;
        }
    }

    /// Splits the item into the parts reported to the host.
    pub(crate) fn into_parts(self) -> (WorkTag, Vec<u8>, WorkInfo) {
        let tag = self.tag();
        (tag, self.context, self.info)
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("notification_id", &self.notification_id)
            .field("device", &self.device.handle())
            .field("context_len", &self.context.len())
            .field("completed", &self.completed)
            .field("membership", &self.membership)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::definition::{DeviceDefinition, DeviceType};
    use crate::device::KernelHandle;
    use alloc::string::String;

    /// Builds a standalone device for queue and item tests.
    pub(crate) fn test_device(handle: usize) -> Arc<PepDevice> {
        let definition = Arc::new(DeviceDefinition::new(DeviceType(1)));
        Arc::new(
            PepDevice::new(
                DeviceHandle(handle),
                KernelHandle(0),
                NotificationCategory::Acpi,
                definition,
                String::from("\\_SB.TEST"),
            )
            .unwrap(),
        )
    }

    /// Builds a detached work item whose handler completes immediately.
    pub(crate) fn test_item(id: u64) -> WorkItem {
        WorkItem::new(
            WorkId(id),
            NotificationCategory::Acpi,
            NotificationId(7),
            test_device(1),
            Arc::new(|_: &mut HandlerRequest<'_>, _: Option<&mut WorkInfo>| {
                HandlerResult::Complete(Ok(()))
            }),
            alloc::vec![id as u8],
            None,
        )
    }
}
