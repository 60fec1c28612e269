//! Notification dispatch and deferred work management.
//!
//! The host calls into the plugin through a single synchronous entry point.
//! Each call carries a category, a notification id and a payload. This module
//! classifies the call, routes it to the owning device's handler table and,
//! when a handler cannot finish inline, runs it later on a background task.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │    Host     │ notify(category, id, payload)
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌────────────────────────┐
//! │ PepEngine              │ Built-in notifications (register, work, ...)
//! │  - DeviceRegistry      │ Device ownership by id string
//! │  - HandlerTable        │ Per device, per category routing
//! └──────┬─────────────────┘
//!        │ immediate handler         deferred handler
//!        ▼                                  │
//!   inline result             ┌─────────────▼────────────┐
//!                             │ WorkQueues (one lock)    │
//!                             │  pending ──▶ completed   │
//!                             └─────────────┬────────────┘
//!                                           │ request more work
//!                                           ▼
//!                                 Host drains with WORK
//! ```
//!
//! # Work item lifecycle
//!
//! 1. A handler needs more time: a [`WorkItem`] is built with a copy of the
//!    caller's context and pushed to the pending queue.
//! 2. The [`WorkerScheduler`] drains the pending queue on a background task,
//!    or inline when no task could be created.
//! 3. The deferred handler finishes; the item moves to the completed queue and
//!    the host's request-more-work hook fires.
//! 4. The host sends a `WORK` notification; one completed item is reported per
//!    call until the queue is empty.

mod manager;
mod notifier;
mod payload;
mod queue;
mod routing;
mod scheduler;
mod work;

pub use manager::{DispatchOutcome, PepEngine};
pub use notifier::{HostInterface, RequestMoreWork};
pub use payload::{DispatchRequest, Payload, WorkReport};
pub use queue::{QueueMembership, WorkQueues};
pub use routing::{
    HandlerEntry, HandlerRequest, HandlerResult, HandlerSelection, HandlerSlot, HandlerTable,
    NotificationHandler,
};
pub use scheduler::{NoTaskPool, PendingWork, TaskSpawner, WorkerScheduler};
pub use work::{RequestStatus, StatusSlot, WorkId, WorkInfo, WorkItem, WorkKind, WorkTag};

use bitflags::bitflags;

/// Class of inbound notification.
///
/// Every device definition carries one handler table per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NotificationCategory {
    /// ACPI runtime notifications (namespace, methods, resources).
    Acpi,
    /// Device power management notifications.
    Dpm,
}

impl NotificationCategory {
    /// All categories, in table order.
    pub const ALL: [NotificationCategory; 2] = [NotificationCategory::Acpi, NotificationCategory::Dpm];

    /// Returns the mask bit for this category.
    #[inline]
    pub const fn mask(self) -> CategoryMask {
        match self {
            NotificationCategory::Acpi => CategoryMask::ACPI,
            NotificationCategory::Dpm => CategoryMask::DPM,
        }
    }
}

bitflags! {
    /// Set of categories a device match entry claims ownership for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CategoryMask: u32 {
        /// ACPI notifications.
        const ACPI = 1 << 0;
        /// Device power management notifications.
        const DPM = 1 << 1;
    }
}

/// Identifier of a notification within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NotificationId(pub u32);

/// ACPI notification ids.
pub mod acpi {
    use super::NotificationId;

    /// Host asks whether the plugin owns a device id.
    pub const PREPARE_DEVICE: NotificationId = NotificationId(1);
    /// Host gives up on a device it prepared but never registered.
    pub const ABANDON_DEVICE: NotificationId = NotificationId(2);
    /// Host registers an accepted device.
    pub const REGISTER_DEVICE: NotificationId = NotificationId(3);
    /// Host unregisters a device.
    pub const UNREGISTER_DEVICE: NotificationId = NotificationId(4);
    /// Host asks for the objects a device implements.
    pub const ENUMERATE_DEVICE_NAMESPACE: NotificationId = NotificationId(5);
    /// Host asks for argument counts of one object.
    pub const QUERY_OBJECT_INFORMATION: NotificationId = NotificationId(6);
    /// Host evaluates a control method.
    pub const EVALUATE_CONTROL_METHOD: NotificationId = NotificationId(7);
    /// Host queries raw control resources.
    pub const QUERY_DEVICE_CONTROL_RESOURCES: NotificationId = NotificationId(8);
    /// Host hands over translated control resources.
    pub const TRANSLATED_DEVICE_CONTROL_RESOURCES: NotificationId = NotificationId(9);
    /// Host drains one completed work item.
    pub const WORK: NotificationId = NotificationId(10);
}

/// Device power management notification ids.
pub mod dpm {
    use super::NotificationId;

    /// Host asks whether the plugin owns a device id.
    pub const PREPARE_DEVICE: NotificationId = NotificationId(1);
    /// Host gives up on a device it prepared but never registered.
    pub const ABANDON_DEVICE: NotificationId = NotificationId(2);
    /// Host registers an accepted device.
    pub const REGISTER_DEVICE: NotificationId = NotificationId(3);
    /// Host unregisters a device.
    pub const UNREGISTER_DEVICE: NotificationId = NotificationId(4);
    /// Device power state is changing.
    pub const DEVICE_POWER_STATE: NotificationId = NotificationId(5);
    /// A component became active.
    pub const COMPONENT_ACTIVE: NotificationId = NotificationId(6);
    /// A component idle state is changing.
    pub const COMPONENT_IDLE_STATE: NotificationId = NotificationId(7);
    /// Host drains one completed work item.
    pub const WORK: NotificationId = NotificationId(13);
}

/// Built-in operation a notification id maps to, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuiltIn {
    PrepareDevice,
    AbandonDevice,
    RegisterDevice,
    UnregisterDevice,
    EnumerateNamespace,
    QueryObjectInformation,
    Work,
}

impl BuiltIn {
    /// Classifies a notification. `None` means it is routed to device handlers.
    pub(crate) fn classify(category: NotificationCategory, id: NotificationId) -> Option<Self> {
        match category {
            NotificationCategory::Acpi => match id {
                acpi::PREPARE_DEVICE => Some(Self::PrepareDevice),
                acpi::ABANDON_DEVICE => Some(Self::AbandonDevice),
                acpi::REGISTER_DEVICE => Some(Self::RegisterDevice),
                acpi::UNREGISTER_DEVICE => Some(Self::UnregisterDevice),
                acpi::ENUMERATE_DEVICE_NAMESPACE => Some(Self::EnumerateNamespace),
                acpi::QUERY_OBJECT_INFORMATION => Some(Self::QueryObjectInformation),
                acpi::WORK => Some(Self::Work),
                _ => None,
            },
            NotificationCategory::Dpm => match id {
                dpm::PREPARE_DEVICE => Some(Self::PrepareDevice),
                dpm::ABANDON_DEVICE => Some(Self::AbandonDevice),
                dpm::REGISTER_DEVICE => Some(Self::RegisterDevice),
                dpm::UNREGISTER_DEVICE => Some(Self::UnregisterDevice),
                dpm::WORK => Some(Self::Work),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mask() {
        let both = CategoryMask::ACPI | CategoryMask::DPM;
        assert!(both.contains(NotificationCategory::Acpi.mask()));
        assert!(both.contains(NotificationCategory::Dpm.mask()));
        assert!(!CategoryMask::ACPI.contains(NotificationCategory::Dpm.mask()));
    }

    #[test]
    fn test_builtin_classification() {
        assert_eq!(
            BuiltIn::classify(NotificationCategory::Acpi, acpi::WORK),
            Some(BuiltIn::Work)
        );
        assert_eq!(
            BuiltIn::classify(NotificationCategory::Dpm, dpm::WORK),
            Some(BuiltIn::Work)
        );
        // Id 5 is a namespace query for ACPI but a power state change for DPM.
        assert_eq!(
            BuiltIn::classify(NotificationCategory::Acpi, NotificationId(5)),
            Some(BuiltIn::EnumerateNamespace)
        );
        assert_eq!(BuiltIn::classify(NotificationCategory::Dpm, dpm::DEVICE_POWER_STATE), None);
        assert_eq!(
            BuiltIn::classify(NotificationCategory::Acpi, acpi::EVALUATE_CONTROL_METHOD),
            None
        );
    }
}
