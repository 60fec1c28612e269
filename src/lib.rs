#![cfg_attr(not(test), no_std)]

//! # AxPEP: Platform Extension Plugin Engine
//!
//! This crate implements the notification dispatch and deferred work engine of
//! an ACPI platform extension plugin (PEP). The host operating system sends the
//! plugin notifications about devices it owns; the engine decides which
//! notifications belong to which device, runs the device's handlers, and
//! reports work that could not finish inline back to the host.
//! It is designed for `no_std` environments and uses the `alloc` crate for
//! dynamic memory allocation.
//!
//! ## Architecture
//!
//! ### Registration
//! - [`PepConfig`]: Root device plus child device definitions and match entries
//! - [`DeviceDefinition`]: Context size, initializer, operations and handler tables of a device type
//! - [`DeviceRegistry`]: Ownership lookup by device id string (full or partial match)
//!
//! ### Dispatch
//! - [`PepEngine`]: Built-in notifications and routing to device handler tables
//! - [`HandlerTable`]: Per device, per category table of immediate and deferred handlers
//! - [`PepDevice`]: A registered device instance with its context and lifecycle
//!
//! ### Deferred Work
//! - [`WorkItem`]: A deferred request with its copied context
//! - [`WorkQueues`]: FIFO pending and completed queues under one lock
//! - [`WorkerScheduler`]: Background drain with synchronous fallback
//!
//! ## Single Plugin
//!
//! The host callbacks carry no context pointer, so the active engine lives in
//! process-wide state. [`register_plugin`] installs it, [`notify`] forwards to
//! it and [`unregister_plugin`] tears it down. Only one engine may be
//! installed at a time.
//!
//! ## Examples
//!
//! ```rust,ignore
//! use axpep::*;
//!
//! let fan = DeviceDefinition::new(FAN)
//!     .with_context_size(16)
//!     .with_handlers(
//!         NotificationCategory::Acpi,
//!         HandlerTable::new().with_entry(
//!             acpi::EVALUATE_CONTROL_METHOD,
//!             HandlerSlot::new().with_deferred(evaluate_fan_method),
//!         ),
//!     );
//!
//! let config = PepConfig::new(root, root_match)
//!     .with_child(fan, DeviceMatchEntry::new(FAN, CategoryMask::ACPI, "FAN0", MatchMode::Full));
//!
//! register_plugin(config, HostInterface::new(|| host_request_work()))?;
//!
//! let mut payload = Payload::register("FAN0", KernelHandle(handle));
//! axpep::notify(NotificationCategory::Acpi, acpi::REGISTER_DEVICE, &mut payload);
//! ```

extern crate alloc;
#[macro_use]
extern crate log;

mod config;
mod definition;
mod device;
mod lifecycle;
mod registry;
pub mod notify;

use alloc::sync::Arc;

use axerrno::{ax_err, AxResult};
use spin::Mutex;

pub use config::{PepConfig, DEFAULT_MAX_CONTEXT_SIZE};
pub use definition::{
    DeviceDefinition, DeviceInitializer, DeviceOperation, DeviceType, OperationName,
    MAX_DEVICE_OPERATIONS, MAX_OPERATION_NAME_LEN,
};
pub use device::{DeviceHandle, DeviceStats, KernelHandle, PepDevice};
pub use lifecycle::{AccessGuard, DeviceLifecycle, DeviceState};
pub use registry::{DeviceMatchEntry, DeviceRegistry, MatchMode};

// Re-export the dispatch types
pub use notify::{
    acpi, dpm, CategoryMask, DispatchOutcome, DispatchRequest, HandlerEntry, HandlerRequest,
    HandlerResult, HandlerSelection, HandlerSlot, HandlerTable, HostInterface, NoTaskPool,
    NotificationCategory, NotificationHandler, NotificationId, Payload, PendingWork, PepEngine,
    QueueMembership, RequestMoreWork, RequestStatus, StatusSlot, TaskSpawner, WorkId, WorkInfo,
    WorkItem, WorkKind, WorkQueues, WorkReport, WorkTag, WorkerScheduler,
};

/// The installed engine.
static ACTIVE_ENGINE: Mutex<Option<Arc<PepEngine>>> = Mutex::new(None);

/// Installs the plugin.
///
/// # Errors
///
/// Returns `AlreadyExists` if a plugin is already installed.
pub fn register_plugin(config: PepConfig, host: HostInterface) -> AxResult<Arc<PepEngine>> {
    let mut active = ACTIVE_ENGINE.lock();
    if active.is_some() {
        return ax_err!(AlreadyExists, "a plugin is already registered");
    }
    let engine = PepEngine::new(config, host);
    *active = Some(Arc::clone(&engine));
    info!("Platform extension plugin registered");
    Ok(engine)
}

/// Removes the installed plugin, unregistering all of its devices.
///
/// # Errors
///
/// Returns `NotFound` if no plugin is installed.
pub fn unregister_plugin() -> AxResult {
    let engine = ACTIVE_ENGINE.lock().take();
    let Some(engine) = engine else {
        return ax_err!(NotFound, "no plugin is registered");
    };
    engine.shutdown();
    info!("Platform extension plugin unregistered");
    Ok(())
}

/// Gets the installed engine.
pub fn active_engine() -> Option<Arc<PepEngine>> {
    ACTIVE_ENGINE.lock().clone()
}

/// Forwards a host notification to the installed engine.
///
/// Returns `false` when no plugin is installed or the notification is not
/// recognized.
pub fn notify(category: NotificationCategory, id: NotificationId, payload: &mut Payload<'_>) -> bool {
    // Not under the lock: handlers may call back into the plugin.
    let Some(engine) = active_engine() else {
        trace!("No plugin registered for {:?}/{:?}", category, id);
        return false;
    };
    engine.notify(category, id, payload)
}
