//! Notification engine.
//!
//! This module provides the [`PepEngine`], which owns the registered device
//! list and both work queues, answers the built-in notifications, and routes
//! everything else to the owning device's handler table.
//!
//! # Locking
//!
//! One `spin::Mutex` guards the device list, the pending queue and the
//! completed queue. It is only held for list operations. Handlers, the host's
//! request-more-work hook and the task pool are always called with it
//! released, so handlers may call back into the engine.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use axerrno::{ax_err, ax_err_type, AxError, AxResult};
use spin::Mutex;

use crate::config::PepConfig;
use crate::definition::{DeviceOperation, OperationName};
use crate::device::{DeviceHandle, KernelHandle, PepDevice};
use crate::registry::DeviceRegistry;

use super::notifier::HostInterface;
use super::payload::{DispatchRequest, Payload, WorkReport};
use super::queue::WorkQueues;
use super::routing::{HandlerRequest, HandlerResult, HandlerSelection, NotificationHandler};
use super::scheduler::{PendingWork, WorkerScheduler};
use super::work::{RequestStatus, WorkId, WorkItem, WorkTag};
use super::{BuiltIn, NotificationCategory, NotificationId};

/// Result of routing a notification to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The device has no handler for the notification.
    Unhandled,
    /// An immediate handler finished the request.
    Complete(AxResult),
    /// The request was queued for its deferred handler. The result is
    /// reported through the completed queue.
    MoreWorkScheduled,
}

struct EngineState {
    devices: BTreeMap<DeviceHandle, Arc<PepDevice>>,
    queues: WorkQueues,
}

/// Platform extension plugin engine.
///
/// # Usage
///
/// ```rust,ignore
/// let host = HostInterface::new(|| host.schedule_work_notification());
/// let engine = PepEngine::new(config, host);
///
/// let mut payload = Payload::register("FAN0", KernelHandle(0x40));
/// assert!(engine.notify(NotificationCategory::Acpi, acpi::REGISTER_DEVICE, &mut payload));
///
/// // Later, from the host's work loop:
/// let mut payload = Payload::work();
/// engine.notify(NotificationCategory::Acpi, acpi::WORK, &mut payload);
/// ```
pub struct PepEngine {
    /// Definitions and match entries.
    registry: DeviceRegistry,

    /// Every (category, id) pair some handler table routes.
    recognized: BTreeSet<(NotificationCategory, NotificationId)>,

    /// Device list and work queues, under the engine lock.
    state: Mutex<EngineState>,

    /// Host callbacks.
    host: HostInterface,

    /// Runs pending work.
    scheduler: WorkerScheduler,

    /// Largest context, device or request, the engine will allocate.
    max_context_size: usize,

    next_handle: AtomicUsize,
    next_work_id: AtomicU64,
}

impl PepEngine {
    /// Creates an engine for the given registration tables.
    pub fn new(config: PepConfig, host: HostInterface) -> Arc<Self> {
        let registry = DeviceRegistry::new(&config);

        let mut recognized = BTreeSet::new();
        for definition in registry.definitions() {
            for category in NotificationCategory::ALL {
                for entry in definition.handlers(category).entries() {
                    recognized.insert((category, entry.id));
                }
            }
        }
        debug!(
            "Creating engine: {} definitions, {} routed notifications",
            registry.definitions().count(),
            recognized.len()
        );

        Arc::new(Self {
            registry,
            recognized,
            state: Mutex::new(EngineState {
                devices: BTreeMap::new(),
                queues: WorkQueues::new(),
            }),
            scheduler: WorkerScheduler::new(Arc::clone(host.task_pool())),
            host,
            max_context_size: config.max_context_size(),
            next_handle: AtomicUsize::new(1),
            next_work_id: AtomicU64::new(1),
        })
    }

    /// Host entry point.
    ///
    /// Returns `false` if neither the engine nor any device handler table
    /// knows the (category, id) pair, so the host can offer it elsewhere.
    /// Results are written into `payload`.
    pub fn notify(
        self: &Arc<Self>,
        category: NotificationCategory,
        id: NotificationId,
        payload: &mut Payload<'_>,
    ) -> bool {
        trace!("Notification {:?}/{:?}", category, id);

        if let Some(builtin) = BuiltIn::classify(category, id) {
            self.handle_builtin(category, builtin, payload);
            return true;
        }

        if !self.recognized.contains(&(category, id)) {
            trace!("{:?}/{:?} is not routed by any device", category, id);
            return false;
        }

        match payload {
            Payload::Device {
                device,
                request,
                outcome,
            } => {
                *outcome = Some(self.handle_notification(category, id, *device, request));
            }
            _ => warn!("{:?}/{:?} expects a device payload, ignoring", category, id),
        }
        true
    }

    fn handle_builtin(&self, category: NotificationCategory, builtin: BuiltIn, payload: &mut Payload<'_>) {
        match (builtin, payload) {
            (BuiltIn::PrepareDevice, Payload::PrepareDevice { device_id, accepted }) => {
                *accepted = self.prepare_device(category, device_id);
            }
            (BuiltIn::AbandonDevice, Payload::AbandonDevice { device_id }) => {
                debug!("Host abandoned {} ({:?})", device_id, category);
            }
            (
                BuiltIn::RegisterDevice,
                Payload::RegisterDevice {
                    device_id,
                    kernel_handle,
                    result,
                },
            ) => {
                *result = Some(self.register_device(category, device_id, *kernel_handle));
            }
            (BuiltIn::UnregisterDevice, Payload::UnregisterDevice { device, result }) => {
                *result = Some(self.unregister_device(*device));
            }
            (BuiltIn::EnumerateNamespace, Payload::EnumerateNamespace { device, result }) => {
                *result = Some(self.enumerate_namespace(*device));
            }
            (
                BuiltIn::QueryObjectInformation,
                Payload::QueryObjectInformation { device, name, result },
            ) => {
                *result = Some(self.query_object_information(*device, name));
            }
            (BuiltIn::Work, Payload::Work { report }) => {
                *report = self.drain_one_completed().map(|item| {
                    let (tag, context, info) = item.into_parts();
                    WorkReport { tag, context, info }
                });
            }
            (builtin, _) => {
                warn!("{:?} ({:?}) sent with a mismatched payload, ignoring", builtin, category);
            }
        }
    }

    /// Checks whether the plugin owns `device_id`.
    pub fn prepare_device(&self, category: NotificationCategory, device_id: &str) -> bool {
        let accepted = self.registry.find_owner(category, device_id).is_some();
        debug!("Prepare {} ({:?}): accepted={}", device_id, category, accepted);
        accepted
    }

    /// Creates a device instance for `device_id`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no definition owns the id.
    /// - `NoMemory` if the context cannot be allocated or exceeds the
    ///   configured maximum.
    /// - The initializer's error if it fails.
    pub fn register_device(
        &self,
        category: NotificationCategory,
        device_id: &str,
        kernel_handle: KernelHandle,
    ) -> AxResult<DeviceHandle> {
        let (definition, entry) = self
            .registry
            .find_owner(category, device_id)
            .ok_or_else(|| ax_err_type!(NotFound, "no definition owns this device"))?;

        if definition.context_size() > self.max_context_size {
            warn!(
                "{:?} needs {} context bytes, limit is {}",
                definition.device_type(),
                definition.context_size(),
                self.max_context_size
            );
            return ax_err!(NoMemory, "device context exceeds the configured limit");
        }

        let handle = DeviceHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let device = PepDevice::new(
            handle,
            kernel_handle,
            category,
            Arc::clone(definition),
            String::from(device_id),
        )?;

        self.state.lock().devices.insert(handle, Arc::new(device));
        debug!(
            "Registered {} as {:?}: {:?} via {:?} match",
            device_id,
            handle,
            definition.device_type(),
            entry.mode
        );
        Ok(handle)
    }

    /// Removes a device from the list and stops new dispatches to it.
    ///
    /// Does not wait for dispatches already inside the device's handlers; the
    /// device becomes Removed when the last of them returns. A handler may
    /// therefore unregister its own device. Queued work items keep their
    /// device alive and still run.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the handle is unknown.
    /// - `BadState` if the device is already being removed. It stays listed.
    pub fn unregister_device(&self, handle: DeviceHandle) -> AxResult {
        let device = {
            let mut state = self.state.lock();
            let device = state
                .devices
                .get(&handle)
                .cloned()
                .ok_or_else(|| ax_err_type!(NotFound, "unknown device handle"))?;
            if !device.lifecycle().begin_removal() {
                return ax_err!(BadState, "device is already being removed");
            }
            state.devices.remove(&handle);
            device
        };

        debug!(
            "Unregistered {:?} ({}), {} dispatches still running",
            handle,
            device.instance_path(),
            device.lifecycle().active_accesses()
        );
        Ok(())
    }

    /// Lists the objects a device implements.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the handle is unknown.
    pub fn enumerate_namespace(&self, handle: DeviceHandle) -> AxResult<Vec<OperationName>> {
        let device = self
            .device(handle)
            .ok_or_else(|| ax_err_type!(NotFound, "unknown device handle"))?;
        Ok(device.definition().operation_names())
    }

    /// Looks up one object a device implements.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the handle or the object is unknown.
    pub fn query_object_information(&self, handle: DeviceHandle, name: &str) -> AxResult<DeviceOperation> {
        let device = self
            .device(handle)
            .ok_or_else(|| ax_err_type!(NotFound, "unknown device handle"))?;
        device
            .definition()
            .operation(name)
            .copied()
            .ok_or_else(|| ax_err_type!(NotFound, "device does not implement this object"))
    }

    /// Routes a notification to a device's handler table.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the handle is unknown.
    /// - `BadState` if the device is being removed.
    /// - `NoMemory` if work had to be deferred and the work item could not be
    ///   built. Nothing is queued in that case.
    ///
    /// The request's status slot is written once by the engine, to `Pending`,
    /// when the request is queued. Every other write is up to the handlers.
    pub fn handle_notification(
        self: &Arc<Self>,
        category: NotificationCategory,
        id: NotificationId,
        handle: DeviceHandle,
        request: &mut DispatchRequest<'_>,
    ) -> AxResult<DispatchOutcome> {
        let device = self
            .device(handle)
            .ok_or_else(|| ax_err_type!(NotFound, "unknown device handle"))?;
        let access = device
            .lifecycle()
            .try_access()
            .ok_or_else(|| ax_err_type!(BadState, "device is being removed"))?;

        let Some(entry) = device.definition().handlers(category).lookup(id) else {
            trace!("{:?} has no handler for {:?}/{:?}", handle, category, id);
            return Ok(DispatchOutcome::Unhandled);
        };
        let Some(mut selection) = entry.slot.select() else {
            trace!("{:?} routes {:?}/{:?} to an empty slot", handle, category, id);
            return Ok(DispatchOutcome::Unhandled);
        };

        let (handler, fallback) = loop {
            match selection {
                HandlerSelection::Immediate(handler) => {
                    device.stats().record_immediate();
                    let result = {
                        let mut handler_request = HandlerRequest {
                            device: &device,
                            category,
                            notification_id: id,
                            context: &mut *request.context,
                            status: request.status.as_ref(),
                        };
                        handler.handle(&mut handler_request, None)
                    };

                    match result {
                        HandlerResult::Complete(result) => {
                            if result.is_err() {
                                device.stats().record_error();
                            }
                            return Ok(DispatchOutcome::Complete(result));
                        }
                        HandlerResult::MoreWork => match entry.slot.continuation() {
                            Some(next) => selection = next,
                            None => {
                                warn!(
                                    "Immediate handler for {:?}/{:?} asked for more work but {:?} has no deferred handler",
                                    category, id, handle
                                );
                                device.stats().record_error();
                                return Ok(DispatchOutcome::Complete(Err(AxError::Unsupported)));
                            }
                        },
                    }
                }
                HandlerSelection::Deferred { handler, fallback } => break (handler, fallback),
            }
        };
        trace!(
            "Deferring {:?}/{:?} for {:?} (no immediate handler: {})",
            category, id, handle, fallback
        );

        let trigger = self.enqueue_deferred(category, id, &device, handler, request)?;
        if fallback {
            device.stats().record_fallback();
        }
        // Inline draining may run this device's handlers, which may unregister it.
        drop(access);
        self.scheduler.run(self, trigger);
        Ok(DispatchOutcome::MoreWorkScheduled)
    }

    /// Builds a work item and pushes it to the pending queue.
    fn enqueue_deferred(
        &self,
        category: NotificationCategory,
        id: NotificationId,
        device: &Arc<PepDevice>,
        handler: Arc<dyn NotificationHandler>,
        request: &DispatchRequest<'_>,
    ) -> AxResult<WorkTag> {
        if request.context.len() > self.max_context_size {
            return ax_err!(NoMemory, "request context exceeds the configured limit");
        }
        let mut context = Vec::new();
        context
            .try_reserve_exact(request.context.len())
            .map_err(|_| ax_err_type!(NoMemory, "work context allocation failed"))?;
        context.extend_from_slice(&*request.context);

        let work_id = WorkId(self.next_work_id.fetch_add(1, Ordering::Relaxed));
        let item = WorkItem::new(
            work_id,
            category,
            id,
            Arc::clone(device),
            handler,
            context,
            request.status.clone(),
        );
        let tag = item.tag();

        {
            let mut state = self.state.lock();
            state.queues.push_pending(item)?;
            // Written under the engine lock so the worker cannot finish first.
            if let Some(status) = &request.status {
                status.set(RequestStatus::Pending);
            }
        }

        device.stats().record_deferred();
        debug!("Queued {:?}", tag);
        Ok(tag)
    }

    /// Moves a finished item to the completed queue and asks the host to
    /// drain it.
    ///
    /// The request's status slot belongs to the handler from here on; the
    /// result travels in the item's [`WorkInfo`](super::WorkInfo).
    ///
    /// # Panics
    ///
    /// Panics if the item was already completed.
    fn complete(&self, mut item: WorkItem, result: AxResult) {
        item.mark_completed(result);
        if item.info().result.is_err() {
            item.device().stats().record_error();
        }
        let tag = item.tag();
        let pushed = self.state.lock().queues.push_completed(item);
        match pushed {
            Ok(()) => {
                debug!("Completed {:?}", tag);
                self.host.request_more_work();
            }
            Err(err) => error!("Dropping completion of {:?}: {:?}", tag, err),
        }
    }

    /// Pops the oldest completed item.
    ///
    /// If more completed items remain afterwards, the host is asked for
    /// another round before this returns.
    pub fn drain_one_completed(&self) -> Option<WorkItem> {
        let (item, remaining) = {
            let mut state = self.state.lock();
            let item = state.queues.pop_completed();
            (item, state.queues.completed_len())
        };
        let item = item?;

        trace!("Reporting {:?}, {} still completed", item.tag(), remaining);
        if remaining > 0 {
            self.host.request_more_work();
        }
        Some(item)
    }

    /// Gets a registered device.
    pub fn device(&self, handle: DeviceHandle) -> Option<Arc<PepDevice>> {
        self.state.lock().devices.get(&handle).cloned()
    }

    /// Gets the number of registered devices.
    pub fn device_count(&self) -> usize {
        self.state.lock().devices.len()
    }

    /// Gets the number of items waiting for their deferred handler.
    pub fn pending_count(&self) -> usize {
        self.state.lock().queues.pending_len()
    }

    /// Gets the number of finished items the host has not drained.
    pub fn completed_count(&self) -> usize {
        self.state.lock().queues.completed_len()
    }

    /// Gets the registration tables.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Checks whether any device handler table routes `(category, id)`.
    pub fn routes(&self, category: NotificationCategory, id: NotificationId) -> bool {
        self.recognized.contains(&(category, id))
    }

    /// Unregisters every device and drops undelivered completions.
    ///
    /// Pending items are not cancelled; a running drain finishes them.
    pub fn shutdown(&self) {
        let handles: Vec<DeviceHandle> = self.state.lock().devices.keys().copied().collect();
        for handle in handles {
            if let Err(err) = self.unregister_device(handle) {
                warn!("Failed to unregister {:?} during shutdown: {:?}", handle, err);
            }
        }

        let discarded = self.state.lock().queues.discard_completed();
        if discarded > 0 {
            warn!("Discarded {} completed work items the host never drained", discarded);
        }
    }
}

impl PendingWork for PepEngine {
    fn drain_pending(&self) {
        loop {
            let next = self.state.lock().queues.pop_pending();
            let Some(mut item) = next else {
                break;
            };

            trace!("Running deferred handler for {:?}", item.tag());
            match item.execute() {
                HandlerResult::Complete(result) => self.complete(item, result),
                HandlerResult::MoreWork => {
                    // Deferred handlers are the last stage.
                    warn!("Deferred handler for {:?} asked for more work", item.tag());
                    self.complete(item, Err(AxError::Unsupported));
                }
            }
        }
    }
}

impl core::fmt::Debug for PepEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PepEngine")
            .field("devices", &state.devices.len())
            .field("pending", &state.queues.pending_len())
            .field("completed", &state.queues.completed_len())
            .field("max_context_size", &self.max_context_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{DeviceDefinition, DeviceType};
    use crate::lifecycle::DeviceState;
    use crate::notify::{acpi, dpm, CategoryMask, HandlerSlot, HandlerTable, StatusSlot, WorkInfo};
    use crate::registry::{DeviceMatchEntry, MatchMode};

    const ROOT: DeviceType = DeviceType(1);
    const FAN: DeviceType = DeviceType(2);

    fn echo(request: &mut HandlerRequest<'_>, _work: Option<&mut WorkInfo>) -> HandlerResult {
        for byte in request.context.iter_mut() {
            *byte = byte.wrapping_add(1);
        }
        HandlerResult::Complete(Ok(()))
    }

    fn ask_more(_request: &mut HandlerRequest<'_>, _work: Option<&mut WorkInfo>) -> HandlerResult {
        HandlerResult::MoreWork
    }

    fn record(request: &mut HandlerRequest<'_>, work: Option<&mut WorkInfo>) -> HandlerResult {
        if let Some(work) = work {
            work.output.extend_from_slice(request.context);
        }
        HandlerResult::Complete(Ok(()))
    }

    fn engine() -> Arc<PepEngine> {
        let acpi_table = HandlerTable::new()
            .with_entry(acpi::EVALUATE_CONTROL_METHOD, HandlerSlot::new().with_immediate(echo))
            .with_entry(
                acpi::QUERY_DEVICE_CONTROL_RESOURCES,
                HandlerSlot::new().with_immediate(ask_more).with_deferred(record),
            )
            .with_entry(
                acpi::TRANSLATED_DEVICE_CONTROL_RESOURCES,
                HandlerSlot::new().with_immediate(ask_more),
            );
        let dpm_table = HandlerTable::new().with_entry(dpm::DEVICE_POWER_STATE, HandlerSlot::new());

        let config = PepConfig::new(
            DeviceDefinition::new(ROOT),
            DeviceMatchEntry::new(ROOT, CategoryMask::ACPI, "\\_SB.PEP0", MatchMode::Full),
        )
        .with_child(
            DeviceDefinition::new(FAN)
                .with_context_size(4)
                .with_handlers(NotificationCategory::Acpi, acpi_table)
                .with_handlers(NotificationCategory::Dpm, dpm_table),
            DeviceMatchEntry::new(FAN, CategoryMask::ACPI | CategoryMask::DPM, "FAN0", MatchMode::Full),
        );
        PepEngine::new(config, HostInterface::new(|| {}))
    }

    #[test]
    fn test_register_and_unregister() {
        let engine = engine();
        let handle = engine
            .register_device(NotificationCategory::Acpi, "fan0", KernelHandle(0x40))
            .unwrap();
        assert_eq!(engine.device_count(), 1);

        let device = engine.device(handle).unwrap();
        assert_eq!(device.device_type(), FAN);
        assert_eq!(device.kernel_handle(), KernelHandle(0x40));

        assert_eq!(
            engine.register_device(NotificationCategory::Acpi, "FAN00", KernelHandle(0)),
            Err(AxError::NotFound)
        );

        engine.unregister_device(handle).unwrap();
        assert_eq!(engine.device_count(), 0);
        assert!(!device.is_active());
        assert_eq!(engine.unregister_device(handle), Err(AxError::NotFound));
    }

    #[test]
    fn test_immediate_handler_runs_inline() {
        let engine = engine();
        let handle = engine
            .register_device(NotificationCategory::Acpi, "FAN0", KernelHandle(0))
            .unwrap();

        let mut context = [1u8, 2, 3];
        let status = StatusSlot::new();
        let mut request = DispatchRequest::new(&mut context).with_status(status.clone());
        let outcome = engine
            .handle_notification(NotificationCategory::Acpi, acpi::EVALUATE_CONTROL_METHOD, handle, &mut request)
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Complete(Ok(())));
        assert_eq!(context, [2, 3, 4]);
        // Immediate results come back in the outcome only.
        assert_eq!(status.get(), RequestStatus::Idle);
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.device(handle).unwrap().stats().immediate(), 1);
    }

    #[test]
    fn test_immediate_more_work_defers() {
        let engine = engine();
        let handle = engine
            .register_device(NotificationCategory::Acpi, "FAN0", KernelHandle(0))
            .unwrap();

        let mut context = [9u8, 8];
        let mut request = DispatchRequest::new(&mut context);
        let outcome = engine
            .handle_notification(
                NotificationCategory::Acpi,
                acpi::QUERY_DEVICE_CONTROL_RESOURCES,
                handle,
                &mut request,
            )
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::MoreWorkScheduled);

        // No task pool: the item already ran inline.
        assert_eq!(engine.pending_count(), 0);
        let item = engine.drain_one_completed().unwrap();
        assert_eq!(item.info().output, [9, 8]);
        assert!(engine.drain_one_completed().is_none());

        let stats = engine.device(handle).unwrap();
        assert_eq!(stats.stats().immediate(), 1);
        assert_eq!(stats.stats().deferred(), 1);
        assert_eq!(stats.stats().fallbacks(), 0);
    }

    #[test]
    fn test_deferred_only_slot_counts_fallback() {
        let acpi_table = HandlerTable::new().with_entry(
            acpi::EVALUATE_CONTROL_METHOD,
            HandlerSlot::new().with_deferred(record),
        );
        let config = PepConfig::new(
            DeviceDefinition::new(ROOT),
            DeviceMatchEntry::new(ROOT, CategoryMask::ACPI, "\\_SB.PEP0", MatchMode::Full),
        )
        .with_child(
            DeviceDefinition::new(FAN).with_handlers(NotificationCategory::Acpi, acpi_table),
            DeviceMatchEntry::new(FAN, CategoryMask::ACPI, "FAN0", MatchMode::Full),
        );
        let engine = PepEngine::new(config, HostInterface::new(|| {}));
        let handle = engine
            .register_device(NotificationCategory::Acpi, "FAN0", KernelHandle(0))
            .unwrap();

        let mut request = DispatchRequest::empty();
        let outcome = engine
            .handle_notification(NotificationCategory::Acpi, acpi::EVALUATE_CONTROL_METHOD, handle, &mut request)
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::MoreWorkScheduled);

        let device = engine.device(handle).unwrap();
        assert_eq!(device.stats().immediate(), 0);
        assert_eq!(device.stats().deferred(), 1);
        assert_eq!(device.stats().fallbacks(), 1);
    }

    #[test]
    fn test_more_work_without_deferred_handler() {
        let engine = engine();
        let handle = engine
            .register_device(NotificationCategory::Acpi, "FAN0", KernelHandle(0))
            .unwrap();

        let mut request = DispatchRequest::empty();
        let outcome = engine
            .handle_notification(
                NotificationCategory::Acpi,
                acpi::TRANSLATED_DEVICE_CONTROL_RESOURCES,
                handle,
                &mut request,
            )
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Complete(Err(AxError::Unsupported)));
        assert_eq!(engine.completed_count(), 0);
    }

    #[test]
    fn test_unhandled_and_removed_devices() {
        let engine = engine();
        let handle = engine
            .register_device(NotificationCategory::Dpm, "FAN0", KernelHandle(0))
            .unwrap();

        let mut request = DispatchRequest::empty();
        // Routed, but the slot holds no handler.
        assert_eq!(
            engine.handle_notification(NotificationCategory::Dpm, dpm::DEVICE_POWER_STATE, handle, &mut request),
            Ok(DispatchOutcome::Unhandled)
        );
        assert_eq!(
            engine.handle_notification(NotificationCategory::Dpm, dpm::COMPONENT_ACTIVE, handle, &mut request),
            Ok(DispatchOutcome::Unhandled)
        );
        assert_eq!(
            engine.handle_notification(
                NotificationCategory::Dpm,
                dpm::COMPONENT_ACTIVE,
                DeviceHandle(999),
                &mut request
            ),
            Err(AxError::NotFound)
        );

        let device = engine.device(handle).unwrap();
        assert!(device.lifecycle().begin_removal());
        assert_eq!(
            engine.handle_notification(NotificationCategory::Dpm, dpm::DEVICE_POWER_STATE, handle, &mut request),
            Err(AxError::BadState)
        );
    }

    #[test]
    fn test_unregister_of_removing_device_keeps_it_listed() {
        let engine = engine();
        let handle = engine
            .register_device(NotificationCategory::Acpi, "FAN0", KernelHandle(0))
            .unwrap();

        let device = engine.device(handle).unwrap();
        let access = device.lifecycle().try_access().unwrap();
        assert!(device.lifecycle().begin_removal());

        assert_eq!(engine.unregister_device(handle), Err(AxError::BadState));
        assert_eq!(engine.device_count(), 1);
        assert!(Arc::ptr_eq(&engine.device(handle).unwrap(), &device));

        drop(access);
        assert_eq!(device.lifecycle().state(), DeviceState::Removed);
    }

    #[test]
    fn test_unregister_does_not_wait_for_running_dispatch() {
        let engine = engine();
        let handle = engine
            .register_device(NotificationCategory::Acpi, "FAN0", KernelHandle(0))
            .unwrap();

        let device = engine.device(handle).unwrap();
        let access = device.lifecycle().try_access().unwrap();
        engine.unregister_device(handle).unwrap();

        assert_eq!(engine.device_count(), 0);
        assert_eq!(device.lifecycle().state(), DeviceState::Removing);
        drop(access);
        assert_eq!(device.lifecycle().state(), DeviceState::Removed);
    }

    #[test]
    fn test_routes_only_registered_ids() {
        let engine = engine();
        assert!(engine.routes(NotificationCategory::Acpi, acpi::EVALUATE_CONTROL_METHOD));
        assert!(engine.routes(NotificationCategory::Dpm, dpm::DEVICE_POWER_STATE));
        assert!(!engine.routes(NotificationCategory::Dpm, dpm::COMPONENT_IDLE_STATE));
        assert!(!engine.routes(NotificationCategory::Acpi, NotificationId(0x99)));
    }

    #[test]
    fn test_shutdown_discards_completions() {
        let engine = engine();
        let handle = engine
            .register_device(NotificationCategory::Acpi, "FAN0", KernelHandle(0))
            .unwrap();

        let mut request = DispatchRequest::empty();
        engine
            .handle_notification(
                NotificationCategory::Acpi,
                acpi::QUERY_DEVICE_CONTROL_RESOURCES,
                handle,
                &mut request,
            )
            .unwrap();
        assert_eq!(engine.completed_count(), 1);

        engine.shutdown();
        assert_eq!(engine.device_count(), 0);
        assert_eq!(engine.completed_count(), 0);
    }
}
