//! Registered device instances.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use axerrno::{ax_err_type, AxResult};
use spin::Mutex;

use crate::definition::{DeviceDefinition, DeviceType};
use crate::lifecycle::{DeviceLifecycle, DeviceState};
use crate::notify::NotificationCategory;

/// Handle the plugin hands to the host for a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceHandle(pub usize);

/// Opaque handle the host uses for the same device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KernelHandle(pub u64);

/// Dispatch counters for one device.
#[derive(Debug, Default)]
pub struct DeviceStats {
    /// Notifications answered by an immediate handler.
    pub immediate_count: AtomicU64,
    /// Work items scheduled for the deferred handler.
    pub deferred_count: AtomicU64,
    /// Deferred schedulings made because the slot had no immediate handler.
    pub fallback_count: AtomicU64,
    /// Handler runs that finished with an error.
    pub error_count: AtomicU64,
}

impl DeviceStats {
    /// Creates a new statistics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an immediate handler call.
    #[inline]
    pub fn record_immediate(&self) {
        self.immediate_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a deferred scheduling.
    #[inline]
    pub fn record_deferred(&self) {
        self.deferred_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a deferred scheduling that skipped the immediate stage.
    #[inline]
    pub fn record_fallback(&self) {
        self.fallback_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a handler error.
    #[inline]
    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the number of immediate handler calls.
    #[inline]
    pub fn immediate(&self) -> u64 {
        self.immediate_count.load(Ordering::Relaxed)
    }

    /// Gets the number of deferred schedulings.
    #[inline]
    pub fn deferred(&self) -> u64 {
        self.deferred_count.load(Ordering::Relaxed)
    }

    /// Gets the number of deferred schedulings without an immediate stage.
    #[inline]
    pub fn fallbacks(&self) -> u64 {
        self.fallback_count.load(Ordering::Relaxed)
    }

    /// Gets the number of handler errors.
    #[inline]
    pub fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}

/// A device the host registered with the plugin.
///
/// Created on `REGISTER_DEVICE` and removed on `UNREGISTER_DEVICE`. Work items
/// hold their device through an `Arc`, so an instance outlives its removal
/// from the device list until the last item referencing it is dropped.
pub struct PepDevice {
    handle: DeviceHandle,
    kernel_handle: KernelHandle,
    category: NotificationCategory,
    definition: Arc<DeviceDefinition>,
    instance_path: String,
    context: Mutex<Vec<u8>>,
    lifecycle: DeviceLifecycle,
    stats: DeviceStats,
}

impl PepDevice {
    /// Creates an instance with a zeroed context and runs the initializer.
    ///
    /// # Errors
    ///
    /// Returns `NoMemory` if the context cannot be allocated, or the
    /// initializer's error.
    pub(crate) fn new(
        handle: DeviceHandle,
        kernel_handle: KernelHandle,
        category: NotificationCategory,
        definition: Arc<DeviceDefinition>,
        instance_path: String,
    ) -> AxResult<Self> {
        let size = definition.context_size();
        let mut context = Vec::new();
        context
            .try_reserve_exact(size)
            .map_err(|_| ax_err_type!(NoMemory, "device context allocation failed"))?;
        context.resize(size, 0);

        if let Some(init) = definition.initializer() {
            init(&mut context, &instance_path).inspect_err(|err| {
                error!(
                    "Initializer for {:?} ({}) failed: {:?}",
                    definition.device_type(),
                    instance_path,
                    err
                );
            })?;
        }

        Ok(Self {
            handle,
            kernel_handle,
            category,
            definition,
            instance_path,
            context: Mutex::new(context),
            lifecycle: DeviceLifecycle::new(),
            stats: DeviceStats::new(),
        })
    }

    /// Gets the plugin handle.
    #[inline]
    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    /// Gets the host handle.
    #[inline]
    pub fn kernel_handle(&self) -> KernelHandle {
        self.kernel_handle
    }

    /// Gets the category the device registered under.
    #[inline]
    pub fn category(&self) -> NotificationCategory {
        self.category
    }

    /// Gets the device-type code.
    #[inline]
    pub fn device_type(&self) -> DeviceType {
        self.definition.device_type()
    }

    /// Gets the device's definition.
    #[inline]
    pub fn definition(&self) -> &Arc<DeviceDefinition> {
        &self.definition
    }

    /// Gets the instance path (the id string the device registered with).
    #[inline]
    pub fn instance_path(&self) -> &str {
        &self.instance_path
    }

    /// Runs `f` with exclusive access to the device context.
    pub fn with_context<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut context = self.context.lock();
        f(context.as_mut_slice())
    }

    /// Gets the lifecycle tracker.
    #[inline]
    pub fn lifecycle(&self) -> &DeviceLifecycle {
        &self.lifecycle
    }

    /// Gets the dispatch counters.
    #[inline]
    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    /// Checks if the device accepts notifications.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.lifecycle.state() == DeviceState::Active
    }
}

impl core::fmt::Debug for PepDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PepDevice")
            .field("handle", &self.handle)
            .field("kernel_handle", &self.kernel_handle)
            .field("category", &self.category)
            .field("device_type", &self.device_type())
            .field("instance_path", &self.instance_path)
            .field("lifecycle", &self.lifecycle)
            .field(
                "stats",
                &format_args!(
                    "immediate={}, deferred={}, fallbacks={}, errors={}",
                    self.stats.immediate(),
                    self.stats.deferred(),
                    self.stats.fallbacks(),
                    self.stats.errors()
                ),
            )
            .finish()
    }
}
