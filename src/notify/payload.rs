//! Notification payloads exchanged with the host.
//!
//! Built-in notifications carry their inputs and an output field the engine
//! fills in. Everything else travels as [`Payload::Device`] and is routed to
//! the device's handler table.

use alloc::vec::Vec;

use axerrno::AxResult;

use crate::definition::{DeviceOperation, OperationName};
use crate::device::{DeviceHandle, KernelHandle};

use super::manager::DispatchOutcome;
use super::work::{StatusSlot, WorkInfo, WorkTag};

/// Caller side of a device notification.
#[derive(Debug)]
pub struct DispatchRequest<'a> {
    /// Request context. Immediate handlers work on it in place; deferred
    /// handlers get a copy.
    pub context: &'a mut [u8],
    /// Optional slot that receives the request status.
    pub status: Option<StatusSlot>,
}

impl<'a> DispatchRequest<'a> {
    /// Creates a request over a context buffer.
    pub fn new(context: &'a mut [u8]) -> Self {
        Self {
            context,
            status: None,
        }
    }

    /// Creates a request without context.
    pub fn empty() -> DispatchRequest<'static> {
        DispatchRequest {
            context: &mut [],
            status: None,
        }
    }

    /// Attaches a status slot.
    pub fn with_status(mut self, status: StatusSlot) -> Self {
        self.status = Some(status);
        self
    }
}

/// Completed work handed to the host by a `WORK` notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkReport {
    /// Identity of the finished item.
    pub tag: WorkTag,
    /// Context as left by the deferred handler.
    pub context: Vec<u8>,
    /// Output recorded by the deferred handler.
    pub info: WorkInfo,
}

/// Payload of one notification.
#[derive(Debug)]
pub enum Payload<'a> {
    /// `PREPARE_DEVICE`: does the plugin own `device_id`?
    PrepareDevice {
        /// Host device id string.
        device_id: &'a str,
        /// Set by the engine.
        accepted: bool,
    },
    /// `ABANDON_DEVICE`: the host dropped a prepared device.
    AbandonDevice {
        /// Host device id string.
        device_id: &'a str,
    },
    /// `REGISTER_DEVICE`: create a device instance.
    RegisterDevice {
        /// Host device id string.
        device_id: &'a str,
        /// Host handle for the device.
        kernel_handle: KernelHandle,
        /// Set by the engine.
        result: Option<AxResult<DeviceHandle>>,
    },
    /// `UNREGISTER_DEVICE`: destroy a device instance.
    UnregisterDevice {
        /// Device to remove.
        device: DeviceHandle,
        /// Set by the engine.
        result: Option<AxResult>,
    },
    /// `ENUMERATE_DEVICE_NAMESPACE`: list the objects a device implements.
    EnumerateNamespace {
        /// Device to query.
        device: DeviceHandle,
        /// Set by the engine.
        result: Option<AxResult<Vec<OperationName>>>,
    },
    /// `QUERY_OBJECT_INFORMATION`: argument counts for one object.
    QueryObjectInformation {
        /// Device to query.
        device: DeviceHandle,
        /// Object name.
        name: &'a str,
        /// Set by the engine.
        result: Option<AxResult<DeviceOperation>>,
    },
    /// `WORK`: drain one completed item.
    Work {
        /// Set by the engine when an item was drained.
        report: Option<WorkReport>,
    },
    /// Any notification routed to device handlers.
    Device {
        /// Target device.
        device: DeviceHandle,
        /// Caller's request.
        request: DispatchRequest<'a>,
        /// Set by the engine.
        outcome: Option<AxResult<DispatchOutcome>>,
    },
}

impl<'a> Payload<'a> {
    /// Creates a `PREPARE_DEVICE` payload.
    pub fn prepare(device_id: &'a str) -> Self {
        Payload::PrepareDevice {
            device_id,
            accepted: false,
        }
    }

    /// Creates an `ABANDON_DEVICE` payload.
    pub fn abandon(device_id: &'a str) -> Self {
        Payload::AbandonDevice { device_id }
    }

    /// Creates a `REGISTER_DEVICE` payload.
    pub fn register(device_id: &'a str, kernel_handle: KernelHandle) -> Self {
        Payload::RegisterDevice {
            device_id,
            kernel_handle,
            result: None,
        }
    }

    /// Creates an `UNREGISTER_DEVICE` payload.
    pub fn unregister(device: DeviceHandle) -> Self {
        Payload::UnregisterDevice { device, result: None }
    }

    /// Creates an `ENUMERATE_DEVICE_NAMESPACE` payload.
    pub fn enumerate_namespace(device: DeviceHandle) -> Self {
        Payload::EnumerateNamespace { device, result: None }
    }

    /// Creates a `QUERY_OBJECT_INFORMATION` payload.
    pub fn query_object(device: DeviceHandle, name: &'a str) -> Self {
        Payload::QueryObjectInformation {
            device,
            name,
            result: None,
        }
    }

    /// Creates a `WORK` payload.
    pub fn work() -> Self {
        Payload::Work { report: None }
    }

    /// Creates a payload routed to device handlers.
    pub fn device(device: DeviceHandle, request: DispatchRequest<'a>) -> Self {
        Payload::Device {
            device,
            request,
            outcome: None,
        }
    }
}
