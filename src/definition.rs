//! Device definitions.
//!
//! A [`DeviceDefinition`] describes one kind of device the plugin owns: how
//! much per-instance context it needs, how to initialize it, which objects it
//! implements and which handlers answer its notifications.

use alloc::vec::Vec;
use core::fmt;

use arrayvec::{ArrayString, ArrayVec};
use axerrno::{ax_err, ax_err_type, AxResult};

use crate::notify::{HandlerTable, NotificationCategory};

/// Maximum number of operations a definition can declare.
pub const MAX_DEVICE_OPERATIONS: usize = 16;

/// Maximum length of an operation name (ACPI name segment).
pub const MAX_OPERATION_NAME_LEN: usize = 4;

/// Name of a device operation.
pub type OperationName = ArrayString<MAX_OPERATION_NAME_LEN>;

/// Initializes a new instance's context.
///
/// Called with the zeroed context buffer and the instance path.
pub type DeviceInitializer = fn(context: &mut [u8], instance_path: &str) -> AxResult;

/// Device-type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceType(pub u32);

/// Object a device implements, with its argument counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceOperation {
    /// Object name.
    pub name: OperationName,
    /// Number of input arguments.
    pub input_args: u32,
    /// Number of output arguments.
    pub output_args: u32,
}

impl DeviceOperation {
    /// Creates an operation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the name is empty or longer than
    /// [`MAX_OPERATION_NAME_LEN`] bytes.
    pub fn new(name: &str, input_args: u32, output_args: u32) -> AxResult<Self> {
        if name.is_empty() {
            return ax_err!(InvalidInput, "operation name is empty");
        }
        let name = OperationName::from(name)
            .map_err(|_| ax_err_type!(InvalidInput, "operation name too long"))?;
        Ok(Self {
            name,
            input_args,
            output_args,
        })
    }
}

/// Immutable description of one device type.
///
/// # Usage
///
/// ```rust,ignore
/// let fan = DeviceDefinition::new(DeviceType(2))
///     .with_context_size(16)
///     .with_initializer(init_fan)
///     .try_with_operation(DeviceOperation::new("_FST", 0, 1)?)?
///     .with_handlers(NotificationCategory::Acpi, acpi_table);
/// ```
#[derive(Clone)]
pub struct DeviceDefinition {
    device_type: DeviceType,
    context_size: usize,
    initializer: Option<DeviceInitializer>,
    operations: ArrayVec<DeviceOperation, MAX_DEVICE_OPERATIONS>,
    acpi_handlers: HandlerTable,
    dpm_handlers: HandlerTable,
}

impl DeviceDefinition {
    /// Creates a definition with no context, operations or handlers.
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            context_size: 0,
            initializer: None,
            operations: ArrayVec::new(),
            acpi_handlers: HandlerTable::new(),
            dpm_handlers: HandlerTable::new(),
        }
    }

    /// Sets the per-instance context size in bytes.
    pub fn with_context_size(mut self, context_size: usize) -> Self {
        self.context_size = context_size;
        self
    }

    /// Sets the instance initializer.
    pub fn with_initializer(mut self, initializer: DeviceInitializer) -> Self {
        self.initializer = Some(initializer);
        self
    }

    /// Adds an operation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the definition already has
    /// [`MAX_DEVICE_OPERATIONS`] operations or one with the same name.
    pub fn try_with_operation(mut self, operation: DeviceOperation) -> AxResult<Self> {
        if self.operation(&operation.name).is_some() {
            return ax_err!(InvalidInput, "duplicate operation name");
        }
        self.operations
            .try_push(operation)
            .map_err(|_| ax_err_type!(InvalidInput, "too many operations"))?;
        Ok(self)
    }

    /// Sets the handler table for a category.
    pub fn with_handlers(mut self, category: NotificationCategory, table: HandlerTable) -> Self {
        match category {
            NotificationCategory::Acpi => self.acpi_handlers = table,
            NotificationCategory::Dpm => self.dpm_handlers = table,
        }
        self
    }

    /// Gets the device-type code.
    #[inline]
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Gets the per-instance context size.
    #[inline]
    pub fn context_size(&self) -> usize {
        self.context_size
    }

    /// Gets the instance initializer.
    #[inline]
    pub fn initializer(&self) -> Option<DeviceInitializer> {
        self.initializer
    }

    /// Gets the declared operations.
    pub fn operations(&self) -> &[DeviceOperation] {
        &self.operations
    }

    /// Finds an operation by name (ASCII case-insensitive).
    pub fn operation(&self, name: &str) -> Option<&DeviceOperation> {
        self.operations
            .iter()
            .find(|op| op.name.as_str().eq_ignore_ascii_case(name))
    }

    /// Lists the operation names in declaration order.
    pub fn operation_names(&self) -> Vec<OperationName> {
        self.operations.iter().map(|op| op.name).collect()
    }

    /// Gets the handler table for a category.
    pub fn handlers(&self, category: NotificationCategory) -> &HandlerTable {
        match category {
            NotificationCategory::Acpi => &self.acpi_handlers,
            NotificationCategory::Dpm => &self.dpm_handlers,
        }
    }
}

impl fmt::Debug for DeviceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceDefinition")
            .field("device_type", &self.device_type)
            .field("context_size", &self.context_size)
            .field("has_initializer", &self.initializer.is_some())
            .field("operations", &self.operations.len())
            .field("acpi_handlers", &self.acpi_handlers.len())
            .field("dpm_handlers", &self.dpm_handlers.len())
            .finish()
    }
}
