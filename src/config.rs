use alloc::vec::Vec;

use crate::definition::DeviceDefinition;
use crate::registry::DeviceMatchEntry;

/// Default limit for a single device or request context, in bytes.
pub const DEFAULT_MAX_CONTEXT_SIZE: usize = 4096;

/// Registration tables and engine settings.
///
/// The root device is always the first entry; children follow in the order
/// they were added.
///
/// # Usage
///
/// ```rust,ignore
/// let config = PepConfig::new(root_definition, root_match)
///     .with_child(fan_definition, fan_match)
///     .with_max_context_size(1024);
/// ```
#[derive(Debug, Clone)]
pub struct PepConfig {
    entries: Vec<(DeviceDefinition, DeviceMatchEntry)>,
    max_context_size: usize,
}

impl PepConfig {
    /// Creates a configuration holding only the root device.
    pub fn new(root: DeviceDefinition, root_match: DeviceMatchEntry) -> Self {
        let mut entries = Vec::new();
        entries.push((root, root_match));
        Self {
            entries,
            max_context_size: DEFAULT_MAX_CONTEXT_SIZE,
        }
    }

    /// Adds a child device.
    pub fn with_child(mut self, definition: DeviceDefinition, match_entry: DeviceMatchEntry) -> Self {
        self.entries.push((definition, match_entry));
        self
    }

    /// Sets the largest context the engine will allocate.
    pub fn with_max_context_size(mut self, max_context_size: usize) -> Self {
        self.max_context_size = max_context_size;
        self
    }

    /// Iterates over the (definition, match) pairs, root first.
    pub fn entries(&self) -> impl Iterator<Item = (&DeviceDefinition, &DeviceMatchEntry)> {
        self.entries.iter().map(|(definition, entry)| (definition, entry))
    }

    /// Gets the number of entries, root included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Gets the context size limit.
    pub fn max_context_size(&self) -> usize {
        self.max_context_size
    }
}
