//! Device ownership lookup.
//!
//! The registry holds the definitions the plugin was registered with and the
//! match entries that decide which host device ids belong to which
//! definition. Both are fixed for the lifetime of the engine.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::config::PepConfig;
use crate::definition::{DeviceDefinition, DeviceType};
use crate::notify::{CategoryMask, NotificationCategory};

/// How a match entry compares its string against a device id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The whole device id must equal the match string.
    Full,
    /// The match string may appear anywhere in the device id.
    Partial,
}

/// Claims device ids for a device type.
///
/// Comparisons ignore ASCII case. At most one entry should match a given id
/// for a given category; when several do, the first one wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMatchEntry {
    /// Device type the id belongs to.
    pub device_type: DeviceType,
    /// Categories this entry claims.
    pub categories: CategoryMask,
    /// String compared against device ids.
    pub match_string: String,
    /// Comparison mode.
    pub mode: MatchMode,
}

impl DeviceMatchEntry {
    /// Creates an entry.
    pub fn new(
        device_type: DeviceType,
        categories: CategoryMask,
        match_string: impl Into<String>,
        mode: MatchMode,
    ) -> Self {
        Self {
            device_type,
            categories,
            match_string: match_string.into(),
            mode,
        }
    }

    /// Checks whether `device_id` matches this entry.
    pub fn matches(&self, device_id: &str) -> bool {
        let needle = self.match_string.as_bytes();
        let haystack = device_id.as_bytes();
        match self.mode {
            MatchMode::Full => haystack.eq_ignore_ascii_case(needle),
            MatchMode::Partial => {
                if haystack.len() < needle.len() {
                    return false;
                }
                (0..=haystack.len() - needle.len())
                    .any(|start| haystack[start..start + needle.len()].eq_ignore_ascii_case(needle))
            }
        }
    }
}

/// Registered definitions and match entries.
///
/// Index 0 of both tables is the root device.
#[derive(Debug)]
pub struct DeviceRegistry {
    definitions: Vec<Arc<DeviceDefinition>>,
    matches: Vec<DeviceMatchEntry>,
}

impl DeviceRegistry {
    /// Builds the registry from the plugin configuration.
    pub fn new(config: &PepConfig) -> Self {
        let mut definitions = Vec::with_capacity(config.len());
        let mut matches = Vec::with_capacity(config.len());
        for (definition, entry) in config.entries() {
            debug!(
                "Registering {:?}: match {:?} ({:?}) for {:?}",
                definition.device_type(),
                entry.match_string,
                entry.mode,
                entry.categories
            );
            definitions.push(Arc::new(definition.clone()));
            matches.push(entry.clone());
        }
        Self {
            definitions,
            matches,
        }
    }

    /// Finds the definition that owns `device_id` for `category`.
    ///
    /// Returns the definition and the match entry that claimed the id, or
    /// `None` when no entry matches or the matched type has no definition.
    pub fn find_owner(
        &self,
        category: NotificationCategory,
        device_id: &str,
    ) -> Option<(&Arc<DeviceDefinition>, &DeviceMatchEntry)> {
        let entry = self
            .matches
            .iter()
            .filter(|entry| entry.categories.contains(category.mask()))
            .find(|entry| entry.matches(device_id))?;

        let definition = self.definition(entry.device_type);
        if definition.is_none() {
            warn!(
                "Match {:?} claims {} for {:?}, which has no definition",
                entry.match_string, device_id, entry.device_type
            );
        }
        Some((definition?, entry))
    }

    /// Finds a definition by device type.
    pub fn definition(&self, device_type: DeviceType) -> Option<&Arc<DeviceDefinition>> {
        self.definitions
            .iter()
            .find(|definition| definition.device_type() == device_type)
    }

    /// Gets the root definition.
    pub fn root(&self) -> &Arc<DeviceDefinition> {
        &self.definitions[0]
    }

    /// Iterates over all definitions, root first.
    pub fn definitions(&self) -> impl Iterator<Item = &Arc<DeviceDefinition>> {
        self.definitions.iter()
    }

    /// Gets the match entries, root first.
    pub fn matches(&self) -> &[DeviceMatchEntry] {
        &self.matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: DeviceType = DeviceType(1);
    const FAN: DeviceType = DeviceType(2);
    const BATTERY: DeviceType = DeviceType(3);

    fn registry() -> DeviceRegistry {
        let config = PepConfig::new(
            DeviceDefinition::new(ROOT),
            DeviceMatchEntry::new(ROOT, CategoryMask::ACPI, "\\_SB.PEP0", MatchMode::Full),
        )
        .with_child(
            DeviceDefinition::new(FAN),
            DeviceMatchEntry::new(FAN, CategoryMask::ACPI | CategoryMask::DPM, "FAN0", MatchMode::Full),
        )
        .with_child(
            DeviceDefinition::new(BATTERY),
            DeviceMatchEntry::new(BATTERY, CategoryMask::DPM, "BAT", MatchMode::Partial),
        );
        DeviceRegistry::new(&config)
    }

    #[test]
    fn test_full_match_is_exact_and_case_insensitive() {
        let entry = DeviceMatchEntry::new(FAN, CategoryMask::ACPI, "FAN0", MatchMode::Full);
        assert!(entry.matches("FAN0"));
        assert!(entry.matches("fan0"));
        assert!(!entry.matches("FAN00"));
        assert!(!entry.matches("\\_SB.FAN0"));
        assert!(!entry.matches("FAN"));
    }

    #[test]
    fn test_partial_match_checks_every_offset() {
        let entry = DeviceMatchEntry::new(BATTERY, CategoryMask::DPM, "BAT", MatchMode::Partial);
        assert!(entry.matches("BAT"));
        assert!(entry.matches("\\_SB.BAT1"));
        assert!(entry.matches("\\_SB.PCI0.bat"));
        assert!(entry.matches("XBATX"));
        assert!(!entry.matches("BA"));
        assert!(!entry.matches(""));
        assert!(!entry.matches("\\_SB.B_A_T"));
    }

    #[test]
    fn test_find_owner_respects_category() {
        let registry = registry();

        let (definition, entry) = registry.find_owner(NotificationCategory::Acpi, "fan0").unwrap();
        assert_eq!(definition.device_type(), FAN);
        assert_eq!(entry.mode, MatchMode::Full);

        assert!(registry.find_owner(NotificationCategory::Dpm, "FAN0").is_some());
        assert!(registry.find_owner(NotificationCategory::Acpi, "\\_SB.BAT0").is_none());
        assert!(registry.find_owner(NotificationCategory::Dpm, "\\_SB.BAT0").is_some());
        assert!(registry.find_owner(NotificationCategory::Dpm, "\\_SB.PEP0").is_none());
        assert!(registry.find_owner(NotificationCategory::Acpi, "UNKNOWN").is_none());
    }

    #[test]
    fn test_find_owner_without_definition() {
        let config = PepConfig::new(
            DeviceDefinition::new(ROOT),
            DeviceMatchEntry::new(DeviceType(99), CategoryMask::ACPI, "GHOST", MatchMode::Full),
        );
        let registry = DeviceRegistry::new(&config);
        assert!(registry.find_owner(NotificationCategory::Acpi, "GHOST").is_none());
    }

    #[test]
    fn test_root_is_first() {
        let registry = registry();
        assert_eq!(registry.root().device_type(), ROOT);
        assert_eq!(registry.definitions().count(), 3);
        assert_eq!(registry.matches()[0].device_type, ROOT);
    }
}
