//! Per-port device registry and settings snapshots.
//!
//! The registry holds one settings snapshot per hub port. A controller is
//! handed its [`SettingsEntry`] at construction and publishes into it each
//! time the sampling server reports a complete parameter set; consumers read
//! the latest snapshot through their own handle. Writes are whole-snapshot
//! replacements, so the entry always reflects the most recently parsed reply.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// One full parameter snapshot, keyed by parameter name, in natural units.
pub type Settings = serde_json::Map<String, serde_json::Value>;

/// Cloneable handle to one device's settings snapshot.
#[derive(Debug, Clone, Default)]
pub struct SettingsEntry(Arc<RwLock<Settings>>);

impl SettingsEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot wholesale (last write wins).
    pub fn replace(&self, settings: Settings) {
        *self.0.write() = settings;
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> Settings {
        self.0.read().clone()
    }

    /// Current value of a single parameter, if the server has reported it.
    pub fn get(&self, name: &str) -> Option<serde_json::Value> {
        self.0.read().get(name).cloned()
    }
}

/// Process-wide map of hub port to settings entry.
///
/// Controllers never look their entry up at runtime; the composition root
/// fetches the handle once with [`DeviceRegistry::entry`] and injects it.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    entries: DashMap<u32, SettingsEntry>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for the given port, created on first use.
    pub fn entry(&self, port: u32) -> SettingsEntry {
        self.entries.entry(port).or_default().clone()
    }

    /// Drop the entry for a removed device.
    pub fn remove(&self, port: u32) {
        self.entries.remove(&port);
    }

    /// Ports with a live entry.
    pub fn ports(&self) -> Vec<u32> {
        self.entries.iter().map(|e| *e.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_handles_share_state() {
        let registry = DeviceRegistry::new();
        let writer = registry.entry(4);
        let reader = registry.entry(4);

        let mut settings = Settings::new();
        settings.insert("frequency".to_string(), json!(166.376));
        writer.replace(settings);

        assert_eq!(reader.get("frequency"), Some(json!(166.376)));
    }

    #[test]
    fn test_replace_is_whole_snapshot() {
        let entry = SettingsEntry::new();

        let mut first = Settings::new();
        first.insert("tuner_gain".to_string(), json!(10.5));
        first.insert("agc_mode".to_string(), json!(0));
        entry.replace(first);

        let mut second = Settings::new();
        second.insert("tuner_gain".to_string(), json!(21.0));
        entry.replace(second);

        assert_eq!(entry.get("tuner_gain"), Some(json!(21.0)));
        assert_eq!(entry.get("agc_mode"), None);
    }

    #[test]
    fn test_remove_drops_entry() {
        let registry = DeviceRegistry::new();
        registry.entry(1);
        registry.entry(2);
        registry.remove(1);
        assert_eq!(registry.ports(), vec![2]);
    }
}
