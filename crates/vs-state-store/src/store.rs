//! Per-device attribute storage

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, instrument, trace};
use vs_core::{Attributes, DeviceRecord, EngineError};

use crate::mutation::{device_defaults, Mutation};

/// The device state store
///
/// Records are keyed by uuid. Each mutation holds the per-key write guard
/// for its whole read-modify-write, so concurrent changes to one device are
/// linearizable while different devices never contend.
#[derive(Debug, Default)]
pub struct DeviceStateStore {
    devices: DashMap<String, DeviceRecord>,
    /// cid -> uuid, for endpoints that address devices by cid
    cid_index: DashMap<String, String>,
}

impl DeviceStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device if it is not known yet and return the stored record.
    ///
    /// A known device keeps its current state; listing devices again never
    /// resets them. New devices start from the model's defaults with any
    /// attributes on the incoming record layered on top.
    #[instrument(skip(self, record), fields(uuid = %record.uuid, model = %record.model))]
    pub fn register(&self, record: DeviceRecord) -> DeviceRecord {
        self.cid_index
            .entry(record.cid.clone())
            .or_insert_with(|| record.uuid.clone());

        let entry = self.devices.entry(record.uuid.clone()).or_insert_with(|| {
            debug!(category = %record.category, "Registering device");
            let mut attributes = device_defaults(record.category, &record.model);
            attributes.extend(record.attributes.clone());
            DeviceRecord {
                attributes,
                ..record
            }
        });
        entry.value().clone()
    }

    /// Current record for a uuid
    pub fn get(&self, uuid: &str) -> Option<DeviceRecord> {
        self.devices.get(uuid).map(|r| r.clone())
    }

    /// Current attributes for a uuid
    pub fn attributes(&self, uuid: &str) -> Option<Attributes> {
        self.devices.get(uuid).map(|r| r.attributes.clone())
    }

    /// Find a device by uuid or cid
    pub fn find(&self, id: &str) -> Option<DeviceRecord> {
        if let Some(record) = self.get(id) {
            return Some(record);
        }
        let uuid = self.cid_index.get(id).map(|u| u.clone())?;
        self.get(&uuid)
    }

    /// Apply a mutation atomically and return the resulting attributes
    #[instrument(skip(self, mutation), fields(mutation = %mutation))]
    pub fn apply(&self, uuid: &str, mutation: &Mutation) -> Result<Attributes, EngineError> {
        let mut record = self
            .devices
            .get_mut(uuid)
            .ok_or_else(|| EngineError::UnknownDevice(uuid.to_string()))?;

        if !mutation.applies_to_device(record.category, &record.model) {
            return Err(EngineError::InvalidStateTransition(format!(
                "{} is not supported by {} devices",
                mutation, record.category
            )));
        }

        mutation.apply_to(&mut record.attributes);
        trace!(attributes = ?record.attributes, "Applied mutation");
        Ok(record.attributes.clone())
    }

    /// Snapshot of every record
    pub fn all(&self) -> Vec<DeviceRecord> {
        self.devices.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Thread-safe wrapper for DeviceStateStore
pub type SharedDeviceStateStore = Arc<DeviceStateStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::attr;
    use serde_json::json;
    use vs_core::Category;

    fn outlet() -> DeviceRecord {
        DeviceRecord {
            uuid: "outlet-uuid".to_string(),
            cid: "outlet-cid".to_string(),
            model: "ESW15-USA".to_string(),
            config_module: "VeSyncOutlet15A".to_string(),
            name: "Mock ESW15-USA".to_string(),
            category: Category::Outlet,
            attributes: Attributes::new(),
        }
    }

    #[test]
    fn test_register_applies_defaults() {
        let store = DeviceStateStore::new();
        let record = store.register(outlet());
        assert_eq!(record.attributes[attr::ENABLED], json!(false));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_register_layers_configured_attributes() {
        let store = DeviceStateStore::new();
        let mut device = outlet();
        device.attributes.insert(attr::ENABLED.to_string(), json!(true));
        let record = store.register(device);
        assert_eq!(record.attributes[attr::ENABLED], json!(true));
        assert_eq!(record.attributes[attr::NIGHT_LIGHT], json!("off"));
    }

    #[test]
    fn test_register_does_not_reset_state() {
        let store = DeviceStateStore::new();
        store.register(outlet());
        store.apply("outlet-uuid", &Mutation::SetSwitch(true)).unwrap();

        let again = store.register(outlet());
        assert_eq!(again.attributes[attr::ENABLED], json!(true));
    }

    #[test]
    fn test_find_by_cid() {
        let store = DeviceStateStore::new();
        store.register(outlet());
        assert_eq!(store.find("outlet-cid").unwrap().uuid, "outlet-uuid");
        assert!(store.find("nope").is_none());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let store = DeviceStateStore::new();
        store.register(outlet());
        let first = store.apply("outlet-uuid", &Mutation::SetSwitch(true)).unwrap();
        let second = store.apply("outlet-uuid", &Mutation::SetSwitch(true)).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.attributes("outlet-uuid").unwrap(), second);
    }

    #[test]
    fn test_apply_unknown_device() {
        let store = DeviceStateStore::new();
        let err = store.apply("ghost", &Mutation::SetSwitch(true)).unwrap_err();
        assert!(matches!(err, EngineError::UnknownDevice(_)));
    }

    #[test]
    fn test_apply_rejects_inapplicable_mutation() {
        let store = DeviceStateStore::new();
        store.register(outlet());
        let err = store.apply("outlet-uuid", &Mutation::SetHumidity(50)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidStateTransition(_)));
        assert!(!store.attributes("outlet-uuid").unwrap().contains_key(attr::HUMIDITY));
    }

    #[test]
    fn test_reads_do_not_mutate() {
        let store = DeviceStateStore::new();
        store.register(outlet());
        let before = store.attributes("outlet-uuid");
        let _ = store.get("outlet-uuid");
        let _ = store.find("outlet-cid");
        assert_eq!(store.attributes("outlet-uuid"), before);
    }

    #[test]
    fn test_concurrent_mutations_on_one_device() {
        let store = Arc::new(DeviceStateStore::new());
        let mut fan = outlet();
        fan.uuid = "fan".to_string();
        fan.cid = "fan".to_string();
        fan.category = Category::Fan;
        store.register(fan);

        let handles: Vec<_> = (1..=8)
            .map(|level| {
                let store = store.clone();
                std::thread::spawn(move || store.apply("fan", &Mutation::SetLevel(level)).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let level = store.attributes("fan").unwrap()[attr::LEVEL].as_i64().unwrap();
        assert!((1..=8).contains(&level));
    }

    #[test]
    fn test_concurrent_mutations_on_two_devices() {
        let store = Arc::new(DeviceStateStore::new());
        let mut second = outlet();
        second.uuid = "second-uuid".to_string();
        second.cid = "second-cid".to_string();
        store.register(outlet());
        store.register(second);

        // Each device ends on a different value after many interleaved writes
        let writers: Vec<_> = [("outlet-uuid", true, "on"), ("second-uuid", false, "dim")]
            .into_iter()
            .map(|(uuid, last, night_light)| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        store.apply(uuid, &Mutation::SetSwitch(i % 2 == 0)).unwrap();
                    }
                    store.apply(uuid, &Mutation::SetSwitch(last)).unwrap();
                    store
                        .apply(uuid, &Mutation::SetNightLight(night_light.to_string()))
                        .unwrap();
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let first = store.attributes("outlet-uuid").unwrap();
        assert_eq!(first[attr::ENABLED], json!(true));
        assert_eq!(first[attr::NIGHT_LIGHT], json!("on"));

        let second = store.attributes("second-uuid").unwrap();
        assert_eq!(second[attr::ENABLED], json!(false));
        assert_eq!(second[attr::NIGHT_LIGHT], json!("dim"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_dimmer_outlet_takes_brightness() {
        let store = DeviceStateStore::new();
        let mut dimmer = outlet();
        dimmer.uuid = "dimmer-uuid".to_string();
        dimmer.cid = "dimmer-cid".to_string();
        dimmer.model = "ESWD16".to_string();
        store.register(outlet());
        let record = store.register(dimmer);
        assert_eq!(record.category, Category::Outlet);
        assert_eq!(record.attributes[attr::BRIGHTNESS], json!(100));

        let attributes = store.apply("dimmer-uuid", &Mutation::SetBrightness(30)).unwrap();
        assert_eq!(attributes[attr::BRIGHTNESS], json!(30));

        let err = store.apply("outlet-uuid", &Mutation::SetBrightness(30)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidStateTransition(_)));
    }
}
