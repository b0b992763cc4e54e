// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Entity persistence.
//!
//! Entities expose an explicit column map ([`Storable`]); the store
//! writes those maps into a pickledb file keyed by `type/name`. Only
//! explicitly registered types are accepted.

use std::path::Path;
use std::sync::Mutex;

use pickledb::{PickleDb, PickleDbDumpPolicy, SerializationMethod};
use serde_json::{Map, Value};
use tracing::warn;

use rdm_core::Storable;

/// Entity types the store persists. Registration is explicit; there is
/// no runtime type discovery.
pub const REGISTERED_TYPES: &[&str] = &[
    "controller",
    "gate_arm",
    "gate_arm_array",
    "action_plan",
];

pub struct EntityStore {
    db: Mutex<PickleDb>,
}

impl EntityStore {
    /// Open the store file, creating it when absent.
    pub fn open(path: &Path) -> Self {
        let db = PickleDb::load(path, PickleDbDumpPolicy::AutoDump, SerializationMethod::Json)
            .unwrap_or_else(|_| {
                PickleDb::new(path, PickleDbDumpPolicy::AutoDump, SerializationMethod::Json)
            });
        Self { db: Mutex::new(db) }
    }

    /// Persist the entity's current column map.
    pub fn save(&self, entity: &dyn Storable) {
        let type_name = entity.type_name();
        if !REGISTERED_TYPES.contains(&type_name) {
            warn!("refusing to persist unregistered entity type {}", type_name);
            return;
        }
        let mut map = Map::new();
        for (column, value) in entity.columns() {
            map.insert(
                column.to_string(),
                serde_json::to_value(value).unwrap_or(Value::Null),
            );
        }
        let key = format!("{}/{}", type_name, entity.key());
        if let Err(e) = self.db.lock().unwrap().set(&key, &Value::Object(map)) {
            warn!("failed to persist {}: {}", key, e);
        }
    }

    /// Load a previously stored column map.
    pub fn load(&self, type_name: &str, key: &str) -> Option<Value> {
        self.db
            .lock()
            .unwrap()
            .get::<Value>(&format!("{}/{}", type_name, key))
    }
}

#[cfg(test)]
mod tests {
    use rdm_core::ColumnValue;

    use super::*;

    struct FakeEntity {
        type_name: &'static str,
    }

    impl Storable for FakeEntity {
        fn type_name(&self) -> &'static str {
            self.type_name
        }

        fn key(&self) -> String {
            "x_1".to_string()
        }

        fn columns(&self) -> Vec<(&'static str, ColumnValue)> {
            vec![
                ("name", "x_1".into()),
                ("pin", 3u8.into()),
                ("enabled", true.into()),
                ("notes", ColumnValue::Null),
            ]
        }
    }

    fn temp_store(label: &str) -> (EntityStore, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "rdm-store-{}-{}.json",
            label,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        (EntityStore::open(&path), path)
    }

    #[test]
    fn test_save_and_load_column_map() {
        let (store, path) = temp_store("roundtrip");
        store.save(&FakeEntity {
            type_name: "gate_arm",
        });
        let value = store.load("gate_arm", "x_1").unwrap();
        assert_eq!(value["name"], "x_1");
        assert_eq!(value["pin"], 3);
        assert_eq!(value["enabled"], true);
        assert!(value["notes"].is_null());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_unregistered_type_refused() {
        let (store, path) = temp_store("unregistered");
        store.save(&FakeEntity {
            type_name: "video_monitor",
        });
        assert!(store.load("video_monitor", "x_1").is_none());
        let _ = std::fs::remove_file(path);
    }
}
