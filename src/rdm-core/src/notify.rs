// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Capability interfaces to the persistence, notification and alerting
//! layers, plus the action plan entity they carry.
//!
//! The coordinator and comm engine receive these at construction; nothing
//! in the core reaches for process-wide singletons.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Fire-and-forget alert delivery. No delivery guarantee is required of
/// implementations.
pub trait AlertSink: Send + Sync {
    fn send_alert(&self, message: &str);
}

/// Change notification to the replication layer.
///
/// Must be invoked exactly once per logical attribute change, never per
/// internal recomputation step.
pub trait Notifier: Send + Sync {
    fn notify_attribute(&self, type_name: &str, object: &str, attribute: &str);

    fn notify_create(&self, _type_name: &str, _object: &str) {}

    fn notify_remove(&self, _type_name: &str, _object: &str) {}
}

/// Explicit column value for entity persistence. Replaces reflective
/// column mapping with a closed set of serializable shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<bool> for ColumnValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ColumnValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u8> for ColumnValue {
    fn from(v: u8) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u16> for ColumnValue {
    fn from(v: u16) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for ColumnValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Option<String>> for ColumnValue {
    fn from(v: Option<String>) -> Self {
        v.map(Self::Text).unwrap_or(Self::Null)
    }
}

/// Column-mapping contract for entities the store persists.
pub trait Storable {
    /// Stable type name, also the registration key.
    fn type_name(&self) -> &'static str;

    /// Primary key within the type.
    fn key(&self) -> String;

    /// Current column values, one entry per persisted attribute.
    fn columns(&self) -> Vec<(&'static str, ColumnValue)>;
}

/// An operator action plan whose current phase gates scheduled messages.
///
/// Gate arm arrays flip their plan between an open phase and a closed
/// phase as the aggregate arm state changes.
#[derive(Debug)]
pub struct ActionPlan {
    name: String,
    phase: Mutex<String>,
}

impl ActionPlan {
    pub fn new(name: impl Into<String>, phase: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phase: Mutex::new(phase.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> String {
        self.phase.lock().unwrap().clone()
    }

    /// Set the phase, returning true when it actually changed. Callers
    /// notify on a true return.
    pub fn set_phase(&self, phase: &str) -> bool {
        let mut cur = self.phase.lock().unwrap();
        if *cur == phase {
            false
        } else {
            *cur = phase.to_string();
            true
        }
    }
}

impl Storable for ActionPlan {
    fn type_name(&self) -> &'static str {
        "action_plan"
    }

    fn key(&self) -> String {
        self.name.clone()
    }

    fn columns(&self) -> Vec<(&'static str, ColumnValue)> {
        vec![
            ("name", self.name.as_str().into()),
            ("phase", self.phase().as_str().into()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_phase_reports_change() {
        let plan = ActionPlan::new("lanes", "closed");
        assert!(!plan.set_phase("closed"));
        assert!(plan.set_phase("open"));
        assert_eq!(plan.phase(), "open");
        assert!(!plan.set_phase("open"));
    }

    #[test]
    fn test_column_values() {
        let plan = ActionPlan::new("lanes", "closed");
        let cols = plan.columns();
        assert_eq!(cols[0], ("name", ColumnValue::Text("lanes".into())));
        assert_eq!(cols[1], ("phase", ColumnValue::Text("closed".into())));
    }
}
