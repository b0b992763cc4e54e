// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Cross-array gate system checks.
//!
//! The system owns the registry of arrays and the whole-system enable
//! flag, and recomputes the cross-array interlock inputs: opposing open
//! direction per road, dependent-open propagation to prerequisite arrays,
//! and prerequisite-closed checks.
//!
//! All cross-array reads use the arrays' published status snapshots, so
//! no two array locks are ever held at once; physical gate motion is far
//! slower than the recompute cadence, which makes the bounded staleness
//! acceptable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use rdm_core::AlertSink;

use crate::array::{ArrayStatus, GateArmArray};

/// Registry and interlock coordinator for every gate arm array.
pub struct GateSystem {
    arrays: Mutex<Vec<Arc<GateArmArray>>>,
    enabled: AtomicBool,
    alerts: Arc<dyn AlertSink>,
}

struct ArraySnap {
    name: String,
    road: String,
    dir: u8,
    prereq: Option<String>,
    status: ArrayStatus,
}

impl GateSystem {
    pub fn new(alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            arrays: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
            alerts,
        }
    }

    pub fn register(&self, array: Arc<GateArmArray>) {
        self.arrays.lock().unwrap().push(array);
    }

    pub fn arrays(&self) -> Vec<Arc<GateArmArray>> {
        self.arrays.lock().unwrap().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Disable the whole gate arm system, e.g. after a configuration
    /// change touched a safety-relevant attribute. Stays down until
    /// explicitly re-enabled.
    pub fn disable(&self, name: &str, reason: &str) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            warn!("gate arm system disabled: {} ({})", reason, name);
            self.alerts
                .send_alert(&format!("GATE ARM SYSTEM DISABLED: {}", reason));
            self.recompute_interlocks();
        }
    }

    pub fn enable(&self) {
        if !self.enabled.swap(true, Ordering::SeqCst) {
            info!("gate arm system enabled");
            self.recompute_interlocks();
        }
    }

    /// Recompute every array's cross-array interlock inputs. Submitted
    /// periodically as a timer job and re-run on array status changes.
    pub fn recompute_interlocks(&self) {
        let arrays = self.arrays();
        let snaps: Vec<ArraySnap> = arrays
            .iter()
            .map(|a| ArraySnap {
                name: a.name().to_string(),
                road: a.road().to_string(),
                dir: a.road_dir(),
                prereq: a.prereq().map(str::to_string),
                status: a.status(),
            })
            .collect();

        // Valid open direction per road: 0 none open, -1 conflicting.
        let mut open_dir: HashMap<&str, i16> = HashMap::new();
        for snap in &snaps {
            if snap.status.possibly_open {
                let dir = open_dir.entry(snap.road.as_str()).or_insert(0);
                if *dir == 0 {
                    *dir = i16::from(snap.dir);
                } else if *dir != i16::from(snap.dir) {
                    *dir = -1;
                }
            }
        }

        // An array's dependents are the arrays naming it as prerequisite.
        let mut dep_open: HashMap<&str, bool> = HashMap::new();
        for snap in &snaps {
            if let Some(prereq) = snap.prereq.as_deref() {
                *dep_open.entry(prereq).or_insert(false) |= snap.status.possibly_open;
            }
        }

        let fully_open: HashMap<&str, bool> = snaps
            .iter()
            .map(|s| (s.name.as_str(), s.status.fully_open))
            .collect();

        let enabled = self.is_enabled();
        for (array, snap) in arrays.iter().zip(&snaps) {
            array.set_open_direction(open_dir.get(snap.road.as_str()).copied().unwrap_or(0));
            array.set_dependent_open(dep_open.get(snap.name.as_str()).copied().unwrap_or(false));
            let prereq_closed = snap
                .prereq
                .as_deref()
                .map(|p| !fully_open.get(p).copied().unwrap_or(false))
                .unwrap_or(false);
            array.set_prereq_closed(prereq_closed);
            array.set_system_enable(enabled);
        }
    }
}
