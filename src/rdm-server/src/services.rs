// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Server-side implementations of the core capability interfaces:
//! alerting, change notification, and the arm command channel that
//! routes gate arm work onto the controllers' comm tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};

use rdm_comm::CommHandle;
use rdm_core::{AlertSink, DeviceRequest, GateArmInterlock, GateArmState, Notifier};
use rdm_gate::{ArmChannel, GateArm, GateArmArray, QueryGateStatus, SendGateState, SendInterlock};

/// Alert sink that writes alerts to the log. Delivery is best-effort;
/// a mail or paging relay can subscribe to the same log stream.
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn send_alert(&self, message: &str) {
        error!("ALERT: {}", message);
    }
}

/// Notifier that traces attribute changes for the replication layer.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_attribute(&self, type_name: &str, object: &str, attribute: &str) {
        debug!("{} {}: {} changed", type_name, object, attribute);
    }
}

/// Routes arm commands to the owning controller's comm task.
pub struct CommArmChannel {
    handles: Mutex<HashMap<String, CommHandle>>,
}

impl CommArmChannel {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, controller: &str, handle: CommHandle) {
        self.handles
            .lock()
            .unwrap()
            .insert(controller.to_string(), handle);
    }

    /// Drop all comm handles, letting the comm tasks wind down.
    pub fn clear(&self) {
        self.handles.lock().unwrap().clear();
    }

    fn handle_for(&self, controller: &str) -> Option<CommHandle> {
        self.handles.lock().unwrap().get(controller).cloned()
    }
}

impl Default for CommArmChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ArmChannel for CommArmChannel {
    fn send_arm_state(
        &self,
        array: Arc<GateArmArray>,
        idx: usize,
        arm: GateArm,
        state: GateArmState,
        owner: String,
    ) {
        let Some(handle) = self.handle_for(&arm.controller) else {
            warn!("no comm task for controller {}", arm.controller);
            array.update_arm(idx, GateArmState::Timeout);
            return;
        };
        handle.submit(Box::new(SendGateState::new(array, idx, arm, state, owner)));
    }

    fn send_interlocks(&self, arm: GateArm, interlock: GateArmInterlock) {
        let Some(handle) = self.handle_for(&arm.controller) else {
            warn!("no comm task for controller {}", arm.controller);
            return;
        };
        handle.submit(Box::new(SendInterlock::new(arm, interlock)));
    }

    fn send_device_request(
        &self,
        array: Arc<GateArmArray>,
        idx: usize,
        arm: GateArm,
        req: DeviceRequest,
    ) {
        let Some(handle) = self.handle_for(&arm.controller) else {
            warn!("no comm task for controller {}", arm.controller);
            return;
        };
        match req {
            DeviceRequest::QueryStatus => {
                handle.submit(Box::new(QueryGateStatus::new(array, idx, arm)));
            }
            other => debug!("{}: unhandled device request {:?}", arm.name, other),
        }
    }
}
