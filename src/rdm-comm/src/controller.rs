// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Field controller entity and its externally visible health.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{info, warn};

use rdm_core::{ColumnValue, ControllerCondition, Notifier, Storable};

/// Externally visible health of one controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerHealth {
    /// Communication to the drop has failed and been escalated.
    pub failed: bool,
    /// Last escalated communication error.
    pub error_status: String,
    /// Maintenance status recorded by protocol/logical faults.
    pub maint_status: String,
    /// Firmware version reported by the device.
    pub version: String,
}

/// A field controller reachable through one comm link.
///
/// Health mutators notify the replication layer exactly once per logical
/// change and publish the new health on a watch channel.
pub struct Controller {
    name: String,
    drop_addr: u8,
    condition: ControllerCondition,
    notifier: Arc<dyn Notifier>,
    inner: Mutex<ControllerHealth>,
    status_tx: watch::Sender<ControllerHealth>,
}

impl Controller {
    pub fn new(
        name: impl Into<String>,
        drop_addr: u8,
        condition: ControllerCondition,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ControllerHealth::default());
        Self {
            name: name.into(),
            drop_addr,
            condition,
            notifier,
            inner: Mutex::new(ControllerHealth::default()),
            status_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn drop_addr(&self) -> u8 {
        self.drop_addr
    }

    pub fn condition(&self) -> ControllerCondition {
        self.condition
    }

    /// Only active controllers are polled.
    pub fn is_active(&self) -> bool {
        self.condition == ControllerCondition::Active
    }

    pub fn health(&self) -> ControllerHealth {
        self.inner.lock().unwrap().clone()
    }

    pub fn is_failed(&self) -> bool {
        self.inner.lock().unwrap().failed
    }

    /// Subscribe to health changes.
    pub fn subscribe(&self) -> watch::Receiver<ControllerHealth> {
        self.status_tx.subscribe()
    }

    /// Mark the controller degraded after an escalated comm fault.
    pub fn set_failed(&self, reason: &str) {
        self.update(|h| {
            if h.failed && h.error_status == reason {
                return false;
            }
            h.failed = true;
            h.error_status = reason.to_string();
            warn!("controller {} failed: {}", self.name, reason);
            true
        });
    }

    /// Record a successful exchange, clearing any failed status.
    pub fn set_ok(&self) {
        self.update(|h| {
            if !h.failed && h.error_status.is_empty() {
                return false;
            }
            h.failed = false;
            h.error_status.clear();
            info!("controller {} ok", self.name);
            true
        });
    }

    /// Record a maintenance status from a survivable protocol fault.
    pub fn set_maint(&self, status: &str) {
        self.update(|h| {
            if h.maint_status == status {
                return false;
            }
            h.maint_status = status.to_string();
            true
        });
    }

    /// Record the firmware version reported by the device.
    pub fn set_version(&self, version: &str) {
        self.update(|h| {
            if h.version == version {
                return false;
            }
            h.version = version.to_string();
            true
        });
    }

    fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut ControllerHealth) -> bool,
    {
        let mut inner = self.inner.lock().unwrap();
        if f(&mut inner) {
            let health = inner.clone();
            drop(inner);
            self.notifier.notify_attribute("controller", &self.name, "status");
            let _ = self.status_tx.send(health);
        }
    }
}

impl Storable for Controller {
    fn type_name(&self) -> &'static str {
        "controller"
    }

    fn key(&self) -> String {
        self.name.clone()
    }

    fn columns(&self) -> Vec<(&'static str, ColumnValue)> {
        let health = self.health();
        vec![
            ("name", self.name.as_str().into()),
            ("drop", self.drop_addr.into()),
            ("condition", self.condition.to_string().as_str().into()),
            ("version", health.version.as_str().into()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingNotifier {
        count: AtomicUsize,
    }

    impl Notifier for CountingNotifier {
        fn notify_attribute(&self, _type_name: &str, _object: &str, _attribute: &str) {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn controller(notifier: Arc<CountingNotifier>) -> Controller {
        Controller::new("ctl_1", 1, ControllerCondition::Active, notifier)
    }

    #[test]
    fn test_set_failed_notifies_once_per_change() {
        let notifier = Arc::new(CountingNotifier::default());
        let c = controller(notifier.clone());

        c.set_failed("response timeout");
        c.set_failed("response timeout");
        assert_eq!(notifier.count.load(Ordering::Relaxed), 1);
        assert!(c.is_failed());

        c.set_ok();
        assert_eq!(notifier.count.load(Ordering::Relaxed), 2);
        assert!(!c.is_failed());

        // Already ok; no further notification.
        c.set_ok();
        assert_eq!(notifier.count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_version_and_maint() {
        let notifier = Arc::new(CountingNotifier::default());
        let c = controller(notifier.clone());

        c.set_version("4.2");
        c.set_version("4.2");
        c.set_maint("CABINET STYLE 3");
        assert_eq!(notifier.count.load(Ordering::Relaxed), 2);

        let health = c.health();
        assert_eq!(health.version, "4.2");
        assert_eq!(health.maint_status, "CABINET STYLE 3");
    }

    #[test]
    fn test_watch_publishes_health() {
        let notifier = Arc::new(CountingNotifier::default());
        let c = controller(notifier);
        let rx = c.subscribe();

        c.set_failed("connection lost: eof");
        assert!(rx.borrow().failed);
    }
}
