// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for rdm-server.
//!
//! Config is loaded from the `[rdm-server]` section of `rdm.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./rdm.toml`
//! 3. `~/.config/rdm/rdm.toml`
//! 4. `/etc/rdm/rdm.toml`

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use rdm_app::ConfigFile;
use rdm_core::{ControllerCondition, TimingPlan};

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Entity persistence settings
    pub store: StoreConfig,
    /// Field controllers to poll
    pub controllers: Vec<ControllerConfig>,
    /// Gate arm arrays
    pub arrays: Vec<ArrayConfigFile>,
    /// Ramp meter timing plans
    pub plans: Vec<TimingPlan>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Site or district label
    pub site: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
    /// Gate arm poll and interlock recompute cadence, seconds
    pub poll_interval_s: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            site: None,
            log_level: None,
            poll_interval_s: 5,
        }
    }
}

/// Entity persistence settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the entity store file; defaults to `rdm-entities.json`
    /// in the working directory.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from("rdm-entities.json"))
    }
}

/// How a controller drop is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccessConfig {
    Serial { path: String, baud: u32 },
    Tcp { addr: String },
    Loopback,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self::Loopback
    }
}

/// One field controller and its comm behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub name: String,
    /// Protocol driver name (e.g. "m170", "dummy")
    pub protocol: String,
    /// Drop address on the shared line
    pub drop: u8,
    pub access: AccessConfig,
    pub condition: ControllerCondition,
    /// Receive window for one response frame, milliseconds
    pub recv_timeout_ms: u64,
    /// Attempts per phase before escalating
    pub retries: u32,
    /// Stop polling after this many idle seconds
    pub idle_stop_s: Option<u64>,
    /// Perform a level-1 restart during settings download
    pub restart: bool,
    /// Expected cabinet style dip switch setting
    pub cabinet_dip: Option<u8>,
    /// Comm fail threshold, tenths of a second
    pub comm_fail_threshold: u8,
    /// Metered ramps served by this cabinet (up to two)
    pub meters: Vec<MeterConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            protocol: "dummy".to_string(),
            drop: 1,
            access: AccessConfig::default(),
            condition: ControllerCondition::Active,
            recv_timeout_ms: 800,
            retries: 3,
            idle_stop_s: None,
            restart: false,
            cabinet_dip: None,
            comm_fail_threshold: 10,
            meters: Vec::new(),
        }
    }
}

/// One metered ramp on a cabinet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub name: String,
    /// Detector inputs watching the queue
    pub queue_inputs: Vec<u8>,
}

/// One gate arm array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayConfigFile {
    pub name: String,
    pub road: String,
    pub road_dir: u8,
    pub prereq: Option<String>,
    pub camera: Option<String>,
    pub approach: Option<String>,
    pub action_plan: Option<String>,
    pub open_phase: Option<String>,
    pub closed_phase: Option<String>,
    pub arms: Vec<ArmConfig>,
}

/// One gate arm in an array slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmConfig {
    pub name: String,
    pub controller: String,
    pub pin: u8,
    /// Slot index, 1-based
    pub idx: usize,
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "rdm-server"
    }
}

/// Example configuration printed by `--print-config`.
pub const EXAMPLE: &str = r#"[rdm-server.general]
# site = "district_4"
# log_level = "info"
poll_interval_s = 5

[rdm-server.store]
# path = "/var/lib/rdm/entities.json"

[[rdm-server.controllers]]
name = "ctl_490"
protocol = "m170"
drop = 3
access = { type = "serial", path = "/dev/ttyS0", baud = 9600 }
recv_timeout_ms = 800
retries = 3
cabinet_dip = 7
meters = [{ name = "meter_490_e", queue_inputs = [0, 1] }]

[[rdm-server.controllers]]
name = "ctl_gate_1"
protocol = "dummy"
drop = 1

[[rdm-server.arrays]]
name = "ga_array_1"
road = "US-52"
road_dir = 1
arms = [{ name = "ga_1", controller = "ctl_gate_1", pin = 2, idx = 1 }]

[[rdm-server.plans]]
name = "am_peak"
active = true
device = "meter_490_e"
start_min = 390
stop_min = 540
target = 600
"#;
