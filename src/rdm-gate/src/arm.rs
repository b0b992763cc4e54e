// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! One physical gate arm assigned to an array slot.

use rdm_core::{ColumnValue, GateArmState, Storable};

/// A single gate arm actuator. Owned by its array slot; mutated only by
/// controller status updates and the array's transition requests.
#[derive(Debug, Clone)]
pub struct GateArm {
    pub name: String,
    /// Controller this arm is wired to.
    pub controller: String,
    /// Controller I/O pin.
    pub pin: u8,
    /// Configuration-active flag.
    pub enabled: bool,
    /// Communication to the arm is healthy.
    pub online: bool,
    /// Last reported state.
    pub state: GateArmState,
}

impl GateArm {
    pub fn new(name: impl Into<String>, controller: impl Into<String>, pin: u8) -> Self {
        Self {
            name: name.into(),
            controller: controller.into(),
            pin,
            enabled: true,
            online: false,
            state: GateArmState::Unknown,
        }
    }
}

impl Storable for GateArm {
    fn type_name(&self) -> &'static str {
        "gate_arm"
    }

    fn key(&self) -> String {
        self.name.clone()
    }

    fn columns(&self) -> Vec<(&'static str, ColumnValue)> {
        vec![
            ("name", self.name.as_str().into()),
            ("controller", self.controller.as_str().into()),
            ("pin", self.pin.into()),
            ("enabled", self.enabled.into()),
        ]
    }
}
