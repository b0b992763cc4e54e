// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Gate arm state and interlock enums shared by the comm engine and the
//! array coordinator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reported state of one gate arm; also the aggregate state of an array.
///
/// There is no ordering between states beyond the transition table the
/// array coordinator enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateArmState {
    Unknown,
    Fault,
    Opening,
    Open,
    WarnClose,
    Closing,
    Closed,
    Timeout,
}

impl GateArmState {
    /// Stable wire code used by device drivers.
    pub fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Fault => 1,
            Self::Opening => 2,
            Self::Open => 3,
            Self::WarnClose => 4,
            Self::Closing => 5,
            Self::Closed => 6,
            Self::Timeout => 7,
        }
    }

    /// Decode a wire code back into a state.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Unknown),
            1 => Some(Self::Fault),
            2 => Some(Self::Opening),
            3 => Some(Self::Open),
            4 => Some(Self::WarnClose),
            5 => Some(Self::Closing),
            6 => Some(Self::Closed),
            7 => Some(Self::Timeout),
            _ => None,
        }
    }
}

impl fmt::Display for GateArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "UNKNOWN",
            Self::Fault => "FAULT",
            Self::Opening => "OPENING",
            Self::Open => "OPEN",
            Self::WarnClose => "WARN_CLOSE",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
            Self::Timeout => "TIMEOUT",
        };
        write!(f, "{}", s)
    }
}

/// Interlock posture of a gate arm array, derived from its lock state.
///
/// Sent to member arms so physically unsafe commands are vetoed at the
/// device as well as at the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateArmInterlock {
    None,
    DenyOpen,
    DenyClose,
    DenyAll,
    SystemDisable,
}

impl GateArmInterlock {
    /// Whether opening is vetoed under this interlock.
    pub fn deny_open(self) -> bool {
        matches!(self, Self::DenyOpen | Self::DenyAll | Self::SystemDisable)
    }

    /// Whether closing is vetoed under this interlock.
    pub fn deny_close(self) -> bool {
        matches!(self, Self::DenyClose | Self::DenyAll)
    }
}

impl fmt::Display for GateArmInterlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::DenyOpen => "DENY_OPEN",
            Self::DenyClose => "DENY_CLOSE",
            Self::DenyAll => "DENY_ALL",
            Self::SystemDisable => "SYSTEM_DISABLE",
        };
        write!(f, "{}", s)
    }
}
