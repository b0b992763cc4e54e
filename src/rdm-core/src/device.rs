// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Shared device and controller primitives.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Deployment condition of a field controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerCondition {
    Planned,
    #[default]
    Active,
    Construction,
    Removed,
    Testing,
}

impl fmt::Display for ControllerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planned => "PLANNED",
            Self::Active => "ACTIVE",
            Self::Construction => "CONSTRUCTION",
            Self::Removed => "REMOVED",
            Self::Testing => "TESTING",
        };
        write!(f, "{}", s)
    }
}

/// Externally triggered device requests that map onto comm operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRequest {
    SendSettings,
    QueryConfiguration,
    QueryStatus,
    ResetDevice,
    DisableSystem,
}

/// Display style bits recomputed whenever externally visible device
/// state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStyle {
    Active,
    Failed,
    Maintenance,
    Closed,
    Open,
    Moving,
}

impl ItemStyle {
    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_bits_distinct() {
        let styles = [
            ItemStyle::Active,
            ItemStyle::Failed,
            ItemStyle::Maintenance,
            ItemStyle::Closed,
            ItemStyle::Open,
            ItemStyle::Moving,
        ];
        let mut seen = 0u32;
        for s in styles {
            assert_eq!(seen & s.bit(), 0);
            seen |= s.bit();
        }
    }
}
