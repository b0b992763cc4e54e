// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Ramp meter timing plans.
//!
//! A timing plan is a half-day release-rate window for one meter. Plans
//! are combined into per-period timing table rows by the device drivers;
//! overlapping plans take the most restrictive red time and the union of
//! their windows.

use serde::{Deserialize, Serialize};

/// Half-day period indexes for timing tables.
pub const AM: usize = 0;
pub const PM: usize = 1;

/// Minute of 12 noon, the AM/PM split.
pub const NOON: u16 = 12 * 60;

/// Metering rate selector stored in a timing table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterRate {
    /// Meter dark / flashing, no release cycle.
    Flash,
    /// Time-of-day metering between the row's start and stop times.
    Tod,
}

impl MeterRate {
    pub fn code(self) -> u8 {
        match self {
            Self::Flash => 0,
            Self::Tod => 1,
        }
    }
}

/// One metering window targeting a single device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingPlan {
    pub name: String,
    pub active: bool,
    /// Name of the ramp meter this plan targets.
    pub device: String,
    /// Window start, minute of day.
    pub start_min: u16,
    /// Window stop, minute of day.
    pub stop_min: u16,
    /// Target release rate, vehicles per hour.
    pub target: u16,
}

impl TimingPlan {
    /// Check whether this plan belongs to the given half-day period.
    pub fn in_period(&self, period: usize) -> bool {
        match period {
            AM => self.stop_min <= NOON,
            PM => self.start_min >= NOON,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(start_min: u16, stop_min: u16) -> TimingPlan {
        TimingPlan {
            name: "p".to_string(),
            active: true,
            device: "m".to_string(),
            start_min,
            stop_min,
            target: 900,
        }
    }

    #[test]
    fn test_period_split() {
        assert!(plan(360, 540).in_period(AM));
        assert!(!plan(360, 540).in_period(PM));
        assert!(plan(900, 1140).in_period(PM));
        assert!(!plan(900, 1140).in_period(AM));
        // A window straddling noon belongs to neither half-day table.
        assert!(!plan(600, 780).in_period(AM));
        assert!(!plan(600, 780).in_period(PM));
    }
}
