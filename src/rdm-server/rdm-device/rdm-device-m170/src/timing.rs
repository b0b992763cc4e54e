// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Timing table assembly from active metering plans.
//!
//! Each meter carries one table row per half-day period. Active plans
//! targeting the meter contribute to the row of their period; overlapping
//! plans combine by keeping the most restrictive (longest) red interval
//! and widening the window to the union of contributors.

use rdm_core::math::bcd;
use rdm_core::plan::{AM, PM};
use rdm_core::{DynResult, MeterRate, TimingPlan};

/// Table slot defaults when no plan contributes: meter dark mid-period.
pub const AM_MID_BCD: u16 = 1000;
pub const PM_MID_BCD: u16 = 1400;

/// System-wide metering intervals, tenths of a second.
#[derive(Debug, Clone)]
pub struct MeterTimes {
    pub startup_green: u16,
    pub startup_yellow: u16,
    pub green: u16,
    pub yellow: u16,
    pub hov_preempt: u16,
}

impl Default for MeterTimes {
    fn default() -> Self {
        Self {
            startup_green: 80,
            startup_yellow: 50,
            green: 13,
            yellow: 7,
            hov_preempt: 65,
        }
    }
}

/// Per-period timing table row pair for one ramp meter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingTable {
    /// Red interval, tenths of a second.
    pub red: [u16; 2],
    pub rate: [MeterRate; 2],
    /// Window start, 4-digit clock form.
    pub start: [u16; 2],
    /// Window stop, 4-digit clock form.
    pub stop: [u16; 2],
}

impl Default for TimingTable {
    fn default() -> Self {
        Self {
            red: [1, 1],
            rate: [MeterRate::Flash, MeterRate::Flash],
            start: [AM_MID_BCD, PM_MID_BCD],
            stop: [AM_MID_BCD, PM_MID_BCD],
        }
    }
}

/// Red interval for a target release rate, tenths of a second.
pub fn red_time_tenths(target_vph: u16, times: &MeterTimes) -> u16 {
    if target_vph == 0 {
        return 1;
    }
    let cycle = 36_000 / u32::from(target_vph);
    cycle
        .saturating_sub(u32::from(times.green) + u32::from(times.yellow))
        .max(1) as u16
}

/// Combine the active plans targeting `meter` into its timing table.
pub fn merge_plans(meter: &str, plans: &[TimingPlan], times: &MeterTimes) -> TimingTable {
    let mut table = TimingTable::default();
    for plan in plans {
        if !plan.active || plan.device != meter {
            continue;
        }
        for period in [AM, PM] {
            if !plan.in_period(period) {
                continue;
            }
            let red = red_time_tenths(plan.target, times);
            let start = bcd::minute_bcd(plan.start_min);
            let stop = bcd::minute_bcd(plan.stop_min);
            if table.rate[period] == MeterRate::Flash {
                table.red[period] = red;
                table.rate[period] = MeterRate::Tod;
                table.start[period] = start;
                table.stop[period] = stop;
            } else {
                table.red[period] = table.red[period].max(red);
                table.start[period] = table.start[period].min(start);
                table.stop[period] = table.stop[period].max(stop);
            }
        }
    }
    table
}

/// Pack both half-day rows into the fixed BCD wire layout.
pub fn pack_table(table: &TimingTable, times: &MeterTimes) -> DynResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(54);
    for period in [AM, PM] {
        bcd::push_bcd16(&mut buf, times.startup_green)?;
        bcd::push_bcd16(&mut buf, times.startup_yellow)?;
        bcd::push_bcd16(&mut buf, times.green)?;
        bcd::push_bcd16(&mut buf, times.yellow)?;
        bcd::push_bcd16(&mut buf, times.hov_preempt)?;
        for _ in 0..6 {
            bcd::push_bcd16(&mut buf, table.red[period])?;
        }
        bcd::push_bcd8(&mut buf, table.rate[period].code())?;
        bcd::push_bcd16(&mut buf, table.start[period])?;
        bcd::push_bcd16(&mut buf, table.stop[period])?;
    }
    Ok(buf)
}
