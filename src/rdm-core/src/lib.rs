// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod device;
pub mod error;
pub mod gate;
pub mod math;
pub mod notify;
pub mod plan;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use device::{ControllerCondition, DeviceRequest, ItemStyle};
pub use error::{DeviceError, DeviceResult};
pub use gate::{GateArmInterlock, GateArmState};
pub use notify::{ActionPlan, AlertSink, ColumnValue, Notifier, Storable};
pub use plan::{MeterRate, TimingPlan};
