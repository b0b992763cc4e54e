// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Gate arm arrays and their safety interlock coordinator.
//!
//! A gate arm array groups up to [`array::MAX_ARMS`] physical arms at one
//! location behind a single mutual-exclusion domain. It aggregates the
//! member arms' reported states into one logical state, validates
//! requested transitions against that state and the interlock inputs, and
//! derives the interlock posture that vetoes physically unsafe commands.

pub mod arm;
pub mod array;
pub mod interlock;
pub mod ops;
pub mod system;

pub use arm::GateArm;
pub use array::{
    aggregate_arm_state, validate_state_req, ArrayConfig, ArrayDeps, ArrayStatus, GateArmArray,
    MAX_ARMS,
};
pub use interlock::LockState;
pub use ops::{interlock_code, ArmChannel, QueryGateStatus, SendGateState, SendInterlock};
pub use system::GateSystem;
