// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Device-operation sequencing engine.
//!
//! One comm task per field controller drives queued operations through
//! their phase chains over a duplex link, serializing device access and
//! handling timeouts, retries and failure escalation.

pub mod controller;
pub mod link;
pub mod op;
pub mod policies;
pub mod task;
pub mod testing;
pub mod wire;

pub use controller::{Controller, ControllerHealth};
pub use link::{CommLink, LinkFuture, SerialLink, TcpLink};
pub use op::{OpCarrier, OpFuture, OpOutcome, OpPriority, OpStatus, Operation};
pub use policies::{ExponentialBackoff, FixedDelay, NoRetry, RetryPolicy};
pub use task::{run_comm_task, spawn_comm_task, CommHandle, CommTaskConfig};
pub use wire::{WireCodec, WireRequest, WireResponse};
