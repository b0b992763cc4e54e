// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Operations and their phase chains.
//!
//! An operation is one queued unit of work against a single controller.
//! Each `poll` call executes one request/response round-trip; the
//! operation advances its own step value only on success, so a retried
//! call re-runs the same phase. Deep phase-class hierarchies are avoided:
//! a concrete operation is a struct holding a step enum and matching on
//! it inside `poll`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rdm_core::{DeviceError, DeviceResult};

use crate::link::CommLink;
use crate::wire::{WireCodec, WireRequest, WireResponse};

/// Scheduling priority for pending operations. Declared lowest-to-highest
/// so the derived ordering ranks more urgent work higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OpPriority {
    Download,
    LongPoll,
    ShortPoll,
    Command,
    Urgent,
}

/// Progress of an operation after one phase round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    /// More phases remain.
    Continue,
    /// The phase chain terminated successfully.
    Done,
}

/// Final disposition delivered to an operation exactly once.
#[derive(Debug)]
pub enum OpOutcome {
    Succeeded,
    /// Anticipated failure, swallowed without degrading the controller.
    Expected(DeviceError),
    /// Escalated failure; the controller has been marked degraded.
    Failed(DeviceError),
}

/// Request/response carrier handed to a phase for one round-trip.
pub struct OpCarrier<'a> {
    link: &'a mut dyn CommLink,
    codec: &'a mut dyn WireCodec,
    drop_addr: u8,
    window: Duration,
}

impl<'a> OpCarrier<'a> {
    pub fn new(
        link: &'a mut dyn CommLink,
        codec: &'a mut dyn WireCodec,
        drop_addr: u8,
        window: Duration,
    ) -> Self {
        Self {
            link,
            codec,
            drop_addr,
            window,
        }
    }

    pub fn drop_addr(&self) -> u8 {
        self.drop_addr
    }

    /// Run one framed request/response exchange.
    pub async fn transact(&mut self, req: WireRequest) -> DeviceResult<WireResponse> {
        let frame = self.codec.encode_request(self.drop_addr, &req)?;
        self.link.send(&frame).await?;
        let len = self.codec.response_len(&req);
        let raw = self.link.recv_exact(len, self.window).await?;
        self.codec.decode_response(&req, &raw)
    }
}

pub type OpFuture<'a> = Pin<Box<dyn Future<Output = DeviceResult<OpStatus>> + Send + 'a>>;

/// A queued unit of work executing a phase chain against one controller.
pub trait Operation: Send {
    fn name(&self) -> &'static str;

    fn priority(&self) -> OpPriority {
        OpPriority::Command
    }

    /// Execute the current phase: one request/response round-trip ending
    /// with the decision which phase runs next.
    fn poll<'a>(&'a mut self, carrier: &'a mut OpCarrier<'a>) -> OpFuture<'a>;

    /// Exactly-once completion hook. Every operation terminates through
    /// this call, whether it succeeded, failed expectedly, or escalated.
    fn complete(self: Box<Self>, outcome: OpOutcome);
}

pub(crate) struct PendingOp {
    seq: u64,
    pub(crate) op: Box<dyn Operation>,
}

impl PendingOp {
    fn key(&self) -> (OpPriority, std::cmp::Reverse<u64>) {
        (self.op.priority(), std::cmp::Reverse(self.seq))
    }
}

impl PartialEq for PendingOp {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for PendingOp {}

impl PartialOrd for PendingOp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingOp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Priority-ordered pending set, FIFO within one priority.
pub(crate) struct OpQueue {
    heap: BinaryHeap<PendingOp>,
    seq: u64,
}

impl OpQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub(crate) fn push(&mut self, op: Box<dyn Operation>) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(PendingOp { seq, op });
    }

    pub(crate) fn pop(&mut self) -> Option<Box<dyn Operation>> {
        self.heap.pop().map(|p| p.op)
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Box<dyn Operation>> + '_ {
        std::iter::from_fn(|| self.pop())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
