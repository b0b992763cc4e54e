// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Per-controller comm task.
//!
//! One task serializes all device access for one controller: it pulls
//! pending operations in priority order and drives each phase chain to
//! completion, retrying transient faults against the same phase and
//! escalating everything else. The task itself survives operation
//! failures and resumes with the next pending unit of work.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use rdm_core::DeviceError;

use crate::controller::Controller;
use crate::link::CommLink;
use crate::op::{OpCarrier, OpOutcome, OpQueue, OpStatus, Operation};
use crate::policies::{FixedDelay, RetryPolicy};
use crate::wire::WireCodec;

const COMM_TASK_CHANNEL_BUFFER: usize = 32;

/// Configuration for one controller's comm task.
pub struct CommTaskConfig {
    /// Receive window for one response frame.
    pub recv_timeout: Duration,
    /// Upper bound on one full phase round-trip.
    pub phase_timeout: Duration,
    /// Retry policy for transient faults within one phase.
    pub retry: Arc<dyn RetryPolicy>,
    /// Stop the task when no work arrives for this long.
    pub idle_stop: Option<Duration>,
    /// Intake channel depth.
    pub channel_buffer: usize,
}

impl Default for CommTaskConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_millis(800),
            phase_timeout: Duration::from_secs(2),
            retry: Arc::new(FixedDelay::default_comm()),
            idle_stop: None,
            channel_buffer: COMM_TASK_CHANNEL_BUFFER,
        }
    }
}

/// Submission handle to one controller's comm task.
#[derive(Clone)]
pub struct CommHandle {
    tx: mpsc::Sender<Box<dyn Operation>>,
}

impl CommHandle {
    /// Queue an operation. A rejected submission is completed as failed
    /// immediately so the operation cannot silently vanish.
    pub fn submit(&self, op: Box<dyn Operation>) {
        let rejected = match self.tx.try_send(op) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(op)) => op,
            Err(mpsc::error::TrySendError::Closed(op)) => op,
        };
        warn!("dropping operation {}: comm task unavailable", rejected.name());
        rejected.complete(OpOutcome::Failed(DeviceError::Other(
            "comm task unavailable".into(),
        )));
    }
}

/// Spawn the comm task for a controller and return its handle.
pub fn spawn_comm_task(
    controller: Arc<Controller>,
    link: Box<dyn CommLink>,
    codec: Box<dyn WireCodec>,
    cfg: CommTaskConfig,
) -> (CommHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(cfg.channel_buffer);
    let join = tokio::spawn(run_comm_task(controller, link, codec, cfg, rx));
    (CommHandle { tx }, join)
}

/// Run the comm task loop until the intake closes or the idle-stop
/// policy fires. Pending work left at shutdown is completed as failed;
/// an in-flight phase always finishes its round-trip first.
pub async fn run_comm_task(
    controller: Arc<Controller>,
    mut link: Box<dyn CommLink>,
    mut codec: Box<dyn WireCodec>,
    cfg: CommTaskConfig,
    mut rx: mpsc::Receiver<Box<dyn Operation>>,
) {
    info!("comm task for {} started", controller.name());
    let mut pending = OpQueue::new();
    loop {
        // Pull everything queued so a freshly submitted higher-priority
        // operation can preempt older pending work.
        while let Ok(op) = rx.try_recv() {
            pending.push(op);
        }
        let Some(op) = pending.pop() else {
            match wait_for_work(&mut rx, cfg.idle_stop).await {
                Some(op) => pending.push(op),
                None => break,
            }
            continue;
        };
        execute_op(&controller, link.as_mut(), codec.as_mut(), &cfg, op).await;
    }

    rx.close();
    while let Ok(op) = rx.try_recv() {
        pending.push(op);
    }
    for op in pending.drain() {
        debug!("{}: discarding pending {}", controller.name(), op.name());
        op.complete(OpOutcome::Failed(DeviceError::Other("polling stopped".into())));
    }
    info!("comm task for {} stopped", controller.name());
}

async fn wait_for_work(
    rx: &mut mpsc::Receiver<Box<dyn Operation>>,
    idle_stop: Option<Duration>,
) -> Option<Box<dyn Operation>> {
    match idle_stop {
        Some(idle) => match time::timeout(idle, rx.recv()).await {
            Ok(op) => op,
            Err(_) => {
                debug!("comm task idle for {:?}, stopping", idle);
                None
            }
        },
        None => rx.recv().await,
    }
}

async fn execute_op(
    controller: &Controller,
    link: &mut dyn CommLink,
    codec: &mut dyn WireCodec,
    cfg: &CommTaskConfig,
    mut op: Box<dyn Operation>,
) {
    if !controller.is_active() {
        op.complete(OpOutcome::Failed(DeviceError::Config(format!(
            "controller {} not active",
            controller.name()
        ))));
        return;
    }

    debug!("{}: starting {}", controller.name(), op.name());
    let mut attempt: u32 = 0;
    let outcome = loop {
        let mut carrier = OpCarrier::new(&mut *link, &mut *codec, controller.drop_addr(), cfg.recv_timeout);
        let result = match time::timeout(cfg.phase_timeout, op.poll(&mut carrier)).await {
            Ok(result) => result,
            Err(_) => Err(DeviceError::Timeout),
        };
        match result {
            Ok(OpStatus::Continue) => attempt = 0,
            Ok(OpStatus::Done) => break OpOutcome::Succeeded,
            Err(e) if e.is_expected() => break OpOutcome::Expected(e),
            Err(e) if cfg.retry.should_retry(attempt, &e) => {
                warn!(
                    "{}: {} phase failed ({}), retry {} of {}",
                    controller.name(),
                    op.name(),
                    e,
                    attempt + 1,
                    cfg.retry.max_attempts() - 1,
                );
                time::sleep(cfg.retry.delay(attempt)).await;
                attempt += 1;
            }
            Err(e) => break OpOutcome::Failed(e),
        }
    };

    match &outcome {
        OpOutcome::Succeeded => {
            debug!("{}: {} done", controller.name(), op.name());
            controller.set_ok();
        }
        OpOutcome::Expected(e) => {
            debug!("{}: {} expected failure: {}", controller.name(), op.name(), e);
        }
        OpOutcome::Failed(e) => {
            error!("{}: {} failed: {}", controller.name(), op.name(), e);
            controller.set_failed(&e.to_string());
        }
    }
    op.complete(outcome);
}
