// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Comm operations for individual gate arms.
//!
//! The array broadcasts validated transitions through [`ArmChannel`];
//! the server-side implementation turns each call into one of these
//! operations on the arm's controller. Reported states feed back into
//! the owning array, and a comm failure lands the arm in TIMEOUT through
//! the exactly-once completion hook.

use std::sync::Arc;

use tracing::debug;

use rdm_comm::{
    OpCarrier, OpFuture, OpOutcome, OpPriority, OpStatus, Operation, WireRequest, WireResponse,
};
use rdm_core::{DeviceError, DeviceRequest, GateArmInterlock, GateArmState};

use crate::arm::GateArm;
use crate::array::GateArmArray;

/// Outbound command path from an array to its member arms' controllers.
pub trait ArmChannel: Send + Sync {
    /// Queue a per-arm state command for a validated transition.
    fn send_arm_state(
        &self,
        array: Arc<GateArmArray>,
        idx: usize,
        arm: GateArm,
        state: GateArmState,
        owner: String,
    );

    /// Push the array interlock down to one arm's controller.
    fn send_interlocks(&self, arm: GateArm, interlock: GateArmInterlock);

    /// Forward an external device request to one arm.
    fn send_device_request(&self, array: Arc<GateArmArray>, idx: usize, arm: GateArm, req: DeviceRequest);
}

/// Wire code for interlock settings: flag bits above the state range.
pub fn interlock_code(interlock: GateArmInterlock) -> u8 {
    0x10 | u8::from(interlock.deny_open()) | (u8::from(interlock.deny_close()) << 1)
}

/// Push interlock settings to one arm's controller.
pub struct SendInterlock {
    arm: GateArm,
    interlock: GateArmInterlock,
}

impl SendInterlock {
    pub fn new(arm: GateArm, interlock: GateArmInterlock) -> Self {
        Self { arm, interlock }
    }
}

impl Operation for SendInterlock {
    fn name(&self) -> &'static str {
        "gate arm interlock settings"
    }

    fn priority(&self) -> OpPriority {
        OpPriority::Urgent
    }

    fn poll<'a>(&'a mut self, carrier: &'a mut OpCarrier<'a>) -> OpFuture<'a> {
        Box::pin(async move {
            let resp = carrier
                .transact(WireRequest::DeviceCommand {
                    pin: self.arm.pin,
                    code: interlock_code(self.interlock),
                })
                .await?;
            if resp != WireResponse::Ack {
                return Err(DeviceError::Malformed(format!(
                    "unexpected interlock response: {:?}",
                    resp
                )));
            }
            Ok(OpStatus::Done)
        })
    }

    fn complete(self: Box<Self>, _outcome: OpOutcome) {
        // Escalation is the engine's job; the arm state catches up on the
        // next status poll.
    }
}

enum SendStep {
    Command,
    Verify,
}

/// Command one arm to a new state, then verify the reported status.
pub struct SendGateState {
    array: Arc<GateArmArray>,
    idx: usize,
    arm: GateArm,
    state: GateArmState,
    owner: String,
    observed: Option<GateArmState>,
    step: SendStep,
}

impl SendGateState {
    pub fn new(
        array: Arc<GateArmArray>,
        idx: usize,
        arm: GateArm,
        state: GateArmState,
        owner: String,
    ) -> Self {
        Self {
            array,
            idx,
            arm,
            state,
            owner,
            observed: None,
            step: SendStep::Command,
        }
    }
}

impl Operation for SendGateState {
    fn name(&self) -> &'static str {
        "gate arm state command"
    }

    fn priority(&self) -> OpPriority {
        OpPriority::Command
    }

    fn poll<'a>(&'a mut self, carrier: &'a mut OpCarrier<'a>) -> OpFuture<'a> {
        Box::pin(async move {
            match self.step {
                SendStep::Command => {
                    let resp = carrier
                        .transact(WireRequest::DeviceCommand {
                            pin: self.arm.pin,
                            code: self.state.code(),
                        })
                        .await?;
                    if resp != WireResponse::Ack {
                        return Err(DeviceError::Malformed(format!(
                            "unexpected command response: {:?}",
                            resp
                        )));
                    }
                    debug!("{}: commanded {} by {}", self.arm.name, self.state, self.owner);
                    self.step = SendStep::Verify;
                    Ok(OpStatus::Continue)
                }
                SendStep::Verify => {
                    self.observed = Some(query_arm_state(carrier, self.arm.pin).await?);
                    Ok(OpStatus::Done)
                }
            }
        })
    }

    fn complete(self: Box<Self>, outcome: OpOutcome) {
        finish_arm_op(&self.array, self.idx, self.observed, outcome);
    }
}

/// Periodic poll of one arm's reported status.
pub struct QueryGateStatus {
    array: Arc<GateArmArray>,
    idx: usize,
    arm: GateArm,
    observed: Option<GateArmState>,
}

impl QueryGateStatus {
    pub fn new(array: Arc<GateArmArray>, idx: usize, arm: GateArm) -> Self {
        Self {
            array,
            idx,
            arm,
            observed: None,
        }
    }
}

impl Operation for QueryGateStatus {
    fn name(&self) -> &'static str {
        "gate arm status poll"
    }

    fn priority(&self) -> OpPriority {
        OpPriority::ShortPoll
    }

    fn poll<'a>(&'a mut self, carrier: &'a mut OpCarrier<'a>) -> OpFuture<'a> {
        Box::pin(async move {
            self.observed = Some(query_arm_state(carrier, self.arm.pin).await?);
            Ok(OpStatus::Done)
        })
    }

    fn complete(self: Box<Self>, outcome: OpOutcome) {
        finish_arm_op(&self.array, self.idx, self.observed, outcome);
    }
}

async fn query_arm_state(carrier: &mut OpCarrier<'_>, pin: u8) -> Result<GateArmState, DeviceError> {
    let resp = carrier.transact(WireRequest::QueryDevice { pin }).await?;
    let WireResponse::DeviceStatus { code, .. } = resp else {
        return Err(DeviceError::Malformed(format!(
            "unexpected status response: {:?}",
            resp
        )));
    };
    GateArmState::from_code(code)
        .ok_or_else(|| DeviceError::Malformed(format!("bad arm state code {}", code)))
}

fn finish_arm_op(
    array: &GateArmArray,
    idx: usize,
    observed: Option<GateArmState>,
    outcome: OpOutcome,
) {
    match outcome {
        OpOutcome::Succeeded => {
            if let Some(state) = observed {
                array.update_arm(idx, state);
            }
        }
        OpOutcome::Expected(_) => {}
        OpOutcome::Failed(_) => array.update_arm(idx, GateArmState::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rdm_comm::testing::{FlatCodec, ScriptedLink};
    use rdm_core::{AlertSink, Notifier};

    use super::*;
    use crate::array::{ArrayConfig, ArrayDeps};

    struct NullAlerts;

    impl AlertSink for NullAlerts {
        fn send_alert(&self, _message: &str) {}
    }

    struct NullNotifier;

    impl Notifier for NullNotifier {
        fn notify_attribute(&self, _t: &str, _o: &str, _a: &str) {}
    }

    struct NullChannel;

    impl ArmChannel for NullChannel {
        fn send_arm_state(
            &self,
            _array: Arc<GateArmArray>,
            _idx: usize,
            _arm: GateArm,
            _state: GateArmState,
            _owner: String,
        ) {
        }

        fn send_interlocks(&self, _arm: GateArm, _interlock: GateArmInterlock) {}

        fn send_device_request(
            &self,
            _array: Arc<GateArmArray>,
            _idx: usize,
            _arm: GateArm,
            _req: DeviceRequest,
        ) {
        }
    }

    fn array_with_arm() -> (Arc<GateArmArray>, GateArm) {
        let array = GateArmArray::new(
            ArrayConfig::new("ga_array_1", "US-52", 1),
            ArrayDeps {
                alerts: Arc::new(NullAlerts),
                notifier: Arc::new(NullNotifier),
                channel: Arc::new(NullChannel),
            },
        );
        let arm = GateArm::new("ga_1", "ctl_1", 2);
        array.set_arm(1, arm.clone()).unwrap();
        (array, arm)
    }

    #[tokio::test]
    async fn test_send_gate_state_phases() {
        let (array, arm) = array_with_arm();
        let mut op = SendGateState::new(
            array.clone(),
            1,
            arm,
            GateArmState::Opening,
            "operator".into(),
        );
        let mut link = ScriptedLink::new();
        link.push_ack();
        link.push_response(Ok(vec![GateArmState::Opening.code()]));
        let mut codec = FlatCodec;

        let mut carrier = OpCarrier::new(&mut link, &mut codec, 1, Duration::from_millis(10));
        assert_eq!(op.poll(&mut carrier).await.unwrap(), OpStatus::Continue);
        let mut carrier = OpCarrier::new(&mut link, &mut codec, 1, Duration::from_millis(10));
        assert_eq!(op.poll(&mut carrier).await.unwrap(), OpStatus::Done);

        Box::new(op).complete(OpOutcome::Succeeded);
        assert_eq!(array.arm_state(), GateArmState::Opening);
    }

    #[tokio::test]
    async fn test_failed_command_lands_arm_in_timeout() {
        let (array, arm) = array_with_arm();
        array.update_arm(1, GateArmState::Closed);
        let op = SendGateState::new(
            array.clone(),
            1,
            arm,
            GateArmState::Opening,
            "operator".into(),
        );

        Box::new(op).complete(OpOutcome::Failed(DeviceError::Timeout));
        assert_eq!(array.arm_state(), GateArmState::Timeout);
    }

    #[tokio::test]
    async fn test_status_poll_updates_array() {
        let (array, arm) = array_with_arm();
        let mut op = QueryGateStatus::new(array.clone(), 1, arm);
        let mut link = ScriptedLink::new();
        link.push_response(Ok(vec![GateArmState::Closed.code()]));
        let mut codec = FlatCodec;

        let mut carrier = OpCarrier::new(&mut link, &mut codec, 1, Duration::from_millis(10));
        assert_eq!(op.poll(&mut carrier).await.unwrap(), OpStatus::Done);
        Box::new(op).complete(OpOutcome::Succeeded);
        assert_eq!(array.arm_state(), GateArmState::Closed);
    }

    #[tokio::test]
    async fn test_bad_state_code_is_malformed() {
        let (array, arm) = array_with_arm();
        let mut op = QueryGateStatus::new(array, 1, arm);
        let mut link = ScriptedLink::new();
        link.push_response(Ok(vec![0x2A]));
        let mut codec = FlatCodec;

        let mut carrier = OpCarrier::new(&mut link, &mut codec, 1, Duration::from_millis(10));
        let err = op.poll(&mut carrier).await.unwrap_err();
        assert!(matches!(err, DeviceError::Malformed(_)));
    }
}
