// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Gate arm array: aggregate state, transition validation and the
//! per-array mutual-exclusion domain.
//!
//! All reads that influence a decision and all writes to the aggregate
//! state, lock state, owner credential and conflict flags happen under
//! one mutex. Outbound effects (notifications, alerts, per-arm commands)
//! are collected under the lock and dispatched after it is released, so
//! callbacks can never re-enter the domain.

use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tracing::{error, warn};

use rdm_core::{
    ActionPlan, AlertSink, ColumnValue, DeviceError, DeviceRequest, DeviceResult,
    GateArmInterlock, GateArmState, ItemStyle, Notifier, Storable,
};

use crate::arm::GateArm;
use crate::interlock::LockState;
use crate::ops::ArmChannel;

/// Maximum number of arms in one array.
pub const MAX_ARMS: usize = 5;

/// Static configuration of one gate arm array.
#[derive(Debug, Clone)]
pub struct ArrayConfig {
    pub name: String,
    /// Roadway the array controls.
    pub road: String,
    /// Travel direction the array controls on that road.
    pub road_dir: u8,
    /// Prerequisite array, resolved lazily by name.
    pub prereq: Option<String>,
    /// Verification camera.
    pub camera: Option<String>,
    /// Approach camera.
    pub approach: Option<String>,
    pub action_plan: Option<Arc<ActionPlan>>,
    /// Action plan phase while the array is open.
    pub open_phase: Option<String>,
    /// Action plan phase while the array is closed.
    pub closed_phase: Option<String>,
}

impl ArrayConfig {
    pub fn new(name: impl Into<String>, road: impl Into<String>, road_dir: u8) -> Self {
        Self {
            name: name.into(),
            road: road.into(),
            road_dir,
            prereq: None,
            camera: None,
            approach: None,
            action_plan: None,
            open_phase: None,
            closed_phase: None,
        }
    }
}

/// Injected collaborators of one array.
pub struct ArrayDeps {
    pub alerts: Arc<dyn AlertSink>,
    pub notifier: Arc<dyn Notifier>,
    pub channel: Arc<dyn ArmChannel>,
}

/// Published snapshot of one array, readable without its lock.
/// Cross-array checks work from these snapshots only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayStatus {
    pub arm_state: GateArmState,
    pub interlock: GateArmInterlock,
    pub active: bool,
    pub online: bool,
    pub fully_open: bool,
    pub possibly_open: bool,
    pub styles: u32,
}

struct ArrayInner {
    arms: [Option<GateArm>; MAX_ARMS],
    arm_state: GateArmState,
    owner_next: Option<String>,
    lock: LockState,
    open_conflict: bool,
    close_conflict: bool,
    styles: u32,
}

/// Outbound effects collected under the lock, dispatched after release.
#[derive(Default)]
struct Effects {
    attrs: Vec<&'static str>,
    arm_attrs: Vec<String>,
    plan_attr: Option<String>,
    alerts: Vec<String>,
    interlocks: Option<(GateArmInterlock, Vec<GateArm>)>,
    commands: Vec<(usize, GateArm, GateArmState, String)>,
    requests: Vec<(usize, GateArm, DeviceRequest)>,
}

/// A group of gate arms at one location, controlled as a unit.
pub struct GateArmArray {
    cfg: ArrayConfig,
    deps: ArrayDeps,
    inner: Mutex<ArrayInner>,
    status_tx: watch::Sender<ArrayStatus>,
    self_ref: Weak<GateArmArray>,
}

impl GateArmArray {
    pub fn new(cfg: ArrayConfig, deps: ArrayDeps) -> Arc<Self> {
        let inner = ArrayInner {
            arms: std::array::from_fn(|_| None),
            arm_state: GateArmState::Unknown,
            owner_next: None,
            lock: LockState::default(),
            // Arms report failed after a restart; assume a conflict until
            // a closed, non-denied state is observed.
            open_conflict: true,
            close_conflict: false,
            styles: 0,
        };
        let (status_tx, _) = watch::channel(Self::status_of(&inner));
        Arc::new_cyclic(|weak| Self {
            cfg,
            deps,
            inner: Mutex::new(inner),
            status_tx,
            self_ref: weak.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    pub fn road(&self) -> &str {
        &self.cfg.road
    }

    pub fn road_dir(&self) -> u8 {
        self.cfg.road_dir
    }

    pub fn prereq(&self) -> Option<&str> {
        self.cfg.prereq.as_deref()
    }

    /// Latest published snapshot.
    pub fn status(&self) -> ArrayStatus {
        self.status_tx.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<ArrayStatus> {
        self.status_tx.subscribe()
    }

    pub fn arm_state(&self) -> GateArmState {
        self.inner.lock().unwrap().arm_state
    }

    pub fn interlock(&self) -> GateArmInterlock {
        self.inner.lock().unwrap().lock.interlock()
    }

    pub fn open_conflict(&self) -> bool {
        self.inner.lock().unwrap().open_conflict
    }

    pub fn close_conflict(&self) -> bool {
        self.inner.lock().unwrap().close_conflict
    }

    /// Assign a gate arm to a slot (1-based). Reassignment of an
    /// occupied slot is rejected.
    pub fn set_arm(&self, idx: usize, arm: GateArm) -> DeviceResult<()> {
        if !(1..=MAX_ARMS).contains(&idx) {
            return Err(DeviceError::Config(format!("invalid arm index {}", idx)));
        }
        let mut fx = Effects::default();
        let mut inner = self.inner.lock().unwrap();
        if inner.arms[idx - 1].is_some() {
            return Err(DeviceError::Config(format!(
                "arm slot {} already assigned",
                idx
            )));
        }
        inner.arms[idx - 1] = Some(arm);
        self.update_arm_state_locked(&mut inner, &mut fx);
        self.publish_locked(&inner);
        drop(inner);
        self.run_effects(fx);
        Ok(())
    }

    /// Remove the arm from a slot (1-based).
    pub fn clear_arm(&self, idx: usize) -> DeviceResult<()> {
        if !(1..=MAX_ARMS).contains(&idx) {
            return Err(DeviceError::Config(format!("invalid arm index {}", idx)));
        }
        let mut fx = Effects::default();
        let mut inner = self.inner.lock().unwrap();
        inner.arms[idx - 1] = None;
        self.update_arm_state_locked(&mut inner, &mut fx);
        self.publish_locked(&inner);
        drop(inner);
        self.run_effects(fx);
        Ok(())
    }

    /// Claim the single-slot next-owner credential. A second claim while
    /// the slot is occupied clears it and logs the collision instead of
    /// queueing the request.
    pub fn set_owner_next(&self, owner: Option<&str>) {
        let mut inner = self.inner.lock().unwrap();
        let conflict = match (inner.owner_next.as_deref(), owner) {
            (Some(cur), Some(next)) => {
                error!("{}: OWNER CONFLICT: {} vs. {}", self.cfg.name, cur, next);
                true
            }
            _ => false,
        };
        if conflict {
            inner.owner_next = None;
        } else {
            inner.owner_next = owner.map(str::to_string);
        }
    }

    /// Request a state change for the whole array. The owner credential
    /// is consumed by exactly one request, successful or not.
    ///
    /// A validated WARN_CLOSE applies directly to the aggregate state;
    /// every other validated state is broadcast as per-arm commands.
    pub fn request_arm_state(&self, rs: GateArmState) -> DeviceResult<()> {
        let mut fx = Effects::default();
        let mut inner = self.inner.lock().unwrap();
        let Some(owner) = inner.owner_next.take() else {
            warn!("{}: arm state request without owner", self.cfg.name);
            return Err(DeviceError::Other("owner conflict".into()));
        };
        let vs = validate_state_req(rs, inner.arm_state, &inner.lock)?;
        if !inner.lock.system_enable() {
            return Ok(());
        }
        if vs == GateArmState::WarnClose {
            // Logical state, not a per-arm motion.
            self.set_arm_state_locked(&mut inner, &mut fx, vs);
            self.update_plan_phase_locked(&mut inner, &mut fx);
            self.publish_locked(&inner);
            drop(inner);
            self.run_effects(fx);
            return Ok(());
        }
        for (i, slot) in inner.arms.iter().enumerate() {
            if let Some(arm) = slot {
                if arm.enabled {
                    fx.commands.push((i + 1, arm.clone(), vs, owner.clone()));
                }
            }
        }
        drop(inner);
        self.run_effects(fx);
        Ok(())
    }

    /// Record a reported state for one arm and re-aggregate.
    pub fn update_arm(&self, idx: usize, state: GateArmState) {
        if !(1..=MAX_ARMS).contains(&idx) {
            return;
        }
        let mut fx = Effects::default();
        let mut inner = self.inner.lock().unwrap();
        let Some(arm) = inner.arms[idx - 1].as_mut() else {
            return;
        };
        let online = !matches!(state, GateArmState::Timeout | GateArmState::Unknown);
        if arm.state != state || arm.online != online {
            arm.state = state;
            arm.online = online;
            fx.arm_attrs.push(arm.name.clone());
        }
        self.update_arm_state_locked(&mut inner, &mut fx);
        self.publish_locked(&inner);
        drop(inner);
        self.run_effects(fx);
    }

    /// Set the system enable input. The array stays disabled while it
    /// has no enabled arms.
    pub fn set_system_enable(&self, enable: bool) {
        self.apply_lock_input(move |inner| {
            let active = is_active(inner);
            inner.lock.set_system_enable(enable && active)
        });
    }

    /// Set the valid open direction for the road: 0 allows any, -1 none.
    pub fn set_open_direction(&self, dir: i16) {
        let opposing = dir != 0 && dir != i16::from(self.cfg.road_dir);
        self.apply_lock_input(move |inner| inner.lock.set_opposing_open(opposing));
    }

    /// Set the prerequisite-not-fully-open input.
    pub fn set_prereq_closed(&self, closed: bool) {
        self.apply_lock_input(move |inner| inner.lock.set_prereq_closed(closed));
    }

    /// Set the dependent-possibly-open input.
    pub fn set_dependent_open(&self, open: bool) {
        self.apply_lock_input(move |inner| inner.lock.set_dependent_open(open));
    }

    /// Broadcast an external device request to every assigned arm.
    pub fn send_device_request(&self, req: DeviceRequest) {
        let mut fx = Effects::default();
        let inner = self.inner.lock().unwrap();
        for (i, slot) in inner.arms.iter().enumerate() {
            if let Some(arm) = slot {
                if arm.enabled {
                    fx.requests.push((i + 1, arm.clone(), req));
                }
            }
        }
        drop(inner);
        self.run_effects(fx);
    }

    fn apply_lock_input<F>(&self, f: F)
    where
        F: FnOnce(&mut ArrayInner) -> bool,
    {
        let mut fx = Effects::default();
        let mut inner = self.inner.lock().unwrap();
        if f(&mut inner) {
            fx.attrs.push("interlock");
            let arms: Vec<GateArm> = inner
                .arms
                .iter()
                .flatten()
                .filter(|a| a.enabled)
                .cloned()
                .collect();
            fx.interlocks = Some((inner.lock.interlock(), arms));
        }
        self.update_styles_locked(&mut inner, &mut fx);
        self.publish_locked(&inner);
        drop(inner);
        self.run_effects(fx);
    }

    fn set_arm_state_locked(&self, inner: &mut ArrayInner, fx: &mut Effects, gas: GateArmState) {
        inner.arm_state = gas;
        fx.attrs.push("arm_state");
        if gas == GateArmState::Timeout {
            fx.alerts.push(format!("COMMUNICATION FAILED: {}", self.cfg.name));
        }
        if gas == GateArmState::Fault {
            fx.alerts.push(format!("FAULT: {}", self.cfg.name));
        }
        self.update_styles_locked(inner, fx);
    }

    fn update_arm_state_locked(&self, inner: &mut ArrayInner, fx: &mut Effects) {
        let cs = inner.arm_state;
        let gas = aggregate_arm_state(
            inner
                .arms
                .iter()
                .flatten()
                .filter(|a| a.enabled)
                .map(|a| a.state),
        );
        // Aggregation alone never reverts WARN_CLOSE to OPEN.
        if gas != cs && !(gas == GateArmState::Open && cs == GateArmState::WarnClose) {
            self.set_arm_state_locked(inner, fx, gas);
        } else {
            self.update_styles_locked(inner, fx);
        }
        self.update_plan_phase_locked(inner, fx);
    }

    fn update_plan_phase_locked(&self, inner: &mut ArrayInner, fx: &mut Effects) {
        let Some(plan) = self.cfg.action_plan.as_ref() else {
            return;
        };
        let msg_open = is_active(inner) && inner.arm_state == GateArmState::Open;
        let phase = if msg_open {
            self.cfg.open_phase.as_deref()
        } else {
            self.cfg.closed_phase.as_deref()
        };
        if let Some(phase) = phase {
            if plan.set_phase(phase) {
                fx.plan_attr = Some(plan.name().to_string());
            }
        }
    }

    fn update_styles_locked(&self, inner: &mut ArrayInner, fx: &mut Effects) {
        let mut styles = 0u32;
        if is_active(inner) {
            styles |= ItemStyle::Active.bit();
        }
        if is_failed(inner) {
            styles |= ItemStyle::Failed.bit();
        }
        if inner.arm_state == GateArmState::Fault {
            styles |= ItemStyle::Maintenance.bit();
        }
        if is_closed(inner) {
            styles |= ItemStyle::Closed.bit();
        }
        if is_open(inner) {
            styles |= ItemStyle::Open.bit();
        }
        if is_moving(inner) {
            styles |= ItemStyle::Moving.bit();
        }
        if styles != inner.styles {
            inner.styles = styles;
            fx.attrs.push("styles");
        }

        // Open conflict latches true until a closed, non-denied state is
        // observed; it alerts on the rising edge only.
        let open_conflict = if inner.lock.is_open_denied() && (is_open(inner) || is_timeout(inner))
        {
            true
        } else if is_closed(inner) && !inner.lock.is_open_denied() {
            false
        } else {
            inner.open_conflict
        };
        if open_conflict != inner.open_conflict {
            inner.open_conflict = open_conflict;
            if open_conflict {
                fx.alerts.push(format!("OPEN CONFLICT: {}", self.cfg.name));
            }
        }

        let close_conflict = inner.lock.is_close_denied() && is_closed(inner);
        if close_conflict != inner.close_conflict {
            inner.close_conflict = close_conflict;
            if close_conflict {
                fx.alerts.push(format!("CLOSE CONFLICT: {}", self.cfg.name));
            }
        }
    }

    fn publish_locked(&self, inner: &ArrayInner) {
        let _ = self.status_tx.send_replace(Self::status_of(inner));
    }

    fn status_of(inner: &ArrayInner) -> ArrayStatus {
        ArrayStatus {
            arm_state: inner.arm_state,
            interlock: inner.lock.interlock(),
            active: is_active(inner),
            online: is_online(inner),
            fully_open: is_fully_open(inner),
            possibly_open: is_possibly_open(inner),
            styles: inner.styles,
        }
    }

    fn run_effects(&self, fx: Effects) {
        for attr in fx.attrs {
            self.deps
                .notifier
                .notify_attribute("gate_arm_array", &self.cfg.name, attr);
        }
        for arm in fx.arm_attrs {
            self.deps.notifier.notify_attribute("gate_arm", &arm, "arm_state");
        }
        if let Some(plan) = fx.plan_attr {
            self.deps.notifier.notify_attribute("action_plan", &plan, "phase");
        }
        for msg in fx.alerts {
            self.deps.alerts.send_alert(&msg);
        }
        if let Some((interlock, arms)) = fx.interlocks {
            for arm in arms {
                self.deps.channel.send_interlocks(arm, interlock);
            }
        }
        if !fx.commands.is_empty() || !fx.requests.is_empty() {
            let Some(this) = self.self_ref.upgrade() else {
                return;
            };
            for (idx, arm, state, owner) in fx.commands {
                self.deps
                    .channel
                    .send_arm_state(this.clone(), idx, arm, state, owner);
            }
            for (idx, arm, req) in fx.requests {
                self.deps
                    .channel
                    .send_device_request(this.clone(), idx, arm, req);
            }
        }
    }
}

impl Storable for GateArmArray {
    fn type_name(&self) -> &'static str {
        "gate_arm_array"
    }

    fn key(&self) -> String {
        self.cfg.name.clone()
    }

    fn columns(&self) -> Vec<(&'static str, ColumnValue)> {
        vec![
            ("name", self.cfg.name.as_str().into()),
            ("road", self.cfg.road.as_str().into()),
            ("road_dir", self.cfg.road_dir.into()),
            ("prereq", self.cfg.prereq.clone().into()),
            ("camera", self.cfg.camera.clone().into()),
            ("approach", self.cfg.approach.clone().into()),
            (
                "action_plan",
                self.cfg
                    .action_plan
                    .as_ref()
                    .map(|p| p.name().to_string())
                    .into(),
            ),
            ("open_phase", self.cfg.open_phase.clone().into()),
            ("closed_phase", self.cfg.closed_phase.clone().into()),
        ]
    }
}

/// Validate a requested state change against the current aggregate state,
/// gated by the interlock deny flags.
///
/// An unreachable (requested, current) pair always fails as an invalid
/// state change regardless of interlocks; a reachable pair under a deny
/// flag fails with the distinguished interlock conflict. Neither is ever
/// retried.
pub fn validate_state_req(
    rs: GateArmState,
    cs: GateArmState,
    lock: &LockState,
) -> DeviceResult<GateArmState> {
    use GateArmState::*;
    let reachable = matches!(
        (rs, cs),
        (Opening, Closed) | (Opening, WarnClose) | (WarnClose, Open) | (Closing, WarnClose)
            | (Closing, Fault)
    );
    if !reachable {
        return Err(DeviceError::InvalidTransition { from: cs, to: rs });
    }
    let denied = match rs {
        Opening => lock.is_open_denied(),
        _ => lock.is_close_denied(),
    };
    if denied {
        return Err(DeviceError::InterlockConflict);
    }
    Ok(rs)
}

/// Derive the aggregate array state from member arm states.
///
/// Pure function of the multiset of supplied states; supply order does
/// not matter.
pub fn aggregate_arm_state<I>(states: I) -> GateArmState
where
    I: IntoIterator<Item = GateArmState>,
{
    let mut unknown = false;
    let mut fault = false;
    let mut opening = false;
    let mut open = false;
    let mut closing = false;
    let mut closed = false;
    let mut timeout = false;
    for state in states {
        match state {
            GateArmState::Unknown => unknown = true,
            GateArmState::Fault => fault = true,
            GateArmState::Opening => opening = true,
            GateArmState::Open => open = true,
            GateArmState::Closing => closing = true,
            GateArmState::Closed => closed = true,
            GateArmState::Timeout => timeout = true,
            GateArmState::WarnClose => {}
        }
    }
    if unknown {
        GateArmState::Unknown
    } else if timeout {
        GateArmState::Timeout
    } else if fault {
        GateArmState::Fault
    } else if opening && !closing {
        GateArmState::Opening
    } else if closing && !opening {
        GateArmState::Closing
    } else if open && !(closed || opening || closing) {
        GateArmState::Open
    } else if closed && !(open || opening || closing) {
        GateArmState::Closed
    } else {
        GateArmState::Fault
    }
}

fn is_active(inner: &ArrayInner) -> bool {
    inner.arms.iter().flatten().any(|a| a.enabled)
}

fn is_failed(inner: &ArrayInner) -> bool {
    inner.arms.iter().flatten().any(|a| a.enabled && !a.online)
}

fn is_online(inner: &ArrayInner) -> bool {
    is_active(inner) && !is_failed(inner)
}

fn is_closed(inner: &ArrayInner) -> bool {
    is_online(inner) && inner.arm_state == GateArmState::Closed
}

fn is_possibly_open(inner: &ArrayInner) -> bool {
    is_active(inner)
        && inner.arm_state != GateArmState::Closed
        && inner.arm_state != GateArmState::Unknown
}

fn is_open(inner: &ArrayInner) -> bool {
    is_online(inner) && is_possibly_open(inner)
}

fn is_timeout(inner: &ArrayInner) -> bool {
    is_active(inner) && inner.arm_state == GateArmState::Timeout
}

fn is_fully_open(inner: &ArrayInner) -> bool {
    is_online(inner) && inner.arm_state == GateArmState::Open
}

fn is_moving(inner: &ArrayInner) -> bool {
    is_online(inner)
        && matches!(
            inner.arm_state,
            GateArmState::Opening | GateArmState::Closing
        )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[derive(Default)]
    struct RecordingAlerts {
        messages: StdMutex<Vec<String>>,
    }

    impl AlertSink for RecordingAlerts {
        fn send_alert(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    impl RecordingAlerts {
        fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        events: StdMutex<Vec<(String, String, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify_attribute(&self, type_name: &str, object: &str, attribute: &str) {
            self.events.lock().unwrap().push((
                type_name.to_string(),
                object.to_string(),
                attribute.to_string(),
            ));
        }
    }

    /// Channel that records commands; optionally echoes the commanded
    /// state straight back as the arm's reported status.
    #[derive(Default)]
    struct RecordingChannel {
        echo: bool,
        commands: StdMutex<Vec<(usize, String, GateArmState, String)>>,
        interlocks: StdMutex<Vec<(String, GateArmInterlock)>>,
    }

    impl ArmChannel for RecordingChannel {
        fn send_arm_state(
            &self,
            array: Arc<GateArmArray>,
            idx: usize,
            arm: GateArm,
            state: GateArmState,
            owner: String,
        ) {
            self.commands
                .lock()
                .unwrap()
                .push((idx, arm.name.clone(), state, owner));
            if self.echo {
                array.update_arm(idx, state);
            }
        }

        fn send_interlocks(&self, arm: GateArm, interlock: GateArmInterlock) {
            self.interlocks.lock().unwrap().push((arm.name, interlock));
        }

        fn send_device_request(
            &self,
            _array: Arc<GateArmArray>,
            _idx: usize,
            _arm: GateArm,
            _req: DeviceRequest,
        ) {
        }
    }

    struct Bench {
        array: Arc<GateArmArray>,
        alerts: Arc<RecordingAlerts>,
        notifier: Arc<RecordingNotifier>,
        channel: Arc<RecordingChannel>,
    }

    fn bench_with(cfg: ArrayConfig, echo: bool) -> Bench {
        let alerts = Arc::new(RecordingAlerts::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let channel = Arc::new(RecordingChannel {
            echo,
            ..RecordingChannel::default()
        });
        let array = GateArmArray::new(
            cfg,
            ArrayDeps {
                alerts: alerts.clone(),
                notifier: notifier.clone(),
                channel: channel.clone(),
            },
        );
        Bench {
            array,
            alerts,
            notifier,
            channel,
        }
    }

    fn bench() -> Bench {
        bench_with(ArrayConfig::new("ga_array_1", "US-52", 1), false)
    }

    fn enabled_lock() -> LockState {
        let mut lock = LockState::default();
        lock.set_system_enable(true);
        lock
    }

    /// Two closed arms, system enabled.
    fn closed_bench(echo: bool) -> Bench {
        let b = bench_with(ArrayConfig::new("ga_array_1", "US-52", 1), echo);
        b.array.set_arm(1, GateArm::new("ga_1", "ctl_1", 2)).unwrap();
        b.array.set_arm(2, GateArm::new("ga_2", "ctl_2", 2)).unwrap();
        b.array.update_arm(1, GateArmState::Closed);
        b.array.update_arm(2, GateArmState::Closed);
        b.array.set_system_enable(true);
        b
    }

    const ALL_STATES: [GateArmState; 8] = [
        GateArmState::Unknown,
        GateArmState::Fault,
        GateArmState::Opening,
        GateArmState::Open,
        GateArmState::WarnClose,
        GateArmState::Closing,
        GateArmState::Closed,
        GateArmState::Timeout,
    ];

    #[test]
    fn test_validation_table() {
        use GateArmState::*;
        let lock = enabled_lock();
        for rs in ALL_STATES {
            for cs in ALL_STATES {
                let allowed = matches!(
                    (rs, cs),
                    (Opening, Closed)
                        | (Opening, WarnClose)
                        | (WarnClose, Open)
                        | (Closing, WarnClose)
                        | (Closing, Fault)
                );
                let result = validate_state_req(rs, cs, &lock);
                if allowed {
                    assert_eq!(result.unwrap(), rs);
                } else {
                    assert!(matches!(
                        result,
                        Err(DeviceError::InvalidTransition { .. })
                    ));
                }
            }
        }
    }

    #[test]
    fn test_validation_interlock_conflict_is_distinguished() {
        use GateArmState::*;
        let mut lock = enabled_lock();
        lock.set_opposing_open(true);
        assert!(matches!(
            validate_state_req(Opening, Closed, &lock),
            Err(DeviceError::InterlockConflict)
        ));
        // Closing is still allowed; only open is denied.
        assert_eq!(validate_state_req(Closing, WarnClose, &lock).unwrap(), Closing);

        let mut lock = enabled_lock();
        lock.set_dependent_open(true);
        assert!(matches!(
            validate_state_req(WarnClose, Open, &lock),
            Err(DeviceError::InterlockConflict)
        ));
        assert!(matches!(
            validate_state_req(Closing, Fault, &lock),
            Err(DeviceError::InterlockConflict)
        ));
    }

    #[test]
    fn test_validation_unreachable_pair_wins_over_interlock() {
        use GateArmState::*;
        let mut lock = enabled_lock();
        lock.set_opposing_open(true);
        // Not in the table; must report invalid state change even though
        // the interlock would also deny it.
        assert!(matches!(
            validate_state_req(Opening, Open, &lock),
            Err(DeviceError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_aggregate_precedence() {
        use GateArmState::*;
        assert_eq!(aggregate_arm_state([Unknown, Open]), Unknown);
        assert_eq!(aggregate_arm_state([Timeout, Fault, Open]), Timeout);
        assert_eq!(aggregate_arm_state([Fault, Open, Closed]), Fault);
        assert_eq!(aggregate_arm_state([Opening, Closed]), Opening);
        assert_eq!(aggregate_arm_state([Closing, Open]), Closing);
        assert_eq!(aggregate_arm_state([Open, Open]), Open);
        assert_eq!(aggregate_arm_state([Closed, Closed]), Closed);
        // Mixtures with no clear motion resolve to fault.
        assert_eq!(aggregate_arm_state([Open, Closed]), Fault);
        assert_eq!(aggregate_arm_state([Opening, Closing]), Fault);
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        use GateArmState::*;
        let cases = [
            [Opening, Closed, Open],
            [Timeout, Open, Closed],
            [Closed, Closed, Open],
        ];
        for states in cases {
            let expected = aggregate_arm_state(states);
            let perms = [
                [states[0], states[1], states[2]],
                [states[0], states[2], states[1]],
                [states[1], states[0], states[2]],
                [states[1], states[2], states[0]],
                [states[2], states[0], states[1]],
                [states[2], states[1], states[0]],
            ];
            for perm in perms {
                assert_eq!(aggregate_arm_state(perm), expected);
            }
        }
    }

    #[test]
    fn test_slot_reassignment_rejected() {
        let b = bench();
        b.array.set_arm(1, GateArm::new("ga_1", "ctl_1", 2)).unwrap();
        let result = b.array.set_arm(1, GateArm::new("ga_x", "ctl_9", 2));
        assert!(matches!(result, Err(DeviceError::Config(_))));
        assert!(b.array.set_arm(0, GateArm::new("ga_0", "ctl_0", 2)).is_err());
        assert!(b
            .array
            .set_arm(MAX_ARMS + 1, GateArm::new("ga_6", "ctl_6", 2))
            .is_err());
    }

    #[test]
    fn test_owner_claim_collision_clears_credential() {
        let b = closed_bench(false);
        b.array.set_owner_next(Some("alice"));
        b.array.set_owner_next(Some("bob"));
        // Credential cleared by the collision; the request fails.
        let result = b.array.request_arm_state(GateArmState::Opening);
        assert!(result.is_err());
        assert!(b.channel.commands.lock().unwrap().is_empty());
    }

    #[test]
    fn test_owner_credential_consumed_once() {
        let b = closed_bench(false);
        b.array.set_owner_next(Some("alice"));
        b.array.request_arm_state(GateArmState::Opening).unwrap();
        assert_eq!(b.channel.commands.lock().unwrap().len(), 2);
        // Second request without a fresh claim fails.
        assert!(b.array.request_arm_state(GateArmState::Opening).is_err());
    }

    #[test]
    fn test_owner_credential_consumed_by_failed_request() {
        let b = closed_bench(false);
        b.array.set_owner_next(Some("alice"));
        assert!(b.array.request_arm_state(GateArmState::Closing).is_err());
        // The failed request consumed the credential.
        assert!(b.array.request_arm_state(GateArmState::Closing).is_err());
    }

    #[test]
    fn test_open_conflict_starts_true() {
        let b = bench();
        assert!(b.array.open_conflict());
        b.array.set_arm(1, GateArm::new("ga_1", "ctl_1", 2)).unwrap();
        // Unknown state observed: conflict holds.
        assert!(b.array.open_conflict());
        b.array.update_arm(1, GateArmState::Closed);
        // Closed but open still denied (system disabled): conflict holds.
        assert!(b.array.open_conflict());
        b.array.set_system_enable(true);
        assert!(!b.array.open_conflict());
        // Clearing it produced no alert.
        assert!(b.alerts.messages().is_empty());
    }

    #[test]
    fn test_open_conflict_alerts_on_rising_edge_only() {
        let b = closed_bench(false);
        assert!(!b.array.open_conflict());
        // Arms forced open while opening is denied.
        b.array.update_arm(1, GateArmState::Open);
        b.array.update_arm(2, GateArmState::Open);
        b.array.set_open_direction(-1);
        assert!(b.array.open_conflict());
        let alerts = b.alerts.messages();
        assert_eq!(
            alerts.iter().filter(|m| m.starts_with("OPEN CONFLICT")).count(),
            1
        );
        // Still in conflict; no second alert.
        b.array.set_prereq_closed(true);
        let alerts = b.alerts.messages();
        assert_eq!(
            alerts.iter().filter(|m| m.starts_with("OPEN CONFLICT")).count(),
            1
        );
    }

    #[test]
    fn test_timeout_alert_is_edge_triggered() {
        let b = closed_bench(false);
        b.array.update_arm(1, GateArmState::Timeout);
        b.array.update_arm(1, GateArmState::Timeout);
        let alerts = b.alerts.messages();
        assert_eq!(
            alerts
                .iter()
                .filter(|m| m.starts_with("COMMUNICATION FAILED"))
                .count(),
            1
        );
        assert_eq!(b.array.arm_state(), GateArmState::Timeout);
    }

    #[test]
    fn test_warn_close_not_reverted_by_aggregation() {
        let b = closed_bench(false);
        b.array.update_arm(1, GateArmState::Open);
        b.array.update_arm(2, GateArmState::Open);
        assert_eq!(b.array.arm_state(), GateArmState::Open);

        b.array.set_owner_next(Some("alice"));
        b.array.request_arm_state(GateArmState::WarnClose).unwrap();
        assert_eq!(b.array.arm_state(), GateArmState::WarnClose);
        // No per-arm commands for the logical state.
        assert!(b.channel.commands.lock().unwrap().is_empty());

        // A fresh OPEN report must not flip the aggregate back.
        b.array.update_arm(1, GateArmState::Open);
        assert_eq!(b.array.arm_state(), GateArmState::WarnClose);

        // An explicit close proceeds from WARN_CLOSE.
        b.array.set_owner_next(Some("alice"));
        b.array.request_arm_state(GateArmState::Closing).unwrap();
        assert_eq!(b.channel.commands.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_open_request_end_to_end() {
        let b = closed_bench(true);
        assert_eq!(b.array.arm_state(), GateArmState::Closed);
        assert!(b.array.status().active);
        assert!(b.array.status().online);

        b.array.set_owner_next(Some("operator"));
        b.array.request_arm_state(GateArmState::Opening).unwrap();

        // Both arms were commanded and echoed OPENING back.
        let commands = b.channel.commands.lock().unwrap().clone();
        assert_eq!(commands.len(), 2);
        assert!(commands
            .iter()
            .all(|(_, _, s, o)| *s == GateArmState::Opening && o.as_str() == "operator"));
        assert_eq!(b.array.arm_state(), GateArmState::Opening);

        // Arms finish the motion.
        b.array.update_arm(1, GateArmState::Open);
        assert_eq!(b.array.arm_state(), GateArmState::Opening);
        b.array.update_arm(2, GateArmState::Open);
        assert_eq!(b.array.arm_state(), GateArmState::Open);
        assert!(b.array.status().fully_open);
    }

    #[test]
    fn test_open_request_rejected_by_opposing_direction() {
        let b = closed_bench(false);
        b.array.set_open_direction(2);
        b.array.set_owner_next(Some("operator"));
        let result = b.array.request_arm_state(GateArmState::Opening);
        assert!(matches!(result, Err(DeviceError::InterlockConflict)));
        assert_eq!(b.array.arm_state(), GateArmState::Closed);
        assert!(b.channel.commands.lock().unwrap().is_empty());
    }

    #[test]
    fn test_interlock_change_pushed_to_arms() {
        let b = closed_bench(false);
        b.channel.interlocks.lock().unwrap().clear();
        b.array.set_open_direction(-1);
        let sent = b.channel.interlocks.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, i)| *i == GateArmInterlock::DenyOpen));
    }

    #[test]
    fn test_plan_phase_follows_aggregate() {
        let plan = Arc::new(ActionPlan::new("ramp_plan", "closed_msg"));
        let mut cfg = ArrayConfig::new("ga_array_1", "US-52", 1);
        cfg.action_plan = Some(plan.clone());
        cfg.open_phase = Some("open_msg".into());
        cfg.closed_phase = Some("closed_msg".into());
        let b = bench_with(cfg, false);
        b.array.set_arm(1, GateArm::new("ga_1", "ctl_1", 2)).unwrap();
        b.array.update_arm(1, GateArmState::Closed);
        b.array.set_system_enable(true);
        assert_eq!(plan.phase(), "closed_msg");

        b.array.update_arm(1, GateArmState::Open);
        assert_eq!(plan.phase(), "open_msg");

        // Exactly one phase-change notification for the flip.
        let phase_events = b
            .notifier
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _, a)| t == "action_plan" && a == "phase")
            .count();
        assert_eq!(phase_events, 1);
    }

    #[test]
    fn test_disabled_system_swallows_validated_close() {
        let b = closed_bench(false);
        b.array.update_arm(1, GateArmState::Open);
        b.array.update_arm(2, GateArmState::Open);
        b.array.set_system_enable(false);
        b.array.set_owner_next(Some("operator"));
        // WARN_CLOSE validates (close is not denied by disable) but the
        // disabled system issues nothing.
        b.array.request_arm_state(GateArmState::WarnClose).unwrap();
        assert_eq!(b.array.arm_state(), GateArmState::Open);
        assert!(b.channel.commands.lock().unwrap().is_empty());
    }
}
