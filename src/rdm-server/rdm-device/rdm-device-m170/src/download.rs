// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration download to a 170-style cabinet.
//!
//! The operation walks the cabinet through clock sync, hardware
//! verification, device resets, failure thresholds and the per-meter
//! timing tables. A cabinet-style mismatch is recorded as maintenance
//! status without aborting the chain; the firmware version read mid-chain
//! selects which reset steps the remainder performs.

use std::sync::Arc;

use chrono::Timelike;
use tracing::{debug, info};

use rdm_comm::{
    Controller, OpCarrier, OpFuture, OpOutcome, OpPriority, OpStatus, Operation, WireRequest,
    WireResponse,
};
use rdm_core::{DeviceError, DeviceResult, TimingPlan};

use crate::addr;
use crate::timing::{merge_plans, pack_table, MeterTimes};

/// One metered ramp served by the cabinet.
#[derive(Debug, Clone)]
pub struct MeterSlot {
    pub name: String,
    /// Detector inputs watching the queue for this meter.
    pub queue_inputs: Vec<u8>,
}

/// Parameters for one configuration download.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Perform a level-1 restart before configuring.
    pub restart: bool,
    /// Expected cabinet style dip switch setting.
    pub expected_dip: Option<u8>,
    /// Comm fail threshold, tenths of a second.
    pub comm_fail_threshold: u8,
    pub times: MeterTimes,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            restart: false,
            expected_dip: None,
            comm_fail_threshold: 10,
            times: MeterTimes::default(),
        }
    }
}

enum DownloadStep {
    Restart,
    SyncClock,
    CheckCabinet,
    QueryFirmware,
    ResetDetectors,
    ClearDetectors,
    ResetWatchdog,
    ClearWatchdog,
    SetCommFail,
    QueueBitmap,
    TimingTable1,
    ClearVerifies1,
    TimingTable2,
    ClearVerifies2,
}

/// Download configuration data to a 170-style controller.
pub struct ConfigDownload {
    controller: Arc<Controller>,
    cfg: DownloadConfig,
    meters: [Option<MeterSlot>; 2],
    plans: Vec<TimingPlan>,
    step: DownloadStep,
    status_err: Option<String>,
}

impl ConfigDownload {
    pub fn new(
        controller: Arc<Controller>,
        cfg: DownloadConfig,
        meters: [Option<MeterSlot>; 2],
        plans: Vec<TimingPlan>,
    ) -> Self {
        let step = if cfg.restart {
            DownloadStep::Restart
        } else {
            DownloadStep::SyncClock
        };
        Self {
            controller,
            cfg,
            meters,
            plans,
            step,
            status_err: None,
        }
    }

    fn queue_bitmap(&self) -> Vec<u8> {
        let mut bitmap = vec![0u8; addr::DETECTOR_INPUTS / 8];
        for meter in self.meters.iter().flatten() {
            for input in &meter.queue_inputs {
                let input = usize::from(*input);
                if input < addr::DETECTOR_INPUTS {
                    bitmap[input / 8] |= 1 << (input % 8);
                }
            }
        }
        bitmap
    }

    fn timing_table(&self, slot: usize) -> DeviceResult<Option<Vec<u8>>> {
        let Some(meter) = self.meters[slot].as_ref() else {
            return Ok(None);
        };
        let table = merge_plans(&meter.name, &self.plans, &self.cfg.times);
        let data = pack_table(&table, &self.cfg.times)
            .map_err(|e| DeviceError::Config(e.to_string()))?;
        Ok(Some(data))
    }
}

fn expect_ack(resp: WireResponse) -> DeviceResult<()> {
    if resp == WireResponse::Ack {
        Ok(())
    } else {
        Err(DeviceError::Malformed(format!(
            "unexpected response: {:?}",
            resp
        )))
    }
}

fn expect_data(resp: WireResponse) -> DeviceResult<Vec<u8>> {
    match resp {
        WireResponse::Data(data) => Ok(data),
        other => Err(DeviceError::Malformed(format!(
            "unexpected response: {:?}",
            other
        ))),
    }
}

async fn write(carrier: &mut OpCarrier<'_>, address: u16, data: Vec<u8>) -> DeviceResult<()> {
    let resp = carrier
        .transact(WireRequest::WriteMemory { address, data })
        .await?;
    expect_ack(resp)
}

impl Operation for ConfigDownload {
    fn name(&self) -> &'static str {
        "configuration download"
    }

    fn priority(&self) -> OpPriority {
        OpPriority::Download
    }

    fn poll<'a>(&'a mut self, carrier: &'a mut OpCarrier<'a>) -> OpFuture<'a> {
        Box::pin(async move {
            match self.step {
                DownloadStep::Restart => {
                    let resp = carrier.transact(WireRequest::Restart { level: 1 }).await?;
                    expect_ack(resp)?;
                    self.step = DownloadStep::SyncClock;
                }
                DownloadStep::SyncClock => {
                    let now = chrono::Local::now();
                    let minute_of_day = (now.hour() * 60 + now.minute()) as u16;
                    let resp = carrier
                        .transact(WireRequest::SyncClock { minute_of_day })
                        .await?;
                    expect_ack(resp)?;
                    self.step = DownloadStep::CheckCabinet;
                }
                DownloadStep::CheckCabinet => {
                    let resp = carrier
                        .transact(WireRequest::ReadMemory {
                            address: addr::CABINET_TYPE,
                            len: 1,
                        })
                        .await?;
                    let data = expect_data(resp)?;
                    if let Some(expected) = self.cfg.expected_dip {
                        if data[0] != expected {
                            // Survivable mismatch; keep configuring.
                            self.status_err = Some(format!("CABINET STYLE {}", data[0]));
                        }
                    }
                    self.step = DownloadStep::QueryFirmware;
                }
                DownloadStep::QueryFirmware => {
                    let resp = carrier
                        .transact(WireRequest::ReadMemory {
                            address: addr::PROM_VERSION,
                            len: 2,
                        })
                        .await?;
                    let data = expect_data(resp)?;
                    let version = format!("{}.{}", data[0], data[1]);
                    self.controller.set_version(&version);
                    // Older firmware has no detector reset support.
                    self.step = if data[0] > 4 || data[1] > 0 {
                        DownloadStep::ResetDetectors
                    } else {
                        DownloadStep::ResetWatchdog
                    };
                }
                DownloadStep::ResetDetectors => {
                    write(
                        carrier,
                        addr::SPECIAL_FUNCTION_OUTPUTS - 1,
                        vec![addr::DETECTOR_RESET],
                    )
                    .await?;
                    self.step = DownloadStep::ClearDetectors;
                }
                DownloadStep::ClearDetectors => {
                    write(carrier, addr::SPECIAL_FUNCTION_OUTPUTS - 1, vec![0]).await?;
                    self.step = DownloadStep::ResetWatchdog;
                }
                DownloadStep::ResetWatchdog => {
                    write(
                        carrier,
                        addr::SPECIAL_FUNCTION_OUTPUTS + 2,
                        vec![addr::WATCHDOG_RESET],
                    )
                    .await?;
                    self.step = DownloadStep::ClearWatchdog;
                }
                DownloadStep::ClearWatchdog => {
                    write(carrier, addr::SPECIAL_FUNCTION_OUTPUTS + 2, vec![0]).await?;
                    self.step = DownloadStep::SetCommFail;
                }
                DownloadStep::SetCommFail => {
                    write(carrier, addr::COMM_FAIL, vec![self.cfg.comm_fail_threshold]).await?;
                    self.step = DownloadStep::QueueBitmap;
                }
                DownloadStep::QueueBitmap => {
                    let bitmap = self.queue_bitmap();
                    write(carrier, addr::QUEUE_BITMAP, bitmap).await?;
                    self.step = DownloadStep::TimingTable1;
                }
                DownloadStep::TimingTable1 => match self.timing_table(0)? {
                    Some(data) => {
                        write(carrier, addr::METER_1_TIMING_TABLE, data).await?;
                        self.step = DownloadStep::ClearVerifies1;
                    }
                    None => {
                        self.step = DownloadStep::TimingTable2;
                        return Ok(OpStatus::Continue);
                    }
                },
                DownloadStep::ClearVerifies1 => {
                    write(
                        carrier,
                        addr::RAMP_METER_DATA + addr::OFF_POLICE_PANEL,
                        vec![0],
                    )
                    .await?;
                    self.step = DownloadStep::TimingTable2;
                }
                DownloadStep::TimingTable2 => match self.timing_table(1)? {
                    Some(data) => {
                        write(carrier, addr::METER_2_TIMING_TABLE, data).await?;
                        self.step = DownloadStep::ClearVerifies2;
                    }
                    None => return Ok(OpStatus::Done),
                },
                DownloadStep::ClearVerifies2 => {
                    write(
                        carrier,
                        addr::RAMP_METER_DATA + addr::OFF_POLICE_PANEL + addr::OFF_METER_2,
                        vec![0],
                    )
                    .await?;
                    return Ok(OpStatus::Done);
                }
            }
            Ok(OpStatus::Continue)
        })
    }

    fn complete(self: Box<Self>, outcome: OpOutcome) {
        match outcome {
            OpOutcome::Succeeded => {
                if let Some(status) = self.status_err {
                    self.controller.set_maint(&status);
                }
                info!("{}: settings downloaded", self.controller.name());
            }
            OpOutcome::Expected(e) => {
                debug!("{}: download skipped: {}", self.controller.name(), e);
            }
            OpOutcome::Failed(_) => {
                // The engine already marked the controller degraded; the
                // tables are not considered applied.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rdm_comm::testing::ScriptedLink;
    use rdm_core::{ControllerCondition, Notifier};

    use super::*;
    use crate::{response_frame, M170Codec};

    struct NullNotifier;

    impl Notifier for NullNotifier {
        fn notify_attribute(&self, _t: &str, _o: &str, _a: &str) {}
    }

    fn controller() -> Arc<Controller> {
        Arc::new(Controller::new(
            "ctl_3",
            3,
            ControllerCondition::Active,
            Arc::new(NullNotifier),
        ))
    }

    fn ack() -> DeviceResult<Vec<u8>> {
        Ok(response_frame(3, 0, &[]))
    }

    async fn run_to_completion(
        mut op: ConfigDownload,
        mut link: ScriptedLink,
    ) -> DeviceResult<ConfigDownload> {
        let mut codec = M170Codec::new();
        loop {
            let mut carrier =
                OpCarrier::new(&mut link, &mut codec, 3, Duration::from_millis(10));
            match op.poll(&mut carrier).await? {
                OpStatus::Continue => {}
                OpStatus::Done => return Ok(op),
            }
        }
    }

    fn meter() -> MeterSlot {
        MeterSlot {
            name: "meter_1".to_string(),
            queue_inputs: vec![0, 9],
        }
    }

    #[test]
    fn test_queue_bitmap_bits() {
        let op = ConfigDownload::new(
            controller(),
            DownloadConfig::default(),
            [Some(meter()), None],
            Vec::new(),
        );
        assert_eq!(op.queue_bitmap(), vec![0x01, 0x02, 0x00]);
    }

    #[tokio::test]
    async fn test_full_chain_new_firmware() {
        let mut link = ScriptedLink::new();
        link.push_response(ack()); // sync clock
        link.push_response(Ok(response_frame(3, 0, &[7]))); // cabinet dip
        link.push_response(Ok(response_frame(3, 0, &[5, 1]))); // firmware 5.1
        link.push_response(ack()); // reset detectors
        link.push_response(ack()); // clear detectors
        link.push_response(ack()); // reset watchdog
        link.push_response(ack()); // clear watchdog
        link.push_response(ack()); // comm fail
        link.push_response(ack()); // queue bitmap
        link.push_response(ack()); // meter 1 table
        link.push_response(ack()); // clear verifies 1

        let ctl = controller();
        let cfg = DownloadConfig {
            expected_dip: Some(7),
            ..DownloadConfig::default()
        };
        let op = ConfigDownload::new(ctl.clone(), cfg, [Some(meter()), None], Vec::new());
        let op = run_to_completion(op, link).await.unwrap();

        assert_eq!(ctl.health().version, "5.1");
        assert!(op.status_err.is_none());
        Box::new(op).complete(OpOutcome::Succeeded);
        assert!(ctl.health().maint_status.is_empty());
    }

    #[tokio::test]
    async fn test_old_firmware_skips_detector_reset() {
        let mut link = ScriptedLink::new();
        link.push_response(ack()); // restart
        link.push_response(ack()); // sync clock
        link.push_response(Ok(response_frame(3, 0, &[7]))); // cabinet dip
        link.push_response(Ok(response_frame(3, 0, &[4, 0]))); // firmware 4.0
        link.push_response(ack()); // reset watchdog
        link.push_response(ack()); // clear watchdog
        link.push_response(ack()); // comm fail
        link.push_response(ack()); // queue bitmap

        let ctl = controller();
        let cfg = DownloadConfig {
            restart: true,
            ..DownloadConfig::default()
        };
        let op = ConfigDownload::new(ctl.clone(), cfg, [None, None], Vec::new());
        run_to_completion(op, link).await.unwrap();
        assert_eq!(ctl.health().version, "4.0");
    }

    #[tokio::test]
    async fn test_cabinet_mismatch_records_maintenance() {
        let mut link = ScriptedLink::new();
        link.push_response(ack());
        link.push_response(Ok(response_frame(3, 0, &[9]))); // dip 9, expected 7
        link.push_response(Ok(response_frame(3, 0, &[5, 1])));
        for _ in 0..6 {
            link.push_response(ack());
        }

        let ctl = controller();
        let cfg = DownloadConfig {
            expected_dip: Some(7),
            ..DownloadConfig::default()
        };
        let op = ConfigDownload::new(ctl.clone(), cfg, [None, None], Vec::new());
        let op = run_to_completion(op, link).await.unwrap();
        assert_eq!(op.status_err.as_deref(), Some("CABINET STYLE 9"));
        Box::new(op).complete(OpOutcome::Succeeded);
        assert_eq!(ctl.health().maint_status, "CABINET STYLE 9");
    }

    #[tokio::test]
    async fn test_lost_transport_mid_chain_marks_controller_failed() {
        use rdm_comm::{run_comm_task, CommTaskConfig, FixedDelay};
        use tokio::sync::mpsc;

        let mut link = ScriptedLink::new();
        link.push_response(ack()); // sync clock
        link.push_response(Ok(response_frame(3, 0, &[7]))); // cabinet dip
        // Transport lost: every further receive times out, exhausting the
        // retries mid-chain before any timing table is written.

        let ctl = controller();
        let op = ConfigDownload::new(
            ctl.clone(),
            DownloadConfig::default(),
            [Some(meter()), None],
            Vec::new(),
        );
        let (tx, rx) = mpsc::channel(4);
        tx.send(Box::new(op) as Box<dyn Operation>).await.unwrap();
        drop(tx);

        let cfg = CommTaskConfig {
            retry: Arc::new(FixedDelay::new(3, Duration::from_millis(1))),
            ..CommTaskConfig::default()
        };
        run_comm_task(
            ctl.clone(),
            Box::new(link),
            Box::new(M170Codec::new()),
            cfg,
            rx,
        )
        .await;

        assert!(ctl.is_failed());
        assert_eq!(ctl.health().error_status, "response timeout");
    }

    #[tokio::test]
    async fn test_both_meters_programmed() {
        let mut link = ScriptedLink::new();
        link.push_response(ack()); // sync
        link.push_response(Ok(response_frame(3, 0, &[7])));
        link.push_response(Ok(response_frame(3, 0, &[5, 1])));
        for _ in 0..10 {
            link.push_response(ack());
        }

        let meter2 = MeterSlot {
            name: "meter_2".to_string(),
            queue_inputs: Vec::new(),
        };
        let op = ConfigDownload::new(
            controller(),
            DownloadConfig::default(),
            [Some(meter()), Some(meter2)],
            Vec::new(),
        );
        let link_sent = run_to_completion(op, link).await;
        assert!(link_sent.is_ok());
    }
}
