// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod services;
mod store;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use rdm_app::{init_logging, normalize_name, ConfigFile};
use rdm_comm::{spawn_comm_task, CommTaskConfig, Controller, FixedDelay};
use rdm_core::{ActionPlan, AlertSink, DeviceRequest, DynResult, Notifier};
use rdm_device::{register_builtin_drivers_on, DriverRegistry, LinkAccess};
use rdm_device_m170::{ConfigDownload, DownloadConfig, MeterSlot, MeterTimes};
use rdm_gate::{ArrayConfig, ArrayDeps, GateArm, GateArmArray, GateSystem};

use config::{AccessConfig, ServerConfig};
use services::{CommArmChannel, LogAlertSink, LogNotifier};
use store::EntityStore;

const PKG_DESCRIPTION: &str = concat!(
    env!("CARGO_PKG_NAME"),
    " - roadway device management server"
);

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Log level override (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level")]
    log_level: Option<String>,
}

/// Timer-triggered units of work accepted from the scheduling layer.
enum ServerJob {
    PollGateArms,
    RecomputeInterlocks,
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();
    if cli.print_config {
        print!("{}", config::EXAMPLE);
        return Ok(());
    }

    let (cfg, cfg_path) = match &cli.config {
        Some(path) => (ServerConfig::load_from_file(path)?, Some(path.clone())),
        None => ServerConfig::load_from_default_paths()?,
    };
    init_logging(cli.log_level.as_deref().or(cfg.general.log_level.as_deref()));
    if let Some(path) = &cfg_path {
        info!("Config loaded from {}", path.display());
    }

    let store = Arc::new(EntityStore::open(&cfg.store.resolved_path()));
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let alerts: Arc<dyn AlertSink> = Arc::new(LogAlertSink);
    let channel = Arc::new(CommArmChannel::new());

    let mut registry = DriverRegistry::new();
    register_builtin_drivers_on(&mut registry);

    // Field controllers, one comm task each.
    let mut joins: Vec<JoinHandle<()>> = Vec::new();
    for ctl_cfg in &cfg.controllers {
        let bundle = match registry.build(&ctl_cfg.protocol, link_access(&ctl_cfg.access)) {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!("controller {}: {}", ctl_cfg.name, e);
                continue;
            }
        };
        let controller = Arc::new(Controller::new(
            &ctl_cfg.name,
            ctl_cfg.drop,
            ctl_cfg.condition,
            notifier.clone(),
        ));
        store.save(controller.as_ref());
        let task_cfg = CommTaskConfig {
            recv_timeout: Duration::from_millis(ctl_cfg.recv_timeout_ms),
            phase_timeout: Duration::from_millis(ctl_cfg.recv_timeout_ms * 2 + 500),
            retry: Arc::new(FixedDelay::new(ctl_cfg.retries, Duration::from_millis(100))),
            idle_stop: ctl_cfg.idle_stop_s.map(Duration::from_secs),
            ..CommTaskConfig::default()
        };
        let (handle, join) =
            spawn_comm_task(controller.clone(), bundle.link, bundle.codec, task_cfg);
        joins.push(join);
        channel.register(&ctl_cfg.name, handle.clone());

        // Metered cabinets get their settings programmed at startup.
        if normalize_name(&ctl_cfg.protocol) == "m170" {
            let mut meters: [Option<MeterSlot>; 2] = [None, None];
            for (slot, meter) in ctl_cfg.meters.iter().take(2).enumerate() {
                meters[slot] = Some(MeterSlot {
                    name: meter.name.clone(),
                    queue_inputs: meter.queue_inputs.clone(),
                });
            }
            let download_cfg = DownloadConfig {
                restart: ctl_cfg.restart,
                expected_dip: ctl_cfg.cabinet_dip,
                comm_fail_threshold: ctl_cfg.comm_fail_threshold,
                times: MeterTimes::default(),
            };
            handle.submit(Box::new(ConfigDownload::new(
                controller.clone(),
                download_cfg,
                meters,
                cfg.plans.clone(),
            )));
        }
    }

    // Gate arm arrays, with action plans shared by name.
    let mut plans: HashMap<String, Arc<ActionPlan>> = HashMap::new();
    let system = Arc::new(GateSystem::new(alerts.clone()));
    for arr in &cfg.arrays {
        let mut acfg = ArrayConfig::new(&arr.name, &arr.road, arr.road_dir);
        acfg.prereq = arr.prereq.clone();
        acfg.camera = arr.camera.clone();
        acfg.approach = arr.approach.clone();
        acfg.open_phase = arr.open_phase.clone();
        acfg.closed_phase = arr.closed_phase.clone();
        if let Some(plan_name) = &arr.action_plan {
            let initial = arr
                .closed_phase
                .clone()
                .unwrap_or_else(|| "undeployed".to_string());
            let plan = plans
                .entry(plan_name.clone())
                .or_insert_with(|| Arc::new(ActionPlan::new(plan_name.clone(), initial)))
                .clone();
            acfg.action_plan = Some(plan);
        }
        let array = GateArmArray::new(
            acfg,
            ArrayDeps {
                alerts: alerts.clone(),
                notifier: notifier.clone(),
                channel: channel.clone(),
            },
        );
        for arm_cfg in &arr.arms {
            let arm = GateArm::new(&arm_cfg.name, &arm_cfg.controller, arm_cfg.pin);
            store.save(&arm);
            if let Err(e) = array.set_arm(arm_cfg.idx, arm) {
                warn!("{}: {}", arr.name, e);
            }
        }
        store.save(array.as_ref());
        system.register(array);
    }
    for plan in plans.values() {
        store.save(plan.as_ref());
    }
    system.recompute_interlocks();

    // Timer-job intake: the scheduling layer submits opaque units of
    // work; a plain interval drives the built-in periodic jobs the same
    // way.
    let (jobs_tx, mut jobs_rx) = mpsc::channel::<ServerJob>(64);
    {
        let jobs = jobs_tx.clone();
        let period = Duration::from_secs(cfg.general.poll_interval_s.max(1));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            loop {
                tick.tick().await;
                if jobs.send(ServerJob::PollGateArms).await.is_err() {
                    break;
                }
                if jobs.send(ServerJob::RecomputeInterlocks).await.is_err() {
                    break;
                }
            }
        });
    }

    info!(
        "rdm-server up: {} controllers, {} gate arm arrays",
        cfg.controllers.len(),
        cfg.arrays.len()
    );

    loop {
        tokio::select! {
            job = jobs_rx.recv() => {
                let Some(job) = job else { break };
                run_job(job, &system);
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Pending operations are discarded; an in-flight phase finishes its
    // round-trip before each comm task exits.
    channel.clear();
    for join in joins {
        let _ = join.await;
    }
    info!("rdm-server stopped");
    Ok(())
}

fn run_job(job: ServerJob, system: &GateSystem) {
    match job {
        ServerJob::PollGateArms => {
            for array in system.arrays() {
                array.send_device_request(DeviceRequest::QueryStatus);
            }
        }
        ServerJob::RecomputeInterlocks => system.recompute_interlocks(),
    }
}

fn link_access(access: &AccessConfig) -> LinkAccess {
    match access {
        AccessConfig::Serial { path, baud } => LinkAccess::Serial {
            path: path.clone(),
            baud: *baud,
        },
        AccessConfig::Tcp { addr } => LinkAccess::Tcp { addr: addr.clone() },
        AccessConfig::Loopback => LinkAccess::Loopback,
    }
}
