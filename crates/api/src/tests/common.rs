/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

//! Shared fixtures: a scripted command runner standing in for the SSH
//! transport, an event collector, and inventory seeding helpers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use model::event::{UpdateEvent, UpdateEventType};
use model::job::BatchJob;
use model::router::{NewRouter, Router, RouterStatus};
use sqlx::SqlitePool;
use ssh::{CommandRunner, SessionTarget, ShellError};

use crate::events::{EventBus, EventSink, Subscription};
use crate::fota;
use crate::rollout::RolloutEngine;
use crate::scan::ScanEngine;

/// One scripted reply of the fake transport.
#[derive(Debug, Clone)]
pub(crate) enum FakeResponse {
    Ok(String),
    Closed,
    Timeout,
    Fail { exit_code: u32, stderr: String },
}

impl FakeResponse {
    fn to_result(&self) -> Result<String, ShellError> {
        match self {
            FakeResponse::Ok(stdout) => Ok(stdout.clone()),
            FakeResponse::Closed => Err(ShellError::ConnectionClosed),
            FakeResponse::Timeout => Err(ShellError::Timeout {
                timeout: Duration::from_secs(60),
            }),
            FakeResponse::Fail { exit_code, stderr } => Err(ShellError::CommandFailed {
                stderr: stderr.clone(),
                exit_code: *exit_code,
            }),
        }
    }
}

/// Scripted [`CommandRunner`]: responses are keyed by `(host, command)`.
/// Queued responses are consumed in order; the final one repeats forever.
/// Unscripted commands fail, which surfaces as a router failure in the
/// engine under test rather than a panic inside a background task.
pub(crate) struct FakeRunner {
    scripts: Mutex<HashMap<(String, String), VecDeque<FakeResponse>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeRunner {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(FakeRunner {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn script(&self, host: &str, command: &str, responses: Vec<FakeResponse>) {
        self.scripts
            .lock()
            .unwrap()
            .insert((host.to_string(), command.to_string()), responses.into());
    }

    /// Scripts a reachable, scannable router: ping answers, the version file
    /// reads `current`, the FOTA agent offers `offered` (None: `Fw_newest`).
    pub(crate) fn script_scan(&self, host: &str, current: &str, offered: Option<&str>) {
        self.script(host, fota::CMD_PING, vec![FakeResponse::Ok("ok".into())]);
        self.script(
            host,
            fota::CMD_READ_VERSION,
            vec![FakeResponse::Ok(current.into())],
        );
        let envelope = match offered {
            Some(version) => format!(r#"{{"fw": "{version}"}}"#),
            None => r#"{"fw": "Fw_newest"}"#.to_string(),
        };
        self.script(host, fota::CMD_FOTA_INFO, vec![FakeResponse::Ok(envelope)]);
    }

    /// Scripts a full happy-path update: image already downloaded, clean
    /// verify, flash that severs the session, device back with `new_version`
    /// on the first reboot poll.
    pub(crate) fn script_update(&self, host: &str, new_version: &str) {
        self.script(host, fota::CMD_CHECK_IMAGE, vec![FakeResponse::Ok("-rw-r--r-- firmware.img".into())]);
        self.script(host, fota::CMD_VERIFY_IMAGE, vec![FakeResponse::Ok("".into())]);
        self.script(host, fota::CMD_APPLY_IMAGE, vec![FakeResponse::Closed]);
        self.script(
            host,
            fota::CMD_READ_VERSION,
            vec![FakeResponse::Ok(new_version.into())],
        );
    }

    pub(crate) fn calls_of(&self, host: &str, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, c)| h == host && c == command)
            .count()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn exec(
        &self,
        target: &SessionTarget,
        command: &str,
        _timeout: Duration,
    ) -> Result<String, ShellError> {
        self.calls
            .lock()
            .unwrap()
            .push((target.host.clone(), command.to_string()));

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(&(target.host.clone(), command.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap().to_result(),
            Some(queue) => queue
                .front()
                .map(FakeResponse::to_result)
                .unwrap_or_else(|| Err(ShellError::Unknown("script exhausted".to_string()))),
            None => Err(ShellError::Unknown(format!(
                "unscripted command for {}: {command}",
                target.host
            ))),
        }
    }
}

/// Collects everything emitted on a bus, in delivery order.
pub(crate) struct EventLog {
    events: Arc<Mutex<Vec<UpdateEvent>>>,
    _subscription: Subscription,
}

impl EventLog {
    pub(crate) fn attach(bus: &Arc<EventBus>) -> Self {
        let events: Arc<Mutex<Vec<UpdateEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let sink: EventSink = Box::new(move |event| {
            sink_events.lock().unwrap().push(event.clone());
        });
        let subscription = bus.subscribe_all(sink);
        EventLog {
            events,
            _subscription: subscription,
        }
    }

    pub(crate) fn events(&self) -> Vec<UpdateEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn for_job(&self, job_id: &str) -> Vec<UpdateEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.job_id == job_id)
            .collect()
    }

    pub(crate) fn of_type(&self, event_type: UpdateEventType) -> Vec<UpdateEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }
}

/// Everything a scenario test needs, wired against a throwaway on-disk
/// store and the fake transport. The store is file-backed rather than
/// in-memory so a full batch of concurrent router tasks gets real pooled
/// connections under the paused test clock.
pub(crate) struct Harness {
    pub pool: SqlitePool,
    pub bus: Arc<EventBus>,
    pub runner: Arc<FakeRunner>,
    pub scan: ScanEngine,
    pub rollout: Arc<RolloutEngine>,
    pub events: EventLog,
    _data_dir: tempfile::TempDir,
}

pub(crate) async fn harness() -> Harness {
    let data_dir = tempfile::tempdir().unwrap();
    let pool = db::connect(&data_dir.path().join("ferrite.db")).await.unwrap();
    let bus = Arc::new(EventBus::new());
    let runner = FakeRunner::new();
    let events = EventLog::attach(&bus);
    let scan = ScanEngine::new(
        pool.clone(),
        runner.clone() as Arc<dyn CommandRunner>,
        bus.clone(),
    );
    let rollout = Arc::new(RolloutEngine::new(
        pool.clone(),
        runner.clone() as Arc<dyn CommandRunner>,
        bus.clone(),
    ));
    Harness {
        pool,
        bus,
        runner,
        scan,
        rollout,
        events,
        _data_dir: data_dir,
    }
}

/// Inserts a router and forces it into the given firmware state.
pub(crate) async fn seed_router(
    pool: &SqlitePool,
    name: &str,
    ip: &str,
    status: RouterStatus,
    current: Option<&str>,
    available: Option<&str>,
) -> Router {
    let router = db::router::insert_one(
        pool,
        &NewRouter {
            id: None,
            device_name: name.to_string(),
            ip_address: ip.to_string(),
            username: None,
            password: None,
        },
    )
    .await
    .unwrap();
    db::router::update_firmware_info(pool, &router.id, current, available, status)
        .await
        .unwrap();
    db::router::get_by_id(pool, &router.id).await.unwrap()
}

pub(crate) async fn seed_global_credentials(pool: &SqlitePool) {
    db::settings::set_global_credentials(pool, "admin", "fleet-pw")
        .await
        .unwrap();
}

/// Polls the store until the job leaves its active states. Runs under the
/// paused test clock, so the engine's long sleeps cost no wall time.
pub(crate) async fn wait_for_job(pool: &SqlitePool, job_id: &str) -> BatchJob {
    for _ in 0..100_000u32 {
        let job = db::batch_job::get_by_id(pool, job_id).await.unwrap();
        if !job.status.is_active() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}
