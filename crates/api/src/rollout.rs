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

//! Batched, rate-limited firmware rollout: the batch scheduler and the
//! per-router update pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use model::event::{EventData, UpdateEvent, UpdateEventType, UpdateStage};
use model::history::HistoryStatus;
use model::job::{ALLOWED_BATCH_SIZES, BatchJob, JobStatus};
use model::router::{Router, RouterStatus};
use serde::Deserialize;
use sqlx::SqlitePool;
use ssh::{CommandRunner, SessionTarget, ShellError};

use crate::events::EventBus;
use crate::fota::FotaProbe;
use crate::scan::percent;
use crate::{ApiError, ApiResult};

/// How long a flashed router may take to come back: 20 polls, 30 s apart.
const REBOOT_POLL_ATTEMPTS: u32 = 20;
const REBOOT_POLL_INTERVAL: Duration = Duration::from_secs(30);

const MINUTE: Duration = Duration::from_secs(60);

/// Operator request to start a rollout.
#[derive(Debug, Clone, Deserialize)]
pub struct RolloutRequest {
    /// Explicit router selection; absent means every router with an update
    /// available.
    #[serde(default)]
    pub router_ids: Option<Vec<String>>,
    pub batch_size: i64,
    /// Also retry routers currently in `error`/`unreachable` state.
    #[serde(default)]
    pub include_errors: bool,
}

/// Why one router's pipeline stopped. The display strings are what lands in
/// the history row and the `router_failed` event.
#[derive(thiserror::Error, Debug)]
enum UpdateFailure {
    #[error("No credentials configured")]
    NoCredentials,
    #[error("Firmware download failed")]
    Download,
    #[error("Firmware image verification failed")]
    Verify,
    #[error("Firmware flash failed: {0}")]
    Flash(ShellError),
    #[error("Router did not come back online after update")]
    RebootTimeout,
    #[error("{0}")]
    Internal(String),
}

impl From<db::DatabaseError> for UpdateFailure {
    fn from(e: db::DatabaseError) -> Self {
        UpdateFailure::Internal(e.to_string())
    }
}

/// The rollout engine. At most one job runs at a time; the abort registry
/// holds one cooperative flag per running job.
pub struct RolloutEngine {
    pool: SqlitePool,
    runner: Arc<dyn CommandRunner>,
    bus: Arc<EventBus>,
    active: DashMap<String, Arc<AtomicBool>>,
}

impl RolloutEngine {
    pub fn new(pool: SqlitePool, runner: Arc<dyn CommandRunner>, bus: Arc<EventBus>) -> Self {
        RolloutEngine {
            pool,
            runner,
            bus,
            active: DashMap::new(),
        }
    }

    /// Validates the request, persists the job and launches it in the
    /// background. Returns as soon as the job is `running`.
    pub async fn start(self: &Arc<Self>, request: RolloutRequest) -> ApiResult<BatchJob> {
        if !ALLOWED_BATCH_SIZES.contains(&request.batch_size) {
            return Err(ApiError::Validation(format!(
                "batch_size must be one of {ALLOWED_BATCH_SIZES:?}"
            )));
        }
        if let Some(active) = db::batch_job::get_active(&self.pool).await? {
            return Err(ApiError::Conflict { job_id: active.id });
        }

        let routers = self.resolve_candidates(&request).await?;
        if routers.is_empty() {
            return Err(ApiError::Validation(
                "no routers eligible for update".to_string(),
            ));
        }

        let job =
            db::batch_job::insert(&self.pool, request.batch_size, routers.len() as i64).await?;
        db::batch_job::mark_running(&self.pool, &job.id).await?;

        let abort = Arc::new(AtomicBool::new(false));
        self.active.insert(job.id.clone(), abort.clone());

        tracing::info!(
            job_id = %job.id,
            total = routers.len(),
            batch_size = request.batch_size,
            "starting rollout"
        );
        let engine = self.clone();
        let job_id = job.id.clone();
        tokio::spawn(async move {
            engine.run_job(&job_id, routers, request.batch_size as usize, abort).await;
        });

        db::batch_job::get_by_id(&self.pool, &job.id).await.map_err(Into::into)
    }

    /// Requests cancellation of a running job. The batch loop honors it
    /// before the next batch and within a minute during a pause; in-flight
    /// router pipelines always run to their natural end (tearing down a
    /// flash mid-step can brick the device).
    pub async fn cancel(&self, job_id: &str) -> ApiResult<()> {
        if let Some(flag) = self.active.get(job_id) {
            flag.store(true, Ordering::SeqCst);
            tracing::info!(job_id, "rollout cancellation requested");
            return Ok(());
        }

        // Not in the registry: either unknown, finished, or a leftover row
        // from a previous process that recovery has not yet visited.
        let job = db::batch_job::get_by_id(&self.pool, job_id).await?;
        if job.status.is_active() {
            db::batch_job::finish(&self.pool, job_id, JobStatus::Cancelled).await?;
            return Ok(());
        }
        Err(ApiError::Validation(format!(
            "job {job_id} is not active (status: {})",
            job.status
        )))
    }

    async fn resolve_candidates(&self, request: &RolloutRequest) -> ApiResult<Vec<Router>> {
        match &request.router_ids {
            // Explicit selection; unknown ids are skipped.
            Some(ids) => Ok(db::router::find_by_ids(&self.pool, ids).await?),
            None => {
                let mut routers =
                    db::router::get_by_status(&self.pool, RouterStatus::UpdateAvailable).await?;
                if request.include_errors {
                    routers
                        .extend(db::router::get_by_status(&self.pool, RouterStatus::Error).await?);
                    routers.extend(
                        db::router::get_by_status(&self.pool, RouterStatus::Unreachable).await?,
                    );
                }
                Ok(routers)
            }
        }
    }

    /// The background body of one rollout: consecutive windows of
    /// `batch_size` routers, fully parallel within a window, with a
    /// cancellable wall-clock pause between windows.
    async fn run_job(
        self: Arc<Self>,
        job_id: &str,
        routers: Vec<Router>,
        batch_size: usize,
        abort: Arc<AtomicBool>,
    ) {
        let total = routers.len();
        let total_batches = total.div_ceil(batch_size) as u32;
        let wait_minutes = match db::settings::get_batch_wait_minutes(&self.pool).await {
            Ok(minutes) => minutes,
            Err(e) => {
                tracing::warn!(error = %e, "could not read batch wait setting; not pausing");
                0
            }
        };

        self.emit(
            job_id,
            UpdateEventType::JobStarted,
            EventData {
                total: Some(total as i64),
                message: Some(format!("Updating {total} routers in {total_batches} batches")),
                ..Default::default()
            },
        );

        let mut completed = 0i64;
        let mut failed = 0i64;
        for (index, window) in routers.chunks(batch_size).enumerate() {
            if abort.load(Ordering::SeqCst) {
                break;
            }
            let batch_number = index as u32 + 1;
            self.emit(
                job_id,
                UpdateEventType::BatchStarted,
                EventData {
                    batch_number: Some(batch_number),
                    total_batches: Some(total_batches),
                    total: Some(window.len() as i64),
                    ..Default::default()
                },
            );

            // No intra-batch ordering: every router in the window runs its
            // own pipeline to completion.
            let results = join_all(window.iter().map(|r| self.update_router(job_id, r))).await;
            for result in results {
                match result {
                    Ok(()) => completed += 1,
                    Err(()) => failed += 1,
                }
            }

            if let Err(e) = db::batch_job::update_counts(&self.pool, job_id, completed, failed).await
            {
                tracing::error!(job_id, error = %e, "persisting batch counts failed");
            }
            self.emit(
                job_id,
                UpdateEventType::BatchCompleted,
                EventData {
                    batch_number: Some(batch_number),
                    total_batches: Some(total_batches),
                    completed: Some(completed),
                    failed: Some(failed),
                    ..Default::default()
                },
            );
            self.emit(
                job_id,
                UpdateEventType::JobProgress,
                EventData {
                    progress: Some(percent((completed + failed) as usize, total)),
                    completed: Some(completed),
                    failed: Some(failed),
                    total: Some(total as i64),
                    ..Default::default()
                },
            );

            if batch_number < total_batches && !abort.load(Ordering::SeqCst) {
                self.pause_between_batches(job_id, wait_minutes, &abort).await;
            }
        }

        let cancelled = abort.load(Ordering::SeqCst);
        let status = if cancelled {
            JobStatus::Cancelled
        } else {
            JobStatus::Completed
        };
        if let Err(e) = db::batch_job::finish(&self.pool, job_id, status).await {
            tracing::error!(job_id, error = %e, "persisting job completion failed");
        }
        tracing::info!(job_id, %status, completed, failed, "rollout finished");
        self.emit(
            job_id,
            UpdateEventType::JobCompleted,
            EventData {
                status: Some(status.to_string()),
                completed: Some(completed),
                failed: Some(failed),
                total: Some(total as i64),
                ..Default::default()
            },
        );

        self.active.remove(job_id);
        self.bus.cleanup(job_id);
    }

    /// Minute-granular pause between batches so the access network can
    /// reconverge after a window of reboots. Emits a countdown event each
    /// minute; a cancel request becomes visible within one minute.
    async fn pause_between_batches(&self, job_id: &str, minutes: u64, abort: &AtomicBool) {
        for remaining in (1..=minutes).rev() {
            if abort.load(Ordering::SeqCst) {
                return;
            }
            self.emit(
                job_id,
                UpdateEventType::BatchWaiting,
                EventData {
                    wait_time_remaining: Some(remaining),
                    message: Some(format!("Waiting {remaining} minute(s) before next batch")),
                    ..Default::default()
                },
            );
            tokio::time::sleep(MINUTE).await;
        }
    }

    /// One router's update attempt, from history row to terminal status.
    /// Never propagates an error upward; the outcome is recorded in the
    /// store and on the event stream.
    async fn update_router(&self, job_id: &str, router: &Router) -> Result<(), ()> {
        let history = match db::update_history::insert_running(
            &self.pool,
            &router.id,
            router.current_firmware.as_deref(),
        )
        .await
        {
            Ok(history) => history,
            Err(e) => {
                tracing::error!(router_id = %router.id, error = %e, "opening history record failed");
                return Err(());
            }
        };
        if let Err(e) =
            db::router::update_status(&self.pool, &router.id, RouterStatus::Updating).await
        {
            tracing::error!(router_id = %router.id, error = %e, "taking router lease failed");
        }
        self.emit(
            job_id,
            UpdateEventType::RouterStarted,
            EventData {
                firmware_before: router.current_firmware.clone(),
                message: Some("Starting firmware update".to_string()),
                ..EventData::for_router(router)
            },
        );

        match self.run_pipeline(job_id, router).await {
            Ok(new_version) => {
                if let Err(e) = db::update_history::complete(
                    &self.pool,
                    &history.id,
                    HistoryStatus::Success,
                    Some(&new_version),
                    None,
                )
                .await
                {
                    tracing::error!(router_id = %router.id, error = %e, "closing history record failed");
                }
                if let Err(e) = db::router::update_firmware_info(
                    &self.pool,
                    &router.id,
                    Some(&new_version),
                    None,
                    RouterStatus::UpToDate,
                )
                .await
                {
                    tracing::error!(router_id = %router.id, error = %e, "persisting update success failed");
                }
                tracing::info!(router_id = %router.id, version = %new_version, "router updated");
                self.emit(
                    job_id,
                    UpdateEventType::RouterCompleted,
                    EventData {
                        firmware_before: router.current_firmware.clone(),
                        firmware_after: Some(new_version),
                        status: Some(UpdateStage::Verified.to_string()),
                        ..EventData::for_router(router)
                    },
                );
                Ok(())
            }
            Err(failure) => {
                let message = failure.to_string();
                if let Err(e) = db::update_history::complete(
                    &self.pool,
                    &history.id,
                    HistoryStatus::Failed,
                    None,
                    Some(&message),
                )
                .await
                {
                    tracing::error!(router_id = %router.id, error = %e, "closing history record failed");
                }
                if let Err(e) =
                    db::router::update_status(&self.pool, &router.id, RouterStatus::Error).await
                {
                    tracing::error!(router_id = %router.id, error = %e, "persisting update failure failed");
                }
                tracing::warn!(router_id = %router.id, error = %message, "router update failed");
                self.emit(
                    job_id,
                    UpdateEventType::RouterFailed,
                    EventData {
                        error: Some(message),
                        status: Some(UpdateStage::Failed.to_string()),
                        ..EventData::for_router(router)
                    },
                );
                Err(())
            }
        }
    }

    /// The staged pipeline: download, verify, flash, wait out the reboot,
    /// re-identify the device.
    async fn run_pipeline(&self, job_id: &str, router: &Router) -> Result<String, UpdateFailure> {
        let probe = FotaProbe::new(self.runner.clone());

        self.emit(
            job_id,
            UpdateEventType::RouterProgress,
            EventData {
                status: Some(UpdateStage::Downloading.to_string()),
                message: Some("Downloading firmware image".to_string()),
                ..EventData::for_router(router)
            },
        );

        let global = db::settings::get_global_credentials(&self.pool).await?;
        let credentials = router
            .effective_credentials(&global)
            .ok_or(UpdateFailure::NoCredentials)?;
        let target = SessionTarget::new(
            router.ip_address.clone(),
            credentials.username,
            credentials.password,
        );

        // A previous attempt may have left the image behind already.
        if !probe.image_present(&target).await && !probe.download_image(&target).await {
            return Err(UpdateFailure::Download);
        }

        if !probe.verify_image(&target).await {
            return Err(UpdateFailure::Verify);
        }

        probe.apply_image(&target).await.map_err(UpdateFailure::Flash)?;

        self.emit(
            job_id,
            UpdateEventType::RouterProgress,
            EventData {
                status: Some(UpdateStage::Rebooting.to_string()),
                message: Some("Flash submitted, waiting for reboot".to_string()),
                ..EventData::for_router(router)
            },
        );

        self.await_reboot(&probe, &target, router.available_firmware.as_deref())
            .await
            .ok_or(UpdateFailure::RebootTimeout)
    }

    /// Polls the version file until the device answers again. When the
    /// rollout knows which version it flashed, only that version counts as
    /// having come back.
    async fn await_reboot(
        &self,
        probe: &FotaProbe,
        target: &SessionTarget,
        expected: Option<&str>,
    ) -> Option<String> {
        for attempt in 1..=REBOOT_POLL_ATTEMPTS {
            tokio::time::sleep(REBOOT_POLL_INTERVAL).await;
            match probe.current_version(target).await {
                Ok(Some(version)) => match expected {
                    Some(expected) if version != expected => {
                        tracing::debug!(
                            host = %target.host,
                            attempt,
                            %version,
                            expected,
                            "device answered with unexpected version; continuing to poll"
                        );
                    }
                    _ => return Some(version),
                },
                Ok(None) => {}
                Err(e) => {
                    tracing::trace!(host = %target.host, attempt, error = %e, "reboot poll failed");
                }
            }
        }
        None
    }

    fn emit(&self, job_id: &str, event_type: UpdateEventType, data: EventData) {
        self.bus.emit(UpdateEvent::new(event_type, job_id, data));
    }
}
