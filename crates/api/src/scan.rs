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

//! Concurrent firmware-state scan over the inventory.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use model::event::{EventData, UpdateEvent, UpdateEventType};
use model::router::{Router, RouterStatus};
use model::settings::GlobalCredentials;
use serde::Serialize;
use sqlx::SqlitePool;
use ssh::{CommandRunner, SessionTarget};

use crate::ApiResult;
use crate::events::EventBus;
use crate::fota::FotaProbe;

/// Synthetic job id under which every scan publishes its events.
pub const SCAN_JOB_ID: &str = "check";

/// Routers probed fully in parallel before the next slice starts.
const SCAN_CHUNK_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub total: usize,
    pub update_available: usize,
    pub up_to_date: usize,
    pub failed: usize,
}

pub struct ScanEngine {
    pool: SqlitePool,
    runner: Arc<dyn CommandRunner>,
    bus: Arc<EventBus>,
}

impl ScanEngine {
    pub fn new(pool: SqlitePool, runner: Arc<dyn CommandRunner>, bus: Arc<EventBus>) -> Self {
        ScanEngine { pool, runner, bus }
    }

    /// Probes the selected routers (all of them when `router_ids` is absent)
    /// in chunks of [`SCAN_CHUNK_SIZE`], persisting firmware state and
    /// emitting scan events as it goes. Routers currently being updated by a
    /// rollout are left alone.
    pub async fn scan(&self, router_ids: Option<Vec<String>>) -> ApiResult<ScanSummary> {
        let routers = match router_ids {
            Some(ids) => db::router::find_by_ids(&self.pool, &ids).await?,
            None => db::router::get_all(&self.pool).await?,
        };
        let routers: Vec<Router> = routers
            .into_iter()
            .filter(|r| r.status != RouterStatus::Updating)
            .collect();

        let global = db::settings::get_global_credentials(&self.pool).await?;
        let catalog = db::firmware_version::latest_by_prefix(&self.pool).await?;

        let total = routers.len();
        let total_batches = total.div_ceil(SCAN_CHUNK_SIZE) as u32;
        tracing::info!(total, "starting firmware scan");
        self.emit(
            UpdateEventType::JobStarted,
            EventData {
                total: Some(total as i64),
                message: Some(format!("Checking firmware on {total} routers")),
                ..Default::default()
            },
        );

        let mut summary = ScanSummary {
            total,
            ..Default::default()
        };
        let mut done = 0usize;
        for (index, chunk) in routers.chunks(SCAN_CHUNK_SIZE).enumerate() {
            self.emit(
                UpdateEventType::BatchStarted,
                EventData {
                    batch_number: Some(index as u32 + 1),
                    total_batches: Some(total_batches),
                    total: Some(chunk.len() as i64),
                    ..Default::default()
                },
            );

            let outcomes =
                join_all(chunk.iter().map(|r| self.scan_router(r, &global, &catalog))).await;
            for outcome in outcomes {
                match outcome {
                    RouterStatus::UpdateAvailable => summary.update_available += 1,
                    RouterStatus::UpToDate => summary.up_to_date += 1,
                    _ => summary.failed += 1,
                }
            }

            done += chunk.len();
            self.emit(
                UpdateEventType::JobProgress,
                EventData {
                    progress: Some(percent(done, total)),
                    completed: Some(done as i64),
                    total: Some(total as i64),
                    ..Default::default()
                },
            );
        }

        tracing::info!(?summary, "firmware scan finished");
        self.emit(
            UpdateEventType::JobCompleted,
            EventData {
                total: Some(total as i64),
                completed: Some((summary.update_available + summary.up_to_date) as i64),
                failed: Some(summary.failed as i64),
                message: Some(format!(
                    "Scan finished: {} update(s) available",
                    summary.update_available
                )),
                ..Default::default()
            },
        );
        Ok(summary)
    }

    /// Probes one router and persists the outcome. Returns the status that
    /// was written.
    async fn scan_router(
        &self,
        router: &Router,
        global: &GlobalCredentials,
        catalog: &HashMap<String, String>,
    ) -> RouterStatus {
        let probe = FotaProbe::new(self.runner.clone());

        let Some(credentials) = router.effective_credentials(global) else {
            return self
                .fail_router(router, RouterStatus::Error, "No credentials configured")
                .await;
        };
        let target = SessionTarget::new(
            router.ip_address.clone(),
            credentials.username,
            credentials.password,
        );

        if !probe.ping(&target).await {
            return self
                .fail_router(router, RouterStatus::Unreachable, "Router is unreachable")
                .await;
        }

        let info = match probe.device_info(&target).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(router_id = %router.id, error = %e, "firmware probe failed");
                return self.fail_router(router, RouterStatus::Error, &e.to_string()).await;
            }
        };

        // The agent knows best; the operator-maintained version table covers
        // devices whose agent reports nothing.
        let (available, update_available) = if info.update_available {
            (info.available.clone(), true)
        } else {
            match info.current.as_deref() {
                Some(current) => {
                    let outcome = model::firmware::evaluate(current, catalog);
                    if outcome.available {
                        (outcome.latest_version, true)
                    } else {
                        (None, false)
                    }
                }
                None => (None, false),
            }
        };

        let status = if update_available {
            RouterStatus::UpdateAvailable
        } else {
            RouterStatus::UpToDate
        };
        if let Err(e) = db::router::update_firmware_info(
            &self.pool,
            &router.id,
            info.current.as_deref(),
            available.as_deref(),
            status,
        )
        .await
        {
            tracing::error!(router_id = %router.id, error = %e, "persisting scan result failed");
            return self.fail_router(router, RouterStatus::Error, "Failed to persist scan result").await;
        }

        if update_available {
            self.emit(
                UpdateEventType::RouterProgress,
                EventData {
                    status: Some(status.to_string()),
                    message: available.map(|v| format!("Update available: {v}")),
                    ..EventData::for_router(router)
                },
            );
        } else {
            self.emit(
                UpdateEventType::RouterCompleted,
                EventData {
                    status: Some(status.to_string()),
                    message: Some("Firmware is up to date".to_string()),
                    firmware_after: info.current,
                    ..EventData::for_router(router)
                },
            );
        }
        status
    }

    /// Persists a failure status and emits the matching `router_failed`.
    async fn fail_router(&self, router: &Router, status: RouterStatus, error: &str) -> RouterStatus {
        if let Err(e) = db::router::update_status(&self.pool, &router.id, status).await {
            tracing::error!(router_id = %router.id, error = %e, "persisting scan failure failed");
        }
        self.emit(
            UpdateEventType::RouterFailed,
            EventData {
                status: Some(status.to_string()),
                error: Some(error.to_string()),
                ..EventData::for_router(router)
            },
        );
        status
    }

    fn emit(&self, event_type: UpdateEventType, data: EventData) {
        self.bus.emit(UpdateEvent::new(event_type, SCAN_JOB_ID, data));
    }
}

pub(crate) fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done as f64 / total as f64) * 100.0).round() as u8
}
