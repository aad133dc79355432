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

//! Thin HTTP shell over the store and the engines. All domain decisions
//! live below; handlers validate input and translate errors to statuses.

mod events;

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use model::firmware::{self, FirmwareVersion};
use model::history::{HistoryWithRouter, UpdateHistoryRecord};
use model::job::BatchJob;
use model::router::NewRouter;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::rollout::RolloutRequest;
use crate::state::AppState;
use crate::{ApiError, ApiResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/routers",
            get(list_routers).post(create_router).delete(delete_routers),
        )
        .route("/api/routers/stats", get(router_stats))
        .route("/api/routers/import", post(import_routers))
        .route("/api/scan", post(start_scan))
        .route(
            "/api/settings/credentials",
            get(get_credentials).put(set_credentials),
        )
        .route(
            "/api/settings/batch-wait",
            get(get_batch_wait).put(set_batch_wait),
        )
        .route(
            "/api/firmware-versions",
            get(list_firmware_versions).post(upsert_firmware_version),
        )
        .route(
            "/api/firmware-versions/{prefix}",
            axum::routing::delete(delete_firmware_version),
        )
        .route("/api/rollouts", get(list_rollouts).post(start_rollout))
        .route("/api/rollouts/{id}", get(get_rollout))
        .route("/api/rollouts/{id}/cancel", post(cancel_rollout))
        .route("/api/history", get(get_history))
        .route("/api/events", get(events::stream))
        .with_state(state)
}

// MARK: - Inventory

async fn list_routers(State(state): State<AppState>) -> ApiResult<Json<Vec<model::router::Router>>> {
    Ok(Json(db::router::get_all(&state.pool).await?))
}

async fn router_stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let counts = db::router::count_by_status(&state.pool).await?;
    let total: i64 = counts.iter().map(|(_, count)| count).sum();
    let by_status: HashMap<String, i64> = counts
        .into_iter()
        .map(|(status, count)| (status.to_string(), count))
        .collect();
    Ok(Json(json!({ "total": total, "byStatus": by_status })))
}

fn validate_router(record: &NewRouter) -> ApiResult<()> {
    if record.device_name.trim().is_empty() {
        return Err(ApiError::Validation("device_name must not be empty".to_string()));
    }
    if record.ip_address.parse::<std::net::Ipv4Addr>().is_err() {
        return Err(ApiError::Validation(format!(
            "ip_address is not a dotted quad: {}",
            record.ip_address
        )));
    }
    Ok(())
}

async fn create_router(
    State(state): State<AppState>,
    Json(record): Json<NewRouter>,
) -> ApiResult<Json<model::router::Router>> {
    validate_router(&record)?;
    Ok(Json(db::router::insert_one(&state.pool, &record).await?))
}

/// Bulk upsert of validated inventory records, one transaction.
async fn import_routers(
    State(state): State<AppState>,
    Json(records): Json<Vec<NewRouter>>,
) -> ApiResult<Json<Value>> {
    for record in &records {
        validate_router(record)?;
    }
    let imported = db::router::insert_many(&state.pool, &records).await?;
    Ok(Json(json!({ "imported": imported })))
}

async fn delete_routers(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let deleted = db::router::delete_all(&state.pool).await?;
    tracing::info!(deleted, "inventory deleted");
    Ok(Json(json!({ "deleted": deleted })))
}

// MARK: - Scan

#[derive(Debug, Default, Deserialize)]
struct ScanCommand {
    #[serde(default)]
    router_ids: Option<Vec<String>>,
}

/// Kicks off a firmware scan in the background; progress arrives on the
/// event stream under the `check` job id.
async fn start_scan(
    State(state): State<AppState>,
    body: Option<Json<ScanCommand>>,
) -> ApiResult<Json<Value>> {
    let Json(command) = body.unwrap_or_default();
    let scan = state.scan.clone();
    tokio::spawn(async move {
        match scan.scan(command.router_ids).await {
            Ok(summary) => tracing::info!(?summary, "scan completed"),
            Err(e) => tracing::error!(error = %e, "scan failed"),
        }
    });
    Ok(Json(json!({ "status": "started" })))
}

// MARK: - Settings

#[derive(Debug, Deserialize)]
struct CredentialsUpdate {
    username: String,
    password: String,
}

async fn get_credentials(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let credentials = db::settings::get_global_credentials(&state.pool).await?;
    // The password never leaves the store through this surface.
    Ok(Json(json!({
        "username": credentials.username,
        "passwordSet": credentials.password.is_some(),
    })))
}

async fn set_credentials(
    State(state): State<AppState>,
    Json(update): Json<CredentialsUpdate>,
) -> ApiResult<Json<Value>> {
    if update.username.trim().is_empty() {
        return Err(ApiError::Validation("username must not be empty".to_string()));
    }
    db::settings::set_global_credentials(&state.pool, &update.username, &update.password).await?;
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
struct BatchWaitUpdate {
    minutes: u64,
}

async fn get_batch_wait(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let minutes = db::settings::get_batch_wait_minutes(&state.pool).await?;
    Ok(Json(json!({ "minutes": minutes })))
}

async fn set_batch_wait(
    State(state): State<AppState>,
    Json(update): Json<BatchWaitUpdate>,
) -> ApiResult<Json<Value>> {
    db::settings::set_batch_wait_minutes(&state.pool, update.minutes).await?;
    Ok(Json(json!({ "minutes": update.minutes })))
}

// MARK: - Firmware version table

async fn list_firmware_versions(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<FirmwareVersion>>> {
    Ok(Json(db::firmware_version::get_all(&state.pool).await?))
}

#[derive(Debug, Deserialize)]
struct FirmwareVersionUpdate {
    device_prefix: String,
    latest_version: String,
}

async fn upsert_firmware_version(
    State(state): State<AppState>,
    Json(update): Json<FirmwareVersionUpdate>,
) -> ApiResult<Json<FirmwareVersion>> {
    if !firmware::is_valid_prefix(&update.device_prefix) {
        return Err(ApiError::Validation(format!(
            "device_prefix must be uppercase alphanumerics: {}",
            update.device_prefix
        )));
    }
    if !firmware::is_valid_version(&update.latest_version) {
        return Err(ApiError::Validation(format!(
            "latest_version must look like PREFIX_R_dd.dd.dd.dd: {}",
            update.latest_version
        )));
    }
    let entry =
        db::firmware_version::upsert(&state.pool, &update.device_prefix, &update.latest_version)
            .await?;
    Ok(Json(entry))
}

async fn delete_firmware_version(
    State(state): State<AppState>,
    Path(prefix): Path<String>,
) -> ApiResult<Json<Value>> {
    db::firmware_version::delete(&state.pool, &prefix).await?;
    Ok(Json(json!({ "deleted": prefix })))
}

// MARK: - Rollouts

async fn start_rollout(
    State(state): State<AppState>,
    Json(request): Json<RolloutRequest>,
) -> ApiResult<Json<BatchJob>> {
    Ok(Json(state.rollout.start(request).await?))
}

async fn list_rollouts(State(state): State<AppState>) -> ApiResult<Json<Vec<BatchJob>>> {
    Ok(Json(db::batch_job::get_all(&state.pool).await?))
}

async fn get_rollout(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<BatchJob>> {
    Ok(Json(db::batch_job::get_by_id(&state.pool, &id).await?))
}

async fn cancel_rollout(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.rollout.cancel(&id).await?;
    Ok(Json(json!({ "status": "cancelling", "jobId": id })))
}

// MARK: - History

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    router_id: Option<String>,
    limit: Option<i64>,
}

async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Value>> {
    let value = match query.router_id {
        Some(router_id) => {
            let records: Vec<UpdateHistoryRecord> =
                db::update_history::get_by_router(&state.pool, &router_id).await?;
            serde_json::to_value(records)
        }
        None => {
            let records: Vec<HistoryWithRouter> =
                db::update_history::get_recent(&state.pool, query.limit.unwrap_or(50)).await?;
            serde_json::to_value(records)
        }
    }
    .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(value))
}
