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
use chrono::Utc;
use model::history::{HistoryStatus, HistoryWithRouter, UpdateHistoryRecord};
use sqlx::SqlitePool;

use crate::{DatabaseError, DatabaseResult};

const HISTORY_COLUMNS: &str = "id, router_id, firmware_before, firmware_after, status, \
     error_message, started_at, completed_at";

/// Opens a new attempt record in `running` state.
pub async fn insert_running(
    pool: &SqlitePool,
    router_id: &str,
    firmware_before: Option<&str>,
) -> DatabaseResult<UpdateHistoryRecord> {
    let query = "INSERT INTO update_history (id, router_id, firmware_before, status, started_at)
        VALUES ($1, $2, $3, $4, $5)";
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(query)
        .bind(&id)
        .bind(router_id)
        .bind(firmware_before)
        .bind(HistoryStatus::Running)
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    get_by_id(pool, &id).await
}

pub async fn get_by_id(pool: &SqlitePool, id: &str) -> DatabaseResult<UpdateHistoryRecord> {
    let query = format!("SELECT {HISTORY_COLUMNS} FROM update_history WHERE id=$1");
    sqlx::query_as::<_, UpdateHistoryRecord>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| DatabaseError::query(&query, e))?
        .ok_or_else(|| DatabaseError::NotFoundError {
            kind: "UpdateHistoryRecord",
            id: id.to_string(),
        })
}

pub async fn get_by_router(
    pool: &SqlitePool,
    router_id: &str,
) -> DatabaseResult<Vec<UpdateHistoryRecord>> {
    let query =
        format!("SELECT {HISTORY_COLUMNS} FROM update_history WHERE router_id=$1 ORDER BY started_at DESC");
    sqlx::query_as::<_, UpdateHistoryRecord>(&query)
        .bind(router_id)
        .fetch_all(pool)
        .await
        .map_err(|e| DatabaseError::query(&query, e))
}

/// The most recent attempts across the fleet, joined with each router's
/// display identity.
pub async fn get_recent(pool: &SqlitePool, limit: i64) -> DatabaseResult<Vec<HistoryWithRouter>> {
    let query = "SELECT h.id, h.router_id, r.device_name, r.ip_address,
            h.firmware_before, h.firmware_after, h.status, h.error_message,
            h.started_at, h.completed_at
        FROM update_history h
        LEFT JOIN routers r ON r.id = h.router_id
        ORDER BY h.started_at DESC
        LIMIT $1";
    sqlx::query_as::<_, HistoryWithRouter>(query)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// Closes an attempt: terminal status, optional new firmware and error text,
/// completion timestamp.
pub async fn complete(
    pool: &SqlitePool,
    id: &str,
    status: HistoryStatus,
    firmware_after: Option<&str>,
    error_message: Option<&str>,
) -> DatabaseResult<()> {
    let query = "UPDATE update_history
        SET status=$1, firmware_after=$2, error_message=$3, completed_at=$4
        WHERE id=$5";
    let result = sqlx::query(query)
        .bind(status)
        .bind(firmware_after)
        .bind(error_message)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFoundError {
            kind: "UpdateHistoryRecord",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Fails every record still marked `running`. Used by startup reconciliation:
/// a running record can only belong to a process that no longer exists.
pub async fn fail_all_running(pool: &SqlitePool, error_message: &str) -> DatabaseResult<u64> {
    let query = "UPDATE update_history
        SET status=$1, error_message=$2, completed_at=$3
        WHERE status=$4";
    let result = sqlx::query(query)
        .bind(HistoryStatus::Failed)
        .bind(error_message)
        .bind(Utc::now())
        .bind(HistoryStatus::Running)
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(result.rows_affected())
}
