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
use model::router::{NewRouter, Router, RouterStatus};
use sqlx::SqlitePool;

use crate::{DatabaseError, DatabaseResult};

const ROUTER_COLUMNS: &str = "id, device_name, ip_address, username, password, \
     current_firmware, available_firmware, status, last_check, created_at, updated_at";

pub async fn get_all(pool: &SqlitePool) -> DatabaseResult<Vec<Router>> {
    let query = format!("SELECT {ROUTER_COLUMNS} FROM routers ORDER BY device_name, ip_address");
    sqlx::query_as::<_, Router>(&query)
        .fetch_all(pool)
        .await
        .map_err(|e| DatabaseError::query(&query, e))
}

pub async fn get_by_id(pool: &SqlitePool, id: &str) -> DatabaseResult<Router> {
    let query = format!("SELECT {ROUTER_COLUMNS} FROM routers WHERE id=$1");
    sqlx::query_as::<_, Router>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| DatabaseError::query(&query, e))?
        .ok_or_else(|| DatabaseError::NotFoundError {
            kind: "Router",
            id: id.to_string(),
        })
}

/// Loads the given routers, silently skipping ids that do not exist.
pub async fn find_by_ids(pool: &SqlitePool, ids: &[String]) -> DatabaseResult<Vec<Router>> {
    let mut routers = Vec::with_capacity(ids.len());
    for id in ids {
        match get_by_id(pool, id).await {
            Ok(router) => routers.push(router),
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(routers)
}

pub async fn get_by_status(
    pool: &SqlitePool,
    status: RouterStatus,
) -> DatabaseResult<Vec<Router>> {
    let query = format!("SELECT {ROUTER_COLUMNS} FROM routers WHERE status=$1 ORDER BY device_name");
    sqlx::query_as::<_, Router>(&query)
        .bind(status)
        .fetch_all(pool)
        .await
        .map_err(|e| DatabaseError::query(&query, e))
}

pub async fn insert_one(pool: &SqlitePool, record: &NewRouter) -> DatabaseResult<Router> {
    let query = "INSERT INTO routers (id, device_name, ip_address, username, password, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";
    let id = record
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let now = Utc::now();
    sqlx::query(query)
        .bind(&id)
        .bind(&record.device_name)
        .bind(&record.ip_address)
        .bind(&record.username)
        .bind(&record.password)
        .bind(RouterStatus::Unknown)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;

    get_by_id(pool, &id).await
}

/// Bulk upsert in a single transaction, keyed by router id. Running the same
/// batch twice leaves the table in the same state.
pub async fn insert_many(pool: &SqlitePool, records: &[NewRouter]) -> DatabaseResult<usize> {
    let query = "INSERT INTO routers (id, device_name, ip_address, username, password, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT(id) DO UPDATE SET
            device_name=excluded.device_name,
            ip_address=excluded.ip_address,
            username=excluded.username,
            password=excluded.password,
            updated_at=excluded.updated_at";

    let mut txn = pool.begin().await.map_err(DatabaseError::acquire)?;
    for record in records {
        let id = record
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = Utc::now();
        sqlx::query(query)
            .bind(&id)
            .bind(&record.device_name)
            .bind(&record.ip_address)
            .bind(&record.username)
            .bind(&record.password)
            .bind(RouterStatus::Unknown)
            .bind(now)
            .bind(now)
            .execute(&mut *txn)
            .await
            .map_err(|e| DatabaseError::query(query, e))?;
    }
    txn.commit().await.map_err(DatabaseError::acquire)?;
    Ok(records.len())
}

/// Persists the result of a firmware probe: versions, derived status and the
/// check timestamp.
pub async fn update_firmware_info(
    pool: &SqlitePool,
    id: &str,
    current_firmware: Option<&str>,
    available_firmware: Option<&str>,
    status: RouterStatus,
) -> DatabaseResult<()> {
    let query = "UPDATE routers
        SET current_firmware=$1, available_firmware=$2, status=$3, last_check=$4, updated_at=$5
        WHERE id=$6";
    let now = Utc::now();
    let result = sqlx::query(query)
        .bind(current_firmware)
        .bind(available_firmware)
        .bind(status)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFoundError {
            kind: "Router",
            id: id.to_string(),
        });
    }
    Ok(())
}

pub async fn update_status(
    pool: &SqlitePool,
    id: &str,
    status: RouterStatus,
) -> DatabaseResult<()> {
    let query = "UPDATE routers SET status=$1, updated_at=$2 WHERE id=$3";
    let result = sqlx::query(query)
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFoundError {
            kind: "Router",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Flips every router in `from` status to `to`. Returns the number touched.
/// Used by startup reconciliation to clear leases owned by a dead process.
pub async fn reconcile_status(
    pool: &SqlitePool,
    from: RouterStatus,
    to: RouterStatus,
) -> DatabaseResult<u64> {
    let query = "UPDATE routers SET status=$1, updated_at=$2 WHERE status=$3";
    let result = sqlx::query(query)
        .bind(to)
        .bind(Utc::now())
        .bind(from)
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(result.rows_affected())
}

/// Removes the whole inventory. Update history rows referencing the deleted
/// routers are removed in the same transaction.
pub async fn delete_all(pool: &SqlitePool) -> DatabaseResult<u64> {
    let mut txn = pool.begin().await.map_err(DatabaseError::acquire)?;
    let history_query = "DELETE FROM update_history";
    sqlx::query(history_query)
        .execute(&mut *txn)
        .await
        .map_err(|e| DatabaseError::query(history_query, e))?;
    let query = "DELETE FROM routers";
    let result = sqlx::query(query)
        .execute(&mut *txn)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    txn.commit().await.map_err(DatabaseError::acquire)?;
    Ok(result.rows_affected())
}

pub async fn count_by_status(
    pool: &SqlitePool,
) -> DatabaseResult<Vec<(RouterStatus, i64)>> {
    let query = "SELECT status, COUNT(*) FROM routers GROUP BY status";
    sqlx::query_as::<_, (RouterStatus, i64)>(query)
        .fetch_all(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}
