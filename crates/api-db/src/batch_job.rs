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
use model::job::{BatchJob, JobStatus};
use sqlx::SqlitePool;

use crate::{DatabaseError, DatabaseResult};

const JOB_COLUMNS: &str = "id, status, batch_size, total_routers, completed_routers, \
     failed_routers, created_at, started_at, completed_at";

pub async fn insert(
    pool: &SqlitePool,
    batch_size: i64,
    total_routers: i64,
) -> DatabaseResult<BatchJob> {
    let query = "INSERT INTO batch_jobs (id, status, batch_size, total_routers, created_at)
        VALUES ($1, $2, $3, $4, $5)";
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(query)
        .bind(&id)
        .bind(JobStatus::Pending)
        .bind(batch_size)
        .bind(total_routers)
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    get_by_id(pool, &id).await
}

pub async fn get_by_id(pool: &SqlitePool, id: &str) -> DatabaseResult<BatchJob> {
    let query = format!("SELECT {JOB_COLUMNS} FROM batch_jobs WHERE id=$1");
    sqlx::query_as::<_, BatchJob>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| DatabaseError::query(&query, e))?
        .ok_or_else(|| DatabaseError::NotFoundError {
            kind: "BatchJob",
            id: id.to_string(),
        })
}

pub async fn get_all(pool: &SqlitePool) -> DatabaseResult<Vec<BatchJob>> {
    let query = format!("SELECT {JOB_COLUMNS} FROM batch_jobs ORDER BY created_at DESC");
    sqlx::query_as::<_, BatchJob>(&query)
        .fetch_all(pool)
        .await
        .map_err(|e| DatabaseError::query(&query, e))
}

/// The most recent job still holding the rollout engine, if any. By
/// invariant there is at most one; callers treat its presence as a lock.
pub async fn get_active(pool: &SqlitePool) -> DatabaseResult<Option<BatchJob>> {
    let query = format!(
        "SELECT {JOB_COLUMNS} FROM batch_jobs
         WHERE status IN ('pending', 'running')
         ORDER BY created_at DESC
         LIMIT 1"
    );
    sqlx::query_as::<_, BatchJob>(&query)
        .fetch_optional(pool)
        .await
        .map_err(|e| DatabaseError::query(&query, e))
}

pub async fn mark_running(pool: &SqlitePool, id: &str) -> DatabaseResult<()> {
    let query = "UPDATE batch_jobs SET status=$1, started_at=$2 WHERE id=$3";
    let result = sqlx::query(query)
        .bind(JobStatus::Running)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFoundError {
            kind: "BatchJob",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Persists cumulative per-batch progress on the job row.
pub async fn update_counts(
    pool: &SqlitePool,
    id: &str,
    completed_routers: i64,
    failed_routers: i64,
) -> DatabaseResult<()> {
    let query = "UPDATE batch_jobs SET completed_routers=$1, failed_routers=$2 WHERE id=$3";
    sqlx::query(query)
        .bind(completed_routers)
        .bind(failed_routers)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(())
}

/// Terminal transition: `completed` or `cancelled`, with completion time.
pub async fn finish(pool: &SqlitePool, id: &str, status: JobStatus) -> DatabaseResult<()> {
    let query = "UPDATE batch_jobs SET status=$1, completed_at=$2 WHERE id=$3";
    let result = sqlx::query(query)
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFoundError {
            kind: "BatchJob",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Cancels any job left pending/running by a previous process. The abort
/// registry is ephemeral, so such a job can never resume.
pub async fn cancel_all_active(pool: &SqlitePool) -> DatabaseResult<u64> {
    let query = "UPDATE batch_jobs SET status=$1, completed_at=$2
        WHERE status IN ('pending', 'running')";
    let result = sqlx::query(query)
        .bind(JobStatus::Cancelled)
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(result.rows_affected())
}
