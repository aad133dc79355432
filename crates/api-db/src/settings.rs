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
use model::settings::{self, GlobalCredentials};
use sqlx::SqlitePool;

use crate::{DatabaseError, DatabaseResult};

pub async fn get(pool: &SqlitePool, key: &str) -> DatabaseResult<Option<String>> {
    let query = "SELECT value FROM settings WHERE key=$1";
    let row: Option<(String,)> = sqlx::query_as(query)
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(row.map(|(value,)| value))
}

pub async fn set(pool: &SqlitePool, key: &str, value: &str) -> DatabaseResult<()> {
    let query = "INSERT INTO settings (key, value, updated_at) VALUES ($1, $2, $3)
        ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at";
    sqlx::query(query)
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    Ok(())
}

pub async fn get_global_credentials(pool: &SqlitePool) -> DatabaseResult<GlobalCredentials> {
    Ok(GlobalCredentials {
        username: get(pool, settings::GLOBAL_USERNAME).await?,
        password: get(pool, settings::GLOBAL_PASSWORD).await?,
    })
}

pub async fn set_global_credentials(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> DatabaseResult<()> {
    set(pool, settings::GLOBAL_USERNAME, username).await?;
    set(pool, settings::GLOBAL_PASSWORD, password).await?;
    Ok(())
}

/// Minutes to pause between rollout batches. Unset or unparseable values
/// fall back to the default.
pub async fn get_batch_wait_minutes(pool: &SqlitePool) -> DatabaseResult<u64> {
    let raw = get(pool, settings::BATCH_WAIT_MINUTES).await?;
    Ok(raw
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(settings::DEFAULT_BATCH_WAIT_MINUTES))
}

pub async fn set_batch_wait_minutes(pool: &SqlitePool, minutes: u64) -> DatabaseResult<()> {
    set(pool, settings::BATCH_WAIT_MINUTES, &minutes.to_string()).await
}
