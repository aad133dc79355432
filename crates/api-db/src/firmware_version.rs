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
use std::collections::HashMap;

use chrono::Utc;
use model::firmware::FirmwareVersion;
use sqlx::SqlitePool;

use crate::{DatabaseError, DatabaseResult};

pub async fn get_all(pool: &SqlitePool) -> DatabaseResult<Vec<FirmwareVersion>> {
    let query = "SELECT device_prefix, latest_version, updated_at
        FROM firmware_versions ORDER BY device_prefix";
    sqlx::query_as::<_, FirmwareVersion>(query)
        .fetch_all(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

pub async fn get_by_prefix(
    pool: &SqlitePool,
    device_prefix: &str,
) -> DatabaseResult<Option<FirmwareVersion>> {
    let query = "SELECT device_prefix, latest_version, updated_at
        FROM firmware_versions WHERE device_prefix=$1";
    sqlx::query_as::<_, FirmwareVersion>(query)
        .bind(device_prefix)
        .fetch_optional(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))
}

/// Inserts or replaces the latest-known version for a device family.
pub async fn upsert(
    pool: &SqlitePool,
    device_prefix: &str,
    latest_version: &str,
) -> DatabaseResult<FirmwareVersion> {
    let query = "INSERT INTO firmware_versions (device_prefix, latest_version, updated_at)
        VALUES ($1, $2, $3)
        ON CONFLICT(device_prefix) DO UPDATE SET
            latest_version=excluded.latest_version,
            updated_at=excluded.updated_at";
    sqlx::query(query)
        .bind(device_prefix)
        .bind(latest_version)
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    get_by_prefix(pool, device_prefix)
        .await?
        .ok_or_else(|| DatabaseError::internal("upserted firmware version vanished".to_string()))
}

pub async fn delete(pool: &SqlitePool, device_prefix: &str) -> DatabaseResult<()> {
    let query = "DELETE FROM firmware_versions WHERE device_prefix=$1";
    let result = sqlx::query(query)
        .bind(device_prefix)
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::query(query, e))?;
    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFoundError {
            kind: "FirmwareVersion",
            id: device_prefix.to_string(),
        });
    }
    Ok(())
}

/// The whole table as a prefix -> latest-version map, the shape the version
/// policy consumes.
pub async fn latest_by_prefix(pool: &SqlitePool) -> DatabaseResult<HashMap<String, String>> {
    Ok(get_all(pool)
        .await?
        .into_iter()
        .map(|v| (v.device_prefix, v.latest_version))
        .collect())
}
