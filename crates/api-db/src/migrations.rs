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
use sqlx::SqlitePool;

use crate::{DatabaseError, DatabaseResult};

/// Schema bootstrap. Every statement is `IF NOT EXISTS` so running this on
/// an already-initialized database is a no-op.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS routers (
        id TEXT PRIMARY KEY,
        device_name TEXT NOT NULL,
        ip_address TEXT NOT NULL UNIQUE,
        username TEXT,
        password TEXT,
        current_firmware TEXT,
        available_firmware TEXT,
        status TEXT NOT NULL DEFAULT 'unknown',
        last_check TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_routers_status ON routers(status)",
    "CREATE TABLE IF NOT EXISTS update_history (
        id TEXT PRIMARY KEY,
        router_id TEXT NOT NULL,
        firmware_before TEXT,
        firmware_after TEXT,
        status TEXT NOT NULL,
        error_message TEXT,
        started_at TEXT NOT NULL,
        completed_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_update_history_router_id ON update_history(router_id)",
    "CREATE TABLE IF NOT EXISTS batch_jobs (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        batch_size INTEGER NOT NULL,
        total_routers INTEGER NOT NULL,
        completed_routers INTEGER NOT NULL DEFAULT 0,
        failed_routers INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_batch_jobs_status ON batch_jobs(status)",
    "CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS firmware_versions (
        device_prefix TEXT PRIMARY KEY,
        latest_version TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

pub async fn ensure_schema(pool: &SqlitePool) -> DatabaseResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::query(statement, e))?;
    }
    Ok(())
}
