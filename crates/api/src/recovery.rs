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
use model::router::RouterStatus;
use sqlx::SqlitePool;

use crate::ApiResult;

/// Reconciles state left behind by a previous process. The abort registry is
/// in-memory, so a job that was pending or running cannot resume: it is
/// cancelled, its routers lose their `updating` lease, and its open history
/// records are failed.
pub async fn reconcile(pool: &SqlitePool) -> ApiResult<()> {
    let failed_records = db::update_history::fail_all_running(pool, "process restarted").await?;
    let reconciled_routers =
        db::router::reconcile_status(pool, RouterStatus::Updating, RouterStatus::Error).await?;
    let cancelled_jobs = db::batch_job::cancel_all_active(pool).await?;

    if failed_records > 0 || reconciled_routers > 0 || cancelled_jobs > 0 {
        tracing::warn!(
            cancelled_jobs,
            reconciled_routers,
            failed_records,
            "reconciled state from an interrupted rollout"
        );
    }
    Ok(())
}
