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
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{Display, EnumString};

/// Outcome of a single update attempt.
///
/// Invariant: `completed_at` on the record is set iff the status is not
/// `Running`, and `firmware_after` is set only on `Success`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum HistoryStatus {
    Running,
    Success,
    Failed,
}

/// One update attempt for one router within one rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UpdateHistoryRecord {
    pub id: String,
    pub router_id: String,
    pub firmware_before: Option<String>,
    pub firmware_after: Option<String>,
    pub status: HistoryStatus,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// History row joined with the router's display identity, for the operator
/// "recent activity" listing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HistoryWithRouter {
    pub id: String,
    pub router_id: String,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub firmware_before: Option<String>,
    pub firmware_after: Option<String>,
    pub status: HistoryStatus,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
