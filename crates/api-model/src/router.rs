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

use crate::settings::{Credentials, GlobalCredentials};

/// Lifecycle status of a managed router.
///
/// `Updating` is owned by the rollout engine: it is set when a rollout takes
/// the router and cleared when the attempt reaches a terminal state. Any
/// `Updating` router found at process start belongs to a dead rollout and is
/// reconciled to `Error`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RouterStatus {
    #[default]
    Unknown,
    UpToDate,
    UpdateAvailable,
    Updating,
    Unreachable,
    Error,
}

/// One managed device in the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Router {
    pub id: String,
    pub device_name: String,
    /// Dotted-quad management address. Unique across the inventory.
    pub ip_address: String,
    /// Per-device login. Falls back to the global credentials when unset.
    pub username: Option<String>,
    /// Never serialized outward; credentials stay inside the store.
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    pub current_firmware: Option<String>,
    pub available_firmware: Option<String>,
    pub status: RouterStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Router {
    /// Resolves the credentials to use for this router: the per-device
    /// override when both parts are present, otherwise the global pair.
    /// Returns None when neither yields a complete username/password.
    pub fn effective_credentials(&self, global: &GlobalCredentials) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) if !username.is_empty() => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => global.as_credentials(),
        }
    }
}

/// An inventory record as handed over by the (external) ingest path.
/// Records carrying an id are upserted; records without one get a fresh id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRouter {
    #[serde(default)]
    pub id: Option<String>,
    pub device_name: String,
    pub ip_address: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}
