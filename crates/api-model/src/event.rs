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
use strum_macros::{Display, EnumString};

use crate::router::Router;

/// Progress event kinds emitted by the scan and rollout engines.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UpdateEventType {
    JobStarted,
    JobProgress,
    JobCompleted,
    RouterStarted,
    RouterProgress,
    RouterCompleted,
    RouterFailed,
    BatchStarted,
    BatchCompleted,
    BatchWaiting,
}

/// Stages a router moves through during an update attempt. Carried in the
/// `status` field of `router_progress` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UpdateStage {
    Pending,
    Updating,
    Downloading,
    Verifying,
    Flashing,
    Rebooting,
    Verified,
    Failed,
}

/// Open-shaped payload carried by every event. Dashboards key off whichever
/// fields are present; absent fields are dropped from the wire JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Cumulative job percentage, rounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_batches: Option<u32>,
    /// Minutes left in the inter-batch pause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time_remaining: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl EventData {
    /// Seeds the payload with the router's identity fields.
    pub fn for_router(router: &Router) -> Self {
        EventData {
            router_id: Some(router.id.clone()),
            device_name: Some(router.device_name.clone()),
            ip_address: Some(router.ip_address.clone()),
            ..Default::default()
        }
    }
}

/// A progress event as delivered to subscribers and dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    #[serde(rename = "type")]
    pub event_type: UpdateEventType,
    #[serde(rename = "jobId")]
    pub job_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl UpdateEvent {
    pub fn new(event_type: UpdateEventType, job_id: impl Into<String>, data: EventData) -> Self {
        UpdateEvent {
            event_type,
            job_id: job_id.into(),
            timestamp: Utc::now(),
            data,
        }
    }
}
