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
use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Operator-maintained "latest known" firmware for one device family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FirmwareVersion {
    /// Device-family prefix, e.g. `RUT9`. Uppercase alphanumerics, unique.
    pub device_prefix: String,
    /// Full version string, e.g. `RUT9_R_00.07.06.20`.
    pub latest_version: String,
    pub updated_at: DateTime<Utc>,
}

/// Result of evaluating a current firmware string against the version table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyOutcome {
    pub available: bool,
    pub latest_version: Option<String>,
}

static FAMILY_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z0-9]+)_").expect("family prefix regex"));
static NUMERIC_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)\.(\d+)$").expect("numeric tail regex"));
static VALID_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]+$").expect("prefix validation regex"));
static VALID_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]+_R_\d+\.\d+\.\d+\.\d+$").expect("version validation regex"));

/// Extracts the device-family prefix: the leading uppercase alphanumeric
/// token before the first underscore (`RUT9_R_00.07.06.11` -> `RUT9`).
pub fn device_prefix(firmware: &str) -> Option<&str> {
    FAMILY_PREFIX
        .captures(firmware)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Validates an operator-supplied device prefix.
pub fn is_valid_prefix(prefix: &str) -> bool {
    VALID_PREFIX.is_match(prefix)
}

/// Validates an operator-supplied latest-version string.
pub fn is_valid_version(version: &str) -> bool {
    VALID_VERSION.is_match(version)
}

fn numeric_tail(version: &str) -> Option<[u32; 4]> {
    let caps = NUMERIC_TAIL.captures(version)?;
    let mut parts = [0u32; 4];
    for (i, part) in parts.iter_mut().enumerate() {
        *part = caps.get(i + 1)?.as_str().parse().ok()?;
    }
    Some(parts)
}

/// Compares two firmware strings by their four-part numeric tails; the first
/// unequal component decides. Falls back to plain string comparison when
/// either side has no parseable tail.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (numeric_tail(a), numeric_tail(b)) {
        (Some(left), Some(right)) => left.cmp(&right),
        _ => a.cmp(b),
    }
}

/// True when `latest` is strictly newer than `current`.
pub fn is_newer(latest: &str, current: &str) -> bool {
    match (numeric_tail(latest), numeric_tail(current)) {
        (Some(left), Some(right)) => left.cmp(&right) == Ordering::Greater,
        // No numeric tail on one side: the table entry counts as an update
        // whenever it differs at all.
        _ => latest != current,
    }
}

/// Evaluates a router's current firmware against the version table, keyed by
/// device-family prefix.
pub fn evaluate(current: &str, latest_by_prefix: &HashMap<String, String>) -> PolicyOutcome {
    let Some(prefix) = device_prefix(current) else {
        return PolicyOutcome::default();
    };
    let Some(latest) = latest_by_prefix.get(prefix) else {
        return PolicyOutcome::default();
    };
    PolicyOutcome {
        available: is_newer(latest, current),
        latest_version: Some(latest.clone()),
    }
}
