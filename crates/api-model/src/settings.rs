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
use serde::{Deserialize, Serialize};

/// Key for the fleet-wide SSH username.
pub const GLOBAL_USERNAME: &str = "global_username";
/// Key for the fleet-wide SSH password.
pub const GLOBAL_PASSWORD: &str = "global_password";
/// Key for the wall-clock minutes to pause between rollout batches.
pub const BATCH_WAIT_MINUTES: &str = "batch_wait_minutes";

/// Pause applied between batches when the operator has not configured one.
pub const DEFAULT_BATCH_WAIT_MINUTES: u64 = 5;

/// A complete username/password pair, ready to open a session with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// The fleet-wide login as stored in settings. Either half may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl GlobalCredentials {
    /// Returns a usable pair only when both halves are present and non-empty.
    pub fn as_credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) if !username.is_empty() => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}
