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

//! Probe for the on-device FOTA agent and its surrounding command
//! vocabulary. Every operation opens its own session via the shared
//! [`CommandRunner`].

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use ssh::{CommandRunner, DEFAULT_COMMAND_TIMEOUT, SessionTarget, ShellError};

pub(crate) const CMD_PING: &str = "echo ok";
pub(crate) const CMD_READ_VERSION: &str = "cat /etc/version";
pub(crate) const CMD_FOTA_INFO: &str = "rut_fota --get_info";
pub(crate) const CMD_FOTA_DOWNLOAD: &str = "rut_fota --download_fw";
pub(crate) const CMD_CHECK_IMAGE: &str = "ls -la /tmp/firmware.img";
pub(crate) const CMD_VERIFY_IMAGE: &str = "sysupgrade -T /tmp/firmware.img";
/// `-c` keeps the current configuration across the flash.
pub(crate) const CMD_APPLY_IMAGE: &str = "sysupgrade -c /tmp/firmware.img";

/// The agent reports this instead of a version when no update is published.
const NO_UPDATE_SENTINEL: &str = "Fw_newest";

const PING_TIMEOUT: Duration = Duration::from_secs(10);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const FLASH_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(thiserror::Error, Debug)]
pub enum FotaError {
    #[error(transparent)]
    Shell(#[from] ShellError),
    #[error("unparseable FOTA agent response: {0}")]
    Envelope(#[from] serde_json::Error),
}

/// Firmware state of one device as reported by the device itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FotaInfo {
    pub current: Option<String>,
    pub available: Option<String>,
    pub update_available: bool,
}

/// JSON envelope printed by the agent's "get info" RPC.
#[derive(Debug, Deserialize)]
struct FotaEnvelope {
    #[serde(default)]
    fw: Option<String>,
}

pub struct FotaProbe {
    runner: Arc<dyn CommandRunner>,
}

impl FotaProbe {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        FotaProbe { runner }
    }

    /// True only when a trivial command round-trips cleanly within the short
    /// reachability budget.
    pub async fn ping(&self, target: &SessionTarget) -> bool {
        self.runner.exec(target, CMD_PING, PING_TIMEOUT).await.is_ok()
    }

    /// Reads the on-device version file. An empty file coerces to None.
    pub async fn current_version(
        &self,
        target: &SessionTarget,
    ) -> Result<Option<String>, ShellError> {
        let stdout = self
            .runner
            .exec(target, CMD_READ_VERSION, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        let version = stdout.trim();
        Ok(if version.is_empty() {
            None
        } else {
            Some(version.to_string())
        })
    }

    /// Reads the current version, then asks the FOTA agent what it would
    /// install. `update_available` iff the agent offers something different
    /// from what is running.
    pub async fn device_info(&self, target: &SessionTarget) -> Result<FotaInfo, FotaError> {
        let current = self.current_version(target).await?;
        let stdout = self
            .runner
            .exec(target, CMD_FOTA_INFO, DEFAULT_COMMAND_TIMEOUT)
            .await?;
        let envelope: FotaEnvelope = serde_json::from_str(&stdout)?;

        let available = envelope
            .fw
            .filter(|fw| !fw.is_empty() && fw != NO_UPDATE_SENTINEL);
        let update_available = available.is_some() && available != current;
        Ok(FotaInfo {
            current,
            available,
            update_available,
        })
    }

    /// True when the downloaded image already sits at its expected path.
    pub async fn image_present(&self, target: &SessionTarget) -> bool {
        self.runner
            .exec(target, CMD_CHECK_IMAGE, DEFAULT_COMMAND_TIMEOUT)
            .await
            .is_ok()
    }

    /// Asks the agent to download the published image, then checks that it
    /// actually landed on disk.
    pub async fn download_image(&self, target: &SessionTarget) -> bool {
        if self
            .runner
            .exec(target, CMD_FOTA_DOWNLOAD, DOWNLOAD_TIMEOUT)
            .await
            .is_err()
        {
            return false;
        }
        self.image_present(target).await
    }

    /// Runs the vendor's image test. A failing but chatty `sysupgrade -T`
    /// that prints to stdout is accepted by the exec contract; in practice
    /// the tool reports verification failures on stderr with a non-zero
    /// exit, which is what this checks for.
    pub async fn verify_image(&self, target: &SessionTarget) -> bool {
        self.runner
            .exec(target, CMD_VERIFY_IMAGE, DEFAULT_COMMAND_TIMEOUT)
            .await
            .is_ok()
    }

    /// Submits the flash. The upgrade reboots the device, which tears down
    /// the session from the far side, so a closed connection here means the
    /// submission was accepted. Every other failure is real.
    pub async fn apply_image(&self, target: &SessionTarget) -> Result<(), ShellError> {
        match self.runner.exec(target, CMD_APPLY_IMAGE, FLASH_TIMEOUT).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_connection_closed() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
