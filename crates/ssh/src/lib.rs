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

//!
//! One-shot SSH command execution against managed routers: open a session,
//! run exactly one command, collect output, close.
//!

pub mod client;

use std::time::Duration;

use async_trait::async_trait;

pub use crate::client::SshClient;

/// Session establishment budget, including the TCP connect and key exchange.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Budget for a single remote command unless the caller supplies its own.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Where and as whom to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl SessionTarget {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        SessionTarget {
            host: host.into(),
            port: 22,
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Classified failure of a remote command. Callers branch on the kind, never
/// on message text: in particular the flash path must recognize
/// [`ShellError::ConnectionClosed`] structurally.
#[derive(thiserror::Error, Debug)]
pub enum ShellError {
    #[error("connection refused by {host}:{port}")]
    ConnectRefused { host: String, port: u16 },
    #[error("authentication failed for {username}@{host}")]
    AuthFailed { username: String, host: String },
    #[error("timed out after {}s", timeout.as_secs())]
    Timeout { timeout: Duration },
    #[error("connection closed by the remote side")]
    ConnectionClosed,
    #[error("remote command exited with code {exit_code}: {stderr}")]
    CommandFailed { stderr: String, exit_code: u32 },
    #[error("{0}")]
    Unknown(String),
}

impl ShellError {
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, ShellError::ConnectionClosed)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ShellError::Timeout { .. })
    }
}

/// The seam between the engines and the transport. Production code uses
/// [`SshClient`]; engine tests substitute scripted runners.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs one command in a fresh session and returns its trimmed stdout.
    ///
    /// Succeeds when the remote exit code is 0 or when any stdout was
    /// produced. The latter accommodates vendor tools that exit non-zero
    /// while still printing the requested answer.
    async fn exec(
        &self,
        target: &SessionTarget,
        command: &str,
        timeout: Duration,
    ) -> Result<String, ShellError>;
}
