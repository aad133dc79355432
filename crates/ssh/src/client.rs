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
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::{Algorithm, HashAlg, PublicKey};
use russh::{ChannelMsg, Disconnect, Preferred, cipher, kex, mac};
use tokio::time::timeout;

use crate::{CONNECT_TIMEOUT, CommandRunner, SessionTarget, ShellError};

/// SSH client for fleet devices.
///
/// The advertised algorithm set deliberately includes suites that are long
/// deprecated elsewhere (`diffie-hellman-group1-sha1`, `ssh-rsa`, CBC/3DES
/// ciphers, `hmac-sha1`): a fleet contains routers whose firmware predates
/// the modern suites, and refusing to negotiate with them would make the
/// updater unable to update exactly the devices that need it most. Callers
/// that require a stricter profile construct their own [`client::Config`].
pub struct SshClient {
    config: Arc<client::Config>,
}

impl Default for SshClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SshClient {
    pub fn new() -> Self {
        let config = client::Config {
            preferred: legacy_tolerant_algorithms(),
            inactivity_timeout: None,
            ..Default::default()
        };
        SshClient {
            config: Arc::new(config),
        }
    }

    async fn open_session(&self, target: &SessionTarget) -> Result<Handle<FleetHandler>, ShellError> {
        let connect = client::connect(
            self.config.clone(),
            (target.host.as_str(), target.port),
            FleetHandler,
        );
        let mut session = timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| ShellError::Timeout {
                timeout: CONNECT_TIMEOUT,
            })?
            .map_err(|e| classify_connect_error(e, target))?;

        let auth = session
            .authenticate_password(&target.username, &target.password)
            .await
            .map_err(|e| classify_session_error(&e))?;
        if !auth.success() {
            return Err(ShellError::AuthFailed {
                username: target.username.clone(),
                host: target.host.clone(),
            });
        }
        Ok(session)
    }
}

#[async_trait]
impl CommandRunner for SshClient {
    async fn exec(
        &self,
        target: &SessionTarget,
        command: &str,
        cmd_timeout: Duration,
    ) -> Result<String, ShellError> {
        let mut session = self.open_session(target).await?;

        let result = timeout(cmd_timeout, run_command(&mut session, command)).await;
        // Closing is best effort; the peer may already be gone (rebooting
        // devices sever the transport themselves).
        session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .ok();

        match result {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::debug!(host = %target.host, command, "remote command timed out");
                Err(ShellError::Timeout {
                    timeout: cmd_timeout,
                })
            }
        }
    }
}

async fn run_command(
    session: &mut Handle<FleetHandler>,
    command: &str,
) -> Result<String, ShellError> {
    let mut channel = session
        .channel_open_session()
        .await
        .map_err(|e| classify_session_error(&e))?;
    channel
        .exec(true, command)
        .await
        .map_err(|e| classify_session_error(&e))?;

    let mut stdout: Vec<u8> = Vec::new();
    let mut stderr: Vec<u8> = Vec::new();
    let mut exit_status: Option<u32> = None;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
            ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
            ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
            _ => {}
        }
    }

    let stdout = String::from_utf8_lossy(&stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&stderr).trim().to_string();

    match exit_status {
        Some(0) => Ok(stdout),
        // Some vendor tools exit non-zero while printing the requested
        // answer on stdout. Output wins over the exit code.
        _ if !stdout.is_empty() => Ok(stdout),
        Some(code) => Err(ShellError::CommandFailed {
            stderr,
            exit_code: code,
        }),
        // The channel ended without an exit status: the transport was torn
        // down under us (e.g. the device started rebooting).
        None => Err(ShellError::ConnectionClosed),
    }
}

/// Accepts whatever host key the device presents. Fleet routers regenerate
/// host keys on factory reset and firmware flash, so pinning them would turn
/// every successful update into a verification failure.
struct FleetHandler;

impl client::Handler for FleetHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

fn legacy_tolerant_algorithms() -> Preferred {
    Preferred {
        kex: Cow::Owned(vec![
            kex::CURVE25519,
            kex::ECDH_SHA2_NISTP256,
            kex::DH_G16_SHA512,
            kex::DH_G14_SHA256,
            kex::DH_G14_SHA1,
            kex::DH_G1_SHA1,
        ]),
        key: Cow::Owned(vec![
            Algorithm::Ed25519,
            Algorithm::Rsa {
                hash: Some(HashAlg::Sha512),
            },
            Algorithm::Rsa {
                hash: Some(HashAlg::Sha256),
            },
            Algorithm::Rsa { hash: None },
        ]),
        cipher: Cow::Owned(vec![
            cipher::CHACHA20_POLY1305,
            cipher::AES_256_GCM,
            cipher::AES_256_CTR,
            cipher::AES_192_CTR,
            cipher::AES_128_CTR,
            cipher::AES_256_CBC,
            cipher::AES_192_CBC,
            cipher::AES_128_CBC,
            cipher::TRIPLE_DES_CBC,
        ]),
        mac: Cow::Owned(vec![
            mac::HMAC_SHA256,
            mac::HMAC_SHA512,
            mac::HMAC_SHA1,
        ]),
        ..Default::default()
    }
}

fn classify_connect_error(error: russh::Error, target: &SessionTarget) -> ShellError {
    match error {
        russh::Error::IO(ref io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            ShellError::ConnectRefused {
                host: target.host.clone(),
                port: target.port,
            }
        }
        other => classify_session_error(&other),
    }
}

fn classify_session_error(error: &russh::Error) -> ShellError {
    match error {
        russh::Error::Disconnect => ShellError::ConnectionClosed,
        russh::Error::IO(io)
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ) =>
        {
            ShellError::ConnectionClosed
        }
        other => ShellError::Unknown(other.to_string()),
    }
}
