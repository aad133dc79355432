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
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

/// Quiets spans and events from 3rd party frameworks; the interesting ones
/// here are ours.
fn dep_log_filter(env_filter: EnvFilter) -> EnvFilter {
    [
        "sqlx::query=warn",
        "hyper=error",
        "russh=info",
        "tower=warn",
        "h2=warn",
    ]
    .iter()
    .fold(env_filter, |f, filter_str| {
        f.add_directive(
            filter_str
                .parse()
                .unwrap_or_else(|err| panic!("{filter_str} must be parsed; error: {err}")),
        )
    })
}

pub fn setup_logging(debug: u8) -> eyre::Result<()> {
    let log_level = match debug {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let log_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env()?;
    let log_filter = dep_log_filter(log_filter);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().compact())
        .with(log_filter)
        .try_init()?;

    Ok(())
}
