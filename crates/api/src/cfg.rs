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
use std::path::PathBuf;

use clap::Parser;

/// Command line options for the ferrite API server.
#[derive(Parser, Debug, Clone)]
#[clap(name = "ferrite-api", version)]
pub struct Options {
    /// Address the HTTP listener binds to
    #[clap(long, env = "FERRITE_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Directory holding the embedded database
    #[clap(long, env = "FERRITE_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// File name of the embedded database inside the data directory
    #[clap(long, env = "FERRITE_DATABASE", default_value = "ferrite.db")]
    pub database: String,

    /// Increase log verbosity (-d: debug, -dd: trace)
    #[clap(short = 'd', long = "debug", action = clap::ArgAction::Count)]
    pub debug: u8,
}

impl Options {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database)
    }
}
