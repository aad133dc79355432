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
//! The ferrite API server library.
//!

// NOTE on pub vs non-pub mods:
//
// ferrite-api is a CLI crate, not a lib. lib.rs exists so that main.rs stays
// a thin shell around run(); everything else should be private ("mod", not
// "pub mod") so dead-code detection keeps working.

mod cfg;
mod errors;
mod events;
mod fota;
mod logging;
mod recovery;
mod rollout;
mod run;
mod scan;
mod state;
#[cfg(test)]
mod tests;
mod web;

// Save typing
pub(crate) use errors::{ApiError, ApiResult};

// Stuff needed by main.rs
pub use crate::{cfg::Options, logging::setup_logging, run::run};
