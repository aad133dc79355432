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
use std::sync::Arc;

use sqlx::SqlitePool;
use ssh::CommandRunner;

use crate::events::EventBus;
use crate::rollout::RolloutEngine;
use crate::scan::ScanEngine;

/// Shared handles behind every operator command.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub bus: Arc<EventBus>,
    pub scan: Arc<ScanEngine>,
    pub rollout: Arc<RolloutEngine>,
}

impl AppState {
    pub fn new(pool: SqlitePool, bus: Arc<EventBus>, runner: Arc<dyn CommandRunner>) -> Self {
        let scan = Arc::new(ScanEngine::new(pool.clone(), runner.clone(), bus.clone()));
        let rollout = Arc::new(RolloutEngine::new(pool.clone(), runner, bus.clone()));
        AppState {
            pool,
            bus,
            scan,
            rollout,
        }
    }
}
