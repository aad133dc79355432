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

use eyre::WrapErr;
use ssh::{CommandRunner, SshClient};

use crate::cfg::Options;
use crate::events::EventBus;
use crate::state::AppState;
use crate::{recovery, web};

pub async fn run(options: Options) -> eyre::Result<()> {
    let database_path = options.database_path();
    let pool = db::connect(&database_path)
        .await
        .wrap_err_with(|| format!("opening database at {}", database_path.display()))?;
    recovery::reconcile(&pool).await.wrap_err("startup reconciliation")?;

    let runner: Arc<dyn CommandRunner> = Arc::new(SshClient::new());
    let state = AppState::new(pool, EventBus::global(), runner);
    let app = web::router(state);

    let listener = tokio::net::TcpListener::bind(&options.listen)
        .await
        .wrap_err_with(|| format!("binding {}", options.listen))?;
    tracing::info!(listen = %options.listen, database = %database_path.display(), "ferrite-api up");
    axum::serve(listener, app).await.wrap_err("http server")?;
    Ok(())
}
