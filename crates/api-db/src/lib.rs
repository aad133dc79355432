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
//! Durable persistence for the ferrite inventory: routers, update history,
//! rollout jobs, settings and the firmware version table, in a single-file
//! SQLite database. All other components mutate state only through the
//! operations exposed here.
//!

pub mod batch_job;
pub mod firmware_version;
pub mod migrations;
pub mod router;
pub mod settings;
pub mod update_history;

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::Location;
use std::path::Path;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

///
/// Wraps a sqlx::Error and records location and query
///
#[derive(Debug)]
pub struct AnnotatedSqlxError {
    file: &'static str,
    line: u32,
    query: String,
    pub source: sqlx::Error,
}

impl Display for AnnotatedSqlxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Database Error: {} file={} line={} query={}.",
            self.source, self.file, self.line, self.query,
        )
    }
}

impl Error for AnnotatedSqlxError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error(transparent)]
    Sqlx(#[from] AnnotatedSqlxError),
    #[error("{kind} not found: {id}")]
    NotFoundError {
        /// The type of the resource that was not found (e.g. Router)
        kind: &'static str,
        /// The ID of the resource that was not found
        id: String,
    },
    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

impl DatabaseError {
    #[track_caller]
    pub fn query(query: &str, source: sqlx::Error) -> DatabaseError {
        let loc = Location::caller();
        DatabaseError::Sqlx(AnnotatedSqlxError {
            file: loc.file(),
            line: loc.line(),
            query: query.to_string(),
            source,
        })
    }

    #[track_caller]
    pub fn acquire(source: sqlx::Error) -> DatabaseError {
        let loc = Location::caller();
        DatabaseError::Sqlx(AnnotatedSqlxError {
            file: loc.file(),
            line: loc.line(),
            query: "acquire connection".into(),
            source,
        })
    }

    /// Creates an `Internal` error with the given error message
    pub fn internal(message: String) -> Self {
        DatabaseError::Internal { message }
    }

    /// Returns true if this wraps sqlx::Error::RowNotFound or is our own
    /// DatabaseError::NotFoundError
    pub fn is_not_found(&self) -> bool {
        match self {
            DatabaseError::Sqlx(e) => matches!(e.source, sqlx::Error::RowNotFound),
            DatabaseError::NotFoundError { .. } => true,
            _ => false,
        }
    }
}

/// Opens (creating if necessary) the single-file database at `path` and
/// brings the schema up to date. The parent directory is created on demand.
pub async fn connect(path: &Path) -> DatabaseResult<SqlitePool> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| DatabaseError::internal(format!("create {}: {e}", dir.display())))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    // Writes serialize inside SQLite; the pool is sized for the scan and
    // rollout engines issuing reads from a full batch of router tasks at
    // once.
    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(options)
        .await
        .map_err(DatabaseError::acquire)?;

    migrations::ensure_schema(&pool).await?;
    Ok(pool)
}

/// An in-memory database with the full schema, for tests.
pub async fn connect_in_memory() -> DatabaseResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(SqliteConnectOptions::new().in_memory(true).foreign_keys(true))
        .await
        .map_err(DatabaseError::acquire)?;
    migrations::ensure_schema(&pool).await?;
    Ok(pool)
}
