//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with SQLite.
//! It follows the Repository pattern to provide clean abstractions over database operations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ RoleGraph/UserGraph  │  (nested hydration, junction mutations)
//! └──────────┬───────────┘
//!            │
//!            ↓
//! ┌──────────────────────┐
//! │     Repositories     │  (db::handlers - flat CRUD & lookups)
//! └──────────┬───────────┘
//!            │
//!            ↓
//! ┌──────────────────────┐
//! │        Models        │  (db::models - domain objects)
//! └──────────┬───────────┘
//!            │
//!            ↓
//! ┌──────────────────────┐
//! │        SQLite        │
//! └──────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations for CRUD operations
//! - [`models`]: Domain objects and the [`models::Entity`] trait
//! - [`errors`]: Database-specific error types
//!
//! ## Example Usage
//!
//! ```ignore
//! use rolemap::db::handlers::{Repository, Users};
//!
//! async fn example(pool: &sqlx::SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!     let mut users = Users::new(&mut tx);
//!
//!     let mut user = users.create();
//!     user.name = "root".to_string();
//!     let user = users.save(&user).await?;
//!
//!     if let Some(found) = users.get_by_name("root").await? {
//!         assert_eq!(found.id, user.id);
//!     }
//!
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Transactions
//!
//! Repositories borrow a connection, so they work equally on a pooled connection or on a
//! transaction. Use a transaction whenever several mutations must land together.
//!
//! # Migrations
//!
//! Database migrations are managed by SQLx and located in the `migrations/` directory.
//! The [`crate::migrator`] function provides access to the migrator:
//!
//! ```ignore
//! rolemap::migrator().run(&pool).await?;
//! ```

pub mod errors;
pub mod handlers;
pub mod models;

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use log::LevelFilter;
use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::config::Config;

/// Build the connection pool described by the configuration.
///
/// Foreign keys are always enforced, junction cascades depend on it.
pub async fn connect(config: &Config) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database.url)
        .with_context(|| format!("invalid database url {}", config.database.url))?
        .create_if_missing(config.database.create_if_missing)
        .foreign_keys(true)
        .log_statements(LevelFilter::Debug)
        .log_slow_statements(LevelFilter::Warn, config.slow_statement_threshold());

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .connect_with(options)
        .await
        .context("failed to connect to database")?;

    info!(max_connections = config.database.max_connections, "Database pool ready");

    Ok(pool)
}
