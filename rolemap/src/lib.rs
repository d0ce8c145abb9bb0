//! # rolemap: role-based authorization storage
//!
//! `rolemap` persists the four entities of a classic role-based access control scheme:
//! [permissions](db::models::permissions::Permission), [roles](db::models::roles::Role),
//! [users](db::models::users::User) and [login attempts](db::models::login_attempts::LoginAttempt).
//! Roles and users are linked many-to-many, and permissions can be granted either to a role or
//! directly to a user. A user's effective permissions are the union of both.
//!
//! ## Architecture
//!
//! Everything lives in SQLite and is reached through [sqlx]. The data access layer ([`db`])
//! has two tiers:
//!
//! - **Flat repositories** ([`db::handlers::Permissions`], [`db::handlers::Roles`],
//!   [`db::handlers::Users`], [`db::handlers::LoginAttempts`]) implement the
//!   [`db::handlers::Repository`] trait: CRUD, name lookups, paging and the junction primitives.
//! - **Graph repositories** ([`db::handlers::RoleGraph`], [`db::handlers::UserGraph`]) compose
//!   the flat ones. Each read takes a [`types::FetchMode`]: `Whole` fills in the related
//!   collections one level deep, `Void` returns the bare entity. Mutations of a relationship
//!   return the entity refetched whole.
//!
//! Nested entities are always built with empty collections of their own, so a role's users do
//! not carry roles again and the object graph never cycles.
//!
//! Lookups that find nothing return `None`; storage failures always surface as
//! [`db::errors::DbError`].
//!
//! ## Login attempts
//!
//! [`db::handlers::LoginAttempts`] records attempts and counts those within a trailing window
//! by user name, session or IP address, which is what a lockout policy needs. Attempts are
//! immutable once stored and old ones are pruned on startup (see [`bootstrap`]).
//!
//! ## Configuration and startup
//!
//! The binary reads [`config::Config`] from YAML plus `ROLEMAP_` environment variables, opens
//! the pool, applies the embedded migrations, seeds configured permissions and the
//! administrator account, then prunes stale login attempts. [`setup_database`] performs the
//! same sequence for embedders.
//!
//! ## Testing
//!
//! Tests use `#[sqlx::test]`, which hands each test a fresh migrated SQLite database.
//! Fixture helpers live in `test_utils`, available to other crates behind the `test-utils`
//! feature.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod errors;
pub mod telemetry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(test)]
mod test;

pub use config::Config;

use sqlx::SqlitePool;
use tracing::info;

/// Get the database migrator for the authorization schema.
///
/// Returns a migrator that can be run against a connection pool.
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Connect, migrate, and seed the database described by `config`.
///
/// Seeding covers the configured permissions and, if configured, the administrator account.
/// Old login attempts are pruned when `login_attempts.prune_on_start` is set.
pub async fn setup_database(config: &Config) -> anyhow::Result<SqlitePool> {
    let pool = db::connect(config).await?;
    migrator().run(&pool).await?;

    bootstrap::ensure_permissions(&config.permissions, &pool).await?;

    if let Some(admin) = &config.admin {
        bootstrap::ensure_admin_user(admin, config.password, &pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create initial admin user: {e}"))?;
    }

    if config.login_attempts.prune_on_start {
        bootstrap::prune_login_attempts(config.login_attempts.retention, &pool).await?;
    }

    info!("Database ready");
    Ok(pool)
}
