//! Repository implementations for database access.
//!
//! This module provides repository structs for each entity of the authorization schema.
//! Flat repositories implement the [`Repository`] trait; graph repositories compose them
//! to hydrate nested collections.
//!
//! # Design Pattern
//!
//! Each repository:
//! - Borrows a SQLx connection or transaction for its whole lifetime
//! - Provides strongly-typed CRUD operations
//! - Handles query construction and parameter binding
//! - Returns domain models from [`crate::db::models`]
//! - Propagates every storage failure as a [`crate::db::errors::DbError`]
//!
//! # Available Repositories
//!
//! - [`Permissions`]: Permissions, existence checks and effective permission lookups
//! - [`Roles`]: Flat roles plus the role junction primitives
//! - [`Users`]: Flat user accounts
//! - [`LoginAttempts`]: Login attempt history and rate-window counters
//! - [`RoleGraph`]: Roles hydrated with users and permissions
//! - [`UserGraph`]: Users hydrated with roles and effective permissions
//!
//! # Common Pattern
//!
//! ```ignore
//! use rolemap::db::handlers::{Permissions, Repository, RoleGraph};
//! use rolemap::types::FetchMode;
//!
//! async fn example(pool: &sqlx::SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!
//!     let permission = Permissions::new(&mut tx).get_by_name("see users").await?;
//!     let mut roles = RoleGraph::new(&mut tx);
//!     if let (Some(role), Some(permission)) = (roles.get_by_name("Users", FetchMode::Void).await?, permission) {
//!         let role = roles.grant_permission(&role, &permission).await?;
//!         assert!(role.can(&permission));
//!     }
//!
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Fetch modes
//!
//! Graph lookups take a [`crate::types::FetchMode`]. `Whole` embeds one level of related
//! entities; the embedded entities are always loaded through the flat repositories, so
//! the user/role cycle is cut after one hop. `Void` skips the related queries.

pub mod login_attempts;
pub mod permissions;
pub mod repository;
pub mod role_graph;
pub mod roles;
pub mod user_graph;
pub mod users;

pub use login_attempts::LoginAttempts;
pub use permissions::Permissions;
pub use repository::{Filter, Repository};
pub use role_graph::RoleGraph;
pub use roles::Roles;
pub use user_graph::UserGraph;
pub use users::Users;
