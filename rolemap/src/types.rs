//! Common type definitions.
//!
//! This module defines:
//! - Type aliases for entity IDs (UserId, RoleId, etc.)
//! - The [`FetchMode`] switch used by the graph repositories
//! - The [`Operation`] enum naming rejected mutations
//!
//! # ID Types
//!
//! All entity IDs are SQLite row ids. A value of `0` marks an entity that has not
//! been saved yet (see [`crate::db::models::Entity::is_new`]).
//!
//! # Utility Functions
//!
//! - [`abbrev_uuid`]: Abbreviate UUIDs to first 8 chars for logging
//! - [`name_hash`]: Deterministic digest stored alongside every unique name

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = i64;
pub type RoleId = i64;
pub type PermissionId = i64;
pub type LoginAttemptId = i64;

/// Id carried by entities that have not been persisted yet
pub const UNSAVED_ID: i64 = 0;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// SHA-256 hex digest of a name, as stored in the `name_hash` columns.
///
/// Lookups by name compare this digest rather than the raw string, so matching is
/// exact after hashing (no prefix or case folding).
pub fn name_hash(name: &str) -> String {
    hex::encode(Sha256::digest(name.as_bytes()))
}

/// Controls how far the graph repositories expand related collections.
///
/// `Whole` embeds the related users/roles and permissions one level deep. `Void` returns
/// the bare entity with empty collections and skips the related queries entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    #[default]
    Whole,
    Void,
}

impl FetchMode {
    pub fn is_whole(self) -> bool {
        self == FetchMode::Whole
    }
}

/// Mutation rejected on an entity, reported by [`crate::db::errors::DbError::ProtectedEntity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    UpdateAll,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::UpdateAll => write!(f, "Update"),
        }
    }
}
