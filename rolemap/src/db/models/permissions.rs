//! Database models for permissions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Entity;
use crate::types::{PermissionId, UNSAVED_ID};

/// A named permission. Leaf entity: it never embeds other entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub description: Option<String>,
    pub created: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl Permission {
    /// Blank, unsaved permission
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: UNSAVED_ID,
            name: String::new(),
            description: None,
            created: now,
            last_update: now,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::new()
        }
    }
}

impl Default for Permission {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for Permission {
    fn id(&self) -> i64 {
        self.id
    }
}
