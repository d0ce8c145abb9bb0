//! Database models for roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Entity;
use super::permissions::Permission;
use super::users::User;
use crate::types::{PermissionId, RoleId, UNSAVED_ID, UserId};

/// A role groups users and the permissions they inherit.
///
/// `users` and `permissions` are only populated when the role was fetched with
/// [`crate::types::FetchMode::Whole`]. Users embedded here always have empty `roles`
/// and `permissions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub created: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl Role {
    /// Blank, unsaved role
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: UNSAVED_ID,
            name: String::new(),
            description: None,
            active: false,
            created: now,
            last_update: now,
            users: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::new()
        }
    }

    /// Whether the role grants the given permission
    pub fn can(&self, permission: &Permission) -> bool {
        self.can_by_id(permission.id)
    }

    pub fn can_by_id(&self, permission_id: PermissionId) -> bool {
        self.permissions.iter().any(|p| p.id == permission_id)
    }

    pub fn can_by_name(&self, permission_name: &str) -> bool {
        self.permissions.iter().any(|p| p.name == permission_name)
    }

    /// Whether the user is a member of this role
    pub fn is_user_in_role(&self, user: &User) -> bool {
        self.is_user_in_role_by_id(user.id)
    }

    pub fn is_user_in_role_by_id(&self, user_id: UserId) -> bool {
        self.users.iter().any(|u| u.id == user_id)
    }

    pub fn is_user_in_role_by_name(&self, user_name: &str) -> bool {
        self.users.iter().any(|u| u.name == user_name)
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for Role {
    fn id(&self) -> i64 {
        self.id
    }
}
