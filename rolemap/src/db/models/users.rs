//! Database models for users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Entity;
use super::permissions::Permission;
use super::roles::Role;
use crate::auth::password::{self, Argon2Params};
use crate::errors::Error;
use crate::types::{PermissionId, RoleId, UNSAVED_ID, UserId};

/// A user account.
///
/// `roles` and `permissions` are only populated when the user was fetched with
/// [`crate::types::FetchMode::Whole`]. `permissions` then holds the effective set: direct
/// grants plus everything inherited from the user's roles, without duplicates. Roles
/// embedded here always have empty `users` and `permissions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub uuid: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub description: Option<String>,
    /// Argon2 PHC string, empty when no password was set. Never serialized, so a
    /// deserialized user has no password.
    #[serde(skip_serializing, default)]
    pub password: String,
    pub active: bool,
    pub created: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl User {
    /// Blank, unsaved user with a fresh external uuid
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: UNSAVED_ID,
            uuid: Uuid::new_v4(),
            name: String::new(),
            email: None,
            description: None,
            password: String::new(),
            active: false,
            created: now,
            last_update: now,
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::new()
        }
    }

    /// Hash and store a new password
    pub fn set_password(&mut self, plain: &str) -> Result<(), Error> {
        self.password = password::hash_string(plain)?;
        Ok(())
    }

    pub fn set_password_with(&mut self, plain: &str, params: Argon2Params) -> Result<(), Error> {
        self.password = password::hash_string_with_params(plain, Some(params))?;
        Ok(())
    }

    /// Check a candidate password against the stored hash.
    ///
    /// A user without a password never verifies.
    pub fn verify_password(&self, plain: &str) -> Result<bool, Error> {
        if self.password.is_empty() {
            return Ok(false);
        }
        password::verify_string(plain, &self.password)
    }

    /// Whether the user holds the given permission (directly or through a role)
    pub fn can(&self, permission: &Permission) -> bool {
        self.can_by_id(permission.id)
    }

    pub fn can_by_id(&self, permission_id: PermissionId) -> bool {
        self.permissions.iter().any(|p| p.id == permission_id)
    }

    pub fn can_by_name(&self, permission_name: &str) -> bool {
        self.permissions.iter().any(|p| p.name == permission_name)
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.has_role_by_id(role.id)
    }

    pub fn has_role_by_id(&self, role_id: RoleId) -> bool {
        self.roles.iter().any(|r| r.id == role_id)
    }

    pub fn has_role_by_name(&self, role_name: &str) -> bool {
        self.roles.iter().any(|r| r.name == role_name)
    }
}

impl Default for User {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for User {
    fn id(&self) -> i64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_roundtrip() {
        let mut user = User::named("root");
        assert!(!user.verify_password("anything").unwrap());

        user.set_password("password").unwrap();
        assert!(user.password.starts_with("$argon2id$"));
        assert!(user.verify_password("password").unwrap());
        assert!(!user.verify_password("wrong").unwrap());
    }

    #[test]
    fn test_password_is_not_serialized() {
        let mut user = User::named("root");
        user.password = "$argon2id$secret".to_string();

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["name"], "root");
    }

    #[test]
    fn test_json_round_trip_drops_password() {
        let mut user = User::named("root");
        user.email = Some("root@example.com".to_string());
        user.password = "$argon2id$secret".to_string();

        let json = serde_json::to_string(&user).unwrap();
        let back: User = serde_json::from_str(&json).unwrap();

        assert!(back.password.is_empty());
        assert_eq!(back, User { password: String::new(), ..user });
    }

    #[test]
    fn test_has_role_and_can() {
        let mut user = User::named("root");
        user.roles.push(Role {
            id: 3,
            ..Role::named("Administrator")
        });
        user.permissions.push(Permission {
            id: 1,
            ..Permission::named("see users")
        });

        assert!(user.has_role_by_id(3));
        assert!(user.has_role_by_name("Administrator"));
        assert!(!user.has_role_by_name("Users"));
        assert!(user.can_by_id(1));
        assert!(user.can_by_name("see users"));
        assert!(!user.can_by_id(2));
    }

    #[test]
    fn test_new_users_get_distinct_uuids() {
        assert_ne!(User::new().uuid, User::new().uuid);
        assert!(User::new().is_new());
    }
}
