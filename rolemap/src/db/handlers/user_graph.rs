//! User repository with nested hydration and user-level junction mutations.
//!
//! [`UserGraph`] composes the flat repositories on one shared connection. Roles are loaded
//! through the flat [`Roles`] repository so they never carry users of their own, and
//! `permissions` is filled with the effective set (direct grants plus role grants).

use crate::db::{
    errors::{DbError, Result},
    handlers::{
        permissions::Permissions,
        repository::{Filter, Repository},
        roles::Roles,
        users::Users,
    },
    models::{permissions::Permission, roles::Role, users::User},
};
use crate::types::{FetchMode, PermissionId, RoleId, UserId, abbrev_uuid};
use sqlx::SqliteConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct UserGraph<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> UserGraph<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    async fn hydrate(&mut self, mut user: User, mode: FetchMode) -> Result<User> {
        if mode.is_whole() {
            user.roles = Roles::new(&mut *self.db).get_by_user_id(user.id).await?;
            user.permissions = Permissions::new(&mut *self.db).get_by_user_id(user.id).await?;
        }
        Ok(user)
    }

    async fn hydrate_all(&mut self, users: Vec<User>, mode: FetchMode) -> Result<Vec<User>> {
        let mut hydrated = Vec::with_capacity(users.len());
        for user in users {
            hydrated.push(self.hydrate(user, mode).await?);
        }
        Ok(hydrated)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_id(&mut self, id: UserId, mode: FetchMode) -> Result<Option<User>> {
        let user = Users::new(&mut *self.db).get_by_id(id).await?;
        match user {
            Some(user) => Ok(Some(self.hydrate(user, mode).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_name(&mut self, name: &str, mode: FetchMode) -> Result<Option<User>> {
        let user = Users::new(&mut *self.db).get_by_name(name).await?;
        match user {
            Some(user) => Ok(Some(self.hydrate(user, mode).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(uuid = %abbrev_uuid(&uuid)), err)]
    pub async fn get_by_uuid(&mut self, uuid: Uuid, mode: FetchMode) -> Result<Option<User>> {
        let user = Users::new(&mut *self.db).get_by_uuid(uuid).await?;
        match user {
            Some(user) => Ok(Some(self.hydrate(user, mode).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &Filter, mode: FetchMode) -> Result<Vec<User>> {
        let users = Users::new(&mut *self.db).list(filter).await?;
        self.hydrate_all(users, mode).await
    }

    pub async fn fetch_all(&mut self, mode: FetchMode) -> Result<Vec<User>> {
        self.list(&Filter::all(), mode).await
    }

    pub async fn fetch_limit(&mut self, offset: i64, count: i64, mode: FetchMode) -> Result<Vec<User>> {
        self.list(&Filter::new(offset, count), mode).await
    }

    pub async fn get_by_permission(&mut self, permission: &Permission, mode: FetchMode) -> Result<Vec<User>> {
        self.get_by_permission_id(permission.id, mode).await
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_permission_id(&mut self, permission_id: PermissionId, mode: FetchMode) -> Result<Vec<User>> {
        let users = Users::new(&mut *self.db).get_by_permission_id(permission_id).await?;
        self.hydrate_all(users, mode).await
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_permission_name(&mut self, permission_name: &str, mode: FetchMode) -> Result<Vec<User>> {
        let users = Users::new(&mut *self.db).get_by_permission_name(permission_name).await?;
        self.hydrate_all(users, mode).await
    }

    pub async fn get_by_role(&mut self, role: &Role, mode: FetchMode) -> Result<Vec<User>> {
        self.get_by_role_id(role.id, mode).await
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_role_id(&mut self, role_id: RoleId, mode: FetchMode) -> Result<Vec<User>> {
        let users = Users::new(&mut *self.db).get_by_role_id(role_id).await?;
        self.hydrate_all(users, mode).await
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_role_name(&mut self, role_name: &str, mode: FetchMode) -> Result<Vec<User>> {
        let users = Users::new(&mut *self.db).get_by_role_name(role_name).await?;
        self.hydrate_all(users, mode).await
    }

    async fn refetch(&mut self, user_id: UserId) -> Result<User> {
        self.get_by_id(user_id, FetchMode::Whole).await?.ok_or(DbError::NotFound)
    }

    async fn permission_id_by_name(&mut self, permission_name: &str) -> Result<PermissionId> {
        let permission = Permissions::new(&mut *self.db).get_by_name(permission_name).await?;
        permission.map(|p| p.id).ok_or(DbError::NotFound)
    }

    async fn role_id_by_name(&mut self, role_name: &str) -> Result<RoleId> {
        let role = Roles::new(&mut *self.db).get_by_name(role_name).await?;
        role.map(|r| r.id).ok_or(DbError::NotFound)
    }

    pub async fn grant_permission(&mut self, user: &User, permission: &Permission) -> Result<User> {
        self.grant_permission_by_id(user, permission.id).await
    }

    #[instrument(skip(self, user), fields(user_id = user.id), err)]
    pub async fn grant_permission_by_id(&mut self, user: &User, permission_id: PermissionId) -> Result<User> {
        Users::new(&mut *self.db).add_permission(user.id, permission_id).await?;
        self.refetch(user.id).await
    }

    #[instrument(skip(self, user), fields(user_id = user.id), err)]
    pub async fn grant_permission_by_name(&mut self, user: &User, permission_name: &str) -> Result<User> {
        let permission_id = self.permission_id_by_name(permission_name).await?;
        self.grant_permission_by_id(user, permission_id).await
    }

    /// Revoke a direct grant. The permission stays effective if one of the user's roles
    /// still grants it.
    pub async fn revoke_permission(&mut self, user: &User, permission: &Permission) -> Result<User> {
        self.revoke_permission_by_id(user, permission.id).await
    }

    #[instrument(skip(self, user), fields(user_id = user.id), err)]
    pub async fn revoke_permission_by_id(&mut self, user: &User, permission_id: PermissionId) -> Result<User> {
        Users::new(&mut *self.db).remove_permission(user.id, permission_id).await?;
        self.refetch(user.id).await
    }

    #[instrument(skip(self, user), fields(user_id = user.id), err)]
    pub async fn revoke_permission_by_name(&mut self, user: &User, permission_name: &str) -> Result<User> {
        let permission_id = self.permission_id_by_name(permission_name).await?;
        self.revoke_permission_by_id(user, permission_id).await
    }

    pub async fn add_role(&mut self, user: &User, role: &Role) -> Result<User> {
        self.add_role_by_id(user, role.id).await
    }

    #[instrument(skip(self, user), fields(user_id = user.id), err)]
    pub async fn add_role_by_id(&mut self, user: &User, role_id: RoleId) -> Result<User> {
        Roles::new(&mut *self.db).add_user(role_id, user.id).await?;
        self.refetch(user.id).await
    }

    #[instrument(skip(self, user), fields(user_id = user.id), err)]
    pub async fn add_role_by_name(&mut self, user: &User, role_name: &str) -> Result<User> {
        let role_id = self.role_id_by_name(role_name).await?;
        self.add_role_by_id(user, role_id).await
    }

    pub async fn remove_role(&mut self, user: &User, role: &Role) -> Result<User> {
        self.remove_role_by_id(user, role.id).await
    }

    #[instrument(skip(self, user), fields(user_id = user.id), err)]
    pub async fn remove_role_by_id(&mut self, user: &User, role_id: RoleId) -> Result<User> {
        Roles::new(&mut *self.db).remove_user(role_id, user.id).await?;
        self.refetch(user.id).await
    }

    #[instrument(skip(self, user), fields(user_id = user.id), err)]
    pub async fn remove_role_by_name(&mut self, user: &User, role_name: &str) -> Result<User> {
        let role_id = self.role_id_by_name(role_name).await?;
        self.remove_role_by_id(user, role_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_permission, create_test_role, create_test_user, grant_role_permission};
    use sqlx::SqlitePool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_whole_user_embeds_flat_roles(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let see = create_test_permission(&mut conn, "see users").await;
        let role = create_test_role(&mut conn, "Users").await;
        let root = create_test_user(&mut conn, "root").await;
        let alice = create_test_user(&mut conn, "alice").await;
        grant_role_permission(&mut conn, role.id, see.id).await;

        let mut graph = UserGraph::new(&mut conn);
        let root = graph.add_role(&root, &role).await.unwrap();
        graph.add_role_by_name(&alice, "Users").await.unwrap();

        assert!(root.has_role(&role));
        assert!(root.has_role_by_name("Users"));
        assert!(root.can(&see));
        assert!(root.roles[0].users.is_empty());
        assert!(root.roles[0].permissions.is_empty());

        let void = graph.get_by_name("root", FetchMode::Void).await.unwrap().unwrap();
        assert!(void.roles.is_empty());
        assert!(void.permissions.is_empty());

        let members = graph.get_by_role(&role, FetchMode::Whole).await.unwrap();
        let names: Vec<&str> = members.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "root"]);
        assert!(members.iter().all(|u| u.can_by_name("see users")));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_effective_permissions_are_deduplicated(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let see = create_test_permission(&mut conn, "see users").await;
        let add = create_test_permission(&mut conn, "add user").await;
        let role = create_test_role(&mut conn, "Users").await;
        let root = create_test_user(&mut conn, "root").await;
        grant_role_permission(&mut conn, role.id, see.id).await;

        let mut graph = UserGraph::new(&mut conn);
        let root = graph.add_role(&root, &role).await.unwrap();
        let root = graph.grant_permission(&root, &see).await.unwrap();
        let root = graph.grant_permission_by_name(&root, "add user").await.unwrap();

        assert_eq!(root.permissions.len(), 2);
        assert!(root.can(&add));

        // still inherited through the role
        let root = graph.revoke_permission(&root, &see).await.unwrap();
        assert!(root.can(&see));

        let root = graph.remove_role_by_name(&root, "Users").await.unwrap();
        assert!(!root.can(&see));
        assert!(root.roles.is_empty());

        let root = graph.revoke_permission_by_id(&root, add.id).await.unwrap();
        assert!(root.permissions.is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_lookups(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let see = create_test_permission(&mut conn, "see users").await;
        let root = create_test_user(&mut conn, "root").await;

        let mut graph = UserGraph::new(&mut conn);
        assert!(graph.get_by_id(99, FetchMode::Whole).await.unwrap().is_none());
        assert!(graph.get_by_permission(&see, FetchMode::Whole).await.unwrap().is_empty());

        graph.grant_permission_by_id(&root, see.id).await.unwrap();

        let holders = graph.get_by_permission_name("see users", FetchMode::Whole).await.unwrap();
        assert_eq!(holders.len(), 1);
        assert!(holders[0].can(&see));

        let found = graph.get_by_uuid(root.uuid, FetchMode::Whole).await.unwrap().unwrap();
        assert_eq!(found.id, root.id);
        assert_eq!(graph.fetch_limit(0, 10, FetchMode::Void).await.unwrap().len(), 1);

        let result = graph.grant_permission_by_name(&root, "missing").await;
        assert!(matches!(result, Err(DbError::NotFound)));
        let result = graph.add_role_by_id(&root, 7).await;
        assert!(matches!(result, Err(DbError::NotFound)));
    }
}
