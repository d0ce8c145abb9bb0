//! Role repository with nested hydration and role-level junction mutations.
//!
//! [`RoleGraph`] composes the flat [`Roles`], [`Users`] and [`Permissions`] repositories on
//! one shared connection. Members are loaded through the flat [`Users`] repository, so a
//! user embedded in a role never carries roles or permissions of its own.
//!
//! Every mutation borrows the caller's role, applies the junction change and returns the
//! role re-fetched in [`FetchMode::Whole`]. On error the caller's value is untouched.

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
use crate::types::{FetchMode, PermissionId, RoleId, UserId};
use sqlx::SqliteConnection;
use tracing::instrument;

pub struct RoleGraph<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> RoleGraph<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    async fn hydrate(&mut self, mut role: Role, mode: FetchMode) -> Result<Role> {
        if mode.is_whole() {
            role.users = Users::new(&mut *self.db).get_by_role_id(role.id).await?;
            role.permissions = Permissions::new(&mut *self.db).get_by_role_id(role.id).await?;
        }
        Ok(role)
    }

    async fn hydrate_all(&mut self, roles: Vec<Role>, mode: FetchMode) -> Result<Vec<Role>> {
        let mut hydrated = Vec::with_capacity(roles.len());
        for role in roles {
            hydrated.push(self.hydrate(role, mode).await?);
        }
        Ok(hydrated)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_id(&mut self, id: RoleId, mode: FetchMode) -> Result<Option<Role>> {
        let role = Roles::new(&mut *self.db).get_by_id(id).await?;
        match role {
            Some(role) => Ok(Some(self.hydrate(role, mode).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_name(&mut self, name: &str, mode: FetchMode) -> Result<Option<Role>> {
        let role = Roles::new(&mut *self.db).get_by_name(name).await?;
        match role {
            Some(role) => Ok(Some(self.hydrate(role, mode).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &Filter, mode: FetchMode) -> Result<Vec<Role>> {
        let roles = Roles::new(&mut *self.db).list(filter).await?;
        self.hydrate_all(roles, mode).await
    }

    pub async fn fetch_all(&mut self, mode: FetchMode) -> Result<Vec<Role>> {
        self.list(&Filter::all(), mode).await
    }

    pub async fn fetch_limit(&mut self, offset: i64, count: i64, mode: FetchMode) -> Result<Vec<Role>> {
        self.list(&Filter::new(offset, count), mode).await
    }

    pub async fn get_by_permission(&mut self, permission: &Permission, mode: FetchMode) -> Result<Vec<Role>> {
        self.get_by_permission_id(permission.id, mode).await
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_permission_id(&mut self, permission_id: PermissionId, mode: FetchMode) -> Result<Vec<Role>> {
        let roles = Roles::new(&mut *self.db).get_by_permission_id(permission_id).await?;
        self.hydrate_all(roles, mode).await
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_permission_name(&mut self, permission_name: &str, mode: FetchMode) -> Result<Vec<Role>> {
        let roles = Roles::new(&mut *self.db).get_by_permission_name(permission_name).await?;
        self.hydrate_all(roles, mode).await
    }

    pub async fn get_by_user(&mut self, user: &User, mode: FetchMode) -> Result<Vec<Role>> {
        self.get_by_user_id(user.id, mode).await
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_user_id(&mut self, user_id: UserId, mode: FetchMode) -> Result<Vec<Role>> {
        let roles = Roles::new(&mut *self.db).get_by_user_id(user_id).await?;
        self.hydrate_all(roles, mode).await
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_user_name(&mut self, user_name: &str, mode: FetchMode) -> Result<Vec<Role>> {
        let roles = Roles::new(&mut *self.db).get_by_user_name(user_name).await?;
        self.hydrate_all(roles, mode).await
    }

    async fn refetch(&mut self, role_id: RoleId) -> Result<Role> {
        self.get_by_id(role_id, FetchMode::Whole).await?.ok_or(DbError::NotFound)
    }

    async fn permission_id_by_name(&mut self, permission_name: &str) -> Result<PermissionId> {
        let permission = Permissions::new(&mut *self.db).get_by_name(permission_name).await?;
        permission.map(|p| p.id).ok_or(DbError::NotFound)
    }

    async fn user_id_by_name(&mut self, user_name: &str) -> Result<UserId> {
        let user = Users::new(&mut *self.db).get_by_name(user_name).await?;
        user.map(|u| u.id).ok_or(DbError::NotFound)
    }

    pub async fn grant_permission(&mut self, role: &Role, permission: &Permission) -> Result<Role> {
        self.grant_permission_by_id(role, permission.id).await
    }

    #[instrument(skip(self, role), fields(role_id = role.id), err)]
    pub async fn grant_permission_by_id(&mut self, role: &Role, permission_id: PermissionId) -> Result<Role> {
        Roles::new(&mut *self.db).add_permission(role.id, permission_id).await?;
        self.refetch(role.id).await
    }

    #[instrument(skip(self, role), fields(role_id = role.id), err)]
    pub async fn grant_permission_by_name(&mut self, role: &Role, permission_name: &str) -> Result<Role> {
        let permission_id = self.permission_id_by_name(permission_name).await?;
        self.grant_permission_by_id(role, permission_id).await
    }

    pub async fn revoke_permission(&mut self, role: &Role, permission: &Permission) -> Result<Role> {
        self.revoke_permission_by_id(role, permission.id).await
    }

    #[instrument(skip(self, role), fields(role_id = role.id), err)]
    pub async fn revoke_permission_by_id(&mut self, role: &Role, permission_id: PermissionId) -> Result<Role> {
        Roles::new(&mut *self.db).remove_permission(role.id, permission_id).await?;
        self.refetch(role.id).await
    }

    #[instrument(skip(self, role), fields(role_id = role.id), err)]
    pub async fn revoke_permission_by_name(&mut self, role: &Role, permission_name: &str) -> Result<Role> {
        let permission_id = self.permission_id_by_name(permission_name).await?;
        self.revoke_permission_by_id(role, permission_id).await
    }

    pub async fn add_user(&mut self, role: &Role, user: &User) -> Result<Role> {
        self.add_user_by_id(role, user.id).await
    }

    #[instrument(skip(self, role), fields(role_id = role.id), err)]
    pub async fn add_user_by_id(&mut self, role: &Role, user_id: UserId) -> Result<Role> {
        Roles::new(&mut *self.db).add_user(role.id, user_id).await?;
        self.refetch(role.id).await
    }

    #[instrument(skip(self, role), fields(role_id = role.id), err)]
    pub async fn add_user_by_name(&mut self, role: &Role, user_name: &str) -> Result<Role> {
        let user_id = self.user_id_by_name(user_name).await?;
        self.add_user_by_id(role, user_id).await
    }

    pub async fn remove_user(&mut self, role: &Role, user: &User) -> Result<Role> {
        self.remove_user_by_id(role, user.id).await
    }

    #[instrument(skip(self, role), fields(role_id = role.id), err)]
    pub async fn remove_user_by_id(&mut self, role: &Role, user_id: UserId) -> Result<Role> {
        Roles::new(&mut *self.db).remove_user(role.id, user_id).await?;
        self.refetch(role.id).await
    }

    #[instrument(skip(self, role), fields(role_id = role.id), err)]
    pub async fn remove_user_by_name(&mut self, role: &Role, user_name: &str) -> Result<Role> {
        let user_id = self.user_id_by_name(user_name).await?;
        self.remove_user_by_id(role, user_id).await
    }
}
