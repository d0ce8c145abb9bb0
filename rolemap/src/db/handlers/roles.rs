//! Database repository for roles and their junction tables.
//!
//! [`Roles`] is the flat repository: entities come back with empty `users` and
//! `permissions`. Use [`super::RoleGraph`] to hydrate them.

use std::collections::HashMap;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::{Filter, Repository},
    models::roles::Role,
};
use crate::types::{PermissionId, RoleId, UserId, name_hash};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, SqliteConnection};
use tracing::instrument;

const SELECT_ROLE: &str = "SELECT r.role_id AS id, r.name, r.description, r.active, r.created, r.last_update FROM role AS r";

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct RoleRow {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub created: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            active: row.active,
            created: row.created,
            last_update: row.last_update,
            users: Vec::new(),
            permissions: Vec::new(),
        }
    }
}

pub struct Roles<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Roles<'c> {
    type Entity = Role;
    type Id = RoleId;

    fn create(&self) -> Self::Entity {
        Role::new()
    }

    #[instrument(skip(self), fields(role_id = id), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Entity>> {
        let sql = format!("{SELECT_ROLE} WHERE r.role_id = ?");
        let role = sqlx::query_as::<_, RoleRow>(&sql).bind(id).fetch_optional(&mut *self.db).await?;

        Ok(role.map(Role::from))
    }

    #[instrument(skip(self), err)]
    async fn get_by_name(&mut self, name: &str) -> Result<Option<Self::Entity>> {
        let sql = format!("{SELECT_ROLE} WHERE r.name_hash = ?");
        let role = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(name_hash(name))
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(role.map(Role::from))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<RoleId>) -> Result<HashMap<RoleId, Role>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::new(SELECT_ROLE);
        query.push(" WHERE r.role_id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let roles = query.build_query_as::<RoleRow>().fetch_all(&mut *self.db).await?;

        Ok(roles.into_iter().map(|r| (r.id, Role::from(r))).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Filter) -> Result<Vec<Self::Entity>> {
        let sql = format!("{SELECT_ROLE} ORDER BY r.name LIMIT ? OFFSET ?");
        let roles = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(roles.into_iter().map(Role::from).collect())
    }

    #[instrument(skip(self, entity), fields(name = %entity.name), err)]
    async fn insert(&mut self, entity: &Self::Entity) -> Result<Self::Entity> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO role (name, name_hash, description, active, created, last_update)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entity.name)
        .bind(name_hash(&entity.name))
        .bind(&entity.description)
        .bind(entity.active)
        .bind(entity.created)
        .bind(now)
        .execute(&mut *self.db)
        .await?;

        Ok(Role {
            id: result.last_insert_rowid(),
            last_update: now,
            ..entity.clone()
        })
    }

    #[instrument(skip(self, entity), fields(role_id = entity.id), err)]
    async fn update(&mut self, entity: &Self::Entity) -> Result<Self::Entity> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE role SET
                name = ?,
                name_hash = ?,
                description = ?,
                active = ?,
                last_update = ?
            WHERE role_id = ?
            "#,
        )
        .bind(&entity.name)
        .bind(name_hash(&entity.name))
        .bind(&entity.description)
        .bind(entity.active)
        .bind(now)
        .bind(entity.id)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(Role {
            last_update: now,
            ..entity.clone()
        })
    }

    #[instrument(skip(self, entity), fields(role_id = entity.id), err)]
    async fn delete(&mut self, entity: Self::Entity) -> Result<bool> {
        // junction rows go with it through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM role WHERE role_id = ?")
            .bind(entity.id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl<'c> Roles<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn count(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM role").fetch_one(&mut *self.db).await?;

        Ok(count)
    }

    /// Roles that grant the permission
    #[instrument(skip(self), err)]
    pub async fn get_by_permission_id(&mut self, permission_id: PermissionId) -> Result<Vec<Role>> {
        let sql = format!(
            "{SELECT_ROLE}
            INNER JOIN role_permission AS rp ON rp.role_id = r.role_id
            WHERE rp.permission_id = ?
            ORDER BY r.name"
        );
        let roles = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(permission_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(roles.into_iter().map(Role::from).collect())
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_permission_name(&mut self, permission_name: &str) -> Result<Vec<Role>> {
        let sql = format!(
            "{SELECT_ROLE}
            INNER JOIN role_permission AS rp ON rp.role_id = r.role_id
            INNER JOIN permission AS p ON p.permission_id = rp.permission_id
            WHERE p.name_hash = ?
            ORDER BY r.name"
        );
        let roles = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(name_hash(permission_name))
            .fetch_all(&mut *self.db)
            .await?;

        Ok(roles.into_iter().map(Role::from).collect())
    }

    /// Roles held by the user
    #[instrument(skip(self), err)]
    pub async fn get_by_user_id(&mut self, user_id: UserId) -> Result<Vec<Role>> {
        let sql = format!(
            "{SELECT_ROLE}
            INNER JOIN user_role AS ur ON ur.role_id = r.role_id
            WHERE ur.user_id = ?
            ORDER BY r.name"
        );
        let roles = sqlx::query_as::<_, RoleRow>(&sql).bind(user_id).fetch_all(&mut *self.db).await?;

        Ok(roles.into_iter().map(Role::from).collect())
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_user_name(&mut self, user_name: &str) -> Result<Vec<Role>> {
        let sql = format!(
            "{SELECT_ROLE}
            INNER JOIN user_role AS ur ON ur.role_id = r.role_id
            INNER JOIN user AS u ON u.user_id = ur.user_id
            WHERE u.name_hash = ?
            ORDER BY r.name"
        );
        let roles = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(name_hash(user_name))
            .fetch_all(&mut *self.db)
            .await?;

        Ok(roles.into_iter().map(Role::from).collect())
    }

    /// Grant a permission to a role. Granting twice is a no-op.
    #[instrument(skip(self), err)]
    pub async fn add_permission(&mut self, role_id: RoleId, permission_id: PermissionId) -> Result<()> {
        match sqlx::query("INSERT INTO role_permission (role_id, permission_id) VALUES (?, ?) ON CONFLICT DO NOTHING")
            .bind(role_id)
            .bind(permission_id)
            .execute(&mut *self.db)
            .await
        {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                // Foreign key violation means either role or permission doesn't exist
                Err(DbError::NotFound)
            }
            Err(e) => Err(DbError::from(e)),
        }
    }

    /// Returns whether the permission was granted before
    #[instrument(skip(self), err)]
    pub async fn remove_permission(&mut self, role_id: RoleId, permission_id: PermissionId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM role_permission WHERE role_id = ? AND permission_id = ?")
            .bind(role_id)
            .bind(permission_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Make the user a member of the role. Adding twice is a no-op.
    #[instrument(skip(self), err)]
    pub async fn add_user(&mut self, role_id: RoleId, user_id: UserId) -> Result<()> {
        match sqlx::query("INSERT INTO user_role (user_id, role_id) VALUES (?, ?) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *self.db)
            .await
        {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                // Foreign key violation means either user or role doesn't exist
                Err(DbError::NotFound)
            }
            Err(e) => Err(DbError::from(e)),
        }
    }

    /// Returns whether the user was a member before
    #[instrument(skip(self), err)]
    pub async fn remove_user(&mut self, role_id: RoleId, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_role WHERE user_id = ? AND role_id = ?")
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_permission, create_test_role, create_test_user};
    use sqlx::SqlitePool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_save_and_fetch_role(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Roles::new(&mut conn);

        assert!(repo.get_by_id(1).await.unwrap().is_none());

        let mut role = repo.create();
        role.name = "Users".to_string();
        role.active = true;
        let saved = repo.save(&role).await.unwrap();
        assert_eq!(saved.id, 1);

        let found = repo.get_by_name("Users").await.unwrap().unwrap();
        assert_eq!(found.id, 1);
        assert!(found.active);
        assert!(found.users.is_empty());
        assert!(found.permissions.is_empty());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_add_permission_is_idempotent(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let permission = create_test_permission(&mut conn, "see users").await;
        let role = create_test_role(&mut conn, "Users").await;

        let mut repo = Roles::new(&mut conn);
        repo.add_permission(role.id, permission.id).await.unwrap();
        repo.add_permission(role.id, permission.id).await.unwrap();

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM role_permission").fetch_one(&mut *conn).await.unwrap();
        assert_eq!(rows, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_add_permission_to_missing_role_is_not_found(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let permission = create_test_permission(&mut conn, "see users").await;

        let mut repo = Roles::new(&mut conn);
        let result = repo.add_permission(42, permission.id).await;
        assert!(matches!(result, Err(DbError::NotFound)));

        let result = repo.add_user(42, 1).await;
        assert!(matches!(result, Err(DbError::NotFound)));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_lookups_by_permission_and_user(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let permission = create_test_permission(&mut conn, "see users").await;
        let admins = create_test_role(&mut conn, "Administrator").await;
        let users = create_test_role(&mut conn, "Users").await;
        create_test_role(&mut conn, "Guests").await;
        let root = create_test_user(&mut conn, "root").await;

        let mut repo = Roles::new(&mut conn);
        repo.add_permission(users.id, permission.id).await.unwrap();
        repo.add_permission(admins.id, permission.id).await.unwrap();
        repo.add_user(admins.id, root.id).await.unwrap();

        let names: Vec<String> = repo.get_by_permission_name("see users").await.unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Administrator", "Users"]);
        assert_eq!(repo.get_by_permission_id(permission.id).await.unwrap().len(), 2);

        let of_root = repo.get_by_user_name("root").await.unwrap();
        assert_eq!(of_root.len(), 1);
        assert_eq!(of_root[0].id, admins.id);
        assert_eq!(repo.get_by_user_id(root.id).await.unwrap().len(), 1);
        assert!(repo.get_by_user_name("nobody").await.unwrap().is_empty());

        assert!(repo.remove_user(admins.id, root.id).await.unwrap());
        assert!(!repo.remove_user(admins.id, root.id).await.unwrap());
        assert!(repo.get_by_user_id(root.id).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_cascades_to_junctions(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let permission = create_test_permission(&mut conn, "see users").await;
        let role = create_test_role(&mut conn, "Users").await;

        let mut repo = Roles::new(&mut conn);
        repo.add_permission(role.id, permission.id).await.unwrap();
        assert!(repo.delete(role).await.unwrap());

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM role_permission").fetch_one(&mut *conn).await.unwrap();
        assert_eq!(rows, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_bulk_and_paging(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let admins = create_test_role(&mut conn, "Admins").await;
        create_test_role(&mut conn, "Readers").await;
        let users = create_test_role(&mut conn, "Users").await;

        let mut repo = Roles::new(&mut conn);
        let bulk = repo.get_bulk(vec![admins.id, users.id, 99]).await.unwrap();
        assert_eq!(bulk.len(), 2);
        assert_eq!(bulk[&admins.id].name, "Admins");
        assert_eq!(bulk[&users.id].name, "Users");

        let page = repo.fetch_limit(1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "Readers");

        assert!(repo.fetch_limit(5, 2).await.unwrap().is_empty());
        assert!(repo.fetch_limit(0, 0).await.unwrap().is_empty());
    }
}
