//! Database repository for permissions.

use std::collections::HashMap;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::{Filter, Repository},
    models::permissions::Permission,
};
use crate::types::{PermissionId, RoleId, UserId, name_hash};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, SqliteConnection};
use tracing::instrument;

const SELECT_PERMISSION: &str = "SELECT p.permission_id AS id, p.name, p.description, p.created, p.last_update FROM permission AS p";

// Permission ids held by a user, directly or through any of its roles
const EFFECTIVE_PERMISSION_IDS: &str = "
    SELECT up.permission_id FROM user_permission AS up WHERE up.user_id = ?
    UNION
    SELECT rp.permission_id FROM role_permission AS rp
    INNER JOIN user_role AS ur ON ur.role_id = rp.role_id
    WHERE ur.user_id = ?";

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct PermissionRow {
    pub id: PermissionId,
    pub name: String,
    pub description: Option<String>,
    pub created: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            created: row.created,
            last_update: row.last_update,
        }
    }
}

pub struct Permissions<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Permissions<'c> {
    type Entity = Permission;
    type Id = PermissionId;

    fn create(&self) -> Self::Entity {
        Permission::new()
    }

    #[instrument(skip(self), fields(permission_id = id), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Entity>> {
        let sql = format!("{SELECT_PERMISSION} WHERE p.permission_id = ?");
        let permission = sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(permission.map(Permission::from))
    }

    #[instrument(skip(self), err)]
    async fn get_by_name(&mut self, name: &str) -> Result<Option<Self::Entity>> {
        let sql = format!("{SELECT_PERMISSION} WHERE p.name_hash = ?");
        let permission = sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(name_hash(name))
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(permission.map(Permission::from))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<PermissionId>) -> Result<HashMap<PermissionId, Permission>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::new(SELECT_PERMISSION);
        query.push(" WHERE p.permission_id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let permissions = query.build_query_as::<PermissionRow>().fetch_all(&mut *self.db).await?;

        Ok(permissions.into_iter().map(|p| (p.id, Permission::from(p))).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Filter) -> Result<Vec<Self::Entity>> {
        let sql = format!("{SELECT_PERMISSION} ORDER BY p.name LIMIT ? OFFSET ?");
        let permissions = sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(permissions.into_iter().map(Permission::from).collect())
    }

    #[instrument(skip(self, entity), fields(name = %entity.name), err)]
    async fn insert(&mut self, entity: &Self::Entity) -> Result<Self::Entity> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO permission (name, name_hash, description, created, last_update)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entity.name)
        .bind(name_hash(&entity.name))
        .bind(&entity.description)
        .bind(entity.created)
        .bind(now)
        .execute(&mut *self.db)
        .await?;

        Ok(Permission {
            id: result.last_insert_rowid(),
            last_update: now,
            ..entity.clone()
        })
    }

    #[instrument(skip(self, entity), fields(permission_id = entity.id), err)]
    async fn update(&mut self, entity: &Self::Entity) -> Result<Self::Entity> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE permission SET
                name = ?,
                name_hash = ?,
                description = ?,
                last_update = ?
            WHERE permission_id = ?
            "#,
        )
        .bind(&entity.name)
        .bind(name_hash(&entity.name))
        .bind(&entity.description)
        .bind(now)
        .bind(entity.id)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(Permission {
            last_update: now,
            ..entity.clone()
        })
    }

    #[instrument(skip(self, entity), fields(permission_id = entity.id), err)]
    async fn delete(&mut self, entity: Self::Entity) -> Result<bool> {
        let result = sqlx::query("DELETE FROM permission WHERE permission_id = ?")
            .bind(entity.id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl<'c> Permissions<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn exists_by_id(&mut self, id: PermissionId) -> Result<bool> {
        let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM permission WHERE permission_id = ?)")
            .bind(id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(exists != 0)
    }

    #[instrument(skip(self), err)]
    pub async fn exists_by_name(&mut self, name: &str) -> Result<bool> {
        let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM permission WHERE name_hash = ?)")
            .bind(name_hash(name))
            .fetch_one(&mut *self.db)
            .await?;

        Ok(exists != 0)
    }

    /// Permissions granted to a role
    #[instrument(skip(self), err)]
    pub async fn get_by_role_id(&mut self, role_id: RoleId) -> Result<Vec<Permission>> {
        let sql = format!(
            "{SELECT_PERMISSION}
            INNER JOIN role_permission AS rp ON rp.permission_id = p.permission_id
            WHERE rp.role_id = ?
            ORDER BY p.name"
        );
        let permissions = sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(role_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(permissions.into_iter().map(Permission::from).collect())
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_role_name(&mut self, role_name: &str) -> Result<Vec<Permission>> {
        let sql = format!(
            "{SELECT_PERMISSION}
            INNER JOIN role_permission AS rp ON rp.permission_id = p.permission_id
            INNER JOIN role AS r ON r.role_id = rp.role_id
            WHERE r.name_hash = ?
            ORDER BY p.name"
        );
        let permissions = sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(name_hash(role_name))
            .fetch_all(&mut *self.db)
            .await?;

        Ok(permissions.into_iter().map(Permission::from).collect())
    }

    /// Effective permissions of a user: direct grants plus those inherited from roles
    #[instrument(skip(self), err)]
    pub async fn get_by_user_id(&mut self, user_id: UserId) -> Result<Vec<Permission>> {
        let sql = format!("{SELECT_PERMISSION} WHERE p.permission_id IN ({EFFECTIVE_PERMISSION_IDS}) ORDER BY p.name");
        let permissions = sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(user_id)
            .bind(user_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(permissions.into_iter().map(Permission::from).collect())
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_user_name(&mut self, user_name: &str) -> Result<Vec<Permission>> {
        let user_id: Option<UserId> = sqlx::query_scalar("SELECT user_id FROM user WHERE name_hash = ?")
            .bind(name_hash(user_name))
            .fetch_optional(&mut *self.db)
            .await?;

        match user_id {
            Some(user_id) => self.get_by_user_id(user_id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Permissions granted to the user directly, ignoring roles
    #[instrument(skip(self), err)]
    pub async fn get_direct_by_user_id(&mut self, user_id: UserId) -> Result<Vec<Permission>> {
        let sql = format!(
            "{SELECT_PERMISSION}
            INNER JOIN user_permission AS up ON up.permission_id = p.permission_id
            WHERE up.user_id = ?
            ORDER BY p.name"
        );
        let permissions = sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(user_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(permissions.into_iter().map(Permission::from).collect())
    }

    /// Map the digest of every effective permission name of a user to its position in
    /// ascending digest order.
    #[instrument(skip(self), err)]
    pub async fn fetch_user_permission_hash_table(&mut self, user_id: UserId) -> Result<HashMap<String, usize>> {
        let sql = format!(
            "SELECT p.name_hash FROM permission AS p WHERE p.permission_id IN ({EFFECTIVE_PERMISSION_IDS}) ORDER BY p.name_hash"
        );
        let hashes: Vec<String> = sqlx::query_scalar(&sql).bind(user_id).bind(user_id).fetch_all(&mut *self.db).await?;

        Ok(hashes.into_iter().enumerate().map(|(index, hash)| (hash, index)).collect())
    }

    #[instrument(skip(self), err)]
    pub async fn count(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM permission").fetch_one(&mut *self.db).await?;

        Ok(count)
    }
}
