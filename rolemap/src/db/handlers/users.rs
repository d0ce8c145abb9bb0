//! Database repository for users.
//!
//! [`Users`] is the flat repository: entities come back with empty `roles` and
//! `permissions`. Use [`super::UserGraph`] to hydrate them.

use std::collections::HashMap;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::{Filter, Repository},
    models::users::User,
};
use crate::types::{PermissionId, RoleId, UserId, abbrev_uuid, name_hash};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, SqliteConnection};
use tracing::instrument;
use uuid::Uuid;

const SELECT_USER: &str = "SELECT u.user_id AS id, u.uuid, u.name, u.email, u.description, u.password, u.active, \
     u.created, u.last_update FROM user AS u";

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct UserRow {
    pub id: UserId,
    pub uuid: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub description: Option<String>,
    pub password: String,
    pub active: bool,
    pub created: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            name: row.name,
            email: row.email,
            description: row.description,
            password: row.password,
            active: row.active,
            created: row.created,
            last_update: row.last_update,
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }
}

pub struct Users<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type Entity = User;
    type Id = UserId;

    fn create(&self) -> Self::Entity {
        User::new()
    }

    #[instrument(skip(self), fields(user_id = id), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Entity>> {
        let sql = format!("{SELECT_USER} WHERE u.user_id = ?");
        let user = sqlx::query_as::<_, UserRow>(&sql).bind(id).fetch_optional(&mut *self.db).await?;

        Ok(user.map(User::from))
    }

    #[instrument(skip(self), err)]
    async fn get_by_name(&mut self, name: &str) -> Result<Option<Self::Entity>> {
        let sql = format!("{SELECT_USER} WHERE u.name_hash = ?");
        let user = sqlx::query_as::<_, UserRow>(&sql)
            .bind(name_hash(name))
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user.map(User::from))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<UserId>) -> Result<HashMap<UserId, User>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::new(SELECT_USER);
        query.push(" WHERE u.user_id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let users = query.build_query_as::<UserRow>().fetch_all(&mut *self.db).await?;

        Ok(users.into_iter().map(|u| (u.id, User::from(u))).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Filter) -> Result<Vec<Self::Entity>> {
        let sql = format!("{SELECT_USER} ORDER BY u.name LIMIT ? OFFSET ?");
        let users = sqlx::query_as::<_, UserRow>(&sql)
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(users.into_iter().map(User::from).collect())
    }

    #[instrument(skip(self, entity), fields(name = %entity.name, uuid = %abbrev_uuid(&entity.uuid)), err)]
    async fn insert(&mut self, entity: &Self::Entity) -> Result<Self::Entity> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO user (uuid, name, name_hash, email, description, password, active, created, last_update)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entity.uuid)
        .bind(&entity.name)
        .bind(name_hash(&entity.name))
        .bind(&entity.email)
        .bind(&entity.description)
        .bind(&entity.password)
        .bind(entity.active)
        .bind(entity.created)
        .bind(now)
        .execute(&mut *self.db)
        .await?;

        Ok(User {
            id: result.last_insert_rowid(),
            last_update: now,
            ..entity.clone()
        })
    }

    #[instrument(skip(self, entity), fields(user_id = entity.id), err)]
    async fn update(&mut self, entity: &Self::Entity) -> Result<Self::Entity> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE user SET
                name = ?,
                name_hash = ?,
                email = ?,
                description = ?,
                password = ?,
                active = ?,
                last_update = ?
            WHERE user_id = ?
            "#,
        )
        .bind(&entity.name)
        .bind(name_hash(&entity.name))
        .bind(&entity.email)
        .bind(&entity.description)
        .bind(&entity.password)
        .bind(entity.active)
        .bind(now)
        .bind(entity.id)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(User {
            last_update: now,
            ..entity.clone()
        })
    }

    #[instrument(skip(self, entity), fields(user_id = entity.id), err)]
    async fn delete(&mut self, entity: Self::Entity) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user WHERE user_id = ?")
            .bind(entity.id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn count(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user").fetch_one(&mut *self.db).await?;

        Ok(count)
    }

    #[instrument(skip(self), fields(uuid = %abbrev_uuid(&uuid)), err)]
    pub async fn get_by_uuid(&mut self, uuid: Uuid) -> Result<Option<User>> {
        let sql = format!("{SELECT_USER} WHERE u.uuid = ?");
        let user = sqlx::query_as::<_, UserRow>(&sql).bind(uuid).fetch_optional(&mut *self.db).await?;

        Ok(user.map(User::from))
    }

    /// Members of a role
    #[instrument(skip(self), err)]
    pub async fn get_by_role_id(&mut self, role_id: RoleId) -> Result<Vec<User>> {
        let sql = format!(
            "{SELECT_USER}
            INNER JOIN user_role AS ur ON ur.user_id = u.user_id
            WHERE ur.role_id = ?
            ORDER BY u.name"
        );
        let users = sqlx::query_as::<_, UserRow>(&sql).bind(role_id).fetch_all(&mut *self.db).await?;

        Ok(users.into_iter().map(User::from).collect())
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_role_name(&mut self, role_name: &str) -> Result<Vec<User>> {
        let sql = format!(
            "{SELECT_USER}
            INNER JOIN user_role AS ur ON ur.user_id = u.user_id
            INNER JOIN role AS r ON r.role_id = ur.role_id
            WHERE r.name_hash = ?
            ORDER BY u.name"
        );
        let users = sqlx::query_as::<_, UserRow>(&sql)
            .bind(name_hash(role_name))
            .fetch_all(&mut *self.db)
            .await?;

        Ok(users.into_iter().map(User::from).collect())
    }

    /// Users holding a permission, directly or through one of their roles
    #[instrument(skip(self), err)]
    pub async fn get_by_permission_id(&mut self, permission_id: PermissionId) -> Result<Vec<User>> {
        let sql = format!(
            "{SELECT_USER}
            WHERE u.user_id IN (
                SELECT up.user_id FROM user_permission AS up WHERE up.permission_id = ?
                UNION
                SELECT ur.user_id FROM user_role AS ur
                INNER JOIN role_permission AS rp ON rp.role_id = ur.role_id
                WHERE rp.permission_id = ?
            )
            ORDER BY u.name"
        );
        let users = sqlx::query_as::<_, UserRow>(&sql)
            .bind(permission_id)
            .bind(permission_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(users.into_iter().map(User::from).collect())
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_permission_name(&mut self, permission_name: &str) -> Result<Vec<User>> {
        let permission_id: Option<PermissionId> = sqlx::query_scalar("SELECT permission_id FROM permission WHERE name_hash = ?")
            .bind(name_hash(permission_name))
            .fetch_optional(&mut *self.db)
            .await?;

        match permission_id {
            Some(permission_id) => self.get_by_permission_id(permission_id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Grant a permission to the user directly. Granting twice is a no-op.
    #[instrument(skip(self), err)]
    pub async fn add_permission(&mut self, user_id: UserId, permission_id: PermissionId) -> Result<()> {
        match sqlx::query("INSERT INTO user_permission (user_id, permission_id) VALUES (?, ?) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(permission_id)
            .execute(&mut *self.db)
            .await
        {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                // Foreign key violation means either user or permission doesn't exist
                Err(DbError::NotFound)
            }
            Err(e) => Err(DbError::from(e)),
        }
    }

    /// Revoke a direct grant. Permissions inherited from roles are unaffected.
    #[instrument(skip(self), err)]
    pub async fn remove_permission(&mut self, user_id: UserId, permission_id: PermissionId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_permission WHERE user_id = ? AND permission_id = ?")
            .bind(user_id)
            .bind(permission_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
