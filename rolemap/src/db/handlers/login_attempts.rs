//! Database repository for login attempts.
//!
//! Attempts are immutable history: they can be inserted, read, counted inside a rate
//! window and pruned, but never updated.

use std::collections::HashMap;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::{Filter, Repository},
    models::login_attempts::LoginAttempt,
};
use crate::types::{LoginAttemptId, Operation};
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, QueryBuilder, SqliteConnection};
use tracing::{error, instrument};

const SELECT_LOGIN_ATTEMPT: &str = "SELECT l.login_attempt_id AS id, l.user_name, l.session_id, l.ip AS ip_address, \
     l.date_time, l.created, l.last_update FROM login_attempt AS l";

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct LoginAttemptRow {
    pub id: LoginAttemptId,
    pub user_name: String,
    pub session_id: String,
    pub ip_address: String,
    pub date_time: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl From<LoginAttemptRow> for LoginAttempt {
    fn from(row: LoginAttemptRow) -> Self {
        Self {
            id: row.id,
            user_name: row.user_name,
            session_id: row.session_id,
            ip_address: row.ip_address,
            when: row.date_time,
            created: row.created,
            last_update: row.last_update,
        }
    }
}

pub struct LoginAttempts<'c> {
    db: &'c mut SqliteConnection,
    /// Reference time for rate windows, `None` means the wall clock
    now: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
impl<'c> Repository for LoginAttempts<'c> {
    type Entity = LoginAttempt;
    type Id = LoginAttemptId;

    fn create(&self) -> Self::Entity {
        LoginAttempt::new()
    }

    #[instrument(skip(self), fields(login_attempt_id = id), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Entity>> {
        let sql = format!("{SELECT_LOGIN_ATTEMPT} WHERE l.login_attempt_id = ?");
        let attempt = sqlx::query_as::<_, LoginAttemptRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(attempt.map(LoginAttempt::from))
    }

    /// Most recent attempt made with the given user name
    #[instrument(skip(self), err)]
    async fn get_by_name(&mut self, name: &str) -> Result<Option<Self::Entity>> {
        let sql = format!("{SELECT_LOGIN_ATTEMPT} WHERE l.user_name = ? ORDER BY l.date_time DESC, l.login_attempt_id DESC LIMIT 1");
        let attempt = sqlx::query_as::<_, LoginAttemptRow>(&sql)
            .bind(name)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(attempt.map(LoginAttempt::from))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<LoginAttemptId>) -> Result<HashMap<LoginAttemptId, LoginAttempt>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::new(SELECT_LOGIN_ATTEMPT);
        query.push(" WHERE l.login_attempt_id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let attempts = query.build_query_as::<LoginAttemptRow>().fetch_all(&mut *self.db).await?;

        Ok(attempts.into_iter().map(|a| (a.id, LoginAttempt::from(a))).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Filter) -> Result<Vec<Self::Entity>> {
        let sql = format!("{SELECT_LOGIN_ATTEMPT} ORDER BY l.date_time ASC, l.login_attempt_id ASC LIMIT ? OFFSET ?");
        let attempts = sqlx::query_as::<_, LoginAttemptRow>(&sql)
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(attempts.into_iter().map(LoginAttempt::from).collect())
    }

    #[instrument(skip(self, entity), fields(user_name = %entity.user_name), err)]
    async fn insert(&mut self, entity: &Self::Entity) -> Result<Self::Entity> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO login_attempt (user_name, session_id, ip, date_time, created, last_update)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entity.user_name)
        .bind(&entity.session_id)
        .bind(&entity.ip_address)
        .bind(entity.when)
        .bind(entity.created)
        .bind(now)
        .execute(&mut *self.db)
        .await?;

        Ok(LoginAttempt {
            id: result.last_insert_rowid(),
            last_update: now,
            ..entity.clone()
        })
    }

    #[instrument(skip(self, entity), fields(login_attempt_id = entity.id), err)]
    async fn update(&mut self, entity: &Self::Entity) -> Result<Self::Entity> {
        error!(login_attempt_id = entity.id, "login attempts are immutable, update rejected");

        Err(DbError::ProtectedEntity {
            operation: Operation::UpdateAll,
            reason: "Login attempts are immutable".to_string(),
            entity_type: "LoginAttempt".to_string(),
            entity_id: Some(entity.id.to_string()),
        })
    }

    #[instrument(skip(self, entity), fields(login_attempt_id = entity.id), err)]
    async fn delete(&mut self, entity: Self::Entity) -> Result<bool> {
        let result = sqlx::query("DELETE FROM login_attempt WHERE login_attempt_id = ?")
            .bind(entity.id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl<'c> LoginAttempts<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db, now: None }
    }

    /// Repository whose rate windows are measured from a fixed instant instead of the
    /// wall clock
    pub fn as_of(db: &'c mut SqliteConnection, now: DateTime<Utc>) -> Self {
        Self { db, now: Some(now) }
    }

    /// Start of the trailing window; windows reaching past the representable range start at
    /// the earliest instant
    fn cutoff(&self, seconds: i64) -> DateTime<Utc> {
        let now = self.now.unwrap_or_else(Utc::now);
        Duration::try_seconds(seconds)
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    #[instrument(skip(self), err)]
    pub async fn count(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM login_attempt").fetch_one(&mut *self.db).await?;

        Ok(count)
    }

    /// Attempts for `user_name` strictly newer than `seconds` ago
    #[instrument(skip(self), err)]
    pub async fn fetch_attempts_with_same_user(&mut self, user_name: &str, seconds: i64) -> Result<i64> {
        let cutoff = self.cutoff(seconds);
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM login_attempt WHERE user_name = ? AND date_time > ?")
            .bind(user_name)
            .bind(cutoff)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Attempts from `session_id` strictly newer than `seconds` ago
    #[instrument(skip(self), err)]
    pub async fn fetch_attempts_with_same_session(&mut self, session_id: &str, seconds: i64) -> Result<i64> {
        let cutoff = self.cutoff(seconds);
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM login_attempt WHERE session_id = ? AND date_time > ?")
            .bind(session_id)
            .bind(cutoff)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Attempts from `ip_address` strictly newer than `seconds` ago
    #[instrument(skip(self), err)]
    pub async fn fetch_attempts_with_same_ip(&mut self, ip_address: &str, seconds: i64) -> Result<i64> {
        let cutoff = self.cutoff(seconds);
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM login_attempt WHERE ip = ? AND date_time > ?")
            .bind(ip_address)
            .bind(cutoff)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Remove attempts strictly older than `seconds` ago.
    ///
    /// Returns `true` whenever the statement ran, even if nothing matched.
    #[instrument(skip(self), err)]
    pub async fn delete_old_login_attempts(&mut self, seconds: i64) -> Result<bool> {
        self.delete_old_login_attempts_count(seconds).await?;

        Ok(true)
    }

    /// Same as [`Self::delete_old_login_attempts`], reporting how many rows were removed
    #[instrument(skip(self), err)]
    pub async fn delete_old_login_attempts_count(&mut self, seconds: i64) -> Result<u64> {
        let cutoff = self.cutoff(seconds);
        let result = sqlx::query("DELETE FROM login_attempt WHERE date_time < ?")
            .bind(cutoff)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn seed_attempts(conn: &mut SqliteConnection, now: DateTime<Utc>) {
        let mut repo = LoginAttempts::as_of(conn, now);
        for seconds in 1..=10 {
            let attempt = LoginAttempt::at("root", "session-1", "192.168.1.2", now - Duration::seconds(seconds));
            repo.save(&attempt).await.unwrap();
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_rate_window_counts(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let now = Utc::now();
        seed_attempts(&mut conn, now).await;

        let mut repo = LoginAttempts::as_of(&mut conn, now);

        // the attempt exactly on the boundary is not strictly newer
        assert_eq!(repo.fetch_attempts_with_same_user("root", 5).await.unwrap(), 4);
        assert_eq!(repo.fetch_attempts_with_same_user("root", 6).await.unwrap(), 5);
        assert_eq!(repo.fetch_attempts_with_same_session("session-1", 6).await.unwrap(), 5);
        assert_eq!(repo.fetch_attempts_with_same_ip("192.168.1.2", 6).await.unwrap(), 5);

        assert_eq!(repo.fetch_attempts_with_same_user("nobody", 60).await.unwrap(), 0);
        assert_eq!(repo.fetch_attempts_with_same_ip("10.0.0.1", 60).await.unwrap(), 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_old_login_attempts(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let now = Utc::now();
        seed_attempts(&mut conn, now).await;

        let mut repo = LoginAttempts::as_of(&mut conn, now);
        assert!(repo.delete_old_login_attempts(5).await.unwrap());
        assert_eq!(repo.fetch_all().await.unwrap().len(), 5);

        // nothing left to prune still reports success
        assert!(repo.delete_old_login_attempts(5).await.unwrap());
        assert_eq!(repo.delete_old_login_attempts_count(2).await.unwrap(), 3);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_insert_keeps_caller_time(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = LoginAttempts::new(&mut conn);

        let when = Utc::now() - Duration::days(3);
        let saved = repo.save(&LoginAttempt::at("root", "session-1", "127.0.0.1", when)).await.unwrap();

        let found = repo.get_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(found.when, when);
        assert_eq!(found.ip_address, "127.0.0.1");

        let latest = repo.get_by_name("root").await.unwrap().unwrap();
        assert_eq!(latest.id, saved.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_is_rejected(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = LoginAttempts::new(&mut conn);

        let saved = repo.save(&LoginAttempt::at("root", "session-1", "127.0.0.1", Utc::now())).await.unwrap();
        let result = repo.save(&saved).await;

        assert!(matches!(
            result,
            Err(DbError::ProtectedEntity {
                operation: Operation::UpdateAll,
                ..
            })
        ));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_orders_by_time(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let now = Utc::now();
        seed_attempts(&mut conn, now).await;

        let mut repo = LoginAttempts::new(&mut conn);
        let attempts = repo.fetch_limit(0, 3).await.unwrap();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].when, now - Duration::seconds(10));
        assert!(attempts.windows(2).all(|w| w[0].when <= w[1].when));

        let last = attempts.last().cloned().unwrap();
        assert!(repo.delete(last).await.unwrap());
        assert_eq!(repo.fetch_all().await.unwrap().len(), 9);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_bulk_count_and_paging_past_end(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let now = Utc::now();
        seed_attempts(&mut conn, now).await;

        let mut repo = LoginAttempts::new(&mut conn);
        assert_eq!(repo.count().await.unwrap(), 10);

        let all = repo.fetch_all().await.unwrap();
        let bulk = repo.get_bulk(vec![all[0].id, all[1].id, 9999]).await.unwrap();
        assert_eq!(bulk.len(), 2);
        assert_eq!(bulk[&all[0].id], all[0]);
        assert!(repo.get_bulk(Vec::new()).await.unwrap().is_empty());

        assert!(repo.fetch_limit(20, 5).await.unwrap().is_empty());
        assert!(repo.fetch_limit(0, 0).await.unwrap().is_empty());
    }
}
