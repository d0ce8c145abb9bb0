//! Startup seeding: configured permissions, the administrator account, and login
//! attempt pruning.
//!
//! Every routine here is idempotent so the binary can run it on each start.

use std::time::Duration;

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, instrument};

use crate::auth::password::{self, Argon2Params};
use crate::config::AdminConfig;
use crate::db::errors::DbError;
use crate::db::handlers::{LoginAttempts, Permissions, Repository, Roles, UserGraph, Users};
use crate::db::models::{permissions::Permission, roles::Role, users::User};
use crate::errors::Error;
use crate::types::FetchMode;

/// Make sure every named permission exists. Returns how many were created.
#[instrument(skip_all, fields(count = names.len()), err)]
pub async fn ensure_permissions(names: &[String], db: &SqlitePool) -> Result<usize, Error> {
    let mut tx = db.begin().await.map_err(DbError::from)?;
    let mut permissions = Permissions::new(&mut tx);

    let mut created = 0;
    for name in names {
        if permissions.exists_by_name(name).await? {
            continue;
        }
        permissions.insert(&Permission::named(name.as_str())).await?;
        created += 1;
    }

    tx.commit().await.map_err(DbError::from)?;

    if created > 0 {
        info!(created, "Seeded permissions");
    }
    Ok(created)
}

/// Create the administrator account and role if they are missing.
///
/// The role is (re)granted every permission currently stored and the user is added to
/// it. An existing user keeps its password. Returns the administrator fetched whole.
#[instrument(skip_all, fields(name = %admin.name, role = %admin.role), err)]
pub async fn ensure_admin_user(admin: &AdminConfig, params: Argon2Params, db: &SqlitePool) -> Result<User, Error> {
    let mut tx = db.begin().await.map_err(DbError::from)?;

    let existing_role = Roles::new(&mut tx).get_by_name(&admin.role).await?;
    let role = match existing_role {
        Some(role) => role,
        None => {
            let role = Role {
                description: Some("Holds every permission".to_string()),
                active: true,
                ..Role::named(admin.role.as_str())
            };
            Roles::new(&mut tx).insert(&role).await?
        }
    };

    let all_permissions = Permissions::new(&mut tx).fetch_all().await?;
    let mut roles = Roles::new(&mut tx);
    for permission in &all_permissions {
        roles.add_permission(role.id, permission.id).await?;
    }

    let existing_user = Users::new(&mut tx).get_by_name(&admin.name).await?;
    let user = match existing_user {
        Some(user) => rehash_if_outdated(&mut tx, user, admin, params).await?,
        None => {
            let mut user = User {
                email: admin.email.clone(),
                active: true,
                ..User::named(admin.name.as_str())
            };
            if let Some(password) = &admin.password {
                user.set_password_with(password, params)?;
            }
            let user = Users::new(&mut tx).insert(&user).await?;
            info!(user_id = user.id, "Created administrator");
            user
        }
    };

    Roles::new(&mut tx).add_user(role.id, user.id).await?;

    let admin_user = UserGraph::new(&mut tx).get_by_id(user.id, FetchMode::Whole).await?;
    let admin_user = admin_user.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: user.id.to_string(),
    })?;

    tx.commit().await.map_err(DbError::from)?;
    Ok(admin_user)
}

/// Re-hash the administrator password when the configured password still verifies but
/// the stored hash was made with other Argon2 parameters.
async fn rehash_if_outdated(conn: &mut SqliteConnection, mut user: User, admin: &AdminConfig, params: Argon2Params) -> Result<User, Error> {
    let Some(plain) = &admin.password else {
        return Ok(user);
    };
    if user.password.is_empty() || !password::needs_rehash(&user.password, params)? || !user.verify_password(plain)? {
        return Ok(user);
    }

    user.set_password_with(plain, params)?;
    let user = Users::new(conn).update(&user).await?;
    info!(user_id = user.id, "Upgraded administrator password hash");
    Ok(user)
}

/// Delete login attempts older than `retention`. Returns the number of rows removed.
#[instrument(skip(db), err)]
pub async fn prune_login_attempts(retention: Duration, db: &SqlitePool) -> Result<u64, Error> {
    let mut conn = db.acquire().await.map_err(DbError::from)?;
    let seconds = i64::try_from(retention.as_secs()).unwrap_or(i64::MAX);
    let removed = LoginAttempts::new(&mut conn).delete_old_login_attempts_count(seconds).await?;

    if removed > 0 {
        info!(removed, "Pruned old login attempts");
    }
    Ok(removed)
}
