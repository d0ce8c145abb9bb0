//! Scenario tests spanning several repositories.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::db::errors::DbError;
use crate::db::handlers::{LoginAttempts, Permissions, Repository, RoleGraph, Roles, UserGraph, Users};
use crate::db::models::Entity;
use crate::db::models::login_attempts::LoginAttempt;
use crate::db::models::permissions::Permission;
use crate::test_utils::{create_test_permission, create_test_role, create_test_user, seed_authorization_fixture};
use crate::types::FetchMode;

#[sqlx::test]
#[test_log::test]
async fn test_grant_then_revoke_permission_on_role(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();
    let permission = create_test_permission(&mut conn, "see users").await;
    let role = create_test_role(&mut conn, "Users").await;
    assert_eq!(permission.id, 1);
    assert_eq!(role.id, 1);

    let mut roles = RoleGraph::new(&mut conn);

    let role = roles.grant_permission(&role, &permission).await.unwrap();
    assert!(role.can(&permission));
    assert!(role.can_by_name("see users"));

    let role = roles.revoke_permission(&role, &permission).await.unwrap();
    assert!(!role.can(&permission));
    assert!(role.permissions.is_empty());
}

#[sqlx::test]
#[test_log::test]
async fn test_granting_twice_keeps_a_single_grant(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();
    let permission = create_test_permission(&mut conn, "see users").await;
    let role = create_test_role(&mut conn, "Users").await;

    let mut roles = RoleGraph::new(&mut conn);
    roles.grant_permission(&role, &permission).await.unwrap();
    let role = roles.grant_permission(&role, &permission).await.unwrap();

    assert_eq!(role.permissions.len(), 1);
}

#[sqlx::test]
#[test_log::test]
async fn test_whole_fetch_never_nests_twice(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();
    let fixture = seed_authorization_fixture(&mut conn).await;

    let role = RoleGraph::new(&mut conn)
        .get_by_id(fixture.administrators.id, FetchMode::Whole)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(role.users.len(), 1);
    assert!(role.users.iter().all(|u| u.roles.is_empty() && u.permissions.is_empty()));

    let user = UserGraph::new(&mut conn)
        .get_by_id(fixture.root.id, FetchMode::Whole)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.roles.len(), 1);
    assert!(user.roles.iter().all(|r| r.users.is_empty() && r.permissions.is_empty()));
}

#[sqlx::test]
#[test_log::test]
async fn test_effective_permissions_combine_roles_and_direct_grants(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();
    let fixture = seed_authorization_fixture(&mut conn).await;

    let alice = UserGraph::new(&mut conn)
        .get_by_id(fixture.alice.id, FetchMode::Whole)
        .await
        .unwrap()
        .unwrap();

    assert!(alice.can(&fixture.see_users)); // through Readers
    assert!(alice.can(&fixture.add_user)); // direct
    assert!(!alice.can(&fixture.delete_user));
    assert_eq!(alice.permissions.len(), 2);

    let mut names: Vec<_> = Permissions::new(&mut conn)
        .get_by_user_id(fixture.root.id)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["add user", "delete user", "see users"]);
}

#[sqlx::test]
#[test_log::test]
async fn test_void_fetch_leaves_collections_empty(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();
    let fixture = seed_authorization_fixture(&mut conn).await;

    let role = RoleGraph::new(&mut conn)
        .get_by_name("Administrator", FetchMode::Void)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(role.id, fixture.administrators.id);
    assert!(role.users.is_empty());
    assert!(role.permissions.is_empty());

    let users = UserGraph::new(&mut conn).fetch_all(FetchMode::Void).await.unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| u.roles.is_empty() && u.permissions.is_empty()));
}

#[sqlx::test]
#[test_log::test]
async fn test_deleting_a_role_detaches_members(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();
    let fixture = seed_authorization_fixture(&mut conn).await;

    assert!(Roles::new(&mut conn).delete(fixture.readers.clone()).await.unwrap());

    let alice = UserGraph::new(&mut conn)
        .get_by_id(fixture.alice.id, FetchMode::Whole)
        .await
        .unwrap()
        .unwrap();
    assert!(alice.roles.is_empty());
    assert!(!alice.can(&fixture.see_users));
    assert!(alice.can(&fixture.add_user));

    // the permission itself survives
    assert!(Permissions::new(&mut conn).exists_by_id(fixture.see_users.id).await.unwrap());
}

#[sqlx::test]
#[test_log::test]
async fn test_save_inserts_then_updates(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();
    let mut permissions = Permissions::new(&mut conn);

    let permission = permissions.save(&Permission::named("see users")).await.unwrap();
    assert!(!permission.is_new());

    let renamed = Permission {
        description: Some("List every account".to_string()),
        ..permission.clone()
    };
    let renamed = permissions.save(&renamed).await.unwrap();
    assert_eq!(renamed.id, permission.id);
    assert_eq!(renamed.description.as_deref(), Some("List every account"));
    assert_eq!(permissions.count().await.unwrap(), 1);
}

#[sqlx::test]
#[test_log::test]
async fn test_duplicate_names_are_rejected(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();
    create_test_user(&mut conn, "root").await;

    let mut duplicate = Users::new(&mut conn).create();
    duplicate.name = "root".to_string();
    let err = Users::new(&mut conn).insert(&duplicate).await.unwrap_err();

    assert!(matches!(err, DbError::UniqueViolation { .. }));
}

#[sqlx::test]
#[test_log::test]
async fn test_login_attempts_from_shared_address(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();
    let now = Utc::now();

    // root: one attempt per second, 0..=9 seconds ago
    for age in 0..10 {
        let attempt = LoginAttempt::at("root", "session-root", "10.0.0.1", now - Duration::seconds(age));
        LoginAttempts::new(&mut conn).insert(&attempt).await.unwrap();
    }
    // alice: same address, own session
    for age in 1..=3 {
        let attempt = LoginAttempt::at("alice", "session-alice", "10.0.0.1", now - Duration::seconds(age));
        LoginAttempts::new(&mut conn).insert(&attempt).await.unwrap();
    }

    let mut attempts = LoginAttempts::as_of(&mut conn, now);
    assert_eq!(attempts.fetch_attempts_with_same_user("root", 5).await.unwrap(), 5);
    assert_eq!(attempts.fetch_attempts_with_same_user("alice", 5).await.unwrap(), 3);
    assert_eq!(attempts.fetch_attempts_with_same_ip("10.0.0.1", 5).await.unwrap(), 8);
    assert_eq!(attempts.fetch_attempts_with_same_session("session-alice", 60).await.unwrap(), 3);

    assert_eq!(attempts.delete_old_login_attempts_count(5).await.unwrap(), 4);
    assert_eq!(attempts.fetch_attempts_with_same_ip("10.0.0.1", 60).await.unwrap(), 9);

    let latest = attempts.get_by_name("root").await.unwrap().unwrap();
    assert_eq!(latest.when.timestamp(), now.timestamp());
}

#[sqlx::test]
#[test_log::test]
async fn test_missing_lookups_return_none(pool: SqlitePool) {
    let mut conn = pool.acquire().await.unwrap();

    assert!(Users::new(&mut conn).get_by_name("nobody").await.unwrap().is_none());
    assert!(RoleGraph::new(&mut conn).get_by_id(42, FetchMode::Whole).await.unwrap().is_none());
    assert!(LoginAttempts::new(&mut conn).get_by_name("nobody").await.unwrap().is_none());
    assert!(UserGraph::new(&mut conn).get_by_role_name("nobody", FetchMode::Whole).await.unwrap().is_empty());
}
