//! Test utilities for integration testing (available with `test-utils` feature).

use sqlx::SqliteConnection;

use crate::db::handlers::{Permissions, Repository, Roles, Users};
use crate::db::models::{permissions::Permission, roles::Role, users::User};
use crate::types::{PermissionId, RoleId, UserId};

pub async fn create_test_permission(conn: &mut SqliteConnection, name: &str) -> Permission {
    Permissions::new(conn)
        .insert(&Permission::named(name))
        .await
        .expect("Failed to create test permission")
}

pub async fn create_test_role(conn: &mut SqliteConnection, name: &str) -> Role {
    let role = Role {
        active: true,
        ..Role::named(name)
    };
    Roles::new(conn).insert(&role).await.expect("Failed to create test role")
}

/// Active user with an `@example.com` address and no password
pub async fn create_test_user(conn: &mut SqliteConnection, name: &str) -> User {
    let user = User {
        email: Some(format!("{name}@example.com")),
        active: true,
        ..User::named(name)
    };
    Users::new(conn).insert(&user).await.expect("Failed to create test user")
}

pub async fn grant_role_permission(conn: &mut SqliteConnection, role_id: RoleId, permission_id: PermissionId) {
    Roles::new(conn)
        .add_permission(role_id, permission_id)
        .await
        .expect("Failed to grant permission to role");
}

pub async fn grant_user_permission(conn: &mut SqliteConnection, user_id: UserId, permission_id: PermissionId) {
    Users::new(conn)
        .add_permission(user_id, permission_id)
        .await
        .expect("Failed to grant permission to user");
}

pub async fn grant_user_role(conn: &mut SqliteConnection, user_id: UserId, role_id: RoleId) {
    Roles::new(conn).add_user(role_id, user_id).await.expect("Failed to add user to role");
}

/// A small authorization graph shared by scenario tests.
pub struct AuthorizationFixture {
    pub see_users: Permission,
    pub add_user: Permission,
    pub delete_user: Permission,
    pub administrators: Role,
    pub readers: Role,
    pub root: User,
    pub alice: User,
}

/// Seed the fixture graph:
///
/// - `Administrator` can `see users`, `add user`, `delete user`; `root` is a member
/// - `Readers` can `see users`; `alice` is a member
/// - `alice` is also granted `add user` directly
pub async fn seed_authorization_fixture(conn: &mut SqliteConnection) -> AuthorizationFixture {
    let see_users = create_test_permission(conn, "see users").await;
    let add_user = create_test_permission(conn, "add user").await;
    let delete_user = create_test_permission(conn, "delete user").await;

    let administrators = create_test_role(conn, "Administrator").await;
    let readers = create_test_role(conn, "Readers").await;

    let root = create_test_user(conn, "root").await;
    let alice = create_test_user(conn, "alice").await;

    for permission in [&see_users, &add_user, &delete_user] {
        grant_role_permission(conn, administrators.id, permission.id).await;
    }
    grant_role_permission(conn, readers.id, see_users.id).await;

    grant_user_role(conn, root.id, administrators.id).await;
    grant_user_role(conn, alice.id, readers.id).await;
    grant_user_permission(conn, alice.id, add_user.id).await;

    AuthorizationFixture {
        see_users,
        add_user,
        delete_user,
        administrators,
        readers,
        root,
        alice,
    }
}
