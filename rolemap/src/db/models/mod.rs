//! Domain models hydrated from database rows.
//!
//! Each model struct corresponds to one table of the authorization schema. Repositories
//! read rows into private `FromRow` structs and convert them into these models, so the
//! storage representation (name hashes, column names) can evolve independently.
//!
//! # Design Principles
//!
//! - **Unsaved vs saved**: a model with `id == 0` has never been persisted.
//!   [`Entity::is_new`] is what [`crate::db::handlers::Repository::save`] uses to pick
//!   between insert and update.
//! - **Absence**: lookups return `Option<T>`; there is no placeholder "null" entity.
//! - **One level of nesting**: [`roles::Role`] embeds users and [`users::User`] embeds
//!   roles, but embedded values never carry their own nested collections.
//!
//! # Models
//!
//! - [`permissions`]: Named permissions granted to users directly or through roles
//! - [`roles`]: Roles with their users and permissions
//! - [`users`]: User accounts with credentials, roles and effective permissions
//! - [`login_attempts`]: Immutable login attempt history for throttling

pub mod login_attempts;
pub mod permissions;
pub mod roles;
pub mod users;

use crate::types::UNSAVED_ID;

/// Common behaviour of persisted domain objects
pub trait Entity {
    /// Storage id, `0` when the entity was never saved
    fn id(&self) -> i64;

    /// True when the entity has not been inserted yet
    fn is_new(&self) -> bool {
        self.id() == UNSAVED_ID
    }
}
