//! Credential handling.
//!
//! # Modules
//!
//! - [`password`]: Password hashing and verification using Argon2
//!
//! Stored user passwords are PHC strings produced by [`password::hash_string`]; see
//! [`crate::db::models::users::User::set_password`].

pub mod password;
