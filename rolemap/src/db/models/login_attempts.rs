//! Database models for login attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Entity;
use crate::types::{LoginAttemptId, UNSAVED_ID};

/// One recorded login attempt. Immutable once stored; only deletion is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: LoginAttemptId,
    pub user_name: String,
    pub session_id: String,
    pub ip_address: String,
    /// When the attempt happened, as supplied by the caller
    pub when: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl LoginAttempt {
    /// Blank, unsaved attempt stamped with the current time
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: UNSAVED_ID,
            user_name: String::new(),
            session_id: String::new(),
            ip_address: String::new(),
            when: now,
            created: now,
            last_update: now,
        }
    }

    pub fn at(user_name: impl Into<String>, session_id: impl Into<String>, ip_address: impl Into<String>, when: DateTime<Utc>) -> Self {
        Self {
            user_name: user_name.into(),
            session_id: session_id.into(),
            ip_address: ip_address.into(),
            when,
            created: when,
            last_update: when,
            ..Self::new()
        }
    }
}

impl Default for LoginAttempt {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for LoginAttempt {
    fn id(&self) -> i64 {
        self.id
    }
}
