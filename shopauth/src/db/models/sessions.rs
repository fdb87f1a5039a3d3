//! Database models for sessions.

use crate::types::UserId;
use chrono::{DateTime, Utc};

/// The single live session of a user: the current token pair and the refresh token's expiry.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Session {
    pub user_id: UserId,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}
