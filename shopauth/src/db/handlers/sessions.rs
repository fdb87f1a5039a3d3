//! Session persistence.
//!
//! A user has at most one live session. Writing a session for a user replaces whatever token pair
//! they held before, so older tokens stop resolving.

use crate::db::{errors::Result, models::sessions::Session};
use crate::types::abbrev_uuid;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create or replace the single session row for `session.user_id`.
    async fn upsert(&self, session: &Session) -> Result<()>;

    async fn find_by_access_token(&self, access_token: &str) -> Result<Option<Session>>;

    /// The refresh token paired with `access_token`, if that access token is still current.
    async fn find_refresh_token(&self, access_token: &str) -> Result<Option<String>>;

    /// Delete the session holding `refresh_token`. Returns false when no such session exists.
    async fn delete_by_refresh_token(&self, refresh_token: &str) -> Result<bool>;

    /// Atomically consume `old_refresh_token` and store `next`.
    ///
    /// Returns false, writing nothing, when no session holds `old_refresh_token` any more. Of two
    /// callers racing on the same token exactly one observes true.
    async fn rotate(&self, old_refresh_token: &str, next: &Session) -> Result<bool>;
}

pub struct PgSessions {
    pool: PgPool,
}

impl PgSessions {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const UPSERT_SESSION: &str = r#"
    INSERT INTO sessions (user_id, access_token, refresh_token, expires_at)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (user_id) DO UPDATE
    SET access_token = EXCLUDED.access_token,
        refresh_token = EXCLUDED.refresh_token,
        expires_at = EXCLUDED.expires_at,
        updated_at = NOW()
"#;

#[async_trait]
impl SessionStore for PgSessions {
    #[instrument(skip(self, session), fields(user_id = %abbrev_uuid(&session.user_id)), err)]
    async fn upsert(&self, session: &Session) -> Result<()> {
        sqlx::query(UPSERT_SESSION)
            .bind(session.user_id)
            .bind(&session.access_token)
            .bind(&session.refresh_token)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn find_by_access_token(&self, access_token: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT user_id, access_token, refresh_token, expires_at FROM sessions WHERE access_token = $1",
        )
        .bind(access_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    #[instrument(skip_all, err)]
    async fn find_refresh_token(&self, access_token: &str) -> Result<Option<String>> {
        let refresh_token = sqlx::query_scalar::<_, String>("SELECT refresh_token FROM sessions WHERE access_token = $1")
            .bind(access_token)
            .fetch_optional(&self.pool)
            .await?;

        Ok(refresh_token)
    }

    #[instrument(skip_all, err)]
    async fn delete_by_refresh_token(&self, refresh_token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE refresh_token = $1")
            .bind(refresh_token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, old_refresh_token, next), fields(user_id = %abbrev_uuid(&next.user_id)), err)]
    async fn rotate(&self, old_refresh_token: &str, next: &Session) -> Result<bool> {
        // The DELETE takes the row lock, so a concurrent rotation of the same token blocks here and
        // then deletes nothing. Dropping the transaction without commit rolls it back.
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM sessions WHERE refresh_token = $1")
            .bind(old_refresh_token)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            debug!("Refresh token already consumed");
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(UPSERT_SESSION)
            .bind(next.user_id)
            .bind(&next.access_token)
            .bind(&next.refresh_token)
            .bind(next.expires_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
