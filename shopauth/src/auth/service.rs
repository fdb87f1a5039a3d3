//! Registration, login, token refresh and logout.
//!
//! [`AuthService`] owns the session lifecycle: every successful register/login/refresh leaves the
//! user with exactly one stored session holding the freshly issued token pair.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::{
    api::models::users::Role,
    auth::{
        current_user::CurrentUser,
        password::{self, Argon2Params},
        tokens::{TokenCodec, TokenKind},
    },
    config::AuthConfig,
    db::{
        errors::DbError,
        handlers::{SessionStore, UserStore},
        models::{
            sessions::Session,
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
    errors::{Error, Result},
    types::abbrev_uuid,
};

const DUMMY_PASSWORD: &str = "not-a-real-account-password";

/// A freshly started session as handed back to the caller.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub user: CurrentUser,
    pub email: String,
    pub access_token: String,
}

pub struct AuthService {
    tokens: TokenCodec,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    argon2: Argon2Params,
    /// Verified against when the email is unknown, so both login failures cost one argon2 run.
    dummy_hash: String,
    default_role: Role,
    enforce_session_lookup: bool,
}

impl AuthService {
    /// Fails with [`Error::Config`] when either signing secret is missing.
    pub fn new(config: &AuthConfig, users: Arc<dyn UserStore>, sessions: Arc<dyn SessionStore>) -> Result<Self> {
        let argon2 = config.password.argon2_params();
        Ok(Self {
            tokens: TokenCodec::new(config)?,
            users,
            sessions,
            argon2,
            dummy_hash: password::hash_password(DUMMY_PASSWORD, argon2)?,
            default_role: config.default_role,
            enforce_session_lookup: config.enforce_session_lookup,
        })
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    /// Issue a new token pair for `user` and make it their only session.
    async fn start_session(&self, user: &UserDBResponse) -> Result<SessionTokens> {
        let (session, tokens) = self.issue_pair(user)?;
        self.sessions.upsert(&session).await?;
        Ok(tokens)
    }

    fn issue_pair(&self, user: &UserDBResponse) -> Result<(Session, SessionTokens)> {
        let access = self.tokens.issue(TokenKind::Access, user.id, Some(user.role))?;
        let refresh = self.tokens.issue(TokenKind::Refresh, user.id, None)?;

        let session = Session {
            user_id: user.id,
            access_token: access.token.clone(),
            refresh_token: refresh.token,
            expires_at: refresh.expires_at,
        };
        let tokens = SessionTokens {
            user: CurrentUser {
                id: user.id,
                role: user.role,
            },
            email: user.email.clone(),
            access_token: access.token,
        };
        Ok((session, tokens))
    }

    #[instrument(skip_all, err)]
    pub async fn register(&self, email: &str, password: &str, role: Option<Role>) -> Result<SessionTokens> {
        if self.users.get_by_email(email).await?.is_some() {
            return Err(Error::Conflict {
                message: "An account with this email address already exists".to_string(),
            });
        }

        let password_hash = password::hash_password_blocking(password.to_string(), self.argon2).await?;
        let request = UserCreateDBRequest {
            email: email.to_string(),
            password_hash,
            role: role.unwrap_or(self.default_role),
        };

        // A concurrent registration can still win the race to the unique index
        let user = self.users.create(&request).await.map_err(|e| match e {
            DbError::UniqueViolation { .. } => Error::Conflict {
                message: "An account with this email address already exists".to_string(),
            },
            other => Error::Database(other),
        })?;

        info!(user_id = %abbrev_uuid(&user.id), role = %user.role, "Registered user");
        self.start_session(&user).await
    }

    #[instrument(skip_all, err)]
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionTokens> {
        let Some(user) = self.users.get_by_email(email).await? else {
            debug!("Login for unknown email");
            password::verify_password_blocking(password.to_string(), self.dummy_hash.clone()).await?;
            return Err(Error::InvalidCredentials);
        };

        if !password::verify_password_blocking(password.to_string(), user.password_hash.clone()).await? {
            debug!(user_id = %abbrev_uuid(&user.id), "Login with wrong password");
            return Err(Error::InvalidCredentials);
        }

        self.start_session(&user).await
    }

    /// Exchange a refresh token for a new token pair, consuming it.
    ///
    /// The role in the new access token comes from the stored user, never from a token. Of two
    /// concurrent calls with the same token, one fails with [`Error::InvalidToken`].
    #[instrument(skip_all, err)]
    pub async fn refresh(&self, old_refresh_token: &str) -> Result<SessionTokens> {
        let claims = self
            .tokens
            .verified_claims(TokenKind::Refresh, old_refresh_token)
            .ok_or(Error::InvalidToken)?;

        let Some(user) = self.users.get_by_id(claims.sub).await? else {
            warn!(user_id = %abbrev_uuid(&claims.sub), "Refresh token for a user that no longer exists");
            return Err(Error::InvalidToken);
        };

        let (session, tokens) = self.issue_pair(&user)?;
        if !self.sessions.rotate(old_refresh_token, &session).await? {
            debug!(user_id = %abbrev_uuid(&user.id), "Lost refresh rotation; token already consumed");
            return Err(Error::InvalidToken);
        }

        debug!(user_id = %abbrev_uuid(&user.id), "Rotated session");
        Ok(tokens)
    }

    /// End the session the access token belongs to. Succeeds whether or not one exists.
    #[instrument(skip_all, err)]
    pub async fn logout(&self, access_token: Option<&str>) -> Result<()> {
        let Some(access_token) = access_token else {
            return Ok(());
        };

        if let Some(refresh_token) = self.sessions.find_refresh_token(access_token).await? {
            let deleted = self.sessions.delete_by_refresh_token(&refresh_token).await?;
            debug!(deleted, "Logged out");
        }
        Ok(())
    }

    /// Identity carried by a still-valid access token.
    pub async fn authenticate_access(&self, access_token: &str) -> Result<Option<CurrentUser>> {
        let Some(claims) = self.tokens.verified_claims(TokenKind::Access, access_token) else {
            return Ok(None);
        };
        let Some(role) = claims.role else {
            return Ok(None);
        };

        if self.enforce_session_lookup && self.sessions.find_by_access_token(access_token).await?.is_none() {
            debug!(user_id = %abbrev_uuid(&claims.sub), "Access token is no longer the current session");
            return Ok(None);
        }

        Ok(Some(CurrentUser { id: claims.sub, role }))
    }

    pub async fn find_refresh_token(&self, access_token: &str) -> Result<Option<String>> {
        Ok(self.sessions.find_refresh_token(access_token).await?)
    }

    /// Create the configured initial admin if no account with that email exists yet.
    #[instrument(skip(self, password), err)]
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<()> {
        if let Some(existing) = self.users.get_by_email(email).await? {
            if existing.role != Role::Admin {
                warn!(user_id = %abbrev_uuid(&existing.id), "Configured admin email belongs to a non-admin account");
            }
            return Ok(());
        }

        let password_hash = password::hash_password_blocking(password.to_string(), self.argon2).await?;
        let user = self
            .users
            .create(&UserCreateDBRequest {
                email: email.to_string(),
                password_hash,
                role: Role::Admin,
            })
            .await?;
        info!(user_id = %abbrev_uuid(&user.id), "Created initial admin user");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::in_memory::InMemoryStore;
    use crate::test_utils::create_test_config;

    fn create_service(store: &InMemoryStore) -> AuthService {
        let config = create_test_config();
        AuthService::new(&config.auth, Arc::new(store.clone()), Arc::new(store.clone())).unwrap()
    }

    #[tokio::test]
    async fn test_register_then_login_subject_matches() {
        let store = InMemoryStore::new();
        let service = create_service(&store);

        let registered = service.register("ann@example.com", "Tomato123", Some(Role::FruitGuy)).await.unwrap();
        assert_eq!(registered.user.role, Role::FruitGuy);

        let logged_in = service.login("ann@example.com", "Tomato123").await.unwrap();
        let claims = service
            .tokens()
            .verified_claims(TokenKind::Access, &logged_in.access_token)
            .unwrap();
        assert_eq!(claims.sub, registered.user.id);
        assert_eq!(claims.role, Some(Role::FruitGuy));

        // Login replaced the registration session
        assert_eq!(store.session_count(), 1);
        assert!(service.find_refresh_token(&registered.access_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_uses_default_role() {
        let store = InMemoryStore::new();
        let service = create_service(&store);

        let registered = service.register("bob@example.com", "Tomato123", None).await.unwrap();
        assert_eq!(registered.user.role, Role::VegetableGuy);
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let store = InMemoryStore::new();
        let service = create_service(&store);

        service.register("ann@example.com", "Tomato123", None).await.unwrap();
        let err = service.register("ann@example.com", "Other1234", None).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));

        // Emails are compared exactly
        service.register("Ann@example.com", "Tomato123", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_password_indistinguishable_from_unknown_email() {
        let store = InMemoryStore::new();
        let service = create_service(&store);
        service.register("ann@example.com", "Tomato123", None).await.unwrap();

        let wrong_password = service.login("ann@example.com", "Tomato124").await.unwrap_err();
        let unknown_email = service.login("nobody@example.com", "Tomato123").await.unwrap_err();

        assert!(matches!(wrong_password, Error::InvalidCredentials));
        assert!(matches!(unknown_email, Error::InvalidCredentials));
        assert_eq!(wrong_password.status_code(), unknown_email.status_code());
        assert_eq!(wrong_password.user_message(), unknown_email.user_message());
    }

    #[tokio::test]
    async fn test_unknown_email_pays_for_a_password_check() {
        let store = InMemoryStore::new();
        let service = create_service(&store);

        // The dummy hash is a real argon2 hash, so the unknown-email branch does a full verify
        assert!(password::verify_password(DUMMY_PASSWORD, &service.dummy_hash).unwrap());
        assert!(!password::verify_password("Tomato123", &service.dummy_hash).unwrap());

        // Matching the dummy password never admits anyone
        let result = service.login("nobody@example.com", DUMMY_PASSWORD).await;
        assert!(matches!(result, Err(Error::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_refresh_rotates_session() {
        let store = InMemoryStore::new();
        let service = create_service(&store);
        let registered = service.register("ann@example.com", "Tomato123", Some(Role::FruitGuy)).await.unwrap();
        let old_refresh = store.session_for_user(registered.user.id).unwrap().refresh_token;

        let refreshed = service.refresh(&old_refresh).await.unwrap();
        assert_eq!(refreshed.user, registered.user);
        assert_ne!(refreshed.access_token, registered.access_token);

        let current = store.session_for_user(registered.user.id).unwrap();
        assert_eq!(current.access_token, refreshed.access_token);
        assert_ne!(current.refresh_token, old_refresh);

        // Single use
        assert!(matches!(service.refresh(&old_refresh).await, Err(Error::InvalidToken)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_refresh_single_winner() {
        let store = InMemoryStore::new();
        let service = Arc::new(create_service(&store));
        let registered = service.register("ann@example.com", "Tomato123", None).await.unwrap();
        let old_refresh = store.session_for_user(registered.user.id).unwrap().refresh_token;

        let first = tokio::spawn({
            let service = service.clone();
            let token = old_refresh.clone();
            async move { service.refresh(&token).await }
        });
        let second = tokio::spawn({
            let service = service.clone();
            let token = old_refresh.clone();
            async move { service.refresh(&token).await }
        });
        let results = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results.iter().filter(|r| matches!(r, Err(Error::InvalidToken))).count(),
            1
        );
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_tokens_and_garbage() {
        let store = InMemoryStore::new();
        let service = create_service(&store);
        let registered = service.register("ann@example.com", "Tomato123", None).await.unwrap();

        assert!(matches!(service.refresh(&registered.access_token).await, Err(Error::InvalidToken)));
        assert!(matches!(service.refresh("garbage").await, Err(Error::InvalidToken)));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let store = InMemoryStore::new();
        let service = create_service(&store);

        service.logout(None).await.unwrap();
        service.logout(Some("never-issued")).await.unwrap();

        let registered = service.register("ann@example.com", "Tomato123", None).await.unwrap();
        service.logout(Some(&registered.access_token)).await.unwrap();
        assert_eq!(store.session_count(), 0);
        service.logout(Some(&registered.access_token)).await.unwrap();
    }

    #[tokio::test]
    async fn test_session_lookup_revokes_logged_out_tokens() {
        let store = InMemoryStore::new();
        let mut config = create_test_config();
        config.auth.enforce_session_lookup = true;
        let service = AuthService::new(&config.auth, Arc::new(store.clone()), Arc::new(store.clone())).unwrap();

        let registered = service.register("ann@example.com", "Tomato123", None).await.unwrap();
        assert!(service.authenticate_access(&registered.access_token).await.unwrap().is_some());

        service.logout(Some(&registered.access_token)).await.unwrap();
        assert!(service.authenticate_access(&registered.access_token).await.unwrap().is_none());

        // Without the lookup the token stays valid until it expires
        let stateless = create_service(&store);
        assert!(stateless.authenticate_access(&registered.access_token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let store = InMemoryStore::new();
        let service = create_service(&store);

        service.ensure_admin("root@example.com", "Admin1234").await.unwrap();
        service.ensure_admin("root@example.com", "Admin1234").await.unwrap();

        let admin = service.users().get_by_email("root@example.com").await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        service.login("root@example.com", "Admin1234").await.unwrap();
    }
}
