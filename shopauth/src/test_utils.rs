//! Shared fixtures for unit and router tests. Everything runs against [`InMemoryStore`].

use std::sync::Arc;

use crate::{
    AppState,
    api::models::users::Role,
    auth::{current_user::CurrentUser, permissions::PermissionEngine, policy::AccessPolicy, service::AuthService},
    config::{AccessTokenConfig, AuthConfig, Config, PasswordConfig, RefreshTokenConfig},
    db::in_memory::InMemoryStore,
};

pub const TEST_PASSWORD: &str = "Password1";

pub fn create_test_config() -> Config {
    Config {
        auth: AuthConfig {
            access_token: AccessTokenConfig {
                secret: Some("test-access-secret".to_string()),
                ..Default::default()
            },
            refresh_token: RefreshTokenConfig {
                secret: Some("test-refresh-secret".to_string()),
                ..Default::default()
            },
            // Minimal argon2 cost keeps the suite fast
            password: PasswordConfig {
                argon2_memory_kib: 128,
                argon2_iterations: 1,
                argon2_parallelism: 1,
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

/// App state over a fresh in-memory store, with no route rules. The store handle is returned so
/// tests can seed products and inspect sessions.
pub fn create_test_state() -> (AppState, InMemoryStore) {
    let config = create_test_config();
    let store = InMemoryStore::new();

    let auth = AuthService::new(&config.auth, Arc::new(store.clone()), Arc::new(store.clone()))
        .expect("Failed to create auth service");

    let state = AppState::builder()
        .permissions(Arc::new(PermissionEngine::new(config.permissions.clone())))
        .config(Arc::new(config))
        .auth(Arc::new(auth))
        .catalog(Arc::new(store.clone()))
        .access_policy(Arc::new(AccessPolicy::default()))
        .build();

    (state, store)
}

/// Register a user with [`TEST_PASSWORD`] and return them with their access token.
pub async fn create_test_user(state: &AppState, email: &str, role: Role) -> (CurrentUser, String) {
    let session = state
        .auth
        .register(email, TEST_PASSWORD, Some(role))
        .await
        .expect("Failed to create test user");
    (session.user, session.access_token)
}
