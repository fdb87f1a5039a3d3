//! # shopauth: authentication and category-scoped authorization for a small shop backend
//!
//! Users register and log in with email and password and receive a short-lived access token
//! (in an `HttpOnly` cookie and in the response body) backed by a longer-lived refresh token
//! that never leaves the server. Protected routes pass through two layers:
//!
//! 1. [`auth::middleware::require_auth`] admits a valid access token, or silently rotates the
//!    caller's session when the access token has lapsed but the stored refresh token is still good.
//! 2. [`auth::middleware::authorize`] looks up the route in the configured
//!    [`auth::policy::AccessPolicy`] and asks the [`auth::permissions::PermissionEngine`] whether
//!    the caller's role may perform the action on the target product's category.
//!
//! ## Storage
//!
//! Users, sessions and the product catalog sit behind the traits in [`db::handlers`]. The
//! in-memory implementation is the default; set `DATABASE_URL` (or `database.type: postgres`)
//! to use PostgreSQL, in which case migrations run on startup.
//!
//! ## Configuration
//!
//! See [`config`]: a YAML file, `SHOPAUTH_`-prefixed environment variables, and the unprefixed
//! `JWT_SECRET`, `JWT_REFRESH_SECRET` and `DATABASE_URL`.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod telemetry;
#[cfg(test)]
mod test_utils;
pub mod types;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    http::{self, HeaderValue},
    middleware::from_fn_with_state,
    routing::{get, post},
};
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info, instrument};

pub use config::Config;

use crate::{
    auth::{
        middleware::{authorize, require_auth},
        permissions::PermissionEngine,
        policy::AccessPolicy,
        service::AuthService,
    },
    config::{CorsOrigin, DatabaseConfig},
    db::{
        handlers::{PgProducts, PgSessions, PgUsers, ResourceClassResolver, SessionStore, UserStore},
        in_memory::InMemoryStore,
    },
};

/// Shared state handed to every handler and middleware.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<AuthService>,
    pub catalog: Arc<dyn ResourceClassResolver>,
    pub permissions: Arc<PermissionEngine>,
    pub access_policy: Arc<AccessPolicy>,
}

/// Get the shopauth database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Wrap `router` so every route in it requires authentication and then passes the access policy.
///
/// Layers run outermost-first, so `require_auth` (added last) sees the request before `authorize`.
pub fn protect(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router
        .route_layer(from_fn_with_state(state.clone(), authorize))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.cors.allow_credentials)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::PATCH,
            http::Method::DELETE,
        ])
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router: the public auth endpoints plus the guarded user routes.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let auth_routes = Router::new()
        .route("/auth/status", get(api::handlers::auth::get_status))
        .route("/auth/register", post(api::handlers::auth::register))
        .route("/auth/login", post(api::handlers::auth::login))
        .route("/auth/logout", post(api::handlers::auth::logout));

    let protected_routes = protect(
        Router::new().route("/user/profile", get(api::handlers::users::get_profile)),
        &state,
    );

    let cors_layer = create_cors_layer(&state.config)?;

    let router = auth_routes
        .merge(protected_routes)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(cors_layer),
        );

    Ok(router)
}

/// The storage backends selected by [`DatabaseConfig`].
struct Stores {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    catalog: Arc<dyn ResourceClassResolver>,
    pool: Option<PgPool>,
}

async fn setup_stores(config: &DatabaseConfig) -> anyhow::Result<Stores> {
    match config {
        DatabaseConfig::InMemory => {
            info!("Using in-memory store; nothing will survive a restart");
            let store = InMemoryStore::new();
            Ok(Stores {
                users: Arc::new(store.clone()),
                sessions: Arc::new(store.clone()),
                catalog: Arc::new(store),
                pool: None,
            })
        }
        DatabaseConfig::Postgres { url, pool } => {
            let pg = PgPoolOptions::new()
                .max_connections(pool.max_connections)
                .min_connections(pool.min_connections)
                .acquire_timeout(pool.acquire_timeout)
                .connect(url)
                .await
                .context("Failed to connect to database")?;

            migrator().run(&pg).await.context("Failed to run migrations")?;
            info!("Database migrations applied");

            Ok(Stores {
                users: Arc::new(PgUsers::new(pg.clone())),
                sessions: Arc::new(PgSessions::new(pg.clone())),
                catalog: Arc::new(PgProducts::new(pg.clone())),
                pool: Some(pg),
            })
        }
    }
}

pub struct Application {
    router: Router,
    config: Arc<Config>,
    pool: Option<PgPool>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let stores = setup_stores(&config.database).await?;

        let auth = AuthService::new(&config.auth, stores.users, stores.sessions)?;
        if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
            auth.ensure_admin(email, password).await?;
        }

        let access_policy = AccessPolicy::from_rules(&config.access_policy)?;
        if access_policy.is_empty() {
            info!("No access rules configured; protected routes only require authentication");
        } else {
            info!(rules = access_policy.len(), "Loaded access policy");
        }
        let config = Arc::new(config);

        let app_state = AppState::builder()
            .config(config.clone())
            .auth(Arc::new(auth))
            .catalog(stores.catalog)
            .permissions(Arc::new(PermissionEngine::new(config.permissions.clone())))
            .access_policy(Arc::new(access_policy))
            .build();

        let router = build_router(app_state)?;

        Ok(Self {
            router,
            config,
            pool: stores.pool,
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "shopauth listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_config, create_test_state};
    use axum::http::StatusCode;
    use axum_test::TestServer;

    #[tokio::test]
    async fn test_application_seeds_admin() {
        let mut config = create_test_config();
        config.admin_email = Some("root@example.com".to_string());
        config.admin_password = Some("Admin1234".to_string());

        let app = Application::new(config).await.unwrap();
        let server = TestServer::new(app.router).unwrap();

        let response = server
            .post("/auth/login")
            .json(&serde_json::json!({ "email": "root@example.com", "password": "Admin1234" }))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["role"], "Admin");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (state, _store) = create_test_state();
        let server = TestServer::new(build_router(state).unwrap()).unwrap();
        server.get("/nope").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_cors_layer_from_defaults() {
        let config = create_test_config();
        assert!(create_cors_layer(&config).is_ok());
    }
}
