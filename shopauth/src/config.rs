//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `SHOPAUTH_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `SHOPAUTH_` override YAML values
//! 3. **DATABASE_URL** - Special case: switches `database` to postgres with this url
//! 4. **JWT_SECRET / JWT_REFRESH_SECRET** - Special case: set the access/refresh signing secrets
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `SHOPAUTH_AUTH__ACCESS_TOKEN__EXPIRY=5m` sets `auth.access_token.expiry`.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use shopauth::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port`, `environment`
//! - **Database**: `database.type` (`in_memory` or `postgres`), `database.url`, `database.pool`
//! - **Admin User**: `admin_email`, `admin_password` - initial admin created on startup
//! - **Authentication**: `auth.access_token`, `auth.refresh_token`, `auth.cookie`, `auth.password`
//! - **Authorization**: `permissions` (role → category → actions), `access_policy` (per-route rules)
//! - **CORS**: `cors.allowed_origins`, `cors.allow_credentials`

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::api::models::{auth::is_valid_email, users::Role};
use crate::auth::password::Argon2Params;
use crate::auth::permissions::PermissionTable;
use crate::auth::policy::RouteRule;
use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "SHOPAUTH_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// Loaded from YAML and environment variables. All fields have defaults, except the two token
/// signing secrets which must be supplied.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Deployment environment. Controls cookie `Secure`/`SameSite` attributes.
    pub environment: Environment,
    /// Set from `DATABASE_URL`; folded into `database` on load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    pub database: DatabaseConfig,
    /// Email address for the initial admin user (created on startup if absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<String>,
    pub auth: AuthConfig,
    /// Role → category → permitted actions
    pub permissions: PermissionTable,
    /// Per-route authorization requirements. Routes without a rule only require authentication.
    pub access_policy: Vec<RouteRule>,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatabaseConfig {
    /// Process-local store. Nothing survives a restart.
    #[default]
    InMemory,
    /// External PostgreSQL database
    Postgres {
        url: String,
        #[serde(default)]
        pool: PoolSettings,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Whether `POST /auth/register` is open
    pub allow_registration: bool,
    /// Role assigned when a registration does not name one
    pub default_role: Role,
    /// When set, a valid access token is only admitted if it is still the user's current session
    /// token. Disabling it makes access tokens fully stateless until they expire.
    pub enforce_session_lookup: bool,
    pub access_token: AccessTokenConfig,
    pub refresh_token: RefreshTokenConfig,
    pub cookie: CookieConfig,
    pub password: PasswordConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allow_registration: true,
            default_role: Role::VegetableGuy,
            enforce_session_lookup: false,
            access_token: AccessTokenConfig::default(),
            refresh_token: RefreshTokenConfig::default(),
            cookie: CookieConfig::default(),
            password: PasswordConfig::default(),
        }
    }
}

/// Signing settings for access tokens. Set the secret via `JWT_SECRET`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessTokenConfig {
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    #[serde(with = "humantime_serde")]
    pub expiry: Duration,
}

impl Default for AccessTokenConfig {
    fn default() -> Self {
        Self {
            secret: None,
            expiry: Duration::from_secs(15 * 60),
        }
    }
}

/// Signing settings for refresh tokens. Set the secret via `JWT_REFRESH_SECRET`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshTokenConfig {
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    #[serde(with = "humantime_serde")]
    pub expiry: Duration,
}

impl Default for RefreshTokenConfig {
    fn default() -> Self {
        Self {
            secret: None,
            expiry: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CookieConfig {
    pub name: String,
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "accessToken".to_string(),
            max_age: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub max_length: usize,
    /// Argon2 memory cost in KiB
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        let argon2 = Argon2Params::default();
        Self {
            min_length: 8,
            max_length: 32,
            argon2_memory_kib: argon2.memory_kib,
            argon2_iterations: argon2.iterations,
            argon2_parallelism: argon2.parallelism,
        }
    }
}

impl PasswordConfig {
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            // Development frontend (Vite)
            allowed_origins: Url::parse("http://localhost:5173").map(CorsOrigin::Url).into_iter().collect(),
            allow_credentials: true,
            max_age: Some(3600),
        }
    }
}

/// CORS origin specification: either `*` or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    #[serde(deserialize_with = "parse_wildcard", serialize_with = "serialize_wildcard")]
    Wildcard,
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn serialize_wildcard<S>(serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str("*")
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: Environment::default(),
            database_url: None,
            database: DatabaseConfig::default(),
            admin_email: None,
            admin_password: None,
            auth: AuthConfig::default(),
            permissions: PermissionTable::default(),
            access_policy: Vec::new(),
            cors: CorsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        if let Some(url) = config.database_url.take() {
            let pool = match &config.database {
                DatabaseConfig::Postgres { pool, .. } => pool.clone(),
                DatabaseConfig::InMemory => PoolSettings::default(),
            };
            config.database = DatabaseConfig::Postgres { url, pool };
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        let tokens = [
            ("access_token", "JWT_SECRET", &self.auth.access_token.secret, self.auth.access_token.expiry),
            ("refresh_token", "JWT_REFRESH_SECRET", &self.auth.refresh_token.secret, self.auth.refresh_token.expiry),
        ];
        for (name, env_var, secret, expiry) in tokens {
            if secret.as_deref().is_none_or(str::is_empty) {
                return Err(Error::Config {
                    message: format!("auth.{name}.secret is not configured. Set {env_var} or add it to the config file."),
                });
            }
            if expiry.is_zero() {
                return Err(Error::Config {
                    message: format!("auth.{name}.expiry must be greater than zero"),
                });
            }
        }

        if self.auth.access_token.expiry >= self.auth.refresh_token.expiry {
            return Err(Error::Config {
                message: format!(
                    "auth.access_token.expiry ({:?}) must be shorter than auth.refresh_token.expiry ({:?})",
                    self.auth.access_token.expiry, self.auth.refresh_token.expiry
                ),
            });
        }

        if self.auth.password.min_length > self.auth.password.max_length {
            return Err(Error::Config {
                message: format!(
                    "Invalid password configuration: min_length ({}) cannot be greater than max_length ({})",
                    self.auth.password.min_length, self.auth.password.max_length
                ),
            });
        }

        if self.admin_email.is_some() != self.admin_password.is_some() {
            return Err(Error::Config {
                message: "admin_email and admin_password must be set together".to_string(),
            });
        }

        if let Some(email) = &self.admin_email
            && !is_valid_email(email)
        {
            return Err(Error::Config {
                message: format!("admin_email '{email}' is not a valid email address; the admin could never log in"),
            });
        }

        let has_wildcard = self.cors.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.cors.allow_credentials {
            return Err(Error::Config {
                message: "CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins.".to_string(),
            });
        }

        crate::auth::policy::AccessPolicy::from_rules(&self.access_policy)?;

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("SHOPAUTH_").ignore(&["config"]).split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]))
            .merge(Env::raw().only(&["JWT_SECRET"]).map(|_| "auth.access_token.secret".into()))
            .merge(Env::raw().only(&["JWT_REFRESH_SECRET"]).map(|_| "auth.refresh_token.secret".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
