//! Access-token cookie and bearer header plumbing.

use axum::http::{HeaderMap, header};

use crate::config::Config;

/// Attributes shared by the session cookie and its clearing counterpart. Browsers only drop a
/// cookie when the clearing one matches on SameSite/Secure.
fn cookie_attributes(config: &Config) -> &'static str {
    if config.environment.is_production() {
        "Path=/; HttpOnly; SameSite=None; Secure"
    } else {
        "Path=/; HttpOnly; SameSite=Lax"
    }
}

pub fn session_cookie(token: &str, config: &Config) -> String {
    format!(
        "{}={}; {}; Max-Age={}",
        config.auth.cookie.name,
        token,
        cookie_attributes(config),
        config.auth.cookie.max_age.as_secs()
    )
}

pub fn clearing_cookie(config: &Config) -> String {
    format!("{}=; {}; Max-Age=0", config.auth.cookie.name, cookie_attributes(config))
}

fn token_from_cookies(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// The caller's access token: cookie first, then `Authorization: Bearer`.
pub fn extract_access_token(headers: &HeaderMap, config: &Config) -> Option<String> {
    token_from_cookies(headers, &config.auth.cookie.name).or_else(|| bearer_token(headers))
}
