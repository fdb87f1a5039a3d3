//! Request-boundary authentication and authorization.
//!
//! [`require_auth`] establishes identity, silently refreshing a stale access token when the
//! caller's session still holds a valid refresh token. [`authorize`] then applies the route's
//! [`crate::auth::policy::AccessPolicy`] entry, resolving the target product's category when the
//! rule is resource-scoped.

use axum::{
    body::Body,
    extract::{FromRequestParts, MatchedPath, RawPathParams, Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use tracing::{debug, instrument, trace};

use crate::{
    AppState,
    auth::{
        cookies,
        current_user::CurrentUser,
        permissions::Decision,
        tokens::TokenKind,
    },
    db::handlers::ResourceRef,
    errors::Error,
    types::abbrev_uuid,
};

/// Largest body the authorization layer will buffer to find the target product.
const MAX_INSPECTED_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
pub(crate) enum GuardOutcome {
    Admitted(CurrentUser),
    /// The access token was stale and the session was rotated. The new token must reach the caller.
    Refreshed { user: CurrentUser, access_token: String },
}

/// Decide whether the request carries an acceptable credential.
#[instrument(skip_all)]
pub(crate) async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<GuardOutcome, Error> {
    let Some(token) = cookies::extract_access_token(headers, &state.config) else {
        trace!("No access token on request");
        return Err(Error::Unauthenticated);
    };

    if let Some(user) = state.auth.authenticate_access(&token).await? {
        trace!(user_id = %abbrev_uuid(&user.id), "Access token accepted");
        return Ok(GuardOutcome::Admitted(user));
    }

    // Hint only: the claims are unverified
    let hinted_user = state.auth.tokens().decode_unverified(&token).map(|claims| abbrev_uuid(&claims.sub));
    debug!(hinted_user = ?hinted_user, "Access token rejected, attempting silent refresh");

    let Some(refresh_token) = state.auth.find_refresh_token(&token).await? else {
        debug!("No session for access token");
        return Err(Error::Unauthenticated);
    };

    if !state.auth.tokens().verify(TokenKind::Refresh, &refresh_token) {
        debug!("Session refresh token expired or invalid");
        return Err(Error::Unauthenticated);
    }

    match state.auth.refresh(&refresh_token).await {
        Ok(session) => {
            debug!(user_id = %abbrev_uuid(&session.user.id), "Silently refreshed session");
            Ok(GuardOutcome::Refreshed {
                user: session.user,
                access_token: session.access_token,
            })
        }
        Err(Error::InvalidToken) => Err(Error::Unauthenticated),
        Err(e) => Err(e),
    }
}

/// Reject unauthenticated requests, attach [`CurrentUser`] to the rest.
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Result<Response, Error> {
    match authenticate(&state, request.headers()).await? {
        GuardOutcome::Admitted(user) => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        GuardOutcome::Refreshed { user, access_token } => {
            request.extensions_mut().insert(user);
            let cookie = HeaderValue::from_str(&cookies::session_cookie(&access_token, &state.config)).map_err(|e| Error::Internal {
                operation: format!("build session cookie: {e}"),
            })?;

            let mut response = next.run(request).await;
            response.headers_mut().append(header::SET_COOKIE, cookie);
            Ok(response)
        }
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Find the product a request targets: `productId`, `product` or `name` in a JSON body, then the
/// `productId`, `id` or `name` path parameters.
pub(crate) fn resource_ref(body: Option<&Value>, path_params: &[(String, String)]) -> ResourceRef {
    let body_field = |key: &str| body.and_then(|b| b.get(key)).and_then(value_as_string);
    let path_param = |key: &str| {
        path_params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.clone())
    };

    ResourceRef {
        id: body_field("productId")
            .or_else(|| body_field("product"))
            .or_else(|| path_param("productId"))
            .or_else(|| path_param("id")),
        name: body_field("name").or_else(|| path_param("name")),
    }
}

/// Apply the route's access rule. The request comes back untouched (body restored) when allowed.
#[instrument(skip_all, fields(method = %request.method()))]
pub(crate) async fn authorize_request(state: &AppState, request: Request) -> Result<Request, Error> {
    let user = request.extensions().get::<CurrentUser>().copied().ok_or(Error::Unauthenticated)?;

    let Some(route) = request.extensions().get::<MatchedPath>().map(|p| p.as_str().to_string()) else {
        return Ok(request);
    };
    let Some(requirement) = state.access_policy.requirement(request.method(), &route).cloned() else {
        trace!(%route, "No access rule for route");
        return Ok(request);
    };

    if user.is_admin() {
        debug!(%route, "Admin shortcut, access granted");
        return Ok(request);
    }

    let (request, category) = if requirement.resource_scoped {
        let (mut parts, body) = request.into_parts();
        let path_params: Vec<(String, String)> = match RawPathParams::from_request_parts(&mut parts, state).await {
            Ok(params) => params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            Err(_) => Vec::new(),
        };

        let bytes = axum::body::to_bytes(body, MAX_INSPECTED_BODY_BYTES)
            .await
            .map_err(|_| Error::BadRequest {
                message: "Failed to read request body".to_string(),
            })?;
        let json = serde_json::from_slice::<Value>(&bytes).ok();

        let target = resource_ref(json.as_ref(), &path_params);
        let category = if target.is_empty() {
            None
        } else {
            state.catalog.resolve(&target).await?
        };
        debug!(%route, ?target, ?category, "Resolved request target");

        (Request::from_parts(parts, Body::from(bytes)), category)
    } else {
        (request, None)
    };

    match state.permissions.decide(user.role, &requirement, category) {
        Decision::Allow => {
            debug!(%route, role = %user.role, "Access granted");
            Ok(request)
        }
        Decision::Deny(reason) => {
            debug!(%route, role = %user.role, %reason, "Access denied");
            Err(reason.into())
        }
    }
}

/// Enforce the access policy. Must run after [`require_auth`].
pub async fn authorize(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, Error> {
    let request = authorize_request(&state, request).await?;
    Ok(next.run(request).await)
}
