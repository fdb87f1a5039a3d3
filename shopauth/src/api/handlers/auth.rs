use axum::{Json, extract::State, http::HeaderMap};

use crate::{
    AppState,
    api::extractors::JsonBody,
    api::models::auth::{
        AuthResponse, AuthSuccessResponse, LoginRequest, LoginResponse, LogoutResponse, RegisterRequest, RegisterResponse,
        StatusResponse,
    },
    auth::cookies,
    errors::Error,
};

/// Liveness of the auth endpoints
#[tracing::instrument(skip_all)]
pub async fn get_status() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok".to_string() })
}

/// Register a new user account and start their session
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, JsonBody(request): JsonBody<RegisterRequest>) -> Result<RegisterResponse, Error> {
    if !state.config.auth.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    let registration = request.validate(&state.config.auth.password)?;
    let session = state
        .auth
        .register(&registration.email, &registration.password, registration.role)
        .await?;

    let cookie = cookies::session_cookie(&session.access_token, &state.config);
    Ok(RegisterResponse {
        auth_response: AuthResponse::from(session),
        cookie,
    })
}

/// Login with email and password
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, JsonBody(request): JsonBody<LoginRequest>) -> Result<LoginResponse, Error> {
    request.validate()?;
    let session = state.auth.login(&request.email, &request.password).await?;

    let cookie = cookies::session_cookie(&session.access_token, &state.config);
    Ok(LoginResponse {
        auth_response: AuthResponse::from(session),
        cookie,
    })
}

/// End the caller's session, if any, and clear the cookie. Always succeeds.
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<LogoutResponse, Error> {
    let token = cookies::extract_access_token(&headers, &state.config);
    state.auth.logout(token.as_deref()).await?;

    Ok(LogoutResponse {
        auth_response: AuthSuccessResponse {
            message: "Logout successful".to_string(),
        },
        cookie: cookies::clearing_cookie(&state.config),
    })
}
