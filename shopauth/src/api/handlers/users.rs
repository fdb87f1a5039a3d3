use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::users::UserResponse,
    auth::current_user::CurrentUser,
    errors::Error,
    types::abbrev_uuid,
};

/// The caller's own account, without credentials
#[tracing::instrument(skip_all, fields(user_id = %abbrev_uuid(&current_user.id)))]
pub async fn get_profile(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<UserResponse>, Error> {
    let user = state
        .auth
        .users()
        .get_by_id(current_user.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: current_user.id.to_string(),
        })?;

    Ok(Json(UserResponse::from(user)))
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::users::Role,
        build_router,
        test_utils::{create_test_state, create_test_user},
    };
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::Value;

    #[tokio::test]
    async fn test_profile_is_sanitized() {
        let (state, _store) = create_test_state();
        let (user, token) = create_test_user(&state, "ann@example.com", Role::FruitGuy).await;
        let server = TestServer::new(build_router(state.clone()).unwrap()).unwrap();

        let response = server.get("/user/profile").authorization_bearer(&token).await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["id"], user.id.to_string());
        assert_eq!(body["email"], "ann@example.com");
        assert_eq!(body["role"], "FruitGuy");
        assert!(body.get("createdAt").is_some());
        assert!(body.get("updatedAt").is_some());
        assert!(body.get("passwordHash").is_none());
        assert!(body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_profile_requires_auth() {
        let (state, _store) = create_test_state();
        let server = TestServer::new(build_router(state.clone()).unwrap()).unwrap();

        server.get("/user/profile").await.assert_status(StatusCode::UNAUTHORIZED);
    }
}
