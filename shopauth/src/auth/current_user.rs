use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    api::models::users::Role,
    errors::{Error, Result},
    types::UserId,
};

/// The authenticated caller, attached to the request by [`crate::auth::middleware::require_auth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        match parts.extensions.get::<CurrentUser>() {
            Some(user) => Ok(*user),
            None => {
                trace!("No authenticated user on request; is the route behind require_auth?");
                Err(Error::Unauthenticated)
            }
        }
    }
}
