use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    api::models::users::Role,
    auth::{password, service::SessionTokens},
    config::PasswordConfig,
    errors::{Error, FieldError},
    types::UserId,
};

/// Registration payload. Fields are taken as plain strings so that every problem is reported
/// per field instead of as a deserialization failure.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Cheap structural email check: a non-empty local part and a dotted domain, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}

/// A registration that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRegistration {
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

impl RegisterRequest {
    /// Check every field, reporting all failures at once.
    pub fn validate(self, password_config: &PasswordConfig) -> Result<ValidRegistration, Error> {
        let mut errors = Vec::new();

        if !is_valid_email(&self.email) {
            errors.push(FieldError::new("email", "Invalid email format"));
        }
        errors.extend(
            password::policy_violations(&self.password, password_config)
                .into_iter()
                .map(|message| FieldError::new("password", message)),
        );
        let role = match self.role.as_deref().map(str::parse::<Role>) {
            None => None,
            Some(Ok(role)) => Some(role),
            Some(Err(message)) => {
                errors.push(FieldError::new("role", message));
                None
            }
        };

        if !errors.is_empty() {
            return Err(Error::Validation { errors });
        }
        Ok(ValidRegistration {
            email: self.email,
            password: self.password,
            role,
        })
    }
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), Error> {
        let mut errors = Vec::new();
        if !is_valid_email(&self.email) {
            errors.push(FieldError::new("email", "Invalid email format"));
        }
        if self.password.is_empty() {
            errors.push(FieldError::new("password", "Password must not be empty"));
        }

        if errors.is_empty() { Ok(()) } else { Err(Error::Validation { errors }) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub id: UserId,
    pub email: String,
    pub access_token: String,
    pub role: Role,
}

impl From<SessionTokens> for AuthResponse {
    fn from(session: SessionTokens) -> Self {
        Self {
            id: session.user.id,
            email: session.email,
            access_token: session.access_token,
            role: session.user.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSuccessResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

pub struct RegisterResponse {
    pub auth_response: AuthResponse,
    pub cookie: String,
}

impl IntoResponse for RegisterResponse {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, [(header::SET_COOKIE, self.cookie)], Json(self.auth_response)).into_response()
    }
}

pub struct LoginResponse {
    pub auth_response: AuthResponse,
    pub cookie: String,
}

impl IntoResponse for LoginResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, [(header::SET_COOKIE, self.cookie)], Json(self.auth_response)).into_response()
    }
}

pub struct LogoutResponse {
    pub auth_response: AuthSuccessResponse,
    pub cookie: String,
}

impl IntoResponse for LogoutResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, [(header::SET_COOKIE, self.cookie)], Json(self.auth_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("ann@example.com"));
        assert!(is_valid_email("a.b+c@shop.co.uk"));
        assert!(!is_valid_email("ann"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("ann@localhost"));
        assert!(!is_valid_email("ann@example..com"));
        assert!(!is_valid_email("an n@example.com"));
        assert!(!is_valid_email("ann@ex@ample.com"));
    }

    #[test]
    fn test_register_validation_reports_every_field() {
        let request = RegisterRequest {
            email: "nope".to_string(),
            password: "short".to_string(),
            role: Some("Cashier".to_string()),
        };

        let Err(Error::Validation { errors }) = request.validate(&PasswordConfig::default()) else {
            panic!("expected validation error");
        };
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"email"));
        assert!(fields.contains(&"password"));
        assert!(fields.contains(&"role"));
    }

    #[test]
    fn test_register_validation_accepts_good_input() {
        let request = RegisterRequest {
            email: "ann@example.com".to_string(),
            password: "Tomato123".to_string(),
            role: Some("FruitGuy".to_string()),
        };
        let valid = request.validate(&PasswordConfig::default()).unwrap();
        assert_eq!(valid.role, Some(Role::FruitGuy));

        let request = RegisterRequest {
            email: "ann@example.com".to_string(),
            password: "Tomato123".to_string(),
            role: None,
        };
        assert_eq!(request.validate(&PasswordConfig::default()).unwrap().role, None);
    }
}
