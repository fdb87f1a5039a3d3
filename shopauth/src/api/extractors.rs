//! Request extractors that report failures through [`Error`].

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::{Error, FieldError};

const DATA_ERROR_PREFIX: &str = "Failed to deserialize the JSON body into the target type: ";

/// `Json<T>`, except that a missing content type, malformed JSON or a field of the wrong type
/// becomes a 400 [`Error::Validation`] instead of axum's plain-text rejection.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => {
                debug!(status = %rejection.status(), "Rejected JSON body: {}", rejection.body_text());
                Err(rejection_to_error(&rejection))
            }
        }
    }
}

fn rejection_to_error(rejection: &JsonRejection) -> Error {
    let field_error = match rejection {
        JsonRejection::JsonDataError(e) => data_error_field(&e.body_text()),
        JsonRejection::JsonSyntaxError(_) => FieldError::new("body", "Request body is not valid JSON"),
        JsonRejection::MissingJsonContentType(_) => FieldError::new("body", "Expected Content-Type: application/json"),
        _ => {
            return Error::BadRequest {
                message: "Failed to read request body".to_string(),
            };
        }
    };

    Error::Validation {
        errors: vec![field_error],
    }
}

/// Pull the offending field out of a deserialization message such as
/// `email: invalid type: null, expected a string at line 1 column 13`.
fn data_error_field(body_text: &str) -> FieldError {
    let detail = body_text.strip_prefix(DATA_ERROR_PREFIX).unwrap_or(body_text);

    match detail.split_once(": ") {
        Some((path, message))
            if !path.is_empty() && path.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']')) =>
        {
            FieldError::new(path, message)
        }
        _ => FieldError::new("body", detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_error_names_the_field() {
        let field = data_error_field(
            "Failed to deserialize the JSON body into the target type: role: invalid type: integer `7`, expected a string at line 1 column 9",
        );
        assert_eq!(field.field, "role");
        assert!(field.message.starts_with("invalid type: integer `7`"));
    }

    #[test]
    fn test_data_error_without_path_reports_body() {
        let field = data_error_field(
            "Failed to deserialize the JSON body into the target type: invalid type: sequence, expected struct LoginRequest at line 1 column 0",
        );
        assert_eq!(field.field, "body");
        assert!(field.message.starts_with("invalid type: sequence"));
    }
}
