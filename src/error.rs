//! Domain and API error handling
//!
//! `ProfileError` is what the profile engine returns; `ApiError` turns it into
//! consistent JSON responses for the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::domain::fields::FieldViolation;

/// Errors raised by the profile engine and its storage collaborators.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Duplicate identifier, or an identifier still referenced elsewhere.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A referenced type, account or profile does not (or no longer) exist.
    #[error("Reference error: {0}")]
    Reference(String),

    /// One or more values violate the bound field schema.
    #[error("Validation failed: {}", summarize(.0))]
    Validation(Vec<FieldViolation>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.message.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

impl ProfileError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn reference(msg: impl Into<String>) -> Self {
        Self::Reference(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Shorthand for a validation failure on a single element.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldViolation::new(field, message)])
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type ProfileResult<T> = Result<T, ProfileError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable: {message}")]
    Unprocessable {
        code: &'static str,
        message: String,
        errors: Vec<FieldViolation>,
    },

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldViolation>,
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::Unprocessable { code, .. } => code,
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::NotFound(msg) => msg.clone(),
            Self::BadRequest(msg) => msg.clone(),
            Self::Conflict(msg) => msg.clone(),
            Self::Unprocessable { message, .. } => message.clone(),
            // Don't leak internal error details
            Self::Internal(_) | Self::Database(_) => "An internal error occurred".to_string(),
        }
    }
}

impl From<ProfileError> for ApiError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::Conflict(msg) => Self::Conflict(msg),
            ProfileError::NotFound(msg) => Self::NotFound(msg),
            ProfileError::Reference(msg) => Self::Unprocessable {
                code: "REFERENCE_ERROR",
                message: msg,
                errors: Vec::new(),
            },
            ProfileError::Validation(errors) => Self::Unprocessable {
                code: "VALIDATION_ERROR",
                message: summarize(&errors),
                errors,
            },
            ProfileError::Database(e) => Self::Database(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Log internal errors
        match &self {
            Self::Internal(e) => {
                tracing::error!(error = ?e, "Internal server error");
            }
            Self::Database(e) => {
                tracing::error!(error = ?e, "Database error");
            }
            _ => {
                tracing::warn!(error = %self, "API error");
            }
        }

        let status = self.status_code();
        let code = self.error_code().to_string();
        let message = self.public_message();
        let errors = match self {
            Self::Unprocessable { errors, .. } => errors,
            _ => Vec::new(),
        };
        let body = ErrorResponse {
            code,
            message,
            errors,
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_joins_violations() {
        let err = ProfileError::Validation(vec![
            FieldViolation::new("entity_test[profile_fullname]", "Full name field is required."),
            FieldViolation::new("mail", "Email address field is required."),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: Full name field is required. Email address field is required."
        );
    }

    #[test]
    fn profile_errors_map_to_status_codes() {
        let cases = [
            (ProfileError::conflict("dup"), StatusCode::CONFLICT),
            (ProfileError::not_found("gone"), StatusCode::NOT_FOUND),
            (ProfileError::reference("dangling"), StatusCode::UNPROCESSABLE_ENTITY),
            (ProfileError::invalid("x", "bad"), StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn reference_and_validation_use_distinct_codes() {
        assert_eq!(
            ApiError::from(ProfileError::reference("r")).error_code(),
            "REFERENCE_ERROR"
        );
        assert_eq!(
            ApiError::from(ProfileError::invalid("f", "m")).error_code(),
            "VALIDATION_ERROR"
        );
    }
}
