use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// FieldErrors
///
/// Field name → list of messages, serialized as a flat JSON object so the
/// frontend can attach each message to its input. Errors that do not belong
/// to a single field go under `non_field_errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, utoipa::ToSchema)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

pub const NON_FIELD_ERRORS: &str = "non_field_errors";

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn extend(&mut self, field: &str, messages: Vec<String>) {
        for message in messages {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Ok(()) when nothing was recorded, otherwise the accumulated errors.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }

    pub fn single(field: &str, message: impl Into<String>) -> AppError {
        let mut errors = Self::new();
        errors.add(field, message);
        AppError::Validation(errors)
    }
}

/// RepositoryError
///
/// Failures surfaced by the persistence layer. Unique-constraint violations
/// are separated out so handlers can answer 409 instead of 500.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepositoryError {
    /// Classifies a raw sqlx error, turning SQLSTATE 23505 into `Conflict`.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let unique_violation = err
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| code == "23505");

        if unique_violation {
            let constraint = err
                .as_database_error()
                .and_then(|db| db.constraint().map(str::to_string))
                .unwrap_or_else(|| "unique constraint".to_string());
            RepositoryError::Conflict(constraint)
        } else {
            RepositoryError::Database(err)
        }
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// AppError
///
/// The single error type returned by handlers and services. Client errors
/// carry their message to the response body; server errors are logged and
/// answered with a generic body.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(FieldErrors),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Not found.")]
    NotFound,
    #[error("Invalid page.")]
    InvalidPage,
    #[error("{0}")]
    Conflict(String),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("mail delivery error: {0}")]
    Mail(#[from] crate::mailer::MailError),
    #[error("export error: {0}")]
    Export(#[from] zip::result::ZipError),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(constraint) => {
                AppError::Conflict(format!("A record with these values already exists ({constraint})."))
            }
            other => AppError::Repository(other),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::Internal(value.to_string())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound | AppError::InvalidPage => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Repository(_)
            | AppError::Storage(_)
            | AppError::Mail(_)
            | AppError::Export(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn forbidden() -> Self {
        AppError::Forbidden("You do not have permission to perform this action.".to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match self {
            AppError::Validation(errors) => Json(json!(errors)),
            AppError::BadRequest(detail)
            | AppError::Unauthorized(detail)
            | AppError::Forbidden(detail)
            | AppError::Conflict(detail) => Json(json!({ "detail": detail })),
            AppError::NotFound => Json(json!({ "detail": "Not found." })),
            AppError::InvalidPage => Json(json!({ "detail": "Invalid page." })),
            server_error => {
                tracing::error!(error = %server_error, "request failed");
                Json(json!({ "detail": "Internal server error." }))
            }
        };

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_accumulate_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("username", "too short");
        errors.add("username", "invalid characters");
        errors.add(NON_FIELD_ERRORS, "Passwords do not match.");

        assert_eq!(errors.get("username").map(<[String]>::len), Some(2));
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["non_field_errors"][0], "Passwords do not match.");
    }

    #[test]
    fn empty_field_errors_are_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn conflict_maps_to_409() {
        let err: AppError = RepositoryError::Conflict("users_email_key".into()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
