use thiserror::Error;
use tonic::Status;

use crate::custom_fields::{self, FieldError};
use crate::custom_id::CustomIdError;

/// Postgres SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let unique = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code == UNIQUE_VIOLATION)
            .unwrap_or(false);
        if unique {
            AppError::AlreadyExists("A record with the same key already exists".to_string())
        } else {
            AppError::Database(err)
        }
    }
}

impl From<Vec<FieldError>> for AppError {
    fn from(errors: Vec<FieldError>) -> Self {
        AppError::InvalidInput(custom_fields::describe(&errors))
    }
}

impl From<CustomIdError> for AppError {
    fn from(err: CustomIdError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<AppError> for Status {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                Status::internal(format!("Database error: {}", e))
            }
            AppError::NotFound(msg) => Status::not_found(msg),
            AppError::InvalidInput(msg) => Status::invalid_argument(msg),
            AppError::AlreadyExists(msg) => Status::already_exists(msg),
            AppError::Conflict(msg) => Status::aborted(msg),
            AppError::PermissionDenied(msg) => Status::permission_denied(msg),
            AppError::Internal(msg) => Status::internal(msg),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Parses a UUID from request text.
pub fn parse_uuid(value: &str, what: &str) -> AppResult<uuid::Uuid> {
    uuid::Uuid::parse_str(value.trim())
        .map_err(|_| AppError::InvalidInput(format!("Invalid {}: {}", what, value)))
}

/// Parses a list of UUIDs, skipping blank entries.
pub fn parse_uuids(values: &[String], what: &str) -> AppResult<Vec<uuid::Uuid>> {
    values
        .iter()
        .filter(|v| !v.trim().is_empty())
        .map(|v| parse_uuid(v, what))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), Code::NotFound),
            (AppError::InvalidInput("x".into()), Code::InvalidArgument),
            (AppError::AlreadyExists("x".into()), Code::AlreadyExists),
            (AppError::Conflict("x".into()), Code::Aborted),
            (AppError::PermissionDenied("x".into()), Code::PermissionDenied),
            (AppError::Internal("x".into()), Code::Internal),
        ];
        for (err, code) in cases {
            assert_eq!(Status::from(err).code(), code);
        }
    }

    #[test]
    fn field_errors_become_invalid_argument() {
        let status = Status::from(AppError::from(vec![FieldError::NoneEnabled]));
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "Enable and fill at least one custom field.");
    }

    #[test]
    fn row_not_found_stays_database_error() {
        assert!(matches!(AppError::from(sqlx::Error::RowNotFound), AppError::Database(_)));
    }

    #[test]
    fn uuid_parsing() {
        assert!(parse_uuid(" 67e55044-10b1-426f-9247-bb680e5fe0c8 ", "id").is_ok());
        let err = parse_uuid("nope", "inventory id").unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: Invalid inventory id: nope");

        let ids = parse_uuids(&["".into(), "67e55044-10b1-426f-9247-bb680e5fe0c8".into()], "id").unwrap();
        assert_eq!(ids.len(), 1);
    }
}
