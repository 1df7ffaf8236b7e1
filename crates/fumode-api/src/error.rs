//! API error type and JSON error responses

use crate::validation::ValidationErrors;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fumode_core::TransferError;
use fumode_storage::StorageError;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed validation")]
    Validation(ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("the requested resource could not be found")]
    NotFound,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("invalid authentication credentials")]
    InvalidCredentials,

    #[error("upload did not complete within {seconds}s")]
    DeadlineExceeded { seconds: u64 },

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

#[derive(Serialize)]
struct FailedItem<'a> {
    index: usize,
    name: &'a str,
    reason: String,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Failed upload of the single file sent in form field `field`.
    ///
    /// A file the store cannot name, or one without content, is rejected as
    /// invalid input on that field.
    pub fn upload(field: &str, err: TransferError) -> Self {
        let message = match &err {
            TransferError::Storage {
                source: StorageError::UnknownExtension(_),
                ..
            } => "unable to determine file extension",
            TransferError::Storage {
                source: StorageError::EmptyObject(_),
                ..
            } => "must not be empty",
            _ => return Self::Transfer(err),
        };
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized(_) | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::DeadlineExceeded { .. } | Self::Transfer(TransferError::Timeout { .. }) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            Self::Transfer(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            Self::Validation(errors) => json!({ "error": errors }),
            Self::Transfer(TransferError::Aggregate(aggregate)) => {
                let failures: Vec<_> = aggregate
                    .failures
                    .iter()
                    .map(|failure| FailedItem {
                        index: failure.index,
                        name: &failure.name,
                        reason: failure.error.to_string(),
                    })
                    .collect();
                json!({
                    "error": {
                        "message": format!(
                            "{} of {} uploads failed",
                            aggregate.failures.len(),
                            aggregate.total
                        ),
                        "failures": failures,
                    }
                })
            }
            Self::Internal(_) => json!({
                "error": "the server encountered a problem and could not process your request"
            }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fumode_core::{AggregateTransferFailure, ItemFailure};
    use std::time::Duration;

    #[test]
    fn test_validation_renders_field_map() {
        let mut errors = ValidationErrors::new();
        errors.add("email", "must be provided");
        let err = ApiError::from(errors);

        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.body(), json!({ "error": { "email": "must be provided" } }));
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = ApiError::internal("database password is wrong");
        assert!(!err.body().to_string().contains("password"));
    }

    #[test]
    fn test_aggregate_lists_every_failed_item() {
        let err = ApiError::from(TransferError::from(AggregateTransferFailure {
            total: 3,
            failures: vec![
                ItemFailure {
                    index: 0,
                    name: "a.png".into(),
                    error: TransferError::Timeout {
                        name: "a.png".into(),
                        timeout: Duration::from_secs(10),
                    },
                },
                ItemFailure {
                    index: 2,
                    name: "c".into(),
                    error: TransferError::Aborted {
                        name: "c".into(),
                        reason: "worker panicked".into(),
                    },
                },
            ],
            succeeded: Vec::new(),
        }));

        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        let body = err.body();
        assert_eq!(body["error"]["message"], "2 of 3 uploads failed");
        assert_eq!(body["error"]["failures"][1]["index"], 2);
        assert_eq!(body["error"]["failures"][1]["name"], "c");
    }

    #[test]
    fn test_unusable_file_is_a_validation_failure() {
        let err = ApiError::upload(
            "banner",
            TransferError::Storage {
                name: "banner".into(),
                source: StorageError::UnknownExtension("banner".into()),
            },
        );
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            err.body(),
            json!({ "error": { "banner": "unable to determine file extension" } })
        );

        let err = ApiError::upload(
            "banner",
            TransferError::Storage {
                name: "banner.png".into(),
                source: StorageError::EmptyObject("key.png".into()),
            },
        );
        assert_eq!(err.body(), json!({ "error": { "banner": "must not be empty" } }));
    }

    #[test]
    fn test_store_failure_stays_bad_gateway() {
        let err = ApiError::upload(
            "banner",
            TransferError::Storage {
                name: "banner.png".into(),
                source: StorageError::Rejected {
                    key: "key.png".into(),
                    status: 500,
                },
            },
        );
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err = ApiError::upload(
            "banner",
            TransferError::Timeout {
                name: "banner.png".into(),
                timeout: Duration::from_secs(10),
            },
        );
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_not_found() {
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::NotFound.body(),
            json!({ "error": "the requested resource could not be found" })
        );
    }

    #[test]
    fn test_rate_limited() {
        let err = ApiError::RateLimited;
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.body(), json!({ "error": "rate limit exceeded" }));
    }
}
