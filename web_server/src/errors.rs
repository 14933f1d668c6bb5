use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use merger::{MergeError, ValidationError};
use serde::Serialize;
use thiserror::Error;

use crate::storage::StoreError;

/// Errors returned by the HTTP handlers. Each one renders as
/// `{"error": "<message>"}` with a matching status code.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = self.to_string();
        HttpResponse::build(self.status_code()).json(ErrorBody { error: &message })
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        ApiError::BadRequest(error.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Validation(validation) => validation.into(),
            StoreError::Io(io_error) => {
                tracing::error!("Could not store uploaded files. error={io_error}");
                ApiError::Internal("Failed to save files.".to_owned())
            }
        }
    }
}

impl From<MergeError> for ApiError {
    fn from(error: MergeError) -> Self {
        if error.is_client_error() {
            return ApiError::BadRequest(error.to_string());
        }
        tracing::error!("Merge failed. error={error}");
        ApiError::Internal(format!("Merge failed: {error}"))
    }
}
