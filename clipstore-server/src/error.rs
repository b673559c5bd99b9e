//! Error types for the clipstore API layer.

use std::error::Error;

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use clipstore_service::Error as ServiceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for API operations.
///
/// Responses only carry a category label. Details are logged on the server.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Errors from the storage service.
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// Malformed requests, such as missing fields or unparsable ids.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Malformed multipart bodies.
    #[error("multipart error: {0}")]
    Multipart(#[from] multer::Error),

    /// Transient storage failures while serving a download. Clients are expected to retry.
    #[error("temporarily unavailable: {0}")]
    Unavailable(#[source] ServiceError),

    /// The requested resource does not exist.
    #[error("not found")]
    NotFound,
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// A JSON error response returned by the API.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// The error category.
    pub error: String,
}

impl ApiError {
    /// Creates a [`BadRequest`](Self::BadRequest) error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Maps service errors during downloads, reporting transient failures as retryable.
    pub fn download(error: ServiceError) -> Self {
        if error.is_retryable() {
            Self::Unavailable(error)
        } else {
            Self::Service(error)
        }
    }

    /// Returns the status code and category label of this error.
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Service(err) => match err {
                ServiceError::NotFound => (StatusCode::NOT_FOUND, "not found"),
                ServiceError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid input"),
                ServiceError::EmptyUpload => (StatusCode::BAD_REQUEST, "empty upload"),
                ServiceError::UploadTooLarge { .. } => {
                    (StatusCode::PAYLOAD_TOO_LARGE, "upload too large")
                }
                ServiceError::RangeNotSatisfiable { .. } => {
                    (StatusCode::RANGE_NOT_SATISFIABLE, "range not satisfiable")
                }
                ServiceError::Contention(_) => (StatusCode::SERVICE_UNAVAILABLE, "try again"),
                ServiceError::OutOfOrderChunk { .. }
                | ServiceError::UnknownObject
                | ServiceError::Io(_)
                | ServiceError::StorageUnavailable { .. }
                | ServiceError::Serde { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
                }
            },
            ApiError::Multipart(multer::Error::FieldSizeExceeded { .. }) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "field too large")
            }
            ApiError::BadRequest(_) | ApiError::Multipart(_) => {
                (StatusCode::BAD_REQUEST, "bad request")
            }
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "try again"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, label) = self.classify();

        if status.is_server_error() {
            tracing::error!(error = &self as &dyn Error, "error handling request");
        } else {
            tracing::debug!(error = &self as &dyn Error, "client error");
        }

        let body = ApiErrorResponse {
            error: label.to_owned(),
        };
        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }

        if let ApiError::Service(ServiceError::RangeNotSatisfiable { total_length }) = self
            && let Ok(value) = format!("bytes */{total_length}").parse()
        {
            response
                .headers_mut()
                .insert(header::CONTENT_RANGE, value);
        }

        response
    }
}
