use crate::modules::video::error::VideoError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};
use utoipa::ToSchema;

/// Body of every error response.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

pub struct ApiSuccess<T>(pub T, pub StatusCode);

impl<T> IntoResponse for ApiSuccess<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        let (body, status) = (self.0, self.1);
        (status, Json(body)).into_response()
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub error: String,
    pub details: Option<String>,
    pub status: StatusCode,
}

impl ApiError {
    pub fn new(error: impl Into<String>, status: StatusCode) -> Self {
        Self {
            error: error.into(),
            details: None,
            status,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<VideoError> for ApiError {
    fn from(err: VideoError) -> Self {
        let status = match &err {
            VideoError::MissingFile
            | VideoError::EmptyFilename
            | VideoError::UnsupportedType(_)
            | VideoError::InvalidName(_)
            | VideoError::InvalidId
            | VideoError::Upload(_) => StatusCode::BAD_REQUEST,
            VideoError::PathTraversal(path) => {
                warn!("Rejected path traversal attempt: {:?}", path);
                StatusCode::BAD_REQUEST
            }
            VideoError::NotFound(_) => StatusCode::NOT_FOUND,
            VideoError::AlreadyFinished(_) => StatusCode::CONFLICT,
            VideoError::QueueFull | VideoError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            VideoError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if !err.is_client_error() {
            error!("Request failed: {}", err);
        }

        // Client-facing messages stay fixed; details carry the specifics.
        match err {
            VideoError::UnsupportedType(name) => {
                ApiError::new("File type not allowed", status).with_details(name)
            }
            VideoError::Storage(_) => ApiError::new("Internal storage error", status),
            other => ApiError::new(other.to_string(), status),
        }
    }
}
