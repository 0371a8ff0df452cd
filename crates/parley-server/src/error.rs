use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parley_core::ParleyError;
use tracing::{debug, error};

/// A `ParleyError` rendered as `{"error": {"code", "message", "retryable"}}`.
#[derive(Debug)]
pub struct ApiError(pub ParleyError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ParleyError::ThreadNotFound(_) | ParleyError::DocumentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ParleyError::Busy(_) => StatusCode::LOCKED,
            ParleyError::CycleDetected { .. } | ParleyError::MissingContext(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ParleyError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ParleyError::ProcessFailure(_) | ParleyError::RegistryRejected { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ParleyError::Conflict(_) => StatusCode::CONFLICT,
            ParleyError::RegistryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ParleyError::InvalidName(_) | ParleyError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ParleyError::Config(_)
            | ParleyError::Io(_)
            | ParleyError::Serialization(_)
            | ParleyError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ParleyError> for ApiError {
    fn from(err: ParleyError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ParleyError::InvalidRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "request failed");
        } else {
            debug!(code = self.0.code(), error = %self.0, "request rejected");
        }
        let body = serde_json::json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
                "retryable": self.0.is_retryable(),
            }
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
