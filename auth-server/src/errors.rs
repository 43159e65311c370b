use auth_engine::{AuthError, ErrorCode};
use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;
use log::error;
use serde_json::json;

#[derive(Debug, Clone)]
pub struct ApiError {
    pub error: &'static str,
    pub detail: String,
    pub status_code: StatusCode,
}

impl ApiError {
    /// Create a new ApiError with an error kind, detail message and status code
    pub fn new<S: ToString>(error: &'static str, detail: S, status_code: StatusCode) -> Self {
        Self {
            error,
            detail: detail.to_string(),
            status_code,
        }
    }

    /// Create new Unauthorized (401) with a detail message
    pub fn unauthenticated<S: ToString>(detail: S) -> Self {
        Self::new(
            ErrorCode::Unauthenticated.as_str(),
            detail,
            StatusCode::UNAUTHORIZED,
        )
    }
}

/// HTTP status of each error kind
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::AlreadyExists => StatusCode::CONFLICT,
        ErrorCode::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        ErrorCode::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let code = err.code();
        if code == ErrorCode::Internal {
            error!("Internal error: {}", err.message());
        }
        Self::new(code.as_str(), err.message(), status_for(code))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code;
        let body = json!({
            "error": self.error,
            "detail": self.detail,
        });
        (status_code, Json(body)).into_response()
    }
}
