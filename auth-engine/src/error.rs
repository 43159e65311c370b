use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = AuthError> = std::result::Result<T, E>;

/// Errors surfaced by every operation of the authorization server.
///
/// Each variant is one classified kind; the message is human readable and
/// never contains secrets or raw store errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("unimplemented: {0}")]
    Unimplemented(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Kind of an [`AuthError`], detached from its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    FailedPrecondition,
    NotFound,
    AlreadyExists,
    Unimplemented,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::FailedPrecondition => "failed_precondition",
            ErrorCode::NotFound => "not_found",
            ErrorCode::AlreadyExists => "already_exists",
            ErrorCode::Unimplemented => "unimplemented",
            ErrorCode::Internal => "internal",
        }
    }
}

impl AuthError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AuthError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            AuthError::Unauthenticated(_) => ErrorCode::Unauthenticated,
            AuthError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            AuthError::FailedPrecondition(_) => ErrorCode::FailedPrecondition,
            AuthError::NotFound(_) => ErrorCode::NotFound,
            AuthError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            AuthError::Unimplemented(_) => ErrorCode::Unimplemented,
            AuthError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// The message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            AuthError::InvalidArgument(msg)
            | AuthError::Unauthenticated(msg)
            | AuthError::PermissionDenied(msg)
            | AuthError::FailedPrecondition(msg)
            | AuthError::NotFound(msg)
            | AuthError::AlreadyExists(msg)
            | AuthError::Unimplemented(msg)
            | AuthError::Internal(msg) => msg,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AuthError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, AuthError::AlreadyExists(_))
    }
}
