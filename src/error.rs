//! Error types for the array volume control plane
//!
//! Provides the crate-wide error taxonomy (validation, not-found, conflict,
//! precondition, internal) together with the structured error returned by
//! array management API clients.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Array API Errors
// =============================================================================

/// Classification of a failure reported by an array management API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The addressed resource does not exist
    NotFound,
    /// A resource with the requested name already exists or is in use
    AlreadyInUse,
    /// Failover was requested on the destination side of a session
    FailoverFromDestination,
    /// The request never produced an HTTP response
    Transport,
    /// Anything else
    Other,
}

/// Structured error returned by an [`ArrayClient`](crate::domain::ports::ArrayClient)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("array API error (status {status}): {message}")]
pub struct ApiError {
    /// HTTP status code, 0 when no response was received
    pub status: u16,
    /// Message reported by the array
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn already_in_use(message: impl Into<String>) -> Self {
        Self::new(422, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }

    pub fn kind(&self) -> ApiErrorKind {
        match self.status {
            0 => ApiErrorKind::Transport,
            400 => ApiErrorKind::FailoverFromDestination,
            404 => ApiErrorKind::NotFound,
            422 => ApiErrorKind::AlreadyInUse,
            _ => ApiErrorKind::Other,
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ApiErrorKind::NotFound
    }

    #[inline]
    pub fn is_already_in_use(&self) -> bool {
        self.kind() == ApiErrorKind::AlreadyInUse
    }

    #[inline]
    pub fn is_failover_from_destination(&self) -> bool {
        self.kind() == ApiErrorKind::FailoverFromDestination
    }
}

/// Result type for array API calls
pub type ApiResult<T> = std::result::Result<T, ApiError>;

// =============================================================================
// Control Plane Errors
// =============================================================================

/// Unified error type for the control plane
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Not implemented: {0}")]
    Unimplemented(String),

    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Resource not found: {kind}/{id}")]
    NotFound { kind: String, id: String },

    #[error("Resource already exists: {kind}/{name}")]
    Conflict { kind: String, name: String },

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    // =========================================================================
    // Array Errors
    // =========================================================================
    #[error("Array not found: {global_id}")]
    ArrayNotFound { global_id: String },

    #[error("Array {array} failed {operation}: {source}")]
    ArrayApi {
        array: String,
        operation: String,
        #[source]
        source: ApiError,
    },

    // =========================================================================
    // Transport / Parse Errors
    // =========================================================================
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Status code reported to the orchestration platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    Aborted,
    DeadlineExceeded,
    Unimplemented,
    Internal,
    Unknown,
}

/// Action the caller's reconciliation loop should take on error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Wrap an array API failure with operation context
    pub fn array_api(array: impl Into<String>, operation: impl Into<String>, source: ApiError) -> Self {
        Error::ArrayApi {
            array: array.into(),
            operation: operation.into(),
            source,
        }
    }

    /// The underlying array API error, if any
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::ArrayApi { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether this error means the addressed resource is gone
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::ArrayApi { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Status code for the orchestration platform
    pub fn code(&self) -> Code {
        match self {
            Error::Validation(_) => Code::InvalidArgument,
            Error::NotFound { .. } => Code::NotFound,
            Error::Conflict { .. } => Code::AlreadyExists,
            Error::Precondition(_) => Code::Aborted,
            Error::Configuration(_) => Code::FailedPrecondition,
            Error::Timeout(_) => Code::DeadlineExceeded,
            Error::Unimplemented(_) => Code::Unimplemented,
            Error::Unknown(_) => Code::Unknown,
            Error::ArrayApi { source, .. } if source.is_not_found() => Code::NotFound,
            _ => Code::Internal,
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Http(_) | Error::Timeout(_) => ErrorAction::RequeueWithBackoff,
            Error::ArrayApi { source, .. } if source.kind() == ApiErrorKind::Transport => {
                ErrorAction::RequeueWithBackoff
            }

            // Previous action still running on the array - wait
            Error::Precondition(_) => ErrorAction::RequeueAfter(Duration::from_secs(5)),

            // Caller must fix the request
            Error::Validation(_) | Error::Configuration(_) | Error::Unimplemented(_) => {
                ErrorAction::NoRequeue
            }

            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }
}

/// Result type alias for the control plane
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_classification() {
        assert!(ApiError::not_found("volume").is_not_found());
        assert!(ApiError::already_in_use("name").is_already_in_use());
        assert!(ApiError::new(400, "destination").is_failover_from_destination());
        assert_eq!(ApiError::transport("refused").kind(), ApiErrorKind::Transport);
        assert_eq!(ApiError::new(500, "boom").kind(), ApiErrorKind::Other);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Validation("empty".into()).code(), Code::InvalidArgument);
        assert_eq!(Error::Precondition("busy".into()).code(), Code::Aborted);

        let wrapped = Error::array_api("PS0001", "get volume", ApiError::not_found("gone"));
        assert!(wrapped.is_not_found());
        assert_eq!(wrapped.code(), Code::NotFound);

        let wrapped = Error::array_api("PS0001", "get volume", ApiError::new(500, "boom"));
        assert!(!wrapped.is_not_found());
        assert_eq!(wrapped.code(), Code::Internal);
    }

    #[test]
    fn test_error_actions() {
        let err = Error::Precondition("still executing".into());
        assert_eq!(err.action(), ErrorAction::RequeueAfter(Duration::from_secs(5)));
        assert!(err.is_retryable());

        let err = Error::Validation("bad name".into());
        assert_eq!(err.action(), ErrorAction::NoRequeue);
        assert!(!err.is_retryable());

        let err = Error::array_api("PS0001", "pause", ApiError::transport("reset"));
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);
    }
}
