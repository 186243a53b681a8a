use lambda_http::http::StatusCode;
use thiserror::Error;

/// Errors produced by the complaint atoms.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AtomError {
    /// Malformed submission, rejected before any backend call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The referenced complaint does not exist.
    #[error("Complaint not found: {0}")]
    NotFound(String),

    /// The intent is not allowed for the record's current status.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The file was refused by the bucket's size/type policy.
    #[error("Storage policy violation: {0}")]
    StoragePolicy(String),

    /// Backing store (DynamoDB) call failed.
    #[error("Backing store error: {0}")]
    Store(String),

    /// Object storage (S3) call failed.
    #[error("Object storage error: {0}")]
    Storage(String),

    /// Missing or rejected session.
    #[error("Unauthorized")]
    Unauthorized,
}

impl AtomError {
    /// Connectivity-class failures are absorbed by the retry executor; the
    /// rest are surfaced to the caller on the first occurrence.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AtomError::Store(_) | AtomError::Storage(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AtomError::Validation(_) => StatusCode::BAD_REQUEST,
            AtomError::NotFound(_) => StatusCode::NOT_FOUND,
            AtomError::InvalidState(_) => StatusCode::CONFLICT,
            AtomError::StoragePolicy(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AtomError::Store(_) | AtomError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            AtomError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Convenience alias used throughout the atoms.
pub type Result<T> = std::result::Result<T, AtomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_backend_failures_are_retryable() {
        assert!(AtomError::Store("timeout".into()).is_retryable());
        assert!(AtomError::Storage("503".into()).is_retryable());
        assert!(!AtomError::Validation("title".into()).is_retryable());
        assert!(!AtomError::NotFound("id".into()).is_retryable());
        assert!(!AtomError::StoragePolicy("too large".into()).is_retryable());
        assert!(!AtomError::InvalidState("pending".into()).is_retryable());
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(AtomError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AtomError::Store("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AtomError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }
}
