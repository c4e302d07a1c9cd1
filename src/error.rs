//! Engine error taxonomy shared by the lobby, matches and tournaments

use crate::store::StoreError;

/// Every rejected engine operation leaves in-memory state untouched, except
/// `Internal` failures raised after a transition already happened.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not allowed: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Internal(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
