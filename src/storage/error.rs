use thiserror::Error;

use crate::domain::score::{ScoreId, ValidationError};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),

    #[error("score {0} not found")]
    NotFound(ScoreId),

    #[error("validation rejected: {0}")]
    ValidationRejected(#[from] ValidationError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
