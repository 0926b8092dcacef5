//! Error types for queue operations.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("index {index} is out of range for {len} action(s)")]
    Index { index: usize, len: usize },

    #[error("no index found for {name}")]
    NotFound { name: String },
}

impl QueueError {
    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
