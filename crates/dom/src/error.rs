//! Error types for DOM operations
//!
//! Simple, flat error hierarchy. Only selector compilation can fail at the
//! API surface; tree edits are total.

use crate::types::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DomError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("Invalid selector `{selector}` at position {position}: {reason}")]
    Syntax {
        selector: String,
        position: usize,
        reason: String,
    },

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
}

impl DomError {
    pub fn is_syntax(&self) -> bool {
        matches!(self, DomError::Syntax { .. })
    }
}
