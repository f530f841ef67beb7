use thiserror::Error;

use super::node::KindTag;

/// Structural error raised by tree construction and mutation.
/// A mutation that returns one of these has been rolled back completely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("{child} is already a child of this {parent}")]
    AlreadyPresent { parent: KindTag, child: KindTag },

    #[error("{child} is not a child of this {parent}")]
    NotFound { parent: KindTag, child: KindTag },

    #[error("malformed {parent}: {reason}")]
    InvalidStructure { parent: KindTag, reason: String },

    #[error("{0} has no parent to edit")]
    Detached(KindTag),
}

impl TreeError {
    pub(crate) fn invalid(parent: KindTag, reason: impl Into<String>) -> Self {
        TreeError::InvalidStructure { parent, reason: reason.into() }
    }
}
