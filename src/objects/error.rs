//! Class system errors

use thiserror::Error;

use super::NameError;

/// Errors raised by the class registry, descriptors and instances
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassError {
    #[error("class '{0}' is already defined")]
    DuplicateClass(String),

    #[error("parent class '{0}' is not defined")]
    UnknownParent(String),

    #[error("class '{0}' is not defined")]
    UnknownClass(String),

    #[error("invalid class name: {0}")]
    InvalidName(#[from] NameError),

    #[error("attribute '{attribute}' of class '{class}' is read-only")]
    ReadOnlyAttribute { class: String, attribute: String },

    #[error("class '{class}' has no method '{method}'")]
    UnknownMethod { class: String, method: String },

    #[error("method called without an instance receiver")]
    MissingReceiver,

    /// Raised by user-supplied method bodies
    #[error("{0}")]
    Runtime(String),
}

impl ClassError {
    /// Build a runtime error from a method body
    pub fn runtime(msg: impl Into<String>) -> Self {
        ClassError::Runtime(msg.into())
    }
}
