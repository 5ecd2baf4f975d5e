//! Error types for the sandbox crate.

use thiserror::Error;

/// Errors surfaced at construction and load time.
///
/// Runtime degeneracies (a wheel ray with no direction, a node whose body has
/// vanished) are recovered inside the frame loop and never show up here.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// A wheel definition that would produce a broken suspension.
    #[error("invalid wheel {index}: {reason}")]
    InvalidWheel {
        /// Position of the wheel in the vehicle's wheel list.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// Any other rejected configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Node id that does not exist in the scene graph.
    #[error("unknown scene node {0}")]
    UnknownNode(usize),

    /// Node asked to become dynamic without a body declaration.
    #[error("scene node {0} declares no body")]
    NoBodyDeclared(usize),

    /// Config file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for the expected shape.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SandboxError {
    /// Creates an invalid wheel error.
    #[must_use]
    pub fn invalid_wheel(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidWheel {
            index,
            reason: reason.into(),
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, SandboxError>;
