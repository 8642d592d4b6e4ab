//! Validators driven by the reader while a document streams through it.
//!
//! Validators never report errors themselves. They return [`Violation`]s, and the
//! reader decides their level and attaches the current position.

pub mod content_model;
pub mod dtd;
pub mod schema;

use crate::error::XMLError;

/// A validity constraint is violated.
#[derive(Debug, Clone)]
pub struct Violation {
    pub error: XMLError,
    pub message: String,
}

impl Violation {
    pub fn new(error: XMLError, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}
