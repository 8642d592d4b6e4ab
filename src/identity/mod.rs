//! Identity constraints (`xs:unique`, `xs:key` and `xs:keyref`).
//!
//! Constraints are evaluated while the document streams through
//! [`IdentityConstraintHandler`]; no tree is materialized.

mod handler;
pub mod xpath;

pub use handler::{FieldInput, IdentityConstraintHandler, IdentityViolation};
pub use xpath::XPath;

use crate::validation::content_model::ElementName;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityConstraintKind {
    Unique,
    Key,
    /// Refers to the `xs:key` or `xs:unique` named `refer`.
    KeyRef { refer: ElementName },
}

impl std::fmt::Display for IdentityConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unique => write!(f, "unique"),
            Self::Key => write!(f, "key"),
            Self::KeyRef { .. } => write!(f, "keyref"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityConstraint {
    pub kind: IdentityConstraintKind,
    pub name: ElementName,
    pub selector: XPath,
    pub fields: Vec<XPath>,
}

impl IdentityConstraint {
    pub fn new(
        kind: IdentityConstraintKind,
        name: ElementName,
        selector: XPath,
        fields: Vec<XPath>,
    ) -> Self {
        Self {
            kind,
            name,
            selector,
            fields,
        }
    }

    pub fn is_keyref(&self) -> bool {
        matches!(self.kind, IdentityConstraintKind::KeyRef { .. })
    }
}
