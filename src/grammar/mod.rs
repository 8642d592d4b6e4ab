//! Grammars: the declarations against which documents are validated.
//!
//! A grammar is built by exactly one owner in the [`GrammarState::Building`] state and
//! then frozen into an `Arc<Grammar>`. Frozen grammars are shared by resolvers and
//! pools and are never mutated again.

pub mod dtd;
mod pool;
mod resolver;
pub mod schema;

use std::sync::Arc;

pub use dtd::DTDGrammar;
pub use pool::{GrammarPool, MemoryGrammarPool};
pub use resolver::{ElementDeclRef, GrammarResolver};
pub use schema::SchemaGrammar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrammarType {
    DTD,
    Schema,
}

impl std::fmt::Display for GrammarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DTD => write!(f, "DTD"),
            Self::Schema => write!(f, "XML Schema"),
        }
    }
}

/// The identity of a grammar in resolvers and pools.
///
/// Schema grammars are identified by their target namespace. DTDs have no namespace, so
/// `target` holds the system identifier of the external subset, or `None` for a DTD
/// that only has an internal subset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrammarKey {
    pub grammar_type: GrammarType,
    pub target: Option<Arc<str>>,
}

impl GrammarKey {
    pub fn dtd(system_id: Option<&str>) -> Self {
        Self {
            grammar_type: GrammarType::DTD,
            target: system_id.map(Arc::from),
        }
    }

    pub fn schema(namespace: Option<&str>) -> Self {
        Self {
            grammar_type: GrammarType::Schema,
            target: namespace.filter(|ns| !ns.is_empty()).map(Arc::from),
        }
    }
}

impl std::fmt::Display for GrammarKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({})",
            self.grammar_type,
            self.target.as_deref().unwrap_or("")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrammarState {
    Building,
    Validated,
}

#[derive(Debug)]
pub enum Grammar {
    DTD(DTDGrammar),
    Schema(SchemaGrammar),
}

impl Grammar {
    pub fn key(&self) -> GrammarKey {
        match self {
            Self::DTD(dtd) => dtd.key(),
            Self::Schema(schema) => schema.key(),
        }
    }

    pub fn grammar_type(&self) -> GrammarType {
        match self {
            Self::DTD(_) => GrammarType::DTD,
            Self::Schema(_) => GrammarType::Schema,
        }
    }

    pub fn state(&self) -> GrammarState {
        match self {
            Self::DTD(dtd) => dtd.state(),
            Self::Schema(schema) => schema.state(),
        }
    }

    pub fn as_dtd(&self) -> Option<&DTDGrammar> {
        match self {
            Self::DTD(dtd) => Some(dtd),
            _ => None,
        }
    }

    pub fn as_schema(&self) -> Option<&SchemaGrammar> {
        match self {
            Self::Schema(schema) => Some(schema),
            _ => None,
        }
    }

    /// Compile every content model so that shared users never build them lazily.
    pub fn prebuild_content_models(&self) {
        match self {
            Self::DTD(dtd) => dtd.prebuild_content_models(),
            Self::Schema(schema) => schema.prebuild_content_models(),
        }
    }
}

impl From<DTDGrammar> for Grammar {
    fn from(value: DTDGrammar) -> Self {
        Self::DTD(value)
    }
}

impl From<SchemaGrammar> for Grammar {
    fn from(value: SchemaGrammar) -> Self {
        Self::Schema(value)
    }
}
