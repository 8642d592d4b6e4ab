//! Process-wide resources that are shared by parsers but never stored in globals.

use std::sync::{Arc, OnceLock};

use strictxml_automata::unicode::CategoryTable;

use crate::datatype::BuiltinTypes;

/// Shared, read-only state threaded through readers and grammar builders.
///
/// Create one environment at startup and hand clones of the `Arc` to every
/// [`XMLReaderBuilder`](crate::sax::parser::XMLReaderBuilder). Parsers created without
/// an explicit environment get a fresh private one.
#[derive(Debug, Default)]
pub struct ParserEnvironment {
    categories: CategoryTable,
    builtins: OnceLock<Arc<BuiltinTypes>>,
}

impl ParserEnvironment {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Unicode category tables used by `pattern` facets.
    pub fn categories(&self) -> &CategoryTable {
        &self.categories
    }

    /// The built-in simple types of XML Schema, built on first use.
    pub fn builtin_types(&self) -> Arc<BuiltinTypes> {
        self.builtins
            .get_or_init(|| {
                log::debug!("build the table of built-in datatypes");
                Arc::new(BuiltinTypes::new())
            })
            .clone()
    }
}
