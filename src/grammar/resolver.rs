use std::sync::Arc;

use crate::{
    FastHashMap, XML_SCHEMA_NAMESPACE,
    datatype::DatatypeValidator,
    environment::ParserEnvironment,
    error::XMLError,
    grammar::{
        Grammar, GrammarKey, GrammarPool, GrammarState, GrammarType,
        dtd::DTDElementDecl,
        schema::{ComplexType, ComplexTypeRef, Scope, SchemaElementDecl},
    },
};

/// An element declaration found by [`GrammarResolver::get_elem_decl`].
#[derive(Debug, Clone, Copy)]
pub enum ElementDeclRef<'a> {
    DTD(&'a DTDElementDecl),
    Schema(&'a SchemaElementDecl),
}

/// The grammars visible to one parse.
///
/// Grammars are looked up locally first and then in the attached pool. A grammar found
/// in the pool is remembered locally for the rest of the parse.
pub struct GrammarResolver {
    grammars: FastHashMap<GrammarKey, Arc<Grammar>>,
    pool: Option<Arc<dyn GrammarPool>>,
    environment: Arc<ParserEnvironment>,
}

impl GrammarResolver {
    pub fn new(pool: Option<Arc<dyn GrammarPool>>, environment: Arc<ParserEnvironment>) -> Self {
        Self {
            grammars: FastHashMap::default(),
            pool,
            environment,
        }
    }

    pub fn environment(&self) -> &Arc<ParserEnvironment> {
        &self.environment
    }

    pub fn pool(&self) -> Option<&Arc<dyn GrammarPool>> {
        self.pool.as_ref()
    }

    pub fn set_pool(&mut self, pool: Option<Arc<dyn GrammarPool>>) {
        self.pool = pool;
    }

    /// Register `grammar`, replacing and returning the grammar with the same key.
    pub fn put_grammar(&mut self, grammar: impl Into<Arc<Grammar>>) -> Option<Arc<Grammar>> {
        let grammar = grammar.into();
        log::debug!("put grammar {}", grammar.key());
        self.grammars.insert(grammar.key(), grammar)
    }

    pub fn remove_grammar(&mut self, key: &GrammarKey) -> Option<Arc<Grammar>> {
        self.grammars.remove(key)
    }

    /// Get the grammar for `key` from this resolver or the pool.
    pub fn get_grammar(&mut self, key: &GrammarKey) -> Option<Arc<Grammar>> {
        if let Some(grammar) = self.grammars.get(key) {
            return Some(grammar.clone());
        }
        let grammar = self.pool.as_ref()?.retrieve_grammar(key)?;
        log::trace!("grammar {key} is retrieved from the pool");
        self.grammars.insert(key.clone(), grammar.clone());
        Some(grammar)
    }

    /// Same as [`GrammarResolver::get_grammar`], but never consults the pool.
    pub fn local_grammar(&self, key: &GrammarKey) -> Option<&Arc<Grammar>> {
        self.grammars.get(key)
    }

    pub fn contains(&self, key: &GrammarKey) -> bool {
        self.grammars.contains_key(key)
            || self.pool.as_ref().is_some_and(|pool| pool.contains(key))
    }

    pub fn grammars(&self) -> impl Iterator<Item = &Arc<Grammar>> {
        self.grammars.values()
    }

    /// Load the initial grammar set of the pool into this resolver.
    pub fn preload_from_pool(&mut self, grammar_type: GrammarType) {
        let Some(pool) = self.pool.clone() else {
            return;
        };
        for grammar in pool.retrieve_initial_grammar_set(grammar_type) {
            self.grammars.entry(grammar.key()).or_insert(grammar);
        }
    }

    /// Look up an element declaration in the grammars of this resolver.
    ///
    /// For DTDs, `uri` and `scope` are ignored and `local_name` is the qualified name.
    pub fn get_elem_decl(
        &self,
        key: &GrammarKey,
        uri: Option<&str>,
        local_name: &str,
        scope: Scope,
    ) -> Option<ElementDeclRef<'_>> {
        match self.grammars.get(key)?.as_ref() {
            Grammar::DTD(dtd) => dtd.get_elem_decl(local_name).map(ElementDeclRef::DTD),
            Grammar::Schema(schema) => schema
                .get_elem_decl(uri, local_name, scope)
                .map(ElementDeclRef::Schema),
        }
    }

    /// Get or create an element declaration.
    ///
    /// Only grammars that are owned by this resolver alone and still being built can be
    /// modified. Grammars from a pool, or shared with other resolvers, are immutable.
    ///
    /// # Errors
    /// - [`XMLError::GrammarNotFound`] if no grammar has `key`.
    /// - [`XMLError::GrammarNotMutable`] if the grammar cannot be modified.
    pub fn find_or_add_elem_decl(
        &mut self,
        key: &GrammarKey,
        uri: Option<&str>,
        local_name: &str,
        scope: Scope,
    ) -> Result<usize, XMLError> {
        let grammar = self.grammars.get_mut(key).ok_or(XMLError::GrammarNotFound)?;
        let grammar = Arc::get_mut(grammar).ok_or(XMLError::GrammarNotMutable)?;
        if grammar.state() != GrammarState::Building {
            return Err(XMLError::GrammarNotMutable);
        }
        match grammar {
            Grammar::DTD(dtd) => dtd.find_or_add_elem_decl(local_name),
            Grammar::Schema(schema) => schema.find_or_add_elem_decl(uri, local_name, scope),
        }
    }

    /// Cache every validated grammar of this resolver in the pool.
    ///
    /// Either all grammars are cached or none is. DTDs with an internal subset belong
    /// to one document only, so they are never cached.
    pub fn cache_grammars(&self) -> Result<(), XMLError> {
        let Some(pool) = self.pool.as_ref() else {
            return Ok(());
        };
        let grammars = self
            .grammars
            .values()
            .filter(|grammar| grammar.state() == GrammarState::Validated)
            .filter(|grammar| {
                grammar
                    .as_dtd()
                    .is_none_or(|dtd| !dtd.has_internal_subset() && dtd.system_id().is_some())
            })
            .cloned()
            .collect::<Vec<_>>();
        pool.cache_grammars(&grammars)
    }

    /// Find a simple type by its expanded name.
    pub fn get_datatype_validator(
        &self,
        uri: Option<&str>,
        local_name: &str,
    ) -> Option<Arc<DatatypeValidator>> {
        if uri == Some(XML_SCHEMA_NAMESPACE) {
            return self.environment.builtin_types().get(local_name);
        }
        self.grammars
            .get(&GrammarKey::schema(uri))?
            .as_schema()?
            .datatypes()
            .get_by_name(uri, local_name)
    }

    /// Resolve a reference to a complex type.
    pub fn complex_type(&self, reference: &ComplexTypeRef) -> Option<&ComplexType> {
        self.grammars
            .get(&GrammarKey::schema(reference.namespace.as_deref()))?
            .as_schema()?
            .complex_type(reference.index)
    }

    /// Forget all grammars. The pool is kept.
    pub fn reset(&mut self) {
        self.grammars.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{DTDGrammar, MemoryGrammarPool, SchemaGrammar};

    #[test]
    fn mutability_tests() {
        let mut resolver = GrammarResolver::new(None, ParserEnvironment::new());
        let key = GrammarKey::dtd(None);
        resolver.put_grammar(Grammar::from(DTDGrammar::new("doc", None, None)));
        let id = resolver.find_or_add_elem_decl(&key, None, "doc", Scope::Global).unwrap();
        assert_eq!(
            resolver.find_or_add_elem_decl(&key, None, "doc", Scope::Global).unwrap(),
            id
        );
        assert!(resolver.get_elem_decl(&key, None, "doc", Scope::Global).is_some());

        // a shared grammar is read-only
        let shared = resolver.local_grammar(&key).unwrap().clone();
        assert!(matches!(
            resolver.find_or_add_elem_decl(&key, None, "other", Scope::Global),
            Err(XMLError::GrammarNotMutable)
        ));
        drop(shared);
        assert!(matches!(
            resolver.find_or_add_elem_decl(&GrammarKey::schema(None), None, "a", Scope::Global),
            Err(XMLError::GrammarNotFound)
        ));
    }

    #[test]
    fn pool_lookup_tests() {
        let pool = Arc::new(MemoryGrammarPool::new());
        let env = ParserEnvironment::new();
        let mut schema = SchemaGrammar::new(Some("urn:t"), &env.builtin_types());
        schema.set_validated();
        let mut first = GrammarResolver::new(Some(pool.clone()), env.clone());
        first.put_grammar(Grammar::from(schema));
        first.cache_grammars().unwrap();

        let mut second = GrammarResolver::new(Some(pool), env);
        let key = GrammarKey::schema(Some("urn:t"));
        assert!(second.local_grammar(&key).is_none());
        assert!(second.get_grammar(&key).is_some());
        assert!(second.local_grammar(&key).is_some());
        assert!(matches!(
            second.find_or_add_elem_decl(&key, Some("urn:t"), "a", Scope::Global),
            Err(XMLError::GrammarNotMutable)
        ));
        assert!(second.get_datatype_validator(Some(XML_SCHEMA_NAMESPACE), "int").is_some());
        assert!(second.get_datatype_validator(Some("urn:t"), "int").is_none());
    }
}
