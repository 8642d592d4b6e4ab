use std::sync::Arc;

use strictxml_automata::unicode::CategoryTable;

use crate::{FastHashMap, XML_SCHEMA_NAMESPACE, error::XMLError};

use super::{BuiltinTypes, DatatypeValidator, DerivationSet, FacetValue, TypeName};

/// The registry of the simple types known to one schema grammar.
///
/// Built-in types are registered in the XML Schema namespace when the factory is created.
/// User-defined types are registered under their target namespace.
#[derive(Debug, Clone, Default)]
pub struct DatatypeValidatorFactory {
    types: FastHashMap<TypeName, Arc<DatatypeValidator>>,
}

impl DatatypeValidatorFactory {
    pub fn new(builtins: &BuiltinTypes) -> Self {
        let types = builtins
            .iter()
            .map(|(name, dv)| (TypeName::new(Some(XML_SCHEMA_NAMESPACE), name), dv.clone()))
            .collect();
        Self { types }
    }

    pub fn get(&self, name: &TypeName) -> Option<Arc<DatatypeValidator>> {
        self.types.get(name).cloned()
    }

    pub fn get_by_name(&self, namespace: Option<&str>, local_name: &str) -> Option<Arc<DatatypeValidator>> {
        self.get(&TypeName::new(namespace, local_name))
    }

    pub fn contains(&self, name: &TypeName) -> bool {
        self.types.contains_key(name)
    }

    /// # Errors
    /// - `dv` has no name.
    /// - A type with the same name is already registered.
    pub fn register(&mut self, dv: Arc<DatatypeValidator>) -> Result<(), XMLError> {
        let name = dv.name().cloned().ok_or(XMLError::SchemaInvalidDerivation)?;
        if self.types.contains_key(&name) {
            return Err(XMLError::SchemaDuplicateDeclaration);
        }
        log::trace!("register simple type {name}");
        self.types.insert(name, dv);
        Ok(())
    }

    /// Derive a restriction of `base` and register it if it is named.
    pub fn create_restriction(
        &mut self,
        base: &Arc<DatatypeValidator>,
        name: Option<TypeName>,
        facets: &[FacetValue],
        final_set: DerivationSet,
        categories: &CategoryTable,
    ) -> Result<Arc<DatatypeValidator>, XMLError> {
        let dv = Arc::new(DatatypeValidator::new_instance(
            base, name, facets, final_set, categories,
        )?);
        self.register_if_named(dv)
    }

    pub fn create_list(
        &mut self,
        item: &Arc<DatatypeValidator>,
        name: Option<TypeName>,
        final_set: DerivationSet,
    ) -> Result<Arc<DatatypeValidator>, XMLError> {
        let dv = Arc::new(DatatypeValidator::derive_list(item, name, final_set)?);
        self.register_if_named(dv)
    }

    pub fn create_union(
        &mut self,
        members: Vec<Arc<DatatypeValidator>>,
        name: Option<TypeName>,
        final_set: DerivationSet,
    ) -> Result<Arc<DatatypeValidator>, XMLError> {
        let dv = Arc::new(DatatypeValidator::derive_union(members, name, final_set)?);
        self.register_if_named(dv)
    }

    fn register_if_named(
        &mut self,
        dv: Arc<DatatypeValidator>,
    ) -> Result<Arc<DatatypeValidator>, XMLError> {
        if dv.name().is_some() {
            self.register(dv.clone())?;
        }
        Ok(dv)
    }

    /// Iterate the user-defined types, skipping the built-in ones.
    pub fn user_types(&self) -> impl Iterator<Item = &Arc<DatatypeValidator>> {
        self.types.values().filter(|dv| !dv.is_builtin())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::{FacetKind, NoContext};

    #[test]
    fn registry_tests() {
        let builtins = BuiltinTypes::new();
        let mut factory = DatatypeValidatorFactory::new(&builtins);
        assert_eq!(factory.len(), builtins.len());
        assert!(factory.get_by_name(Some(XML_SCHEMA_NAMESPACE), "int").is_some());
        assert!(factory.get_by_name(None, "int").is_none());

        let base = factory.get_by_name(Some(XML_SCHEMA_NAMESPACE), "string").unwrap();
        let name = TypeName::new(Some("urn:t"), "short-string");
        let dv = factory
            .create_restriction(
                &base,
                Some(name.clone()),
                &[FacetValue::new(FacetKind::MaxLength, "3")],
                DerivationSet::empty(),
                &CategoryTable::new(),
            )
            .unwrap();
        assert!(dv.validate("abc", &NoContext).is_ok());
        assert!(factory.get(&name).is_some());
        assert_eq!(factory.user_types().count(), 1);
        assert!(matches!(
            factory.create_list(&base, Some(name), DerivationSet::empty()),
            Err(XMLError::SchemaDuplicateDeclaration)
        ));
    }
}
