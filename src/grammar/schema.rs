//! XML Schema grammars.
//!
//! One [`SchemaGrammar`] holds the components of one target namespace. Components refer
//! to each other by name ([`ElementName`]) or by index, so grammars of different
//! namespaces can be built independently and combined through a
//! [`GrammarResolver`](crate::grammar::GrammarResolver).

use std::sync::{Arc, OnceLock};

use crate::{
    FastHashMap,
    datatype::{BuiltinTypes, DatatypeValidator, DatatypeValidatorFactory, DerivationSet, TypeName},
    error::XMLError,
    grammar::{GrammarKey, GrammarState},
    identity::IdentityConstraint,
    pool::StringPool,
    validation::content_model::{
        ContentModel, ContentModelError, ContentParticle, ElementName, Wildcard,
    },
};

/// Where an element declaration is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    /// Local to the complex type with this index in the same grammar.
    Local(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueConstraint {
    Default(Box<str>),
    Fixed(Box<str>),
}

impl ValueConstraint {
    pub fn value(&self) -> &str {
        match self {
            Self::Default(value) | Self::Fixed(value) => value,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }
}

/// A reference to a complex type of the grammar for `namespace`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComplexTypeRef {
    pub namespace: Option<Arc<str>>,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub enum TypeDefinition {
    /// `xs:anyType`, the root of the type hierarchy.
    AnyType,
    Simple(Arc<DatatypeValidator>),
    Complex(ComplexTypeRef),
}

impl TypeDefinition {
    pub fn is_same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::AnyType, Self::AnyType) => true,
            (Self::Simple(a), Self::Simple(b)) => {
                Arc::ptr_eq(a, b) || (a.name().is_some() && a.name() == b.name())
            }
            (Self::Complex(a), Self::Complex(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivationMethod {
    Extension,
    Restriction,
}

#[derive(Debug, Clone)]
pub enum ContentType {
    Empty,
    Simple(Arc<DatatypeValidator>),
    ElementOnly(ContentParticle),
    Mixed(ContentParticle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttributeUseKind {
    #[default]
    Optional,
    Required,
    Prohibited,
}

#[derive(Debug, Clone)]
pub struct AttributeUse {
    pub name: ElementName,
    pub datatype: Arc<DatatypeValidator>,
    pub use_kind: AttributeUseKind,
    pub value_constraint: Option<ValueConstraint>,
}

/// A global attribute declaration.
#[derive(Debug, Clone)]
pub struct SchemaAttributeDecl {
    pub name: ElementName,
    pub datatype: Arc<DatatypeValidator>,
    pub value_constraint: Option<ValueConstraint>,
}

#[derive(Debug, Clone, Default)]
pub struct AttributeGroup {
    pub attributes: Vec<AttributeUse>,
    pub wildcard: Option<Wildcard>,
}

#[derive(Debug)]
pub struct ComplexType {
    pub name: Option<TypeName>,
    pub base: TypeDefinition,
    pub derivation: DerivationMethod,
    pub content: ContentType,
    pub attributes: Vec<AttributeUse>,
    pub attribute_wildcard: Option<Wildcard>,
    pub is_abstract: bool,
    pub block: DerivationSet,
    pub final_set: DerivationSet,
    content_model: OnceLock<Result<ContentModel, ContentModelError>>,
}

impl ComplexType {
    pub fn new(name: Option<TypeName>) -> Self {
        Self {
            name,
            base: TypeDefinition::AnyType,
            derivation: DerivationMethod::Restriction,
            content: ContentType::Empty,
            attributes: vec![],
            attribute_wildcard: None,
            is_abstract: false,
            block: DerivationSet::empty(),
            final_set: DerivationSet::empty(),
            content_model: OnceLock::new(),
        }
    }

    pub fn is_mixed(&self) -> bool {
        matches!(self.content, ContentType::Mixed(_))
    }

    pub fn get_attribute_use(&self, name: &ElementName) -> Option<&AttributeUse> {
        self.attributes.iter().find(|att| &att.name == name)
    }

    /// The content model of the element children, built on first use.
    pub fn content_model(&self) -> Result<&ContentModel, ContentModelError> {
        self.content_model
            .get_or_init(|| match &self.content {
                ContentType::Empty | ContentType::Simple(_) => Ok(ContentModel::empty()),
                ContentType::ElementOnly(particle) | ContentType::Mixed(particle) => {
                    ContentModel::build(particle)
                }
            })
            .as_ref()
            .map_err(Clone::clone)
    }
}

#[derive(Debug, Clone)]
pub struct SchemaElementDecl {
    pub id: usize,
    pub name: ElementName,
    pub scope: Scope,
    pub type_definition: TypeDefinition,
    pub nillable: bool,
    pub is_abstract: bool,
    pub value_constraint: Option<ValueConstraint>,
    pub substitution_group: Option<ElementName>,
    pub block: DerivationSet,
    pub final_set: DerivationSet,
    pub identity_constraints: Vec<Arc<IdentityConstraint>>,
}

impl SchemaElementDecl {
    pub fn new(name: ElementName, scope: Scope) -> Self {
        Self {
            id: 0,
            name,
            scope,
            type_definition: TypeDefinition::AnyType,
            nillable: false,
            is_abstract: false,
            value_constraint: None,
            substitution_group: None,
            block: DerivationSet::empty(),
            final_set: DerivationSet::empty(),
            identity_constraints: vec![],
        }
    }
}

#[derive(Debug)]
pub struct SchemaGrammar {
    target_namespace: Option<Arc<str>>,
    state: GrammarState,
    names: StringPool,
    elements: Vec<SchemaElementDecl>,
    element_index: FastHashMap<(u32, u32, Scope), usize>,
    complex_types: Vec<ComplexType>,
    complex_type_index: FastHashMap<TypeName, usize>,
    datatypes: DatatypeValidatorFactory,
    attributes: FastHashMap<ElementName, SchemaAttributeDecl>,
    attribute_groups: FastHashMap<ElementName, AttributeGroup>,
    model_groups: FastHashMap<ElementName, ContentParticle>,
    identity_constraints: FastHashMap<ElementName, Arc<IdentityConstraint>>,
    substitution_groups: FastHashMap<ElementName, Vec<ElementName>>,
    locations: Vec<Arc<str>>,
}

impl SchemaGrammar {
    pub fn new(target_namespace: Option<&str>, builtins: &BuiltinTypes) -> Self {
        Self {
            target_namespace: target_namespace.filter(|ns| !ns.is_empty()).map(Arc::from),
            state: GrammarState::Building,
            names: StringPool::new(),
            elements: vec![],
            element_index: FastHashMap::default(),
            complex_types: vec![],
            complex_type_index: FastHashMap::default(),
            datatypes: DatatypeValidatorFactory::new(builtins),
            attributes: FastHashMap::default(),
            attribute_groups: FastHashMap::default(),
            model_groups: FastHashMap::default(),
            identity_constraints: FastHashMap::default(),
            substitution_groups: FastHashMap::default(),
            locations: vec![],
        }
    }

    pub fn key(&self) -> GrammarKey {
        GrammarKey::schema(self.target_namespace.as_deref())
    }

    pub fn state(&self) -> GrammarState {
        self.state
    }

    pub fn set_validated(&mut self) {
        self.state = GrammarState::Validated;
    }

    pub fn target_namespace(&self) -> Option<&str> {
        self.target_namespace.as_deref()
    }

    /// The locations of the schema documents that contributed to this grammar.
    pub fn locations(&self) -> &[Arc<str>] {
        &self.locations
    }

    /// Returns `false` if `location` was already recorded.
    pub(crate) fn add_location(&mut self, location: &str) -> bool {
        if self.locations.iter().any(|loc| loc.as_ref() == location) {
            return false;
        }
        self.locations.push(location.into());
        true
    }

    fn check_mutable(&self) -> Result<(), XMLError> {
        if self.state != GrammarState::Building {
            return Err(XMLError::GrammarNotMutable);
        }
        Ok(())
    }

    fn element_key(&mut self, uri: Option<&str>, local_name: &str, scope: Scope) -> (u32, u32, Scope) {
        (
            self.names.add_or_find(uri.unwrap_or("")),
            self.names.add_or_find(local_name),
            scope,
        )
    }

    /// Get the id of the declaration for (`uri`, `local_name`, `scope`), creating a
    /// placeholder of type `xs:anyType` if absent.
    pub fn find_or_add_elem_decl(
        &mut self,
        uri: Option<&str>,
        local_name: &str,
        scope: Scope,
    ) -> Result<usize, XMLError> {
        self.check_mutable()?;
        let key = self.element_key(uri, local_name, scope);
        if let Some(&id) = self.element_index.get(&key) {
            return Ok(id);
        }
        let id = self.elements.len();
        let mut decl = SchemaElementDecl::new(ElementName::new(uri, local_name), scope);
        decl.id = id;
        self.elements.push(decl);
        self.element_index.insert(key, id);
        Ok(id)
    }

    /// # Errors
    /// [`XMLError::SchemaDuplicateDeclaration`] if an element with the same name is
    /// already declared in the same scope.
    pub fn add_element_decl(&mut self, mut decl: SchemaElementDecl) -> Result<usize, XMLError> {
        self.check_mutable()?;
        let key = self.element_key(decl.name.namespace(), &decl.name.local_name, decl.scope);
        if self.element_index.contains_key(&key) {
            return Err(XMLError::SchemaDuplicateDeclaration);
        }
        let id = self.elements.len();
        decl.id = id;
        if let Some(head) = decl.substitution_group.clone() {
            self.substitution_groups
                .entry(head)
                .or_default()
                .push(decl.name.clone());
        }
        self.elements.push(decl);
        self.element_index.insert(key, id);
        Ok(id)
    }

    /// Look up an element declaration without modifying the grammar.
    pub fn get_elem_decl(
        &self,
        uri: Option<&str>,
        local_name: &str,
        scope: Scope,
    ) -> Option<&SchemaElementDecl> {
        let uri = self.names.id_of(uri.unwrap_or(""));
        let local = self.names.id_of(local_name);
        self.element_index
            .get(&(uri, local, scope))
            .and_then(|&id| self.elements.get(id))
    }

    pub fn global_element(&self, name: &ElementName) -> Option<&SchemaElementDecl> {
        self.get_elem_decl(name.namespace(), &name.local_name, Scope::Global)
    }

    pub fn elem_decl(&self, id: usize) -> Option<&SchemaElementDecl> {
        self.elements.get(id)
    }

    pub(crate) fn elem_decl_mut(&mut self, id: usize) -> Option<&mut SchemaElementDecl> {
        self.elements.get_mut(id)
    }

    pub fn global_elements(&self) -> impl Iterator<Item = &SchemaElementDecl> {
        self.elements
            .iter()
            .filter(|decl| decl.scope == Scope::Global)
    }

    /// Reserve the index of a complex type so that local declarations can refer to it
    /// before its content is known.
    pub fn add_complex_type(&mut self, complex_type: ComplexType) -> Result<usize, XMLError> {
        self.check_mutable()?;
        let index = self.complex_types.len();
        if let Some(name) = complex_type.name.clone() {
            if self.complex_type_index.contains_key(&name) || self.datatypes.contains(&name) {
                return Err(XMLError::SchemaDuplicateDeclaration);
            }
            self.complex_type_index.insert(name, index);
        }
        self.complex_types.push(complex_type);
        Ok(index)
    }

    pub fn complex_type(&self, index: usize) -> Option<&ComplexType> {
        self.complex_types.get(index)
    }

    pub(crate) fn complex_type_mut(&mut self, index: usize) -> Option<&mut ComplexType> {
        self.complex_types.get_mut(index)
    }

    pub fn complex_type_index(&self, name: &TypeName) -> Option<usize> {
        self.complex_type_index.get(name).copied()
    }

    pub fn complex_types(&self) -> impl Iterator<Item = &ComplexType> {
        self.complex_types.iter()
    }

    pub fn datatypes(&self) -> &DatatypeValidatorFactory {
        &self.datatypes
    }

    pub(crate) fn datatypes_mut(&mut self) -> &mut DatatypeValidatorFactory {
        &mut self.datatypes
    }

    pub fn add_attribute_decl(&mut self, decl: SchemaAttributeDecl) -> Result<(), XMLError> {
        self.check_mutable()?;
        if self.attributes.contains_key(&decl.name) {
            return Err(XMLError::SchemaDuplicateDeclaration);
        }
        self.attributes.insert(decl.name.clone(), decl);
        Ok(())
    }

    pub fn get_attribute_decl(&self, name: &ElementName) -> Option<&SchemaAttributeDecl> {
        self.attributes.get(name)
    }

    pub fn add_attribute_group(
        &mut self,
        name: ElementName,
        group: AttributeGroup,
    ) -> Result<(), XMLError> {
        self.check_mutable()?;
        if self.attribute_groups.contains_key(&name) {
            return Err(XMLError::SchemaDuplicateDeclaration);
        }
        self.attribute_groups.insert(name, group);
        Ok(())
    }

    pub fn get_attribute_group(&self, name: &ElementName) -> Option<&AttributeGroup> {
        self.attribute_groups.get(name)
    }

    pub fn add_model_group(
        &mut self,
        name: ElementName,
        particle: ContentParticle,
    ) -> Result<(), XMLError> {
        self.check_mutable()?;
        if self.model_groups.contains_key(&name) {
            return Err(XMLError::SchemaDuplicateDeclaration);
        }
        self.model_groups.insert(name, particle);
        Ok(())
    }

    pub fn get_model_group(&self, name: &ElementName) -> Option<&ContentParticle> {
        self.model_groups.get(name)
    }

    pub fn add_identity_constraint(
        &mut self,
        constraint: Arc<IdentityConstraint>,
    ) -> Result<(), XMLError> {
        self.check_mutable()?;
        if self.identity_constraints.contains_key(&constraint.name) {
            return Err(XMLError::SchemaDuplicateDeclaration);
        }
        self.identity_constraints
            .insert(constraint.name.clone(), constraint);
        Ok(())
    }

    pub fn get_identity_constraint(&self, name: &ElementName) -> Option<&Arc<IdentityConstraint>> {
        self.identity_constraints.get(name)
    }

    /// The direct members of the substitution group headed by `head`.
    pub fn substitution_members(&self, head: &ElementName) -> &[ElementName] {
        self.substitution_groups
            .get(head)
            .map(|members| members.as_slice())
            .unwrap_or_default()
    }

    pub fn prebuild_content_models(&self) {
        for complex_type in &self.complex_types {
            if let Err(err) = complex_type.content_model() {
                log::warn!(
                    "content model of '{}' cannot be built: {err:?}",
                    complex_type
                        .name
                        .as_ref()
                        .map(|name| name.to_string())
                        .unwrap_or_else(|| "(anonymous)".to_owned())
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_scope_tests() {
        let builtins = BuiltinTypes::new();
        let mut grammar = SchemaGrammar::new(Some("urn:t"), &builtins);
        let ct = grammar.add_complex_type(ComplexType::new(None)).unwrap();

        let global = SchemaElementDecl::new(ElementName::new(Some("urn:t"), "a"), Scope::Global);
        let local = SchemaElementDecl::new(ElementName::new(Some("urn:t"), "a"), Scope::Local(ct));
        let g = grammar.add_element_decl(global.clone()).unwrap();
        let l = grammar.add_element_decl(local).unwrap();
        assert_ne!(g, l);
        assert!(matches!(
            grammar.add_element_decl(global),
            Err(XMLError::SchemaDuplicateDeclaration)
        ));
        assert_eq!(grammar.get_elem_decl(Some("urn:t"), "a", Scope::Local(ct)).unwrap().id, l);
        assert!(grammar.get_elem_decl(None, "a", Scope::Global).is_none());
        assert_eq!(grammar.global_elements().count(), 1);
    }

    #[test]
    fn substitution_group_tests() {
        let builtins = BuiltinTypes::new();
        let mut grammar = SchemaGrammar::new(None, &builtins);
        let head = ElementName::new(None, "shape");
        let mut member = SchemaElementDecl::new(ElementName::new(None, "circle"), Scope::Global);
        member.substitution_group = Some(head.clone());
        grammar.add_element_decl(member).unwrap();
        assert_eq!(grammar.substitution_members(&head).len(), 1);
        assert!(grammar.substitution_members(&ElementName::new(None, "circle")).is_empty());
    }

    #[test]
    fn frozen_grammar_tests() {
        let builtins = BuiltinTypes::new();
        let mut grammar = SchemaGrammar::new(None, &builtins);
        grammar.set_validated();
        assert!(matches!(
            grammar.find_or_add_elem_decl(None, "a", Scope::Global),
            Err(XMLError::GrammarNotMutable)
        ));
    }
}
