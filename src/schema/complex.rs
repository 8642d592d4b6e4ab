use std::sync::Arc;

use crate::{
    XML_SCHEMA_NAMESPACE, XML_XML_NAMESPACE,
    datatype::{DatatypeValidator, DerivationSet, NoContext, TypeName},
    error::XMLError,
    grammar::schema::{
        AttributeGroup, AttributeUse, AttributeUseKind, ComplexType, ComplexTypeRef, ContentType,
        DerivationMethod, SchemaAttributeDecl, SchemaElementDecl, Scope, TypeDefinition,
        ValueConstraint,
    },
    identity::{IdentityConstraint, IdentityConstraintKind, XPath},
    util::StringTokenizer,
    validation::content_model::{
        ContentParticle, ElementName, NamespaceConstraint, ProcessContents, Wildcard,
    },
};

use super::{Component, SchemaBuilder};

/// What a derived complex type takes over from its base.
struct BaseType {
    content: ContentType,
    attributes: Vec<AttributeUse>,
    wildcard: Option<Wildcard>,
    final_set: DerivationSet,
}

impl BaseType {
    fn any_type() -> Self {
        Self {
            content: ContentType::Mixed(ContentParticle::Wildcard(Wildcard {
                namespaces: NamespaceConstraint::Any,
                process_contents: ProcessContents::Lax,
            })
            .zero_or_more()),
            attributes: vec![],
            wildcard: Some(Wildcard {
                namespaces: NamespaceConstraint::Any,
                process_contents: ProcessContents::Lax,
            }),
            final_set: DerivationSet::empty(),
        }
    }

    fn from_complex(complex: &ComplexType) -> Self {
        Self {
            content: complex.content.clone(),
            attributes: complex.attributes.clone(),
            wildcard: complex.attribute_wildcard.clone(),
            final_set: complex.final_set,
        }
    }
}

/// Attribute uses and the attribute wildcard collected from one component.
#[derive(Default)]
struct AttributeSet {
    uses: Vec<AttributeUse>,
    wildcard: Option<Wildcard>,
}

impl AttributeSet {
    /// Returns the name of `att` back if it is already used.
    fn push(&mut self, att: AttributeUse) -> Result<(), ElementName> {
        if self.uses.iter().any(|used| used.name == att.name) {
            return Err(att.name);
        }
        self.uses.push(att);
        Ok(())
    }
}

fn is_particle(name: &str) -> bool {
    matches!(name, "sequence" | "choice" | "all" | "group")
}

fn is_attribute_like(name: &str) -> bool {
    matches!(name, "attribute" | "attributeGroup" | "anyAttribute")
}

fn derivation_flag(method: DerivationMethod) -> DerivationSet {
    match method {
        DerivationMethod::Extension => DerivationSet::EXTENSION,
        DerivationMethod::Restriction => DerivationSet::RESTRICTION,
    }
}

impl SchemaBuilder<'_> {
    /// Resolve the type named `name` for use in a declaration or derivation.
    pub(super) fn type_definition(&mut self, name: &TypeName) -> Result<TypeDefinition, XMLError> {
        if name.namespace() == Some(XML_SCHEMA_NAMESPACE) && &*name.local_name == "anyType" {
            return Ok(TypeDefinition::AnyType);
        }
        if name.namespace() == self.target_namespace() {
            if let Some(index) = self.grammar.complex_type_index(name) {
                return Ok(TypeDefinition::Complex(ComplexTypeRef {
                    namespace: name.uri.clone(),
                    index,
                }));
            }
        } else if name.namespace() != Some(XML_SCHEMA_NAMESPACE)
            && let Some(grammar) = self.foreign_grammar(name.namespace())
            && let Some(index) = grammar
                .as_schema()
                .and_then(|schema| schema.complex_type_index(name))
        {
            return Ok(TypeDefinition::Complex(ComplexTypeRef {
                namespace: name.uri.clone(),
                index,
            }));
        }
        self.simple_type_by_name(name).map(TypeDefinition::Simple)
    }

    /// Build the reserved complex type `index` if it is still pending.
    pub(super) fn complete_complex_type(&mut self, index: usize) -> Result<(), XMLError> {
        let Some(comp) = self.pending_complex.remove(&index) else {
            if self.building_complex.contains(&index) {
                log::warn!("a complex type is derived from itself");
                return Err(XMLError::SchemaCircularDefinition);
            }
            return Ok(());
        };
        self.building_complex.insert(index);
        self.complex_components.insert(index, comp);
        let name = self
            .grammar
            .complex_type(index)
            .and_then(|complex| complex.name.clone());
        let built = self.complex_type(comp, name, index);
        self.building_complex.remove(&index);
        let built = built?;
        if let Some(slot) = self.grammar.complex_type_mut(index) {
            *slot = built;
        }
        Ok(())
    }

    /// Build an anonymous complex type and return a reference to it.
    fn anonymous_complex_type(&mut self, comp: Component) -> Result<TypeDefinition, XMLError> {
        let index = self.grammar.add_complex_type(ComplexType::new(None))?;
        self.pending_complex.insert(index, comp);
        self.complete_complex_type(index)?;
        Ok(TypeDefinition::Complex(ComplexTypeRef {
            namespace: self.target_namespace().map(Arc::from),
            index,
        }))
    }

    fn base_type(&mut self, comp: Component, base: &TypeDefinition) -> Result<BaseType, XMLError> {
        match base {
            TypeDefinition::AnyType => Ok(BaseType::any_type()),
            TypeDefinition::Simple(dv) => Ok(BaseType {
                content: ContentType::Simple(dv.clone()),
                attributes: vec![],
                wildcard: None,
                final_set: dv.final_set(),
            }),
            TypeDefinition::Complex(reference) => {
                if reference.namespace.as_deref() == self.target_namespace() {
                    self.complete_complex_type(reference.index)
                        .map_err(|err| self.fail(comp, err, "the base type cannot be built"))?;
                    self.grammar
                        .complex_type(reference.index)
                        .map(BaseType::from_complex)
                        .ok_or(XMLError::InternalError)
                } else {
                    self.resolver
                        .complex_type(reference)
                        .map(BaseType::from_complex)
                        .ok_or(XMLError::SchemaUnresolvedReference)
                }
            }
        }
    }

    /// Build the `xs:complexType` at `comp`, whose index in the grammar is `index`.
    fn complex_type(
        &mut self,
        comp: Component,
        name: Option<TypeName>,
        index: usize,
    ) -> Result<ComplexType, XMLError> {
        let mut complex = ComplexType::new(name);
        let (block_default, final_default) = {
            let doc = self.doc(comp);
            (doc.block_default, doc.final_default)
        };
        let derivations = DerivationSet::EXTENSION | DerivationSet::RESTRICTION;
        complex.is_abstract = self.boolean_attribute(comp, "abstract")?;
        complex.block = self.derivation_attribute(comp, "block", block_default, derivations)?;
        complex.final_set = self.derivation_attribute(comp, "final", final_default, derivations)?;
        let mut mixed = self.boolean_attribute(comp, "mixed")?;

        let children = self.children(comp);
        let content = children
            .iter()
            .find(|(_, name)| name == "simpleContent" || name == "complexContent");
        let Some((content, kind)) = content else {
            // shorthand for a restriction of anyType
            let particle = self.content_particle(comp, index)?;
            let attributes = self.attribute_set(comp)?;
            complex.content = content_type(particle, mixed);
            complex.attributes = attributes.uses;
            complex.attribute_wildcard = attributes.wildcard;
            return Ok(complex);
        };
        let content = *content;
        if kind == "complexContent" && self.attribute(content, "mixed").is_some() {
            mixed = self.boolean_attribute(content, "mixed")?;
        }

        let derivation = self.children(content);
        let [(derivation, method)] = derivation.as_slice() else {
            return Err(self.fail(
                content,
                XMLError::SchemaUnexpectedElement,
                "exactly one of 'extension' or 'restriction' is required",
            ));
        };
        let derivation = *derivation;
        complex.derivation = match method.as_str() {
            "extension" => DerivationMethod::Extension,
            "restriction" => DerivationMethod::Restriction,
            other => {
                return Err(self.fail(
                    derivation,
                    XMLError::SchemaUnexpectedElement,
                    format_args!("'{other}' is not a derivation method"),
                ));
            }
        };
        let base_name = self.attribute(derivation, "base").ok_or_else(|| {
            self.fail(derivation, XMLError::SchemaMissingAttribute, "'base' is missing")
        })?;
        let base_name = self.resolve_qname(derivation, &base_name)?;
        complex.base = self.type_definition(&base_name)?;
        let base = self.base_type(derivation, &complex.base)?;
        if base.final_set.contains(derivation_flag(complex.derivation)) {
            return Err(self.fail(
                derivation,
                XMLError::SchemaFinalDerivation,
                format_args!("'{base_name}' does not allow this derivation"),
            ));
        }

        let own = self.attribute_set(derivation)?;
        let (attributes, wildcard) = match complex.derivation {
            DerivationMethod::Extension => {
                let mut attributes = base.attributes.clone();
                for att in own.uses {
                    if attributes.iter().any(|base| base.name == att.name) {
                        return Err(self.fail(
                            derivation,
                            XMLError::SchemaDuplicateDeclaration,
                            format_args!("the attribute '{}' is already used by the base type", att.name),
                        ));
                    }
                    attributes.push(att);
                }
                (attributes, union_wildcard(own.wildcard, base.wildcard.clone()))
            }
            DerivationMethod::Restriction => {
                let mut attributes = base.attributes.clone();
                for att in own.uses {
                    match attributes.iter_mut().find(|base| base.name == att.name) {
                        Some(slot) => *slot = att,
                        None => attributes.push(att),
                    }
                }
                (attributes, own.wildcard)
            }
        };
        complex.attributes = attributes;
        complex.attribute_wildcard = wildcard;

        complex.content = if kind == "simpleContent" {
            self.simple_content(derivation, complex.derivation, &base)?
        } else {
            let particle = self.content_particle(derivation, index)?;
            match complex.derivation {
                DerivationMethod::Restriction => content_type(particle, mixed),
                DerivationMethod::Extension => match (base.content, particle) {
                    (ContentType::Simple(_), Some(_)) => {
                        return Err(self.fail(
                            derivation,
                            XMLError::SchemaInvalidDerivation,
                            "a type with simple content cannot be extended with elements",
                        ));
                    }
                    (base @ ContentType::Simple(_), None) => base,
                    (ContentType::Empty, particle) => content_type(particle, mixed),
                    (ContentType::ElementOnly(base) | ContentType::Mixed(base), None) => {
                        content_type(Some(base), mixed)
                    }
                    (ContentType::ElementOnly(base) | ContentType::Mixed(base), Some(own)) => {
                        content_type(Some(ContentParticle::Sequence(vec![base, own])), mixed)
                    }
                },
            }
        };
        Ok(complex)
    }

    fn simple_content(
        &mut self,
        derivation: Component,
        method: DerivationMethod,
        base: &BaseType,
    ) -> Result<ContentType, XMLError> {
        let ContentType::Simple(dv) = &base.content else {
            return Err(self.fail(
                derivation,
                XMLError::SchemaInvalidDerivation,
                "the base of simple content must have simple content",
            ));
        };
        if method == DerivationMethod::Extension {
            return Ok(ContentType::Simple(dv.clone()));
        }

        let inline = self
            .children(derivation)
            .into_iter()
            .find(|(_, name)| name == "simpleType")
            .map(|(child, _)| child);
        let base_dv = match inline {
            Some(child) => self.simple_type(child, None)?,
            None => dv.clone(),
        };
        let facets = self.facets(derivation)?;
        if facets.is_empty() {
            return Ok(ContentType::Simple(base_dv));
        }
        let environment = self.resolver.environment().clone();
        let restricted = self
            .grammar
            .datatypes_mut()
            .create_restriction(
                &base_dv,
                None,
                &facets,
                DerivationSet::empty(),
                environment.categories(),
            )
            .map_err(|err| self.fail(derivation, err, "the simple content cannot be restricted"))?;
        Ok(ContentType::Simple(restricted))
    }

    /// The model group among the children of `comp`, if any.
    fn content_particle(
        &mut self,
        comp: Component,
        owner: usize,
    ) -> Result<Option<ContentParticle>, XMLError> {
        let mut particle = None;
        for (child, name) in self.children(comp) {
            if is_particle(&name) {
                if particle.is_some() {
                    return Err(self.fail(
                        child,
                        XMLError::SchemaUnexpectedElement,
                        "only one model group is allowed",
                    ));
                }
                particle = Some(self.particle(child, &name, owner)?);
            } else if !is_attribute_like(&name)
                && !matches!(
                    name.as_str(),
                    "simpleContent" | "complexContent" | "simpleType"
                )
            {
                return Err(self.fail(
                    child,
                    XMLError::SchemaUnexpectedElement,
                    format_args!("'{name}' is not allowed here"),
                ));
            }
        }
        Ok(particle.flatten())
    }

    /// Build a particle. `None` means that it matches nothing (`maxOccurs="0"`).
    ///
    /// Local element declarations are put in the scope of the complex type `owner`.
    fn particle(
        &mut self,
        comp: Component,
        kind: &str,
        owner: usize,
    ) -> Result<Option<ContentParticle>, XMLError> {
        let (min, max) = self.occurrence(comp)?;
        if max == Some(0) {
            return Ok(None);
        }
        let particle = match kind {
            "element" => self.local_element(comp, owner)?,
            "any" => ContentParticle::Wildcard(self.wildcard(comp)?),
            "group" => self.group_reference(comp, owner)?,
            "sequence" | "choice" | "all" => {
                let mut members = vec![];
                for (child, name) in self.children(comp) {
                    let allowed = match kind {
                        "all" => name == "element",
                        _ => matches!(
                            name.as_str(),
                            "element" | "group" | "choice" | "sequence" | "any"
                        ),
                    };
                    if !allowed {
                        return Err(self.fail(
                            child,
                            XMLError::SchemaUnexpectedElement,
                            format_args!("'{name}' is not allowed in 'xs:{kind}'"),
                        ));
                    }
                    if let Some(member) = self.particle(child, &name, owner)? {
                        members.push(member);
                    }
                }
                match kind {
                    "sequence" => ContentParticle::Sequence(members),
                    "choice" => ContentParticle::Choice(members),
                    _ => ContentParticle::All(members),
                }
            }
            other => {
                return Err(self.fail(
                    comp,
                    XMLError::SchemaUnexpectedElement,
                    format_args!("'{other}' is not a particle"),
                ));
            }
        };
        if (min, max) == (1, Some(1)) {
            Ok(Some(particle))
        } else {
            Ok(Some(particle.repeat(min, max)))
        }
    }

    fn occurrence(&self, comp: Component) -> Result<(usize, Option<usize>), XMLError> {
        let parse = |name: &str, value: &str| {
            value.trim().parse::<usize>().map_err(|_| {
                self.fail(
                    comp,
                    XMLError::SchemaInvalidOccurrence,
                    format_args!("'{value}' is not a valid value of '{name}'"),
                )
            })
        };
        let min = match self.attribute(comp, "minOccurs") {
            Some(value) => parse("minOccurs", &value)?,
            None => 1,
        };
        let max = match self.attribute(comp, "maxOccurs") {
            Some(value) if value.trim() == "unbounded" => None,
            Some(value) => Some(parse("maxOccurs", &value)?),
            None => Some(1),
        };
        if max.is_some_and(|max| max < min) {
            return Err(self.fail(
                comp,
                XMLError::SchemaInvalidOccurrence,
                "'minOccurs' is larger than 'maxOccurs'",
            ));
        }
        Ok((min, max))
    }

    fn group_reference(&mut self, comp: Component, owner: usize) -> Result<ContentParticle, XMLError> {
        let reference = self.attribute(comp, "ref").ok_or_else(|| {
            self.fail(comp, XMLError::SchemaMissingAttribute, "a local group needs 'ref'")
        })?;
        let name = self.resolve_qname(comp, &reference)?;
        let Some(&definition) = self.groups.get(&name) else {
            return Err(self.fail(
                comp,
                XMLError::SchemaUnresolvedReference,
                format_args!("the model group '{name}' is not defined"),
            ));
        };
        if !self.building.insert(name.clone()) {
            return Err(self.fail(
                comp,
                XMLError::SchemaCircularDefinition,
                format_args!("the model group '{name}' refers to itself"),
            ));
        }
        let children = self.children(definition);
        let result = match children.as_slice() {
            [(child, kind)] if matches!(kind.as_str(), "sequence" | "choice" | "all") => {
                self.particle(*child, kind, owner)
            }
            _ => Err(self.fail(
                definition,
                XMLError::SchemaUnexpectedElement,
                "a model group needs exactly one of 'sequence', 'choice' or 'all'",
            )),
        };
        self.building.remove(&name);
        let particle = result?.unwrap_or(ContentParticle::Sequence(vec![]));
        if self.grammar.get_model_group(&name).is_none() {
            self.grammar.add_model_group(name, particle.clone())?;
        }
        Ok(particle)
    }

    fn wildcard(&self, comp: Component) -> Result<Wildcard, XMLError> {
        let target = self.target_namespace().map(Arc::<str>::from);
        let namespaces = match self.attribute(comp, "namespace").as_deref().map(str::trim) {
            None | Some("##any") => NamespaceConstraint::Any,
            Some("##other") => NamespaceConstraint::Not(vec![target, None]),
            Some(list) => NamespaceConstraint::Enumeration(
                StringTokenizer::new(list)
                    .map(|token| match token {
                        "##targetNamespace" => target.clone(),
                        "##local" => None,
                        uri => Some(Arc::from(uri)),
                    })
                    .collect(),
            ),
        };
        let process_contents = match self.attribute(comp, "processContents").as_deref() {
            None | Some("strict") => ProcessContents::Strict,
            Some("lax") => ProcessContents::Lax,
            Some("skip") => ProcessContents::Skip,
            Some(other) => {
                return Err(self.fail(
                    comp,
                    XMLError::SchemaInvalidAttribute,
                    format_args!("'{other}' is not a valid value of 'processContents'"),
                ));
            }
        };
        Ok(Wildcard {
            namespaces,
            process_contents,
        })
    }

    fn value_constraint(&self, comp: Component) -> Result<Option<ValueConstraint>, XMLError> {
        match (self.attribute(comp, "default"), self.attribute(comp, "fixed")) {
            (Some(_), Some(_)) => Err(self.fail(
                comp,
                XMLError::SchemaInvalidAttribute,
                "'default' and 'fixed' cannot appear together",
            )),
            (Some(value), None) => Ok(Some(ValueConstraint::Default(value.into()))),
            (None, Some(value)) => Ok(Some(ValueConstraint::Fixed(value.into()))),
            (None, None) => Ok(None),
        }
    }

    fn check_value_constraint(
        &self,
        comp: Component,
        datatype: &DatatypeValidator,
        constraint: Option<&ValueConstraint>,
    ) -> Result<(), XMLError> {
        if let Some(constraint) = constraint
            && let Err(err) = datatype.validate(constraint.value(), &NoContext)
        {
            return Err(self.fail(
                comp,
                XMLError::SchemaInvalidAttribute,
                format_args!("the value constraint '{}' is invalid: {err}", constraint.value()),
            ));
        }
        Ok(())
    }

    /// Whether a local declaration is in the target namespace.
    fn is_qualified(&self, comp: Component, default: bool) -> Result<bool, XMLError> {
        match self.attribute(comp, "form").as_deref() {
            None => Ok(default),
            Some("qualified") => Ok(true),
            Some("unqualified") => Ok(false),
            Some(other) => Err(self.fail(
                comp,
                XMLError::SchemaInvalidAttribute,
                format_args!("'{other}' is not a valid value of 'form'"),
            )),
        }
    }

    fn local_element(&mut self, comp: Component, owner: usize) -> Result<ContentParticle, XMLError> {
        if let Some(reference) = self.attribute(comp, "ref") {
            let name = self.resolve_qname(comp, &reference)?;
            if name.namespace() == self.target_namespace() && !self.elements.contains_key(&name) {
                return Err(self.fail(
                    comp,
                    XMLError::SchemaUnresolvedReference,
                    format_args!("the element '{name}' is not declared"),
                ));
            }
            return Ok(ContentParticle::Leaf(name));
        }

        let scope = Scope::Local(owner);
        let decl = self.element_decl(comp, scope)?;
        let name = decl.name.clone();
        if self
            .grammar
            .get_elem_decl(name.namespace(), &name.local_name, scope)
            .is_none()
        {
            for constraint in &decl.identity_constraints {
                self.grammar
                    .add_identity_constraint(constraint.clone())
                    .map_err(|err| self.fail(comp, err, "duplicate identity constraint"))?;
            }
            self.grammar.add_element_decl(decl)?;
        }
        Ok(ContentParticle::Leaf(name))
    }

    /// Build the element declaration at `comp`.
    pub(super) fn element_decl(
        &mut self,
        comp: Component,
        scope: Scope,
    ) -> Result<SchemaElementDecl, XMLError> {
        let (element_qualified, block_default, final_default) = {
            let doc = self.doc(comp);
            (doc.element_qualified, doc.block_default, doc.final_default)
        };
        let name = match scope {
            Scope::Global => self.component_name(comp)?,
            Scope::Local(_) => {
                let name = self.component_name(comp)?;
                if self.is_qualified(comp, element_qualified)? {
                    name
                } else {
                    ElementName::new(None, &name.local_name)
                }
            }
        };
        let mut decl = SchemaElementDecl::new(name, scope);
        decl.nillable = self.boolean_attribute(comp, "nillable")?;
        decl.value_constraint = self.value_constraint(comp)?;
        decl.block = self.derivation_attribute(comp, "block", block_default, DerivationSet::ALL)?;
        if scope == Scope::Global {
            decl.is_abstract = self.boolean_attribute(comp, "abstract")?;
            decl.final_set = self.derivation_attribute(
                comp,
                "final",
                final_default,
                DerivationSet::EXTENSION | DerivationSet::RESTRICTION,
            )?;
            if let Some(head) = self.attribute(comp, "substitutionGroup") {
                decl.substitution_group = Some(self.resolve_qname(comp, &head)?);
            }
        }

        let mut inline = None;
        for (child, kind) in self.children(comp) {
            match kind.as_str() {
                "simpleType" | "complexType" if inline.is_none() => inline = Some((child, kind)),
                "unique" | "key" | "keyref" => {
                    let constraint = self.identity_constraint(child, &kind)?;
                    decl.identity_constraints.push(Arc::new(constraint));
                }
                other => {
                    return Err(self.fail(
                        child,
                        XMLError::SchemaUnexpectedElement,
                        format_args!("'{other}' is not allowed in an element declaration"),
                    ));
                }
            }
        }
        decl.type_definition = match (self.attribute(comp, "type"), inline) {
            (Some(_), Some(_)) => {
                return Err(self.fail(
                    comp,
                    XMLError::SchemaInvalidAttribute,
                    "'type' and an anonymous type cannot appear together",
                ));
            }
            (Some(qname), None) => {
                let type_name = self.resolve_qname(comp, &qname)?;
                self.type_definition(&type_name)?
            }
            (None, Some((child, kind))) if kind == "simpleType" => {
                TypeDefinition::Simple(self.simple_type(child, None)?)
            }
            (None, Some((child, _))) => self.anonymous_complex_type(child)?,
            (None, None) => TypeDefinition::AnyType,
        };

        match &decl.type_definition {
            TypeDefinition::Simple(dv) => {
                self.check_value_constraint(comp, dv, decl.value_constraint.as_ref())?
            }
            TypeDefinition::Complex(reference) if decl.value_constraint.is_some() => {
                let simple = if reference.namespace.as_deref() == self.target_namespace() {
                    self.grammar.complex_type(reference.index)
                } else {
                    self.resolver.complex_type(reference)
                }
                .and_then(|complex| match &complex.content {
                    ContentType::Simple(dv) => Some(dv.clone()),
                    _ => None,
                });
                if let Some(dv) = simple {
                    self.check_value_constraint(comp, &dv, decl.value_constraint.as_ref())?;
                }
            }
            _ => {}
        }
        Ok(decl)
    }

    fn identity_constraint(
        &mut self,
        comp: Component,
        kind: &str,
    ) -> Result<IdentityConstraint, XMLError> {
        let name = self.component_name(comp)?;
        let kind = match kind {
            "unique" => IdentityConstraintKind::Unique,
            "key" => IdentityConstraintKind::Key,
            _ => {
                let refer = self.attribute(comp, "refer").ok_or_else(|| {
                    self.fail(comp, XMLError::SchemaMissingAttribute, "'refer' is missing")
                })?;
                IdentityConstraintKind::KeyRef {
                    refer: self.resolve_qname(comp, &refer)?,
                }
            }
        };

        let mut selector = None;
        let mut fields = vec![];
        for (child, child_kind) in self.children(comp) {
            let xpath = self.attribute(child, "xpath").ok_or_else(|| {
                self.fail(child, XMLError::SchemaMissingAttribute, "'xpath' is missing")
            })?;
            let doc = self.doc(child);
            let resolve = |prefix: &str| doc.namespace_of(child.node, Some(prefix));
            let parsed = match child_kind.as_str() {
                "selector" if selector.is_none() && fields.is_empty() => {
                    XPath::parse_selector(&xpath, &resolve)
                }
                "field" if selector.is_some() => XPath::parse_field(&xpath, &resolve),
                other => {
                    return Err(self.fail(
                        child,
                        XMLError::SchemaUnexpectedElement,
                        format_args!("'{other}' is not allowed here"),
                    ));
                }
            }
            .map_err(|err| self.fail(child, err, format_args!("'{xpath}' is not a valid path")))?;
            if child_kind == "selector" {
                selector = Some(parsed);
            } else {
                fields.push(parsed);
            }
        }
        let Some(selector) = selector.filter(|_| !fields.is_empty()) else {
            return Err(self.fail(
                comp,
                XMLError::SchemaMissingAttribute,
                "an identity constraint needs a selector and at least one field",
            ));
        };
        Ok(IdentityConstraint::new(kind, name, selector, fields))
    }

    /// Find or build the global attribute declaration `name`.
    pub(super) fn global_attribute(
        &mut self,
        name: &ElementName,
    ) -> Result<SchemaAttributeDecl, XMLError> {
        if name.namespace() == Some(XML_XML_NAMESPACE)
            && let Some(datatype) = self.xml_attribute_type(&name.local_name)
        {
            return Ok(SchemaAttributeDecl {
                name: name.clone(),
                datatype,
                value_constraint: None,
            });
        }
        if name.namespace() != self.target_namespace() {
            return self
                .foreign_grammar(name.namespace())
                .and_then(|grammar| grammar.as_schema()?.get_attribute_decl(name).cloned())
                .ok_or_else(|| {
                    log::warn!("the attribute '{name}' is not declared");
                    XMLError::SchemaUnresolvedReference
                });
        }
        if let Some(decl) = self.grammar.get_attribute_decl(name) {
            return Ok(decl.clone());
        }
        let Some(&comp) = self.attributes.get(name) else {
            log::warn!("the attribute '{name}' is not declared");
            return Err(XMLError::SchemaUnresolvedReference);
        };
        let datatype = self.attribute_type(comp)?;
        let value_constraint = self.value_constraint(comp)?;
        self.check_value_constraint(comp, &datatype, value_constraint.as_ref())?;
        let decl = SchemaAttributeDecl {
            name: name.clone(),
            datatype,
            value_constraint,
        };
        self.grammar.add_attribute_decl(decl.clone())?;
        Ok(decl)
    }

    fn attribute_type(&mut self, comp: Component) -> Result<Arc<DatatypeValidator>, XMLError> {
        let inline = self
            .children(comp)
            .into_iter()
            .find(|(_, name)| name == "simpleType")
            .map(|(child, _)| child);
        match (self.attribute(comp, "type"), inline) {
            (Some(_), Some(_)) => Err(self.fail(
                comp,
                XMLError::SchemaInvalidAttribute,
                "'type' and an anonymous type cannot appear together",
            )),
            (Some(qname), None) => {
                let name = self.resolve_qname(comp, &qname)?;
                self.simple_type_by_name(&name)
            }
            (None, Some(child)) => self.simple_type(child, None),
            (None, None) => self.any_simple_type(),
        }
    }

    fn attribute_use(&mut self, comp: Component) -> Result<AttributeUse, XMLError> {
        let use_kind = match self.attribute(comp, "use").as_deref() {
            None | Some("optional") => AttributeUseKind::Optional,
            Some("required") => AttributeUseKind::Required,
            Some("prohibited") => AttributeUseKind::Prohibited,
            Some(other) => {
                return Err(self.fail(
                    comp,
                    XMLError::SchemaInvalidAttribute,
                    format_args!("'{other}' is not a valid value of 'use'"),
                ));
            }
        };
        let mut value_constraint = self.value_constraint(comp)?;
        if use_kind == AttributeUseKind::Required
            && matches!(value_constraint, Some(ValueConstraint::Default(_)))
        {
            return Err(self.fail(
                comp,
                XMLError::SchemaInvalidAttribute,
                "a required attribute cannot have a default value",
            ));
        }

        let (name, datatype) = if let Some(reference) = self.attribute(comp, "ref") {
            let name = self.resolve_qname(comp, &reference)?;
            let decl = self
                .global_attribute(&name)
                .map_err(|err| self.fail(comp, err, "the referenced attribute cannot be built"))?;
            if value_constraint.is_none() {
                value_constraint = decl.value_constraint;
            }
            (name, decl.datatype)
        } else {
            let attribute_qualified = self.doc(comp).attribute_qualified;
            let name = self.component_name(comp)?;
            let name = if self.is_qualified(comp, attribute_qualified)? {
                name
            } else {
                ElementName::new(None, &name.local_name)
            };
            (name, self.attribute_type(comp)?)
        };
        self.check_value_constraint(comp, &datatype, value_constraint.as_ref())?;
        Ok(AttributeUse {
            name,
            datatype,
            use_kind,
            value_constraint,
        })
    }

    /// Collect the attribute uses, attribute group references and `xs:anyAttribute`
    /// among the children of `comp`.
    fn attribute_set(&mut self, comp: Component) -> Result<AttributeSet, XMLError> {
        let mut set = AttributeSet::default();
        for (child, name) in self.children(comp) {
            match name.as_str() {
                "attribute" => {
                    let att = self.attribute_use(child)?;
                    set.push(att).map_err(|name| {
                        self.fail(
                            child,
                            XMLError::SchemaDuplicateDeclaration,
                            format_args!("the attribute '{name}' is used twice"),
                        )
                    })?;
                }
                "attributeGroup" => {
                    let reference = self.attribute(child, "ref").ok_or_else(|| {
                        self.fail(child, XMLError::SchemaMissingAttribute, "'ref' is missing")
                    })?;
                    let group_name = self.resolve_qname(child, &reference)?;
                    let group = self.attribute_group(&group_name)?;
                    for att in group.attributes {
                        set.push(att).map_err(|name| {
                            self.fail(
                                child,
                                XMLError::SchemaDuplicateDeclaration,
                                format_args!("the attribute '{name}' is used twice"),
                            )
                        })?;
                    }
                    set.wildcard = intersect_wildcard(set.wildcard, group.wildcard);
                }
                "anyAttribute" => {
                    let wildcard = self.wildcard(child)?;
                    set.wildcard = intersect_wildcard(set.wildcard, Some(wildcard));
                }
                _ => {}
            }
        }
        Ok(set)
    }

    /// Find or build the attribute group `name`.
    pub(super) fn attribute_group(&mut self, name: &ElementName) -> Result<AttributeGroup, XMLError> {
        if name.namespace() != self.target_namespace() {
            return self
                .foreign_grammar(name.namespace())
                .and_then(|grammar| grammar.as_schema()?.get_attribute_group(name).cloned())
                .ok_or_else(|| {
                    log::warn!("the attribute group '{name}' is not defined");
                    XMLError::SchemaUnresolvedReference
                });
        }
        if let Some(group) = self.grammar.get_attribute_group(name) {
            return Ok(group.clone());
        }
        let Some(&comp) = self.attribute_groups.get(name) else {
            log::warn!("the attribute group '{name}' is not defined");
            return Err(XMLError::SchemaUnresolvedReference);
        };
        if !self.building.insert(name.clone()) {
            return Err(self.fail(
                comp,
                XMLError::SchemaCircularDefinition,
                format_args!("the attribute group '{name}' refers to itself"),
            ));
        }
        let set = self.attribute_set(comp);
        self.building.remove(name);
        let set = set?;
        let group = AttributeGroup {
            attributes: set.uses,
            wildcard: set.wildcard,
        };
        self.grammar.add_attribute_group(name.clone(), group.clone())?;
        Ok(group)
    }
}

/// The content type for an optional model group.
fn content_type(particle: Option<ContentParticle>, mixed: bool) -> ContentType {
    let particle = particle.filter(
        |particle| !matches!(particle, ContentParticle::Sequence(members) if members.is_empty()),
    );
    match (particle, mixed) {
        (Some(particle), true) => ContentType::Mixed(particle),
        (Some(particle), false) => ContentType::ElementOnly(particle),
        (None, true) => ContentType::Mixed(ContentParticle::Sequence(vec![])),
        (None, false) => ContentType::Empty,
    }
}

/// The wildcard of an extension: an attribute allowed by either side is allowed.
fn union_wildcard(own: Option<Wildcard>, base: Option<Wildcard>) -> Option<Wildcard> {
    match (own, base) {
        (Some(own), Some(base)) => {
            let namespaces = match (own.namespaces, base.namespaces) {
                (NamespaceConstraint::Any, _) | (_, NamespaceConstraint::Any) => {
                    NamespaceConstraint::Any
                }
                (NamespaceConstraint::Enumeration(mut a), NamespaceConstraint::Enumeration(b)) => {
                    for ns in b {
                        if !a.contains(&ns) {
                            a.push(ns);
                        }
                    }
                    NamespaceConstraint::Enumeration(a)
                }
                (NamespaceConstraint::Not(not), NamespaceConstraint::Enumeration(list))
                | (NamespaceConstraint::Enumeration(list), NamespaceConstraint::Not(not)) => {
                    let rest = not
                        .into_iter()
                        .filter(|ns| !list.contains(ns))
                        .collect::<Vec<_>>();
                    if rest.is_empty() {
                        NamespaceConstraint::Any
                    } else {
                        NamespaceConstraint::Not(rest)
                    }
                }
                (NamespaceConstraint::Not(a), NamespaceConstraint::Not(b)) => {
                    let both = a.into_iter().filter(|ns| b.contains(ns)).collect::<Vec<_>>();
                    if both.is_empty() {
                        NamespaceConstraint::Any
                    } else {
                        NamespaceConstraint::Not(both)
                    }
                }
            };
            Some(Wildcard {
                namespaces,
                process_contents: own.process_contents,
            })
        }
        (own, base) => own.or(base),
    }
}

/// The wildcard of one complex type with several attribute wildcards: an attribute
/// must be allowed by all of them.
fn intersect_wildcard(first: Option<Wildcard>, second: Option<Wildcard>) -> Option<Wildcard> {
    match (first, second) {
        (Some(first), Some(second)) => {
            let namespaces = match (first.namespaces, second.namespaces) {
                (NamespaceConstraint::Any, other) | (other, NamespaceConstraint::Any) => other,
                (NamespaceConstraint::Enumeration(list), other)
                | (other, NamespaceConstraint::Enumeration(list)) => {
                    NamespaceConstraint::Enumeration(
                        list.into_iter()
                            .filter(|ns| other.allows(ns.as_deref()))
                            .collect(),
                    )
                }
                (NamespaceConstraint::Not(mut a), NamespaceConstraint::Not(b)) => {
                    for ns in b {
                        if !a.contains(&ns) {
                            a.push(ns);
                        }
                    }
                    NamespaceConstraint::Not(a)
                }
            };
            Some(Wildcard {
                namespaces,
                process_contents: first.process_contents,
            })
        }
        (first, second) => first.or(second),
    }
}
