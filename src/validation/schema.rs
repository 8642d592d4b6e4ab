//! Validation of a document against the XML Schema grammars held by a
//! [`GrammarResolver`].
//!
//! The validator keeps one frame per open element. A frame knows the governing type,
//! the state of the content model and the character data collected so far, which is
//! enough to check simple content and value constraints when the element ends.

use std::sync::Arc;

use crate::{
    FastHashSet, XML_SCHEMA_INSTANCE_NAMESPACE, XML_SCHEMA_NAMESPACE,
    datatype::{DatatypeValidator, DerivationSet, IdKind, TypeName, ValidationContext},
    error::XMLError,
    grammar::{
        ElementDeclRef, GrammarKey, GrammarResolver,
        schema::{
            AttributeUseKind, ComplexType, ComplexTypeRef, ContentType, DerivationMethod, Scope,
            SchemaAttributeDecl, SchemaElementDecl, TypeDefinition, ValueConstraint,
        },
    },
    identity::{FieldInput, IdentityConstraint, IdentityConstraintHandler, IdentityViolation},
    sax::attributes::{Attribute, Attributes},
    validation::{
        Violation,
        content_model::{
            ElementName, MatchedParticle, ProcessContents, StateId, SubstitutionResolver,
            Wildcard,
        },
    },
};

/// Derivation chains longer than this are treated as circular.
const MAX_DERIVATION_DEPTH: usize = 256;

fn is_whitespace(text: &str) -> bool {
    text.chars()
        .all(|c| matches!(c, '\x20' | '\x09' | '\x0D' | '\x0A'))
}

fn global_element<'a>(
    resolver: &'a GrammarResolver,
    name: &ElementName,
) -> Option<&'a SchemaElementDecl> {
    let key = GrammarKey::schema(name.namespace());
    match resolver.get_elem_decl(&key, name.namespace(), &name.local_name, Scope::Global)? {
        ElementDeclRef::Schema(decl) => Some(decl),
        ElementDeclRef::DTD(_) => None,
    }
}

/// Look up a local element declaration of `owner`, or of the types it is derived from,
/// because extensions inherit the particles of their base.
fn local_element<'a>(
    resolver: &'a GrammarResolver,
    owner: &ComplexTypeRef,
    name: &ElementName,
) -> Option<&'a SchemaElementDecl> {
    let mut owner = owner.clone();
    for _ in 0..MAX_DERIVATION_DEPTH {
        let key = GrammarKey::schema(owner.namespace.as_deref());
        let scope = Scope::Local(owner.index);
        match resolver.get_elem_decl(&key, name.namespace(), &name.local_name, scope) {
            Some(ElementDeclRef::Schema(decl)) => return Some(decl),
            Some(ElementDeclRef::DTD(_)) => return None,
            None => {}
        }
        match &resolver.complex_type(&owner)?.base {
            TypeDefinition::Complex(base) => owner = base.clone(),
            _ => return None,
        }
    }
    None
}

fn global_attribute<'a>(
    resolver: &'a GrammarResolver,
    name: &ElementName,
) -> Option<&'a SchemaAttributeDecl> {
    resolver
        .local_grammar(&GrammarKey::schema(name.namespace()))?
        .as_schema()?
        .get_attribute_decl(name)
}

/// Look up a type definition by its name.
fn type_definition(resolver: &GrammarResolver, name: &TypeName) -> Option<TypeDefinition> {
    if name.namespace() == Some(XML_SCHEMA_NAMESPACE) && &*name.local_name == "anyType" {
        return Some(TypeDefinition::AnyType);
    }
    let complex = resolver
        .local_grammar(&GrammarKey::schema(name.namespace()))
        .and_then(|grammar| grammar.as_schema())
        .and_then(|schema| schema.complex_type_index(name));
    if let Some(index) = complex {
        return Some(TypeDefinition::Complex(ComplexTypeRef {
            namespace: name.uri.clone(),
            index,
        }));
    }
    resolver
        .get_datatype_validator(name.namespace(), &name.local_name)
        .map(TypeDefinition::Simple)
}

fn derivation_flag(method: DerivationMethod) -> DerivationSet {
    match method {
        DerivationMethod::Extension => DerivationSet::EXTENSION,
        DerivationMethod::Restriction => DerivationSet::RESTRICTION,
    }
}

/// Check if `derived` is validly derived from `base` without using a method in `blocked`.
fn is_derived_from(
    resolver: &GrammarResolver,
    derived: &TypeDefinition,
    base: &TypeDefinition,
    blocked: DerivationSet,
) -> bool {
    let mut current = derived.clone();
    for _ in 0..MAX_DERIVATION_DEPTH {
        if current.is_same(base) {
            return true;
        }
        let next = match (&current, base) {
            (_, TypeDefinition::AnyType) => return true,
            (TypeDefinition::AnyType, _) => return false,
            (TypeDefinition::Simple(derived), TypeDefinition::Simple(base)) => {
                return !blocked.contains(DerivationSet::RESTRICTION)
                    && derived.is_derived_from(base);
            }
            (TypeDefinition::Simple(_), TypeDefinition::Complex(_)) => return false,
            (TypeDefinition::Complex(reference), _) => {
                let Some(complex) = resolver.complex_type(reference) else {
                    return false;
                };
                if blocked.contains(derivation_flag(complex.derivation)) {
                    return false;
                }
                complex.base.clone()
            }
        };
        current = next;
    }
    false
}

/// Substitution group membership through the global declarations of `resolver`.
struct Substitutions<'a>(&'a GrammarResolver);

impl SubstitutionResolver for Substitutions<'_> {
    fn can_substitute(&self, element: &ElementName, head: &ElementName) -> bool {
        let Some(head_decl) = global_element(self.0, head) else {
            return false;
        };
        if head_decl.block.contains(DerivationSet::SUBSTITUTION) {
            return false;
        }
        let mut current = element.clone();
        for _ in 0..MAX_DERIVATION_DEPTH {
            let Some(decl) = global_element(self.0, &current) else {
                return false;
            };
            match &decl.substitution_group {
                Some(group) if group == head => return true,
                Some(group) => current = group.clone(),
                None => return false,
            }
        }
        false
    }
}

#[derive(Debug, Clone)]
enum FrameKind {
    /// The element and its descendants are not validated.
    Skip,
    /// Children and attributes are validated only if declarations are found.
    Lax,
    Typed(TypeDefinition),
}

#[derive(Debug)]
struct SchemaFrame {
    name: ElementName,
    kind: FrameKind,
    value_constraint: Option<ValueConstraint>,
    state: StateId,
    nil: bool,
    has_children: bool,
    text: String,
    /// Cleared after the first content error so that it is reported only once.
    valid: bool,
    identity: bool,
}

impl SchemaFrame {
    fn new(name: ElementName, kind: FrameKind) -> Self {
        Self {
            name,
            kind,
            value_constraint: None,
            state: 0,
            nil: false,
            has_children: false,
            text: String::new(),
            valid: true,
            identity: false,
        }
    }
}

/// How the parent allows a new child.
enum Admission<'a> {
    Skip,
    Lax,
    Strict,
    /// Matched by an element particle of the complex type `owner`.
    Particle {
        owner: ComplexTypeRef,
        name: &'a ElementName,
    },
}

/// Validates a document against XML Schema grammars.
#[derive(Debug, Default)]
pub struct SchemaValidator {
    frames: Vec<SchemaFrame>,
    ids: FastHashSet<Box<str>>,
    idrefs: Vec<Box<str>>,
    identity: IdentityConstraintHandler,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.frames.clear();
        self.ids.clear();
        self.idrefs.clear();
        self.identity.reset();
    }

    /// Validate the start tag of `element`.
    ///
    /// Default attributes of the governing type are added to `attributes`.
    pub fn start_element(
        &mut self,
        resolver: &GrammarResolver,
        element: &ElementName,
        attributes: &mut Attributes,
        ctx: &dyn ValidationContext,
        identity: bool,
    ) -> Vec<Violation> {
        let mut violations = vec![];
        let admission = self.admit_child(resolver, element, &mut violations);

        let decl = match &admission {
            Admission::Skip => {
                let mut frame = SchemaFrame::new(element.clone(), FrameKind::Skip);
                if identity {
                    frame.identity = true;
                    self.feed_identity_start(element, &[], &[], &mut violations);
                }
                self.frames.push(frame);
                return violations;
            }
            Admission::Particle { owner, name } if *name == element => {
                local_element(resolver, owner, element)
                    .or_else(|| global_element(resolver, element))
            }
            _ => global_element(resolver, element),
        };
        if decl.is_none() && matches!(admission, Admission::Strict | Admission::Particle { .. }) {
            violations.push(Violation::new(
                XMLError::SchemaValidNoDeclaration,
                format!("No declaration is found for the element '{element}'."),
            ));
        }

        let mut frame = SchemaFrame::new(element.clone(), FrameKind::Lax);
        let mut declared_type = None;
        if let Some(decl) = decl {
            if decl.is_abstract {
                violations.push(Violation::new(
                    XMLError::SchemaValidAbstract,
                    format!("The element '{element}' is abstract."),
                ));
            }
            frame.value_constraint = decl.value_constraint.clone();
            declared_type = Some(decl.type_definition.clone());
        }

        let xsi_type = attributes
            .get_value_by_expanded_name(Some(XML_SCHEMA_INSTANCE_NAMESPACE), "type")
            .map(str::to_owned);
        let governing = match xsi_type {
            Some(value) => {
                self.resolve_xsi_type(resolver, decl, declared_type, &value, ctx, &mut violations)
            }
            None => declared_type,
        };
        if let Some(TypeDefinition::Complex(reference)) = &governing
            && resolver
                .complex_type(reference)
                .is_some_and(|complex| complex.is_abstract)
        {
            violations.push(Violation::new(
                XMLError::SchemaValidAbstract,
                format!("The type of the element '{element}' is abstract."),
            ));
        }
        if let Some(governing) = governing {
            frame.kind = FrameKind::Typed(governing);
        }

        if let Some(nil) =
            attributes.get_value_by_expanded_name(Some(XML_SCHEMA_INSTANCE_NAMESPACE), "nil")
        {
            match nil.trim() {
                "true" | "1" if decl.is_some_and(|decl| decl.nillable) => {
                    frame.nil = true;
                    if frame.value_constraint.as_ref().is_some_and(|vc| vc.is_fixed()) {
                        violations.push(Violation::new(
                            XMLError::SchemaValidNil,
                            format!("The element '{element}' has a fixed value and cannot be nil."),
                        ));
                    }
                }
                "true" | "1" if decl.is_some() => violations.push(Violation::new(
                    XMLError::SchemaValidNil,
                    format!("The element '{element}' is not nillable."),
                )),
                "true" | "1" | "false" | "0" => {}
                _ => violations.push(Violation::new(
                    XMLError::SchemaValidAttributeValue,
                    format!("'{nil}' is not a valid value of 'xsi:nil'."),
                )),
            }
        }

        if let FrameKind::Typed(TypeDefinition::Complex(reference)) = &frame.kind
            && let Some(complex) = resolver.complex_type(reference)
        {
            match complex.content_model() {
                Ok(model) => frame.state = model.initial_state(),
                Err(err) => log::warn!("content model of '{element}' cannot be built: {err}"),
            }
        }

        let fields = self.validate_attributes(resolver, &frame.kind, attributes, ctx, &mut violations);

        if identity {
            frame.identity = true;
            let inputs = fields
                .iter()
                .map(|(name, value, datatype)| FieldInput {
                    name,
                    value,
                    datatype: datatype.as_deref(),
                })
                .collect::<Vec<_>>();
            let constraints = decl
                .map(|decl| decl.identity_constraints.as_slice())
                .unwrap_or_default();
            self.feed_identity_start(element, &inputs, constraints, &mut violations);
        }
        self.frames.push(frame);
        violations
    }

    fn feed_identity_start(
        &mut self,
        element: &ElementName,
        inputs: &[FieldInput<'_>],
        constraints: &[Arc<IdentityConstraint>],
        violations: &mut Vec<Violation>,
    ) {
        let found = self.identity.start_element(element, inputs, constraints);
        violations.extend(found.into_iter().map(from_identity));
    }

    /// Advance the content model of the parent by `element`.
    fn admit_child<'a>(
        &mut self,
        resolver: &'a GrammarResolver,
        element: &ElementName,
        violations: &mut Vec<Violation>,
    ) -> Admission<'a> {
        let Some(parent) = self.frames.last_mut() else {
            return Admission::Strict;
        };
        parent.has_children = true;
        let reference = match &parent.kind {
            FrameKind::Skip => return Admission::Skip,
            FrameKind::Lax | FrameKind::Typed(TypeDefinition::AnyType) => return Admission::Lax,
            FrameKind::Typed(TypeDefinition::Simple(_)) => {
                if parent.valid {
                    parent.valid = false;
                    violations.push(Violation::new(
                        XMLError::SchemaValidElementNotAllowed,
                        format!(
                            "The element '{}' has a simple type, but has a child '{element}'.",
                            parent.name
                        ),
                    ));
                }
                return Admission::Lax;
            }
            FrameKind::Typed(TypeDefinition::Complex(reference)) => reference.clone(),
        };
        if parent.nil {
            if parent.valid {
                parent.valid = false;
                violations.push(Violation::new(
                    XMLError::SchemaValidNil,
                    format!("The nil element '{}' has a child '{element}'.", parent.name),
                ));
            }
            return Admission::Lax;
        }
        let Some(complex) = resolver.complex_type(&reference) else {
            return Admission::Lax;
        };
        if matches!(complex.content, ContentType::Empty | ContentType::Simple(_)) {
            if parent.valid {
                parent.valid = false;
                violations.push(Violation::new(
                    XMLError::SchemaValidElementNotAllowed,
                    format!(
                        "The element '{}' cannot have element children, but has '{element}'.",
                        parent.name
                    ),
                ));
            }
            return Admission::Lax;
        }
        let Ok(model) = complex.content_model() else {
            return Admission::Lax;
        };
        if !parent.valid {
            return Admission::Lax;
        }

        let substitutions = Substitutions(resolver);
        match model.step_special(parent.state, element, &substitutions) {
            Some((next, symbol)) => {
                parent.state = next;
                match model.particle_of(symbol) {
                    Some(MatchedParticle::Element(name)) => Admission::Particle {
                        owner: reference,
                        name,
                    },
                    Some(MatchedParticle::Wildcard(Wildcard {
                        process_contents, ..
                    })) => match process_contents {
                        ProcessContents::Strict => Admission::Strict,
                        ProcessContents::Lax => Admission::Lax,
                        ProcessContents::Skip => Admission::Skip,
                    },
                    Some(MatchedParticle::Unconstrained) | None => Admission::Lax,
                }
            }
            None => {
                parent.valid = false;
                let expected = model.expected(parent.state);
                violations.push(Violation::new(
                    XMLError::SchemaValidContentModel,
                    if expected.is_empty() {
                        format!(
                            "The element '{element}' is not allowed here in '{}'.",
                            parent.name
                        )
                    } else {
                        format!(
                            "The element '{element}' is not allowed here in '{}'. Expected: {}",
                            parent.name,
                            expected.join(", ")
                        )
                    },
                ));
                Admission::Lax
            }
        }
    }

    fn resolve_xsi_type(
        &self,
        resolver: &GrammarResolver,
        decl: Option<&SchemaElementDecl>,
        declared: Option<TypeDefinition>,
        value: &str,
        ctx: &dyn ValidationContext,
        violations: &mut Vec<Violation>,
    ) -> Option<TypeDefinition> {
        let value = value.trim();
        let (prefix, local_name) = match value.split_once(':') {
            Some((prefix, local_name)) => (Some(prefix), local_name),
            None => (None, value),
        };
        let uri = ctx.namespace_of(prefix);
        if prefix.is_some() && uri.is_none() {
            violations.push(Violation::new(
                XMLError::SchemaValidXsiType,
                format!("The prefix of 'xsi:type' value '{value}' is not bound."),
            ));
            return declared;
        }
        let name = TypeName::new(uri.as_deref(), local_name);
        let Some(definition) = type_definition(resolver, &name) else {
            violations.push(Violation::new(
                XMLError::SchemaValidXsiType,
                format!("The type '{name}' specified by 'xsi:type' is not found."),
            ));
            return declared;
        };
        let Some(declared) = declared else {
            return Some(definition);
        };

        let mut blocked = decl.map(|decl| decl.block).unwrap_or_else(DerivationSet::empty);
        if let TypeDefinition::Complex(reference) = &declared
            && let Some(complex) = resolver.complex_type(reference)
        {
            blocked = blocked | complex.block;
        }
        if !is_derived_from(resolver, &definition, &declared, blocked) {
            violations.push(Violation::new(
                XMLError::SchemaValidXsiType,
                format!("The type '{name}' is not validly derived from the declared type."),
            ));
            return Some(declared);
        }
        Some(definition)
    }

    /// Validate and default the attributes of an element whose type is `kind`.
    ///
    /// Returns the attributes visible to identity constraint fields.
    fn validate_attributes(
        &mut self,
        resolver: &GrammarResolver,
        kind: &FrameKind,
        attributes: &mut Attributes,
        ctx: &dyn ValidationContext,
        violations: &mut Vec<Violation>,
    ) -> Vec<(ElementName, String, Option<Arc<DatatypeValidator>>)> {
        let complex = match kind {
            FrameKind::Skip => return vec![],
            FrameKind::Typed(TypeDefinition::Complex(reference)) => resolver.complex_type(reference),
            _ => None,
        };
        let strict = matches!(kind, FrameKind::Typed(TypeDefinition::Simple(_))) || complex.is_some();

        let mut fields = vec![];
        for att in attributes.iter() {
            if att.is_nsdecl() {
                continue;
            }
            let name = ElementName::new(
                att.uri.as_deref(),
                att.local_name.as_deref().unwrap_or(&att.qname),
            );
            if name.namespace() == Some(XML_SCHEMA_INSTANCE_NAMESPACE) {
                if !matches!(
                    &*name.local_name,
                    "type" | "nil" | "schemaLocation" | "noNamespaceSchemaLocation"
                ) {
                    violations.push(Violation::new(
                        XMLError::SchemaValidUndeclaredAttribute,
                        format!("The attribute '{}' is not defined.", att.qname),
                    ));
                }
                continue;
            }

            let mut datatype = None;
            let mut fixed = None;
            if let Some(att_use) = complex.and_then(|complex| complex.get_attribute_use(&name)) {
                if att_use.use_kind == AttributeUseKind::Prohibited {
                    violations.push(Violation::new(
                        XMLError::SchemaValidProhibitedAttribute,
                        format!("The attribute '{}' is prohibited.", att.qname),
                    ));
                    continue;
                }
                datatype = Some(att_use.datatype.clone());
                fixed = att_use.value_constraint.clone();
            } else {
                let wildcard = complex.and_then(|complex| complex.attribute_wildcard.as_ref());
                let process_contents = match wildcard {
                    Some(wildcard) if wildcard.namespaces.allows(name.namespace()) => {
                        wildcard.process_contents
                    }
                    Some(_) | None if strict => {
                        violations.push(Violation::new(
                            XMLError::SchemaValidUndeclaredAttribute,
                            format!(
                                "The attribute '{}' is not allowed in this element.",
                                att.qname
                            ),
                        ));
                        continue;
                    }
                    _ => ProcessContents::Lax,
                };
                match process_contents {
                    ProcessContents::Skip => {}
                    _ => match global_attribute(resolver, &name) {
                        Some(decl) => {
                            datatype = Some(decl.datatype.clone());
                            fixed = decl.value_constraint.clone();
                        }
                        None if process_contents == ProcessContents::Strict => {
                            violations.push(Violation::new(
                                XMLError::SchemaValidUndeclaredAttribute,
                                format!("No declaration is found for the attribute '{}'.", att.qname),
                            ));
                        }
                        None => {}
                    },
                }
            }

            if let Some(datatype) = datatype.as_deref() {
                self.check_value(
                    datatype,
                    &att.value,
                    fixed.as_ref(),
                    ctx,
                    XMLError::SchemaValidAttributeValue,
                    &format!("attribute '{}'", att.qname),
                    violations,
                );
            }
            fields.push((name, att.value.to_string(), datatype));
        }

        if let Some(complex) = complex {
            self.add_default_attributes(complex, attributes, &mut fields, violations);
        }
        fields
    }

    fn add_default_attributes(
        &mut self,
        complex: &ComplexType,
        attributes: &mut Attributes,
        fields: &mut Vec<(ElementName, String, Option<Arc<DatatypeValidator>>)>,
        violations: &mut Vec<Violation>,
    ) {
        for att_use in &complex.attributes {
            let name = &att_use.name;
            if attributes.contains_expanded_name(name.namespace(), &name.local_name) {
                continue;
            }
            match (&att_use.use_kind, &att_use.value_constraint) {
                (AttributeUseKind::Required, _) => violations.push(Violation::new(
                    XMLError::SchemaValidRequiredAttribute,
                    format!("The required attribute '{name}' is not specified."),
                )),
                (AttributeUseKind::Optional, Some(constraint)) if name.namespace().is_none() => {
                    let mut attribute = Attribute::new(name.local_name.clone(), constraint.value());
                    attribute.local_name = Some(name.local_name.clone());
                    attribute.set_declared();
                    if attributes.push(attribute).is_ok() {
                        fields.push((
                            name.clone(),
                            constraint.value().to_owned(),
                            Some(att_use.datatype.clone()),
                        ));
                    }
                }
                (AttributeUseKind::Optional, Some(_)) => {
                    log::debug!("the default of the qualified attribute '{name}' is not applied");
                }
                _ => {}
            }
        }
    }

    /// Validate `value` with `datatype`, collecting ID and IDREF values.
    #[allow(clippy::too_many_arguments)]
    fn check_value(
        &mut self,
        datatype: &DatatypeValidator,
        value: &str,
        constraint: Option<&ValueConstraint>,
        ctx: &dyn ValidationContext,
        error: XMLError,
        what: &str,
        violations: &mut Vec<Violation>,
    ) {
        let parsed = match datatype.validate_value(value, ctx) {
            Ok(parsed) => parsed,
            Err(err) => {
                violations.push(Violation::new(
                    error,
                    format!("The value '{value}' of the {what} is invalid: {err}."),
                ));
                return;
            }
        };
        if let Some(ValueConstraint::Fixed(fixed)) = constraint
            && datatype
                .validate_value(fixed, ctx)
                .is_ok_and(|fixed| fixed != parsed)
        {
            violations.push(Violation::new(
                XMLError::SchemaValidFixedValue,
                format!("The value '{value}' of the {what} does not match the fixed value '{fixed}'."),
            ));
        }
        for (kind, id) in datatype.id_values(&parsed) {
            match kind {
                IdKind::ID => {
                    if !self.ids.insert(id.into()) {
                        violations.push(Violation::new(
                            XMLError::ParserDuplicateIDAttribute,
                            format!("The ID '{id}' appears more than once."),
                        ));
                    }
                }
                IdKind::IDREF => self.idrefs.push(id.into()),
                // unparsed entities are checked by the datatype itself
                IdKind::ENTITY => {}
            }
        }
    }

    /// Character data in the current element.
    pub fn characters(&mut self, text: &str) -> Vec<Violation> {
        let Some(frame) = self.frames.last_mut() else {
            return vec![];
        };
        if frame.identity {
            self.identity.characters(text);
        }
        if matches!(frame.kind, FrameKind::Skip) {
            return vec![];
        }
        frame.text.push_str(text);
        if !frame.valid || is_whitespace(text) {
            return vec![];
        }
        if frame.nil {
            frame.valid = false;
            return vec![Violation::new(
                XMLError::SchemaValidNil,
                format!("The nil element '{}' has character data.", frame.name),
            )];
        }
        vec![]
    }

    /// Validate the end of the current element.
    ///
    /// Returns the default value of the element if it is empty and has one. The caller
    /// reports it as character data.
    pub fn end_element(
        &mut self,
        resolver: &GrammarResolver,
        ctx: &dyn ValidationContext,
    ) -> (Vec<Violation>, Option<String>) {
        let Some(mut frame) = self.frames.pop() else {
            return (vec![], None);
        };
        let mut violations = vec![];
        let mut default_text = None;
        let mut simple_type = None;

        if !matches!(frame.kind, FrameKind::Skip) && !frame.nil {
            if !frame.has_children
                && frame.text.is_empty()
                && let Some(constraint) = &frame.value_constraint
            {
                frame.text = constraint.value().to_owned();
                default_text = Some(frame.text.clone());
            }
            simple_type = self.check_content(resolver, &mut frame, ctx, &mut violations);
        }

        if frame.identity {
            let found = self.identity.end_element(simple_type.as_deref());
            violations.extend(found.into_iter().map(from_identity));
        }
        (violations, default_text)
    }

    /// Check the completed content of `frame`, returning its simple type if any.
    fn check_content(
        &mut self,
        resolver: &GrammarResolver,
        frame: &mut SchemaFrame,
        ctx: &dyn ValidationContext,
        violations: &mut Vec<Violation>,
    ) -> Option<Arc<DatatypeValidator>> {
        let name = &frame.name;
        let simple = match &frame.kind {
            FrameKind::Typed(TypeDefinition::Simple(datatype)) => Some(datatype.clone()),
            FrameKind::Typed(TypeDefinition::Complex(reference)) => {
                let complex = resolver.complex_type(reference)?;
                match &complex.content {
                    ContentType::Simple(datatype) => Some(datatype.clone()),
                    ContentType::Empty => {
                        if frame.valid && !is_whitespace(&frame.text) {
                            violations.push(Violation::new(
                                XMLError::SchemaValidTextNotAllowed,
                                format!("The element '{name}' must be empty."),
                            ));
                        }
                        None
                    }
                    ContentType::ElementOnly(_) | ContentType::Mixed(_) => {
                        if frame.valid
                            && !complex.is_mixed()
                            && !is_whitespace(&frame.text)
                        {
                            frame.valid = false;
                            violations.push(Violation::new(
                                XMLError::SchemaValidTextNotAllowed,
                                format!("The element '{name}' cannot have character data."),
                            ));
                        }
                        if frame.valid
                            && let Ok(model) = complex.content_model()
                            && !model.is_final(frame.state)
                        {
                            violations.push(Violation::new(
                                XMLError::SchemaValidContentModel,
                                format!(
                                    "The content of the element '{name}' is incomplete. Expected: {}",
                                    model.expected(frame.state).join(", ")
                                ),
                            ));
                        }
                        if complex.is_mixed()
                            && !frame.has_children
                            && let Some(ValueConstraint::Fixed(fixed)) = &frame.value_constraint
                            && frame.text != **fixed
                        {
                            violations.push(Violation::new(
                                XMLError::SchemaValidFixedValue,
                                format!(
                                    "The content of the element '{name}' does not match the fixed value '{fixed}'."
                                ),
                            ));
                        }
                        None
                    }
                }
            }
            _ => None,
        };

        if let Some(datatype) = simple.as_deref()
            && frame.valid
        {
            let what = format!("element '{name}'");
            self.check_value(
                datatype,
                &frame.text,
                frame.value_constraint.as_ref(),
                ctx,
                XMLError::SchemaValidElementValue,
                &what,
                violations,
            );
        }
        simple
    }

    /// Check the references collected from the whole document.
    pub fn end_document(&mut self) -> Vec<Violation> {
        let mut violations = vec![];
        let mut reported = FastHashSet::default();
        for idref in &self.idrefs {
            if !self.ids.contains(idref) && reported.insert(idref.clone()) {
                violations.push(Violation::new(
                    XMLError::ParserUnresolvableIDReference,
                    format!("The IDREF '{idref}' does not match any ID."),
                ));
            }
        }
        violations
    }
}

fn from_identity(violation: IdentityViolation) -> Violation {
    Violation::new(
        violation.error,
        format!("{} ({})", violation.message, violation.constraint),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        datatype::NoContext,
        environment::ParserEnvironment,
        grammar::{
            Grammar, SchemaGrammar,
            schema::{AttributeUse, ComplexType},
        },
        validation::content_model::{ContentParticle, NamespaceConstraint},
    };

    const NS: &str = "urn:order";

    // <order id="..." currency="...">  <item>int</item>+  <note/>?  </order>
    fn resolver() -> GrammarResolver {
        let env = ParserEnvironment::new();
        let builtins = env.builtin_types();
        let mut grammar = SchemaGrammar::new(Some(NS), &builtins);
        let int = builtins.get("int").unwrap();
        let id = builtins.get("ID").unwrap();
        let string = builtins.get("string").unwrap();

        let mut order = ComplexType::new(Some(TypeName::new(Some(NS), "Order")));
        order.content = ContentType::ElementOnly(ContentParticle::Sequence(vec![
            ContentParticle::leaf(Some(NS), "item").one_or_more(),
            ContentParticle::Wildcard(Wildcard {
                namespaces: NamespaceConstraint::Enumeration(vec![Some("urn:ext".into())]),
                process_contents: ProcessContents::Skip,
            })
            .optional(),
        ]));
        order.attributes = vec![
            AttributeUse {
                name: ElementName::new(None, "id"),
                datatype: id,
                use_kind: AttributeUseKind::Required,
                value_constraint: None,
            },
            AttributeUse {
                name: ElementName::new(None, "currency"),
                datatype: string.clone(),
                use_kind: AttributeUseKind::Optional,
                value_constraint: Some(ValueConstraint::Default("EUR".into())),
            },
        ];
        let order_index = grammar.add_complex_type(order).unwrap();

        let mut special = ComplexType::new(Some(TypeName::new(Some(NS), "SpecialOrder")));
        special.base = TypeDefinition::Complex(ComplexTypeRef {
            namespace: Some(NS.into()),
            index: order_index,
        });
        special.derivation = DerivationMethod::Restriction;
        special.content = ContentType::ElementOnly(
            ContentParticle::leaf(Some(NS), "item").one_or_more(),
        );
        special.attributes = vec![AttributeUse {
            name: ElementName::new(None, "id"),
            datatype: builtins.get("ID").unwrap(),
            use_kind: AttributeUseKind::Optional,
            value_constraint: None,
        }];
        let special_index = grammar.add_complex_type(special).unwrap();

        let mut root = SchemaElementDecl::new(ElementName::new(Some(NS), "order"), Scope::Global);
        root.type_definition = TypeDefinition::Complex(ComplexTypeRef {
            namespace: Some(NS.into()),
            index: order_index,
        });
        grammar.add_element_decl(root).unwrap();
        for scope in [Scope::Local(order_index), Scope::Local(special_index)] {
            let mut item = SchemaElementDecl::new(ElementName::new(Some(NS), "item"), scope);
            item.type_definition = TypeDefinition::Simple(int.clone());
            item.nillable = true;
            item.value_constraint = Some(ValueConstraint::Default("1".into()));
            grammar.add_element_decl(item).unwrap();
        }
        let mut label = SchemaElementDecl::new(ElementName::new(Some(NS), "label"), Scope::Global);
        label.type_definition = TypeDefinition::Simple(string);
        grammar.add_element_decl(label).unwrap();

        grammar.set_validated();
        let mut resolver = GrammarResolver::new(None, env);
        resolver.put_grammar(Grammar::from(grammar));
        resolver
    }

    fn attributes(pairs: &[(Option<&str>, &str, &str)]) -> Attributes {
        let mut ret = Attributes::new();
        for &(uri, name, value) in pairs {
            let mut att = Attribute::new(name, value);
            att.uri = uri.map(Arc::from);
            att.local_name = Some(name.rsplit(':').next().unwrap().into());
            att.set_specified();
            ret.push(att).unwrap();
        }
        ret
    }

    fn errors(violations: &[Violation]) -> Vec<XMLError> {
        violations.iter().map(|v| v.error.clone()).collect()
    }

    fn order() -> ElementName {
        ElementName::new(Some(NS), "order")
    }

    fn item() -> ElementName {
        ElementName::new(Some(NS), "item")
    }

    #[test]
    fn valid_document_tests() {
        let resolver = resolver();
        let mut validator = SchemaValidator::new();
        let mut atts = attributes(&[(None, "id", "o1")]);
        let violations = validator.start_element(&resolver, &order(), &mut atts, &NoContext, false);
        assert!(violations.is_empty(), "{violations:?}");
        assert_eq!(atts.get_value_by_qname("currency"), Some("EUR"));
        assert!(!atts[1].is_specified());

        let mut empty = Attributes::new();
        assert!(validator.characters("\n  ").is_empty());
        assert!(validator.start_element(&resolver, &item(), &mut empty, &NoContext, false).is_empty());
        assert!(validator.characters(" 42 ").is_empty());
        let (violations, default) = validator.end_element(&resolver, &NoContext);
        assert!(violations.is_empty());
        assert!(default.is_none());

        // an empty element gets its default value
        assert!(validator.start_element(&resolver, &item(), &mut empty, &NoContext, false).is_empty());
        let (violations, default) = validator.end_element(&resolver, &NoContext);
        assert!(violations.is_empty());
        assert_eq!(default.as_deref(), Some("1"));

        // skipped by the wildcard, including descendants
        let ext = ElementName::new(Some("urn:ext"), "anything");
        let mut atts = attributes(&[(None, "whatever", "x")]);
        assert!(validator.start_element(&resolver, &ext, &mut atts, &NoContext, false).is_empty());
        assert!(validator.start_element(&resolver, &item(), &mut empty, &NoContext, false).is_empty());
        assert!(validator.characters("not a number").is_empty());
        assert!(validator.end_element(&resolver, &NoContext).0.is_empty());
        assert!(validator.end_element(&resolver, &NoContext).0.is_empty());

        assert!(validator.end_element(&resolver, &NoContext).0.is_empty());
        assert!(validator.end_document().is_empty());
    }

    #[test]
    fn content_tests() {
        let resolver = resolver();
        let mut validator = SchemaValidator::new();
        let mut atts = attributes(&[(None, "id", "o1")]);
        validator.start_element(&resolver, &order(), &mut atts, &NoContext, false);
        let mut empty = Attributes::new();
        validator.start_element(&resolver, &item(), &mut empty, &NoContext, false);
        validator.characters("forty-two");
        let (violations, _) = validator.end_element(&resolver, &NoContext);
        assert_eq!(errors(&violations), [XMLError::SchemaValidElementValue]);

        let label = ElementName::new(Some(NS), "label");
        let violations = validator.start_element(&resolver, &label, &mut empty, &NoContext, false);
        assert_eq!(errors(&violations), [XMLError::SchemaValidContentModel]);
        validator.end_element(&resolver, &NoContext);
        // reported once per element
        assert!(validator.characters("text").is_empty());
        assert!(validator.end_element(&resolver, &NoContext).0.is_empty());

        validator.reset();
        let mut atts = attributes(&[(None, "id", "o2")]);
        validator.start_element(&resolver, &order(), &mut atts, &NoContext, false);
        validator.characters("text");
        let (violations, _) = validator.end_element(&resolver, &NoContext);
        assert_eq!(
            errors(&violations),
            [XMLError::SchemaValidTextNotAllowed]
        );

        validator.reset();
        let mut atts = attributes(&[(None, "id", "o3")]);
        validator.start_element(&resolver, &order(), &mut atts, &NoContext, false);
        let (violations, _) = validator.end_element(&resolver, &NoContext);
        assert_eq!(errors(&violations), [XMLError::SchemaValidContentModel]);
    }

    #[test]
    fn attribute_tests() {
        let resolver = resolver();
        let mut validator = SchemaValidator::new();
        let mut atts = attributes(&[(None, "unknown", "x")]);
        let violations = validator.start_element(&resolver, &order(), &mut atts, &NoContext, false);
        assert_eq!(
            errors(&violations),
            [
                XMLError::SchemaValidUndeclaredAttribute,
                XMLError::SchemaValidRequiredAttribute
            ]
        );

        validator.reset();
        let mut atts = attributes(&[(None, "id", "1st")]);
        let violations = validator.start_element(&resolver, &order(), &mut atts, &NoContext, false);
        assert_eq!(errors(&violations), [XMLError::SchemaValidAttributeValue]);
    }

    #[test]
    fn xsi_tests() {
        let resolver = resolver();
        let mut validator = SchemaValidator::new();
        let xsi = Some(XML_SCHEMA_INSTANCE_NAMESPACE);

        struct Prefixes;
        impl ValidationContext for Prefixes {
            fn namespace_of(&self, prefix: Option<&str>) -> Option<String> {
                (prefix == Some("o")).then(|| NS.to_owned())
            }
        }

        // the derived type does not require 'id'
        let mut atts = attributes(&[(xsi, "xsi:type", "o:SpecialOrder")]);
        let violations = validator.start_element(&resolver, &order(), &mut atts, &Prefixes, false);
        assert!(violations.is_empty(), "{violations:?}");

        let mut atts = attributes(&[(xsi, "xsi:nil", "true")]);
        assert!(validator.start_element(&resolver, &item(), &mut atts, &Prefixes, false).is_empty());
        assert_eq!(errors(&validator.characters("1")), [XMLError::SchemaValidNil]);
        let (violations, default) = validator.end_element(&resolver, &Prefixes);
        assert!(violations.is_empty());
        assert!(default.is_none());
        validator.end_element(&resolver, &Prefixes);

        validator.reset();
        let mut atts = attributes(&[(None, "id", "a"), (xsi, "xsi:type", "o:Missing")]);
        let violations = validator.start_element(&resolver, &order(), &mut atts, &Prefixes, false);
        assert_eq!(errors(&violations), [XMLError::SchemaValidXsiType]);

        validator.reset();
        let mut atts = attributes(&[(None, "id", "a"), (xsi, "xsi:nil", "true")]);
        let violations = validator.start_element(&resolver, &order(), &mut atts, &Prefixes, false);
        assert_eq!(errors(&violations), [XMLError::SchemaValidNil]);
    }

    #[test]
    fn undeclared_root_tests() {
        let resolver = resolver();
        let mut validator = SchemaValidator::new();
        let mut empty = Attributes::new();
        let root = ElementName::new(Some("urn:other"), "root");
        let violations = validator.start_element(&resolver, &root, &mut empty, &NoContext, false);
        assert_eq!(errors(&violations), [XMLError::SchemaValidNoDeclaration]);
        // children of an unknown element are validated laxly
        let label = ElementName::new(Some(NS), "label");
        assert!(validator.start_element(&resolver, &label, &mut empty, &NoContext, false).is_empty());
        assert!(validator.end_element(&resolver, &NoContext).0.is_empty());
    }
}
