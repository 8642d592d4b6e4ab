//! Validity constraints of XML 1.0 checked against a [`DTDGrammar`].

use std::sync::Arc;

use crate::{
    FastHashSet, XMLVersion,
    datatype::ValidationContext,
    error::XMLError,
    grammar::{
        Grammar,
        dtd::{AttributeType, ContentSpec, DTDElementDecl, DTDGrammar, DefaultDecl},
    },
    pool::StringPool,
    sax::attributes::Attributes,
    util::StringTokenizer,
    validation::{
        Violation,
        content_model::{ContentModel, ElementName, StateId},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    Empty,
    Any,
    Mixed,
    Children,
    /// The element is not declared, so its content is not checked.
    Unknown,
}

#[derive(Debug)]
struct ElementFrame {
    name: Arc<str>,
    element: Option<usize>,
    kind: ContentKind,
    state: StateId,
    /// Cleared after the first content error so that it is reported only once.
    valid: bool,
}

/// Validates elements and attributes of one document against its DTD.
#[derive(Debug, Default)]
pub struct DTDValidator {
    grammar: Option<Arc<Grammar>>,
    root_name: Box<str>,
    frames: Vec<ElementFrame>,
    ids: FastHashSet<Box<str>>,
    idrefs: Vec<Box<str>>,
    // undeclared element types already reported
    undeclared: StringPool,
}

impl DTDValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.grammar = None;
        self.root_name = "".into();
        self.frames.clear();
        self.ids.clear();
        self.idrefs.clear();
        self.undeclared.flush_all();
    }

    /// Start validating a document whose DOCTYPE names `root_name` as the root element.
    pub fn start_document(&mut self, grammar: Arc<Grammar>, root_name: &str) {
        self.grammar = Some(grammar);
        self.root_name = root_name.into();
    }

    fn dtd(&self) -> Option<&DTDGrammar> {
        self.grammar.as_deref().and_then(Grammar::as_dtd)
    }

    pub fn start_element(
        &mut self,
        qname: &str,
        attributes: &Attributes,
        ctx: &dyn ValidationContext,
    ) -> Vec<Violation> {
        let mut violations = vec![];
        let Some(grammar) = self.grammar.clone() else {
            return violations;
        };
        let Some(dtd) = grammar.as_dtd() else {
            return violations;
        };

        if self.frames.is_empty() && !self.root_name.is_empty() && *self.root_name != *qname {
            // [VC: Root Element Type]
            violations.push(Violation::new(
                XMLError::ParserMismatchRootElementType,
                format!(
                    "The root element '{qname}' does not match the document type name '{}'.",
                    self.root_name
                ),
            ));
        }
        self.step_parent(qname, &mut violations);

        let decl = dtd.get_elem_decl(qname).filter(|decl| decl.is_declared());
        let Some(decl) = decl else {
            if self.undeclared.id_of(qname) == 0 {
                self.undeclared.add_or_find(qname);
                // [VC: Element Valid]
                violations.push(Violation::new(
                    XMLError::ParserUndeclaredElement,
                    format!("The element type '{qname}' is not declared."),
                ));
            }
            self.frames.push(ElementFrame {
                name: qname.into(),
                element: None,
                kind: ContentKind::Unknown,
                state: 0,
                valid: true,
            });
            return violations;
        };

        self.check_attributes(decl, attributes, ctx, &mut violations);

        let (kind, state) = match decl.content_spec() {
            Some(ContentSpec::EMPTY) => (ContentKind::Empty, 0),
            Some(ContentSpec::ANY) => (ContentKind::Any, 0),
            Some(ContentSpec::Mixed(_)) => (ContentKind::Mixed, 0),
            Some(ContentSpec::Children(_)) => match decl.content_model() {
                Ok(Some(model)) => (ContentKind::Children, model.initial_state()),
                Ok(None) => (ContentKind::Unknown, 0),
                Err(err) => {
                    log::warn!("content model of '{qname}' cannot be built: {err}");
                    (ContentKind::Unknown, 0)
                }
            },
            None => (ContentKind::Unknown, 0),
        };
        self.frames.push(ElementFrame {
            name: decl.name().clone(),
            element: Some(decl.id()),
            kind,
            state,
            valid: true,
        });
        violations
    }

    fn model_of(&self, element: Option<usize>) -> Option<&ContentModel> {
        let decl = self.dtd()?.elem_decl(element?)?;
        decl.content_model().ok().flatten()
    }

    /// Advance the content model of the parent element by the child `qname`.
    fn step_parent(&mut self, qname: &str, violations: &mut Vec<Violation>) {
        let Some(frame) = self.frames.last() else {
            return;
        };
        if !frame.valid || matches!(frame.kind, ContentKind::Any | ContentKind::Unknown) {
            return;
        }
        let (element, state, kind) = (frame.element, frame.state, frame.kind);
        let parent: Arc<str> = frame.name.clone();
        let child = ElementName::new(None, qname);
        let next = if kind == ContentKind::Empty {
            None
        } else {
            self.model_of(element)
                .map(|model| model.step(state, &child).map(|(next, _)| next))
                .unwrap_or(Some(state))
        };

        let expected = match next {
            Some(_) => None,
            None => Some(
                self.model_of(element)
                    .map(|model| model.expected(state))
                    .unwrap_or_default(),
            ),
        };
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        match (next, expected) {
            (Some(next), _) => frame.state = next,
            (None, expected) => {
                frame.valid = false;
                let expected = expected.unwrap_or_default();
                // [VC: Element Valid]
                violations.push(Violation::new(
                    XMLError::ParserMismatchElementContentModel,
                    if kind == ContentKind::Empty {
                        format!("The element '{parent}' is declared EMPTY, but has a child '{qname}'.")
                    } else if expected.is_empty() {
                        format!("The element '{qname}' is not allowed here in '{parent}'.")
                    } else {
                        format!(
                            "The element '{qname}' is not allowed here in '{parent}'. Expected: {}",
                            expected.join(", ")
                        )
                    },
                ));
            }
        }
    }

    fn check_attributes(
        &mut self,
        decl: &DTDElementDecl,
        attributes: &Attributes,
        ctx: &dyn ValidationContext,
        violations: &mut Vec<Violation>,
    ) {
        for att in attributes.iter() {
            let Some(def) = decl.get_attribute_def(&att.qname) else {
                // [VC: Attribute Value Type]
                violations.push(Violation::new(
                    XMLError::ParserUndeclaredAttribute,
                    format!(
                        "The attribute '{}' of the element '{}' is not declared.",
                        att.qname,
                        decl.name()
                    ),
                ));
                continue;
            };
            if let DefaultDecl::FIXED(fixed) = &def.default_decl
                && att.is_specified()
                && *att.value != **fixed
            {
                // [VC: Fixed Attribute Default]
                violations.push(Violation::new(
                    XMLError::ParserMismatchFixedDefaultAttributeValue,
                    format!(
                        "The value '{}' of the attribute '{}' does not match the fixed value '{}'.",
                        att.value, att.qname, fixed
                    ),
                ));
            }
            self.check_attribute_value(&att.qname, &att.value, &def.att_type, ctx, violations);
        }

        for def in decl.attributes() {
            if def.default_decl == DefaultDecl::REQUIRED
                && attributes.get_index_by_qname(&def.name).is_none()
            {
                // [VC: Required Attribute]
                violations.push(Violation::new(
                    XMLError::ParserRequiredAttributeNotFound,
                    format!(
                        "The required attribute '{}' of the element '{}' is not specified.",
                        def.name,
                        decl.name()
                    ),
                ));
            }
        }
    }

    fn check_attribute_value(
        &mut self,
        name: &str,
        value: &str,
        att_type: &AttributeType,
        ctx: &dyn ValidationContext,
        violations: &mut Vec<Violation>,
    ) {
        let version = XMLVersion::XML10;
        let invalid = |violations: &mut Vec<Violation>| {
            violations.push(Violation::new(
                XMLError::ParserInvalidAttributeValue,
                format!("The value '{value}' of the attribute '{name}' is not a valid {att_type}."),
            ));
        };
        let tokens = || StringTokenizer::new(value);

        match att_type {
            AttributeType::CDATA => {}
            AttributeType::ID => {
                if !version.validate_name(value) {
                    invalid(violations);
                } else if !self.ids.insert(value.into()) {
                    // [VC: ID]
                    violations.push(Violation::new(
                        XMLError::ParserDuplicateIDAttribute,
                        format!("The ID '{value}' appears more than once."),
                    ));
                }
            }
            AttributeType::IDREF | AttributeType::IDREFS => {
                let multiple = *att_type == AttributeType::IDREFS;
                if (multiple && tokens().count_tokens() == 0)
                    || (!multiple && !version.validate_name(value))
                {
                    invalid(violations);
                    return;
                }
                for token in tokens() {
                    if !version.validate_name(token) {
                        invalid(violations);
                        return;
                    }
                    self.idrefs.push(token.into());
                }
            }
            AttributeType::ENTITY | AttributeType::ENTITIES => {
                let multiple = *att_type == AttributeType::ENTITIES;
                if (multiple && tokens().count_tokens() == 0)
                    || (!multiple && !version.validate_name(value))
                {
                    invalid(violations);
                    return;
                }
                for token in tokens() {
                    if !ctx.is_unparsed_entity(token) {
                        // [VC: Entity Name]
                        violations.push(Violation::new(
                            XMLError::ParserUndeclaredUnparsedEntity,
                            format!(
                                "The attribute '{name}' refers to '{token}', which is not an unparsed entity."
                            ),
                        ));
                    }
                }
            }
            AttributeType::NMTOKEN => {
                if !version.validate_nmtoken(value) {
                    invalid(violations);
                }
            }
            AttributeType::NMTOKENS => {
                if tokens().count_tokens() == 0
                    || !tokens().all(|token| version.validate_nmtoken(token))
                {
                    invalid(violations);
                }
            }
            AttributeType::NOTATION(notations) => {
                if !notations.iter().any(|notation| notation.as_ref() == value) {
                    // [VC: Notation Attributes]
                    violations.push(Violation::new(
                        XMLError::ParserUnacceptableNotationAttribute,
                        format!(
                            "The value '{value}' of the attribute '{name}' is not one of the declared notations."
                        ),
                    ));
                }
            }
            AttributeType::Enumeration(values) => {
                if !values.iter().any(|v| v.as_ref() == value) {
                    // [VC: Enumeration]
                    violations.push(Violation::new(
                        XMLError::ParserUnacceptableEnumerationAttribute,
                        format!(
                            "The value '{value}' of the attribute '{name}' is not one of {att_type}."
                        ),
                    ));
                }
            }
        }
    }

    /// Character data in the current element.
    ///
    /// `whitespace_only` is `true` for literal whitespace, which element content allows.
    pub fn characters(&mut self, text: &str, whitespace_only: bool) -> Vec<Violation> {
        let Some(frame) = self.frames.last_mut() else {
            return vec![];
        };
        if !frame.valid || text.is_empty() {
            return vec![];
        }
        let message = match frame.kind {
            ContentKind::Empty => format!(
                "The element '{}' is declared EMPTY, but has character data.",
                frame.name
            ),
            ContentKind::Children if !whitespace_only => format!(
                "The element '{}' has element content, but has character data.",
                frame.name
            ),
            _ => return vec![],
        };
        frame.valid = false;
        // [VC: Element Valid]
        vec![Violation::new(XMLError::ParserMismatchElementContentModel, message)]
    }

    pub fn end_element(&mut self) -> Vec<Violation> {
        let Some(frame) = self.frames.pop() else {
            return vec![];
        };
        if !frame.valid || frame.kind != ContentKind::Children {
            return vec![];
        }
        let Some(model) = self.model_of(frame.element) else {
            return vec![];
        };
        if model.is_final(frame.state) {
            return vec![];
        }
        let expected = model.expected(frame.state);
        // [VC: Element Valid]
        vec![Violation::new(
            XMLError::ParserMismatchElementContentModel,
            format!(
                "The content of the element '{}' is incomplete. Expected: {}",
                frame.name,
                expected.join(", ")
            ),
        )]
    }

    /// Check the references collected from the whole document.
    pub fn end_document(&mut self) -> Vec<Violation> {
        let mut violations = vec![];
        let mut reported = FastHashSet::default();
        for idref in &self.idrefs {
            if !self.ids.contains(idref) && reported.insert(idref.clone()) {
                // [VC: IDREF]
                violations.push(Violation::new(
                    XMLError::ParserUnresolvableIDReference,
                    format!("The IDREF '{idref}' does not match any ID."),
                ));
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sax::attributes::Attribute, validation::content_model::ContentParticle};

    struct Entities(&'static [&'static str]);

    impl ValidationContext for Entities {
        fn is_unparsed_entity(&self, name: &str) -> bool {
            self.0.contains(&name)
        }
    }

    const CONTEXT: Entities = Entities(&["logo"]);

    fn grammar() -> Arc<Grammar> {
        let mut dtd = DTDGrammar::new("doc", None, None);
        let particle = ContentParticle::Sequence(vec![
            ContentParticle::leaf(None, "head"),
            ContentParticle::leaf(None, "item").zero_or_more(),
        ]);
        dtd.declare_element("doc", ContentSpec::Children(particle), false)
            .unwrap();
        dtd.declare_element("head", ContentSpec::Mixed(vec![]), false)
            .unwrap();
        dtd.declare_element("item", ContentSpec::EMPTY, false).unwrap();
        dtd.add_attribute_def("item", "id", AttributeType::ID, DefaultDecl::REQUIRED, false)
            .unwrap();
        dtd.add_attribute_def(
            "item",
            "ref",
            AttributeType::IDREF,
            DefaultDecl::IMPLIED,
            false,
        )
        .unwrap();
        dtd.add_attribute_def(
            "item",
            "pic",
            AttributeType::ENTITY,
            DefaultDecl::IMPLIED,
            false,
        )
        .unwrap();
        dtd.set_validated();
        Arc::new(Grammar::from(dtd))
    }

    fn attributes(pairs: &[(&str, &str)]) -> Attributes {
        let mut ret = Attributes::default();
        for &(name, value) in pairs {
            let mut att = Attribute::new(name, value);
            att.set_specified();
            ret.push(att).unwrap();
        }
        ret
    }

    fn errors(violations: &[Violation]) -> Vec<XMLError> {
        violations.iter().map(|v| v.error.clone()).collect()
    }

    #[test]
    fn valid_document_tests() {
        let mut validator = DTDValidator::new();
        validator.start_document(grammar(), "doc");
        let empty = Attributes::default();
        assert!(validator.start_element("doc", &empty, &CONTEXT).is_empty());
        assert!(validator.characters("\n  ", true).is_empty());
        assert!(validator.start_element("head", &empty, &CONTEXT).is_empty());
        assert!(validator.characters("title", false).is_empty());
        assert!(validator.end_element().is_empty());
        let item = attributes(&[("id", "a"), ("ref", "b"), ("pic", "logo")]);
        assert!(validator.start_element("item", &item, &CONTEXT).is_empty());
        assert!(validator.end_element().is_empty());
        let item = attributes(&[("id", "b")]);
        assert!(validator.start_element("item", &item, &CONTEXT).is_empty());
        assert!(validator.end_element().is_empty());
        assert!(validator.end_element().is_empty());
        assert!(validator.end_document().is_empty());
    }

    #[test]
    fn content_model_tests() {
        let mut validator = DTDValidator::new();
        validator.start_document(grammar(), "doc");
        let empty = Attributes::default();
        validator.start_element("doc", &empty, &CONTEXT);
        let item = attributes(&[("id", "a")]);
        let violations = validator.start_element("item", &item, &CONTEXT);
        assert_eq!(errors(&violations), [XMLError::ParserMismatchElementContentModel]);
        validator.end_element();
        // reported only once per element
        assert!(validator.characters("text", false).is_empty());
        assert!(validator.end_element().is_empty());

        validator.reset();
        validator.start_document(grammar(), "doc");
        validator.start_element("doc", &empty, &CONTEXT);
        let violations = validator.end_element();
        assert_eq!(errors(&violations), [XMLError::ParserMismatchElementContentModel]);
    }

    #[test]
    fn attribute_tests() {
        let mut validator = DTDValidator::new();
        validator.start_document(grammar(), "doc");
        let empty = Attributes::default();
        validator.start_element("doc", &empty, &CONTEXT);
        validator.start_element("head", &empty, &CONTEXT);
        validator.end_element();

        let violations = validator.start_element("item", &empty, &CONTEXT);
        assert_eq!(errors(&violations), [XMLError::ParserRequiredAttributeNotFound]);
        validator.end_element();

        let item = attributes(&[("id", "x"), ("pic", "nothing"), ("other", "1")]);
        let violations = validator.start_element("item", &item, &CONTEXT);
        assert_eq!(
            errors(&violations),
            [
                XMLError::ParserUndeclaredUnparsedEntity,
                XMLError::ParserUndeclaredAttribute
            ]
        );
        validator.end_element();

        let item = attributes(&[("id", "x"), ("ref", "missing")]);
        let violations = validator.start_element("item", &item, &CONTEXT);
        assert_eq!(errors(&violations), [XMLError::ParserDuplicateIDAttribute]);
        validator.end_element();
        validator.end_element();

        let violations = validator.end_document();
        assert_eq!(errors(&violations), [XMLError::ParserUnresolvableIDReference]);
    }

    #[test]
    fn undeclared_element_tests() {
        let mut validator = DTDValidator::new();
        validator.start_document(grammar(), "root");
        let empty = Attributes::default();
        let violations = validator.start_element("other", &empty, &CONTEXT);
        assert_eq!(
            errors(&violations),
            [
                XMLError::ParserMismatchRootElementType,
                XMLError::ParserUndeclaredElement
            ]
        );
        let violations = validator.start_element("other", &empty, &CONTEXT);
        assert!(violations.is_empty());
    }
}
