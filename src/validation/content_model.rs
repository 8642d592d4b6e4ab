//! Content models: the automata that validate the sequence of child elements.
//!
//! A model is compiled from a [`ContentParticle`] tree. Every distinct element name and
//! every wildcard in the tree becomes a symbol ([`NameID`]) of the alphabet; sequences,
//! choices and repetitions are turned into a position automaton by
//! [`strictxml_automata::fa::assemble_counted`], which keeps large `minOccurs` and
//! `maxOccurs` of a single element or wildcard as a counter. `xs:all` groups are not
//! regular in a compact form, so they are validated with a bitset of seen members instead.

use std::sync::Arc;

use strictxml_automata::{
    NameID,
    ast::ASTNode,
    fa::{DFA, assemble_counted},
};

use crate::FastHashMap;

/// Occurrence bounds above this do not fit the count of a [`StateId`].
pub const MAX_OCCURS_LIMIT: usize = u32::MAX as usize;
/// `xs:all` groups are validated with a 64-bit member set.
const MAX_ALL_MEMBERS: usize = 64;

/// A state of a content model automaton.
///
/// For sequences and choices, the low 32 bits are the DFA state and the high 32 bits
/// count the repetitions of its counted particle.
pub type StateId = u64;

fn pack(state: usize, count: usize) -> StateId {
    ((count as StateId) << 32) | state as StateId
}

fn unpack(state: StateId) -> (usize, usize) {
    ((state & 0xFFFF_FFFF) as usize, (state >> 32) as usize)
}

/// An expanded element name. DTD names have no namespace and keep their prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementName {
    pub uri: Option<Arc<str>>,
    pub local_name: Arc<str>,
}

impl ElementName {
    pub fn new(uri: Option<&str>, local_name: &str) -> Self {
        Self {
            uri: uri.filter(|uri| !uri.is_empty()).map(Arc::from),
            local_name: local_name.into(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.uri.as_deref()
    }
}

impl std::fmt::Display for ElementName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.uri.as_deref() {
            Some(uri) => write!(f, "{{{uri}}}{}", self.local_name),
            None => write!(f, "{}", self.local_name),
        }
    }
}

/// The `namespace` attribute of `xs:any` and `xs:anyAttribute`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NamespaceConstraint {
    /// `##any`
    Any,
    /// Any namespace except the listed ones. `##other` lists the target namespace
    /// and the absent namespace (`None`).
    Not(Vec<Option<Arc<str>>>),
    /// One of the listed namespaces.
    Enumeration(Vec<Option<Arc<str>>>),
}

impl NamespaceConstraint {
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        let contains = |list: &[Option<Arc<str>>]| list.iter().any(|ns| ns.as_deref() == namespace);
        match self {
            Self::Any => true,
            Self::Not(list) => !contains(list),
            Self::Enumeration(list) => contains(list),
        }
    }

    /// Check if some namespace is allowed by both `self` and `other`.
    pub fn overlaps(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => true,
            (Self::Not(_), Self::Not(_)) => true,
            (Self::Enumeration(list), other) | (other, Self::Enumeration(list)) => {
                list.iter().any(|ns| other.allows(ns.as_deref()))
            }
        }
    }
}

/// The `processContents` attribute of wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessContents {
    #[default]
    Strict,
    Lax,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Wildcard {
    pub namespaces: NamespaceConstraint,
    pub process_contents: ProcessContents,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentParticle {
    Leaf(ElementName),
    Wildcard(Wildcard),
    Sequence(Vec<ContentParticle>),
    Choice(Vec<ContentParticle>),
    All(Vec<ContentParticle>),
    Repeat {
        particle: Box<ContentParticle>,
        min: usize,
        /// `None` means `unbounded`.
        max: Option<usize>,
    },
}

impl ContentParticle {
    pub fn leaf(uri: Option<&str>, local_name: &str) -> Self {
        Self::Leaf(ElementName::new(uri, local_name))
    }

    pub fn optional(self) -> Self {
        self.repeat(0, Some(1))
    }

    pub fn zero_or_more(self) -> Self {
        self.repeat(0, None)
    }

    pub fn one_or_more(self) -> Self {
        self.repeat(1, None)
    }

    pub fn repeat(self, min: usize, max: Option<usize>) -> Self {
        Self::Repeat {
            particle: Box::new(self),
            min,
            max,
        }
    }

    /// Check if this particle can match the empty sequence.
    pub fn is_emptiable(&self) -> bool {
        match self {
            Self::Leaf(_) | Self::Wildcard(_) => false,
            Self::Sequence(children) | Self::All(children) => {
                children.iter().all(|child| child.is_emptiable())
            }
            Self::Choice(children) => children.iter().any(|child| child.is_emptiable()),
            Self::Repeat { particle, min, .. } => *min == 0 || particle.is_emptiable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentModelError {
    /// `minOccurs` or `maxOccurs` is larger than [`MAX_OCCURS_LIMIT`].
    TooLargeOccurrence { min: usize, max: Option<usize> },
    /// `minOccurs` is larger than `maxOccurs`.
    InvalidOccurrence { min: usize, max: usize },
    /// `xs:all` appears somewhere other than the top of a model, or has a member
    /// that is not an element with `maxOccurs="1"`.
    InvalidAllGroup,
    TooManyAllMembers,
    /// The automaton is too large.
    TooComplex,
    /// Two particles can match the same element at the same point.
    Ambiguous { first: String, second: String },
}

impl std::fmt::Display for ContentModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ambiguous { first, second } => write!(
                f,
                "the content model is ambiguous: '{first}' and '{second}' compete"
            ),
            other => write!(f, "{other:?}"),
        }
    }
}

impl std::error::Error for ContentModelError {}

/// The result of validating a complete list of children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentValidity {
    Valid,
    /// The child at this index is not allowed.
    InvalidAt(usize),
    /// All children are allowed, but more are required.
    TooFew,
}

/// Resolves substitution group membership while validating schema content.
pub trait SubstitutionResolver {
    /// Check if `element` may appear where `head` is expected.
    fn can_substitute(&self, element: &ElementName, head: &ElementName) -> bool;
}

/// What a symbol of the alphabet stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedParticle<'a> {
    Element(&'a ElementName),
    Wildcard(&'a Wildcard),
    /// Matched by `ANY` or mixed content.
    Unconstrained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AllMember {
    symbol: u32,
    required: bool,
}

#[derive(Debug, Clone)]
enum ModelKind {
    Empty,
    Any,
    Mixed,
    Children(DFA<NameID>),
    All(Vec<AllMember>),
}

#[derive(Debug, Clone)]
pub struct ContentModel {
    kind: ModelKind,
    // symbol `i + 1` is `names[i]`
    names: Vec<ElementName>,
    index: FastHashMap<ElementName, u32>,
    wildcards: Vec<Wildcard>,
    // the symbol of each leaf of the automaton, from left to right
    leaf_symbols: Vec<u32>,
}

impl ContentModel {
    fn with_kind(kind: ModelKind) -> Self {
        Self {
            kind,
            names: vec![],
            index: FastHashMap::default(),
            wildcards: vec![],
            leaf_symbols: vec![],
        }
    }

    /// `EMPTY`: no children are allowed.
    pub fn empty() -> Self {
        Self::with_kind(ModelKind::Empty)
    }

    /// `ANY`: any children are allowed.
    pub fn any() -> Self {
        Self::with_kind(ModelKind::Any)
    }

    /// `(#PCDATA | a | b)*`: any of `names` in any order and number.
    pub fn mixed(names: impl IntoIterator<Item = ElementName>) -> Self {
        let mut ret = Self::with_kind(ModelKind::Mixed);
        for name in names {
            ret.name_symbol(&name);
        }
        ret
    }

    pub fn build(particle: &ContentParticle) -> Result<Self, ContentModelError> {
        if let Some(members) = Self::top_level_all(particle) {
            return Self::build_all(members);
        }

        let mut ret = Self::with_kind(ModelKind::Empty);
        let ast = ret.convert(particle)?;
        let dfa = assemble_counted(ast.as_ref()).map_err(|_| ContentModelError::TooComplex)?;
        ret.kind = ModelKind::Children(dfa);
        Ok(ret)
    }

    fn top_level_all(particle: &ContentParticle) -> Option<&[ContentParticle]> {
        match particle {
            ContentParticle::All(members) => Some(members),
            ContentParticle::Repeat { particle, max, .. } if *max == Some(1) => {
                match particle.as_ref() {
                    ContentParticle::All(members) => Some(members),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn build_all(members: &[ContentParticle]) -> Result<Self, ContentModelError> {
        if members.len() > MAX_ALL_MEMBERS {
            return Err(ContentModelError::TooManyAllMembers);
        }
        let mut ret = Self::with_kind(ModelKind::Empty);
        let mut all = vec![];
        for member in members {
            let (name, required) = match member {
                ContentParticle::Leaf(name) => (name, true),
                ContentParticle::Repeat {
                    particle,
                    min,
                    max: Some(1),
                } if *min <= 1 => match particle.as_ref() {
                    ContentParticle::Leaf(name) => (name, *min == 1),
                    _ => return Err(ContentModelError::InvalidAllGroup),
                },
                _ => return Err(ContentModelError::InvalidAllGroup),
            };
            if ret.index.contains_key(name) {
                return Err(ContentModelError::Ambiguous {
                    first: name.to_string(),
                    second: name.to_string(),
                });
            }
            let symbol = ret.name_symbol(name);
            ret.leaf_symbols.push(symbol);
            all.push(AllMember { symbol, required });
        }
        ret.kind = ModelKind::All(all);
        Ok(ret)
    }

    fn name_symbol(&mut self, name: &ElementName) -> u32 {
        if let Some(&symbol) = self.index.get(name) {
            return symbol;
        }
        self.names.push(name.clone());
        let symbol = self.names.len() as u32;
        self.index.insert(name.clone(), symbol);
        symbol
    }

    fn convert(
        &mut self,
        particle: &ContentParticle,
    ) -> Result<Option<ASTNode<NameID>>, ContentModelError> {
        match particle {
            ContentParticle::Leaf(name) => {
                let symbol = self.name_symbol(name);
                self.leaf_symbols.push(symbol);
                Ok(Some(ASTNode::symbol(NameID(symbol))))
            }
            ContentParticle::Wildcard(wildcard) => {
                self.wildcards.push(wildcard.clone());
                let symbol = self.wildcard_symbol(self.wildcards.len() - 1);
                self.leaf_symbols.push(symbol);
                Ok(Some(ASTNode::symbol(NameID(symbol))))
            }
            ContentParticle::Sequence(children) => {
                let mut ret = None;
                for child in children {
                    ret = ASTNode::catenate(ret, self.convert(child)?);
                }
                Ok(ret)
            }
            ContentParticle::Choice(children) => {
                if children.is_empty() {
                    // an empty choice matches nothing
                    self.leaf_symbols.push(0);
                    return Ok(Some(ASTNode::Range {
                        start: NameID(0),
                        end: NameID(u32::MAX),
                        negation: true,
                    }));
                }
                let mut ret: Option<ASTNode<NameID>> = None;
                let mut nullable = false;
                for child in children {
                    match self.convert(child)? {
                        Some(node) => {
                            ret = Some(match ret {
                                Some(left) => ASTNode::Alternation(Box::new(left), Box::new(node)),
                                None => node,
                            });
                        }
                        None => nullable = true,
                    }
                }
                Ok(match ret {
                    Some(node) if nullable => Some(ASTNode::ZeroOrOne(Box::new(node))),
                    ret => ret,
                })
            }
            ContentParticle::All(_) => Err(ContentModelError::InvalidAllGroup),
            &ContentParticle::Repeat {
                ref particle,
                min,
                max,
            } => {
                if min > MAX_OCCURS_LIMIT || max.is_some_and(|max| max > MAX_OCCURS_LIMIT) {
                    return Err(ContentModelError::TooLargeOccurrence { min, max });
                }
                if let Some(max) = max
                    && min > max
                {
                    return Err(ContentModelError::InvalidOccurrence { min, max });
                }
                if max == Some(0) {
                    return Ok(None);
                }
                let Some(node) = self.convert(particle)? else {
                    return Ok(None);
                };
                let node = Box::new(node);
                Ok(Some(match (min, max) {
                    (0, Some(1)) => ASTNode::ZeroOrOne(node),
                    (0, None) => ASTNode::ZeroOrMore(node),
                    (1, None) => ASTNode::OneOrMore(node),
                    (1, Some(1)) => *node,
                    (at_least, at_most) => ASTNode::Repeat {
                        node,
                        at_least,
                        at_most,
                    },
                }))
            }
        }
    }

    fn wildcard_index(&self, symbol: u32) -> Option<usize> {
        let index = (u32::MAX - symbol).checked_sub(1)? as usize;
        (index < self.wildcards.len()).then_some(index)
    }

    /// The symbol of `element`: its own name if it appears in the model, otherwise the
    /// first wildcard that allows it.
    pub fn symbol_of(&self, element: &ElementName) -> Option<NameID> {
        if let Some(&symbol) = self.index.get(element) {
            return Some(NameID(symbol));
        }
        self.wildcards
            .iter()
            .position(|wildcard| wildcard.namespaces.allows(element.namespace()))
            .map(|index| NameID(self.wildcard_symbol(index)))
    }

    // wildcard `i` is the symbol `u32::MAX - (i + 1)`
    fn wildcard_symbol(&self, index: usize) -> u32 {
        u32::MAX - (index as u32 + 1)
    }

    pub fn initial_state(&self) -> StateId {
        0
    }

    /// Returns `None` if `symbol` is not allowed in `state`.
    pub fn next_state(&self, state: StateId, symbol: NameID) -> Option<StateId> {
        match &self.kind {
            ModelKind::Empty => None,
            ModelKind::Any => Some(state),
            ModelKind::Mixed => {
                (1..=self.names.len() as u32).contains(&symbol.0).then_some(state)
            }
            ModelKind::Children(dfa) => {
                let (state, count) = unpack(state);
                dfa.step(state, count, symbol)
                    .map(|(next, count)| pack(next, count))
            }
            ModelKind::All(members) => {
                let bit = members.iter().position(|member| member.symbol == symbol.0)?;
                let mask = 1u64 << bit;
                (state & mask == 0).then_some(state | mask)
            }
        }
    }

    /// Advance `state` by `element`.
    ///
    /// Unlike `symbol_of` + `next_state`, every wildcard that allows `element` is tried.
    pub fn step(&self, state: StateId, element: &ElementName) -> Option<(StateId, NameID)> {
        match &self.kind {
            ModelKind::Empty => None,
            ModelKind::Any => Some((state, NameID(0))),
            ModelKind::Mixed => self
                .index
                .get(element)
                .map(|&symbol| (state, NameID(symbol))),
            _ => {
                if let Some(&symbol) = self.index.get(element)
                    && let Some(next) = self.next_state(state, NameID(symbol))
                {
                    return Some((next, NameID(symbol)));
                }
                self.wildcards
                    .iter()
                    .enumerate()
                    .filter(|(_, wildcard)| wildcard.namespaces.allows(element.namespace()))
                    .find_map(|(index, _)| {
                        let symbol = NameID(self.wildcard_symbol(index));
                        self.next_state(state, symbol).map(|next| (next, symbol))
                    })
            }
        }
    }

    /// Same as [`ContentModel::step`], but an element that matches no particle directly
    /// is retried as a member of the substitution group of each element in the model.
    pub fn step_special(
        &self,
        state: StateId,
        element: &ElementName,
        resolver: &dyn SubstitutionResolver,
    ) -> Option<(StateId, NameID)> {
        if let Some(ret) = self.step(state, element) {
            return Some(ret);
        }
        self.names.iter().enumerate().find_map(|(index, head)| {
            if !resolver.can_substitute(element, head) {
                return None;
            }
            let symbol = NameID(index as u32 + 1);
            self.next_state(state, symbol).map(|next| (next, symbol))
        })
    }

    pub fn is_final(&self, state: StateId) -> bool {
        match &self.kind {
            ModelKind::Empty | ModelKind::Any | ModelKind::Mixed => true,
            ModelKind::Children(dfa) => {
                let (state, count) = unpack(state);
                dfa.is_final(state, count)
            }
            ModelKind::All(members) => members
                .iter()
                .enumerate()
                .all(|(bit, member)| !member.required || state & (1 << bit) != 0),
        }
    }

    /// What `symbol` stands for.
    pub fn particle_of(&self, symbol: NameID) -> Option<MatchedParticle<'_>> {
        if symbol.0 == 0 {
            return matches!(self.kind, ModelKind::Any | ModelKind::Mixed)
                .then_some(MatchedParticle::Unconstrained);
        }
        if let Some(name) = self.names.get(symbol.0 as usize - 1)
            && !matches!(self.kind, ModelKind::Any)
        {
            return Some(MatchedParticle::Element(name));
        }
        if let Some(index) = self.wildcard_index(symbol.0) {
            return self.wildcards.get(index).map(MatchedParticle::Wildcard);
        }
        None
    }

    /// Names that may appear in `state`, for error messages.
    pub fn expected(&self, state: StateId) -> Vec<String> {
        let mut ret = self
            .names
            .iter()
            .enumerate()
            .filter(|&(index, _)| self.next_state(state, NameID(index as u32 + 1)).is_some())
            .map(|(_, name)| name.to_string())
            .collect::<Vec<_>>();
        for index in 0..self.wildcards.len() {
            let symbol = self.wildcard_symbol(index);
            if self.next_state(state, NameID(symbol)).is_some() {
                ret.push(self.describe(symbol));
            }
        }
        ret
    }

    pub fn is_empty_model(&self) -> bool {
        matches!(self.kind, ModelKind::Empty)
    }

    pub fn is_any(&self) -> bool {
        matches!(self.kind, ModelKind::Any)
    }

    pub fn is_mixed(&self) -> bool {
        matches!(self.kind, ModelKind::Mixed)
    }

    /// Check if the model accepts no children.
    pub fn is_emptiable(&self) -> bool {
        self.is_final(self.initial_state())
    }

    pub fn validate_content(&self, children: &[ElementName]) -> ContentValidity {
        self.validate_with(children, |state, child| self.step(state, child))
    }

    pub fn validate_content_special(
        &self,
        children: &[ElementName],
        resolver: &dyn SubstitutionResolver,
    ) -> ContentValidity {
        self.validate_with(children, |state, child| {
            self.step_special(state, child, resolver)
        })
    }

    fn validate_with(
        &self,
        children: &[ElementName],
        step: impl Fn(StateId, &ElementName) -> Option<(StateId, NameID)>,
    ) -> ContentValidity {
        let mut state = self.initial_state();
        for (i, child) in children.iter().enumerate() {
            match step(state, child) {
                Some((next, _)) => state = next,
                None => return ContentValidity::InvalidAt(i),
            }
        }
        if self.is_final(state) {
            ContentValidity::Valid
        } else {
            ContentValidity::TooFew
        }
    }

    fn describe(&self, symbol: u32) -> String {
        match self.particle_of(NameID(symbol)) {
            Some(MatchedParticle::Element(name)) => name.to_string(),
            Some(MatchedParticle::Wildcard(wildcard)) => format!("{:?}", wildcard.namespaces),
            _ => format!("#{symbol}"),
        }
    }

    /// Check that no element can be matched by two particles from the same state.
    pub fn check_unique_particle_attribution(&self) -> Result<(), ContentModelError> {
        let ModelKind::Children(dfa) = &self.kind else {
            // duplicated members of `xs:all` are rejected by `build`
            return Ok(());
        };
        if let Some(&(first, second)) = dfa.ambiguities().first() {
            let first = self.leaf_symbols.get(first).copied().unwrap_or(0);
            let second = self.leaf_symbols.get(second).copied().unwrap_or(0);
            return Err(ContentModelError::Ambiguous {
                first: self.describe(first),
                second: self.describe(second),
            });
        }
        if self.wildcards.is_empty() {
            return Ok(());
        }

        for state in 0..dfa.state_count() {
            let wildcards = (0..self.wildcards.len())
                .filter(|&index| {
                    dfa.transition(state, NameID(self.wildcard_symbol(index)))
                        .is_some()
                })
                .collect::<Vec<_>>();
            for (i, &w) in wildcards.iter().enumerate() {
                let wildcard = &self.wildcards[w];
                for &other in &wildcards[i + 1..] {
                    if wildcard.namespaces.overlaps(&self.wildcards[other].namespaces) {
                        return Err(ContentModelError::Ambiguous {
                            first: self.describe(self.wildcard_symbol(w)),
                            second: self.describe(self.wildcard_symbol(other)),
                        });
                    }
                }
                for (index, name) in self.names.iter().enumerate() {
                    let symbol = NameID(index as u32 + 1);
                    if dfa.transition(state, symbol).is_some()
                        && wildcard.namespaces.allows(name.namespace())
                    {
                        return Err(ContentModelError::Ambiguous {
                            first: name.to_string(),
                            second: self.describe(self.wildcard_symbol(w)),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(local: &str) -> ElementName {
        ElementName::new(None, local)
    }

    fn names(locals: &[&str]) -> Vec<ElementName> {
        locals.iter().map(|local| name(local)).collect()
    }

    #[test]
    fn sequence_with_optional_and_star_tests() {
        // (a, b?, c*)
        let particle = ContentParticle::Sequence(vec![
            ContentParticle::leaf(None, "a"),
            ContentParticle::leaf(None, "b").optional(),
            ContentParticle::leaf(None, "c").zero_or_more(),
        ]);
        let model = ContentModel::build(&particle).unwrap();
        assert_eq!(model.validate_content(&names(&["a"])), ContentValidity::Valid);
        assert_eq!(
            model.validate_content(&names(&["a", "c", "c"])),
            ContentValidity::Valid
        );
        assert_eq!(
            model.validate_content(&names(&["b", "a"])),
            ContentValidity::InvalidAt(0)
        );
        assert_eq!(model.validate_content(&[]), ContentValidity::TooFew);
        assert_eq!(
            model.validate_content(&names(&["a", "c", "b"])),
            ContentValidity::InvalidAt(2)
        );
        assert!(model.check_unique_particle_attribution().is_ok());
    }

    #[test]
    fn incremental_tests() {
        let particle = ContentParticle::Choice(vec![
            ContentParticle::leaf(None, "x"),
            ContentParticle::leaf(None, "y").repeat(2, Some(3)),
        ]);
        let model = ContentModel::build(&particle).unwrap();
        let y = model.symbol_of(&name("y")).unwrap();
        let mut state = model.initial_state();
        assert!(!model.is_final(state));
        state = model.next_state(state, y).unwrap();
        assert!(!model.is_final(state));
        state = model.next_state(state, y).unwrap();
        assert!(model.is_final(state));
        state = model.next_state(state, y).unwrap();
        assert!(model.next_state(state, y).is_none());
        assert!(model.symbol_of(&name("z")).is_none());
    }

    #[test]
    fn all_group_tests() {
        let particle = ContentParticle::All(vec![
            ContentParticle::leaf(None, "a"),
            ContentParticle::leaf(None, "b").optional(),
        ]);
        let model = ContentModel::build(&particle).unwrap();
        assert_eq!(
            model.validate_content(&names(&["b", "a"])),
            ContentValidity::Valid
        );
        assert_eq!(model.validate_content(&names(&["a"])), ContentValidity::Valid);
        assert_eq!(model.validate_content(&names(&["b"])), ContentValidity::TooFew);
        assert_eq!(
            model.validate_content(&names(&["a", "a"])),
            ContentValidity::InvalidAt(1)
        );

        let nested = ContentParticle::Sequence(vec![ContentParticle::All(vec![])]);
        assert_eq!(
            ContentModel::build(&nested).unwrap_err(),
            ContentModelError::InvalidAllGroup
        );
    }

    #[test]
    fn occurrence_limit_tests() {
        let particle = ContentParticle::leaf(None, "a").repeat(0, Some(MAX_OCCURS_LIMIT + 1));
        assert!(matches!(
            ContentModel::build(&particle),
            Err(ContentModelError::TooLargeOccurrence { .. })
        ));
        let particle = ContentParticle::leaf(None, "a").repeat(3, Some(2));
        assert!(matches!(
            ContentModel::build(&particle),
            Err(ContentModelError::InvalidOccurrence { min: 3, max: 2 })
        ));
    }

    #[test]
    fn large_occurrence_tests() {
        let a = |n: usize| vec![name("a"); n];

        // (a{0,5000}, b?)
        let particle = ContentParticle::Sequence(vec![
            ContentParticle::leaf(None, "a").repeat(0, Some(5000)),
            ContentParticle::leaf(None, "b").optional(),
        ]);
        let model = ContentModel::build(&particle).unwrap();
        assert!(model.check_unique_particle_attribution().is_ok());
        assert_eq!(model.validate_content(&[]), ContentValidity::Valid);
        assert_eq!(model.validate_content(&a(5000)), ContentValidity::Valid);
        assert_eq!(
            model.validate_content(&a(5001)),
            ContentValidity::InvalidAt(5000)
        );
        let mut children = a(4999);
        children.push(name("b"));
        assert_eq!(model.validate_content(&children), ContentValidity::Valid);

        // (a{9999,}, b)
        let particle = ContentParticle::Sequence(vec![
            ContentParticle::leaf(None, "a").repeat(9999, None),
            ContentParticle::leaf(None, "b"),
        ]);
        let model = ContentModel::build(&particle).unwrap();
        let mut children = a(9998);
        children.push(name("b"));
        assert_eq!(
            model.validate_content(&children),
            ContentValidity::InvalidAt(9998)
        );
        let mut children = a(20000);
        children.push(name("b"));
        assert_eq!(model.validate_content(&children), ContentValidity::Valid);
        assert_eq!(model.validate_content(&a(9999)), ContentValidity::TooFew);

        // (a{40})* repeats whole blocks of 40
        let particle = ContentParticle::leaf(None, "a")
            .repeat(40, Some(40))
            .zero_or_more();
        let model = ContentModel::build(&particle).unwrap();
        assert!(model.check_unique_particle_attribution().is_ok());
        assert_eq!(model.validate_content(&a(80)), ContentValidity::Valid);
        assert_eq!(model.validate_content(&a(79)), ContentValidity::TooFew);

        // a group is expanded
        let particle = ContentParticle::Sequence(vec![
            ContentParticle::leaf(None, "a"),
            ContentParticle::leaf(None, "b"),
        ])
        .repeat(0, Some(2000));
        let model = ContentModel::build(&particle).unwrap();
        assert!(model.check_unique_particle_attribution().is_ok());
        let pairs = |n: usize| {
            (0..n)
                .flat_map(|_| [name("a"), name("b")])
                .collect::<Vec<_>>()
        };
        assert_eq!(model.validate_content(&pairs(2000)), ContentValidity::Valid);
        assert_eq!(
            model.validate_content(&pairs(2001)),
            ContentValidity::InvalidAt(4000)
        );
    }

    #[test]
    fn large_occurrence_ambiguity_tests() {
        // (a{100}, a)
        let particle = ContentParticle::Sequence(vec![
            ContentParticle::leaf(None, "a").repeat(100, Some(100)),
            ContentParticle::leaf(None, "a"),
        ]);
        let model = ContentModel::build(&particle).unwrap();
        assert!(matches!(
            model.check_unique_particle_attribution(),
            Err(ContentModelError::Ambiguous { .. })
        ));

        // (a{50,60})+ may go on or start over after the 50th 'a'
        let particle = ContentParticle::leaf(None, "a")
            .repeat(50, Some(60))
            .one_or_more();
        let model = ContentModel::build(&particle).unwrap();
        assert!(matches!(
            model.check_unique_particle_attribution(),
            Err(ContentModelError::Ambiguous { .. })
        ));
    }

    #[test]
    fn unique_particle_attribution_tests() {
        // (a?, a)
        let particle = ContentParticle::Sequence(vec![
            ContentParticle::leaf(None, "a").optional(),
            ContentParticle::leaf(None, "a"),
        ]);
        let model = ContentModel::build(&particle).unwrap();
        assert!(matches!(
            model.check_unique_particle_attribution(),
            Err(ContentModelError::Ambiguous { .. })
        ));

        // (a | ##any)
        let particle = ContentParticle::Choice(vec![
            ContentParticle::leaf(None, "a"),
            ContentParticle::Wildcard(Wildcard {
                namespaces: NamespaceConstraint::Any,
                process_contents: ProcessContents::Lax,
            }),
        ]);
        let model = ContentModel::build(&particle).unwrap();
        assert!(model.check_unique_particle_attribution().is_err());

        // (a, ##other)
        let particle = ContentParticle::Sequence(vec![
            ContentParticle::leaf(None, "a"),
            ContentParticle::Wildcard(Wildcard {
                namespaces: NamespaceConstraint::Not(vec![None]),
                process_contents: ProcessContents::Skip,
            }),
        ]);
        let model = ContentModel::build(&particle).unwrap();
        assert!(model.check_unique_particle_attribution().is_ok());
        let foreign = ElementName::new(Some("urn:x"), "w");
        assert_eq!(
            model.validate_content(&[name("a"), foreign.clone()]),
            ContentValidity::Valid
        );
        let (_, symbol) = model.step(1, &foreign).unwrap();
        assert!(matches!(
            model.particle_of(symbol),
            Some(MatchedParticle::Wildcard(_))
        ));
    }

    #[test]
    fn special_models_tests() {
        assert_eq!(
            ContentModel::empty().validate_content(&names(&["a"])),
            ContentValidity::InvalidAt(0)
        );
        assert_eq!(
            ContentModel::any().validate_content(&names(&["a", "b"])),
            ContentValidity::Valid
        );
        let mixed = ContentModel::mixed(names(&["a"]));
        assert_eq!(
            mixed.validate_content(&names(&["a", "a"])),
            ContentValidity::Valid
        );
        assert_eq!(
            mixed.validate_content(&names(&["b"])),
            ContentValidity::InvalidAt(0)
        );
    }

    struct Heads;
    impl SubstitutionResolver for Heads {
        fn can_substitute(&self, element: &ElementName, head: &ElementName) -> bool {
            &*element.local_name == "member" && &*head.local_name == "head"
        }
    }

    #[test]
    fn substitution_tests() {
        let particle = ContentParticle::leaf(None, "head").one_or_more();
        let model = ContentModel::build(&particle).unwrap();
        let children = names(&["head", "member"]);
        assert_eq!(
            model.validate_content(&children),
            ContentValidity::InvalidAt(1)
        );
        assert_eq!(
            model.validate_content_special(&children, &Heads),
            ContentValidity::Valid
        );
    }
}
