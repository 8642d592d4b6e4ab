//! Simple type validators of XML Schema.
//!
//! Every [`DatatypeValidator`] is an immutable node of a single-inheritance chain. A node
//! holds only the facets specified at its own derivation step; inherited facets are
//! found by walking to the base. Derivation happens through
//! [`DatatypeValidator::new_instance`], [`DatatypeValidator::derive_list`] and
//! [`DatatypeValidator::derive_union`], which reject facets that widen the base.

mod builtin;
pub mod decimal;
mod factory;

use std::sync::Arc;

use strictxml_automata::{unicode::CategoryTable, xsregexp::XSRegexp};
use strictxml_base64::Base64Binary;

pub use builtin::BuiltinTypes;
pub use decimal::Decimal;
pub use factory::DatatypeValidatorFactory;

use crate::{
    XMLVersion, error::XMLError, util::StringTokenizer, util::WhiteSpace,
    validation::content_model::ElementName,
};

/// The name of a named simple type.
pub type TypeName = ElementName;

/// Why a value was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatatypeError {
    /// The lexical form is not in the lexical space of the primitive type.
    InvalidLexicalValue,
    /// The value is rejected by a facet.
    FacetViolation(FacetKind),
    /// A QName uses a prefix that is not bound.
    UndeclaredPrefix,
    /// An ENTITY value does not name an unparsed entity.
    UndeclaredEntity,
    /// No member type of a union accepts the value.
    NoMatchingMemberType,
}

impl std::fmt::Display for DatatypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FacetViolation(kind) => write!(f, "the value violates the '{kind}' facet"),
            other => write!(f, "{other:?}"),
        }
    }
}

impl std::error::Error for DatatypeError {}

/// The result of [`DatatypeValidator::compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Less,
    Equal,
    Greater,
    /// The values are not ordered, for example because one is `NaN`.
    Indeterminate,
}

impl From<std::cmp::Ordering> for Comparison {
    fn from(value: std::cmp::Ordering) -> Self {
        match value {
            std::cmp::Ordering::Less => Self::Less,
            std::cmp::Ordering::Equal => Self::Equal,
            std::cmp::Ordering::Greater => Self::Greater,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetKind {
    Length,
    MinLength,
    MaxLength,
    Pattern,
    Enumeration,
    WhiteSpace,
    MaxInclusive,
    MaxExclusive,
    MinInclusive,
    MinExclusive,
    TotalDigits,
    FractionDigits,
}

impl FacetKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "length" => Self::Length,
            "minLength" => Self::MinLength,
            "maxLength" => Self::MaxLength,
            "pattern" => Self::Pattern,
            "enumeration" => Self::Enumeration,
            "whiteSpace" => Self::WhiteSpace,
            "maxInclusive" => Self::MaxInclusive,
            "maxExclusive" => Self::MaxExclusive,
            "minInclusive" => Self::MinInclusive,
            "minExclusive" => Self::MinExclusive,
            "totalDigits" => Self::TotalDigits,
            "fractionDigits" => Self::FractionDigits,
            _ => return None,
        })
    }

    fn bit(self) -> u16 {
        1 << self as u16
    }
}

impl std::fmt::Display for FacetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Length => "length",
            Self::MinLength => "minLength",
            Self::MaxLength => "maxLength",
            Self::Pattern => "pattern",
            Self::Enumeration => "enumeration",
            Self::WhiteSpace => "whiteSpace",
            Self::MaxInclusive => "maxInclusive",
            Self::MaxExclusive => "maxExclusive",
            Self::MinInclusive => "minInclusive",
            Self::MinExclusive => "minExclusive",
            Self::TotalDigits => "totalDigits",
            Self::FractionDigits => "fractionDigits",
        };
        write!(f, "{name}")
    }
}

/// A facet as it is written in a schema document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetValue {
    pub kind: FacetKind,
    pub value: String,
    pub fixed: bool,
}

impl FacetValue {
    pub fn new(kind: FacetKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            fixed: false,
        }
    }
}

/// The `final` (and `block`) derivation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DerivationSet(u8);

impl DerivationSet {
    pub const EXTENSION: Self = Self(1 << 0);
    pub const RESTRICTION: Self = Self(1 << 1);
    pub const LIST: Self = Self(1 << 2);
    pub const UNION: Self = Self(1 << 3);
    pub const SUBSTITUTION: Self = Self(1 << 4);
    pub const ALL: Self = Self(0b11111);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// Parse a space-separated list such as `"restriction list"` or `"#all"`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut ret = Self::empty();
        for token in StringTokenizer::new(s) {
            ret = ret
                | match token {
                    "#all" => Self::ALL,
                    "extension" => Self::EXTENSION,
                    "restriction" => Self::RESTRICTION,
                    "list" => Self::LIST,
                    "union" => Self::UNION,
                    "substitution" => Self::SUBSTITUTION,
                    _ => return None,
                };
        }
        Some(ret)
    }
}

impl std::ops::BitOr for DerivationSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for DerivationSet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    AnySimpleType,
    String,
    Boolean,
    Decimal,
    Float,
    Double,
    AnyURI,
    QName,
    NOTATION,
    Base64Binary,
    HexBinary,
}

impl Primitive {
    fn default_white_space(self) -> WhiteSpace {
        match self {
            Self::AnySimpleType | Self::String => WhiteSpace::Preserve,
            _ => WhiteSpace::Collapse,
        }
    }

    fn allows(self, kind: FacetKind) -> bool {
        use FacetKind::*;

        match kind {
            Pattern | Enumeration => true,
            WhiteSpace => true,
            Length | MinLength | MaxLength => matches!(
                self,
                Self::String
                    | Self::AnyURI
                    | Self::QName
                    | Self::NOTATION
                    | Self::Base64Binary
                    | Self::HexBinary
            ),
            MaxInclusive | MaxExclusive | MinInclusive | MinExclusive => {
                matches!(self, Self::Decimal | Self::Float | Self::Double)
            }
            TotalDigits | FractionDigits => self == Self::Decimal,
        }
    }
}

/// Extra lexical rules of built-in types derived from `string` and `decimal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LexicalRule {
    #[default]
    None,
    Language,
    Name,
    NCName,
    NMTOKEN,
    Integer,
}

/// Types whose values take part in ID/IDREF or ENTITY checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    ID,
    IDREF,
    ENTITY,
}

/// A value in the value space of a simple type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Boolean(bool),
    Decimal(Decimal),
    /// `float` values are widened to `f64`.
    Double(f64),
    Binary(Vec<u8>),
    QName {
        uri: Option<String>,
        local_name: String,
    },
    List(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    fn length(&self) -> Option<usize> {
        match self {
            Self::String(s) => Some(s.chars().count()),
            Self::Binary(b) => Some(b.len()),
            Self::List(items) => Some(items.len()),
            // length facets on QName and NOTATION are always satisfied
            _ => None,
        }
    }

    /// Compare two values of the same primitive type.
    pub fn compare(&self, other: &Self) -> Comparison {
        match (self, other) {
            (Self::Decimal(a), Self::Decimal(b)) => a.cmp(b).into(),
            (Self::Double(a), Self::Double(b)) => {
                if a.is_nan() && b.is_nan() {
                    Comparison::Equal
                } else {
                    a.partial_cmp(b)
                        .map(Comparison::from)
                        .unwrap_or(Comparison::Indeterminate)
                }
            }
            (Self::List(a), Self::List(b)) => {
                if a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|(a, b)| a.compare(b) == Comparison::Equal)
                {
                    Comparison::Equal
                } else {
                    Comparison::Indeterminate
                }
            }
            (a, b) if a == b => Comparison::Equal,
            _ => Comparison::Indeterminate,
        }
    }

    fn is_equal(&self, other: &Self) -> bool {
        self.compare(other) == Comparison::Equal
    }
}

/// Information that some datatypes need from the document being validated.
pub trait ValidationContext {
    /// Resolve `prefix` (`None` is the default namespace) to a namespace name.
    fn namespace_of(&self, prefix: Option<&str>) -> Option<String> {
        let _ = prefix;
        None
    }

    /// If `false`, unbound prefixes of QName values are not errors.
    fn checks_prefixes(&self) -> bool {
        false
    }

    /// Check if `name` is a declared unparsed entity.
    fn is_unparsed_entity(&self, name: &str) -> bool {
        let _ = name;
        true
    }
}

/// A context that knows nothing about the document.
pub struct NoContext;

impl ValidationContext for NoContext {}

#[derive(Debug, Clone, Default)]
struct Facets {
    length: Option<usize>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    // patterns of one derivation step are alternatives
    patterns: Vec<XSRegexp>,
    enumeration: Vec<(String, Value)>,
    white_space: Option<WhiteSpace>,
    max_inclusive: Option<Value>,
    max_exclusive: Option<Value>,
    min_inclusive: Option<Value>,
    min_exclusive: Option<Value>,
    total_digits: Option<usize>,
    fraction_digits: Option<usize>,
    fixed: u16,
}

#[derive(Debug, Clone)]
pub enum Variety {
    Atomic,
    List(Arc<DatatypeValidator>),
    Union(Vec<Arc<DatatypeValidator>>),
}

#[derive(Debug, Clone)]
pub struct DatatypeValidator {
    name: Option<TypeName>,
    variety: Variety,
    primitive: Primitive,
    rule: LexicalRule,
    id_kind: Option<IdKind>,
    base: Option<Arc<DatatypeValidator>>,
    facets: Facets,
    final_set: DerivationSet,
    builtin: bool,
}

impl DatatypeValidator {
    pub fn name(&self) -> Option<&TypeName> {
        self.name.as_ref()
    }

    pub fn base(&self) -> Option<&Arc<DatatypeValidator>> {
        self.base.as_ref()
    }

    pub fn variety(&self) -> &Variety {
        &self.variety
    }

    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    pub fn final_set(&self) -> DerivationSet {
        self.final_set
    }

    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    pub fn id_kind(&self) -> Option<IdKind> {
        self.id_kind
    }

    /// The item type if this is a list type.
    pub fn item_type(&self) -> Option<&Arc<DatatypeValidator>> {
        match &self.variety {
            Variety::List(item) => Some(item),
            _ => None,
        }
    }

    /// Check if `self` is `other` or derived from it through the base chain.
    pub fn is_derived_from(&self, other: &DatatypeValidator) -> bool {
        let mut current = Some(self);
        while let Some(now) = current {
            if std::ptr::eq(now, other) || (now.name.is_some() && now.name == other.name) {
                return true;
            }
            current = now.base.as_deref();
        }
        // every simple type is derived from anySimpleType
        other.builtin && other.primitive == Primitive::AnySimpleType && other.base.is_none()
    }

    fn levels(&self) -> impl Iterator<Item = &DatatypeValidator> {
        std::iter::successors(Some(self), |now| now.base.as_deref())
    }

    fn lookup<T>(&self, f: impl Fn(&Facets) -> Option<T>) -> Option<T> {
        self.levels().find_map(|level| f(&level.facets))
    }

    fn is_fixed(&self, kind: FacetKind) -> bool {
        self.levels().any(|level| level.facets.fixed & kind.bit() != 0)
    }

    /// The effective `whiteSpace` facet.
    pub fn white_space(&self) -> WhiteSpace {
        match &self.variety {
            Variety::Union(_) => WhiteSpace::Preserve,
            Variety::List(_) => WhiteSpace::Collapse,
            Variety::Atomic => self
                .lookup(|facets| facets.white_space)
                .unwrap_or(self.primitive.default_white_space()),
        }
    }

    pub fn validate(&self, content: &str, ctx: &dyn ValidationContext) -> Result<(), DatatypeError> {
        self.validate_value(content, ctx).map(|_| ())
    }

    /// Validate `content` and return its value.
    pub fn validate_value(
        &self,
        content: &str,
        ctx: &dyn ValidationContext,
    ) -> Result<Value, DatatypeError> {
        if let Variety::Union(members) = &self.variety {
            let value = members
                .iter()
                .find_map(|member| member.validate_value(content, ctx).ok())
                .ok_or(DatatypeError::NoMatchingMemberType)?;
            self.check_facets(content, &value)?;
            return Ok(value);
        }

        let normalized = self.white_space().normalize(content);
        let value = self.parse_normalized(&normalized, ctx)?;
        self.check_facets(&normalized, &value)?;
        Ok(value)
    }

    /// Parse `content` into the value space without checking facets.
    pub fn parse_value(
        &self,
        content: &str,
        ctx: &dyn ValidationContext,
    ) -> Result<Value, DatatypeError> {
        match &self.variety {
            Variety::Union(members) => members
                .iter()
                .find_map(|member| member.parse_value(content, ctx).ok())
                .ok_or(DatatypeError::NoMatchingMemberType),
            _ => {
                let normalized = self.white_space().normalize(content);
                self.parse_normalized(&normalized, ctx)
            }
        }
    }

    fn parse_normalized(
        &self,
        normalized: &str,
        ctx: &dyn ValidationContext,
    ) -> Result<Value, DatatypeError> {
        match &self.variety {
            Variety::Atomic => builtin::parse_atomic(self.primitive, self.rule, self.id_kind, normalized, ctx),
            Variety::List(item) => StringTokenizer::new(normalized)
                .map(|token| item.validate_value(token, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Variety::Union(members) => members
                .iter()
                .find_map(|member| member.validate_value(normalized, ctx).ok())
                .ok_or(DatatypeError::NoMatchingMemberType),
        }
    }

    fn check_facets(&self, lexical: &str, value: &Value) -> Result<(), DatatypeError> {
        use FacetKind::*;

        let violation = DatatypeError::FacetViolation;
        for level in self.levels() {
            let facets = &level.facets;
            if !facets.patterns.is_empty()
                && !facets.patterns.iter().any(|pattern| pattern.is_match(lexical))
            {
                return Err(violation(Pattern));
            }
            if !facets.enumeration.is_empty()
                && !facets
                    .enumeration
                    .iter()
                    .any(|(_, allowed)| allowed.is_equal(value))
            {
                return Err(violation(Enumeration));
            }
            if let Some(length) = value.length() {
                if facets.length.is_some_and(|len| len != length) {
                    return Err(violation(Length));
                }
                if facets.min_length.is_some_and(|min| length < min) {
                    return Err(violation(MinLength));
                }
                if facets.max_length.is_some_and(|max| length > max) {
                    return Err(violation(MaxLength));
                }
            }
            let cmp = |bound: &Option<Value>| bound.as_ref().map(|bound| value.compare(bound));
            if cmp(&facets.max_inclusive)
                .is_some_and(|c| !matches!(c, Comparison::Less | Comparison::Equal))
            {
                return Err(violation(MaxInclusive));
            }
            if cmp(&facets.max_exclusive).is_some_and(|c| c != Comparison::Less) {
                return Err(violation(MaxExclusive));
            }
            if cmp(&facets.min_inclusive)
                .is_some_and(|c| !matches!(c, Comparison::Greater | Comparison::Equal))
            {
                return Err(violation(MinInclusive));
            }
            if cmp(&facets.min_exclusive).is_some_and(|c| c != Comparison::Greater) {
                return Err(violation(MinExclusive));
            }
            if let Value::Decimal(decimal) = value {
                if facets
                    .total_digits
                    .is_some_and(|total| decimal.total_digits() > total)
                {
                    return Err(violation(TotalDigits));
                }
                if facets
                    .fraction_digits
                    .is_some_and(|fraction| decimal.fraction_digits() > fraction)
                {
                    return Err(violation(FractionDigits));
                }
            }
        }
        Ok(())
    }

    /// Compare two lexical values of this type.
    ///
    /// Values that cannot be parsed, and values of unordered types that are not equal,
    /// give [`Comparison::Indeterminate`].
    pub fn compare(&self, a: &str, b: &str) -> Comparison {
        match (
            self.parse_value(a, &NoContext),
            self.parse_value(b, &NoContext),
        ) {
            (Ok(a), Ok(b)) => a.compare(&b),
            _ => Comparison::Indeterminate,
        }
    }

    /// The canonical lexical representation of `raw`.
    ///
    /// Facets are not checked.
    pub fn canonical(&self, raw: &str) -> Result<String, DatatypeError> {
        match &self.variety {
            Variety::Union(members) => members
                .iter()
                .find_map(|member| {
                    member
                        .parse_value(raw, &NoContext)
                        .ok()
                        .and_then(|_| member.canonical(raw).ok())
                })
                .ok_or(DatatypeError::NoMatchingMemberType),
            Variety::List(item) => {
                let normalized = self.white_space().normalize(raw);
                let items = StringTokenizer::new(&normalized)
                    .map(|token| item.canonical(token))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(items.join(" "))
            }
            Variety::Atomic => {
                let normalized = self.white_space().normalize(raw);
                let value = builtin::parse_atomic(
                    self.primitive,
                    self.rule,
                    None,
                    &normalized,
                    &NoContext,
                )?;
                Ok(builtin::canonical(self.primitive, self.rule, &normalized, &value))
            }
        }
    }

    fn builtin_atomic(name: &str, primitive: Primitive) -> Self {
        Self {
            name: Some(builtin::builtin_name(name)),
            variety: Variety::Atomic,
            primitive,
            rule: LexicalRule::None,
            id_kind: None,
            base: None,
            facets: Facets::default(),
            final_set: DerivationSet::empty(),
            builtin: true,
        }
    }

    /// Derive a new validator by restricting `base` with `facets`.
    pub fn new_instance(
        base: &Arc<DatatypeValidator>,
        name: Option<TypeName>,
        facets: &[FacetValue],
        final_set: DerivationSet,
        categories: &CategoryTable,
    ) -> Result<Self, XMLError> {
        if base.final_set.contains(DerivationSet::RESTRICTION) {
            return Err(XMLError::SchemaFinalDerivation);
        }
        let mut ret = Self {
            name,
            variety: base.variety.clone(),
            primitive: base.primitive,
            rule: base.rule,
            id_kind: base.id_kind,
            base: Some(base.clone()),
            facets: Facets::default(),
            final_set,
            builtin: false,
        };
        ret.facets = ret.build_facets(base, facets, categories)?;
        ret.check_facet_consistency()?;
        Ok(ret)
    }

    fn allows_facet(&self, kind: FacetKind) -> bool {
        match &self.variety {
            Variety::Atomic => self.primitive.allows(kind),
            Variety::List(_) => matches!(
                kind,
                FacetKind::Length
                    | FacetKind::MinLength
                    | FacetKind::MaxLength
                    | FacetKind::Pattern
                    | FacetKind::Enumeration
                    | FacetKind::WhiteSpace
            ),
            Variety::Union(_) => matches!(kind, FacetKind::Pattern | FacetKind::Enumeration),
        }
    }

    fn build_facets(
        &self,
        base: &Arc<DatatypeValidator>,
        inputs: &[FacetValue],
        categories: &CategoryTable,
    ) -> Result<Facets, XMLError> {
        let mut facets = Facets::default();
        let mut seen = 0u16;
        for input in inputs {
            let kind = input.kind;
            if !self.allows_facet(kind) {
                return Err(XMLError::SchemaInvalidFacet);
            }
            if seen & kind.bit() != 0 && !matches!(kind, FacetKind::Pattern | FacetKind::Enumeration)
            {
                return Err(XMLError::SchemaInvalidFacet);
            }
            seen |= kind.bit();
            if input.fixed {
                facets.fixed |= kind.bit();
            }

            let value = input.value.as_str();
            let parse_usize = || {
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| XMLError::SchemaInvalidFacet)
            };
            let parse_bound = || {
                base.parse_value(value, &NoContext)
                    .map_err(|_| XMLError::SchemaInvalidFacet)
            };
            match kind {
                FacetKind::Length => facets.length = Some(parse_usize()?),
                FacetKind::MinLength => facets.min_length = Some(parse_usize()?),
                FacetKind::MaxLength => facets.max_length = Some(parse_usize()?),
                FacetKind::TotalDigits => {
                    let total = parse_usize()?;
                    if total == 0 {
                        return Err(XMLError::SchemaInvalidFacet);
                    }
                    facets.total_digits = Some(total);
                }
                FacetKind::FractionDigits => facets.fraction_digits = Some(parse_usize()?),
                FacetKind::Pattern => {
                    facets
                        .patterns
                        .push(XSRegexp::compile_with(value, categories)?);
                }
                FacetKind::Enumeration => {
                    let parsed = base
                        .validate_value(value, &NoContext)
                        .map_err(|_| XMLError::SchemaInvalidFacet)?;
                    facets.enumeration.push((value.to_owned(), parsed));
                }
                FacetKind::WhiteSpace => {
                    let ws = WhiteSpace::from_name(value.trim()).ok_or(XMLError::SchemaInvalidFacet)?;
                    if ws < base.white_space()
                        || (!matches!(self.variety, Variety::Atomic) && ws != WhiteSpace::Collapse)
                        || (self.primitive != Primitive::String
                            && self.primitive != Primitive::AnySimpleType
                            && ws != WhiteSpace::Collapse)
                    {
                        return Err(XMLError::SchemaInvalidFacet);
                    }
                    facets.white_space = Some(ws);
                }
                FacetKind::MaxInclusive => facets.max_inclusive = Some(parse_bound()?),
                FacetKind::MaxExclusive => facets.max_exclusive = Some(parse_bound()?),
                FacetKind::MinInclusive => facets.min_inclusive = Some(parse_bound()?),
                FacetKind::MinExclusive => facets.min_exclusive = Some(parse_bound()?),
            }
        }
        Ok(facets)
    }

    /// Check that the facets of this step only narrow those of the base.
    fn check_facet_consistency(&self) -> Result<(), XMLError> {
        use Comparison::*;

        let invalid = Err(XMLError::SchemaInvalidFacet);
        let Some(base) = self.base.as_deref() else {
            return Ok(());
        };
        let own = &self.facets;

        // fixed facets may be restated, but not changed
        macro_rules! check_fixed {
            ($kind:expr, $field:ident, $eq:expr) => {
                if let Some(value) = own.$field.as_ref()
                    && base.is_fixed($kind)
                    && let Some(inherited) = base.lookup(|f| f.$field.clone())
                    && !$eq(value, &inherited)
                {
                    return invalid;
                }
            };
        }
        check_fixed!(FacetKind::Length, length, |a: &usize, b: &usize| a == b);
        check_fixed!(FacetKind::MinLength, min_length, |a: &usize, b: &usize| a == b);
        check_fixed!(FacetKind::MaxLength, max_length, |a: &usize, b: &usize| a == b);
        check_fixed!(FacetKind::TotalDigits, total_digits, |a: &usize, b: &usize| a == b);
        check_fixed!(FacetKind::FractionDigits, fraction_digits, |a: &usize, b: &usize| a == b);
        check_fixed!(FacetKind::WhiteSpace, white_space, |a: &WhiteSpace, b: &WhiteSpace| a == b);
        check_fixed!(FacetKind::MaxInclusive, max_inclusive, |a: &Value, b: &Value| a.is_equal(b));
        check_fixed!(FacetKind::MaxExclusive, max_exclusive, |a: &Value, b: &Value| a.is_equal(b));
        check_fixed!(FacetKind::MinInclusive, min_inclusive, |a: &Value, b: &Value| a.is_equal(b));
        check_fixed!(FacetKind::MinExclusive, min_exclusive, |a: &Value, b: &Value| a.is_equal(b));

        // length family
        let length = self.lookup(|f| f.length);
        let min_length = self.lookup(|f| f.min_length);
        let max_length = self.lookup(|f| f.max_length);
        if let Some(len) = own.length {
            if base.lookup(|f| f.length).is_some_and(|base_len| base_len != len)
                || min_length.is_some_and(|min| len < min)
                || max_length.is_some_and(|max| len > max)
            {
                return invalid;
            }
        }
        if own.min_length.is_some_and(|min| {
            base.lookup(|f| f.min_length).is_some_and(|base_min| min < base_min)
                || length.is_some_and(|len| min > len)
        }) {
            return invalid;
        }
        if own.max_length.is_some_and(|max| {
            base.lookup(|f| f.max_length).is_some_and(|base_max| max > base_max)
                || length.is_some_and(|len| max < len)
        }) {
            return invalid;
        }
        if let (Some(min), Some(max)) = (min_length, max_length)
            && min > max
        {
            return invalid;
        }

        // digits
        if own
            .total_digits
            .is_some_and(|total| base.lookup(|f| f.total_digits).is_some_and(|b| total > b))
            || own
                .fraction_digits
                .is_some_and(|frac| base.lookup(|f| f.fraction_digits).is_some_and(|b| frac > b))
        {
            return invalid;
        }
        if let (Some(total), Some(frac)) = (
            self.lookup(|f| f.total_digits),
            self.lookup(|f| f.fraction_digits),
        ) && frac > total
        {
            return invalid;
        }

        // bounds of this step
        if (own.max_inclusive.is_some() && own.max_exclusive.is_some())
            || (own.min_inclusive.is_some() && own.min_exclusive.is_some())
        {
            return invalid;
        }
        let base_max_inc = base.lookup(|f| f.max_inclusive.clone());
        let base_max_exc = base.lookup(|f| f.max_exclusive.clone());
        let base_min_inc = base.lookup(|f| f.min_inclusive.clone());
        let base_min_exc = base.lookup(|f| f.min_exclusive.clone());
        let holds = |value: &Value, bound: &Option<Value>, allowed: &[Comparison]| {
            bound
                .as_ref()
                .is_none_or(|bound| allowed.contains(&value.compare(bound)))
        };
        if let Some(v) = &own.max_inclusive
            && !(holds(v, &base_max_inc, &[Less, Equal])
                && holds(v, &base_max_exc, &[Less])
                && holds(v, &base_min_inc, &[Greater, Equal])
                && holds(v, &base_min_exc, &[Greater]))
        {
            return invalid;
        }
        if let Some(v) = &own.max_exclusive
            && !(holds(v, &base_max_inc, &[Less, Equal])
                && holds(v, &base_max_exc, &[Less, Equal])
                && holds(v, &base_min_inc, &[Greater])
                && holds(v, &base_min_exc, &[Greater]))
        {
            return invalid;
        }
        if let Some(v) = &own.min_inclusive
            && !(holds(v, &base_min_inc, &[Greater, Equal])
                && holds(v, &base_min_exc, &[Greater])
                && holds(v, &base_max_inc, &[Less, Equal])
                && holds(v, &base_max_exc, &[Less]))
        {
            return invalid;
        }
        if let Some(v) = &own.min_exclusive
            && !(holds(v, &base_min_inc, &[Greater, Equal])
                && holds(v, &base_min_exc, &[Greater, Equal])
                && holds(v, &base_max_inc, &[Less])
                && holds(v, &base_max_exc, &[Less]))
        {
            return invalid;
        }
        let min = self
            .lookup(|f| f.min_inclusive.clone())
            .or_else(|| self.lookup(|f| f.min_exclusive.clone()));
        let max = self
            .lookup(|f| f.max_inclusive.clone())
            .or_else(|| self.lookup(|f| f.max_exclusive.clone()));
        if let (Some(min), Some(max)) = (min, max)
            && min.compare(&max) == Greater
        {
            return invalid;
        }
        Ok(())
    }

    /// Derive a list type whose items are `item`.
    pub fn derive_list(
        item: &Arc<DatatypeValidator>,
        name: Option<TypeName>,
        final_set: DerivationSet,
    ) -> Result<Self, XMLError> {
        if item.final_set.contains(DerivationSet::LIST) {
            return Err(XMLError::SchemaFinalDerivation);
        }
        if matches!(item.variety, Variety::List(_)) {
            return Err(XMLError::SchemaInvalidDerivation);
        }
        Ok(Self {
            name,
            variety: Variety::List(item.clone()),
            primitive: Primitive::AnySimpleType,
            rule: LexicalRule::None,
            id_kind: None,
            base: None,
            facets: Facets::default(),
            final_set,
            builtin: false,
        })
    }

    /// Derive a union of `members`.
    pub fn derive_union(
        members: Vec<Arc<DatatypeValidator>>,
        name: Option<TypeName>,
        final_set: DerivationSet,
    ) -> Result<Self, XMLError> {
        if members.is_empty() {
            return Err(XMLError::SchemaInvalidDerivation);
        }
        if members
            .iter()
            .any(|member| member.final_set.contains(DerivationSet::UNION))
        {
            return Err(XMLError::SchemaFinalDerivation);
        }
        Ok(Self {
            name,
            variety: Variety::Union(members),
            primitive: Primitive::AnySimpleType,
            rule: LexicalRule::None,
            id_kind: None,
            base: None,
            facets: Facets::default(),
            final_set,
            builtin: false,
        })
    }

    /// The ID, IDREF or ENTITY values contained in `value` of this type.
    pub fn id_values<'a>(&self, value: &'a Value) -> Vec<(IdKind, &'a str)> {
        match (&self.variety, value) {
            (Variety::Atomic, Value::String(s)) => {
                self.id_kind.map(|kind| vec![(kind, s.as_str())]).unwrap_or_default()
            }
            (Variety::List(item), Value::List(items)) => items
                .iter()
                .flat_map(|value| item.id_values(value))
                .collect(),
            (Variety::Union(members), value) => members
                .iter()
                .map(|member| member.id_values(value))
                .find(|ids| !ids.is_empty())
                .unwrap_or_default(),
            _ => vec![],
        }
    }
}

/// Check the lexical rules of `LexicalRule` on `s`.
fn check_rule(rule: LexicalRule, s: &str) -> Result<(), DatatypeError> {
    let version = XMLVersion::XML10;
    let ok = match rule {
        LexicalRule::None | LexicalRule::Integer => true,
        LexicalRule::Name => version.validate_name(s),
        LexicalRule::NCName => version.validate_ncname(s),
        LexicalRule::NMTOKEN => version.validate_nmtoken(s),
        LexicalRule::Language => {
            let mut subtags = s.split('-');
            subtags.next().is_some_and(|primary| {
                (1..=8).contains(&primary.len()) && primary.bytes().all(|b| b.is_ascii_alphabetic())
            }) && subtags.all(|sub| {
                (1..=8).contains(&sub.len()) && sub.bytes().all(|b| b.is_ascii_alphanumeric())
            })
        }
    };
    ok.then_some(()).ok_or(DatatypeError::InvalidLexicalValue)
}

fn decode_base64(s: &str) -> Option<Vec<u8>> {
    Base64Binary::from_encoded(s.bytes(), true)
        .ok()
        .map(|binary| binary.decode().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::ParserEnvironment;

    fn builtin(name: &str) -> Arc<DatatypeValidator> {
        ParserEnvironment::new().builtin_types().get(name).unwrap()
    }

    fn restrict(base: &str, facets: &[(FacetKind, &str)]) -> Result<DatatypeValidator, XMLError> {
        let facets = facets
            .iter()
            .map(|&(kind, value)| FacetValue::new(kind, value))
            .collect::<Vec<_>>();
        DatatypeValidator::new_instance(
            &builtin(base),
            None,
            &facets,
            DerivationSet::empty(),
            &CategoryTable::new(),
        )
    }

    #[test]
    fn numeric_range_tests() {
        let dv = restrict(
            "integer",
            &[(FacetKind::MinInclusive, "0"), (FacetKind::MaxInclusive, "10")],
        )
        .unwrap();
        assert!(dv.validate("5", &NoContext).is_ok());
        assert_eq!(
            dv.validate("11", &NoContext),
            Err(DatatypeError::FacetViolation(FacetKind::MaxInclusive))
        );
        assert_eq!(
            dv.validate("-1", &NoContext),
            Err(DatatypeError::FacetViolation(FacetKind::MinInclusive))
        );
        assert_eq!(dv.compare("5", "5"), Comparison::Equal);
        assert_eq!(dv.compare("5", "+7"), Comparison::Less);
        assert_eq!(
            dv.validate("5.5", &NoContext),
            Err(DatatypeError::InvalidLexicalValue)
        );
    }

    #[test]
    fn facet_narrowing_tests() {
        let base = Arc::new(restrict("integer", &[(FacetKind::MaxInclusive, "10")]).unwrap());
        let widen = DatatypeValidator::new_instance(
            &base,
            None,
            &[FacetValue::new(FacetKind::MaxInclusive, "20")],
            DerivationSet::empty(),
            &CategoryTable::new(),
        );
        assert!(matches!(widen, Err(XMLError::SchemaInvalidFacet)));
        assert!(matches!(
            restrict("byte", &[(FacetKind::MaxInclusive, "200")]),
            Err(XMLError::SchemaInvalidFacet)
        ));
        assert!(matches!(
            restrict("string", &[(FacetKind::MaxInclusive, "1")]),
            Err(XMLError::SchemaInvalidFacet)
        ));
        assert!(matches!(
            restrict("string", &[(FacetKind::MinLength, "5"), (FacetKind::MaxLength, "2")]),
            Err(XMLError::SchemaInvalidFacet)
        ));
        assert!(matches!(
            restrict("token", &[(FacetKind::WhiteSpace, "preserve")]),
            Err(XMLError::SchemaInvalidFacet)
        ));
    }

    #[test]
    fn final_derivation_tests() {
        let base = Arc::new(
            DatatypeValidator::new_instance(
                &builtin("string"),
                None,
                &[],
                DerivationSet::RESTRICTION,
                &CategoryTable::new(),
            )
            .unwrap(),
        );
        let derived = DatatypeValidator::new_instance(
            &base,
            None,
            &[],
            DerivationSet::empty(),
            &CategoryTable::new(),
        );
        assert!(matches!(derived, Err(XMLError::SchemaFinalDerivation)));
        assert!(DatatypeValidator::derive_list(&base, None, DerivationSet::empty()).is_ok());
    }

    #[test]
    fn string_facet_tests() {
        let dv = restrict(
            "string",
            &[
                (FacetKind::Pattern, "[a-z]+"),
                (FacetKind::MaxLength, "4"),
                (FacetKind::Enumeration, "ab"),
                (FacetKind::Enumeration, "abcde"),
            ],
        )
        .unwrap();
        assert!(dv.validate("ab", &NoContext).is_ok());
        assert_eq!(
            dv.validate("ab1", &NoContext),
            Err(DatatypeError::FacetViolation(FacetKind::Pattern))
        );
        assert_eq!(
            dv.validate("abc", &NoContext),
            Err(DatatypeError::FacetViolation(FacetKind::Enumeration))
        );
        assert_eq!(
            dv.validate("abcde", &NoContext),
            Err(DatatypeError::FacetViolation(FacetKind::MaxLength))
        );
    }

    #[test]
    fn list_and_union_tests() {
        let list = Arc::new(
            DatatypeValidator::derive_list(&builtin("int"), None, DerivationSet::empty()).unwrap(),
        );
        assert!(list.validate(" 1  2\n3 ", &NoContext).is_ok());
        assert!(list.validate("1 x", &NoContext).is_err());
        assert_eq!(list.canonical(" +1  02 ").unwrap(), "1 2");
        let short = DatatypeValidator::new_instance(
            &list,
            None,
            &[FacetValue::new(FacetKind::MaxLength, "2")],
            DerivationSet::empty(),
            &CategoryTable::new(),
        )
        .unwrap();
        assert_eq!(
            short.validate("1 2 3", &NoContext),
            Err(DatatypeError::FacetViolation(FacetKind::MaxLength))
        );

        let union = DatatypeValidator::derive_union(
            vec![builtin("boolean"), builtin("decimal")],
            None,
            DerivationSet::empty(),
        )
        .unwrap();
        assert!(union.validate("true", &NoContext).is_ok());
        assert!(union.validate("1.5", &NoContext).is_ok());
        assert_eq!(
            union.validate("x", &NoContext),
            Err(DatatypeError::NoMatchingMemberType)
        );
    }

    #[test]
    fn canonical_tests() {
        assert_eq!(builtin("decimal").canonical("+01.50").unwrap(), "1.5");
        assert_eq!(builtin("decimal").canonical("3").unwrap(), "3.0");
        assert_eq!(builtin("integer").canonical(" 007 ").unwrap(), "7");
        assert_eq!(builtin("boolean").canonical("1").unwrap(), "true");
        assert_eq!(builtin("double").canonical("100").unwrap(), "1.0E2");
        assert_eq!(builtin("hexBinary").canonical("0aff").unwrap(), "0AFF");
        assert_eq!(builtin("token").canonical("  a   b ").unwrap(), "a b");
        // facets are not checked
        assert_eq!(builtin("byte").canonical("1000").unwrap(), "1000");
    }

    #[test]
    fn nan_comparison_tests() {
        let double = builtin("double");
        assert_eq!(double.compare("NaN", "1"), Comparison::Indeterminate);
        assert_eq!(double.compare("INF", "1E308"), Comparison::Greater);
        assert_eq!(double.compare("x", "1"), Comparison::Indeterminate);
        assert!(double.validate("1e", &NoContext).is_err());
        assert!(double.validate("inf", &NoContext).is_err());
    }
}
