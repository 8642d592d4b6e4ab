use std::sync::Arc;

use strictxml_base64::Base64Binary;

use crate::{
    FastHashMap, XML_SCHEMA_NAMESPACE, XMLVersion, split_qname,
    util::{WhiteSpace, decode_hex, encode_hex},
};

use super::{
    DatatypeError, DatatypeValidator, Decimal, DerivationSet, FacetKind, Facets, IdKind,
    LexicalRule, Primitive, TypeName, ValidationContext, Value, Variety, check_rule,
    decode_base64,
};

pub(super) fn builtin_name(name: &str) -> TypeName {
    TypeName::new(Some(XML_SCHEMA_NAMESPACE), name)
}

/// Parse a whitespace-normalized lexical value of an atomic type.
pub(super) fn parse_atomic(
    primitive: Primitive,
    rule: LexicalRule,
    id_kind: Option<IdKind>,
    s: &str,
    ctx: &dyn ValidationContext,
) -> Result<Value, DatatypeError> {
    let invalid = DatatypeError::InvalidLexicalValue;
    match primitive {
        Primitive::AnyURI => {
            strictxml_uri::URIString::parse_system_id(s).map_err(|_| invalid)?;
            Ok(Value::String(s.to_owned()))
        }
        Primitive::AnySimpleType | Primitive::String => {
            check_rule(rule, s)?;
            if id_kind == Some(IdKind::ENTITY) && !ctx.is_unparsed_entity(s) {
                return Err(DatatypeError::UndeclaredEntity);
            }
            Ok(Value::String(s.to_owned()))
        }
        Primitive::Boolean => match s {
            "true" | "1" => Ok(Value::Boolean(true)),
            "false" | "0" => Ok(Value::Boolean(false)),
            _ => Err(invalid),
        },
        Primitive::Decimal => {
            let decimal = if rule == LexicalRule::Integer {
                Decimal::parse_integer(s)
            } else {
                s.parse()
            };
            decimal.map(Value::Decimal).map_err(|_| invalid)
        }
        Primitive::Float => parse_double(s)
            .map(|d| Value::Double(d as f32 as f64))
            .ok_or(invalid),
        Primitive::Double => parse_double(s).map(Value::Double).ok_or(invalid),
        Primitive::QName | Primitive::NOTATION => {
            if !XMLVersion::XML10.validate_qname(s) {
                return Err(invalid);
            }
            let (prefix, local_name) = split_qname(s);
            let uri = ctx.namespace_of(prefix);
            if uri.is_none() && prefix.is_some() && ctx.checks_prefixes() {
                return Err(DatatypeError::UndeclaredPrefix);
            }
            Ok(Value::QName {
                uri,
                local_name: local_name.to_owned(),
            })
        }
        Primitive::Base64Binary => decode_base64(s).map(Value::Binary).ok_or(invalid),
        Primitive::HexBinary => decode_hex(s).map(Value::Binary).ok_or(invalid),
    }
}

/// ```text
/// (\+|-)?([0-9]+(\.[0-9]*)?|\.[0-9]+)([Ee](\+|-)?[0-9]+)? | -?INF | NaN
/// ```
fn parse_double(s: &str) -> Option<f64> {
    match s {
        "INF" => return Some(f64::INFINITY),
        "-INF" => return Some(f64::NEG_INFINITY),
        "NaN" => return Some(f64::NAN),
        _ => {}
    }
    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(pos) => (&s[..pos], Some(&s[pos + 1..])),
        None => (s, None),
    };
    mantissa.parse::<Decimal>().ok()?;
    if let Some(exponent) = exponent {
        let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    s.parse().ok()
}

fn format_double(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "INF" } else { "-INF" }.to_owned();
    }
    let formatted = format!("{value:E}");
    match formatted.split_once('E') {
        Some((mantissa, exponent)) if !mantissa.contains('.') => {
            format!("{mantissa}.0E{exponent}")
        }
        _ => formatted,
    }
}

/// The canonical form of `value`, parsed from `normalized`.
pub(super) fn canonical(
    primitive: Primitive,
    rule: LexicalRule,
    normalized: &str,
    value: &Value,
) -> String {
    match (primitive, value) {
        (_, Value::Boolean(b)) => b.to_string(),
        (_, Value::Decimal(d)) if rule == LexicalRule::Integer => d.to_canonical_integer(),
        (_, Value::Decimal(d)) => d.to_canonical_decimal(),
        (_, Value::Double(d)) => format_double(*d),
        (Primitive::HexBinary, Value::Binary(b)) => encode_hex(b),
        (_, Value::Binary(b)) => Base64Binary::encode(b.iter().copied()).to_string(),
        _ => normalized.to_owned(),
    }
}

fn decimal(s: &str) -> Value {
    Value::Decimal(s.parse().unwrap_or_default())
}

/// The table of built-in simple types, keyed by local name.
#[derive(Debug)]
pub struct BuiltinTypes {
    types: FastHashMap<&'static str, Arc<DatatypeValidator>>,
}

impl BuiltinTypes {
    pub fn new() -> Self {
        let mut types = FastHashMap::default();
        let mut put = |name: &'static str, dv: DatatypeValidator| {
            let dv = Arc::new(dv);
            types.insert(name, dv.clone());
            dv
        };

        put(
            "anySimpleType",
            DatatypeValidator::builtin_atomic("anySimpleType", Primitive::AnySimpleType),
        );
        let string = put(
            "string",
            DatatypeValidator::builtin_atomic("string", Primitive::String),
        );
        for (name, primitive) in [
            ("boolean", Primitive::Boolean),
            ("float", Primitive::Float),
            ("double", Primitive::Double),
            ("anyURI", Primitive::AnyURI),
            ("QName", Primitive::QName),
            ("NOTATION", Primitive::NOTATION),
            ("base64Binary", Primitive::Base64Binary),
            ("hexBinary", Primitive::HexBinary),
        ] {
            put(name, DatatypeValidator::builtin_atomic(name, primitive));
        }
        let decimal_type = put(
            "decimal",
            DatatypeValidator::builtin_atomic("decimal", Primitive::Decimal),
        );

        let normalized = put(
            "normalizedString",
            derive(&string, "normalizedString", LexicalRule::None, None, Facets {
                white_space: Some(WhiteSpace::Replace),
                ..Default::default()
            }),
        );
        let token = put(
            "token",
            derive(&normalized, "token", LexicalRule::None, None, Facets {
                white_space: Some(WhiteSpace::Collapse),
                ..Default::default()
            }),
        );
        put(
            "language",
            derive(&token, "language", LexicalRule::Language, None, Facets::default()),
        );
        let nmtoken = put(
            "NMTOKEN",
            derive(&token, "NMTOKEN", LexicalRule::NMTOKEN, None, Facets::default()),
        );
        let name = put(
            "Name",
            derive(&token, "Name", LexicalRule::Name, None, Facets::default()),
        );
        let ncname = put(
            "NCName",
            derive(&name, "NCName", LexicalRule::NCName, None, Facets::default()),
        );
        put(
            "ID",
            derive(&ncname, "ID", LexicalRule::NCName, Some(IdKind::ID), Facets::default()),
        );
        let idref = put(
            "IDREF",
            derive(&ncname, "IDREF", LexicalRule::NCName, Some(IdKind::IDREF), Facets::default()),
        );
        let entity = put(
            "ENTITY",
            derive(&ncname, "ENTITY", LexicalRule::NCName, Some(IdKind::ENTITY), Facets::default()),
        );
        put("NMTOKENS", builtin_list("NMTOKENS", &nmtoken));
        put("IDREFS", builtin_list("IDREFS", &idref));
        put("ENTITIES", builtin_list("ENTITIES", &entity));

        let integer = put(
            "integer",
            derive(&decimal_type, "integer", LexicalRule::Integer, None, Facets {
                fraction_digits: Some(0),
                fixed: FacetKind::FractionDigits.bit(),
                ..Default::default()
            }),
        );
        let bounded = |base: &Arc<DatatypeValidator>, name, min: Option<&str>, max: Option<&str>| {
            derive(base, name, LexicalRule::Integer, None, Facets {
                min_inclusive: min.map(decimal),
                max_inclusive: max.map(decimal),
                ..Default::default()
            })
        };
        let non_positive = put(
            "nonPositiveInteger",
            bounded(&integer, "nonPositiveInteger", None, Some("0")),
        );
        put(
            "negativeInteger",
            bounded(&non_positive, "negativeInteger", None, Some("-1")),
        );
        let long = put(
            "long",
            bounded(&integer, "long", Some("-9223372036854775808"), Some("9223372036854775807")),
        );
        let int = put(
            "int",
            bounded(&long, "int", Some("-2147483648"), Some("2147483647")),
        );
        let short = put("short", bounded(&int, "short", Some("-32768"), Some("32767")));
        put("byte", bounded(&short, "byte", Some("-128"), Some("127")));
        let non_negative = put(
            "nonNegativeInteger",
            bounded(&integer, "nonNegativeInteger", Some("0"), None),
        );
        put(
            "positiveInteger",
            bounded(&non_negative, "positiveInteger", Some("1"), None),
        );
        let unsigned_long = put(
            "unsignedLong",
            bounded(&non_negative, "unsignedLong", None, Some("18446744073709551615")),
        );
        let unsigned_int = put(
            "unsignedInt",
            bounded(&unsigned_long, "unsignedInt", None, Some("4294967295")),
        );
        let unsigned_short = put(
            "unsignedShort",
            bounded(&unsigned_int, "unsignedShort", None, Some("65535")),
        );
        put(
            "unsignedByte",
            bounded(&unsigned_short, "unsignedByte", None, Some("255")),
        );

        Self { types }
    }

    pub fn get(&self, name: &str) -> Option<Arc<DatatypeValidator>> {
        self.types.get(name).cloned()
    }

    pub fn any_simple_type(&self) -> Option<Arc<DatatypeValidator>> {
        self.get("anySimpleType")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Arc<DatatypeValidator>)> {
        self.types.iter().map(|(&name, dv)| (name, dv))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for BuiltinTypes {
    fn default() -> Self {
        Self::new()
    }
}

fn derive(
    base: &Arc<DatatypeValidator>,
    name: &str,
    rule: LexicalRule,
    id_kind: Option<IdKind>,
    facets: Facets,
) -> DatatypeValidator {
    DatatypeValidator {
        name: Some(builtin_name(name)),
        variety: Variety::Atomic,
        primitive: base.primitive,
        rule,
        id_kind,
        base: Some(base.clone()),
        facets,
        final_set: DerivationSet::empty(),
        builtin: true,
    }
}

fn builtin_list(name: &str, item: &Arc<DatatypeValidator>) -> DatatypeValidator {
    DatatypeValidator {
        name: Some(builtin_name(name)),
        variety: Variety::List(item.clone()),
        primitive: Primitive::AnySimpleType,
        rule: LexicalRule::None,
        id_kind: None,
        base: None,
        facets: Facets {
            min_length: Some(1),
            ..Default::default()
        },
        final_set: DerivationSet::empty(),
        builtin: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::NoContext;

    struct Scope;

    impl ValidationContext for Scope {
        fn namespace_of(&self, prefix: Option<&str>) -> Option<String> {
            match prefix {
                Some("p") => Some("urn:p".to_owned()),
                _ => None,
            }
        }

        fn checks_prefixes(&self) -> bool {
            true
        }

        fn is_unparsed_entity(&self, name: &str) -> bool {
            name == "pic"
        }
    }

    #[test]
    fn builtin_table_tests() {
        let table = BuiltinTypes::new();
        assert_eq!(table.len(), 36);
        let byte = table.get("byte").unwrap();
        let integer = table.get("integer").unwrap();
        assert!(byte.is_derived_from(&integer));
        assert!(!integer.is_derived_from(&byte));
        assert!(byte.validate("-128", &NoContext).is_ok());
        assert!(byte.validate("128", &NoContext).is_err());
        assert!(table.get("unsignedLong").unwrap().validate("18446744073709551615", &NoContext).is_ok());
        assert!(table.get("positiveInteger").unwrap().validate("0", &NoContext).is_err());
    }

    #[test]
    fn string_family_tests() {
        let table = BuiltinTypes::new();
        assert!(table.get("language").unwrap().validate("en-US", &NoContext).is_ok());
        assert!(table.get("language").unwrap().validate("toolongprimary-x", &NoContext).is_err());
        assert!(table.get("NCName").unwrap().validate("a:b", &NoContext).is_err());
        assert!(table.get("Name").unwrap().validate("a:b", &NoContext).is_ok());
        assert!(table.get("NMTOKENS").unwrap().validate("", &NoContext).is_err());
        assert!(table.get("ID").unwrap().validate("  id1 ", &NoContext).is_ok());
        assert_eq!(
            table.get("ENTITY").unwrap().validate("other", &Scope),
            Err(DatatypeError::UndeclaredEntity)
        );
        assert!(table.get("ENTITIES").unwrap().validate("pic pic", &Scope).is_ok());
    }

    #[test]
    fn any_uri_tests() {
        let table = BuiltinTypes::new();
        let any_uri = table.get("anyURI").unwrap();
        for valid in [
            "http://example.com/a b",
            "urn:isbn:0451450523",
            "../doc.xml#frag",
            "",
            "caf\u{E9}.xml",
        ] {
            assert!(any_uri.validate(valid, &NoContext).is_ok(), "{valid}");
        }
        for invalid in ["#a#b", "%X1", "http://[1::2::3]/", ":abc"] {
            assert_eq!(
                any_uri.validate(invalid, &NoContext),
                Err(DatatypeError::InvalidLexicalValue),
                "{invalid}"
            );
        }
    }

    #[test]
    fn qname_tests() {
        let qname = BuiltinTypes::new().get("QName").unwrap();
        assert_eq!(
            qname.validate_value("p:a", &Scope).unwrap(),
            Value::QName {
                uri: Some("urn:p".to_owned()),
                local_name: "a".to_owned()
            }
        );
        assert_eq!(
            qname.validate("q:a", &Scope),
            Err(DatatypeError::UndeclaredPrefix)
        );
        assert!(qname.validate("q:a", &NoContext).is_ok());
    }

    #[test]
    fn binary_tests() {
        let table = BuiltinTypes::new();
        let hex = table.get("hexBinary").unwrap();
        let b64 = table.get("base64Binary").unwrap();
        assert!(hex.validate("0FB7", &NoContext).is_ok());
        assert!(hex.validate("0FB", &NoContext).is_err());
        assert_eq!(
            b64.validate_value("SGVs bG8=", &NoContext).unwrap(),
            Value::Binary(b"Hello".to_vec())
        );
        assert!(b64.validate("SGVsbG8", &NoContext).is_err());
    }

    #[test]
    fn double_format_tests() {
        assert_eq!(format_double(0.0), "0.0E0");
        assert_eq!(format_double(-1.5e-3), "-1.5E-3");
        assert_eq!(format_double(f64::NEG_INFINITY), "-INF");
        assert_eq!(parse_double(".5e+2"), Some(50.0));
        assert_eq!(parse_double("1.e1"), Some(10.0));
        assert_eq!(parse_double("infinity"), None);
        assert_eq!(parse_double("1e"), None);
    }
}
