//! The XPath subset used by `xs:selector` and `xs:field`.
//!
//! ```text
//! Selector ::= Path ( '|' Path )*
//! Path     ::= ('.//')? Step ( '/' Step )*
//! Field    ::= Path ( '|' Path )*
//! Path     ::= ('.//')? ( Step '/' )* ( Step | '@' NameTest )
//! Step     ::= '.' | NameTest
//! NameTest ::= QName | '*' | NCName ':' '*'
//! ```
//!
//! `child::` and `attribute::` may be written in place of the abbreviated axes.

use std::sync::Arc;

use crate::{XMLVersion, error::XMLError, validation::content_model::ElementName};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameTest {
    /// `*`
    Any,
    /// `prefix:*`
    Namespace(Option<Arc<str>>),
    Name(ElementName),
}

impl NameTest {
    pub fn matches(&self, name: &ElementName) -> bool {
        match self {
            Self::Any => true,
            Self::Namespace(ns) => ns.as_deref() == name.namespace(),
            Self::Name(expected) => expected == name,
        }
    }
}

/// One alternative of a selector or field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationPath {
    /// The path starts with `.//`.
    pub descendant: bool,
    /// Child steps. `.` steps are dropped while parsing.
    pub steps: Vec<NameTest>,
    /// The final attribute step of a field.
    pub attribute: Option<NameTest>,
}

impl LocationPath {
    /// Check if the element reached by `relative` (the names of the elements below the
    /// context node, outermost first) is selected by the child steps of this path.
    pub fn matches_element(&self, relative: &[ElementName]) -> bool {
        if self.descendant {
            // `.//` is `descendant-or-self::node()/`
            if relative.len() < self.steps.len() {
                return false;
            }
            let start = relative.len() - self.steps.len();
            self.steps
                .iter()
                .zip(&relative[start..])
                .all(|(test, name)| test.matches(name))
        } else {
            relative.len() == self.steps.len()
                && self
                    .steps
                    .iter()
                    .zip(relative)
                    .all(|(test, name)| test.matches(name))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XPath {
    expression: Box<str>,
    paths: Vec<LocationPath>,
}

impl XPath {
    /// Parse the `xpath` attribute of `xs:selector`.
    ///
    /// `resolve` maps a prefix to its namespace name.
    pub fn parse_selector(
        expression: &str,
        resolve: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, XMLError> {
        Self::parse(expression, false, resolve)
    }

    /// Parse the `xpath` attribute of `xs:field`.
    pub fn parse_field(
        expression: &str,
        resolve: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, XMLError> {
        Self::parse(expression, true, resolve)
    }

    fn parse(
        expression: &str,
        is_field: bool,
        resolve: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, XMLError> {
        let mut xpath = expression;
        let mut paths = vec![parse_path(&mut xpath, is_field, resolve)?];
        skip_whitespaces(&mut xpath);
        while let Some(rem) = xpath.strip_prefix('|') {
            xpath = rem;
            paths.push(parse_path(&mut xpath, is_field, resolve)?);
            skip_whitespaces(&mut xpath);
        }
        if !xpath.is_empty() {
            return Err(XMLError::SchemaInvalidXPath);
        }
        Ok(Self {
            expression: expression.into(),
            paths,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn paths(&self) -> &[LocationPath] {
        &self.paths
    }

    /// Check if some alternative selects the element reached by `relative`.
    pub fn selects(&self, relative: &[ElementName]) -> bool {
        self.paths
            .iter()
            .any(|path| path.attribute.is_none() && path.matches_element(relative))
    }
}

impl std::fmt::Display for XPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expression)
    }
}

fn skip_whitespaces(xpath: &mut &str) {
    *xpath = xpath.trim_start_matches(|c| XMLVersion::default().is_whitespace(c));
}

/// ```text
/// Path ::= ('.//')? Step ( '/' Step )* ( '/' '@' NameTest )?
/// ```
fn parse_path(
    xpath: &mut &str,
    is_field: bool,
    resolve: &dyn Fn(&str) -> Option<String>,
) -> Result<LocationPath, XMLError> {
    skip_whitespaces(xpath);
    let mut path = LocationPath {
        descendant: false,
        steps: vec![],
        attribute: None,
    };
    if let Some(rem) = xpath.strip_prefix(".//") {
        *xpath = rem;
        path.descendant = true;
    }

    loop {
        skip_whitespaces(xpath);
        if let Some(rem) = xpath
            .strip_prefix('@')
            .or_else(|| xpath.strip_prefix("attribute::"))
        {
            if !is_field {
                return Err(XMLError::SchemaInvalidXPath);
            }
            *xpath = rem;
            path.attribute = Some(parse_name_test(xpath, resolve)?);
            return Ok(path);
        }
        if let Some(rem) = xpath.strip_prefix('.') {
            if rem.starts_with('.') {
                // `..` is not allowed
                return Err(XMLError::SchemaInvalidXPath);
            }
            *xpath = rem;
        } else {
            if let Some(rem) = xpath.strip_prefix("child::") {
                *xpath = rem;
            }
            path.steps.push(parse_name_test(xpath, resolve)?);
        }

        skip_whitespaces(xpath);
        match xpath.strip_prefix('/') {
            Some(rem) if !rem.starts_with('/') => *xpath = rem,
            Some(_) => return Err(XMLError::SchemaInvalidXPath),
            None => return Ok(path),
        }
    }
}

/// ```text
/// NameTest ::= QName | '*' | NCName ':' '*'
/// ```
fn parse_name_test(
    xpath: &mut &str,
    resolve: &dyn Fn(&str) -> Option<String>,
) -> Result<NameTest, XMLError> {
    skip_whitespaces(xpath);
    if let Some(rem) = xpath.strip_prefix('*') {
        *xpath = rem;
        return Ok(NameTest::Any);
    }

    let prefix = parse_ncname(xpath).ok_or(XMLError::SchemaInvalidXPath)?;
    let Some(rem) = xpath.strip_prefix(':') else {
        return Ok(NameTest::Name(ElementName::new(None, prefix)));
    };
    *xpath = rem;
    let namespace = resolve(prefix).ok_or(XMLError::SchemaInvalidXPath)?;
    if let Some(rem) = xpath.strip_prefix('*') {
        *xpath = rem;
        return Ok(NameTest::Namespace(
            Some(namespace.as_str())
                .filter(|ns| !ns.is_empty())
                .map(Arc::from),
        ));
    }
    let local_name = parse_ncname(xpath).ok_or(XMLError::SchemaInvalidXPath)?;
    Ok(NameTest::Name(ElementName::new(Some(&namespace), local_name)))
}

fn parse_ncname<'a>(xpath: &mut &'a str) -> Option<&'a str> {
    let version = XMLVersion::default();
    let len = xpath
        .char_indices()
        .find(|&(i, c)| {
            c == ':'
                || (i == 0 && !version.is_name_start_char(c))
                || !version.is_name_char(c)
        })
        .map_or(xpath.len(), |(i, _)| i);
    if len == 0 {
        return None;
    }
    let (name, rem) = xpath.split_at(len);
    *xpath = rem;
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(prefix: &str) -> Option<String> {
        (prefix == "t").then(|| "urn:t".to_owned())
    }

    fn names(locals: &[&str]) -> Vec<ElementName> {
        locals.iter().map(|local| ElementName::new(None, local)).collect()
    }

    #[test]
    fn selector_tests() {
        let xpath = XPath::parse_selector("item | .//group/entry", &resolve).unwrap();
        assert_eq!(xpath.paths().len(), 2);
        assert!(xpath.selects(&names(&["item"])));
        assert!(!xpath.selects(&names(&["a", "item"])));
        assert!(xpath.selects(&names(&["group", "entry"])));
        assert!(xpath.selects(&names(&["x", "y", "group", "entry"])));
        assert!(!xpath.selects(&names(&["entry"])));

        let xpath = XPath::parse_selector("./t:item/*", &resolve).unwrap();
        let relative = vec![
            ElementName::new(Some("urn:t"), "item"),
            ElementName::new(None, "any"),
        ];
        assert!(xpath.selects(&relative));
        assert!(!xpath.selects(&names(&["item", "any"])));

        let xpath = XPath::parse_selector(".", &resolve).unwrap();
        assert!(xpath.selects(&[]));
    }

    #[test]
    fn field_tests() {
        let xpath = XPath::parse_field("@id", &resolve).unwrap();
        assert_eq!(
            xpath.paths()[0].attribute,
            Some(NameTest::Name(ElementName::new(None, "id")))
        );
        let xpath = XPath::parse_field("child::code/attribute::t:*", &resolve).unwrap();
        assert_eq!(xpath.paths()[0].steps.len(), 1);
        assert_eq!(
            xpath.paths()[0].attribute,
            Some(NameTest::Namespace(Some("urn:t".into())))
        );
    }

    #[test]
    fn invalid_expression_tests() {
        for expression in ["", "../a", "a//b", "@id", "u:a", "a[1]", "/a", "a |"] {
            assert!(
                matches!(
                    XPath::parse_selector(expression, &resolve),
                    Err(XMLError::SchemaInvalidXPath)
                ),
                "{expression}"
            );
        }
        assert!(XPath::parse_field("@id/a", &resolve).is_err());
    }
}
