//! Small text utilities shared by the scanner and the datatype validators.

use std::borrow::Cow;

use strictxml_uri::URIString;

/// Iterate over the whitespace-separated tokens of a string.
///
/// Only the XML whitespace characters (`#x20 | #x9 | #xD | #xA`) separate tokens.
#[derive(Debug, Clone)]
pub struct StringTokenizer<'a> {
    rest: &'a str,
}

impl<'a> StringTokenizer<'a> {
    pub fn new(s: &'a str) -> Self {
        Self { rest: s }
    }

    pub fn count_tokens(&self) -> usize {
        self.clone().count()
    }

    pub fn has_more_tokens(&self) -> bool {
        self.rest.bytes().any(|b| !is_xml_whitespace(b))
    }
}

impl<'a> Iterator for StringTokenizer<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.rest.find(|c: char| !is_xml_whitespace_char(c))?;
        let rest = &self.rest[start..];
        let end = rest.find(is_xml_whitespace_char).unwrap_or(rest.len());
        self.rest = &rest[end..];
        Some(&rest[..end])
    }
}

fn is_xml_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn is_xml_whitespace_char(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// The value of the `whiteSpace` facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum WhiteSpace {
    #[default]
    Preserve,
    /// Replace each whitespace with `#x20`.
    Replace,
    /// `Replace`, then collapse runs of `#x20` and strip both ends.
    Collapse,
}

impl WhiteSpace {
    pub fn normalize<'a>(&self, s: &'a str) -> Cow<'a, str> {
        match self {
            Self::Preserve => Cow::Borrowed(s),
            Self::Replace => {
                if s.contains(['\t', '\r', '\n']) {
                    Cow::Owned(s.replace(['\t', '\r', '\n'], " "))
                } else {
                    Cow::Borrowed(s)
                }
            }
            Self::Collapse => collapse_whitespace(s),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "preserve" => Some(Self::Preserve),
            "replace" => Some(Self::Replace),
            "collapse" => Some(Self::Collapse),
            _ => None,
        }
    }
}

/// Trim leading and trailing whitespace and replace inner runs with a single `#x20`.
///
/// This is also the normalization applied to non-CDATA attribute values.
pub fn collapse_whitespace(s: &str) -> Cow<'_, str> {
    let trimmed = s.trim_matches(is_xml_whitespace_char);
    let needs_work = trimmed.len() != s.len()
        || trimmed.contains(['\t', '\r', '\n'])
        || trimmed.contains("  ");
    if !needs_work {
        return Cow::Borrowed(s);
    }
    let mut ret = String::with_capacity(trimmed.len());
    for token in StringTokenizer::new(trimmed) {
        if !ret.is_empty() {
            ret.push(' ');
        }
        ret.push_str(token);
    }
    Cow::Owned(ret)
}

/// Decode the lexical form of `hexBinary`.
///
/// Returns `None` if `s` has an odd length or contains a non-hex digit.
pub fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    s.as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let high = (pair[0] as char).to_digit(16)?;
            let low = (pair[1] as char).to_digit(16)?;
            Some((high * 16 + low) as u8)
        })
        .collect()
}

/// Encode octets as the canonical (upper case) `hexBinary` form.
pub fn encode_hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut ret = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        ret.push(DIGITS[(b >> 4) as usize] as char);
        ret.push(DIGITS[(b & 0xF) as usize] as char);
    }
    ret
}

/// Resolve `system_id` against the system identifier of the entity it appears in.
///
/// Both are URI references, escaped as XML system identifiers are. A base without a
/// scheme is a local path. Results that name a local file are returned as paths, other
/// results as escaped URIs. A `system_id` that is not a URI reference is returned as is.
pub fn resolve_system_id(base: Option<&str>, system_id: &str) -> String {
    let Ok(mut reference) = URIString::parse_system_id(system_id) else {
        return system_id.to_owned();
    };
    let base = base.and_then(|base| {
        URIString::parse_system_id(base)
            .ok()
            // 'C:' is a drive letter
            .filter(|uri| uri.scheme().is_some_and(|scheme| scheme.len() > 1))
            .or_else(|| URIString::parse_file_path(base).ok())
    });
    let resolved = match base {
        Some(base) => base.resolve(&reference),
        None => {
            reference.normalize();
            reference
        }
    };
    match resolved.to_file_path() {
        Some(path) => path.to_string_lossy().into_owned(),
        None => resolved.as_escaped_str().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_tests() {
        let tokens = StringTokenizer::new("  a\tbb \n ccc ").collect::<Vec<_>>();
        assert_eq!(tokens, ["a", "bb", "ccc"]);
        assert_eq!(StringTokenizer::new("   ").count_tokens(), 0);
        assert!(!StringTokenizer::new(" \r\n").has_more_tokens());
        assert_eq!(StringTokenizer::new("x").count_tokens(), 1);
    }

    #[test]
    fn whitespace_facet_tests() {
        assert_eq!(WhiteSpace::Preserve.normalize(" a\tb "), " a\tb ");
        assert_eq!(WhiteSpace::Replace.normalize(" a\tb\n"), " a b ");
        assert_eq!(WhiteSpace::Collapse.normalize("  a \t\n b  "), "a b");
        assert!(matches!(
            WhiteSpace::Collapse.normalize("a b"),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn hex_tests() {
        assert_eq!(decode_hex("0aFF"), Some(vec![0x0A, 0xFF]));
        assert_eq!(decode_hex("0"), None);
        assert_eq!(decode_hex("zz"), None);
        assert_eq!(encode_hex(&[0x0A, 0xFF]), "0AFF");
    }

    #[test]
    fn resolve_system_id_tests() {
        assert_eq!(resolve_system_id(Some("dir/doc.xml"), "doc.dtd"), "dir/doc.dtd");
        assert_eq!(resolve_system_id(Some("doc.xml"), "doc.dtd"), "doc.dtd");
        assert_eq!(resolve_system_id(None, "doc.dtd"), "doc.dtd");
        assert_eq!(resolve_system_id(None, "./a/../doc.dtd"), "doc.dtd");
        assert_eq!(resolve_system_id(Some("dir/doc.xml"), "/abs/doc.dtd"), "/abs/doc.dtd");
        assert_eq!(
            resolve_system_id(Some("file:///dir/doc.xml"), "a/b.ent"),
            "/dir/a/b.ent"
        );
        assert_eq!(
            resolve_system_id(Some("dir/sub/doc.xml"), "../a.dtd"),
            "dir/a.dtd"
        );
        assert_eq!(resolve_system_id(Some("dir/doc.xml"), "./a.dtd"), "dir/a.dtd");
        assert_eq!(resolve_system_id(Some("doc.xml"), "../a.dtd"), "../a.dtd");
        assert_eq!(
            resolve_system_id(Some("dir/doc.xml"), "my%20file.dtd"),
            "dir/my file.dtd"
        );
        assert_eq!(
            resolve_system_id(Some("dir/doc.xml"), "my file.dtd"),
            "dir/my file.dtd"
        );
        assert_eq!(
            resolve_system_id(Some("/tmp/100% sure/doc.xml"), "a.dtd"),
            "/tmp/100% sure/a.dtd"
        );
        assert_eq!(
            resolve_system_id(Some("dir/doc.xml"), "file:///etc/z.dtd"),
            "/etc/z.dtd"
        );
        assert_eq!(
            resolve_system_id(Some("http://example.com/xml/doc.xml"), "../dtd/doc.dtd"),
            "http://example.com/dtd/doc.dtd"
        );
        assert_eq!(
            resolve_system_id(Some("dir/doc.xml"), "http://example.com/a b.dtd"),
            "http://example.com/a%20b.dtd"
        );
        // not a URI reference
        assert_eq!(resolve_system_id(Some("dir/doc.xml"), "a%zz.dtd"), "a%zz.dtd");
    }
}
