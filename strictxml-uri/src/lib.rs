//! URI references as used by XML processors: system identifiers of external entities,
//! schema locations and values of `xs:anyURI`.
//!
//! [`URIString`] keeps the escaped form of a reference that conforms to
//! [RFC 3986](https://datatracker.ietf.org/doc/html/rfc3986). References read from XML
//! are escaped as required by
//! [XML 1.0 4.2.2 External Entities](https://www.w3.org/TR/xml/#sec-external-ent)
//! before they are checked.

pub mod uri;

pub use uri::{URIString, escape_except, unescape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseRIError {
    InvalidAuthority,
    InvalidIPLiteral,
    InvalidPort,
    InvalidPChar,
    InvalidPctEncoded,
    /// A relative reference whose first path segment contains `':'`.
    ColonInFirstSegment,
    InvalidQuery,
    InvalidFragment,
    /// Unescaped octets are not UTF-8.
    InvalidUTF8,
    Unsupported,
}

impl std::fmt::Display for ParseRIError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for ParseRIError {}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    /// [3.  Syntax Components](https://datatracker.ietf.org/doc/html/rfc3986#section-3)
    #[test]
    fn uri_component_tests() {
        let uri = URIString::parse_system_id("foo://user@example.com:8042/over/there?name=ferret#nose")
            .unwrap();
        assert_eq!(uri.scheme(), Some("foo"));
        assert_eq!(uri.authority(), Some("user@example.com:8042"));
        assert_eq!(uri.host(), Some("example.com"));
        assert_eq!(uri.port(), Some("8042"));
        assert_eq!(uri.path(), "/over/there");
        assert_eq!(uri.query(), Some("name=ferret"));
        assert_eq!(uri.fragment(), Some("nose"));
        assert!(!uri.is_absolute());

        let uri = URIString::parse_system_id("ldap://[2001:db8::7]/c=GB?objectClass?one").unwrap();
        assert_eq!(uri.host(), Some("[2001:db8::7]"));
        assert_eq!(uri.port(), None);
        assert_eq!(uri.query(), Some("objectClass?one"));
        assert!(uri.is_absolute());

        let uri = URIString::parse_system_id("urn:oasis:names:specification:docbook:dtd:xml:4.1.2")
            .unwrap();
        assert_eq!(uri.scheme(), Some("urn"));
        assert_eq!(uri.authority(), None);
        assert_eq!(uri.path(), "oasis:names:specification:docbook:dtd:xml:4.1.2");

        let uri = URIString::parse_system_id("../dtd/doc.dtd").unwrap();
        assert_eq!(uri.scheme(), None);
        assert_eq!(uri.path(), "../dtd/doc.dtd");
        assert!(uri.is_relative());

        let uri = URIString::parse_system_id("foo:////").unwrap();
        assert_eq!(uri.authority(), Some(""));
        assert_eq!(uri.path(), "//");
    }

    #[test]
    fn uri_syntax_error_tests() {
        for (reference, error) in [
            ("%zz", ParseRIError::InvalidPctEncoded),
            ("a%2", ParseRIError::InvalidPctEncoded),
            ("#a#b", ParseRIError::InvalidFragment),
            (":abc", ParseRIError::ColonInFirstSegment),
            ("1a:b", ParseRIError::ColonInFirstSegment),
            ("http://[1::2::3]/", ParseRIError::InvalidIPLiteral),
            ("http://[::1/", ParseRIError::InvalidIPLiteral),
            ("http://host:8x/", ParseRIError::InvalidPort),
            ("http://a@b@c/", ParseRIError::InvalidAuthority),
        ] {
            assert_eq!(
                URIString::parse_system_id(reference).unwrap_err(),
                error,
                "{reference}"
            );
        }
        // characters that are escaped are never errors
        let uri = URIString::parse_system_id("my file {1}.xml").unwrap();
        assert_eq!(uri.as_escaped_str(), "my%20file%20%7B1%7D.xml");
        assert_eq!(uri.as_unescaped_str().unwrap(), "my file {1}.xml");
        let uri = URIString::parse_system_id("http://example.com/caf\u{E9}").unwrap();
        assert_eq!(uri.as_escaped_str(), "http://example.com/caf%C3%A9");
        assert!(URIString::parse_system_id("http://[v1.fe80::a+en1]/").is_ok());
        assert!(URIString::parse_system_id("").is_ok());
        // '%' is taken as is by `parse`
        assert_eq!(URIString::parse("100%").unwrap().as_escaped_str(), "100%25");
    }

    /// [5.4.  Reference Resolution Examples](https://datatracker.ietf.org/doc/html/rfc3986#section-5.4)
    #[test]
    fn uri_resolve_tests() {
        let base = URIString::parse_system_id("http://a/b/c/d;p?q").unwrap();
        for (reference, expected) in [
            ("g:h", "g:h"),
            ("g", "http://a/b/c/g"),
            ("./g", "http://a/b/c/g"),
            ("g/", "http://a/b/c/g/"),
            ("/g", "http://a/g"),
            ("//g", "http://g"),
            ("?y", "http://a/b/c/d;p?y"),
            ("g?y", "http://a/b/c/g?y"),
            ("#s", "http://a/b/c/d;p?q#s"),
            ("g;x?y#s", "http://a/b/c/g;x?y#s"),
            ("", "http://a/b/c/d;p?q"),
            (".", "http://a/b/c/"),
            ("..", "http://a/b/"),
            ("../g", "http://a/b/g"),
            ("../..", "http://a/"),
            ("../../g", "http://a/g"),
            // abnormal examples
            ("../../../g", "http://a/g"),
            ("/./g", "http://a/g"),
            ("/../g", "http://a/g"),
            ("g.", "http://a/b/c/g."),
            ("..g", "http://a/b/c/..g"),
            ("./g/.", "http://a/b/c/g/"),
            ("g/../h", "http://a/b/c/h"),
            ("g;x=1/../y", "http://a/b/c/y"),
            ("g?y/../x", "http://a/b/c/g?y/../x"),
            ("g#s/../x", "http://a/b/c/g#s/../x"),
        ] {
            let reference = URIString::parse_system_id(reference).unwrap();
            assert_eq!(base.resolve(&reference).as_escaped_str(), expected);
        }

        // the fragment of the base is dropped
        let base = URIString::parse_system_id("http://www.example.org/one/two#frag").unwrap();
        let reference = URIString::parse_system_id("").unwrap();
        assert_eq!(
            base.resolve(&reference).as_escaped_str(),
            "http://www.example.org/one/two"
        );

        // relative bases keep leading '..'
        let base = URIString::parse_system_id("../doc/a.xml").unwrap();
        let reference = URIString::parse_system_id("../dtd/./b.dtd").unwrap();
        assert_eq!(base.resolve(&reference).as_escaped_str(), "../dtd/b.dtd");
    }

    #[test]
    fn file_path_tests() {
        let uri = URIString::parse_file_path("/tmp/100% sure/doc.xml").unwrap();
        assert_eq!(uri.as_escaped_str(), "file:///tmp/100%25%20sure/doc.xml");
        assert_eq!(
            uri.to_file_path(),
            Some(PathBuf::from("/tmp/100% sure/doc.xml"))
        );

        let uri = URIString::parse_file_path("dir/doc.xml").unwrap();
        assert_eq!(uri.as_escaped_str(), "dir/doc.xml");

        let uri = URIString::parse_system_id("file://localhost/etc/doc.dtd").unwrap();
        assert_eq!(uri.to_file_path(), Some(PathBuf::from("/etc/doc.dtd")));
        let uri = URIString::parse_system_id("http://example.com/doc.dtd").unwrap();
        assert_eq!(uri.to_file_path(), None);
        let uri = URIString::parse_system_id("file://server/doc.dtd").unwrap();
        assert_eq!(uri.to_file_path(), None);
    }
}
