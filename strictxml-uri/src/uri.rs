use std::{
    borrow::Cow,
    fmt::Write as _,
    net::Ipv6Addr,
    path::{MAIN_SEPARATOR, MAIN_SEPARATOR_STR, Path, PathBuf},
};

use crate::ParseRIError;

/// An escaped URI reference.
///
/// Every value has passed the `URI-reference` grammar of
/// [RFC 3986](https://datatracker.ietf.org/doc/html/rfc3986#section-4.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct URIString {
    uri: String,
}

/// Components as found by the regular expression of
/// [Appendix B](https://datatracker.ietf.org/doc/html/rfc3986#appendix-B).
#[derive(Debug, Clone, Copy, Default)]
struct Parts<'a> {
    scheme: Option<&'a str>,
    authority: Option<&'a str>,
    path: &'a str,
    query: Option<&'a str>,
    fragment: Option<&'a str>,
}

impl<'a> Parts<'a> {
    fn split(mut uri: &'a str) -> Self {
        let mut parts = Parts::default();
        if let Some((head, rest)) = uri.split_once('#') {
            parts.fragment = Some(rest);
            uri = head;
        }
        if let Some((head, rest)) = uri.split_once('?') {
            parts.query = Some(rest);
            uri = head;
        }
        if let Some((scheme, rest)) = uri.split_once(':')
            && is_scheme(scheme)
        {
            parts.scheme = Some(scheme);
            uri = rest;
        }
        if let Some(rest) = uri.strip_prefix("//") {
            let end = rest.find('/').unwrap_or(rest.len());
            parts.authority = Some(&rest[..end]);
            uri = &rest[end..];
        }
        parts.path = uri;
        parts
    }

    fn recompose(&self, path: &str) -> String {
        let mut uri = String::new();
        if let Some(scheme) = self.scheme {
            uri.push_str(scheme);
            uri.push(':');
        }
        if let Some(authority) = self.authority {
            uri.push_str("//");
            uri.push_str(authority);
        }
        uri.push_str(path);
        if let Some(query) = self.query {
            uri.push('?');
            uri.push_str(query);
        }
        if let Some(fragment) = self.fragment {
            uri.push('#');
            uri.push_str(fragment);
        }
        uri
    }

    fn validate(&self) -> Result<(), ParseRIError> {
        if let Some(authority) = self.authority {
            validate_authority(authority)?;
        }
        validate_path(self.path)?;
        if self.scheme.is_none()
            && self.authority.is_none()
            && self.path.split('/').next().is_some_and(|seg| seg.contains(':'))
        {
            return Err(ParseRIError::ColonInFirstSegment);
        }
        if let Some(query) = self.query {
            validate_chars(query, |b| is_pchar(b) || matches!(b, b'/' | b'?'))
                .map_err(|err| promote(err, ParseRIError::InvalidQuery))?;
        }
        if let Some(fragment) = self.fragment {
            validate_chars(fragment, |b| is_pchar(b) || matches!(b, b'/' | b'?'))
                .map_err(|err| promote(err, ParseRIError::InvalidFragment))?;
        }
        Ok(())
    }
}

impl URIString {
    /// Parse `uri` after escaping every character that is neither
    /// [`reserved`](https://datatracker.ietf.org/doc/html/rfc3986#section-2.2) nor
    /// [`unreserved`](https://datatracker.ietf.org/doc/html/rfc3986#section-2.3).
    ///
    /// `%` is escaped too, so [`URIString::as_unescaped_str`] gives back `uri`.
    pub fn parse(uri: impl AsRef<str>) -> Result<Self, ParseRIError> {
        let uri = escape_except(uri.as_ref(), |c| {
            c.is_ascii() && (is_reserved(c as u8) || is_unreserved(c as u8))
        });
        Self::parse_escaped(uri.into_owned())
    }

    /// Parse `uri` after escaping the characters listed in
    /// [XML 1.0 4.2.2 External Entities](https://www.w3.org/TR/xml/#sec-external-ent):
    /// control characters, space, `<`, `>`, `"`, `{`, `}`, `|`, `\`, `^`, `` ` `` and all
    /// characters above #x7F.
    ///
    /// `%` is kept, so existing escapes are preserved.
    pub fn parse_system_id(uri: impl AsRef<str>) -> Result<Self, ParseRIError> {
        let uri = escape_except(uri.as_ref(), |c| {
            c.is_ascii()
                && !matches!(
                    c as u8,
                    0..=0x20 | b'"' | b'<' | b'>' | b'\\' | b'^' | b'`' | b'{'..=b'}' | 0x7F
                )
        });
        Self::parse_escaped(uri.into_owned())
    }

    fn parse_escaped(uri: String) -> Result<Self, ParseRIError> {
        Parts::split(&uri).validate()?;
        Ok(Self { uri })
    }

    /// Absolute paths become `file` URIs. Relative paths stay relative references.
    ///
    /// # Note
    /// Paths that are not valid UTF-8 are [`ParseRIError::Unsupported`].
    pub fn parse_file_path(path: impl AsRef<Path>) -> Result<Self, ParseRIError> {
        let path = path.as_ref();
        let mut path_str = path
            .to_str()
            .ok_or(ParseRIError::Unsupported)?
            .replace(MAIN_SEPARATOR, "/");
        if path.is_dir() && !path_str.ends_with('/') {
            path_str.push('/');
        }
        if path.is_absolute() {
            if !path_str.starts_with('/') {
                path_str.insert(0, '/');
            }
            path_str.insert_str(0, "file://");
        }
        Self::parse(path_str)
    }

    pub fn as_escaped_str(&self) -> &str {
        &self.uri
    }

    /// `None` if some percent-encoded octets are not UTF-8.
    pub fn as_unescaped_str(&self) -> Option<Cow<'_, str>> {
        unescape(&self.uri).ok()
    }

    /// Whether this is an [absolute URI](https://datatracker.ietf.org/doc/html/rfc3986#section-4.3):
    /// it has a scheme and no fragment.
    pub fn is_absolute(&self) -> bool {
        let parts = self.parts();
        parts.scheme.is_some() && parts.fragment.is_none()
    }

    /// Whether this is a [relative reference](https://datatracker.ietf.org/doc/html/rfc3986#section-4.2).
    pub fn is_relative(&self) -> bool {
        self.parts().scheme.is_none()
    }

    pub fn scheme(&self) -> Option<&str> {
        self.parts().scheme
    }

    pub fn authority(&self) -> Option<&str> {
        self.parts().authority
    }

    pub fn userinfo(&self) -> Option<&str> {
        self.authority()?.split_once('@').map(|(userinfo, _)| userinfo)
    }

    pub fn host(&self) -> Option<&str> {
        self.authority().map(|authority| split_authority(authority).1)
    }

    pub fn port(&self) -> Option<&str> {
        self.authority().and_then(|authority| split_authority(authority).2)
    }

    pub fn path(&self) -> &str {
        self.parts().path
    }

    pub fn query(&self) -> Option<&str> {
        self.parts().query
    }

    pub fn fragment(&self) -> Option<&str> {
        self.parts().fragment
    }

    fn parts(&self) -> Parts<'_> {
        Parts::split(&self.uri)
    }

    /// Resolve `reference` against `self`.
    ///
    /// `self` need not be absolute. When both are relative, the result stays relative and
    /// keeps the leading `..` segments that cannot be removed.
    ///
    /// # Reference
    /// [5.2.2.  Transform References](https://datatracker.ietf.org/doc/html/rfc3986#section-5.2.2)
    pub fn resolve(&self, reference: &Self) -> URIString {
        let base = self.parts();
        let r = reference.parts();
        let mut target = Parts {
            fragment: r.fragment,
            ..Parts::default()
        };
        let path = if r.scheme.is_some() {
            target.scheme = r.scheme;
            target.authority = r.authority;
            target.query = r.query;
            remove_dot_segments(r.path)
        } else if r.authority.is_some() {
            target.scheme = base.scheme;
            target.authority = r.authority;
            target.query = r.query;
            remove_dot_segments(r.path)
        } else {
            target.scheme = base.scheme;
            target.authority = base.authority;
            if r.path.is_empty() {
                target.query = r.query.or(base.query);
                base.path.to_owned()
            } else {
                target.query = r.query;
                if r.path.starts_with('/') {
                    remove_dot_segments(r.path)
                } else {
                    remove_dot_segments(&merge(&base, r.path))
                }
            }
        };
        URIString {
            uri: target.recompose(&path),
        }
    }

    /// Lowercase the scheme and remove dot segments.
    ///
    /// # Reference
    /// [6.2.2.  Syntax-Based Normalization](https://datatracker.ietf.org/doc/html/rfc3986#section-6.2.2)
    pub fn normalize(&mut self) {
        let parts = self.parts();
        let scheme = parts.scheme.map(|scheme| scheme.to_ascii_lowercase());
        let path = remove_dot_segments(parts.path);
        let uri = Parts {
            scheme: scheme.as_deref(),
            ..parts
        }
        .recompose(&path);
        self.uri = uri;
    }

    /// The local path this reference names, if it is a relative reference or a `file` URI
    /// on the local host.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        let parts = self.parts();
        match parts.scheme {
            None => {}
            Some(scheme) if scheme.eq_ignore_ascii_case("file") => {
                if !matches!(parts.authority, None | Some("" | "localhost")) {
                    return None;
                }
            }
            Some(_) => return None,
        }
        let path = unescape(parts.path).ok()?;
        Some(PathBuf::from(path.replace('/', MAIN_SEPARATOR_STR)))
    }
}

impl std::fmt::Display for URIString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri)
    }
}

/// # Reference
/// [5.2.3.  Merge Paths](https://datatracker.ietf.org/doc/html/rfc3986#section-5.2.3)
fn merge(base: &Parts<'_>, path: &str) -> String {
    if base.authority.is_some() && base.path.is_empty() {
        return format!("/{path}");
    }
    match base.path.rfind('/') {
        Some(pos) => [&base.path[..=pos], path].concat(),
        None => path.to_owned(),
    }
}

/// # Reference
/// [5.2.4.  Remove Dot Segments](https://datatracker.ietf.org/doc/html/rfc3986#section-5.2.4)
fn remove_dot_segments(path: &str) -> String {
    let (has_root, rest) = match path.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, path),
    };
    let segments = normalize_path_segments(rest.split('/'), has_root);
    let mut ret = String::with_capacity(path.len());
    if has_root {
        ret.push('/');
    }
    for (i, seg) in segments.into_iter().enumerate() {
        if i > 0 {
            ret.push('/');
        }
        ret.push_str(seg);
    }
    ret
}

/// Leading `..` survive only in paths without a root.
fn normalize_path_segments<'a>(
    segments: impl Iterator<Item = &'a str>,
    has_root: bool,
) -> Vec<&'a str> {
    let mut stack = vec![];
    let mut last_dot = false;
    for seg in segments {
        match seg {
            "." => last_dot = true,
            ".." => {
                if stack.last().is_some_and(|&last| last != "..") {
                    stack.pop();
                } else if !has_root {
                    stack.push(seg);
                }
                last_dot = true;
            }
            _ => {
                stack.push(seg);
                last_dot = false;
            }
        }
    }
    if last_dot {
        stack.push("");
    }
    stack
}

/// `(userinfo, host, port)`
fn split_authority(authority: &str) -> (Option<&str>, &str, Option<&str>) {
    let (userinfo, hostport) = match authority.split_once('@') {
        Some((userinfo, hostport)) => (Some(userinfo), hostport),
        None => (None, authority),
    };
    let port_start = if hostport.starts_with('[') {
        hostport.find(']').map(|end| end + 1)
    } else {
        hostport.find(':')
    };
    match port_start {
        Some(pos) if hostport[pos..].starts_with(':') => {
            (userinfo, &hostport[..pos], Some(&hostport[pos + 1..]))
        }
        _ => (userinfo, hostport, None),
    }
}

/// # Reference
/// [3.2.  Authority](https://datatracker.ietf.org/doc/html/rfc3986#section-3.2)
///
/// ```text
/// authority   = [ userinfo "@" ] host [ ":" port ]
/// userinfo    = *( unreserved / pct-encoded / sub-delims / ":" )
/// host        = IP-literal / IPv4address / reg-name
/// reg-name    = *( unreserved / pct-encoded / sub-delims )
/// port        = *DIGIT
/// ```
fn validate_authority(authority: &str) -> Result<(), ParseRIError> {
    let (userinfo, host, port) = split_authority(authority);
    if let Some(userinfo) = userinfo {
        validate_chars(userinfo, |b| {
            is_unreserved(b) || is_sub_delims(b) || b == b':'
        })
        .map_err(|err| promote(err, ParseRIError::InvalidAuthority))?;
    }
    if let Some(literal) = host.strip_prefix('[') {
        let literal = literal
            .strip_suffix(']')
            .ok_or(ParseRIError::InvalidIPLiteral)?;
        validate_ip_literal(literal)?;
    } else if host.starts_with('[') || host.contains(']') {
        return Err(ParseRIError::InvalidIPLiteral);
    } else {
        validate_chars(host, |b| is_unreserved(b) || is_sub_delims(b))
            .map_err(|err| promote(err, ParseRIError::InvalidAuthority))?;
    }
    if let Some(port) = port
        && !port.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(ParseRIError::InvalidPort);
    }
    Ok(())
}

/// ```text
/// IP-literal = "[" ( IPv6address / IPvFuture  ) "]"
/// IPvFuture  = "v" 1*HEXDIG "." 1*( unreserved / sub-delims / ":" )
/// ```
fn validate_ip_literal(literal: &str) -> Result<(), ParseRIError> {
    if let Some(future) = literal
        .strip_prefix('v')
        .or_else(|| literal.strip_prefix('V'))
    {
        let (version, address) = future
            .split_once('.')
            .ok_or(ParseRIError::InvalidIPLiteral)?;
        if version.is_empty()
            || !version.bytes().all(|b| b.is_ascii_hexdigit())
            || address.is_empty()
            || !address
                .bytes()
                .all(|b| is_unreserved(b) || is_sub_delims(b) || b == b':')
        {
            return Err(ParseRIError::InvalidIPLiteral);
        }
        return Ok(());
    }
    literal
        .parse::<Ipv6Addr>()
        .map(|_| ())
        .map_err(|_| ParseRIError::InvalidIPLiteral)
}

/// ```text
/// path = *( pchar / "/" )
/// ```
fn validate_path(path: &str) -> Result<(), ParseRIError> {
    validate_chars(path, |b| is_pchar(b) || b == b'/')
}

/// Check that every byte of `s` is either accepted by `allowed` or starts a well-formed
/// `pct-encoded`.
fn validate_chars(s: &str, allowed: impl Fn(u8) -> bool) -> Result<(), ParseRIError> {
    let mut bytes = s.bytes();
    while let Some(b) = bytes.next() {
        if b == b'%' {
            match (bytes.next(), bytes.next()) {
                (Some(hi), Some(lo)) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {}
                _ => return Err(ParseRIError::InvalidPctEncoded),
            }
        } else if !allowed(b) {
            return Err(ParseRIError::InvalidPChar);
        }
    }
    Ok(())
}

/// Replace the generic character error with the error of the component.
fn promote(err: ParseRIError, component: ParseRIError) -> ParseRIError {
    match err {
        ParseRIError::InvalidPChar => component,
        err => err,
    }
}

/// ```text
/// scheme = ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
/// ```
fn is_scheme(s: &str) -> bool {
    let mut bytes = s.bytes();
    bytes.next().is_some_and(|b| b.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
}

/// ```text
/// pchar = unreserved / pct-encoded / sub-delims / ":" / "@"
/// ```
fn is_pchar(b: u8) -> bool {
    is_unreserved(b) || is_sub_delims(b) || matches!(b, b':' | b'@')
}

fn is_reserved(b: u8) -> bool {
    is_gen_delims(b) || is_sub_delims(b)
}

fn is_gen_delims(b: u8) -> bool {
    matches!(b, b':' | b'/' | b'?' | b'#' | b'[' | b']' | b'@')
}

fn is_sub_delims(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'='
    )
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

/// Percent-encode the UTF-8 octets of every character of `s` for which `is_except`
/// returns `false`.
pub fn escape_except(s: &str, is_except: impl Fn(char) -> bool) -> Cow<'_, str> {
    if s.chars().all(&is_except) {
        return Cow::Borrowed(s);
    }
    let mut encode = [0; 4];
    let mut buf = String::with_capacity(s.len() * 3);
    for c in s.chars() {
        if is_except(c) {
            buf.push(c);
        } else {
            for b in c.encode_utf8(&mut encode).bytes() {
                // writing to a `String` never fails
                let _ = write!(buf, "%{b:02X}");
            }
        }
    }
    Cow::Owned(buf)
}

/// Decode `pct-encoded` octets. Malformed escapes are kept as they are.
pub fn unescape(s: &str) -> Result<Cow<'_, str>, ParseRIError> {
    if !s.contains('%') {
        return Ok(Cow::Borrowed(s));
    }
    let bytes = s.as_bytes();
    let mut buf = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let Some(&[hi, lo]) = bytes.get(i + 1..i + 3)
            && let (Some(hi), Some(lo)) = (hex_value(hi), hex_value(lo))
        {
            buf.push(hi << 4 | lo);
            i += 3;
        } else {
            buf.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(buf)
        .map(Cow::Owned)
        .map_err(|_| ParseRIError::InvalidUTF8)
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}
