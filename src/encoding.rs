//! Byte-to-text decoders for the encodings the scanner accepts, plus the
//! autodetection described in Appendix F of the XML 1.0 recommendation.

use std::{borrow::Cow, str::from_utf8};

pub trait Decoder {
    fn name(&self) -> &'static str;
    /// Determines whether this decoder is the decoder specified by `name`.
    ///
    /// Reference: [Character Sets registered by IANA](https://www.iana.org/assignments/character-sets/character-sets.xhtml)
    fn is_match(&self, name: &str) -> bool;
    /// If no error occurs, return `Ok((read_bytes, write_bytes))`.
    ///
    /// If `finish` is `false`, an incomplete sequence at the end of `src` is left unread.
    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        finish: bool,
    ) -> Result<(usize, usize), DecodeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Malformed byte sequence is found.
    ///
    /// The input and output buffer have consumed `read` and `write` bytes respectively.
    /// Malformed sequence occurs `input[read-length-offset..read-offset]`.
    Malformed {
        read: usize,
        write: usize,
        length: usize,
        offset: usize,
    },
    /// Other errors.
    Other { msg: Cow<'static, str> },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed { read, length, offset, .. } => write!(
                f,
                "malformed byte sequence at {}..{}",
                read - length - offset,
                read - offset
            ),
            Self::Other { msg } => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}

pub const UTF8_NAME: &str = "UTF-8";
pub const UTF16_NAME: &str = "UTF-16";
pub const UTF16LE_NAME: &str = "UTF-16LE";
pub const UTF16BE_NAME: &str = "UTF-16BE";
pub const ISO_8859_1_NAME: &str = "ISO-8859-1";
pub const US_ASCII_NAME: &str = "US-ASCII";

pub struct UTF8Decoder;
impl Decoder for UTF8Decoder {
    fn name(&self) -> &'static str {
        UTF8_NAME
    }

    fn is_match(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case("UTF-8") || name.eq_ignore_ascii_case("UTF8")
    }

    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        finish: bool,
    ) -> Result<(usize, usize), DecodeError> {
        match from_utf8(src) {
            Ok(s) => {
                dst.push_str(s);
                Ok((s.len(), s.len()))
            }
            Err(err) => {
                let valid = err.valid_up_to();
                // `valid_up_to` guarantees that this range is valid UTF-8
                if let Ok(s) = from_utf8(&src[..valid]) {
                    dst.push_str(s);
                }
                match err.error_len() {
                    None if !finish => Ok((valid, valid)),
                    None => Err(DecodeError::Malformed {
                        read: src.len(),
                        write: valid,
                        length: src.len() - valid,
                        offset: 0,
                    }),
                    Some(length) => Err(DecodeError::Malformed {
                        read: valid + length,
                        write: valid,
                        length,
                        offset: 0,
                    }),
                }
            }
        }
    }
}

fn decode_utf16(
    src: &[u8],
    dst: &mut String,
    finish: bool,
    unit: fn([u8; 2]) -> u16,
) -> Result<(usize, usize), DecodeError> {
    let (mut read, mut write) = (0, 0);
    while read + 2 <= src.len() {
        let high = unit([src[read], src[read + 1]]);
        let c = match high {
            0xD800..=0xDBFF => {
                if read + 4 > src.len() {
                    break;
                }
                let low = unit([src[read + 2], src[read + 3]]);
                if !(0xDC00..=0xDFFF).contains(&low) {
                    return Err(DecodeError::Malformed {
                        read: read + 2,
                        write,
                        length: 2,
                        offset: 0,
                    });
                }
                let code = 0x10000 + (((high as u32) - 0xD800) << 10) + ((low as u32) - 0xDC00);
                read += 4;
                char::from_u32(code)
            }
            0xDC00..=0xDFFF => {
                return Err(DecodeError::Malformed {
                    read: read + 2,
                    write,
                    length: 2,
                    offset: 0,
                });
            }
            code => {
                read += 2;
                char::from_u32(code as u32)
            }
        };
        let Some(c) = c else {
            return Err(DecodeError::Other {
                msg: "invalid UTF-16 code point".into(),
            });
        };
        dst.push(c);
        write += c.len_utf8();
    }
    if finish && read < src.len() {
        return Err(DecodeError::Malformed {
            read: src.len(),
            write,
            length: src.len() - read,
            offset: 0,
        });
    }
    Ok((read, write))
}

pub struct UTF16LEDecoder;
impl Decoder for UTF16LEDecoder {
    fn name(&self) -> &'static str {
        UTF16LE_NAME
    }

    fn is_match(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(UTF16LE_NAME)
    }

    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        finish: bool,
    ) -> Result<(usize, usize), DecodeError> {
        decode_utf16(src, dst, finish, u16::from_le_bytes)
    }
}

pub struct UTF16BEDecoder;
impl Decoder for UTF16BEDecoder {
    fn name(&self) -> &'static str {
        UTF16BE_NAME
    }

    fn is_match(&self, name: &str) -> bool {
        // "UTF-16" without a BOM is big endian
        name.eq_ignore_ascii_case(UTF16BE_NAME) || name.eq_ignore_ascii_case(UTF16_NAME)
    }

    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        finish: bool,
    ) -> Result<(usize, usize), DecodeError> {
        decode_utf16(src, dst, finish, u16::from_be_bytes)
    }
}

pub struct ISO8859_1Decoder;
impl Decoder for ISO8859_1Decoder {
    fn name(&self) -> &'static str {
        ISO_8859_1_NAME
    }

    fn is_match(&self, name: &str) -> bool {
        [ISO_8859_1_NAME, "ISO_8859-1", "ISO_8859-1:1987", "LATIN1", "L1"]
            .iter()
            .any(|alias| name.eq_ignore_ascii_case(alias))
    }

    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        _finish: bool,
    ) -> Result<(usize, usize), DecodeError> {
        let orig = dst.len();
        dst.extend(src.iter().map(|&b| b as char));
        Ok((src.len(), dst.len() - orig))
    }
}

pub struct USASCIIDecoder;
impl Decoder for USASCIIDecoder {
    fn name(&self) -> &'static str {
        US_ASCII_NAME
    }

    fn is_match(&self, name: &str) -> bool {
        [US_ASCII_NAME, "ASCII", "ANSI_X3.4-1968", "US"]
            .iter()
            .any(|alias| name.eq_ignore_ascii_case(alias))
    }

    fn decode(
        &mut self,
        src: &[u8],
        dst: &mut String,
        _finish: bool,
    ) -> Result<(usize, usize), DecodeError> {
        let valid = src.iter().position(|b| !b.is_ascii()).unwrap_or(src.len());
        // ASCII is valid UTF-8
        dst.extend(src[..valid].iter().map(|&b| b as char));
        if valid < src.len() {
            return Err(DecodeError::Malformed {
                read: valid + 1,
                write: valid,
                length: 1,
                offset: 0,
            });
        }
        Ok((valid, valid))
    }
}

/// Find a decoder by its (case-insensitive) IANA name or alias.
pub fn find_decoder(name: &str) -> Option<Box<dyn Decoder>> {
    let candidates: [Box<dyn Decoder>; 5] = [
        Box::new(UTF8Decoder),
        Box::new(UTF16BEDecoder),
        Box::new(UTF16LEDecoder),
        Box::new(ISO8859_1Decoder),
        Box::new(USASCIIDecoder),
    ];
    candidates.into_iter().find(|decoder| decoder.is_match(name))
}

/// The result of looking at the first bytes of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedEncoding {
    /// A byte order mark of `bom_length` bytes selects `name`.
    ByteOrderMark { name: &'static str, bom_length: usize },
    /// The bytes look like the start of an XML declaration in `name`.
    Guessed { name: &'static str },
    /// No signature was found.
    Unknown,
    /// UCS-4 or EBCDIC, which are not supported.
    Unsupported,
}

/// Detect the encoding family from the first four bytes.
pub fn detect_encoding(head: &[u8]) -> DetectedEncoding {
    use DetectedEncoding::*;

    match head {
        [0xEF, 0xBB, 0xBF, ..] => ByteOrderMark {
            name: UTF8_NAME,
            bom_length: 3,
        },
        [0x00, 0x00, 0xFE, 0xFF, ..]
        | [0xFF, 0xFE, 0x00, 0x00, ..]
        | [0x00, 0x00, 0xFF, 0xFE, ..]
        | [0xFE, 0xFF, 0x00, 0x00, ..] => Unsupported,
        [0xFE, 0xFF, ..] => ByteOrderMark {
            name: UTF16BE_NAME,
            bom_length: 2,
        },
        [0xFF, 0xFE, ..] => ByteOrderMark {
            name: UTF16LE_NAME,
            bom_length: 2,
        },
        [0x00, 0x00, 0x00, 0x3C, ..]
        | [0x3C, 0x00, 0x00, 0x00, ..]
        | [0x00, 0x00, 0x3C, 0x00, ..]
        | [0x00, 0x3C, 0x00, 0x00, ..]
        | [0x4C, 0x6F, 0xA7, 0x94, ..] => Unsupported,
        [0x00, 0x3C, 0x00, 0x3F, ..] => Guessed { name: UTF16BE_NAME },
        [0x3C, 0x00, 0x3F, 0x00, ..] => Guessed { name: UTF16LE_NAME },
        [0x3C, 0x3F, 0x78, 0x6D, ..] => Guessed { name: UTF8_NAME },
        _ => Unknown,
    }
}

/// Read the value of `encoding="..."` from an XML or text declaration written in
/// an ASCII-compatible encoding.
///
/// Only the raw bytes are inspected, so this works before any decoder is chosen.
pub fn sniff_declared_encoding(head: &[u8]) -> Option<&str> {
    let rest = head.strip_prefix(b"<?xml")?;
    let end = rest.windows(2).position(|w| w == b"?>")?;
    let decl = &rest[..end];
    let pos = decl.windows(8).position(|w| w == b"encoding")?;
    let mut decl = &decl[pos + 8..];
    decl = trim_ascii_start(decl).strip_prefix(b"=")?;
    decl = trim_ascii_start(decl);
    let quote = *decl.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let decl = &decl[1..];
    let close = decl.iter().position(|&b| b == quote)?;
    from_utf8(&decl[..close]).ok()
}

fn trim_ascii_start(bytes: &[u8]) -> &[u8] {
    let skip = bytes
        .iter()
        .take_while(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .count();
    &bytes[skip..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_incomplete_sequence_tests() {
        let bytes = "aあ".as_bytes();
        let mut out = String::new();
        let (read, _) = UTF8Decoder.decode(&bytes[..2], &mut out, false).unwrap();
        assert_eq!(read, 1);
        assert_eq!(out, "a");
        assert!(UTF8Decoder.decode(&bytes[1..2], &mut out, true).is_err());
    }

    #[test]
    fn utf16_tests() {
        let mut out = String::new();
        let src = [0x3C, 0x00, 0x61, 0x00, 0x3D, 0xD8, 0x00, 0xDE];
        let (read, _) = UTF16LEDecoder.decode(&src, &mut out, true).unwrap();
        assert_eq!(read, 8);
        assert_eq!(out, "<a\u{1F600}");

        let mut out = String::new();
        let (read, _) = UTF16BEDecoder.decode(&[0x00, 0x3C, 0x00], &mut out, false).unwrap();
        assert_eq!(read, 2);
        assert_eq!(out, "<");
    }

    #[test]
    fn single_byte_tests() {
        let mut out = String::new();
        ISO8859_1Decoder.decode(&[0x41, 0xE9], &mut out, true).unwrap();
        assert_eq!(out, "Aé");
        let mut out = String::new();
        assert!(USASCIIDecoder.decode(&[0x41, 0xE9], &mut out, true).is_err());
        assert_eq!(out, "A");
    }

    #[test]
    fn detection_tests() {
        assert_eq!(
            detect_encoding(&[0xFF, 0xFE, 0x3C, 0x00]),
            DetectedEncoding::ByteOrderMark {
                name: UTF16LE_NAME,
                bom_length: 2
            }
        );
        assert_eq!(detect_encoding(b"<roo"), DetectedEncoding::Unknown);
        assert_eq!(
            sniff_declared_encoding(b"<?xml version='1.0' encoding = \"ISO-8859-1\"?><a/>"),
            Some("ISO-8859-1")
        );
        assert_eq!(sniff_declared_encoding(b"<?xml version='1.0'?>"), None);
        assert!(find_decoder("latin1").is_some());
        assert!(find_decoder("Shift_JIS").is_none());
    }
}
