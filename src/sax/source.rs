use std::{fs::File, io::Read, path::Path, sync::Arc};

use crate::{
    encoding::{
        DecodeError, Decoder, DetectedEncoding, UTF8_NAME, UTF8Decoder, detect_encoding,
        find_decoder, sniff_declared_encoding,
    },
    error::XMLError,
};

const INPUT_CHUNK: usize = 4096;
const GROW_THRESHOLD: usize = 64;

/// How the decoder of an [`InputSource`] was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingOrigin {
    /// Specified by the creator of the source.
    Forced,
    /// Selected by a byte order mark.
    ByteOrderMark,
    /// Guessed from the first bytes or read from the encoding declaration.
    Guessed,
    /// Nothing was found, so UTF-8 is assumed.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceKind {
    /// The document entity or an external entity. Line ends are normalized and
    /// positions are tracked.
    External,
    /// The replacement text of an internal entity.
    Internal,
}

/// A character stream read by [`XMLReader`](crate::sax::parser::XMLReader).
///
/// Bytes are decoded lazily, chunk by chunk, so arbitrarily large documents can be read
/// with a bounded buffer.
pub struct InputSource {
    source: Box<dyn Read>,
    buffer: Box<[u8]>,
    decoder: Box<dyn Decoder>,
    origin: EncodingOrigin,
    decoded: String,
    /// Start position of the undecoded range of `buffer`
    buffer_next: usize,
    /// End position of data read into `buffer`
    buffer_end: usize,
    /// Start position of unused data in `decoded`
    decoded_next: usize,
    /// Total number of bytes read from `source`
    total_read: usize,
    /// Whether `source` has reached EOF
    eof: bool,
    kind: SourceKind,
    system_id: Option<Arc<str>>,
    public_id: Option<Arc<str>>,
}

impl InputSource {
    /// Create a source from a byte stream.
    ///
    /// If `encoding` is `None`, the encoding is detected from the byte order mark or the
    /// first bytes of the stream, and finally from the encoding declaration.
    ///
    /// # Errors
    /// - [`XMLError::ParserUnsupportedEncoding`] if `encoding` or the detected encoding
    ///   is not supported.
    /// - [`XMLError::IOError`] if reading fails.
    pub fn from_reader(
        reader: impl Read + 'static,
        encoding: Option<&str>,
    ) -> Result<Self, XMLError> {
        let mut ret = Self {
            source: Box::new(reader),
            eof: false,
            ..Self::default()
        };

        // Handling strange implementations that write only one byte per read
        while ret.buffer_end < INPUT_CHUNK {
            let read = ret.source.read(&mut ret.buffer[ret.buffer_end..])?;
            if read == 0 {
                ret.eof = true;
                break;
            }
            ret.buffer_end += read;
            ret.total_read += read;
        }

        if let Some(encoding) = encoding {
            ret.decoder = find_decoder(encoding).ok_or(XMLError::ParserUnsupportedEncoding)?;
            ret.origin = EncodingOrigin::Forced;
            return Ok(ret);
        }

        match detect_encoding(&ret.buffer[..ret.buffer_end]) {
            DetectedEncoding::ByteOrderMark { name, bom_length } => {
                ret.decoder = find_decoder(name).ok_or(XMLError::ParserUnsupportedEncoding)?;
                ret.buffer_next = bom_length;
                ret.origin = EncodingOrigin::ByteOrderMark;
            }
            DetectedEncoding::Guessed { name } if name == UTF8_NAME => {
                // All ASCII-compatible encodings look the same until the declaration
                // is read.
                let declared = sniff_declared_encoding(&ret.buffer[..ret.buffer_end]);
                ret.decoder = match declared {
                    Some(declared) => find_decoder(declared).unwrap_or_else(|| {
                        log::debug!("declared encoding '{declared}' is not supported");
                        Box::new(UTF8Decoder)
                    }),
                    None => Box::new(UTF8Decoder),
                };
                ret.origin = EncodingOrigin::Guessed;
            }
            DetectedEncoding::Guessed { name } => {
                ret.decoder = find_decoder(name).ok_or(XMLError::ParserUnsupportedEncoding)?;
                ret.origin = EncodingOrigin::Guessed;
            }
            DetectedEncoding::Unknown => {}
            DetectedEncoding::Unsupported => return Err(XMLError::ParserUnsupportedEncoding),
        }
        log::trace!("select decoder {} ({:?})", ret.decoder.name(), ret.origin);
        Ok(ret)
    }

    /// Create a source from a string. No decoding is necessary.
    pub fn from_content(content: &str) -> Self {
        Self {
            decoded: content.to_owned(),
            total_read: content.len(),
            origin: EncodingOrigin::Forced,
            ..Self::default()
        }
    }

    /// Open the file at `path`. Its path becomes the system identifier.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, XMLError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut ret = Self::from_reader(file, None)?;
        ret.set_system_id(path.to_string_lossy().as_ref());
        Ok(ret)
    }

    /// The replacement text of an internal entity.
    pub(crate) fn from_replacement_text(text: &str) -> Self {
        let mut ret = Self::from_content(text);
        ret.kind = SourceKind::Internal;
        ret
    }

    pub(crate) fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn system_id(&self) -> Option<&Arc<str>> {
        self.system_id.as_ref()
    }

    pub fn set_system_id(&mut self, system_id: impl Into<Arc<str>>) {
        self.system_id = Some(system_id.into());
    }

    pub fn public_id(&self) -> Option<&Arc<str>> {
        self.public_id.as_ref()
    }

    pub fn set_public_id(&mut self, public_id: impl Into<Arc<str>>) {
        self.public_id = Some(public_id.into());
    }

    /// Decode more data so that at least `len` bytes are available, unless the end of
    /// the stream is reached first.
    pub fn fill(&mut self, len: usize) -> Result<(), XMLError> {
        while self.decoded.len() - self.decoded_next < len {
            if !self.decode_more()? {
                break;
            }
        }
        Ok(())
    }

    pub fn grow(&mut self) -> Result<(), XMLError> {
        self.fill(GROW_THRESHOLD)
    }

    /// Returns `false` if no more data can be decoded.
    fn decode_more(&mut self) -> Result<bool, XMLError> {
        if self.decoded_next > 0 {
            self.decoded.drain(..self.decoded_next);
            self.decoded_next = 0;
        }

        if !self.eof && self.buffer_end - self.buffer_next < GROW_THRESHOLD {
            self.buffer
                .copy_within(self.buffer_next..self.buffer_end, 0);
            self.buffer_end -= self.buffer_next;
            self.buffer_next = 0;
            while self.buffer_end < INPUT_CHUNK {
                let read = self.source.read(&mut self.buffer[self.buffer_end..])?;
                if read == 0 {
                    self.eof = true;
                    break;
                }
                self.buffer_end += read;
                self.total_read += read;
            }
        }

        if self.buffer_end == self.buffer_next {
            return Ok(false);
        }
        let before = self.decoded.len();
        match self.decoder.decode(
            &self.buffer[self.buffer_next..self.buffer_end],
            &mut self.decoded,
            self.eof,
        ) {
            Ok((read, _)) => self.buffer_next += read,
            Err(DecodeError::Malformed {
                read,
                length,
                offset,
                ..
            }) if read - offset - length > 0 => {
                // Keep the valid prefix. The malformed sequence is reported by the next call.
                self.buffer_next += read - offset - length;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(self.decoded.len() > before || !self.eof)
    }

    pub fn content_bytes(&self) -> &[u8] {
        &self.decoded.as_bytes()[self.decoded_next..]
    }

    pub fn content_str(&self) -> &str {
        &self.decoded[self.decoded_next..]
    }

    /// Check if the decoded content starts with `pattern`, decoding more data as needed.
    pub fn starts_with(&mut self, pattern: &str) -> Result<bool, XMLError> {
        self.fill(pattern.len())?;
        Ok(self.content_bytes().starts_with(pattern.as_bytes()))
    }

    /// Consume one character.
    ///
    /// For external sources, `"\r\n"` and a lone `'\r'` are read as `'\n'`.
    pub fn next_char(&mut self) -> Result<Option<char>, XMLError> {
        let Some(c) = self.peek_char()? else {
            return Ok(None);
        };
        self.decoded_next += c.len_utf8();
        if c == '\r' && self.kind == SourceKind::External {
            if self.peek_char()? == Some('\n') {
                self.decoded_next += 1;
            }
            return Ok(Some('\n'));
        }
        Ok(Some(c))
    }

    pub fn peek_char(&mut self) -> Result<Option<char>, XMLError> {
        if let Some(c) = self.content_str().chars().next() {
            return Ok(Some(c));
        }
        self.grow()?;
        Ok(self.content_str().chars().next())
    }

    /// Skip `len` bytes. `len` must lie on a character boundary.
    pub fn advance(&mut self, mut len: usize) -> Result<(), XMLError> {
        while len > 0 {
            if self.decoded.len() == self.decoded_next {
                self.grow()?;
            }
            let l = len.min(self.decoded.len() - self.decoded_next);
            if l == 0 {
                return Err(XMLError::ParserUnexpectedEOF);
            }
            if !self.decoded.is_char_boundary(self.decoded_next + l) {
                return Err(XMLError::InternalError);
            }
            self.decoded_next += l;
            len -= l;
        }
        Ok(())
    }

    /// Check if all characters have been consumed.
    pub fn is_eof(&mut self) -> Result<bool, XMLError> {
        Ok(self.peek_char()?.is_none())
    }

    /// Returns `true` if both the decoded but unused string
    /// and the read but undecoded data are 0 bytes.
    ///
    /// # Note
    /// Returning `true` does not mean that EOF has been reached.
    pub fn is_empty(&self) -> bool {
        self.decoded.len() == self.decoded_next && self.buffer_end == self.buffer_next
    }

    pub fn total_read(&self) -> usize {
        self.total_read
    }

    pub fn encoding_name(&self) -> &'static str {
        self.decoder.name()
    }

    pub fn encoding_origin(&self) -> EncodingOrigin {
        self.origin
    }
}

impl Default for InputSource {
    fn default() -> Self {
        Self {
            source: Box::new(std::io::empty()),
            buffer: vec![0; INPUT_CHUNK].into_boxed_slice(),
            decoder: Box::new(UTF8Decoder),
            origin: EncodingOrigin::Default,
            decoded: String::new(),
            buffer_next: 0,
            buffer_end: 0,
            decoded_next: 0,
            total_read: 0,
            eof: true,
            kind: SourceKind::External,
            system_id: None,
            public_id: None,
        }
    }
}

impl std::fmt::Debug for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputSource")
            .field("system_id", &self.system_id)
            .field("public_id", &self.public_id)
            .field("encoding", &self.decoder.name())
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneByteReader(Vec<u8>, usize);

    impl Read for OneByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.1 == self.0.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[self.1];
            self.1 += 1;
            Ok(1)
        }
    }

    #[test]
    fn line_end_normalization_tests() {
        let mut source = InputSource::from_content("a\r\nb\rc");
        let mut out = String::new();
        while let Some(c) = source.next_char().unwrap() {
            out.push(c);
        }
        assert_eq!(out, "a\nb\nc");

        let mut source = InputSource::from_replacement_text("a\rb");
        source.next_char().unwrap();
        assert_eq!(source.next_char().unwrap(), Some('\r'));
    }

    #[test]
    fn encoding_detection_tests() {
        let bytes = b"<?xml version='1.0' encoding='ISO-8859-1'?><a>\xE9</a>".to_vec();
        let mut source = InputSource::from_reader(OneByteReader(bytes, 0), None).unwrap();
        assert_eq!(source.encoding_name(), "ISO-8859-1");
        assert_eq!(source.encoding_origin(), EncodingOrigin::Guessed);
        source.fill(usize::MAX).unwrap();
        assert!(source.content_str().ends_with("<a>é</a>"));

        let bytes = vec![0xFF, 0xFE, b'<', 0, b'a', 0, b'/', 0, b'>', 0];
        let mut source = InputSource::from_reader(std::io::Cursor::new(bytes), None).unwrap();
        assert_eq!(source.encoding_origin(), EncodingOrigin::ByteOrderMark);
        assert!(source.starts_with("<a/>").unwrap());

        let bytes = vec![0x00, 0x00, 0x00, 0x3C];
        assert!(matches!(
            InputSource::from_reader(std::io::Cursor::new(bytes), None),
            Err(XMLError::ParserUnsupportedEncoding)
        ));
    }

    #[test]
    fn chunk_boundary_tests() {
        let content = format!("<a>{}</a>", "あ".repeat(3000));
        let mut source =
            InputSource::from_reader(std::io::Cursor::new(content.clone().into_bytes()), None)
                .unwrap();
        let mut out = String::new();
        while let Some(c) = source.next_char().unwrap() {
            out.push(c);
        }
        assert_eq!(out, content);
        assert!(source.is_eof().unwrap());
    }
}
