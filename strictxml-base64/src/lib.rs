//! Base64 codec for the `base64Binary` datatype.
//!
//! Lexical forms follow [RFC 2045 6.8. Base64 Content-Transfer-Encoding](https://datatracker.ietf.org/doc/html/rfc2045#section-6.8)
//! with the extra restrictions of XML Schema Part 2 3.2.16: the bits discarded by the
//! last quantum must be zero, and whitespace may only separate characters.

const ENCODING_TABLE: &[u8; 1 << 6] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
const DECODING_TABLE: [u8; 1 << 8] = {
    let mut table = [u8::MAX; 1 << 8];
    let mut i = 0;
    while i < ENCODING_TABLE.len() {
        table[ENCODING_TABLE[i] as usize] = i as u8;
        i += 1;
    }
    table
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base64Error {
    MalformedByte { byte: u8, position: usize },
    InsufficientPadding,
    NonZeroTrailingBits,
}

impl std::fmt::Display for Base64Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedByte { byte, position } => {
                write!(f, "malformed byte 0x{byte:02X} at {position}")
            }
            Self::InsufficientPadding => write!(f, "insufficient padding"),
            Self::NonZeroTrailingBits => write!(f, "the last quantum has non-zero padding bits"),
        }
    }
}

impl std::error::Error for Base64Error {}

/// A decoded `base64Binary` value.
///
/// Two values compare equal iff their octet sequences are equal, regardless of
/// the whitespace in the lexical forms they were built from.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Base64Binary {
    octets: Vec<u8>,
}

impl Base64Binary {
    /// Wrap an octet sequence.
    ///
    /// # Example
    /// ```rust
    /// use strictxml_base64::Base64Binary;
    ///
    /// let value = Base64Binary::encode("Hello".bytes());
    /// assert_eq!(value.to_string(), "SGVsbG8=");
    /// ```
    pub fn encode(iter: impl IntoIterator<Item = u8>) -> Self {
        Self {
            octets: iter.into_iter().collect(),
        }
    }

    /// The decoded octets.
    ///
    /// # Example
    /// ```rust
    /// use strictxml_base64::Base64Binary;
    ///
    /// let value = Base64Binary::from_encoded(*b"SGVsbG8=", false).unwrap();
    /// assert_eq!(value.decode(), b"Hello");
    /// ```
    pub fn decode(&self) -> &[u8] {
        &self.octets
    }

    /// The number of octets, used by the length facets.
    pub fn len(&self) -> usize {
        self.octets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.octets.is_empty()
    }

    /// Parse a Base64 lexical form.
    ///
    /// When `allow_whitespace` is true, ASCII whitespace is skipped.
    pub fn from_encoded(
        iter: impl IntoIterator<Item = u8>,
        allow_whitespace: bool,
    ) -> Result<Self, Base64Error> {
        let mut quantum = [0u8; 4];
        let mut filled = 0;
        let mut pads = 0;
        let mut octets = vec![];
        for (position, byte) in iter.into_iter().enumerate() {
            if allow_whitespace && byte.is_ascii_whitespace() {
                continue;
            }
            if byte == b'=' {
                // '=' may only fill the third and/or fourth place of the last quantum.
                if filled < 2 {
                    return Err(Base64Error::MalformedByte { byte, position });
                }
                pads += 1;
                quantum[filled] = 0;
                filled += 1;
            } else {
                let value = DECODING_TABLE[byte as usize];
                // nothing may follow padding
                if value == u8::MAX || pads > 0 {
                    return Err(Base64Error::MalformedByte { byte, position });
                }
                quantum[filled] = value;
                filled += 1;
            }

            if filled == 4 {
                let [b0, b1, b2, b3] = quantum;
                octets.push((b0 << 2) | (b1 >> 4));
                match pads {
                    0 => {
                        octets.push((b1 << 4) | (b2 >> 2));
                        octets.push((b2 << 6) | b3);
                    }
                    1 => {
                        if b2 & 0x3 != 0 {
                            return Err(Base64Error::NonZeroTrailingBits);
                        }
                        octets.push((b1 << 4) | (b2 >> 2));
                    }
                    _ => {
                        if b1 & 0xF != 0 {
                            return Err(Base64Error::NonZeroTrailingBits);
                        }
                    }
                }
                filled = 0;
            }
        }

        if filled != 0 {
            return Err(Base64Error::InsufficientPadding);
        }
        Ok(Self { octets })
    }
}

impl FromIterator<u8> for Base64Binary {
    fn from_iter<T: IntoIterator<Item = u8>>(iter: T) -> Self {
        Self::encode(iter)
    }
}

impl From<&[u8]> for Base64Binary {
    fn from(value: &[u8]) -> Self {
        Self::encode(value.iter().copied())
    }
}

impl From<Vec<u8>> for Base64Binary {
    fn from(octets: Vec<u8>) -> Self {
        Self { octets }
    }
}

impl std::fmt::Debug for Base64Binary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Base64Binary({self})")
    }
}

impl std::fmt::Display for Base64Binary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use std::fmt::Write as _;

        let symbol = |index: u8| ENCODING_TABLE[index as usize] as char;
        for chunk in self.octets.chunks(3) {
            match *chunk {
                [b0, b1, b2] => {
                    f.write_char(symbol(b0 >> 2))?;
                    f.write_char(symbol(((b0 & 0x3) << 4) | (b1 >> 4)))?;
                    f.write_char(symbol(((b1 & 0xF) << 2) | (b2 >> 6)))?;
                    f.write_char(symbol(b2 & 0x3F))?;
                }
                [b0, b1] => {
                    f.write_char(symbol(b0 >> 2))?;
                    f.write_char(symbol(((b0 & 0x3) << 4) | (b1 >> 4)))?;
                    f.write_char(symbol((b1 & 0xF) << 2))?;
                    f.write_char('=')?;
                }
                [b0] => {
                    f.write_char(symbol(b0 >> 2))?;
                    f.write_char(symbol((b0 & 0x3) << 4))?;
                    f.write_str("==")?;
                }
                _ => unreachable!(),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_shift32(seed: u32) -> impl Iterator<Item = u8> {
        let mut random = seed;
        std::iter::repeat_with(move || {
            random ^= random << 13;
            random ^= random >> 17;
            random ^= random << 5;
            random as u8
        })
    }

    #[test]
    fn regression_tests() {
        let mut bytes = xor_shift32(0x2545_F491);
        for len in 0..512 {
            let original = bytes.by_ref().take(len).collect::<Vec<_>>();
            let encoded = Base64Binary::encode(original.iter().copied()).to_string();
            assert_eq!(encoded.len(), len.div_ceil(3) * 4);
            let decoded = Base64Binary::from_encoded(encoded.bytes(), false).unwrap();
            assert_eq!(decoded.decode(), original.as_slice());
        }
    }

    #[test]
    fn whitespace_tests() {
        let value = Base64Binary::from_encoded(*b"SGVs\n bG8=", true).unwrap();
        assert_eq!(value.decode(), b"Hello");
        assert!(Base64Binary::from_encoded(*b"SGVs\n bG8=", false).is_err());
    }

    #[test]
    fn erroneous_encoded_bytes_tests() {
        assert!(Base64Binary::from_encoded(*b"", false).is_ok());
        assert!(Base64Binary::from_encoded(*b"a", false).is_err());
        assert!(Base64Binary::from_encoded(*b"aa", false).is_err());
        assert!(Base64Binary::from_encoded(*b"aaa", false).is_err());
        assert!(Base64Binary::from_encoded(*b"aaaaa", false).is_err());

        assert!(Base64Binary::from_encoded(*b"=", false).is_err());
        assert!(Base64Binary::from_encoded(*b"====", false).is_err());
        assert!(Base64Binary::from_encoded(*b"a===", false).is_err());
        assert!(Base64Binary::from_encoded(*b"QQ==QQ==", false).is_err());
        assert!(Base64Binary::from_encoded(*b"QQ=A", false).is_err());

        assert!(Base64Binary::from_encoded(*b"QQ==", false).is_ok());
        assert_eq!(
            Base64Binary::from_encoded(*b"QR==", false),
            Err(Base64Error::NonZeroTrailingBits)
        );
    }
}
