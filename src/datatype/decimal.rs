use std::{cmp::Ordering, str::FromStr};

/// An arbitrary-precision decimal number, the value space of `xs:decimal`.
///
/// The digits are kept in normalized form: no leading zeros in the integer part,
/// no trailing zeros in the fraction part, and zero is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    negative: bool,
    integer: String,
    fraction: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseDecimalError;

impl Decimal {
    pub fn is_zero(&self) -> bool {
        self.integer.is_empty() && self.fraction.is_empty()
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_integer(&self) -> bool {
        self.fraction.is_empty()
    }

    /// The number of significant digits, as `totalDigits` counts them.
    pub fn total_digits(&self) -> usize {
        if self.is_zero() {
            return 1;
        }
        if self.integer.is_empty() {
            // leading zeros of the fraction part are not significant
            self.fraction.trim_start_matches('0').len()
        } else {
            self.integer.len() + self.fraction.len()
        }
    }

    pub fn fraction_digits(&self) -> usize {
        self.fraction.len()
    }

    /// Parse the lexical form of `xs:integer`.
    pub fn parse_integer(s: &str) -> Result<Self, ParseDecimalError> {
        if s.contains('.') {
            return Err(ParseDecimalError);
        }
        s.parse()
    }

    /// The canonical representation of `xs:decimal`, which always has a decimal point.
    pub fn to_canonical_decimal(&self) -> String {
        let mut ret = self.to_canonical_integer_part();
        ret.push('.');
        if self.fraction.is_empty() {
            ret.push('0');
        } else {
            ret.push_str(&self.fraction);
        }
        ret
    }

    /// The canonical representation of `xs:integer`.
    ///
    /// The fraction part is truncated.
    pub fn to_canonical_integer(&self) -> String {
        let ret = self.to_canonical_integer_part();
        if ret == "-0" { "0".to_owned() } else { ret }
    }

    fn to_canonical_integer_part(&self) -> String {
        let mut ret = String::with_capacity(self.integer.len() + 1);
        if self.negative {
            ret.push('-');
        }
        if self.integer.is_empty() {
            ret.push('0');
        } else {
            ret.push_str(&self.integer);
        }
        ret
    }

    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        self.integer
            .len()
            .cmp(&other.integer.len())
            .then_with(|| self.integer.cmp(&other.integer))
            .then_with(|| self.fraction.cmp(&other.fraction))
    }
}

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    /// ```text
    /// (\+|-)?([0-9]+(\.[0-9]*)?|\.[0-9]+)
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, rest) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        let (integer, fraction) = rest.split_once('.').unwrap_or((rest, ""));
        if integer.is_empty() && fraction.is_empty() {
            return Err(ParseDecimalError);
        }
        if !integer.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ParseDecimalError);
        }
        let integer = integer.trim_start_matches('0').to_owned();
        let fraction = fraction.trim_end_matches('0').to_owned();
        let negative = negative && !(integer.is_empty() && fraction.is_empty());
        Ok(Self {
            negative,
            integer,
            fraction,
        })
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.cmp_magnitude(other),
            (true, true) => other.cmp_magnitude(self),
        }
    }
}

impl std::fmt::Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.fraction.is_empty() {
            write!(f, "{}", self.to_canonical_integer())
        } else {
            write!(f, "{}", self.to_canonical_decimal())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn parse_tests() {
        assert_eq!(dec("+001.500").to_canonical_decimal(), "1.5");
        assert_eq!(dec("-0.0").to_canonical_decimal(), "0.0");
        assert_eq!(dec(".5").to_canonical_decimal(), "0.5");
        assert_eq!(dec("12.").to_canonical_integer(), "12");
        assert!("".parse::<Decimal>().is_err());
        assert!(".".parse::<Decimal>().is_err());
        assert!("1e3".parse::<Decimal>().is_err());
        assert!(Decimal::parse_integer("1.0").is_err());
    }

    #[test]
    fn order_tests() {
        assert!(dec("-10") < dec("-9.99"));
        assert!(dec("0.001") < dec("0.01"));
        assert!(dec("100") > dec("99.999"));
        assert_eq!(dec("5"), dec("5.000"));
    }

    #[test]
    fn digits_tests() {
        assert_eq!(dec("123.45").total_digits(), 5);
        assert_eq!(dec("0.0012").total_digits(), 2);
        assert_eq!(dec("0").total_digits(), 1);
        assert_eq!(dec("1.230").fraction_digits(), 2);
    }
}
