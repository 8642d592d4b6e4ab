//! Implement the regular expressions described in
//! [XML Schema Part 2: Datatypes Second Edition Appendix F Regular Expressions](https://www.w3.org/TR/xmlschema-2/#regexs).
//!
//! Patterns are implicitly anchored at both ends, so [`XSRegexp::is_match`] checks
//! the whole input. A pattern is matched with a DFA unless determinization needs more
//! than [`MAX_DFA_STATES`] states, as `(a|b)*a(a|b){20}` does. Such patterns are
//! matched by simulating the position automaton.

use crate::{
    ast::ASTNode,
    fa::{AssembleError, DFA, NFA},
    unicode::{CategoryTable, search_block_range},
    util::{complement_ranges, difference_ranges, normalize_ranges, union_ranges},
};

/// Quantities larger than this are rejected before the automaton is built.
const MAX_QUANTITY: usize = 10000;
/// Patterns whose DFA needs more states than this fall back to the NFA.
pub const MAX_DFA_STATES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegexpError {
    SyntaxError,
    TooLargeQuantity,
    InvalidQuantifier,
    InvalidCharacter,
    InvalidCharRange,
    InvalidCharProp,
    InvalidBlock,
    TooComplex,
}

impl std::fmt::Display for RegexpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for RegexpError {}

#[derive(Debug, Clone)]
enum Matcher {
    DFA(DFA<char>),
    NFA(NFA<char>),
}

#[derive(Debug, Clone)]
pub struct XSRegexp {
    pattern: String,
    matcher: Matcher,
}

impl XSRegexp {
    /// Compile `pattern` with a private category table.
    pub fn compile(pattern: &str) -> Result<XSRegexp, RegexpError> {
        Self::compile_with(pattern, &CategoryTable::new())
    }

    /// Compile `pattern`, looking up `\p{..}` categories in `tables`.
    pub fn compile_with(pattern: &str, tables: &CategoryTable) -> Result<XSRegexp, RegexpError> {
        let mut parser = RegexpParser {
            rest: pattern,
            tables,
        };
        let ast = parser.parse_regexp()?;
        if !parser.rest.is_empty() {
            return Err(RegexpError::SyntaxError);
        }
        let nfa = NFA::build(ast.as_ref()).map_err(|_| RegexpError::TooComplex)?;
        let matcher = match nfa.determinize(MAX_DFA_STATES) {
            Ok(dfa) => Matcher::DFA(dfa),
            Err(AssembleError::TooManyStates) => Matcher::NFA(nfa),
            Err(AssembleError::TooManyPositions) => return Err(RegexpError::TooComplex),
        };
        Ok(Self {
            pattern: pattern.to_owned(),
            matcher,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, input: &str) -> bool {
        match &self.matcher {
            Matcher::DFA(dfa) => dfa.is_match(input.chars()),
            Matcher::NFA(nfa) => nfa.is_match(input.chars()),
        }
    }

    /// Check if the pattern is matched without a DFA.
    pub fn is_simulated(&self) -> bool {
        matches!(self.matcher, Matcher::NFA(_))
    }
}

/// The set of no characters. Its complement is empty, so it never matches.
fn nothing() -> ASTNode<char> {
    ASTNode::Range {
        start: '\0',
        end: char::MAX,
        negation: true,
    }
}

fn class_to_ast(ranges: Vec<(char, char)>) -> ASTNode<char> {
    ASTNode::alternate_all(ranges.into_iter()).unwrap_or_else(nothing)
}

fn is_single_char_esc(c: char) -> bool {
    matches!(
        c,
        'n' | 'r'
            | 't'
            | '\\'
            | '|'
            | '.'
            | '?'
            | '*'
            | '+'
            | '('
            | ')'
            | '{'
            | '}'
            | '-'
            | '['
            | ']'
            | '^'
    )
}

/// [37] MultiCharEsc  ::= '\' [sSiIcCdDwW]
fn multi_char_esc(c: char, tables: &CategoryTable) -> Option<Vec<(char, char)>> {
    const SPACE: &[(char, char)] = &[('\t', '\n'), ('\r', '\r'), (' ', ' ')];
    const NAME_START: &[(char, char)] = &[
        (':', ':'),
        ('A', 'Z'),
        ('_', '_'),
        ('a', 'z'),
        ('\u{C0}', '\u{D6}'),
        ('\u{D8}', '\u{F6}'),
        ('\u{F8}', '\u{2FF}'),
        ('\u{370}', '\u{37D}'),
        ('\u{37F}', '\u{1FFF}'),
        ('\u{200C}', '\u{200D}'),
        ('\u{2070}', '\u{218F}'),
        ('\u{2C00}', '\u{2FEF}'),
        ('\u{3001}', '\u{D7FF}'),
        ('\u{F900}', '\u{FDCF}'),
        ('\u{FDF0}', '\u{FFFD}'),
        ('\u{10000}', '\u{EFFFF}'),
    ];
    const NAME_EXTRA: &[(char, char)] = &[
        ('-', '.'),
        ('0', '9'),
        ('\u{B7}', '\u{B7}'),
        ('\u{300}', '\u{36F}'),
        ('\u{203F}', '\u{2040}'),
    ];

    let lower = c.to_ascii_lowercase();
    let positive = match lower {
        's' => SPACE.to_vec(),
        'i' => NAME_START.to_vec(),
        'c' => union_ranges(
            NAME_START.iter().copied(),
            NAME_EXTRA.iter().copied(),
        ),
        'd' => tables.category("Nd")?.to_vec(),
        // \w is every character except punctuation, separators and "other".
        'w' => {
            let excluded = ["P", "Z", "C"]
                .into_iter()
                .filter_map(|name| tables.category(name))
                .flat_map(|ranges| ranges.to_vec());
            complement_ranges(excluded)
        }
        _ => return None,
    };
    if c == lower {
        Some(normalize_ranges(positive.into_iter()))
    } else {
        Some(complement_ranges(positive.into_iter()))
    }
}

struct RegexpParser<'a> {
    rest: &'a str,
    tables: &'a CategoryTable,
}

impl RegexpParser<'_> {
    fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.rest = &self.rest[c.len_utf8()..];
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if let Some(rem) = self.rest.strip_prefix(c) {
            self.rest = rem;
            true
        } else {
            false
        }
    }

    /// [1] regExp ::= branch ( '|' branch )*
    ///
    /// `None` is the empty expression.
    fn parse_regexp(&mut self) -> Result<Option<ASTNode<char>>, RegexpError> {
        let mut branches = vec![self.parse_branch()?];
        while self.eat('|') {
            branches.push(self.parse_branch()?);
        }
        let nullable = branches.iter().any(Option::is_none);
        let ret = branches
            .into_iter()
            .flatten()
            .reduce(|left, right| ASTNode::Alternation(Box::new(left), Box::new(right)));
        Ok(match ret {
            Some(ret) if nullable => Some(ASTNode::ZeroOrOne(Box::new(ret))),
            ret => ret,
        })
    }

    /// [2] branch ::= piece*
    fn parse_branch(&mut self) -> Result<Option<ASTNode<char>>, RegexpError> {
        let mut ret = None;
        while !self.rest.is_empty() && !self.rest.starts_with(['|', ')']) {
            let piece = self.parse_piece()?;
            ret = ASTNode::catenate(ret, piece);
        }
        Ok(ret)
    }

    /// [3] piece ::= atom quantifier?
    fn parse_piece(&mut self) -> Result<Option<ASTNode<char>>, RegexpError> {
        let atom = self.parse_atom()?;
        // [4] quantifier ::= [?*+] | ( '{' quantity '}' )
        let wrap = |atom: Option<ASTNode<char>>, f: fn(Box<ASTNode<char>>) -> ASTNode<char>| {
            atom.map(|atom| f(Box::new(atom)))
        };
        match self.peek() {
            Some('?') => {
                self.bump();
                Ok(wrap(atom, ASTNode::ZeroOrOne))
            }
            Some('*') => {
                self.bump();
                Ok(wrap(atom, ASTNode::ZeroOrMore))
            }
            Some('+') => {
                self.bump();
                Ok(wrap(atom, ASTNode::OneOrMore))
            }
            Some('{') => {
                self.bump();
                let (at_least, at_most) = self.parse_quantity()?;
                Ok(atom.map(|atom| ASTNode::Repeat {
                    node: Box::new(atom),
                    at_least,
                    at_most,
                }))
            }
            _ => Ok(atom),
        }
    }

    fn parse_number(&mut self) -> Result<usize, RegexpError> {
        let len = self
            .rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.rest.len());
        if len == 0 {
            return Err(RegexpError::SyntaxError);
        }
        let value = self.rest[..len]
            .parse::<usize>()
            .map_err(|_| RegexpError::TooLargeQuantity)?;
        self.rest = &self.rest[len..];
        if value > MAX_QUANTITY {
            return Err(RegexpError::TooLargeQuantity);
        }
        Ok(value)
    }

    /// [5] quantity   ::= quantRange | quantMin | QuantExact
    /// [6] quantRange ::= QuantExact ',' QuantExact
    /// [7] quantMin   ::= QuantExact ','
    fn parse_quantity(&mut self) -> Result<(usize, Option<usize>), RegexpError> {
        let at_least = self.parse_number()?;
        let at_most = if self.eat(',') {
            if self.peek() == Some('}') {
                None
            } else {
                let at_most = self.parse_number()?;
                if at_most < at_least {
                    return Err(RegexpError::InvalidQuantifier);
                }
                Some(at_most)
            }
        } else {
            Some(at_least)
        };
        if !self.eat('}') {
            return Err(RegexpError::SyntaxError);
        }
        Ok((at_least, at_most))
    }

    /// [9] atom ::= Char | charClass | ( '(' regExp ')' )
    fn parse_atom(&mut self) -> Result<Option<ASTNode<char>>, RegexpError> {
        match self.peek() {
            Some('(') => {
                self.bump();
                let inner = self.parse_regexp()?;
                if !self.eat(')') {
                    return Err(RegexpError::SyntaxError);
                }
                Ok(inner)
            }
            Some('[') => {
                self.bump();
                let ranges = self.parse_char_class_expr()?;
                Ok(Some(class_to_ast(ranges)))
            }
            // [37a] WildcardEsc ::= '.'
            Some('.') => {
                self.bump();
                Ok(Some(class_to_ast(complement_ranges(
                    [('\n', '\n'), ('\r', '\r')].into_iter(),
                ))))
            }
            Some('\\') => {
                let ranges = self.parse_escape()?;
                Ok(Some(class_to_ast(ranges)))
            }
            // [10] Char ::= [^.\?*+()|#x5B#x5D]
            Some('?' | '*' | '+' | ')' | '|' | ']') | None => Err(RegexpError::InvalidCharacter),
            Some(c) => {
                self.bump();
                Ok(Some(ASTNode::symbol(c)))
            }
        }
    }

    /// [12] charClassExpr ::= '[' charGroup ']'
    /// [13] charGroup     ::= posCharGroup | negCharGroup | charClassSub
    ///
    /// The leading '[' has already been consumed.
    fn parse_char_class_expr(&mut self) -> Result<Vec<(char, char)>, RegexpError> {
        let negation = self.eat('^');
        let mut ranges = self.parse_pos_char_group()?;
        if negation {
            ranges = complement_ranges(ranges.into_iter());
        }
        // [16] charClassSub ::= ( posCharGroup | negCharGroup ) '-' charClassExpr
        if self.rest.starts_with("-[") {
            self.rest = &self.rest[2..];
            let sub = self.parse_char_class_expr()?;
            ranges = difference_ranges(ranges.into_iter(), sub.into_iter());
        }
        if !self.eat(']') {
            return Err(RegexpError::SyntaxError);
        }
        Ok(ranges)
    }

    /// [14] posCharGroup ::= ( charRange | charClassEsc )+
    fn parse_pos_char_group(&mut self) -> Result<Vec<(char, char)>, RegexpError> {
        let mut ranges = vec![];
        let mut first = true;
        loop {
            match self.peek() {
                None => return Err(RegexpError::SyntaxError),
                Some(']') if !first => break,
                Some('-') if self.rest.starts_with("-[") && !first => break,
                Some('-') if !first && !self.rest.starts_with("-]") => {
                    // A hyphen in the middle of a group must start a range.
                    return Err(RegexpError::SyntaxError);
                }
                _ => {}
            }

            let start = match self.peek() {
                Some('\\') => {
                    let escaped = self.rest[1..].chars().next();
                    match escaped {
                        Some(c) if is_single_char_esc(c) => {
                            self.rest = &self.rest[1 + c.len_utf8()..];
                            single_char(c)
                        }
                        _ => {
                            ranges.extend(self.parse_escape()?);
                            first = false;
                            continue;
                        }
                    }
                }
                Some('[') => return Err(RegexpError::InvalidCharacter),
                Some(c) => {
                    self.bump();
                    c
                }
                None => return Err(RegexpError::SyntaxError),
            };

            // [18] seRange ::= charOrEsc '-' charOrEsc
            let end = if self.rest.starts_with('-')
                && !self.rest.starts_with("-[")
                && !self.rest.starts_with("-]")
            {
                self.bump();
                match self.bump() {
                    Some('\\') => match self.bump() {
                        Some(c) if is_single_char_esc(c) => single_char(c),
                        _ => return Err(RegexpError::InvalidCharacter),
                    },
                    Some('[' | ']') | None => return Err(RegexpError::InvalidCharacter),
                    Some(c) => c,
                }
            } else {
                start
            };
            if start > end {
                return Err(RegexpError::InvalidCharRange);
            }
            ranges.push((start, end));
            first = false;
        }
        Ok(normalize_ranges(ranges.into_iter()))
    }

    /// [23] charClassEsc ::= ( SingleCharEsc | MultiCharEsc | catEsc | complEsc )
    fn parse_escape(&mut self) -> Result<Vec<(char, char)>, RegexpError> {
        if !self.eat('\\') {
            return Err(RegexpError::SyntaxError);
        }
        match self.bump() {
            Some(c) if is_single_char_esc(c) => {
                let c = single_char(c);
                Ok(vec![(c, c)])
            }
            // [25] catEsc   ::= '\p{' charProp '}'
            // [26] complEsc ::= '\P{' charProp '}'
            Some(c @ ('p' | 'P')) => {
                if !self.eat('{') {
                    return Err(RegexpError::SyntaxError);
                }
                let end = self.rest.find('}').ok_or(RegexpError::SyntaxError)?;
                let name = &self.rest[..end];
                self.rest = &self.rest[end + 1..];
                let ranges = self.parse_char_prop(name)?;
                if c == 'p' {
                    Ok(ranges)
                } else {
                    Ok(complement_ranges(ranges.into_iter()))
                }
            }
            Some(c) => multi_char_esc(c, self.tables).ok_or(RegexpError::InvalidCharacter),
            None => Err(RegexpError::SyntaxError),
        }
    }

    /// [27] charProp ::= IsCategory | IsBlock
    fn parse_char_prop(&self, name: &str) -> Result<Vec<(char, char)>, RegexpError> {
        if let Some(block) = name.strip_prefix("Is") {
            let (start, end) = search_block_range(block).ok_or(RegexpError::InvalidBlock)?;
            return Ok(vec![(start, end)]);
        }
        self.tables
            .category(name)
            .map(|ranges| ranges.to_vec())
            .ok_or(RegexpError::InvalidCharProp)
    }
}

/// [24] SingleCharEsc ::= '\' [nrt\|.?*+(){}#x2D#x5B#x5D#x5E]
fn single_char(c: char) -> char {
    match c {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        c => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_matching_tests() {
        let re = XSRegexp::compile("").unwrap();
        assert!(re.is_match(""));
        assert!(!re.is_match("a"));

        let re = XSRegexp::compile("a+(c|b?)c").unwrap();
        assert!(re.is_match("ac"));
        assert!(re.is_match("aac"));
        assert!(re.is_match("abc"));
        assert!(re.is_match("acc"));
        assert!(!re.is_match("bc"));
        assert!(!re.is_match("a"));

        let re = XSRegexp::compile("a|").unwrap();
        assert!(re.is_match(""));
        assert!(re.is_match("a"));

        let re = XSRegexp::compile("[^abde]").unwrap();
        assert!(re.is_match("c"));
        assert!(!re.is_match("a"));
        assert!(!re.is_match(""));

        let re = XSRegexp::compile("[a-z-[aeiou]]+").unwrap();
        assert!(re.is_match("xyz"));
        assert!(!re.is_match("xaz"));

        let re = XSRegexp::compile(r"\d{3}-\d{4}").unwrap();
        assert!(re.is_match("555-1234"));
        assert!(!re.is_match("5555-123"));

        let re = XSRegexp::compile(r"[+\-]?\p{Lu}\w*").unwrap();
        assert!(re.is_match("-Abc1"));
        assert!(!re.is_match("-Abc_1"));
        assert!(!re.is_match("abc"));
        assert!(!re.is_match("A b"));

        let re = XSRegexp::compile(r"\i\c*").unwrap();
        assert!(re.is_match("xs:element"));
        assert!(!re.is_match("1abc"));

        let re = XSRegexp::compile(r"\p{IsBasicLatin}{2,3}").unwrap();
        assert!(re.is_match("ab"));
        assert!(re.is_match("abc"));
        assert!(!re.is_match("abcd"));
        assert!(!re.is_match("\u{E9}a"));

        let re = XSRegexp::compile("[-a]").unwrap();
        assert!(re.is_match("-"));
        assert!(re.is_match("a"));
    }

    #[test]
    fn large_pattern_tests() {
        // the DFA of this pattern needs 2^21 states
        let re = XSRegexp::compile("(a|b)*a(a|b){20}").unwrap();
        assert!(re.is_simulated());
        let hit = format!("bba{}", "b".repeat(20));
        assert!(re.is_match(&hit));
        assert!(re.is_match(&format!("ab{}", "a".repeat(19))));
        assert!(!re.is_match(&"b".repeat(30)));
        assert!(!re.is_match(&format!("a{}", "b".repeat(19))));
        assert!(!re.is_match(&format!("{hit}c")));

        let re = XSRegexp::compile(r"\p{L}{1,300}").unwrap();
        assert!(!re.is_simulated());
        assert!(re.is_match("a"));
        assert!(re.is_match(&"\u{E9}".repeat(300)));
        assert!(!re.is_match(&"x".repeat(301)));
        assert!(!re.is_match(""));
        assert!(!re.is_match("a1"));

        let re = XSRegexp::compile("[^<]{0,10000}").unwrap();
        assert!(re.is_match(&"y".repeat(10000)));
        assert!(!re.is_match("<"));
    }

    #[test]
    fn regex_error_tests() {
        assert_eq!(
            XSRegexp::compile("a{3,2}").unwrap_err(),
            RegexpError::InvalidQuantifier
        );
        assert_eq!(XSRegexp::compile("(a").unwrap_err(), RegexpError::SyntaxError);
        assert_eq!(XSRegexp::compile("a)").unwrap_err(), RegexpError::SyntaxError);
        assert_eq!(
            XSRegexp::compile("[z-a]").unwrap_err(),
            RegexpError::InvalidCharRange
        );
        assert_eq!(
            XSRegexp::compile(r"\p{Foo}").unwrap_err(),
            RegexpError::InvalidCharProp
        );
        assert_eq!(
            XSRegexp::compile(r"\p{IsFoo}").unwrap_err(),
            RegexpError::InvalidBlock
        );
        assert_eq!(
            XSRegexp::compile("a{99999}").unwrap_err(),
            RegexpError::TooLargeQuantity
        );
        assert_eq!(XSRegexp::compile("*a").unwrap_err(), RegexpError::InvalidCharacter);
    }
}
