//! Finite automata shared by the validators of `strictxml`.
//!
//! Two clients use this crate: element content models (DTD children content and
//! XML Schema particles) and the regular expressions of the XML Schema `pattern` facet.
//! Both build an [`ast::ASTNode`] over some alphabet and compile it into a
//! [`fa::DFA`] through the Glushkov position automaton.

pub mod ast;
pub mod fa;
pub mod unicode;
pub mod util;
pub mod xsregexp;

/// A symbol of an automaton alphabet.
///
/// The alphabet must be totally ordered and every symbol except the bounds must have
/// a predecessor and a successor, so that sets of symbols can be expressed as ranges.
pub trait Atom: Clone + Copy + PartialOrd + Ord + PartialEq + Eq + Default + std::fmt::Debug {
    const MIN: Self;
    const MAX: Self;

    fn previous(&self) -> Option<Self>;
    fn next(&self) -> Option<Self>;
}

impl Atom for char {
    const MIN: Self = '\x00';
    const MAX: Self = char::MAX;

    fn previous(&self) -> Option<Self> {
        match *self as u32 {
            0 => None,
            // skip the surrogate block
            0xE000 => Some('\u{D7FF}'),
            c => char::from_u32(c - 1),
        }
    }

    fn next(&self) -> Option<Self> {
        match *self as u32 {
            0xD7FF => Some('\u{E000}'),
            c => char::from_u32(c + 1),
        }
    }
}

/// Identifier of an element name (or a namespace class) in a content model alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct NameID(pub u32);

impl Atom for NameID {
    const MIN: Self = Self(0);
    const MAX: Self = Self(u32::MAX);

    fn previous(&self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }

    fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl std::fmt::Display for NameID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
