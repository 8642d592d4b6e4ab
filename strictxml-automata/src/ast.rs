use std::fmt::Display;

use crate::{Atom, util::complement_ranges};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ASTNodeType {
    Range,
    Catenation,
    Alternation,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
    Repeat,
}

/// A regular expression over the alphabet `A`.
///
/// Every `Range` leaf becomes one or more positions of the Glushkov automaton.
/// Leaves are numbered from left to right, and that number is reported back
/// as the "tag" of a position (see [`crate::fa::DFA::ambiguities`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ASTNode<A: Atom> {
    Range {
        start: A,
        end: A,
        negation: bool,
    },
    Catenation(Box<ASTNode<A>>, Box<ASTNode<A>>),
    Alternation(Box<ASTNode<A>>, Box<ASTNode<A>>),
    ZeroOrOne(Box<ASTNode<A>>),
    ZeroOrMore(Box<ASTNode<A>>),
    OneOrMore(Box<ASTNode<A>>),
    Repeat {
        node: Box<ASTNode<A>>,
        at_least: usize,
        at_most: Option<usize>,
    },
}

impl<A: Atom> ASTNode<A> {
    pub fn symbol(atom: A) -> Self {
        Self::Range {
            start: atom,
            end: atom,
            negation: false,
        }
    }

    /// Build `r1|r2|...` from a list of ranges.
    ///
    /// Returns `None` if `iter` is empty.
    pub fn alternate_all(mut iter: impl Iterator<Item = (A, A)>) -> Option<Self> {
        let (start, end) = iter.next()?;
        let mut ret = ASTNode::Range {
            start,
            end,
            negation: false,
        };
        for (start, end) in iter {
            debug_assert!(start <= end);
            let alt = ASTNode::Range {
                start,
                end,
                negation: false,
            };
            ret = ASTNode::Alternation(Box::new(ret), Box::new(alt));
        }
        Some(ret)
    }

    /// Build the alternation of every range not contained in `iter`.
    pub fn negate_all(iter: impl Iterator<Item = (A, A)>) -> Option<Self> {
        Self::alternate_all(complement_ranges(iter).into_iter())
    }

    pub fn catenate(left: Option<Self>, right: Option<Self>) -> Option<Self> {
        match (left, right) {
            (Some(left), Some(right)) => Some(Self::Catenation(Box::new(left), Box::new(right))),
            (left, None) => left,
            (None, right) => right,
        }
    }

    pub fn node_type(&self) -> ASTNodeType {
        match self {
            Self::Range { .. } => ASTNodeType::Range,
            Self::Catenation(_, _) => ASTNodeType::Catenation,
            Self::Alternation(_, _) => ASTNodeType::Alternation,
            Self::ZeroOrOne(_) => ASTNodeType::ZeroOrOne,
            Self::ZeroOrMore(_) => ASTNodeType::ZeroOrMore,
            Self::OneOrMore(_) => ASTNodeType::OneOrMore,
            Self::Repeat { .. } => ASTNodeType::Repeat,
        }
    }

    /// The number of `Range` leaves in this tree.
    pub fn leaves(&self) -> usize {
        match self {
            Self::Range { .. } => 1,
            Self::Catenation(left, right) | Self::Alternation(left, right) => {
                left.leaves() + right.leaves()
            }
            Self::ZeroOrOne(node)
            | Self::ZeroOrMore(node)
            | Self::OneOrMore(node)
            | Self::Repeat { node, .. } => node.leaves(),
        }
    }
}

impl<A: Atom + Display> Display for ASTNode<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn operand<A: Atom + Display>(
            f: &mut std::fmt::Formatter<'_>,
            node: &ASTNode<A>,
        ) -> std::fmt::Result {
            if matches!(node.node_type(), ASTNodeType::Range) {
                write!(f, "{node}")
            } else {
                write!(f, "({node})")
            }
        }

        match self {
            &Self::Range {
                start,
                end,
                negation,
            } => {
                if start == end && !negation {
                    write!(f, "{start}")
                } else if start == end {
                    write!(f, "[^{start}]")
                } else if negation {
                    write!(f, "[^{start}-{end}]")
                } else {
                    write!(f, "[{start}-{end}]")
                }
            }
            Self::Catenation(front, back) => write!(f, "{front}{back}"),
            Self::Alternation(left, right) => write!(f, "{left}|{right}"),
            Self::ZeroOrOne(node) => {
                operand(f, node)?;
                write!(f, "?")
            }
            Self::ZeroOrMore(node) => {
                operand(f, node)?;
                write!(f, "*")
            }
            Self::OneOrMore(node) => {
                operand(f, node)?;
                write!(f, "+")
            }
            Self::Repeat {
                node,
                at_least,
                at_most,
            } => {
                operand(f, node)?;
                match at_most {
                    Some(at_most) if at_most == at_least => write!(f, "{{{at_least}}}"),
                    Some(at_most) => write!(f, "{{{at_least},{at_most}}}"),
                    None => write!(f, "{{{at_least},}}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negate_all_tests() {
        let node = ASTNode::negate_all([('b', 'y')].into_iter()).unwrap();
        assert_eq!(node.leaves(), 2);
        assert_eq!(
            node.to_string(),
            format!("[{}-a]|[z-{}]", '\x00', char::MAX)
        );

        // the complement of everything is empty
        assert!(ASTNode::negate_all([(char::MIN, char::MAX)].into_iter()).is_none());
        assert!(ASTNode::<char>::alternate_all(std::iter::empty()).is_none());
    }
}
