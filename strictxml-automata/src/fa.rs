//! Glushkov position automata and their determinization.
//!
//! Every `Range` leaf of an [`ASTNode`] becomes a position, except that an alternation
//! of disjoint ranges (a character class, or a choice of element names) shares a single
//! position. After `nullable`, `first`, `last` and `follow` are computed for the tree,
//! the subset construction produces a [`DFA`] whose alphabet is partitioned into the
//! maximal ranges on which all positions agree. Expressions whose DFA would be too large
//! can be matched by simulating the [`NFA`] instead.
//!
//! [`assemble_counted`] keeps a large `x{n,m}` of a single class as one position with a
//! [`Counter`] rather than `m` copies of `x`. The count is carried beside the DFA state,
//! see [`DFA::step`].

use std::collections::{BTreeSet, HashMap};

use crate::{
    Atom,
    ast::ASTNode,
    util::{complement_ranges, contains},
};

/// Upper bound of the number of positions of one automaton.
const MAX_POSITIONS: usize = 1 << 17;
/// Upper bound of the number of DFA states of one automaton.
const MAX_STATES: usize = 1 << 17;
/// Upper bound of `states * classes`, the size of a transition table.
const MAX_TRANSITIONS: usize = 1 << 22;
/// Repetitions of a class whose bounds exceed this are counted instead of expanded.
pub const COUNTING_THRESHOLD: usize = 32;
const DEAD: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssembleError {
    TooManyPositions,
    TooManyStates,
}

impl std::fmt::Display for AssembleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for AssembleError {}

/// The occurrence bounds of a counted position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Counter {
    pub min: usize,
    /// `None` means unbounded.
    pub max: Option<usize>,
    /// An enclosing loop may start the repetition over once it is complete.
    pub restart: bool,
}

#[derive(Debug, Default)]
struct PositionInfo {
    nullable: bool,
    first: Vec<usize>,
    last: Vec<usize>,
}

impl PositionInfo {
    fn single(pos: usize) -> Self {
        Self {
            nullable: false,
            first: vec![pos],
            last: vec![pos],
        }
    }
}

/// The ranges of `node`, each with the tag of its leaf, if `node` matches exactly one
/// atom out of pairwise disjoint ranges.
fn class_label<A: Atom>(node: &ASTNode<A>, tag: usize) -> Option<Vec<((A, A), usize)>> {
    fn collect<A: Atom>(
        node: &ASTNode<A>,
        tag: usize,
        out: &mut Vec<((A, A), usize)>,
    ) -> Option<()> {
        match node {
            &ASTNode::Range {
                start,
                end,
                negation: false,
            } => out.push(((start, end), tag)),
            &ASTNode::Range {
                start,
                end,
                negation: true,
            } => out.extend(
                complement_ranges(std::iter::once((start, end)))
                    .into_iter()
                    .map(|range| (range, tag)),
            ),
            // `alternate_all` nests to the left, so a mismatch is found sooner on the right
            ASTNode::Alternation(left, right) => {
                collect(right, tag + left.leaves(), out)?;
                collect(left, tag, out)?;
            }
            _ => return None,
        }
        Some(())
    }

    let mut ranges = vec![];
    collect(node, tag, &mut ranges)?;
    ranges.sort_unstable();
    ranges
        .windows(2)
        .all(|w| w[0].0.1 < w[1].0.0)
        .then_some(ranges)
}

fn class_of<A: Atom>(bounds: &[A], atom: A) -> usize {
    bounds.partition_point(|&b| b <= atom) - 1
}

#[derive(Debug)]
struct Glushkov<A: Atom> {
    labels: Vec<Vec<(A, A)>>,
    // the leaf tag of each range of `labels`
    range_tags: Vec<Vec<usize>>,
    tags: Vec<usize>,
    follow: Vec<BTreeSet<usize>>,
    counters: Vec<Option<Counter>>,
    counting: bool,
}

impl<A: Atom> Glushkov<A> {
    fn new(counting: bool) -> Self {
        Self {
            labels: vec![],
            range_tags: vec![],
            tags: vec![],
            follow: vec![],
            counters: vec![],
            counting,
        }
    }

    fn position(&mut self, label: Vec<(A, A)>, tag: usize) -> Result<usize, AssembleError> {
        let range_tags = vec![tag; label.len()];
        self.tagged_position(label, range_tags, tag)
    }

    fn class_position(&mut self, class: Vec<((A, A), usize)>) -> Result<usize, AssembleError> {
        let tag = class.iter().map(|&(_, tag)| tag).min().unwrap_or_default();
        let (label, range_tags) = class.into_iter().unzip();
        self.tagged_position(label, range_tags, tag)
    }

    fn tagged_position(
        &mut self,
        label: Vec<(A, A)>,
        range_tags: Vec<usize>,
        tag: usize,
    ) -> Result<usize, AssembleError> {
        if self.labels.len() >= MAX_POSITIONS {
            return Err(AssembleError::TooManyPositions);
        }
        let pos = self.labels.len();
        self.labels.push(label);
        self.range_tags.push(range_tags);
        self.tags.push(tag);
        self.follow.push(BTreeSet::new());
        self.counters.push(None);
        Ok(pos)
    }

    fn epsilon() -> PositionInfo {
        PositionInfo {
            nullable: true,
            first: vec![],
            last: vec![],
        }
    }

    fn catenate(&mut self, front: PositionInfo, back: PositionInfo) -> PositionInfo {
        for &p in &front.last {
            self.follow[p].extend(back.first.iter().copied());
        }
        let mut first = front.first;
        if front.nullable {
            first.extend(back.first.iter().copied());
        }
        let mut last = back.last;
        if back.nullable {
            last.extend(front.last);
        }
        PositionInfo {
            nullable: front.nullable && back.nullable,
            first,
            last,
        }
    }

    fn optional(info: PositionInfo) -> PositionInfo {
        PositionInfo {
            nullable: true,
            ..info
        }
    }

    fn loop_back(&mut self, info: &PositionInfo) {
        for &p in &info.last {
            self.follow[p].extend(info.first.iter().copied());
            if info.first.contains(&p)
                && let Some(counter) = self.counters[p].as_mut()
            {
                counter.restart = true;
            }
        }
    }

    fn is_counted(&self, at_least: usize, at_most: Option<usize>) -> bool {
        self.counting
            && (at_least > COUNTING_THRESHOLD
                || at_most.is_some_and(|at_most| at_most > COUNTING_THRESHOLD))
    }

    /// `tag` is the index of the leftmost leaf of `node` in the original tree.
    fn build(&mut self, node: &ASTNode<A>, tag: usize) -> Result<PositionInfo, AssembleError> {
        match node {
            &ASTNode::Range {
                start,
                end,
                negation,
            } => {
                let label = if negation {
                    complement_ranges(std::iter::once((start, end)))
                } else {
                    vec![(start, end)]
                };
                let pos = self.position(label, tag)?;
                Ok(PositionInfo::single(pos))
            }
            ASTNode::Catenation(front, back) => {
                let front_info = self.build(front, tag)?;
                let back_info = self.build(back, tag + front.leaves())?;
                Ok(self.catenate(front_info, back_info))
            }
            ASTNode::Alternation(left, right) => {
                if let Some(class) = class_label(node, tag) {
                    let pos = self.class_position(class)?;
                    return Ok(PositionInfo::single(pos));
                }
                let mut left_info = self.build(left, tag)?;
                let right_info = self.build(right, tag + left.leaves())?;
                left_info.nullable |= right_info.nullable;
                left_info.first.extend(right_info.first);
                left_info.last.extend(right_info.last);
                Ok(left_info)
            }
            ASTNode::ZeroOrOne(node) => Ok(Self::optional(self.build(node, tag)?)),
            ASTNode::ZeroOrMore(node) => {
                let info = self.build(node, tag)?;
                self.loop_back(&info);
                Ok(Self::optional(info))
            }
            ASTNode::OneOrMore(node) => {
                let info = self.build(node, tag)?;
                self.loop_back(&info);
                Ok(info)
            }
            &ASTNode::Repeat {
                ref node,
                at_least,
                at_most,
            } => {
                if self.is_counted(at_least, at_most)
                    && let Some(class) = class_label(node, tag)
                {
                    let pos = self.class_position(class)?;
                    self.follow[pos].insert(pos);
                    self.counters[pos] = Some(Counter {
                        min: at_least,
                        max: at_most,
                        restart: false,
                    });
                    return Ok(PositionInfo {
                        nullable: at_least == 0,
                        ..PositionInfo::single(pos)
                    });
                }

                let optional = match at_most {
                    Some(at_most) => at_most.saturating_sub(at_least),
                    None => 0,
                };
                if at_least.saturating_add(optional) > MAX_POSITIONS {
                    return Err(AssembleError::TooManyPositions);
                }

                let mut ret = Self::epsilon();
                for _ in 0..at_least {
                    let copy = self.build(node, tag)?;
                    ret = self.catenate(ret, copy);
                }
                if at_most.is_none() {
                    let copy = self.build(node, tag)?;
                    self.loop_back(&copy);
                    ret = self.catenate(ret, Self::optional(copy));
                } else {
                    // x{0,3} is expanded to (x(x(x)?)?)? to keep the automaton small.
                    let mut tail = None::<PositionInfo>;
                    for _ in 0..optional {
                        let copy = self.build(node, tag)?;
                        tail = Some(match tail {
                            Some(tail) => Self::optional(self.catenate(copy, tail)),
                            None => Self::optional(copy),
                        });
                    }
                    if let Some(tail) = tail {
                        ret = self.catenate(ret, tail);
                    }
                }
                Ok(ret)
            }
        }
    }
}

/// A position automaton.
///
/// [`NFA::is_match`] tracks the set of positions reached so far, so matching costs
/// more per atom than with a [`DFA`] but nothing has to be determinized.
#[derive(Debug, Clone)]
pub struct NFA<A: Atom> {
    labels: Vec<Vec<(A, A)>>,
    range_tags: Vec<Vec<usize>>,
    tags: Vec<usize>,
    follow: Vec<Vec<usize>>,
    first: Vec<usize>,
    is_last: Vec<bool>,
    nullable: bool,
    counters: Vec<Option<Counter>>,
}

impl<A: Atom> NFA<A> {
    /// Build the position automaton of `ast`. `None` is the empty expression that only
    /// accepts the empty sequence.
    pub fn build(ast: Option<&ASTNode<A>>) -> Result<Self, AssembleError> {
        Self::build_with(ast, false)
    }

    // Counted positions are only created for `assemble_counted`, which always
    // determinizes, so `is_match` never sees them.
    fn build_with(ast: Option<&ASTNode<A>>, counting: bool) -> Result<Self, AssembleError> {
        let mut glushkov = Glushkov::new(counting);
        let info = match ast {
            Some(ast) => glushkov.build(ast, 0)?,
            None => Glushkov::<A>::epsilon(),
        };
        let mut is_last = vec![false; glushkov.labels.len()];
        for &p in &info.last {
            is_last[p] = true;
        }
        let mut first = info.first;
        first.sort_unstable();
        first.dedup();
        Ok(Self {
            labels: glushkov.labels,
            range_tags: glushkov.range_tags,
            tags: glushkov.tags,
            follow: glushkov
                .follow
                .into_iter()
                .map(|follow| follow.into_iter().collect())
                .collect(),
            first,
            is_last,
            nullable: info.nullable,
            counters: glushkov.counters,
        })
    }

    pub fn position_count(&self) -> usize {
        self.labels.len()
    }

    pub fn is_match(&self, input: impl IntoIterator<Item = A>) -> bool {
        let mut current: Option<Vec<usize>> = None;
        let mut marks = vec![false; self.labels.len()];
        for atom in input {
            let candidates = match &current {
                None => self.first.clone(),
                Some(current) => current
                    .iter()
                    .flat_map(|&p| self.follow[p].iter().copied())
                    .collect(),
            };
            let mut next = vec![];
            for q in candidates {
                if !marks[q] && contains(&self.labels[q], atom) {
                    marks[q] = true;
                    next.push(q);
                }
            }
            if next.is_empty() {
                return false;
            }
            for &q in &next {
                marks[q] = false;
            }
            current = Some(next);
        }
        match current {
            None => self.nullable,
            Some(current) => current.iter().any(|&q| self.is_last[q]),
        }
    }

    /// Run the subset construction. Fails with [`AssembleError::TooManyStates`] if more
    /// than `max_states` states would be needed.
    pub fn determinize(&self, max_states: usize) -> Result<DFA<A>, AssembleError> {
        let max_states = max_states.min(MAX_STATES);
        let mut bounds = vec![A::MIN];
        for label in &self.labels {
            for &(start, end) in label {
                bounds.push(start);
                if let Some(next) = end.next() {
                    bounds.push(next);
                }
            }
        }
        bounds.sort_unstable();
        bounds.dedup();
        let width = bounds.len();

        // The initial state is the only one with no positions.
        let mut states: Vec<Vec<usize>> = vec![vec![]];
        let mut ids = HashMap::from([(vec![], 0u32)]);
        let mut transitions = vec![];
        let mut accepts = vec![self.nullable];
        let mut ambiguities = BTreeSet::new();
        for (p, counter) in self.counters.iter().enumerate() {
            // the repetition may go on or start over
            if let Some(counter) = counter
                && counter.restart
                && counter.max != Some(counter.min)
            {
                ambiguities.insert((self.tags[p], self.tags[p]));
            }
        }

        // the positions and leaf tags that match each class
        let mut by_class: Vec<Vec<(usize, usize)>> = vec![vec![]; width];
        let mut current = 0;
        while current < states.len() {
            let candidates: Vec<usize> = if current == 0 {
                self.first.clone()
            } else {
                let mut set = BTreeSet::new();
                for &p in &states[current] {
                    set.extend(self.follow[p].iter().copied());
                }
                set.into_iter().collect()
            };

            by_class.iter_mut().for_each(Vec::clear);
            for &q in &candidates {
                for (&(start, end), &tag) in self.labels[q].iter().zip(&self.range_tags[q]) {
                    for class in class_of(&bounds, start)..=class_of(&bounds, end) {
                        by_class[class].push((q, tag));
                    }
                }
            }

            for entries in &by_class {
                if entries.is_empty() {
                    transitions.push(DEAD);
                    continue;
                }
                let matched = entries.iter().map(|&(q, _)| q).collect::<Vec<_>>();

                let tags = entries
                    .iter()
                    .map(|&(_, tag)| tag)
                    .collect::<BTreeSet<_>>();
                let mut tags = tags.into_iter();
                if let Some(first) = tags.next() {
                    for other in tags {
                        ambiguities.insert((first, other));
                    }
                }
                // a counter cannot be carried through a set of positions
                if matched.len() > 1 {
                    for &q in matched.iter().filter(|&&q| self.counters[q].is_some()) {
                        ambiguities.insert((self.tags[q], self.tags[q]));
                    }
                }

                let next = match ids.get(&matched) {
                    Some(&id) => id,
                    None => {
                        if states.len() >= max_states
                            || (states.len() + 1).saturating_mul(width) > MAX_TRANSITIONS
                        {
                            return Err(AssembleError::TooManyStates);
                        }
                        let id = states.len() as u32;
                        accepts.push(matched.iter().any(|&q| self.is_last[q]));
                        ids.insert(matched.clone(), id);
                        states.push(matched);
                        id
                    }
                };
                transitions.push(next);
            }
            current += 1;
        }

        let counters = states
            .iter()
            .map(|positions| match positions.as_slice() {
                &[p] => self.counters[p],
                _ => None,
            })
            .collect();
        Ok(DFA {
            bounds,
            transitions,
            accepts,
            counters,
            ambiguities: ambiguities.into_iter().collect(),
        })
    }
}

/// A deterministic finite automaton.
///
/// The alphabet is split into classes by `bounds`: class `i` covers
/// `bounds[i]..bounds[i + 1]` (the last class reaches `A::MAX`).
#[derive(Debug, Clone)]
pub struct DFA<A: Atom> {
    bounds: Vec<A>,
    transitions: Vec<u32>,
    accepts: Vec<bool>,
    // the counter of the single counted position of a state
    counters: Vec<Option<Counter>>,
    ambiguities: Vec<(usize, usize)>,
}

impl<A: Atom> DFA<A> {
    pub fn initial_state(&self) -> usize {
        0
    }

    pub fn state_count(&self) -> usize {
        self.accepts.len()
    }

    /// Returns `None` if no transition is allowed from `state` by `atom`.
    ///
    /// Counters are not consulted. Use [`DFA::step`] to follow counted repetitions.
    pub fn transition(&self, state: usize, atom: A) -> Option<usize> {
        let next = self.transitions[state * self.bounds.len() + class_of(&self.bounds, atom)];
        (next != DEAD).then_some(next as usize)
    }

    pub fn counter(&self, state: usize) -> Option<&Counter> {
        self.counters[state].as_ref()
    }

    /// Advance `(state, count)` by `atom`.
    ///
    /// `count` is the number of consecutive matches of the counted position of `state`,
    /// and 0 for states without a counter. A counted repetition can be left only after
    /// `min` matches and repeated only up to `max` times.
    pub fn step(&self, state: usize, count: usize, atom: A) -> Option<(usize, usize)> {
        let next = self.transition(state, atom)?;
        let counter = self.counters[state];
        if next == state
            && let Some(counter) = counter
        {
            return match counter.max {
                Some(max) if count >= max => counter.restart.then_some((state, 1)),
                Some(_) => Some((state, count + 1)),
                // past `min`, the exact number no longer matters
                None => Some((state, (count + 1).min(counter.min.max(1)))),
            };
        }
        if counter.is_some_and(|counter| count < counter.min) {
            return None;
        }
        let count = usize::from(self.counters[next].is_some());
        Some((next, count))
    }

    pub fn is_accepted(&self, state: usize) -> bool {
        self.accepts[state]
    }

    /// Same as [`DFA::is_accepted`], but a counted repetition must also be complete.
    pub fn is_final(&self, state: usize, count: usize) -> bool {
        self.accepts[state] && self.counters[state].is_none_or(|counter| count >= counter.min)
    }

    pub fn is_match(&self, input: impl IntoIterator<Item = A>) -> bool {
        let (mut state, mut count) = (self.initial_state(), 0);
        for atom in input {
            let Some(next) = self.step(state, count, atom) else {
                return false;
            };
            (state, count) = next;
        }
        self.is_final(state, count)
    }

    /// Pairs of leaf tags that can match the same atom from the same state.
    ///
    /// An empty list means that the expression is deterministic in the sense of
    /// XML 1.0 Appendix E and of the Unique Particle Attribution constraint.
    pub fn ambiguities(&self) -> &[(usize, usize)] {
        &self.ambiguities
    }

    /// Representatives of the classes that have a transition from `state`.
    pub fn expected(&self, state: usize) -> impl Iterator<Item = A> + '_ {
        let width = self.bounds.len();
        self.bounds
            .iter()
            .enumerate()
            .filter(move |&(class, _)| self.transitions[state * width + class] != DEAD)
            .map(|(_, &atom)| atom)
    }
}

/// Compile `ast` into a DFA. `None` is the empty expression that only accepts
/// the empty sequence.
pub fn assemble<A: Atom>(ast: Option<&ASTNode<A>>) -> Result<DFA<A>, AssembleError> {
    NFA::build(ast)?.determinize(MAX_STATES)
}

/// Same as [`assemble`], but repetitions of a class with bounds above
/// [`COUNTING_THRESHOLD`] become counted positions.
///
/// The result is exact only for deterministic expressions: a counted position that
/// shares a state with other positions loses its counter, and such states always show
/// up in [`DFA::ambiguities`].
pub fn assemble_counted<A: Atom>(ast: Option<&ASTNode<A>>) -> Result<DFA<A>, AssembleError> {
    NFA::build_with(ast, true)?.determinize(MAX_STATES)
}

mod tests {
    use super::*;
    use crate::NameID;

    fn name(id: u32) -> ASTNode<NameID> {
        ASTNode::symbol(NameID(id))
    }

    #[test]
    fn sequence_with_occurrences_tests() {
        // (a, b?, c*)
        let ast = ASTNode::Catenation(
            Box::new(ASTNode::Catenation(
                Box::new(name(1)),
                Box::new(ASTNode::ZeroOrOne(Box::new(name(2)))),
            )),
            Box::new(ASTNode::ZeroOrMore(Box::new(name(3)))),
        );
        let dfa = assemble(Some(&ast)).unwrap();
        assert!(dfa.is_match([NameID(1)]));
        assert!(dfa.is_match([NameID(1), NameID(3), NameID(3)]));
        assert!(dfa.is_match([NameID(1), NameID(2), NameID(3)]));
        assert!(!dfa.is_match([NameID(2), NameID(1)]));
        assert!(!dfa.is_match([]));
        assert!(dfa.ambiguities().is_empty());
    }

    #[test]
    fn repeat_tests() {
        let ast = ASTNode::Repeat {
            node: Box::new(name(1)),
            at_least: 2,
            at_most: Some(4),
        };
        let dfa = assemble(Some(&ast)).unwrap();
        assert!(!dfa.is_match([NameID(1)]));
        assert!(dfa.is_match([NameID(1); 2]));
        assert!(dfa.is_match([NameID(1); 4]));
        assert!(!dfa.is_match([NameID(1); 5]));
        assert!(dfa.ambiguities().is_empty());

        let ast = ASTNode::Repeat {
            node: Box::new(name(1)),
            at_least: 1,
            at_most: None,
        };
        let dfa = assemble(Some(&ast)).unwrap();
        assert!(dfa.is_match([NameID(1); 7]));
        assert!(!dfa.is_match([]));
    }

    #[test]
    fn ambiguity_tests() {
        // (a | (a, b)) is not deterministic
        let ast = ASTNode::Alternation(
            Box::new(name(1)),
            Box::new(ASTNode::Catenation(Box::new(name(1)), Box::new(name(2)))),
        );
        let dfa = assemble(Some(&ast)).unwrap();
        assert_eq!(dfa.ambiguities(), &[(0, 1)]);
        assert!(dfa.is_match([NameID(1)]));
        assert!(dfa.is_match([NameID(1), NameID(2)]));
    }

    #[test]
    fn empty_expression_tests() {
        let dfa = assemble::<NameID>(None).unwrap();
        assert!(dfa.is_match([]));
        assert!(!dfa.is_match([NameID(1)]));
    }

    fn counted(node: ASTNode<NameID>, at_least: usize, at_most: Option<usize>) -> ASTNode<NameID> {
        ASTNode::Repeat {
            node: Box::new(node),
            at_least,
            at_most,
        }
    }

    #[test]
    fn class_tests() {
        // (a | b | c) shares one position, (a | a) does not
        let choice = ASTNode::Alternation(
            Box::new(ASTNode::Alternation(Box::new(name(1)), Box::new(name(2)))),
            Box::new(name(3)),
        );
        let nfa = NFA::build(Some(&choice)).unwrap();
        assert_eq!(nfa.position_count(), 1);
        let twice = ASTNode::Alternation(Box::new(name(1)), Box::new(name(1)));
        let dfa = assemble(Some(&twice)).unwrap();
        assert_eq!(dfa.ambiguities(), &[(0, 1)]);

        // ((a | b)?, b) reports the two 'b' leaves
        let ast = ASTNode::Catenation(
            Box::new(ASTNode::ZeroOrOne(Box::new(ASTNode::Alternation(
                Box::new(name(1)),
                Box::new(name(2)),
            )))),
            Box::new(name(2)),
        );
        let dfa = assemble(Some(&ast)).unwrap();
        assert_eq!(dfa.ambiguities(), &[(1, 2)]);
    }

    #[test]
    fn counted_repeat_tests() {
        // (a{2,1000}, b)
        let ast = ASTNode::Catenation(
            Box::new(counted(name(1), 2, Some(1000))),
            Box::new(name(2)),
        );
        let dfa = assemble_counted(Some(&ast)).unwrap();
        assert!(dfa.state_count() <= 3);
        assert!(dfa.ambiguities().is_empty());
        let input = |n: usize| {
            std::iter::repeat_n(NameID(1), n).chain(std::iter::once(NameID(2)))
        };
        assert!(!dfa.is_match(input(1)));
        assert!(dfa.is_match(input(2)));
        assert!(dfa.is_match(input(1000)));
        assert!(!dfa.is_match(input(1001)));

        let state = dfa.initial_state();
        let (state, count) = dfa.step(state, 0, NameID(1)).unwrap();
        assert_eq!(count, 1);
        assert_eq!(dfa.counter(state).map(|counter| counter.max), Some(Some(1000)));
        assert!(dfa.step(state, count, NameID(2)).is_none());
        assert!(!dfa.is_final(state, count));

        // a{100,} is open ended
        let dfa = assemble_counted(Some(&counted(name(1), 100, None))).unwrap();
        assert!(!dfa.is_match([NameID(1); 99]));
        assert!(dfa.is_match([NameID(1); 100]));
        assert!(dfa.is_match(vec![NameID(1); 5000]));

        // the same expression without counting
        let dfa = assemble(Some(&counted(name(1), 40, Some(40)))).unwrap();
        assert_eq!(dfa.state_count(), 41);
        assert!(dfa.is_match([NameID(1); 40]));
    }

    #[test]
    fn counted_restart_tests() {
        // (a{40})*
        let ast = ASTNode::ZeroOrMore(Box::new(counted(name(1), 40, Some(40))));
        let dfa = assemble_counted(Some(&ast)).unwrap();
        assert!(dfa.ambiguities().is_empty());
        assert!(dfa.is_match([]));
        assert!(dfa.is_match([NameID(1); 80]));
        assert!(!dfa.is_match([NameID(1); 79]));

        // (a{40,50})* can go on or start over after 40
        let ast = ASTNode::ZeroOrMore(Box::new(counted(name(1), 40, Some(50))));
        let dfa = assemble_counted(Some(&ast)).unwrap();
        assert_eq!(dfa.ambiguities(), &[(0, 0)]);

        // (a{100}, a)
        let ast = ASTNode::Catenation(
            Box::new(counted(name(1), 100, Some(100))),
            Box::new(name(1)),
        );
        let dfa = assemble_counted(Some(&ast)).unwrap();
        assert!(dfa.ambiguities().contains(&(0, 1)));
    }

    #[test]
    fn nfa_tests() {
        // (a | b)*, a, (a | b){12}
        let ab = || ASTNode::Alternation(Box::new(name(1)), Box::new(name(2)));
        let ast = ASTNode::Catenation(
            Box::new(ASTNode::Catenation(
                Box::new(ASTNode::ZeroOrMore(Box::new(ab()))),
                Box::new(name(1)),
            )),
            Box::new(counted(ab(), 12, Some(12))),
        );
        let nfa = NFA::build(Some(&ast)).unwrap();
        assert_eq!(nfa.position_count(), 14);
        assert_eq!(
            nfa.determinize(1024).unwrap_err(),
            AssembleError::TooManyStates
        );
        let dfa = nfa.determinize(1 << 14).unwrap();

        let mut input = vec![NameID(2), NameID(1)];
        input.extend([NameID(2); 12]);
        assert!(nfa.is_match(input.iter().copied()));
        assert!(dfa.is_match(input.iter().copied()));
        input.push(NameID(2));
        assert!(!nfa.is_match(input.iter().copied()));
        assert!(!dfa.is_match(input.iter().copied()));
        assert!(!nfa.is_match([NameID(2); 13]));
        assert!(!nfa.is_match([]));
        assert!(!nfa.is_match([NameID(3)]));
    }
}
