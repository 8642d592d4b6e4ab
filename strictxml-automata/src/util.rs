//! Operations on sets of atoms expressed as sorted, inclusive ranges.

use crate::Atom;

/// Sort `iter` and merge overlapping or adjacent ranges.
pub fn normalize_ranges<A: Atom>(iter: impl Iterator<Item = (A, A)>) -> Vec<(A, A)> {
    let mut buf = iter.collect::<Vec<_>>();
    buf.sort_unstable();

    let mut ret: Vec<(A, A)> = Vec::with_capacity(buf.len());
    for (start, end) in buf {
        debug_assert!(start <= end);
        match ret.last_mut() {
            Some((_, e)) if start <= *e || Some(start) == e.next() => {
                if *e < end {
                    *e = end;
                }
            }
            _ => ret.push((start, end)),
        }
    }
    ret
}

/// perform `iter | other`
pub fn union_ranges<A: Atom>(
    iter: impl Iterator<Item = (A, A)>,
    other: impl Iterator<Item = (A, A)>,
) -> Vec<(A, A)> {
    normalize_ranges(iter.chain(other))
}

/// perform `not iter`
pub fn complement_ranges<A: Atom>(iter: impl Iterator<Item = (A, A)>) -> Vec<(A, A)> {
    let mut ret = vec![];
    let mut next = Some(A::MIN);
    for (start, end) in normalize_ranges(iter) {
        let Some(s) = next else {
            break;
        };
        if s < start
            && let Some(e) = start.previous()
        {
            ret.push((s, e));
        }
        next = end.next();
    }
    if let Some(s) = next {
        ret.push((s, A::MAX));
    }
    ret
}

/// perform `iter - other`
pub fn difference_ranges<A: Atom>(
    iter: impl Iterator<Item = (A, A)>,
    other: impl Iterator<Item = (A, A)>,
) -> Vec<(A, A)> {
    intersect_ranges(iter, complement_ranges(other).into_iter())
}

/// perform `iter & other`
pub fn intersect_ranges<A: Atom>(
    iter: impl Iterator<Item = (A, A)>,
    other: impl Iterator<Item = (A, A)>,
) -> Vec<(A, A)> {
    let left = normalize_ranges(iter);
    let right = normalize_ranges(other);
    let (mut i, mut j) = (0, 0);
    let mut ret = vec![];
    while i < left.len() && j < right.len() {
        let (ls, le) = left[i];
        let (rs, re) = right[j];
        let start = ls.max(rs);
        let end = le.min(re);
        if start <= end {
            ret.push((start, end));
        }
        if le < re {
            i += 1;
        } else {
            j += 1;
        }
    }
    ret
}

/// Check if `atom` is contained in the normalized ranges `ranges`.
pub fn contains<A: Atom>(ranges: &[(A, A)], atom: A) -> bool {
    let pos = ranges.partition_point(|&(_, end)| end < atom);
    pos < ranges.len() && ranges[pos].0 <= atom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_operation_tests() {
        let ranges = normalize_ranges([('c', 'e'), ('a', 'b'), ('x', 'z'), ('d', 'f')].into_iter());
        assert_eq!(ranges, vec![('a', 'f'), ('x', 'z')]);

        let comp = complement_ranges([('b', 'y')].into_iter());
        assert_eq!(comp, vec![('\0', 'a'), ('z', char::MAX)]);

        let diff = difference_ranges([('a', 'z')].into_iter(), [('d', 'f')].into_iter());
        assert_eq!(diff, vec![('a', 'c'), ('g', 'z')]);

        let inter = intersect_ranges([('a', 'm')].into_iter(), [('k', 'z')].into_iter());
        assert_eq!(inter, vec![('k', 'm')]);

        assert!(contains(&ranges, 'e'));
        assert!(!contains(&ranges, 'g'));
        assert!(contains(&ranges, 'z'));
    }
}
