//! A small Ratcliff/Obershelp sequence matcher, the Rust analog of
//! Python's `difflib.SequenceMatcher` used throughout
//! `original_source/CorrectOCR/aligner.py`.
//!
//! Only the subset `aligner.py` actually exercises is implemented: matching
//! blocks, `get_opcodes`, and `ratio`. The "autojunk" popularity heuristic
//! (which only kicks in above 200-element sequences and exists in upstream
//! difflib purely as a performance safeguard) is intentionally not
//! reproduced — callers that want to ignore certain elements pass an
//! explicit `isjunk` predicate instead, as `aligner.py` itself does for
//! punctuation tokens.

use std::collections::HashMap;
use std::hash::Hash;

/// One opcode of an edit script, analogous to a `difflib.get_opcodes()` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Equal,
    Replace,
    Delete,
    Insert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCode {
    pub tag: Tag,
    pub i1: usize,
    pub i2: usize,
    pub j1: usize,
    pub j2: usize,
}

pub struct SequenceMatcher<'a, T> {
    a: &'a [T],
    b: &'a [T],
    b2j: HashMap<&'a T, Vec<usize>>,
}

impl<'a, T: Eq + Hash> SequenceMatcher<'a, T> {
    pub fn new(a: &'a [T], b: &'a [T], isjunk: &dyn Fn(&T) -> bool) -> Self {
        let mut b2j: HashMap<&'a T, Vec<usize>> = HashMap::new();
        for (j, elt) in b.iter().enumerate() {
            if !isjunk(elt) {
                b2j.entry(elt).or_default().push(j);
            }
        }
        Self { a, b, b2j }
    }

    /// Find the longest matching block within `a[alo..ahi]` / `b[blo..bhi]`.
    /// Returns `(i, j, size)`; `size == 0` means no match was found.
    fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
        let (mut besti, mut bestj, mut bestsize) = (alo, blo, 0usize);
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut newj2len: HashMap<usize, usize> = HashMap::new();
            if let Some(js) = self.b2j.get(&self.a[i]) {
                for &j in js {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j2len.get(&j.wrapping_sub(1)).copied().unwrap_or(0) + 1;
                    newj2len.insert(j, k);
                    if k > bestsize {
                        besti = i + 1 - k;
                        bestj = j + 1 - k;
                        bestsize = k;
                    }
                }
            }
            j2len = newj2len;
        }
        (besti, bestj, bestsize)
    }

    /// Non-overlapping matching blocks covering `a`/`b`, in order, terminated
    /// implicitly (no trailing zero-size sentinel; callers that need one can
    /// append `(a.len(), b.len(), 0)` themselves).
    pub fn matching_blocks(&self) -> Vec<(usize, usize, usize)> {
        let mut queue = vec![(0, self.a.len(), 0, self.b.len())];
        let mut blocks = Vec::new();
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, k) = self.find_longest_match(alo, ahi, blo, bhi);
            if k > 0 {
                blocks.push((i, j, k));
                if alo < i && blo < j {
                    queue.push((alo, i, blo, j));
                }
                if i + k < ahi && j + k < bhi {
                    queue.push((i + k, ahi, j + k, bhi));
                }
            }
        }
        blocks.sort_unstable();
        blocks
    }

    pub fn opcodes(&self) -> Vec<OpCode> {
        let mut blocks = self.matching_blocks();
        blocks.push((self.a.len(), self.b.len(), 0));
        let mut opcodes = Vec::new();
        let (mut i, mut j) = (0usize, 0usize);
        for (ai, bj, size) in blocks {
            let tag = if i < ai && j < bj {
                Some(Tag::Replace)
            } else if i < ai {
                Some(Tag::Delete)
            } else if j < bj {
                Some(Tag::Insert)
            } else {
                None
            };
            if let Some(tag) = tag {
                opcodes.push(OpCode {
                    tag,
                    i1: i,
                    i2: ai,
                    j1: j,
                    j2: bj,
                });
            }
            i = ai + size;
            j = bj + size;
            if size > 0 {
                opcodes.push(OpCode {
                    tag: Tag::Equal,
                    i1: ai,
                    i2: i,
                    j1: bj,
                    j2: j,
                });
            }
        }
        opcodes
    }

    pub fn ratio(&self) -> f64 {
        let matches: usize = self.matching_blocks().iter().map(|(_, _, size)| size).sum();
        let total = self.a.len() + self.b.len();
        if total == 0 {
            1.0
        } else {
            2.0 * matches as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_junk<T>(_: &T) -> bool {
        false
    }

    #[test]
    fn identical_sequences_have_ratio_one() {
        let a: Vec<char> = "hello".chars().collect();
        let b: Vec<char> = "hello".chars().collect();
        let m = SequenceMatcher::new(&a, &b, &no_junk);
        assert_eq!(m.ratio(), 1.0);
    }

    #[test]
    fn opcodes_cover_full_sequences() {
        let a: Vec<char> = "abcd".chars().collect();
        let b: Vec<char> = "axcd".chars().collect();
        let m = SequenceMatcher::new(&a, &b, &no_junk);
        let ops = m.opcodes();
        assert_eq!(ops.first().unwrap().i1, 0);
        assert_eq!(ops.last().unwrap().i2, 4);
        assert_eq!(ops.last().unwrap().j2, 4);
    }

    #[test]
    fn completely_different_sequences_ratio_zero() {
        let a: Vec<char> = "abc".chars().collect();
        let b: Vec<char> = "xyz".chars().collect();
        let m = SequenceMatcher::new(&a, &b, &no_junk);
        assert_eq!(m.ratio(), 0.0);
    }
}
