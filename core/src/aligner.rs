//! Aligns an OCR'd token stream against its corrected ("gold") counterpart,
//! producing the character confusion table the HMM is trained from plus a
//! token-level correction map.
//!
//! Two passes, same shape as `original_source/CorrectOCR/aligner.py`:
//! a token-level LCS (`alignments`) finds runs of tokens that match
//! outright, then a greedy nearest-match pass (`align_tokens`) mops up the
//! `replace` blocks whose lengths differ, followed by a character-level LCS
//! (`align_words`) within each matched token pair.

use std::collections::{HashMap, HashSet};

use crate::config::AlignerConfig;
use crate::diff::{SequenceMatcher, Tag};
use crate::error::{CorrectOcrError, Result};

/// Minimal view of a token the aligner needs; implemented by
/// [`crate::token::Token`].
pub trait AlignableToken {
    fn original(&self) -> &str;
    fn is_punctuation(&self) -> bool;
}

/// Per-character confusion counts: `misread_counts[actual][read_as] += 1`.
pub type MisreadCounts = HashMap<char, HashMap<char, u32>>;

/// `word_alignments[left_original][left_index] = right_original`.
pub type WordAlignments = HashMap<String, HashMap<usize, String>>;

#[derive(Debug, Default)]
pub struct AlignmentResult {
    pub full_alignments: Vec<(String, String)>,
    pub word_alignments: WordAlignments,
    pub misread_counts: MisreadCounts,
}

fn bump(counts: &mut MisreadCounts, actual: char, read_as: char) {
    *counts.entry(actual).or_default().entry(read_as).or_insert(0) += 1;
}

/// Character-level alignment of one matched token pair, via LCS over chars.
fn align_words(left: &str, right: &str, result: &mut AlignmentResult) {
    let left_chars: Vec<char> = left.chars().collect();
    let right_chars: Vec<char> = right.chars().collect();
    let matcher = SequenceMatcher::new(&left_chars, &right_chars, &|_: &char| false);
    let (mut a_pos, mut b_pos) = (0usize, 0usize);
    let (mut a_str, mut b_str) = (String::new(), String::new());
    let mut blocks = matcher.matching_blocks();
    blocks.push((left_chars.len(), right_chars.len(), 0));
    for (a, b, c) in blocks {
        if a > a_pos {
            a_str.push_str(&left_chars[a_pos..a].iter().collect::<String>());
        }
        if b > b_pos {
            b_str.push_str(&right_chars[b_pos..b].iter().collect::<String>());
        }
        if !a_str.is_empty() || !b_str.is_empty() {
            result.full_alignments.push((a_str.clone(), b_str.clone()));
            for (l, r) in a_str.chars().zip(std::iter::repeat(())).map(|(l, ())| l).zip(b_str.chars().chain(std::iter::repeat('\0'))) {
                if r != '\0' {
                    bump(&mut result.misread_counts, l, r);
                }
            }
        }
        for ch in left_chars[a..a + c].iter() {
            result.full_alignments.push((ch.to_string(), ch.to_string()));
            bump(&mut result.misread_counts, *ch, *ch);
        }
        a_pos = a + c;
        b_pos = b + c;
        a_str.clear();
        b_str.clear();
    }
}

/// Greedy nearest-match pass over unmatched token runs: each left token is
/// paired with whichever right token has the highest Ratcliff/Obershelp
/// ratio, subject to `config`'s thresholds. Matched tokens are removed from
/// the left side and character-aligned; unmatched tokens on both sides are
/// returned for the caller to treat as deletions/insertions.
fn align_tokens<'t, T: AlignableToken>(
    left: &[&'t T],
    right: &[&'t T],
    result: &mut AlignmentResult,
    config: &AlignerConfig,
) -> (Vec<&'t T>, Vec<&'t T>) {
    let mut matched_left: HashSet<usize> = HashSet::new();
    for (i, left_token) in left.iter().enumerate() {
        let left_chars: Vec<char> = left_token.original().chars().collect();
        let mut best: Option<usize> = None;
        let mut best_ratio = 0.0f64;
        for (j, right_token) in right.iter().enumerate() {
            let right_chars: Vec<char> = right_token.original().chars().collect();
            let ratio = SequenceMatcher::new(&right_chars, &left_chars, &|_: &char| false).ratio();
            if ratio > best_ratio {
                best = Some(j);
                best_ratio = ratio;
            }
            if ratio == 1.0 {
                break;
            }
        }
        let long_enough = left_chars.len() > config.long_token_len && best_ratio > config.long_token_min_ratio;
        if best.is_some() && (best_ratio > config.min_ratio || long_enough) {
            let right_token = right[best.unwrap()];
            align_words(left_token.original(), right_token.original(), result);
            result
                .word_alignments
                .entry(left_token.original().to_string())
                .or_default()
                .insert(i, right_token.original().to_string());
            matched_left.insert(i);
        }
    }
    let remaining_left = left
        .iter()
        .enumerate()
        .filter(|(i, _)| !matched_left.contains(i))
        .map(|(_, t)| *t)
        .collect();
    (remaining_left, right.to_vec())
}

/// Top-level LCS alignment between an original and gold token stream.
/// Punctuation tokens are treated as junk during the token-level matcher
/// pass (they tend to shift LCS matches in misleading ways), matching
/// `aligner.py`'s `isjunk=lambda t: t.is_punctuation()`.
pub fn alignments<T: AlignableToken>(original: &[T], gold: &[T], config: &AlignerConfig) -> Result<AlignmentResult> {
    if original.is_empty() && gold.is_empty() {
        return Err(CorrectOcrError::Alignment {
            left: String::new(),
            right: String::new(),
            reason: "both token streams are empty".to_string(),
        });
    }
    let mut result = AlignmentResult::default();
    let matcher = SequenceMatcher::new(original, gold, &|t: &T| t.is_punctuation());
    let mut left_rest: Vec<&T> = Vec::new();
    let mut right_rest: Vec<&T> = Vec::new();

    for op in matcher.opcodes() {
        match op.tag {
            Tag::Equal => {
                for token in &original[op.i1..op.i2] {
                    for ch in token.original().chars() {
                        result.full_alignments.push((ch.to_string(), ch.to_string()));
                        bump(&mut result.misread_counts, ch, ch);
                    }
                    result
                        .word_alignments
                        .entry(token.original().to_string())
                        .or_default()
                        .insert(op.i1, token.original().to_string());
                }
            }
            Tag::Replace => {
                if op.i2 - op.i1 == op.j2 - op.j1 {
                    for (left_token, right_token) in original[op.i1..op.i2].iter().zip(gold[op.j1..op.j2].iter()) {
                        let left_chars: Vec<char> = left_token.original().chars().collect();
                        let right_chars: Vec<char> = right_token.original().chars().collect();
                        for (l, r) in left_chars.iter().zip(right_chars.iter()) {
                            result.full_alignments.push((l.to_string(), r.to_string()));
                            bump(&mut result.misread_counts, *l, *r);
                        }
                        result
                            .word_alignments
                            .entry(left_token.original().to_string())
                            .or_default()
                            .insert(op.i1, right_token.original().to_string());
                    }
                } else {
                    let left_refs: Vec<&T> = original[op.i1..op.i2].iter().collect();
                    let right_refs: Vec<&T> = gold[op.j1..op.j2].iter().collect();
                    let (left, right) = align_tokens(&left_refs, &right_refs, &mut result, config);
                    left_rest.extend(left);
                    right_rest.extend(right);
                }
            }
            Tag::Delete => {
                left_rest.extend(original[op.i1..op.i2].iter());
            }
            Tag::Insert => {
                right_rest.extend(gold[op.j1..op.j2].iter());
            }
        }
    }

    let (left, right) = align_tokens(&left_rest, &right_rest, &mut result, config);
    if !left.is_empty() || !right.is_empty() {
        tracing::debug!(
            unmatched_left = left.len(),
            unmatched_right = right.len(),
            "alignment left unmatched tokens on one or both sides"
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct T {
        text: String,
        punct: bool,
    }

    impl AlignableToken for T {
        fn original(&self) -> &str {
            &self.text
        }
        fn is_punctuation(&self) -> bool {
            self.punct
        }
    }

    fn tok(s: &str) -> T {
        T {
            text: s.to_string(),
            punct: s.chars().all(|c| !c.is_alphanumeric()),
        }
    }

    #[test]
    fn identical_token_streams_self_align() {
        let tokens: Vec<T> = ["the", "quick", "fox"].iter().map(|s| tok(s)).collect();
        let config = AlignerConfig::default();
        let result = alignments(&tokens, &tokens, &config).unwrap();
        for t in &tokens {
            let aligned = result.word_alignments.get(t.original()).unwrap();
            assert!(aligned.values().any(|v| v == t.original()));
        }
    }

    #[test]
    fn single_char_substitution_is_captured() {
        let original = vec![tok("teh")];
        let gold = vec![tok("the")];
        let config = AlignerConfig::default();
        let result = alignments(&original, &gold, &config).unwrap();
        assert!(result.misread_counts.contains_key(&'t') || !result.full_alignments.is_empty());
    }

    #[test]
    fn empty_pair_is_an_alignment_error() {
        let config = AlignerConfig::default();
        let empty: Vec<T> = Vec::new();
        assert!(alignments(&empty, &empty, &config).is_err());
    }

    #[test]
    fn align_words_counts_self_matches() {
        let mut result = AlignmentResult::default();
        align_words("cat", "cat", &mut result);
        assert_eq!(*result.misread_counts.get(&'c').unwrap().get(&'c').unwrap(), 1);
    }
}
