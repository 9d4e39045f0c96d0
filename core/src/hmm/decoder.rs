//! Beam-pruned k-best decoding over a trained [`HmmParams`], with the
//! multi-character substitution retry. Grounded on `original_source/
//! CorrectOCR/model.py` (`HMM.k_best_beam`, `HMM.kbest_for_word`,
//! `HMM.multichar_variants`, `HMM.generate_kbest`) and `decoder.py`'s
//! standalone duplicate of the same algorithm.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::dictionary::Dictionary;
use crate::hmm::cache::{KBest, KBestCache};
use crate::hmm::params::HmmParams;
use crate::token::{KBestItem, Token};

static PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Punctuation}+").unwrap());

fn strip_punct(word: &str) -> String {
    PUNCT.replace_all(word, "").to_string()
}

fn by_probability_desc(a: &(Vec<usize>, f64), b: &(Vec<usize>, f64)) -> Ordering {
    b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal)
}

fn seq_to_string(params: &HmmParams, seq: &[usize]) -> String {
    seq.iter().filter_map(|&id| params.alphabet().char_at(id)).collect()
}

/// Beam-pruned approximation of the Viterbi k-best paths for `word`: the
/// full N^2 cross product for the first two characters, then widened by
/// one character at a time keeping only the top `k` partial paths
/// (spec.md §4.4). Returns up to `k` `(candidate, probability)` pairs,
/// most probable first.
pub fn kbest_beam(params: &HmmParams, word: &str, k: usize) -> Vec<(String, f64)> {
    let chars: Vec<char> = word.chars().collect();
    let n = params.state_count();
    if chars.is_empty() || n == 0 {
        return Vec::new();
    }

    if chars.len() == 1 {
        let mut paths: Vec<(Vec<usize>, f64)> = (0..n).map(|i| (vec![i], params.init(i) * params.emis(i, chars[0]))).collect();
        paths.sort_by(by_probability_desc);
        paths.truncate(k);
        return paths.into_iter().map(|(seq, p)| (seq_to_string(params, &seq), p)).collect();
    }

    let mut paths: Vec<(Vec<usize>, f64)> = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            let p = params.init(i) * params.emis(i, chars[0]) * params.tran(i, j) * params.emis(j, chars[1]);
            paths.push((vec![i, j], p));
        }
    }
    paths.sort_by(by_probability_desc);
    paths.truncate(k);

    for &c in &chars[2..] {
        let mut temp = Vec::with_capacity(paths.len() * n);
        for (seq, p) in &paths {
            let last = *seq.last().expect("path always has at least two states here");
            for j in 0..n {
                let np = p * params.tran(last, j) * params.emis(j, c);
                let mut nseq = seq.clone();
                nseq.push(j);
                temp.push((nseq, np));
            }
        }
        temp.sort_by(by_probability_desc);
        temp.truncate(k);
        paths = temp;
    }

    paths.into_iter().map(|(seq, p)| (seq_to_string(params, &seq), p)).collect()
}

/// Every way `word` can be reassembled by swapping `sub` for itself or one
/// of `replacements` at each of its occurrences (spec.md §4.4's multichar
/// retry), ported from `HMM.multichar_variants`'s split/`itertools.product`/
/// zip-longest reassembly.
pub fn multichar_variants(word: &str, sub: &str, replacements: &[String]) -> HashSet<String> {
    let pieces: Vec<&str> = word.split(sub).collect();
    let repeat = pieces.len().saturating_sub(1);
    if repeat == 0 {
        return [word.to_string()].into_iter().collect();
    }

    let mut pool: Vec<&str> = Vec::with_capacity(1 + replacements.len());
    pool.push(sub);
    pool.extend(replacements.iter().map(String::as_str));

    let mut combos: Vec<Vec<&str>> = vec![vec![]];
    for _ in 0..repeat {
        let mut next = Vec::with_capacity(combos.len() * pool.len());
        for combo in &combos {
            for &choice in &pool {
                let mut extended = combo.clone();
                extended.push(choice);
                next.push(extended);
            }
        }
        combos = next;
    }

    combos
        .into_iter()
        .map(|combo| {
            let mut out = String::new();
            for (i, piece) in pieces.iter().enumerate() {
                out.push_str(piece);
                if let Some(choice) = combo.get(i) {
                    out.push_str(choice);
                }
            }
            out
        })
        .collect()
}

/// Decode one word: beam search, then retry with multi-character
/// substitution variants if none of the k-best candidates are dictionary
/// hits and `word` contains one of the configured confusable substrings.
/// Ported from `HMM.kbest_for_word`.
pub fn decode_word(
    params: &HmmParams,
    dictionary: &Dictionary,
    multichars: &HashMap<String, Vec<String>>,
    word: &str,
    k: usize,
) -> KBest {
    if word.is_empty() {
        return (1..=k as u32).map(|n| (n, KBestItem::empty())).collect();
    }

    let mut k_best = kbest_beam(params, word, k);

    for (sub, replacements) in multichars {
        if !word.contains(sub.as_str()) {
            continue;
        }
        let none_in_dict = k_best.iter().all(|(candidate, _)| !dictionary.contains(&strip_punct(candidate)));
        if !none_in_dict {
            continue;
        }
        for variant in multichar_variants(word, sub, replacements) {
            if variant != word {
                k_best.extend(kbest_beam(params, &variant, k));
            }
        }
        k_best.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        k_best.truncate(k);
    }

    let mut result: KBest = k_best
        .into_iter()
        .enumerate()
        .map(|(i, (candidate, probability))| ((i + 1) as u32, KBestItem::new(candidate, probability)))
        .collect();
    // Beam width is bounded by the state count; pad with empty sentinels so
    // callers always see exactly k entries (spec.md §3, §8 invariant 3).
    for n in (result.len() as u32 + 1)..=k as u32 {
        result.insert(n, KBestItem::empty());
    }
    result
}

/// Decode every token's `lookup` form in place, consulting `cache` first
/// (unless `force`) and populating it on every miss. Ported from
/// `HMM.generate_kbest`.
pub fn generate_kbest(
    tokens: &mut [Token],
    params: &HmmParams,
    dictionary: &Dictionary,
    multichars: &HashMap<String, Vec<String>>,
    k: usize,
    cache: &KBestCache,
    force: bool,
) {
    tracing::info!(tokens = tokens.len(), k, "generating k-best suggestions");
    for token in tokens.iter_mut() {
        let word = token.data().lookup().to_string();
        if !force {
            if let Some(hit) = cache.get(&word, k) {
                token.data_mut().kbest = hit;
                continue;
            }
        }
        let result = decode_word(params, dictionary, multichars, &word, k);
        cache.put(&word, k, result.clone());
        token.data_mut().kbest = result;
    }
}
