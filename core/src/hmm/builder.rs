//! Trains [`HmmParams`] from a confusion table and a flat list of gold
//! words, per spec.md §4.3. Ported near verbatim from `original_source/
//! CorrectOCR/model.py`'s `HMMBuilder`: alphabet expansion, additive-
//! (Laplace-)smoothed emission probabilities from the confusion matrix,
//! and additive-smoothed initial/transition probabilities from gold text.

use std::collections::{HashMap, HashSet};

use crate::aligner::MisreadCounts;
use crate::dictionary::Dictionary;
use crate::error::Result;
use crate::hmm::params::HmmParams;

/// Swap outer/inner keys: `[original][gold] -> [gold][original]`, so the
/// HMM trains states over the corrected spelling and emissions over the
/// observed (misspelled) character, per `build`'s doc comment.
fn transpose_confusion(misread_counts: &MisreadCounts) -> MisreadCounts {
    let mut transposed: MisreadCounts = HashMap::new();
    for (&original_char, row) in misread_counts {
        for (&gold_char, &count) in row {
            *transposed.entry(gold_char).or_default().entry(original_char).or_insert(0) += count;
        }
    }
    transposed
}

pub struct HmmBuilder<'a> {
    dictionary: &'a Dictionary,
    alpha: f64,
    character_set: HashSet<char>,
    remove_chars: HashSet<char>,
}

impl<'a> HmmBuilder<'a> {
    pub fn new(dictionary: &'a Dictionary, alpha: f64, character_set: &[char], remove_chars: &[char]) -> Self {
        Self {
            dictionary,
            alpha,
            character_set: character_set.iter().copied().collect(),
            remove_chars: remove_chars.iter().copied().collect(),
        }
    }

    /// Train parameters from `misread_counts` (the aligner's confusion
    /// table, keyed `[original_char][gold_char]` per spec.md §4.2/S5) and
    /// `gold_words` (the aligned corpus's gold-side vocabulary).
    pub fn build(&self, misread_counts: &MisreadCounts, gold_words: &[String]) -> Result<HmmParams> {
        // The decoder (§4.4) walks `emis[state][observed]` with `state`
        // ranging over the *corrected* spelling being assembled and
        // `observed` the character actually present in the word being
        // decoded (the misspelled input). That needs the opposite keying
        // from the aligner's table (`[original][gold]`), so transpose here
        // rather than at the aligner, whose direction is pinned by spec.md's
        // own worked example (S5: `count['3']['e'] = 1` for ("t3st","test")
        // — outer is the original/observed char, inner the gold one).
        // `model.py::HMMBuilder.__init__` feeds `misreadCounts` straight
        // through untransposed, which silently breaks single-substitution
        // training pairs like S1 (every state ends up with zero probability
        // of emitting the very character it was trained to correct); see
        // DESIGN.md.
        let transposed = transpose_confusion(misread_counts);
        let confusion = self.generate_confusion(&transposed);
        let char_counts = self.text_char_counts(gold_words);

        // model.py: `self._charset = self._charset | set(char_counts) | set(confusion)`.
        // char_counts is already a subset of the configured set (see
        // `text_char_counts`), so this amounts to configured ∪ confusion keys.
        let mut charset: HashSet<char> = self.character_set.clone();
        charset.extend(char_counts.keys().copied());
        charset.extend(confusion.keys().copied());

        let emis = self.emission_probabilities(confusion, char_counts, &charset);
        let (init, tran) = self.init_tran_probabilities(gold_words, &charset);

        HmmParams::from_maps(init, tran, emis)
    }

    /// Outer keys are "true" characters, inner keys are what each was read
    /// as. Single-character keys only (our confusion table is already
    /// char-keyed by construction); purge `remove_chars`.
    fn generate_confusion(&self, misread_counts: &MisreadCounts) -> HashMap<char, HashMap<char, f64>> {
        let mut confusion: HashMap<char, HashMap<char, f64>> = HashMap::new();
        for (&outer, row) in misread_counts {
            if self.remove_chars.contains(&outer) {
                continue;
            }
            let mut out_row = HashMap::new();
            for (&inner, &count) in row {
                if self.remove_chars.contains(&inner) {
                    continue;
                }
                out_row.insert(inner, count as f64);
            }
            confusion.insert(outer, out_row);
        }
        confusion
    }

    /// Character counts across the gold corpus plus every dictionary word,
    /// restricted to the *configured* character set (not yet the expanded
    /// one — `model.py::_text_char_counts` reads `self._charset` before it
    /// is unioned with confusion/char_counts), minus `remove_chars`.
    fn text_char_counts(&self, gold_words: &[String]) -> HashMap<char, u64> {
        let mut counts: HashMap<char, u64> = HashMap::new();
        for word in gold_words.iter().map(String::as_str).chain(self.dictionary.words()) {
            for c in word.chars() {
                *counts.entry(c).or_insert(0) += 1;
            }
        }
        counts.retain(|c, _| self.character_set.contains(c) && !self.remove_chars.contains(c));
        counts
    }

    /// Additive-smoothed emission probabilities, per spec.md §4.3 steps 1-5.
    fn emission_probabilities(
        &self,
        mut confusion: HashMap<char, HashMap<char, f64>>,
        char_counts: HashMap<char, u64>,
        charset: &HashSet<char>,
    ) -> HashMap<char, HashMap<char, f64>> {
        // 1. Rows for chars that were always read correctly.
        for (&c, &count) in &char_counts {
            confusion.entry(c).or_insert_with(|| [(c, count as f64)].into_iter().collect());
        }

        // 2. Every row gets every emitted character as a (possibly zero) key.
        let emitted: HashSet<char> = confusion.values().flat_map(|row| row.keys().copied()).collect();
        for row in confusion.values_mut() {
            for &o in &emitted {
                row.entry(o).or_insert(0.0);
            }
        }

        // 3. Additive (Laplace) smoothing.
        for row in confusion.values_mut() {
            let denom: f64 = row.values().sum::<f64>() + self.alpha * row.len() as f64;
            for v in row.values_mut() {
                *v = (*v + self.alpha) / denom;
            }
        }

        // 4. Add expected characters (from the configured set) not yet
        // present as rows: a row emitting only themselves with p=1.0, and a
        // zero-probability inner entry in every other row. Only rows that
        // are genuinely new get forced to self-emit 1.0 here — a row
        // already populated and smoothed in step 3 keeps its smoothed
        // values (see DESIGN.md: the upstream Python instead overwrites
        // every expected char's self-emission unconditionally, which would
        // push already-smoothed rows above 1.0 and violate row
        // stochasticity; spec.md §4.3 step 4 ("not yet appear as outer
        // rows") is followed here instead).
        let extra_chars: HashSet<char> = charset.difference(&self.remove_chars).copied().collect();
        let mut newly_added: HashSet<char> = HashSet::new();
        for &c in &extra_chars {
            if !confusion.contains_key(&c) {
                confusion.insert(c, emitted.iter().map(|&o| (o, 0.0)).collect());
                newly_added.insert(c);
            }
        }
        for row in confusion.values_mut() {
            for &c in &extra_chars {
                row.entry(c).or_insert(0.0);
            }
        }
        for &c in &newly_added {
            confusion.get_mut(&c).unwrap().insert(c, 1.0);
        }

        // 5. Prune rows/inner keys outside the final alphabet.
        confusion.retain(|outer, _| charset.contains(outer));
        for row in confusion.values_mut() {
            row.retain(|inner, _| charset.contains(inner));
        }
        confusion
    }

    /// Additive-smoothed initial/transition probabilities from gold words
    /// plus every dictionary word, over the final `charset`.
    fn init_tran_probabilities(
        &self,
        gold_words: &[String],
        charset: &HashSet<char>,
    ) -> (HashMap<char, f64>, HashMap<char, HashMap<char, f64>>) {
        let mut init_counts: HashMap<char, u64> = HashMap::new();
        let mut tran_counts: HashMap<char, HashMap<char, u64>> = HashMap::new();

        let mut add_word = |word: &str| {
            let chars: Vec<char> = word.chars().collect();
            if chars.is_empty() {
                return;
            }
            *init_counts.entry(chars[0]).or_insert(0) += 1;
            for pair in chars.windows(2) {
                *tran_counts.entry(pair[0]).or_default().entry(pair[1]).or_insert(0) += 1;
            }
        };
        for word in gold_words {
            add_word(word);
        }
        for word in self.dictionary.words() {
            add_word(word);
        }

        let n = charset.len() as f64;
        let init_denom: f64 = init_counts.values().sum::<u64>() as f64 + self.alpha * n;
        let mut init = HashMap::new();
        let mut tran = HashMap::new();
        for &i in charset {
            init.insert(i, (*init_counts.get(&i).unwrap_or(&0) as f64 + self.alpha) / init_denom);
            let row_counts = tran_counts.get(&i);
            let tran_denom = row_counts.map(|r| r.values().sum::<u64>()).unwrap_or(0) as f64 + self.alpha * n;
            let mut row = HashMap::new();
            for &j in charset {
                let count = row_counts.and_then(|r| r.get(&j)).copied().unwrap_or(0) as f64;
                row.insert(j, (count + self.alpha) / tran_denom);
            }
            tran.insert(i, row);
        }
        (init, tran)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trains_stochastic_tables_from_a_single_pair() {
        // Scenario S1: train on ("String", "Slring") only.
        let dictionary = {
            let mut d = Dictionary::new(false);
            d.add("corpus", "String");
            d
        };
        // Raw aligner shape, keyed `[original_char][gold_char]` (spec.md
        // §4.2/S5): self-mappings at every position where "Slring" and
        // "String" agree (S, r, i, n, g), plus the single substitution at
        // position 1 where original has 'l' and gold has 't'.
        let mut misread_counts: MisreadCounts = HashMap::new();
        for c in "Sring".chars() {
            misread_counts.entry(c).or_default().entry(c).or_insert(1);
        }
        misread_counts.entry('l').or_default().insert('t', 1);

        let character_set: Vec<char> = "Stlring".chars().collect();
        let builder = HmmBuilder::new(&dictionary, 1e-4, &character_set, &[]);
        let gold_words = vec!["String".to_string()];
        let params = builder.build(&misread_counts, &gold_words).unwrap();

        let n = params.state_count();
        for s in params.states() {
            let sum: f64 = (0..n).map(|t| params.tran(s, t)).sum();
            assert!((sum - 1.0).abs() < 1e-9, "tran row {s} sums to {sum}");
        }
        let init_sum: f64 = params.states().map(|s| params.init(s)).sum();
        assert!((init_sum - 1.0).abs() < 1e-9);

        let top = crate::hmm::decoder::kbest_beam(&params, "Slring", 1);
        assert_eq!(top[0].0, "String");
        assert!(top[0].1 > 0.0);
    }
}
