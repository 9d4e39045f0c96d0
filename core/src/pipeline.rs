//! Per-document orchestration: tokenize (external) -> k-best (HMM) -> bin
//! (heuristics) -> autocorrect, per spec.md §4.6. Tokenization itself is out
//! of scope (spec.md §1 treats it as an external collaborator); this module
//! picks up once a document is already a `Vec<Token>`.
//!
//! Grounded in `original_source/CorrectOCR/workspace.py` for step ordering
//! and `correcter.py` for the annotator-deferral contract. Cross-document
//! fan-out follows spec.md §5: documents share no mutable state except the
//! dictionary and the k-best cache, both guarded here the way §5 specifies
//! (read-mostly dictionary, short critical section around cache writes).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use rayon::prelude::*;

use crate::config::Config;
use crate::dictionary::Dictionary;
use crate::heuristics::{classify_bin, resolve_action, Action};
use crate::hmm::decoder::generate_kbest;
use crate::hmm::params::HmmParams;
use crate::hmm::KBestCache;
use crate::token::{dehyphenate, HeuristicAction, Token};

/// Shared, read-mostly resources threaded through every document in a run.
/// The HMM is immutable after training and safe to share across threads;
/// the dictionary is append-only during a run; the k-best cache is the one
/// resource with a real write path (spec.md §5).
pub struct Pipeline {
    config: Arc<Config>,
    dictionary: Arc<RwLock<Dictionary>>,
    hmm: Arc<HmmParams>,
    cache: Arc<Mutex<KBestCache>>,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        dictionary: Arc<RwLock<Dictionary>>,
        hmm: Arc<HmmParams>,
        cache: Arc<Mutex<KBestCache>>,
    ) -> Self {
        Self {
            config,
            dictionary,
            hmm,
            cache,
        }
    }

    /// Run dehyphenation, k-best generation, binning, and autocorrect over
    /// one document's tokens. A token that fails to classify is logged and
    /// deferred to the annotator rather than aborting the document
    /// (spec.md §7's BinError policy); the document itself never aborts
    /// here, since every per-token step in this pipeline is total.
    pub fn process_document(&self, tokens: Vec<Token>, force: bool) -> Vec<Token> {
        let dictionary = self.dictionary.read().expect("dictionary lock poisoned");
        let mut tokens = dehyphenate(tokens, &dictionary);

        {
            let cache = self.cache.lock().expect("kbest cache lock poisoned");
            generate_kbest(
                &mut tokens,
                &self.hmm,
                &dictionary,
                &self.config.hmm.multichars,
                self.config.hmm.k,
                &cache,
                force,
            );
        }

        for token in tokens.iter_mut() {
            apply_heuristic(token, &dictionary, &self.config.heuristics.bin_actions, force);
        }

        tokens
    }

    /// Process many documents in parallel. Per spec.md §5 this is
    /// embarrassingly parallel: only the dictionary read-lock and the cache
    /// mutex are shared, both acquired per-document rather than held across
    /// the whole batch.
    pub fn process_documents(&self, documents: Vec<Vec<Token>>, force: bool) -> Vec<Vec<Token>> {
        documents
            .into_par_iter()
            .map(|doc| self.process_document(doc, force))
            .collect()
    }

    /// Flush the k-best cache to disk. Call at shutdown or between batches;
    /// losing unflushed writes degrades performance, never correctness
    /// (spec.md §5).
    pub fn flush_cache(&self) -> crate::error::Result<()> {
        self.cache.lock().expect("kbest cache lock poisoned").save()
    }
}

/// Classify one token into a bin and apply the configured action, mutating
/// `gold`/`bin`/`heuristic`/`selection` in place. Free function (rather
/// than a `Pipeline` method) so it's testable without a trained HMM.
///
/// A token whose `gold` was already set by a previous run (human or
/// automatic) is left untouched unless `force` is set — spec.md §3's
/// invariant that a human-set `gold` survives re-runs — and is tagged
/// `Memoized` to record that no new decision was made. A token produced by
/// dehyphenation is tagged `Linefeed`: the merge only happens because the
/// combined form is already a dictionary hit, so it never needs binning.
pub fn apply_heuristic(token: &mut Token, dictionary: &Dictionary, bin_actions: &HashMap<u8, Action>, force: bool) {
    let data = token.data_mut();
    if data.is_discarded {
        return;
    }

    if data.is_hyphenated {
        data.bin = None;
        data.heuristic = Some(HeuristicAction::Linefeed);
        if data.gold().is_none() || force {
            data.set_gold(data.lookup().to_string());
        }
        return;
    }

    if data.gold().is_some() && !force {
        data.heuristic = Some(HeuristicAction::Memoized);
        return;
    }

    if data.is_punctuation() {
        data.bin = None;
        data.heuristic = Some(HeuristicAction::Original);
        return;
    }

    let original = data.lookup().to_string();
    let k1 = data.kbest.get(&1).cloned().unwrap_or_default().candidate;
    let kbest_words: Vec<String> = data.kbest.values().map(|item| item.candidate.clone()).collect();

    let bin = match classify_bin(&original, &k1, &kbest_words, dictionary) {
        Ok(bin) => bin,
        Err(err) => {
            tracing::error!(error = %err, original = %original, "no heuristic bin matched token; deferring to annotator");
            data.bin = None;
            data.heuristic = Some(HeuristicAction::Annotator);
            data.clear_gold();
            return;
        }
    };
    data.bin = Some(bin);

    let action = bin_actions.get(&bin).copied().unwrap_or(Action::Annotator);
    let (heuristic, selection, word) = resolve_action(action, &data.kbest, dictionary);
    data.heuristic = Some(heuristic);
    data.decision = Some(action.code());
    data.selection = selection;

    match heuristic {
        HeuristicAction::Original => data.set_gold(original),
        HeuristicAction::KBest(_) | HeuristicAction::KDict => match word {
            Some(word) => data.set_gold(word),
            None => data.clear_gold(),
        },
        HeuristicAction::Annotator => data.clear_gold(),
        HeuristicAction::Memoized | HeuristicAction::Linefeed => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{KBestItem, Token};
    use std::collections::BTreeMap;

    fn dict_with(words: &[&str]) -> Dictionary {
        let mut d = Dictionary::new(false);
        for w in words {
            d.add("corpus", w);
        }
        d
    }

    fn kbest(pairs: &[(&str, f64)]) -> BTreeMap<u32, KBestItem> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, (word, p))| ((i + 1) as u32, KBestItem::new(*word, *p)))
            .collect()
    }

    #[test]
    fn scenario_s2_bin_1_assigns_original() {
        // S2: ("test", kbest=[test]), dict={"test"}, 1->o.
        let dictionary = dict_with(&["test"]);
        let mut token = Token::text("test", "doc", 0);
        token.data_mut().kbest = kbest(&[("test", 0.9)]);
        let mut bin_actions = HashMap::new();
        bin_actions.insert(1u8, Action::Original);

        apply_heuristic(&mut token, &dictionary, &bin_actions, false);

        assert_eq!(token.data().bin, Some(1));
        assert_eq!(token.data().heuristic, Some(HeuristicAction::Original));
        assert_eq!(token.data().decision, Some('o'));
        assert_eq!(token.data().gold(), Some("test".to_string()));
    }

    #[test]
    fn scenario_s3_bin_4_assigns_kbest_candidate() {
        // S3: ("teh", kbest=[("the", 0.9), ("teh", 0.1)]), dict={"the"}, 4->k.
        let dictionary = dict_with(&["the"]);
        let mut token = Token::text("teh", "doc", 0);
        token.data_mut().kbest = kbest(&[("the", 0.9), ("teh", 0.1)]);
        let mut bin_actions = HashMap::new();
        bin_actions.insert(4u8, Action::KBest);

        apply_heuristic(&mut token, &dictionary, &bin_actions, false);

        assert_eq!(token.data().bin, Some(4));
        assert_eq!(token.data().decision, Some('k'));
        assert_eq!(token.data().gold(), Some("the".to_string()));
    }

    #[test]
    fn human_set_gold_is_preserved_without_force() {
        let dictionary = dict_with(&["the"]);
        let mut token = Token::text("teh", "doc", 0);
        token.data_mut().kbest = kbest(&[("the", 0.9), ("teh", 0.1)]);
        token.data_mut().set_gold("annotator-chosen");
        let mut bin_actions = HashMap::new();
        bin_actions.insert(4u8, Action::KBest);

        apply_heuristic(&mut token, &dictionary, &bin_actions, false);

        assert_eq!(token.data().gold(), Some("annotator-chosen".to_string()));
        assert_eq!(token.data().heuristic, Some(HeuristicAction::Memoized));
    }

    #[test]
    fn force_overrides_previously_set_gold() {
        let dictionary = dict_with(&["the"]);
        let mut token = Token::text("teh", "doc", 0);
        token.data_mut().kbest = kbest(&[("the", 0.9), ("teh", 0.1)]);
        token.data_mut().set_gold("annotator-chosen");
        let mut bin_actions = HashMap::new();
        bin_actions.insert(4u8, Action::KBest);

        apply_heuristic(&mut token, &dictionary, &bin_actions, true);

        assert_eq!(token.data().gold(), Some("the".to_string()));
        assert_eq!(token.data().bin, Some(4));
    }

    #[test]
    fn missing_bin_action_defaults_to_annotator() {
        let dictionary = dict_with(&["word"]);
        let mut token = Token::text("word", "doc", 0);
        token.data_mut().kbest = kbest(&[("word", 1.0)]);
        let bin_actions = HashMap::new();
        apply_heuristic(&mut token, &dictionary, &bin_actions, false);
        assert_eq!(token.data().bin, Some(1));
        assert_eq!(token.data().heuristic, Some(HeuristicAction::Annotator));
        assert_eq!(token.data().gold(), None);
    }

    #[test]
    fn dehyphenated_tokens_autocorrect_via_linefeed() {
        let dictionary = dict_with(&["wonderful"]);
        let mut token = Token::text("wonderful", "doc", 0);
        token.data_mut().is_hyphenated = true;
        let bin_actions = HashMap::new();
        apply_heuristic(&mut token, &dictionary, &bin_actions, false);
        assert_eq!(token.data().heuristic, Some(HeuristicAction::Linefeed));
        assert_eq!(token.data().gold(), Some("wonderful".to_string()));
        assert!(token.data().bin.is_none());
    }
}
