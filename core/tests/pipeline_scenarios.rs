//! Cross-component scenarios from spec.md §8, exercising the aligner, HMM
//! builder/decoder, heuristics, and pipeline orchestrator together rather
//! than in isolation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use correctocr_core::aligner::alignments;
use correctocr_core::config::{AlignerConfig, Config};
use correctocr_core::dictionary::Dictionary;
use correctocr_core::heuristics::Action;
use correctocr_core::hmm::decoder::kbest_beam;
use correctocr_core::hmm::{HmmBuilder, KBestCache};
use correctocr_core::pipeline::Pipeline;
use correctocr_core::token::{Token, TokenData};

fn toy_dictionary() -> Dictionary {
    let mut dictionary = Dictionary::new(false);
    dictionary.add("corpus", "String");
    dictionary
}

/// S1: train on the single pair ("String", "Slring") with alpha = 1e-4 and
/// alphabet {S,l,t,r,i,n,g}; decoding "Slring" with k=1 must recover
/// "String" with nonzero probability.
#[test]
fn scenario_s1_trains_and_decodes_corrected_spelling() {
    let dictionary = toy_dictionary();

    let original = vec![TokenData::new("Slring", "doc", 0)];
    let gold = vec![TokenData::new("String", "doc", 0)];
    let aligner_config = AlignerConfig::default();
    let alignment = alignments(&original, &gold, &aligner_config).unwrap();

    let character_set: Vec<char> = "Stlring".chars().collect();
    let builder = HmmBuilder::new(&dictionary, 1e-4, &character_set, &[]);
    let params = builder.build(&alignment.misread_counts, &["String".to_string()]).unwrap();

    let kbest = kbest_beam(&params, "Slring", 1);
    assert_eq!(kbest.len(), 1);
    assert_eq!(kbest[0].0, "String");
    assert!(kbest[0].1 > 0.0);
}

/// S5: aligning ("This is a t3st", "This is a test") yields `count['3']['e']
/// == 1` and no other off-diagonal confusion.
#[test]
fn scenario_s5_aligner_isolates_single_character_confusion() {
    let original: Vec<TokenData> = "This is a t3st"
        .split_whitespace()
        .enumerate()
        .map(|(i, w)| TokenData::new(w, "doc", i))
        .collect();
    let gold: Vec<TokenData> = "This is a test"
        .split_whitespace()
        .enumerate()
        .map(|(i, w)| TokenData::new(w, "doc", i))
        .collect();
    let config = AlignerConfig::default();
    let result = alignments(&original, &gold, &config).unwrap();

    assert_eq!(*result.misread_counts.get(&'3').unwrap().get(&'e').unwrap(), 1);
    for (&actual, row) in &result.misread_counts {
        for (&read_as, &count) in row {
            if actual != read_as {
                assert_eq!(actual, '3', "unexpected off-diagonal confusion {actual:?} -> {read_as:?} ({count})");
            }
        }
    }
}

/// End-to-end: a trained HMM plus a one-word dictionary, run through the
/// full `Pipeline` (k-best -> bin -> autocorrect), lands the misspelled
/// token on the correct gold form via bin 4 (k1 differs from original,
/// original isn't in the dictionary, k1 is).
#[test]
fn pipeline_autocorrects_via_bin_4_end_to_end() {
    let dictionary = toy_dictionary();
    let original = vec![TokenData::new("Slring", "doc", 0)];
    let gold = vec![TokenData::new("String", "doc", 0)];
    let aligner_config = AlignerConfig::default();
    let alignment = alignments(&original, &gold, &aligner_config).unwrap();

    let character_set: Vec<char> = "Stlring".chars().collect();
    let builder = HmmBuilder::new(&dictionary, 1e-4, &character_set, &[]);
    let params = builder.build(&alignment.misread_counts, &["String".to_string()]).unwrap();

    let mut config = Config::default();
    config.hmm.k = 1;
    config.hmm.character_set = character_set;
    config.heuristics.bin_actions = HashMap::from([(4u8, Action::KBest)]);

    let pipeline = Pipeline::new(
        Arc::new(config),
        Arc::new(RwLock::new(dictionary)),
        Arc::new(params),
        Arc::new(Mutex::new(KBestCache::new(10))),
    );

    let tokens = vec![Token::text("Slring", "doc", 0)];
    let processed = pipeline.process_document(tokens, false);

    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].data().bin, Some(4));
    assert_eq!(processed[0].data().gold(), Some("String".to_string()));
}

/// S8 / invariant 8: running the pipeline twice over the same document with
/// the same HMM, without `force`, produces identical tokens (the second
/// pass is entirely `Memoized`).
#[test]
fn autocorrect_is_idempotent_without_force() {
    let dictionary = toy_dictionary();
    let original = vec![TokenData::new("Slring", "doc", 0)];
    let gold = vec![TokenData::new("String", "doc", 0)];
    let aligner_config = AlignerConfig::default();
    let alignment = alignments(&original, &gold, &aligner_config).unwrap();

    let character_set: Vec<char> = "Stlring".chars().collect();
    let builder = HmmBuilder::new(&dictionary, 1e-4, &character_set, &[]);
    let params = builder.build(&alignment.misread_counts, &["String".to_string()]).unwrap();

    let mut config = Config::default();
    config.hmm.k = 1;
    config.hmm.character_set = character_set;
    config.heuristics.bin_actions = HashMap::from([(4u8, Action::KBest)]);

    let pipeline = Pipeline::new(
        Arc::new(config),
        Arc::new(RwLock::new(dictionary)),
        Arc::new(params),
        Arc::new(Mutex::new(KBestCache::new(10))),
    );

    let first = pipeline.process_document(vec![Token::text("Slring", "doc", 0)], false);
    let second = pipeline.process_document(first.clone(), false);

    assert_eq!(first[0].data().gold(), second[0].data().gold());
    assert_eq!(second[0].data().heuristic, Some(correctocr_core::HeuristicAction::Memoized));
}

/// Multiple documents processed via `Pipeline::process_documents` (spec.md
/// §5's per-document parallel fan-out) each autocorrect independently.
#[test]
fn process_documents_runs_each_document_independently() {
    let dictionary = toy_dictionary();
    let original = vec![TokenData::new("Slring", "doc", 0)];
    let gold = vec![TokenData::new("String", "doc", 0)];
    let aligner_config = AlignerConfig::default();
    let alignment = alignments(&original, &gold, &aligner_config).unwrap();

    let character_set: Vec<char> = "Stlring".chars().collect();
    let builder = HmmBuilder::new(&dictionary, 1e-4, &character_set, &[]);
    let params = builder.build(&alignment.misread_counts, &["String".to_string()]).unwrap();

    let mut config = Config::default();
    config.hmm.k = 1;
    config.hmm.character_set = character_set;
    config.heuristics.bin_actions = HashMap::from([(4u8, Action::KBest)]);

    let pipeline = Pipeline::new(
        Arc::new(config),
        Arc::new(RwLock::new(dictionary)),
        Arc::new(params),
        Arc::new(Mutex::new(KBestCache::new(10))),
    );

    let documents = vec![
        vec![Token::text("Slring", "doc-a", 0)],
        vec![Token::text("Slring", "doc-b", 0)],
    ];
    let processed = pipeline.process_documents(documents, false);

    assert_eq!(processed.len(), 2);
    for doc in &processed {
        assert_eq!(doc[0].data().gold(), Some("String".to_string()));
    }
}
