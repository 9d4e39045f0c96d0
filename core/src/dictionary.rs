//! Word-list dictionary used to judge whether a token is "correct" and to
//! drive the heuristic bin classifier's `nkdict`/`dcode` computation.
//!
//! A [`Dictionary`] "contains" every string that has no alphabetic letters
//! at all (numbers, punctuation-only tokens), by design: those can never be
//! misspelled in a way a word list would catch.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::Result;

static LETTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Alphabetic}").unwrap());

/// Punctuation and quote marks stripped from the ends of a word before
/// lookup, beyond ASCII punctuation: guillemets and curly/low quotes
/// commonly left behind by OCR.
const EXTRA_QUOTE_CHARS: &[char] = &['»', '«', '\u{201c}', '\u{201d}', '\u{201e}', '\u{2039}', '\u{203a}'];

fn is_trimmed(c: char) -> bool {
    c.is_ascii_punctuation() || c.is_whitespace() || EXTRA_QUOTE_CHARS.contains(&c)
}

/// Strip soft hyphens and hard hyphens, then trim surrounding punctuation,
/// whitespace, and quote marks. Mirrors `dictionary.py::Dictionary.clean`.
pub fn clean(word: &str) -> String {
    let no_hyphens: String = word.chars().filter(|&c| c != '\u{ad}' && c != '-').collect();
    no_hyphens.trim_matches(is_trimmed).to_string()
}

/// A grouped set of known words, persisted as one sorted plain-text file
/// per group under a directory.
#[derive(Debug, Default)]
pub struct Dictionary {
    path: Option<PathBuf>,
    ignore_case: bool,
    groups: HashMap<String, HashSet<String>>,
    dirty: HashSet<String>,
}

impl Dictionary {
    pub fn new(ignore_case: bool) -> Self {
        Self {
            path: None,
            ignore_case,
            groups: HashMap::new(),
            dirty: HashSet::new(),
        }
    }

    /// Load every file in `dir` as a group named after its filename.
    pub fn load<P: AsRef<Path>>(dir: P, ignore_case: bool) -> Result<Self> {
        let dir = dir.as_ref();
        let mut dict = Self::new(ignore_case);
        dict.path = Some(dir.to_path_buf());
        if !dir.is_dir() {
            std::fs::create_dir_all(dir)?;
            return Ok(dict);
        }
        tracing::info!(path = %dir.display(), "loading dictionary");
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let file_path = entry.path();
            if !file_path.is_file() {
                continue;
            }
            let group = file_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let content = std::fs::read_to_string(&file_path)?;
            for line in content.lines() {
                dict.add_internal(&group, line, true, false);
            }
        }
        tracing::info!(words = dict.len(), "dictionary loaded");
        Ok(dict)
    }

    pub fn len(&self) -> usize {
        let mut all: HashSet<&str> = HashSet::new();
        for group in self.groups.values() {
            all.extend(group.iter().map(String::as_str));
        }
        all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Every stored word across all groups, for HMM training's init/transition
    /// and character-count passes (`model.py` folds `self._dictionary` into
    /// both).
    pub fn words(&self) -> impl Iterator<Item = &str> + '_ {
        self.groups.values().flat_map(|g| g.iter().map(String::as_str))
    }

    /// A dictionary contains every non-alphabetic string vacuously; letter-
    /// bearing strings are looked up (case-folded if `ignore_case`) across
    /// every group.
    pub fn contains(&self, word: &str) -> bool {
        let cleaned = clean(word);
        if cleaned.is_empty() || !LETTER_RE.is_match(&cleaned) {
            return true;
        }
        let needle = if self.ignore_case {
            cleaned.to_lowercase()
        } else {
            cleaned
        };
        self.groups.values().any(|group| group.contains(&needle))
    }

    /// Add a word (after cleaning) to `group`. Silently drops empty or
    /// non-alphabetic strings; splits on internal spaces.
    pub fn add(&mut self, group: &str, word: &str) {
        self.add_internal(group, word, false, true);
    }

    fn add_internal(&mut self, group: &str, word: &str, nowarn: bool, dirty: bool) {
        let cleaned = clean(word);
        if cleaned.is_empty() || !LETTER_RE.is_match(&cleaned) {
            return;
        }
        if cleaned.contains(' ') {
            tracing::info!(%cleaned, "splitting word with spaces");
            for w in cleaned.split(' ') {
                if !self.contains(w) {
                    self.add_internal(group, w, nowarn, dirty);
                }
            }
            return;
        }
        let stored = if self.ignore_case {
            cleaned.to_lowercase()
        } else {
            cleaned
        };
        let entry = self.groups.entry(group.to_string()).or_default();
        if dirty && !entry.contains(&stored) {
            self.dirty.insert(group.to_string());
        }
        if stored.chars().count() > 20 && !nowarn {
            tracing::warn!(word = %stored, "added word is more than 20 characters long");
        }
        entry.insert(stored);
    }

    fn save_group(&self, group: &str) -> Result<()> {
        let Some(base) = &self.path else {
            return Ok(());
        };
        let path = base.join(group);
        let words = self.groups.get(group).cloned().unwrap_or_default();
        if words.is_empty() {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            return Ok(());
        }
        let mut sorted: Vec<&String> = words.iter().collect();
        sorted.sort_by_key(|w| w.to_lowercase());
        let content = sorted
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        tracing::info!(group, words = sorted.len(), path = %path.display(), "saving dictionary group");
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Persist every group marked dirty since load.
    pub fn save(&self) -> Result<()> {
        tracing::info!(words = self.len(), "saving dictionary");
        for group in self.dirty.iter() {
            self.save_group(group)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_strips_hyphens_and_quotes() {
        assert_eq!(clean("re\u{ad}think"), "rethink");
        assert_eq!(clean("\u{201c}word\u{201d}"), "word");
        assert_eq!(clean("well-known"), "wellknown");
        assert_eq!(clean("  trailing.  "), "trailing");
    }

    #[test]
    fn non_alphabetic_tokens_are_vacuously_contained() {
        let dict = Dictionary::new(false);
        assert!(dict.contains("8,5"));
        assert!(dict.contains("(600)"));
        assert!(dict.contains(""));
    }

    #[test]
    fn add_then_contains_round_trips() {
        let mut dict = Dictionary::new(false);
        dict.add("corpus", "hello");
        assert!(dict.contains("hello"));
        assert!(!dict.contains("goodbye"));
    }

    #[test]
    fn ignore_case_folds_lookup() {
        let mut dict = Dictionary::new(true);
        dict.add("corpus", "Hello");
        assert!(dict.contains("HELLO"));
        assert!(dict.contains("hello"));
    }

    #[test]
    fn add_splits_words_with_internal_spaces() {
        let mut dict = Dictionary::new(false);
        dict.add("corpus", "new york");
        assert!(dict.contains("new"));
        assert!(dict.contains("york"));
    }

    #[test]
    fn dirty_tracking_only_marks_touched_groups() {
        let mut dict = Dictionary::new(false);
        dict.add_internal("a", "clean", true, false);
        dict.add("b", "dirty");
        assert!(!dict.dirty.contains("a"));
        assert!(dict.dirty.contains("b"));
    }
}
