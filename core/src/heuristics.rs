//! Nine-bin heuristic classifier (spec.md §4.5): given a token's original
//! form, its top candidate, its k-best list, and a dictionary, assigns
//! exactly one of nine mutually exclusive bins and looks up the configured
//! action for that bin. Ported from `original_source/CorrectOCR/
//! heuristics.py`'s `Heuristics.bins` / `evaluate` / `add_to_report` /
//! `report` / `make_settings`.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dictionary::Dictionary;
use crate::error::{CorrectOcrError, Result};
use crate::token::{HeuristicAction, KBestItem};

static PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Punctuation}+").unwrap());

fn strip_punct(word: &str) -> String {
    PUNCT.replace_all(word, "").to_string()
}

/// The four human-configurable actions (spec.md §6 "Heuristic settings
/// file": action codes `o`/`k`/`d`/`a`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Original,
    KBest,
    KDict,
    Annotator,
}

impl Action {
    pub fn code(self) -> char {
        match self {
            Action::Original => 'o',
            Action::KBest => 'k',
            Action::KDict => 'd',
            Action::Annotator => 'a',
        }
    }

    pub fn from_code(c: char) -> Option<Self> {
        match c {
            'o' => Some(Action::Original),
            'k' => Some(Action::KBest),
            'd' => Some(Action::KDict),
            'a' => Some(Action::Annotator),
            _ => None,
        }
    }
}

/// How many of the (distinct) k-best candidates pass the dictionary check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DCode {
    ZeroKd,
    AllKd,
    SomeKd,
}

fn dcode(kbest_words: &[String], dictionary: &Dictionary) -> DCode {
    let distinct: HashSet<&str> = kbest_words.iter().map(String::as_str).collect();
    let nkdict = distinct.iter().filter(|w| dictionary.contains(w)).count();
    if nkdict == 0 {
        DCode::ZeroKd
    } else if nkdict == distinct.len() {
        DCode::AllKd
    } else {
        DCode::SomeKd
    }
}

/// Human-readable description of each bin, matching `Heuristics.bins[n][
/// 'description']` in `heuristics.py`.
pub const BIN_DESCRIPTIONS: [&str; 9] = [
    "k1 = orig and this is in dict.",
    "k1 = orig but not in dict, and no other kbest in dict either.",
    "k1 = orig but not in dict, but some lower-ranked kbest is in dict.",
    "k1 is different from orig, and k1 passes dict check while orig doesn't.",
    "k1 is different from orig and nothing anywhere passes dict check.",
    "k1 is different from orig and neither is in dict, but a lower-ranked candidate is.",
    "k1 is different from orig and both are in dict.",
    "k1 is different from orig, orig is in dict and no candidates are in dict.",
    "k1 is different from orig, k1 not in dict but a lower candidate is and orig also in dict.",
];

/// Classify a token into exactly one of the nine bins (spec.md §4.5 table).
/// `kbest_words` holds every k-best candidate (punctuation-stripped,
/// duplicates allowed) used to compute `nkdict`.
pub fn classify_bin(original: &str, k1: &str, kbest_words: &[String], dictionary: &Dictionary) -> Result<u8> {
    let original = strip_punct(original);
    let k1 = strip_punct(k1);
    let code = dcode(kbest_words, dictionary);
    let o = dictionary.contains(&original);
    let k = dictionary.contains(&k1);
    let same = original == k1;

    let bin = match (same, o, k, code) {
        (true, true, _, _) => 1,
        (true, false, _, DCode::ZeroKd) => 2,
        (true, false, _, DCode::SomeKd) => 3,
        (false, _, true, _) if !o => 4,
        (false, false, false, DCode::ZeroKd) => 5,
        (false, false, false, DCode::SomeKd) => 6,
        (false, true, true, _) => 7,
        (false, true, false, DCode::ZeroKd) => 8,
        (false, true, false, DCode::SomeKd) => 9,
        _ => return Err(CorrectOcrError::Bin { original }),
    };
    Ok(bin)
}

/// Apply the configured `action` for a bin, resolving `kdict` to the
/// highest-ranked dictionary-member candidate (spec.md §4.5 "Decision
/// lookup"). Returns the chosen action (stamped with a k-best rank where
/// applicable), the rank selected, and the literal word chosen (`None` for
/// `annotator`, which defers).
pub fn resolve_action(
    action: Action,
    kbest: &std::collections::BTreeMap<u32, KBestItem>,
    dictionary: &Dictionary,
) -> (HeuristicAction, Option<u32>, Option<String>) {
    match action {
        Action::Original => (HeuristicAction::Original, None, None),
        Action::KBest => {
            let item = kbest.get(&1).cloned().unwrap_or_default();
            (HeuristicAction::KBest(1), Some(1), Some(item.candidate))
        }
        Action::KDict => {
            for (&rank, item) in kbest.iter() {
                if !item.is_empty() && dictionary.contains(&strip_punct(&item.candidate)) {
                    return (HeuristicAction::KDict, Some(rank), Some(item.candidate.clone()));
                }
            }
            (HeuristicAction::KDict, None, None)
        }
        Action::Annotator => (HeuristicAction::Annotator, None, None),
    }
}

/// Load a `bin_number <TAB> action_code` settings file (spec.md §6).
pub fn load_settings_tsv<P: AsRef<Path>>(path: P) -> Result<HashMap<u8, Action>> {
    let content = std::fs::read_to_string(path)?;
    parse_settings_tsv(&content)
}

fn parse_settings_tsv(content: &str) -> Result<HashMap<u8, Action>> {
    let mut map = HashMap::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, '\t');
        let bin_num: u8 = parts
            .next()
            .ok_or_else(|| CorrectOcrError::Config(format!("malformed heuristic settings line: {line:?}")))?
            .trim()
            .parse()
            .map_err(|_| CorrectOcrError::Config(format!("bad bin number: {line:?}")))?;
        let code = parts
            .next()
            .ok_or_else(|| CorrectOcrError::Config(format!("missing action code: {line:?}")))?
            .trim()
            .chars()
            .next()
            .ok_or_else(|| CorrectOcrError::Config(format!("empty action code: {line:?}")))?;
        let action = Action::from_code(code).ok_or_else(|| CorrectOcrError::Config(format!("unknown action code {code:?}")))?;
        map.insert(bin_num, action);
    }
    Ok(map)
}

pub fn save_settings_tsv<P: AsRef<Path>>(path: P, settings: &HashMap<u8, Action>) -> Result<()> {
    let mut rows: Vec<(u8, Action)> = settings.iter().map(|(&k, &v)| (k, v)).collect();
    rows.sort_by_key(|(k, _)| *k);
    let content = rows.iter().map(|(k, v)| format!("{k}\t{}", v.code())).collect::<Vec<_>>().join("\n");
    std::fs::write(path, content)?;
    Ok(())
}

/// One labelled (gold-known) decoded token, as read from a dev-set decoding
/// file, for the tuning report.
pub struct LabelledRow<'a> {
    pub original: &'a str,
    pub gold: &'a str,
    /// Candidates in beam order, rank 1 first.
    pub kbest: &'a [KBestItem],
}

/// Per-bin outcome tallies. Slot meaning varies by bin (bins 3/6/9 use a
/// `d1 == gold` slot the others don't need) — see [`report_text`] for the
/// mapping, ported from `heuristics.py::add_to_report`'s `vs[1..27]`.
#[derive(Debug, Default, Clone, Copy)]
struct BinOutcome([u64; 4]);

/// Accumulated tuning statistics over a labelled corpus (spec.md §4.5
/// "Report generator").
#[derive(Debug, Default, Clone)]
pub struct Report {
    total: u64,
    undersegmentation: u64,
    oversegmentation: u64,
    bins: [BinOutcome; 10], // index 1..=9 used, 0 unused
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate one labelled row. Mirrors `add_to_report`'s segmentation-
    /// error short-circuits: an empty `original` with non-empty gold means
    /// words ran together upstream (undersegmentation); an empty `gold`
    /// with non-empty original means the original was wrongly split
    /// (oversegmentation). Neither counts toward the bin tallies.
    pub fn add(&mut self, row: &LabelledRow, dictionary: &Dictionary) {
        let gold = strip_punct(row.gold);
        let orig = strip_punct(row.original);

        if row.original.is_empty() && !gold.is_empty() {
            self.undersegmentation += 1;
            return;
        }
        if row.gold.is_empty() && !orig.is_empty() {
            self.oversegmentation += 1;
            return;
        }
        if gold.is_empty() {
            return;
        }

        self.total += 1;

        let kbws: Vec<String> = row.kbest.iter().map(|item| strip_punct(&item.candidate)).collect();
        let k1 = kbws.first().cloned().unwrap_or_default();
        let in_dict_ordered: Vec<&str> = kbws.iter().map(String::as_str).filter(|w| dictionary.contains(w)).collect();
        let d1 = in_dict_ordered.first().copied();

        let Ok(bin) = classify_bin(row.original, &k1, &kbws, dictionary) else {
            return;
        };

        let outcome = &mut self.bins[bin as usize];
        match bin {
            1 | 2 => outcome.0[if orig == gold { 0 } else { 1 }] += 1,
            3 => {
                outcome.0[if k1 == gold {
                    0
                } else if d1 == Some(gold.as_str()) {
                    1
                } else {
                    2
                }] += 1
            }
            4 | 5 | 7 | 8 => {
                outcome.0[if orig == gold {
                    0
                } else if k1 == gold {
                    1
                } else {
                    2
                }] += 1
            }
            6 | 9 => {
                outcome.0[if orig == gold {
                    0
                } else if k1 == gold {
                    1
                } else if d1 == Some(gold.as_str()) {
                    2
                } else {
                    3
                }] += 1
            }
            _ => unreachable!("classify_bin only returns 1..=9"),
        }
    }
}

fn percc(n: u64, total: u64) -> String {
    if n == 0 || total == 0 {
        "00".to_string()
    } else {
        format!("{:.2}", (n as f64 / total as f64) * 100.0)
    }
}

/// Render the human-readable tuning report (spec.md §6 "Report file").
/// Each `BIN <n>` line carries a `decision?` placeholder a human replaces
/// with an action code before the file is fed to [`settings_from_report`].
pub fn report_text(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!("Tokens included in evaluation: \t n = {}\n\n", report.total));
    let initial_error: u64 = (1..=9u8)
        .map(|b| {
            let o = report.bins[b as usize].0;
            match b {
                1 => o[1],
                2 => o[1],
                3 => o[1] + o[2],
                4 | 5 | 7 | 8 => o[1] + o[2],
                6 | 9 => o[1] + o[2] + o[3],
                _ => 0,
            }
        })
        .sum();
    out.push_str(&format!(
        "INITIAL ERROR - {} ({} %)\n\n\n",
        initial_error,
        percc(initial_error, report.total)
    ));
    out.push_str(
        "Choose from these options for each bin: a (annotator), o (original), k (k1, best candidate), d (best candidate in dictionary)\n\n",
    );
    for (i, description) in BIN_DESCRIPTIONS.iter().enumerate() {
        let bin = (i + 1) as u8;
        let o = report.bins[bin as usize].0;
        let bin_total: u64 = o.iter().sum();
        out.push_str(&format!("BIN {bin} \t\t decision?\n"));
        out.push_str(&format!(" {description}\n"));
        out.push_str(&format!("{} % of tokens\n", percc(bin_total, report.total)));
        match bin {
            1 | 2 => {
                out.push_str(&format!("tokens where k1/orig == gold? \t {}  ({} %)\n", o[0], percc(o[0], report.total)));
                out.push_str(&format!("tokens where k1/orig != gold? \t {}  ({} %)\n\n\n", o[1], percc(o[1], report.total)));
            }
            3 => {
                out.push_str(&format!("tokens where orig == gold? \t {}  ({} %)\n", o[0], percc(o[0], report.total)));
                out.push_str(&format!(
                    "tokens where top dict-filtered candidate == gold? \t {}  ({} %)\n",
                    o[1],
                    percc(o[1], report.total)
                ));
                out.push_str(&format!(
                    "tokens where gold is neither orig nor top dict-filtered? \t {}  ({} %)\n\n\n",
                    o[2],
                    percc(o[2], report.total)
                ));
            }
            4 | 5 | 7 | 8 => {
                out.push_str(&format!("tokens where orig == gold? \t {}  ({} %)\n", o[0], percc(o[0], report.total)));
                out.push_str(&format!("tokens where k1 == gold? \t {}  ({} %)\n", o[1], percc(o[1], report.total)));
                out.push_str(&format!(
                    "tokens where neither orig nor k1 == gold? \t {}  ({} %)\n\n\n",
                    o[2],
                    percc(o[2], report.total)
                ));
            }
            6 | 9 => {
                out.push_str(&format!("tokens where orig == gold? \t {}  ({} %)\n", o[0], percc(o[0], report.total)));
                out.push_str(&format!("tokens where k1 == gold? \t {}  ({} %)\n", o[1], percc(o[1], report.total)));
                out.push_str(&format!(
                    "tokens where top dict-filtered candidate == gold? \t {}  ({} %)\n",
                    o[2],
                    percc(o[2], report.total)
                ));
                out.push_str(&format!("tokens where none of the above == gold? \t {}  ({} %)\n\n\n", o[3], percc(o[3], report.total)));
            }
            _ => unreachable!(),
        }
    }
    out
}

/// Parse a human-edited report's `BIN <n> ... <action>` lines back into a
/// settings map, per `heuristics.py::make_settings`.
pub fn settings_from_report(report_text: &str) -> Result<HashMap<u8, Action>> {
    let mut map = HashMap::new();
    for line in report_text.lines() {
        if !line.contains("BIN") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        let Ok(bin_num) = parts[1].parse::<u8>() else {
            continue;
        };
        let Some(code) = parts.last().and_then(|s| s.chars().next()) else {
            continue;
        };
        if let Some(action) = Action::from_code(code) {
            map.insert(bin_num, action);
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict_with(words: &[&str]) -> Dictionary {
        let mut d = Dictionary::new(false);
        for w in words {
            d.add("corpus", w);
        }
        d
    }

    #[test]
    fn bin_1_when_k1_equals_original_and_in_dict() {
        let dictionary = dict_with(&["test"]);
        let bin = classify_bin("test", "test", &["test".to_string()], &dictionary).unwrap();
        assert_eq!(bin, 1);
    }

    #[test]
    fn bin_4_when_k1_differs_and_only_k1_in_dict() {
        // Scenario S3: ("teh", kbest=[("the", 0.9), ("teh", 0.1)]), dict={"the"}.
        let dictionary = dict_with(&["the"]);
        let kbws = vec!["the".to_string(), "teh".to_string()];
        let bin = classify_bin("teh", "the", &kbws, &dictionary).unwrap();
        assert_eq!(bin, 4);
    }

    #[test]
    fn every_combination_of_flags_lands_in_exactly_one_bin() {
        let dictionary = dict_with(&["cat", "dog"]);
        for original in ["cat", "dog", "cta", "xyz"] {
            for k1 in ["cat", "dog", "cta", "xyz"] {
                for extra in [vec![], vec!["cat".to_string()], vec!["xyz".to_string()]] {
                    let mut kbws = vec![k1.to_string()];
                    kbws.extend(extra);
                    let _ = classify_bin(original, k1, &kbws, &dictionary);
                }
            }
        }
    }

    #[test]
    fn settings_tsv_round_trips() {
        let mut settings = HashMap::new();
        settings.insert(1u8, Action::Original);
        settings.insert(4u8, Action::KBest);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.tsv");
        save_settings_tsv(&path, &settings).unwrap();
        let loaded = load_settings_tsv(&path).unwrap();
        assert_eq!(loaded.get(&1), Some(&Action::Original));
        assert_eq!(loaded.get(&4), Some(&Action::KBest));
    }

    #[test]
    fn report_accumulates_segmentation_errors_separately() {
        let dictionary = dict_with(&["word"]);
        let mut report = Report::new();
        report.add(
            &LabelledRow {
                original: "",
                gold: "word",
                kbest: &[],
            },
            &dictionary,
        );
        assert_eq!(report.undersegmentation, 1);
        assert_eq!(report.total, 0);
    }

    #[test]
    fn settings_from_report_parses_bin_lines() {
        let text = "BIN 1 \t\t decision?\n blah blah\nBIN 1 \t\t o\nBIN 4 \t\t k\n";
        let settings = settings_from_report(text).unwrap();
        assert_eq!(settings.get(&1), Some(&Action::Original));
        assert_eq!(settings.get(&4), Some(&Action::KBest));
    }
}
