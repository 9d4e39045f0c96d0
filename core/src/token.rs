//! The in-memory representation of an OCR'd token, unifying the three
//! upstream tokenizer variants (spec.md §9 "Dynamic/duck-typed dispatch ->
//! tagged variants") behind one shared set of fields. Grounded on
//! `original_source/CorrectOCR/tokens/_super.py` (`Token`, `KBestItem`,
//! `dehyphenate_tokens`) and `_pdf.py`/`_hocr.py`/`_text.py` for the
//! variant-specific payloads.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::aligner::AlignableToken;

static LEADING_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\p{Punctuation}*").unwrap());
static TRAILING_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Punctuation}*$").unwrap());
static ALL_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\p{Punctuation}+$").unwrap());
static DASH_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Dash}$").unwrap());

/// `(candidate, probability)`, keyed by 1-based rank in a k-best list
/// (spec.md §3). A default/empty item is the padding sentinel used when
/// fewer than `k` real candidates exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct KBestItem {
    pub candidate: String,
    pub probability: f64,
}

impl KBestItem {
    pub fn new(candidate: impl Into<String>, probability: f64) -> Self {
        Self {
            candidate: candidate.into(),
            probability,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.candidate.is_empty()
    }
}

/// The action chosen for a token by the pipeline, spec.md §3's Token
/// `heuristic` field: `original | kbest-N | kdict | annotator | memoized |
/// linefeed`. Distinct from [`crate::heuristics::Action`], which is the
/// *configured* bin->action mapping (only four of these six are
/// human-configurable; `memoized` and `linefeed` are assigned directly by
/// the pipeline/dehyphenation logic, never looked up from a bin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeuristicAction {
    Original,
    KBest(u32),
    KDict,
    Annotator,
    Memoized,
    Linefeed,
}

impl HeuristicAction {
    pub fn code(&self) -> String {
        match self {
            HeuristicAction::Original => "original".to_string(),
            HeuristicAction::KBest(n) => format!("kbest-{n}"),
            HeuristicAction::KDict => "kdict".to_string(),
            HeuristicAction::Annotator => "annotator".to_string(),
            HeuristicAction::Memoized => "memoized".to_string(),
            HeuristicAction::Linefeed => "linefeed".to_string(),
        }
    }
}

/// Fields shared by every token variant (spec.md §3 Token).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenData {
    prefix_punct: String,
    lookup: String,
    suffix_punct: String,
    gold: Option<String>,
    pub kbest: BTreeMap<u32, KBestItem>,
    pub bin: Option<u8>,
    pub heuristic: Option<HeuristicAction>,
    /// The configured bin->action code (`o`/`k`/`d`/`a`, spec.md §6) that
    /// drove `heuristic`, distinct from `heuristic` itself: `heuristic`
    /// records the resolved strategy actually applied (e.g. which k-best
    /// rank `kdict` picked), `decision` records the raw per-bin policy
    /// letter from the settings file, matching `tokens/_super.py`'s
    /// `Bin.decision` vs `Bin.heuristic` distinction.
    pub decision: Option<char>,
    pub selection: Option<u32>,
    pub doc_id: String,
    pub index: usize,
    pub is_discarded: bool,
    pub is_hyphenated: bool,
}

/// Split `original` into (leading punctuation, stripped lookup form,
/// trailing punctuation), mirroring `_super.py`'s `punct_RE` capture groups.
fn split_punct(original: &str) -> (String, String, String) {
    let prefix_punct = LEADING_PUNCT.find(original).map(|m| m.as_str().to_string()).unwrap_or_default();
    let rest = &original[prefix_punct.len()..];
    let suffix_punct = TRAILING_PUNCT.find(rest).map(|m| m.as_str().to_string()).unwrap_or_default();
    let lookup = rest[..rest.len() - suffix_punct.len()].to_string();
    (prefix_punct, lookup, suffix_punct)
}

impl TokenData {
    pub fn new(original: &str, doc_id: impl Into<String>, index: usize) -> Self {
        let (prefix_punct, lookup, suffix_punct) = split_punct(original);
        let mut data = Self {
            prefix_punct,
            lookup,
            suffix_punct,
            gold: None,
            kbest: BTreeMap::new(),
            bin: None,
            heuristic: None,
            decision: None,
            selection: None,
            doc_id: doc_id.into(),
            index,
            is_discarded: false,
            is_hyphenated: false,
        };
        if data.is_punctuation() {
            data.gold = Some(data.lookup.clone());
        }
        data
    }

    /// Reassembled surface form: leading punctuation + lookup + trailing
    /// punctuation (`Token.original` in `_super.py`).
    pub fn original(&self) -> String {
        format!("{}{}{}", self.prefix_punct, self.lookup, self.suffix_punct)
    }

    /// The stripped form the HMM decodes and the dictionary looks up.
    pub fn lookup(&self) -> &str {
        &self.lookup
    }

    pub fn gold(&self) -> Option<String> {
        self.gold.as_ref().map(|g| format!("{}{}{}", self.prefix_punct, g, self.suffix_punct))
    }

    /// Set `gold`, stripping surrounding punctuation to match `_super.py`'s
    /// `gold` setter.
    pub fn set_gold(&mut self, gold: impl Into<String>) {
        let raw: String = gold.into();
        let trimmed = raw.trim_matches(|c: char| c.is_ascii_punctuation());
        self.gold = Some(trimmed.to_string());
    }

    pub fn clear_gold(&mut self) {
        self.gold = None;
    }

    pub fn k(&self) -> usize {
        self.kbest.len()
    }

    pub fn is_punctuation(&self) -> bool {
        ALL_PUNCT.is_match(&self.original())
    }

    pub fn is_numeric(&self) -> bool {
        !self.original().is_empty() && self.original().chars().all(|c| c.is_numeric())
    }

    pub fn ends_in_dash(&self) -> bool {
        DASH_SUFFIX.is_match(&self.original())
    }
}

impl AlignableToken for TokenData {
    fn original(&self) -> &str {
        // AlignableToken needs a borrowed &str; lookup is a close enough
        // proxy for alignment purposes since punctuation is junk-filtered
        // by the aligner's isjunk predicate anyway. Callers that need the
        // exact surface form should use `TokenData::original()` (owned).
        &self.lookup
    }

    fn is_punctuation(&self) -> bool {
        TokenData::is_punctuation(self)
    }
}

/// One token, tagged by source-format variant (spec.md §9 Design Note).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Token {
    Text(TokenData),
    Pdf(TokenData, PdfInfo),
    Hocr(TokenData, HocrInfo),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfInfo {
    pub page: u32,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub block: u32,
    pub line: u32,
    pub word: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HocrInfo {
    pub page: u32,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Token {
    pub fn text(original: &str, doc_id: impl Into<String>, index: usize) -> Self {
        Token::Text(TokenData::new(original, doc_id, index))
    }

    pub fn pdf(original: &str, doc_id: impl Into<String>, index: usize, info: PdfInfo) -> Self {
        Token::Pdf(TokenData::new(original, doc_id, index), info)
    }

    pub fn hocr(original: &str, doc_id: impl Into<String>, index: usize, info: HocrInfo) -> Self {
        Token::Hocr(TokenData::new(original, doc_id, index), info)
    }

    pub fn data(&self) -> &TokenData {
        match self {
            Token::Text(d) | Token::Pdf(d, _) | Token::Hocr(d, _) => d,
        }
    }

    pub fn data_mut(&mut self) -> &mut TokenData {
        match self {
            Token::Text(d) | Token::Pdf(d, _) | Token::Hocr(d, _) => d,
        }
    }

    pub fn original(&self) -> String {
        self.data().original()
    }

    pub fn frame(&self) -> Option<(u32, f64, f64, f64, f64)> {
        match self {
            Token::Text(_) => None,
            Token::Pdf(_, info) => Some((info.page, info.x0, info.y0, info.x1, info.y1)),
            Token::Hocr(_, info) => Some((info.page, info.x0, info.y0, info.x1, info.y1)),
        }
    }

    pub fn token_type(&self) -> &'static str {
        match self {
            Token::Text(_) => "Text",
            Token::Pdf(_, _) => "Pdf",
            Token::Hocr(_, _) => "Hocr",
        }
    }
}

/// Tab-separated column header matching spec.md §6's token record, given
/// how many k-best ranks are populated and whether bin fields are present.
pub fn header(k: usize, with_bin: bool, with_gold: bool) -> Vec<String> {
    let mut header = Vec::new();
    if with_gold {
        header.push("Gold".to_string());
    }
    header.push("Original".to_string());
    for n in 1..=k {
        header.push(format!("{n}-best"));
        header.push(format!("{n}-best prob."));
    }
    if with_bin {
        header.extend(["Bin", "Heuristic", "Decision", "Selection"].map(String::from));
    }
    header.push("Token type".to_string());
    header.push("Token info".to_string());
    header
}

/// One TSV row per spec.md §6's "Token record (per-document)" column order.
pub fn to_row(token: &Token) -> Vec<String> {
    let data = token.data();
    let mut row = Vec::new();
    if let Some(gold) = data.gold() {
        row.push(gold);
    }
    row.push(data.original());
    for n in 1..=data.k() as u32 {
        let item = data.kbest.get(&n).cloned().unwrap_or_default();
        row.push(item.candidate);
        row.push(item.probability.to_string());
    }
    if let Some(bin) = data.bin {
        row.push(bin.to_string());
        row.push(data.heuristic.map(|h| h.code()).unwrap_or_default());
        row.push(data.decision.map(|c| c.to_string()).unwrap_or_default());
        row.push(data.selection.map(|s| s.to_string()).unwrap_or_default());
    }
    row.push(token.token_type().to_string());
    row.push(token_info_json(token));
    row
}

fn token_info_json(token: &Token) -> String {
    match token {
        Token::Text(d) => serde_json::to_string(d.lookup()).unwrap_or_default(),
        Token::Pdf(_, info) => serde_json::to_string(info).unwrap_or_default(),
        Token::Hocr(_, info) => serde_json::to_string(info).unwrap_or_default(),
    }
}

/// Tokens whose `original` ends in a Unicode `Dash`-category character are
/// merged with the following token into a synthetic composite whose
/// `original` is the concatenation with the trailing dash dropped, per
/// spec.md §4.6 and `tokens/_super.py::dehyphenate_tokens` — but only when
/// the merged form is a dictionary hit and the unmerged prefix is not
/// (spec.md §4.6's stricter condition; the upstream always merges on a
/// trailing dash).
pub fn dehyphenate(tokens: Vec<Token>, dictionary: &crate::dictionary::Dictionary) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        if token.data().ends_in_dash() {
            if let Some(next) = iter.peek() {
                let first_original = token.original();
                let merged_original = format!(
                    "{}{}",
                    &first_original[..first_original.len() - dash_len(&first_original)],
                    next.original()
                );
                let (_, merged_lookup, _) = split_punct(&merged_original);
                let prefix_is_word = dictionary.contains(token.data().lookup());
                if dictionary.contains(&merged_lookup) && !prefix_is_word {
                    let next = iter.next().unwrap();
                    out.push(merge_hyphenated(token, next, &merged_original));
                    continue;
                }
            }
        }
        out.push(token);
    }
    out
}

fn dash_len(s: &str) -> usize {
    s.chars().next_back().map(|c| c.len_utf8()).unwrap_or(0)
}

fn merge_hyphenated(first: Token, second: Token, merged_original: &str) -> Token {
    let doc_id = first.data().doc_id.clone();
    let index = first.data().index;
    let mut data = TokenData::new(merged_original, doc_id, index);
    data.is_hyphenated = true;
    match first {
        Token::Pdf(_, info) => Token::Pdf(data, info),
        Token::Hocr(_, info) => Token::Hocr(data, info),
        Token::Text(_) => match second {
            Token::Pdf(_, info) => Token::Pdf(data, info),
            Token::Hocr(_, info) => Token::Hocr(data, info),
            Token::Text(_) => Token::Text(data),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;

    #[test]
    fn original_reassembles_punctuation() {
        let data = TokenData::new("(word)", "doc", 0);
        assert_eq!(data.original(), "(word)");
        assert_eq!(data.lookup(), "word");
    }

    #[test]
    fn punctuation_only_tokens_are_their_own_gold() {
        let data = TokenData::new(",", "doc", 0);
        assert!(data.is_punctuation());
        assert_eq!(data.gold(), Some(",".to_string()));
    }

    #[test]
    fn set_gold_strips_surrounding_punctuation() {
        let mut data = TokenData::new("word", "doc", 0);
        data.set_gold("\"corrected\"");
        assert_eq!(data.gold(), Some("corrected".to_string()));
    }

    #[test]
    fn kbest_defaults_pad_with_empty_sentinels() {
        let data = TokenData::new("word", "doc", 0);
        assert_eq!(data.kbest.get(&1).cloned().unwrap_or_default(), KBestItem::empty());
    }

    #[test]
    fn dehyphenation_merges_only_when_merged_form_is_dictionary_hit() {
        let mut dictionary = Dictionary::new(false);
        dictionary.add("corpus", "wonderful");
        let tokens = vec![
            Token::text("won\u{2010}", "doc", 0),
            Token::text("derful", "doc", 1),
        ];
        let merged = dehyphenate(tokens, &dictionary);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].data().is_hyphenated);
        assert_eq!(merged[0].data().lookup(), "wonderful");
    }

    #[test]
    fn dehyphenation_leaves_tokens_alone_when_prefix_already_a_word() {
        let mut dictionary = Dictionary::new(false);
        dictionary.add("corpus", "co");
        dictionary.add("corpus", "coordinate");
        let tokens = vec![Token::text("co-", "doc", 0), Token::text("ordinate", "doc", 1)];
        let merged = dehyphenate(tokens, &dictionary);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn to_row_decision_column_is_the_bin_action_code_not_gold() {
        let mut data = TokenData::new("teh", "doc", 0);
        data.set_gold("the");
        data.bin = Some(4);
        data.heuristic = Some(HeuristicAction::KBest(1));
        data.decision = Some('k');
        data.selection = Some(1);
        let token = Token::Text(data);

        let row = to_row(&token);
        let header = header(0, true, true);
        let decision = &row[header.iter().position(|h| h == "Decision").unwrap()];
        let gold = &row[header.iter().position(|h| h == "Gold").unwrap()];
        assert_eq!(decision, "k");
        assert_eq!(gold, "the");
        assert_ne!(decision, gold);
    }
}
