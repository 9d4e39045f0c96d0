//! Decode words (or a tokenized document) into k-best spelling candidates
//! via a trained HMM, per spec.md §4.4/§4.6.
//!
//! Usage:
//!   decode-words --hmm hmm_parameters.json --dictionary dictionary/ \
//!     --config correctocr.toml --words words.txt --output decoded.tsv
//!
//!   decode-words --hmm hmm_parameters.json --dictionary dictionary/ \
//!     --config correctocr.toml --tokens document.txt --output document.tsv --autocorrect

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use clap::Parser;
use correctocr_core::config::Config;
use correctocr_core::dictionary::Dictionary;
use correctocr_core::hmm::decoder::{decode_word, generate_kbest};
use correctocr_core::hmm::{HmmParams, KBestCache};
use correctocr_core::pipeline::apply_heuristic;
use correctocr_core::token::{header, to_row, Token};
use correctocr_core::Result;

#[derive(Parser, Debug)]
#[command(name = "decode-words")]
#[command(about = "Decode a word list or tokenized document into k-best spelling candidates")]
struct Args {
    /// Trained HMM parameter file.
    #[arg(long)]
    hmm: PathBuf,

    /// Dictionary directory.
    #[arg(long)]
    dictionary: PathBuf,

    /// Config file carrying `[hmm]` (k, multichars, cache capacity) and
    /// `[heuristics]` (bin -> action, case sensitivity).
    #[arg(long)]
    config: PathBuf,

    /// One bare word per line; mutually exclusive with `--tokens`.
    #[arg(long)]
    words: Option<PathBuf>,

    /// One whitespace-tokenized document, run through the full
    /// bin+autocorrect pipeline instead of bare decoding.
    #[arg(long)]
    tokens: Option<PathBuf>,

    /// Where to write the TSV token record output (spec.md §6).
    #[arg(long)]
    output: PathBuf,

    /// Recompute k-best and bin/autocorrect even for tokens whose `gold` is
    /// already set.
    #[arg(long)]
    force: bool,
}

fn decode_word_list(path: &PathBuf, params: &HmmParams, dictionary: &Dictionary, config: &Config) -> Result<String> {
    let mut out = String::new();
    for word in std::fs::read_to_string(path)?.lines() {
        let word = word.trim();
        if word.is_empty() {
            continue;
        }
        let kbest = decode_word(params, dictionary, &config.hmm.multichars, word, config.hmm.k);
        out.push_str(word);
        for rank in 1..=config.hmm.k as u32 {
            let item = kbest.get(&rank).cloned().unwrap_or_default();
            out.push('\t');
            out.push_str(&item.candidate);
            out.push('\t');
            out.push_str(&item.probability.to_string());
        }
        out.push('\n');
    }
    Ok(out)
}

fn decode_document(path: &PathBuf, params: &HmmParams, dictionary: Arc<RwLock<Dictionary>>, config: &Config, force: bool) -> Result<String> {
    let doc_id = path.file_stem().and_then(|s| s.to_str()).unwrap_or("document").to_string();
    let content = std::fs::read_to_string(path)?;
    let mut tokens: Vec<Token> = content
        .split_whitespace()
        .enumerate()
        .map(|(i, word)| Token::text(word, doc_id.clone(), i))
        .collect();

    let cache = KBestCache::load(&config.resources.kbest_cache_file, config.hmm.cache_capacity);
    {
        let dict = dictionary.read().expect("dictionary lock poisoned");
        generate_kbest(&mut tokens, params, &dict, &config.hmm.multichars, config.hmm.k, &cache, force);
        for token in tokens.iter_mut() {
            apply_heuristic(token, &dict, &config.heuristics.bin_actions, force);
        }
    }
    cache.save()?;

    let mut out = header(config.hmm.k, true, true).join("\t");
    out.push('\n');
    for token in &tokens {
        out.push_str(&to_row(token).join("\t"));
        out.push('\n');
    }
    Ok(out)
}

fn run(args: Args) -> Result<()> {
    let config = Config::load_toml(&args.config, "CORRECTOCR")?;
    let params = HmmParams::load(&args.hmm)?;
    let dictionary = Dictionary::load(&args.dictionary, config.heuristics.case_insensitive)?;

    let output = match (&args.words, &args.tokens) {
        (Some(words_path), None) => decode_word_list(words_path, &params, &dictionary, &config)?,
        (None, Some(doc_path)) => decode_document(doc_path, &params, Arc::new(RwLock::new(dictionary)), &config, args.force)?,
        _ => {
            return Err(correctocr_core::CorrectOcrError::Config(
                "exactly one of --words or --tokens must be given".to_string(),
            ))
        }
    };

    std::fs::write(&args.output, output)?;
    tracing::info!(path = %args.output.display(), "wrote decoded output");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::try_init().ok();
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
    Ok(())
}
