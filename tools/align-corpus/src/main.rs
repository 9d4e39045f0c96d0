//! Align an OCR'd corpus against its gold transcription and emit the
//! character confusion table `build-hmm` trains from (spec.md §4.2, §6).
//!
//! Usage:
//!   align-corpus --original ocr.txt --gold gold.txt --confusion-out confusion.json
//!   align-corpus --original ocr.txt --gold gold.txt --confusion-out confusion.json --word-alignments-out aligned.json

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;
use correctocr_core::aligner::{alignments, AlignableToken};
use correctocr_core::config::{AlignerConfig, Config};
use correctocr_core::Result;

#[derive(Parser, Debug)]
#[command(name = "align-corpus")]
#[command(about = "Align an OCR'd corpus against its gold transcription")]
struct Args {
    /// Whitespace-tokenized OCR output.
    #[arg(long)]
    original: PathBuf,

    /// Whitespace-tokenized gold transcription.
    #[arg(long)]
    gold: PathBuf,

    /// Where to write the character confusion table (JSON).
    #[arg(long)]
    confusion_out: PathBuf,

    /// Optional path to write the word-level alignment map (JSON).
    #[arg(long)]
    word_alignments_out: Option<PathBuf>,

    /// Optional config file carrying the `[aligner]` thresholds; the
    /// built-in defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

struct Word(String);

impl AlignableToken for Word {
    fn original(&self) -> &str {
        &self.0
    }

    fn is_punctuation(&self) -> bool {
        !self.0.is_empty() && self.0.chars().all(|c| !c.is_alphanumeric())
    }
}

fn tokenize(path: &PathBuf) -> Result<Vec<Word>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.split_whitespace().map(|w| Word(w.to_string())).collect())
}

fn aligner_config(args: &Args) -> Result<AlignerConfig> {
    match &args.config {
        Some(path) => Ok(Config::load_toml(path, "CORRECTOCR")?.aligner),
        None => Ok(AlignerConfig::default()),
    }
}

fn run(args: Args) -> Result<()> {
    let config = aligner_config(&args)?;
    let original = tokenize(&args.original)?;
    let gold = tokenize(&args.gold)?;

    tracing::info!(
        original_tokens = original.len(),
        gold_tokens = gold.len(),
        "aligning corpus"
    );
    let result = alignments(&original, &gold, &config)?;

    let confusion: BTreeMap<String, BTreeMap<String, u32>> = result
        .misread_counts
        .iter()
        .map(|(&actual, row)| {
            let row: BTreeMap<String, u32> = row.iter().map(|(&read_as, &count)| (read_as.to_string(), count)).collect();
            (actual.to_string(), row)
        })
        .collect();
    std::fs::write(&args.confusion_out, serde_json::to_string_pretty(&confusion)?)?;
    tracing::info!(path = %args.confusion_out.display(), "wrote confusion table");

    if let Some(path) = &args.word_alignments_out {
        std::fs::write(path, serde_json::to_string_pretty(&result.word_alignments)?)?;
        tracing::info!(path = %path.display(), "wrote word alignments");
    }

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
