//! Tabulate per-bin correction accuracy over a labelled (gold-known) corpus
//! of already-decoded tokens, and derive a heuristic settings file from a
//! human-edited report, per spec.md §4.5/§6.
//!
//! Usage:
//!   tune-heuristics report --labelled decoded.tsv --dictionary dictionary/ --output report.txt
//!   tune-heuristics apply --report report.txt --output settings.tsv

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use correctocr_core::dictionary::Dictionary;
use correctocr_core::heuristics::{report_text, save_settings_tsv, settings_from_report, LabelledRow, Report};
use correctocr_core::token::KBestItem;
use correctocr_core::{CorrectOcrError, Result};

#[derive(Parser, Debug)]
#[command(name = "tune-heuristics")]
#[command(about = "Tabulate per-bin correction accuracy and derive heuristic settings")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accumulate a tuning report over a labelled token file (spec.md §6
    /// token record, with `Gold` populated from ground truth).
    Report {
        #[arg(long)]
        labelled: PathBuf,
        #[arg(long)]
        dictionary: PathBuf,
        #[arg(long)]
        case_insensitive: bool,
        #[arg(long)]
        output: PathBuf,
    },
    /// Parse a human-edited report's `BIN <n> ... <action>` lines back into
    /// a heuristic settings file.
    Apply {
        #[arg(long)]
        report: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
}

fn parse_labelled_tsv(content: &str) -> Result<Vec<(String, String, Vec<KBestItem>)>> {
    let mut lines = content.lines();
    let header_line = lines
        .next()
        .ok_or_else(|| CorrectOcrError::Config("empty labelled token file".to_string()))?;
    let header: Vec<&str> = header_line.split('\t').collect();
    let original_idx = header
        .iter()
        .position(|h| *h == "Original")
        .ok_or_else(|| CorrectOcrError::Config("missing Original column".to_string()))?;
    let gold_idx = header
        .iter()
        .position(|h| *h == "Gold")
        .ok_or_else(|| CorrectOcrError::Config("missing Gold column".to_string()))?;

    let mut kbest_cols = Vec::new();
    let mut rank = 1usize;
    loop {
        let candidate_col = header.iter().position(|h| *h == format!("{rank}-best"));
        let prob_col = header.iter().position(|h| *h == format!("{rank}-best prob."));
        match (candidate_col, prob_col) {
            (Some(c), Some(p)) => kbest_cols.push((c, p)),
            _ => break,
        }
        rank += 1;
    }

    let mut rows = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split('\t').collect();
        let original = cols.get(original_idx).copied().unwrap_or("").to_string();
        let gold = cols.get(gold_idx).copied().unwrap_or("").to_string();
        let kbest: Vec<KBestItem> = kbest_cols
            .iter()
            .map(|&(ci, pi)| {
                let candidate = cols.get(ci).copied().unwrap_or("").to_string();
                let probability = cols.get(pi).and_then(|s| s.parse().ok()).unwrap_or(0.0);
                KBestItem::new(candidate, probability)
            })
            .collect();
        rows.push((original, gold, kbest));
    }
    Ok(rows)
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Report {
            labelled,
            dictionary,
            case_insensitive,
            output,
        } => {
            let dictionary = Dictionary::load(&dictionary, case_insensitive)?;
            let rows = parse_labelled_tsv(&std::fs::read_to_string(&labelled)?)?;
            let mut report = Report::new();
            for (original, gold, kbest) in &rows {
                report.add(
                    &LabelledRow {
                        original,
                        gold,
                        kbest,
                    },
                    &dictionary,
                );
            }
            std::fs::write(&output, report_text(&report))?;
            tracing::info!(path = %output.display(), rows = rows.len(), "wrote tuning report");
        }
        Command::Apply { report, output } => {
            let text = std::fs::read_to_string(&report)?;
            let settings = settings_from_report(&text)?;
            save_settings_tsv(&output, &settings)?;
            tracing::info!(path = %output.display(), bins = settings.len(), "wrote heuristic settings");
        }
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
