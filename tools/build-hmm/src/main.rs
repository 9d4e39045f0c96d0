//! Train the HMM's `init`/`tran`/`emis` tables from a confusion table (as
//! produced by `align-corpus`) and a gold word list, per spec.md §4.3.
//!
//! Usage:
//!   build-hmm --confusion confusion.json --gold-words gold-words.txt \
//!     --dictionary dictionary/ --config correctocr.toml --output hmm_parameters.json

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use correctocr_core::aligner::MisreadCounts;
use correctocr_core::config::Config;
use correctocr_core::dictionary::Dictionary;
use correctocr_core::hmm::cache::KBestCache;
use correctocr_core::hmm::HmmBuilder;
use correctocr_core::Result;

#[derive(Parser, Debug)]
#[command(name = "build-hmm")]
#[command(about = "Train HMM parameter tables from a confusion table and gold word list")]
struct Args {
    /// Confusion table JSON, as written by `align-corpus`.
    #[arg(long)]
    confusion: PathBuf,

    /// One gold word per line.
    #[arg(long)]
    gold_words: PathBuf,

    /// Dictionary directory (one file per group).
    #[arg(long)]
    dictionary: PathBuf,

    /// Config file carrying `[hmm]` (smoothing alpha, character set,
    /// removal list, cache capacity) and `[resources]`.
    #[arg(long)]
    config: PathBuf,

    /// Where to write the trained HMM parameter file (JSON, spec.md §6).
    #[arg(long)]
    output: PathBuf,
}

fn load_confusion(path: &PathBuf) -> Result<MisreadCounts> {
    let content = std::fs::read_to_string(path)?;
    let wire: HashMap<String, HashMap<String, u32>> = serde_json::from_str(&content)?;
    let mut counts: MisreadCounts = HashMap::new();
    for (actual, row) in wire {
        let Some(actual) = actual.chars().next() else { continue };
        let mut out_row = HashMap::new();
        for (read_as, count) in row {
            if let Some(read_as) = read_as.chars().next() {
                out_row.insert(read_as, count);
            }
        }
        counts.insert(actual, out_row);
    }
    Ok(counts)
}

fn run(args: Args) -> Result<()> {
    let config = Config::load_toml(&args.config, "CORRECTOCR")?;
    let confusion = load_confusion(&args.confusion)?;
    let gold_words: Vec<String> = std::fs::read_to_string(&args.gold_words)?
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    let dictionary = Dictionary::load(&args.dictionary, config.heuristics.case_insensitive)?;

    tracing::info!(
        confusion_rows = confusion.len(),
        gold_words = gold_words.len(),
        "training HMM"
    );
    let builder = HmmBuilder::new(
        &dictionary,
        config.hmm.smoothing_alpha,
        &config.hmm.character_set,
        &config.hmm.removal_chars,
    );
    let params = builder.build(&confusion, &gold_words)?;
    params.save(&args.output)?;
    tracing::info!(path = %args.output.display(), states = params.state_count(), "saved HMM parameters");

    // A retrained HMM invalidates its k-best cache (spec.md §3, §6 scenario S6).
    let cache = KBestCache::load(&config.resources.kbest_cache_file, config.hmm.cache_capacity);
    cache.invalidate()?;

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
