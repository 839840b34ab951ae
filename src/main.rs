//! Translate a game text file exported by an extraction tool.
//!
//! Usage:
//!   game-text-translator <source.json> [output.json] [--resume <file>] [--fresh]
//!
//! The output file doubles as the checkpoint: rerunning the same command
//! resumes from it unless `--fresh` is given.
//!
//! Required environment variables:
//! - TRANSLATOR_API_URL
//! - TRANSLATOR_API_KEY
//!
//! Optional:
//! - TRANSLATOR_MODEL (defaults to gpt-4o-mini)
//! - TRANSLATOR_API_TYPE (openai or google, defaults to openai)
//! - SOURCE_LANGUAGE / TARGET_LANGUAGE (default Japanese / Simplified Chinese)
//! - BATCH_SIZE (defaults to 50), SAVE_INTERVAL (defaults to 100)
//! - ENABLE_THINKING, PROMPT_TEMPLATE_FILE, REQUEST_TIMEOUT_SECS, MAX_TOKENS,
//!   TEMPERATURE, RETRY_MAX_ATTEMPTS, RETRY_DELAY_SECS, REQUEST_INTERVAL_MS,
//!   MAX_ATTEMPTS_PER_KEY

use anyhow::{bail, Context, Result};
use game_text_translator::{Config, EntrySet, Pipeline, RunOutcome, ShutdownSignal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

const USAGE: &str =
    "Usage: game-text-translator <source.json> [output.json] [--resume <file>] [--fresh]";

#[derive(Debug, PartialEq, Eq)]
struct Args {
    source: PathBuf,
    output: PathBuf,
    resume: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut positional = Vec::new();
    let mut resume = None;
    let mut fresh = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--fresh" => fresh = true,
            "--resume" => {
                let path = iter.next().context("--resume needs a file path")?;
                resume = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => bail!("Unknown option {}\n{}", flag, USAGE),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let (source, output) = match positional.as_slice() {
        [source] => (source.clone(), default_output_path(source)),
        [source, output] => (source.clone(), output.clone()),
        _ => bail!(USAGE),
    };

    if fresh && resume.is_some() {
        bail!("--fresh and --resume cannot be combined");
    }
    // The output file is also the checkpoint, so it is the natural resume point
    let resume = if fresh {
        None
    } else {
        resume.or_else(|| Some(output.clone()))
    };

    Ok(Args {
        source,
        output,
        resume,
    })
}

/// `dir/name.json` -> `dir/name.translated.json`
fn default_output_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    source.with_file_name(format!("{}.translated.json", stem))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file (ignored when absent)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("game_text_translator=info".parse()?),
        )
        .init();

    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&raw_args)?;

    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        "Translating {} -> {} with {} ({} to {})",
        args.source.display(),
        args.output.display(),
        config.model,
        config.source_language,
        config.target_language
    );

    let entries = EntrySet::load(&args.source, args.resume.as_deref())
        .with_context(|| format!("Failed to load {}", args.source.display()))?;
    if entries.is_empty() {
        warn!("{} contains no entries", args.source.display());
    }

    let mut pipeline = Pipeline::new(config, entries, &args.output)?;

    let shutdown = ShutdownSignal::new();
    shutdown.listen_for_ctrl_c();

    let report = pipeline.run(&shutdown).await?;
    info!(
        "Finished in {}s: {} batches ({} failed), {} checkpoints ({} failed)",
        report.elapsed().num_seconds(),
        report.batches_attempted,
        report.batches_failed,
        report.checkpoints_written,
        report.checkpoint_failures
    );
    info!("Output written to {}", args.output.display());

    match report.outcome {
        RunOutcome::Interrupted => {
            warn!("Run interrupted; rerun the same command to continue");
            Ok(ExitCode::from(130))
        }
        RunOutcome::Done => {
            if !report.is_complete() {
                warn!(
                    "{} entries kept their source text ({} gave up after repeated failures)",
                    report.entries_untranslated, report.entries_exhausted
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
