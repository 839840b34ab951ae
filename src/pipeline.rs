//! The batch translation loop.
//!
//! One batch is in flight at a time: plan, translate, merge, checkpoint when
//! due, repeat until nothing is pending. The entries of a failed batch are
//! retried one per request; a failed single-entry request costs its entry one
//! attempt, and the entry is offered again on a later pass until the per-entry
//! cap is reached. Shutdown requests are honoured between batches, so a
//! checkpoint never contains a partially merged batch.

use crate::batch::{Batch, BatchPlanner};
use crate::checkpoint::CheckpointWriter;
use crate::client::TranslationClient;
use crate::config::Config;
use crate::entries::EntrySet;
use crate::error::{Result, TranslatorError};
use crate::prompt::PromptTemplate;
use crate::retry::{with_retry_if, RetryConfig};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Where the driver loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Translating,
    Merging,
    Checkpointing,
    Done,
    Interrupted,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No pending entries remain.
    Done,
    /// Stopped at a batch boundary on request.
    Interrupted,
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub batches_attempted: usize,
    pub batches_failed: usize,
    /// Entries filled during this run (not counting resumed ones)
    pub entries_translated: usize,
    /// Entries written with their source text as fallback
    pub entries_untranslated: usize,
    /// Untranslated entries that used up their attempts
    pub entries_exhausted: usize,
    pub checkpoints_written: usize,
    pub checkpoint_failures: usize,
}

impl RunReport {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            outcome: RunOutcome::Done,
            started_at: now,
            finished_at: now,
            batches_attempted: 0,
            batches_failed: 0,
            entries_translated: 0,
            entries_untranslated: 0,
            entries_exhausted: 0,
            checkpoints_written: 0,
            checkpoint_failures: 0,
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Every entry has a real translation.
    pub fn is_complete(&self) -> bool {
        self.entries_untranslated == 0
    }
}

/// Cooperative stop flag checked between batches.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Request shutdown on Ctrl-C. The batch in flight still completes; a
    /// second Ctrl-C exits immediately with status 130.
    pub fn listen_for_ctrl_c(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("Interrupt received, stopping after the current batch (Ctrl-C again to abort)");
            signal.request();

            if tokio::signal::ctrl_c().await.is_ok() {
                error!("Second interrupt received, aborting without a final checkpoint");
                std::process::exit(130);
            }
        });
    }
}

/// Drives batches through the translation client and into the entry set.
pub struct Pipeline {
    config: Config,
    client: TranslationClient,
    prompt: PromptTemplate,
    planner: BatchPlanner,
    retry: RetryConfig,
    checkpoint: CheckpointWriter,
    entries: EntrySet,
    state: PipelineState,
    since_checkpoint: usize,
}

impl Pipeline {
    /// Validate the configuration and assemble the pipeline.
    ///
    /// Configuration problems surface here, before any request is sent.
    pub fn new(config: Config, entries: EntrySet, output: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        let prompt = PromptTemplate::load(config.prompt_template_file.as_deref())?;
        let client = TranslationClient::new(&config)?;
        let planner = BatchPlanner::new(config.batch_size)?;
        let retry = RetryConfig::batch_request(&config);
        let entries = entries.with_max_attempts(config.max_attempts_per_key);

        Ok(Self {
            config,
            client,
            prompt,
            planner,
            retry,
            checkpoint: CheckpointWriter::new(output),
            entries,
            state: PipelineState::Running,
            since_checkpoint: 0,
        })
    }

    pub fn entries(&self) -> &EntrySet {
        &self.entries
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, state: PipelineState) {
        debug!("Pipeline state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Translate until nothing is pending or a shutdown is requested.
    ///
    /// Batch failures are logged and counted. The only error returned is a
    /// failure to write the final checkpoint.
    pub async fn run(&mut self, shutdown: &ShutdownSignal) -> Result<RunReport> {
        let mut report = RunReport::start();
        let initially_translated = self.entries.translated_count();

        info!(
            "Starting translation: {} entries, {} already translated, {} pending, batch size {}",
            self.entries.len(),
            initially_translated,
            self.entries.pending_count(),
            self.planner.batch_size()
        );

        loop {
            if shutdown.is_requested() {
                report.outcome = RunOutcome::Interrupted;
                self.transition(PipelineState::Interrupted);
                break;
            }

            let Some(batch) = self.planner.next_batch(&self.entries) else {
                report.outcome = RunOutcome::Done;
                self.transition(PipelineState::Done);
                break;
            };

            self.process_batch(&batch, shutdown, &mut report).await;

            if self.since_checkpoint >= self.config.save_interval {
                self.periodic_checkpoint(&mut report);
            }
            self.transition(PipelineState::Running);

            if !self.config.request_interval.is_zero() && self.entries.pending_count() > 0 {
                sleep(self.config.request_interval).await;
            }
        }

        report.entries_translated = self
            .entries
            .translated_count()
            .saturating_sub(initially_translated);
        report.entries_untranslated = self.entries.len() - self.entries.translated_count();
        report.entries_exhausted = self.entries.exhausted_count();

        // Always leave a usable output file behind
        self.checkpoint.save(&self.entries)?;
        report.checkpoints_written += 1;
        self.since_checkpoint = 0;
        report.finished_at = Utc::now();

        info!(
            "Translation {:?}: {} translated this run, {} left as source text, {} of {} batches failed",
            report.outcome,
            report.entries_translated,
            report.entries_untranslated,
            report.batches_failed,
            report.batches_attempted
        );
        Ok(report)
    }

    async fn process_batch(
        &mut self,
        batch: &Batch,
        shutdown: &ShutdownSignal,
        report: &mut RunReport,
    ) {
        self.transition(PipelineState::Translating);
        report.batches_attempted += 1;
        info!(
            "Translating batch {} (pass {}) with {} entries, {} pending",
            batch.number(),
            batch.pass(),
            batch.len(),
            self.entries.pending_count()
        );

        let client = &self.client;
        let prompt = &self.prompt;
        // No more retries once a shutdown has been requested
        let result = with_retry_if(
            &self.retry,
            &format!("Batch {}", batch.number()),
            || client.translate(batch, prompt),
            |e: &TranslatorError| e.is_retryable() && !shutdown.is_requested(),
        )
        .await;

        self.transition(PipelineState::Merging);
        let keys = batch.keys();
        match result {
            Ok(translated) => {
                let returned = translated.len();
                let merged = self.entries.merge(batch.resolve(translated));
                self.entries.record_attempt(&keys);
                self.since_checkpoint += merged;

                if merged < batch.len() {
                    warn!(
                        "Batch {}: {} of {} entries translated, the rest stay pending",
                        batch.number(),
                        merged,
                        batch.len()
                    );
                }
                info!(
                    "Batch {} merged {} translations ({} returned), {}/{} done",
                    batch.number(),
                    merged,
                    returned,
                    self.entries.translated_count(),
                    self.entries.len()
                );
            }
            Err(e) => {
                report.batches_failed += 1;
                error!("Batch {} failed: {}; entries: {:?}", batch.number(), e, keys);
                // Only single-entry requests count against an entry's attempts
                if !self.planner.split(batch) {
                    self.entries.record_attempt(&keys);
                }
            }
        }
    }

    /// A failed periodic save is reported and the run goes on; the next save may succeed.
    fn periodic_checkpoint(&mut self, report: &mut RunReport) {
        self.transition(PipelineState::Checkpointing);
        match self.checkpoint.save(&self.entries) {
            Ok(()) => {
                report.checkpoints_written += 1;
                self.since_checkpoint = 0;
            }
            Err(e) => {
                report.checkpoint_failures += 1;
                error!("{}", e);
            }
        }
    }
}
