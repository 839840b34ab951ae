pub mod batch;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod entries;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod retry;
pub mod validator;

pub use batch::{Batch, BatchPlanner};
pub use checkpoint::CheckpointWriter;
pub use client::TranslationClient;
pub use config::{ApiType, Config};
pub use entries::{Entry, EntrySet};
pub use error::{Result, TranslatorError};
pub use pipeline::{Pipeline, PipelineState, RunOutcome, RunReport, ShutdownSignal};
pub use prompt::PromptTemplate;
