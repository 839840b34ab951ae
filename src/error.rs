use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while loading, translating and saving game text.
///
/// `MalformedInput` and `Config` are fatal and surface before any batch is
/// sent. `Api` and `Parse` only fail the current batch. `Checkpoint` fails a
/// single save attempt.
#[derive(Error, Debug)]
pub enum TranslatorError {
    #[error("Malformed input file {path}: {reason}")]
    MalformedInput { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Translation API error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Api {
        status: Option<u16>,
        message: String,
    },

    #[error("Could not parse model reply: {0}")]
    Parse(String),

    #[error("Failed to write checkpoint {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranslatorError {
    pub(crate) fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether a fresh attempt at the same request could succeed.
    ///
    /// Transport failures, timeouts, 429 and 5xx responses are transient.
    /// Other 4xx responses (bad key, bad model name) are not, and neither is a
    /// reply that could not be parsed: that batch is re-offered on a later pass
    /// instead.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            Self::Api { status: None, .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TranslatorError>;
