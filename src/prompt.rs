use crate::batch::Batch;
use crate::error::{Result, TranslatorError};
use std::path::Path;
use tracing::{info, warn};

const ENTRIES_PLACEHOLDER: &str = "{entries}";

/// Built-in prompt. Game text keeps its escape codes, so the rules focus on
/// leaving formatting alone and answering line-for-line with the same tags.
const DEFAULT_TEMPLATE: &str = r#"You are translating text extracted from a video game from {source_language} to {target_language}.

Rules:
1. Translate every entry that contains {source_language} text into {target_language}.
2. Leave entries that are pure English, numbers, symbols or identifiers unchanged.
3. Keep all formatting exactly: escape codes such as \C[2] or \V[1], placeholders such as %1 or %s, spaces and punctuation.
4. Line breaks inside an entry are written as \n. Keep every \n in the corresponding place of the translation.
5. Answer with one line per entry, in the form [index] translation, using the same index as the input.
6. Do not add explanations, notes or any other text.
7. If you are unsure how to handle an entry, return it unchanged.

There are {count} entries:
{entries}"#;

/// A prompt template with `{source_language}`, `{target_language}`,
/// `{count}` and `{entries}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Load a template file, or the built-in template when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path).map_err(|e| {
            TranslatorError::Config(format!(
                "Failed to read prompt template {}: {}",
                path.display(),
                e
            ))
        })?;
        if text.trim().is_empty() {
            return Err(TranslatorError::Config(format!(
                "Prompt template {} is empty",
                path.display()
            )));
        }
        if !text.contains(ENTRIES_PLACEHOLDER) {
            warn!(
                "Prompt template {} has no {} placeholder, entries will be appended",
                path.display(),
                ENTRIES_PLACEHOLDER
            );
        }

        info!("Using prompt template from {}", path.display());
        Ok(Self::new(text))
    }

    /// Render the request prompt for one batch.
    pub fn render(&self, source_language: &str, target_language: &str, batch: &Batch) -> String {
        let entries = format_entries(batch);
        let text = self
            .text
            .replace("{source_language}", source_language)
            .replace("{target_language}", target_language)
            .replace("{count}", &batch.len().to_string());

        if text.contains(ENTRIES_PLACEHOLDER) {
            text.replace(ENTRIES_PLACEHOLDER, &entries)
        } else {
            format!("{}\n\n{}", text.trim_end(), entries)
        }
    }
}

/// One `[index] text` line per entry, numbered from 1.
pub fn format_entries(batch: &Batch) -> String {
    batch
        .entries()
        .map(|(index, source)| format!("[{}] {}", index, escape_line(source)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Make a multi-line entry fit on one protocol line.
pub fn escape_line(text: &str) -> String {
    text.replace('\n', "\\n").replace('\t', "\\t")
}

/// Undo `escape_line` on a translated line.
///
/// Sources that already contain a literal `\n` or `\t` sequence keep it as-is.
pub fn unescape_line(text: &str, source: &str) -> String {
    let mut out = text.to_string();
    if !source.contains("\\n") {
        out = out.replace("\\n", "\n");
    }
    if !source.contains("\\t") {
        out = out.replace("\\t", "\t");
    }
    out
}
