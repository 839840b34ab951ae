//! The in-memory set of game text entries.
//!
//! Entries keep the order in which their source strings first appear in the
//! extracted file, so batches are deterministic and the output file diffs
//! cleanly against the input.

use crate::error::{Result, TranslatorError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// One source string and its translation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub source: String,
    /// `None` until a translation has been merged (or restored on resume).
    pub translation: Option<String>,
    /// Batches that offered this entry without producing a translation.
    pub attempts: u32,
}

impl Entry {
    fn new(source: String) -> Self {
        // Blank strings have nothing to translate and go out as-is.
        let translation = if source.trim().is_empty() {
            Some(source.clone())
        } else {
            None
        };
        Self {
            source,
            translation,
            attempts: 0,
        }
    }

    pub fn is_translated(&self) -> bool {
        self.translation.is_some()
    }
}

/// Ordered mapping of source strings to translations.
#[derive(Debug, Clone)]
pub struct EntrySet {
    entries: Vec<Entry>,
    positions: HashMap<String, usize>,
    max_attempts: u32,
}

impl EntrySet {
    /// Build a set from source strings; duplicates collapse to their first occurrence.
    pub fn from_sources<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self {
            entries: Vec::new(),
            positions: HashMap::new(),
            max_attempts: u32::MAX,
        };
        for source in sources {
            let source = source.into();
            if set.positions.contains_key(&source) {
                continue;
            }
            set.positions.insert(source.clone(), set.entries.len());
            set.entries.push(Entry::new(source));
        }
        set
    }

    /// Load the source key set and overlay any translations from a resume file.
    ///
    /// A missing resume file is not an error: the run simply starts fresh.
    pub fn load(source_path: &Path, resume_path: Option<&Path>) -> Result<Self> {
        let source = read_flat_map(source_path)?;
        let mut set = Self::from_sources(source.into_iter().map(|(key, _)| key));
        info!(
            "Loaded {} entries from {}",
            set.len(),
            source_path.display()
        );

        if let Some(resume_path) = resume_path {
            if resume_path.exists() {
                let resumed = read_flat_map(resume_path)?;
                let restored = set.restore(resumed);
                info!(
                    "Restored {} translations from {}",
                    restored,
                    resume_path.display()
                );
            } else {
                debug!("No resume file at {}", resume_path.display());
            }
        }

        Ok(set)
    }

    /// Cap the number of batches a single entry may be offered in.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Overlay translations from a previous run's output.
    ///
    /// Snapshots write the source text for untranslated entries, so a value
    /// equal to its key is not a completed translation.
    fn restore(&mut self, resumed: Vec<(String, String)>) -> usize {
        let mut restored = 0;
        for (key, value) in resumed {
            let Some(&pos) = self.positions.get(&key) else {
                warn!("Ignoring resumed entry not present in source: {:?}", key);
                continue;
            };
            let entry = &mut self.entries[pos];
            if value.is_empty() || value == key || entry.is_translated() {
                continue;
            }
            entry.translation = Some(value);
            restored += 1;
        }
        restored
    }

    /// Keys still waiting for a translation, in first-seen order.
    ///
    /// Recomputed on every call; entries that used up their attempts are left out.
    pub fn pending_keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| self.is_open(e))
            .map(|e| e.source.as_str())
            .collect()
    }

    /// Untranslated and still under the attempt cap; unknown keys are not pending.
    pub fn is_pending(&self, key: &str) -> bool {
        self.get(key).is_some_and(|e| self.is_open(e))
    }

    fn is_open(&self, entry: &Entry) -> bool {
        !entry.is_translated() && entry.attempts < self.max_attempts
    }

    /// Merge translations into the set, returning how many entries were newly filled.
    ///
    /// Existing translations are never overwritten. Unknown keys and empty
    /// values are ignored.
    pub fn merge<I>(&mut self, translated: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut filled = 0;
        for (key, value) in translated {
            let Some(&pos) = self.positions.get(&key) else {
                warn!("Ignoring translation for unknown entry: {:?}", key);
                continue;
            };
            if value.is_empty() {
                continue;
            }
            let entry = &mut self.entries[pos];
            if entry.is_translated() {
                debug!("Entry already translated, keeping existing value: {:?}", key);
                continue;
            }
            entry.translation = Some(value);
            filled += 1;
        }
        filled
    }

    /// Count one more failed offer against every listed key that is still untranslated.
    pub fn record_attempt<S: AsRef<str>>(&mut self, keys: &[S]) {
        for key in keys {
            let Some(&pos) = self.positions.get(key.as_ref()) else {
                continue;
            };
            let max_attempts = self.max_attempts;
            let entry = &mut self.entries[pos];
            if entry.is_translated() {
                continue;
            }
            entry.attempts = entry.attempts.saturating_add(1);
            if entry.attempts == max_attempts {
                warn!(
                    "Giving up on entry after {} attempts, keeping source text: {:?}",
                    max_attempts, entry.source
                );
            }
        }
    }

    /// Full current state, with the source text standing in for missing translations.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|e| {
                let value = e.translation.as_deref().unwrap_or(&e.source);
                (e.source.clone(), Value::String(value.to_string()))
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.positions.get(key).map(|&pos| &self.entries[pos])
    }

    pub fn translation(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|e| e.translation.as_deref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn translated_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_translated()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| self.is_open(e)).count()
    }

    /// Untranslated entries that will not be offered again.
    pub fn exhausted_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !e.is_translated() && e.attempts >= self.max_attempts)
            .count()
    }
}

/// Read a JSON file that must be a flat object of string values.
fn read_flat_map(path: &Path) -> Result<Vec<(String, String)>> {
    let content = std::fs::read_to_string(path)?;
    let malformed = |reason: String| TranslatorError::MalformedInput {
        path: path.to_path_buf(),
        reason,
    };

    let value: Value = serde_json::from_str(&content).map_err(|e| malformed(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(malformed("expected a JSON object at the top level".to_string()));
    };

    map.into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key, s)),
            other => Err(malformed(format!(
                "value for {:?} is not a string: {}",
                key, other
            ))),
        })
        .collect()
}
