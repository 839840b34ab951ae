use crate::entries::EntrySet;
use crate::error::{Result, TranslatorError};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

/// An ordered group of pending entries sent together in one request.
///
/// Each entry is tagged with its 1-based position. The model answers with the
/// same tags, and `resolve` maps them back to source strings through this
/// table only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    number: usize,
    pass: usize,
    items: Vec<(usize, String)>,
}

impl Batch {
    pub fn new<S: Into<String>>(number: usize, pass: usize, keys: Vec<S>) -> Self {
        let items = keys
            .into_iter()
            .enumerate()
            .map(|(i, key)| (i + 1, key.into()))
            .collect();
        Self {
            number,
            pass,
            items,
        }
    }

    /// Sequence number of this batch within the run (1-based).
    pub fn number(&self) -> usize {
        self.number
    }

    /// Pass over the pending entries this batch belongs to (1-based).
    pub fn pass(&self) -> usize {
        self.pass
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `(index, source text)` pairs in request order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &str)> {
        self.items.iter().map(|(i, key)| (*i, key.as_str()))
    }

    pub fn keys(&self) -> Vec<&str> {
        self.items.iter().map(|(_, key)| key.as_str()).collect()
    }

    pub fn source_for(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|pos| self.items.get(pos))
            .map(|(_, key)| key.as_str())
    }

    /// Map indexed translations back to source keys. Indices outside the batch are dropped.
    pub fn resolve(&self, translated: HashMap<usize, String>) -> Vec<(String, String)> {
        let mut resolved: Vec<(usize, String, String)> = translated
            .into_iter()
            .filter_map(|(index, text)| match self.source_for(index) {
                Some(key) => Some((index, key.to_string(), text)),
                None => {
                    debug!("Batch {}: discarding reply index {}", self.number, index);
                    None
                }
            })
            .collect();
        resolved.sort_by_key(|(index, _, _)| *index);
        resolved
            .into_iter()
            .map(|(_, key, text)| (key, text))
            .collect()
    }
}

/// Partitions pending entries into fixed-size, ordered batches.
///
/// Within a pass every pending entry is offered at most once; when all of them
/// have been offered, a new pass starts over the entries that are still
/// pending. Entries of a failed batch handed to `split` come back first, one
/// per batch, so a single bad line cannot sink its neighbours. Termination
/// relies on the per-entry attempt cap of `EntrySet`.
#[derive(Debug)]
pub struct BatchPlanner {
    batch_size: usize,
    pass: usize,
    offered: HashSet<String>,
    singles: VecDeque<String>,
    planned: usize,
}

impl BatchPlanner {
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(TranslatorError::Config(
                "batch_size must be a positive integer".to_string(),
            ));
        }
        Ok(Self {
            batch_size,
            pass: 1,
            offered: HashSet::new(),
            singles: VecDeque::new(),
            planned: 0,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Queue the entries of a failed multi-entry batch to be retried one at a time.
    ///
    /// Returns false for single-entry batches, which have nothing to split.
    pub fn split(&mut self, batch: &Batch) -> bool {
        if batch.len() < 2 {
            return false;
        }
        info!(
            "Batch {} failed, retrying its {} entries one at a time",
            batch.number(),
            batch.len()
        );
        self.singles.extend(batch.keys().into_iter().map(str::to_string));
        true
    }

    /// Next batch of pending keys, or `None` once nothing is pending.
    pub fn next_batch(&mut self, entries: &EntrySet) -> Option<Batch> {
        while let Some(key) = self.singles.pop_front() {
            if entries.is_pending(&key) {
                self.planned += 1;
                return Some(Batch::new(self.planned, self.pass, vec![key]));
            }
        }

        let pending = entries.pending_keys();
        if pending.is_empty() {
            return None;
        }

        let mut keys: Vec<&str> = pending
            .iter()
            .copied()
            .filter(|key| !self.offered.contains(*key))
            .take(self.batch_size)
            .collect();

        if keys.is_empty() {
            self.pass += 1;
            self.offered.clear();
            info!(
                "Starting pass {} over {} remaining entries",
                self.pass,
                pending.len()
            );
            keys = pending.into_iter().take(self.batch_size).collect();
        }

        self.offered.extend(keys.iter().map(|key| key.to_string()));
        self.planned += 1;
        Some(Batch::new(self.planned, self.pass, keys))
    }
}
