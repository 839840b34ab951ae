use crate::entries::EntrySet;
use crate::error::{Result, TranslatorError};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Persists `EntrySet` snapshots as the flat JSON object the extraction tool
/// re-imports.
///
/// Each save goes to a temporary file next to the destination and is renamed
/// over it, so an interrupted write leaves the previous checkpoint intact.
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    path: PathBuf,
}

impl CheckpointWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn save(&self, entries: &EntrySet) -> Result<()> {
        save(entries, &self.path)
    }
}

/// Atomically write `entries.snapshot()` to `path`, replacing any previous file.
pub fn save(entries: &EntrySet, path: &Path) -> Result<()> {
    write_atomic(entries, path).map_err(|source| TranslatorError::Checkpoint {
        path: path.to_path_buf(),
        source,
    })?;

    info!(
        "Checkpoint saved to {} ({}/{} translated)",
        path.display(),
        entries.translated_count(),
        entries.len()
    );
    Ok(())
}

fn write_atomic(entries: &EntrySet, path: &Path) -> std::io::Result<()> {
    let parent_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent_dir)?;

    let temp_file = NamedTempFile::new_in(parent_dir)?;
    {
        let mut writer = BufWriter::new(temp_file.as_file());
        serde_json::to_writer_pretty(&mut writer, &entries.snapshot())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    temp_file.as_file().sync_all()?;

    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
