use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::ids::CheckpointId;

const PROGRESS_FILE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read progress file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write progress file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("progress file {path} is malformed at {json_path}: {source}")]
    Decode {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode progress: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("progress file {path} has version {found}, expected {expected}")]
    Version {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}

/// Best-effort store for the last active checkpoint. Callers log failures and carry on.
pub trait CheckpointStore {
    fn last_checkpoint(&self) -> Result<Option<CheckpointId>, PersistenceError>;
    fn persist_checkpoint(&mut self, id: CheckpointId) -> Result<(), PersistenceError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryCheckpointStore {
    last: Option<CheckpointId>,
    writes: u32,
}

impl MemoryCheckpointStore {
    pub fn with_last(id: CheckpointId) -> Self {
        Self {
            last: Some(id),
            writes: 0,
        }
    }

    pub fn writes(&self) -> u32 {
        self.writes
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn last_checkpoint(&self) -> Result<Option<CheckpointId>, PersistenceError> {
        Ok(self.last)
    }

    fn persist_checkpoint(&mut self, id: CheckpointId) -> Result<(), PersistenceError> {
        self.last = Some(id);
        self.writes = self.writes.saturating_add(1);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProgressFile {
    version: u32,
    last_checkpoint: Option<CheckpointId>,
}

#[derive(Debug, Clone)]
pub struct JsonFileCheckpointStore {
    path: PathBuf,
}

impl JsonFileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for JsonFileCheckpointStore {
    fn last_checkpoint(&self) -> Result<Option<CheckpointId>, PersistenceError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "progress_file_missing");
                return Ok(None);
            }
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let mut deserializer = serde_json::Deserializer::from_str(&raw);
        let progress: ProgressFile = serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|error| {
                let json_path = error.path().to_string();
                PersistenceError::Decode {
                    path: self.path.clone(),
                    json_path,
                    source: error.into_inner(),
                }
            })?;
        if progress.version != PROGRESS_FILE_VERSION {
            return Err(PersistenceError::Version {
                path: self.path.clone(),
                found: progress.version,
                expected: PROGRESS_FILE_VERSION,
            });
        }
        Ok(progress.last_checkpoint)
    }

    fn persist_checkpoint(&mut self, id: CheckpointId) -> Result<(), PersistenceError> {
        let progress = ProgressFile {
            version: PROGRESS_FILE_VERSION,
            last_checkpoint: Some(id),
        };
        let text = serde_json::to_string_pretty(&progress)?;
        write_text_atomic(&self.path, &text).map_err(|source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, text.as_bytes())?;
    replace_file(&tmp_path, path)
}

fn replace_file(tmp_path: &Path, final_path: &Path) -> io::Result<()> {
    match fs::remove_file(final_path) {
        Ok(_) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => {
            let _ = fs::remove_file(tmp_path);
            return Err(error);
        }
    }
    if let Err(error) = fs::rename(tmp_path, final_path) {
        let _ = fs::remove_file(tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("progress.json");
    let tmp_name = format!("{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}
