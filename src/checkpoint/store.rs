//! File-based checkpoint store with atomic writes

use super::types::StageRecord;
use crate::error::{Error, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Stage names and namespaces end up in file names
static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap());

/// Default namespace of checkpoint files
pub const DEFAULT_NAMESPACE: &str = "harvest";

/// Checkpoint files of one job
///
/// The store does no locking; a job process owns its namespace.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    namespace: String,
}

impl CheckpointStore {
    /// Create a store writing to `dir` under the given namespace
    pub fn new(dir: impl AsRef<Path>, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        validate_name("namespace", &namespace)?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            namespace,
        })
    }

    /// Directory holding the checkpoint files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Namespace of the checkpoint files
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Path of a stage's checkpoint file
    pub fn path_for(&self, stage: &str) -> Result<PathBuf> {
        validate_name("stage", stage)?;
        Ok(self.dir.join(format!("{}{stage}.json", self.prefix())))
    }

    fn prefix(&self) -> String {
        format!(".{}_checkpoint_", self.namespace)
    }

    /// Save a stage's payload, replacing any previous checkpoint
    pub async fn save<T: Serialize + ?Sized>(&self, stage: &str, payload: &T) -> Result<()> {
        let path = self.path_for(stage)?;
        let contents = serde_json::to_string(payload)
            .map_err(|e| Error::checkpoint(stage, format!("Failed to serialize: {e}")))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::checkpoint(stage, format!("Failed to create directory: {e}")))?;

        // Write to temp file first, then rename for atomicity
        let temp_path = temp_path(&path);
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::checkpoint(stage, format!("Failed to write checkpoint: {e}")))?;

        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Error::checkpoint(stage, format!("Failed to rename checkpoint: {e}")))?;

        debug!("Saved checkpoint '{stage}' ({} bytes)", contents.len());
        Ok(())
    }

    /// Load a stage's payload, or `default` when there is no usable checkpoint
    pub async fn load<T: DeserializeOwned>(&self, stage: &str, default: T) -> Result<T> {
        Ok(self.read(stage).await?.unwrap_or(default))
    }

    /// Read a checkpoint, treating unreadable files as missing
    async fn read<T: DeserializeOwned>(&self, stage: &str) -> Result<Option<T>> {
        let path = self.path_for(stage)?;

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!("Ignoring unreadable checkpoint {}: {e}", path.display());
                return Ok(None);
            }
        };

        match serde_json::from_str(&contents) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) => {
                warn!("Ignoring corrupt checkpoint {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    /// Check if a stage has a checkpoint file
    pub async fn exists(&self, stage: &str) -> Result<bool> {
        let path = self.path_for(stage)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }

    /// Delete a stage's checkpoint, returning whether one existed
    pub async fn remove(&self, stage: &str) -> Result<bool> {
        let path = self.path_for(stage)?;
        let _ = tokio::fs::remove_file(temp_path(&path)).await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::checkpoint(stage, format!("Failed to remove checkpoint: {e}"))),
        }
    }

    /// Delete every checkpoint of the namespace, stray temp files included
    ///
    /// Returns the number of files removed.
    pub async fn clear_all(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::Io(e)),
        };

        let prefix = self.prefix();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let is_checkpoint =
                name.starts_with(&prefix) && (name.ends_with(".json") || name.ends_with(".json.tmp"));
            if is_checkpoint {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Cleared {removed} checkpoint files from {}", self.dir.display());
        }
        Ok(removed)
    }

    /// Run a stage once
    ///
    /// If a completed record for `stage` exists its payload is returned and
    /// `f` is not called. Otherwise the output of `f` is saved as a completed
    /// record and returned. Errors from `f` are returned without saving.
    pub async fn with_checkpoint<T, F, Fut>(&self, stage: &str, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(record) = self.read::<StageRecord<T>>(stage).await? {
            if record.completed {
                info!("Stage '{stage}' already completed, using checkpoint");
                return Ok(record.payload);
            }
        }

        let payload = f().await?;
        let record = StageRecord::completed(payload);
        self.save(stage, &record).await?;
        Ok(record.payload)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn validate_name(field: &str, name: &str) -> Result<()> {
    if NAME_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(Error::invalid_value(
            field,
            format!("'{name}' may only contain letters, digits, '_', '.' and '-'"),
        ))
    }
}
