//! Stage artifact writing: atomic tables, serialized logs, completion markers

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::workflow_utils::batch::OutcomeCounts;

/// Write `contents` to a sibling temp file, then rename it over `path`
///
/// Readers never observe a partially written table.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.tmp-{}", name, Uuid::new_v4().simple()));

    let result = (|| -> Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result.with_context(|| format!("failed to write {}", path.display()))
}

/// Move a finished artifact from scratch into its stage directory
pub async fn publish(src: &Path, dest: &Path) -> Result<()> {
    if let Some(dir) = dest.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    if tokio::fs::rename(src, dest).await.is_err() {
        // Scratch may live on another filesystem
        tokio::fs::copy(src, dest)
            .await
            .with_context(|| format!("failed to copy {} to {}", src.display(), dest.display()))?;
        let _ = tokio::fs::remove_file(src).await;
    }
    Ok(())
}

/// Append-only line log shared by concurrent producers
///
/// Every row is written and flushed under one lock, so lines never interleave.
#[derive(Debug)]
pub struct CsvLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl CsvLog {
    /// Truncate `path` and start it with `header`
    pub fn create(path: &Path, header: &str) -> Result<Self> {
        let mut file = File::create(path)
            .with_context(|| format!("failed to create log {}", path.display()))?;
        writeln!(file, "{}", header)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Open `path` for appending without a header
    pub fn append_to(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_row(&self, row: &str) -> Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("log writer for {} poisoned", self.path.display()))?;
        writeln!(file, "{}", row)?;
        file.flush()?;
        Ok(())
    }
}

/// Persisted proof that a stage finished and how much it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMarker {
    pub stage: String,
    pub record_count: usize,
    pub counts: OutcomeCounts,
    /// The stage's consolidated artifact, when it has one
    pub result: Option<PathBuf>,
    pub completed_at: DateTime<Utc>,
}

impl StageMarker {
    pub const FILE_NAME: &'static str = "STAGE_COMPLETE.json";

    pub fn new(stage: impl Into<String>, record_count: usize, counts: OutcomeCounts) -> Self {
        Self {
            stage: stage.into(),
            record_count,
            counts,
            result: None,
            completed_at: Utc::now(),
        }
    }

    pub fn with_result(mut self, path: impl Into<PathBuf>) -> Self {
        self.result = Some(path.into());
        self
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(Self::FILE_NAME)
    }

    /// Written last, after every other artifact of the stage
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = Self::path_in(dir);
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(&path, &json)?;
        Ok(path)
    }

    /// `Ok(None)` when no marker exists
    pub fn read(dir: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(dir);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let marker = serde_json::from_str(&text)
            .with_context(|| format!("malformed completion marker {}", path.display()))?;
        Ok(Some(marker))
    }
}
