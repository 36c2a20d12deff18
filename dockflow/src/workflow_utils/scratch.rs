//! Run-scoped scratch space
//!
//! Each run owns `<out-dir>/.dockflow-scratch-<uuid>`; each work item gets its own
//! uniquely named sub-directory that is removed when its guard is dropped, so items
//! never share temporary files and a timed-out item still cleans up.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use dockflow_sdk::log_warning;

pub const SCRATCH_PREFIX: &str = ".dockflow-scratch-";

/// Handle to the run's scratch root
#[derive(Debug, Clone)]
pub struct Scratch {
    root: PathBuf,
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

impl Scratch {
    pub fn create(base: &Path) -> Result<Self> {
        let root = base.join(format!("{}{}", SCRATCH_PREFIX, Uuid::new_v4().simple()));
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create scratch root {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fresh directory for one item; removed when the guard drops
    pub fn item_dir(&self, label: &str) -> Result<ScratchDir> {
        let path = self
            .root
            .join(format!("{}-{}", sanitize(label), Uuid::new_v4().simple()));
        std::fs::create_dir_all(&path)
            .with_context(|| format!("failed to create scratch dir {}", path.display()))?;
        Ok(ScratchDir { path })
    }

    /// Remove the whole scratch root; failures are warnings
    pub fn remove(&self) {
        remove_logged(&self.root);
    }
}

fn remove_logged(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            log_warning!("could not remove scratch directory {}: {}", path.display(), e);
        }
    }
}

/// Guard for one item's scratch directory
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        remove_logged(&self.path);
    }
}
