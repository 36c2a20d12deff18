//! Stage-level fatal conditions
//!
//! Item failures are never errors; they are [`Outcome`](crate::workflow_utils::Outcome)
//! values. A `PipelineError` halts the orchestrator and yields a non-zero exit.

use std::path::PathBuf;
use thiserror::Error;

use crate::docking::types::Stage;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage}: no usable input in {}: {detail}", .path.display())]
    EmptyInput {
        stage: Stage,
        path: PathBuf,
        detail: String,
    },

    #[error("{stage}: required artifact missing: {}: {detail}", .path.display())]
    MissingArtifact {
        stage: Stage,
        path: PathBuf,
        detail: String,
    },

    #[error("{stage}: required tool `{tool}` not available: {detail}")]
    MissingTool {
        stage: Stage,
        tool: String,
        detail: String,
    },

    #[error("{stage}: invalid input: {detail}")]
    InvalidInput { stage: Stage, detail: String },

    #[error("{stage}: I/O error on {}: {source}", .path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::EmptyInput { stage, .. }
            | PipelineError::MissingArtifact { stage, .. }
            | PipelineError::MissingTool { stage, .. }
            | PipelineError::InvalidInput { stage, .. }
            | PipelineError::Io { stage, .. } => *stage,
        }
    }

    pub fn io(stage: Stage, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            stage,
            path: path.into(),
            source,
        }
    }

    pub fn empty(stage: Stage, path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        PipelineError::EmptyInput {
            stage,
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub fn missing(stage: Stage, path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        PipelineError::MissingArtifact {
            stage,
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Wrap plumbing errors (marker writes, table writes) as I/O failures
    pub fn from_anyhow(stage: Stage, path: impl Into<PathBuf>, err: anyhow::Error) -> Self {
        let source = match err.downcast::<std::io::Error>() {
            Ok(io) => io,
            Err(other) => std::io::Error::new(std::io::ErrorKind::Other, format!("{:#}", other)),
        };
        PipelineError::Io {
            stage,
            path: path.into(),
            source,
        }
    }
}

pub type StageResult<T> = std::result::Result<T, PipelineError>;
