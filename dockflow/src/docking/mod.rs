//! Molecular docking pipeline
//!
//! Five stages, each a bounded parallel batch over independent work items:
//! ligand preparation, protein repair and receptor preparation, binding-site
//! detection, docking and rescoring. Stages communicate only through the
//! artifacts they persist; the orchestrator in [`workflow`] checks each
//! stage's completion marker before starting the next.

pub mod aggregate;
pub mod cli;
pub mod context;
pub mod error;
pub mod identity;
pub mod matcher;
pub mod partition;
pub mod phase1_ligands;
pub mod phase2_proteins;
pub mod phase3_sites;
pub mod phase4_docking;
pub mod phase5_rescoring;
pub mod tools;
pub mod types;
pub mod workflow;

// Re-export commonly used types
pub use error::PipelineError;
pub use types::{DockTool, Mode, Stage, StageOutput};
pub use workflow::{run_pipeline, PipelineConfig, PipelineReport};

use std::path::Path;

use dockflow_sdk::{log_outcome_summary, log_phase_summary, log_state_file};

use crate::workflow_utils::{Outcome, OutcomeCounts, StageMarker};

/// Item-level setup errors (scratch, publishing) become failed outcomes
pub(crate) fn settle<R>(result: anyhow::Result<Outcome<R>>) -> Outcome<R> {
    result.unwrap_or_else(|e| Outcome::Failed(format!("{:#}", e)))
}

pub(crate) fn summarize(stage: Stage, counts: &OutcomeCounts) {
    log_outcome_summary!(
        stage.title(),
        counts.succeeded,
        counts.failed,
        counts.timed_out,
        counts.skipped
    );
    log_phase_summary!(
        stage.phase(),
        counts.succeeded,
        counts.failed,
        counts.timed_out,
        counts.skipped
    );
}

/// Write the completion marker; must be the stage's last write
pub(crate) fn mark_complete(
    stage: Stage,
    dir: &Path,
    records: usize,
    counts: OutcomeCounts,
    result: &Path,
) -> error::StageResult<()> {
    let path = StageMarker::new(stage.to_string(), records, counts)
        .with_result(result)
        .write(dir)
        .map_err(|e| PipelineError::from_anyhow(stage, dir, e))?;
    log_state_file!(
        stage.phase(),
        path.display(),
        format!("{} complete: {} records", stage.title(), records)
    );
    Ok(())
}
