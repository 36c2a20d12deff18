//! Workflow utilities shared by every pipeline stage
//!
//! - **batch**: Bounded parallel execution with per-item outcomes and time-outs
//! - **task**: External tool invocation and task-level logging
//! - **scratch**: Run-scoped, per-item temporary directories
//! - **files**: Atomic table writes, serialized logs, stage completion markers
//! - **yaml**: YAML loading with readable errors

pub mod batch;
pub mod files;
pub mod scratch;
pub mod task;
pub mod yaml;

// Re-export commonly used types and functions
pub use batch::{
    default_concurrency, dispatch, sort_reports, DispatchConfig, ItemReport, Outcome,
    OutcomeCounts, TaskContext, WorkItem, WorkerKind,
};
pub use files::{publish, write_atomic, CsvLog, StageMarker};
pub use scratch::{Scratch, ScratchDir, SCRATCH_PREFIX};
pub use task::{log_report, run_tool, ToolInvocation, ToolOutput};
pub use yaml::{load_yaml_file, parse_yaml};
