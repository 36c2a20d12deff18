// Re-export the derive macro
pub use dockflow_macros::WorkflowDefinition;

use serde::{Deserialize, Serialize};

/// Workflow metadata (id, name, description)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Complete workflow metadata with fields (for JSON export)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullWorkflowMetadata {
    #[serde(flatten)]
    pub metadata: WorkflowMetadata,
    pub fields: Vec<FieldSchema>,
}

/// Field schema definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
    pub label: String,
    pub description: String,
    pub cli_arg: String,
    pub required: bool,
    pub default: Option<String>,
    /// Pipeline stages that consume this field
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<String>,
}

/// Field type enum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    Float,
    FilePath {
        #[serde(skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    DirPath,
    Select {
        options: Vec<String>,
    },
}

/// Trait that workflows must implement (auto-implemented by derive macro)
pub trait WorkflowDefinition {
    fn metadata() -> WorkflowMetadata;
    fn fields() -> Vec<FieldSchema>;

    /// Full schema as exported by `--workflow-metadata`
    fn full_metadata() -> FullWorkflowMetadata {
        FullWorkflowMetadata {
            metadata: Self::metadata(),
            fields: Self::fields(),
        }
    }

    fn print_metadata() {
        match serde_json::to_string_pretty(&Self::full_metadata()) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("failed to serialize workflow metadata: {}", e),
        }
    }
}

/// Structured logging events emitted by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowLog {
    /// Phase (pipeline stage) started
    PhaseStarted {
        phase: usize,
        name: String,
        total_phases: usize,
    },
    /// Phase completed
    PhaseCompleted { phase: usize, name: String },
    /// Phase failed; the run halts
    PhaseFailed {
        phase: usize,
        name: String,
        error: String,
    },
    /// Phase not run in this mode
    PhaseSkipped {
        phase: usize,
        name: String,
        reason: String,
    },
    /// Work item started
    TaskStarted {
        phase: usize,
        task_id: String,
        description: String,
        total_tasks: Option<usize>,
    },
    /// Work item finished with an artifact
    TaskCompleted {
        task_id: String,
        result: Option<String>,
    },
    /// Work item failed (tool error, missing output)
    TaskFailed { task_id: String, error: String },
    /// Work item killed after exceeding its time budget
    TaskTimedOut { task_id: String, after_secs: f64 },
    /// Work item had nothing to match against
    TaskSkipped { task_id: String, reason: String },
    /// Outcome counts for one phase
    PhaseSummary {
        phase: usize,
        succeeded: usize,
        failed: usize,
        timed_out: usize,
        skipped: usize,
    },
    /// State file created (stage artifacts)
    StateFileCreated {
        phase: usize,
        file_path: String,
        description: String,
    },
}

/// Line prefix that marks a structured event on stderr
pub const EVENT_PREFIX: &str = "__WF_EVENT__:";

impl WorkflowLog {
    /// Emit this log event to stderr as a single line
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            use std::io::Write;
            eprintln!("{}{}", EVENT_PREFIX, json);
            let _ = std::io::stderr().flush();
        }
    }

    /// Parse a stderr line back into an event
    pub fn parse_line(line: &str) -> Option<Self> {
        let json = line.strip_prefix(EVENT_PREFIX)?;
        serde_json::from_str(json).ok()
    }
}

/// Helper macros for workflow logging
#[macro_export]
macro_rules! log_phase_start {
    ($phase:expr, $name:expr, $total:expr) => {
        $crate::WorkflowLog::PhaseStarted {
            phase: $phase,
            name: $name.to_string(),
            total_phases: $total,
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_phase_complete {
    ($phase:expr, $name:expr) => {
        $crate::WorkflowLog::PhaseCompleted {
            phase: $phase,
            name: $name.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_phase_failed {
    ($phase:expr, $name:expr, $error:expr) => {
        $crate::WorkflowLog::PhaseFailed {
            phase: $phase,
            name: $name.to_string(),
            error: $error.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_phase_skipped {
    ($phase:expr, $name:expr, $reason:expr) => {
        $crate::WorkflowLog::PhaseSkipped {
            phase: $phase,
            name: $name.to_string(),
            reason: $reason.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_task_start {
    ($phase:expr, $task_id:expr, $desc:expr) => {
        $crate::WorkflowLog::TaskStarted {
            phase: $phase,
            task_id: $task_id.to_string(),
            description: $desc.to_string(),
            total_tasks: None,
        }
        .emit();
    };
    ($phase:expr, $task_id:expr, $desc:expr, $total:expr) => {
        $crate::WorkflowLog::TaskStarted {
            phase: $phase,
            task_id: $task_id.to_string(),
            description: $desc.to_string(),
            total_tasks: Some($total),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_task_complete {
    ($task_id:expr) => {
        $crate::WorkflowLog::TaskCompleted {
            task_id: $task_id.to_string(),
            result: None,
        }
        .emit();
    };
    ($task_id:expr, $result:expr) => {
        $crate::WorkflowLog::TaskCompleted {
            task_id: $task_id.to_string(),
            result: Some($result.to_string()),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_task_failed {
    ($task_id:expr, $error:expr) => {
        $crate::WorkflowLog::TaskFailed {
            task_id: $task_id.to_string(),
            error: $error.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_task_timed_out {
    ($task_id:expr, $after:expr) => {
        $crate::WorkflowLog::TaskTimedOut {
            task_id: $task_id.to_string(),
            after_secs: $after.as_secs_f64(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_task_skipped {
    ($task_id:expr, $reason:expr) => {
        $crate::WorkflowLog::TaskSkipped {
            task_id: $task_id.to_string(),
            reason: $reason.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_phase_summary {
    ($phase:expr, $succeeded:expr, $failed:expr, $timed_out:expr, $skipped:expr) => {
        $crate::WorkflowLog::PhaseSummary {
            phase: $phase,
            succeeded: $succeeded,
            failed: $failed,
            timed_out: $timed_out,
            skipped: $skipped,
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_state_file {
    ($phase:expr, $path:expr, $desc:expr) => {
        $crate::WorkflowLog::StateFileCreated {
            phase: $phase,
            file_path: $path.to_string(),
            description: $desc.to_string(),
        }
        .emit();
    };
}

// ============================================================================
// Console Logging Macros
// ============================================================================
// Coloured, human-readable lines on stdout, complementing the structured
// WorkflowLog events on stderr.
// ============================================================================

/// Logs the start of a pipeline stage with a header and description.
///
/// # Example
/// ```
/// use dockflow_sdk::log_phase_start_console;
/// log_phase_start_console!(1, "Ligand Preparation", "SMILES -> MOL2 -> PDBQT");
/// ```
///
/// Outputs:
/// ```text
/// ═══ STEP 1: Ligand Preparation ═══
/// SMILES -> MOL2 -> PDBQT
/// ```
#[macro_export]
macro_rules! log_phase_start_console {
    ($phase:expr, $title:expr, $description:expr) => {
        println!("\x1b[1;36m═══ STEP {}: {} ═══\x1b[0m", $phase, $title);
        println!("\x1b[36m{}\x1b[0m", $description);
    };
}

/// Logs the completion of a pipeline stage.
#[macro_export]
macro_rules! log_phase_complete_console {
    ($phase:expr) => {
        println!("\x1b[32m✓ Step {} complete\x1b[0m", $phase);
    };
}

/// Logs the start of parallel execution.
///
/// # Example
/// ```
/// use dockflow_sdk::log_parallel_start;
/// log_parallel_start!(3, "receptors", 2);
/// ```
///
/// Outputs:
/// ```text
/// → Running 3 receptors (concurrency: 2)
/// ```
#[macro_export]
macro_rules! log_parallel_start {
    ($num_items:expr, $item_type:expr, $limit:expr) => {
        println!(
            "\x1b[36m→ Running {} {} (concurrency: {})\x1b[0m",
            $num_items, $item_type, $limit
        );
    };
}

/// Logs progress of an operation.
///
/// # Example
/// ```
/// use dockflow_sdk::log_progress;
/// log_progress!(3, 5, "ligands");
/// ```
///
/// Outputs:
/// ```text
/// Progress: 3/5 ligands
/// ```
#[macro_export]
macro_rules! log_progress {
    ($current:expr, $total:expr, $item_type:expr) => {
        println!(
            "\x1b[36mProgress: {}/{} {}\x1b[0m",
            $current, $total, $item_type
        );
    };
}

/// Logs a stage summary with outcome counts.
///
/// # Example
/// ```
/// use dockflow_sdk::log_outcome_summary;
/// log_outcome_summary!("Docking", 8, 1, 1, 0);
/// ```
///
/// Outputs:
/// ```text
/// Docking: ✓ 8 succeeded, ✗ 1 failed, ⏱ 1 timed out, – 0 skipped
/// ```
#[macro_export]
macro_rules! log_outcome_summary {
    ($stage:expr, $succeeded:expr, $failed:expr, $timed_out:expr, $skipped:expr) => {
        println!(
            "\x1b[1m{}: \x1b[32m✓ {} succeeded\x1b[0m, \x1b[31m✗ {} failed\x1b[0m, \x1b[33m⏱ {} timed out\x1b[0m, – {} skipped",
            $stage, $succeeded, $failed, $timed_out, $skipped
        );
    };
}

/// Logs the number of items found.
///
/// # Example
/// ```
/// use dockflow_sdk::log_found;
/// log_found!(14, "protein structures");
/// ```
#[macro_export]
macro_rules! log_found {
    ($count:expr, $item_type:expr) => {
        println!("\x1b[36mFound {} {}\x1b[0m", $count, $item_type);
    };
}

/// Logs an informational message.
#[macro_export]
macro_rules! log_info {
    ($message:expr) => {
        println!("\x1b[36mℹ {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[36mℹ {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs a warning message.
///
/// # Example
/// ```
/// use dockflow_sdk::log_warning;
/// log_warning!("could not remove scratch directory");
/// ```
///
/// Outputs:
/// ```text
/// ⚠ Warning: could not remove scratch directory
/// ```
#[macro_export]
macro_rules! log_warning {
    ($message:expr) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs that a file has been saved.
#[macro_export]
macro_rules! log_file_saved {
    ($path:expr) => {
        println!("\x1b[32m✓ Saved: {}\x1b[0m", $path);
    };
}
