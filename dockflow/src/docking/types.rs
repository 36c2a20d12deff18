//! Data types shared across the docking pipeline stages

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::workflow_utils::OutcomeCounts;

/// Where the protein side of the pipeline comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Repair, prepare and pocket-scan raw PDB files
    Custom,
    /// Use an existing database of prepared receptors plus a center table
    Prebuilt,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Custom => write!(f, "custom"),
            Mode::Prebuilt => write!(f, "prebuilt"),
        }
    }
}

/// Docking engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DockTool {
    Idock,
    Vina,
}

impl DockTool {
    pub fn name(&self) -> &'static str {
        match self {
            DockTool::Idock => "idock",
            DockTool::Vina => "vina",
        }
    }
}

impl fmt::Display for DockTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pipeline states, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Validate,
    LigandPrep,
    ProteinPrep,
    SiteDetection,
    Docking,
    Rescoring,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Validate,
        Stage::LigandPrep,
        Stage::ProteinPrep,
        Stage::SiteDetection,
        Stage::Docking,
        Stage::Rescoring,
    ];

    /// Phase number used in log events (Validate is phase 0)
    pub fn phase(&self) -> usize {
        match self {
            Stage::Validate => 0,
            Stage::LigandPrep => 1,
            Stage::ProteinPrep => 2,
            Stage::SiteDetection => 3,
            Stage::Docking => 4,
            Stage::Rescoring => 5,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Stage::Validate => "Validate",
            Stage::LigandPrep => "Ligand Preparation",
            Stage::ProteinPrep => "Protein Preparation",
            Stage::SiteDetection => "Site Detection",
            Stage::Docking => "Docking",
            Stage::Rescoring => "Rescoring",
        }
    }

    /// Whether this stage runs in `mode`; the protein stages are replaced by a
    /// prebuilt database lookup
    pub fn runs_in(&self, mode: Mode) -> bool {
        !matches!(
            (self, mode),
            (Stage::ProteinPrep | Stage::SiteDetection, Mode::Prebuilt)
        )
    }

    /// Next state after this stage finished and passed its gate
    pub fn next(&self) -> PipelineState {
        match self {
            Stage::Validate => PipelineState::Running(Stage::LigandPrep),
            Stage::LigandPrep => PipelineState::Running(Stage::ProteinPrep),
            Stage::ProteinPrep => PipelineState::Running(Stage::SiteDetection),
            Stage::SiteDetection => PipelineState::Running(Stage::Docking),
            Stage::Docking => PipelineState::Running(Stage::Rescoring),
            Stage::Rescoring => PipelineState::Complete,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validate => "Validate",
            Stage::LigandPrep => "LigandPrep",
            Stage::ProteinPrep => "ProteinPrep",
            Stage::SiteDetection => "SiteDetection",
            Stage::Docking => "Docking",
            Stage::Rescoring => "Rescoring",
        };
        f.write_str(name)
    }
}

/// Orchestrator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running(Stage),
    Complete,
    Failed(Stage),
}

/// How a stage's output came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Written by this run; must carry a completion marker
    Produced,
    /// Found in a prebuilt database directory
    Located,
}

/// Durable output of one stage, handed to the next stage's partitioner
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub stage: Stage,
    /// Directory of per-item artifacts (and the completion marker)
    pub dir: PathBuf,
    /// Consolidated table, for stages that produce one
    pub table: Option<PathBuf>,
    pub records: usize,
    pub counts: OutcomeCounts,
    pub elapsed: Duration,
    pub provenance: Provenance,
}

/// A line of tool output that does not match the expected schema
#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line_no}: {reason}: {content:?}")]
pub struct MalformedLine {
    pub line_no: usize,
    pub content: String,
    pub reason: String,
}

impl MalformedLine {
    pub fn new(line_no: usize, content: &str, reason: impl Into<String>) -> Self {
        Self {
            line_no,
            content: content.to_string(),
            reason: reason.into(),
        }
    }
}

/// One ligand input record: `<seed_id> <SMILES>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LigandRecord {
    pub seed: String,
    pub smiles: String,
}

/// One row of the coordinate table
#[derive(Debug, Clone, PartialEq)]
pub struct CenterRecord {
    pub pocket: crate::docking::identity::PocketName,
    pub center: [f64; 3],
}

/// A docking pose produced for one receptor, pocket and ligand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub protein_key: String,
    pub pocket: String,
    pub ligand: String,
    pub receptor: PathBuf,
    pub path: PathBuf,
}

/// One model's fused scores in a pose file
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRow {
    /// 1-based MODEL index within the pose file
    pub model: usize,
    pub primary: f64,
    pub secondary: f64,
    pub combined: f64,
}
