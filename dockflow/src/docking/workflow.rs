//! Pipeline orchestration
//!
//! [`run_pipeline`] drives the stage state machine:
//!
//! ```text
//! Validate → LigandPrep → ProteinPrep → SiteDetection → Docking → Rescoring → Complete
//!                              (skipped in prebuilt mode)
//! ```
//!
//! Every stage reports a [`StageOutput`]. Before the next stage starts, the
//! output must pass the go/no-go gate: a produced output needs its completion
//! marker and at least one record, a located (prebuilt) output needs at least
//! one record. Any stage-level error moves the machine to `Failed` and halts
//! the run; per-item failures never do.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dockflow_sdk::{
    log_info, log_phase_complete, log_phase_complete_console, log_phase_failed, log_phase_skipped,
    log_phase_start, log_phase_start_console,
};

use crate::docking::cli::Args;
use crate::docking::context::RunContext;
use crate::docking::error::{PipelineError, StageResult};
use crate::docking::matcher::{find_center_table, load_center_table};
use crate::docking::partition::scan_dir;
use crate::docking::phase1_ligands::prepare_ligands;
use crate::docking::phase2_proteins::prepare_proteins;
use crate::docking::phase3_sites::detect_sites;
use crate::docking::phase4_docking::dock;
use crate::docking::phase5_rescoring::rescore;
use crate::docking::tools::{required_tools, StageTimeouts, ToolConfig};
use crate::docking::types::{DockTool, Mode, PipelineState, Provenance, Stage, StageOutput};
use crate::workflow_utils::{default_concurrency, OutcomeCounts, Scratch, StageMarker};

/// Configuration for one pipeline run
///
/// # Examples
///
/// ```no_run
/// use dockflow::docking::{run_pipeline, Mode, PipelineConfig};
///
/// # async fn example() -> Result<(), dockflow::docking::PipelineError> {
/// let config = PipelineConfig {
///     ligand: "ligands.txt".into(),
///     protein: "proteins".into(),
///     mode: Mode::Custom,
///     box_size: [20.0, 20.0, 20.0],
///     ..Default::default()
/// };
/// run_pipeline(config).await?.print();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// `<seed_id> <SMILES>` records
    pub ligand: PathBuf,
    /// PDB file or directory; the receptor database in prebuilt mode
    pub protein: PathBuf,
    pub mode: Mode,
    /// Docking box edge lengths (Å)
    pub box_size: [f64; 3],
    /// Concurrency limit for every stage
    pub cpu: usize,
    pub dock_tool: DockTool,
    pub out_dir: PathBuf,
    /// Explicit `tools.yaml`, consulted before any other source
    pub tools_config: Option<PathBuf>,
    pub timeouts: StageTimeouts,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ligand: PathBuf::new(),
            protein: PathBuf::new(),
            mode: Mode::Custom,
            box_size: [20.0, 20.0, 20.0],
            cpu: default_concurrency(),
            dock_tool: DockTool::Idock,
            out_dir: PathBuf::from("."),
            tools_config: None,
            timeouts: StageTimeouts::default(),
        }
    }
}

impl From<Args> for PipelineConfig {
    fn from(args: Args) -> Self {
        let timeouts = match args.item_timeout {
            Some(secs) => StageTimeouts::uniform(Duration::from_secs(secs.max(1))),
            None => StageTimeouts::default(),
        };
        PipelineConfig {
            box_size: args.box_size(),
            ligand: args.ligand,
            protein: args.protein,
            mode: args.mode,
            cpu: args.cpu.max(1),
            dock_tool: args.dock_tool,
            out_dir: args.out_dir,
            tools_config: args.tools_config,
            timeouts,
        }
    }
}

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub elapsed: Duration,
    pub stages: Vec<StageOutput>,
}

impl PipelineReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageOutput> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Docking output directory (poses, docking log, manifest)
    pub fn docking_dir(&self) -> Option<&Path> {
        self.stage(Stage::Docking).map(|s| s.dir.as_path())
    }

    /// Consolidated score table
    pub fn scores(&self) -> Option<&Path> {
        self.stage(Stage::Rescoring).and_then(|s| s.table.as_deref())
    }

    pub fn print(&self) {
        println!("\n{}", "=".repeat(80));
        println!("Docking pipeline complete");
        println!("{}", "=".repeat(80));
        println!("Started:  {}", self.started_at.format("%Y-%m-%d %H:%M:%S"));
        println!("Finished: {}", self.finished_at.format("%Y-%m-%d %H:%M:%S"));
        println!("Duration: {:.2}s", self.elapsed.as_secs_f64());
        println!();
        for output in &self.stages {
            let c = &output.counts;
            match output.provenance {
                Provenance::Produced => println!(
                    "  {:<20} {:>6} records  ✓ {} ✗ {} ⏱ {} – {}  ({:.1}s)",
                    output.stage.title(),
                    output.records,
                    c.succeeded,
                    c.failed,
                    c.timed_out,
                    c.skipped,
                    output.elapsed.as_secs_f64()
                ),
                Provenance::Located => println!(
                    "  {:<20} {:>6} records  (prebuilt: {})",
                    output.stage.title(),
                    output.records,
                    output.table.as_deref().unwrap_or(output.dir.as_path()).display()
                ),
            }
        }
        println!();
        if let Some(dir) = self.docking_dir() {
            println!("Docking results: {}", dir.display());
        }
        if let Some(scores) = self.scores() {
            println!("Rescoring results: {}", scores.display());
        }
    }
}

/// Preconditions every later stage relies on; resolves tools and creates the run scratch
async fn validate(config: PipelineConfig) -> StageResult<Arc<RunContext>> {
    const STAGE: Stage = Stage::Validate;

    if !config.ligand.is_file() {
        return Err(PipelineError::missing(STAGE, &config.ligand, "ligand file not found"));
    }
    if !config.protein.exists() {
        return Err(PipelineError::missing(STAGE, &config.protein, "protein input not found"));
    }
    if config.mode == Mode::Prebuilt && !config.protein.is_dir() {
        return Err(PipelineError::InvalidInput {
            stage: STAGE,
            detail: format!(
                "prebuilt mode needs a database directory, got {}",
                config.protein.display()
            ),
        });
    }
    if config.box_size.iter().any(|s| !s.is_finite() || *s <= 0.0) {
        return Err(PipelineError::InvalidInput {
            stage: STAGE,
            detail: format!("box size must be positive, got {:?}", config.box_size),
        });
    }

    let tools = ToolConfig::resolve(
        &required_tools(config.mode, config.dock_tool),
        config.tools_config.as_deref(),
    )?;
    for (tool, path) in tools.iter() {
        log_info!("{:<18} {}", tool.name(), path.display());
    }

    tokio::fs::create_dir_all(&config.out_dir)
        .await
        .map_err(|e| PipelineError::io(STAGE, &config.out_dir, e))?;
    let scratch = Scratch::create(&config.out_dir)
        .map_err(|e| PipelineError::from_anyhow(STAGE, &config.out_dir, e))?;

    Ok(RunContext::new(config, tools, scratch))
}

/// Find what a skipped protein stage would have produced in the prebuilt database
pub fn locate_prebuilt(ctx: &RunContext, stage: Stage) -> StageResult<StageOutput> {
    let database = &ctx.config.protein;
    let (table, records) = match stage {
        Stage::ProteinPrep => {
            let receptors = scan_dir(database, &["pdbqt"])
                .map_err(|e| PipelineError::io(stage, database, e))?;
            (None, receptors.len())
        }
        Stage::SiteDetection => {
            let table = find_center_table(database)
                .map_err(|e| PipelineError::io(stage, database, e))?
                .ok_or_else(|| {
                    PipelineError::missing(
                        stage,
                        database,
                        "no *docking-center.txt in prebuilt protein database",
                    )
                })?;
            let records = load_center_table(&table)
                .map_err(|e| PipelineError::from_anyhow(stage, &table, e))?
                .records
                .len();
            (Some(table), records)
        }
        other => {
            return Err(PipelineError::InvalidInput {
                stage: other,
                detail: "only protein stages can come from a prebuilt database".to_string(),
            })
        }
    };

    Ok(StageOutput {
        stage,
        dir: database.clone(),
        table,
        records,
        counts: OutcomeCounts::default(),
        elapsed: Duration::ZERO,
        provenance: Provenance::Located,
    })
}

/// Go/no-go check between a stage and its successor
pub fn check_gate(output: &StageOutput) -> StageResult<()> {
    let stage = output.stage;

    if output.provenance == Provenance::Produced {
        let marker = StageMarker::read(&output.dir)
            .map_err(|e| PipelineError::from_anyhow(stage, &output.dir, e))?
            .ok_or_else(|| {
                PipelineError::missing(
                    stage,
                    StageMarker::path_in(&output.dir),
                    "stage did not write its completion marker",
                )
            })?;
        if let Some(result) = &marker.result {
            if !result.exists() {
                return Err(PipelineError::missing(
                    stage,
                    result,
                    "stage result named by the completion marker",
                ));
            }
        }
        if marker.record_count == 0 {
            return Err(PipelineError::empty(
                stage,
                output.table.as_deref().unwrap_or(output.dir.as_path()),
                format!(
                    "stage produced no records ({} failed, {} timed out, {} skipped)",
                    marker.counts.failed, marker.counts.timed_out, marker.counts.skipped
                ),
            ));
        }
    }

    if output.records == 0 {
        return Err(PipelineError::empty(
            stage,
            output.table.as_deref().unwrap_or(output.dir.as_path()),
            "stage result has no records",
        ));
    }
    Ok(())
}

async fn run_stage(
    ctx: &Arc<RunContext>,
    stage: Stage,
    center_table: Option<&Path>,
) -> StageResult<StageOutput> {
    if !stage.runs_in(ctx.config.mode) {
        log_phase_skipped!(stage.phase(), stage.title(), "using the prebuilt protein database");
        return locate_prebuilt(ctx, stage);
    }
    match stage {
        Stage::Validate => Err(PipelineError::InvalidInput {
            stage,
            detail: "validation runs before any stage".to_string(),
        }),
        Stage::LigandPrep => prepare_ligands(ctx).await,
        Stage::ProteinPrep => prepare_proteins(ctx).await,
        Stage::SiteDetection => detect_sites(ctx).await,
        Stage::Docking => {
            let table = center_table.ok_or_else(|| {
                PipelineError::missing(
                    stage,
                    &ctx.layout.center_table,
                    "no coordinate table from site detection",
                )
            })?;
            dock(ctx, table).await
        }
        Stage::Rescoring => rescore(ctx).await,
    }
}

fn stage_description(stage: Stage) -> &'static str {
    match stage {
        Stage::Validate => "Check inputs and resolve external tools",
        Stage::LigandPrep => "SMILES → 3D MOL2 → PDBQT",
        Stage::ProteinPrep => "Repair structures → PDBQT receptors",
        Stage::SiteDetection => "Predict pockets → docking-center table",
        Stage::Docking => "Dock ligands into every matched pocket",
        Stage::Rescoring => "SFCT rescoring and score fusion",
    }
}

fn banner(stage: Stage) {
    println!("\n{}", "=".repeat(80));
    log_phase_start_console!(stage.phase(), stage.title(), stage_description(stage));
    println!("{}", "=".repeat(80));
    log_phase_start!(stage.phase(), stage.title(), Stage::ALL.len());
}

/// Run the complete pipeline
///
/// Returns the per-stage outputs on success. A stage-level failure halts the
/// run after the current stage's dispatched items have finished and is
/// returned as the error; the run scratch directory is removed either way.
pub async fn run_pipeline(config: PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let started_at = Local::now();
    let clock = Instant::now();

    banner(Stage::Validate);
    let ctx = match validate(config).await {
        Ok(ctx) => ctx,
        Err(e) => {
            log_phase_failed!(Stage::Validate.phase(), Stage::Validate.title(), e);
            return Err(e);
        }
    };
    log_phase_complete!(Stage::Validate.phase(), Stage::Validate.title());
    log_phase_complete_console!(Stage::Validate.phase());

    let mut stages = Vec::new();
    let mut center_table: Option<PathBuf> = None;
    let mut failure = None;
    let mut state = Stage::Validate.next();

    while let PipelineState::Running(stage) = state {
        banner(stage);
        let result = match run_stage(&ctx, stage, center_table.as_deref()).await {
            Ok(output) => check_gate(&output).map(|()| output),
            Err(e) => Err(e),
        };
        match result {
            Ok(output) => {
                if stage == Stage::SiteDetection {
                    center_table = output.table.clone();
                }
                log_phase_complete!(stage.phase(), stage.title());
                log_phase_complete_console!(stage.phase());
                stages.push(output);
                state = stage.next();
            }
            Err(e) => {
                log_phase_failed!(stage.phase(), stage.title(), e);
                failure = Some(e);
                state = PipelineState::Failed(stage);
            }
        }
    }

    ctx.scratch.remove();
    if let Some(e) = failure {
        return Err(e);
    }

    Ok(PipelineReport {
        started_at,
        finished_at: Local::now(),
        elapsed: clock.elapsed(),
        stages,
    })
}
