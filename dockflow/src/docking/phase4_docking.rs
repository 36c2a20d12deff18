//! Phase 4: dock every ligand into every matched pocket of every receptor
//!
//! One work item per receptor. The receptor's pockets come from the
//! coordinate table by identity key; a receptor without pockets is skipped.
//! Poses are published as `poses/<pocket>_<ligand>.pdbqt` and indexed in
//! `poses.json` for rescoring.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dockflow_sdk::{log_found, log_parallel_start, log_task_start, log_warning};

use crate::docking::context::RunContext;
use crate::docking::error::{PipelineError, StageResult};
use crate::docking::identity::key_of;
use crate::docking::matcher::{load_center_table, IdentityIndex, PoseManifest, Resolution};
use crate::docking::partition::{partition_files, scan_dir};
use crate::docking::tools::Tool;
use crate::docking::types::{CenterRecord, DockTool, PoseRecord, Provenance, Stage, StageOutput};
use crate::docking::{mark_complete, settle, summarize};
use crate::workflow_utils::{
    dispatch, log_report, publish, run_tool, sort_reports, CsvLog, DispatchConfig, ItemReport,
    Outcome, OutcomeCounts, ScratchDir, TaskContext, ToolInvocation, WorkItem, WorkerKind,
};

const STAGE: Stage = Stage::Docking;

pub const DOCKING_LOG_HEADER: &str = "Protein Name,Time (s),Status";

/// A receptor and the pockets matched to it
#[derive(Debug, Clone)]
pub struct DockingTarget {
    pub receptor: PathBuf,
    pub pockets: Vec<CenterRecord>,
}

/// Docking log status for one receptor
pub fn log_status<R>(outcome: &Outcome<R>) -> &'static str {
    match outcome {
        Outcome::Success(_) => "Success",
        Outcome::Skipped(_) => "No Match",
        Outcome::Failed(_) | Outcome::TimedOut(_) => "Failed",
    }
}

/// `--center_x <c> --size_x <s>` per axis; both engines share the spelling
fn box_args(mut inv: ToolInvocation, center: [f64; 3], size: [f64; 3]) -> ToolInvocation {
    for (axis, (c, s)) in ["x", "y", "z"].iter().zip(center.iter().zip(size.iter())) {
        inv = inv
            .arg(format!("--center_{}", axis))
            .arg(format!("{:.3}", c))
            .arg(format!("--size_{}", axis))
            .arg(s.to_string());
    }
    inv
}

struct PocketRun<'a> {
    ctx: &'a RunContext,
    protein_key: &'a str,
    receptor: &'a Path,
    scratch: &'a ScratchDir,
    ligands: &'a [PathBuf],
}

impl PocketRun<'_> {
    async fn publish_pose(&self, pocket: &str, ligand_key: &str, src: &Path) -> Result<PoseRecord> {
        let dest = self
            .ctx
            .layout
            .poses_dir
            .join(format!("{}_{}.pdbqt", pocket, ligand_key));
        publish(src, &dest).await?;
        Ok(PoseRecord {
            protein_key: self.protein_key.to_string(),
            pocket: pocket.to_string(),
            ligand: ligand_key.to_string(),
            receptor: self.receptor.to_path_buf(),
            path: dest,
        })
    }

    /// idock docks the whole ligand directory in one run, one pose file per ligand
    async fn idock(&self, pocket: &CenterRecord, errors: &mut Vec<String>) -> Result<Vec<PoseRecord>> {
        let name = pocket.pocket.to_string();
        let out_dir = self.scratch.join(&name);
        let invocation = ToolInvocation::new(self.ctx.tools.path(Tool::Idock)?)
            .arg("--receptor")
            .arg(self.receptor)
            .arg("--ligand")
            .arg(&self.ctx.layout.ligand_pdbqt_dir);
        let invocation = box_args(invocation, pocket.center, self.ctx.config.box_size)
            .arg("--out")
            .arg(&out_dir);

        if let Err(outcome) = run_tool(&invocation).await.into_result::<()>() {
            errors.push(format!("{}: {}", name, outcome.detail().unwrap_or_default()));
            return Ok(Vec::new());
        }

        let mut poses = Vec::new();
        let produced = scan_dir(&out_dir, &["pdbqt"]).unwrap_or_default();
        for file in produced {
            poses.push(self.publish_pose(&name, &key_of(&file), &file).await?);
        }
        if poses.is_empty() {
            errors.push(format!("{}: idock wrote no poses", name));
        }
        Ok(poses)
    }

    /// Vina docks one ligand per run and keeps its log beside the pose
    async fn vina(&self, pocket: &CenterRecord, errors: &mut Vec<String>) -> Result<Vec<PoseRecord>> {
        let name = pocket.pocket.to_string();
        let mut poses = Vec::new();
        for ligand in self.ligands {
            let ligand_key = key_of(ligand);
            let stem = format!("{}_{}", name, ligand_key);
            let out = self.scratch.join(format!("{}.pdbqt", stem));
            let log = self.scratch.join(format!("{}_docking.log", stem));

            let invocation = ToolInvocation::new(self.ctx.tools.path(Tool::Vina)?)
                .arg("--receptor")
                .arg(self.receptor)
                .arg("--ligand")
                .arg(ligand);
            let invocation = box_args(invocation, pocket.center, self.ctx.config.box_size)
                .arg("--out")
                .arg(&out)
                .arg("--log")
                .arg(&log)
                .expect_output(&out);

            if let Err(outcome) = run_tool(&invocation).await.into_result::<()>() {
                errors.push(format!("{}: {}", stem, outcome.detail().unwrap_or_default()));
                continue;
            }
            if log.exists() {
                let kept = self.ctx.layout.poses_dir.join(format!("{}_docking.log", stem));
                publish(&log, &kept).await?;
            }
            poses.push(self.publish_pose(&name, &ligand_key, &out).await?);
        }
        Ok(poses)
    }
}

async fn dock_receptor(
    ctx: &RunContext,
    item: &WorkItem<DockingTarget>,
    ligands: &[PathBuf],
) -> Result<Outcome<Vec<PoseRecord>>> {
    if item.payload.pockets.is_empty() {
        return Ok(Outcome::Skipped(
            "no center coordinates for this protein".to_string(),
        ));
    }

    let scratch = ctx.scratch.item_dir(&item.key)?;
    let run = PocketRun {
        ctx,
        protein_key: &item.key,
        receptor: &item.payload.receptor,
        scratch: &scratch,
        ligands,
    };

    let mut poses = Vec::new();
    let mut errors = Vec::new();
    for pocket in &item.payload.pockets {
        let produced = match ctx.config.dock_tool {
            DockTool::Idock => run.idock(pocket, &mut errors).await?,
            DockTool::Vina => run.vina(pocket, &mut errors).await?,
        };
        poses.extend(produced);
    }

    for error in &errors {
        log_warning!("{}: {}", item.key, error);
    }
    if poses.is_empty() {
        return Ok(Outcome::Failed(if errors.is_empty() {
            "no poses produced".to_string()
        } else {
            errors.join("; ")
        }));
    }
    Ok(Outcome::Success(poses))
}

fn append_log_row(log: &CsvLog, report: &ItemReport<Vec<PoseRecord>>) {
    let row = format!(
        "{},{:.2},{}",
        report.key,
        report.elapsed.as_secs_f64(),
        log_status(&report.outcome)
    );
    if let Err(e) = log.append_row(&row) {
        log_warning!("could not write docking log row for {}: {:#}", report.key, e);
    }
}

/// Dock all prepared ligands into the matched pockets of every receptor
pub async fn dock(ctx: &Arc<RunContext>, center_table: &Path) -> StageResult<StageOutput> {
    let started = Instant::now();
    let layout = &ctx.layout;

    let table = load_center_table(center_table)
        .map_err(|e| PipelineError::from_anyhow(STAGE, center_table, e))?;
    for malformed in &table.malformed {
        log_warning!("{}: skipping {}", center_table.display(), malformed);
    }
    let centers: IdentityIndex<CenterRecord> = table.index();
    log_found!(table.records.len(), "pocket centers");

    let ligands = scan_dir(&layout.ligand_pdbqt_dir, &["pdbqt"])
        .map_err(|e| PipelineError::io(STAGE, &layout.ligand_pdbqt_dir, e))?;
    if ligands.is_empty() {
        return Err(PipelineError::empty(
            STAGE,
            &layout.ligand_pdbqt_dir,
            "no prepared ligands",
        ));
    }

    let receptors = scan_dir(&layout.receptor_dir, &["pdbqt"])
        .map_err(|e| PipelineError::io(STAGE, &layout.receptor_dir, e))?;
    let partition = partition_files(receptors).ensure_nonempty(
        STAGE,
        &layout.receptor_dir,
        "prepared receptors",
    )?;
    log_found!(partition.len(), "receptors");

    let items: Vec<WorkItem<DockingTarget>> = partition
        .items
        .into_iter()
        .map(|item| {
            let pockets = match centers.resolve(&item) {
                Resolution::Matched(records) => records.to_vec(),
                Resolution::Unmatched => Vec::new(),
            };
            let target = DockingTarget {
                receptor: item.payload,
                pockets,
            };
            WorkItem::new(item.key, target)
        })
        .collect();

    tokio::fs::create_dir_all(&layout.poses_dir)
        .await
        .map_err(|e| PipelineError::io(STAGE, &layout.poses_dir, e))?;
    let docking_log = CsvLog::create(&layout.docking_log, DOCKING_LOG_HEADER)
        .map_err(|e| PipelineError::from_anyhow(STAGE, &layout.docking_log, e))?;

    let dispatch_config = DispatchConfig::new(WorkerKind::Blocking, ctx.config.cpu)
        .with_timeout(ctx.config.timeouts.docking);
    log_parallel_start!(
        items.len(),
        format!("{} docking jobs", ctx.config.dock_tool),
        dispatch_config.limit
    );

    let exec_ctx = ctx.clone();
    let ligands = Arc::new(ligands);
    let mut reports = dispatch(
        STAGE.phase(),
        items,
        &dispatch_config,
        move |item, task: TaskContext| {
            let ctx = exec_ctx.clone();
            let ligands = ligands.clone();
            async move {
                log_task_start!(
                    task.phase,
                    format!("dock_{}", item.key),
                    format!(
                        "Docking into {} ({} pockets)",
                        item.key,
                        item.payload.pockets.len()
                    ),
                    task.total_tasks
                );
                settle(dock_receptor(&ctx, &item, &ligands).await)
            }
        },
        |report| {
            log_report("dock", report, |poses: &Vec<PoseRecord>| {
                format!("{} poses", poses.len())
            });
            append_log_row(&docking_log, report);
        },
    )
    .await;
    sort_reports(&mut reports);
    let counts = OutcomeCounts::from_reports(&reports);

    let poses: Vec<PoseRecord> = reports
        .into_iter()
        .filter_map(|r| match r.outcome {
            Outcome::Success(poses) => Some(poses),
            _ => None,
        })
        .flatten()
        .collect();
    let manifest = PoseManifest::new(ctx.config.dock_tool.name(), poses);
    let manifest_path = manifest
        .save(&layout.docking_dir)
        .map_err(|e| PipelineError::from_anyhow(STAGE, &layout.docking_dir, e))?;

    summarize(STAGE, &counts);
    mark_complete(
        STAGE,
        &layout.docking_dir,
        manifest.poses.len(),
        counts,
        &manifest_path,
    )?;

    Ok(StageOutput {
        stage: STAGE,
        dir: layout.docking_dir.clone(),
        table: Some(manifest_path),
        records: manifest.poses.len(),
        counts,
        elapsed: started.elapsed(),
        provenance: Provenance::Produced,
    })
}
