//! Phase 1: SMILES records -> 3D MOL2 -> PDBQT

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use dockflow_sdk::{log_found, log_parallel_start, log_task_start, log_warning};

use crate::docking::context::RunContext;
use crate::docking::error::{PipelineError, StageResult};
use crate::docking::partition::partition_ligands;
use crate::docking::{mark_complete, settle, summarize};
use crate::docking::tools::Tool;
use crate::docking::types::{LigandRecord, Provenance, Stage, StageOutput};
use crate::workflow_utils::{
    dispatch, log_report, publish, run_tool, sort_reports, DispatchConfig, Outcome,
    OutcomeCounts, TaskContext, ToolInvocation, WorkItem, WorkerKind,
};

const STAGE: Stage = Stage::LigandPrep;

/// Convert one ligand; the scratch directory is dropped on every path
async fn convert_ligand(ctx: &RunContext, item: &WorkItem<LigandRecord>) -> Result<Outcome<PathBuf>> {
    let layout = &ctx.layout;
    let scratch = ctx.scratch.item_dir(&item.key)?;
    let mol2_name = format!("{}.mol2", item.key);
    let pdbqt_name = format!("{}.pdbqt", item.key);
    let tmp_mol2 = scratch.join(&mol2_name);
    let tmp_pdbqt = scratch.join(&pdbqt_name);

    let obabel = ToolInvocation::new(ctx.tools.path(Tool::Obabel)?)
        .arg(format!("-:{}", item.payload.smiles))
        .args(["-omol2", "-O"])
        .arg(&tmp_mol2)
        .args(["--gen3d", "-h"])
        .expect_output(&tmp_mol2);
    if let Err(outcome) = run_tool(&obabel).await.into_result() {
        return Ok(outcome);
    }

    // prepare_ligand resolves the input relative to its working directory
    let prepare = ToolInvocation::new(ctx.tools.path(Tool::PrepareLigand)?)
        .arg("-l")
        .arg(&mol2_name)
        .arg("-o")
        .arg(&tmp_pdbqt)
        .args(["-A", "hydrogens"])
        .current_dir(scratch.path())
        .expect_output(&tmp_pdbqt);
    if let Err(outcome) = run_tool(&prepare).await.into_result() {
        return Ok(outcome);
    }

    publish(&tmp_mol2, &layout.ligand_mol2_dir.join(&mol2_name)).await?;
    let dest = layout.ligand_pdbqt_dir.join(&pdbqt_name);
    publish(&tmp_pdbqt, &dest).await?;
    Ok(Outcome::Success(dest))
}

async fn prepare_one(
    ctx: Arc<RunContext>,
    item: WorkItem<LigandRecord>,
    task: TaskContext,
) -> Outcome<PathBuf> {
    log_task_start!(
        task.phase,
        format!("prep_{}", item.key),
        format!("Preparing {} ({})", item.key, item.payload.smiles),
        task.total_tasks
    );
    settle(convert_ligand(&ctx, &item).await)
}

/// Run ligand preparation for every record in the ligand file
pub async fn prepare_ligands(ctx: &Arc<RunContext>) -> StageResult<StageOutput> {
    let started = Instant::now();
    let source = &ctx.config.ligand;
    let layout = &ctx.layout;

    if !source.is_file() {
        return Err(PipelineError::missing(STAGE, source, "ligand file not found"));
    }
    let text = tokio::fs::read_to_string(source)
        .await
        .map_err(|e| PipelineError::io(STAGE, source, e))?;

    let partition = partition_ligands(&text);
    for malformed in &partition.excluded {
        log_warning!("{}: skipping {}", source.display(), malformed);
    }
    if !partition.duplicates.is_empty() {
        log_warning!(
            "duplicate seed ids, keeping the first record: {}",
            partition.duplicates.join(", ")
        );
    }
    let partition = partition.ensure_nonempty(STAGE, source, "ligand records")?;
    log_found!(partition.len(), "ligand records");

    for dir in [&layout.ligand_mol2_dir, &layout.ligand_pdbqt_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| PipelineError::io(STAGE, dir, e))?;
    }

    let dispatch_config = DispatchConfig::new(WorkerKind::Async, ctx.config.cpu)
        .with_timeout(ctx.config.timeouts.ligand);
    log_parallel_start!(partition.len(), "ligands", dispatch_config.limit);

    let exec_ctx = ctx.clone();
    let mut reports = dispatch(
        STAGE.phase(),
        partition.items,
        &dispatch_config,
        move |item, task| prepare_one(exec_ctx.clone(), item, task),
        |report| log_report("prep", report, |p: &PathBuf| p.display().to_string()),
    )
    .await;
    sort_reports(&mut reports);

    let counts = OutcomeCounts::from_reports(&reports);
    summarize(STAGE, &counts);
    mark_complete(
        STAGE,
        &layout.ligand_pdbqt_dir,
        counts.succeeded,
        counts,
        &layout.ligand_pdbqt_dir,
    )?;

    Ok(StageOutput {
        stage: STAGE,
        dir: layout.ligand_pdbqt_dir.clone(),
        table: None,
        records: counts.succeeded,
        counts,
        elapsed: started.elapsed(),
        provenance: Provenance::Produced,
    })
}
