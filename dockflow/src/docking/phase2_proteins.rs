//! Phase 2: structure repair, then receptor preparation
//!
//! Repair is CPU-bound and runs on blocking workers; receptor preparation
//! mostly waits on its subprocess and runs on async workers. Proteins that
//! fail either step are appended to `failed.log` in the receptor directory.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dockflow_sdk::{log_found, log_info, log_parallel_start, log_task_start, log_warning};

use crate::docking::context::RunContext;
use crate::docking::error::{PipelineError, StageResult};
use crate::docking::partition::{collect_inputs, partition_files};
use crate::docking::tools::Tool;
use crate::docking::types::{Provenance, Stage, StageOutput};
use crate::docking::{mark_complete, settle, summarize};
use crate::workflow_utils::{
    dispatch, log_report, publish, run_tool, sort_reports, CsvLog, DispatchConfig, ItemReport,
    Outcome, OutcomeCounts, TaskContext, ToolInvocation, WorkItem, WorkerKind,
};

const STAGE: Stage = Stage::ProteinPrep;

pub const FAILED_LOG: &str = "failed.log";

async fn repair(ctx: &RunContext, item: &WorkItem<PathBuf>) -> Result<Outcome<PathBuf>> {
    let scratch = ctx.scratch.item_dir(&item.key)?;
    let name = format!("out-{}.pdb", item.key);
    let tmp = scratch.join(&name);

    let mut output = std::ffi::OsString::from("--output=");
    output.push(&tmp);
    let fixer = ToolInvocation::new(ctx.tools.path(Tool::Pdbfixer)?)
        .arg(&item.payload)
        .arg(output)
        .args([
            "--add-atoms=all",
            "--add-residues",
            "--replace-nonstandard",
            "--keep-heterogens=none",
            "--ph=7.0",
        ])
        .expect_output(&tmp);
    if let Err(outcome) = run_tool(&fixer).await.into_result() {
        return Ok(outcome);
    }

    let dest = ctx.layout.fixed_dir.join(&name);
    publish(&tmp, &dest).await?;
    Ok(Outcome::Success(dest))
}

async fn prepare_receptor(ctx: &RunContext, item: &WorkItem<PathBuf>) -> Result<Outcome<PathBuf>> {
    let scratch = ctx.scratch.item_dir(&item.key)?;
    let name = format!("out-{}.pdbqt", item.key);
    let tmp = scratch.join(&name);

    let prepare = ToolInvocation::new(ctx.tools.path(Tool::PrepareReceptor)?)
        .arg("-r")
        .arg(&item.payload)
        .arg("-o")
        .arg(&tmp)
        .expect_output(&tmp);
    if let Err(outcome) = run_tool(&prepare).await.into_result() {
        return Ok(outcome);
    }

    let dest = ctx.layout.receptor_dir.join(&name);
    publish(&tmp, &dest).await?;
    Ok(Outcome::Success(dest))
}

fn record_failure(log: &CsvLog, report: &ItemReport<PathBuf>) {
    if report.outcome.is_success() {
        return;
    }
    if let Err(e) = log.append_row(&format!("{} failed", report.key)) {
        log_warning!("could not record {} in {}: {:#}", report.key, log.path().display(), e);
    }
}

async fn create_dir(dir: &Path) -> StageResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PipelineError::io(STAGE, dir, e))
}

/// Repair and prepare every protein structure under the protein input
pub async fn prepare_proteins(ctx: &Arc<RunContext>) -> StageResult<StageOutput> {
    let started = Instant::now();
    let source = &ctx.config.protein;
    let layout = &ctx.layout;

    let partition = partition_files(collect_inputs(STAGE, source, &["pdb"])?);
    for excluded in &partition.excluded {
        log_warning!("skipping {}", excluded);
    }
    if !partition.duplicates.is_empty() {
        log_warning!(
            "several structures share an identity, keeping the first: {}",
            partition.duplicates.join(", ")
        );
    }
    let partition = partition.ensure_nonempty(STAGE, source, "protein structures")?;
    log_found!(partition.len(), "protein structures");

    create_dir(&layout.fixed_dir).await?;
    create_dir(&layout.receptor_dir).await?;

    let failed_log_path = layout.receptor_dir.join(FAILED_LOG);
    match tokio::fs::remove_file(&failed_log_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(PipelineError::io(STAGE, &failed_log_path, e)),
    }
    let failed_log = CsvLog::append_to(&failed_log_path)
        .map_err(|e| PipelineError::from_anyhow(STAGE, &failed_log_path, e))?;

    // Repair
    let repair_config = DispatchConfig::new(WorkerKind::Blocking, ctx.config.cpu)
        .with_timeout(ctx.config.timeouts.repair);
    log_parallel_start!(partition.len(), "structure repairs", repair_config.limit);

    let exec_ctx = ctx.clone();
    let mut repaired = dispatch(
        STAGE.phase(),
        partition.items,
        &repair_config,
        move |item, task: TaskContext| {
            let ctx = exec_ctx.clone();
            async move {
                log_task_start!(
                    task.phase,
                    format!("fix_{}", item.key),
                    format!("Repairing {}", item.payload.display()),
                    task.total_tasks
                );
                settle(repair(&ctx, &item).await)
            }
        },
        |report| {
            log_report("fix", report, |p: &PathBuf| p.display().to_string());
            record_failure(&failed_log, report);
        },
    )
    .await;
    sort_reports(&mut repaired);

    let mut counts = OutcomeCounts::default();
    let mut receptor_items = Vec::new();
    for report in repaired {
        match report.outcome {
            Outcome::Success(path) => receptor_items.push(WorkItem::new(report.key, path)),
            other => counts.record(&other),
        }
    }

    // Receptor preparation
    if receptor_items.is_empty() {
        log_info!("No structures survived repair");
    } else {
        let receptor_config = DispatchConfig::new(WorkerKind::Async, ctx.config.cpu)
            .with_timeout(ctx.config.timeouts.receptor);
        log_parallel_start!(receptor_items.len(), "receptor preparations", receptor_config.limit);

        let exec_ctx = ctx.clone();
        let mut prepared = dispatch(
            STAGE.phase(),
            receptor_items,
            &receptor_config,
            move |item, task: TaskContext| {
                let ctx = exec_ctx.clone();
                async move {
                    log_task_start!(
                        task.phase,
                        format!("receptor_{}", item.key),
                        format!("Preparing receptor {}", item.key),
                        task.total_tasks
                    );
                    settle(prepare_receptor(&ctx, &item).await)
                }
            },
            |report| {
                log_report("receptor", report, |p: &PathBuf| p.display().to_string());
                record_failure(&failed_log, report);
            },
        )
        .await;
        sort_reports(&mut prepared);
        for report in &prepared {
            counts.record(&report.outcome);
        }
    }

    summarize(STAGE, &counts);
    mark_complete(
        STAGE,
        &layout.receptor_dir,
        counts.succeeded,
        counts,
        &layout.receptor_dir,
    )?;

    Ok(StageOutput {
        stage: STAGE,
        dir: layout.receptor_dir.clone(),
        table: None,
        records: counts.succeeded,
        counts,
        elapsed: started.elapsed(),
        provenance: Provenance::Produced,
    })
}
