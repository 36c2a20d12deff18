//! Phase 3: pocket prediction and docking-center table

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dockflow_sdk::{log_file_saved, log_found, log_parallel_start, log_task_start, log_warning};

use crate::docking::aggregate::{parse_predictions, pocket_centers, render_center_table, RankedCenter};
use crate::docking::context::RunContext;
use crate::docking::error::{PipelineError, StageResult};
use crate::docking::matcher::{IdentityIndex, Resolution};
use crate::docking::partition::{partition_files, scan_dir};
use crate::docking::tools::Tool;
use crate::docking::types::{Provenance, Stage, StageOutput};
use crate::docking::{mark_complete, settle, summarize};
use crate::workflow_utils::{
    dispatch, log_report, publish, run_tool, sort_reports, write_atomic, DispatchConfig, Outcome,
    OutcomeCounts, TaskContext, ToolInvocation, WorkItem, WorkerKind,
};

const STAGE: Stage = Stage::SiteDetection;

/// Pockets kept per protein, in predictor rank order
pub const TOP_POCKETS: usize = 3;

/// Centers found for one protein, with the pocket structures written for them
#[derive(Debug)]
pub struct SiteResult {
    pub centers: Vec<RankedCenter>,
    pub pocket_files: Vec<PathBuf>,
}

async fn predict_sites(ctx: &RunContext, item: &WorkItem<PathBuf>) -> Result<Outcome<SiteResult>> {
    let scratch = ctx.scratch.item_dir(&item.key)?;
    let pdb_name = item
        .payload
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.pdb", item.key));
    let predictions_csv = scratch.join(format!("{}_predictions.csv", pdb_name));

    let mut out_dir = scratch.path().as_os_str().to_owned();
    out_dir.push("/");
    let prank = ToolInvocation::new(ctx.tools.path(Tool::Prank)?)
        .arg("predict")
        .arg("-f")
        .arg(&item.payload)
        .arg("-o")
        .arg(out_dir)
        .expect_output(&predictions_csv);
    if let Err(outcome) = run_tool(&prank).await.into_result() {
        return Ok(outcome);
    }

    let csv = tokio::fs::read_to_string(&predictions_csv)
        .await
        .with_context(|| format!("failed to read {}", predictions_csv.display()))?;
    let predictions = match parse_predictions(&csv, TOP_POCKETS) {
        Ok(p) if p.is_empty() => return Ok(Outcome::Skipped("no pockets predicted".to_string())),
        Ok(p) => p,
        Err(malformed) => {
            return Ok(Outcome::Failed(format!(
                "unreadable predictions {}: {}",
                predictions_csv.display(),
                malformed
            )))
        }
    };

    let pdb_text = tokio::fs::read_to_string(&item.payload)
        .await
        .with_context(|| format!("failed to read {}", item.payload.display()))?;
    let found = pocket_centers(&item.key, &predictions, &pdb_text);
    if found.is_empty() {
        return Ok(Outcome::Skipped(
            "no ATOM records for the predicted pocket residues".to_string(),
        ));
    }

    let result = write_pocket_files(scratch.path(), &ctx.layout.sites_dir, found).await?;
    Ok(Outcome::Success(result))
}

/// Write each pocket's atoms to scratch, then move them all into `dest`
///
/// If a move fails, the files already moved into `dest` are removed.
async fn write_pocket_files(
    scratch: &Path,
    dest: &Path,
    found: Vec<(RankedCenter, Vec<String>)>,
) -> Result<SiteResult> {
    let mut staged = Vec::with_capacity(found.len());
    let mut centers = Vec::with_capacity(found.len());
    for (center, lines) in found {
        let name = format!("{}.pdb", center.record.pocket);
        let path = scratch.join(&name);
        let mut body = lines.join("\n");
        body.push_str("\nEND\n");
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        staged.push((path, dest.join(name)));
        centers.push(center);
    }

    let mut pocket_files = Vec::with_capacity(staged.len());
    for (src, target) in staged {
        if let Err(e) = publish(&src, &target).await {
            for path in &pocket_files {
                let _ = tokio::fs::remove_file(path).await;
            }
            return Err(e);
        }
        pocket_files.push(target);
    }
    Ok(SiteResult {
        centers,
        pocket_files,
    })
}

/// Predict pockets for every repaired structure that has a prepared receptor
pub async fn detect_sites(ctx: &Arc<RunContext>) -> StageResult<StageOutput> {
    let started = Instant::now();
    let layout = &ctx.layout;

    let receptors = scan_dir(&layout.receptor_dir, &["pdbqt"])
        .map_err(|e| PipelineError::io(STAGE, &layout.receptor_dir, e))?;
    let mut receptor_index = IdentityIndex::new();
    for item in partition_files(receptors).items {
        receptor_index.insert(item.key, item.payload);
    }

    let structures = scan_dir(&layout.fixed_dir, &["pdb"])
        .map_err(|e| PipelineError::io(STAGE, &layout.fixed_dir, e))?;
    let partition = partition_files(structures).ensure_nonempty(
        STAGE,
        &layout.fixed_dir,
        "repaired structures",
    )?;
    log_found!(partition.len(), "repaired structures");

    tokio::fs::create_dir_all(&layout.sites_dir)
        .await
        .map_err(|e| PipelineError::io(STAGE, &layout.sites_dir, e))?;

    let dispatch_config = DispatchConfig::new(WorkerKind::Blocking, ctx.config.cpu)
        .with_timeout(ctx.config.timeouts.site);
    log_parallel_start!(partition.len(), "pocket predictions", dispatch_config.limit);

    let exec_ctx = ctx.clone();
    let receptor_index = Arc::new(receptor_index);
    let mut reports = dispatch(
        STAGE.phase(),
        partition.items,
        &dispatch_config,
        move |item, task: TaskContext| {
            let ctx = exec_ctx.clone();
            let receptors = receptor_index.clone();
            async move {
                log_task_start!(
                    task.phase,
                    format!("site_{}", item.key),
                    format!("Predicting pockets for {}", item.key),
                    task.total_tasks
                );
                match receptors.resolve(&item) {
                    Resolution::Unmatched => {
                        Outcome::Skipped("no prepared receptor for this protein".to_string())
                    }
                    Resolution::Matched(_) => settle(predict_sites(&ctx, &item).await),
                }
            }
        },
        |report| {
            log_report("site", report, |r: &SiteResult| {
                format!("{} pockets", r.centers.len())
            })
        },
    )
    .await;
    sort_reports(&mut reports);
    let counts = OutcomeCounts::from_reports(&reports);

    let mut rows = Vec::new();
    let mut intermediates = Vec::new();
    for report in reports {
        if let Outcome::Success(result) = report.outcome {
            rows.extend(result.centers);
            intermediates.extend(result.pocket_files);
        }
    }

    let table = render_center_table(&mut rows);
    write_atomic(&layout.center_table, table.as_bytes())
        .map_err(|e| PipelineError::from_anyhow(STAGE, &layout.center_table, e))?;
    log_file_saved!(layout.center_table.display());

    // Pocket structures are only needed until the table is on disk
    for path in &intermediates {
        if let Err(e) = std::fs::remove_file(path) {
            log_warning!("could not remove {}: {}", path.display(), e);
        }
    }

    summarize(STAGE, &counts);
    mark_complete(STAGE, &layout.sites_dir, rows.len(), counts, &layout.center_table)?;

    Ok(StageOutput {
        stage: STAGE,
        dir: layout.sites_dir.clone(),
        table: Some(layout.center_table.clone()),
        records: rows.len(),
        counts,
        elapsed: started.elapsed(),
        provenance: Provenance::Produced,
    })
}
