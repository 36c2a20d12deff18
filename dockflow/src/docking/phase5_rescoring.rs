//! Phase 5: SFCT rescoring and score fusion

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dockflow_sdk::{log_file_saved, log_found, log_info, log_parallel_start, log_task_start, log_warning};

use crate::docking::aggregate::{
    fuse_scores, parse_primary_scores, parse_sfct_dat, render_combined_scores, render_pose_scores,
};
use crate::docking::context::RunContext;
use crate::docking::error::{PipelineError, StageResult};
use crate::docking::identity::key_of;
use crate::docking::matcher::{resolve_pose_owner, IdentityIndex, PoseManifest};
use crate::docking::partition::{partition_files, scan_dir};
use crate::docking::tools::Tool;
use crate::docking::types::{Provenance, ScoreRow, Stage, StageOutput};
use crate::docking::{mark_complete, settle, summarize};
use crate::workflow_utils::{
    dispatch, log_report, run_tool, sort_reports, write_atomic, DispatchConfig, Outcome,
    OutcomeCounts, TaskContext, ToolInvocation, WorkItem, WorkerKind,
};

const STAGE: Stage = Stage::Rescoring;

pub const COMBINED_SCORES: &str = "combined_scores.csv";

/// One pose and the receptor it was docked into, when known
#[derive(Debug, Clone)]
pub struct RescoreTarget {
    pub pose: PathBuf,
    pub receptor: Option<PathBuf>,
}

/// Pose work items from the manifest, falling back to file-name matching
fn pose_items(ctx: &RunContext) -> StageResult<Vec<WorkItem<RescoreTarget>>> {
    let layout = &ctx.layout;
    let manifest = PoseManifest::load(&layout.docking_dir)
        .map_err(|e| PipelineError::from_anyhow(STAGE, &layout.docking_dir, e))?;

    if let Some(manifest) = manifest {
        return Ok(manifest
            .poses
            .into_iter()
            .map(|pose| {
                WorkItem::new(key_of(&pose.path), RescoreTarget {
                    pose: pose.path,
                    receptor: Some(pose.receptor),
                })
                .with_group(pose.protein_key)
            })
            .collect());
    }

    log_info!("No pose manifest, matching poses to receptors by name");
    let receptors = scan_dir(&layout.receptor_dir, &["pdbqt"])
        .map_err(|e| PipelineError::io(STAGE, &layout.receptor_dir, e))?;
    let mut index = IdentityIndex::new();
    for item in partition_files(receptors).items {
        index.insert(item.key, item.payload);
    }

    let poses = scan_dir(&layout.poses_dir, &["pdbqt"])
        .map_err(|e| PipelineError::io(STAGE, &layout.poses_dir, e))?;
    Ok(poses
        .into_iter()
        .map(|pose| {
            let owner = resolve_pose_owner(&index, &pose);
            let receptor = owner.and_then(|key| index.get(key).first().cloned());
            let item = WorkItem::new(key_of(&pose), RescoreTarget { pose, receptor });
            match owner {
                Some(key) => item.with_group(key),
                None => item,
            }
        })
        .collect())
}

/// Fused score rows for one pose and the CSV they were written to
#[derive(Debug)]
pub struct PoseScores {
    pub rows: Vec<ScoreRow>,
    pub table: PathBuf,
}

async fn score_pose(
    ctx: &RunContext,
    item: &WorkItem<RescoreTarget>,
    receptor: &Path,
) -> Result<Outcome<PoseScores>> {
    let scratch = ctx.scratch.item_dir(&item.key)?;
    let dat = scratch.join(format!("{}.dat", item.key));

    let scorer = ToolInvocation::new(ctx.tools.path(Tool::Python3)?)
        .arg(ctx.tools.path(Tool::SfctScorer)?)
        .arg("-r")
        .arg(receptor)
        .arg("-l")
        .arg(&item.payload.pose)
        .args(["--stype", "general", "--model"])
        .arg(ctx.tools.path(Tool::SfctModel)?)
        .arg("-o")
        .arg(&dat)
        .expect_output(&dat);
    if let Err(outcome) = run_tool(&scorer).await.into_result() {
        return Ok(outcome);
    }

    let pose_text = tokio::fs::read_to_string(&item.payload.pose)
        .await
        .with_context(|| format!("failed to read {}", item.payload.pose.display()))?;
    let dat_text = tokio::fs::read_to_string(&dat)
        .await
        .with_context(|| format!("failed to read {}", dat.display()))?;

    let engine = ctx.config.dock_tool;
    let primary = parse_primary_scores(engine, &pose_text);
    let secondary = parse_sfct_dat(&dat_text);
    for malformed in primary.malformed.iter().chain(&secondary.malformed) {
        log_warning!("{}: skipping {}", item.key, malformed);
    }
    if primary.scores.len() != secondary.scores.len() {
        log_warning!(
            "{}: {} {} scores but {} SFCT scores, unpaired models are dropped",
            item.key,
            primary.scores.len(),
            engine,
            secondary.scores.len()
        );
    }

    let rows = fuse_scores(&primary.scores, &secondary.scores);
    if rows.is_empty() {
        return Ok(Outcome::Failed(
            "no model has both a docking and an SFCT score".to_string(),
        ));
    }

    let table = ctx.layout.rescoring_dir.join(format!("{}.csv", item.key));
    write_atomic(&table, render_pose_scores(engine, &rows).as_bytes())?;
    Ok(Outcome::Success(PoseScores { rows, table }))
}

/// Rescore every docking pose and write the combined score table
pub async fn rescore(ctx: &Arc<RunContext>) -> StageResult<StageOutput> {
    let started = Instant::now();
    let layout = &ctx.layout;

    let items = pose_items(ctx)?;
    if items.is_empty() {
        return Err(PipelineError::empty(STAGE, &layout.poses_dir, "no docking poses"));
    }
    log_found!(items.len(), "docking poses");

    tokio::fs::create_dir_all(&layout.rescoring_dir)
        .await
        .map_err(|e| PipelineError::io(STAGE, &layout.rescoring_dir, e))?;

    let dispatch_config = DispatchConfig::new(WorkerKind::Blocking, ctx.config.cpu)
        .with_timeout(ctx.config.timeouts.rescoring);
    log_parallel_start!(items.len(), "poses to rescore", dispatch_config.limit);

    let exec_ctx = ctx.clone();
    let mut reports = dispatch(
        STAGE.phase(),
        items,
        &dispatch_config,
        move |item: WorkItem<RescoreTarget>, task: TaskContext| {
            let ctx = exec_ctx.clone();
            async move {
                log_task_start!(
                    task.phase,
                    format!("rescore_{}", item.key),
                    format!("Rescoring {}", item.key),
                    task.total_tasks
                );
                match item.payload.receptor.clone() {
                    Some(receptor) => settle(score_pose(&ctx, &item, &receptor).await),
                    None => Outcome::Skipped("no receptor matches this pose".to_string()),
                }
            }
        },
        |report| {
            log_report("rescore", report, |s: &PoseScores| {
                format!("{} models", s.rows.len())
            })
        },
    )
    .await;
    sort_reports(&mut reports);
    let counts = OutcomeCounts::from_reports(&reports);

    let scored: BTreeMap<String, Vec<ScoreRow>> = reports
        .into_iter()
        .filter_map(|r| match r.outcome {
            Outcome::Success(scores) => Some((r.key, scores.rows)),
            _ => None,
        })
        .collect();
    let records: usize = scored.values().map(Vec::len).sum();

    let combined = layout.rescoring_dir.join(COMBINED_SCORES);
    write_atomic(
        &combined,
        render_combined_scores(ctx.config.dock_tool, &scored).as_bytes(),
    )
    .map_err(|e| PipelineError::from_anyhow(STAGE, &combined, e))?;
    log_file_saved!(combined.display());

    summarize(STAGE, &counts);
    mark_complete(STAGE, &layout.rescoring_dir, records, counts, &combined)?;

    Ok(StageOutput {
        stage: STAGE,
        dir: layout.rescoring_dir.clone(),
        table: Some(combined),
        records,
        counts,
        elapsed: started.elapsed(),
        provenance: Provenance::Produced,
    })
}
