//! End-to-end pipeline runs with fake external tools
//!
//! The fake tools are shell scripts, so these tests only run on unix.

#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use dockflow::docking::phase5_rescoring::COMBINED_SCORES;
use dockflow::docking::{run_pipeline, DockTool, Mode, PipelineError, Stage};
use dockflow::workflow_utils::SCRATCH_PREFIX;

use super::common::*;

fn custom_project() -> Project {
    let project = Project::new();
    project.write("ligands.txt", "l1 CCO\nl2 invalid_smiles\n");
    project.write("proteins/proteinA.pdb", &protein_pdb());
    project
}

/// A prebuilt database with one receptor per name and one pocket each
fn prebuilt_project(receptors: &[&str], with_table: bool) -> Project {
    let project = Project::new();
    project.write("ligands.txt", "l1 CCO\n");
    let mut table = String::from("PDB_File,X,Y,Z\n");
    for (i, name) in receptors.iter().enumerate() {
        project.write(&format!("db/{}.pdbqt", name), "REMARK receptor\n");
        table.push_str(&format!("pocket_0.9_{},{}.0,1.0,1.0\n", name, i));
    }
    if with_table {
        project.write("db/db_docking-center.txt", &table);
    }
    project
}

fn lines(path: &Path) -> Vec<String> {
    read(path).lines().map(str::to_string).collect()
}

// ============================================================================
// Custom mode
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_custom_mode_runs_every_stage() {
    let project = custom_project();
    let config = project.config(
        project.path().join("ligands.txt"),
        project.path().join("proteins"),
        Mode::Custom,
    );
    let out = config.out_dir.clone();

    let report = run_pipeline(config).await.unwrap();
    let ran: Vec<Stage> = report.stages.iter().map(|s| s.stage).collect();
    assert_eq!(
        ran,
        vec![
            Stage::LigandPrep,
            Stage::ProteinPrep,
            Stage::SiteDetection,
            Stage::Docking,
            Stage::Rescoring
        ]
    );

    // The unparseable SMILES fails alone
    let ligands = report.stage(Stage::LigandPrep).unwrap();
    assert_eq!(ligands.counts.succeeded, 1);
    assert_eq!(ligands.counts.failed, 1);
    assert_eq!(
        entries_with_prefix(&out.join("ligands_pdbqt"), "ligand_"),
        vec!["ligand_l1.pdbqt"]
    );

    assert_eq!(
        read(&out.join("proteins_pocket/proteins_docking-center.txt")),
        "PDB_File,X,Y,Z\n\
         pocket_0.9_proteinA,2.000,3.000,4.000\n\
         pocket_0.7_proteinA,10.000,10.000,10.000\n\
         pocket_0.5_proteinA,-1.500,0.250,7.125\n"
    );
    assert!(entries_with_prefix(&out.join("proteins_pocket"), "pocket_").is_empty());

    let docking_dir = report.docking_dir().unwrap();
    assert_eq!(docking_dir.to_path_buf(), out.join("idock_proteins_ligands"));
    assert_eq!(
        entries_with_prefix(&docking_dir.join("poses"), "pocket_"),
        vec![
            "pocket_0.5_proteinA_ligand_l1.pdbqt",
            "pocket_0.7_proteinA_ligand_l1.pdbqt",
            "pocket_0.9_proteinA_ligand_l1.pdbqt",
        ]
    );
    let log = lines(&docking_dir.join("docking_log.txt"));
    assert_eq!(log.len(), 2);
    assert_eq!(log[0], "Protein Name,Time (s),Status");
    assert!(log[1].starts_with("proteinA,"));
    assert!(log[1].ends_with(",Success"));

    let scores = report.scores().unwrap();
    assert_eq!(scores.to_path_buf(), out.join("idock_SFCT").join(COMBINED_SCORES));
    let combined = lines(scores);
    assert_eq!(combined.len(), 7);
    assert_eq!(combined[0], "POSE,MODEL,idock_score,sfct_score,idock_sfct_combined");
    assert!(combined.contains(&"pocket_0.9_proteinA_ligand_l1,MODEL_1,-7,-5,-6".to_string()));
    assert!(combined.contains(&"pocket_0.9_proteinA_ligand_l1,MODEL_2,-6,-5,-5.5".to_string()));

    assert!(entries_with_prefix(&out, SCRATCH_PREFIX).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rerun_produces_identical_tables() {
    let project = custom_project();
    let mut outputs = Vec::new();
    for run in ["run1", "run2"] {
        let mut config = project.config(
            project.path().join("ligands.txt"),
            project.path().join("proteins"),
            Mode::Custom,
        );
        config.out_dir = project.path().join(run);
        let report = run_pipeline(config).await.unwrap();

        let sites = report.stage(Stage::SiteDetection).unwrap();
        let table = std::fs::read(sites.table.as_ref().unwrap()).unwrap();
        let scores = std::fs::read(report.scores().unwrap()).unwrap();
        outputs.push((table, scores));
    }
    assert_eq!(outputs[0], outputs[1]);
}

// ============================================================================
// Prebuilt mode
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_prebuilt_timeout_is_isolated() {
    let mut receptors: Vec<String> = (1..=9).map(|i| format!("r{:02}", i)).collect();
    receptors.push("slow".to_string());
    let names: Vec<&str> = receptors.iter().map(String::as_str).collect();
    let project = prebuilt_project(&names, true);

    let mut config = project.config(
        project.path().join("ligands.txt"),
        project.path().join("db"),
        Mode::Prebuilt,
    );
    config.timeouts.docking = Duration::from_secs(2);

    let report = run_pipeline(config).await.unwrap();

    let protein = report.stage(Stage::ProteinPrep).unwrap();
    assert_eq!(protein.records, 10);

    let docking = report.stage(Stage::Docking).unwrap();
    assert_eq!(docking.counts.succeeded, 9);
    assert_eq!(docking.counts.timed_out, 1);
    assert_eq!(docking.records, 9);

    let log = lines(&report.docking_dir().unwrap().join("docking_log.txt"));
    assert_eq!(log.len(), 11);
    assert_eq!(log.iter().filter(|l| l.ends_with(",Success")).count(), 9);
    let slow = log.iter().find(|l| l.starts_with("slow,")).unwrap();
    assert!(slow.ends_with(",Failed"));

    assert_eq!(report.stage(Stage::Rescoring).unwrap().records, 18);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_prebuilt_receptor_without_pocket_is_no_match() {
    let project = prebuilt_project(&["r01"], true);
    project.write("db/r02.pdbqt", "REMARK receptor\n");

    let config = project.config(
        project.path().join("ligands.txt"),
        project.path().join("db"),
        Mode::Prebuilt,
    );
    let report = run_pipeline(config).await.unwrap();

    let docking = report.stage(Stage::Docking).unwrap();
    assert_eq!(docking.counts.succeeded, 1);
    assert_eq!(docking.counts.skipped, 1);

    let log = lines(&report.docking_dir().unwrap().join("docking_log.txt"));
    assert!(log.iter().any(|l| l.starts_with("r02,") && l.ends_with(",No Match")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_prebuilt_without_center_table_halts_before_docking() {
    let project = prebuilt_project(&["r01", "r02"], false);
    let config = project.config(
        project.path().join("ligands.txt"),
        project.path().join("db"),
        Mode::Prebuilt,
    );
    let out = config.out_dir.clone();

    let err = run_pipeline(config).await.unwrap_err();
    assert_eq!(err.stage(), Stage::SiteDetection);
    assert!(matches!(err, PipelineError::MissingArtifact { .. }));

    assert!(out.join("ligands_pdbqt/ligand_l1.pdbqt").exists());
    assert!(entries_with_prefix(&out, "idock_").is_empty());
    assert!(entries_with_prefix(&out, SCRATCH_PREFIX).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_prebuilt_with_vina() {
    let project = prebuilt_project(&["r01"], true);
    let mut config = project.config(
        project.path().join("ligands.txt"),
        project.path().join("db"),
        Mode::Prebuilt,
    );
    config.dock_tool = DockTool::Vina;

    let report = run_pipeline(config).await.unwrap();
    let poses = report.docking_dir().unwrap().join("poses");
    assert_eq!(
        entries_with_prefix(&poses, "pocket_"),
        vec![
            "pocket_0.9_r01_ligand_l1.pdbqt",
            "pocket_0.9_r01_ligand_l1_docking.log",
        ]
    );

    let combined = lines(report.scores().unwrap());
    assert_eq!(
        combined,
        vec![
            "POSE,MODEL,vina_score,sfct_score,vina_sfct_combined".to_string(),
            "pocket_0.9_r01_ligand_l1,MODEL_1,-8,-5,-6.5".to_string(),
        ]
    );
}

// ============================================================================
// Tool resolution
// ============================================================================

#[tokio::test]
async fn test_missing_tool_fails_validation() {
    let project = custom_project();
    let mut config = project.config(
        project.path().join("ligands.txt"),
        project.path().join("proteins"),
        Mode::Custom,
    );
    let tools = project.write("tools.yaml", "obabel: /nonexistent/obabel\n");
    config.tools_config = Some(tools);

    let err = run_pipeline(config).await.unwrap_err();
    assert_eq!(err.stage(), Stage::Validate);
    assert!(matches!(err, PipelineError::MissingTool { .. }));
}
