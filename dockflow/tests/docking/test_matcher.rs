//! Tests for partitioning stage inputs and matching them across stages

use std::path::{Path, PathBuf};

use dockflow::docking::matcher::{
    load_center_table, parse_center_table, resolve_pose_owner, IdentityIndex, Resolution,
};
use dockflow::docking::partition::{collect_inputs, partition_files, partition_ligands, scan_dir};
use dockflow::docking::{PipelineError, Stage};

use super::common::*;

// ============================================================================
// Partitioning
// ============================================================================

#[test]
fn test_ligand_file_with_comments_and_bad_lines() {
    let text = "# library v2\nl1 CCO\nl2\n\nl3 c1ccccc1\n";
    let partition = partition_ligands(text);

    let keys: Vec<&str> = partition.items.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, vec!["ligand_l1", "ligand_l3"]);
    assert_eq!(partition.excluded.len(), 1);
    assert_eq!(partition.excluded[0].line_no, 3);
    assert!(partition.duplicates.is_empty());
}

#[test]
fn test_receptor_directory_partition_is_sorted() {
    let project = Project::new();
    for name in ["out-b.pdbqt", "out-a.pdbqt", "a.pdbqt", "notes.txt"] {
        project.write(&format!("db/{}", name), "REMARK\n");
    }
    let files = scan_dir(&project.path().join("db"), &["pdbqt"]).unwrap();
    assert_eq!(files.len(), 3);

    let partition = partition_files(files);
    let keys: Vec<&str> = partition.items.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, vec!["a", "b"]);
    assert_eq!(partition.duplicates, vec!["a".to_string()]);
}

#[test]
fn test_single_file_input() {
    let project = Project::new();
    let pdb = project.write("p/1abc.pdb", &protein_pdb());

    let files = collect_inputs(Stage::ProteinPrep, &pdb, &["pdb"]).unwrap();
    assert_eq!(files, vec![pdb.clone()]);

    let wrong = project.write("p/1abc.cif", "data_1abc\n");
    let err = collect_inputs(Stage::ProteinPrep, &wrong, &["pdb"]).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput { .. }));
}

#[test]
fn test_empty_directory_is_fatal() {
    let project = Project::new();
    std::fs::create_dir_all(project.path().join("empty")).unwrap();
    let dir = project.path().join("empty");

    let files = collect_inputs(Stage::ProteinPrep, &dir, &["pdb"]).unwrap();
    let err = partition_files(files)
        .ensure_nonempty(Stage::ProteinPrep, &dir, "protein structures")
        .unwrap_err();
    assert_eq!(err.stage(), Stage::ProteinPrep);
    assert!(matches!(err, PipelineError::EmptyInput { .. }));
}

// ============================================================================
// Matching against a coordinate table
// ============================================================================

#[test]
fn test_receptors_resolve_against_center_table() {
    let project = Project::new();
    let table = project.write(
        "db/kinases_docking-center.txt",
        "PDB_File,X,Y,Z\n\
         pocket_0.9_1abc,1.0,2.0,3.0\n\
         pocket_0.4_1abc,4.0,5.0,6.0\n\
         pocket_0.8_2xyz,0.0,0.0,0.0\n",
    );
    for name in ["1abc.pdbqt", "2xyz.pdbqt", "3qqq.pdbqt"] {
        project.write(&format!("db/{}", name), "REMARK\n");
    }

    let centers = load_center_table(&table).unwrap().index();
    let receptors = partition_files(scan_dir(&project.path().join("db"), &["pdbqt"]).unwrap());

    let resolved: Vec<(String, usize)> = receptors
        .items
        .iter()
        .map(|item| {
            let n = match centers.resolve(item) {
                Resolution::Matched(records) => records.len(),
                Resolution::Unmatched => 0,
            };
            (item.key.clone(), n)
        })
        .collect();
    assert_eq!(
        resolved,
        vec![
            ("1abc".to_string(), 2),
            ("2xyz".to_string(), 1),
            ("3qqq".to_string(), 0)
        ]
    );
}

#[test]
fn test_table_header_tolerates_spaces() {
    let table = parse_center_table("PDB_File, X, Y, Z\npocket_1_a,1,1,1\n").unwrap();
    assert_eq!(table.records.len(), 1);
    assert!(table.malformed.is_empty());
}

#[test]
fn test_pose_owner_prefers_longest_receptor_key() {
    let mut receptors: IdentityIndex<PathBuf> = IdentityIndex::new();
    receptors.insert("1abc", PathBuf::from("out-1abc.pdbqt"));
    receptors.insert("1abc_B", PathBuf::from("out-1abc_B.pdbqt"));

    let poses = [
        ("poses/pocket_0.9_1abc_B_ligand_l1.pdbqt", Some("1abc_B")),
        ("poses/pocket_0.9_1abc_ligand_l1.pdbqt", Some("1abc")),
        ("poses/pocket_0.9r2_1abc_ligand_l7.pdbqt", Some("1abc")),
        ("poses/pocket_0.9_9zzz_ligand_l1.pdbqt", None),
    ];
    for (pose, owner) in poses {
        assert_eq!(resolve_pose_owner(&receptors, Path::new(pose)), owner, "{}", pose);
    }
}
