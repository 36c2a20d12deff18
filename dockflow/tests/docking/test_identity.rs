//! Tests for identity keys shared by all stages

use std::path::Path;

use dockflow::docking::identity::{key_of, normalize_key, pocket_names, PocketName};

// ============================================================================
// Stage file names
// ============================================================================

#[test]
fn test_every_stage_artifact_shares_one_key() {
    let artifacts = [
        "/in/proteins/1abc.pdb",
        "/out/proteins_fixed/out-1abc.pdb",
        "/out/proteins_pdbqt/out-1abc.pdbqt",
        "/db/1abc_fixed.pdbqt",
    ];
    for path in artifacts {
        assert_eq!(key_of(Path::new(path)), "1abc", "{}", path);
    }
}

#[test]
fn test_whitespace_before_extension_matches_table_key() {
    let pocket = PocketName::new("0.9", "proteinA .pdb");
    assert_eq!(pocket.to_string(), "pocket_0.9_proteinA");
    assert_eq!(key_of(Path::new("out-proteinA .pdbqt")), pocket.protein_key);
}

#[test]
fn test_distinct_proteins_keep_distinct_keys() {
    let a = key_of(Path::new("out-1abc.pdbqt"));
    let b = key_of(Path::new("out-1abc_B.pdbqt"));
    assert_ne!(a, b);
    assert_eq!(b, "1abc_B");
}

#[test]
fn test_ligand_keys_survive_each_conversion() {
    for name in ["ligand_l1.mol2", "ligand_l1.pdbqt", "/tmp/x/ligand_l1.pdbqt"] {
        assert_eq!(key_of(Path::new(name)), "ligand_l1");
    }
}

// ============================================================================
// Pocket names
// ============================================================================

#[test]
fn test_pocket_name_carries_protein_key() {
    let pocket = PocketName::new("0.9", "out-1abc.pdbqt");
    assert_eq!(pocket.protein_key, "1abc");

    let pose_stem = format!("{}_{}", pocket, "ligand_l1");
    assert_eq!(pose_stem, "pocket_0.9_1abc_ligand_l1");
}

#[test]
fn test_pocket_names_are_unique_per_protein() {
    let scores: Vec<String> = ["3.1", "3.1", "3.1", "2.0"].iter().map(|s| s.to_string()).collect();
    let names = pocket_names("p1", &scores);
    let mut rendered: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    assert_eq!(rendered[0], "pocket_3.1_p1");
    assert_eq!(rendered[3], "pocket_2.0_p1");

    rendered.sort();
    rendered.dedup();
    assert_eq!(rendered.len(), 4);
}

#[test]
fn test_parse_rejects_names_without_protein() {
    assert_eq!(PocketName::parse("pocket__1abc"), None);
    assert_eq!(PocketName::parse("pocket_0.9_.pdb"), None);
    assert_eq!(PocketName::parse("site_0.9_1abc"), None);
}

#[test]
fn test_normalized_keys_are_stable() {
    let samples = ["out-1abc.pdbqt", "1abc_fixed", "pocket_0.5_1abc.pdb", "a.b.c"];
    for sample in samples {
        let key = normalize_key(sample);
        assert_eq!(key_of(Path::new(&key)), key);
    }
}
