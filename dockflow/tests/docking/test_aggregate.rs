//! Tests for consolidated tables and score fusion

use rand::seq::SliceRandom;
use std::collections::BTreeMap;

use dockflow::docking::aggregate::*;
use dockflow::docking::identity::PocketName;
use dockflow::docking::matcher::parse_center_table;
use dockflow::docking::types::{CenterRecord, DockTool};

use super::common::*;

fn ranked(protein: &str, score: &str, rank: usize, center: [f64; 3]) -> RankedCenter {
    RankedCenter {
        rank,
        record: CenterRecord {
            pocket: PocketName::new(score, protein),
            center,
        },
    }
}

// ============================================================================
// Center table
// ============================================================================

#[test]
fn test_center_table_independent_of_completion_order() {
    let rows = vec![
        ranked("1abc", "0.9", 1, [1.0, 2.0, 3.0]),
        ranked("1abc", "0.2", 2, [4.0, 5.0, 6.0]),
        ranked("1abc", "0.1", 3, [7.0, 8.0, 9.0]),
        ranked("2xyz", "5.5", 1, [-1.0, -2.0, -3.0]),
        ranked("3qqq", "0.7", 1, [0.125, 0.5, 0.0]),
    ];
    let expected = render_center_table(&mut rows.clone());

    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let mut shuffled = rows.clone();
        shuffled.shuffle(&mut rng);
        assert_eq!(render_center_table(&mut shuffled), expected);
    }

    let lines: Vec<&str> = expected.lines().collect();
    assert_eq!(lines[0], "PDB_File,X,Y,Z");
    assert_eq!(lines[1], "pocket_0.9_1abc,1.000,2.000,3.000");
    assert_eq!(lines[3], "pocket_0.1_1abc,7.000,8.000,9.000");
    assert_eq!(lines[5], "pocket_0.7_3qqq,0.125,0.500,0.000");
}

#[test]
fn test_rendered_table_reads_back() {
    let mut rows = vec![
        ranked("p1", "0.9", 1, [2.0, 3.0, 4.0]),
        ranked("p1", "0.5", 2, [-1.5, 0.25, 7.125]),
    ];
    let text = render_center_table(&mut rows);
    let table = parse_center_table(&text).unwrap();

    assert!(table.malformed.is_empty());
    let parsed: Vec<CenterRecord> = table.records;
    let original: Vec<CenterRecord> = rows.into_iter().map(|r| r.record).collect();
    assert_eq!(parsed, original);
}

#[test]
fn test_pocket_centers_from_predictions() {
    let csv = "name,rank,score,residue_ids\n\
               pocket1,1,0.9,A_1 A_2\n\
               pocket2,2,0.7,A_3\n\
               pocket3,3,0.5,A_4\n\
               pocket4,4,0.1,A_1\n";
    let predictions = parse_predictions(csv, 3).unwrap();
    assert_eq!(predictions.len(), 3);

    let found = pocket_centers("proteinA", &predictions, &protein_pdb());
    let centers: Vec<(String, [f64; 3])> = found
        .iter()
        .map(|(c, _)| (c.record.pocket.to_string(), c.record.center))
        .collect();
    assert_eq!(
        centers,
        vec![
            ("pocket_0.9_proteinA".to_string(), [2.0, 3.0, 4.0]),
            ("pocket_0.7_proteinA".to_string(), [10.0, 10.0, 10.0]),
            ("pocket_0.5_proteinA".to_string(), [-1.5, 0.25, 7.125]),
        ]
    );
    // Only ATOM lines of the pocket's residues are kept
    assert_eq!(found[0].1.len(), 2);
    assert!(found.iter().all(|(_, lines)| lines.iter().all(|l| l.starts_with("ATOM"))));
}

#[test]
fn test_pocket_without_atoms_is_dropped() {
    let csv = "score,residue_ids\n0.9,B_99\n0.8,A_3\n";
    let predictions = parse_predictions(csv, 3).unwrap();
    let found = pocket_centers("p", &predictions, &protein_pdb());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0.rank, 2);
}

#[test]
fn test_predictions_need_named_columns() {
    assert!(parse_predictions("name,rank\npocket1,1\n", 3).is_err());
    assert!(parse_predictions("", 3).is_err());
}

// ============================================================================
// Score fusion
// ============================================================================

#[test]
fn test_idock_pose_scores_pair_with_sfct() {
    let pose = "MODEL        1\n\
                REMARK     NORMALIZED FREE ENERGY PREDICTED BY IDOCK:  -7.000 KCAL/MOL\n\
                ENDMDL\n\
                MODEL        2\n\
                REMARK     NORMALIZED FREE ENERGY PREDICTED BY IDOCK:  -6.500 KCAL/MOL\n\
                ENDMDL\n";
    let dat = "#code pose docking rmsd sfct\nx 1 0 0 -5.000\nx 2 0 0 -4.500\n";

    let primary = parse_primary_scores(DockTool::Idock, pose);
    let secondary = parse_sfct_dat(dat);
    let rows = fuse_scores(&primary.scores, &secondary.scores);

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].combined, -6.0);
    assert_eq!(rows[1].combined, -5.5);
    assert_eq!(
        render_pose_scores(DockTool::Idock, &rows),
        "MODEL,idock_score,sfct_score,idock_sfct_combined\n\
         MODEL_1,-7,-5,-6\n\
         MODEL_2,-6.5,-4.5,-5.5\n"
    );
}

#[test]
fn test_unpaired_models_are_excluded() {
    let pose = "REMARK VINA RESULT:    -9.1      0.000      0.000\n\
                REMARK VINA RESULT:    -8.4      1.200      2.000\n\
                REMARK VINA RESULT:    -7.9      1.500      2.500\n";
    let dat = "header\nx 1 0 0 -6.0\nx 2 0 0 broken\n";

    let primary = parse_vina_scores(pose);
    let secondary = parse_sfct_dat(dat);
    assert_eq!(primary.scores.len(), 3);
    assert_eq!(secondary.scores, vec![-6.0]);
    assert_eq!(secondary.malformed.len(), 1);

    let rows = fuse_scores(&primary.scores, &secondary.scores);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].model, 1);
    assert_eq!(rows[0].primary, -9.1);
}

#[test]
fn test_combined_scores_sorted_by_pose_then_model() {
    let mut poses = BTreeMap::new();
    let mut b_rows = fuse_scores(&[-6.0, -5.0], &[-4.0, -3.0]);
    b_rows.reverse();
    poses.insert("pocket_0.9_b_ligand_l1".to_string(), b_rows);
    poses.insert("pocket_0.9_a_ligand_l1".to_string(), fuse_scores(&[-8.0], &[-2.0]));

    let text = render_combined_scores(DockTool::Vina, &poses);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "POSE,MODEL,vina_score,sfct_score,vina_sfct_combined");
    assert_eq!(lines[1], "pocket_0.9_a_ligand_l1,MODEL_1,-8,-2,-5");
    assert_eq!(lines[2], "pocket_0.9_b_ligand_l1,MODEL_1,-6,-4,-5");
    assert_eq!(lines[3], "pocket_0.9_b_ligand_l1,MODEL_2,-5,-3,-4");
}
