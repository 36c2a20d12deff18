//! Reducing per-item outcomes to a stage's consolidated tables
//!
//! Parsers here read external tool output with an explicit schema and return
//! malformed lines instead of guessing. Every table renderer sorts its rows,
//! so output is independent of the order in which items completed.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::docking::identity::PocketName;
use crate::docking::matcher::CENTER_TABLE_HEADER;
use crate::docking::types::{CenterRecord, DockTool, MalformedLine, ScoreRow};

/// One `ATOM` record of a PDB file
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub chain: String,
    pub residue: i32,
    pub coord: [f64; 3],
}

fn column<'a>(line: &'a str, start: usize, end: usize) -> Option<&'a str> {
    line.get(start..end.min(line.len())).map(str::trim)
}

/// Parse a fixed-column PDB `ATOM` line; other record types yield `Ok(None)`
pub fn parse_atom_line(line_no: usize, line: &str) -> Result<Option<Atom>, MalformedLine> {
    if !line.starts_with("ATOM") {
        return Ok(None);
    }
    let field = |start, end, what: &str| {
        column(line, start, end)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| MalformedLine::new(line_no, line, format!("missing {}", what)))
    };
    let number = |start, end, what: &str| -> Result<f64, MalformedLine> {
        field(start, end, what)?
            .parse()
            .map_err(|_| MalformedLine::new(line_no, line, format!("bad {}", what)))
    };

    let chain = column(line, 21, 22).unwrap_or("").to_string();
    let residue: i32 = field(22, 26, "residue number")?
        .parse()
        .map_err(|_| MalformedLine::new(line_no, line, "bad residue number"))?;
    let coord = [number(30, 38, "x")?, number(38, 46, "y")?, number(46, 54, "z")?];

    Ok(Some(Atom {
        chain,
        residue,
        coord,
    }))
}

/// All `ATOM` records of a structure plus the lines that could not be read
pub fn parse_atoms(pdb_text: &str) -> (Vec<Atom>, Vec<MalformedLine>) {
    let mut atoms = Vec::new();
    let mut malformed = Vec::new();
    for (idx, line) in pdb_text.lines().enumerate() {
        match parse_atom_line(idx + 1, line) {
            Ok(Some(atom)) => atoms.push(atom),
            Ok(None) => {}
            Err(e) => malformed.push(e),
        }
    }
    (atoms, malformed)
}

/// `ATOM` lines of `pdb_text` whose (chain, residue) is in `residues`
pub fn select_residue_lines(pdb_text: &str, residues: &[(String, i32)]) -> Vec<String> {
    pdb_text
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| match parse_atom_line(idx + 1, line) {
            Ok(Some(atom))
                if residues
                    .iter()
                    .any(|(c, r)| *c == atom.chain && *r == atom.residue) =>
            {
                Some(line.to_string())
            }
            _ => None,
        })
        .collect()
}

pub fn round3(v: f64) -> f64 {
    let r = (v * 1000.0).round() / 1000.0;
    // Avoid printing "-0.000"
    if r == 0.0 {
        0.0
    } else {
        r
    }
}

/// Arithmetic mean of `coords`, rounded to 3 decimals; `None` when empty
pub fn centroid(coords: &[[f64; 3]]) -> Option<[f64; 3]> {
    if coords.is_empty() {
        return None;
    }
    let n = coords.len() as f64;
    let mut sum = [0.0f64; 3];
    for c in coords {
        for axis in 0..3 {
            sum[axis] += c[axis];
        }
    }
    Some([round3(sum[0] / n), round3(sum[1] / n), round3(sum[2] / n)])
}

/// A pocket center together with the predictor rank it came from
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCenter {
    pub rank: usize,
    pub record: CenterRecord,
}

/// Render the coordinate table, ordered by protein key then predictor rank
pub fn render_center_table(rows: &mut [RankedCenter]) -> String {
    rows.sort_by(|a, b| {
        a.record
            .pocket
            .protein_key
            .cmp(&b.record.pocket.protein_key)
            .then(a.rank.cmp(&b.rank))
            .then_with(|| a.record.pocket.cmp(&b.record.pocket))
    });
    let mut out = String::new();
    let _ = writeln!(out, "{}", CENTER_TABLE_HEADER);
    for row in rows.iter() {
        let [x, y, z] = row.record.center;
        let _ = writeln!(out, "{},{:.3},{:.3},{:.3}", row.record.pocket, x, y, z);
    }
    out
}

/// Scores read from one tool output file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreColumn {
    pub scores: Vec<f64>,
    pub malformed: Vec<MalformedLine>,
}

const IDOCK_MARKER: &str = "NORMALIZED FREE ENERGY PREDICTED BY IDOCK:";
const VINA_MARKER: &str = "REMARK VINA RESULT";

/// idock pose file: one `NORMALIZED FREE ENERGY PREDICTED BY IDOCK: <v> KCAL/MOL` per model
pub fn parse_idock_scores(text: &str) -> ScoreColumn {
    let mut column = ScoreColumn::default();
    for (idx, line) in text.lines().enumerate() {
        let Some(pos) = line.find(IDOCK_MARKER) else {
            continue;
        };
        let value = line[pos + IDOCK_MARKER.len()..]
            .trim()
            .trim_end_matches("KCAL/MOL")
            .trim();
        match value.parse() {
            Ok(v) => column.scores.push(v),
            Err(_) => column
                .malformed
                .push(MalformedLine::new(idx + 1, line, "bad idock energy")),
        }
    }
    column
}

/// Vina pose file: `REMARK VINA RESULT: <affinity> <rmsd_lb> <rmsd_ub>` per model
pub fn parse_vina_scores(text: &str) -> ScoreColumn {
    let mut column = ScoreColumn::default();
    for (idx, line) in text.lines().enumerate() {
        if !line.contains(VINA_MARKER) {
            continue;
        }
        match line.split_whitespace().nth(3).map(str::parse::<f64>) {
            Some(Ok(v)) => column.scores.push(v),
            _ => column
                .malformed
                .push(MalformedLine::new(idx + 1, line, "bad vina affinity")),
        }
    }
    column
}

pub fn parse_primary_scores(engine: DockTool, text: &str) -> ScoreColumn {
    match engine {
        DockTool::Idock => parse_idock_scores(text),
        DockTool::Vina => parse_vina_scores(text),
    }
}

/// Rescoring `.dat`: a header line, then one row per model with the score in column 5
pub fn parse_sfct_dat(text: &str) -> ScoreColumn {
    let mut column = ScoreColumn::default();
    for (idx, line) in text.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        match line.split_whitespace().nth(4).map(str::parse::<f64>) {
            Some(Ok(v)) => column.scores.push(v),
            Some(Err(_)) => column
                .malformed
                .push(MalformedLine::new(idx + 1, line, "bad secondary score")),
            None => column
                .malformed
                .push(MalformedLine::new(idx + 1, line, "fewer than 5 columns")),
        }
    }
    column
}

/// Unweighted mean of the two scores
pub fn fuse(primary: f64, secondary: f64) -> f64 {
    (primary + secondary) * 0.5
}

/// Pair scores model by model; models missing either score are dropped
pub fn fuse_scores(primary: &[f64], secondary: &[f64]) -> Vec<ScoreRow> {
    primary
        .iter()
        .zip(secondary)
        .enumerate()
        .map(|(idx, (&p, &s))| ScoreRow {
            model: idx + 1,
            primary: p,
            secondary: s,
            combined: fuse(p, s),
        })
        .collect()
}

fn score_header(engine: DockTool) -> String {
    format!(
        "MODEL,{e}_score,sfct_score,{e}_sfct_combined",
        e = engine.name()
    )
}

/// Per-pose score table
pub fn render_pose_scores(engine: DockTool, rows: &[ScoreRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", score_header(engine));
    for row in rows {
        let _ = writeln!(
            out,
            "MODEL_{},{},{},{}",
            row.model, row.primary, row.secondary, row.combined
        );
    }
    out
}

/// All poses in one table, sorted by pose identity then model
pub fn render_combined_scores(engine: DockTool, poses: &BTreeMap<String, Vec<ScoreRow>>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "POSE,{}", score_header(engine));
    for (pose, rows) in poses {
        let mut rows: Vec<&ScoreRow> = rows.iter().collect();
        rows.sort_by_key(|r| r.model);
        for row in rows {
            let _ = writeln!(
                out,
                "{},MODEL_{},{},{},{}",
                pose, row.model, row.primary, row.secondary, row.combined
            );
        }
    }
    out
}

/// Parse `<chain>_<resnum>` residue tokens; tokens without a valid number are dropped
pub fn parse_residue_ids(field: &str) -> Vec<(String, i32)> {
    field
        .split_whitespace()
        .filter_map(|token| {
            let (chain, num) = token.split_once('_')?;
            Some((chain.to_string(), num.trim().parse().ok()?))
        })
        .collect()
}

/// One predicted pocket: rank (1-based), score string and residues
#[derive(Debug, Clone, PartialEq)]
pub struct PocketPrediction {
    pub rank: usize,
    pub score: String,
    pub residues: Vec<(String, i32)>,
}

/// Read a predictor CSV by header name and keep the first `top` rows
pub fn parse_predictions(text: &str, top: usize) -> Result<Vec<PocketPrediction>, MalformedLine> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines
        .next()
        .ok_or_else(|| MalformedLine::new(1, "", "empty predictions file"))?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let find = |name: &str| {
        columns
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| MalformedLine::new(1, header, format!("no `{}` column", name)))
    };
    let score_col = find("score")?;
    let residue_col = find("residue_ids")?;

    let mut pockets = Vec::new();
    for (idx, line) in lines.take(top) {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let (Some(score), Some(residues)) = (fields.get(score_col), fields.get(residue_col)) else {
            return Err(MalformedLine::new(idx + 1, line, "row shorter than header"));
        };
        pockets.push(PocketPrediction {
            rank: pockets.len() + 1,
            score: score.to_string(),
            residues: parse_residue_ids(residues),
        });
    }
    Ok(pockets)
}

/// Build the ranked center rows for one protein from its predicted pockets
pub fn pocket_centers(
    protein_key: &str,
    predictions: &[PocketPrediction],
    pdb_text: &str,
) -> Vec<(RankedCenter, Vec<String>)> {
    let scores: Vec<String> = predictions.iter().map(|p| p.score.clone()).collect();
    let names: Vec<PocketName> = crate::docking::identity::pocket_names(protein_key, &scores);

    predictions
        .iter()
        .zip(names)
        .filter_map(|(prediction, pocket)| {
            let lines = select_residue_lines(pdb_text, &prediction.residues);
            let coords: Vec<[f64; 3]> = lines
                .iter()
                .enumerate()
                .filter_map(|(i, l)| parse_atom_line(i + 1, l).ok().flatten())
                .map(|a| a.coord)
                .collect();
            let center = centroid(&coords)?;
            Some((
                RankedCenter {
                    rank: prediction.rank,
                    record: CenterRecord { pocket, center },
                },
                lines,
            ))
        })
        .collect()
}
