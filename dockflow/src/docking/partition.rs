//! Turning stage inputs into deduplicated, ordered work items

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::docking::error::{PipelineError, StageResult};
use crate::docking::identity::key_of;
use crate::docking::types::{LigandRecord, MalformedLine, Stage};
use crate::workflow_utils::WorkItem;

/// Work items for one stage plus what was dropped on the way
#[derive(Debug, Clone)]
pub struct Partition<T> {
    pub items: Vec<WorkItem<T>>,
    /// Records rejected by the parser
    pub excluded: Vec<MalformedLine>,
    /// Keys seen more than once; the first occurrence was kept
    pub duplicates: Vec<String>,
}

impl<T> Partition<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Zero items is fatal for the stage
    pub fn ensure_nonempty(self, stage: Stage, source: &Path, what: &str) -> StageResult<Self> {
        if self.items.is_empty() {
            return Err(PipelineError::empty(
                stage,
                source,
                format!(
                    "no {} found ({} malformed, {} duplicate)",
                    what,
                    self.excluded.len(),
                    self.duplicates.len()
                ),
            ));
        }
        Ok(self)
    }
}

/// Parse one `<seed_id> <SMILES>` line; blank lines and `#` comments yield `None`
pub fn parse_ligand_line(line_no: usize, line: &str) -> Result<Option<LigandRecord>, MalformedLine> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let mut fields = trimmed.split_whitespace();
    match (fields.next(), fields.next()) {
        (Some(seed), Some(smiles)) => Ok(Some(LigandRecord {
            seed: seed.to_string(),
            smiles: smiles.to_string(),
        })),
        _ => Err(MalformedLine::new(
            line_no,
            line,
            "expected `<seed_id> <SMILES>`",
        )),
    }
}

/// Partition a ligand list in file order, keeping the first record per seed
pub fn partition_ligands(text: &str) -> Partition<LigandRecord> {
    let mut seen = BTreeSet::new();
    let mut partition = Partition {
        items: Vec::new(),
        excluded: Vec::new(),
        duplicates: Vec::new(),
    };

    for (idx, line) in text.lines().enumerate() {
        match parse_ligand_line(idx + 1, line) {
            Ok(Some(record)) => {
                let key = format!("ligand_{}", record.seed);
                if seen.insert(key.clone()) {
                    partition.items.push(WorkItem::new(key, record));
                } else {
                    partition.duplicates.push(key);
                }
            }
            Ok(None) => {}
            Err(malformed) => partition.excluded.push(malformed),
        }
    }

    partition
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|e| {
            let e = e.to_string_lossy();
            extensions.iter().any(|x| x.eq_ignore_ascii_case(&e))
        })
        .unwrap_or(false)
}

/// Files under `dir` (non-recursive) with one of `extensions`, sorted by path
pub fn scan_dir(dir: &Path, extensions: &[&str]) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, extensions) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// `input` itself when it is a matching file, otherwise the matching files inside it
pub fn collect_inputs(stage: Stage, input: &Path, extensions: &[&str]) -> StageResult<Vec<PathBuf>> {
    if input.is_file() {
        if has_extension(input, extensions) {
            return Ok(vec![input.to_path_buf()]);
        }
        return Err(PipelineError::InvalidInput {
            stage,
            detail: format!(
                "{} is not a .{} file",
                input.display(),
                extensions.join("/.")
            ),
        });
    }
    if !input.is_dir() {
        return Err(PipelineError::missing(
            stage,
            input,
            "input path does not exist",
        ));
    }
    scan_dir(input, extensions).map_err(|e| PipelineError::io(stage, input, e))
}

/// One work item per distinct identity key, sorted by key
pub fn partition_files(paths: Vec<PathBuf>) -> Partition<PathBuf> {
    let mut keyed: Vec<(String, PathBuf)> = paths.into_iter().map(|p| (key_of(&p), p)).collect();
    keyed.sort();

    let mut partition = Partition {
        items: Vec::new(),
        excluded: Vec::new(),
        duplicates: Vec::new(),
    };
    for (key, path) in keyed {
        if key.is_empty() {
            partition.excluded.push(MalformedLine::new(
                0,
                &path.display().to_string(),
                "file name has no identity",
            ));
        } else if partition.items.last().is_some_and(|last| last.key == key) {
            partition.duplicates.push(key);
        } else {
            partition.items.push(WorkItem::new(key, path));
        }
    }
    partition
}
