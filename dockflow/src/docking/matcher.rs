//! Cross-stage identity matching
//!
//! Each stage reads its predecessor's persisted result into an [`IdentityIndex`]
//! and resolves its own work items against it by exact identity key.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::docking::identity::{key_of, normalize_key, PocketName};
use crate::docking::types::{CenterRecord, MalformedLine, PoseRecord};
use crate::workflow_utils::{write_atomic, WorkItem};

pub const CENTER_TABLE_HEADER: &str = "PDB_File,X,Y,Z";
pub const CENTER_TABLE_SUFFIX: &str = "docking-center.txt";
pub const POSE_MANIFEST: &str = "poses.json";

/// Identity key -> artifacts from a prior stage, in the order they were recorded
#[derive(Debug, Clone)]
pub struct IdentityIndex<V> {
    entries: BTreeMap<String, Vec<V>>,
}

impl<V> Default for IdentityIndex<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

/// What a work item resolved to
#[derive(Debug, PartialEq)]
pub enum Resolution<'a, V> {
    Matched(&'a [V]),
    /// No artifact shares the item's key
    Unmatched,
}

impl<V> IdentityIndex<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        self.entries.entry(key.into()).or_default().push(value);
    }

    pub fn get(&self, key: &str) -> &[V] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of recorded artifacts across all keys
    pub fn record_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn resolve<T>(&self, item: &WorkItem<T>) -> Resolution<'_, V> {
        match self.entries.get(&item.key) {
            Some(values) if !values.is_empty() => Resolution::Matched(values),
            _ => Resolution::Unmatched,
        }
    }

    /// The longest key that prefixes `name` at a `_` or `.` boundary
    pub fn longest_prefix_owner(&self, name: &str) -> Option<&str> {
        self.entries
            .keys()
            .filter(|key| {
                name.strip_prefix(key.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(['_', '.']))
            })
            .max_by_key(|key| key.len())
            .map(String::as_str)
    }
}

/// Parsed coordinate table; rows keep their on-disk order
#[derive(Debug, Clone, Default)]
pub struct CenterTable {
    pub records: Vec<CenterRecord>,
    pub malformed: Vec<MalformedLine>,
}

impl CenterTable {
    /// Index by protein key; each protein's pockets stay in table (rank) order
    pub fn index(&self) -> IdentityIndex<CenterRecord> {
        let mut index = IdentityIndex::new();
        for record in &self.records {
            index.insert(record.pocket.protein_key.clone(), record.clone());
        }
        index
    }
}

fn parse_center_row(line_no: usize, line: &str) -> Result<CenterRecord, MalformedLine> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(MalformedLine::new(
            line_no,
            line,
            format!("expected 4 fields, found {}", fields.len()),
        ));
    }
    let pocket = PocketName::parse(fields[0])
        .ok_or_else(|| MalformedLine::new(line_no, line, "not a pocket name"))?;
    let mut center = [0.0; 3];
    for (slot, field) in center.iter_mut().zip(&fields[1..]) {
        *slot = field
            .parse()
            .map_err(|_| MalformedLine::new(line_no, line, format!("bad coordinate {:?}", field)))?;
    }
    Ok(CenterRecord { pocket, center })
}

/// Parse `PDB_File,X,Y,Z` text; a missing header is an error, bad rows are collected
pub fn parse_center_table(text: &str) -> Result<CenterTable> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let header = lines.next().map(|(_, l)| l.trim().replace(' ', ""));
    if header.as_deref() != Some(CENTER_TABLE_HEADER) {
        anyhow::bail!(
            "coordinate table must start with `{}`, found {:?}",
            CENTER_TABLE_HEADER,
            header.unwrap_or_default()
        );
    }

    let mut table = CenterTable::default();
    for (idx, line) in lines {
        match parse_center_row(idx + 1, line) {
            Ok(record) => table.records.push(record),
            Err(malformed) => table.malformed.push(malformed),
        }
    }
    Ok(table)
}

pub fn load_center_table(path: &Path) -> Result<CenterTable> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_center_table(&text).with_context(|| format!("in {}", path.display()))
}

/// The first `*docking-center.txt` in a protein database directory
pub fn find_center_table(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .is_some_and(|n| n.to_string_lossy().ends_with(CENTER_TABLE_SUFFIX))
        })
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Persisted index of docking poses, consumed by rescoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseManifest {
    pub engine: String,
    pub poses: Vec<PoseRecord>,
}

impl PoseManifest {
    pub fn new(engine: impl Into<String>, mut poses: Vec<PoseRecord>) -> Self {
        poses.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            engine: engine.into(),
            poses,
        }
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(POSE_MANIFEST);
        write_atomic(&path, &serde_json::to_vec_pretty(self)?)?;
        Ok(path)
    }

    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(POSE_MANIFEST);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Some(serde_json::from_str(&text).with_context(|| {
            format!("malformed pose manifest {}", path.display())
        })?))
    }

    /// Pose file name -> record
    pub fn index(&self) -> IdentityIndex<PoseRecord> {
        let mut index = IdentityIndex::new();
        for pose in &self.poses {
            index.insert(key_of(&pose.path), pose.clone());
        }
        index
    }
}

/// Resolve pose files to their protein without a manifest
///
/// Pose stems look like `pocket_<disc>_<protein>_<ligand>`; the owner is the
/// longest known receptor key that follows the discriminator.
pub fn resolve_pose_owner<'a, V>(
    receptors: &'a IdentityIndex<V>,
    pose_file: &Path,
) -> Option<&'a str> {
    let stem = key_of(pose_file);
    let after_prefix = stem.strip_prefix(crate::docking::identity::POCKET_PREFIX)?;
    let (_, rest) = after_prefix.split_once('_')?;
    receptors.longest_prefix_owner(&normalize_key(rest))
}
