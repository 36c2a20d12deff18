//! Identity keys shared by every stage
//!
//! The same protein appears as `1abc.pdb`, `out-1abc.pdb`, `1abc_fixed.pdb` and
//! `out-1abc.pdbqt` depending on the stage; all of them normalize to `1abc`.
//! Pocket names embed the normalized protein key behind a rank-preserving
//! discriminator: `pocket_<score>_<protein>`.

use std::fmt;
use std::path::Path;

const KNOWN_EXTENSIONS: &[&str] = &[
    "pdbqt", "pdb", "mol2", "smi", "txt", "csv", "dat", "log", "json",
];
const STAGE_PREFIXES: &[&str] = &["out-"];
const STAGE_SUFFIXES: &[&str] = &["_fixed", "_out"];

pub const POCKET_PREFIX: &str = "pocket_";

fn strip_extension(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    let known = KNOWN_EXTENSIONS
        .iter()
        .any(|k| k.eq_ignore_ascii_case(ext));
    (known && !stem.is_empty()).then_some(stem)
}

fn strip_marker(name: &str) -> Option<&str> {
    for prefix in STAGE_PREFIXES {
        if let Some(rest) = name.strip_prefix(prefix) {
            if !rest.is_empty() {
                return Some(rest);
            }
        }
    }
    for suffix in STAGE_SUFFIXES {
        if let Some(rest) = name.strip_suffix(suffix) {
            if !rest.is_empty() {
                return Some(rest);
            }
        }
    }
    None
}

/// Normalize a file name (or path) to its identity key
///
/// Directory components, known extensions and stage markers are stripped
/// repeatedly until nothing changes, so normalizing a key is a no-op.
pub fn normalize_key(name: &str) -> String {
    let mut key = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim();

    loop {
        if let Some(stem) = strip_extension(key) {
            key = stem.trim();
        } else if let Some(rest) = strip_marker(key) {
            key = rest.trim();
        } else {
            return key.to_string();
        }
    }
}

/// Identity key of a file path
pub fn key_of(path: &Path) -> String {
    path.file_name()
        .map(|n| normalize_key(&n.to_string_lossy()))
        .unwrap_or_else(|| normalize_key(&path.to_string_lossy()))
}

/// Name of one predicted pocket: `pocket_<discriminator>_<protein_key>`
///
/// The discriminator is the predictor's score string, extended with `r<rank>`
/// when a protein has two pockets with the same score.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PocketName {
    pub discriminator: String,
    pub protein_key: String,
}

impl PocketName {
    pub fn new(discriminator: impl Into<String>, protein_key: &str) -> Self {
        Self {
            discriminator: discriminator.into(),
            protein_key: normalize_key(protein_key),
        }
    }

    /// Parse `pocket_<discriminator>_<protein>`, tolerating a file extension
    pub fn parse(name: &str) -> Option<Self> {
        let file = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
        let file = strip_extension(file).unwrap_or(file);
        let rest = file.strip_prefix(POCKET_PREFIX)?;
        let (discriminator, protein) = rest.split_once('_')?;
        if discriminator.is_empty() || protein.is_empty() {
            return None;
        }
        let protein_key = normalize_key(protein);
        if protein_key.is_empty() {
            return None;
        }
        Some(Self {
            discriminator: discriminator.to_string(),
            protein_key,
        })
    }
}

impl fmt::Display for PocketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}_{}", POCKET_PREFIX, self.discriminator, self.protein_key)
    }
}

/// Assign collision-free discriminators to one protein's ranked pocket scores
///
/// Input order is the predictor's rank order and is preserved.
pub fn pocket_names(protein_key: &str, scores: &[String]) -> Vec<PocketName> {
    let mut used: Vec<String> = Vec::with_capacity(scores.len());
    scores
        .iter()
        .enumerate()
        .map(|(idx, score)| {
            let score = score.trim();
            let discriminator = if used.iter().any(|u| u == score) {
                format!("{}r{}", score, idx + 1)
            } else {
                score.to_string()
            };
            used.push(discriminator.clone());
            PocketName::new(discriminator, protein_key)
        })
        .collect()
}
