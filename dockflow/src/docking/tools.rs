//! External tool locations and per-stage time budgets
//!
//! Each tool is looked up in order: the `--tools-config` YAML file, `tools.yaml`
//! in the platform config directory, a `DOCKFLOW_<TOOL>` environment variable,
//! then `PATH`. Only the tools the selected mode and engine need are resolved.

use directories::ProjectDirs;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::docking::error::{PipelineError, StageResult};
use crate::docking::types::{DockTool, Mode, Stage};
use crate::workflow_utils::load_yaml_file;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tool {
    Obabel,
    PrepareLigand,
    Pdbfixer,
    PrepareReceptor,
    Prank,
    Idock,
    Vina,
    Python3,
    SfctScorer,
    SfctModel,
}

impl Tool {
    /// Key in `tools.yaml` and executable name on `PATH`
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Obabel => "obabel",
            Tool::PrepareLigand => "prepare_ligand",
            Tool::Pdbfixer => "pdbfixer",
            Tool::PrepareReceptor => "prepare_receptor",
            Tool::Prank => "prank",
            Tool::Idock => "idock",
            Tool::Vina => "vina",
            Tool::Python3 => "python3",
            Tool::SfctScorer => "sfct_scorer",
            Tool::SfctModel => "sfct_model",
        }
    }

    pub fn env_var(&self) -> String {
        format!("DOCKFLOW_{}", self.name().to_ascii_uppercase())
    }

    /// Scorer script and model are data files, never on `PATH`
    fn on_path(&self) -> bool {
        !matches!(self, Tool::SfctScorer | Tool::SfctModel)
    }

    /// Stage that first needs the tool, for error reporting
    pub fn stage(&self) -> Stage {
        match self {
            Tool::Obabel | Tool::PrepareLigand => Stage::LigandPrep,
            Tool::Pdbfixer | Tool::PrepareReceptor => Stage::ProteinPrep,
            Tool::Prank => Stage::SiteDetection,
            Tool::Idock | Tool::Vina => Stage::Docking,
            Tool::Python3 | Tool::SfctScorer | Tool::SfctModel => Stage::Rescoring,
        }
    }
}

/// Tools needed for a run in `mode` with `engine`
pub fn required_tools(mode: Mode, engine: DockTool) -> Vec<Tool> {
    let mut tools = vec![Tool::Obabel, Tool::PrepareLigand];
    if mode == Mode::Custom {
        tools.extend([Tool::Pdbfixer, Tool::PrepareReceptor, Tool::Prank]);
    }
    tools.push(match engine {
        DockTool::Idock => Tool::Idock,
        DockTool::Vina => Tool::Vina,
    });
    tools.extend([Tool::Python3, Tool::SfctScorer, Tool::SfctModel]);
    tools
}

/// One configured source of tool paths
#[derive(Debug, Clone)]
pub struct ToolLayer {
    pub source: String,
    pub paths: BTreeMap<String, PathBuf>,
}

impl ToolLayer {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let paths: Option<BTreeMap<String, PathBuf>> = load_yaml_file(path)?;
        Ok(Self {
            source: path.display().to_string(),
            paths: paths.unwrap_or_default(),
        })
    }
}

/// `tools.yaml` in the platform config directory, if present
pub fn user_config_file() -> Option<PathBuf> {
    ProjectDirs::from("org", "dockflow", "dockflow")
        .map(|dirs| dirs.config_dir().join("tools.yaml"))
        .filter(|p| p.is_file())
}

/// Resolved tool locations
#[derive(Debug, Clone, Default)]
pub struct ToolConfig {
    paths: BTreeMap<Tool, PathBuf>,
}

impl ToolConfig {
    /// Resolve `required` from the standard sources
    pub fn resolve(required: &[Tool], explicit: Option<&Path>) -> StageResult<Self> {
        let mut layers = Vec::new();
        if let Some(path) = explicit {
            let layer = ToolLayer::load(path).map_err(|e| PipelineError::InvalidInput {
                stage: Stage::Validate,
                detail: format!("tools config: {:#}", e),
            })?;
            layers.push(layer);
        }
        if let Some(path) = user_config_file() {
            match ToolLayer::load(&path) {
                Ok(layer) => layers.push(layer),
                Err(e) => {
                    dockflow_sdk::log_warning!("ignoring {}: {:#}", path.display(), e);
                }
            }
        }
        Self::resolve_from(required, &layers, |name| std::env::var(name).ok(), |name| {
            which::which(name).ok()
        })
    }

    /// Resolve with explicit sources; the first source naming a tool wins
    pub fn resolve_from(
        required: &[Tool],
        layers: &[ToolLayer],
        env: impl Fn(&str) -> Option<String>,
        path_lookup: impl Fn(&str) -> Option<PathBuf>,
    ) -> StageResult<Self> {
        let mut paths = BTreeMap::new();

        for &tool in required {
            let configured = layers
                .iter()
                .find_map(|l| l.paths.get(tool.name()).map(|p| (p.clone(), l.source.clone())))
                .or_else(|| {
                    env(&tool.env_var())
                        .filter(|v| !v.trim().is_empty())
                        .map(|v| (PathBuf::from(v.trim()), format!("${}", tool.env_var())))
                });

            let path = match configured {
                Some((path, source)) => {
                    if !path.exists() {
                        return Err(PipelineError::MissingTool {
                            stage: Stage::Validate,
                            tool: tool.name().to_string(),
                            detail: format!("{} (from {}) does not exist", path.display(), source),
                        });
                    }
                    path
                }
                None => {
                    let found = if tool.on_path() {
                        path_lookup(tool.name())
                    } else {
                        None
                    };
                    found.ok_or_else(|| PipelineError::MissingTool {
                        stage: Stage::Validate,
                        tool: tool.name().to_string(),
                        detail: format!(
                            "needed by {}; set `{}` in tools.yaml or {}",
                            tool.stage(),
                            tool.name(),
                            tool.env_var()
                        ),
                    })?
                }
            };
            paths.insert(tool, path);
        }

        Ok(Self { paths })
    }

    pub fn from_paths(paths: impl IntoIterator<Item = (Tool, PathBuf)>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    /// Path of a resolved tool
    pub fn path(&self, tool: Tool) -> StageResult<&Path> {
        self.paths
            .get(&tool)
            .map(PathBuf::as_path)
            .ok_or_else(|| PipelineError::MissingTool {
                stage: tool.stage(),
                tool: tool.name().to_string(),
                detail: "not resolved for this run".to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tool, &Path)> {
        self.paths.iter().map(|(t, p)| (*t, p.as_path()))
    }
}

/// Per-item time budgets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageTimeouts {
    pub ligand: Duration,
    pub repair: Duration,
    pub receptor: Duration,
    pub site: Duration,
    pub docking: Duration,
    pub rescoring: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            ligand: Duration::from_secs(120),
            repair: Duration::from_secs(1800),
            receptor: Duration::from_secs(600),
            site: Duration::from_secs(1800),
            docking: Duration::from_secs(7200),
            rescoring: Duration::from_secs(1800),
        }
    }
}

impl StageTimeouts {
    /// Same budget for every stage
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            ligand: timeout,
            repair: timeout,
            receptor: timeout,
            site: timeout,
            docking: timeout,
            rescoring: timeout,
        }
    }
}
