//! Per-run state shared by every stage: configuration, tools, scratch and output layout

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::docking::identity::key_of;
use crate::docking::tools::ToolConfig;
use crate::docking::types::Mode;
use crate::docking::workflow::PipelineConfig;
use crate::workflow_utils::Scratch;

/// Where every stage writes its artifacts
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub ligand_mol2_dir: PathBuf,
    pub ligand_pdbqt_dir: PathBuf,
    pub fixed_dir: PathBuf,
    /// Prepared receptors; the protein database itself in prebuilt mode
    pub receptor_dir: PathBuf,
    pub sites_dir: PathBuf,
    pub center_table: PathBuf,
    pub docking_dir: PathBuf,
    pub poses_dir: PathBuf,
    pub docking_log: PathBuf,
    pub rescoring_dir: PathBuf,
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "db".to_string())
}

impl Layout {
    pub fn new(config: &PipelineConfig) -> Self {
        let out = &config.out_dir;
        let ligand_base = key_of(&config.ligand);
        let protein_base = key_of(&config.protein);

        let ligand_pdbqt_dir = out.join(format!("{}_pdbqt", ligand_base));
        let receptor_dir = match config.mode {
            Mode::Custom => out.join(format!("{}_pdbqt", protein_base)),
            Mode::Prebuilt => config.protein.clone(),
        };
        let protein_db = match config.mode {
            Mode::Custom => protein_base.clone(),
            Mode::Prebuilt => dir_name(&config.protein),
        };
        let sites_dir = out.join(format!("{}_pocket", protein_base));
        let docking_dir = out.join(format!(
            "{}_{}_{}",
            config.dock_tool, protein_db, ligand_base
        ));

        Self {
            ligand_mol2_dir: out.join(format!("{}_mol2", ligand_base)),
            ligand_pdbqt_dir,
            fixed_dir: out.join(format!("{}_fixed", protein_base)),
            center_table: sites_dir.join(format!("{}_docking-center.txt", protein_base)),
            sites_dir,
            receptor_dir,
            poses_dir: docking_dir.join("poses"),
            docking_log: docking_dir.join("docking_log.txt"),
            docking_dir,
            rescoring_dir: out.join(format!("{}_SFCT", config.dock_tool)),
        }
    }
}

/// Everything a stage needs, shared with its spawned work items
#[derive(Debug)]
pub struct RunContext {
    pub config: PipelineConfig,
    pub tools: ToolConfig,
    pub scratch: Scratch,
    pub layout: Layout,
}

impl RunContext {
    pub fn new(config: PipelineConfig, tools: ToolConfig, scratch: Scratch) -> Arc<Self> {
        let layout = Layout::new(&config);
        Arc::new(Self {
            config,
            tools,
            scratch,
            layout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docking::types::DockTool;

    #[test]
    fn test_custom_layout() {
        let config = PipelineConfig {
            ligand: PathBuf::from("/in/ligands.txt"),
            protein: PathBuf::from("/in/proteins"),
            mode: Mode::Custom,
            dock_tool: DockTool::Idock,
            out_dir: PathBuf::from("/out"),
            ..Default::default()
        };
        let layout = Layout::new(&config);
        assert_eq!(layout.ligand_mol2_dir, PathBuf::from("/out/ligands_mol2"));
        assert_eq!(layout.fixed_dir, PathBuf::from("/out/proteins_fixed"));
        assert_eq!(layout.receptor_dir, PathBuf::from("/out/proteins_pdbqt"));
        assert_eq!(
            layout.center_table,
            PathBuf::from("/out/proteins_pocket/proteins_docking-center.txt")
        );
        assert_eq!(
            layout.docking_dir,
            PathBuf::from("/out/idock_proteins_ligands")
        );
        assert_eq!(layout.rescoring_dir, PathBuf::from("/out/idock_SFCT"));
    }

    #[test]
    fn test_prebuilt_layout_uses_database_dir() {
        let config = PipelineConfig {
            ligand: PathBuf::from("lig.smi"),
            protein: PathBuf::from("/db/kinases"),
            mode: Mode::Prebuilt,
            dock_tool: DockTool::Vina,
            out_dir: PathBuf::from("/out"),
            ..Default::default()
        };
        let layout = Layout::new(&config);
        assert_eq!(layout.receptor_dir, PathBuf::from("/db/kinases"));
        assert_eq!(layout.docking_dir, PathBuf::from("/out/vina_kinases_lig"));
        assert_eq!(
            layout.poses_dir,
            PathBuf::from("/out/vina_kinases_lig/poses")
        );
    }
}
