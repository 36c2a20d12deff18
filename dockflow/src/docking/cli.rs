//! CLI argument parsing for the docking pipeline

use clap::Parser;
use dockflow_sdk::WorkflowDefinition;
use std::path::PathBuf;

use crate::docking::types::{DockTool, Mode};
use crate::workflow_utils::default_concurrency;

/// Docking Pipeline CLI Arguments
#[derive(Parser, Debug, Clone, WorkflowDefinition)]
#[command(name = "dockflow", version, about)]
#[workflow(
    id = "docking_pipeline",
    name = "Docking Pipeline",
    description = "Ligand prep → Protein prep → Pocket detection → Docking → SFCT rescoring"
)]
pub struct Args {
    /// Ligand file, one `<seed_id> <SMILES>` record per line
    #[arg(long)]
    #[field(
        label = "Ligand File",
        description = "[FILE] One `<seed_id> <SMILES>` record per line",
        type = "file_path",
        pattern = "*.txt",
        stages = "LigandPrep"
    )]
    pub ligand: PathBuf,

    /// Protein structure (.pdb) or directory; in prebuilt mode a prepared database directory
    #[arg(long)]
    #[field(
        label = "Protein Input",
        description = "[PATH] PDB file or directory, or a prebuilt receptor database",
        type = "dir_path",
        stages = "ProteinPrep,SiteDetection,Docking"
    )]
    pub protein: PathBuf,

    /// custom: prepare proteins and detect pockets; prebuilt: use a prepared database
    #[arg(long, value_enum)]
    #[field(
        label = "Mode",
        description = "[SELECT] Prepare proteins here or use a prebuilt database",
        type = "select",
        options = "custom,prebuilt"
    )]
    pub mode: Mode,

    /// Search box size along X (Å)
    #[arg(long = "box_x")]
    #[field(label = "Box X", description = "[NUMBER] Search box size along X (Å)", type = "float", stages = "Docking")]
    pub box_x: f64,

    /// Search box size along Y (Å)
    #[arg(long = "box_y")]
    #[field(label = "Box Y", description = "[NUMBER] Search box size along Y (Å)", type = "float", stages = "Docking")]
    pub box_y: f64,

    /// Search box size along Z (Å)
    #[arg(long = "box_z")]
    #[field(label = "Box Z", description = "[NUMBER] Search box size along Z (Å)", type = "float", stages = "Docking")]
    pub box_z: f64,

    /// Concurrent work items per stage
    #[arg(long, default_value_t = default_concurrency())]
    #[field(
        label = "CPU",
        description = "[NUMBER] Work items run in parallel (default: cores - 2)",
        type = "number",
        min = "1"
    )]
    pub cpu: usize,

    /// Docking engine
    #[arg(long = "dock_tool", value_enum, default_value_t = DockTool::Idock)]
    #[field(
        label = "Docking Engine",
        description = "[SELECT] Engine used for docking",
        type = "select",
        options = "idock,vina",
        stages = "Docking,Rescoring"
    )]
    pub dock_tool: DockTool,

    /// Directory that receives every stage's output
    #[arg(long, default_value = ".")]
    #[field(label = "Output Directory", description = "[PATH] Where stage outputs are written", type = "dir_path")]
    pub out_dir: PathBuf,

    /// YAML file mapping tool names to executable paths
    #[arg(long)]
    #[field(
        label = "Tools Config",
        description = "[FILE] YAML map of tool name to path (overrides the user config)",
        type = "file_path",
        pattern = "*.yaml"
    )]
    pub tools_config: Option<PathBuf>,

    /// Per-item time limit in seconds for every stage (overrides stage defaults)
    #[arg(long)]
    #[field(label = "Item Timeout", description = "[NUMBER] Seconds before a work item is killed", type = "number", min = "1")]
    pub item_timeout: Option<u64>,

    // Hidden metadata flag
    #[arg(long, hide = true)]
    pub workflow_metadata: bool,
}

impl Args {
    pub fn box_size(&self) -> [f64; 3] {
        [self.box_x, self.box_y, self.box_z]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockflow_sdk::FieldType;

    #[test]
    fn test_parse_required_and_defaults() {
        let args = Args::try_parse_from([
            "dockflow",
            "--ligand",
            "ligands.txt",
            "--protein",
            "proteins",
            "--mode",
            "custom",
            "--box_x",
            "20",
            "--box_y",
            "22.5",
            "--box_z",
            "20",
        ])
        .unwrap();
        assert_eq!(args.mode, Mode::Custom);
        assert_eq!(args.dock_tool, DockTool::Idock);
        assert_eq!(args.box_size(), [20.0, 22.5, 20.0]);
        assert_eq!(args.cpu, default_concurrency());
        assert_eq!(args.out_dir, PathBuf::from("."));
        assert!(args.item_timeout.is_none());
    }

    #[test]
    fn test_dock_tool_and_mode_values() {
        let args = Args::try_parse_from([
            "dockflow", "--ligand", "l.txt", "--protein", "db", "--mode", "prebuilt", "--box_x",
            "1", "--box_y", "1", "--box_z", "1", "--dock_tool", "vina", "--cpu", "3",
        ])
        .unwrap();
        assert_eq!(args.mode, Mode::Prebuilt);
        assert_eq!(args.dock_tool, DockTool::Vina);
        assert_eq!(args.cpu, 3);

        let bad = Args::try_parse_from([
            "dockflow", "--ligand", "l.txt", "--protein", "db", "--mode", "hybrid", "--box_x",
            "1", "--box_y", "1", "--box_z", "1",
        ]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_missing_box_is_rejected() {
        let result = Args::try_parse_from([
            "dockflow", "--ligand", "l.txt", "--protein", "p", "--mode", "custom",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_schema_lists_visible_fields() {
        let fields = Args::fields();
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"ligand"));
        assert!(!names.contains(&"workflow_metadata"));

        let box_x = fields.iter().find(|f| f.name == "box_x").unwrap();
        assert_eq!(box_x.cli_arg, "--box_x");
        assert!(box_x.required);

        let engine = fields.iter().find(|f| f.name == "dock_tool").unwrap();
        assert_eq!(engine.default.as_deref(), Some("idock"));
        assert_eq!(
            engine.field_type,
            FieldType::Select {
                options: vec!["idock".to_string(), "vina".to_string()]
            }
        );

        let timeout = fields.iter().find(|f| f.name == "item_timeout").unwrap();
        assert!(!timeout.required);
        assert_eq!(Args::metadata().id, "docking_pipeline");
    }
}
