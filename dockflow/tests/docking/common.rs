//! Common test utilities for docking pipeline tests
//!
//! External tools are replaced by small POSIX shell scripts that follow the
//! real tools' argument conventions and write plausible outputs.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use dockflow::docking::tools::StageTimeouts;
use dockflow::docking::{DockTool, Mode, PipelineConfig};

pub const OBABEL: &str = r#"#!/bin/sh
smiles="${1#-:}"
out="$4"
case "$smiles" in
  *invalid*) echo "0 molecules converted: cannot parse $smiles" >&2; exit 1 ;;
esac
printf '@<TRIPOS>MOLECULE\n%s\n' "$smiles" > "$out"
"#;

pub const PREPARE_LIGAND: &str = r#"#!/bin/sh
# -l <mol2> -o <pdbqt> -A hydrogens, relative to the working directory
cat "$2" > "$4"
echo "ROOT" >> "$4"
"#;

pub const PDBFIXER: &str = r#"#!/bin/sh
in="$1"
out="${2#--output=}"
cp "$in" "$out"
"#;

pub const PREPARE_RECEPTOR: &str = r#"#!/bin/sh
# -r <pdb> -o <pdbqt>
cp "$2" "$4"
"#;

/// Three ranked pockets per structure, scores 0.9 / 0.7 / 0.5
pub const PRANK: &str = r#"#!/bin/sh
# predict -f <pdb> -o <dir>/
pdb="$3"
out="$5"
name=$(basename "$pdb")
cat > "${out}${name}_predictions.csv" <<CSV
name     ,  rank,   score, probability, sas_points, surf_atoms, center_x, center_y, center_z, residue_ids, surf_atom_ids
pocket1  ,     1,     0.9,       0.80,         50,         20,    0.0,    0.0,    0.0, A_1 A_2, 1 2
pocket2  ,     2,     0.7,       0.60,         40,         10,    0.0,    0.0,    0.0, A_3, 3
pocket3  ,     3,     0.5,       0.40,         30,         10,    0.0,    0.0,    0.0, A_4, 4
pocket4  ,     4,     0.1,       0.10,         10,          5,    0.0,    0.0,    0.0, A_1, 1
CSV
"#;

/// Writes one two-model pose per ligand; receptors named `*slow*` hang
pub const IDOCK: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    --receptor) rec="$2"; shift 2 ;;
    --ligand) lig="$2"; shift 2 ;;
    --out) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
case "$rec" in
  *slow*) exec sleep 30 ;;
esac
mkdir -p "$out"
for l in "$lig"/*.pdbqt; do
  cat > "$out/$(basename "$l")" <<POSE
MODEL        1
REMARK     NORMALIZED FREE ENERGY PREDICTED BY IDOCK:  -7.000 KCAL/MOL
ENDMDL
MODEL        2
REMARK     NORMALIZED FREE ENERGY PREDICTED BY IDOCK:  -6.000 KCAL/MOL
ENDMDL
POSE
done
"#;

pub const VINA: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    --out) out="$2"; shift 2 ;;
    --log) log="$2"; shift 2 ;;
    *) shift ;;
  esac
done
cat > "$out" <<POSE
MODEL 1
REMARK VINA RESULT:    -8.000      0.000      0.000
ENDMDL
POSE
echo "mode | affinity" > "$log"
"#;

/// Stands in for `python3 <scorer> ... -o <dat>`; one SFCT row per model
pub const SFCT: &str = r##"#!/bin/sh
dat="${11}"
pose="$5"
echo "#code pose docking rmsd sfct" > "$dat"
n=$(grep -c '^MODEL' "$pose" || true)
i=1
while [ "$i" -le "$n" ]; do
  echo "x $i 0 0 -5.000" >> "$dat"
  i=$((i + 1))
done
"##;

pub struct Project {
    pub dir: tempfile::TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn out_dir(&self) -> PathBuf {
        self.path().join("out")
    }

    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.write(&format!("bin/{}", name), body);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    /// Install every fake tool and return the `tools.yaml` naming them
    pub fn install_tools(&self) -> PathBuf {
        let entries = [
            ("obabel", self.script("obabel", OBABEL)),
            ("prepare_ligand", self.script("prepare_ligand", PREPARE_LIGAND)),
            ("pdbfixer", self.script("pdbfixer", PDBFIXER)),
            ("prepare_receptor", self.script("prepare_receptor", PREPARE_RECEPTOR)),
            ("prank", self.script("prank", PRANK)),
            ("idock", self.script("idock", IDOCK)),
            ("vina", self.script("vina", VINA)),
            ("python3", self.script("python3", SFCT)),
            ("sfct_scorer", self.write("sfct/sfct.py", "# scorer\n")),
            ("sfct_model", self.write("sfct/model.pth", "weights\n")),
        ];
        let yaml: String = entries
            .iter()
            .map(|(name, path)| format!("{}: {}\n", name, path.display()))
            .collect();
        self.write("tools.yaml", &yaml)
    }

    pub fn config(&self, ligand: PathBuf, protein: PathBuf, mode: Mode) -> PipelineConfig {
        PipelineConfig {
            ligand,
            protein,
            mode,
            box_size: [20.0, 20.0, 20.0],
            cpu: 4,
            dock_tool: DockTool::Idock,
            out_dir: self.out_dir(),
            tools_config: Some(self.install_tools()),
            timeouts: StageTimeouts::uniform(Duration::from_secs(20)),
        }
    }
}

pub fn atom_line(serial: usize, chain: char, residue: i32, xyz: [f64; 3]) -> String {
    format!(
        "ATOM  {:>5}  CA  ALA {}{:>4}    {:>8.3}{:>8.3}{:>8.3}  1.00  0.00           C",
        serial, chain, residue, xyz[0], xyz[1], xyz[2]
    )
}

/// Residues A1..A4; pocket centroids are (2,3,4), (10,10,10) and (-1.5,0.25,7.125)
pub fn protein_pdb() -> String {
    let atoms = [
        (1, [1.0, 2.0, 3.0]),
        (2, [3.0, 4.0, 5.0]),
        (3, [10.0, 10.0, 10.0]),
        (4, [-1.0, 0.0, 7.0]),
        (4, [-2.0, 0.5, 7.25]),
    ];
    let mut lines: Vec<String> = atoms
        .iter()
        .enumerate()
        .map(|(i, (res, xyz))| atom_line(i + 1, 'A', *res, *xyz))
        .collect();
    lines.insert(0, "HEADER    TEST PROTEIN".to_string());
    lines.push("HETATM    6  O   HOH A 100      50.000  50.000  50.000  1.00  0.00           O".to_string());
    lines.push("END".to_string());
    lines.join("\n") + "\n"
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e))
}

/// Entries of `dir` whose name starts with `prefix`
pub fn entries_with_prefix(dir: &Path, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|n| n.starts_with(prefix))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
