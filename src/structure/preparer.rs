// Copyright 2023-2024 Mikael Lund
//
// Licensed under the Apache license, version 2.0 (the "license");
// you may not use this file except in compliance with the license.
// You may obtain a copy of the license at
//
//     http://www.apache.org/licenses/license-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the license is distributed on an "as is" basis,
// without warranties or conditions of any kind, either express or implied.
// See the license for the specific language governing permissions and
// limitations under the license.

//! External structure preparation (atom typing, charges, flexible-residue split).

use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Converts raw structures into docking-ready PDBQT files.
pub trait StructurePreparer: std::fmt::Debug {
    /// Convert a PDB/MOL2 ligand into a PDBQT ligand.
    fn prepare_ligand(&self, input: &Path, output: &Path) -> anyhow::Result<()>;
    /// Convert a PDB receptor into a PDBQT receptor.
    fn prepare_receptor(&self, input: &Path, output: &Path) -> anyhow::Result<()>;
    /// Split a PDBQT receptor into rigid and flexible parts.
    ///
    /// `residues` holds selection tokens such as `THR276` or `B:HIS229`.
    fn split_flexible(
        &self,
        receptor: &Path,
        residues: &[String],
        rigid: &Path,
        flex: &Path,
    ) -> anyhow::Result<()>;
}

/// MGLTools utility scripts run through `pythonsh`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MglToolsPreparer {
    /// Python interpreter shipped with MGLTools.
    #[serde(default = "default_python")]
    pub python: PathBuf,
    /// Directory holding `prepare_ligand4.py` and friends.
    pub utilities: PathBuf,
}

fn default_python() -> PathBuf {
    PathBuf::from("pythonsh")
}

impl MglToolsPreparer {
    fn run(&self, script: &str, args: &[&OsStr], cwd: Option<&Path>) -> anyhow::Result<()> {
        let mut command = Command::new(&self.python);
        command.arg(self.utilities.join(script)).args(args);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        log::debug!("Running {:?}", command);
        let output = command
            .output()
            .map_err(|e| anyhow::anyhow!("Cannot run {}: {}", script, e))?;
        if !output.status.success() {
            anyhow::bail!(
                "{} failed with {}: {}",
                script,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Convert selection tokens to the `prepare_flexreceptor4.py` residue syntax.
fn flexreceptor_selection(receptor: &Path, residues: &[String]) -> String {
    let stem = receptor
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    residues
        .iter()
        .map(|token| match token.split_once(':') {
            Some((chain, residue)) => format!("{stem}:{chain}:{residue}"),
            None => token.clone(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

impl StructurePreparer for MglToolsPreparer {
    fn prepare_ligand(&self, input: &Path, output: &Path) -> anyhow::Result<()> {
        // prepare_ligand4.py resolves the input relative to its working directory
        let dir = input.parent().filter(|p| !p.as_os_str().is_empty());
        let name = input.file_name().unwrap_or(input.as_os_str());
        self.run(
            "prepare_ligand4.py",
            &[OsStr::new("-l"), name, OsStr::new("-o"), absolute(output)?.as_os_str()],
            dir,
        )
    }

    fn prepare_receptor(&self, input: &Path, output: &Path) -> anyhow::Result<()> {
        self.run(
            "prepare_receptor4.py",
            &[OsStr::new("-r"), input.as_os_str(), OsStr::new("-o"), output.as_os_str()],
            None,
        )
    }

    fn split_flexible(
        &self,
        receptor: &Path,
        residues: &[String],
        rigid: &Path,
        flex: &Path,
    ) -> anyhow::Result<()> {
        let selection = flexreceptor_selection(receptor, residues);
        self.run(
            "prepare_flexreceptor4.py",
            &[
                OsStr::new("-r"),
                receptor.as_os_str(),
                OsStr::new("-s"),
                OsStr::new(&selection),
                OsStr::new("-g"),
                rigid.as_os_str(),
                OsStr::new("-x"),
                flex.as_os_str(),
            ],
            None,
        )
    }
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_syntax() {
        let residues = vec!["THR276".to_string(), "B:HIS229".to_string()];
        assert_eq!(
            flexreceptor_selection(Path::new("/data/hsg1.pdbqt"), &residues),
            "THR276,hsg1:B:HIS229"
        );
    }

    #[test]
    fn missing_interpreter_is_an_error() {
        let preparer = MglToolsPreparer {
            python: PathBuf::from("/nonexistent/pythonsh"),
            utilities: PathBuf::from("/nonexistent"),
        };
        assert!(preparer
            .prepare_receptor(Path::new("a.pdb"), Path::new("a.pdbqt"))
            .is_err());
    }
}
