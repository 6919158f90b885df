// Copyright 2023 Mikael Lund
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

//! Receptor conformations.

use crate::registry::{file_stem, Rejected};
use crate::structure::{self, StructureData, StructurePreparer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// One receptor or an ordered set of receptor conformations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceptorSpec {
    Single(PathBuf),
    Multi(Vec<PathBuf>),
}

impl ReceptorSpec {
    /// Build a multi-conformation spec, dropping repeated paths.
    pub fn multi<P: Into<PathBuf>>(paths: impl IntoIterator<Item = P>) -> Self {
        let mut unique: Vec<PathBuf> = Vec::new();
        for path in paths.into_iter().map(Into::into) {
            if unique.contains(&path) {
                log::warn!("Receptor {} listed twice; ignoring", path.display());
            } else {
                unique.push(path);
            }
        }
        Self::Multi(unique)
    }

    /// Conformations in registration order, regardless of mode.
    pub fn conformations(&self) -> Vec<&Path> {
        match self {
            Self::Single(path) => vec![path.as_path()],
            Self::Multi(paths) => paths.iter().map(PathBuf::as_path).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conformations().is_empty()
    }
}

/// Read a PDBQT receptor and check it is one.
///
/// A receptor holds at least one atom record and neither `ROOT` nor `BEGIN_RES`.
pub fn validate_receptor(path: &Path) -> Result<StructureData, Rejected> {
    if !path.exists() {
        return Err(Rejected::Missing(path.to_path_buf()));
    }
    let molecules = structure::read_molecules(path).map_err(|e| Rejected::Unreadable {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let data = molecules.into_iter().next().unwrap_or_default();
    let reason = if data.atoms.is_empty() {
        Some("no atom records")
    } else if data.has_root {
        Some("contains a ROOT record")
    } else if data.has_flex_residues {
        Some("contains flexible residues")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Rejected::NotAReceptor(path.to_path_buf(), reason.into())),
        None => Ok(data),
    }
}

/// Return a validated PDBQT receptor, converting PDB input through `preparer`.
///
/// Converted receptors are written to `outdir` (next to the input when `None`).
pub fn prepare_receptor(
    path: &Path,
    preparer: Option<&dyn StructurePreparer>,
    outdir: Option<&Path>,
) -> Result<PathBuf, Rejected> {
    if structure::is_pdbqt(path) {
        validate_receptor(path)?;
        return Ok(path.to_path_buf());
    }
    let conversion = |message: String| Rejected::Conversion {
        path: path.to_path_buf(),
        message,
    };
    let preparer = preparer.ok_or_else(|| conversion("no structure preparer configured".into()))?;
    let dir = outdir
        .map(Path::to_path_buf)
        .or_else(|| path.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let output = dir.join(format!("{}.pdbqt", file_stem(path)));
    preparer
        .prepare_receptor(path, &output)
        .map_err(|e| conversion(e.to_string()))?;
    validate_receptor(&output)?;
    Ok(output)
}

/// Atom types present in a PDBQT file.
pub fn atom_types(path: &Path) -> anyhow::Result<BTreeSet<String>> {
    let data = structure::read_structure(&path)?;
    Ok(data.atoms.into_iter().map(|a| a.atom_type).collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const RECEPTOR: &str = "\
ATOM      1  N   THR A 276      11.104   6.134  -6.504  1.00  0.00    -0.346 N
ATOM      2  CA  THR A 276      11.639   6.071  -5.147  1.00  0.00     0.180 C
ATOM      3  OG1 THR A 276      10.000   6.071  -5.147  1.00  0.00    -0.393 OA
ATOM      4  N   HIS B 229      12.000   6.071  -5.147  1.00  0.00    -0.346 N
";

    #[test]
    fn receptor_validation() {
        let dir = tempfile::tempdir().unwrap();
        let rec = dir.path().join("rec.pdbqt");
        std::fs::write(&rec, RECEPTOR).unwrap();
        assert_eq!(validate_receptor(&rec).unwrap().atoms.len(), 4);
        assert_eq!(
            atom_types(&rec).unwrap().into_iter().collect::<Vec<_>>(),
            vec!["C", "N", "OA"]
        );

        let lig = dir.path().join("lig.pdbqt");
        std::fs::write(&lig, format!("ROOT\n{RECEPTOR}ENDROOT\n")).unwrap();
        assert!(matches!(
            validate_receptor(&lig),
            Err(Rejected::NotAReceptor(_, _))
        ));
        let empty = dir.path().join("empty.pdbqt");
        std::fs::write(&empty, "REMARK nothing\n").unwrap();
        assert!(validate_receptor(&empty).is_err());
        assert!(prepare_receptor(&dir.path().join("x.pdb"), None, None).is_err());
    }

    #[test]
    fn multi_drops_duplicates() {
        let spec = ReceptorSpec::multi(["a.pdbqt", "b.pdbqt", "a.pdbqt"]);
        assert_eq!(
            spec.conformations(),
            vec![Path::new("a.pdbqt"), Path::new("b.pdbqt")]
        );
        assert_eq!(ReceptorSpec::Single("r.pdbqt".into()).conformations().len(), 1);
    }
}
