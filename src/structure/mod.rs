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

//! Line-scanning readers for the structure formats handled by the pipeline.
//!
//! Only the handful of records needed to derive ligand and receptor
//! properties are interpreted. Chemistry (typing, charges, bond repair) is
//! left to an external [`StructurePreparer`].

mod mol2;
mod pdb;
mod pdbqt;
mod preparer;

pub use mol2::{count_mol2_molecules, split_mol2};
pub(crate) use pdb::column as pdb_column;
pub use preparer::{MglToolsPreparer, StructurePreparer};

use crate::Point;
use std::path::Path;

/// One atom record.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Atom name as written in the file.
    pub name: String,
    /// Atom type (AutoDock type for PDBQT, Sybyl type for MOL2, element for PDB).
    pub atom_type: String,
    /// Residue name, if any.
    pub residue: Option<String>,
    pub position: Point,
}

/// Format-agnostic in-memory representation of one molecule.
#[derive(Debug, Clone, Default)]
pub struct StructureData {
    /// Molecule name, if the format carries one.
    pub name: Option<String>,
    pub atoms: Vec<Atom>,
    /// Value of the `TORSDOF` record.
    pub torsdof: Option<usize>,
    /// Number of `BRANCH` records.
    pub branches: usize,
    /// A `ROOT` record is present (ligand marker).
    pub has_root: bool,
    /// A `BEGIN_RES` record is present (flexible residue marker).
    pub has_flex_residues: bool,
    /// Sum of all `active torsions` remarks.
    pub active_torsions: usize,
}

impl StructureData {
    /// Geometric center of all atoms.
    pub fn center(&self) -> Point {
        if self.atoms.is_empty() {
            return Point::zeros();
        }
        self.atoms.iter().map(|a| a.position).sum::<Point>() / self.atoms.len() as f64
    }

    pub fn positions(&self) -> impl Iterator<Item = &Point> {
        self.atoms.iter().map(|a| &a.position)
    }
}

/// Trait for reading molecular structure files.
pub(crate) trait StructureIO: std::fmt::Debug {
    /// Read all molecules from a file path, in encounter order.
    fn read(&self, path: &Path) -> anyhow::Result<Vec<StructureData>>;
}

/// Return a reader for the given file path based on its extension.
pub(crate) fn format_for_path(path: &Path) -> anyhow::Result<Box<dyn StructureIO>> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("pdbqt") => Ok(Box::new(pdbqt::PdbqtFormat)),
        Some("pdb") | Some("ent") => Ok(Box::new(pdb::PdbFormat)),
        Some("mol2") => Ok(Box::new(mol2::Mol2Format)),
        Some(ext) => anyhow::bail!("Unsupported structure format '.{ext}'"),
        None => anyhow::bail!("Cannot determine format: no file extension"),
    }
}

/// True if the path has an extension handled by [`read_structure`].
pub fn is_structure_file(path: &Path) -> bool {
    format_for_path(path).is_ok()
}

/// True if the path is a PDBQT file.
pub fn is_pdbqt(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdbqt"))
}

/// Read a structure file, auto-detecting format, and return the canonical molecule.
///
/// The canonical molecule is the one with most atoms; on ties the first one
/// encountered wins.
pub fn read_structure(path: &impl AsRef<Path>) -> anyhow::Result<StructureData> {
    let path = path.as_ref();
    largest_molecule(read_molecules(path)?)
        .ok_or_else(|| anyhow::anyhow!("No atom records found in {}", path.display()))
}

/// Read all molecules of a structure file in encounter order.
pub fn read_molecules(path: &Path) -> anyhow::Result<Vec<StructureData>> {
    format_for_path(path)?.read(path)
}

/// Pick the molecule with most atoms, first wins on ties.
pub fn largest_molecule(molecules: Vec<StructureData>) -> Option<StructureData> {
    molecules
        .into_iter()
        .filter(|m| !m.atoms.is_empty())
        .fold(None, |best: Option<StructureData>, m| match best {
            Some(b) if b.atoms.len() >= m.atoms.len() => Some(b),
            _ => Some(m),
        })
}

/// Compare coordinates before and after a conversion.
///
/// Returns the number of input atoms whose position is not found within
/// `tolerance` of any output atom. Hydrogens added by the converter are not
/// counted since only input atoms are looked up.
pub fn coordinate_drift(input: &StructureData, output: &StructureData, tolerance: f64) -> usize {
    input
        .positions()
        .filter(|p| !output.positions().any(|q| (*p - q).norm() <= tolerance))
        .count()
}
