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

use crate::atomtype::{self, UNKNOWN_TYPE_WEIGHT};
use crate::structure::StructureData;
use crate::Point;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Maximum distance between a donor heavy atom and its polar hydrogen.
pub const DONOR_HYDROGEN_DISTANCE: f64 = 1.1;

/// Derived properties of one docking-ready ligand.
///
/// Everything but `accepted` is fixed at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct LigandRecord {
    /// Source PDBQT file; unique key within a registry.
    path: PathBuf,
    /// Atom types present.
    atom_types: BTreeSet<String>,
    /// Rotatable bonds (`TORSDOF`).
    torsions: usize,
    /// Hydrogen-bond donors.
    donors: usize,
    /// Hydrogen-bond acceptors.
    acceptors: usize,
    /// Approximate molecular weight.
    weight: f64,
    /// Atoms other than hydrogens. Non-polar `H` and `HS` are left out as well
    /// as `HD`, so this is lower than a count that only drops polar hydrogens.
    heavy_atoms: usize,
    /// At least one atom type is missing from the weight table.
    non_standard: bool,
    /// Outcome of the last filter run.
    accepted: bool,
    /// Geometric center of all atoms.
    center: Point,
    /// Number of `BRANCH` records; the dihedral count of the torsion tree.
    branches: usize,
}

impl LigandRecord {
    /// Derive a record from parsed PDBQT content.
    ///
    /// Returns `None` when there are no atom records.
    pub fn from_structure(path: &Path, data: &StructureData) -> Option<Self> {
        if data.atoms.is_empty() {
            return None;
        }
        let mut atom_types = BTreeSet::new();
        let mut weight = 0.0;
        let mut non_standard = false;
        let mut acceptors = 0;
        let mut heavy_atoms = 0;

        for atom in &data.atoms {
            let atom_type = atom.atom_type.as_str();
            atom_types.insert(atom_type.to_string());
            match atomtype::weight(atom_type) {
                Some(w) => weight += w,
                None => {
                    weight += UNKNOWN_TYPE_WEIGHT;
                    non_standard = true;
                }
            }
            if atomtype::is_acceptor(atom_type) {
                acceptors += 1;
            }
            if !atomtype::is_hydrogen(atom_type) {
                heavy_atoms += 1;
            }
        }

        let polar_hydrogens: Vec<&Point> = data
            .atoms
            .iter()
            .filter(|a| atomtype::is_polar_hydrogen(&a.atom_type))
            .map(|a| &a.position)
            .collect();
        let donors = data
            .atoms
            .iter()
            .filter(|a| atomtype::is_donor_candidate(&a.atom_type))
            .filter(|a| {
                polar_hydrogens
                    .iter()
                    .any(|h| (a.position - *h).norm() <= DONOR_HYDROGEN_DISTANCE)
            })
            .count();

        let torsions = data.torsdof.unwrap_or_else(|| {
            log::warn!(
                "No TORSDOF record in {}; using {} branch(es)",
                path.display(),
                data.branches
            );
            data.branches
        });

        Some(Self {
            path: path.to_path_buf(),
            atom_types,
            torsions,
            donors,
            acceptors,
            weight,
            heavy_atoms,
            non_standard,
            accepted: !non_standard,
            center: data.center(),
            branches: data.branches,
        })
    }

    pub(crate) fn set_accepted(&mut self, accepted: bool) {
        self.accepted = accepted;
    }

    /// File name without extension.
    pub fn stem(&self) -> String {
        file_stem(&self.path)
    }

    /// Atom types joined by a single space, in sorted order.
    pub fn type_string(&self) -> String {
        self.atom_types.iter().cloned().collect::<Vec<_>>().join(" ")
    }
}

/// File name up to the last dot.
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}
