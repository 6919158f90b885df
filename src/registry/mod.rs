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

//! Candidate registry: the in-memory catalog of ligand records.
//!
//! The registry owns the shared [`AtomTypeUsage`] table and keeps it equal to
//! the number of currently registered, standard-typed ligands exposing each
//! type. Records keep their registration order, which is also the order of
//! the generated jobs.

mod import;
mod ligand;
mod list;

pub use import::{ImportReport, LigandImporter};
pub use ligand::{LigandRecord, DONOR_HYDROGEN_DISTANCE};
pub(crate) use ligand::file_stem;
pub use list::{export_ligand_list, import_ligand_list, LigandList};

use crate::atomtype::AtomTypeUsage;
use crate::structure;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why an input structure was excluded.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Rejected {
    #[error("cannot read {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
    #[error("no atom records found in {0}")]
    NoAtoms(PathBuf),
    #[error("{0} is not a ligand (no ROOT record or contains flexible residues)")]
    NotALigand(PathBuf),
    #[error("{0} is not a valid receptor: {1}")]
    NotAReceptor(PathBuf, String),
    #[error("{0} is already registered")]
    Duplicate(PathBuf),
    #[error("conversion of {path} failed: {message}")]
    Conversion { path: PathBuf, message: String },
    #[error("{0} does not exist")]
    Missing(PathBuf),
}

/// Catalog of registered ligands plus the atom-type usage table.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    ligands: Vec<LigandRecord>,
    usage: AtomTypeUsage,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a PDBQT ligand and add it to the catalog.
    pub fn register(&mut self, path: impl AsRef<Path>) -> Result<&LigandRecord, Rejected> {
        let path = path.as_ref();
        if self.get(path).is_some() {
            return Err(Rejected::Duplicate(path.to_path_buf()));
        }
        if !path.exists() {
            return Err(Rejected::Missing(path.to_path_buf()));
        }
        let molecules = structure::read_molecules(path).map_err(|e| Rejected::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let data = structure::largest_molecule(molecules)
            .ok_or_else(|| Rejected::NoAtoms(path.to_path_buf()))?;
        if !data.has_root || data.has_flex_residues {
            return Err(Rejected::NotALigand(path.to_path_buf()));
        }
        let record = LigandRecord::from_structure(path, &data)
            .ok_or_else(|| Rejected::NoAtoms(path.to_path_buf()))?;
        self.insert(record)
    }

    /// Add an already derived record.
    pub fn insert(&mut self, record: LigandRecord) -> Result<&LigandRecord, Rejected> {
        if self.get(record.path()).is_some() {
            return Err(Rejected::Duplicate(record.path().clone()));
        }
        if !record.non_standard() {
            self.usage.add(record.atom_types());
        }
        log::debug!(
            "Registered {} ({} atom types)",
            record.path().display(),
            record.atom_types().len()
        );
        self.ligands.push(record);
        Ok(&self.ligands[self.ligands.len() - 1])
    }

    /// Remove records and decrement the usage counters they contributed to.
    ///
    /// Returns the number of records removed. Unknown paths are ignored.
    pub fn unregister<P: AsRef<Path>>(&mut self, paths: &[P]) -> usize {
        let mut removed = 0;
        for path in paths {
            let path = path.as_ref();
            if let Some(index) = self.ligands.iter().position(|l| l.path() == path) {
                let record = self.ligands.remove(index);
                if !record.non_standard() {
                    self.usage.remove(record.atom_types());
                }
                removed += 1;
            }
        }
        removed
    }

    /// Remove all records. Usage counters drop to zero except the pseudo-types.
    pub fn clear(&mut self) {
        self.ligands.clear();
        self.usage.clear();
    }

    pub fn get(&self, path: &Path) -> Option<&LigandRecord> {
        self.ligands.iter().find(|l| l.path() == path)
    }

    /// All records in registration order.
    pub fn ligands(&self) -> &[LigandRecord] {
        &self.ligands
    }

    pub(crate) fn ligands_mut(&mut self) -> &mut [LigandRecord] {
        &mut self.ligands
    }

    /// Accepted records in registration order.
    pub fn accepted(&self) -> impl Iterator<Item = &LigandRecord> {
        self.ligands.iter().filter(|l| *l.accepted())
    }

    pub fn usage(&self) -> &AtomTypeUsage {
        &self.usage
    }

    pub fn len(&self) -> usize {
        self.ligands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ligands.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Write a small ligand in PDBQT format with the given atom types.
    pub(crate) fn write_ligand(dir: &Path, name: &str, types: &[&str], torsdof: usize) -> PathBuf {
        let mut text = String::from("ROOT\n");
        for (i, t) in types.iter().enumerate() {
            text.push_str(&format!(
                "ATOM  {:>5}  X   LIG     1    {:>8.3}{:>8.3}{:>8.3}  0.00  0.00     0.000 {}\n",
                i + 1,
                3.0 * i as f64,
                0.0,
                0.0,
                t
            ));
        }
        text.push_str(&format!("ENDROOT\nTORSDOF {torsdof}\n"));
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn register_unregister_restores_counters() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_ligand(dir.path(), "a.pdbqt", &["C", "OA", "N"], 1);
        let b = write_ligand(dir.path(), "b.pdbqt", &["C", "SA"], 0);

        let mut registry = Registry::new();
        registry.register(&a).unwrap();
        let before = registry.usage().clone();
        let types = ["C", "OA", "N", "SA", "e", "d"];
        let counts: Vec<_> = types.iter().map(|t| before.count(t)).collect();

        registry.register(&b).unwrap();
        assert_eq!(registry.usage().count("C"), 2);
        assert_eq!(registry.usage().count("SA"), 1);

        assert_eq!(registry.unregister(&[&b]), 1);
        let after: Vec<_> = types.iter().map(|t| registry.usage().count(t)).collect();
        assert_eq!(counts, after);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicates_and_non_ligands_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_ligand(dir.path(), "a.pdbqt", &["C"], 0);
        let receptor = dir.path().join("rec.pdbqt");
        std::fs::write(
            &receptor,
            "ATOM      1  N   THR A 276      11.104   6.134  -6.504  1.00  0.00    -0.3 N\n",
        )
        .unwrap();

        let mut registry = Registry::new();
        registry.register(&a).unwrap();
        assert!(matches!(registry.register(&a), Err(Rejected::Duplicate(_))));
        assert!(matches!(registry.register(&receptor), Err(Rejected::NotALigand(_))));
        assert!(matches!(
            registry.register(dir.path().join("nope.pdbqt")),
            Err(Rejected::Missing(_))
        ));
    }

    #[test]
    fn clear_pins_pseudo_types() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_ligand(dir.path(), "a.pdbqt", &["C", "OA"], 0);
        let mut registry = Registry::new();
        registry.register(&a).unwrap();
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.usage().count("C"), 0);
        assert_eq!(registry.usage().count("e"), 1);
        assert_eq!(registry.usage().count("d"), 1);
    }

    #[test]
    fn non_standard_ligands_are_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_ligand(dir.path(), "a.pdbqt", &["C", "Se"], 0);
        let mut registry = Registry::new();
        let record = registry.register(&a).unwrap();
        assert!(*record.non_standard());
        assert_eq!(registry.usage().count("C"), 0);
        assert_eq!(registry.accepted().count(), 0);
        registry.unregister(&[&a]);
        assert_eq!(registry.usage().count("C"), 0);
    }
}
