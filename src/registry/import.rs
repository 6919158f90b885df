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

//! Batch import of ligand files and directories.
//!
//! Per-item failures never stop an import; they are collected into an
//! [`ImportReport`] which is summarized once.

use super::{file_stem, Registry, Rejected};
use crate::structure::{self, StructurePreparer};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Atoms moving further than this during conversion are reported.
const COORDINATE_TOLERANCE: f64 = 1e-3;

/// Outcome of a batch import.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportReport {
    /// Registered PDBQT files.
    pub accepted: Vec<PathBuf>,
    /// Excluded inputs with the reason.
    pub rejected: Vec<(PathBuf, String)>,
}

impl ImportReport {
    fn reject(&mut self, error: Rejected) {
        let path = match &error {
            Rejected::Unreadable { path, .. } | Rejected::Conversion { path, .. } => path.clone(),
            Rejected::NoAtoms(path)
            | Rejected::NotALigand(path)
            | Rejected::NotAReceptor(path, _)
            | Rejected::Duplicate(path)
            | Rejected::Missing(path) => path.clone(),
        };
        log::debug!("{}", error);
        self.rejected.push((path, error.to_string()));
    }

    /// Merge another report into this one.
    pub fn extend(&mut self, other: ImportReport) {
        self.accepted.extend(other.accepted);
        self.rejected.extend(other.rejected);
    }

    /// Log a one-line summary plus one warning per rejection.
    pub fn summarize(&self) {
        log::info!(
            "Imported {} ligand(s), rejected {}",
            self.accepted.len(),
            self.rejected.len()
        );
        for (path, reason) in &self.rejected {
            log::warn!("Rejected {}: {}", path.display(), reason);
        }
    }
}

/// Imports ligands into a registry, converting non-PDBQT inputs on the way.
#[derive(Debug)]
pub struct LigandImporter<'a> {
    preparer: Option<&'a dyn StructurePreparer>,
    /// Where converted PDBQT files are written; next to the input when unset.
    conversion_dir: Option<PathBuf>,
    recursive: bool,
}

impl<'a> LigandImporter<'a> {
    pub fn new(preparer: Option<&'a dyn StructurePreparer>) -> Self {
        Self {
            preparer,
            conversion_dir: None,
            recursive: false,
        }
    }

    pub fn conversion_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.conversion_dir = Some(dir.into());
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Import a list of files.
    pub fn import_files<P: AsRef<Path>>(&self, registry: &mut Registry, files: &[P]) -> ImportReport {
        let mut report = ImportReport::default();
        for file in files {
            self.import_one(registry, file.as_ref(), &mut report);
        }
        report
    }

    /// Import every structure file found in a directory.
    pub fn import_dir(&self, registry: &mut Registry, dir: &Path) -> ImportReport {
        let mut report = ImportReport::default();
        match collect_structure_files(dir, self.recursive) {
            Ok(files) => files
                .iter()
                .for_each(|f| self.import_one(registry, f, &mut report)),
            Err(e) => report.reject(Rejected::Unreadable {
                path: dir.to_path_buf(),
                message: e.to_string(),
            }),
        }
        report
    }

    fn import_one(&self, registry: &mut Registry, path: &Path, report: &mut ImportReport) {
        if structure::is_pdbqt(path) {
            match registry.register(path) {
                Ok(record) => report.accepted.push(record.path().clone()),
                Err(e) => report.reject(e),
            }
            return;
        }
        match self.convert(path) {
            Ok(outputs) => {
                for output in outputs {
                    match registry.register(&output) {
                        Ok(record) => report.accepted.push(record.path().clone()),
                        Err(e) => report.reject(e),
                    }
                }
            }
            Err(e) => report.reject(e),
        }
    }

    /// Convert a PDB or MOL2 file into one or more PDBQT files.
    fn convert(&self, path: &Path) -> Result<Vec<PathBuf>, Rejected> {
        let conversion = |message: String| Rejected::Conversion {
            path: path.to_path_buf(),
            message,
        };
        if !path.exists() {
            return Err(Rejected::Missing(path.to_path_buf()));
        }
        let preparer = self
            .preparer
            .ok_or_else(|| conversion("no structure preparer configured".into()))?;
        let outdir = self
            .conversion_dir
            .clone()
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_default();

        let is_mol2 = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("mol2"));
        let count = if is_mol2 {
            structure::count_mol2_molecules(path).map_err(|e| conversion(e.to_string()))?
        } else {
            1
        };
        if count == 0 {
            return Err(Rejected::NoAtoms(path.to_path_buf()));
        }

        let inputs = if count > 1 {
            let base = outdir.join(file_stem(path));
            structure::split_mol2(path, &base.join("mol2")).map_err(|e| conversion(e.to_string()))?
        } else {
            vec![path.to_path_buf()]
        };
        let pdbqt_dir = if count > 1 {
            outdir.join(file_stem(path)).join("pdbqt")
        } else {
            outdir
        };
        std::fs::create_dir_all(&pdbqt_dir).map_err(|e| conversion(e.to_string()))?;

        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let output = pdbqt_dir.join(format!("{}.pdbqt", file_stem(&input)));
            preparer
                .prepare_ligand(&input, &output)
                .map_err(|e| Rejected::Conversion {
                    path: input.clone(),
                    message: e.to_string(),
                })?;
            check_coordinates(&input, &output);
            outputs.push(output);
        }
        Ok(outputs)
    }
}

/// Warn if atoms moved during conversion.
fn check_coordinates(input: &Path, output: &Path) {
    let (Ok(before), Ok(after)) = (structure::read_structure(&input), structure::read_structure(&output)) else {
        return;
    };
    let drift = structure::coordinate_drift(&before, &after, COORDINATE_TOLERANCE);
    if drift > 0 {
        log::warn!(
            "{} atom(s) changed coordinates while converting {}",
            drift,
            input.display()
        );
    }
}

/// Structure files in a directory, sorted by name.
pub(crate) fn collect_structure_files(dir: &Path, recursive: bool) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    entries.sort();
    for entry in entries {
        if entry.is_dir() {
            if recursive {
                files.extend(collect_structure_files(&entry, true)?);
            }
        } else if structure::is_structure_file(&entry) {
            files.push(entry);
        }
    }
    Ok(files)
}
