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

//! PDBQT reader.
//!
//! The AutoDock atom type is the last whitespace-separated token of an atom
//! record. Tree records (`ROOT`, `BRANCH`, `TORSDOF`, `BEGIN_RES`) are tallied
//! but not interpreted further.

use super::pdb::{is_atom_record, parse_atom_line};
use super::{StructureData, StructureIO};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug)]
pub(crate) struct PdbqtFormat;

impl StructureIO for PdbqtFormat {
    fn read(&self, path: &Path) -> anyhow::Result<Vec<StructureData>> {
        let file = File::open(path)
            .map_err(|e| anyhow::anyhow!("Cannot open '{}': {}", path.display(), e))?;
        let mut data = StructureData::default();

        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if is_atom_record(&line) {
                let mut atom = parse_atom_line(&line, i + 1)?;
                atom.atom_type = line
                    .split_whitespace()
                    .last()
                    .map(str::to_string)
                    .unwrap_or_default();
                data.atoms.push(atom);
            } else if line.starts_with("ROOT") {
                data.has_root = true;
            } else if line.starts_with("BRANCH") {
                data.branches += 1;
            } else if line.starts_with("BEGIN_RES") {
                data.has_flex_residues = true;
            } else if line.starts_with("TORSDOF") {
                data.torsdof = line
                    .split_whitespace()
                    .nth(1)
                    .and_then(|n| n.parse().ok());
                if data.torsdof.is_none() {
                    log::warn!("Malformed TORSDOF record in {}: '{}'", path.display(), line);
                }
            } else if line.contains("active torsions") {
                if let Some(n) = line.split_whitespace().nth(1).and_then(|n| n.parse::<usize>().ok()) {
                    data.active_torsions += n;
                }
            }
        }
        Ok(vec![data])
    }
}
