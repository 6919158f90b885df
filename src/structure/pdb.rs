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

//! PDB reader. Models separated by `MODEL`/`ENDMDL` are returned as separate molecules.

use super::{Atom, StructureData, StructureIO};
use crate::Point;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug)]
pub(crate) struct PdbFormat;

/// True for `ATOM` and `HETATM` records.
pub(crate) fn is_atom_record(line: &str) -> bool {
    line.starts_with("ATOM") || line.starts_with("HETATM")
}

/// Extract a fixed column range, tolerating short lines.
pub(crate) fn column(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    line.get(start.min(end)..end).unwrap_or("").trim()
}

/// Parse name, residue name and coordinates of an `ATOM`/`HETATM` line.
pub(crate) fn parse_atom_line(line: &str, line_number: usize) -> anyhow::Result<Atom> {
    let coordinate = |start, end, axis| -> anyhow::Result<f64> {
        column(line, start, end).parse().map_err(|_| {
            anyhow::anyhow!("Invalid {} coordinate on line {}: '{}'", axis, line_number, line)
        })
    };
    let position = Point::new(
        coordinate(30, 38, "x")?,
        coordinate(38, 46, "y")?,
        coordinate(46, 54, "z")?,
    );
    let residue = Some(column(line, 17, 20).to_string()).filter(|s| !s.is_empty());
    Ok(Atom {
        name: column(line, 12, 16).to_string(),
        atom_type: String::new(),
        residue,
        position,
    })
}

impl StructureIO for PdbFormat {
    fn read(&self, path: &Path) -> anyhow::Result<Vec<StructureData>> {
        let file = File::open(path)
            .map_err(|e| anyhow::anyhow!("Cannot open '{}': {}", path.display(), e))?;
        let mut molecules = vec![StructureData::default()];
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.starts_with("ENDMDL") {
                molecules.push(StructureData::default());
            } else if is_atom_record(&line) {
                let mut atom = parse_atom_line(&line, i + 1)?;
                let element = column(&line, 76, 78);
                atom.atom_type = if element.is_empty() {
                    atom.name.chars().filter(|c| c.is_alphabetic()).take(1).collect()
                } else {
                    element.to_string()
                };
                if let Some(molecule) = molecules.last_mut() {
                    molecule.atoms.push(atom);
                }
            }
        }
        molecules.retain(|m| !m.atoms.is_empty());
        Ok(molecules)
    }
}
