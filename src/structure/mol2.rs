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

//! Tripos MOL2 reader and multi-structure splitter.

use super::{Atom, StructureData, StructureIO};
use crate::Point;
use anyhow::Context;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const MOLECULE_TAG: &str = "@<TRIPOS>MOLECULE";
const ATOM_TAG: &str = "@<TRIPOS>ATOM";

#[derive(Debug)]
pub(crate) struct Mol2Format;

impl StructureIO for Mol2Format {
    fn read(&self, path: &Path) -> anyhow::Result<Vec<StructureData>> {
        let file = File::open(path)
            .map_err(|e| anyhow::anyhow!("Cannot open '{}': {}", path.display(), e))?;
        let mut molecules: Vec<StructureData> = Vec::new();
        let mut in_atoms = false;
        let mut expect_name = false;

        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.starts_with(MOLECULE_TAG) {
                molecules.push(StructureData::default());
                in_atoms = false;
                expect_name = true;
                continue;
            }
            if line.starts_with("@<TRIPOS>") {
                in_atoms = line.starts_with(ATOM_TAG);
                continue;
            }
            let Some(molecule) = molecules.last_mut() else {
                continue;
            };
            if expect_name {
                molecule.name = Some(line.trim().to_string()).filter(|s| !s.is_empty());
                expect_name = false;
            } else if in_atoms && !line.trim().is_empty() {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() < 6 {
                    anyhow::bail!(
                        "Malformed atom line {} in {}: '{}'",
                        i + 1,
                        path.display(),
                        line
                    );
                }
                let coordinate = |s: &str| -> anyhow::Result<f64> {
                    s.parse()
                        .map_err(|_| anyhow::anyhow!("Invalid coordinate on line {}", i + 1))
                };
                molecule.atoms.push(Atom {
                    name: parts[1].to_string(),
                    atom_type: parts[5].to_string(),
                    residue: parts.get(7).map(|s| s.to_string()),
                    position: Point::new(
                        coordinate(parts[2])?,
                        coordinate(parts[3])?,
                        coordinate(parts[4])?,
                    ),
                });
            }
        }
        Ok(molecules)
    }
}

/// Number of molecules in a MOL2 file.
pub fn count_mol2_molecules(path: &Path) -> anyhow::Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    Ok(content.lines().filter(|l| l.contains(MOLECULE_TAG)).count())
}

/// Split a multi-structure MOL2 into one file per molecule inside `outdir`.
///
/// Files are named after the ZINC identifier when the molecule name carries
/// one, otherwise `<stem>_<nnnnnn>.mol2` with a 1-based counter. Returns the
/// written files in encounter order.
pub fn split_mol2(path: &Path, outdir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    std::fs::create_dir_all(outdir)
        .with_context(|| format!("Cannot create '{}'", outdir.display()))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("molecule");

    let mut blocks: Vec<Vec<&str>> = Vec::new();
    for line in content.lines() {
        if line.contains(MOLECULE_TAG) || blocks.is_empty() {
            blocks.push(Vec::new());
        }
        if let Some(block) = blocks.last_mut() {
            block.push(line);
        }
    }
    // drop any header before the first molecule
    blocks.retain(|b| b.first().is_some_and(|l| l.contains(MOLECULE_TAG)));

    let mut written = Vec::with_capacity(blocks.len());
    for (count, block) in blocks.iter().enumerate() {
        let zinc_id = block
            .iter()
            .find(|l| l.starts_with("ZINC"))
            .and_then(|l| l.split_whitespace().next());
        let filename = match zinc_id {
            Some(id) => format!("{id}.mol2"),
            None => format!("{}_{:06}.mol2", stem, count + 1),
        };
        let output = outdir.join(filename);
        let mut text = block.join("\n");
        text.push('\n');
        std::fs::write(&output, text)
            .with_context(|| format!("Cannot write '{}'", output.display()))?;
        written.push(output);
    }
    log::info!(
        "Split {} into {} molecule(s) in {}",
        path.display(),
        written.len(),
        outdir.display()
    );
    Ok(written)
}
