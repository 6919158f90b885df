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

//! Plain-text ligand lists: one path per line, `#` starts a comment line.

use super::LigandRecord;
use anyhow::Context;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Paths read from a ligand list.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LigandList {
    /// Entries that resolve to an existing file.
    pub found: Vec<PathBuf>,
    /// Entries that do not resolve.
    pub missing: Vec<PathBuf>,
}

/// Read a ligand list. Relative entries are resolved against the list's directory.
pub fn import_ligand_list(path: &Path) -> anyhow::Result<LigandList> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read ligand list '{}'", path.display()))?;
    let base = path.parent().unwrap_or(Path::new(""));
    let mut list = LigandList::default();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry = base.join(line);
        if entry.is_file() {
            list.found.push(entry);
        } else {
            list.missing.push(entry);
        }
    }
    if !list.missing.is_empty() {
        log::warn!(
            "{} of {} entries in {} could not be found",
            list.missing.len(),
            list.missing.len() + list.found.len(),
            path.display()
        );
        for missing in &list.missing {
            log::debug!("Missing ligand: {}", missing.display());
        }
    }
    Ok(list)
}

/// Write the paths of `ligands` as a ligand list.
pub fn export_ligand_list<'a>(
    path: &Path,
    ligands: impl IntoIterator<Item = &'a LigandRecord>,
) -> anyhow::Result<usize> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Cannot create ligand list '{}'", path.display()))?;
    writeln!(
        file,
        "# Ligand list saved by {} {} on {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        chrono::Local::now().format("%Y-%m-%d %H:%M")
    )?;
    let mut count = 0;
    for ligand in ligands {
        writeln!(file, "{}", ligand.path().display())?;
        count += 1;
    }
    log::info!("Saved {} ligand(s) to {}", count, path.display());
    Ok(count)
}
