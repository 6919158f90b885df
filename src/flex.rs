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

//! Flexible receptor residues.
//!
//! Residues are given either as a ready-made flexible-residue PDBQT file or
//! as a selection like `THR276, B:HIS229` resolved against every receptor
//! conformation. The two modes count rotatable bonds differently: a file
//! contributes the sum of its `active torsions` remarks, a selection the
//! tabulated value of each residue.

use crate::structure::{self, pdb_column};
use crate::MAX_TORSDOF;
use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Rotatable bonds and atom types of flexible amino acid side chains.
const RESIDUE_TABLE: [(&str, usize, &[&str]); 21] = [
    ("GLY", 0, &[]),
    ("ALA", 0, &[]),
    ("PRO", 0, &[]),
    ("VAL", 1, &["C"]),
    ("LEU", 2, &["C"]),
    ("SER", 2, &["C", "OA", "HD"]),
    ("THR", 2, &["C", "OA", "HD"]),
    ("CYS", 2, &["C", "SA", "HD"]),
    ("ASN", 2, &[]),
    ("PHE", 2, &["A", "C"]),
    ("TRP", 2, &["C", "A", "N", "HD"]),
    ("HIE", 2, &["C", "A", "NA", "N", "HD"]),
    ("HIS", 2, &["C", "A", "NA", "N", "HD"]),
    ("ASP", 2, &["C", "OA"]),
    ("ILE", 2, &["C"]),
    ("GLN", 3, &["C", "OA", "N", "HD"]),
    ("TYR", 3, &["C", "A", "OA", "HD"]),
    ("GLU", 3, &["C", "OA"]),
    ("MET", 3, &["C", "S"]),
    ("ARG", 4, &["C", "N", "HD"]),
    ("LYS", 5, &["C", "N", "HD"]),
];

/// Tabulated rotatable bonds and atom types of a residue.
pub fn residue_info(name: &str) -> Option<(usize, &'static [&'static str])> {
    RESIDUE_TABLE
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, torsions, types)| (*torsions, *types))
}

/// Malformed residue selection.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionError {
    /// Error message.
    pub message: String,
    /// Offending token.
    pub token: String,
}

impl std::fmt::Display for SelectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in '{}'", self.message, self.token)
    }
}

impl std::error::Error for SelectionError {}

/// One residue of a selection: `THR276` or `B:THR276`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResidueSelector {
    pub chain: Option<String>,
    pub name: String,
    pub number: String,
}

impl std::fmt::Display for ResidueSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.chain {
            Some(chain) => write!(f, "{}:{}{}", chain, self.name, self.number),
            None => write!(f, "{}{}", self.name, self.number),
        }
    }
}

impl std::str::FromStr for ResidueSelector {
    type Err = SelectionError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        let error = |message: &str| SelectionError {
            message: message.to_string(),
            token: token.to_string(),
        };
        let pattern = Regex::new(r"^(?:([A-Za-z0-9]):)?([A-Za-z]{3})(-?\d+[A-Za-z]?)$")
            .map_err(|e| error(&e.to_string()))?;
        let captures = pattern.captures(token).ok_or_else(|| {
            let residue = token.rsplit_once(':').map_or(token, |(_, r)| r);
            if residue.len() <= 3 {
                error("missing residue number")
            } else {
                error("expected RES<number> or <chain>:RES<number>")
            }
        })?;
        Ok(Self {
            chain: captures.get(1).map(|m| m.as_str().to_string()),
            name: captures[2].to_ascii_uppercase(),
            number: captures[3].to_string(),
        })
    }
}

impl ResidueSelector {
    /// True if an `ATOM`/`HETATM` line belongs to this residue.
    fn matches(&self, line: &str) -> bool {
        pdb_column(line, 17, 20) == self.name
            && pdb_column(line, 22, 26) == self.number
            && self
                .chain
                .as_deref()
                .map_or(true, |chain| pdb_column(line, 21, 22) == chain)
    }
}

/// Parse a comma separated residue selection. Repeated residues are dropped.
pub fn parse_selection(selection: &str) -> Result<Vec<ResidueSelector>, SelectionError> {
    let residues: Vec<ResidueSelector> = selection
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::parse)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .unique()
        .collect();
    if residues.is_empty() {
        return Err(SelectionError {
            message: "empty residue selection".into(),
            token: selection.to_string(),
        });
    }
    Ok(residues)
}

/// Errors while resolving flexible residues.
#[derive(Debug, Error)]
pub enum FlexError {
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("{0} is not a flexible residue file (no BEGIN_RES record)")]
    NotAFlexFile(PathBuf),
    #[error("cannot read {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
    #[error("residue(s) {residues} not found in {receptor}")]
    ResidueNotFound { residues: String, receptor: PathBuf },
    #[error("no rotatable bond data for residue {0}")]
    UnknownResidue(String),
    #[error("flexible residues have {count} rotatable bonds; at most {ceiling} are allowed")]
    TooManyTorsions { count: usize, ceiling: usize },
}

/// Flexible residue source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlexibleResidueSpec {
    /// Pre-built flexible residue file, used as is for every receptor.
    FromFile(PathBuf),
    /// Residue selection split out of each receptor conformation.
    FromSelection(String),
}

/// A checked flexible residue specification.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFlex {
    /// Rotatable bonds contributed to every job.
    pub torsions: usize,
    /// Atom types expected in the flexible part.
    pub atom_types: BTreeSet<String>,
    /// Parsed selection; empty in file mode.
    pub residues: Vec<ResidueSelector>,
}

impl FlexibleResidueSpec {
    /// Check the specification against the receptor conformations.
    ///
    /// A file must contain flexible residues; every selected residue must be
    /// present in every receptor. The rotatable bond total may not exceed
    /// [`MAX_TORSDOF`]; reaching it exactly is allowed with a warning.
    pub fn resolve(&self, receptors: &[&Path]) -> Result<ResolvedFlex, FlexError> {
        let resolved = match self {
            Self::FromFile(path) => {
                let data = structure::read_molecules(path)
                    .map_err(|e| FlexError::Unreadable {
                        path: path.clone(),
                        message: e.to_string(),
                    })?
                    .into_iter()
                    .next()
                    .unwrap_or_default();
                if !data.has_flex_residues {
                    return Err(FlexError::NotAFlexFile(path.clone()));
                }
                ResolvedFlex {
                    torsions: data.active_torsions,
                    atom_types: data.atoms.into_iter().map(|a| a.atom_type).collect(),
                    residues: Vec::new(),
                }
            }
            Self::FromSelection(selection) => {
                let residues = parse_selection(selection)?;
                for receptor in receptors {
                    find_residues(receptor, &residues)?;
                }
                let mut torsions = 0;
                let mut atom_types = BTreeSet::new();
                for residue in &residues {
                    let (n, types) = residue_info(&residue.name)
                        .ok_or_else(|| FlexError::UnknownResidue(residue.name.clone()))?;
                    torsions += n;
                    atom_types.extend(types.iter().map(|t| t.to_string()));
                }
                ResolvedFlex {
                    torsions,
                    atom_types,
                    residues,
                }
            }
        };
        if resolved.torsions > MAX_TORSDOF {
            return Err(FlexError::TooManyTorsions {
                count: resolved.torsions,
                ceiling: MAX_TORSDOF,
            });
        }
        if resolved.torsions == MAX_TORSDOF {
            log::warn!(
                "Flexible residues use all {} rotatable bonds; only rigid ligands can be docked",
                MAX_TORSDOF
            );
        }
        log::info!(
            "Flexible residues contribute {} rotatable bond(s)",
            resolved.torsions
        );
        Ok(resolved)
    }

    /// Short description for the run log.
    pub fn describe(&self) -> String {
        match self {
            Self::FromFile(path) => format!("from the file :\t{}", path.display()),
            Self::FromSelection(selection) => format!("generated from the selection : {}", selection),
        }
    }
}

/// Check that all residues occur in a receptor file.
fn find_residues(receptor: &Path, residues: &[ResidueSelector]) -> Result<(), FlexError> {
    let content = std::fs::read_to_string(receptor).map_err(|e| FlexError::Unreadable {
        path: receptor.to_path_buf(),
        message: e.to_string(),
    })?;
    let atom_lines: Vec<&str> = content
        .lines()
        .filter(|l| l.starts_with("ATOM") || l.starts_with("HETATM"))
        .collect();
    let missing = residues
        .iter()
        .filter(|r| !atom_lines.iter().any(|line| r.matches(line)))
        .join(", ");
    if missing.is_empty() {
        Ok(())
    } else {
        Err(FlexError::ResidueNotFound {
            residues: missing,
            receptor: receptor.to_path_buf(),
        })
    }
}
