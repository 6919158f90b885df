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

//! AutoDock 4 atom types and the shared atom-type usage table.
//!
//! The usage table counts, for every atom type, how many registered ligands
//! expose it. It is consulted when deciding which grid maps must exist.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Electrostatics pseudo-type. Its map is always required.
pub const ELECTROSTATIC: &str = "e";
/// Desolvation pseudo-type. Its map is always required.
pub const DESOLVATION: &str = "d";
/// Both pseudo-types in the order AutoGrid writes them.
pub const PSEUDO_TYPES: [&str; 2] = [ELECTROSTATIC, DESOLVATION];

/// Weight assigned to atom types missing from the weight table.
pub const UNKNOWN_TYPE_WEIGHT: f64 = 10000.0;

/// Approximate atomic weights for the AutoDock 4 atom types.
const WEIGHTS: [(&str, f64); 31] = [
    ("H", 1.0),
    ("HD", 1.0),
    ("HS", 1.0),
    ("C", 12.0),
    ("A", 12.0),
    ("N", 14.0),
    ("NA", 14.0),
    ("NS", 14.0),
    ("OA", 16.0),
    ("OS", 16.0),
    ("F", 19.0),
    ("Mg", 24.0),
    ("MG", 24.0),
    ("P", 31.0),
    ("SA", 32.0),
    ("S", 32.0),
    ("Cl", 35.4),
    ("CL", 35.4),
    ("Ca", 40.0),
    ("CA", 40.0),
    ("Mn", 55.0),
    ("MN", 55.0),
    ("Fe", 56.0),
    ("FE", 56.0),
    ("Zn", 65.4),
    ("ZN", 65.4),
    ("Br", 80.0),
    ("BR", 80.0),
    ("I", 126.0),
    ("e", 0.0),
    ("d", 0.0),
];

/// Return the tabulated weight of an atom type, if known.
pub fn weight(atom_type: &str) -> Option<f64> {
    WEIGHTS
        .iter()
        .find(|(name, _)| *name == atom_type)
        .map(|(_, w)| *w)
}

/// True if the atom type is in the weight table.
pub fn is_standard(atom_type: &str) -> bool {
    weight(atom_type).is_some()
}

/// Hydrogen-bond acceptor types.
pub fn is_acceptor(atom_type: &str) -> bool {
    matches!(atom_type, "OA" | "NA" | "SA")
}

/// Heavy atoms that may donate a hydrogen bond if a polar hydrogen is bound.
pub fn is_donor_candidate(atom_type: &str) -> bool {
    matches!(atom_type, "N" | "O" | "OA" | "NA")
}

/// Polar hydrogen.
pub fn is_polar_hydrogen(atom_type: &str) -> bool {
    atom_type == "HD"
}

/// Any hydrogen type; excluded from heavy-atom counts.
pub fn is_hydrogen(atom_type: &str) -> bool {
    matches!(atom_type, "H" | "HD" | "HS")
}

/// Number of registered ligands exposing each atom type.
///
/// The pseudo-types are pinned to one so their maps are always requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomTypeUsage(BTreeMap<String, usize>);

impl Default for AtomTypeUsage {
    fn default() -> Self {
        let mut usage = Self(BTreeMap::new());
        usage.clear();
        usage
    }
}

impl AtomTypeUsage {
    /// Reset all counters; pseudo-types stay at one.
    pub fn clear(&mut self) {
        self.0.values_mut().for_each(|count| *count = 0);
        for pseudo in PSEUDO_TYPES {
            self.0.insert(pseudo.to_string(), 1);
        }
    }

    /// Count one more ligand exposing each of `types`.
    pub fn add<'a>(&mut self, types: impl IntoIterator<Item = &'a String>) {
        for atom_type in types {
            if !PSEUDO_TYPES.contains(&atom_type.as_str()) {
                *self.0.entry(atom_type.clone()).or_insert(0) += 1;
            }
        }
    }

    /// Count one less ligand exposing each of `types`.
    pub fn remove<'a>(&mut self, types: impl IntoIterator<Item = &'a String>) {
        for atom_type in types {
            if PSEUDO_TYPES.contains(&atom_type.as_str()) {
                continue;
            }
            if let Some(count) = self.0.get_mut(atom_type) {
                *count = count.saturating_sub(1);
            }
        }
    }

    /// Current count for an atom type.
    pub fn count(&self, atom_type: &str) -> usize {
        self.0.get(atom_type).copied().unwrap_or(0)
    }

    /// Atom types with a non-zero count, pseudo-types included.
    pub fn in_use(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(name, _)| name.as_str())
    }

    /// Real (non-pseudo) atom types with a non-zero count.
    pub fn required_types(&self) -> Vec<String> {
        self.in_use()
            .filter(|t| !PSEUDO_TYPES.contains(t))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights() {
        assert_eq!(weight("C"), Some(12.0));
        assert_eq!(weight("Zn"), Some(65.4));
        assert_eq!(weight("Xx"), None);
        assert!(is_standard("HD"));
        assert!(!is_standard("Se"));
    }

    #[test]
    fn usage_pseudo_types_pinned() {
        let mut usage = AtomTypeUsage::default();
        assert_eq!(usage.count("e"), 1);
        assert_eq!(usage.count("d"), 1);
        let types = vec!["C".to_string(), "e".to_string()];
        usage.add(&types);
        assert_eq!(usage.count("C"), 1);
        assert_eq!(usage.count("e"), 1);
        usage.remove(&types);
        usage.remove(&types);
        assert_eq!(usage.count("C"), 0);
        assert_eq!(usage.count("e"), 1);
        usage.add(&types);
        usage.clear();
        assert_eq!(usage.count("C"), 0);
        assert_eq!(usage.count("d"), 1);
        assert!(usage.required_types().is_empty());
    }
}
