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

//! Ligand filters.
//!
//! [`classify`] is a pure function of the registry and a valid rule set.
//! [`apply`] first corrects the rules (falling back to a preset when they are
//! inconsistent), then classifies and stores the verdicts in the registry.

use crate::registry::{LigandRecord, Registry};
use crate::MAX_TORSDOF;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::{Validate, ValidationError};

/// Closed interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }
}

impl<T: std::fmt::Display> std::fmt::Display for Bounds<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>6}  -  {}", self.min, self.max)
    }
}

/// Named filter presets with fixed bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum FilterPreset {
    #[default]
    #[display("Default")]
    Default,
    #[display("Lipinski-like")]
    LipinskiLike,
    #[display("DrugLikeness")]
    DrugLikeness,
    #[display("DrugLikeness (fragment)")]
    DrugLikenessFragment,
}

impl FilterPreset {
    /// Bounds of this preset. Rotatable bonds span `0..=MAX_TORSDOF - flex_torsions`.
    pub fn rules(self, flex_torsions: usize) -> FilterRules {
        let (donors, acceptors, weight, heavy_atoms) = match self {
            Self::Default => ((0, 99), (0, 99), (0.0, 9999.0), (0, 999)),
            Self::LipinskiLike => ((0, 5), (0, 10), (0.0, 500.0), (0, 999)),
            Self::DrugLikeness => ((0, 5), (0, 10), (160.0, 480.0), (20, 70)),
            Self::DrugLikenessFragment => ((0, 3), (0, 6), (160.0, 250.0), (6, 45)),
        };
        FilterRules {
            donors: Bounds::new(donors.0, donors.1),
            acceptors: Bounds::new(acceptors.0, acceptors.1),
            weight: Bounds::new(weight.0, weight.1),
            heavy_atoms: Bounds::new(heavy_atoms.0, heavy_atoms.1),
            torsions: Bounds::new(0, effective_torsion_max(MAX_TORSDOF, flex_torsions)),
            reject_non_standard: true,
        }
    }
}

/// Largest ligand rotatable-bond count left once flexible residues take their share.
pub fn effective_torsion_max(ceiling: usize, flex_torsions: usize) -> usize {
    ceiling.saturating_sub(flex_torsions)
}

/// Acceptance bounds for ligands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_rules"))]
pub struct FilterRules {
    /// Hydrogen-bond donors.
    pub donors: Bounds<usize>,
    /// Hydrogen-bond acceptors.
    pub acceptors: Bounds<usize>,
    /// Molecular weight.
    pub weight: Bounds<f64>,
    /// Heavy atoms.
    pub heavy_atoms: Bounds<usize>,
    /// Rotatable bonds.
    pub torsions: Bounds<usize>,
    /// Reject ligands with atom types outside the weight table.
    pub reject_non_standard: bool,
}

impl Default for FilterRules {
    fn default() -> Self {
        FilterPreset::Default.rules(0)
    }
}

fn validate_rules(rules: &FilterRules) -> Result<(), ValidationError> {
    if !(rules.donors.is_ordered()
        && rules.acceptors.is_ordered()
        && rules.weight.is_ordered()
        && rules.heavy_atoms.is_ordered()
        && rules.torsions.is_ordered())
    {
        return Err(ValidationError::new("filter minimum larger than maximum"));
    }
    Ok(())
}

impl FilterRules {
    /// Make the rules consistent with the rotatable-bond ceiling.
    ///
    /// A torsion maximum that leaves no room for `flex_torsions` resets the
    /// torsion bounds; any remaining `min > max` resets all bounds to `preset`.
    /// Returns the corrected rules and a note per correction made.
    pub fn corrected(&self, preset: FilterPreset, flex_torsions: usize) -> (FilterRules, Vec<String>) {
        let mut rules = self.clone();
        let mut notes = Vec::new();
        let ceiling = effective_torsion_max(MAX_TORSDOF, flex_torsions);
        if rules.torsions.max + flex_torsions > MAX_TORSDOF {
            notes.push(format!(
                "rotatable bond maximum {} plus {} flexible residue bond(s) exceeds {}; reset to {}",
                rules.torsions.max, flex_torsions, MAX_TORSDOF, ceiling
            ));
            rules.torsions = Bounds::new(0, ceiling);
        }
        if rules.validate().is_err() {
            notes.push(format!(
                "filter minimum larger than maximum; reset to the {} preset",
                preset
            ));
            rules = preset.rules(flex_torsions);
        }
        for note in &notes {
            log::warn!("Filter correction: {}", note);
        }
        (rules, notes)
    }
}

/// Why a ligand failed the filters.
#[derive(Debug, Clone, PartialEq, Serialize, Display)]
pub enum RejectReason {
    #[display("non-standard atom type")]
    NonStandard,
    #[display("{_0} hydrogen-bond donors")]
    Donors(usize),
    #[display("{_0} hydrogen-bond acceptors")]
    Acceptors(usize),
    #[display("molecular weight {_0:.1}")]
    Weight(f64),
    #[display("{_0} heavy atoms")]
    HeavyAtoms(usize),
    #[display("{_0} rotatable bonds")]
    Torsions(usize),
}

/// Accept/reject partition in registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Partition {
    pub accepted: Vec<PathBuf>,
    /// Rejected ligands with every rule they break.
    pub rejected: Vec<(PathBuf, Vec<RejectReason>)>,
}

/// Every rule a ligand breaks; empty if it passes.
pub fn violations(ligand: &LigandRecord, rules: &FilterRules) -> Vec<RejectReason> {
    let mut reasons = Vec::new();
    if rules.reject_non_standard && *ligand.non_standard() {
        reasons.push(RejectReason::NonStandard);
    }
    if !rules.donors.contains(*ligand.donors()) {
        reasons.push(RejectReason::Donors(*ligand.donors()));
    }
    if !rules.acceptors.contains(*ligand.acceptors()) {
        reasons.push(RejectReason::Acceptors(*ligand.acceptors()));
    }
    if !rules.weight.contains(*ligand.weight()) {
        reasons.push(RejectReason::Weight(*ligand.weight()));
    }
    if !rules.heavy_atoms.contains(*ligand.heavy_atoms()) {
        reasons.push(RejectReason::HeavyAtoms(*ligand.heavy_atoms()));
    }
    if !rules.torsions.contains(*ligand.torsions()) {
        reasons.push(RejectReason::Torsions(*ligand.torsions()));
    }
    reasons
}

/// Partition the registry. `rules` must be valid (see [`FilterRules::corrected`]).
pub fn classify(registry: &Registry, rules: &FilterRules) -> Partition {
    debug_assert!(rules.validate().is_ok());
    let mut partition = Partition::default();
    for ligand in registry.ligands() {
        let reasons = violations(ligand, rules);
        if reasons.is_empty() {
            partition.accepted.push(ligand.path().clone());
        } else {
            partition.rejected.push((ligand.path().clone(), reasons));
        }
    }
    partition
}

/// Correct the rules, classify, and store the verdicts in the registry.
///
/// Returns the rules actually used together with the partition.
pub fn apply(
    registry: &mut Registry,
    rules: &FilterRules,
    preset: FilterPreset,
    flex_torsions: usize,
) -> (FilterRules, Partition) {
    let (rules, _) = rules.corrected(preset, flex_torsions);
    let partition = classify(registry, &rules);
    for ligand in registry.ligands_mut() {
        let accepted = partition.accepted.contains(ligand.path());
        ligand.set_accepted(accepted);
    }
    log::info!(
        "Filter: {} accepted, {} rejected",
        partition.accepted.len(),
        partition.rejected.len()
    );
    (rules, partition)
}
