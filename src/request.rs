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

//! Everything a generation run needs, fixed before the run starts.

use crate::archive::ArchiveFormat;
use crate::filter::FilterRules;
use crate::flex::{FlexError, FlexibleResidueSpec, ResolvedFlex};
use crate::maps::{GridMapSet, MapError, TransferMode};
use crate::params::Template;
use crate::receptor::{self, ReceptorSpec};
use crate::registry::{LigandRecord, Rejected};
use derive_builder::Builder;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Reasons for refusing to start a run. None of them leave anything on disk.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("no accepted ligands")]
    NoLigands,
    #[error("ligand {0} was rejected by the filters")]
    RejectedLigand(PathBuf),
    #[error("no receptor")]
    NoReceptors,
    #[error("the docking parameter template is empty")]
    EmptyDockingTemplate,
    #[error(transparent)]
    Receptor(#[from] Rejected),
    #[error(transparent)]
    Flex(#[from] FlexError),
    #[error(transparent)]
    Maps(#[from] MapError),
    #[error("parameter file {0} does not exist")]
    MissingParameterFile(PathBuf),
    #[error("maps must be computed now but no grid engine is available")]
    NoGridEngine,
    #[error("splitting flexible residues requires a structure preparer")]
    NoPreparer,
}

/// Where the grid maps of each job come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MapPolicy {
    /// Every job carries a grid parameter file and computes its own maps.
    PerJob,
    /// Maps are computed once per receptor before its jobs are laid out.
    PrecomputeNow {
        #[serde(default)]
        transfer: TransferMode,
    },
    /// Maps are taken from an existing directory.
    Cached {
        dir: PathBuf,
        #[serde(default)]
        transfer: TransferMode,
    },
}

impl MapPolicy {
    /// How maps reach the job directories, if they are provisioned at all.
    pub fn transfer(&self) -> Option<TransferMode> {
        match self {
            Self::PerJob => None,
            Self::PrecomputeNow { transfer } | Self::Cached { transfer, .. } => Some(*transfer),
        }
    }

    /// True when generated files include grid parameter files.
    pub fn uses_grid_template(&self) -> bool {
        !matches!(self, Self::Cached { .. })
    }
}

/// Batch-queue (PBS) submission settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PbsSettings {
    /// CPU and wall time per job as `hh:mm:ss`.
    #[validate(custom(function = "validate_time"))]
    pub time: String,
    /// Docking runs per ligand.
    #[validate(range(min = 1))]
    pub runs: usize,
}

const DEFAULT_PBS_TIME: &str = "24:00:00";
/// Runs per ligand above which a warning is issued.
const MANY_RUNS: usize = 255;

impl Default for PbsSettings {
    fn default() -> Self {
        Self {
            time: DEFAULT_PBS_TIME.to_string(),
            runs: 1,
        }
    }
}

fn validate_time(time: &str) -> Result<(), ValidationError> {
    let fields: Option<Vec<u32>> = time.split(':').map(|f| f.trim().parse().ok()).collect();
    match fields.as_deref() {
        Some([h, m, s]) if *m < 60 && *s < 60 && h + m + s > 0 => Ok(()),
        _ => Err(ValidationError::new("time must be hh:mm:ss and not zero")),
    }
}

impl PbsSettings {
    /// Reset malformed values to the defaults, with a note for each reset.
    pub fn corrected(&self) -> (Self, Vec<String>) {
        let mut settings = self.clone();
        let mut notes = Vec::new();
        if validate_time(&settings.time).is_err() {
            notes.push(format!(
                "time '{}' is not hh:mm:ss; reset to {}",
                settings.time, DEFAULT_PBS_TIME
            ));
            settings.time = DEFAULT_PBS_TIME.to_string();
        }
        if settings.runs == 0 {
            notes.push("runs per ligand must be at least 1; reset to 1".to_string());
            settings.runs = 1;
        }
        if settings.runs > MANY_RUNS {
            log::warn!("{} runs per ligand is very high", settings.runs);
        }
        for note in &notes {
            log::warn!("Batch queue correction: {}", note);
        }
        (settings, notes)
    }
}

/// Where the jobs will be executed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetEnvironment {
    #[default]
    Workstation,
    BatchQueue(PbsSettings),
    Windows,
}

impl std::fmt::Display for TargetEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Workstation => write!(f, "workstation"),
            Self::BatchQueue(_) => write!(f, "PBS cluster"),
            Self::Windows => write!(f, "Windows"),
        }
    }
}

/// Immutable description of one generation run.
///
/// Assembled with [`GenerationRequestBuilder`]; `build` refuses incomplete
/// requests before anything is written.
#[derive(Debug, Clone, Builder, Getters)]
#[builder(build_fn(skip), derive(Debug))]
pub struct GenerationRequest {
    /// Root of the job tree.
    #[builder(setter(into))]
    output_root: PathBuf,
    /// Accepted ligands in registration order.
    ligands: Vec<LigandRecord>,
    receptors: ReceptorSpec,
    #[builder(setter(strip_option))]
    flex: Option<FlexibleResidueSpec>,
    maps: MapPolicy,
    /// Docking parameter template.
    dpf: Template,
    /// Grid parameter template; empty means AutoGrid defaults.
    gpf: Template,
    target: TargetEnvironment,
    /// Write a master script per receptor and one for the whole tree.
    master_script: bool,
    #[builder(setter(strip_option))]
    archive: Option<ArchiveFormat>,
    /// Filter used to accept the ligands; recorded in the run log.
    filter: FilterRules,
    /// Atom types counted by the registry's usage table. The map cache must
    /// cover them even when no accepted ligand carries them.
    map_types: Vec<String>,
}

impl GenerationRequestBuilder {
    pub fn build(&self) -> Result<GenerationRequest, RequestError> {
        let output_root = self
            .output_root
            .clone()
            .ok_or(RequestError::Missing("output directory"))?;
        let ligands = self.ligands.clone().unwrap_or_default();
        if ligands.is_empty() {
            return Err(RequestError::NoLigands);
        }
        if let Some(rejected) = ligands.iter().find(|l| !*l.accepted()) {
            return Err(RequestError::RejectedLigand(rejected.path().clone()));
        }
        let receptors = self.receptors.clone().ok_or(RequestError::NoReceptors)?;
        if receptors.is_empty() {
            return Err(RequestError::NoReceptors);
        }
        let maps = self
            .maps
            .clone()
            .ok_or(RequestError::Missing("map policy"))?;
        let dpf = self
            .dpf
            .clone()
            .ok_or(RequestError::Missing("docking parameter template"))?;
        if dpf.is_empty() {
            return Err(RequestError::EmptyDockingTemplate);
        }
        let target = match self.target.clone().unwrap_or_default() {
            TargetEnvironment::BatchQueue(settings) => {
                TargetEnvironment::BatchQueue(settings.corrected().0)
            }
            other => other,
        };
        Ok(GenerationRequest {
            output_root,
            ligands,
            receptors,
            flex: self.flex.clone().flatten(),
            maps,
            dpf,
            gpf: self.gpf.clone().unwrap_or_default(),
            target,
            master_script: self.master_script.unwrap_or(true),
            archive: self.archive.clone().flatten(),
            filter: self.filter.clone().unwrap_or_default(),
            map_types: self.map_types.clone().unwrap_or_default(),
        })
    }
}

/// Read-only checks done before the first directory is created.
#[derive(Debug, Clone)]
pub struct Preflight {
    /// Validated receptor conformations.
    pub receptors: Vec<PathBuf>,
    pub flex: Option<ResolvedFlex>,
    /// Validated map cache for [`MapPolicy::Cached`].
    pub cache: Option<GridMapSet>,
}

impl GenerationRequest {
    pub fn total_jobs(&self) -> usize {
        self.ligands.len() * self.receptors.conformations().len()
    }

    /// Atom types needing a map: the registry's types in use, every ligand
    /// type and any flexible residue type.
    pub fn required_types(&self, flex: Option<&ResolvedFlex>) -> BTreeSet<String> {
        self.map_types
            .iter()
            .cloned()
            .chain(self.ligands.iter().flat_map(|l| l.atom_types().iter().cloned()))
            .chain(flex.iter().flat_map(|f| f.atom_types.iter().cloned()))
            .collect()
    }

    /// Validate receptors, flexible residues, parameter files and the map cache.
    pub fn preflight(&self) -> Result<Preflight, RequestError> {
        let receptors: Vec<PathBuf> = self
            .receptors
            .conformations()
            .into_iter()
            .map(|path| receptor::validate_receptor(path).map(|_| path.to_path_buf()))
            .collect::<Result<_, _>>()?;

        let flex = match &self.flex {
            Some(spec) => {
                let paths: Vec<&std::path::Path> = receptors.iter().map(PathBuf::as_path).collect();
                Some(spec.resolve(&paths)?)
            }
            None => None,
        };

        let mut templates = vec![&self.dpf];
        if self.maps.uses_grid_template() {
            templates.push(&self.gpf);
        }
        if let Some(missing) = templates
            .into_iter()
            .filter_map(Template::parameter_file)
            .find(|path| !path.is_file())
        {
            return Err(RequestError::MissingParameterFile(missing));
        }

        let cache = match &self.maps {
            MapPolicy::Cached { dir, .. } => {
                let required = self.required_types(flex.as_ref());
                Some(GridMapSet::validate(dir, required.iter().map(String::as_str))?)
            }
            _ => None,
        };
        Ok(Preflight {
            receptors,
            flex,
            cache,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pbs_time() {
        assert!(validate_time("24:00:00").is_ok());
        assert!(validate_time("0:00:30").is_ok());
        assert!(validate_time("00:00:00").is_err());
        assert!(validate_time("1:60:00").is_err());
        assert!(validate_time("12:00").is_err());
        assert!(validate_time("a:b:c").is_err());
        assert!(PbsSettings::default().validate().is_ok());

        let bad = PbsSettings {
            time: "99".into(),
            runs: 0,
        };
        assert!(bad.validate().is_err());
        let (fixed, notes) = bad.corrected();
        assert_eq!(fixed, PbsSettings::default());
        assert_eq!(notes.len(), 2);
    }

    #[test]
    fn incomplete_requests_are_refused() {
        let mut builder = GenerationRequestBuilder::default();
        assert!(matches!(builder.build(), Err(RequestError::Missing(_))));
        builder.output_root("out");
        assert!(matches!(builder.build(), Err(RequestError::NoLigands)));
        builder.receptors(ReceptorSpec::Multi(vec![]));
        builder.maps(MapPolicy::PerJob);
        builder.dpf(Template::default_docking());
        assert!(matches!(builder.build(), Err(RequestError::NoLigands)));
    }

    #[test]
    fn map_policy_yaml() {
        let policy: MapPolicy = serde_yaml::from_str("mode: cached\ndir: /maps\ntransfer: symlink\n").unwrap();
        assert_eq!(
            policy,
            MapPolicy::Cached {
                dir: "/maps".into(),
                transfer: TransferMode::Symlink
            }
        );
        assert_eq!(policy.transfer(), Some(TransferMode::Symlink));
        let policy: MapPolicy = serde_yaml::from_str("mode: per_job").unwrap();
        assert!(policy.transfer().is_none());
        let target: TargetEnvironment = serde_yaml::from_str("kind: batch_queue\nruns: 10\n").unwrap();
        assert_eq!(
            target,
            TargetEnvironment::BatchQueue(PbsSettings {
                time: "24:00:00".into(),
                runs: 10
            })
        );
    }
}
