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

//! YAML input describing one screening session.
//!
//! ~~~yaml
//! output: screen
//! ligands:
//!   dirs: [ligands]
//!   lists: [selected.txt]
//! receptors: [rec_a.pdbqt, rec_b.pdbqt]
//! flex: {selection: "THR276, B:HIS229"}
//! filter:
//!   preset: lipinski_like
//!   weight: {min: 160, max: 450}
//! maps: {mode: cached, dir: maps, transfer: symlink}
//! target: {kind: batch_queue, time: "12:00:00", runs: 10}
//! archive: tar_gz
//! ~~~

use crate::archive::ArchiveFormat;
use crate::engine::EnginePaths;
use crate::filter::{self, Bounds, FilterPreset, FilterRules, Partition};
use crate::flex::FlexibleResidueSpec;
use crate::params::Template;
use crate::receptor::{self, ReceptorSpec};
use crate::registry::{import_ligand_list, ImportReport, LigandImporter, Registry};
use crate::request::{GenerationRequest, GenerationRequestBuilder, MapPolicy, TargetEnvironment};
use crate::runlog::RestoredSession;
use crate::structure::{MglToolsPreparer, StructurePreparer};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where ligands are imported from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LigandSources {
    pub files: Vec<PathBuf>,
    pub dirs: Vec<PathBuf>,
    /// Ligand list files.
    pub lists: Vec<PathBuf>,
    /// Descend into subdirectories of `dirs`.
    pub recursive: bool,
}

/// Flexible residues, either from a prepared file or a residue selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlexInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,
}

impl FlexInput {
    pub fn spec(&self) -> anyhow::Result<FlexibleResidueSpec> {
        match (&self.file, &self.selection) {
            (Some(file), None) => Ok(FlexibleResidueSpec::FromFile(file.clone())),
            (None, Some(selection)) => Ok(FlexibleResidueSpec::FromSelection(selection.clone())),
            _ => anyhow::bail!("`flex` needs exactly one of `file` or `selection`"),
        }
    }
}

impl From<&FlexibleResidueSpec> for FlexInput {
    fn from(spec: &FlexibleResidueSpec) -> Self {
        match spec {
            FlexibleResidueSpec::FromFile(file) => Self {
                file: Some(file.clone()),
                selection: None,
            },
            FlexibleResidueSpec::FromSelection(selection) => Self {
                file: None,
                selection: Some(selection.clone()),
            },
        }
    }
}

/// Filter preset with optional per-property overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FilterInput {
    pub preset: FilterPreset,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donors: Option<Bounds<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptors: Option<Bounds<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<Bounds<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heavy_atoms: Option<Bounds<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torsions: Option<Bounds<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_non_standard: Option<bool>,
}

impl FilterInput {
    /// Preset bounds with the overrides applied. Not yet corrected.
    pub fn rules(&self, flex_torsions: usize) -> FilterRules {
        let mut rules = self.preset.rules(flex_torsions);
        rules.donors = self.donors.unwrap_or(rules.donors);
        rules.acceptors = self.acceptors.unwrap_or(rules.acceptors);
        rules.weight = self.weight.unwrap_or(rules.weight);
        rules.heavy_atoms = self.heavy_atoms.unwrap_or(rules.heavy_atoms);
        rules.torsions = self.torsions.unwrap_or(rules.torsions);
        rules.reject_non_standard = self.reject_non_standard.unwrap_or(rules.reject_non_standard);
        rules
    }
}

impl From<&FilterRules> for FilterInput {
    fn from(rules: &FilterRules) -> Self {
        Self {
            preset: FilterPreset::Default,
            donors: Some(rules.donors),
            acceptors: Some(rules.acceptors),
            weight: Some(rules.weight),
            heavy_atoms: Some(rules.heavy_atoms),
            torsions: Some(rules.torsions),
            reject_non_standard: Some(rules.reject_non_standard),
        }
    }
}

/// Parameter template read from a file or given inline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<String>>,
}

impl TemplateInput {
    pub fn template(&self) -> anyhow::Result<Template> {
        match (&self.file, &self.lines) {
            (Some(file), None) => Template::from_file(file),
            (None, Some(lines)) => Ok(Template::from_lines(lines.iter().cloned())),
            _ => anyhow::bail!("a template needs exactly one of `file` or `lines`"),
        }
    }
}

fn default_true() -> bool {
    true
}

/// One screening session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root of the job tree.
    pub output: PathBuf,
    #[serde(default)]
    pub ligands: LigandSources,
    /// One path for a single receptor, several for multiple conformations.
    pub receptors: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flex: Option<FlexInput>,
    #[serde(default)]
    pub filter: FilterInput,
    pub maps: MapPolicy,
    /// Docking template; the built-in AutoDock 4.2 template when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpf: Option<TemplateInput>,
    /// Grid template; AutoGrid defaults when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpf: Option<TemplateInput>,
    #[serde(default)]
    pub target: TargetEnvironment,
    #[serde(default = "default_true")]
    pub master_script: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveFormat>,
    #[serde(default)]
    pub engines: EnginePaths,
    /// MGLTools scripts used to convert PDB/MOL2 input and split flexible residues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preparer: Option<MglToolsPreparer>,
    /// Where converted structures are written; next to the inputs when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_dir: Option<PathBuf>,
}

/// Ligands, receptors and filter verdicts assembled from a [`Config`].
#[derive(Debug, Clone)]
pub struct Screening {
    pub registry: Registry,
    pub import: ImportReport,
    pub receptors: ReceptorSpec,
    pub flex: Option<FlexibleResidueSpec>,
    /// Rotatable bonds taken by the flexible residues.
    pub flex_torsions: usize,
    /// Corrected filter rules.
    pub rules: FilterRules,
    pub partition: Partition,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Cannot open input file '{}'", path.display()))?;
        serde_yaml::from_reader(file)
            .with_context(|| format!("Cannot parse input file '{}'", path.display()))
    }

    pub fn preparer(&self) -> Option<&dyn StructurePreparer> {
        self.preparer.as_ref().map(|p| p as &dyn StructurePreparer)
    }

    /// Import all ligand sources, collecting rejections in one report.
    pub fn import_ligands(&self, registry: &mut Registry) -> anyhow::Result<ImportReport> {
        let mut importer = LigandImporter::new(self.preparer()).recursive(self.ligands.recursive);
        if let Some(dir) = &self.conversion_dir {
            importer = importer.conversion_dir(dir);
        }
        let mut report = importer.import_files(registry, &self.ligands.files);
        for dir in &self.ligands.dirs {
            report.extend(importer.import_dir(registry, dir));
        }
        for list in &self.ligands.lists {
            let list = import_ligand_list(list)?;
            report.extend(importer.import_files(registry, &list.found));
            report.rejected.extend(
                list.missing
                    .into_iter()
                    .map(|path| (path, "listed but not found".to_string())),
            );
        }
        report.summarize();
        Ok(report)
    }

    /// Validated receptors, converting PDB input on the way.
    pub fn receptor_spec(&self) -> anyhow::Result<ReceptorSpec> {
        let receptors = self
            .receptors
            .iter()
            .map(|path| receptor::prepare_receptor(path, self.preparer(), self.conversion_dir.as_deref()))
            .collect::<Result<Vec<_>, _>>()?;
        match receptors.len() {
            0 => anyhow::bail!("no receptor given"),
            1 => Ok(ReceptorSpec::Single(receptors[0].clone())),
            _ => Ok(ReceptorSpec::multi(receptors)),
        }
    }

    pub fn dpf_template(&self) -> anyhow::Result<Template> {
        self.dpf
            .as_ref()
            .map_or_else(|| Ok(Template::default_docking()), TemplateInput::template)
    }

    pub fn gpf_template(&self) -> anyhow::Result<Template> {
        self.gpf
            .as_ref()
            .map_or_else(|| Ok(Template::default()), TemplateInput::template)
    }

    /// Import ligands and receptors, then filter the ligands.
    ///
    /// The rotatable bond maximum leaves room for the flexible residues.
    pub fn screening(&self) -> anyhow::Result<Screening> {
        let mut registry = Registry::new();
        let import = self.import_ligands(&mut registry)?;
        let receptors = self.receptor_spec()?;
        let flex = self.flex.as_ref().map(FlexInput::spec).transpose()?;
        let flex_torsions = match &flex {
            Some(spec) => spec.resolve(&receptors.conformations())?.torsions,
            None => 0,
        };
        let (rules, partition) = filter::apply(
            &mut registry,
            &self.filter.rules(flex_torsions),
            self.filter.preset,
            flex_torsions,
        );
        Ok(Screening {
            registry,
            import,
            receptors,
            flex,
            flex_torsions,
            rules,
            partition,
        })
    }

    /// Generation request for the accepted ligands of `screening`.
    pub fn request(&self, screening: &Screening) -> anyhow::Result<GenerationRequest> {
        let mut builder = GenerationRequestBuilder::default();
        builder
            .output_root(self.output.clone())
            .ligands(screening.registry.accepted().cloned().collect())
            .receptors(screening.receptors.clone())
            .maps(self.maps.clone())
            .dpf(self.dpf_template()?)
            .gpf(self.gpf_template()?)
            .target(self.target.clone())
            .master_script(self.master_script)
            .filter(screening.rules.clone())
            .map_types(screening.registry.usage().required_types());
        if let Some(flex) = &screening.flex {
            builder.flex(flex.clone());
        }
        if let Some(format) = self.archive {
            builder.archive(format);
        }
        Ok(builder.build()?)
    }

    /// Input equivalent to a restored run log.
    ///
    /// Sections missing from the log fall back to defaults; `output` is used
    /// when the log names no output directory.
    pub fn from_restored(session: &RestoredSession, output: &Path) -> Self {
        Self {
            output: session.output.clone().unwrap_or_else(|| output.to_path_buf()),
            ligands: LigandSources {
                files: session.ligands.clone(),
                ..Default::default()
            },
            receptors: session.receptors.clone(),
            flex: session.flex.as_ref().map(FlexInput::from),
            filter: session.filter.as_ref().map(FilterInput::from).unwrap_or_default(),
            maps: session.maps.clone().unwrap_or(MapPolicy::PerJob),
            dpf: session.dpf.as_ref().map(|t| TemplateInput {
                file: None,
                lines: Some(t.lines().to_vec()),
            }),
            gpf: session.gpf.as_ref().map(|t| TemplateInput {
                file: None,
                lines: Some(t.lines().to_vec()),
            }),
            target: TargetEnvironment::default(),
            master_script: true,
            archive: None,
            engines: EnginePaths::default(),
            preparer: None,
            conversion_dir: None,
        }
    }
}
