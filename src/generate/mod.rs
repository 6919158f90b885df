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

//! Job matrix generation.
//!
//! Jobs are laid out receptor-major, ligand-minor, both in registration order:
//!
//! ~~~text
//! <output>/<receptor>/maps/                      shared maps
//! <output>/<receptor>/<ligand>_<receptor>[_n]/   one job
//! ~~~
//!
//! A run moves from [`RunState::Idle`] to [`RunState::Running`] and ends
//! [`RunState::Completed`], [`RunState::Aborted`] or [`RunState::Failed`].
//! Existing job directories are never overwritten, so re-running a request
//! against a partial tree resumes it.

mod journal;
mod observer;

pub use journal::NameJournal;
pub use observer::{CancelToken, Observer, Silent};

use crate::archive::{self, ArchiveError};
use crate::engine::{EngineError, GridEngine};
use crate::flex::FlexibleResidueSpec;
use crate::fsops::{same_location, FileOps};
use crate::maps::{GridMapSet, MapError, TransferMode};
use crate::params::{DockingParameters, GridParameters, Template};
use crate::receptor;
use crate::registry::{file_stem, LigandRecord};
use crate::request::{GenerationRequest, MapPolicy, Preflight, RequestError, TargetEnvironment};
use crate::runlog::RunLog;
use crate::scripts;
use crate::structure::StructurePreparer;
use derive_getters::Getters;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-receptor map directory.
pub const MAPS_DIR: &str = "maps";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, derive_more::Display)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Aborted,
    Failed,
}

/// Fatal errors of a run. Output written before the error is kept.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation refused: {0}")]
    Refused(#[from] RequestError),
    #[error("cannot create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("cannot copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("cannot read receptor {path}: {message}")]
    Receptor { path: PathBuf, message: String },
    #[error("flexible residues of {receptor}: {message}")]
    Flex { receptor: PathBuf, message: String },
    #[error(transparent)]
    Maps(#[from] MapError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// One (receptor, ligand) docking job.
#[derive(Debug, Clone, PartialEq, Serialize, Getters)]
pub struct Job {
    receptor: PathBuf,
    ligand: PathBuf,
    dir: PathBuf,
    /// Grid parameter file, present when the job computes its own maps.
    gpf: Option<PathBuf>,
    dpf: Option<PathBuf>,
    /// The directory already existed and was left untouched.
    skipped: bool,
}

/// Result of [`create_job_dir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDir {
    Created,
    /// Treated as already processed.
    AlreadyExists,
}

/// Create a directory unless it exists; an existing one is reported, not touched.
pub fn create_job_dir(fs: &dyn FileOps, dir: &Path) -> Result<JobDir, GenerationError> {
    match fs.create_dir(dir) {
        Ok(true) => Ok(JobDir::Created),
        Ok(false) => Ok(JobDir::AlreadyExists),
        Err(source) => Err(GenerationError::CreateDir {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// Summary of a finished or aborted run.
#[derive(Debug, Clone, Serialize, Getters)]
pub struct Outcome {
    state: RunState,
    /// Jobs in layout order, skipped ones included.
    jobs: Vec<Job>,
    log: PathBuf,
    /// Master and submission scripts.
    scripts: Vec<PathBuf>,
    archive: Option<PathBuf>,
}

/// Receptor artifacts shared by all its jobs.
#[derive(Debug)]
struct Site {
    /// Receptor as registered.
    source: PathBuf,
    /// Receptor part of the job directory names.
    stem: String,
    /// Receptor docked against: the source or its rigid part.
    receptor: PathBuf,
    receptor_types: Vec<String>,
    flex: Option<PathBuf>,
    flex_types: BTreeSet<String>,
    map_stem: String,
    /// Provisioned maps; `None` when each job computes its own.
    maps: Option<GridMapSet>,
}

enum Flow {
    Finished,
    Cancelled,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lays out the job tree of one [`GenerationRequest`].
#[derive(Debug)]
pub struct Generator<'a> {
    request: &'a GenerationRequest,
    fs: &'a dyn FileOps,
    grid: Option<&'a dyn GridEngine>,
    preparer: Option<&'a dyn StructurePreparer>,
}

impl<'a> Generator<'a> {
    pub fn new(request: &'a GenerationRequest, fs: &'a dyn FileOps) -> Self {
        Self {
            request,
            fs,
            grid: None,
            preparer: None,
        }
    }

    /// Grid engine used when maps are computed before the jobs are laid out.
    pub fn grid_engine(mut self, grid: &'a dyn GridEngine) -> Self {
        self.grid = Some(grid);
        self
    }

    /// Preparer used to split flexible residues out of the receptors.
    pub fn preparer(mut self, preparer: &'a dyn StructurePreparer) -> Self {
        self.preparer = Some(preparer);
        self
    }

    /// Checks that need no output; a failure here leaves nothing on disk.
    fn preflight(&self) -> Result<Preflight, RequestError> {
        if matches!(self.request.maps(), MapPolicy::PrecomputeNow { .. }) && self.grid.is_none() {
            return Err(RequestError::NoGridEngine);
        }
        if matches!(self.request.flex(), Some(FlexibleResidueSpec::FromSelection(_)))
            && self.preparer.is_none()
        {
            return Err(RequestError::NoPreparer);
        }
        self.request.preflight()
    }

    /// Lay out every (receptor, ligand) job.
    ///
    /// Returns an [`Outcome`] for completed and user-aborted runs. A refused
    /// request returns before anything is written; any other error stops the
    /// run at once and is recorded in the run log.
    pub fn run(&self, observer: &mut dyn Observer) -> Result<Outcome, GenerationError> {
        let preflight = self.preflight()?;
        let root = self.request.output_root();
        create_job_dir(self.fs, root)?;
        let mut log = RunLog::create(self.request).map_err(|source| GenerationError::Write {
            path: root.clone(),
            source,
        })?;
        log::info!(
            "Generating {} docking job(s) in {}",
            self.request.total_jobs(),
            root.display()
        );
        observer.on_state(RunState::Running);

        let mut outcome = Outcome {
            state: RunState::Running,
            jobs: Vec::with_capacity(self.request.total_jobs()),
            log: log.path().to_path_buf(),
            scripts: Vec::new(),
            archive: None,
        };
        let result = match self.layout(&preflight, &mut log, observer, &mut outcome) {
            Ok(Flow::Finished) => self.package(&mut outcome).map(|_| Flow::Finished),
            other => other,
        };
        let log_error = |source| GenerationError::Write {
            path: outcome.log.clone(),
            source,
        };
        match result {
            Ok(Flow::Finished) => {
                log.done().map_err(log_error)?;
                outcome.state = RunState::Completed;
                log::info!("Generation completed: {} job(s)", outcome.jobs.len());
            }
            Ok(Flow::Cancelled) => {
                log.abort().map_err(log_error)?;
                outcome.state = RunState::Aborted;
                log::warn!(
                    "Generation interrupted after {} job(s); existing directories are kept",
                    outcome.jobs.len()
                );
            }
            Err(error) => {
                log::error!("Generation failed: {}", error);
                if let Err(e) = log.error(&error.to_string()) {
                    log::warn!("Cannot write the run log: {}", e);
                }
                observer.on_state(RunState::Failed);
                return Err(error);
            }
        }
        observer.on_state(outcome.state);
        Ok(outcome)
    }

    fn layout(
        &self,
        preflight: &Preflight,
        log: &mut RunLog,
        observer: &mut dyn Observer,
        outcome: &mut Outcome,
    ) -> Result<Flow, GenerationError> {
        let request = self.request;
        let root = request.output_root();
        let aggregate = *request.master_script()
            || matches!(request.target(), TargetEnvironment::BatchQueue(_));
        let mut journal = NameJournal::default();
        let mut required = request.required_types(preflight.flex.as_ref());
        let mut all_dirs = Vec::with_capacity(request.total_jobs());

        for (index, source) in preflight.receptors.iter().enumerate() {
            if observer.cancel_requested() {
                return Ok(Flow::Cancelled);
            }
            observer.on_receptor(index, source);
            let rec_root = journal.claim(&root.join(file_stem(source)));
            create_job_dir(self.fs, &rec_root)?;
            let site = self.prepare_site(source, &rec_root, preflight, &mut required)?;

            let mut job_dirs = Vec::with_capacity(request.ligands().len());
            for ligand in request.ligands() {
                if observer.cancel_requested() {
                    return Ok(Flow::Cancelled);
                }
                let job = self.layout_job(&mut journal, &rec_root, &site, ligand)?;
                log.job(&job.dir, job.skipped)
                    .map_err(|source| GenerationError::Write {
                        path: log.path().to_path_buf(),
                        source,
                    })?;
                observer.on_job(&job);
                job_dirs.push(job.dir.clone());
                outcome.jobs.push(job);
            }
            if aggregate {
                outcome.scripts.extend(self.aggregate(&rec_root, &job_dirs)?);
            }
            all_dirs.extend(job_dirs);
        }
        if aggregate {
            outcome.scripts.extend(self.aggregate(root, &all_dirs)?);
        }
        Ok(Flow::Finished)
    }

    fn package(&self, outcome: &mut Outcome) -> Result<(), GenerationError> {
        if let Some(format) = self.request.archive() {
            outcome.archive = Some(archive::pack(self.request.output_root(), *format)?);
        }
        Ok(())
    }

    fn aggregate(&self, base: &Path, job_dirs: &[PathBuf]) -> Result<Vec<PathBuf>, GenerationError> {
        let per_job_maps = matches!(self.request.maps(), MapPolicy::PerJob);
        scripts::write_aggregator(self.fs, base, job_dirs, self.request.target(), per_job_maps)
            .map_err(|source| GenerationError::Write {
                path: base.to_path_buf(),
                source,
            })
    }

    /// Copy `file` into `dir` unless it is already there.
    fn copy_into(&self, file: &Path, dir: &Path) -> Result<PathBuf, GenerationError> {
        let target = dir.join(file_name(file));
        if same_location(file, &target) {
            log::debug!("{} already in place", target.display());
            return Ok(target);
        }
        self.fs
            .copy(file, &target)
            .map_err(|source| GenerationError::Copy {
                from: file.to_path_buf(),
                to: target.clone(),
                source,
            })?;
        Ok(target)
    }

    fn write(&self, path: &Path, contents: &str) -> Result<(), GenerationError> {
        self.fs
            .write(path, contents)
            .map_err(|source| GenerationError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Copy the force field file referenced by a template, if any.
    fn copy_parameter_file(&self, template: &Template, dir: &Path) -> Result<(), GenerationError> {
        if let Some(path) = template.parameter_file() {
            self.copy_into(&path, dir)?;
        }
        Ok(())
    }

    /// Flexible residues and maps of one receptor, done once before its jobs.
    fn prepare_site(
        &self,
        source: &Path,
        rec_root: &Path,
        preflight: &Preflight,
        required: &mut BTreeSet<String>,
    ) -> Result<Site, GenerationError> {
        let stem = file_stem(source);
        let flex_error = |message: String| GenerationError::Flex {
            receptor: source.to_path_buf(),
            message,
        };
        let mut receptor = source.to_path_buf();
        let mut flex = None;
        let mut flex_types = BTreeSet::new();

        match (self.request.flex(), &preflight.flex) {
            (Some(FlexibleResidueSpec::FromFile(path)), _) => {
                flex_types = receptor::atom_types(path).map_err(|e| flex_error(e.to_string()))?;
                flex = Some(self.copy_into(path, rec_root)?);
            }
            (Some(FlexibleResidueSpec::FromSelection(_)), Some(resolved)) => {
                let preparer = self.preparer.ok_or(RequestError::NoPreparer)?;
                let rigid = rec_root.join(format!("{stem}_rigid.pdbqt"));
                let flex_file = rec_root.join(format!("{stem}_flex.pdbqt"));
                let residues: Vec<String> = resolved.residues.iter().map(ToString::to_string).collect();
                log::info!("Splitting {} out of {}", residues.join(", "), source.display());
                preparer
                    .split_flexible(source, &residues, &rigid, &flex_file)
                    .map_err(|e| flex_error(e.to_string()))?;
                flex_types = receptor::atom_types(&flex_file).map_err(|e| flex_error(e.to_string()))?;
                receptor = rigid;
                flex = Some(flex_file);
            }
            _ => {}
        }
        required.extend(flex_types.iter().cloned());

        let receptor_types: Vec<String> = if self.request.maps().uses_grid_template() {
            receptor::atom_types(&receptor)
                .map_err(|e| GenerationError::Receptor {
                    path: receptor.clone(),
                    message: e.to_string(),
                })?
                .into_iter()
                .collect()
        } else {
            Vec::new()
        };

        let maps_dir = rec_root.join(MAPS_DIR);
        let maps = match (self.request.maps(), &preflight.cache) {
            (MapPolicy::PerJob, _) => None,
            (MapPolicy::PrecomputeNow { .. }, _) => {
                Some(self.precompute(&receptor, &receptor_types, &maps_dir, required)?)
            }
            (MapPolicy::Cached { .. }, Some(cache)) => {
                create_job_dir(self.fs, &maps_dir)?;
                let count = cache.provision(
                    required.iter().map(String::as_str),
                    &maps_dir,
                    TransferMode::Copy,
                    self.fs,
                )?;
                log::info!("{} map file(s) copied into {}", count, maps_dir.display());
                Some(GridMapSet::validate(&maps_dir, required.iter().map(String::as_str))?)
            }
            (MapPolicy::Cached { .. }, None) => return Err(RequestError::Missing("map cache").into()),
        };
        let map_stem = maps
            .as_ref()
            .map_or_else(|| file_stem(&receptor), |m| m.stem().to_string());

        Ok(Site {
            source: source.to_path_buf(),
            stem,
            receptor,
            receptor_types,
            flex,
            flex_types,
            map_stem,
            maps,
        })
    }

    /// Compute the maps of one receptor for all required types.
    fn precompute(
        &self,
        receptor: &Path,
        receptor_types: &[String],
        maps_dir: &Path,
        required: &BTreeSet<String>,
    ) -> Result<GridMapSet, GenerationError> {
        let grid = self.grid.ok_or(RequestError::NoGridEngine)?;
        create_job_dir(self.fs, maps_dir)?;
        let local = self.copy_into(receptor, maps_dir)?;
        self.copy_parameter_file(self.request.gpf(), maps_dir)?;
        let stem = file_stem(receptor);
        let types: Vec<String> = required.iter().cloned().collect();
        let gpf = format!("{stem}_all_maps.gpf");
        let text = GridParameters {
            receptor: &file_name(&local),
            map_stem: &stem,
            receptor_types,
            ligand_types: &types,
        }
        .render(self.request.gpf());
        self.write(&maps_dir.join(&gpf), &text)?;
        grid.compute_maps(maps_dir, &gpf)?;
        Ok(GridMapSet::validate(maps_dir, required.iter().map(String::as_str))?)
    }

    fn layout_job(
        &self,
        journal: &mut NameJournal,
        rec_root: &Path,
        site: &Site,
        ligand: &LigandRecord,
    ) -> Result<Job, GenerationError> {
        let dir = journal.claim(&rec_root.join(format!("{}_{}", ligand.stem(), site.stem)));
        let mut job = Job {
            receptor: site.source.clone(),
            ligand: ligand.path().clone(),
            dir: dir.clone(),
            gpf: None,
            dpf: None,
            skipped: false,
        };
        if create_job_dir(self.fs, &dir)? == JobDir::AlreadyExists {
            log::info!("{} exists; skipped", dir.display());
            job.skipped = true;
            return Ok(job);
        }
        // a directory on disk means a finished job, so a failed one is removed
        if let Err(error) = self.fill_job(site, ligand, &mut job) {
            match self.fs.remove_dir_all(&dir) {
                Ok(()) => log::info!("Removed incomplete job directory {}", dir.display()),
                Err(e) => log::warn!("Cannot remove incomplete job directory {}: {}", dir.display(), e),
            }
            return Err(error);
        }
        Ok(job)
    }

    /// Populate a freshly created job directory.
    fn fill_job(&self, site: &Site, ligand: &LigandRecord, job: &mut Job) -> Result<(), GenerationError> {
        let request = self.request;
        let dir = job.dir.clone();
        let ligand_file = self.copy_into(ligand.path(), &dir)?;
        let flexres = site
            .flex
            .as_deref()
            .map(|flex| self.copy_into(flex, &dir))
            .transpose()?;
        // ligand types first, then the types only the flexible residues add
        let types: Vec<String> = ligand
            .atom_types()
            .iter()
            .chain(site.flex_types.difference(ligand.atom_types()))
            .cloned()
            .collect();
        let name = file_name(&dir);

        match &site.maps {
            None => {
                let receptor = self.copy_into(&site.receptor, &dir)?;
                self.copy_parameter_file(request.gpf(), &dir)?;
                let text = GridParameters {
                    receptor: &file_name(&receptor),
                    map_stem: &site.map_stem,
                    receptor_types: &site.receptor_types,
                    ligand_types: &types,
                }
                .render(request.gpf());
                let path = dir.join(format!("{name}.gpf"));
                self.write(&path, &text)?;
                job.gpf = Some(path);
            }
            Some(maps) => {
                let transfer = request.maps().transfer().unwrap_or_default();
                maps.provision(types.iter().map(String::as_str), &dir, transfer, self.fs)?;
            }
        }

        self.copy_parameter_file(request.dpf(), &dir)?;
        let flexres_name = flexres.as_deref().map(file_name);
        let text = DockingParameters {
            ligand: &file_name(&ligand_file),
            map_stem: &site.map_stem,
            types: &types,
            flexres: flexres_name.as_deref(),
            center: *ligand.center(),
            dihedrals: *ligand.branches(),
            torsdof: *ligand.torsions(),
        }
        .render(request.dpf());
        let dpf = dir.join(format!("{name}.dpf"));
        self.write(&dpf, &text)?;

        let gpf_name = job.gpf.as_deref().map(file_name);
        scripts::write_job_script(self.fs, &dir, request.target(), gpf_name.as_deref(), &file_name(&dpf))
            .map_err(|source| GenerationError::Write {
                path: dir.clone(),
                source,
            })?;
        job.dpf = Some(dpf);
        Ok(())
    }
}
