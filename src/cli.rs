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

use crate::{
    archive::{self, ArchiveFormat},
    config::Config,
    engine::AutoGrid,
    fsops::LocalFs,
    generate::{Generator, Job, Observer, RunState},
    maps::GridMapSet,
    registry::{export_ligand_list, import_ligand_list},
    request::{MapPolicy, PbsSettings, TargetEnvironment},
    runlog, scripts, structure,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use pretty_env_logger::env_logger::DEFAULT_FILTER_ENV;
use std::collections::BTreeSet;
use std::{
    io::Write,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Target {
    Workstation,
    Pbs,
    Windows,
}

#[derive(Debug, Subcommand)]
enum ListCommands {
    /// Save the registered ligands as a ligand list
    #[clap(arg_required_else_help = true)]
    Export {
        /// Input file in YAML format
        #[clap(long, short = 'i')]
        input: PathBuf,
        /// Ligand list to write
        file: PathBuf,
        /// Include ligands rejected by the filters
        #[clap(long, action)]
        all: bool,
    },
    /// Check that every entry of a ligand list exists
    #[clap(arg_required_else_help = true)]
    Check {
        /// Ligand list to read
        file: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate the docking job tree
    #[clap(arg_required_else_help = true)]
    Generate {
        /// Input file in YAML format
        #[clap(long, short = 'i')]
        input: PathBuf,
    },
    /// Show which ligands pass the filters
    #[clap(arg_required_else_help = true)]
    Filter {
        /// Input file in YAML format
        #[clap(long, short = 'i')]
        input: PathBuf,
    },
    /// Check a grid map directory against the accepted ligands
    #[clap(arg_required_else_help = true)]
    CheckMaps {
        /// Input file in YAML format
        #[clap(long, short = 'i')]
        input: PathBuf,
        /// Map directory; defaults to the cache named in the input file
        #[clap(long, short = 'd')]
        dir: Option<PathBuf>,
    },
    /// Write an input file equivalent to a previous run log
    #[clap(arg_required_else_help = true)]
    Restore {
        /// Run log to read
        log: PathBuf,
        /// Input file to write
        #[clap(long, short = 'i', default_value = "restored.yaml")]
        input: PathBuf,
    },
    /// Split a multi-structure MOL2 file into one file per molecule
    #[clap(arg_required_else_help = true)]
    SplitMol2 { file: PathBuf, outdir: PathBuf },
    /// Write run scripts and aggregator scripts for an existing job tree
    #[clap(arg_required_else_help = true)]
    Scripts {
        /// Root of the job tree
        #[clap(long, short = 'r')]
        root: PathBuf,
        #[clap(long, short = 't', value_enum, default_value = "workstation")]
        target: Target,
        /// Batch queue CPU and wall time (hh:mm:ss)
        #[clap(long, default_value = "24:00:00")]
        time: String,
        /// Batch queue docking runs per ligand
        #[clap(long, default_value_t = 1)]
        runs: usize,
    },
    /// Package a job tree into a single archive
    #[clap(arg_required_else_help = true)]
    Archive {
        /// Root of the job tree
        #[clap(long, short = 'r')]
        root: PathBuf,
        #[clap(long, short = 'f', value_enum, default_value = "tar-gz")]
        format: ArchiveFormat,
    },
    /// Ligand list import and export
    LigandList {
        #[clap(subcommand)]
        command: ListCommands,
    },
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    pub command: Commands,

    /// Verbose output. See more with e.g. RUST_LOG=Trace
    #[clap(long, short = 'v', action)]
    pub verbose: bool,
    /// Output file in YAML format
    #[clap(long, short = 'o', default_value = "output.yaml")]
    pub output: PathBuf,
}

pub fn do_main() -> Result<()> {
    let args = Args::parse();
    if std::env::var(DEFAULT_FILTER_ENV).is_err() {
        std::env::set_var(
            DEFAULT_FILTER_ENV,
            if args.verbose { "Debug" } else { "Info" },
        );
    }
    pretty_env_logger::init();

    let mut yaml_output = std::fs::File::create(&args.output)?;

    match args.command {
        Commands::Generate { input } => generate(&input, &mut yaml_output)?,
        Commands::Filter { input } => filter(&input, &mut yaml_output)?,
        Commands::CheckMaps { input, dir } => check_maps(&input, dir, &mut yaml_output)?,
        Commands::Restore { log, input } => restore(&log, &input, &mut yaml_output)?,
        Commands::SplitMol2 { file, outdir } => {
            let files = structure::split_mol2(&file, &outdir)?;
            log::info!("Wrote {} molecule(s) to {}", files.len(), outdir.display());
            write_yaml(&files, &mut yaml_output, Some("molecules"))?;
        }
        Commands::Scripts {
            root,
            target,
            time,
            runs,
        } => {
            let target = match target {
                Target::Workstation => TargetEnvironment::Workstation,
                Target::Windows => TargetEnvironment::Windows,
                Target::Pbs => TargetEnvironment::BatchQueue(PbsSettings { time, runs }.corrected().0),
            };
            let written = script_tree(&root, &target)?;
            write_yaml(&written, &mut yaml_output, Some("scripts"))?;
        }
        Commands::Archive { root, format } => {
            let path = archive::pack(&root, format)?;
            write_yaml(&path, &mut yaml_output, Some("archive"))?;
        }
        Commands::LigandList { command } => ligand_list(command, &mut yaml_output)?,
    }
    Ok(())
}

/// Helper function to serialize data to an existing YAML file
fn write_yaml<T: serde::Serialize>(
    data: &T,
    output: &mut std::fs::File,
    key: Option<&str>,
) -> Result<()> {
    match key {
        Some(key) => {
            let mut wrapper = std::collections::BTreeMap::new();
            wrapper.insert(key.to_string(), data);
            let yaml = serde_yaml::to_string(&wrapper)?;
            output.write_all(yaml.as_bytes())?;
        }
        None => {
            let yaml = serde_yaml::to_string(data)?;
            output.write_all(yaml.as_bytes())?;
        }
    }
    Ok(())
}

/// Progress bar advancing once per job.
struct Progress {
    bar: ProgressBar,
}

impl Progress {
    fn new(jobs: usize) -> Result<Self> {
        let bar = ProgressBar::new(jobs as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n{bar:40.cyan/blue} {pos}/{len} ({eta})")?
                .progress_chars("##-"),
        );
        Ok(Self { bar })
    }
}

impl Observer for Progress {
    fn on_state(&mut self, state: RunState) {
        if matches!(state, RunState::Completed | RunState::Aborted | RunState::Failed) {
            self.bar.finish_with_message(format!("{}", state));
        }
    }

    fn on_receptor(&mut self, _index: usize, receptor: &Path) {
        self.bar.set_message(format!("Receptor {}", receptor.display()));
    }

    fn on_job(&mut self, _job: &Job) {
        self.bar.inc(1);
    }
}

fn generate(input: &Path, yaml_output: &mut std::fs::File) -> Result<()> {
    let config = Config::from_file(input)?;
    let screening = config.screening()?;
    write_yaml(&screening.import, yaml_output, Some("import"))?;
    write_yaml(&screening.partition, yaml_output, Some("filter"))?;
    let request = config.request(&screening)?;

    let grid = match request.maps() {
        MapPolicy::PrecomputeNow { .. } => Some(AutoGrid::from_paths(&config.engines)?),
        _ => None,
    };
    if let Err(e) = config.engines.autodock() {
        log::warn!("{}; jobs can only run where it is installed", e);
    }

    let mut generator = Generator::new(&request, &LocalFs);
    if let Some(grid) = &grid {
        generator = generator.grid_engine(grid);
    }
    if let Some(preparer) = config.preparer() {
        generator = generator.preparer(preparer);
    }
    let mut progress = Progress::new(request.total_jobs())?;
    let outcome = generator.run(&mut progress)?;
    write_yaml(&outcome, yaml_output, Some("generation"))?;
    Ok(())
}

fn filter(input: &Path, yaml_output: &mut std::fs::File) -> Result<()> {
    let config = Config::from_file(input)?;
    let screening = config.screening()?;
    for (path, reasons) in &screening.partition.rejected {
        log::info!(
            "Rejected {}: {}",
            path.display(),
            reasons.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        );
    }
    write_yaml(&screening.rules, yaml_output, Some("rules"))?;
    write_yaml(&screening.partition, yaml_output, Some("filter"))?;
    Ok(())
}

fn check_maps(input: &Path, dir: Option<PathBuf>, yaml_output: &mut std::fs::File) -> Result<()> {
    let config = Config::from_file(input)?;
    let dir = match (dir, &config.maps) {
        (Some(dir), _) => dir,
        (None, MapPolicy::Cached { dir, .. }) => dir.clone(),
        (None, _) => anyhow::bail!("no map directory given and the input does not use cached maps"),
    };
    let screening = config.screening()?;
    let mut required: BTreeSet<String> = screening
        .registry
        .usage()
        .required_types()
        .into_iter()
        .collect();
    if let Some(flex) = &screening.flex {
        required.extend(flex.resolve(&screening.receptors.conformations())?.atom_types);
    }
    let set = GridMapSet::validate(&dir, required.iter().map(String::as_str))?;
    log::info!("Maps in {} are complete and coherent", dir.display());
    write_yaml(&set, yaml_output, Some("maps"))?;
    Ok(())
}

fn restore(log: &Path, input: &Path, yaml_output: &mut std::fs::File) -> Result<()> {
    let session = runlog::restore(log)?;
    if !session.completed {
        log::warn!("{} is the log of an incomplete run", log.display());
    }
    let config = Config::from_restored(&session, Path::new("restored"));
    std::fs::write(input, serde_yaml::to_string(&config)?)
        .with_context(|| format!("Cannot write '{}'", input.display()))?;
    log::info!("Session written to {}", input.display());
    write_yaml(&session.warnings, yaml_output, Some("warnings"))?;
    write_yaml(&session.completed, yaml_output, Some("completed"))?;
    Ok(())
}

/// Write run scripts into every job directory below `root`, then the aggregator.
fn script_tree(root: &Path, target: &TargetEnvironment) -> Result<Vec<PathBuf>> {
    let dirs = scripts::find_job_dirs(root)?;
    if dirs.is_empty() {
        anyhow::bail!("no job directories below {}", root.display());
    }
    let mut written = Vec::with_capacity(dirs.len() + 2);
    let mut per_job_maps = false;
    for dir in &dirs {
        let (gpf, dpf) = scripts::parameter_files(dir)?;
        let Some(dpf) = dpf else { continue };
        per_job_maps |= gpf.is_some();
        written.push(scripts::write_job_script(&LocalFs, dir, target, gpf.as_deref(), &dpf)?);
    }
    written.extend(scripts::write_aggregator(&LocalFs, root, &dirs, target, per_job_maps)?);
    log::info!("Wrote {} script(s) below {}", written.len(), root.display());
    Ok(written)
}

fn ligand_list(command: ListCommands, yaml_output: &mut std::fs::File) -> Result<()> {
    match command {
        ListCommands::Export { input, file, all } => {
            let config = Config::from_file(&input)?;
            let screening = config.screening()?;
            let count = if all {
                export_ligand_list(&file, screening.registry.ligands())?
            } else {
                export_ligand_list(&file, screening.registry.accepted())?
            };
            write_yaml(&count, yaml_output, Some("exported"))?;
        }
        ListCommands::Check { file } => {
            let list = import_ligand_list(&file)?;
            log::info!("{} of {} entries found", list.found.len(), list.found.len() + list.missing.len());
            write_yaml(&list.found, yaml_output, Some("found"))?;
            write_yaml(&list.missing, yaml_output, Some("missing"))?;
        }
    }
    Ok(())
}
