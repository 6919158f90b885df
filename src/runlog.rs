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

//! Run log: audit record of a generation run and input for session restore.
//!
//! The header describes the request; tagged lines (`TARGET>`, `FLEX>`,
//! `GPF>`, `DPF>`, `LIGAND>`) carry the data needed to restore it. A final
//! `[DONE]` line marks a run that completed.

use crate::filter::{Bounds, FilterRules};
use crate::flex::FlexibleResidueSpec;
use crate::maps::TransferMode;
use crate::params::Template;
use crate::request::{GenerationRequest, MapPolicy};
use anyhow::Context;
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Last line of a log from a completed run.
pub const SENTINEL: &str = "[DONE]";
pub const TARGET_TAG: &str = "TARGET>";
pub const FLEX_TAG: &str = "FLEX>";
pub const GPF_TAG: &str = "GPF>";
pub const DPF_TAG: &str = "DPF>";
pub const LIGAND_TAG: &str = "LIGAND>";

const FILE_LABEL: &str = "from the file :";
const SELECTION_LABEL: &str = "from the selection :";
const OUTPUT_LABEL: &str = "output directory :";
const GRID_MODE: &str = "Grid mode :";
const CACHE_DIR: &str = "Grid cache dir :";

/// Filter labels in header order.
const FILTER_LABELS: [&str; 5] = [
    "Hb donors :",
    "Hb acceptors :",
    "Molecular weight :",
    "Total number of atoms :",
    "Rotatable bonds :",
];
const REJECT_LABEL: &str = "Reject non-AD atypes :";

fn section(title: &str) -> String {
    format!("\n      {:=^90}\n", format!(" {} ", title))
}

/// Log file name for a run started at `date`.
pub fn file_name(date: &chrono::DateTime<chrono::Local>) -> String {
    date.format("vsgen-%Y.%-m.%-d_%H.%M.%S.log").to_string()
}

/// Text of the log header for `request`.
pub fn header(request: &GenerationRequest, date: &chrono::DateTime<chrono::Local>) -> String {
    let mut text = format!("\n   vsgen {} | virtual screening generation\n\n", env!("CARGO_PKG_VERSION"));
    let _ = writeln!(text, "                  date :\t{}", date.format("%Y-%B-%d %H:%M"));
    let _ = writeln!(text, "      {}\t{}", OUTPUT_LABEL, request.output_root().display());
    let _ = writeln!(text, "    total docking jobs :\t{}", request.total_jobs());
    let _ = writeln!(
        text,
        "      operative system :\t{} [ {} ]",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    let _ = writeln!(text, "   generating jobs for :\t{}", request.target());

    let filter = request.filter();
    text.push_str(&section("Ligand filters"));
    let _ = writeln!(text, "\n{:>40}{:>9}", "MIN", "MAX");
    let rows: [(&str, String, String); 5] = [
        (FILTER_LABELS[0], filter.donors.min.to_string(), filter.donors.max.to_string()),
        (FILTER_LABELS[1], filter.acceptors.min.to_string(), filter.acceptors.max.to_string()),
        (FILTER_LABELS[2], filter.weight.min.to_string(), filter.weight.max.to_string()),
        (FILTER_LABELS[3], filter.heavy_atoms.min.to_string(), filter.heavy_atoms.max.to_string()),
        (FILTER_LABELS[4], filter.torsions.min.to_string(), filter.torsions.max.to_string()),
    ];
    for (label, min, max) in rows {
        let _ = writeln!(text, "{:>30}   {:>4}  -  {:>4}", label, min, max);
    }
    let _ = writeln!(text, "{:>30}   {}", REJECT_LABEL, filter.reject_non_standard);
    let _ = writeln!(
        text,
        "\n        Ligands accepted for the virtual screening: {}",
        request.ligands().len()
    );

    let receptors = request.receptors().conformations();
    if receptors.len() == 1 {
        text.push_str(&section("Single target receptor"));
        let _ = writeln!(text, "\n   Target structure:");
    } else {
        text.push_str(&section("Multiple target receptors"));
        let _ = writeln!(text, "\n   Total target structures : {}", receptors.len());
    }
    for receptor in receptors {
        let _ = writeln!(text, "{}\t{}", TARGET_TAG, receptor.display());
    }

    if let Some(flex) = request.flex() {
        text.push_str(&section("Flexible residues"));
        let _ = writeln!(text, "\n{} Flexible residues {}", FLEX_TAG, flex.describe());
    }

    text.push_str(&section("Maps"));
    match request.maps() {
        MapPolicy::PerJob => {
            let _ = writeln!(text, "\n   {} calculated in each job.", GRID_MODE);
        }
        MapPolicy::PrecomputeNow { transfer } => {
            let _ = writeln!(
                text,
                "\n   {} calculated now and >{}< in each ligand job directory.",
                GRID_MODE, transfer
            );
        }
        MapPolicy::Cached { dir, transfer } => {
            let _ = writeln!(
                text,
                "\n   {} use pre-calculated >{}< in each ligand job directory.",
                GRID_MODE, transfer
            );
            let _ = writeln!(text, "   {} {}", CACHE_DIR, dir.display());
        }
    }
    if request.maps().uses_grid_template() {
        let _ = writeln!(text, "   Grid param file template :\n");
        for line in request.gpf().lines().iter().filter(|l| !l.trim().is_empty()) {
            let _ = writeln!(text, "{}\t{}", GPF_TAG, line);
        }
    }

    text.push_str(&section("Docking parameters"));
    let _ = writeln!(
        text,
        "\n   Docking mode : docking parameters will be >generated from template< for each ligand."
    );
    let _ = writeln!(text, "   Docking param file template :\n");
    for line in request.dpf().lines().iter().filter(|l| !l.trim().is_empty()) {
        let _ = writeln!(text, "{}\t{}", DPF_TAG, line);
    }

    text.push_str(&section("Ligands list"));
    text.push('\n');
    for ligand in request.ligands() {
        let _ = writeln!(text, "{}\t{}", LIGAND_TAG, ligand.path().display());
    }
    text
}

/// An open run log.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    /// Create a new log in the output root and write the header.
    ///
    /// Logs of earlier runs are never overwritten; a name taken within the
    /// same second gets a `_<n>` suffix.
    pub fn create(request: &GenerationRequest) -> std::io::Result<Self> {
        let date = chrono::Local::now();
        let name = file_name(&date);
        let stem = name.trim_end_matches(".log");
        let mut path = request.output_root().join(&name);
        let mut suffix = 0;
        let mut file = loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    suffix += 1;
                    path = request.output_root().join(format!("{stem}_{suffix}.log"));
                }
                Err(e) => return Err(e),
            }
        };
        file.write_all(header(request, &date).as_bytes())?;
        file.flush()?;
        log::info!("Run log: {}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a job directory.
    pub fn job(&mut self, dir: &Path, skipped: bool) -> std::io::Result<()> {
        let note = if skipped { " (already present, skipped)" } else { "" };
        writeln!(self.file, "JOB>\t{}{}", dir.display(), note)?;
        self.file.flush()
    }

    /// Record a user interruption.
    pub fn abort(&mut self) -> std::io::Result<()> {
        writeln!(
            self.file,
            "\n\n\n#### ABORT ###\n\nThe generation process was interrupted by the user.\n"
        )?;
        self.file.flush()
    }

    /// Record a fatal error.
    pub fn error(&mut self, message: &str) -> std::io::Result<()> {
        writeln!(
            self.file,
            "\n\n\n#### ERROR ###\n\n{}\n\n VS generation aborted.\n\n####      ####",
            message
        )?;
        self.file.flush()
    }

    /// Close the log of a completed run with the sentinel line.
    pub fn done(mut self) -> std::io::Result<PathBuf> {
        writeln!(self.file, "\n\t\t\t process completed successfully.\n\n\n\n{}", SENTINEL)?;
        self.file.flush()?;
        Ok(self.path)
    }
}

/// Session data recovered from a run log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoredSession {
    pub output: Option<PathBuf>,
    pub filter: Option<FilterRules>,
    pub receptors: Vec<PathBuf>,
    pub flex: Option<FlexibleResidueSpec>,
    pub maps: Option<MapPolicy>,
    pub gpf: Option<Template>,
    pub dpf: Option<Template>,
    pub ligands: Vec<PathBuf>,
    /// The log ends with the completion sentinel.
    pub completed: bool,
    /// One entry per section that was missing or malformed.
    pub warnings: Vec<String>,
}

/// Read and parse a run log. Only an unreadable file is an error.
pub fn restore(path: &Path) -> anyhow::Result<RestoredSession> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading run log {}", path.display()))?;
    Ok(parse(&text))
}

fn tagged<'a>(text: &'a str, tag: &'a str) -> impl Iterator<Item = &'a str> {
    text.lines()
        .filter_map(move |line| line.strip_prefix(tag))
        .map(|rest| rest.strip_prefix('\t').unwrap_or(rest))
}

fn parse_bounds(text: &str, label: &str) -> Option<(String, String)> {
    let line = text.lines().find(|l| l.contains(label))?;
    let values: Vec<&str> = line
        .split_once(label)?
        .1
        .split_whitespace()
        .filter(|t| *t != "-")
        .collect();
    match values.as_slice() {
        [min, max] => Some((min.to_string(), max.to_string())),
        _ => None,
    }
}

fn parse_filter(text: &str) -> Option<FilterRules> {
    let int = |label: &str| -> Option<Bounds<usize>> {
        let (min, max) = parse_bounds(text, label)?;
        Some(Bounds::new(min.parse().ok()?, max.parse().ok()?))
    };
    let (wmin, wmax) = parse_bounds(text, FILTER_LABELS[2])?;
    let reject = text
        .lines()
        .find_map(|l| l.split_once(REJECT_LABEL))
        .map(|(_, value)| value.trim().to_ascii_lowercase())?;
    Some(FilterRules {
        donors: int(FILTER_LABELS[0])?,
        acceptors: int(FILTER_LABELS[1])?,
        weight: Bounds::new(wmin.parse().ok()?, wmax.parse().ok()?),
        heavy_atoms: int(FILTER_LABELS[3])?,
        torsions: int(FILTER_LABELS[4])?,
        reject_non_standard: matches!(reject.as_str(), "true" | "1"),
    })
}

fn parse_flex(line: &str) -> Option<FlexibleResidueSpec> {
    if let Some((_, path)) = line.split_once(FILE_LABEL) {
        let path = path.trim();
        return (!path.is_empty()).then(|| FlexibleResidueSpec::FromFile(path.into()));
    }
    let (_, selection) = line.split_once(SELECTION_LABEL)?;
    let selection = selection.trim();
    (!selection.is_empty()).then(|| FlexibleResidueSpec::FromSelection(selection.to_string()))
}

fn parse_maps(text: &str) -> Result<MapPolicy, String> {
    let mode = text
        .lines()
        .find_map(|l| l.split_once(GRID_MODE))
        .map(|(_, mode)| mode)
        .ok_or_else(|| "no grid mode".to_string())?;
    let transfer = if mode.contains(">linked<") {
        TransferMode::Symlink
    } else {
        TransferMode::Copy
    };
    if mode.contains("calculated in each job") {
        Ok(MapPolicy::PerJob)
    } else if mode.contains("calculated now") {
        Ok(MapPolicy::PrecomputeNow { transfer })
    } else if mode.contains("use pre-calculated") {
        let dir = text
            .lines()
            .find_map(|l| l.split_once(CACHE_DIR))
            .map(|(_, dir)| dir.trim())
            .filter(|dir| !dir.is_empty())
            .ok_or_else(|| "pre-calculated maps without a cache directory".to_string())?;
        Ok(MapPolicy::Cached {
            dir: dir.into(),
            transfer,
        })
    } else {
        Err(format!("unknown grid mode '{}'", mode.trim()))
    }
}

/// Parse run log text, collecting a warning per missing or malformed section.
pub fn parse(text: &str) -> RestoredSession {
    let mut session = RestoredSession::default();
    let warn = |message: String| {
        log::warn!("Run log: {}", message);
        message
    };
    let mut warnings = Vec::new();

    session.output = text
        .lines()
        .find_map(|l| l.split_once(OUTPUT_LABEL))
        .map(|(_, dir)| dir.trim())
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from);

    session.filter = parse_filter(text);
    if session.filter.is_none() {
        warnings.push(warn("filter settings missing or malformed".into()));
    }

    session.receptors = tagged(text, TARGET_TAG)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect();
    if session.receptors.is_empty() {
        warnings.push(warn("no receptor".into()));
    }

    if let Some(line) = tagged(text, FLEX_TAG).next() {
        session.flex = parse_flex(line);
        if session.flex.is_none() {
            warnings.push(warn(format!("malformed flexible residue line '{}'", line.trim())));
        }
    }

    match parse_maps(text) {
        Ok(maps) => session.maps = Some(maps),
        Err(message) => warnings.push(warn(message)),
    }

    let gpf: Vec<&str> = tagged(text, GPF_TAG).collect();
    if !gpf.is_empty() {
        session.gpf = Some(Template::from_lines(gpf));
    } else if session.maps.as_ref().is_some_and(MapPolicy::uses_grid_template) {
        warnings.push(warn("no grid parameter template".into()));
    }

    let dpf: Vec<&str> = tagged(text, DPF_TAG).collect();
    if dpf.is_empty() {
        warnings.push(warn("no docking parameter template".into()));
    } else {
        session.dpf = Some(Template::from_lines(dpf));
    }

    session.ligands = tagged(text, LIGAND_TAG)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect();
    if session.ligands.is_empty() {
        warnings.push(warn("no ligands".into()));
    }

    session.completed = text.lines().any(|l| l.trim() == SENTINEL);
    session.warnings = warnings;
    session
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receptor::ReceptorSpec;
    use crate::registry::tests::write_ligand;
    use crate::registry::Registry;
    use crate::request::GenerationRequestBuilder;

    fn request(dir: &Path, maps: MapPolicy) -> GenerationRequest {
        let mut registry = Registry::new();
        let lig = write_ligand(dir, "lig1", &["C", "OA"], 2);
        registry.register(&lig).unwrap();
        let mut filter = FilterRules::default();
        filter.weight = Bounds::new(160.0, 480.5);
        filter.reject_non_standard = false;
        GenerationRequestBuilder::default()
            .output_root(dir.join("out"))
            .ligands(registry.ligands().to_vec())
            .receptors(ReceptorSpec::multi([dir.join("r1.pdbqt"), dir.join("r2.pdbqt")]))
            .flex(FlexibleResidueSpec::FromSelection("THR276, B:HIS229".into()))
            .maps(maps)
            .dpf(Template::default_docking())
            .gpf(Template::from_lines(["npts 50 50 50", "", "spacing 0.4"]))
            .filter(filter)
            .build()
            .unwrap()
    }

    #[test]
    fn header_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let request = request(
            dir.path(),
            MapPolicy::PrecomputeNow {
                transfer: TransferMode::Symlink,
            },
        );
        let text = header(&request, &chrono::Local::now());
        assert!(text.contains("TARGET>\t"));
        let session = parse(&text);
        assert!(session.warnings.is_empty(), "{:?}", session.warnings);
        assert_eq!(session.output.as_ref(), Some(request.output_root()));
        assert_eq!(session.filter.as_ref(), Some(request.filter()));
        assert_eq!(session.receptors.len(), 2);
        assert_eq!(
            session.flex,
            Some(FlexibleResidueSpec::FromSelection("THR276, B:HIS229".into()))
        );
        assert_eq!(
            session.maps,
            Some(MapPolicy::PrecomputeNow {
                transfer: TransferMode::Symlink
            })
        );
        assert_eq!(
            session.gpf.unwrap().lines(),
            &["npts 50 50 50".to_string(), "spacing 0.4".to_string()]
        );
        assert_eq!(session.dpf.as_ref(), Some(request.dpf()));
        assert_eq!(session.ligands, vec![request.ligands()[0].path().clone()]);
        assert!(!session.completed);
    }

    #[test]
    fn cached_maps_and_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        let request = request(
            dir.path(),
            MapPolicy::Cached {
                dir: cache.clone(),
                transfer: TransferMode::Copy,
            },
        );
        std::fs::create_dir_all(request.output_root()).unwrap();
        let log = RunLog::create(&request).unwrap();
        let path = log.done().unwrap();
        let session = restore(&path).unwrap();
        assert!(session.completed);
        assert_eq!(
            session.maps,
            Some(MapPolicy::Cached {
                dir: cache,
                transfer: TransferMode::Copy
            })
        );
        assert!(session.gpf.is_none());
        assert!(session.warnings.is_empty());
    }

    #[test]
    fn earlier_logs_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let request = request(dir.path(), MapPolicy::PerJob);
        std::fs::create_dir_all(request.output_root()).unwrap();
        let mut first = RunLog::create(&request).unwrap();
        first.abort().unwrap();
        let second = RunLog::create(&request).unwrap();
        assert_ne!(first.path(), second.path());
        let text = std::fs::read_to_string(first.path()).unwrap();
        assert!(text.contains("#### ABORT ###"));
        let path = second.done().unwrap();
        assert!(restore(&path).unwrap().completed);
    }

    #[test]
    fn tolerant_restore() {
        let text = "FLEX> Flexible residues from the file :\t/data/flex.pdbqt\n\
                    LIGAND> /data/lig.pdbqt\n\
                    Hb donors :   x  -  3\n";
        let session = parse(text);
        assert_eq!(
            session.flex,
            Some(FlexibleResidueSpec::FromFile("/data/flex.pdbqt".into()))
        );
        assert_eq!(session.ligands, vec![PathBuf::from("/data/lig.pdbqt")]);
        assert!(session.filter.is_none());
        assert!(session.receptors.is_empty());
        assert!(session.dpf.is_none());
        assert_eq!(session.warnings.len(), 4);
    }
}
