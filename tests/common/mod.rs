//! Shared utilities for integration tests.
//!
//! Writes small PDBQT ligands, receptors and grid map caches into temporary
//! directories, and provides a grid engine, filesystems and an observer that
//! record what the generator does. A recursive YAML comparator walks two
//! `serde_yaml::Value` trees and reports all mismatches with their full
//! dotted path; it is used to check the YAML written by the `vsgen` binary.

#![allow(dead_code)]

use std::cell::Cell;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_yaml::Value;
use vsgen::engine::{log_name, EngineError, GridEngine};
use vsgen::fsops::{FileOps, LocalFs};
use vsgen::generate::{Job, Observer, RunState};
use vsgen::params::Template;
use vsgen::receptor::ReceptorSpec;
use vsgen::registry::{LigandRecord, Registry};
use vsgen::request::{GenerationRequestBuilder, MapPolicy};
use vsgen::structure::StructurePreparer;

/// Four receptor atoms of two residues, typed N, C, OA and N.
pub const RECEPTOR: &str = "\
ATOM      1  N   THR A 276      11.104   6.134  -6.504  1.00  0.00    -0.346 N
ATOM      2  CA  THR A 276      11.639   6.071  -5.147  1.00  0.00     0.180 C
ATOM      3  OG1 THR A 276      10.000   6.071  -5.147  1.00  0.00    -0.393 OA
ATOM      4  N   HIS B 229      12.000   6.071  -5.147  1.00  0.00    -0.346 N
";

/// Atom types of the three ligands written by [`Screen::new`].
pub const LIGAND_TYPES: [(&str, &[&str]); 3] = [
    ("lig1.pdbqt", &["C", "OA"]),
    ("lig2.pdbqt", &["C", "N", "HD"]),
    ("lig3.pdbqt", &["C", "OA", "N"]),
];

/// Map types of the cache written by [`Screen::new`]; `SA` is never needed.
pub const CACHE_TYPES: [&str; 5] = ["C", "HD", "N", "OA", "SA"];

fn atom_line(serial: usize, atom_type: &str, position: [f64; 3]) -> String {
    format!(
        "ATOM  {:>5}  X   LIG     1    {:>8.3}{:>8.3}{:>8.3}  0.00  0.00     0.000 {}\n",
        serial, position[0], position[1], position[2], atom_type
    )
}

/// Write a rigid-root PDBQT ligand with the given atoms.
pub fn write_ligand(dir: &Path, name: &str, atoms: &[(&str, [f64; 3])], torsdof: usize) -> PathBuf {
    let mut text = String::from("REMARK  test ligand\nROOT\n");
    for (i, (atom_type, position)) in atoms.iter().enumerate() {
        text.push_str(&atom_line(i + 1, atom_type, *position));
    }
    text.push_str(&format!("ENDROOT\nTORSDOF {torsdof}\n"));
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

/// Ligand with one atom per type, 3 Å apart so no hydrogen makes a donor.
pub fn write_simple_ligand(dir: &Path, name: &str, types: &[&str]) -> PathBuf {
    let atoms: Vec<(&str, [f64; 3])> = types
        .iter()
        .enumerate()
        .map(|(i, t)| (*t, [3.0 * i as f64, 0.0, 0.0]))
        .collect();
    write_ligand(dir, name, &atoms, 1)
}

/// Drug-like ligand: 1 N, 2 OA and 22 C heavy atoms plus one polar hydrogen
/// 1 Å from the nitrogen. One donor, two acceptors, weight 311, five torsions.
pub fn write_drug_like(dir: &Path, name: &str) -> PathBuf {
    let mut atoms = vec![("N", [0.0, 0.0, 0.0]), ("HD", [1.0, 0.0, 0.0])];
    atoms.push(("OA", [0.0, 3.0, 0.0]));
    atoms.push(("OA", [0.0, 6.0, 0.0]));
    for i in 0..22 {
        atoms.push(("C", [1.5 * (i % 11) as f64, 10.0 + 1.5 * (i / 11) as f64, 0.0]));
    }
    write_ligand(dir, name, &atoms, 5)
}

pub fn write_receptor(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, RECEPTOR).unwrap();
    path
}

/// The six header lines shared by every map of a set.
pub fn map_header(stem: &str) -> String {
    format!(
        "GRID_PARAMETER_FILE {stem}.gpf\nGRID_DATA_FILE {stem}.maps.fld\nMACROMOLECULE {stem}.pdbqt\nSPACING 0.375\nNELEMENTS 2 2 2\nCENTER 0.000 0.000 0.000\n"
    )
}

/// Write a complete map set: one map per type plus `e`, `d`, `.fld` and `.xyz`.
pub fn write_map_set(dir: &Path, stem: &str, types: &[&str]) {
    std::fs::create_dir_all(dir).unwrap();
    for t in types.iter().chain(&["e", "d"]) {
        std::fs::write(
            dir.join(format!("{stem}.{t}.map")),
            format!("{}0.100\n0.200\n", map_header(stem)),
        )
        .unwrap();
    }
    std::fs::write(dir.join(format!("{stem}.maps.fld")), "# AVS field file\n").unwrap();
    std::fs::write(dir.join(format!("{stem}.maps.xyz")), "-1.0 1.0\n").unwrap();
}

/// File names in `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Receptors, ligands and a map cache in one temporary directory.
pub struct Screen {
    pub dir: tempfile::TempDir,
    pub receptors: Vec<PathBuf>,
    pub ligands: Vec<LigandRecord>,
    pub cache: PathBuf,
}

impl Screen {
    /// `receptors` receptors named `rec1`, `rec2`, ... and the ligands of [`LIGAND_TYPES`].
    pub fn new(receptors: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ligand_dir = dir.path().join("ligands");
        std::fs::create_dir(&ligand_dir).unwrap();
        let mut registry = Registry::new();
        for (name, types) in LIGAND_TYPES {
            registry
                .register(write_simple_ligand(&ligand_dir, name, types))
                .unwrap();
        }
        let receptors = (1..=receptors)
            .map(|i| write_receptor(dir.path(), &format!("rec{i}.pdbqt")))
            .collect();
        let cache = dir.path().join("cache");
        write_map_set(&cache, "cache", &CACHE_TYPES);
        Self {
            receptors,
            ligands: registry.ligands().to_vec(),
            cache,
            dir,
        }
    }

    pub fn output(&self) -> PathBuf {
        self.dir.path().join("screen")
    }

    /// Request builder for every receptor and ligand with the default docking template.
    pub fn request(&self, maps: MapPolicy) -> GenerationRequestBuilder {
        let mut builder = GenerationRequestBuilder::default();
        builder
            .output_root(self.output())
            .ligands(self.ligands.clone())
            .receptors(ReceptorSpec::multi(self.receptors.clone()))
            .maps(maps)
            .dpf(Template::default_docking());
        builder
    }
}

/// Grid engine writing one small map per map line of the parameter file.
#[derive(Debug, Default)]
pub struct FakeGrid {
    pub runs: Cell<usize>,
}

impl GridEngine for FakeGrid {
    fn compute_maps(&self, dir: &Path, gpf: &str) -> Result<(), EngineError> {
        self.runs.set(self.runs.get() + 1);
        let text = std::fs::read_to_string(dir.join(gpf)).unwrap();
        let mut stem = String::new();
        for line in text.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                ["gridfld", fld, ..] => {
                    stem = fld.trim_end_matches(".maps.fld").to_string();
                    std::fs::write(dir.join(fld), "# AVS field file\n").unwrap();
                    std::fs::write(dir.join(format!("{stem}.maps.xyz")), "-1.0 1.0\n").unwrap();
                }
                ["map" | "elecmap" | "dsolvmap", map, ..] => {
                    std::fs::write(dir.join(map), format!("{}0.100\n", map_header(&stem))).unwrap();
                }
                _ => {}
            }
        }
        std::fs::write(dir.join(log_name(gpf)), "autogrid4: Successful Completion.\n").unwrap();
        Ok(())
    }
}

/// Residue name of a selection token such as `THR276` or `B:HIS229`.
fn residue_name(token: &str) -> String {
    let residue = token.rsplit(':').next().unwrap_or(token);
    residue.chars().take(3).collect()
}

/// Preparer writing canned PDBQT without calling any external tool.
#[derive(Debug, Default)]
pub struct FakePreparer;

impl StructurePreparer for FakePreparer {
    fn prepare_ligand(&self, input: &Path, output: &Path) -> anyhow::Result<()> {
        let text = std::fs::read_to_string(input)?;
        let mut pdbqt = String::from("ROOT\n");
        for line in text.lines().filter(|l| l.starts_with("ATOM") || l.starts_with("HETATM")) {
            pdbqt.push_str(line);
            pdbqt.push('\n');
        }
        pdbqt.push_str("ENDROOT\nTORSDOF 0\n");
        std::fs::write(output, pdbqt)?;
        Ok(())
    }

    fn prepare_receptor(&self, input: &Path, output: &Path) -> anyhow::Result<()> {
        std::fs::copy(input, output)?;
        Ok(())
    }

    fn split_flexible(
        &self,
        receptor: &Path,
        residues: &[String],
        rigid: &Path,
        flex: &Path,
    ) -> anyhow::Result<()> {
        let names: Vec<String> = residues.iter().map(|r| residue_name(r)).collect();
        let text = std::fs::read_to_string(receptor)?;
        let (moving, fixed): (Vec<&str>, Vec<&str>) = text
            .lines()
            .partition(|l| names.iter().any(|n| l.get(17..20) == Some(n.as_str())));
        std::fs::write(rigid, format!("{}\n", fixed.join("\n")))?;
        let mut flex_text = String::new();
        for name in &names {
            flex_text.push_str(&format!("BEGIN_RES {name}\nREMARK  2 active torsions:\nROOT\n"));
            for line in moving.iter().filter(|l| l.get(17..20) == Some(name.as_str())) {
                flex_text.push_str(line);
                flex_text.push('\n');
            }
            flex_text.push_str(&format!("ENDROOT\nEND_RES {name}\n"));
        }
        std::fs::write(flex, flex_text)?;
        Ok(())
    }
}

/// Local filesystem counting every operation.
#[derive(Debug, Default)]
pub struct CountingFs {
    pub dirs: Cell<usize>,
    pub copies: Cell<usize>,
    pub links: Cell<usize>,
    pub writes: Cell<usize>,
}

impl CountingFs {
    pub fn total(&self) -> usize {
        self.dirs.get() + self.copies.get() + self.links.get() + self.writes.get()
    }
}

impl FileOps for CountingFs {
    fn create_dir(&self, path: &Path) -> io::Result<bool> {
        self.dirs.set(self.dirs.get() + 1);
        LocalFs.create_dir(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.copies.set(self.copies.get() + 1);
        LocalFs.copy(from, to)
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        self.links.set(self.links.get() + 1);
        LocalFs.symlink(target, link)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.writes.set(self.writes.get() + 1);
        LocalFs.write(path, contents)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        LocalFs.remove_dir_all(path)
    }
}

/// Local filesystem refusing copies into paths containing `pattern`.
#[derive(Debug)]
pub struct FailingFs {
    pub pattern: String,
}

impl FileOps for FailingFs {
    fn create_dir(&self, path: &Path) -> io::Result<bool> {
        LocalFs.create_dir(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        if to.to_string_lossy().contains(&self.pattern) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "disk is read-only"));
        }
        LocalFs.copy(from, to)
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        LocalFs.symlink(target, link)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        LocalFs.write(path, contents)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        LocalFs.remove_dir_all(path)
    }
}

/// Observer recording states and jobs, optionally cancelling after some jobs.
#[derive(Debug, Default)]
pub struct Recorder {
    pub cancel_after: Option<usize>,
    pub states: Vec<RunState>,
    pub jobs: Vec<PathBuf>,
    pub receptors: Vec<PathBuf>,
}

impl Recorder {
    pub fn cancelling_after(jobs: usize) -> Self {
        Self {
            cancel_after: Some(jobs),
            ..Default::default()
        }
    }
}

impl Observer for Recorder {
    fn on_state(&mut self, state: RunState) {
        self.states.push(state);
    }

    fn on_receptor(&mut self, _index: usize, receptor: &Path) {
        self.receptors.push(receptor.to_path_buf());
    }

    fn on_job(&mut self, job: &Job) {
        self.jobs.push(job.dir().clone());
    }

    fn cancel_requested(&self) -> bool {
        self.cancel_after.is_some_and(|n| self.jobs.len() >= n)
    }
}

/// Path to the compiled `vsgen` binary.
pub fn vsgen_binary() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_BIN_EXE_vsgen"));
    if !path.exists() {
        path = PathBuf::from("target/debug/vsgen");
    }
    path
}

/// Run vsgen in `dir` with the given arguments, assert success and parse its YAML output.
pub fn run_vsgen(dir: &Path, args: &[&str]) -> Value {
    let output = dir.join("output.yaml");
    let status = Command::new(vsgen_binary())
        .current_dir(dir)
        .arg("-o")
        .arg(&output)
        .args(args)
        .status()
        .expect("failed to execute vsgen binary");
    assert!(status.success(), "vsgen exited with status: {status}");
    serde_yaml::from_str(&std::fs::read_to_string(&output).expect("failed to read output.yaml"))
        .expect("failed to parse output.yaml")
}

/// Compare two YAML values recursively.
///
/// Returns a list of human-readable difference descriptions.
/// Keys listed in `ignored_keys` are skipped entirely.
pub fn compare_yaml(
    expected: &Value,
    actual: &Value,
    float_tolerance: f64,
    ignored_keys: &[&str],
) -> Vec<String> {
    let mut diffs = Vec::new();
    compare_recursive(
        expected,
        actual,
        "",
        float_tolerance,
        ignored_keys,
        &mut diffs,
    );
    diffs
}

/// Assert that two YAML values match, panicking with all diffs on failure.
pub fn assert_yaml_eq(
    expected: &Value,
    actual: &Value,
    float_tolerance: f64,
    ignored_keys: &[&str],
) {
    let diffs = compare_yaml(expected, actual, float_tolerance, ignored_keys);
    if !diffs.is_empty() {
        let report = diffs
            .iter()
            .enumerate()
            .map(|(i, d)| format!("  {}. {}", i + 1, d))
            .collect::<Vec<_>>()
            .join("\n");
        panic!(
            "YAML comparison found {} difference(s):\n{}",
            diffs.len(),
            report
        );
    }
}

fn compare_recursive(
    expected: &Value,
    actual: &Value,
    path: &str,
    tol: f64,
    ignored_keys: &[&str],
    diffs: &mut Vec<String>,
) {
    match (expected, actual) {
        (Value::Null, Value::Null) => {}
        (Value::Bool(a), Value::Bool(b)) => {
            if a != b {
                diffs.push(format!("{path}: bool mismatch: expected {a}, got {b}"));
            }
        }
        (Value::String(a), Value::String(b)) => {
            if a != b {
                diffs.push(format!(
                    "{path}: string mismatch: expected \"{a}\", got \"{b}\""
                ));
            }
        }
        (Value::Number(a), Value::Number(b)) => {
            compare_numbers(a, b, path, tol, diffs);
        }
        (Value::Sequence(a), Value::Sequence(b)) => {
            if a.len() != b.len() {
                diffs.push(format!(
                    "{path}: sequence length mismatch: expected {}, got {}",
                    a.len(),
                    b.len()
                ));
            } else {
                for (i, (ea, eb)) in a.iter().zip(b.iter()).enumerate() {
                    let child = format!("{path}[{i}]");
                    compare_recursive(ea, eb, &child, tol, ignored_keys, diffs);
                }
            }
        }
        (Value::Mapping(a), Value::Mapping(b)) => {
            compare_mappings(a, b, path, tol, ignored_keys, diffs);
        }
        (Value::Tagged(a), Value::Tagged(b)) => {
            if a.tag != b.tag {
                diffs.push(format!(
                    "{path}: tag mismatch: expected !{}, got !{}",
                    a.tag, b.tag
                ));
            }
            compare_recursive(&a.value, &b.value, path, tol, ignored_keys, diffs);
        }
        _ => {
            diffs.push(format!(
                "{path}: type mismatch: expected {}, got {}",
                type_name(expected),
                type_name(actual)
            ));
        }
    }
}

fn compare_numbers(
    a: &serde_yaml::Number,
    b: &serde_yaml::Number,
    path: &str,
    tol: f64,
    diffs: &mut Vec<String>,
) {
    match (a.as_i64(), b.as_i64()) {
        (Some(ai), Some(bi)) => {
            if ai != bi {
                diffs.push(format!("{path}: integer mismatch: expected {ai}, got {bi}"));
            }
        }
        _ => {
            let af = a.as_f64().unwrap_or(f64::NAN);
            let bf = b.as_f64().unwrap_or(f64::NAN);
            if (af - bf).abs() > tol {
                diffs.push(format!(
                    "{path}: float mismatch: expected {af}, got {bf} (diff = {}, tol = {tol})",
                    (af - bf).abs()
                ));
            }
        }
    }
}

fn child_path(parent: &str, key: &Value) -> String {
    let key = match key {
        Value::String(s) => s.clone(),
        other => format!("{other:?}"),
    };
    if parent.is_empty() {
        key
    } else {
        format!("{parent}.{key}")
    }
}

fn is_ignored(key: &Value, ignored_keys: &[&str]) -> bool {
    matches!(key, Value::String(s) if ignored_keys.contains(&s.as_str()))
}

fn compare_mappings(
    a: &serde_yaml::Mapping,
    b: &serde_yaml::Mapping,
    path: &str,
    tol: f64,
    ignored_keys: &[&str],
    diffs: &mut Vec<String>,
) {
    for (k, v) in a {
        if is_ignored(k, ignored_keys) {
            continue;
        }
        let child = child_path(path, k);
        match b.get(k) {
            Some(bv) => compare_recursive(v, bv, &child, tol, ignored_keys, diffs),
            None => diffs.push(format!("{child}: key missing in actual")),
        }
    }
    for k in b.keys() {
        if is_ignored(k, ignored_keys) {
            continue;
        }
        if !a.contains_key(k) {
            diffs.push(format!("{}: unexpected key in actual", child_path(path, k)));
        }
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_within_tolerance() {
        let a: Value = serde_yaml::from_str("x: 311.0").unwrap();
        let b: Value = serde_yaml::from_str("x: 311.0000000001").unwrap();
        assert!(compare_yaml(&a, &b, 1e-9, &[]).is_empty());
    }

    #[test]
    fn nested_path_reported() {
        let a: Value = serde_yaml::from_str("a:\n  b:\n    c: 1").unwrap();
        let b: Value = serde_yaml::from_str("a:\n  b:\n    c: 2").unwrap();
        let diffs = compare_yaml(&a, &b, 1e-10, &[]);
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].contains("a.b.c"));
    }

    #[test]
    fn tagged_mismatch_reported() {
        let a: Value = serde_yaml::from_str("!Weight 311.0").unwrap();
        let b: Value = serde_yaml::from_str("!Donors 1").unwrap();
        let diffs = compare_yaml(&a, &b, 1e-10, &[]);
        assert!(diffs[0].contains("tag mismatch"));
    }

    #[test]
    fn ignored_keys_are_skipped() {
        let a: Value = serde_yaml::from_str("x: 1\nlog: a.log").unwrap();
        let b: Value = serde_yaml::from_str("x: 1\nlog: b.log").unwrap();
        assert!(compare_yaml(&a, &b, 1e-10, &["log"]).is_empty());
    }
}
