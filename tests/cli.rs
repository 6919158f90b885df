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

//! Runs of the `vsgen` binary.

mod common;

use common::{run_vsgen, Screen};
use serde_yaml::Value;
use vsgen::scripts;

fn write_input(screen: &Screen) -> std::path::PathBuf {
    let input = screen.dir.path().join("input.yaml");
    let receptors: Vec<String> = screen
        .receptors
        .iter()
        .map(|r| r.display().to_string())
        .collect();
    std::fs::write(
        &input,
        format!(
            "output: screen\nligands:\n  dirs: [{}]\nreceptors: [{}]\nmaps:\n  mode: cached\n  dir: {}\n",
            screen.dir.path().join("ligands").display(),
            receptors.join(", "),
            screen.cache.display()
        ),
    )
    .unwrap();
    input
}

#[test]
fn generate_and_restore() {
    let screen = Screen::new(2);
    write_input(&screen);
    let output = run_vsgen(screen.dir.path(), &["generate", "-i", "input.yaml"]);

    let generation = &output["generation"];
    assert_eq!(generation["state"], Value::from("Completed"));
    assert_eq!(generation["jobs"].as_sequence().unwrap().len(), 6);
    assert_eq!(output["filter"]["accepted"].as_sequence().unwrap().len(), 3);
    assert_eq!(scripts::find_job_dirs(&screen.output()).unwrap().len(), 6);
    assert!(screen.output().join(scripts::MASTER_SH).is_file());

    let log = generation["log"].as_str().unwrap();
    let output = run_vsgen(screen.dir.path(), &["restore", log, "-i", "restored.yaml"]);
    assert_eq!(output["completed"], Value::from(true));
    assert!(output["warnings"].as_sequence().unwrap().is_empty());
    let restored = vsgen::config::Config::from_file(&screen.dir.path().join("restored.yaml")).unwrap();
    assert_eq!(restored.receptors, screen.receptors);
    assert_eq!(restored.ligands.files.len(), 3);
}

#[test]
fn scripts_for_an_existing_tree() {
    let screen = Screen::new(1);
    write_input(&screen);
    run_vsgen(screen.dir.path(), &["generate", "-i", "input.yaml"]);

    let output = run_vsgen(
        screen.dir.path(),
        &["scripts", "-r", "screen", "-t", "pbs", "--time", "06:30:00", "--runs", "2"],
    );
    // three run scripts plus the job list and the submission script
    assert_eq!(output["scripts"].as_sequence().unwrap().len(), 5);
    let list = std::fs::read_to_string(screen.output().join(scripts::JOBS_LIST)).unwrap();
    assert_eq!(list, "rec1/lig1_rec1\nrec1/lig2_rec1\nrec1/lig3_rec1\n");
    let submit = std::fs::read_to_string(screen.output().join(scripts::SUBMIT_SH)).unwrap();
    assert!(submit.contains("WALLT=\"06:30:00\""));

    let output = run_vsgen(screen.dir.path(), &["archive", "-r", "screen", "-f", "zip"]);
    let archive = output["archive"].as_str().unwrap();
    assert!(archive.ends_with("VSpack_screen.zip"));
    assert!(screen.dir.path().join(archive).is_file());
}

#[test]
fn ligand_list_export_and_check() {
    let screen = Screen::new(1);
    write_input(&screen);
    let output = run_vsgen(
        screen.dir.path(),
        &["ligand-list", "export", "-i", "input.yaml", "selected.txt"],
    );
    assert_eq!(output["exported"], Value::from(3));

    std::fs::remove_file(screen.ligands[1].path()).unwrap();
    let output = run_vsgen(screen.dir.path(), &["ligand-list", "check", "selected.txt"]);
    assert_eq!(output["found"].as_sequence().unwrap().len(), 2);
    assert_eq!(
        output["missing"],
        Value::Sequence(vec![Value::from(screen.ligands[1].path().display().to_string())])
    );
}
