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

//! Launch scripts for the job tree.
//!
//! Each job gets a run script calling the engines by their conventional
//! names. Job directories are then chained by a master script (workstation,
//! Windows) or listed for a PBS submission script (batch queue).

use crate::engine::{AUTODOCK, AUTOGRID};
use crate::fsops::FileOps;
use crate::request::{PbsSettings, TargetEnvironment};
use std::fmt::Write;
use std::io;
use std::path::{Component, Path, PathBuf};

pub const RUN_SH: &str = "run.sh";
pub const RUN_BAT: &str = "run.bat";
pub const MASTER_SH: &str = "RunVS.sh";
pub const MASTER_BAT: &str = "RunVS.bat";
pub const JOBS_LIST: &str = "jobs_list";
pub const SUBMIT_SH: &str = "vs_submit.sh";

const GENERATED_BY: &str = concat!("Generated by vsgen ", env!("CARGO_PKG_VERSION"));

/// File name without its last extension.
fn stem(file: &str) -> &str {
    file.rsplit_once('.').map(|(s, _)| s).unwrap_or(file)
}

/// Run script for one job directory. Returns the script name and content.
///
/// The grid engine is only called when the job has its own grid parameter file.
pub fn job_script(target: &TargetEnvironment, gpf: Option<&str>, dpf: &str) -> (&'static str, String) {
    let windows = matches!(target, TargetEnvironment::Windows);
    let exe = if windows { ".exe" } else { "" };
    let mut text = if windows {
        format!("@echo off\nREM {}\n", GENERATED_BY)
    } else {
        format!("#!/bin/bash\n# {}\n", GENERATED_BY)
    };
    if let Some(gpf) = gpf {
        let _ = writeln!(text, "echo Running AutoGrid...");
        let _ = writeln!(text, "{}{} -p {} -l {}.glg", AUTOGRID, exe, gpf, stem(gpf));
    }
    let _ = writeln!(text, "echo Running AutoDock...");
    let _ = writeln!(text, "{}{} -p {} -l {}.dlg", AUTODOCK, exe, dpf, stem(dpf));
    (if windows { RUN_BAT } else { RUN_SH }, text)
}

/// Write the run script into `dir`.
pub fn write_job_script(
    fs: &dyn FileOps,
    dir: &Path,
    target: &TargetEnvironment,
    gpf: Option<&str>,
    dpf: &str,
) -> io::Result<PathBuf> {
    let (name, text) = job_script(target, gpf, dpf);
    let path = dir.join(name);
    fs.write_script(&path, &text)?;
    Ok(path)
}

/// Path of `dir` relative to `base`, using forward slashes.
fn relative(base: &Path, dir: &Path) -> String {
    let relative = dir.strip_prefix(base).unwrap_or(dir);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Master script in `base` that runs every job directory in the given order.
pub fn master_script(target: &TargetEnvironment, base: &Path, job_dirs: &[PathBuf]) -> (&'static str, String) {
    let windows = matches!(target, TargetEnvironment::Windows);
    let mut text = if windows {
        format!("@echo off\nREM {}\n", GENERATED_BY)
    } else {
        format!("#!/bin/bash\n# {}\n", GENERATED_BY)
    };
    for dir in job_dirs {
        let path = relative(base, dir);
        let back = vec![".."; path.split('/').count()].join("/");
        if windows {
            let path = path.replace('/', "\\");
            let back = back.replace('/', "\\");
            let _ = writeln!(text, "echo Docking {}\ncd {}\ncall {}\ncd {}\n", path, path, RUN_BAT, back);
        } else {
            let _ = writeln!(text, "echo 'Docking {}'\ncd {}\n./{}\ncd {}\n", path, path, RUN_SH, back);
        }
    }
    let _ = writeln!(text, "echo Calculation completed.");
    (if windows { MASTER_BAT } else { MASTER_SH }, text)
}

/// PBS submission script reading `jobs_list` from its own directory.
pub fn submit_script(settings: &PbsSettings, per_job_maps: bool) -> String {
    let mut text = format!("#!/bin/bash\n#\n# {}\n#\n\n", GENERATED_BY);
    let _ = writeln!(text, "#### PBS jobs parameters");
    let _ = writeln!(text, "CPUT=\"{}\"", settings.time);
    let _ = writeln!(text, "WALLT=\"{}\"", settings.time);
    let _ = writeln!(text, "NODES=1\nPPN=1\nMEM=512mb\n");
    let _ = writeln!(text, "# use the following line to set special options (e.g. specific queues)");
    let _ = writeln!(text, "#OPT=\"-q MyPriorQueue\"\nOPT=\"\"\n");
    let _ = writeln!(text, "# Paths for executables on the cluster");
    let _ = writeln!(text, "QSUB=\"qsub\"\nAUTODOCK=\"{}\"", AUTODOCK);
    if per_job_maps {
        let _ = writeln!(text, "AUTOGRID=\"{}\"", AUTOGRID);
    }
    let _ = writeln!(text, "\nWORKING_PATH=`pwd`\n");

    let mut programs = vec![("AUTODOCK", "AutoDock")];
    if per_job_maps {
        programs.push(("AUTOGRID", "AutoGrid"));
    }
    programs.push(("QSUB", "qsub"));
    for (var, label) in programs {
        let _ = writeln!(
            text,
            "type ${var} &> /dev/null || {{\n        echo -e \"\\nError: the file [${var}] doesn't exist or is not executable\\n\";\n        echo -e \"Specify the full path to the {label} executable in this script\";\n        echo -e \" [ virtual screening submission aborted ]\\n\"\n        exit 1; }}\n"
        );
    }

    let multiple = settings.runs > 1;
    let (indent, job, dlg) = if multiple {
        ("    ", "$JOB.$i.job", "$JOB.$i.dlg")
    } else {
        ("", "$JOB.job", "$JOB.dlg")
    };
    let _ = writeln!(text, "echo Starting submission...");
    let _ = writeln!(text, "for NAME in `cat {}`\n    do", JOBS_LIST);
    let _ = writeln!(text, "        JOB=`basename $NAME`");
    let _ = writeln!(text, "        cd $WORKING_PATH/$NAME");
    if multiple {
        let _ = writeln!(text, "        for i in `seq 1 {}`\n            do", settings.runs);
    }
    let _ = writeln!(text, "{indent}        echo \"#!/bin/bash\" > {job}");
    let _ = writeln!(text, "{indent}        echo \"cd $WORKING_PATH/$NAME\" >> {job}");
    if per_job_maps {
        let _ = writeln!(text, "{indent}        echo \"$AUTOGRID -p $JOB.gpf -l $JOB.glg\" >> {job}");
    }
    let _ = writeln!(text, "{indent}        echo \"$AUTODOCK -p $JOB.dpf -l {dlg}\" >> {job}");
    let _ = writeln!(text, "{indent}        chmod +x {job}");
    let _ = writeln!(text, "{indent}        echo -n \"Submitting $NAME : \"");
    let _ = writeln!(
        text,
        "{indent}        $QSUB $OPT -l cput=$CPUT -l nodes=$NODES:ppn=$PPN -l walltime=$WALLT -l mem=$MEM {job}"
    );
    if multiple {
        let _ = writeln!(text, "        done");
    }
    let _ = writeln!(text, "        cd $WORKING_PATH\ndone");
    text
}

/// Write the aggregator scripts for `job_dirs` into `base`.
///
/// Workstation and Windows targets get a master script; batch queues get
/// `jobs_list` plus the submission script. Returns the files written.
pub fn write_aggregator(
    fs: &dyn FileOps,
    base: &Path,
    job_dirs: &[PathBuf],
    target: &TargetEnvironment,
    per_job_maps: bool,
) -> io::Result<Vec<PathBuf>> {
    match target {
        TargetEnvironment::BatchQueue(settings) => {
            let list: String = job_dirs
                .iter()
                .map(|dir| format!("{}\n", relative(base, dir)))
                .collect();
            let list_path = base.join(JOBS_LIST);
            fs.write(&list_path, &list)?;
            let submit_path = base.join(SUBMIT_SH);
            fs.write_script(&submit_path, &submit_script(settings, per_job_maps))?;
            Ok(vec![list_path, submit_path])
        }
        _ => {
            let (name, text) = master_script(target, base, job_dirs);
            let path = base.join(name);
            fs.write_script(&path, &text)?;
            Ok(vec![path])
        }
    }
}

/// Job directories below `root`: directories holding a `.dpf` file, sorted.
///
/// Used to script an existing tree that was not generated in this session.
pub fn find_job_dirs(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut has_dpf = false;
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() && !path.is_symlink() {
                stack.push(path);
            } else if path.extension().is_some_and(|e| e == "dpf") {
                has_dpf = true;
            }
        }
        if has_dpf {
            found.push(dir);
        }
    }
    found.sort();
    Ok(found)
}

/// First `.gpf` and `.dpf` file names in a job directory.
pub fn parameter_files(dir: &Path) -> io::Result<(Option<String>, Option<String>)> {
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    let find = |ext: &str| names.iter().find(|n| n.ends_with(ext)).cloned();
    Ok((find(".gpf"), find(".dpf")))
}
