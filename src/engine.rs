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

//! External grid and docking engines.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Conventional name of the grid engine.
pub const AUTOGRID: &str = "autogrid4";
/// Conventional name of the docking engine.
pub const AUTODOCK: &str = "autodock4";

/// Text AutoGrid writes at the end of a successful log.
const SUCCESS_MARK: &str = "Successful Completion";
/// Log lines reported when a grid calculation fails.
const LOG_TAIL_LINES: usize = 7;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found in PATH")]
    NotFound(String),
    #[error("{0} is not an executable file")]
    NotExecutable(PathBuf),
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("grid calculation in {dir} failed:\n{tail}")]
    Failed { dir: PathBuf, tail: String },
}

/// Explicit engine locations. Unset entries are searched for in `PATH`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EnginePaths {
    pub autogrid: Option<PathBuf>,
    pub autodock: Option<PathBuf>,
}

impl EnginePaths {
    pub fn autogrid(&self) -> Result<PathBuf, EngineError> {
        locate(self.autogrid.as_deref(), AUTOGRID)
    }

    pub fn autodock(&self) -> Result<PathBuf, EngineError> {
        locate(self.autodock.as_deref(), AUTODOCK)
    }
}

/// Resolve an executable from an explicit path or by searching `PATH` for `name`.
pub fn locate(explicit: Option<&Path>, name: &str) -> Result<PathBuf, EngineError> {
    if let Some(path) = explicit {
        return if is_executable(path) {
            Ok(path.to_path_buf())
        } else {
            Err(EngineError::NotExecutable(path.to_path_buf()))
        };
    }
    which::which(name).map_err(|e| {
        log::debug!("{}: {}", name, e);
        EngineError::NotFound(name.to_string())
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Computes grid maps from a grid parameter file.
pub trait GridEngine: std::fmt::Debug {
    /// Run the grid parameter file `gpf` inside `dir`.
    fn compute_maps(&self, dir: &Path, gpf: &str) -> Result<(), EngineError>;
}

/// The AutoGrid 4 executable.
#[derive(Debug, Clone)]
pub struct AutoGrid {
    program: PathBuf,
}

impl AutoGrid {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_paths(paths: &EnginePaths) -> Result<Self, EngineError> {
        paths.autogrid().map(Self::new)
    }
}

impl GridEngine for AutoGrid {
    fn compute_maps(&self, dir: &Path, gpf: &str) -> Result<(), EngineError> {
        let glg = log_name(gpf);
        log::info!("Running {} -p {} -l {} in {}", self.program.display(), gpf, glg, dir.display());
        let status = Command::new(&self.program)
            .current_dir(dir)
            .arg("-p")
            .arg(gpf)
            .arg("-l")
            .arg(&glg)
            .status()
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !status.success() {
            log::warn!("{} exited with {}", self.program.display(), status);
        }
        check_grid_log(dir, &dir.join(&glg))
    }
}

/// Grid log name belonging to a grid parameter file.
pub fn log_name(gpf: &str) -> String {
    match gpf.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.glg"),
        None => format!("{gpf}.glg"),
    }
}

/// Succeeds only if the grid log reports completion; otherwise returns its tail.
pub fn check_grid_log(dir: &Path, glg: &Path) -> Result<(), EngineError> {
    let text = std::fs::read_to_string(glg).unwrap_or_default();
    if text.contains(SUCCESS_MARK) {
        return Ok(());
    }
    let lines: Vec<&str> = text.lines().collect();
    let tail = if lines.is_empty() {
        format!("no log written to {}", glg.display())
    } else {
        lines[lines.len().saturating_sub(LOG_TAIL_LINES)..].join("\n")
    };
    Err(EngineError::Failed {
        dir: dir.to_path_buf(),
        tail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_log() {
        let dir = tempfile::tempdir().unwrap();
        let glg = dir.path().join("rec.glg");
        assert!(check_grid_log(dir.path(), &glg).is_err());
        std::fs::write(&glg, "a\nb\nc\nd\ne\nf\ng\nh\nERROR: bad atom type\n").unwrap();
        match check_grid_log(dir.path(), &glg) {
            Err(EngineError::Failed { tail, .. }) => {
                assert_eq!(tail.lines().count(), LOG_TAIL_LINES);
                assert!(tail.ends_with("bad atom type"));
            }
            other => panic!("unexpected {:?}", other),
        }
        std::fs::write(&glg, "autogrid4: Successful Completion.\nReal= 1.00s\n").unwrap();
        assert!(check_grid_log(dir.path(), &glg).is_ok());
        assert_eq!(log_name("rec_all_maps.gpf"), "rec_all_maps.glg");
    }

    #[cfg(unix)]
    #[test]
    fn explicit_location() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("autogrid4");
        std::fs::write(&program, "#!/bin/sh\n").unwrap();
        assert!(matches!(
            locate(Some(&program), AUTOGRID),
            Err(EngineError::NotExecutable(_))
        ));
        crate::fsops::make_executable(&program).unwrap();
        assert_eq!(locate(Some(&program), AUTOGRID).unwrap(), program);
        assert!(matches!(
            locate(None, "surely-not-an-installed-program"),
            Err(EngineError::NotFound(_))
        ));
        assert!(locate(None, "sh").unwrap().ends_with("sh"));
    }
}
