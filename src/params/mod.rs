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

//! Grid and docking parameter files.
//!
//! Both formats are one keyword per line, followed by arguments and an
//! optional `#` comment. A [`Template`] keeps the lines exactly as given;
//! the per-job files are rendered from it by [`DockingParameters`] and
//! [`GridParameters`].

mod dpf;
mod gpf;

pub use dpf::{DockingParameters, DEFAULT_DPF};
pub use gpf::GridParameters;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Column where AutoDock tools align trailing comments.
const COMMENT_COLUMN: usize = 37;

/// Parameter file template, stored line by line.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Template {
    lines: Vec<String>,
}

impl Template {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading parameter template {}", path.display()))?;
        Ok(Self::from_lines(text.lines()))
    }

    pub fn from_lines<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// The built-in AutoDock 4.2 Lamarckian GA docking template.
    pub fn default_docking() -> Self {
        Self::from_lines(DEFAULT_DPF.lines())
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| keyword(line).is_none())
    }

    /// Arguments of the first line with `keyword`, if any.
    pub fn value(&self, keyword_name: &str) -> Option<&str> {
        self.lines
            .iter()
            .find(|line| keyword(line) == Some(keyword_name))
            .map(|line| arguments(line))
    }

    /// External parameter file referenced by the template.
    pub fn parameter_file(&self) -> Option<PathBuf> {
        self.value("parameter_file")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }
}

/// First token of a line, ignoring comments and blank lines.
pub(crate) fn keyword(line: &str) -> Option<&str> {
    line.split('#').next()?.split_whitespace().next()
}

/// Everything between the keyword and the comment, trimmed.
pub(crate) fn arguments(line: &str) -> &str {
    let code = line.split('#').next().unwrap_or_default().trim();
    code.split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .unwrap_or_default()
}

/// Replace the code part of `line` by `code`, keeping its trailing comment.
pub(crate) fn substitute(line: &str, code: &str) -> String {
    match line.find('#') {
        Some(start) if code.len() < COMMENT_COLUMN => {
            format!("{:<width$}{}", code, &line[start..], width = COMMENT_COLUMN)
        }
        Some(start) => format!("{} {}", code, &line[start..]),
        None => code.to_string(),
    }
}

/// File name used inside a job directory for an external parameter file.
pub(crate) fn parameter_file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
