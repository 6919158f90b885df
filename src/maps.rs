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

//! Grid-map cache.
//!
//! A map set is a directory holding `<stem>.maps.fld`, `<stem>.maps.xyz` and
//! one `<stem>.<type>.map` per atom type. The atom type is the second-to-last
//! dot-separated field of a map file name.

use crate::atomtype::PSEUDO_TYPES;
use crate::fsops::{same_location, FileOps};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Number of leading lines that must agree across all maps of a set.
pub const HEADER_LINES: usize = 6;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("no .maps.fld file in {0}")]
    MissingFld(PathBuf),
    #[error("no .maps.xyz file in {0}")]
    MissingXyz(PathBuf),
    #[error("more than one {kind} file in {dir}")]
    Ambiguous { kind: &'static str, dir: PathBuf },
    #[error("missing maps for atom type(s): {}", .0.join(", "))]
    MissingMaps(Vec<String>),
    #[error("maps are not coherent: the header of {0} differs")]
    Incoherent(PathBuf),
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot transfer {file}: {source}")]
    Transfer {
        file: PathBuf,
        source: std::io::Error,
    },
}

/// How map files reach a job directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    #[default]
    Copy,
    Symlink,
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => write!(f, "copied"),
            Self::Symlink => write!(f, "linked"),
        }
    }
}

/// Atom type encoded in a map file name.
pub fn map_type(file_name: &str) -> Option<&str> {
    let fields: Vec<&str> = file_name.split('.').collect();
    (fields.len() >= 3).then(|| fields[fields.len() - 2])
}

/// A coherent set of grid maps in one directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridMapSet {
    dir: PathBuf,
    /// Common file name stem, taken from the `.fld` file.
    stem: String,
    fld: PathBuf,
    xyz: PathBuf,
    /// Map file per atom type.
    maps: BTreeMap<String, PathBuf>,
}

impl GridMapSet {
    /// Index a map directory without checking requirements.
    pub fn scan(dir: &Path) -> Result<Self, MapError> {
        let unreadable = |source| MapError::Unreadable {
            path: dir.to_path_buf(),
            source,
        };
        let files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(unreadable)?
            .map(|e| e.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(unreadable)?
            .into_iter()
            .filter(|p| p.is_file() || p.is_symlink())
            .sorted()
            .collect();

        let single = |suffix: &'static str, missing: MapError| -> Result<PathBuf, MapError> {
            let found: Vec<&PathBuf> = files.iter().filter(|p| file_name(p).ends_with(suffix)).collect();
            match found.as_slice() {
                [] => Err(missing),
                [one] => Ok((*one).clone()),
                _ => Err(MapError::Ambiguous {
                    kind: suffix,
                    dir: dir.to_path_buf(),
                }),
            }
        };
        let fld = single(".maps.fld", MapError::MissingFld(dir.to_path_buf()))?;
        let xyz = single(".maps.xyz", MapError::MissingXyz(dir.to_path_buf()))?;
        let stem = file_name(&fld).trim_end_matches(".maps.fld").to_string();

        let prefix = format!("{stem}.");
        let maps = files
            .iter()
            .filter(|p| {
                let n = file_name(p);
                n.starts_with(&prefix) && n.ends_with(".map")
            })
            .filter_map(|p| map_type(&file_name(p)).map(|t| (t.to_string(), p.clone())))
            .collect();

        Ok(Self {
            dir: dir.to_path_buf(),
            stem,
            fld,
            xyz,
            maps,
        })
    }

    /// Index a map directory and check it covers `required` types.
    ///
    /// The pseudo-type maps are always required. All maps must share the
    /// same leading header lines.
    pub fn validate<'a>(
        dir: &Path,
        required: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, MapError> {
        let set = Self::scan(dir)?;
        let required: BTreeSet<&str> = required.into_iter().chain(PSEUDO_TYPES).collect();
        let missing: Vec<String> = required
            .iter()
            .filter(|t| !set.maps.contains_key(**t))
            .map(|t| format!("{}.{}.map", set.stem, t))
            .collect();
        if !missing.is_empty() {
            return Err(MapError::MissingMaps(missing));
        }
        set.check_headers()?;
        log::info!(
            "Grid maps in {} cover {} atom type(s)",
            dir.display(),
            set.maps.len()
        );
        Ok(set)
    }

    fn check_headers(&self) -> Result<(), MapError> {
        let mut reference: Option<Vec<String>> = None;
        for path in self.maps.values() {
            let header = read_header(path)?;
            if header.len() < HEADER_LINES {
                return Err(MapError::Incoherent(path.clone()));
            }
            match &reference {
                None => reference = Some(header),
                Some(expected) if *expected != header => {
                    return Err(MapError::Incoherent(path.clone()))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Atom types with a map, pseudo-types included.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }

    /// Files needed for `types`: one map per type, the pseudo-type maps, `.fld` and `.xyz`.
    fn files_for<'a>(&self, types: impl IntoIterator<Item = &'a str>) -> Vec<PathBuf> {
        let types: BTreeSet<&str> = types
            .into_iter()
            .filter(|t| !PSEUDO_TYPES.contains(t))
            .collect();
        types
            .into_iter()
            .chain(PSEUDO_TYPES)
            .map(|t| {
                self.maps
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| self.dir.join(format!("{}.{}.map", self.stem, t)))
            })
            .chain([self.fld.clone(), self.xyz.clone()])
            .collect()
    }

    /// Copy or link the maps for `types` into `destination`.
    ///
    /// Succeeds without touching the filesystem when `destination` is the set's
    /// own directory. Otherwise every requested file must be transferred; the
    /// first failure aborts and names the offending file. Links point to
    /// `../<set directory name>/<file>` so the tree stays relocatable.
    /// Returns the number of files transferred.
    pub fn provision<'a>(
        &self,
        types: impl IntoIterator<Item = &'a str>,
        destination: &Path,
        mode: TransferMode,
        fs: &dyn FileOps,
    ) -> Result<usize, MapError> {
        if same_location(&self.dir, destination) {
            log::debug!("Maps already in {}; nothing to provision", destination.display());
            return Ok(0);
        }
        let files = self.files_for(types);
        let folder = self.dir.file_name().map(PathBuf::from).unwrap_or_default();
        let mut transferred = 0;
        for file in &files {
            let file_name = file.file_name().map(PathBuf::from).unwrap_or_default();
            let target = destination.join(&file_name);
            let result = match mode {
                TransferMode::Copy => fs.copy(file, &target),
                TransferMode::Symlink => {
                    if file.exists() {
                        fs.symlink(&Path::new("..").join(&folder).join(&file_name), &target)
                    } else {
                        Err(std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "no such map in the cache",
                        ))
                    }
                }
            };
            result.map_err(|source| MapError::Transfer {
                file: file.clone(),
                source,
            })?;
            transferred += 1;
        }
        Ok(transferred)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

fn read_header(path: &Path) -> Result<Vec<String>, MapError> {
    let file = std::fs::File::open(path).map_err(|source| MapError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    BufReader::new(file)
        .lines()
        .take(HEADER_LINES)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| MapError::Unreadable {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsops::LocalFs;

    pub(crate) fn header(spacing: &str) -> String {
        format!(
            "GRID_PARAMETER_FILE rec.gpf\nGRID_DATA_FILE rec.maps.fld\nMACROMOLECULE rec.pdbqt\nSPACING {spacing}\nNELEMENTS 2 2 2\nCENTER 0.0 0.0 0.0\n"
        )
    }

    fn write_set(dir: &Path, types: &[&str]) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("rec.maps.fld"), "fld").unwrap();
        std::fs::write(dir.join("rec.maps.xyz"), "xyz").unwrap();
        for t in types {
            std::fs::write(dir.join(format!("rec.{t}.map")), format!("{}0.1\n", header("0.375"))).unwrap();
        }
    }

    #[test]
    fn map_type_field() {
        assert_eq!(map_type("rec.OA.map"), Some("OA"));
        assert_eq!(map_type("my.rec.e.map"), Some("e"));
        assert_eq!(map_type("rec.maps.fld"), Some("maps"));
        assert_eq!(map_type("map"), None);
    }

    #[test]
    fn validate_conditions() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        write_set(&cache, &["C", "OA", "e", "d"]);
        let set = GridMapSet::validate(&cache, ["C", "OA"]).unwrap();
        assert_eq!(set.stem(), "rec");
        assert_eq!(set.types().collect::<Vec<_>>(), vec!["C", "OA", "d", "e"]);

        match GridMapSet::validate(&cache, ["C", "N", "SA"]) {
            Err(MapError::MissingMaps(missing)) => {
                assert_eq!(missing, vec!["rec.N.map", "rec.SA.map"])
            }
            other => panic!("unexpected {other:?}"),
        }

        std::fs::write(cache.join("rec.OA.map"), format!("{}0.1\n", header("0.5"))).unwrap();
        assert!(matches!(
            GridMapSet::validate(&cache, ["C"]),
            Err(MapError::Incoherent(_))
        ));

        std::fs::remove_file(cache.join("rec.maps.xyz")).unwrap();
        assert!(matches!(
            GridMapSet::validate(&cache, ["C"]),
            Err(MapError::MissingXyz(_))
        ));
        std::fs::remove_file(cache.join("rec.maps.fld")).unwrap();
        assert!(matches!(
            GridMapSet::validate(&cache, ["C"]),
            Err(MapError::MissingFld(_))
        ));
    }

    #[test]
    fn provision_copy_and_link() {
        let dir = tempfile::tempdir().unwrap();
        let maps = dir.path().join("maps");
        write_set(&maps, &["C", "OA", "N", "e", "d"]);
        let set = GridMapSet::validate(&maps, ["C"]).unwrap();

        let job = dir.path().join("job1");
        std::fs::create_dir(&job).unwrap();
        assert_eq!(set.provision(["C", "OA"], &job, TransferMode::Copy, &LocalFs).unwrap(), 6);
        assert!(job.join("rec.OA.map").is_file());
        assert!(!job.join("rec.N.map").exists());

        let job2 = dir.path().join("job2");
        std::fs::create_dir(&job2).unwrap();
        assert_eq!(set.provision(["N"], &job2, TransferMode::Symlink, &LocalFs).unwrap(), 5);
        assert_eq!(
            std::fs::read_link(job2.join("rec.N.map")).unwrap(),
            Path::new("../maps/rec.N.map")
        );
        assert!(job2.join("rec.maps.fld").is_file());

        let job3 = dir.path().join("job3");
        std::fs::create_dir(&job3).unwrap();
        match set.provision(["SA"], &job3, TransferMode::Copy, &LocalFs) {
            Err(MapError::Transfer { file, .. }) => assert!(file.ends_with("rec.SA.map")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
