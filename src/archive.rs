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

//! Packaging of a finished job tree into a single archive.

use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix of the archive file name.
pub const PACKAGE_PREFIX: &str = "VSpack_";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot archive {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("zip error in {path}: {source}")]
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    #[display("tar")]
    Tar,
    #[display("tar.gz")]
    TarGz,
    #[display("tar.bz2")]
    TarBz2,
    #[display("zip")]
    Zip,
}

/// Archive path for the tree rooted at `root`: `<root>/VSpack_<root name>.<ext>`.
pub fn package_path(root: &Path, format: ArchiveFormat) -> PathBuf {
    root.join(format!("{}{}.{}", PACKAGE_PREFIX, root_name(root), format))
}

fn root_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "vs".to_string())
}

enum EntryKind {
    Dir,
    File,
    Symlink(PathBuf),
}

/// Entries below `root` in sorted, parents-first order. Symlinks are not followed.
fn collect_entries(root: &Path, skip: &Path) -> Result<Vec<(PathBuf, EntryKind)>, ArchiveError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ArchiveError::Io { path, source }
    };
    let mut entries = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut children: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map_err(io_error(&dir))?
            .map(|e| e.map(|e| e.path()))
            .collect::<Result<_, _>>()
            .map_err(io_error(&dir))?;
        children.sort();
        let mut subdirs = Vec::new();
        for path in children {
            if path == skip {
                continue;
            }
            let metadata = std::fs::symlink_metadata(&path).map_err(io_error(&path))?;
            let kind = if metadata.file_type().is_symlink() {
                EntryKind::Symlink(std::fs::read_link(&path).map_err(io_error(&path))?)
            } else if metadata.is_dir() {
                subdirs.push(path.clone());
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            entries.push((path, kind));
        }
        stack.extend(subdirs.into_iter().rev());
    }
    Ok(entries)
}

/// Name of `path` inside the archive, rooted at the tree's own directory name.
fn archive_name(root: &Path, path: &Path) -> PathBuf {
    let relative = path.strip_prefix(root).unwrap_or(path);
    PathBuf::from(root_name(root)).join(relative)
}

/// Write the tree rooted at `root` into `<root>/VSpack_<root name>.<ext>`.
///
/// The archive skips itself and stores symbolic links as links.
pub fn pack(root: &Path, format: ArchiveFormat) -> Result<PathBuf, ArchiveError> {
    let output = package_path(root, format);
    let entries = collect_entries(root, &output)?;
    let io_error = |source| ArchiveError::Io {
        path: output.clone(),
        source,
    };
    let file = File::create(&output).map_err(io_error)?;
    match format {
        ArchiveFormat::Tar => {
            write_tar(root, &entries, file).map_err(io_error)?;
        }
        ArchiveFormat::TarGz => {
            let encoder = GzEncoder::new(file, flate2::Compression::default());
            write_tar(root, &entries, encoder)
                .and_then(|e| e.finish())
                .map_err(io_error)?;
        }
        ArchiveFormat::TarBz2 => {
            let encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
            write_tar(root, &entries, encoder)
                .and_then(|e| e.finish())
                .map_err(io_error)?;
        }
        ArchiveFormat::Zip => write_zip(root, &entries, file, &output)?,
    }
    log::info!("Job tree packed into {}", output.display());
    Ok(output)
}

fn write_tar<W: Write>(root: &Path, entries: &[(PathBuf, EntryKind)], writer: W) -> io::Result<W> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);
    builder.append_dir(root_name(root), root)?;
    for (path, kind) in entries {
        let name = archive_name(root, path);
        match kind {
            EntryKind::Dir => builder.append_dir(&name, path)?,
            EntryKind::File | EntryKind::Symlink(_) => builder.append_path_with_name(path, &name)?,
        }
    }
    builder.into_inner()
}

fn write_zip(
    root: &Path,
    entries: &[(PathBuf, EntryKind)],
    file: File,
    output: &Path,
) -> Result<(), ArchiveError> {
    let zip_error = |source| ArchiveError::Zip {
        path: output.to_path_buf(),
        source,
    };
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ArchiveError::Io { path, source }
    };
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o755);
    let mut zip = zip::ZipWriter::new(file);
    zip.add_directory(root_name(root), options).map_err(zip_error)?;
    for (path, kind) in entries {
        let name = archive_name(root, path).to_string_lossy().replace('\\', "/");
        match kind {
            EntryKind::Dir => zip.add_directory(name, options).map_err(zip_error)?,
            EntryKind::Symlink(target) => zip
                .add_symlink(name, target.to_string_lossy().replace('\\', "/"), options)
                .map_err(zip_error)?,
            EntryKind::File => {
                zip.start_file(name, options).map_err(zip_error)?;
                let bytes = std::fs::read(path).map_err(io_error(path))?;
                zip.write_all(&bytes).map_err(io_error(output))?;
            }
        }
    }
    zip.finish().map_err(zip_error)?;
    Ok(())
}
