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

//! Filesystem operations used while laying out the job tree.
//!
//! Routing copies, links and directory creation through [`FileOps`] lets the
//! generator be exercised against counting or failing filesystems.

use std::io;
use std::path::Path;

pub trait FileOps: std::fmt::Debug {
    /// Create a directory and its parents. Returns `false` if it already existed.
    fn create_dir(&self, path: &Path) -> io::Result<bool>;
    /// Copy a file, overwriting the destination.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Create a symbolic link at `link` pointing to `target`.
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;
    /// Write a whole file.
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
    /// Remove a directory and everything below it.
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
    /// Write a script and mark it executable.
    fn write_script(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.write(path, contents)?;
        make_executable(path)
    }
}

/// The local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl FileOps for LocalFs {
    fn create_dir(&self, path: &Path) -> io::Result<bool> {
        if path.is_dir() {
            return Ok(false);
        }
        std::fs::create_dir_all(path)?;
        Ok(true)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::copy(from, to).map(|_| ())
    }

    #[cfg(unix)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::windows::fs::symlink_file(target, link)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }
}

/// True if both paths name the same file or directory.
///
/// Falls back to comparing the paths themselves when either does not exist.
pub fn same_location(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Mark a script executable.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_fs() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("a/b");
        assert!(LocalFs.create_dir(&sub).unwrap());
        assert!(!LocalFs.create_dir(&sub).unwrap());
        let file = sub.join("f.txt");
        LocalFs.write(&file, "x").unwrap();
        LocalFs.copy(&file, &dir.path().join("g.txt")).unwrap();
        assert!(same_location(&file, &sub.join("../b/f.txt")));
        assert!(!same_location(&file, &dir.path().join("g.txt")));
        make_executable(&file).unwrap();
        LocalFs.remove_dir_all(&dir.path().join("a")).unwrap();
        assert!(!sub.exists());
    }
}
