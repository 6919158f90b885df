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

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Directory names handed out during one run.
///
/// The first claim of a base name returns it unchanged; the n-th repeated
/// claim returns `<base>_<n>`. Returned names are pairwise distinct.
#[derive(Debug, Default, Clone)]
pub struct NameJournal {
    collisions: HashMap<PathBuf, usize>,
    used: HashSet<PathBuf>,
}

impl NameJournal {
    pub fn claim(&mut self, base: &Path) -> PathBuf {
        if self.used.insert(base.to_path_buf()) {
            self.collisions.insert(base.to_path_buf(), 0);
            return base.to_path_buf();
        }
        loop {
            let count = self.collisions.entry(base.to_path_buf()).or_insert(0);
            *count += 1;
            let mut name = base.as_os_str().to_owned();
            name.push(format!("_{}", count));
            let candidate = PathBuf::from(name);
            if self.used.insert(candidate.clone()) {
                log::debug!("{} already used; using {}", base.display(), candidate.display());
                return candidate;
            }
        }
    }

    /// Number of names handed out.
    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_suffixes() {
        let mut journal = NameJournal::default();
        let base = Path::new("/out/rec/lig_rec");
        assert_eq!(journal.claim(base), base);
        assert_eq!(journal.claim(base), Path::new("/out/rec/lig_rec_1"));
        assert_eq!(journal.claim(base), Path::new("/out/rec/lig_rec_2"));
        assert_eq!(journal.claim(Path::new("/out/rec/other_rec")), Path::new("/out/rec/other_rec"));
        assert_eq!(journal.len(), 4);
    }

    #[test]
    fn suffixed_name_taken_by_a_base() {
        let mut journal = NameJournal::default();
        journal.claim(Path::new("a_1"));
        journal.claim(Path::new("a"));
        assert_eq!(journal.claim(Path::new("a")), Path::new("a_2"));
    }
}
