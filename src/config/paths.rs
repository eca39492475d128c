// Copyright 2025 BlueSnake Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where BlueSnake keeps its persistent state. Everything lives under a
/// single root, `~/.bluesnake` by default.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct BlueSnakePaths {
    pub root: PathBuf,
}

impl Default for BlueSnakePaths {
    fn default() -> Self {
        let root = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".bluesnake");
        Self { root }
    }
}

impl BlueSnakePaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The embedded relational store.
    pub fn db_path(&self) -> PathBuf {
        self.root.join("bluesnake.db")
    }

    /// Per-project cache directory (favicons, render screenshots).
    #[allow(dead_code)]
    pub fn project_dir(&self, project_id: i64) -> PathBuf {
        self.root.join("projects").join(project_id.to_string())
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join("bluesnake.log")
    }

    pub fn ensure_root(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn project_dirs_are_per_id() {
        let paths = BlueSnakePaths::new("/tmp/bluesnake-test");
        assert_eq!(
            PathBuf::from("/tmp/bluesnake-test/projects/42"),
            paths.project_dir(42)
        );
        assert_eq!(PathBuf::from("/tmp/bluesnake-test/bluesnake.db"), paths.db_path());
    }
}
