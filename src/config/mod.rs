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

mod crawl;
mod paths;

pub use crawl::*;
pub use paths::*;

use serde::{Deserialize, Serialize};

/// The application wide settings. The per-project policy knobs live in
/// [CrawlConfig] and are persisted with their project.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Configs {
    pub system: SystemConfig,
    pub paths: BlueSnakePaths,
}

/// Logging and process level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub log_level: log::LevelFilter,
    pub log_to_file: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: log::LevelFilter::Info,
            log_to_file: false,
        }
    }
}
