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

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Welcome to BlueSnake
#[derive(Parser, Debug)]
#[command(name = "bluesnake", author, version, about, long_about = None)]
pub struct BlueSnakeArgs {
    /// Overrides the data directory (default: ~/.bluesnake)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// The log level of BlueSnake
    #[arg(long, global = true, default_value_t = log::LevelFilter::Info)]
    pub log_level: log::LevelFilter,

    /// Log to a file under the data directory instead of the console
    #[arg(long, global = true)]
    pub log_to_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Crawl a site starting from a seed url, or resume a paused run
    Crawl {
        /// The seed url, required unless --resume is given
        url: Option<String>,

        /// Resume the paused run of the project given by --project-id
        #[arg(long, requires = "project_id")]
        resume: bool,

        /// The project to resume
        #[arg(long)]
        project_id: Option<i64>,

        /// Pause the session after this many fetches (0 = unlimited)
        #[arg(long)]
        budget: Option<u64>,

        /// Widen the host scope to subdomains of the seed host
        #[arg(long)]
        include_subdomains: bool,

        /// Worker count shared across hosts (1..=64)
        #[arg(long)]
        parallelism: Option<u32>,
    },
    /// List projects or the crawls of one project
    List {
        #[command(subcommand)]
        what: ListWhat,
    },
    /// Show the queue status of a project
    Status {
        #[arg(long)]
        project_id: i64,
    },
    /// Print the version
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ListWhat {
    Projects,
    Crawls {
        #[arg(long)]
        project_id: i64,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn crawl_args_parse() {
        let args = BlueSnakeArgs::parse_from([
            "bluesnake",
            "crawl",
            "https://example.com",
            "--budget",
            "3",
            "--include-subdomains",
        ]);
        match args.command {
            Command::Crawl {
                url,
                resume,
                budget,
                include_subdomains,
                ..
            } => {
                assert_eq!(Some("https://example.com".to_string()), url);
                assert!(!resume);
                assert_eq!(Some(3), budget);
                assert!(include_subdomains);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn resume_requires_a_project_id() {
        assert!(BlueSnakeArgs::try_parse_from(["bluesnake", "crawl", "--resume"]).is_err());
        let args = BlueSnakeArgs::try_parse_from([
            "bluesnake",
            "crawl",
            "--resume",
            "--project-id",
            "4",
        ])
        .unwrap();
        match args.command {
            Command::Crawl { resume, project_id, .. } => {
                assert!(resume);
                assert_eq!(Some(4), project_id);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
