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

mod args;
mod logging;

pub use args::*;

use crate::config::{BlueSnakePaths, Configs, SystemConfig};
use crate::crawl::{Coordinator, LogSink};
use crate::stores::{CrawlState, Store};
use anyhow::Context;
use std::process::ExitCode;
use std::sync::Arc;

/// Entry point behind `main`, maps every error to exit code 1.
pub fn exec_args(args: BlueSnakeArgs) -> ExitCode {
    match exec(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn exec(args: BlueSnakeArgs) -> anyhow::Result<()> {
    let configs = Configs {
        system: SystemConfig {
            log_level: args.log_level,
            log_to_file: args.log_to_file,
        },
        paths: match &args.data_dir {
            Some(root) => BlueSnakePaths::new(root),
            None => BlueSnakePaths::default(),
        },
    };

    if matches!(args.command, Command::Version) {
        println!("bluesnake {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    configs.paths.ensure_root().with_context(|| {
        format!("failed to create the data directory {}", configs.paths.root.display())
    })?;
    logging::configure_logging(&configs);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the runtime")?
        .block_on(run(args, configs))
}

async fn run(args: BlueSnakeArgs, configs: Configs) -> anyhow::Result<()> {
    let store = Store::open(configs.paths.db_path()).await?;
    let coordinator = Coordinator::new(store, Arc::new(LogSink));

    match args.command {
        Command::Version => unreachable!("handled before the runtime starts"),
        Command::Crawl {
            url,
            resume,
            project_id,
            budget,
            include_subdomains,
            parallelism,
        } => {
            let handle = if resume {
                let project_id =
                    project_id.context("--resume requires --project-id")?;
                coordinator.resume_crawl(project_id).await?
            } else {
                let url = url.context("an url is required unless --resume is given")?;
                apply_flag_overrides(
                    &coordinator,
                    &url,
                    budget,
                    include_subdomains,
                    parallelism,
                )
                .await?;
                coordinator.start_crawl(&url).await?
            };
            println!(
                "crawl {} running for project {}",
                handle.crawl_id, handle.project_id
            );

            tokio::select! {
                _ = coordinator.wait(handle.project_id) => {}
                _ = tokio::signal::ctrl_c() => {
                    log::info!("stop requested, draining in-flight fetches");
                    let _ = coordinator.stop_crawl(handle.project_id);
                    coordinator.wait(handle.project_id).await;
                }
            }

            let stats = coordinator.get_crawl_stats(handle.crawl_id).await?;
            println!(
                "done: {} urls ({} crawled, {} still queued)",
                stats.total, stats.crawled, stats.queued
            );
            let crawl = coordinator
                .store()
                .get_crawl(handle.crawl_id)
                .await?
                .context("crawl row vanished")?;
            if crawl.state() == CrawlState::Failed {
                anyhow::bail!("crawl {} ended in state failed", crawl.id);
            }
        }
        Command::List { what } => match what {
            ListWhat::Projects => {
                for project in coordinator.store().list_projects().await? {
                    println!("{:>6}  {}  {}", project.id, project.domain, project.canonical_url);
                }
            }
            ListWhat::Crawls { project_id } => {
                for crawl in coordinator.store().list_crawls(project_id).await? {
                    println!(
                        "{:>6}  {}  {} pages  {} ms",
                        crawl.id, crawl.state, crawl.pages_crawled, crawl.duration_ms
                    );
                }
            }
        },
        Command::Status { project_id } => {
            let status = coordinator.get_queue_status(project_id).await?;
            println!(
                "pending: {}  visited: {}  resumable: {}",
                status.pending, status.visited, status.can_resume
            );
        }
    }
    Ok(())
}

async fn apply_flag_overrides(
    coordinator: &Coordinator,
    url: &str,
    budget: Option<u64>,
    include_subdomains: bool,
    parallelism: Option<u32>,
) -> anyhow::Result<()> {
    let mut patch = serde_json::Map::new();
    if let Some(budget) = budget {
        patch.insert("crawlBudget".to_string(), budget.into());
    }
    if include_subdomains {
        patch.insert("includeSubdomains".to_string(), true.into());
    }
    if let Some(parallelism) = parallelism {
        patch.insert("parallelism".to_string(), parallelism.into());
    }
    if !patch.is_empty() {
        coordinator
            .update_config_for_domain(url, serde_json::Value::Object(patch))
            .await?;
    }
    Ok(())
}
