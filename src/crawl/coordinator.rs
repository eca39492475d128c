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

use crate::config::{ConfigError, CrawlConfig, CrawlConfigPatch};
use crate::crawl::errors::CoordinatorError;
use crate::crawl::events::{CrawlEvent, EventSink};
use crate::crawl::session::CrawlSession;
use crate::frontier::Frontier;
use crate::runtime::{shutdown, ShutdownSignalSender};
use crate::stores::{
    CrawlStats, DiscoveredUrlRow, PageLinksOfUrl, Paginated, ProjectRow, RunState, Store,
};
use crate::url::NormalizedUrl;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Identifies a session the coordinator launched.
#[derive(Debug, Copy, Clone, Serialize)]
pub struct CrawlHandle {
    pub project_id: i64,
    pub crawl_id: i64,
}

/// The answer of `GetQueueStatus`.
#[derive(Debug, Copy, Clone, Serialize)]
pub struct QueueStatus {
    pub pending: u64,
    pub visited: u64,
    pub can_resume: bool,
}

/// One row of `GetActiveCrawls`.
#[derive(Debug, Copy, Clone, Serialize)]
pub struct ActiveCrawlInfo {
    pub project_id: i64,
    pub crawl_id: i64,
    pub discovered: u64,
    pub total: u64,
}

struct ActiveSession {
    crawl_id: i64,
    sender: ShutdownSignalSender,
    handle: Option<JoinHandle<()>>,
}

/// Owns crawl lifecycles: one session per project at a time, cooperative
/// stop, resume of paused runs, and the query surface adapters consume.
pub struct Coordinator {
    store: Store,
    events: Arc<dyn EventSink>,
    active: Arc<Mutex<HashMap<i64, ActiveSession>>>,
}

impl Coordinator {
    pub fn new(store: Store, events: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            events,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Creates the project if the domain is new and starts a session.
    pub async fn start_crawl(&self, url: &str) -> Result<CrawlHandle, CoordinatorError> {
        let seed = NormalizedUrl::parse(url)?;
        let project = self
            .store
            .create_or_get_project(seed.host(), seed.as_str())
            .await?;
        self.launch(project, seed, false, None).await
    }

    /// Starts a new session attached to the project's paused run.
    pub async fn resume_crawl(&self, project_id: i64) -> Result<CrawlHandle, CoordinatorError> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or(CoordinatorError::ProjectNotFound(project_id))?;
        let run = self
            .store
            .open_run(project_id)
            .await?
            .filter(|run| run.state() == RunState::Paused)
            .ok_or(CoordinatorError::NothingToResume(project_id))?;
        if self.store.queue_stats(project_id).await?.pending == 0 {
            return Err(CoordinatorError::NothingToResume(project_id));
        }
        let seed = NormalizedUrl::parse(&project.canonical_url)?;
        self.store.set_run_state(run.id, RunState::InProgress).await?;
        self.launch(project, seed, true, Some(run.id)).await
    }

    async fn launch(
        &self,
        project: ProjectRow,
        seed: NormalizedUrl,
        resumed: bool,
        run_id: Option<i64>,
    ) -> Result<CrawlHandle, CoordinatorError> {
        if self.active.lock().unwrap().contains_key(&project.id) {
            return Err(CoordinatorError::CrawlAlreadyRunning(project.id));
        }

        let config = self.store.get_or_create_config(project.id).await?;
        config.validate()?;

        let run_id = match run_id {
            Some(run_id) => Some(run_id),
            None if config.incremental_crawling_enabled => {
                let run = match self.store.open_run(project.id).await? {
                    Some(run) => run,
                    None => self.store.create_run(project.id).await?,
                };
                self.store.set_run_state(run.id, RunState::InProgress).await?;
                Some(run.id)
            }
            None => None,
        };

        let crawl = self.store.create_crawl(project.id, run_id).await?;
        let frontier = Arc::new(Frontier::new(self.store.clone(), project.id).await?);
        if !resumed {
            frontier.seed(&seed).await?;
        }

        let (sender, receiver) = shutdown();
        let session = Arc::new(
            CrawlSession::new(
                self.store.clone(),
                project.id,
                crawl.id,
                run_id,
                seed,
                config,
                frontier,
                self.events.clone(),
                receiver,
                resumed,
            )
            .map_err(CoordinatorError::Session)?,
        );

        self.active.lock().unwrap().insert(
            project.id,
            ActiveSession {
                crawl_id: crawl.id,
                sender,
                handle: None,
            },
        );
        self.events.emit(CrawlEvent::SessionStarted {
            project_id: project.id,
            crawl_id: crawl.id,
            resumed,
        });

        let handle = {
            let active = self.active.clone();
            let project_id = project.id;
            let crawl_id = crawl.id;
            tokio::spawn(async move {
                match session.run().await {
                    Ok(outcome) => log::info!(
                        "crawl {} ended {} with {} pages and {} pending",
                        crawl_id,
                        outcome.state,
                        outcome.pages_crawled,
                        outcome.pending
                    ),
                    Err(err) => log::error!("crawl {} failed: {}", crawl_id, err),
                }
                active.lock().unwrap().remove(&project_id);
            })
        };
        if let Some(entry) = self.active.lock().unwrap().get_mut(&project.id) {
            entry.handle = Some(handle);
        }

        Ok(CrawlHandle {
            project_id: project.id,
            crawl_id: crawl.id,
        })
    }

    /// Signals cooperative cancellation, the session drains and persists.
    pub fn stop_crawl(&self, project_id: i64) -> Result<(), CoordinatorError> {
        match self.active.lock().unwrap().get(&project_id) {
            Some(session) => {
                session.sender.cancel();
                Ok(())
            }
            None => Err(CoordinatorError::NoActiveSession(project_id)),
        }
    }

    /// Blocks until the project's session, if any, has ended.
    pub async fn wait(&self, project_id: i64) {
        let handle = self
            .active
            .lock()
            .unwrap()
            .get_mut(&project_id)
            .and_then(|session| session.handle.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub async fn get_queue_status(
        &self,
        project_id: i64,
    ) -> Result<QueueStatus, CoordinatorError> {
        self.store
            .get_project(project_id)
            .await?
            .ok_or(CoordinatorError::ProjectNotFound(project_id))?;
        let stats = self.store.queue_stats(project_id).await?;
        let running = self.active.lock().unwrap().contains_key(&project_id);
        let paused_run = self
            .store
            .open_run(project_id)
            .await?
            .is_some_and(|run| run.state() == RunState::Paused);
        Ok(QueueStatus {
            pending: stats.pending,
            visited: stats.visited,
            can_resume: !running && paused_run && stats.pending > 0,
        })
    }

    pub async fn get_active_crawls(&self) -> Result<Vec<ActiveCrawlInfo>, CoordinatorError> {
        let entries: Vec<(i64, i64)> = self
            .active
            .lock()
            .unwrap()
            .iter()
            .map(|(project_id, session)| (*project_id, session.crawl_id))
            .collect();
        let mut out = Vec::with_capacity(entries.len());
        for (project_id, crawl_id) in entries {
            let stats = self.store.queue_stats(project_id).await?;
            out.push(ActiveCrawlInfo {
                project_id,
                crawl_id,
                discovered: stats.visited,
                total: stats.total,
            });
        }
        Ok(out)
    }

    pub async fn get_crawl_stats(&self, crawl_id: i64) -> Result<CrawlStats, CoordinatorError> {
        self.require_crawl(crawl_id).await?;
        Ok(self.store.crawl_stats(crawl_id).await?)
    }

    pub async fn get_crawl_with_results_paginated(
        &self,
        crawl_id: i64,
        limit: u32,
        cursor: Option<i64>,
        type_filter: Option<&str>,
    ) -> Result<Paginated<DiscoveredUrlRow>, CoordinatorError> {
        self.require_crawl(crawl_id).await?;
        Ok(self
            .store
            .discovered_paginated(crawl_id, limit, cursor, type_filter)
            .await?)
    }

    pub async fn search_crawl_results_paginated(
        &self,
        crawl_id: i64,
        query: &str,
        type_filter: Option<&str>,
        limit: u32,
        cursor: Option<i64>,
    ) -> Result<Paginated<DiscoveredUrlRow>, CoordinatorError> {
        self.require_crawl(crawl_id).await?;
        Ok(self
            .store
            .search_discovered(crawl_id, query, type_filter, limit, cursor)
            .await?)
    }

    pub async fn get_page_links_for_url(
        &self,
        crawl_id: i64,
        url: &str,
    ) -> Result<PageLinksOfUrl, CoordinatorError> {
        self.require_crawl(crawl_id).await?;
        Ok(self.store.page_links_for_url(crawl_id, url).await?)
    }

    /// Upserts the project config for the url's domain. Unknown option keys
    /// are rejected.
    pub async fn update_config_for_domain(
        &self,
        url: &str,
        options: serde_json::Value,
    ) -> Result<CrawlConfig, CoordinatorError> {
        let seed = NormalizedUrl::parse(url)?;
        let project = self
            .store
            .create_or_get_project(seed.host(), seed.as_str())
            .await?;
        let patch: CrawlConfigPatch =
            serde_json::from_value(options).map_err(ConfigError::UnrecognizedOption)?;
        let mut config = self.store.get_or_create_config(project.id).await?;
        patch.apply_to(&mut config)?;
        self.store.save_config(project.id, &config).await?;
        Ok(config)
    }

    async fn require_crawl(&self, crawl_id: i64) -> Result<(), CoordinatorError> {
        self.store
            .get_crawl(crawl_id)
            .await?
            .map(|_| ())
            .ok_or(CoordinatorError::CrawlNotFound(crawl_id))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crawl::events::NoopSink;
    use crate::stores::UrlSource;

    async fn coordinator() -> Coordinator {
        let store = Store::open_in_memory().await.unwrap();
        Coordinator::new(store, Arc::new(NoopSink))
    }

    #[tokio::test]
    async fn stop_without_a_session_is_a_structured_error() {
        let coordinator = coordinator().await;
        assert!(matches!(
            coordinator.stop_crawl(77),
            Err(CoordinatorError::NoActiveSession(77))
        ));
    }

    #[tokio::test]
    async fn resume_needs_a_paused_run_with_pending_urls() {
        let coordinator = coordinator().await;
        assert!(matches!(
            coordinator.resume_crawl(1).await,
            Err(CoordinatorError::ProjectNotFound(1))
        ));

        let project = coordinator
            .store()
            .create_or_get_project("x.com", "https://x.com/")
            .await
            .unwrap();
        assert!(matches!(
            coordinator.resume_crawl(project.id).await,
            Err(CoordinatorError::NothingToResume(_))
        ));

        // a paused run without pending urls still cannot resume
        let run = coordinator.store().create_run(project.id).await.unwrap();
        coordinator
            .store()
            .set_run_state(run.id, RunState::Paused)
            .await
            .unwrap();
        assert!(matches!(
            coordinator.resume_crawl(project.id).await,
            Err(CoordinatorError::NothingToResume(_))
        ));
    }

    #[tokio::test]
    async fn queue_status_reports_resumability() {
        let coordinator = coordinator().await;
        let project = coordinator
            .store()
            .create_or_get_project("x.com", "https://x.com/")
            .await
            .unwrap();

        let status = coordinator.get_queue_status(project.id).await.unwrap();
        assert_eq!(0, status.pending);
        assert!(!status.can_resume);

        let run = coordinator.store().create_run(project.id).await.unwrap();
        coordinator
            .store()
            .set_run_state(run.id, RunState::Paused)
            .await
            .unwrap();
        coordinator
            .store()
            .queue_offer(project.id, "https://x.com/a/", 1, UrlSource::Spider, 1)
            .await
            .unwrap();

        let status = coordinator.get_queue_status(project.id).await.unwrap();
        assert_eq!(1, status.pending);
        assert!(status.can_resume);
    }

    #[tokio::test]
    async fn stats_for_an_unknown_crawl_are_an_error() {
        let coordinator = coordinator().await;
        assert!(matches!(
            coordinator.get_crawl_stats(12).await,
            Err(CoordinatorError::CrawlNotFound(12))
        ));
    }

    #[tokio::test]
    async fn config_updates_apply_and_reject_unknown_keys() {
        let coordinator = coordinator().await;
        let config = coordinator
            .update_config_for_domain(
                "https://x.com",
                serde_json::json!({ "crawlBudget": 9, "includeSubdomains": true }),
            )
            .await
            .unwrap();
        assert_eq!(9, config.crawl_budget);
        assert!(config.include_subdomains);

        // persisted for the next reader
        let project = coordinator
            .store()
            .get_project_by_domain("x.com")
            .await
            .unwrap()
            .unwrap();
        let stored = coordinator
            .store()
            .get_or_create_config(project.id)
            .await
            .unwrap();
        assert_eq!(9, stored.crawl_budget);

        assert!(matches!(
            coordinator
                .update_config_for_domain("https://x.com", serde_json::json!({ "nope": 1 }))
                .await,
            Err(CoordinatorError::Config(_))
        ));
    }

    #[tokio::test]
    async fn active_crawls_are_empty_without_sessions() {
        let coordinator = coordinator().await;
        assert!(coordinator.get_active_crawls().await.unwrap().is_empty());
    }
}
