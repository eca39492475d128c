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

use crate::config::{CrawlConfig, RobotsTxtMode};
use crate::crawl::errors::SessionError;
use crate::crawl::events::{CrawlEvent, EventSink};
use crate::crawl::result::{failure_record, hop_record, page_record, resource_record};
use crate::crawl::sitemaps::discover_sitemap_urls;
use crate::extraction::{
    detect_in_headers, extract_page, LinkKind, MimeCategory, PageExtract,
};
use crate::fetching::{Client, FetchFailure, FetchedResponse};
#[cfg(feature = "rendering")]
use crate::fetching::{RenderWaits, Renderer};
use crate::frontier::{Frontier, FrontierPoll, QueueItem};
use crate::hosts::HostRegistry;
use crate::policy::{Indexability, RobotsManager};
use crate::runtime::{Shutdown, ShutdownReceiver, GRACE_WINDOW};
use crate::stores::{CrawlState, RecordedFetch, RunState, Store, StoreError, UrlSource};
use crate::url::{HostScope, NormalizedUrl};
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// How one session ended.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub state: CrawlState,
    pub pages_crawled: u64,
    pub pending: u64,
}

/// One contiguous execution of the engine for a project: a pool of workers
/// draining the frontier through fetch, extract, persist and re-offer.
pub struct CrawlSession {
    store: Store,
    project_id: i64,
    crawl_id: i64,
    run_id: Mutex<Option<i64>>,
    seed: NormalizedUrl,
    config: CrawlConfig,
    scope: HostScope,
    frontier: Arc<Frontier>,
    registry: HostRegistry,
    client: Client,
    events: Arc<dyn EventSink>,
    shutdown: Shutdown,
    resumed: bool,
    /// Urls fetched this session, checked against the budget.
    fetched: AtomicU64,
    pages: AtomicU64,
    budget_hit: AtomicBool,
    /// First store failure, re-raised at session end.
    store_failure: Mutex<Option<StoreError>>,
    /// Hosts already tagged with a detected framework this session.
    framework_tagged: Mutex<HashSet<String>>,
    #[cfg(feature = "rendering")]
    renderer: tokio::sync::OnceCell<Renderer>,
    #[cfg(not(feature = "rendering"))]
    render_warned: AtomicBool,
}

#[allow(clippy::too_many_arguments)]
impl CrawlSession {
    pub fn new(
        store: Store,
        project_id: i64,
        crawl_id: i64,
        run_id: Option<i64>,
        seed: NormalizedUrl,
        config: CrawlConfig,
        frontier: Arc<Frontier>,
        events: Arc<dyn EventSink>,
        shutdown: Shutdown,
        resumed: bool,
    ) -> Result<Self, SessionError> {
        let client = Client::new(&config)?;
        let registry = HostRegistry::new(&config, RobotsManager::new(config.user_agent.clone()));
        let scope = HostScope::from_seed(&seed, config.include_subdomains);
        Ok(Self {
            store,
            project_id,
            crawl_id,
            run_id: Mutex::new(run_id),
            seed,
            config,
            scope,
            frontier,
            registry,
            client,
            events,
            shutdown,
            resumed,
            fetched: AtomicU64::new(0),
            pages: AtomicU64::new(0),
            budget_hit: AtomicBool::new(false),
            store_failure: Mutex::new(None),
            framework_tagged: Mutex::new(HashSet::new()),
            #[cfg(feature = "rendering")]
            renderer: tokio::sync::OnceCell::new(),
            #[cfg(not(feature = "rendering"))]
            render_warned: AtomicBool::new(false),
        })
    }

    /// Runs the session to its end state: drained, paused on budget,
    /// stopped, or failed.
    pub async fn run(self: Arc<Self>) -> Result<SessionOutcome, SessionError> {
        let started = Instant::now();

        if self.resumed {
            let run_id = *self.run_id.lock().unwrap();
            if let Some(run_id) = run_id {
                // earlier sessions' unfetched placeholders would duplicate
                // the urls this session is about to fetch
                self.store.clear_unvisited_placeholders(run_id).await?;
            }
        } else if self.config.sitemap_enabled() && !self.shutdown.is_shutdown() {
            self.seed_from_sitemaps().await;
        }

        let workers = self.config.parallelism.max(1) as usize;
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let session = self.clone();
            handles.push(tokio::spawn(async move { session.worker().await }));
        }
        for handle in handles {
            if let Err(err) = handle.await {
                log::error!("crawl worker panicked: {}", err);
            }
        }

        self.finalize(started).await
    }

    async fn seed_from_sitemaps(&self) {
        let found = discover_sitemap_urls(
            &self.client,
            self.registry.robots(),
            &self.seed,
            &self.config,
        )
        .await;
        for url in found {
            if !self.scope.admits(&url) {
                continue;
            }
            match self.frontier.offer(&url, 0, UrlSource::Sitemap).await {
                Ok(true) => self.events.emit(CrawlEvent::UrlDiscovered {
                    crawl_id: self.crawl_id,
                    url: url.as_str().to_string(),
                    depth: 1,
                }),
                Ok(false) => {}
                Err(err) => self.note_store_failure(err),
            }
        }
    }

    async fn worker(self: Arc<Self>) {
        loop {
            if self.shutdown.is_shutdown() || self.budget_hit.load(Ordering::SeqCst) {
                break;
            }
            match self.frontier.poll() {
                FrontierPoll::Drained => break,
                FrontierPoll::Waiting => {
                    tokio::select! {
                        _ = self.frontier.wait_for_change() => {}
                        _ = self.shutdown.wait() => break,
                    }
                }
                FrontierPoll::Item(item) => {
                    if let ControlFlow::Break(()) = self.process(item).await {
                        break;
                    }
                }
            }
        }
    }

    /// fetch, extract, persist, offer. Strictly in that order for one url.
    async fn process(&self, item: QueueItem) -> ControlFlow<()> {
        let external = !self.scope.admits(&item.url);
        let robots = self.registry.robots().get(&self.client, &item.url).await;
        let disallowed = !robots.allowed(item.url.as_str());

        if disallowed && self.config.robots_txt_mode == RobotsTxtMode::Respect {
            // not fetched, not recorded; the queue row is retired so the
            // drain can finish
            if let Err(err) = self.frontier.mark_visited(&item.url).await {
                self.note_store_failure(err);
            }
            self.frontier.finish(&item);
            return ControlFlow::Continue(());
        }

        if !self.try_consume_budget() {
            self.budget_hit.store(true, Ordering::SeqCst);
            self.frontier.release(item);
            return ControlFlow::Break(());
        }

        let host = item.url.host().to_string();
        let permit = tokio::select! {
            permit = self.registry.acquire(&host) => permit,
            _ = self.shutdown.wait() => {
                self.frontier.release(item);
                return ControlFlow::Break(());
            }
        };
        self.registry.wait_politeness(&host, robots.delay()).await;

        // A stop signal grants in-flight fetches a bounded grace window.
        let fetched = tokio::select! {
            fetched = self.fetch_item(&item, external) => fetched,
            _ = async { self.shutdown.wait().await; tokio::time::sleep(GRACE_WINDOW).await } => {
                self.frontier.release(item);
                return ControlFlow::Break(());
            }
        };
        drop(permit);

        match fetched {
            Ok(response) => self.handle_response(&item, response, disallowed).await,
            Err(failure) => self.handle_failure(&item, failure).await,
        }
        self.frontier.finish(&item);
        ControlFlow::Continue(())
    }

    async fn fetch_item(
        &self,
        item: &QueueItem,
        external: bool,
    ) -> Result<FetchedResponse, FetchFailure> {
        if external {
            // off-host assets only get a HEAD check, never a full crawl
            self.client.head(&item.url).await
        } else {
            self.client.fetch(&item.url).await
        }
    }

    async fn handle_response(&self, item: &QueueItem, response: FetchedResponse, disallowed: bool) {
        let final_category = response.mime_category();
        let report_disallowed =
            disallowed && self.config.robots_txt_mode == RobotsTxtMode::IgnoreReport;
        let mut recorded = RecordedFetch::default();
        for hop in &response.hops {
            recorded.hops.push(hop_record(hop, final_category, item.depth));
        }

        let external = !self.scope.admits(&item.url);
        let mut discoveries: Vec<(NormalizedUrl, UrlSource)> = Vec::new();
        if final_category.is_html() && !external {
            let body = self.page_body(&response).await;
            let extract = extract_page(&response.url, &body);
            let indexability = Indexability::verdict(
                &self.config,
                response.status,
                report_disallowed,
                Some(&response.headers),
                extract.meta_robots_noindex,
            );
            recorded.final_row = page_record(&response, &extract, &indexability, item.depth);
            // Disallowed-but-reported pages keep their row, but their
            // outbound links are neither recorded nor followed.
            if !report_disallowed {
                recorded.links = extract.links.iter().map(|link| link.to_record()).collect();
                discoveries = self.plan_discoveries(&extract);
            }
            self.tag_framework(&response, &extract).await;
        } else {
            let indexability = Indexability::verdict(
                &self.config,
                response.status,
                report_disallowed,
                Some(&response.headers),
                false,
            );
            recorded.final_row = resource_record(&response, &indexability, item.depth);
        }

        match self
            .store
            .record_fetch(self.crawl_id, self.project_id, &recorded)
            .await
        {
            Ok(()) => {
                self.pages.fetch_add(1, Ordering::SeqCst);
                self.events.emit(CrawlEvent::UrlVisited {
                    crawl_id: self.crawl_id,
                    url: response.url.as_str().to_string(),
                    status: response.status.as_u16(),
                });
            }
            Err(err) => self.note_store_failure(err),
        }
        // Session bookkeeping regardless, a url never loops in one session.
        for hop in &response.hops {
            self.frontier.note_visited(&hop.url);
        }
        self.frontier.note_visited(&response.url);
        self.frontier.note_visited(&item.url);

        for (url, source) in discoveries {
            match self.frontier.offer(&url, item.depth, source).await {
                Ok(true) => self.events.emit(CrawlEvent::UrlDiscovered {
                    crawl_id: self.crawl_id,
                    url: url.as_str().to_string(),
                    depth: item.depth + 1,
                }),
                Ok(false) => {}
                Err(err) => self.note_store_failure(err),
            }
        }
    }

    async fn handle_failure(&self, item: &QueueItem, failure: FetchFailure) {
        log::debug!("{:?} failure for {}: {}", failure.kind, item.url, failure.message);
        let mut recorded = RecordedFetch::default();
        for hop in &failure.hops {
            recorded.hops.push(hop_record(hop, MimeCategory::Other, item.depth));
        }
        recorded.final_row = failure_record(&item.url, &failure, item.depth);

        match self
            .store
            .record_fetch(self.crawl_id, self.project_id, &recorded)
            .await
        {
            Ok(()) => self.events.emit(CrawlEvent::UrlFailed {
                crawl_id: self.crawl_id,
                url: item.url.as_str().to_string(),
                error: failure.message.clone(),
            }),
            Err(err) => self.note_store_failure(err),
        }
        for hop in &failure.hops {
            self.frontier.note_visited(&hop.url);
        }
        self.frontier.note_visited(&item.url);
    }

    /// Which extracted links enter the frontier. Anchors spider in scope,
    /// in-scope resources are fetched, off-host assets get the HEAD check
    /// when configured. Out-of-scope anchors are never followed.
    fn plan_discoveries(&self, extract: &PageExtract) -> Vec<(NormalizedUrl, UrlSource)> {
        let mut out = Vec::new();
        for link in &extract.links {
            let internal = self.scope.admits(&link.target);
            match link.kind {
                LinkKind::Anchor => {
                    if !internal || !self.config.spider_enabled() {
                        continue;
                    }
                    if link.follow || self.config.follow_internal_nofollow {
                        out.push((link.target.clone(), UrlSource::Spider));
                    }
                }
                _ => {
                    if internal {
                        out.push((link.target.clone(), UrlSource::Resource));
                    } else if self.config.check_external_resources
                        && (link.follow || self.config.follow_external_nofollow)
                    {
                        out.push((link.target.clone(), UrlSource::Resource));
                    }
                }
            }
        }
        out
    }

    async fn tag_framework(&self, response: &FetchedResponse, extract: &PageExtract) {
        let Some(framework) = extract
            .framework_hint
            .or_else(|| detect_in_headers(&response.headers))
        else {
            return;
        };
        let host = response.url.hostname().to_string();
        if !self.framework_tagged.lock().unwrap().insert(host.clone()) {
            return;
        }
        if let Err(err) = self
            .store
            .set_framework(self.project_id, &host, framework, false)
            .await
        {
            log::warn!("failed to tag framework for {}: {}", host, err);
        }
    }

    #[cfg(feature = "rendering")]
    async fn page_body(&self, response: &FetchedResponse) -> String {
        if self.config.js_rendering_enabled {
            match self.renderer.get_or_try_init(|| Renderer::launch()).await {
                Ok(renderer) => {
                    match renderer
                        .render(&response.url, RenderWaits::from(&self.config))
                        .await
                    {
                        Ok(dom) => return dom,
                        Err(err) => {
                            log::warn!("render failed for {}, using plain html: {}", response.url, err)
                        }
                    }
                }
                Err(err) => log::warn!("failed to launch the render browser: {}", err),
            }
        }
        response.text().into_owned()
    }

    #[cfg(not(feature = "rendering"))]
    async fn page_body(&self, response: &FetchedResponse) -> String {
        if self.config.js_rendering_enabled && !self.render_warned.swap(true, Ordering::Relaxed) {
            log::warn!(
                "jsRenderingEnabled is set but this build has no rendering feature, fetching plain html"
            );
        }
        response.text().into_owned()
    }

    /// Consumes one unit of budget, false once the budget is spent.
    fn try_consume_budget(&self) -> bool {
        let budget = self.config.crawl_budget;
        if budget == 0 {
            self.fetched.fetch_add(1, Ordering::SeqCst);
            return true;
        }
        self.fetched
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < budget).then_some(current + 1)
            })
            .is_ok()
    }

    fn note_store_failure(&self, err: StoreError) {
        log::error!("store failure during crawl {}: {}", self.crawl_id, err);
        let mut slot = self.store_failure.lock().unwrap();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    async fn finalize(&self, started: Instant) -> Result<SessionOutcome, SessionError> {
        let pending_items = self.store.queue_pending(self.project_id).await?;
        let pending = pending_items.len() as u64;
        let stopped = self.shutdown.is_shutdown();
        let failure = self.store_failure.lock().unwrap().take();
        let state = end_state(
            stopped,
            self.budget_hit.load(Ordering::SeqCst),
            pending,
            failure.is_some(),
        );

        if pending > 0 && state != CrawlState::Failed {
            // discovered-but-not-fetched urls stay queryable
            self.store
                .insert_unvisited_placeholders(self.crawl_id, &pending_items)
                .await?;
        }

        if state == CrawlState::Paused || (stopped && pending > 0 && state != CrawlState::Failed) {
            // the crawl row may read completed after a manual stop, but the
            // run stays paused so the remainder can be resumed
            let run_id = self.ensure_run().await?;
            self.store.set_run_state(run_id, RunState::Paused).await?;
        } else if pending == 0 {
            let run_id = *self.run_id.lock().unwrap();
            if let Some(run_id) = run_id {
                self.store.set_run_state(run_id, RunState::Completed).await?;
            }
        }

        let pages = self.pages.load(Ordering::SeqCst);
        self.store
            .finish_crawl(
                self.crawl_id,
                state,
                started.elapsed().as_millis() as i64,
                pages as i64,
            )
            .await?;

        match state {
            CrawlState::Paused => self.events.emit(CrawlEvent::SessionPaused {
                crawl_id: self.crawl_id,
                pages_crawled: pages,
                pending,
            }),
            CrawlState::Failed => self.events.emit(CrawlEvent::SessionFailed {
                crawl_id: self.crawl_id,
                error: failure
                    .as_ref()
                    .map(|err| err.to_string())
                    .unwrap_or_default(),
            }),
            _ => self.events.emit(CrawlEvent::SessionCompleted {
                crawl_id: self.crawl_id,
                pages_crawled: pages,
                pending,
            }),
        }

        if let Some(err) = failure {
            return Err(err.into());
        }
        Ok(SessionOutcome {
            state,
            pages_crawled: pages,
            pending,
        })
    }

    async fn ensure_run(&self) -> Result<i64, StoreError> {
        let existing = *self.run_id.lock().unwrap();
        if let Some(run_id) = existing {
            return Ok(run_id);
        }
        // budget pause on a project that never had a run: create it now so
        // the remainder is resumable
        let run = match self.store.open_run(self.project_id).await? {
            Some(run) => run,
            None => self.store.create_run(self.project_id).await?,
        };
        self.store.attach_crawl_to_run(self.crawl_id, run.id).await?;
        *self.run_id.lock().unwrap() = Some(run.id);
        Ok(run.id)
    }
}

/// The session state machine's terminal transition.
pub(crate) fn end_state(
    stopped: bool,
    budget_hit: bool,
    pending: u64,
    store_failed: bool,
) -> CrawlState {
    if store_failed {
        CrawlState::Failed
    } else if stopped {
        // a manual stop persists as completed even with pending items
        CrawlState::Completed
    } else if budget_hit && pending > 0 {
        CrawlState::Paused
    } else {
        CrawlState::Completed
    }
}
