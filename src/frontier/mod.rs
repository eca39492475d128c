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

use crate::stores::{OfferOutcome, QueueStats, Store, StoreError, UrlSource};
use crate::url::NormalizedUrl;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// One unit of work pulled from the frontier.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub url: NormalizedUrl,
    pub depth: i64,
    pub source: UrlSource,
}

/// What a poll of the frontier yielded.
#[derive(Debug)]
pub enum FrontierPoll {
    Item(QueueItem),
    /// Nothing queued right now, but in-flight work may still discover
    /// more. Wait for a change and poll again.
    Waiting,
    /// Nothing queued and nothing in flight, the frontier is exhausted.
    Drained,
}

/// The deduplicated work queue of one session, backed by the persistent
/// `crawl_queue` so that pause, resume and crash recovery preserve exactly
/// the set of urls that remain to be fetched.
///
/// In-memory state is session-local: the pending deque mirrors the store's
/// unvisited rows, the seen set short-circuits repeated offers, and the
/// floating counter tracks polled-but-unfinished items so workers can tell
/// "wait" from "drained".
#[derive(Debug)]
pub struct Frontier {
    store: Store,
    project_id: i64,
    pending: Mutex<VecDeque<QueueItem>>,
    /// Hashes of every url this session queued or visited.
    seen: Mutex<HashSet<i64>>,
    /// Hashes of urls already visited, polled items with one of these are
    /// skipped.
    visited: Mutex<HashSet<i64>>,
    floating: AtomicUsize,
    notify: Notify,
}

impl Frontier {
    /// Opens the frontier of a project and loads the session state: all
    /// visited hashes and the pending items, their recorded depth
    /// preserved.
    pub async fn new(store: Store, project_id: i64) -> Result<Self, StoreError> {
        let mut seen = HashSet::new();
        let mut visited = HashSet::new();
        for hash in store.queue_visited_hashes(project_id).await? {
            seen.insert(hash);
            visited.insert(hash);
        }

        let mut pending = VecDeque::new();
        for row in store.queue_pending(project_id).await? {
            match NormalizedUrl::parse(&row.url) {
                Ok(url) => {
                    seen.insert(url.hash());
                    pending.push_back(QueueItem {
                        url,
                        depth: row.depth,
                        source: row.source(),
                    });
                }
                Err(err) => {
                    // A row that no longer parses can never be fetched,
                    // retire it instead of blocking the drain.
                    log::warn!("dropping unparsable queue row {:?}: {}", row.url, err);
                    store.queue_mark_visited(project_id, &row.url).await?;
                }
            }
        }

        Ok(Self {
            store,
            project_id,
            pending: Mutex::new(pending),
            seen: Mutex::new(seen),
            visited: Mutex::new(visited),
            floating: AtomicUsize::new(0),
            notify: Notify::new(),
        })
    }

    /// Inserts the seed at depth 0.
    pub async fn seed(&self, url: &NormalizedUrl) -> Result<bool, StoreError> {
        self.offer_at(url, 0, UrlSource::Initial).await
    }

    /// Upserts a discovery one hop below its parent. Never resurrects a
    /// visited url. Returns whether the url newly entered the queue.
    pub async fn offer(
        &self,
        url: &NormalizedUrl,
        parent_depth: i64,
        source: UrlSource,
    ) -> Result<bool, StoreError> {
        self.offer_at(url, parent_depth.saturating_add(1), source).await
    }

    async fn offer_at(
        &self,
        url: &NormalizedUrl,
        depth: i64,
        source: UrlSource,
    ) -> Result<bool, StoreError> {
        let hash = url.hash();
        if self.seen.lock().unwrap().contains(&hash) {
            return Ok(false);
        }
        let outcome = self
            .store
            .queue_offer(self.project_id, url.as_str(), hash, source, depth)
            .await?;
        self.seen.lock().unwrap().insert(hash);
        match outcome {
            OfferOutcome::Inserted => {
                self.pending.lock().unwrap().push_back(QueueItem {
                    url: url.clone(),
                    depth,
                    source,
                });
                self.notify.notify_waiters();
                Ok(true)
            }
            OfferOutcome::AlreadyQueued => Ok(false),
            OfferOutcome::AlreadyVisited => {
                self.visited.lock().unwrap().insert(hash);
                Ok(false)
            }
        }
    }

    /// Takes one unvisited item, or reports why there is none.
    pub fn poll(&self) -> FrontierPoll {
        let mut pending = self.pending.lock().unwrap();
        let visited = self.visited.lock().unwrap();
        while let Some(item) = pending.pop_front() {
            // Visited since it was queued, e.g. observed as a redirect hop.
            if visited.contains(&item.url.hash()) {
                continue;
            }
            self.floating.fetch_add(1, Ordering::SeqCst);
            return FrontierPoll::Item(item);
        }
        if self.floating.load(Ordering::SeqCst) > 0 {
            FrontierPoll::Waiting
        } else {
            FrontierPoll::Drained
        }
    }

    /// Parks a worker that polled [FrontierPoll::Waiting] until an offer or
    /// finish changes the frontier. Registration happens before the state
    /// re-check, a notification between poll and wait is never lost.
    pub async fn wait_for_change(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if !self.pending.lock().unwrap().is_empty()
            || self.floating.load(Ordering::SeqCst) == 0
        {
            return;
        }
        notified.await
    }

    /// Idempotent transition of a url to visited, persisted and noted in
    /// the session sets.
    pub async fn mark_visited(&self, url: &NormalizedUrl) -> Result<(), StoreError> {
        self.store
            .queue_mark_visited(self.project_id, url.as_str())
            .await?;
        self.note_visited(url);
        Ok(())
    }

    /// Session bookkeeping for a url the store already persisted as
    /// visited, e.g. inside the fetch-recording transaction.
    pub fn note_visited(&self, url: &NormalizedUrl) {
        let hash = url.hash();
        self.seen.lock().unwrap().insert(hash);
        self.visited.lock().unwrap().insert(hash);
    }

    /// Completes a polled item. Every poll that yielded an item must end in
    /// exactly one finish or release.
    pub fn finish(&self, _item: &QueueItem) {
        self.floating.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Puts a polled item back unprocessed, e.g. when the budget ran out or
    /// a stop arrived before the fetch.
    pub fn release(&self, item: QueueItem) {
        self.pending.lock().unwrap().push_front(item);
        self.floating.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub async fn stats(&self) -> Result<QueueStats, StoreError> {
        self.store.queue_stats(self.project_id).await
    }
}
