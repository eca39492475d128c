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
use sqlx::FromRow;
use strum::{Display, EnumString};

/// State of a single engine session.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, Serialize, Deserialize)]
pub enum CrawlState {
    #[strum(serialize = "in_progress")]
    InProgress,
    #[strum(serialize = "paused")]
    Paused,
    #[strum(serialize = "completed")]
    Completed,
    #[strum(serialize = "failed")]
    Failed,
}

/// State of a logical crawl that may span several sessions.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, Serialize, Deserialize)]
pub enum RunState {
    #[strum(serialize = "in_progress")]
    InProgress,
    #[strum(serialize = "paused")]
    Paused,
    #[strum(serialize = "completed")]
    Completed,
}

/// Where a queue item was discovered.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString, Serialize, Deserialize)]
pub enum UrlSource {
    #[strum(serialize = "initial")]
    Initial,
    #[strum(serialize = "spider")]
    Spider,
    #[strum(serialize = "sitemap")]
    Sitemap,
    /// Materialized from an observed redirect hop.
    #[strum(serialize = "network")]
    Network,
    /// Referenced as an embedded resource (img, script, stylesheet).
    #[strum(serialize = "resource")]
    Resource,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProjectRow {
    pub id: i64,
    pub domain: String,
    pub canonical_url: String,
    pub favicon_path: Option<String>,
    pub competitor: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RunRow {
    pub id: i64,
    pub project_id: i64,
    pub state: String,
    pub created_at: i64,
}

impl RunRow {
    pub fn state(&self) -> RunState {
        self.state.parse().unwrap_or(RunState::Completed)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CrawlRow {
    pub id: i64,
    pub project_id: i64,
    pub run_id: Option<i64>,
    pub state: String,
    pub started_at: i64,
    pub duration_ms: i64,
    pub pages_crawled: i64,
}

impl CrawlRow {
    pub fn state(&self) -> CrawlState {
        self.state.parse().unwrap_or(CrawlState::Failed)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DiscoveredUrlRow {
    pub id: i64,
    pub crawl_id: i64,
    pub url: String,
    pub visited: bool,
    pub status: i64,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1: Option<String>,
    pub h2: Option<String>,
    pub canonical_url: Option<String>,
    pub word_count: Option<i64>,
    pub content_hash: Option<i64>,
    pub indexable: Option<String>,
    pub content_type: Option<String>,
    pub mime_category: Option<String>,
    pub error: Option<String>,
    pub depth: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PageLinkRow {
    pub id: i64,
    pub crawl_id: i64,
    pub source_url: String,
    pub target_url: String,
    pub kind: String,
    pub anchor_text: Option<String>,
    pub rel: Option<String>,
    pub follow: bool,
    pub target_attr: Option<String>,
    pub path_type: String,
    pub position: String,
    pub dom_path: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueueItemRow {
    pub id: i64,
    pub project_id: i64,
    pub url: String,
    pub url_hash: i64,
    pub source: String,
    pub depth: i64,
    pub visited: bool,
}

impl QueueItemRow {
    pub fn source(&self) -> UrlSource {
        self.source.parse().unwrap_or(UrlSource::Spider)
    }
}

/// Everything the store needs to upsert one `discovered_urls` row.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredUrlRecord {
    pub url: String,
    pub url_hash: i64,
    pub visited: bool,
    pub status: i64,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1: Option<String>,
    pub h2: Option<String>,
    pub canonical_url: Option<String>,
    pub word_count: Option<i64>,
    pub content_hash: Option<i64>,
    pub indexable: Option<String>,
    pub content_type: Option<String>,
    pub mime_category: Option<String>,
    pub error: Option<String>,
    pub depth: i64,
}

/// One outbound edge of a fetched page.
#[derive(Debug, Clone)]
pub struct PageLinkRecord {
    pub target_url: String,
    pub kind: String,
    pub anchor_text: Option<String>,
    pub rel: Option<String>,
    pub follow: bool,
    pub target_attr: Option<String>,
    pub path_type: String,
    pub position: String,
    pub dom_path: Option<String>,
}

/// The unit the session hands to the store after a fetch: redirect hops,
/// the final row and its outbound edges, persisted in one transaction.
#[derive(Debug, Clone, Default)]
pub struct RecordedFetch {
    /// Redirect intermediates in chain order, already marked visited.
    pub hops: Vec<DiscoveredUrlRecord>,
    pub final_row: DiscoveredUrlRecord,
    pub links: Vec<PageLinkRecord>,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub visited: u64,
    pub total: u64,
}

/// The aggregated counters of `GetCrawlStats`, widened over the crawl's run.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize)]
pub struct CrawlStats {
    pub total: u64,
    pub crawled: u64,
    pub queued: u64,
    pub html: u64,
    pub javascript: u64,
    pub css: u64,
    pub images: u64,
    pub fonts: u64,
    pub unvisited: u64,
    pub others: u64,
}

/// One page of a cursor-paginated read, the cursor keys on the row id.
#[derive(Debug, Clone)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct PageLinksOfUrl {
    pub inlinks: Vec<PageLinkRow>,
    pub outlinks: Vec<PageLinkRow>,
}

/// Whether an offered url entered the queue.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OfferOutcome {
    Inserted,
    AlreadyQueued,
    AlreadyVisited,
}
