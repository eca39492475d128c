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

use crate::config::CrawlConfig;
use crate::stores::models::*;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

/// Idempotent schema, applied at every open.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    domain TEXT NOT NULL UNIQUE,
    canonical_url TEXT NOT NULL,
    favicon_path TEXT,
    competitor INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS project_configs (
    project_id INTEGER PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
    config TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    state TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS crawls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    run_id INTEGER REFERENCES crawl_runs(id) ON DELETE CASCADE,
    state TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    pages_crawled INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS discovered_urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawl_id INTEGER NOT NULL REFERENCES crawls(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    visited INTEGER NOT NULL DEFAULT 0,
    status INTEGER NOT NULL DEFAULT 0,
    title TEXT,
    meta_description TEXT,
    h1 TEXT,
    h2 TEXT,
    canonical_url TEXT,
    word_count INTEGER,
    content_hash INTEGER,
    indexable TEXT,
    content_type TEXT,
    mime_category TEXT,
    error TEXT,
    depth INTEGER NOT NULL DEFAULT 0,
    UNIQUE(crawl_id, url)
);
CREATE INDEX IF NOT EXISTS idx_discovered_crawl ON discovered_urls(crawl_id);
CREATE INDEX IF NOT EXISTS idx_discovered_mime ON discovered_urls(crawl_id, mime_category);

CREATE TABLE IF NOT EXISTS page_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawl_id INTEGER NOT NULL REFERENCES crawls(id) ON DELETE CASCADE,
    source_url TEXT NOT NULL,
    target_url TEXT NOT NULL,
    kind TEXT NOT NULL,
    anchor_text TEXT,
    rel TEXT,
    follow INTEGER NOT NULL DEFAULT 1,
    target_attr TEXT,
    path_type TEXT NOT NULL,
    position TEXT NOT NULL,
    dom_path TEXT
);
CREATE INDEX IF NOT EXISTS idx_links_source ON page_links(crawl_id, source_url);
CREATE INDEX IF NOT EXISTS idx_links_target ON page_links(crawl_id, target_url);

CREATE TABLE IF NOT EXISTS crawl_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    url_hash INTEGER NOT NULL,
    source TEXT NOT NULL,
    depth INTEGER NOT NULL DEFAULT 0,
    visited INTEGER NOT NULL DEFAULT 0,
    UNIQUE(project_id, url)
);
CREATE INDEX IF NOT EXISTS idx_queue_hash ON crawl_queue(project_id, url_hash);
CREATE INDEX IF NOT EXISTS idx_queue_pending ON crawl_queue(project_id, visited);

CREATE TABLE IF NOT EXISTS domain_frameworks (
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    domain TEXT NOT NULL,
    framework TEXT NOT NULL,
    manual INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (project_id, domain)
);
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("corrupt config for project {0}: {1}")]
    CorruptConfig(i64, serde_json::Error),
}

/// The relational store. All engine persistence goes through here, readers
/// and writers are serialized by the pool and sqlite's own locking. No
/// method holds a transaction across network I/O.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

fn now_ts() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

impl Store {
    /// Opens (and if needed creates) the store at `path`.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    /// A private in-memory store, one connection so every query sees the
    /// same database.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .expect("static connect string")
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        Ok(Self { pool })
    }

    // ------------------------------------------------------------------
    // Projects & configs
    // ------------------------------------------------------------------

    pub async fn create_or_get_project(
        &self,
        domain: &str,
        canonical_url: &str,
    ) -> Result<ProjectRow, StoreError> {
        let domain = domain.to_ascii_lowercase();
        if let Some(existing) = self.get_project_by_domain(&domain).await? {
            return Ok(existing);
        }
        sqlx::query("INSERT INTO projects (domain, canonical_url, created_at) VALUES (?, ?, ?)")
            .bind(&domain)
            .bind(canonical_url)
            .bind(now_ts())
            .execute(&self.pool)
            .await?;
        Ok(self
            .get_project_by_domain(&domain)
            .await?
            .expect("row just inserted"))
    }

    pub async fn get_project(&self, id: i64) -> Result<Option<ProjectRow>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_project_by_domain(
        &self,
        domain: &str,
    ) -> Result<Option<ProjectRow>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM projects WHERE domain = ?")
            .bind(domain.to_ascii_lowercase())
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectRow>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM projects ORDER BY id")
            .fetch_all(&self.pool)
            .await?)
    }

    /// Deletes a project and, through the cascades, all of its runs,
    /// crawls, discovered urls, links, queue items and config.
    pub async fn delete_project(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[allow(dead_code)]
    pub async fn set_favicon_path(&self, id: i64, path: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE projects SET favicon_path = ? WHERE id = ?")
            .bind(path)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[allow(dead_code)]
    pub async fn set_competitor(&self, id: i64, competitor: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE projects SET competitor = ? WHERE id = ?")
            .bind(competitor)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns the project config, creating it with defaults on first use.
    pub async fn get_or_create_config(&self, project_id: i64) -> Result<CrawlConfig, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT config FROM project_configs WHERE project_id = ?")
                .bind(project_id)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((raw,)) => serde_json::from_str(&raw)
                .map_err(|err| StoreError::CorruptConfig(project_id, err)),
            None => {
                let config = CrawlConfig::default();
                self.save_config(project_id, &config).await?;
                Ok(config)
            }
        }
    }

    pub async fn save_config(
        &self,
        project_id: i64,
        config: &CrawlConfig,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(config).expect("config serializes");
        sqlx::query(
            "INSERT INTO project_configs (project_id, config) VALUES (?, ?) \
             ON CONFLICT(project_id) DO UPDATE SET config = excluded.config",
        )
        .bind(project_id)
        .bind(raw)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Runs & crawls
    // ------------------------------------------------------------------

    pub async fn create_run(&self, project_id: i64) -> Result<RunRow, StoreError> {
        let id = sqlx::query("INSERT INTO crawl_runs (project_id, state, created_at) VALUES (?, ?, ?)")
            .bind(project_id)
            .bind(RunState::InProgress.to_string())
            .bind(now_ts())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(self.get_run(id).await?.expect("row just inserted"))
    }

    pub async fn get_run(&self, id: i64) -> Result<Option<RunRow>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM crawl_runs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// The single non-completed run of a project, if any.
    pub async fn open_run(&self, project_id: i64) -> Result<Option<RunRow>, StoreError> {
        Ok(sqlx::query_as(
            "SELECT * FROM crawl_runs WHERE project_id = ? AND state != ? ORDER BY id DESC LIMIT 1",
        )
        .bind(project_id)
        .bind(RunState::Completed.to_string())
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn set_run_state(&self, run_id: i64, state: RunState) -> Result<(), StoreError> {
        sqlx::query("UPDATE crawl_runs SET state = ? WHERE id = ?")
            .bind(state.to_string())
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_crawl(
        &self,
        project_id: i64,
        run_id: Option<i64>,
    ) -> Result<CrawlRow, StoreError> {
        let id = sqlx::query(
            "INSERT INTO crawls (project_id, run_id, state, started_at) VALUES (?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(run_id)
        .bind(CrawlState::InProgress.to_string())
        .bind(now_ts())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(self.get_crawl(id).await?.expect("row just inserted"))
    }

    pub async fn get_crawl(&self, id: i64) -> Result<Option<CrawlRow>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM crawls WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_crawls(&self, project_id: i64) -> Result<Vec<CrawlRow>, StoreError> {
        Ok(sqlx::query_as("SELECT * FROM crawls WHERE project_id = ? ORDER BY id")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn attach_crawl_to_run(&self, crawl_id: i64, run_id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE crawls SET run_id = ? WHERE id = ?")
            .bind(run_id)
            .bind(crawl_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn finish_crawl(
        &self,
        crawl_id: i64,
        state: CrawlState,
        duration_ms: i64,
        pages_crawled: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE crawls SET state = ?, duration_ms = ?, pages_crawled = ? WHERE id = ?",
        )
        .bind(state.to_string())
        .bind(duration_ms)
        .bind(pages_crawled)
        .bind(crawl_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    /// Upserts a queue item. Never resurrects a visited url, keeps the
    /// smaller depth when the url is rediscovered.
    pub async fn queue_offer(
        &self,
        project_id: i64,
        url: &str,
        url_hash: i64,
        source: UrlSource,
        depth: i64,
    ) -> Result<OfferOutcome, StoreError> {
        let existing: Option<(bool,)> =
            sqlx::query_as("SELECT visited FROM crawl_queue WHERE project_id = ? AND url = ?")
                .bind(project_id)
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        match existing {
            Some((true,)) => Ok(OfferOutcome::AlreadyVisited),
            Some((false,)) => {
                sqlx::query(
                    "UPDATE crawl_queue SET depth = MIN(depth, ?) \
                     WHERE project_id = ? AND url = ?",
                )
                .bind(depth)
                .bind(project_id)
                .bind(url)
                .execute(&self.pool)
                .await?;
                Ok(OfferOutcome::AlreadyQueued)
            }
            None => {
                sqlx::query(
                    "INSERT INTO crawl_queue (project_id, url, url_hash, source, depth, visited) \
                     VALUES (?, ?, ?, ?, ?, 0) ON CONFLICT(project_id, url) DO NOTHING",
                )
                .bind(project_id)
                .bind(url)
                .bind(url_hash)
                .bind(source.to_string())
                .bind(depth)
                .execute(&self.pool)
                .await?;
                Ok(OfferOutcome::Inserted)
            }
        }
    }

    /// Idempotent transition to visited.
    pub async fn queue_mark_visited(&self, project_id: i64, url: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE crawl_queue SET visited = 1 WHERE project_id = ? AND url = ?")
            .bind(project_id)
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn queue_pending(&self, project_id: i64) -> Result<Vec<QueueItemRow>, StoreError> {
        Ok(sqlx::query_as(
            "SELECT * FROM crawl_queue WHERE project_id = ? AND visited = 0 ORDER BY id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// All visited hashes of a project, loaded into memory on resume.
    pub async fn queue_visited_hashes(&self, project_id: i64) -> Result<Vec<i64>, StoreError> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT url_hash FROM crawl_queue WHERE project_id = ? AND visited = 1")
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(hash,)| hash).collect())
    }

    pub async fn queue_stats(&self, project_id: i64) -> Result<QueueStats, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    COALESCE(SUM(visited), 0) AS visited \
             FROM crawl_queue WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.get("total");
        let visited: i64 = row.get("visited");
        Ok(QueueStats {
            pending: (total - visited) as u64,
            visited: visited as u64,
            total: total as u64,
        })
    }

    // ------------------------------------------------------------------
    // Discovered urls & links
    // ------------------------------------------------------------------

    /// Persists one fetch outcome: redirect intermediates, the final row,
    /// its outbound edges and the queue transitions, in one transaction.
    pub async fn record_fetch(
        &self,
        crawl_id: i64,
        project_id: i64,
        recorded: &RecordedFetch,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for hop in &recorded.hops {
            Self::upsert_discovered_in(&mut tx, crawl_id, hop).await?;
            // A hop observed on the wire is visited by definition, whether
            // or not spidering ever finds it.
            sqlx::query(
                "INSERT INTO crawl_queue (project_id, url, url_hash, source, depth, visited) \
                 VALUES (?, ?, ?, ?, ?, 1) \
                 ON CONFLICT(project_id, url) DO UPDATE SET \
                     visited = 1, depth = MIN(crawl_queue.depth, excluded.depth)",
            )
            .bind(project_id)
            .bind(&hop.url)
            .bind(hop.url_hash)
            .bind(UrlSource::Network.to_string())
            .bind(hop.depth)
            .execute(&mut *tx)
            .await?;
        }

        Self::upsert_discovered_in(&mut tx, crawl_id, &recorded.final_row).await?;
        sqlx::query(
            "INSERT INTO crawl_queue (project_id, url, url_hash, source, depth, visited) \
             VALUES (?, ?, ?, ?, ?, 1) \
             ON CONFLICT(project_id, url) DO UPDATE SET \
                 visited = 1, depth = MIN(crawl_queue.depth, excluded.depth)",
        )
        .bind(project_id)
        .bind(&recorded.final_row.url)
        .bind(recorded.final_row.url_hash)
        .bind(UrlSource::Network.to_string())
        .bind(recorded.final_row.depth)
        .execute(&mut *tx)
        .await?;

        for link in &recorded.links {
            sqlx::query(
                "INSERT INTO page_links (crawl_id, source_url, target_url, kind, anchor_text, \
                     rel, follow, target_attr, path_type, position, dom_path) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(crawl_id)
            .bind(&recorded.final_row.url)
            .bind(&link.target_url)
            .bind(&link.kind)
            .bind(&link.anchor_text)
            .bind(&link.rel)
            .bind(link.follow)
            .bind(&link.target_attr)
            .bind(&link.path_type)
            .bind(&link.position)
            .bind(&link.dom_path)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_discovered_in(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        crawl_id: i64,
        record: &DiscoveredUrlRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO discovered_urls (crawl_id, url, visited, status, title, \
                 meta_description, h1, h2, canonical_url, word_count, content_hash, \
                 indexable, content_type, mime_category, error, depth) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(crawl_id, url) DO UPDATE SET \
                 visited = excluded.visited, \
                 status = excluded.status, \
                 title = excluded.title, \
                 meta_description = excluded.meta_description, \
                 h1 = excluded.h1, \
                 h2 = excluded.h2, \
                 canonical_url = excluded.canonical_url, \
                 word_count = excluded.word_count, \
                 content_hash = excluded.content_hash, \
                 indexable = excluded.indexable, \
                 content_type = excluded.content_type, \
                 mime_category = excluded.mime_category, \
                 error = excluded.error, \
                 depth = MIN(discovered_urls.depth, excluded.depth)",
        )
        .bind(crawl_id)
        .bind(&record.url)
        .bind(record.visited)
        .bind(record.status)
        .bind(&record.title)
        .bind(&record.meta_description)
        .bind(&record.h1)
        .bind(&record.h2)
        .bind(&record.canonical_url)
        .bind(record.word_count)
        .bind(record.content_hash)
        .bind(&record.indexable)
        .bind(&record.content_type)
        .bind(&record.mime_category)
        .bind(&record.error)
        .bind(record.depth)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Rows for urls that were discovered but never fetched, written when a
    /// session halts with the frontier non-empty. Existing rows win.
    pub async fn insert_unvisited_placeholders(
        &self,
        crawl_id: i64,
        items: &[QueueItemRow],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            sqlx::query(
                "INSERT INTO discovered_urls (crawl_id, url, visited, status, depth) \
                 VALUES (?, ?, 0, 0, ?) ON CONFLICT(crawl_id, url) DO NOTHING",
            )
            .bind(crawl_id)
            .bind(&item.url)
            .bind(item.depth)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Drops the discovered-but-not-fetched rows of a run's earlier
    /// sessions. Called on resume, the resuming session re-fetches those
    /// urls (or re-writes placeholders when it pauses again), so the
    /// aggregated view never shows a url twice.
    pub async fn clear_unvisited_placeholders(&self, run_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM discovered_urls WHERE visited = 0 \
             AND crawl_id IN (SELECT id FROM crawls WHERE run_id = ?)",
        )
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Aggregated reads
    // ------------------------------------------------------------------

    /// Widens a crawl id to every crawl of its run so resumed crawls read
    /// as one dataset.
    pub async fn crawl_ids_of_run(&self, crawl_id: i64) -> Result<Vec<i64>, StoreError> {
        let run_id: Option<(Option<i64>,)> =
            sqlx::query_as("SELECT run_id FROM crawls WHERE id = ?")
                .bind(crawl_id)
                .fetch_optional(&self.pool)
                .await?;
        match run_id {
            Some((Some(run_id),)) => {
                let rows: Vec<(i64,)> =
                    sqlx::query_as("SELECT id FROM crawls WHERE run_id = ? ORDER BY id")
                        .bind(run_id)
                        .fetch_all(&self.pool)
                        .await?;
                Ok(rows.into_iter().map(|(id,)| id).collect())
            }
            _ => Ok(vec![crawl_id]),
        }
    }

    pub async fn crawl_stats(&self, crawl_id: i64) -> Result<CrawlStats, StoreError> {
        let ids = self.crawl_ids_of_run(crawl_id).await?;
        let mut qb = QueryBuilder::new(
            "SELECT COUNT(*) AS total, \
                    COALESCE(SUM(visited), 0) AS crawled, \
                    COALESCE(SUM(visited = 0), 0) AS unvisited, \
                    COALESCE(SUM(mime_category = 'html'), 0) AS html, \
                    COALESCE(SUM(mime_category = 'javascript'), 0) AS javascript, \
                    COALESCE(SUM(mime_category = 'css'), 0) AS css, \
                    COALESCE(SUM(mime_category = 'image'), 0) AS images, \
                    COALESCE(SUM(mime_category = 'font'), 0) AS fonts, \
                    COALESCE(SUM(mime_category = 'other'), 0) AS others \
             FROM discovered_urls WHERE crawl_id IN (",
        );
        {
            let mut sep = qb.separated(", ");
            for id in &ids {
                sep.push_bind(id);
            }
        }
        qb.push(")");
        let row = qb.build().fetch_one(&self.pool).await?;

        let project_id: Option<(i64,)> =
            sqlx::query_as("SELECT project_id FROM crawls WHERE id = ?")
                .bind(crawl_id)
                .fetch_optional(&self.pool)
                .await?;
        let queued = match project_id {
            Some((project_id,)) => self.queue_stats(project_id).await?.pending,
            None => 0,
        };

        let get = |name: &str| -> u64 { row.get::<i64, _>(name) as u64 };
        Ok(CrawlStats {
            total: get("total"),
            crawled: get("crawled"),
            queued,
            html: get("html"),
            javascript: get("javascript"),
            css: get("css"),
            images: get("images"),
            fonts: get("fonts"),
            unvisited: get("unvisited"),
            others: get("others"),
        })
    }

    /// Cursor paginated rows of a crawl (widened over its run), optionally
    /// filtered by MIME category.
    pub async fn discovered_paginated(
        &self,
        crawl_id: i64,
        limit: u32,
        cursor: Option<i64>,
        type_filter: Option<&str>,
    ) -> Result<Paginated<DiscoveredUrlRow>, StoreError> {
        self.read_discovered(crawl_id, limit, cursor, type_filter, None)
            .await
    }

    /// Substring search over url, title, status and indexability verdict.
    pub async fn search_discovered(
        &self,
        crawl_id: i64,
        query: &str,
        type_filter: Option<&str>,
        limit: u32,
        cursor: Option<i64>,
    ) -> Result<Paginated<DiscoveredUrlRow>, StoreError> {
        self.read_discovered(crawl_id, limit, cursor, type_filter, Some(query))
            .await
    }

    async fn read_discovered(
        &self,
        crawl_id: i64,
        limit: u32,
        cursor: Option<i64>,
        type_filter: Option<&str>,
        search: Option<&str>,
    ) -> Result<Paginated<DiscoveredUrlRow>, StoreError> {
        let ids = self.crawl_ids_of_run(crawl_id).await?;
        let mut qb = QueryBuilder::new("SELECT * FROM discovered_urls WHERE crawl_id IN (");
        {
            let mut sep = qb.separated(", ");
            for id in &ids {
                sep.push_bind(id);
            }
        }
        qb.push(")");
        if let Some(filter) = type_filter {
            qb.push(" AND mime_category = ");
            qb.push_bind(filter.to_string());
        }
        if let Some(query) = search {
            let pattern = format!("%{}%", query);
            qb.push(" AND (url LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR title LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR CAST(status AS TEXT) LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR indexable LIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }
        qb.push(" AND id > ");
        qb.push_bind(cursor.unwrap_or(0));
        qb.push(" ORDER BY id LIMIT ");
        qb.push_bind(limit as i64);

        let items: Vec<DiscoveredUrlRow> =
            qb.build_query_as().fetch_all(&self.pool).await?;
        let next_cursor = if items.len() == limit as usize {
            items.last().map(|row| row.id)
        } else {
            None
        };
        Ok(Paginated { items, next_cursor })
    }

    /// In- and outbound edges of one url within a crawl (widened over its
    /// run).
    pub async fn page_links_for_url(
        &self,
        crawl_id: i64,
        url: &str,
    ) -> Result<PageLinksOfUrl, StoreError> {
        let ids = self.crawl_ids_of_run(crawl_id).await?;
        let fetch = |column: &'static str| {
            let ids = ids.clone();
            async move {
                let mut qb = QueryBuilder::new("SELECT * FROM page_links WHERE crawl_id IN (");
                {
                    let mut sep = qb.separated(", ");
                    for id in &ids {
                        sep.push_bind(id);
                    }
                }
                qb.push(") AND ");
                qb.push(column);
                qb.push(" = ");
                qb.push_bind(url.to_string());
                qb.push(" ORDER BY id");
                qb.build_query_as::<PageLinkRow>().fetch_all(&self.pool).await
            }
        };
        Ok(PageLinksOfUrl {
            inlinks: fetch("target_url").await?,
            outlinks: fetch("source_url").await?,
        })
    }

    // ------------------------------------------------------------------
    // Frameworks
    // ------------------------------------------------------------------

    /// Records a framework tag. Automatic detection never overwrites a
    /// manually set tag.
    pub async fn set_framework(
        &self,
        project_id: i64,
        domain: &str,
        framework: &str,
        manual: bool,
    ) -> Result<(), StoreError> {
        if manual {
            sqlx::query(
                "INSERT INTO domain_frameworks (project_id, domain, framework, manual) \
                 VALUES (?, ?, ?, 1) ON CONFLICT(project_id, domain) DO UPDATE SET \
                     framework = excluded.framework, manual = 1",
            )
        } else {
            sqlx::query(
                "INSERT INTO domain_frameworks (project_id, domain, framework, manual) \
                 VALUES (?, ?, ?, 0) ON CONFLICT(project_id, domain) DO UPDATE SET \
                     framework = excluded.framework WHERE domain_frameworks.manual = 0",
            )
        }
        .bind(project_id)
        .bind(domain.to_ascii_lowercase())
        .bind(framework)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_framework(
        &self,
        project_id: i64,
        domain: &str,
    ) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT framework FROM domain_frameworks WHERE project_id = ? AND domain = ?",
        )
        .bind(project_id)
        .bind(domain.to_ascii_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(framework,)| framework))
    }
}
