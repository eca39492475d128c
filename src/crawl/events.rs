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

use serde::Serialize;

/// One tagged progress record. Adapters receive these through an
/// [EventSink], the engine never knows who is listening.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum CrawlEvent {
    SessionStarted {
        project_id: i64,
        crawl_id: i64,
        resumed: bool,
    },
    UrlVisited {
        crawl_id: i64,
        url: String,
        status: u16,
    },
    UrlDiscovered {
        crawl_id: i64,
        url: String,
        depth: i64,
    },
    UrlFailed {
        crawl_id: i64,
        url: String,
        error: String,
    },
    SessionPaused {
        crawl_id: i64,
        pages_crawled: u64,
        pending: u64,
    },
    SessionCompleted {
        crawl_id: i64,
        pages_crawled: u64,
        pending: u64,
    },
    SessionFailed {
        crawl_id: i64,
        error: String,
    },
}

/// Capability interface for event delivery. Emission is best-effort, a sink
/// must never block the crawl.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: CrawlEvent);
}

/// Drops every event.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: CrawlEvent) {}
}

/// Writes events to the log, used by the CLI front-end.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: CrawlEvent) {
        match &event {
            CrawlEvent::UrlVisited { url, status, .. } => {
                log::info!("crawled {} ({})", url, status)
            }
            CrawlEvent::UrlFailed { url, error, .. } => {
                log::warn!("failed {}: {}", url, error)
            }
            CrawlEvent::UrlDiscovered { .. } => {
                log::debug!("{:?}", event)
            }
            other => log::info!("{:?}", other),
        }
    }
}
