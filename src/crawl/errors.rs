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

use crate::config::ConfigError;
use crate::stores::StoreError;
use crate::url::UrlParseError;
use thiserror::Error;

/// Fatal session level failures. Url level failures are recorded on the
/// url, not raised.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to build the http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Structured errors of the coordinator api, surfaced to adapters.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] UrlParseError),
    #[error("a crawl is already running for project {0}")]
    CrawlAlreadyRunning(i64),
    #[error("no active session for project {0}")]
    NoActiveSession(i64),
    #[error("no paused run with pending urls for project {0}")]
    NothingToResume(i64),
    #[error("project {0} not found")]
    ProjectNotFound(i64),
    #[error("crawl {0} not found")]
    CrawlNotFound(i64),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
