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
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::fmt::{Display, Formatter};

/// Why a page is not eligible for search indexing.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NoindexReason {
    RobotsDisallowed,
    HeaderNoindex,
    MetaNoindex,
    HttpStatus(u16),
}

impl Display for NoindexReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NoindexReason::RobotsDisallowed => f.write_str("Disallowed by robots"),
            NoindexReason::HeaderNoindex => f.write_str("Noindex response header"),
            NoindexReason::MetaNoindex => f.write_str("Noindex meta robots"),
            NoindexReason::HttpStatus(status) => write!(f, "HTTP status {}", status),
        }
    }
}

/// The extractor's verdict whether a page may be indexed, combining status
/// code, robots mode, response header and meta robots directives.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Indexability {
    pub reason: Option<NoindexReason>,
}

impl Indexability {
    pub fn verdict(
        config: &CrawlConfig,
        status: StatusCode,
        robots_disallowed: bool,
        headers: Option<&HeaderMap>,
        meta_robots_noindex: bool,
    ) -> Self {
        let reason = if robots_disallowed {
            Some(NoindexReason::RobotsDisallowed)
        } else if config.respect_noindex && headers.is_some_and(header_noindex) {
            Some(NoindexReason::HeaderNoindex)
        } else if config.respect_meta_robots_noindex && meta_robots_noindex {
            Some(NoindexReason::MetaNoindex)
        } else if !status.is_success() {
            Some(NoindexReason::HttpStatus(status.as_u16()))
        } else {
            None
        };
        Self { reason }
    }

    pub fn is_indexable(&self) -> bool {
        self.reason.is_none()
    }

    /// The stored verdict string, "Yes" or "No: {reason}".
    pub fn render(&self) -> String {
        match self.reason {
            None => "Yes".to_string(),
            Some(reason) => format!("No: {}", reason),
        }
    }
}

/// True when an `X-Robots-Tag` header carries a noindex directive.
pub fn header_noindex(headers: &HeaderMap) -> bool {
    headers
        .get_all("x-robots-tag")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.to_ascii_lowercase().contains("noindex"))
}
