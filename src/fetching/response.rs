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

use crate::extraction::MimeCategory;
use crate::url::NormalizedUrl;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use smallvec::SmallVec;
use std::borrow::Cow;
use thiserror::Error;

/// Chains are short in practice, one or two hops inline.
pub type RedirectChain = SmallVec<[RedirectHop; 2]>;

/// One observed redirect intermediate: the url that answered and the status
/// it answered with.
#[derive(Debug, Clone)]
pub struct RedirectHop {
    pub url: NormalizedUrl,
    pub status: StatusCode,
}

/// The final response of a fetch plus the ordered redirect chain that led
/// to it.
#[derive(Debug)]
pub struct FetchedResponse {
    /// The final destination after any redirects.
    pub url: NormalizedUrl,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Redirect intermediates in chain order, empty for a direct answer.
    pub hops: RedirectChain,
}

impl FetchedResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok())
    }

    pub fn mime_category(&self) -> MimeCategory {
        MimeCategory::from_content_type(self.content_type())
    }

    pub fn is_html(&self) -> bool {
        self.mime_category().is_html()
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Why a fetch produced no final response. Recorded on the url with a
/// synthetic status of 0. Hops observed before the failure are preserved.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FetchErrorKind {
    /// DNS, TCP, TLS or protocol level failure.
    Transport,
    /// The whole-chain wall clock budget ran out.
    Timeout,
    /// The redirect chain exceeded the hop cap.
    TooManyRedirects,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct FetchFailure {
    pub kind: FetchErrorKind,
    pub message: String,
    pub hops: RedirectChain,
}

impl FetchFailure {
    pub fn timeout(secs: u64) -> Self {
        Self {
            kind: FetchErrorKind::Timeout,
            message: format!("timed out after {}s", secs),
            hops: RedirectChain::new(),
        }
    }

    pub fn transport(message: impl Into<String>, hops: RedirectChain) -> Self {
        Self {
            kind: FetchErrorKind::Transport,
            message: message.into(),
            hops,
        }
    }

    pub fn too_many_redirects(hops: RedirectChain) -> Self {
        Self {
            kind: FetchErrorKind::TooManyRedirects,
            message: "too many redirects".to_string(),
            hops,
        }
    }
}
