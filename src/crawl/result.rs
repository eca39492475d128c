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

use crate::extraction::{MimeCategory, PageExtract};
use crate::fetching::{FetchFailure, FetchedResponse, RedirectHop};
use crate::policy::Indexability;
use crate::stores::DiscoveredUrlRecord;
use crate::url::NormalizedUrl;

/// Row for a fully processed html page.
pub fn page_record(
    response: &FetchedResponse,
    extract: &PageExtract,
    indexability: &Indexability,
    depth: i64,
) -> DiscoveredUrlRecord {
    DiscoveredUrlRecord {
        url: response.url.as_str().to_string(),
        url_hash: response.url.hash(),
        visited: true,
        status: response.status.as_u16() as i64,
        title: extract.title.clone(),
        meta_description: extract.meta_description.clone(),
        h1: extract.h1.clone(),
        h2: extract.h2.clone(),
        canonical_url: extract
            .canonical_url
            .as_ref()
            .map(|url| url.as_str().to_string()),
        word_count: Some(extract.word_count as i64),
        content_hash: Some(extract.content_hash),
        indexable: Some(indexability.render()),
        content_type: response.content_type().map(str::to_string),
        mime_category: Some(MimeCategory::Html.to_string()),
        error: None,
        depth,
    }
}

/// Row for a non-html response (or an off-host asset check).
pub fn resource_record(
    response: &FetchedResponse,
    indexability: &Indexability,
    depth: i64,
) -> DiscoveredUrlRecord {
    DiscoveredUrlRecord {
        url: response.url.as_str().to_string(),
        url_hash: response.url.hash(),
        visited: true,
        status: response.status.as_u16() as i64,
        indexable: Some(indexability.render()),
        content_type: response.content_type().map(str::to_string),
        mime_category: Some(response.mime_category().to_string()),
        depth,
        ..Default::default()
    }
}

/// Row for one observed redirect intermediate. It carries the hop's actual
/// status and the MIME category of the chain's final destination.
pub fn hop_record(
    hop: &RedirectHop,
    final_category: MimeCategory,
    depth: i64,
) -> DiscoveredUrlRecord {
    DiscoveredUrlRecord {
        url: hop.url.as_str().to_string(),
        url_hash: hop.url.hash(),
        visited: true,
        status: hop.status.as_u16() as i64,
        mime_category: Some(final_category.to_string()),
        depth,
        ..Default::default()
    }
}

/// Row for a url whose fetch produced no response: status 0 plus the error
/// string, queryable on the row.
pub fn failure_record(
    url: &NormalizedUrl,
    failure: &FetchFailure,
    depth: i64,
) -> DiscoveredUrlRecord {
    DiscoveredUrlRecord {
        url: url.as_str().to_string(),
        url_hash: url.hash(),
        visited: true,
        status: 0,
        error: Some(failure.message.clone()),
        depth,
        ..Default::default()
    }
}
