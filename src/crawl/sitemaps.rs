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
use crate::fetching::Client;
use crate::policy::RobotsManager;
use crate::url::NormalizedUrl;
use sitemap::reader::{SiteMapEntity, SiteMapReader};
use std::collections::VecDeque;

/// Bound on how many sitemap documents one discovery pass reads, nested
/// indexes included.
const MAX_SITEMAP_DOCS: usize = 16;

/// Splits one sitemap document into page urls and nested sitemap urls. A
/// document that does not parse yields nothing.
pub fn parse_sitemap(bytes: &[u8]) -> (Vec<NormalizedUrl>, Vec<NormalizedUrl>) {
    let mut urls = Vec::new();
    let mut nested = Vec::new();
    for entity in SiteMapReader::new(bytes) {
        match entity {
            SiteMapEntity::Url(entry) => {
                if let Some(url) = entry.loc.get_url() {
                    if let Ok(url) = NormalizedUrl::parse(url.as_str()) {
                        urls.push(url);
                    }
                }
            }
            SiteMapEntity::SiteMap(entry) => {
                if let Some(url) = entry.loc.get_url() {
                    if let Ok(url) = NormalizedUrl::parse(url.as_str()) {
                        nested.push(url);
                    }
                }
            }
            SiteMapEntity::Err(err) => {
                log::debug!("sitemap parse error: {}", err);
            }
        }
    }
    (urls, nested)
}

/// Collects page urls from the project's sitemaps: the configured override
/// list, or the ones robots.txt advertises, or `/sitemap.xml` as the
/// fallback. Nested sitemap indexes are followed breadth-first.
pub async fn discover_sitemap_urls(
    client: &Client,
    robots: &RobotsManager,
    seed: &NormalizedUrl,
    config: &CrawlConfig,
) -> Vec<NormalizedUrl> {
    let mut roots: Vec<NormalizedUrl> = Vec::new();
    if config.sitemap_urls.is_empty() {
        for raw in robots.sitemaps(client, seed).await {
            if let Ok(url) = NormalizedUrl::parse(&raw) {
                roots.push(url);
            }
        }
        if roots.is_empty() {
            if let Ok(url) = NormalizedUrl::join(seed, "/sitemap.xml") {
                roots.push(url);
            }
        }
    } else {
        for raw in &config.sitemap_urls {
            match NormalizedUrl::parse(raw) {
                Ok(url) => roots.push(url),
                Err(err) => log::warn!("skipping configured sitemap {:?}: {}", raw, err),
            }
        }
    }

    let mut queue: VecDeque<NormalizedUrl> = roots.into();
    let mut urls = Vec::new();
    let mut read = 0usize;
    while let Some(sitemap_url) = queue.pop_front() {
        if read >= MAX_SITEMAP_DOCS {
            log::warn!("sitemap discovery stopped after {} documents", read);
            break;
        }
        read += 1;
        match client.fetch(&sitemap_url).await {
            Ok(response) if response.status.is_success() => {
                let (found, nested) = parse_sitemap(&response.body);
                urls.extend(found);
                queue.extend(nested);
            }
            Ok(response) => {
                log::debug!("sitemap {} answered {}", sitemap_url, response.status);
            }
            Err(err) => {
                log::debug!("failed to fetch sitemap {}: {}", sitemap_url, err);
            }
        }
    }
    urls
}
