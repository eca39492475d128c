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

use crate::fetching::Client;
use crate::url::NormalizedUrl;
use moka::future::Cache;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use texting_robots::{get_robots_url, Robot};

/// The cache entry for one host's robots.txt.
#[derive(Debug)]
pub enum CachedRobots {
    Found { robot: Robot },
    /// No usable robots.txt: missing, erroring or unreachable. Everything
    /// is allowed.
    Missing { status: Option<StatusCode> },
}

impl CachedRobots {
    /// Checks if the url is allowed.
    pub fn allowed(&self, url: &str) -> bool {
        match self {
            CachedRobots::Found { robot } => robot.allowed(url),
            CachedRobots::Missing { .. } => true,
        }
    }

    /// Returns the sitemaps, if there are any.
    pub fn sitemaps(&self) -> &[String] {
        match self {
            CachedRobots::Found { robot } => &robot.sitemaps,
            CachedRobots::Missing { .. } => &[],
        }
    }

    /// Returns the crawl delay, if one is configured.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            CachedRobots::Found { robot } => {
                robot.delay.map(|seconds| Duration::from_secs_f32(seconds))
            }
            CachedRobots::Missing { .. } => None,
        }
    }
}

/// Fetches and caches robots.txt once per host per session, threadsafe.
#[derive(Debug)]
pub struct RobotsManager {
    agent: String,
    cache: Cache<String, Arc<CachedRobots>>,
}

impl RobotsManager {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            cache: Cache::new(256),
        }
    }

    /// The cached robots.txt for the url's host, fetching it on first use.
    pub async fn get(&self, client: &Client, url: &NormalizedUrl) -> Arc<CachedRobots> {
        let key = url.host().to_string();
        self.cache
            .get_with(key, async { Arc::new(self.retrieve(client, url).await) })
            .await
    }

    /// Sitemap urls advertised by the host's robots.txt.
    pub async fn sitemaps(&self, client: &Client, url: &NormalizedUrl) -> Vec<String> {
        self.get(client, url).await.sitemaps().to_vec()
    }

    async fn retrieve(&self, client: &Client, url: &NormalizedUrl) -> CachedRobots {
        let robots_url = match get_robots_url(url.as_str()) {
            Ok(robots_url) => robots_url,
            Err(err) => {
                log::debug!("no robots url for {}: {}", url, err);
                return CachedRobots::Missing { status: None };
            }
        };
        let robots_url = match NormalizedUrl::parse(&robots_url) {
            Ok(robots_url) => robots_url,
            Err(err) => {
                log::debug!("unparsable robots url for {}: {}", url, err);
                return CachedRobots::Missing { status: None };
            }
        };

        match client.fetch(&robots_url).await {
            Ok(response) if response.status.is_success() => {
                match Robot::new(&self.agent, &response.body) {
                    Ok(robot) => CachedRobots::Found { robot },
                    Err(err) => {
                        log::debug!("unparsable robots.txt on {}: {}", url.host(), err);
                        CachedRobots::Missing {
                            status: Some(response.status),
                        }
                    }
                }
            }
            Ok(response) => CachedRobots::Missing {
                status: Some(response.status),
            },
            Err(err) => {
                log::debug!("failed to fetch robots.txt for {}: {}", url.host(), err);
                CachedRobots::Missing { status: None }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const ROBOTS: &[u8] = b"User-agent: *\n\
        Crawl-delay: 2\n\
        Disallow: /private/\n\
        Allow: /private/public.html\n\
        Sitemap: https://example.com/sitemap.xml\n";

    fn cached() -> CachedRobots {
        CachedRobots::Found {
            robot: Robot::new("bluesnake", ROBOTS).unwrap(),
        }
    }

    #[test]
    fn disallow_rules_apply() {
        let robots = cached();
        assert!(!robots.allowed("https://example.com/private/secret.html"));
        assert!(robots.allowed("https://example.com/private/public.html"));
        assert!(robots.allowed("https://example.com/open/"));
    }

    #[test]
    fn sitemaps_and_delay_are_exposed() {
        let robots = cached();
        assert_eq!(["https://example.com/sitemap.xml"], robots.sitemaps());
        assert_eq!(Some(Duration::from_secs(2)), robots.delay());
    }

    #[test]
    fn a_missing_robots_txt_allows_everything() {
        let robots = CachedRobots::Missing {
            status: Some(StatusCode::NOT_FOUND),
        };
        assert!(robots.allowed("https://example.com/private/secret.html"));
        assert!(robots.sitemaps().is_empty());
        assert_eq!(None, robots.delay());
    }
}
