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
use std::collections::{BTreeSet, HashMap};
use strum::{Display, EnumString};
use thiserror::Error;

pub const DEFAULT_USER_AGENT: &str = "bluesnake/1.0 (+https://snake.blue)";
pub const MAX_PARALLELISM: u32 = 64;

/// The per-project crawling settings. Persisted as JSON with the project,
/// created lazily with defaults on first use.
#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct CrawlConfig {
    /// Route HTML responses through a headless browser. (default: false)
    pub js_rendering_enabled: bool,
    /// Wait after navigation before reading the page, in milliseconds.
    pub initial_wait_ms: u64,
    /// Wait after scrolling to the bottom, in milliseconds.
    pub scroll_wait_ms: u64,
    /// Final settle wait before capturing the DOM, in milliseconds.
    pub final_wait_ms: u64,
    /// Worker count shared across all hosts. (1..=64, default: 5)
    pub parallelism: u32,
    /// Wall clock budget for a request including its redirect chain, in
    /// seconds. (default: 20)
    pub response_timeout_secs: u64,
    /// The user agent used by the crawler.
    pub user_agent: String,
    /// Widen the host scope from the seed host to all of its subdomains.
    /// (default: false)
    pub include_subdomains: bool,
    /// Seed sources used in addition to the initial url.
    pub discovery_mechanisms: BTreeSet<DiscoveryMechanism>,
    /// Overrides sitemap discovery, empty means "discover automatically".
    pub sitemap_urls: Vec<String>,
    /// Issue a HEAD request for off-host assets and record the outcome.
    /// (default: true)
    pub check_external_resources: bool,
    /// How robots.txt directives are treated. (default: respect)
    pub robots_txt_mode: RobotsTxtMode,
    /// Enqueue internal links carrying a nofollow rel. (default: false)
    pub follow_internal_nofollow: bool,
    /// Check external links carrying a nofollow rel. (default: false)
    pub follow_external_nofollow: bool,
    /// An `X-Robots-Tag: noindex` response marks the url non-indexable.
    /// (default: true)
    pub respect_noindex: bool,
    /// A `<meta name=robots content=..noindex..>` marks the url
    /// non-indexable. (default: true)
    pub respect_meta_robots_noindex: bool,
    /// Group sessions of one logical crawl into a run. (default: false)
    pub incremental_crawling_enabled: bool,
    /// Pause the session after this many fetches, 0 means unlimited.
    pub crawl_budget: u64,
    /// Stricter per-host worker limits, keyed by host. The glob rule `*`
    /// stands for the shared pool and defaults to [Self::parallelism].
    /// Engine-level tuning, not part of the adapter patch surface.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub host_parallelism: HashMap<String, u32>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            js_rendering_enabled: false,
            initial_wait_ms: 1500,
            scroll_wait_ms: 2000,
            final_wait_ms: 1000,
            parallelism: 5,
            response_timeout_secs: 20,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            include_subdomains: false,
            discovery_mechanisms: BTreeSet::from([
                DiscoveryMechanism::Spider,
                DiscoveryMechanism::Sitemap,
            ]),
            sitemap_urls: Vec::new(),
            check_external_resources: true,
            robots_txt_mode: RobotsTxtMode::default(),
            follow_internal_nofollow: false,
            follow_external_nofollow: false,
            respect_noindex: true,
            respect_meta_robots_noindex: true,
            incremental_crawling_enabled: false,
            crawl_budget: 0,
            host_parallelism: HashMap::new(),
        }
    }
}

impl CrawlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallelism == 0 || self.parallelism > MAX_PARALLELISM {
            return Err(ConfigError::ParallelismOutOfRange(self.parallelism));
        }
        Ok(())
    }

    /// The worker limit for a host: the strictest of the shared pool and a
    /// matching per-host rule.
    pub fn parallelism_for_host(&self, host: &str) -> u32 {
        let shared = self
            .host_parallelism
            .get("*")
            .copied()
            .unwrap_or(self.parallelism);
        match self.host_parallelism.get(host) {
            Some(limit) => shared.min(*limit).max(1),
            None => shared.max(1),
        }
    }

    pub fn spider_enabled(&self) -> bool {
        self.discovery_mechanisms.contains(&DiscoveryMechanism::Spider)
    }

    pub fn sitemap_enabled(&self) -> bool {
        self.discovery_mechanisms.contains(&DiscoveryMechanism::Sitemap)
    }
}

/// How robots.txt directives are treated, see the policy layer.
#[derive(
    Debug, Default, Copy, Clone, Deserialize, Serialize, Eq, PartialEq, Display, EnumString,
)]
pub enum RobotsTxtMode {
    /// Disallowed urls are not fetched and not recorded.
    #[default]
    #[serde(rename = "respect")]
    #[strum(serialize = "respect", ascii_case_insensitive)]
    Respect,
    /// Disallowed urls are fetched and recorded as normal.
    #[serde(rename = "ignore")]
    #[strum(serialize = "ignore", ascii_case_insensitive)]
    Ignore,
    /// Disallowed urls are fetched and recorded, flagged non-indexable.
    #[serde(rename = "ignore-report")]
    #[strum(serialize = "ignore-report", ascii_case_insensitive)]
    IgnoreReport,
}

/// A seed source beyond the initial url.
#[derive(
    Debug,
    Copy,
    Clone,
    Deserialize,
    Serialize,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMechanism {
    #[strum(serialize = "spider", ascii_case_insensitive)]
    Spider,
    #[strum(serialize = "sitemap", ascii_case_insensitive)]
    Sitemap,
}

/// A partial update of a [CrawlConfig] as accepted by
/// `UpdateConfigForDomain`. Only the published keys are recognized, any
/// other key fails deserialization.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CrawlConfigPatch {
    pub js_rendering_enabled: Option<bool>,
    pub initial_wait_ms: Option<u64>,
    pub scroll_wait_ms: Option<u64>,
    pub final_wait_ms: Option<u64>,
    pub parallelism: Option<u32>,
    pub response_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub include_subdomains: Option<bool>,
    pub discovery_mechanisms: Option<BTreeSet<DiscoveryMechanism>>,
    pub sitemap_urls: Option<Vec<String>>,
    pub check_external_resources: Option<bool>,
    pub robots_txt_mode: Option<RobotsTxtMode>,
    pub follow_internal_nofollow: Option<bool>,
    pub follow_external_nofollow: Option<bool>,
    pub respect_noindex: Option<bool>,
    pub respect_meta_robots_noindex: Option<bool>,
    pub incremental_crawling_enabled: Option<bool>,
    pub crawl_budget: Option<u64>,
}

macro_rules! apply_fields {
    ($patch:ident => $config:ident : [$($field:ident),* $(,)?]) => {
        $(
            if let Some(value) = $patch.$field {
                $config.$field = value;
            }
        )*
    };
}

impl CrawlConfigPatch {
    /// Applies the patch and validates the merged result.
    pub fn apply_to(self, config: &mut CrawlConfig) -> Result<(), ConfigError> {
        let patch = self;
        apply_fields!(patch => config: [
            js_rendering_enabled,
            initial_wait_ms,
            scroll_wait_ms,
            final_wait_ms,
            parallelism,
            response_timeout_secs,
            user_agent,
            include_subdomains,
            discovery_mechanisms,
            sitemap_urls,
            check_external_resources,
            robots_txt_mode,
            follow_internal_nofollow,
            follow_external_nofollow,
            respect_noindex,
            respect_meta_robots_noindex,
            incremental_crawling_enabled,
            crawl_budget,
        ]);
        config.validate()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parallelism must be in 1..=64, got {0}")]
    ParallelismOutOfRange(u32),
    #[error("unrecognized config option: {0}")]
    UnrecognizedOption(#[from] serde_json::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_the_published_table() {
        let config = CrawlConfig::default();
        assert!(!config.js_rendering_enabled);
        assert_eq!(1500, config.initial_wait_ms);
        assert_eq!(2000, config.scroll_wait_ms);
        assert_eq!(1000, config.final_wait_ms);
        assert_eq!(5, config.parallelism);
        assert_eq!(20, config.response_timeout_secs);
        assert_eq!(DEFAULT_USER_AGENT, config.user_agent);
        assert!(!config.include_subdomains);
        assert!(config.spider_enabled() && config.sitemap_enabled());
        assert!(config.check_external_resources);
        assert_eq!(RobotsTxtMode::Respect, config.robots_txt_mode);
        assert!(config.respect_noindex && config.respect_meta_robots_noindex);
        assert!(!config.follow_internal_nofollow && !config.follow_external_nofollow);
        assert!(!config.incremental_crawling_enabled);
        assert_eq!(0, config.crawl_budget);
        config.validate().unwrap();
    }

    #[test]
    fn config_round_trips_with_published_key_names() {
        let json = serde_json::to_value(CrawlConfig::default()).unwrap();
        assert!(json.get("jsRenderingEnabled").is_some());
        assert!(json.get("robotsTxtMode").is_some());
        assert_eq!("respect", json["robotsTxtMode"]);
        let back: CrawlConfig = serde_json::from_value(json).unwrap();
        assert_eq!(CrawlConfig::default(), back);
    }

    #[test]
    fn patch_applies_known_keys() {
        let patch: CrawlConfigPatch = serde_json::from_value(serde_json::json!({
            "crawlBudget": 3,
            "robotsTxtMode": "ignore-report",
            "includeSubdomains": true,
        }))
        .unwrap();
        let mut config = CrawlConfig::default();
        patch.apply_to(&mut config).unwrap();
        assert_eq!(3, config.crawl_budget);
        assert_eq!(RobotsTxtMode::IgnoreReport, config.robots_txt_mode);
        assert!(config.include_subdomains);
        // untouched knobs keep their defaults
        assert_eq!(5, config.parallelism);
    }

    #[test]
    fn patch_rejects_unknown_keys() {
        let result: Result<CrawlConfigPatch, _> =
            serde_json::from_value(serde_json::json!({ "maxDepth": 5 }));
        assert!(result.is_err());
    }

    #[test]
    fn patch_rejects_out_of_range_parallelism() {
        let patch: CrawlConfigPatch =
            serde_json::from_value(serde_json::json!({ "parallelism": 65 })).unwrap();
        let mut config = CrawlConfig::default();
        assert!(matches!(
            patch.apply_to(&mut config),
            Err(ConfigError::ParallelismOutOfRange(65))
        ));
    }

    #[test]
    fn host_rules_tighten_the_shared_pool() {
        let mut config = CrawlConfig::default();
        config.host_parallelism.insert("slow.example.com".into(), 1);
        assert_eq!(1, config.parallelism_for_host("slow.example.com"));
        assert_eq!(5, config.parallelism_for_host("fast.example.com"));
    }
}
