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
use crate::policy::RobotsManager;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Everything per-host lives behind this registry: the robots cache and the
/// concurrency permits. The fetch path asks the registry, never a parallel
/// map.
#[derive(Debug)]
pub struct HostRegistry {
    robots: RobotsManager,
    shared_limit: u32,
    host_limits: HashMap<String, u32>,
    permits: Mutex<HashMap<String, Arc<Semaphore>>>,
    last_fetch: Mutex<HashMap<String, Instant>>,
}

/// Held for the duration of one fetch against a host.
#[derive(Debug)]
pub struct HostPermit {
    _permit: OwnedSemaphorePermit,
}

impl HostRegistry {
    pub fn new(config: &CrawlConfig, robots: RobotsManager) -> Self {
        Self {
            robots,
            shared_limit: config.parallelism_for_host("*"),
            host_limits: config
                .host_parallelism
                .iter()
                .filter(|(host, _)| host.as_str() != "*")
                .map(|(host, limit)| {
                    (host.clone(), (*limit).min(config.parallelism_for_host("*")).max(1))
                })
                .collect(),
            permits: Mutex::new(HashMap::new()),
            last_fetch: Mutex::new(HashMap::new()),
        }
    }

    pub fn robots(&self) -> &RobotsManager {
        &self.robots
    }

    fn semaphore(&self, host: &str) -> Arc<Semaphore> {
        let limit = self
            .host_limits
            .get(host)
            .copied()
            .unwrap_or(self.shared_limit);
        self.permits
            .lock()
            .unwrap()
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(limit as usize)))
            .clone()
    }

    /// Waits for a fetch slot on the host.
    pub async fn acquire(&self, host: &str) -> HostPermit {
        let permit = self
            .semaphore(host)
            .acquire_owned()
            .await
            .expect("host semaphore never closes");
        HostPermit { _permit: permit }
    }

    /// Honors a robots crawl-delay by spacing requests against the host.
    pub async fn wait_politeness(&self, host: &str, delay: Option<Duration>) {
        if let Some(delay) = delay {
            let wait = {
                let map = self.last_fetch.lock().unwrap();
                match map.get(host) {
                    Some(last) => (*last + delay).saturating_duration_since(Instant::now()),
                    None => Duration::ZERO,
                }
            };
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
        self.last_fetch
            .lock()
            .unwrap()
            .insert(host.to_string(), Instant::now());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    fn registry(per_host: &[(&str, u32)]) -> HostRegistry {
        let mut config = CrawlConfig::default();
        for (host, limit) in per_host {
            config.host_parallelism.insert(host.to_string(), *limit);
        }
        HostRegistry::new(&config, RobotsManager::new("bluesnake-test"))
    }

    #[tokio::test]
    async fn host_rules_bound_concurrency() {
        let registry = registry(&[("slow.example.com", 1)]);

        let held = registry.acquire("slow.example.com").await;
        let second = tokio::time::timeout(
            Duration::from_millis(20),
            registry.acquire("slow.example.com"),
        )
        .await;
        assert!(second.is_err(), "second permit should block");

        drop(held);
        let third = tokio::time::timeout(
            Duration::from_millis(20),
            registry.acquire("slow.example.com"),
        )
        .await;
        assert!(third.is_ok(), "released permit should be reusable");
    }

    #[tokio::test]
    async fn other_hosts_use_the_shared_pool() {
        let registry = registry(&[("slow.example.com", 1)]);
        let _a = registry.acquire("fast.example.com").await;
        let _b = registry.acquire("fast.example.com").await;
    }

    #[tokio::test(start_paused = true)]
    async fn politeness_delay_spaces_requests() {
        let registry = registry(&[]);
        let delay = Some(Duration::from_secs(2));

        let start = Instant::now();
        registry.wait_politeness("example.com", delay).await;
        assert!(start.elapsed() < Duration::from_millis(10));

        registry.wait_politeness("example.com", delay).await;
        assert!(start.elapsed() >= Duration::from_secs(2));

        // another host is not spaced against this one
        let other = Instant::now();
        registry.wait_politeness("other.example.com", delay).await;
        assert!(other.elapsed() < Duration::from_millis(10));
    }
}
