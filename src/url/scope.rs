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

use crate::url::NormalizedUrl;

/// The host boundary of a crawl. Cross-scheme (http/https) is always
/// admitted for the same host, the scheme is never part of the scope.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HostScope {
    host: String,
    hostname: String,
    include_subdomains: bool,
}

impl HostScope {
    pub fn from_seed(seed: &NormalizedUrl, include_subdomains: bool) -> Self {
        Self {
            host: seed.host().to_string(),
            hostname: seed.hostname().to_string(),
            include_subdomains,
        }
    }

    /// The host the scope was seeded with.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether the url may be crawled under this scope.
    pub fn admits(&self, url: &NormalizedUrl) -> bool {
        if url.host() == self.host {
            return true;
        }
        self.include_subdomains
            && url
                .hostname()
                .strip_suffix(&self.hostname)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn url(raw: &str) -> NormalizedUrl {
        NormalizedUrl::parse(raw).unwrap()
    }

    #[test]
    fn same_host_any_scheme_is_admitted() {
        let scope = HostScope::from_seed(&url("https://x.com"), false);
        assert!(scope.admits(&url("https://x.com/p")));
        assert!(scope.admits(&url("http://x.com/p")));
    }

    #[test]
    fn subdomains_follow_the_config() {
        let strict = HostScope::from_seed(&url("https://x.com"), false);
        assert!(!strict.admits(&url("https://sub.x.com/p")));

        let wide = HostScope::from_seed(&url("https://x.com"), true);
        assert!(wide.admits(&url("https://sub.x.com/p")));
        assert!(wide.admits(&url("https://a.b.x.com/p")));
        assert!(wide.admits(&url("https://x.com/p")));
    }

    #[test]
    fn suffix_matches_must_be_real_subdomains() {
        let wide = HostScope::from_seed(&url("https://x.com"), true);
        assert!(!wide.admits(&url("https://notx.com/p")));
        assert!(!wide.admits(&url("https://y.com/p")));
    }

    #[test]
    fn non_default_port_is_part_of_the_host() {
        let scope = HostScope::from_seed(&url("https://x.com:8443"), false);
        assert!(scope.admits(&url("https://x.com:8443/p")));
        assert!(!scope.admits(&url("https://x.com/p")));
    }
}
