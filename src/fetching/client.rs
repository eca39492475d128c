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
use crate::fetching::{FetchFailure, FetchedResponse, RedirectChain, RedirectHop};
use crate::url::NormalizedUrl;
use reqwest::header::{HeaderValue, AUTHORIZATION, LOCATION, REFERER};
use reqwest::{Method, StatusCode};
use std::time::Duration;

/// Hard cap on the length of a redirect chain.
pub const MAX_REDIRECT_HOPS: usize = 10;

/// The engine HTTP client. Automatic redirect following is disabled so that
/// every hop is observed, the chain is driven explicitly by [Client::fetch].
#[derive(Debug, Clone)]
pub struct Client {
    inner: reqwest::Client,
    timeout: Duration,
    timeout_secs: u64,
    authorization: Option<HeaderValue>,
}

impl Client {
    pub fn new(config: &CrawlConfig) -> Result<Self, reqwest::Error> {
        Self::with_authorization(config, None)
    }

    pub fn with_authorization(
        config: &CrawlConfig,
        authorization: Option<HeaderValue>,
    ) -> Result<Self, reqwest::Error> {
        let inner = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .cookie_store(true)
            .tcp_keepalive(Duration::from_millis(500))
            .pool_idle_timeout(None)
            .build()?;
        Ok(Self {
            inner,
            timeout: Duration::from_secs(config.response_timeout_secs),
            timeout_secs: config.response_timeout_secs,
            authorization,
        })
    }

    /// GET with the complete redirect chain captured. The timeout is a wall
    /// clock over the whole chain.
    pub async fn fetch(&self, url: &NormalizedUrl) -> Result<FetchedResponse, FetchFailure> {
        self.run(url, Method::GET, true).await
    }

    /// HEAD, used for off-host resource checks.
    pub async fn head(&self, url: &NormalizedUrl) -> Result<FetchedResponse, FetchFailure> {
        self.run(url, Method::HEAD, false).await
    }

    async fn run(
        &self,
        url: &NormalizedUrl,
        method: Method,
        read_body: bool,
    ) -> Result<FetchedResponse, FetchFailure> {
        match tokio::time::timeout(self.timeout, self.drive(url, method, read_body)).await {
            Ok(result) => result,
            Err(_) => Err(FetchFailure::timeout(self.timeout_secs)),
        }
    }

    async fn drive(
        &self,
        url: &NormalizedUrl,
        mut method: Method,
        read_body: bool,
    ) -> Result<FetchedResponse, FetchFailure> {
        let mut hops = RedirectChain::new();
        let mut current = url.clone();
        let mut referer: Option<String> = None;
        let mut authorization = self.authorization.clone();

        loop {
            let mut request = self.inner.request(method.clone(), current.as_str());
            if let Some(ref referer) = referer {
                request = request.header(REFERER, referer.as_str());
            }
            if let Some(ref auth) = authorization {
                request = request.header(AUTHORIZATION, auth.clone());
            }
            let response = request
                .send()
                .await
                .map_err(|err| FetchFailure::transport(err.to_string(), hops.clone()))?;
            let status = response.status();

            let location = if is_redirect(status) {
                response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            } else {
                None
            };

            let Some(location) = location else {
                // The final answer of the chain. A redirect status without a
                // Location header also lands here and is recorded as-is.
                let headers = response.headers().clone();
                let body = if read_body {
                    response
                        .bytes()
                        .await
                        .map_err(|err| FetchFailure::transport(err.to_string(), hops.clone()))?
                        .to_vec()
                } else {
                    Vec::new()
                };
                return Ok(FetchedResponse {
                    url: current,
                    status,
                    headers,
                    body,
                    hops,
                });
            };

            let next = NormalizedUrl::join(&current, &location).map_err(|err| {
                FetchFailure::transport(
                    format!("invalid redirect location {:?}: {}", location, err),
                    hops.clone(),
                )
            })?;

            hops.push(RedirectHop {
                url: current.clone(),
                status,
            });
            if hops.len() >= MAX_REDIRECT_HOPS {
                return Err(FetchFailure::too_many_redirects(hops));
            }

            method = next_method(status, &method);
            if !same_host(&current, &next) {
                authorization = None;
            }
            referer = Some(current.as_str().to_string());
            current = next;
        }
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// 301/302/303 downgrade any method to GET (and drop the body), 307/308
/// preserve it.
pub fn next_method(status: StatusCode, current: &Method) -> Method {
    match status.as_u16() {
        301 | 302 | 303 => Method::GET,
        _ => current.clone(),
    }
}

/// Authorization never crosses a host boundary.
pub fn same_host(previous: &NormalizedUrl, next: &NormalizedUrl) -> bool {
    previous.host() == next.host()
}

#[cfg(test)]
mod test {
    use super::*;

    fn url(raw: &str) -> NormalizedUrl {
        NormalizedUrl::parse(raw).unwrap()
    }

    #[test]
    fn redirect_statuses_downgrade_or_preserve_the_method() {
        for status in [301, 302, 303] {
            let status = StatusCode::from_u16(status).unwrap();
            assert_eq!(Method::GET, next_method(status, &Method::POST));
            assert_eq!(Method::GET, next_method(status, &Method::HEAD));
        }
        for status in [307, 308] {
            let status = StatusCode::from_u16(status).unwrap();
            assert_eq!(Method::POST, next_method(status, &Method::POST));
            assert_eq!(Method::HEAD, next_method(status, &Method::HEAD));
        }
    }

    #[test]
    fn only_the_five_redirect_codes_are_followed() {
        for followed in [301, 302, 303, 307, 308] {
            assert!(is_redirect(StatusCode::from_u16(followed).unwrap()));
        }
        for terminal in [200, 204, 300, 304, 404, 500] {
            assert!(!is_redirect(StatusCode::from_u16(terminal).unwrap()));
        }
    }

    #[test]
    fn authorization_is_scoped_to_the_host() {
        assert!(same_host(&url("https://x.com/a"), &url("http://x.com/b")));
        assert!(!same_host(&url("https://x.com/a"), &url("https://sub.x.com/b")));
        assert!(!same_host(&url("https://x.com/a"), &url("https://x.com:8443/b")));
    }
}
