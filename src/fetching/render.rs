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
use crate::url::NormalizedUrl;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch the browser: {0}")]
    Launch(String),
    #[error(transparent)]
    Cdp(#[from] chromiumoxide::error::CdpError),
}

/// The wait sequence of a render pass.
#[derive(Debug, Copy, Clone)]
pub struct RenderWaits {
    pub initial: Duration,
    pub scroll: Duration,
    pub settle: Duration,
}

impl From<&CrawlConfig> for RenderWaits {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_wait_ms),
            scroll: Duration::from_millis(config.scroll_wait_ms),
            settle: Duration::from_millis(config.final_wait_ms),
        }
    }
}

/// A headless browser for JavaScript rendering. HTML responses only,
/// resources are never routed through here.
pub struct Renderer {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl Renderer {
    pub async fn launch() -> Result<Self, RenderError> {
        let config = BrowserConfig::builder()
            .build()
            .map_err(RenderError::Launch)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(RenderError::from)?;
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });
        Ok(Self { browser, handler })
    }

    /// navigate, wait, scroll to the bottom, wait, settle, capture the
    /// serialized DOM.
    pub async fn render(
        &self,
        url: &NormalizedUrl,
        waits: RenderWaits,
    ) -> Result<String, RenderError> {
        let page = self.browser.new_page(url.as_str()).await?;
        tokio::time::sleep(waits.initial).await;
        page.evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await?;
        tokio::time::sleep(waits.scroll).await;
        tokio::time::sleep(waits.settle).await;
        let content = page.content().await?;
        let _ = page.close().await;
        Ok(content)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
