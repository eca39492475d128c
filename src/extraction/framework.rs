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

use reqwest::header::HeaderMap;
use scraper::{Html, Selector};
use std::sync::LazyLock as Lazy;

static GENERATOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="generator" i]"#).expect("static selector"));
static NEXT_ROOT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#__next").expect("static selector"));
static DRUPAL_SETTINGS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[data-drupal-selector]").expect("static selector"));
static WP_ASSET: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"link[href*="wp-content"], script[src*="wp-content"]"#)
        .expect("static selector")
});

const GENERATOR_TAGS: [(&str, &str); 8] = [
    ("wordpress", "wordpress"),
    ("drupal", "drupal"),
    ("joomla", "joomla"),
    ("shopify", "shopify"),
    ("wix", "wix"),
    ("squarespace", "squarespace"),
    ("hugo", "hugo"),
    ("jekyll", "jekyll"),
];

/// Best-effort framework tag from the document alone.
pub fn detect_in_document(doc: &Html) -> Option<&'static str> {
    if let Some(content) = doc
        .select(&GENERATOR)
        .next()
        .and_then(|el| el.attr("content"))
    {
        let content = content.to_ascii_lowercase();
        for (needle, tag) in GENERATOR_TAGS {
            if content.contains(needle) {
                return Some(tag);
            }
        }
    }
    if doc.select(&NEXT_ROOT).next().is_some() {
        return Some("nextjs");
    }
    if doc.select(&DRUPAL_SETTINGS).next().is_some() {
        return Some("drupal");
    }
    if doc.select(&WP_ASSET).next().is_some() {
        return Some("wordpress");
    }
    None
}

/// Framework tag from response headers, used when the markup is silent.
pub fn detect_in_headers(headers: &HeaderMap) -> Option<&'static str> {
    let powered_by = headers
        .get("x-powered-by")
        .and_then(|value| value.to_str().ok())?
        .to_ascii_lowercase();
    if powered_by.contains("next.js") {
        Some("nextjs")
    } else if powered_by.contains("express") {
        Some("express")
    } else if powered_by.contains("wordpress") {
        Some("wordpress")
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn detect(html: &str) -> Option<&'static str> {
        detect_in_document(&Html::parse_document(html))
    }

    #[test]
    fn generator_meta_wins() {
        assert_eq!(
            Some("wordpress"),
            detect(r#"<html><head><meta name="generator" content="WordPress 6.4"></head></html>"#)
        );
        assert_eq!(
            Some("hugo"),
            detect(r#"<html><head><meta name="Generator" content="Hugo 0.120"></head></html>"#)
        );
    }

    #[test]
    fn markup_markers_are_recognized() {
        assert_eq!(
            Some("nextjs"),
            detect(r#"<html><body><div id="__next"></div></body></html>"#)
        );
        assert_eq!(
            Some("wordpress"),
            detect(r#"<html><head><link rel="stylesheet" href="/wp-content/themes/x.css"></head></html>"#)
        );
        assert_eq!(None, detect("<html><body><p>plain</p></body></html>"));
    }

    #[test]
    fn powered_by_header_is_a_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-powered-by", "Next.js".parse().unwrap());
        assert_eq!(Some("nextjs"), detect_in_headers(&headers));
        assert_eq!(None, detect_in_headers(&HeaderMap::new()));
    }
}
