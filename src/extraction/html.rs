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

use crate::extraction::framework::detect_in_document;
use crate::extraction::{rel_follows, ExtractedLink, LinkKind, LinkPosition, PathType};
use crate::url::NormalizedUrl;
use scraper::{ElementRef, Html};
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Everything the extractor reads off one HTML response.
#[derive(Debug, Clone)]
pub struct PageExtract {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1: Option<String>,
    pub h2: Option<String>,
    pub canonical_url: Option<NormalizedUrl>,
    /// Words of visible text, boilerplate regions removed.
    pub word_count: u64,
    /// Stable hash of the normalized visible text, for near-duplicate
    /// detection.
    pub content_hash: i64,
    /// A robots meta tag asked for noindex.
    pub meta_robots_noindex: bool,
    pub links: Vec<ExtractedLink>,
    pub framework_hint: Option<&'static str>,
}

/// Parses an HTML document and extracts metadata and the outbound link set.
/// A broken document falls back to whatever the parser recovered, never to
/// an error.
pub fn extract_page(base: &NormalizedUrl, html: &str) -> PageExtract {
    let doc = Html::parse_document(html);

    // <base href> wins over the response url for reference resolution.
    let base = doc
        .select(&selectors::BASE)
        .next()
        .and_then(|el| el.attr("href"))
        .and_then(|href| NormalizedUrl::join(base, href).ok())
        .unwrap_or_else(|| base.clone());

    let title = first_text(&doc, &selectors::TITLE);
    let h1 = first_text(&doc, &selectors::H1);
    let h2 = first_text(&doc, &selectors::H2);
    let meta_description = doc
        .select(&selectors::META_DESCRIPTION)
        .next()
        .and_then(|el| el.attr("content"))
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(str::to_string);
    let canonical_url = doc
        .select(&selectors::CANONICAL)
        .next()
        .and_then(|el| el.attr("href"))
        .and_then(|href| NormalizedUrl::join(&base, href).ok());
    let meta_robots_noindex = doc
        .select(&selectors::META_ROBOTS)
        .filter_map(|el| el.attr("content"))
        .any(|content| content.to_ascii_lowercase().contains("noindex"));

    let visible = visible_text(&doc);
    let word_count = visible.split_whitespace().count() as u64;
    let content_hash = hash_words(&visible);

    let mut links = Vec::new();
    for element in doc.select(&selectors::ANCHOR) {
        push_link(&mut links, &base, element, LinkKind::Anchor, "href");
    }
    for element in doc.select(&selectors::IMG) {
        push_link(&mut links, &base, element, LinkKind::Image, "src");
    }
    for element in doc.select(&selectors::SCRIPT) {
        push_link(&mut links, &base, element, LinkKind::Script, "src");
    }
    for element in doc.select(&selectors::LINK) {
        let is_stylesheet = element
            .attr("rel")
            .map(|rel| {
                rel.split_ascii_whitespace()
                    .any(|token| token.eq_ignore_ascii_case("stylesheet"))
            })
            .unwrap_or(false);
        if is_stylesheet {
            push_link(&mut links, &base, element, LinkKind::Stylesheet, "href");
        }
    }

    PageExtract {
        title,
        meta_description,
        h1,
        h2,
        canonical_url,
        word_count,
        content_hash,
        meta_robots_noindex,
        links,
        framework_hint: detect_in_document(&doc),
    }
}

fn push_link(
    links: &mut Vec<ExtractedLink>,
    base: &NormalizedUrl,
    element: ElementRef,
    kind: LinkKind,
    attr: &str,
) {
    let Some(raw) = element.attr(attr) else {
        return;
    };
    let raw = raw.trim();
    // Fragment-only references point back at the page itself.
    if raw.is_empty() || raw.starts_with('#') {
        return;
    }
    // Unsupported schemes (mailto, javascript, data, ..) fail the join.
    let Ok(target) = NormalizedUrl::join(base, raw) else {
        return;
    };

    let text = match kind {
        LinkKind::Anchor => collapse_whitespace(&element.text().collect::<String>()),
        LinkKind::Image => element
            .attr("alt")
            .and_then(|alt| collapse_whitespace(alt)),
        _ => None,
    };
    let rel = element.attr("rel").map(str::to_string);
    links.push(ExtractedLink {
        follow: rel_follows(rel.as_deref()),
        target,
        raw: raw.to_string(),
        kind,
        text,
        rel,
        target_attr: element.attr("target").map(str::to_string),
        path_type: PathType::classify(raw),
        position: classify_position(element),
        dom_path: Some(dom_path(element)),
    })
}

/// Nearest classified region, the element itself first, then its ancestors.
fn classify_position(element: ElementRef) -> LinkPosition {
    if let Some(position) = classify_element(&element) {
        return position;
    }
    for ancestor in element.ancestors() {
        let Some(el) = ElementRef::wrap(ancestor) else {
            continue;
        };
        if let Some(position) = classify_element(&el) {
            return position;
        }
    }
    LinkPosition::Unknown
}

/// Classifies one element. Breadcrumbs and pagination go before navigation,
/// their markup usually nests inside a nav.
fn classify_element(element: &ElementRef) -> Option<LinkPosition> {
    let value = element.value();
    let tag = value.name();
    let role = value.attr("role").map(|role| role.to_ascii_lowercase());
    let role = role.as_deref();
    let has_token = |needle: &str| {
        value
            .id()
            .into_iter()
            .chain(value.classes())
            .any(|token| token.to_ascii_lowercase().contains(needle))
    };

    if has_token("breadcrumb") {
        return Some(LinkPosition::Breadcrumbs);
    }
    if has_token("pagination") || has_token("pager") {
        return Some(LinkPosition::Pagination);
    }
    if matches!(tag, "main" | "article") || role == Some("main") {
        return Some(LinkPosition::Content);
    }
    if tag == "nav"
        || role == Some("navigation")
        || has_token("navbar")
        || has_token("nav")
        || has_token("menu")
    {
        return Some(LinkPosition::Navigation);
    }
    if tag == "header" || role == Some("banner") || has_token("masthead") || has_token("topbar") {
        return Some(LinkPosition::Header);
    }
    if tag == "footer" || role == Some("contentinfo") {
        return Some(LinkPosition::Footer);
    }
    if tag == "aside" || role == Some("complementary") || has_token("sidebar") {
        return Some(LinkPosition::Sidebar);
    }
    None
}

/// `tag#id.class` descendant chain from `<body>` down to the element.
fn dom_path(element: ElementRef) -> String {
    let mut segments = vec![segment(&element)];
    for ancestor in element.ancestors() {
        let Some(el) = ElementRef::wrap(ancestor) else {
            continue;
        };
        let tag = el.value().name();
        if tag == "html" {
            break;
        }
        segments.push(segment(&el));
        if tag == "body" {
            break;
        }
    }
    segments.reverse();
    segments.join(" > ")
}

fn segment(element: &ElementRef) -> String {
    let value = element.value();
    let mut out = value.name().to_string();
    if let Some(id) = value.id() {
        out.push('#');
        out.push_str(id);
    }
    if let Some(class) = value.classes().next() {
        out.push('.');
        out.push_str(class);
    }
    out
}

/// Visible text of the body with script, style, nav, header, footer and
/// aside subtrees removed, whitespace-normalized.
fn visible_text(doc: &Html) -> String {
    const SKIPPED: [&str; 6] = ["script", "style", "nav", "header", "footer", "aside"];

    fn walk(node: ego_tree::NodeRef<scraper::Node>, out: &mut String) {
        for child in node.children() {
            match child.value() {
                scraper::Node::Element(element) => {
                    if !SKIPPED.contains(&element.name()) {
                        walk(child, out);
                    }
                }
                scraper::Node::Text(text) => {
                    out.push_str(text);
                    out.push(' ');
                }
                _ => {}
            }
        }
    }

    let mut raw = String::new();
    if let Some(body) = doc.select(&selectors::BODY).next() {
        walk(*body, &mut raw);
    }
    itertools::Itertools::join(&mut raw.split_whitespace(), " ")
}

fn hash_words(normalized: &str) -> i64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(normalized.as_bytes());
    hasher.finish() as i64
}

fn first_text(doc: &Html, selector: &scraper::Selector) -> Option<String> {
    doc.select(selector)
        .next()
        .and_then(|el| collapse_whitespace(&el.text().collect::<String>()))
}

fn collapse_whitespace(raw: &str) -> Option<String> {
    let collapsed = itertools::Itertools::join(&mut raw.split_whitespace(), " ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

mod selectors {
    use scraper::Selector;
    use std::sync::LazyLock as Lazy;

    macro_rules! selector {
        ($name:ident = $css:literal) => {
            pub static $name: Lazy<Selector> =
                Lazy::new(|| Selector::parse($css).expect("static selector"));
        };
    }

    selector!(BASE = "base[href]");
    selector!(BODY = "body");
    selector!(TITLE = "title");
    selector!(H1 = "h1");
    selector!(H2 = "h2");
    selector!(META_DESCRIPTION = r#"meta[name="description" i]"#);
    selector!(META_ROBOTS = r#"meta[name="robots" i]"#);
    selector!(CANONICAL = r#"link[rel="canonical" i]"#);
    selector!(ANCHOR = "a[href]");
    selector!(IMG = "img[src]");
    selector!(SCRIPT = "script[src]");
    selector!(LINK = "link[href]");
}
