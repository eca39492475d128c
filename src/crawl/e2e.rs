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

//! End-to-end crawls against a local http server: the whole engine from
//! coordinator to store, over real sockets.

use crate::crawl::{Coordinator, NoopSink};
use crate::stores::{CrawlState, DiscoveredUrlRow, RunState, Store};
use crate::test_impls::{TestResponse, TestSite};
use std::collections::HashMap;
use std::sync::Arc;

async fn coordinator() -> Coordinator {
    let store = Store::open_in_memory().await.unwrap();
    Coordinator::new(store, Arc::new(NoopSink))
}

async fn crawl_to_end(coordinator: &Coordinator, url: &str) -> (i64, i64) {
    let handle = coordinator.start_crawl(url).await.unwrap();
    coordinator.wait(handle.project_id).await;
    (handle.project_id, handle.crawl_id)
}

async fn rows(coordinator: &Coordinator, crawl_id: i64) -> Vec<DiscoveredUrlRow> {
    coordinator
        .get_crawl_with_results_paginated(crawl_id, 100, None, None)
        .await
        .unwrap()
        .items
}

fn row<'a>(rows: &'a [DiscoveredUrlRow], url: &str) -> &'a DiscoveredUrlRow {
    rows.iter()
        .find(|row| row.url == url)
        .unwrap_or_else(|| panic!("no row for {url}"))
}

#[tokio::test]
async fn a_small_site_is_crawled_completely() {
    let site = TestSite::serve(HashMap::from([
        (
            "/".to_string(),
            TestResponse::html(
                r#"<html><head><link rel="stylesheet" href="/style.css"><title>Home</title></head>
                <body><main>
                    <a href="/a">A</a>
                    <a href="/b">B</a>
                    <a href="/hidden" rel="nofollow">H</a>
                </main></body></html>"#,
            ),
        ),
        (
            "/a/".to_string(),
            TestResponse::html(r#"<html><body><main><a href="/b">B</a></main></body></html>"#),
        ),
        (
            "/b/".to_string(),
            TestResponse::html("<html><body><main><p>leaf page</p></main></body></html>"),
        ),
        ("/style.css".to_string(), TestResponse::css("body{}")),
        (
            "/hidden/".to_string(),
            TestResponse::html("<html><body>should not be fetched</body></html>"),
        ),
    ]))
    .await;

    let coordinator = coordinator().await;
    let (project_id, crawl_id) = crawl_to_end(&coordinator, &site.url("/")).await;

    let crawl = coordinator.store().get_crawl(crawl_id).await.unwrap().unwrap();
    assert_eq!(CrawlState::Completed, crawl.state());

    let stats = coordinator.get_crawl_stats(crawl_id).await.unwrap();
    assert_eq!(4, stats.crawled, "stats: {stats:?}");
    assert_eq!(3, stats.html);
    assert_eq!(1, stats.css);
    assert_eq!(0, stats.queued);

    let rows = rows(&coordinator, crawl_id).await;
    assert!(rows.iter().all(|row| row.visited));
    assert_eq!(Some("Home".to_string()), row(&rows, &site.url("/")).title.clone());
    assert_eq!(200, row(&rows, &site.url("/a/")).status);
    assert!(!rows.iter().any(|row| row.url.contains("hidden")));

    // the nofollow edge is in the link graph even though it was not fetched
    let links = coordinator
        .get_page_links_for_url(crawl_id, &site.url("/"))
        .await
        .unwrap();
    let hidden = links
        .outlinks
        .iter()
        .find(|link| link.target_url.contains("hidden"))
        .expect("nofollow edge recorded");
    assert!(!hidden.follow);
    assert_eq!(0, site.hit_count("GET /hidden/"));
    assert!(site.hit_count("GET /robots.txt") >= 1);

    let status = coordinator.get_queue_status(project_id).await.unwrap();
    assert_eq!(0, status.pending);
    assert!(!status.can_resume);
}

#[tokio::test]
async fn follow_internal_nofollow_fetches_the_hidden_page() {
    let site = TestSite::serve(HashMap::from([
        (
            "/".to_string(),
            TestResponse::html(r#"<html><body><a href="/hidden" rel="nofollow">H</a></body></html>"#),
        ),
        (
            "/hidden/".to_string(),
            TestResponse::html("<html><body><p>now visible</p></body></html>"),
        ),
    ]))
    .await;

    let coordinator = coordinator().await;
    coordinator
        .update_config_for_domain(
            &site.url("/"),
            serde_json::json!({ "followInternalNofollow": true }),
        )
        .await
        .unwrap();
    let (_, crawl_id) = crawl_to_end(&coordinator, &site.url("/")).await;

    let rows = rows(&coordinator, crawl_id).await;
    assert_eq!(200, row(&rows, &site.url("/hidden/")).status);
    assert_eq!(1, site.hit_count("GET /hidden/"));
}

#[tokio::test]
async fn redirect_chains_materialize_every_hop() {
    let site = TestSite::serve(HashMap::from([
        (
            "/start/".to_string(),
            TestResponse::redirect(301, "/middle/"),
        ),
        ("/middle/".to_string(), TestResponse::redirect(302, "/end/")),
        (
            "/end/".to_string(),
            TestResponse::html(r#"<html><body><main><a href="/other">O</a></main></body></html>"#),
        ),
        (
            "/other/".to_string(),
            TestResponse::html("<html><body>other</body></html>"),
        ),
    ]))
    .await;

    let coordinator = coordinator().await;
    let (_, crawl_id) = crawl_to_end(&coordinator, &site.url("/start")).await;

    let rows = rows(&coordinator, crawl_id).await;
    assert_eq!(301, row(&rows, &site.url("/start/")).status);
    assert_eq!(302, row(&rows, &site.url("/middle/")).status);
    assert_eq!(200, row(&rows, &site.url("/end/")).status);
    assert!(row(&rows, &site.url("/start/")).visited && row(&rows, &site.url("/middle/")).visited);
    // the intermediates carry the final destination's category
    assert_eq!(Some("html".to_string()), row(&rows, &site.url("/start/")).mime_category.clone());

    // links of the destination are attributed to the destination
    let links = coordinator
        .get_page_links_for_url(crawl_id, &site.url("/end/"))
        .await
        .unwrap();
    assert_eq!(1, links.outlinks.len());
    assert!(links.outlinks[0].target_url.ends_with("/other/"));
    assert_eq!(200, row(&rows, &site.url("/other/")).status);

    // each chain member was requested exactly once
    for path in ["GET /start/", "GET /middle/", "GET /end/"] {
        assert_eq!(1, site.hit_count(path), "{path}");
    }
}

fn seven_page_site() -> HashMap<String, TestResponse> {
    let mut routes = HashMap::from([(
        "/".to_string(),
        TestResponse::html(
            r#"<html><body><main>
                <a href="/p1">1</a> <a href="/p2">2</a> <a href="/p3">3</a>
                <a href="/p4">4</a> <a href="/p5">5</a> <a href="/p6">6</a>
            </main></body></html>"#,
        ),
    )]);
    for i in 1..=6 {
        routes.insert(
            format!("/p{}/", i),
            TestResponse::html("<html><body><p>page</p></body></html>"),
        );
    }
    routes
}

#[tokio::test]
async fn budget_pauses_and_a_resume_completes_the_run() {
    let site = TestSite::serve(seven_page_site()).await;
    let coordinator = coordinator().await;
    coordinator
        .update_config_for_domain(&site.url("/"), serde_json::json!({ "crawlBudget": 3 }))
        .await
        .unwrap();

    let (project_id, first_crawl) = crawl_to_end(&coordinator, &site.url("/")).await;

    let crawl = coordinator.store().get_crawl(first_crawl).await.unwrap().unwrap();
    assert_eq!(CrawlState::Paused, crawl.state());

    let status = coordinator.get_queue_status(project_id).await.unwrap();
    assert_eq!(3, status.visited);
    assert_eq!(4, status.pending);
    assert!(status.can_resume);

    // the remainder is visible as discovered-but-not-fetched rows
    let paused_rows = rows(&coordinator, first_crawl).await;
    assert_eq!(7, paused_rows.len());
    assert_eq!(3, paused_rows.iter().filter(|row| row.visited).count());

    // lift the budget and finish the run in a second session
    coordinator
        .update_config_for_domain(&site.url("/"), serde_json::json!({ "crawlBudget": 0 }))
        .await
        .unwrap();
    let resumed = coordinator.resume_crawl(project_id).await.unwrap();
    coordinator.wait(project_id).await;

    let second = coordinator.store().get_crawl(resumed.crawl_id).await.unwrap().unwrap();
    assert_eq!(CrawlState::Completed, second.state());
    let run = coordinator
        .store()
        .get_run(second.run_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(RunState::Completed, run.state());

    // both crawl ids read as the same unified dataset
    for crawl_id in [first_crawl, resumed.crawl_id] {
        let rows = rows(&coordinator, crawl_id).await;
        assert_eq!(7, rows.len(), "split crawl reads as one dataset");
        assert!(rows.iter().all(|row| row.visited));
    }

    let status = coordinator.get_queue_status(project_id).await.unwrap();
    assert_eq!(7, status.visited);
    assert_eq!(0, status.pending);
    assert!(!status.can_resume);

    // every page was fetched exactly once across both sessions
    for i in 1..=6 {
        assert_eq!(1, site.hit_count(&format!("GET /p{}/", i)));
    }
    assert_eq!(1, site.hit_count("GET /"));
}

fn robots_site() -> HashMap<String, TestResponse> {
    HashMap::from([
        (
            "/robots.txt".to_string(),
            TestResponse::text("User-agent: *\nDisallow: /private/\n"),
        ),
        (
            "/".to_string(),
            TestResponse::html(
                r#"<html><body><main>
                    <a href="/private/x">secret</a>
                    <a href="/public">open</a>
                </main></body></html>"#,
            ),
        ),
        (
            "/private/x/".to_string(),
            TestResponse::html(r#"<html><body><a href="/secret">s</a></body></html>"#),
        ),
        (
            "/public/".to_string(),
            TestResponse::html("<html><body>open</body></html>"),
        ),
    ])
}

#[tokio::test]
async fn respected_robots_never_fetch_or_record_disallowed_urls() {
    let site = TestSite::serve(robots_site()).await;
    let coordinator = coordinator().await;
    let (_, crawl_id) = crawl_to_end(&coordinator, &site.url("/")).await;

    let rows = rows(&coordinator, crawl_id).await;
    assert!(!rows.iter().any(|row| row.url.contains("/private/")));
    assert_eq!(200, row(&rows, &site.url("/public/")).status);
    assert_eq!(0, site.hit_count("GET /private/x/"));
}

#[tokio::test]
async fn ignore_report_records_disallowed_urls_as_non_indexable() {
    let site = TestSite::serve(robots_site()).await;
    let coordinator = coordinator().await;
    coordinator
        .update_config_for_domain(
            &site.url("/"),
            serde_json::json!({ "robotsTxtMode": "ignore-report" }),
        )
        .await
        .unwrap();
    let (_, crawl_id) = crawl_to_end(&coordinator, &site.url("/")).await;

    let rows = rows(&coordinator, crawl_id).await;
    let private = row(&rows, &site.url("/private/x/"));
    assert!(private.visited);
    assert_eq!(200, private.status);
    assert_eq!(
        Some("No: Disallowed by robots".to_string()),
        private.indexable.clone()
    );
    assert_eq!(1, site.hit_count("GET /private/x/"));

    // outbound links of a disallowed page are neither recorded nor crawled
    assert!(!rows.iter().any(|row| row.url.contains("/secret/")));
    let links = coordinator
        .get_page_links_for_url(crawl_id, &site.url("/private/x/"))
        .await
        .unwrap();
    assert!(links.outlinks.is_empty());

    // search finds it through the verdict text
    let found = coordinator
        .search_crawl_results_paginated(crawl_id, "Disallowed", None, 10, None)
        .await
        .unwrap();
    assert_eq!(1, found.items.len());
}

#[tokio::test]
async fn noindex_headers_flag_the_page_but_links_are_followed() {
    let site = TestSite::serve(HashMap::from([
        (
            "/".to_string(),
            TestResponse::html(r#"<html><body><a href="/next">n</a></body></html>"#)
                .with_header("X-Robots-Tag", "noindex"),
        ),
        (
            "/next/".to_string(),
            TestResponse::html("<html><body>fine</body></html>"),
        ),
    ]))
    .await;

    let coordinator = coordinator().await;
    let (_, crawl_id) = crawl_to_end(&coordinator, &site.url("/")).await;

    let rows = rows(&coordinator, crawl_id).await;
    assert_eq!(
        Some("No: Noindex response header".to_string()),
        row(&rows, &site.url("/")).indexable.clone()
    );
    assert_eq!(200, row(&rows, &site.url("/next/")).status);
    assert_eq!(Some("Yes".to_string()), row(&rows, &site.url("/next/")).indexable.clone());
}

#[tokio::test]
async fn external_assets_get_a_head_check_but_no_crawl() {
    let cdn = TestSite::serve(HashMap::from([(
        "/pic.png".to_string(),
        TestResponse {
            status: 200,
            content_type: "image/png".to_string(),
            body: "not really a png".to_string(),
            location: None,
            extra_headers: Vec::new(),
        },
    )]))
    .await;
    let site = TestSite::serve(HashMap::from([(
        "/".to_string(),
        TestResponse::html(&format!(
            r#"<html><body><main>
                <img src="{}">
                <a href="{}">off-site anchor</a>
            </main></body></html>"#,
            cdn.url("/pic.png"),
            cdn.url("/page")
        )),
    )]))
    .await;

    let coordinator = coordinator().await;
    let (_, crawl_id) = crawl_to_end(&coordinator, &site.url("/")).await;

    let rows = rows(&coordinator, crawl_id).await;
    let asset = row(&rows, &cdn.url("/pic.png"));
    assert!(asset.visited);
    assert_eq!(200, asset.status);
    assert_eq!(Some("image".to_string()), asset.mime_category.clone());

    // HEAD only, and off-host anchors are not fetched at all
    assert_eq!(1, cdn.hit_count("HEAD /pic.png"));
    assert_eq!(0, cdn.hit_count("GET /pic.png"));
    assert_eq!(0, cdn.hit_count("GET /page/"));
    assert!(!rows.iter().any(|row| row.url.contains("/page")));
}

#[tokio::test]
async fn sitemap_discovery_seeds_unlinked_pages() {
    let site = TestSite::serve(HashMap::from([
        (
            "/".to_string(),
            TestResponse::html("<html><body><p>no links at all</p></body></html>"),
        ),
        (
            "/orphan/".to_string(),
            TestResponse::html("<html><body>only the sitemap knows me</body></html>"),
        ),
    ]))
    .await;
    // the default sitemap location serves an urlset pointing at the orphan
    site.add_route(
        "/sitemap.xml",
        TestResponse {
            status: 200,
            content_type: "application/xml".to_string(),
            body: format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
                <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                    <url><loc>{}</loc></url>
                </urlset>"#,
                site.url("/orphan/")
            ),
            location: None,
            extra_headers: Vec::new(),
        },
    );

    let coordinator = coordinator().await;
    let (_, crawl_id) = crawl_to_end(&coordinator, &site.url("/")).await;
    let rows = rows(&coordinator, crawl_id).await;
    assert_eq!(200, row(&rows, &site.url("/")).status);
    assert!(rows.iter().any(|row| row.url.ends_with("/orphan/")));
}
