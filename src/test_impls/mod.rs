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

//! A minimal http server for end-to-end crawl tests. Serves a fixed route
//! table over real sockets so the engine is exercised through its actual
//! client, one connection per request.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One canned response of the test site.
#[derive(Debug, Clone)]
pub struct TestResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
    pub location: Option<String>,
    pub extra_headers: Vec<(String, String)>,
}

impl TestResponse {
    pub fn html(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8".to_string(),
            body: body.to_string(),
            location: None,
            extra_headers: Vec::new(),
        }
    }

    pub fn css(body: &str) -> Self {
        Self {
            content_type: "text/css".to_string(),
            ..Self::html(body)
        }
    }

    pub fn text(body: &str) -> Self {
        Self {
            content_type: "text/plain".to_string(),
            ..Self::html(body)
        }
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self {
            status,
            content_type: "text/html".to_string(),
            body: String::new(),
            location: Some(location.to_string()),
            extra_headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.extra_headers
            .push((name.to_string(), value.to_string()));
        self
    }
}

/// A http server bound to a random localhost port, serving the route table
/// until dropped. Paths are matched without their query.
pub struct TestSite {
    addr: SocketAddr,
    routes: Arc<Mutex<HashMap<String, TestResponse>>>,
    hits: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl TestSite {
    pub async fn serve(routes: HashMap<String, TestResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let routes = Arc::new(Mutex::new(routes));
        let hits: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let hits = hits.clone();
            let routes = routes.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let routes = routes.clone();
                    let hits = hits.clone();
                    tokio::spawn(async move {
                        let _ = handle_connection(stream, routes, hits).await;
                    });
                }
            })
        };

        Self {
            addr,
            routes,
            hits,
            handle,
        }
    }

    /// Registers (or replaces) a route on the running site, handy when a
    /// body needs to reference the site's own random port.
    pub fn add_route(&self, path: &str, response: TestResponse) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), response);
    }

    /// Absolute url of a path on this site.
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.addr.port(), path)
    }

    /// `METHOD path` of every request received, in arrival order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    pub fn hit_count(&self, needle: &str) -> usize {
        self.hits()
            .iter()
            .filter(|hit| hit.as_str() == needle)
            .count()
    }
}

impl Drop for TestSite {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    routes: Arc<Mutex<HashMap<String, TestResponse>>>,
    hits: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let mut raw = Vec::with_capacity(1024);
    let mut buf = [0u8; 1024];
    while !raw.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = stream.read(&mut buf).await?;
        if read == 0 {
            return Ok(());
        }
        raw.extend_from_slice(&buf[..read]);
        if raw.len() > 64 * 1024 {
            return Ok(());
        }
    }

    let head = String::from_utf8_lossy(&raw);
    let mut parts = head.lines().next().unwrap_or_default().split(' ');
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default();
    let path = target.split('?').next().unwrap_or_default().to_string();
    hits.lock().unwrap().push(format!("{} {}", method, path));

    let not_found = TestResponse {
        status: 404,
        content_type: "text/plain".to_string(),
        body: "not found".to_string(),
        location: None,
        extra_headers: Vec::new(),
    };
    let response = routes.lock().unwrap().get(&path).cloned().unwrap_or(not_found);

    let mut out = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        reason(response.status),
        response.content_type,
        response.body.len(),
    );
    if let Some(ref location) = response.location {
        out.push_str(&format!("Location: {}\r\n", location));
    }
    for (name, value) in &response.extra_headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str("\r\n");

    stream.write_all(out.as_bytes()).await?;
    if method != "HEAD" {
        stream.write_all(response.body.as_bytes()).await?;
    }
    stream.shutdown().await
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        404 => "Not Found",
        _ => "Response",
    }
}
