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

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use thiserror::Error;
use twox_hash::XxHash64;
use url::Url;

#[derive(Debug, Error)]
pub enum UrlParseError {
    #[error("the url is empty")]
    Empty,
    #[error(transparent)]
    Invalid(#[from] url::ParseError),
    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("the url has no host")]
    NoHost,
}

/// An url in its canonical form. Two urls that only differ in default port,
/// case of scheme/host, duplicate path slashes, a trailing slash on an
/// extensionless path, query key order or fragment compare equal.
///
/// Normalization is idempotent: `NormalizedUrl::parse(u.as_str())` yields `u`.
#[derive(Clone)]
pub struct NormalizedUrl {
    canonical: String,
    /// Lower-cased hostname plus `:port` iff the port is non-default.
    host: String,
    parsed: Url,
}

impl NormalizedUrl {
    /// Parses and canonicalizes a raw url.
    pub fn parse(raw: &str) -> Result<Self, UrlParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(UrlParseError::Empty);
        }
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else if let Some(rest) = trimmed.strip_prefix("//") {
            format!("https://{}", rest)
        } else {
            format!("https://{}", trimmed)
        };
        Self::from_url(Url::parse(&with_scheme)?)
    }

    /// Resolves `raw` against `base` and canonicalizes the result.
    pub fn join(base: &NormalizedUrl, raw: &str) -> Result<Self, UrlParseError> {
        Self::from_url(base.parsed.join(raw.trim())?)
    }

    fn from_url(url: Url) -> Result<Self, UrlParseError> {
        let scheme = url.scheme().to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(UrlParseError::UnsupportedScheme(scheme));
        }
        let hostname = url
            .host_str()
            .ok_or(UrlParseError::NoHost)?
            .to_ascii_lowercase();
        // `Url::port` already reports None for the scheme default.
        let port = url.port();

        let path = normalize_path(url.path());
        let query = url.query().and_then(|raw| {
            if raw.is_empty() {
                None
            } else {
                Some(normalize_query(&url))
            }
        });

        let mut canonical = format!("{}://{}", scheme, hostname);
        let host = match port {
            Some(port) => {
                canonical.push(':');
                canonical.push_str(&port.to_string());
                format!("{}:{}", hostname, port)
            }
            None => hostname,
        };
        canonical.push_str(&path);
        if let Some(query) = query {
            canonical.push('?');
            canonical.push_str(&query);
        }
        // Reconstruction never emits a dangling `?` or `#`, reparsing keeps
        // the canonical form verbatim.
        let parsed = Url::parse(&canonical)?;
        Ok(Self {
            canonical,
            host,
            parsed,
        })
    }

    #[inline(always)]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    #[inline(always)]
    pub fn url(&self) -> &Url {
        &self.parsed
    }

    pub fn scheme(&self) -> &str {
        self.parsed.scheme()
    }

    /// Lower-cased hostname plus `:port` iff the port is non-default.
    #[inline(always)]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The hostname without any port.
    pub fn hostname(&self) -> &str {
        self.parsed.host_str().unwrap_or_default()
    }

    /// The signed 64-bit hash of the canonical form, stable across sessions
    /// and portable into the store.
    pub fn hash(&self) -> i64 {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(self.canonical.as_bytes());
        hasher.finish() as i64
    }
}

/// Collapses runs of `/` and applies the trailing-slash rule: extensionless
/// paths get exactly one trailing `/`, file-like paths keep their exact form.
fn normalize_path(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len().max(1));
    let mut last_was_slash = false;
    for c in path.chars() {
        if c == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        collapsed.push(c);
    }
    if collapsed.is_empty() {
        collapsed.push('/');
    }
    let last_segment = collapsed.rsplit('/').next().unwrap_or_default();
    if !last_segment.contains('.') && !collapsed.ends_with('/') {
        collapsed.push('/');
    }
    collapsed
}

/// Re-encodes the query with keys in ascending byte order so that
/// `?a=1&b=2` and `?b=2&a=1` compare equal. The sort is stable, repeated
/// keys keep their relative order.
fn normalize_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(&k, &v);
    }
    serializer.finish()
}

impl Debug for NormalizedUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NormalizedUrl").field(&self.canonical).finish()
    }
}

impl Display for NormalizedUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl PartialEq for NormalizedUrl {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for NormalizedUrl {}

impl Hash for NormalizedUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state)
    }
}

impl Serialize for NormalizedUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical)
    }
}

impl<'de> Deserialize<'de> for NormalizedUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

impl std::str::FromStr for NormalizedUrl {
    type Err = UrlParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
