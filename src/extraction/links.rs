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

use crate::stores::PageLinkRecord;
use crate::url::NormalizedUrl;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What kind of element carried the link.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum LinkKind {
    #[strum(serialize = "anchor")]
    Anchor,
    #[strum(serialize = "image")]
    Image,
    #[strum(serialize = "script")]
    Script,
    #[strum(serialize = "stylesheet")]
    Stylesheet,
}

/// The shape of the raw href/src before resolution.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum PathType {
    #[strum(serialize = "absolute")]
    Absolute,
    #[strum(serialize = "root-relative")]
    RootRelative,
    #[strum(serialize = "relative")]
    Relative,
}

impl PathType {
    pub fn classify(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("//") || raw.contains("://") {
            PathType::Absolute
        } else if raw.starts_with('/') {
            PathType::RootRelative
        } else {
            PathType::Relative
        }
    }
}

/// The semantic region of the page a link sits in, used to tell boilerplate
/// links from content links.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum LinkPosition {
    #[strum(serialize = "content")]
    Content,
    #[strum(serialize = "navigation")]
    Navigation,
    #[strum(serialize = "header")]
    Header,
    #[strum(serialize = "footer")]
    Footer,
    #[strum(serialize = "sidebar")]
    Sidebar,
    #[strum(serialize = "breadcrumbs")]
    Breadcrumbs,
    #[strum(serialize = "pagination")]
    Pagination,
    #[strum(serialize = "unknown")]
    Unknown,
}

/// Rel tokens that turn the follow flag off.
const NOFOLLOW_TOKENS: [&str; 3] = ["nofollow", "sponsored", "ugc"];

/// Derives the follow flag from a rel attribute.
pub fn rel_follows(rel: Option<&str>) -> bool {
    match rel {
        None => true,
        Some(rel) => !rel
            .split_ascii_whitespace()
            .any(|token| NOFOLLOW_TOKENS.contains(&token.to_ascii_lowercase().as_str())),
    }
}

/// One outbound link of a page, fully resolved and classified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedLink {
    pub target: NormalizedUrl,
    /// The href/src exactly as written in the document.
    pub raw: String,
    pub kind: LinkKind,
    /// Anchor text for anchors, alt text for images.
    pub text: Option<String>,
    pub rel: Option<String>,
    pub follow: bool,
    pub target_attr: Option<String>,
    pub path_type: PathType,
    pub position: LinkPosition,
    pub dom_path: Option<String>,
}

impl ExtractedLink {
    pub fn to_record(&self) -> PageLinkRecord {
        PageLinkRecord {
            target_url: self.target.as_str().to_string(),
            kind: self.kind.to_string(),
            anchor_text: self.text.clone(),
            rel: self.rel.clone(),
            follow: self.follow,
            target_attr: self.target_attr.clone(),
            path_type: self.path_type.to_string(),
            position: self.position.to_string(),
            dom_path: self.dom_path.clone(),
        }
    }
}
