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

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The coarse label a response is classified under.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum MimeCategory {
    #[strum(serialize = "html")]
    Html,
    #[strum(serialize = "image")]
    Image,
    #[strum(serialize = "javascript")]
    Javascript,
    #[strum(serialize = "css")]
    Css,
    #[strum(serialize = "font")]
    Font,
    #[strum(serialize = "other")]
    Other,
}

impl MimeCategory {
    /// Classifies a raw `Content-Type` header value.
    pub fn from_content_type(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return MimeCategory::Other;
        };
        let Ok(parsed) = raw.trim().parse::<mime::Mime>() else {
            return MimeCategory::Other;
        };
        let (kind, subtype) = (parsed.type_(), parsed.subtype());
        if kind == mime::TEXT && subtype == mime::HTML
            || kind == mime::APPLICATION && subtype == "xhtml"
        {
            MimeCategory::Html
        } else if kind == mime::IMAGE {
            MimeCategory::Image
        } else if subtype == mime::JAVASCRIPT || subtype == "ecmascript" {
            MimeCategory::Javascript
        } else if kind == mime::TEXT && subtype == mime::CSS {
            MimeCategory::Css
        } else if kind == mime::FONT
            || kind == mime::APPLICATION
                && matches!(subtype.as_str(), "font-woff" | "font-woff2" | "font-sfnt")
        {
            MimeCategory::Font
        } else {
            MimeCategory::Other
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self, MimeCategory::Html)
    }
}
