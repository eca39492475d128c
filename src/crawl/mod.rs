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

mod coordinator;
#[cfg(test)]
mod e2e;
mod errors;
mod events;
mod result;
mod session;
mod sitemaps;

pub use coordinator::*;
pub use errors::*;
pub use events::*;
pub use result::*;
pub use session::*;
pub use sitemaps::*;
