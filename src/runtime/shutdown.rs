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

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Bounded grace window between signalling a stop and force-exiting the
/// session, so in-flight fetches can drain.
pub const GRACE_WINDOW: Duration = Duration::from_secs(2);

/// A simple trait for receiving a shutdown command.
pub trait ShutdownReceiver: Clone + Send + Sync {
    /// Returns `true` if the shutdown signal has been received.
    fn is_shutdown(&self) -> bool;
}

/// The receiving half of a cooperative cancellation signal. Cheap to clone,
/// observed by workers at every suspension point.
#[derive(Debug, Clone)]
#[repr(transparent)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub async fn wait(&self) {
        self.token.cancelled().await
    }
}

impl ShutdownReceiver for Shutdown {
    fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Sends the shutdown signal to every associated [Shutdown].
#[derive(Debug)]
#[repr(transparent)]
pub struct ShutdownSignalSender {
    token: CancellationToken,
}

impl ShutdownSignalSender {
    /// Notifies all receivers.
    pub fn cancel(&self) {
        self.token.cancel()
    }

    #[allow(dead_code)]
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            token: self.token.clone(),
        }
    }
}

/// Creates the tools for shutdown handling.
pub fn shutdown() -> (ShutdownSignalSender, Shutdown) {
    let token = CancellationToken::new();
    (
        ShutdownSignalSender {
            token: token.clone(),
        },
        Shutdown { token },
    )
}
