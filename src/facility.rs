// Copyright 2022 Ryan Seipp
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

//! The server's process-wide facility object (§9 "Process-wide state"): a
//! single initialised-once value injected into every worker and session at
//! construction. Holds the collaborator services and the running
//! statistics counters; forbids static mutable globals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::collaborators::image_repo::ImageRepository;
use crate::collaborators::polling::PollingService;
use crate::collaborators::rendering::RenderingEngine;
use crate::collaborators::script::ScriptEngine;
use crate::collaborators::security::SecurityService;
use crate::config::ServerConfig;

/// Running counters surfaced for diagnostics. All fields are independent
/// atomics; there is no cross-field consistency requirement.
#[derive(Default)]
pub struct Stats {
    pub requests_served: AtomicU64,
    pub requests_failed: AtomicU64,
    pub digest_challenges_issued: AtomicU64,
    pub ws_sessions_opened: AtomicU64,
    pub ws_sessions_active: AtomicU64,
    pub connections_refused: AtomicU64,
}

impl Stats {
    pub fn record_request(&self, ok: bool) {
        if ok {
            self.requests_served.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_ws_opened(&self) {
        self.ws_sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.ws_sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ws_closed(&self) {
        self.ws_sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_connection_refused(&self) {
        self.connections_refused.fetch_add(1, Ordering::Relaxed);
    }
}

/// The injected, process-wide dependency set (§9). Constructed once at
/// startup and shared behind an `Arc` — never stored in a `static`.
pub struct Facility {
    pub config: ServerConfig,
    pub security: Arc<dyn SecurityService>,
    pub images: Arc<dyn ImageRepository>,
    pub rendering: Arc<dyn RenderingEngine>,
    pub polling: Arc<dyn PollingService>,
    pub scripts: Arc<dyn ScriptEngine>,
    pub stats: Stats,
}

impl Facility {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ServerConfig,
        security: Arc<dyn SecurityService>,
        images: Arc<dyn ImageRepository>,
        rendering: Arc<dyn RenderingEngine>,
        polling: Arc<dyn PollingService>,
        scripts: Arc<dyn ScriptEngine>,
    ) -> Self {
        Self {
            config,
            security,
            images,
            rendering,
            polling,
            scripts,
            stats: Stats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn stats_track_ws_session_lifecycle() {
        let stats = Stats::default();
        stats.record_ws_opened();
        stats.record_ws_opened();
        stats.record_ws_closed();
        assert_eq!(stats.ws_sessions_opened.load(Ordering::Relaxed), 2);
        assert_eq!(stats.ws_sessions_active.load(Ordering::Relaxed), 1);
    }
}
