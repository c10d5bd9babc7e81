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

//! Server configuration, parsed once at startup and handed by value to the
//! listener and worker pool. There is no global mutable config; see
//! [`crate::facility::Facility`] for the process-wide state this is paired
//! with.

use std::path::PathBuf;

use clap::Parser;

/// Command-line / environment configuration for the server.
///
/// Mirrors the ~2000 lines of peripheral CLI/config glue the implementation
/// budget excludes from the 16k core; kept intentionally small here.
#[derive(Debug, Clone, Parser)]
#[command(name = "cqc-web-server", about = "Embedded home-automation web server")]
pub struct CliConfig {
    /// Plain HTTP port. `0` disables the plain listener.
    #[arg(long, env = "CQC_HTTP_PORT", default_value_t = 8080)]
    pub http_port: u16,

    /// TLS HTTPS port. `0` disables the secure listener.
    #[arg(long, env = "CQC_HTTPS_PORT", default_value_t = 8443)]
    pub https_port: u16,

    /// PEM certificate chain for the TLS listener.
    #[arg(long, env = "CQC_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for the TLS listener.
    #[arg(long, env = "CQC_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// Minimum number of worker threads kept alive at all times.
    #[arg(long, env = "CQC_MIN_WORKERS", default_value_t = 4)]
    pub min_workers: usize,

    /// Hard cap on the worker pool; the listener refuses new connections
    /// once this many workers are already running.
    #[arg(long, env = "CQC_MAX_WORKERS", default_value_t = 64)]
    pub max_workers: usize,

    /// Capacity of the bounded connection queue between the listener and the
    /// worker pool.
    #[arg(long, env = "CQC_QUEUE_CAPACITY", default_value_t = 64)]
    pub queue_capacity: usize,

    /// Root directory served by the catch-all file handler.
    #[arg(long, env = "CQC_WEB_ROOT", default_value = "./web")]
    pub web_root: PathBuf,

    /// Maximum single WebSocket fragment size accepted from a peer, in bytes.
    #[arg(long, env = "CQC_MAX_WS_FRAGMENT", default_value_t = 32 * 1024 * 1024)]
    pub max_ws_fragment: usize,

    /// Log verbosity filter, passed straight to `tracing_subscriber::EnvFilter`.
    #[arg(long, env = "CQC_LOG", default_value = "info")]
    pub log_filter: String,

    /// Hostname used in the Digest nonce hash and advertised challenges.
    #[arg(long, env = "CQC_HOSTNAME", default_value = "cqc-web-server")]
    pub hostname: String,

    /// Default RIVA template loaded on a successful handshake.
    #[arg(long, env = "CQC_RIVA_TEMPLATE", default_value = "MainView")]
    pub riva_default_template: String,
}

/// Server-wide tunables derived from [`CliConfig`] and shared (by value or
/// `Arc`) with every listener, worker and session.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Hard cap on the worker pool.
    pub max_workers: usize,
    /// Minimum workers spawned at startup.
    pub min_workers: usize,
    /// Capacity of the connection queue.
    pub queue_capacity: usize,
    /// Root directory for the file handler.
    pub web_root: PathBuf,
    /// Maximum accepted single WebSocket fragment size.
    pub max_ws_fragment: usize,
    /// Fixed opaque value advertised in the Digest challenge.
    ///
    /// The original implementation used a literal constant; we keep a fixed,
    /// configurable constant to the same effect (see SPEC_FULL.md §3).
    pub digest_opaque: &'static str,
    /// Realm advertised in the Digest challenge.
    pub digest_realm: &'static str,
    /// Bounded deadline given to a single reply write, mirroring the
    /// original's 4s output flush deadline.
    pub write_timeout: std::time::Duration,
    /// Hostname folded into the Digest nonce hash (§4.5).
    pub hostname: String,
    /// Default RIVA template name (§4.9).
    pub riva_default_template: String,
    /// Virtual display size handed to the rendering engine for RIVA
    /// sessions (§4.9).
    pub riva_display_size: (u32, u32),
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_workers: 64,
            min_workers: 4,
            queue_capacity: 64,
            web_root: PathBuf::from("./web"),
            max_ws_fragment: 32 * 1024 * 1024,
            digest_opaque: "1234567890",
            digest_realm: "CQC Automation System",
            write_timeout: std::time::Duration::from_secs(4),
            hostname: "cqc-web-server".to_string(),
            riva_default_template: "MainView".to_string(),
            riva_display_size: (800, 480),
        }
    }
}

impl From<&CliConfig> for ServerConfig {
    fn from(cli: &CliConfig) -> Self {
        Self {
            max_workers: cli.max_workers,
            min_workers: cli.min_workers,
            queue_capacity: cli.queue_capacity,
            web_root: cli.web_root.clone(),
            max_ws_fragment: cli.max_ws_fragment,
            hostname: cli.hostname.clone(),
            riva_default_template: cli.riva_default_template.clone(),
            ..Default::default()
        }
    }
}
