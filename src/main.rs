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

//! Binary entry point: parses CLI/environment configuration, wires the
//! collaborator services, binds the listener(s), and runs the server on
//! the calling thread.

use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cqcwebsrv::collaborators::{MockImageRepository, MockPollingService, MockRenderingEngine, MockScriptEngine, MockSecurityService};
use cqcwebsrv::config::{CliConfig, ServerConfig};
use cqcwebsrv::queue::ConnectionQueue;
use cqcwebsrv::{Facility, Listener};

fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from(&cli);

    // The security server, image repository, rendering engine, polling
    // service, and scripting engine are all remote/out-of-process
    // collaborators in the real deployment (§6); a standalone binary has
    // nothing to dial, so it runs against the same in-memory mocks the
    // test suite uses. A production deployment replaces these five lines
    // with real RPC-backed implementations of the same traits.
    let facility = Arc::new(Facility::new(
        config,
        Arc::new(MockSecurityService::new()),
        Arc::new(MockImageRepository::new()),
        Arc::new(MockRenderingEngine::default()),
        Arc::new(MockPollingService::new()),
        Arc::new(MockScriptEngine),
    ));

    let queue = ConnectionQueue::new(facility.config.queue_capacity);
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut listener = Listener::new(queue, Arc::clone(&facility), shutdown);

    if cli.http_port != 0 {
        listener.bind_plain(([0, 0, 0, 0], cli.http_port).into())?;
        tracing::info!(port = cli.http_port, "plain HTTP listener bound");
    }

    if cli.https_port != 0 {
        match (&cli.tls_cert, &cli.tls_key) {
            (Some(cert_path), Some(key_path)) => {
                let tls_config = load_tls_config(cert_path, key_path)?;
                listener.bind_tls(([0, 0, 0, 0], cli.https_port).into(), Arc::new(tls_config))?;
                tracing::info!(port = cli.https_port, "TLS listener bound");
            }
            _ => {
                tracing::warn!("HTTPS port configured without --tls-cert/--tls-key; secure listener not bound");
            }
        }
    }

    if listener.bound_count() == 0 {
        anyhow::bail!("no listening ports configured");
    }

    listener.spawn_initial_workers();
    listener.run();

    Ok(())
}

fn load_tls_config(cert_path: &std::path::Path, key_path: &std::path::Path) -> anyhow::Result<rustls::ServerConfig> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cert_file = &mut BufReader::new(File::open(cert_path)?);
    let certs = rustls_pemfile::certs(cert_file).collect::<Result<Vec<_>, std::io::Error>>()?;

    let key_file = &mut BufReader::new(File::open(key_path)?);
    let key = rustls_pemfile::private_key(key_file)?.ok_or_else(|| anyhow::anyhow!("no private key found in {key_path:?}"))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(config)
}
