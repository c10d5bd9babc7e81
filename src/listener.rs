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

//! The listener thread (§4.2): binds the plain and/or TLS ports, accepts
//! connections with a bounded wait, offers them to the connection queue,
//! and grows the worker pool under backlog pressure. The only place the
//! worker pool is mutated (§5).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rustls::ServerConfig as TlsServerConfig;
use tracing::warn;

use crate::facility::Facility;
use crate::net::{Connection, StdTcpListener, TcpListener as _};
use crate::queue::ConnectionQueue;
use crate::worker::Worker;

/// Bounded wait per accept poll on each bound socket. Split across the
/// plain and TLS sockets so polling both in turn still matches §4.2's
/// "wait <= 250 ms for a connection".
const ACCEPT_POLL: Duration = Duration::from_millis(125);

/// One bound listening socket and the TLS config (if any) connections off
/// it are handed.
struct BoundSocket {
    listener: StdTcpListener,
    tls: Option<Arc<TlsServerConfig>>,
}

/// The listener thread (§4.2). Owns the worker pool's join handles.
pub struct Listener {
    sockets: Vec<BoundSocket>,
    queue: ConnectionQueue,
    facility: Arc<Facility>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<std::thread::JoinHandle<()>>,
    next_worker_id: usize,
}

impl Listener {
    pub fn new(queue: ConnectionQueue, facility: Arc<Facility>, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            sockets: Vec::new(),
            queue,
            facility,
            shutdown,
            workers: Vec::new(),
            next_worker_id: 0,
        }
    }

    /// Binds a plaintext listening socket.
    pub fn bind_plain(&mut self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = StdTcpListener::bind(addr)?;
        self.sockets.push(BoundSocket { listener, tls: None });
        Ok(())
    }

    /// Binds a TLS-terminated listening socket; the handshake itself is
    /// deferred to the worker (§4.2).
    pub fn bind_tls(&mut self, addr: SocketAddr, tls: Arc<TlsServerConfig>) -> std::io::Result<()> {
        let listener = StdTcpListener::bind(addr)?;
        self.sockets.push(BoundSocket { listener, tls: Some(tls) });
        Ok(())
    }

    /// Number of ports currently bound.
    pub fn bound_count(&self) -> usize {
        self.sockets.len()
    }

    /// Spawns the configured minimum worker pool. Call once before [`run`].
    pub fn spawn_initial_workers(&mut self) {
        for _ in 0..self.facility.config.min_workers {
            self.spawn_worker();
        }
    }

    fn spawn_worker(&mut self) {
        let id = self.next_worker_id;
        self.next_worker_id += 1;
        let handle = Worker::spawn(id, self.queue.clone(), Arc::clone(&self.facility), Arc::clone(&self.shutdown));
        self.workers.push(handle);
    }

    /// Runs the accept loop until shutdown is requested (§4.2). Performs no
    /// I/O on an accepted connection beyond the accept itself.
    pub fn run(&mut self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            if self.sockets.is_empty() {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            for i in 0..self.sockets.len() {
                match self.sockets[i].listener.accept_timeout(ACCEPT_POLL) {
                    Ok((stream, addr)) => self.offer(stream, addr, i),
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(e) => warn!(%e, "accept failed"),
                }
            }
        }
    }

    fn offer(&mut self, stream: std::net::TcpStream, addr: SocketAddr, socket_index: usize) {
        let connection = match &self.sockets[socket_index].tls {
            Some(tls) => match Connection::tls(stream, Arc::clone(tls)) {
                Ok(conn) => conn,
                Err(err) => {
                    warn!(%err, %addr, "failed to set up TLS connection");
                    return;
                }
            },
            None => Connection::plain(stream),
        };

        if self.queue.len() >= 1 && self.workers.len() < self.facility.config.max_workers {
            self.spawn_worker();
        }

        if self.queue.offer(connection).is_err() {
            self.facility.stats.record_connection_refused();
            warn!(%addr, "connection queue saturated, dropping connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::image_repo::MockImageRepository;
    use crate::collaborators::polling::MockPollingService;
    use crate::collaborators::rendering::MockRenderingEngine;
    use crate::collaborators::script::MockScriptEngine;
    use crate::collaborators::security::MockSecurityService;
    use crate::config::ServerConfig;
    use std::net::TcpStream;

    fn facility(max_workers: usize) -> Arc<Facility> {
        Arc::new(Facility::new(
            ServerConfig {
                max_workers,
                min_workers: 0,
                queue_capacity: 4,
                ..ServerConfig::default()
            },
            Arc::new(MockSecurityService::new()),
            Arc::new(MockImageRepository::new()),
            Arc::new(MockRenderingEngine::default()),
            Arc::new(MockPollingService::new()),
            Arc::new(MockScriptEngine),
        ))
    }

    #[test]
    fn accepted_connections_are_offered_to_the_queue() {
        let facility = facility(4);
        let queue = ConnectionQueue::new(facility.config.queue_capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut listener = Listener::new(queue.clone(), facility, shutdown);
        listener.bind_plain("127.0.0.1:0".parse().unwrap()).unwrap();

        let addr = listener.sockets[0].listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).unwrap();

        let (stream, peer) = listener.sockets[0].listener.accept_timeout(Duration::from_millis(500)).unwrap();
        listener.offer(stream, peer, 0);

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn worker_pool_grows_when_queue_already_has_a_backlog() {
        let facility = facility(4);
        let queue = ConnectionQueue::new(facility.config.queue_capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut listener = Listener::new(queue.clone(), facility, shutdown);
        listener.bind_plain("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.sockets[0].listener.local_addr().unwrap();

        for _ in 0..2 {
            let _client = TcpStream::connect(addr).unwrap();
            let (stream, peer) = listener.sockets[0].listener.accept_timeout(Duration::from_millis(500)).unwrap();
            listener.offer(stream, peer, 0);
        }

        assert_eq!(listener.workers.len(), 1);
    }

    #[test]
    fn worker_pool_never_exceeds_the_hard_cap() {
        let facility = facility(1);
        let queue = ConnectionQueue::new(facility.config.queue_capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut listener = Listener::new(queue.clone(), facility, shutdown);
        listener.bind_plain("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.sockets[0].listener.local_addr().unwrap();

        for _ in 0..3 {
            let _client = TcpStream::connect(addr).unwrap();
            let (stream, peer) = listener.sockets[0].listener.accept_timeout(Duration::from_millis(500)).unwrap();
            listener.offer(stream, peer, 0);
        }

        assert!(listener.workers.len() <= 1);
    }
}
