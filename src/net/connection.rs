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

//! The `Connection` type: an accepted transport endpoint, tagged
//! secure/insecure, carrying the peer address (§3 Data Model).
//!
//! Ownership: created by the listener, briefly held in the
//! [`crate::queue::ConnectionQueue`], transferred exclusively to one worker,
//! then either released on HTTP completion or transferred into a
//! [`crate::ws::session`] for the lifetime of that session.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::{ServerConfig, ServerConnection, StreamOwned};

/// Whether a connection arrived on the plain or TLS listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// Accepted on the plain HTTP port.
    Insecure,
    /// Accepted on the HTTPS port and TLS-terminated.
    Secure,
}

/// An accepted transport endpoint. See module docs.
pub enum Connection {
    /// Plaintext TCP.
    Plain(std::net::TcpStream),
    /// TLS-terminated TCP, handshake performed lazily on the worker to keep
    /// the listener's accept path non-blocking (§4.2).
    Tls(Box<StreamOwned<ServerConnection, std::net::TcpStream>>),
}

impl Connection {
    /// Wraps a freshly accepted plaintext socket.
    pub fn plain(stream: std::net::TcpStream) -> Self {
        Connection::Plain(stream)
    }

    /// Wraps a freshly accepted socket behind TLS, performing the handshake
    /// on the calling thread (the worker, not the listener).
    pub fn tls(stream: std::net::TcpStream, config: Arc<ServerConfig>) -> io::Result<Self> {
        let conn = ServerConnection::new(config)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Connection::Tls(Box::new(StreamOwned::new(conn, stream))))
    }

    /// Tags whether this connection arrived over TLS.
    pub fn security(&self) -> Security {
        match self {
            Connection::Plain(_) => Security::Insecure,
            Connection::Tls(_) => Security::Secure,
        }
    }

    /// Peer socket address.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Connection::Plain(s) => s.peer_addr(),
            Connection::Tls(s) => s.sock.peer_addr(),
        }
    }

    /// Sets the blocking read timeout on the underlying socket (bounded
    /// waits everywhere per §5).
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Connection::Plain(s) => s.set_read_timeout(timeout),
            Connection::Tls(s) => s.sock.set_read_timeout(timeout),
        }
    }

    /// Sets the blocking write timeout, matching the bounded output flush
    /// deadline carried from the original implementation.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Connection::Plain(s) => s.set_write_timeout(timeout),
            Connection::Tls(s) => s.sock.set_write_timeout(timeout),
        }
    }

}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Plain(s) => s.read(buf),
            Connection::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Plain(s) => s.write(buf),
            Connection::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Plain(s) => s.flush(),
            Connection::Tls(s) => s.flush(),
        }
    }
}
