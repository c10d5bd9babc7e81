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

//! A narrow abstraction over a blocking TCP listener.

use std::io::{Error, Result};
use std::net::SocketAddr;
use std::time::Duration;

use super::tcp_stream::TcpStream;

/// Blocking TCP listener operations used by [`crate::Listener`].
pub trait TcpListener<S: TcpStream> {
    /// Binds a listening socket to `addr`.
    fn bind(addr: SocketAddr) -> Result<Self>
    where
        Self: Sized;

    /// Accepts the next inbound connection, blocking for at most
    /// `timeout` per underlying poll. Implementations may return
    /// `ErrorKind::WouldBlock` / `ErrorKind::TimedOut` on timeout.
    fn accept_timeout(&self, timeout: Duration) -> Result<(S, SocketAddr)>;

    /// Local address the listener is bound to.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Returns and clears the last pending socket-level error, if any.
    fn take_error(&self) -> Result<Option<Error>>;
}

/// `std::net::TcpListener` does not support a per-accept timeout directly;
/// this wraps it with a non-blocking poll loop bounded by `timeout`,
/// matching §4.2's "wait <= 250 ms for a connection" requirement without
/// requiring an async reactor.
pub struct StdTcpListener(std::net::TcpListener);

impl StdTcpListener {
    /// Wraps a bound `std::net::TcpListener`, switching it into non-blocking
    /// mode so `accept_timeout` can poll it.
    pub fn from_std(inner: std::net::TcpListener) -> Result<Self> {
        inner.set_nonblocking(true)?;
        Ok(Self(inner))
    }
}

impl TcpListener<std::net::TcpStream> for StdTcpListener {
    fn bind(addr: SocketAddr) -> Result<Self> {
        Self::from_std(std::net::TcpListener::bind(addr)?)
    }

    fn accept_timeout(
        &self,
        timeout: Duration,
    ) -> Result<(std::net::TcpStream, SocketAddr)> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            match self.0.accept() {
                Ok((stream, addr)) => {
                    stream.set_nonblocking(false)?;
                    return Ok((stream, addr));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if std::time::Instant::now() >= deadline {
                        return Err(Error::new(std::io::ErrorKind::TimedOut, "accept timed out"));
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.0.local_addr()
    }

    fn take_error(&self) -> Result<Option<Error>> {
        self.0.take_error()
    }
}
