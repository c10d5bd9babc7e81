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

//! A narrow abstraction over a blocking TCP stream, so that workers and
//! sessions can be exercised in tests against a channel-backed fake without
//! touching a real socket.

use std::io::{Error, Result};
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;

/// Blocking TCP stream operations used by a [`crate::net::Connection`].
pub trait TcpStream {
    /// Peer address of the connection.
    fn peer_addr(&self) -> Result<SocketAddr>;

    /// Local address of the connection.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Shuts down the read, write, or both halves of the connection.
    fn shutdown(&self, how: Shutdown) -> Result<()>;

    /// Sets `TCP_NODELAY`.
    fn set_nodelay(&self, nodelay: bool) -> Result<()>;

    /// Sets the blocking read timeout, so loops can poll for shutdown.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// Sets the blocking write timeout, matching the worker's bounded write
    /// deadline.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// Returns and clears the last pending socket-level error, if any.
    fn take_error(&self) -> Result<Option<Error>>;

    /// Peeks at incoming bytes without consuming them.
    fn peek(&self, buf: &mut [u8]) -> Result<usize>;

    /// Creates an independently owned handle to the same socket.
    fn try_clone(&self) -> Result<Self>
    where
        Self: Sized;
}

impl TcpStream for std::net::TcpStream {
    #[inline]
    fn peer_addr(&self) -> Result<SocketAddr> {
        Self::peer_addr(self)
    }

    #[inline]
    fn local_addr(&self) -> Result<SocketAddr> {
        Self::local_addr(self)
    }

    #[inline]
    fn shutdown(&self, how: Shutdown) -> Result<()> {
        Self::shutdown(self, how)
    }

    #[inline]
    fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        Self::set_nodelay(self, nodelay)
    }

    #[inline]
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Self::set_read_timeout(self, timeout)
    }

    #[inline]
    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Self::set_write_timeout(self, timeout)
    }

    #[inline]
    fn take_error(&self) -> Result<Option<Error>> {
        Self::take_error(self)
    }

    #[inline]
    fn peek(&self, buf: &mut [u8]) -> Result<usize> {
        Self::peek(self, buf)
    }

    #[inline]
    fn try_clone(&self) -> Result<Self> {
        Self::try_clone(self)
    }
}
