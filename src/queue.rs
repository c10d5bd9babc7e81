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

//! The connection queue (§4.1): a bounded FIFO hand-off of accepted sockets
//! from the listener thread to the worker pool.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendError, Sender, TrySendError};

use crate::net::Connection;

/// Bounded, thread-safe FIFO of accepted connections.
///
/// Grounded in the teacher's `listener.rs`/`worker.rs`, which already hand
/// off work between threads with `crossbeam_channel::{Sender, Receiver}`;
/// here the channel is capacity-bounded to match §4.1 ("capacity is small,
/// <= worker-pool limit") and `offer` never blocks the listener's accept
/// path.
#[derive(Clone)]
pub struct ConnectionQueue {
    tx: Sender<Connection>,
    rx: Receiver<Connection>,
}

/// Error returned by [`ConnectionQueue::offer`] when the queue is full.
#[derive(Debug)]
pub struct QueueFull(pub Connection);

impl ConnectionQueue {
    /// Creates a queue with the given bounded capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Non-blocking offer. Fails immediately (without blocking the listener)
    /// if the queue is already full, handing the connection back to the
    /// caller so it can be logged and closed.
    pub fn offer(&self, conn: Connection) -> Result<(), QueueFull> {
        match self.tx.try_send(conn) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(c)) => Err(QueueFull(c)),
            Err(TrySendError::Disconnected(c)) => Err(QueueFull(c)),
        }
    }

    /// Current number of connections waiting to be taken by a worker.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// True when no connection is waiting.
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Blocking take, bounded by `timeout` so a worker can periodically
    /// check for a shutdown request (§4.1, §5 "observed within <= 500ms").
    pub fn take(&self, timeout: Duration) -> Result<Connection, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Closes the sending side; outstanding `take` calls will drain the
    /// queue and then return `Disconnected`.
    pub fn close(self) -> Result<(), SendError<()>> {
        drop(self.tx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn dummy_connection() -> Connection {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).unwrap();
        let (stream, _) = listener.accept().unwrap();
        Connection::plain(stream)
    }

    #[test]
    fn offer_fails_when_full_without_blocking() {
        let queue = ConnectionQueue::new(1);
        queue.offer(dummy_connection()).unwrap();
        let result = queue.offer(dummy_connection());
        assert!(result.is_err());
    }

    #[test]
    fn take_returns_in_fifo_order() {
        let queue = ConnectionQueue::new(4);
        for _ in 0..3 {
            queue.offer(dummy_connection()).unwrap();
        }
        for _ in 0..3 {
            assert!(queue.take(Duration::from_millis(50)).is_ok());
        }
        assert!(queue.take(Duration::from_millis(50)).is_err());
    }
}
