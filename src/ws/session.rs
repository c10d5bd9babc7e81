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

//! The WebSocket session loop (§4.7, §3): per-session state machine,
//! egress queue, ping/timeout liveness, and field-polling fan-in. Variants
//! ([`super::script_variant`], [`crate::riva`]) plug in through
//! [`SessionVariant`].

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::collaborators::polling::{FieldKey, FieldValue, PollingService, Subscription};
use crate::net::Connection;

use super::framing::{self, FrameError, MessageAssembler, Opcode};

/// §3 "WebSocket session ... state".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    InMsg,
    Ready,
    WaitClientEnd,
    End,
}

/// Inactivity fails the session after this long without any inbound frame
/// (§4.7 step 2).
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(120);
/// A ping is probed once this long has passed with no pong pending (§4.7).
pub const PING_INTERVAL: Duration = Duration::from_secs(25);
/// How long a locally-initiated close waits for the peer's reply (§4.7
/// "Graceful close").
pub const CLOSE_WAIT: Duration = Duration::from_secs(10);
/// Warm-up before the first field poll (§4.7 step 3).
const FIELD_POLL_WARMUP: Duration = Duration::from_secs(3);
/// Field poll cadence after warm-up.
const FIELD_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Per-iteration wait bound on the egress/readable multi-wait (§4.7 step 4).
pub const LOOP_WAIT: Duration = Duration::from_millis(250);

/// Tracks last-seen activity and ping/pong bookkeeping for one session.
pub struct Liveness {
    last_in: Instant,
    last_out: Instant,
    pong_pending: bool,
    next_ping_cookie: u32,
}

impl Liveness {
    pub fn new(now: Instant) -> Self {
        Self {
            last_in: now,
            last_out: now,
            pong_pending: false,
            next_ping_cookie: 1,
        }
    }

    pub fn mark_in(&mut self, now: Instant) {
        self.last_in = now;
    }

    pub fn mark_out(&mut self, now: Instant) {
        self.last_out = now;
    }

    pub fn clear_pong_pending(&mut self) {
        self.pong_pending = false;
    }

    /// True once `now - last_in` exceeds [`INACTIVITY_TIMEOUT`] (§4.7 step 2).
    pub fn is_timed_out(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_in) > INACTIVITY_TIMEOUT
    }

    /// If a ping is due, returns its cookie and marks one pending.
    pub fn take_due_ping(&mut self, now: Instant) -> Option<u32> {
        if self.pong_pending {
            return None;
        }
        if now.saturating_duration_since(self.last_in) <= PING_INTERVAL {
            return None;
        }
        let cookie = self.next_ping_cookie;
        self.next_ping_cookie = self.next_ping_cookie.wrapping_add(1);
        self.pong_pending = true;
        Some(cookie)
    }
}

/// One subscribed (device, field) pair with its last-seen value (§3 "field
/// subscriptions").
pub struct FieldSubscription {
    pub moniker: String,
    pub field: String,
    pub handle: Subscription,
    pub last_value: FieldValue,
}

/// Drives the once-per-second field poll fan-in (§4.7 step 3).
pub struct FieldPoller {
    subscriptions: Vec<FieldSubscription>,
    started_at: Instant,
    next_poll: Instant,
}

impl FieldPoller {
    pub fn new(now: Instant) -> Self {
        Self {
            subscriptions: Vec::new(),
            started_at: now,
            next_poll: now + FIELD_POLL_WARMUP,
        }
    }

    pub fn subscribe(&mut self, service: &dyn PollingService, moniker: &str, field: &str) {
        let handle = service.register_field(moniker, field);
        let last_value = service.last_value(&handle);
        self.subscriptions.push(FieldSubscription {
            moniker: moniker.to_string(),
            field: field.to_string(),
            handle,
            last_value,
        });
    }

    /// Polls every subscription if due, returning the changed ones.
    /// Reschedules the next poll regardless of whether this one ran.
    pub fn poll_if_due(&mut self, service: &dyn PollingService, now: Instant) -> Vec<(String, String, FieldValue)> {
        if now < self.next_poll {
            return Vec::new();
        }
        self.next_poll = now + FIELD_POLL_INTERVAL;
        let mut changed = Vec::new();
        for sub in &mut self.subscriptions {
            if let Some(value) = service.update_value(&sub.handle) {
                sub.last_value = value.clone();
                changed.push((sub.moniker.clone(), sub.field.clone(), value));
            }
        }
        changed
    }

    pub fn key_for(&self, moniker: &str, field: &str) -> FieldKey {
        FieldKey::new(moniker, field)
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

/// One entry in the egress queue: a whole message ready to be framed out.
pub struct EgressMessage {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

/// Soft-capped FIFO of outgoing messages, paired with a non-empty
/// condition so the session loop never busy-polls it (§3, §5).
pub struct EgressQueue {
    inner: Mutex<std::collections::VecDeque<EgressMessage>>,
    not_empty: Condvar,
    soft_cap: usize,
}

impl EgressQueue {
    pub fn new(soft_cap: usize) -> Self {
        Self {
            inner: Mutex::new(std::collections::VecDeque::new()),
            not_empty: Condvar::new(),
            soft_cap,
        }
    }

    pub fn push(&self, message: EgressMessage) {
        let mut queue = self.inner.lock();
        queue.push_back(message);
        if queue.len() > self.soft_cap {
            warn!(len = queue.len(), cap = self.soft_cap, "egress queue over soft cap");
        }
        self.not_empty.notify_one();
    }

    pub fn try_pop(&self) -> Option<EgressMessage> {
        self.inner.lock().pop_front()
    }

    pub fn wait_non_empty(&self, timeout: Duration) -> bool {
        let mut queue = self.inner.lock();
        if queue.is_empty() {
            self.not_empty.wait_for(&mut queue, timeout);
        }
        !queue.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Outcome a variant reports from handling one complete text/binary
/// message, controlling whether the loop continues (§4.7 step 6).
pub enum MessageOutcome {
    Continue,
    Close,
}

/// Per-session behaviour a variant plugs into the generic loop (§4.7, §4.8,
/// §4.9). All callbacks run on the session thread.
pub trait SessionVariant: Send {
    fn connected(&mut self, egress: &Arc<EgressQueue>);
    fn process_message(&mut self, text: &str, egress: &Arc<EgressQueue>) -> MessageOutcome;
    fn field_changed(&mut self, moniker: &str, field: &str, value: &FieldValue, egress: &Arc<EgressQueue>);
    fn idle(&mut self, egress: &Arc<EgressQueue>);
    fn disconnected(&mut self);
}

/// Close codes the loop assigns internally; these never reach the wire as
/// anything but an empty close payload in this façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Exiting,
    Timeout,
    BadData,
    ProtocolError,
    PeerInitiated,
    LocalInitiated,
}

/// Runs one session to completion on the calling thread (§5 "two threads
/// per RIVA session", "one thread each" for script sessions — this loop is
/// the session half in both cases).
pub fn run_session(
    mut connection: Connection,
    egress: Arc<EgressQueue>,
    polling: Arc<dyn PollingService>,
    mut poller: FieldPoller,
    mut variant: Box<dyn SessionVariant>,
    max_fragment: usize,
) {
    let _ = connection.set_read_timeout(Some(LOOP_WAIT));
    let mut assembler = MessageAssembler::new();
    let mut liveness = Liveness::new(Instant::now());
    let mut state = SessionState::Ready;
    let mut close_sent_at: Option<Instant> = None;

    variant.connected(&egress);

    loop {
        if state == SessionState::End {
            break;
        }

        let now = Instant::now();

        if liveness.is_timed_out(now) {
            debug!("session timed out, closing");
            egress.push(EgressMessage {
                opcode: Opcode::Close,
                payload: Vec::new(),
            });
            state = SessionState::End;
        }

        if let Some(cookie) = liveness.take_due_ping(now) {
            egress.push(EgressMessage {
                opcode: Opcode::Ping,
                payload: cookie.to_be_bytes().to_vec(),
            });
        }

        for (moniker, field, value) in poller.poll_if_due(polling.as_ref(), now) {
            variant.field_changed(&moniker, &field, &value, &egress);
        }

        let had_egress = egress.wait_non_empty(LOOP_WAIT);
        if had_egress {
            if let Some(message) = egress.try_pop() {
                let write_result = match message.opcode {
                    Opcode::Close | Opcode::Ping | Opcode::Pong => {
                        framing::write_control(&mut connection, message.opcode, &message.payload)
                    }
                    _ => framing::write_message(&mut connection, message.opcode, &message.payload),
                };
                liveness.mark_out(Instant::now());
                if write_result.is_err() {
                    break;
                }
                if message.opcode == Opcode::Close {
                    close_sent_at.get_or_insert_with(Instant::now);
                    if state != SessionState::WaitClientEnd {
                        state = SessionState::WaitClientEnd;
                    }
                }
            }
        }

        match framing::read_frame(&mut connection, max_fragment) {
            Ok(frame) => {
                liveness.mark_in(Instant::now());
                let opcode = frame.opcode;
                match assembler.feed(frame) {
                    Ok(Some((Opcode::Close, _))) => {
                        if state == SessionState::WaitClientEnd {
                            state = SessionState::End;
                        } else {
                            egress.push(EgressMessage {
                                opcode: Opcode::Close,
                                payload: Vec::new(),
                            });
                            state = SessionState::End;
                        }
                    }
                    Ok(Some((Opcode::Ping, payload))) => {
                        egress.push(EgressMessage {
                            opcode: Opcode::Pong,
                            payload,
                        });
                    }
                    Ok(Some((Opcode::Pong, _))) => {
                        liveness.clear_pong_pending();
                    }
                    Ok(Some((Opcode::Text, payload))) | Ok(Some((Opcode::Binary, payload))) => {
                        match std::str::from_utf8(&payload) {
                            Ok(text) => {
                                if let MessageOutcome::Close = variant.process_message(text, &egress) {
                                    egress.push(EgressMessage {
                                        opcode: Opcode::Close,
                                        payload: Vec::new(),
                                    });
                                    state = SessionState::WaitClientEnd;
                                }
                            }
                            Err(_) => {
                                egress.push(EgressMessage {
                                    opcode: Opcode::Close,
                                    payload: Vec::new(),
                                });
                                state = SessionState::End;
                            }
                        }
                    }
                    Ok(Some((Opcode::Continuation, _))) | Ok(None) => {}
                    Err(_protocol_error) => {
                        egress.push(EgressMessage {
                            opcode: Opcode::Close,
                            payload: Vec::new(),
                        });
                        state = SessionState::End;
                    }
                }
            }
            Err(FrameError::Closed) => {
                state = SessionState::End;
            }
            Err(FrameError::Io) => {
                // read timeout (bounded wait elapsed with nothing to read)
                variant.idle(&egress);
            }
            Err(_protocol_error) => {
                egress.push(EgressMessage {
                    opcode: Opcode::Close,
                    payload: Vec::new(),
                });
                state = SessionState::End;
            }
        }

        if state == SessionState::WaitClientEnd {
            if let Some(sent_at) = close_sent_at {
                if now.saturating_duration_since(sent_at) > CLOSE_WAIT {
                    state = SessionState::End;
                }
            }
        }
    }

    variant.disconnected();
    let _ = connection.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::polling::MockPollingService;

    #[test]
    fn ping_is_due_after_interval_with_no_reply() {
        let start = Instant::now();
        let mut liveness = Liveness::new(start);
        assert!(liveness.take_due_ping(start).is_none());
        let later = start + PING_INTERVAL + Duration::from_millis(1);
        assert!(liveness.take_due_ping(later).is_some());
        assert!(liveness.take_due_ping(later).is_none());
    }

    #[test]
    fn inbound_activity_resets_timeout() {
        let start = Instant::now();
        let mut liveness = Liveness::new(start);
        let almost_timed_out = start + INACTIVITY_TIMEOUT - Duration::from_millis(1);
        assert!(!liveness.is_timed_out(almost_timed_out));
        liveness.mark_in(almost_timed_out);
        let just_after = almost_timed_out + Duration::from_millis(2);
        assert!(!liveness.is_timed_out(just_after));
    }

    #[test]
    fn field_poll_waits_out_warmup_then_runs_once_per_second() {
        let start = Instant::now();
        let service = MockPollingService::new();
        let mut poller = FieldPoller::new(start);
        poller.subscribe(&service, "LR-Thermo", "Temperature");

        assert!(poller.poll_if_due(&service, start).is_empty());

        service.set(
            poller.key_for("LR-Thermo", "Temperature"),
            FieldValue {
                formatted: "72".into(),
                valid: true,
            },
        );

        let after_warmup = start + FIELD_POLL_WARMUP + Duration::from_millis(1);
        let changed = poller.poll_if_due(&service, after_warmup);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].2.formatted, "72");

        assert!(poller.poll_if_due(&service, after_warmup).is_empty());
    }

    #[test]
    fn egress_queue_is_fifo() {
        let queue = EgressQueue::new(4);
        queue.push(EgressMessage {
            opcode: Opcode::Text,
            payload: b"a".to_vec(),
        });
        queue.push(EgressMessage {
            opcode: Opcode::Text,
            payload: b"b".to_vec(),
        });
        assert_eq!(queue.try_pop().unwrap().payload, b"a");
        assert_eq!(queue.try_pop().unwrap().payload, b"b");
        assert!(queue.try_pop().is_none());
    }
}
