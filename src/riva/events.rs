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

//! The RIVA GUI event queue (§3, §4.9): typed events consumed by the
//! faux-GUI thread, with a type-deduplicating push for the periodic update
//! events so a slow consumer never backs up a storm of identical ticks.

use std::collections::VecDeque;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};

use crate::collaborators::rendering::{Point, Rect, Size, WidgetId};

/// Result handed back to an action-dispatch rendezvous (§4.9, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The dispatched widget command ran to completion.
    Completed,
    /// The session bailed out before the command could run/finish.
    Stop,
}

/// One GUI event. Each variant carries only the payload it needs (§3).
pub enum GuiEvent {
    /// 100ms periodic pass.
    ActiveUpdate,
    /// 250ms periodic pass.
    ValueUpdate,
    /// 2s periodic pass.
    EventUpdate,
    /// 1s periodic inactivity check.
    CheckTimeout,
    /// Pointer went down at `point`.
    Press(Point),
    /// Pointer came up at `point`.
    Release(Point),
    /// Pointer moved to `point` mid-gesture.
    Move(Point),
    /// A host hot-key fired.
    HotKey(char),
    /// Repaint request, optionally scoped to an area.
    Redraw(Option<Rect>),
    /// The virtual display changed size.
    SizeChange(Size),
    /// The client's tab/window visibility changed.
    SetVisState(bool),
    /// The client cancelled an in-flight gesture.
    CancelInput,
    /// A background action thread wants a widget command run on the
    /// faux-GUI thread, rendezvousing on `reply`.
    DispatchAction {
        widget: WidgetId,
        action: String,
        reply: Sender<DispatchOutcome>,
    },
    /// An async data callback fired (e.g. a completed lookup) and needs to
    /// be delivered on the faux-GUI thread.
    AsyncDataCallback { id: u64, payload: String },
    /// Ask the faux-GUI thread's outermost drain loop to exit.
    ExitLoop,
}

impl GuiEvent {
    /// Periodic events dedup against others of the same variant (§4.9).
    fn dedup_key(&self) -> Option<u8> {
        match self {
            GuiEvent::ActiveUpdate => Some(0),
            GuiEvent::ValueUpdate => Some(1),
            GuiEvent::EventUpdate => Some(2),
            GuiEvent::CheckTimeout => Some(3),
            _ => None,
        }
    }
}

/// Thread-safe GUI event queue with a blocking, timeout-bounded pop and a
/// dedup-aware push.
#[derive(Default)]
pub struct GuiEventQueue {
    inner: Mutex<VecDeque<GuiEvent>>,
    not_empty: Condvar,
}

impl GuiEventQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        }
    }

    /// Pushes an event. For the four periodic variants, the push is a no-op
    /// if one of the same type is already queued (§4.9, §8 property 8).
    pub fn push(&self, event: GuiEvent) {
        let mut queue = self.inner.lock();
        if let Some(key) = event.dedup_key() {
            if queue.iter().any(|e| e.dedup_key() == Some(key)) {
                return;
            }
        }
        queue.push_back(event);
        self.not_empty.notify_one();
    }

    /// Blocks up to `timeout` for the next event (§5 "bounded waits
    /// everywhere").
    pub fn pop(&self, timeout: Duration) -> Option<GuiEvent> {
        let mut queue = self.inner.lock();
        if queue.is_empty() {
            let result = self.not_empty.wait_for(&mut queue, timeout);
            if result.timed_out() && queue.is_empty() {
                return None;
            }
        }
        queue.pop_front()
    }

    /// Drains every queued event, resolving any `DispatchAction` with
    /// `Stop` so no action thread is left hanging (§4.9 bailout invariant).
    pub fn drain_with_stop(&self) {
        let mut queue = self.inner.lock();
        for event in queue.drain(..) {
            if let GuiEvent::DispatchAction { reply, .. } = event {
                let _ = reply.send(DispatchOutcome::Stop);
            }
        }
    }

    /// Number of events currently queued (tests / diagnostics only).
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_events_dedup() {
        let queue = GuiEventQueue::new();
        for _ in 0..1000 {
            queue.push(GuiEvent::ActiveUpdate);
        }
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn non_periodic_events_do_not_dedup() {
        let queue = GuiEventQueue::new();
        queue.push(GuiEvent::Press(Point { x: 0, y: 0 }));
        queue.push(GuiEvent::Press(Point { x: 1, y: 1 }));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn drain_with_stop_resolves_pending_dispatches() {
        let queue = GuiEventQueue::new();
        let (tx, rx) = crossbeam_channel::bounded(1);
        queue.push(GuiEvent::DispatchAction {
            widget: WidgetId(1),
            action: "Click".into(),
            reply: tx,
        });
        queue.drain_with_stop();
        assert_eq!(rx.try_recv().unwrap(), DispatchOutcome::Stop);
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_times_out_when_empty() {
        let queue = GuiEventQueue::new();
        assert!(queue.pop(Duration::from_millis(20)).is_none());
    }
}
