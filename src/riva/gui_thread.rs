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

//! The faux-GUI thread (§4.9, §5): drains the GUI event queue and drives
//! the rendering engine's per-session view, re-entering itself on the same
//! thread whenever a widget command opens a modal popup.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::collaborators::rendering::RenderingView;

use super::bailout::BailoutFlag;
use super::display_sink::DisplaySink;
use super::events::{DispatchOutcome, GuiEvent, GuiEventQueue};
use super::session::{GestureOutcome, GestureTracker};

/// How long the faux-GUI thread waits for a queue pop before re-checking
/// the bailout flag (§5 "bounded waits everywhere").
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Bound the session waits on the faux-GUI thread's join during teardown
/// (§4.9 "joined with a 5-10 s bound").
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(8);

/// Handle to a running faux-GUI thread.
pub struct GuiThread {
    bailout: BailoutFlag,
    queue: Arc<GuiEventQueue>,
    join: Option<JoinHandle<()>>,
}

impl GuiThread {
    /// Spawns the faux-GUI thread, which owns `view` for its entire
    /// lifetime (§5 "shadow graphics device is touched only by the
    /// faux-GUI thread"). `sink` is how the view's display updates reach
    /// the session's WebSocket egress.
    pub fn spawn(mut view: Box<dyn RenderingView>, queue: Arc<GuiEventQueue>, bailout: BailoutFlag, sink: DisplaySink) -> Self {
        let thread_queue = Arc::clone(&queue);
        let thread_bailout = bailout.clone();
        let join = std::thread::Builder::new()
            .name("riva-faux-gui".into())
            .spawn(move || {
                run_outer_loop(view.as_mut(), &thread_queue, &thread_bailout, &sink);
            })
            .expect("failed to spawn faux-GUI thread");
        Self {
            bailout,
            queue,
            join: Some(join),
        }
    }

    /// Sets the bailout flag, drains any events left on the queue
    /// (releasing pending dispatchers with `Stop`), and joins the thread
    /// with a bounded wait. Idempotent: calling it twice is a no-op after
    /// the first join completes (§4.9 "double-free or second join").
    pub fn shutdown(&mut self) {
        self.bailout.set();
        self.queue.drain_with_stop();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for GuiThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The outermost drain loop: runs until `ExitLoop` is received or bailout
/// is set, handling top-level events and rendezvousing dispatched actions.
fn run_outer_loop(view: &mut dyn RenderingView, queue: &GuiEventQueue, bailout: &BailoutFlag, sink: &DisplaySink) {
    let mut tracker = GestureTracker::new();
    loop {
        if bailout.is_set() {
            return;
        }
        match queue.pop(POLL_INTERVAL) {
            None => continue,
            Some(GuiEvent::ExitLoop) => return,
            Some(event) => {
                dispatch_event(view, queue, bailout, event, sink, &mut tracker);
                sink.flush(view.take_updates());
            }
        }
    }
}

/// Applies one event to `view`. `DispatchAction` may re-enter the event
/// loop at a deeper nesting level if the action opens a popup (§4.9
/// "re-enters the faux-GUI drain loop on the same thread at a deeper
/// nesting level"). `Press`/`Release` are classified through `tracker`
/// (§4.9 "Input protocol": a release inside the breakout box is a click,
/// otherwise a flick).
fn dispatch_event(
    view: &mut dyn RenderingView,
    queue: &GuiEventQueue,
    bailout: &BailoutFlag,
    event: GuiEvent,
    sink: &DisplaySink,
    tracker: &mut GestureTracker,
) {
    match event {
        GuiEvent::ActiveUpdate => view.do_active_update_pass(),
        GuiEvent::ValueUpdate => view.do_update_pass(),
        GuiEvent::EventUpdate => view.do_event_update_pass(),
        GuiEvent::CheckTimeout => {
            view.check_timeout();
        }
        GuiEvent::Press(point) => tracker.press(point),
        GuiEvent::Release(point) => match tracker.release(point) {
            GestureOutcome::Click(p) => view.clicked(p),
            GestureOutcome::Flick(dir, start) => view.process_flick(dir, start),
            GestureOutcome::None => {}
        },
        GuiEvent::Move(_) => {}
        GuiEvent::HotKey(key) => view.hot_key(key),
        GuiEvent::Redraw(area) => view.redraw(area),
        GuiEvent::SizeChange(size) => view.new_size(size),
        GuiEvent::SetVisState(_) => {}
        GuiEvent::CancelInput => tracker.cancel(),
        GuiEvent::AsyncDataCallback { .. } => {}
        GuiEvent::ExitLoop => {}
        GuiEvent::DispatchAction { action, reply, .. } => {
            if bailout.is_set() {
                let _ = reply.send(DispatchOutcome::Stop);
                return;
            }
            if let Some(template) = action.strip_prefix("Initialize:") {
                if view.initialize(template).is_err() {
                    let _ = reply.send(DispatchOutcome::Stop);
                    return;
                }
            }
            if view.has_popups() {
                let view_ptr: *mut dyn RenderingView = view;
                let mut drain = |inner_bailout: &BailoutFlag| {
                    // SAFETY: the faux-GUI thread is the sole, sequential owner
                    // of `view`; `run_modal_loop` does not touch `view` again
                    // until this closure returns, so the reborrow never aliases
                    // a live one.
                    let view = unsafe { &mut *view_ptr };
                    if let Some(next) = queue.pop(POLL_INTERVAL) {
                        dispatch_event(view, queue, inner_bailout, next, sink, &mut *tracker);
                        sink.flush(view.take_updates());
                    }
                };
                view.run_modal_loop(bailout, false, &mut drain);
            }
            let outcome = if bailout.is_set() {
                DispatchOutcome::Stop
            } else {
                DispatchOutcome::Completed
            };
            let _ = reply.send(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::rendering::{MockRenderingView, Point};
    use crate::riva::image_cache::RemoteImageCache;
    use crate::ws::session::EgressQueue;
    use crossbeam_channel::bounded;
    use parking_lot::Mutex;

    fn sink() -> (DisplaySink, Arc<EgressQueue>) {
        let egress = Arc::new(EgressQueue::new(64));
        let cache = Arc::new(Mutex::new(RemoteImageCache::new()));
        (DisplaySink::new(Arc::clone(&egress), cache), egress)
    }

    #[test]
    fn periodic_events_reach_the_view() {
        let mut view = MockRenderingView::default();
        let queue = Arc::new(GuiEventQueue::new());
        let bailout = BailoutFlag::new();
        let (sink, _egress) = sink();

        queue.push(GuiEvent::ActiveUpdate);
        queue.push(GuiEvent::ValueUpdate);
        queue.push(GuiEvent::Press(Point { x: 3, y: 4 }));
        queue.push(GuiEvent::Release(Point { x: 5, y: 6 }));
        queue.push(GuiEvent::ExitLoop);

        run_outer_loop(&mut view, &queue, &bailout, &sink);

        assert_eq!(view.active_updates, 1);
        assert_eq!(view.value_updates, 1);
        assert_eq!(view.clicks, vec![Point { x: 3, y: 4 }]);
    }

    #[test]
    fn release_outside_breakout_box_is_reported_as_a_flick_not_a_click() {
        let mut view = MockRenderingView::default();
        let queue = Arc::new(GuiEventQueue::new());
        let bailout = BailoutFlag::new();
        let (sink, _egress) = sink();

        queue.push(GuiEvent::Press(Point { x: 0, y: 0 }));
        queue.push(GuiEvent::Release(Point { x: 0, y: 200 }));
        queue.push(GuiEvent::ExitLoop);

        run_outer_loop(&mut view, &queue, &bailout, &sink);

        assert!(view.clicks.is_empty());
        assert_eq!(view.flicks.len(), 1);
    }

    #[test]
    fn bailout_releases_pending_dispatch_with_stop() {
        let mut view = MockRenderingView::default();
        let queue = Arc::new(GuiEventQueue::new());
        let bailout = BailoutFlag::new();
        bailout.set();
        let (sink, _egress) = sink();

        let (tx, rx) = bounded(1);
        queue.push(GuiEvent::DispatchAction {
            widget: crate::collaborators::rendering::WidgetId(1),
            action: "Click".into(),
            reply: tx,
        });
        queue.push(GuiEvent::ExitLoop);

        run_outer_loop(&mut view, &queue, &bailout, &sink);

        assert_eq!(rx.try_recv().unwrap(), DispatchOutcome::Stop);
    }

    #[test]
    fn gui_thread_spawn_and_shutdown_joins_cleanly() {
        let view = Box::new(MockRenderingView::default());
        let queue = Arc::new(GuiEventQueue::new());
        let bailout = BailoutFlag::new();
        let (sink, _egress) = sink();
        let mut handle = GuiThread::spawn(view, Arc::clone(&queue), bailout, sink);
        handle.shutdown();
        handle.shutdown();
    }
}
