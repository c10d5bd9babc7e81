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

//! Rendering engine collaborator (§6, §4.9). Graphics primitives and widget
//! layout are a Non-goal; RIVA only calls this narrow lifecycle + per-session
//! view contract, the same shape the faux-GUI thread drives in the original.

use std::sync::Arc;

use crate::riva::bailout::BailoutFlag;
use crate::riva::shadow_device::ShadowDevice;

/// A point in virtual-display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// A size in virtual-display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

/// An axis-aligned region, used for partial redraws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

/// Direction of a flick gesture (§4.9 input protocol: "flick-style, not
/// inertial drag" for remote mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlickDir {
    Up,
    Down,
    Left,
    Right,
}

/// Opaque handle to a widget inside a loaded template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WidgetId(pub u64);

/// Errors from template load / widget dispatch.
#[derive(Debug, Clone)]
pub struct RenderError(pub String);

/// A drain callback the rendering engine invokes to re-enter the faux-GUI
/// event loop at a deeper nesting level when a widget command opens a
/// popup (§4.9 "Two-thread cooperative model").
pub type ModalDrain<'a> = dyn FnMut(&BailoutFlag) + 'a;

/// One client-bound change the view has queued since the last drain, to be
/// serialised onto the WebSocket egress (§4.9 "Display pipeline", "Image
/// protocol"; §6 RIVA wire opcodes `CreateRemWidget`..`ImgDataNext`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdate {
    CreateWidget { widget: WidgetId, kind: String },
    DestroyWidget { widget: WidgetId },
    SetWidgetVisible { widget: WidgetId, visible: bool },
    SetWidgetImage {
        widget: WidgetId,
        path: String,
        serial: u64,
        encoded: Vec<u8>,
        width: u32,
        height: u32,
        is_png: bool,
    },
    SpecialAction { widget: WidgetId, action: String },
}

/// Per-session rendering view, owned by the RIVA session and driven
/// exclusively by the faux-GUI thread (§5 "shadow graphics device is
/// touched only by the faux-GUI thread").
pub trait RenderingView: Send {
    /// Loads a template by name, returning human-readable errors instead of
    /// failing hard so the session can report a `LoginResult` failure
    /// message (§4.9 "Login and handshake").
    fn initialize(&mut self, template: &str) -> Result<(), Vec<String>>;

    /// 100ms periodic pass (`ActiveUpdate`).
    fn do_active_update_pass(&mut self);

    /// 250ms periodic pass (`ValueUpdate`).
    fn do_update_pass(&mut self);

    /// 2s periodic pass (`EventUpdate`); for slower-changing field groups.
    fn do_event_update_pass(&mut self);

    /// 1s periodic timeout check (`CheckTimeout`); returns true if the view
    /// wants the session to end.
    fn check_timeout(&mut self) -> bool;

    /// Repaints, optionally scoped to `area`.
    fn redraw(&mut self, area: Option<Rect>);

    /// The virtual display was resized.
    fn new_size(&mut self, size: Size);

    /// A tap/click gesture landed at `point`.
    fn clicked(&mut self, point: Point);

    /// A flick gesture starting at `start` in direction `dir`.
    fn process_flick(&mut self, dir: FlickDir, start: Point);

    /// A host-key shortcut was pressed.
    fn hot_key(&mut self, key: char);

    /// Whether a modal popup is currently active.
    fn has_popups(&self) -> bool;

    /// Runs a re-entrant modal drain loop on the calling (faux-GUI) thread
    /// until the popup closes or `bailout` is set. `no_escape` disables the
    /// Escape-to-cancel shortcut for non-dismissable popups.
    fn run_modal_loop(&mut self, bailout: &BailoutFlag, no_escape: bool, drain: &mut ModalDrain<'_>);

    /// Looks up a widget by id for a dispatched action (§4.9).
    fn widget(&self, id: WidgetId) -> Option<&dyn std::any::Any>;

    /// Drains the display/image updates queued since the last drain
    /// (§4.9 "Display pipeline"). Called by the faux-GUI thread after each
    /// event it applies.
    fn take_updates(&mut self) -> Vec<ViewUpdate>;
}

/// Lifecycle for the engine that creates per-session views.
pub trait RenderingEngine: Send + Sync {
    /// Starts the engine, wiring it to the polling service for field reads.
    fn start(&self, polling: Arc<dyn super::polling::PollingService>) -> Result<(), RenderError>;

    /// Stops the engine.
    fn stop(&self);

    /// Creates a new per-session view at the given virtual display size.
    fn create_view(&self, size: Size) -> Box<dyn RenderingView>;
}

/// The mock's single full-screen widget: its [`ShadowDevice`] snapshot is
/// reported as this widget's image (§4.9 "Display pipeline").
const SCREEN_WIDGET: WidgetId = WidgetId(0);

/// A rendering view sufficient for tests and the standalone binary: paints
/// into a real [`ShadowDevice`] and reports dirty regions as image updates,
/// instead of actually laying out widgets (a Non-goal).
pub struct MockRenderingView {
    pub initialized_with: Option<String>,
    pub active_updates: u32,
    pub value_updates: u32,
    pub event_updates: u32,
    pub timeouts_checked: u32,
    pub clicks: Vec<Point>,
    pub flicks: Vec<(FlickDir, Point)>,
    pending_updates: Vec<ViewUpdate>,
    device: ShadowDevice,
    image_serial: u64,
}

impl Default for MockRenderingView {
    fn default() -> Self {
        Self::new(Size { width: 1, height: 1 })
    }
}

impl MockRenderingView {
    pub fn new(size: Size) -> Self {
        Self {
            initialized_with: None,
            active_updates: 0,
            value_updates: 0,
            event_updates: 0,
            timeouts_checked: 0,
            clicks: Vec::new(),
            flicks: Vec::new(),
            pending_updates: Vec::new(),
            device: ShadowDevice::new(size),
            image_serial: 0,
        }
    }

    /// Test helper: queues an update a future `take_updates()` will drain.
    pub fn queue_update(&mut self, update: ViewUpdate) {
        self.pending_updates.push(update);
    }
}

impl RenderingView for MockRenderingView {
    fn initialize(&mut self, template: &str) -> Result<(), Vec<String>> {
        self.initialized_with = Some(template.to_string());
        self.device.mark_dirty(None);
        Ok(())
    }

    fn do_active_update_pass(&mut self) {
        self.active_updates += 1;
    }

    fn do_update_pass(&mut self) {
        self.value_updates += 1;
    }

    fn do_event_update_pass(&mut self) {
        self.event_updates += 1;
    }

    fn check_timeout(&mut self) -> bool {
        self.timeouts_checked += 1;
        false
    }

    fn redraw(&mut self, area: Option<Rect>) {
        self.device.mark_dirty(area);
    }

    fn new_size(&mut self, size: Size) {
        self.device.resize(size);
    }

    fn clicked(&mut self, point: Point) {
        self.clicks.push(point);
    }

    fn process_flick(&mut self, dir: FlickDir, start: Point) {
        self.flicks.push((dir, start));
    }

    fn hot_key(&mut self, _key: char) {}

    fn has_popups(&self) -> bool {
        false
    }

    fn run_modal_loop(
        &mut self,
        _bailout: &BailoutFlag,
        _no_escape: bool,
        _drain: &mut ModalDrain<'_>,
    ) {
    }

    fn widget(&self, _id: WidgetId) -> Option<&dyn std::any::Any> {
        None
    }

    fn take_updates(&mut self) -> Vec<ViewUpdate> {
        if self.device.take_dirty().is_some() {
            self.image_serial += 1;
            self.pending_updates.push(ViewUpdate::SetWidgetImage {
                widget: SCREEN_WIDGET,
                path: "/Riva/Screen".to_string(),
                serial: self.image_serial,
                encoded: self.device.snapshot().to_vec(),
                width: self.device.size().width,
                height: self.device.size().height,
                is_png: false,
            });
        }
        std::mem::take(&mut self.pending_updates)
    }
}

/// A rendering engine that hands out [`MockRenderingView`]s, for tests.
#[derive(Default)]
pub struct MockRenderingEngine;

impl RenderingEngine for MockRenderingEngine {
    fn start(&self, _polling: Arc<dyn super::polling::PollingService>) -> Result<(), RenderError> {
        Ok(())
    }

    fn stop(&self) {}

    fn create_view(&self, size: Size) -> Box<dyn RenderingView> {
        Box::new(MockRenderingView::new(size))
    }
}
