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

//! Forwards the faux-GUI thread's [`ViewUpdate`]s onto the WebSocket egress
//! (§4.9 "Display pipeline", "Image protocol"), eliding image retransmission
//! via the [`RemoteImageCache`].

use std::sync::Arc;

use parking_lot::Mutex;

use crate::collaborators::rendering::ViewUpdate;
use crate::ws::framing::Opcode;
use crate::ws::session::{EgressMessage, EgressQueue};

use super::image_cache::{build_chunks, RemoteImageCache};
use super::session::RivaOutbound;

/// Owns the handles the faux-GUI thread needs to turn a drained batch of
/// [`ViewUpdate`]s into wire messages.
pub struct DisplaySink {
    egress: Arc<EgressQueue>,
    cache: Arc<Mutex<RemoteImageCache>>,
}

impl DisplaySink {
    pub fn new(egress: Arc<EgressQueue>, cache: Arc<Mutex<RemoteImageCache>>) -> Self {
        Self { egress, cache }
    }

    fn send(&self, message: RivaOutbound) {
        self.egress.push(EgressMessage {
            opcode: Opcode::Text,
            payload: message.to_json().to_string().into_bytes(),
        });
    }

    /// Translates and forwards one batch of display updates. An image is
    /// chunked and sent only when the client isn't already known to hold it
    /// at the given serial (§4.9 "Image protocol").
    pub fn flush(&self, updates: Vec<ViewUpdate>) {
        for update in updates {
            match update {
                ViewUpdate::CreateWidget { widget, kind } => {
                    self.send(RivaOutbound::CreateRemWidget { widget: widget.0, kind });
                }
                ViewUpdate::DestroyWidget { widget } => {
                    self.send(RivaOutbound::DestroyRemWidget { widget: widget.0 });
                }
                ViewUpdate::SetWidgetVisible { widget, visible } => {
                    self.send(RivaOutbound::SetRemWidgetVis { widget: widget.0, visible });
                }
                ViewUpdate::SetWidgetImage {
                    widget,
                    path,
                    serial,
                    encoded,
                    width,
                    height,
                    is_png,
                } => {
                    if !self.cache.lock().has_current(&path, serial) {
                        for chunk in build_chunks(&path, serial, &encoded, width, height, is_png) {
                            self.send(RivaOutbound::Image(chunk));
                        }
                        self.cache.lock().record(&path, serial);
                    }
                    self.send(RivaOutbound::SetRemWidgetURL { widget: widget.0, path });
                }
                ViewUpdate::SpecialAction { widget, action } => {
                    self.send(RivaOutbound::SpecialAction { widget: widget.0, action });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::rendering::WidgetId;
    use crate::riva::session::RivaOpCode;

    fn sink() -> (DisplaySink, Arc<EgressQueue>, Arc<Mutex<RemoteImageCache>>) {
        let egress = Arc::new(EgressQueue::new(8));
        let cache = Arc::new(Mutex::new(RemoteImageCache::new()));
        (DisplaySink::new(Arc::clone(&egress), Arc::clone(&cache)), egress, cache)
    }

    #[test]
    fn new_image_is_chunked_then_referenced_by_widget() {
        let (sink, egress, _cache) = sink();

        sink.flush(vec![ViewUpdate::SetWidgetImage {
            widget: WidgetId(1),
            path: "/Repo/X".to_string(),
            serial: 5,
            encoded: vec![1, 2, 3],
            width: 10,
            height: 10,
            is_png: true,
        }]);

        let first = egress.try_pop().unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&first.payload).unwrap();
        assert_eq!(parsed["OpCode"], serde_json::json!(RivaOpCode::ImgDataFirst.code()));

        let url = egress.try_pop().unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&url.payload).unwrap();
        assert_eq!(parsed["OpCode"], serde_json::json!(RivaOpCode::SetRemWidgetURL.code()));
        assert!(egress.try_pop().is_none());
    }

    #[test]
    fn image_already_current_in_cache_skips_retransmission() {
        let (sink, egress, cache) = sink();
        cache.lock().record("/Repo/X", 5);

        sink.flush(vec![ViewUpdate::SetWidgetImage {
            widget: WidgetId(1),
            path: "/Repo/X".to_string(),
            serial: 5,
            encoded: vec![1, 2, 3],
            width: 10,
            height: 10,
            is_png: true,
        }]);

        let only = egress.try_pop().unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&only.payload).unwrap();
        assert_eq!(parsed["OpCode"], serde_json::json!(RivaOpCode::SetRemWidgetURL.code()));
        assert!(egress.try_pop().is_none());
    }

    #[test]
    fn widget_lifecycle_and_special_action_translate_directly() {
        let (sink, egress, _cache) = sink();
        sink.flush(vec![
            ViewUpdate::CreateWidget { widget: WidgetId(2), kind: "Button".to_string() },
            ViewUpdate::SetWidgetVisible { widget: WidgetId(2), visible: false },
            ViewUpdate::SpecialAction { widget: WidgetId(2), action: "Beep".to_string() },
            ViewUpdate::DestroyWidget { widget: WidgetId(2) },
        ]);

        let codes: Vec<i64> = std::iter::from_fn(|| egress.try_pop())
            .map(|m| serde_json::from_slice::<serde_json::Value>(&m.payload).unwrap()["OpCode"].as_i64().unwrap())
            .collect();
        assert_eq!(
            codes,
            vec![
                RivaOpCode::CreateRemWidget.code(),
                RivaOpCode::SetRemWidgetVis.code(),
                RivaOpCode::SpecialAction.code(),
                RivaOpCode::DestroyRemWidget.code(),
            ]
        );
    }
}
