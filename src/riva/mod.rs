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

//! The RIVA (remote interactive viewer) session variant (§4.9): hosts a
//! headless instance of the rendering engine behind a WebSocket, via a
//! two-thread cooperative model that emulates the engine's single-threaded
//! GUI-loop contract.

pub mod bailout;
pub mod display_sink;
pub mod events;
pub mod gui_thread;
pub mod image_cache;
pub mod session;
pub mod shadow_device;
pub mod variant;

pub use bailout::BailoutFlag;
pub use display_sink::DisplaySink;
pub use events::{DispatchOutcome, GuiEvent, GuiEventQueue};
pub use gui_thread::GuiThread;
pub use image_cache::{build_chunks, ImageChunk, RemoteImageCache};
pub use shadow_device::ShadowDevice;
pub use variant::{RivaLoginParams, RivaVariant};
