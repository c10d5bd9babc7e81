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

//! External collaborators (§6): interface contracts for the subsystems this
//! crate consumes rather than implements — the HTTP/1.1 parser (see
//! [`crate::http::request::read_request`] instead, which is the thin
//! in-scope facade), the security server, the image repository, the
//! rendering engine, and the polling service.

pub mod image_repo;
pub mod polling;
pub mod rendering;
pub mod script;
pub mod security;

pub use image_repo::{ImageRead, ImageRepoError, ImageRepository, MockImageRepository, ResourceKind};
pub use polling::{FieldKey, FieldValue, MockPollingService, PollingService, Subscription};
pub use rendering::{MockRenderingEngine, MockRenderingView, RenderingEngine, RenderingView, ViewUpdate};
pub use script::{resolve_class_name, MockScriptEngine, MockScriptHandler, ScriptEngine, ScriptHandler};
pub use security::{LoginResult, MockSecurityService, SecurityError, SecurityService, Token, WebAccount};
