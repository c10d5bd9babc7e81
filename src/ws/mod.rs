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

//! The WebSocket session core (§4.6, §4.7, §4.8): framing, the generic
//! session loop, and the script-language variant. The RIVA variant lives in
//! [`crate::riva::variant`] since it depends on the faux-GUI thread.

pub mod framing;
pub mod script_variant;
pub mod session;

pub use framing::{accept_key, Frame, FrameError, MessageAssembler, Opcode, WS_GUID};
pub use script_variant::ScriptSessionVariant;
pub use session::{
    run_session, CloseReason, EgressMessage, EgressQueue, FieldPoller, FieldSubscription, Liveness, MessageOutcome,
    SessionState, SessionVariant,
};
