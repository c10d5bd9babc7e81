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

//! Script-language session variant (§4.8): routes WebSocket callbacks into
//! a hosted script's named methods.

use std::sync::Arc;

use crate::collaborators::polling::FieldValue;
use crate::collaborators::script::ScriptHandler;

use super::framing::Opcode;
use super::session::{EgressMessage, EgressQueue, MessageOutcome, SessionVariant};

/// Wraps a loaded [`ScriptHandler`] as a [`SessionVariant`].
pub struct ScriptSessionVariant {
    handler: Box<dyn ScriptHandler>,
}

impl ScriptSessionVariant {
    pub fn new(handler: Box<dyn ScriptHandler>) -> Self {
        Self { handler }
    }

    fn send_text(egress: &EgressQueue, text: String) {
        egress.push(EgressMessage {
            opcode: Opcode::Text,
            payload: text.into_bytes(),
        });
    }
}

impl SessionVariant for ScriptSessionVariant {
    fn connected(&mut self, egress: &Arc<EgressQueue>) {
        if let Some(reply) = self.handler.connected() {
            Self::send_text(egress, reply);
        }
    }

    fn process_message(&mut self, text: &str, egress: &Arc<EgressQueue>) -> MessageOutcome {
        if let Some(reply) = self.handler.process_message(text) {
            Self::send_text(egress, reply);
        }
        MessageOutcome::Continue
    }

    fn field_changed(&mut self, moniker: &str, field: &str, value: &FieldValue, egress: &Arc<EgressQueue>) {
        if let Some(reply) = self.handler.field_changed(moniker, field, value.valid, &value.formatted) {
            Self::send_text(egress, reply);
        }
    }

    fn idle(&mut self, _egress: &Arc<EgressQueue>) {}

    fn disconnected(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::script::MockScriptHandler;
    use crate::ws::session::EgressQueue;

    #[test]
    fn process_message_echoes_through_egress() {
        let mut variant = ScriptSessionVariant::new(Box::new(MockScriptHandler::default()));
        let egress = Arc::new(EgressQueue::new(256));
        variant.connected(&egress);
        variant.process_message("hello", &egress);
        let msg = egress.try_pop().unwrap();
        assert_eq!(msg.payload, b"HELLO");
    }
}
