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

//! Script-language handler collaborator (§4.8, §6): the embedded scripting
//! engine ("CMLBin") that a script-language WebSocket session hosts. Class
//! resolution, loading, and method dispatch all live in that engine; this
//! crate only calls the three lifecycle hooks below.

/// A loaded instance of a user-defined WebSocket handler class.
pub trait ScriptHandler: Send {
    /// Called once, right after the WebSocket handshake completes.
    fn connected(&mut self) -> Option<String>;

    /// Called once per inbound text message; returns text to send back, if
    /// any.
    fn process_message(&mut self, text: &str) -> Option<String>;

    /// Called once per changed subscribed field.
    fn field_changed(&mut self, moniker: &str, field: &str, valid: bool, formatted: &str) -> Option<String>;
}

/// Resolves `/Websock/User/<path>` or `/Websock/System/<path>` into the
/// dotted class name the script engine loads (§4.8: "`/Websock/User/...` ->
/// `Script.User.Websock.<path>`"; the `System` namespace mirrors it).
pub fn resolve_class_name(path: &str) -> Option<String> {
    let (namespace, rest) = if let Some(rest) = path.strip_prefix("/Websock/User/") {
        ("User", rest)
    } else if let Some(rest) = path.strip_prefix("/Websock/System/") {
        ("System", rest)
    } else {
        return None;
    };
    if rest.is_empty() {
        return None;
    }
    let dotted = rest.trim_matches('/').replace('/', ".");
    Some(format!("Script.{namespace}.Websock.{dotted}"))
}

/// Loads a [`ScriptHandler`] instance for a resolved class name. Class
/// lookup, compilation, and instantiation all live in the scripting engine
/// itself, which is an external collaborator; this crate only calls the
/// result's lifecycle hooks.
pub trait ScriptEngine: Send + Sync {
    /// Loads and instantiates the handler class named by
    /// [`resolve_class_name`], or `None` if no such class is bound.
    fn load(&self, class_name: &str) -> Option<Box<dyn ScriptHandler>>;
}

/// A script engine that always hands back a fresh [`MockScriptHandler`],
/// for tests and local development.
#[derive(Default)]
pub struct MockScriptEngine;

impl ScriptEngine for MockScriptEngine {
    fn load(&self, _class_name: &str) -> Option<Box<dyn ScriptHandler>> {
        Some(Box::new(MockScriptHandler::default()))
    }
}

/// A recording script handler for tests: echoes the message back uppercased
/// and records every callback it received.
#[derive(Default)]
pub struct MockScriptHandler {
    pub connected_called: bool,
    pub messages_seen: Vec<String>,
    pub fields_seen: Vec<(String, String)>,
}

impl ScriptHandler for MockScriptHandler {
    fn connected(&mut self) -> Option<String> {
        self.connected_called = true;
        None
    }

    fn process_message(&mut self, text: &str) -> Option<String> {
        self.messages_seen.push(text.to_string());
        Some(text.to_uppercase())
    }

    fn field_changed(&mut self, moniker: &str, field: &str, _valid: bool, _formatted: &str) -> Option<String> {
        self.fields_seen.push((moniker.to_string(), field.to_string()));
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_class_name_from_user_path() {
        assert_eq!(
            resolve_class_name("/Websock/User/MyHouse/Kitchen"),
            Some("Script.User.Websock.MyHouse.Kitchen".to_string())
        );
    }

    #[test]
    fn resolves_class_name_from_system_path() {
        assert_eq!(
            resolve_class_name("/Websock/System/Thermostat"),
            Some("Script.System.Websock.Thermostat".to_string())
        );
    }

    #[test]
    fn rejects_path_without_a_known_namespace() {
        assert_eq!(resolve_class_name("/Websock/Riva"), None);
    }

    #[test]
    fn mock_engine_always_loads_a_handler() {
        let engine = MockScriptEngine;
        assert!(engine.load("Script.User.Websock.Foo").is_some());
    }
}
