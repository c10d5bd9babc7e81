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

//! The RIVA wire protocol and per-session protocol state machine (§4.9,
//! §6 "RIVA wire protocol"). Socket I/O and thread wiring live in the
//! WebSocket session host; this module owns the JSON message shapes, the
//! login/handshake sequence, the pointer-gesture classifier, and the
//! `WaitSessState -> Ready -> WaitClientEnd -> End` state machine.

use serde_json::{json, Value};

use crate::collaborators::rendering::{FlickDir, Point};
use crate::collaborators::security::{SecurityError, SecurityService, Token};

use super::image_cache::ImageChunk;

/// Numeric RIVA opcodes (§6: "every message is a JSON object with a
/// numeric `OpCode` field").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RivaOpCode {
    SessionState,
    LoginResult,
    NewTemplate,
    CreateRemWidget,
    DestroyRemWidget,
    SetRemWidgetVis,
    SetRemWidgetURL,
    SpecialAction,
    ImgDataFirst,
    ImgDataNext,
    LogMsg,
    Ping,
    Press,
    Release,
    Move,
    CancelInput,
    SetServerFlags,
    SetVisState,
}

impl RivaOpCode {
    pub(crate) fn code(self) -> i64 {
        match self {
            RivaOpCode::SessionState => 0,
            RivaOpCode::LoginResult => 1,
            RivaOpCode::NewTemplate => 2,
            RivaOpCode::CreateRemWidget => 3,
            RivaOpCode::DestroyRemWidget => 4,
            RivaOpCode::SetRemWidgetVis => 5,
            RivaOpCode::SetRemWidgetURL => 6,
            RivaOpCode::SpecialAction => 7,
            RivaOpCode::ImgDataFirst => 8,
            RivaOpCode::ImgDataNext => 9,
            RivaOpCode::LogMsg => 10,
            RivaOpCode::Ping => 11,
            RivaOpCode::Press => 12,
            RivaOpCode::Release => 13,
            RivaOpCode::Move => 14,
            RivaOpCode::CancelInput => 15,
            RivaOpCode::SetServerFlags => 16,
            RivaOpCode::SetVisState => 17,
        }
    }

    pub(crate) fn from_code(code: i64) -> Option<Self> {
        use RivaOpCode::*;
        Some(match code {
            0 => SessionState,
            1 => LoginResult,
            2 => NewTemplate,
            3 => CreateRemWidget,
            4 => DestroyRemWidget,
            5 => SetRemWidgetVis,
            6 => SetRemWidgetURL,
            7 => SpecialAction,
            8 => ImgDataFirst,
            9 => ImgDataNext,
            10 => LogMsg,
            11 => Ping,
            12 => Press,
            13 => Release,
            14 => Move,
            15 => CancelInput,
            16 => SetServerFlags,
            17 => SetVisState,
            _ => return None,
        })
    }
}

/// A message this session enqueues onto the WebSocket egress.
pub enum RivaOutbound {
    LoginResult { success: bool, message: String },
    NewTemplate { template: String },
    CreateRemWidget { widget: u64, kind: String },
    DestroyRemWidget { widget: u64 },
    SetRemWidgetVis { widget: u64, visible: bool },
    SetRemWidgetURL { widget: u64, path: String },
    Image(ImageChunk),
    SpecialAction { widget: u64, action: String },
}

impl RivaOutbound {
    /// Serialises to the JSON wire shape (§6).
    pub fn to_json(&self) -> Value {
        match self {
            RivaOutbound::LoginResult { success, message } => json!({
                "OpCode": RivaOpCode::LoginResult.code(),
                "Success": success,
                "Message": message,
            }),
            RivaOutbound::NewTemplate { template } => json!({
                "OpCode": RivaOpCode::NewTemplate.code(),
                "Template": template,
            }),
            RivaOutbound::CreateRemWidget { widget, kind } => json!({
                "OpCode": RivaOpCode::CreateRemWidget.code(),
                "Widget": widget,
                "Kind": kind,
            }),
            RivaOutbound::DestroyRemWidget { widget } => json!({
                "OpCode": RivaOpCode::DestroyRemWidget.code(),
                "Widget": widget,
            }),
            RivaOutbound::SetRemWidgetVis { widget, visible } => json!({
                "OpCode": RivaOpCode::SetRemWidgetVis.code(),
                "Widget": widget,
                "Visible": visible,
            }),
            RivaOutbound::SetRemWidgetURL { widget, path } => json!({
                "OpCode": RivaOpCode::SetRemWidgetURL.code(),
                "Widget": widget,
                "Path": path,
            }),
            RivaOutbound::Image(ImageChunk::First {
                path,
                serial,
                total_size,
                width,
                height,
                is_png,
                is_last,
                data,
            }) => json!({
                "OpCode": RivaOpCode::ImgDataFirst.code(),
                "Path": path,
                "SerialNum": serial,
                "TotalSize": total_size,
                "Width": width,
                "Height": height,
                "IsPNG": is_png,
                "IsLast": is_last,
                "Data": data,
            }),
            RivaOutbound::Image(ImageChunk::Next { path, is_last, data }) => json!({
                "OpCode": RivaOpCode::ImgDataNext.code(),
                "Path": path,
                "IsLast": is_last,
                "Data": data,
            }),
            RivaOutbound::SpecialAction { widget, action } => json!({
                "OpCode": RivaOpCode::SpecialAction.code(),
                "Widget": widget,
                "Action": action,
            }),
        }
    }
}

/// Errors parsing an inbound RIVA frame.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RivaParseError {
    #[error("missing or non-numeric OpCode")]
    MissingOpCode,
    #[error("unknown RIVA opcode {0}")]
    UnknownOpCode(i64),
    #[error("malformed body for opcode {0:?}: {1}")]
    Malformed(RivaOpCode, &'static str),
}

/// A parsed inbound client message.
#[derive(Debug, Clone, PartialEq)]
pub enum RivaInbound {
    SessionState(SessionManifest),
    Press(Point),
    Release(Point),
    Move(Point),
    CancelInput,
    SetVisState(bool),
    SetServerFlags,
    LogMsg(String),
    Ping,
}

/// The client's reported state on handshake (§4.9 "Login and handshake").
#[derive(Debug, Clone, PartialEq)]
pub struct SessionManifest {
    pub images: Vec<(String, u64)>,
    pub caching_enabled: bool,
    pub log_gui_events: bool,
    pub log_in_msgs: bool,
    pub in_background_tab: bool,
}

fn point_from(value: &Value) -> Option<Point> {
    Some(Point {
        x: value.get("X")?.as_i64()? as i32,
        y: value.get("Y")?.as_i64()? as i32,
    })
}

/// Parses one inbound JSON frame (§4.9 "Input protocol").
pub fn parse_inbound(value: &Value) -> Result<RivaInbound, RivaParseError> {
    let code = value
        .get("OpCode")
        .and_then(Value::as_i64)
        .ok_or(RivaParseError::MissingOpCode)?;
    let opcode = RivaOpCode::from_code(code).ok_or(RivaParseError::UnknownOpCode(code))?;

    match opcode {
        RivaOpCode::SessionState => {
            let images = value
                .get("Images")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|item| {
                            let path = item.get("Path")?.as_str()?.to_string();
                            let serial = item.get("SerialNum")?.as_u64()?;
                            Some((path, serial))
                        })
                        .collect()
                })
                .unwrap_or_default();
            Ok(RivaInbound::SessionState(SessionManifest {
                images,
                caching_enabled: value.get("CachingEnabled").and_then(Value::as_bool).unwrap_or(false),
                log_gui_events: value.get("LogGUIEvents").and_then(Value::as_bool).unwrap_or(false),
                log_in_msgs: value.get("LogInMsgs").and_then(Value::as_bool).unwrap_or(false),
                in_background_tab: value.get("InBackgroundTab").and_then(Value::as_bool).unwrap_or(false),
            }))
        }
        RivaOpCode::Press => point_from(value)
            .map(RivaInbound::Press)
            .ok_or(RivaParseError::Malformed(opcode, "missing X/Y")),
        RivaOpCode::Release => point_from(value)
            .map(RivaInbound::Release)
            .ok_or(RivaParseError::Malformed(opcode, "missing X/Y")),
        RivaOpCode::Move => point_from(value)
            .map(RivaInbound::Move)
            .ok_or(RivaParseError::Malformed(opcode, "missing X/Y")),
        RivaOpCode::CancelInput => Ok(RivaInbound::CancelInput),
        RivaOpCode::SetVisState => Ok(RivaInbound::SetVisState(
            value.get("Visible").and_then(Value::as_bool).unwrap_or(false),
        )),
        RivaOpCode::SetServerFlags => Ok(RivaInbound::SetServerFlags),
        RivaOpCode::LogMsg => Ok(RivaInbound::LogMsg(
            value.get("Msg").and_then(Value::as_str).unwrap_or_default().to_string(),
        )),
        RivaOpCode::Ping => Ok(RivaInbound::Ping),
        other => Err(RivaParseError::Malformed(other, "not a client-to-server opcode")),
    }
}

/// `WaitSessState -> Ready -> WaitClientEnd -> End` (§4.9 "State machine").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RivaState {
    WaitSessState,
    Ready,
    WaitClientEnd,
    End,
}

/// Half the width/height of the no-drag "breakout" box around a press
/// point; a release inside it is a click, not a gesture (§4.9 "Input
/// protocol").
const BREAKOUT_RADIUS: i32 = 8;

/// Outcome of feeding a `Release` into the gesture tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    Click(Point),
    Flick(FlickDir, Point),
    None,
}

/// Tracks one in-flight press-to-release gesture (§4.9).
#[derive(Default)]
pub struct GestureTracker {
    press: Option<Point>,
}

impl GestureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, point: Point) {
        self.press = Some(point);
    }

    pub fn cancel(&mut self) {
        self.press = None;
    }

    /// Classifies a release against the remembered press point.
    pub fn release(&mut self, point: Point) -> GestureOutcome {
        let Some(start) = self.press.take() else {
            return GestureOutcome::None;
        };
        let dx = point.x - start.x;
        let dy = point.y - start.y;
        if dx.abs() <= BREAKOUT_RADIUS && dy.abs() <= BREAKOUT_RADIUS {
            return GestureOutcome::Click(start);
        }
        let dir = if dx.abs() >= dy.abs() {
            if dx >= 0 {
                FlickDir::Right
            } else {
                FlickDir::Left
            }
        } else if dy >= 0 {
            FlickDir::Down
        } else {
            FlickDir::Up
        };
        GestureOutcome::Flick(dir, start)
    }
}

/// Authenticates a RIVA login against the security service (§4.9 "Login
/// and handshake"): username/password arrive as URL query parameters.
pub fn login(security: &dyn SecurityService, user: &str, password: &str) -> Result<Token, SecurityError> {
    let result = security.login(user, password)?;
    Ok(result.token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trips_through_numeric_code() {
        for code in 0..18 {
            let opcode = RivaOpCode::from_code(code).unwrap();
            assert_eq!(opcode.code(), code);
        }
        assert!(RivaOpCode::from_code(999).is_none());
    }

    #[test]
    fn parses_session_state_manifest() {
        let value = json!({
            "OpCode": 0,
            "Images": [{"Path": "/Repo/X", "SerialNum": 5}],
            "CachingEnabled": true,
            "LogGUIEvents": false,
            "LogInMsgs": false,
            "InBackgroundTab": false,
        });
        let parsed = parse_inbound(&value).unwrap();
        match parsed {
            RivaInbound::SessionState(manifest) => {
                assert_eq!(manifest.images, vec![("/Repo/X".to_string(), 5)]);
                assert!(manifest.caching_enabled);
            }
            _ => panic!("expected SessionState"),
        }
    }

    #[test]
    fn missing_opcode_is_rejected() {
        let value = json!({"Foo": 1});
        assert_eq!(parse_inbound(&value), Err(RivaParseError::MissingOpCode));
    }

    #[test]
    fn release_within_breakout_box_is_a_click() {
        let mut tracker = GestureTracker::new();
        tracker.press(Point { x: 100, y: 100 });
        let outcome = tracker.release(Point { x: 103, y: 96 });
        assert_eq!(outcome, GestureOutcome::Click(Point { x: 100, y: 100 }));
    }

    #[test]
    fn release_outside_breakout_box_is_a_flick() {
        let mut tracker = GestureTracker::new();
        tracker.press(Point { x: 100, y: 100 });
        let outcome = tracker.release(Point { x: 100, y: 200 });
        assert_eq!(outcome, GestureOutcome::Flick(FlickDir::Down, Point { x: 100, y: 100 }));
    }

    #[test]
    fn release_without_a_press_is_none() {
        let mut tracker = GestureTracker::new();
        assert_eq!(tracker.release(Point { x: 1, y: 1 }), GestureOutcome::None);
    }

    #[test]
    fn login_result_json_carries_opcode_and_message() {
        let outbound = RivaOutbound::LoginResult {
            success: false,
            message: "bad credentials".into(),
        };
        let value = outbound.to_json();
        assert_eq!(value["OpCode"], json!(RivaOpCode::LoginResult.code()));
        assert_eq!(value["Success"], json!(false));
    }
}
