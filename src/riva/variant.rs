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

//! Glues the RIVA protocol core ([`super::session`]) and the faux-GUI
//! thread ([`super::gui_thread`]) into a [`crate::ws::session::SessionVariant`]
//! the generic WebSocket session loop can drive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::collaborators::polling::FieldValue;
use crate::collaborators::rendering::{RenderingEngine, Size, WidgetId};
use crate::collaborators::security::SecurityService;
use crate::http::query::QueryParams;
use crate::ws::framing::Opcode;
use crate::ws::session::{EgressMessage, EgressQueue, MessageOutcome, SessionVariant};

use super::bailout::BailoutFlag;
use super::display_sink::DisplaySink;
use super::events::{DispatchOutcome, GuiEvent, GuiEventQueue};
use super::gui_thread::GuiThread;
use super::image_cache::RemoteImageCache;
use super::session::{login, parse_inbound, RivaInbound, RivaOpCode, RivaOutbound, RivaState};

/// Login/session-setup parameters carried as URL query parameters on the
/// WebSocket upgrade request (§4.9 "User name and password arrive as URL
/// query parameters"; §6 "URL query parameters consumed by RIVA session
/// setup").
#[derive(Debug, Clone, Default)]
pub struct RivaLoginParams {
    pub user: String,
    pub password: String,
    pub session_name: String,
    /// `env1`..`env9`, in declaration order, empty where the query omits it.
    pub env: [String; 9],
    pub log_state_info: bool,
    pub log_gui_events: bool,
    pub log_srv_msgs: bool,
}

impl RivaLoginParams {
    /// Reads the RIVA login/setup parameters off the upgrade request's
    /// query string (§6).
    pub fn from_query(query: &QueryParams) -> Self {
        let get = |name: &str| query.get(name).unwrap_or_default().to_string();
        let flag = |name: &str| query.get(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        Self {
            user: get("user"),
            password: get("pw"),
            session_name: get("sessname"),
            env: std::array::from_fn(|i| get(&format!("env{}", i + 1))),
            log_state_info: flag("logstateinfo"),
            log_gui_events: flag("logguievs"),
            log_srv_msgs: flag("logsrvmsgs"),
        }
    }
}

const ACTIVE_UPDATE_INTERVAL: Duration = Duration::from_millis(100);
const VALUE_UPDATE_INTERVAL: Duration = Duration::from_millis(250);
const EVENT_UPDATE_INTERVAL: Duration = Duration::from_secs(2);
const CHECK_TIMEOUT_INTERVAL: Duration = Duration::from_secs(1);
const DISPATCH_WAIT: Duration = Duration::from_secs(5);

/// Schedules the four periodic GUI events (§4.9 "GUI event dedup").
struct PeriodicSchedule {
    next_active: Instant,
    next_value: Instant,
    next_event: Instant,
    next_timeout: Instant,
}

impl PeriodicSchedule {
    fn new(now: Instant) -> Self {
        Self {
            next_active: now + ACTIVE_UPDATE_INTERVAL,
            next_value: now + VALUE_UPDATE_INTERVAL,
            next_event: now + EVENT_UPDATE_INTERVAL,
            next_timeout: now + CHECK_TIMEOUT_INTERVAL,
        }
    }

    fn due(&mut self, queue: &GuiEventQueue, now: Instant) {
        if now >= self.next_active {
            queue.push(GuiEvent::ActiveUpdate);
            self.next_active = now + ACTIVE_UPDATE_INTERVAL;
        }
        if now >= self.next_value {
            queue.push(GuiEvent::ValueUpdate);
            self.next_value = now + VALUE_UPDATE_INTERVAL;
        }
        if now >= self.next_event {
            queue.push(GuiEvent::EventUpdate);
            self.next_event = now + EVENT_UPDATE_INTERVAL;
        }
        if now >= self.next_timeout {
            queue.push(GuiEvent::CheckTimeout);
            self.next_timeout = now + CHECK_TIMEOUT_INTERVAL;
        }
    }
}

static NEXT_DISPATCH_ID: AtomicU64 = AtomicU64::new(1);

/// The RIVA WebSocket session variant (§4.9).
pub struct RivaVariant {
    state: RivaState,
    cache: Arc<Mutex<RemoteImageCache>>,
    gui_queue: Arc<GuiEventQueue>,
    gui_thread: Option<GuiThread>,
    bailout: BailoutFlag,
    engine: Arc<dyn RenderingEngine>,
    security: Arc<dyn SecurityService>,
    schedule: PeriodicSchedule,
    default_template: String,
    display_size: Size,
    login_params: RivaLoginParams,
}

impl RivaVariant {
    pub fn new(
        engine: Arc<dyn RenderingEngine>,
        security: Arc<dyn SecurityService>,
        default_template: String,
        display_size: Size,
        login_params: RivaLoginParams,
    ) -> Self {
        Self {
            state: RivaState::WaitSessState,
            cache: Arc::new(Mutex::new(RemoteImageCache::new())),
            gui_queue: Arc::new(GuiEventQueue::new()),
            gui_thread: None,
            bailout: BailoutFlag::new(),
            engine,
            security,
            schedule: PeriodicSchedule::new(Instant::now()),
            default_template,
            display_size,
            login_params,
        }
    }

    fn send_outbound(egress: &EgressQueue, message: RivaOutbound) {
        let text = message.to_json().to_string();
        egress.push(EgressMessage {
            opcode: Opcode::Text,
            payload: text.into_bytes(),
        });
    }

    /// Dispatches an action to the faux-GUI thread and blocks for its
    /// rendezvous reply (§4.9 "auto-reset event").
    fn dispatch_and_wait(&self, action: &str) -> DispatchOutcome {
        let (tx, rx) = bounded(1);
        self.gui_queue.push(GuiEvent::DispatchAction {
            widget: WidgetId(NEXT_DISPATCH_ID.fetch_add(1, Ordering::Relaxed)),
            action: action.to_string(),
            reply: tx,
        });
        rx.recv_timeout(DISPATCH_WAIT).unwrap_or(DispatchOutcome::Stop)
    }

    fn handle_session_state(&mut self, manifest: super::session::SessionManifest, egress: &Arc<EgressQueue>) {
        self.cache.lock().reset_from_manifest(manifest.images);

        let view = self.engine.create_view(self.display_size);
        let sink = DisplaySink::new(Arc::clone(egress), Arc::clone(&self.cache));
        self.gui_thread = Some(GuiThread::spawn(view, Arc::clone(&self.gui_queue), self.bailout.clone(), sink));

        match login(self.security.as_ref(), &self.login_params.user, &self.login_params.password) {
            Ok(_token) => {
                let outcome = self.dispatch_and_wait(&format!("Initialize:{}", self.default_template));
                match outcome {
                    DispatchOutcome::Completed => {
                        self.state = RivaState::Ready;
                        Self::send_outbound(
                            egress,
                            RivaOutbound::LoginResult {
                                success: true,
                                message: String::new(),
                            },
                        );
                        Self::send_outbound(
                            egress,
                            RivaOutbound::NewTemplate {
                                template: self.default_template.clone(),
                            },
                        );
                    }
                    DispatchOutcome::Stop => {
                        self.fail_login(egress, "session ended before template load completed");
                    }
                }
            }
            Err(err) => {
                self.fail_login(egress, &err.to_string());
            }
        }
    }

    fn fail_login(&mut self, egress: &EgressQueue, message: &str) {
        Self::send_outbound(
            egress,
            RivaOutbound::LoginResult {
                success: false,
                message: message.to_string(),
            },
        );
        egress.push(EgressMessage {
            opcode: Opcode::Close,
            payload: Vec::new(),
        });
        self.state = RivaState::End;
    }
}

impl SessionVariant for RivaVariant {
    fn connected(&mut self, _egress: &Arc<EgressQueue>) {
        info!("RIVA session connected, awaiting SessionState handshake");
    }

    fn process_message(&mut self, text: &str, egress: &Arc<EgressQueue>) -> MessageOutcome {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => return MessageOutcome::Close,
        };

        let inbound = match parse_inbound(&value) {
            Ok(inbound) => inbound,
            Err(err) => {
                warn!(%err, "malformed RIVA frame");
                return MessageOutcome::Close;
            }
        };

        if self.state == RivaState::WaitSessState {
            return match inbound {
                RivaInbound::SessionState(manifest) => {
                    self.handle_session_state(manifest, egress);
                    if self.state == RivaState::End {
                        MessageOutcome::Close
                    } else {
                        MessageOutcome::Continue
                    }
                }
                _ => MessageOutcome::Close,
            };
        }

        match inbound {
            RivaInbound::Press(point) => self.gui_queue.push(GuiEvent::Press(point)),
            RivaInbound::Release(point) => self.gui_queue.push(GuiEvent::Release(point)),
            RivaInbound::Move(point) => self.gui_queue.push(GuiEvent::Move(point)),
            RivaInbound::CancelInput => self.gui_queue.push(GuiEvent::CancelInput),
            RivaInbound::SetVisState(visible) => self.gui_queue.push(GuiEvent::SetVisState(visible)),
            RivaInbound::SetServerFlags | RivaInbound::LogMsg(_) | RivaInbound::Ping => {}
            RivaInbound::SessionState(_) => {}
        }
        MessageOutcome::Continue
    }

    fn field_changed(&mut self, _moniker: &str, _field: &str, _value: &FieldValue, _egress: &Arc<EgressQueue>) {
        self.gui_queue.push(GuiEvent::ValueUpdate);
    }

    fn idle(&mut self, _egress: &Arc<EgressQueue>) {
        self.schedule.due(&self.gui_queue, Instant::now());
    }

    fn disconnected(&mut self) {
        self.bailout.set();
        if let Some(mut gui) = self.gui_thread.take() {
            gui.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::collaborators::rendering::MockRenderingEngine;
    use crate::collaborators::security::MockSecurityService;
    use serde_json::json;

    fn variant_with(user: &str, password: &str) -> RivaVariant {
        RivaVariant::new(
            Arc::new(MockRenderingEngine::default()),
            Arc::new(MockSecurityService::new().with_account("bob", "secret", Role::Normal)),
            "MainView".to_string(),
            Size { width: 800, height: 480 },
            RivaLoginParams {
                user: user.to_string(),
                password: password.to_string(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn handshake_with_valid_login_sends_login_result_and_template() {
        let mut variant = variant_with("bob", "secret");
        let egress = Arc::new(EgressQueue::new(8192));
        let frame = json!({
            "OpCode": RivaOpCode::SessionState.code(),
            "Images": [],
            "CachingEnabled": true,
        })
        .to_string();
        variant.process_message(&frame, &egress);

        let login_msg = egress.try_pop().unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&login_msg.payload).unwrap();
        assert_eq!(parsed["Success"], json!(true));

        let template_msg = egress.try_pop().unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&template_msg.payload).unwrap();
        assert_eq!(parsed["Template"], json!("MainView"));

        assert_eq!(variant.state, RivaState::Ready);
        variant.disconnected();
    }

    #[test]
    fn handshake_with_bad_password_fails_and_closes() {
        let mut variant = variant_with("bob", "wrong");
        let egress = Arc::new(EgressQueue::new(8192));
        let frame = json!({
            "OpCode": RivaOpCode::SessionState.code(),
            "Images": [],
        })
        .to_string();
        let outcome = variant.process_message(&frame, &egress);
        assert!(matches!(outcome, MessageOutcome::Close));
        assert_eq!(variant.state, RivaState::End);
    }

    #[test]
    fn login_params_read_user_and_password_from_query() {
        let mut query = QueryParams::default();
        query.push("user", "bob");
        query.push("pw", "secret");
        query.push("sessname", "Kitchen");
        query.push("env1", "Living Room");
        query.push("logstateinfo", "1");

        let params = RivaLoginParams::from_query(&query);
        assert_eq!(params.user, "bob");
        assert_eq!(params.password, "secret");
        assert_eq!(params.session_name, "Kitchen");
        assert_eq!(params.env[0], "Living Room");
        assert_eq!(params.env[1], "");
        assert!(params.log_state_info);
        assert!(!params.log_gui_events);
    }
}
