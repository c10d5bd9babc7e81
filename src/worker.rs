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

//! Worker thread (§4.3): takes a connection off the queue, drives one HTTP
//! exchange through Digest auth and routing, or hands a WebSocket upgrade
//! off into the session loop for the rest of the connection's lifetime.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::auth::{self, Challenge, DigestOutcome, Role};
use crate::collaborators::rendering::Size;
use crate::collaborators::script::resolve_class_name;
use crate::facility::Facility;
use crate::http::method::Method;
use crate::http::query::parse_form_body;
use crate::http::request::{read_request, ReadRequestError, Request};
use crate::http::response::Response;
use crate::http::status::Status;
use crate::http::version::Version;
use crate::net::Connection;
use crate::queue::ConnectionQueue;
use crate::riva::{RivaLoginParams, RivaVariant};
use crate::router::Router;
use crate::ws::session::{run_session, EgressQueue, FieldPoller, SessionVariant};
use crate::ws::{accept_key, ScriptSessionVariant};

/// Bound on reading one request off the wire (§4.3 "handle one HTTP
/// exchange to completion").
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a worker waits on an empty queue before re-checking shutdown
/// (§4.1, §4.3 "take a connection (250 ms wait)").
pub const TAKE_TIMEOUT: Duration = Duration::from_millis(250);

/// Fixed resource path for the RIVA WebSocket endpoint (§4.6 "a fixed RIVA
/// resource path").
pub const RIVA_WS_PATH: &str = "/Websock/Riva";

/// Outcome of the Digest auth step (§4.3 step 2).
enum AuthOutcome {
    Granted { user: String, role: Role },
    Reply(Response<'static>),
}

/// One worker thread: takes connections off `queue` until told to stop.
pub struct Worker {
    id: usize,
}

impl Worker {
    /// Spawns a worker thread, returning its join handle. The listener owns
    /// the returned handle and is the only thing that mutates the worker
    /// pool (§5).
    pub fn spawn(id: usize, queue: ConnectionQueue, facility: Arc<Facility>, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name(format!("cqc-worker-{id}"))
            .spawn(move || Worker { id }.run(queue, facility, shutdown))
            .expect("failed to spawn worker thread")
    }

    fn run(&self, queue: ConnectionQueue, facility: Arc<Facility>, shutdown: Arc<AtomicBool>) {
        let mut router = Router::new();
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            match queue.take(TAKE_TIMEOUT) {
                Ok(connection) => self.handle_connection(connection, &facility, &mut router),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(worker = self.id, "worker exiting");
    }

    /// Drives one connection through the full pipeline (§4.3). After this
    /// returns, the connection is either closed (ordinary exchange, or a
    /// rejected/ended WebSocket session) or was already handed to
    /// [`run_session`] for its lifetime.
    fn handle_connection(&self, mut connection: Connection, facility: &Arc<Facility>, router: &mut Router) {
        let _ = connection.set_read_timeout(Some(REQUEST_READ_TIMEOUT));
        let _ = connection.set_write_timeout(Some(facility.config.write_timeout));

        let deadline = Instant::now() + REQUEST_READ_TIMEOUT;
        let mut request = match read_request(&mut connection, deadline) {
            Ok(request) => request,
            Err(ReadRequestError::Malformed(reason)) => {
                debug!(worker = self.id, reason, "malformed request");
                facility.stats.record_request(false);
                write_reply(&mut connection, Response::new(Version::H1_1, Status::BadRequest), false);
                return;
            }
            Err(ReadRequestError::UnsupportedVersion) => {
                facility.stats.record_request(false);
                write_reply(&mut connection, Response::new(Version::H1_1, Status::BadRequest), false);
                return;
            }
            Err(ReadRequestError::Timeout) | Err(ReadRequestError::Closed) => return,
            Err(ReadRequestError::Io(err)) => {
                debug!(worker = self.id, %err, "connection read failed");
                return;
            }
        };

        if request.method == Method::Post && request.content_type.as_deref() == Some("application/x-www-form-urlencoded") {
            let form = parse_form_body(&request.body);
            request.query.extend(form);
        }

        if let Some(required_role) = auth::required_role(&request.path) {
            match self.authenticate(&request, facility, required_role) {
                AuthOutcome::Granted { user, role } => {
                    request.query.push("User", user);
                    request.query.push("Role", format!("{role:?}"));
                }
                AuthOutcome::Reply(response) => {
                    facility.stats.record_request(false);
                    write_reply(&mut connection, response, false);
                    return;
                }
            }
        }

        if request.path.starts_with("/Websock") {
            self.upgrade_to_session(connection, request, facility);
            return;
        }

        let response = router.dispatch(&request, facility);
        facility.stats.record_request(response.status() != Status::InternalServerError);
        let drop_body = request.method == Method::Head;
        write_reply(&mut connection, response, drop_body);
    }

    /// Performs Digest authentication for a request under the secure
    /// namespace (§4.5, §4.3 step 2).
    fn authenticate(&self, request: &Request, facility: &Facility, required: Role) -> AuthOutcome {
        let version = request.version;
        let realm = facility.config.digest_realm;
        let opaque = facility.config.digest_opaque;
        let hostname = &facility.config.hostname;

        let fresh_challenge = || auth::challenge(realm, opaque, &request.path, hostname, false);
        let stale_challenge = || auth::challenge(realm, opaque, &request.path, hostname, true);

        let header = match request.header("Authorization") {
            Some(header) => header,
            None => {
                facility.stats.digest_challenges_issued.fetch_add(1, Ordering::Relaxed);
                return AuthOutcome::Reply(challenge_response(version, fresh_challenge()));
            }
        };

        let fields = auth::digest::parse_authorization(header);
        let username = match &fields.username {
            Some(username) => username.clone(),
            None => return AuthOutcome::Reply(Response::new(version, Status::BadRequest)),
        };

        let account = match facility.security.query_web_account(&username) {
            Ok(account) => account,
            Err(_) => {
                facility.stats.digest_challenges_issued.fetch_add(1, Ordering::Relaxed);
                return AuthOutcome::Reply(challenge_response(version, fresh_challenge()));
            }
        };

        let outcome = auth::verify(&fields, &request.method.to_string(), &account.password, realm, hostname, &request.path);
        match outcome {
            DigestOutcome::Ok if auth::satisfies(required, account.role) => AuthOutcome::Granted {
                user: username,
                role: account.role,
            },
            DigestOutcome::Ok => {
                facility.stats.digest_challenges_issued.fetch_add(1, Ordering::Relaxed);
                AuthOutcome::Reply(challenge_response(version, fresh_challenge()))
            }
            DigestOutcome::BadRequest => AuthOutcome::Reply(Response::new(version, Status::BadRequest)),
            DigestOutcome::Unauthorized => {
                facility.stats.digest_challenges_issued.fetch_add(1, Ordering::Relaxed);
                AuthOutcome::Reply(challenge_response(version, fresh_challenge()))
            }
            DigestOutcome::Stale => {
                facility.stats.digest_challenges_issued.fetch_add(1, Ordering::Relaxed);
                AuthOutcome::Reply(challenge_response(version, stale_challenge()))
            }
        }
    }

    /// Validates the WebSocket upgrade (§4.6) and, on success, runs the
    /// session to completion on this thread.
    fn upgrade_to_session(&self, mut connection: Connection, request: Request, facility: &Arc<Facility>) {
        let is_upgrade = request
            .header("Upgrade")
            .map(|value| value.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);
        let client_key = match (is_upgrade, request.header("Sec-WebSocket-Key")) {
            (true, Some(key)) => key.to_string(),
            _ => {
                write_reply(&mut connection, Response::new(request.version, Status::BadRequest), false);
                return;
            }
        };

        let variant: Box<dyn SessionVariant> = if request.path == RIVA_WS_PATH {
            Box::new(RivaVariant::new(
                Arc::clone(&facility.rendering),
                Arc::clone(&facility.security),
                facility.config.riva_default_template.clone(),
                Size {
                    width: facility.config.riva_display_size.0,
                    height: facility.config.riva_display_size.1,
                },
                RivaLoginParams::from_query(&request.query),
            ))
        } else if let Some(class_name) = resolve_class_name(&request.path) {
            match facility.scripts.load(&class_name) {
                Some(handler) => Box::new(ScriptSessionVariant::new(handler)),
                None => {
                    write_reply(&mut connection, Response::new(request.version, Status::BadRequest), false);
                    return;
                }
            }
        } else {
            write_reply(&mut connection, Response::new(request.version, Status::BadRequest), false);
            return;
        };

        if let Err(err) = send_upgrade_response(&mut connection, &client_key) {
            warn!(worker = self.id, %err, "failed to write websocket upgrade response");
            return;
        }

        facility.stats.record_ws_opened();
        let egress = Arc::new(EgressQueue::new(256));
        let poller = FieldPoller::new(Instant::now());
        run_session(connection, egress, Arc::clone(&facility.polling), poller, variant, facility.config.max_ws_fragment);
        facility.stats.record_ws_closed();
    }
}

/// Builds the 401 reply carrying a `WWW-Authenticate` challenge.
fn challenge_response(version: Version, challenge: Challenge) -> Response<'static> {
    Response::new(version, Status::Unauthorized).with_header("WWW-Authenticate", challenge.header_value())
}

/// Writes `response` to `connection`, logging (never panicking) on failure
/// (§7 "socket read/write failure").
fn write_reply(connection: &mut Connection, response: Response<'static>, drop_body: bool) {
    if let Err(err) = response.write_to(connection, drop_body) {
        debug!(%err, "failed to write reply");
    }
}

/// Writes the raw 101 response (§4.6: "exactly the required
/// Upgrade/Connection headers" — this bypasses [`Response`], whose common
/// headers always stamp `Connection: Close`).
fn send_upgrade_response(connection: &mut Connection, client_key: &str) -> std::io::Result<()> {
    let accept = accept_key(client_key);
    write!(
        connection,
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {accept}\r\n\r\n"
    )?;
    connection.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::image_repo::MockImageRepository;
    use crate::collaborators::polling::MockPollingService;
    use crate::collaborators::rendering::MockRenderingEngine;
    use crate::collaborators::script::MockScriptEngine;
    use crate::collaborators::security::MockSecurityService;
    use crate::config::ServerConfig;
    use crate::http::headers::HeaderMap;
    use crate::http::query::QueryParams;
    use md5::{Digest, Md5};

    fn facility() -> Arc<Facility> {
        Arc::new(Facility::new(
            ServerConfig::default(),
            Arc::new(MockSecurityService::new().with_account("bob", "secret", Role::Admin)),
            Arc::new(MockImageRepository::new()),
            Arc::new(MockRenderingEngine::default()),
            Arc::new(MockPollingService::new()),
            Arc::new(MockScriptEngine),
        ))
    }

    fn get(path: &str) -> Request {
        Request {
            method: Method::Get,
            path: path.to_string(),
            query: QueryParams::default(),
            version: Version::H1_1,
            headers: HeaderMap::default(),
            content_type: None,
            charset: None,
            body: Vec::new(),
        }
    }

    #[test]
    fn missing_authorization_header_issues_a_fresh_challenge() {
        let facility = facility();
        let worker = Worker { id: 0 };
        let request = get("/Secure/Admin/panel.html");
        match worker.authenticate(&request, &facility, Role::Admin) {
            AuthOutcome::Reply(response) => {
                assert_eq!(response.status(), Status::Unauthorized);
            }
            AuthOutcome::Granted { .. } => panic!("expected a challenge"),
        }
    }

    #[test]
    fn valid_digest_response_is_granted_with_sufficient_role() {
        let facility = facility();
        let worker = Worker { id: 0 };
        let mut request = get("/Secure/Admin/panel.html");

        let hostname = facility.config.hostname.clone();
        let realm = facility.config.digest_realm;
        let nonce = auth::digest::generate_nonce(&request.path, &hostname, chrono::Utc::now());
        let (nc, cnonce, qop) = ("00000001", "abcd1234", "auth");
        let md5_hex = |input: String| -> String {
            let mut hasher = Md5::new();
            hasher.update(input.as_bytes());
            hex::encode(hasher.finalize())
        };
        let a1 = md5_hex(format!("bob:{realm}:secret"));
        let a2 = md5_hex(format!("GET:{}", request.path));
        let response_hash = md5_hex(format!("{a1}:{nonce}:{nc}:{cnonce}:{qop}:{a2}"));

        let auth_header = format!(
            "Digest username=\"bob\", realm=\"{realm}\", nonce=\"{nonce}\", uri=\"{}\", qop=auth, nc={nc}, cnonce=\"{cnonce}\", response=\"{response_hash}\"",
            request.path
        );
        request.headers.push("Authorization", auth_header);

        match worker.authenticate(&request, &facility, Role::Admin) {
            AuthOutcome::Granted { user, role } => {
                assert_eq!(user, "bob");
                assert_eq!(role, Role::Admin);
            }
            AuthOutcome::Reply(response) => panic!("expected grant, got {:?}", response.status()),
        }
    }

    #[test]
    fn websocket_upgrade_rejects_unknown_path() {
        let facility = facility();
        let worker = Worker { id: 0 };
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        drop(client);

        let mut request = get("/Websock/Bogus");
        request.headers.push("Upgrade", "websocket");
        request.headers.push("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==");
        worker.upgrade_to_session(Connection::plain(server), request, &facility);
    }
}
