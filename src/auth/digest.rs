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

//! Digest authentication challenge/verify (§4.5).
//!
//! The nonce is the hexadecimal MD5 of `{current-UTC-hour, request-path,
//! host-name}`. Clipping the timestamp to the hour makes any nonce valid
//! until the top of the next hour. Grounded in
//! `CQCWebSrvC_WorkerThread.cpp`'s `GenerateNonce`/`SendAuthChallenge`: the
//! hour-clip, the literal `opaque` value, and the header field order are all
//! taken from there.

use std::collections::HashMap;

use chrono::{DateTime, Timelike, Utc};
use md5::{Digest, Md5};

/// The three secure-namespace tiers (§4.5 role gate). Ordered weakest to
/// strongest so a stricter level always passes a weaker gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    /// `/Normal/`
    Normal,
    /// `/Power/`
    Power,
    /// `/Admin/`
    Admin,
}

/// Determines the role required to access `path`, or `None` if the path is
/// not under the secure namespace at all.
pub fn required_role(path: &str) -> Option<Role> {
    if path.starts_with("/Secure/Admin/") || path.starts_with("/Admin/") {
        Some(Role::Admin)
    } else if path.starts_with("/Secure/Power/") || path.starts_with("/Power/") {
        Some(Role::Power)
    } else if path.starts_with("/Secure/Normal/") || path.starts_with("/Normal/") {
        Some(Role::Normal)
    } else if path.starts_with("/Secure/") {
        Some(Role::Normal)
    } else {
        None
    }
}

/// True when `actual` meets or exceeds `required`.
pub fn satisfies(required: Role, actual: Role) -> bool {
    actual >= required
}

/// A freshly-generated WWW-Authenticate challenge.
#[derive(Debug, Clone)]
pub struct Challenge {
    /// Realm advertised to the client.
    pub realm: &'static str,
    /// Request path the challenge is scoped to (the `domain` field).
    pub domain: String,
    /// Hex MD5 nonce, valid until the top of the next UTC hour.
    pub nonce: String,
    /// Fixed opaque value (SPEC_FULL §3).
    pub opaque: &'static str,
    /// Set when this challenge is reissued because the client's nonce had
    /// gone stale.
    pub stale: bool,
}

impl Challenge {
    /// Formats the `WWW-Authenticate` header value (§6, S2).
    pub fn header_value(&self) -> String {
        let mut value = format!(
            "Digest realm=\"{}\", qop=auth, domain=\"{}\", nonce=\"{}\", opaque=\"{}\"",
            self.realm, self.domain, self.nonce, self.opaque
        );
        if self.stale {
            value.push_str(", stale=yes");
        }
        value
    }
}

/// Generates the hour-bucketed nonce for `path`/`hostname` at `at`.
pub fn generate_nonce(path: &str, hostname: &str, at: DateTime<Utc>) -> String {
    let clipped = at
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at);
    let mut hasher = Md5::new();
    hasher.update(clipped.to_rfc3339().as_bytes());
    hasher.update(path.as_bytes());
    hasher.update(hostname.as_bytes());
    hex::encode(hasher.finalize())
}

/// Builds a fresh challenge for `path`, optionally marked stale.
pub fn challenge(
    realm: &'static str,
    opaque: &'static str,
    path: &str,
    hostname: &str,
    stale: bool,
) -> Challenge {
    Challenge {
        realm,
        domain: path.to_string(),
        nonce: generate_nonce(path, hostname, Utc::now()),
        opaque,
        stale,
    }
}

/// The client-supplied `Authorization: Digest ...` fields (§4.5).
#[derive(Debug, Default)]
pub struct DigestFields {
    pub username: Option<String>,
    pub realm: Option<String>,
    pub nonce: Option<String>,
    pub uri: Option<String>,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
    pub response: Option<String>,
}

/// Parses the comma-separated `key="value"` list following `Digest ` in an
/// `Authorization` header.
pub fn parse_authorization(header: &str) -> DigestFields {
    let rest = header.trim_start_matches("Digest").trim_start();
    let mut map = HashMap::new();
    for part in split_respecting_quotes(rest) {
        if let Some((k, v)) = part.split_once('=') {
            map.insert(
                k.trim().to_ascii_lowercase(),
                v.trim().trim_matches('"').to_string(),
            );
        }
    }
    DigestFields {
        username: map.remove("username"),
        realm: map.remove("realm"),
        nonce: map.remove("nonce"),
        uri: map.remove("uri"),
        qop: map.remove("qop"),
        nc: map.remove("nc"),
        cnonce: map.remove("cnonce"),
        response: map.remove("response"),
    }
}

fn split_respecting_quotes(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < s.len() {
        parts.push(s[start..].trim());
    }
    parts
}

/// Outcome of [`verify`], mapped 1:1 onto §4.5's return codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestOutcome {
    /// Response matched; role check still needs to be done by the caller.
    Ok,
    /// Required fields were missing.
    BadRequest,
    /// Response did not match the expected hash.
    Unauthorized,
    /// The nonce hashes to a previous hour.
    Stale,
}

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verifies a client's Digest response against the server-held (decrypted)
/// web password. `method`/`uri` come from the current request; `hostname`
/// and `path` must be the same values used to generate the original
/// challenge nonce.
#[allow(clippy::too_many_arguments)]
pub fn verify(
    fields: &DigestFields,
    method: &str,
    password: &str,
    realm: &str,
    hostname: &str,
    path: &str,
) -> DigestOutcome {
    let (username, nonce, uri, qop, nc, cnonce, response) = match (
        &fields.username,
        &fields.nonce,
        &fields.uri,
        &fields.qop,
        &fields.nc,
        &fields.cnonce,
        &fields.response,
    ) {
        (Some(u), Some(n), Some(uri), Some(q), Some(nc), Some(cn), Some(r)) => {
            (u, n, uri, q, nc, cn, r)
        }
        _ => return DigestOutcome::BadRequest,
    };

    let current_nonce = generate_nonce(path, hostname, Utc::now());
    if *nonce != current_nonce {
        return DigestOutcome::Stale;
    }

    let a1 = md5_hex(&format!("{username}:{realm}:{password}"));
    let a2 = md5_hex(&format!("{method}:{uri}"));
    let expected = md5_hex(&format!("{a1}:{nonce}:{nc}:{cnonce}:{qop}:{a2}"));

    if &expected == response {
        DigestOutcome::Ok
    } else {
        DigestOutcome::Unauthorized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_gate_orders_weakest_to_strongest() {
        assert!(satisfies(Role::Normal, Role::Admin));
        assert!(satisfies(Role::Power, Role::Power));
        assert!(!satisfies(Role::Admin, Role::Power));
    }

    #[test]
    fn required_role_by_prefix() {
        assert_eq!(required_role("/Secure/Admin/x.html"), Some(Role::Admin));
        assert_eq!(required_role("/Secure/Power/y"), Some(Role::Power));
        assert_eq!(required_role("/index.html"), None);
    }

    #[test]
    fn nonce_is_stable_within_the_hour_and_changes_across_it() {
        let t0 = "2026-07-31T10:15:00Z".parse::<DateTime<Utc>>().unwrap();
        let t1 = "2026-07-31T10:59:59Z".parse::<DateTime<Utc>>().unwrap();
        let t2 = "2026-07-31T11:00:01Z".parse::<DateTime<Utc>>().unwrap();

        let n0 = generate_nonce("/a", "host", t0);
        let n1 = generate_nonce("/a", "host", t1);
        let n2 = generate_nonce("/a", "host", t2);

        assert_eq!(n0, n1);
        assert_ne!(n0, n2);
    }

    #[test]
    fn verify_round_trips_a_correctly_computed_response() {
        let path = "/Secure/Admin/x.html";
        let hostname = "host";
        let nonce = generate_nonce(path, hostname, Utc::now());
        let realm = "CQC Automation System";
        let password = "secret";
        let method = "GET";
        let uri = path;
        let (nc, cnonce, qop) = ("00000001", "abcd1234", "auth");

        let a1 = md5_hex(&format!("joe:{realm}:{password}"));
        let a2 = md5_hex(&format!("{method}:{uri}"));
        let response = md5_hex(&format!("{a1}:{nonce}:{nc}:{cnonce}:{qop}:{a2}"));

        let fields = DigestFields {
            username: Some("joe".into()),
            realm: Some(realm.into()),
            nonce: Some(nonce),
            uri: Some(uri.into()),
            qop: Some(qop.into()),
            nc: Some(nc.into()),
            cnonce: Some(cnonce.into()),
            response: Some(response),
        };

        assert_eq!(
            verify(&fields, method, password, realm, hostname, path),
            DigestOutcome::Ok
        );
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let path = "/Secure/Admin/x.html";
        let hostname = "host";
        let nonce = generate_nonce(path, hostname, Utc::now());
        let fields = DigestFields {
            username: Some("joe".into()),
            realm: Some("CQC Automation System".into()),
            nonce: Some(nonce),
            uri: Some(path.into()),
            qop: Some("auth".into()),
            nc: Some("00000001".into()),
            cnonce: Some("abcd".into()),
            response: Some("deadbeef".into()),
        };
        assert_eq!(
            verify(&fields, "GET", "secret", "CQC Automation System", hostname, path),
            DigestOutcome::Unauthorized
        );
    }

    #[test]
    fn missing_field_is_bad_request() {
        let fields = DigestFields::default();
        assert_eq!(
            verify(&fields, "GET", "x", "realm", "host", "/p"),
            DigestOutcome::BadRequest
        );
    }
}
