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

//! Http Status Codes
//! [RFC 9110 Section 15](https://www.rfc-editor.org/rfc/rfc9110#section-15)

use std::fmt::Display;

/// Http Status Codes used by this server.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 15.2.2 — WebSocket upgrade accepted.
    SwitchingProtocols = 101,
    /// 15.3.1
    Ok = 200,
    /// 15.3.5 — no body, used for HEAD-style/upgrade acks.
    NoContent = 204,
    /// 15.4.5 — conditional GET cache hit (§3, §6).
    NotModified = 304,
    /// 15.5.1 — malformed request or auth fields.
    BadRequest = 400,
    /// 15.5.2 — missing/invalid Digest auth.
    Unauthorized = 401,
    /// 15.5.5
    NotFound = 404,
    /// 15.5.6 — method not allowed on this handler (§4.4).
    MethodNotAllowed = 405,
    /// 15.6.1 — handler raised, caught at the worker boundary (§7).
    InternalServerError = 500,
}

impl Status {
    /// Standard reason phrase for this status.
    pub fn reason(self) -> &'static str {
        match self {
            Status::SwitchingProtocols => "Switching Protocols",
            Status::Ok => "OK",
            Status::NoContent => "No Content",
            Status::NotModified => "Not Modified",
            Status::BadRequest => "Bad Request",
            Status::Unauthorized => "Unauthorized",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::InternalServerError => "Internal Server Error",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", *self as u16))
    }
}
