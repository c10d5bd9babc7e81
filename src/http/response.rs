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

//! Response builder (§3): status, reason phrase, ordered headers, and a body
//! buffer borrowed from the request/handler where possible to avoid a copy.

use std::borrow::Cow;
use std::io::{self, Write};

use chrono::Utc;

use super::headers::HeaderMap;
use super::status::Status;
use super::version::Version;

/// One HTTP reply, built by a handler and serialized by the worker.
pub struct Response<'a> {
    version: Version,
    status: Status,
    headers: HeaderMap,
    body: Cow<'a, [u8]>,
}

impl<'a> Response<'a> {
    /// Starts a reply with the given status and no body.
    pub fn new(version: Version, status: Status) -> Self {
        Self {
            version,
            status,
            headers: HeaderMap::new(),
            body: Cow::Borrowed(&[]),
        }
    }

    /// Attaches a body and matching `Content-Length`/`Content-Type`.
    pub fn with_body(mut self, body: impl Into<Cow<'a, [u8]>>, content_type: &str) -> Self {
        self.body = body.into();
        self.headers.push("Content-Length", self.body.len().to_string());
        self.headers.push("Content-Type", content_type.to_string());
        self
    }

    /// Appends an arbitrary header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    /// The status this reply carries.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Stamps the headers every reply gets unconditionally (§6, SPEC_FULL
    /// §3): `Date`, `Server`, `Connection: Close`. The original always
    /// resets its output stream and writes these first, including on error
    /// replies.
    fn stamp_common_headers(&mut self) {
        let mut stamped = HeaderMap::new();
        stamped.push("Date", Utc::now().to_rfc2822());
        stamped.push("Server", "CQC Web Server");
        stamped.push("Connection", "Close");
        for h in self.headers.iter() {
            stamped.push(h.name.clone(), h.value.clone());
        }
        self.headers = stamped;
    }

    /// Serializes the status line, headers, and body onto `out`. When
    /// `drop_body` is set (HEAD requests, §4.3), only the headers are
    /// written.
    pub fn write_to(mut self, out: &mut impl Write, drop_body: bool) -> io::Result<()> {
        self.stamp_common_headers();
        write!(
            out,
            "{} {} {}\r\n",
            self.version,
            self.status as u16,
            self.status.reason()
        )?;
        for h in self.headers.iter() {
            write!(out, "{}: {}\r\n", h.name, h.value)?;
        }
        write!(out, "\r\n")?;
        if !drop_body {
            out.write_all(&self.body)?;
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_common_headers_and_reason_phrase() {
        let mut buf = Vec::new();
        Response::new(Version::H1_1, Status::Ok)
            .with_body(b"hi".as_slice(), "text/plain")
            .write_to(&mut buf, false)
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Server: CQC Web Server\r\n"));
        assert!(text.contains("Connection: Close\r\n"));
        assert!(text.ends_with("hi"));
    }

    #[test]
    fn head_drops_body_but_keeps_headers() {
        let mut buf = Vec::new();
        Response::new(Version::H1_1, Status::Ok)
            .with_body(b"hi".as_slice(), "text/plain")
            .write_to(&mut buf, true)
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(!text.ends_with("hi"));
    }
}
