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

//! Request model (§3) and the `read_request` facade that stands in for the
//! HTTP/1.1 wire parser — an external collaborator per §6/Non-goals. A real
//! deployment plugs in a commodity parser behind this same shape; what's
//! here is the minimal blocking line reader needed to drive the rest of the
//! core and its tests.

use std::io::{BufRead, BufReader, Read};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::headers::HeaderMap;
use super::method::Method;
use super::query::QueryParams;
use super::version::Version;

/// One HTTP exchange's worth of request data, owned for the lifetime of the
/// exchange on one worker (§3).
#[derive(Debug)]
pub struct Request {
    /// Request method.
    pub method: Method,
    /// Request-target path, e.g. `/Secure/Admin/x.html`.
    pub path: String,
    /// Parsed query parameters; the worker appends authenticated user/role
    /// and folds in a urlencoded POST body here (§4.3).
    pub query: QueryParams,
    /// HTTP version requested.
    pub version: Version,
    /// Request headers.
    pub headers: HeaderMap,
    /// `Content-Type` header, without parameters.
    pub content_type: Option<String>,
    /// `charset` parameter of `Content-Type`, if present.
    pub charset: Option<String>,
    /// Request body, if any.
    pub body: Vec<u8>,
}

impl Request {
    /// Case-insensitive header lookup convenience.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

/// Failure modes of [`read_request`], mapped by the worker to an HTTP error
/// reply or a dropped connection (§7).
#[derive(Debug, Error)]
pub enum ReadRequestError {
    /// No bytes arrived before the deadline.
    #[error("timed out waiting for request")]
    Timeout,
    /// The request line or headers could not be parsed.
    #[error("malformed request: {0}")]
    Malformed(&'static str),
    /// An HTTP version other than 1.0/1.1 was requested.
    #[error("unsupported HTTP version")]
    UnsupportedVersion,
    /// The peer closed the connection before a full request arrived.
    #[error("connection closed")]
    Closed,
    /// Underlying I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reads and parses one HTTP/1.x request from `source`, honoring `deadline`
/// as a hard wall-clock limit for the whole exchange (the socket-level read
/// timeout bounds each individual read; this additionally bounds the total
/// time spent assembling the request headers).
pub fn read_request<R: Read>(
    source: R,
    deadline: Instant,
) -> Result<Request, ReadRequestError> {
    let mut reader = BufReader::new(source);

    let request_line = read_line(&mut reader, deadline)?;
    let mut parts = request_line.split_whitespace();
    let method: Method = parts
        .next()
        .ok_or(ReadRequestError::Malformed("missing method"))?
        .parse()
        .map_err(|_| ReadRequestError::Malformed("unknown method"))?;
    let target = parts
        .next()
        .ok_or(ReadRequestError::Malformed("missing target"))?
        .to_string();
    let version_token = parts
        .next()
        .ok_or(ReadRequestError::Malformed("missing version"))?;
    let version = Version::parse(version_token).ok_or(ReadRequestError::UnsupportedVersion)?;

    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), QueryParams::parse(q)),
        None => (target, QueryParams::new()),
    };

    let mut headers = HeaderMap::new();
    loop {
        let line = read_line(&mut reader, deadline)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or(ReadRequestError::Malformed("malformed header"))?;
        headers.push(name.trim(), value.trim());
    }

    let content_type_header = headers.get("content-type").map(str::to_string);
    let (content_type, charset) = match &content_type_header {
        Some(ct) => split_content_type(ct),
        None => (None, None),
    };

    let content_length: usize = headers
        .get("content-length")
        .map(|v| v.trim().parse().unwrap_or(0))
        .unwrap_or(0);

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        read_exact_with_deadline(&mut reader, &mut body, deadline)?;
    }

    Ok(Request {
        method,
        path,
        query,
        version,
        headers,
        content_type,
        charset,
        body,
    })
}

fn split_content_type(raw: &str) -> (Option<String>, Option<String>) {
    match raw.split_once(';') {
        Some((mime, rest)) => {
            let charset = rest
                .split(';')
                .map(str::trim)
                .find_map(|p| p.strip_prefix("charset="))
                .map(|c| c.trim_matches('"').to_string());
            (Some(mime.trim().to_string()), charset)
        }
        None => (Some(raw.trim().to_string()), None),
    }
}

fn read_line<R: Read>(
    reader: &mut BufReader<R>,
    deadline: Instant,
) -> Result<String, ReadRequestError> {
    if Instant::now() > deadline {
        return Err(ReadRequestError::Timeout);
    }
    let mut line = Vec::new();
    let read = reader
        .read_until(b'\n', &mut line)
        .map_err(ReadRequestError::Io)?;
    if read == 0 {
        return Err(ReadRequestError::Closed);
    }
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
    String::from_utf8(line).map_err(|_| ReadRequestError::Malformed("non-UTF-8 header line"))
}

fn read_exact_with_deadline<R: Read>(
    reader: &mut BufReader<R>,
    buf: &mut [u8],
    deadline: Instant,
) -> Result<(), ReadRequestError> {
    if Instant::now() > deadline {
        return Err(ReadRequestError::Timeout);
    }
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ReadRequestError::Closed
        } else {
            ReadRequestError::Io(e)
        }
    })
}

/// Dummy deadline helper for call sites that want "no extra bound beyond the
/// socket read timeout".
pub fn far_future_deadline() -> Instant {
    Instant::now() + Duration::from_secs(60 * 60 * 24 * 365)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_get_with_query_and_headers() {
        let raw = b"GET /Secure/Admin/x.html?foo=bar HTTP/1.1\r\nHost: example\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n";
        let req = read_request(Cursor::new(raw.to_vec()), far_future_deadline()).unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/Secure/Admin/x.html");
        assert_eq!(req.query.get("foo"), Some("bar"));
        assert_eq!(req.version, Version::H1_1);
        assert_eq!(req.content_type.as_deref(), Some("text/plain"));
        assert_eq!(req.charset.as_deref(), Some("utf-8"));
    }

    #[test]
    fn reads_body_by_content_length() {
        let raw = b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let req = read_request(Cursor::new(raw.to_vec()), far_future_deadline()).unwrap();
        assert_eq!(req.body, b"hello");
    }

    #[test]
    fn rejects_unknown_version() {
        let raw = b"GET / HTTP/2.0\r\n\r\n";
        let err = read_request(Cursor::new(raw.to_vec()), far_future_deadline()).unwrap_err();
        assert!(matches!(err, ReadRequestError::UnsupportedVersion));
    }
}
