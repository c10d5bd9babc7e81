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

//! The URL router (§4.4): a small, in-scope component that performs
//! longest-prefix-match dispatch onto one of a closed set of content
//! handlers, enforces each handler's method restrictions, and lazily
//! instantiates handlers per worker (no cross-worker locking, §5).

use crate::facility::Facility;
use crate::handlers::{EchoHandler, FileHandler, ImageHandler, ScriptCodeHandler, UrlHandler};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::status::Status;

/// A known URL prefix and the handler kind it dispatches to.
struct Route {
    prefix: &'static str,
    kind: HandlerKind,
}

/// The closed set of content handlers (§9 "Replace virtual inheritance
/// with a closed set of variants (tagged union) at the URL-router
/// level").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    File,
    Image,
    Script,
    Echo,
}

/// Routing table, tried longest-prefix-first; the bare `/` entry is the
/// catch-all file handler.
const ROUTES: &[Route] = &[
    Route {
        prefix: "/CQCImg/",
        kind: HandlerKind::Image,
    },
    Route {
        prefix: "/CMLBin/",
        kind: HandlerKind::Script,
    },
    Route {
        prefix: "/Echo/",
        kind: HandlerKind::Echo,
    },
    Route {
        prefix: "/",
        kind: HandlerKind::File,
    },
];

/// Resolves `path` to the handler kind with the longest matching
/// registered prefix (§4.4).
pub fn resolve(path: &str) -> HandlerKind {
    ROUTES
        .iter()
        .filter(|route| path.starts_with(route.prefix))
        .max_by_key(|route| route.prefix.len())
        .map(|route| route.kind)
        .unwrap_or(HandlerKind::File)
}

/// Per-worker, lazily-populated handler instances. One `Router` lives on
/// each worker thread; nothing here is shared across workers.
#[derive(Default)]
pub struct Router {
    file: Option<FileHandler>,
    image: Option<ImageHandler>,
    script: Option<ScriptCodeHandler>,
    echo: Option<EchoHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `request` to the appropriate handler, instantiating it on
    /// first use, and enforces its method restrictions before calling it.
    pub fn dispatch(&mut self, request: &Request, facility: &Facility) -> Response<'static> {
        let kind = resolve(&request.path);
        let handler: &mut dyn UrlHandler = match kind {
            HandlerKind::File => self
                .file
                .get_or_insert_with(|| FileHandler::new(facility.images.clone())),
            HandlerKind::Image => self
                .image
                .get_or_insert_with(|| ImageHandler::new(facility.images.clone())),
            HandlerKind::Script => self.script.get_or_insert_with(ScriptCodeHandler::default),
            HandlerKind::Echo => self.echo.get_or_insert_with(EchoHandler::default),
        };

        if !handler.allowed_methods().contains(&request.method) {
            return Response::new(request.version, Status::BadRequest);
        }
        handler.handle(request, facility)
    }
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
    use crate::http::method::Method;
    use crate::http::query::QueryParams;
    use crate::http::version::Version;
    use std::sync::Arc;

    fn request(method: Method, path: &str) -> Request {
        Request {
            method,
            path: path.to_string(),
            query: QueryParams::default(),
            version: Version::H1_1,
            headers: HeaderMap::default(),
            content_type: None,
            charset: None,
            body: Vec::new(),
        }
    }

    fn facility() -> Facility {
        Facility::new(
            ServerConfig::default(),
            Arc::new(MockSecurityService::new()),
            Arc::new(MockImageRepository::new().with_image("/CQCImg/Foo", vec![1], 1, true)),
            Arc::new(MockRenderingEngine::default()),
            Arc::new(MockPollingService::new()),
            Arc::new(MockScriptEngine),
        )
    }

    #[test]
    fn longest_prefix_wins_over_catch_all() {
        assert_eq!(resolve("/CQCImg/Foo"), HandlerKind::Image);
        assert_eq!(resolve("/index.html"), HandlerKind::File);
        assert_eq!(resolve("/CMLBin/User/Foo"), HandlerKind::Script);
        assert_eq!(resolve("/Echo/Intent"), HandlerKind::Echo);
    }

    #[test]
    fn dispatch_routes_image_requests_to_the_image_handler() {
        let facility = facility();
        let mut router = Router::new();
        let response = router.dispatch(&request(Method::Get, "/CQCImg/Foo"), &facility);
        assert_eq!(response.status(), Status::Ok);
    }

    #[test]
    fn dispatch_rejects_disallowed_methods() {
        let facility = facility();
        let mut router = Router::new();
        let response = router.dispatch(&request(Method::Post, "/CQCImg/Foo"), &facility);
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[test]
    fn handler_instances_are_reused_across_calls() {
        let facility = facility();
        let mut router = Router::new();
        let _ = router.dispatch(&request(Method::Get, "/index.html"), &facility);
        assert!(router.file.is_some());
        let _ = router.dispatch(&request(Method::Get, "/other.html"), &facility);
        assert!(router.image.is_none());
    }
}
