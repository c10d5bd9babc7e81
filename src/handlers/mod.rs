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

//! URL-prefix content handlers (§4.4, §6). The file, image-repository, and
//! script-code handlers are themselves "straightforward content producers"
//! and out of scope; this module only owns what the core is responsible
//! for — conditional-GET semantics, method restrictions, and reply framing
//! — layered on the narrow collaborator traits.

use std::sync::Arc;

use tracing::warn;

use crate::collaborators::image_repo::{ImageRead, ImageRepoError, ImageRepository, ResourceKind};
use crate::facility::Facility;
use crate::http::method::Method;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::status::Status;
use crate::http::version::Version;

/// Behaviour every routed content handler implements (§4.4).
pub trait UrlHandler: Send {
    /// Methods this handler accepts; anything else is a 400 (§4.4 "Method
    /// restrictions").
    fn allowed_methods(&self) -> &'static [Method];

    /// Produces the full reply for an already-method-checked request.
    fn handle(&mut self, request: &Request, facility: &Facility) -> Response<'static>;
}

/// Parses a `CQCRepoSerNum:<n>` conditional-GET value (§6).
fn parse_if_modified_since(header: Option<&str>) -> Option<u64> {
    header?.strip_prefix("CQCRepoSerNum:")?.trim().parse().ok()
}

/// Shared conditional-GET logic for the file and image-repository
/// handlers, which differ only in [`ResourceKind`] and content type.
fn serve_resource(
    repo: &dyn ImageRepository,
    version: Version,
    path: &str,
    in_serial: Option<u64>,
    content_type: &'static str,
) -> Response<'static> {
    match repo.read_image(path, in_serial, None) {
        Ok(ImageRead::Unchanged) => Response::new(version, Status::NotModified),
        Ok(ImageRead::Changed {
            buffer,
            new_serial,
            last_modified: _,
            is_png: _,
        }) => Response::new(version, Status::Ok)
            .with_body(buffer, content_type)
            .with_header("Last-Modified", format!("CQCRepoSerNum:{new_serial}")),
        Err(ImageRepoError::NotFound) => Response::new(version, Status::NotFound),
        Err(ImageRepoError::Forbidden) => Response::new(version, Status::Unauthorized),
    }
}

/// Catch-all static file handler (§4.4 "a catch-all file endpoint").
pub struct FileHandler {
    images: Arc<dyn ImageRepository>,
}

impl FileHandler {
    pub fn new(images: Arc<dyn ImageRepository>) -> Self {
        Self { images }
    }
}

impl UrlHandler for FileHandler {
    fn allowed_methods(&self) -> &'static [Method] {
        &[Method::Get, Method::Head]
    }

    fn handle(&mut self, request: &Request, _facility: &Facility) -> Response<'static> {
        if !self.images.file_exists(&request.path, ResourceKind::File) {
            return Response::new(request.version, Status::NotFound);
        }
        let in_serial = parse_if_modified_since(request.header("If-Modified-Since"));
        serve_resource(
            self.images.as_ref(),
            request.version,
            &request.path,
            in_serial,
            "text/html; charset=utf-8",
        )
    }
}

/// Image-repository handler (`/CQCImg/...`, §6 S3).
pub struct ImageHandler {
    images: Arc<dyn ImageRepository>,
}

impl ImageHandler {
    pub fn new(images: Arc<dyn ImageRepository>) -> Self {
        Self { images }
    }
}

impl UrlHandler for ImageHandler {
    fn allowed_methods(&self) -> &'static [Method] {
        &[Method::Get]
    }

    fn handle(&mut self, request: &Request, _facility: &Facility) -> Response<'static> {
        if !self.images.file_exists(&request.path, ResourceKind::Image) {
            return Response::new(request.version, Status::NotFound);
        }
        let in_serial = parse_if_modified_since(request.header("If-Modified-Since"));
        serve_resource(self.images.as_ref(), request.version, &request.path, in_serial, "image/png")
    }
}

/// Script-code ("CMLBin") endpoint; the scripting runtime itself is a
/// Non-goal, so this only frames the reply.
#[derive(Default)]
pub struct ScriptCodeHandler;

impl UrlHandler for ScriptCodeHandler {
    fn allowed_methods(&self) -> &'static [Method] {
        &[Method::Get, Method::Post]
    }

    fn handle(&mut self, request: &Request, _facility: &Facility) -> Response<'static> {
        warn!(path = %request.path, "script-code endpoint invoked without a bound runtime");
        Response::new(request.version, Status::NotFound)
    }
}

/// Echo voice-intent handler: a plain config-file request router that
/// always replies with a JSON `Reply` string (§7 "User-visible failures").
#[derive(Default)]
pub struct EchoHandler;

impl UrlHandler for EchoHandler {
    fn allowed_methods(&self) -> &'static [Method] {
        &[Method::Get, Method::Post]
    }

    fn handle(&mut self, request: &Request, _facility: &Facility) -> Response<'static> {
        let body = serde_json::json!({ "Reply": format!("no intent bound for {}", request.path) }).to_string();
        Response::new(request.version, Status::Ok).with_body(body.into_bytes(), "application/json")
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
    use crate::http::method::Method as M;
    use crate::http::query::QueryParams;

    fn facility(images: Arc<dyn ImageRepository>) -> Facility {
        Facility::new(
            ServerConfig::default(),
            Arc::new(MockSecurityService::new()),
            images,
            Arc::new(MockRenderingEngine::default()),
            Arc::new(MockPollingService::new()),
            Arc::new(MockScriptEngine),
        )
    }

    fn request(path: &str, if_modified_since: Option<&str>) -> Request {
        let mut headers = HeaderMap::default();
        if let Some(value) = if_modified_since {
            headers.push("If-Modified-Since", value);
        }
        Request {
            method: M::Get,
            path: path.to_string(),
            query: QueryParams::default(),
            version: Version::H1_1,
            headers,
            content_type: None,
            charset: None,
            body: Vec::new(),
        }
    }

    #[test]
    fn image_handler_returns_304_when_serial_matches() {
        let images: Arc<dyn ImageRepository> = Arc::new(MockImageRepository::new().with_image("/CQCImg/Foo", vec![1, 2, 3], 42, true));
        let facility = facility(Arc::clone(&images));
        let mut handler = ImageHandler::new(images);
        let response = handler.handle(&request("/CQCImg/Foo", Some("CQCRepoSerNum:42")), &facility);
        assert_eq!(response.status(), Status::NotModified);
    }

    #[test]
    fn image_handler_returns_200_with_new_serial_when_stale() {
        let images: Arc<dyn ImageRepository> = Arc::new(MockImageRepository::new().with_image("/CQCImg/Foo", vec![1, 2, 3], 43, true));
        let facility = facility(Arc::clone(&images));
        let mut handler = ImageHandler::new(images);
        let response = handler.handle(&request("/CQCImg/Foo", Some("CQCRepoSerNum:42")), &facility);
        assert_eq!(response.status(), Status::Ok);
    }

    #[test]
    fn file_handler_404s_on_missing_path() {
        let images: Arc<dyn ImageRepository> = Arc::new(MockImageRepository::new());
        let facility = facility(Arc::clone(&images));
        let mut handler = FileHandler::new(images);
        let response = handler.handle(&request("/index.html", None), &facility);
        assert_eq!(response.status(), Status::NotFound);
    }
}
