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

//! Image repository collaborator (§6). Image codecs themselves are a
//! Non-goal; this crate only asks the repository for bytes plus a serial
//! number used for conditional GET (§6, S3) and the RIVA image cache (§4.9).

use thiserror::Error;

/// Kinds of path the catch-all handlers distinguish (§4.4 method
/// restrictions apply identically to both).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A repository-managed image.
    Image,
    /// A plain static file under the web root.
    File,
}

/// Errors the repository can report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImageRepoError {
    /// No such path.
    #[error("not found")]
    NotFound,
    /// Caller lacked permission for this path.
    #[error("forbidden")]
    Forbidden,
}

/// Result of [`ImageRepository::read_image`].
#[derive(Debug, Clone)]
pub enum ImageRead {
    /// The caller's `in_serial` already matches; no body is returned.
    Unchanged,
    /// Fresh image bytes and the serial number to cache against.
    Changed {
        /// Raw encoded image bytes.
        buffer: Vec<u8>,
        /// New serial number, formatted into `Last-Modified` as
        /// `CQCRepoSerNum:<number>` (§6).
        new_serial: u64,
        /// RFC 2822 last-modified string for non-conditional replies.
        last_modified: String,
        /// True when `buffer` is already PNG-encoded.
        is_png: bool,
    },
}

/// The narrow façade onto the image repository / security server (§6).
pub trait ImageRepository: Send + Sync {
    /// Reads `path`, returning `Unchanged` when `in_serial` (if any) already
    /// matches the repository's current serial for that path.
    fn read_image(
        &self,
        path: &str,
        in_serial: Option<u64>,
        user_token: Option<&str>,
    ) -> Result<ImageRead, ImageRepoError>;

    /// Whether `path` exists as the given kind, without fetching its bytes.
    fn file_exists(&self, path: &str, kind: ResourceKind) -> bool;

    /// Current serial number for `path`, used by the RIVA image cache to
    /// decide whether a retransmission is needed (§4.9).
    fn current_serial(&self, path: &str) -> Option<u64>;
}

/// An in-memory repository sufficient for tests.
#[derive(Debug, Default)]
pub struct MockImageRepository {
    images: std::collections::HashMap<String, (Vec<u8>, u64, bool)>,
}

impl MockImageRepository {
    /// An empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an image at `path` with the given serial.
    pub fn with_image(mut self, path: &str, bytes: Vec<u8>, serial: u64, is_png: bool) -> Self {
        self.images.insert(path.to_string(), (bytes, serial, is_png));
        self
    }
}

impl ImageRepository for MockImageRepository {
    fn read_image(
        &self,
        path: &str,
        in_serial: Option<u64>,
        _user_token: Option<&str>,
    ) -> Result<ImageRead, ImageRepoError> {
        let (bytes, serial, is_png) = self.images.get(path).ok_or(ImageRepoError::NotFound)?;
        if in_serial == Some(*serial) {
            return Ok(ImageRead::Unchanged);
        }
        Ok(ImageRead::Changed {
            buffer: bytes.clone(),
            new_serial: *serial,
            last_modified: format!("CQCRepoSerNum:{serial}"),
            is_png: *is_png,
        })
    }

    fn file_exists(&self, path: &str, _kind: ResourceKind) -> bool {
        self.images.contains_key(path)
    }

    fn current_serial(&self, path: &str) -> Option<u64> {
        self.images.get(path).map(|(_, serial, _)| *serial)
    }
}
