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

//! The remote image cache and chunked image transfer protocol (§3, §4.9).
//!
//! The cache mirrors what the *client* has already cached, by path and
//! serial number, so the session never retransmits an image the browser
//! already holds. Updates are optimistic: the cache is updated once the
//! final chunk is queued, not once the client acknowledges receipt (§9
//! Open Question (b) — a known trade-off, not a bug).

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Bound on the base64 payload per chunk, keeping the whole JSON frame
/// under the ~64 KB per-WebSocket-fragment limit (§4.9 "Image protocol").
const MAX_CHUNK_BASE64_BYTES: usize = 60 * 1024;

/// One outgoing image transfer message, matching the RIVA wire opcodes
/// `ImgDataFirst` / `ImgDataNext` (§6 "RIVA wire protocol").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageChunk {
    First {
        path: String,
        serial: u64,
        total_size: usize,
        width: u32,
        height: u32,
        is_png: bool,
        is_last: bool,
        data: String,
    },
    Next {
        path: String,
        is_last: bool,
        data: String,
    },
}

/// The client's known-image set, keyed case-insensitively on path (§3
/// "Case-insensitive keys").
#[derive(Default)]
pub struct RemoteImageCache {
    known: HashMap<String, u64>,
}

impl RemoteImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(path: &str) -> String {
        path.to_ascii_lowercase()
    }

    /// True if the client is already known to hold `path` at `serial`.
    pub fn has_current(&self, path: &str, serial: u64) -> bool {
        self.known.get(&Self::normalize(path)) == Some(&serial)
    }

    /// Records that the client now holds `path` at `serial`, called after
    /// the final chunk of a transfer has been queued.
    pub fn record(&mut self, path: &str, serial: u64) {
        self.known.insert(Self::normalize(path), serial);
    }

    /// Resets the cache entirely from a client-reported manifest, as
    /// happens on a RIVA handshake (§3 "updated ... on handshake from the
    /// client's manifest").
    pub fn reset_from_manifest(&mut self, manifest: impl IntoIterator<Item = (String, u64)>) {
        self.known.clear();
        for (path, serial) in manifest {
            self.known.insert(Self::normalize(&path), serial);
        }
    }
}

/// Splits raw pixel-encoded image bytes into the chunk sequence the
/// session should enqueue before the draw-image command that references
/// it (§8 property 7, scenario S6).
///
/// `encoded` is the already-PNG/JPEG-encoded image buffer; this function
/// owns only the base64 + chunk-boundary slicing, matching the source's
/// "chunk size is bounded so the full frame stays under the ~64 KB
/// per-fragment limit" rule.
pub fn build_chunks(
    path: &str,
    serial: u64,
    encoded: &[u8],
    width: u32,
    height: u32,
    is_png: bool,
) -> Vec<ImageChunk> {
    let b64 = BASE64.encode(encoded);
    let mut chunks = Vec::new();
    let mut offset = 0;
    let total_size = encoded.len();

    if b64.len() <= MAX_CHUNK_BASE64_BYTES {
        chunks.push(ImageChunk::First {
            path: path.to_string(),
            serial,
            total_size,
            width,
            height,
            is_png,
            is_last: true,
            data: b64,
        });
        return chunks;
    }

    let first_len = MAX_CHUNK_BASE64_BYTES.min(b64.len());
    chunks.push(ImageChunk::First {
        path: path.to_string(),
        serial,
        total_size,
        width,
        height,
        is_png,
        is_last: false,
        data: b64[..first_len].to_string(),
    });
    offset = first_len;

    while offset < b64.len() {
        let end = (offset + MAX_CHUNK_BASE64_BYTES).min(b64.len());
        let is_last = end == b64.len();
        chunks.push(ImageChunk::Next {
            path: path.to_string(),
            is_last,
            data: b64[offset..end].to_string(),
        });
        offset = end;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_image_yields_single_first_chunk_marked_last() {
        let data = vec![7u8; 128];
        let chunks = build_chunks("/Repo/X", 5, &data, 32, 32, true);
        assert_eq!(chunks.len(), 1);
        match &chunks[0] {
            ImageChunk::First { is_last, path, serial, .. } => {
                assert!(*is_last);
                assert_eq!(path, "/Repo/X");
                assert_eq!(*serial, 5);
            }
            _ => panic!("expected First chunk"),
        }
    }

    #[test]
    fn large_image_splits_with_only_final_chunk_marked_last() {
        let data = vec![9u8; 200_000];
        let chunks = build_chunks("/Repo/Big", 1, &data, 800, 600, false);
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            match chunk {
                ImageChunk::First { is_last, .. } | ImageChunk::Next { is_last, .. } => {
                    assert!(!is_last)
                }
            }
        }
        match chunks.last().unwrap() {
            ImageChunk::Next { is_last, .. } => assert!(*is_last),
            ImageChunk::First { is_last, .. } => assert!(*is_last),
        }
    }

    #[test]
    fn cache_elides_retransmission_only_for_matching_serial() {
        let mut cache = RemoteImageCache::new();
        assert!(!cache.has_current("/Repo/X", 5));
        cache.record("/Repo/X", 5);
        assert!(cache.has_current("/REPO/x", 5));
        assert!(!cache.has_current("/Repo/X", 6));
    }

    #[test]
    fn reset_from_manifest_replaces_entire_cache() {
        let mut cache = RemoteImageCache::new();
        cache.record("/Repo/Stale", 1);
        cache.reset_from_manifest(vec![("/Repo/Fresh".to_string(), 9)]);
        assert!(!cache.has_current("/Repo/Stale", 1));
        assert!(cache.has_current("/Repo/Fresh", 9));
    }
}
