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

//! An order-preserving, case-insensitively-keyed header map (§3 Data Model:
//! "header map (order preserved for iteration, case-insensitive lookup by
//! key)").

/// A single header field.
#[derive(Debug, Clone)]
pub struct Header {
    /// Field name, as received on the wire (original casing kept for
    /// iteration/forwarding).
    pub name: String,
    /// Field value.
    pub value: String,
}

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap(Vec<Header>);

impl HeaderMap {
    /// An empty header map.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a header, preserving insertion order even for repeated names.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Returns the first value for `name`, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Iterates headers in wire order.
    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    /// Number of header fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no headers are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_order_preserved() {
        let mut headers = HeaderMap::new();
        headers.push("Content-Type", "text/html");
        headers.push("X-Custom", "a");
        headers.push("x-custom", "b");

        assert_eq!(headers.get("content-type"), Some("text/html"));
        assert_eq!(headers.get("X-CUSTOM"), Some("a"));
        let names: Vec<_> = headers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["Content-Type", "X-Custom", "x-custom"]);
    }
}
