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

//! URL query-parameter list. Kept as an ordered list (not a map) because the
//! worker appends synthesized entries (authenticated user/role, §4.3) after
//! parsing, and a POST body's `application/x-www-form-urlencoded` fields are
//! folded into the same list a script handler sees (§4.3).

/// An ordered `(name, value)` parameter list.
#[derive(Debug, Clone, Default)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// Empty parameter list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parses a `key=value&key2=value2` query string (already split off the
    /// `?`), percent-decoding both names and values.
    pub fn parse(raw: &str) -> Self {
        Self(url::form_urlencoded::parse(raw.as_bytes()).map(|(n, v)| (n.into_owned(), v.into_owned())).collect())
    }

    /// Appends a parameter, e.g. the authenticated user/role (§4.3).
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Extends this list with another, used to fold a urlencoded POST body
    /// into the query parameters a handler receives (§4.3).
    pub fn extend(&mut self, other: QueryParams) {
        self.0.extend(other.0);
    }

    /// First value for `name`, exact (case-sensitive) match.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Parses an `application/x-www-form-urlencoded` body the same way as a
/// query string (§4.3).
pub fn parse_form_body(body: &[u8]) -> QueryParams {
    QueryParams::parse(&String::from_utf8_lossy(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_decodes() {
        let params = QueryParams::parse("user=joe%20bloggs&pw=a%2Bb");
        assert_eq!(params.get("user"), Some("joe bloggs"));
        assert_eq!(params.get("pw"), Some("a+b"));
    }

    #[test]
    fn appended_params_are_visible() {
        let mut params = QueryParams::parse("a=1");
        params.push("user", "admin");
        assert_eq!(params.get("user"), Some("admin"));
        let all: Vec<_> = params.iter().collect();
        assert_eq!(all, [("a", "1"), ("user", "admin")]);
    }
}
