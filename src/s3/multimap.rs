// Stratus Rust Library for Amazon S3 Compatible Cloud Storage
// Copyright 2025 Stratus Contributors
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

//! Ordered multimaps for HTTP headers and query parameters, with the
//! canonicalization rules SigV4 signing depends on.

use multimap::MultiMap;
use std::borrow::Cow;
use std::collections::BTreeMap;

pub type Multimap = MultiMap<String, String>;

/// Headers never included in a canonical request.
pub const CANONICAL_IGNORED_HEADERS: &[&str] = &["accept-encoding", "authorization", "user-agent"];

/// Additional headers excluded when canonicalizing for presigned URLs.
pub const PRESIGN_IGNORED_HEADERS: &[&str] = &[
    "accept-encoding",
    "authorization",
    "user-agent",
    "content-md5",
    "x-amz-content-sha256",
    "x-amz-date",
    "x-amz-security-token",
];

pub trait MultimapExt {
    fn add<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V);

    fn add_multimap(&mut self, other: Multimap);

    /// Adds a `versionId` entry when a version is given.
    fn add_version(&mut self, version: Option<String>);

    /// URL-encoded query string in insertion order.
    fn to_query_string(&self) -> String;

    /// Canonical query string: entries re-sorted by key only; the relative
    /// order of values under one key is preserved.
    fn to_canonical_query_string(&self) -> String;

    /// Canonical headers and the matching signed-headers list, excluding
    /// `ignored` (lowercase names). Returns `(signed_headers, canonical_headers)`.
    fn to_canonical_headers(&self, ignored: &[&str]) -> (String, String);
}

impl MultimapExt for Multimap {
    fn add<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.insert(key.into(), value.into());
    }

    fn add_multimap(&mut self, other: Multimap) {
        for (key, values) in other.into_iter() {
            self.insert_many(key, values);
        }
    }

    fn add_version(&mut self, version: Option<String>) {
        if let Some(v) = version {
            self.insert("versionId".into(), v);
        }
    }

    fn to_query_string(&self) -> String {
        let mut query = String::new();
        for (key, values) in self.iter_all() {
            for value in values {
                if !query.is_empty() {
                    query.push('&');
                }
                query.push_str(&urlencoding::encode(key));
                query.push('=');
                query.push_str(&urlencoding::encode(value));
            }
        }
        query
    }

    fn to_canonical_query_string(&self) -> String {
        let mut sorted: BTreeMap<&String, &Vec<String>> = BTreeMap::new();
        for (key, values) in self.iter_all() {
            sorted.insert(key, values);
        }

        let mut query = String::new();
        for (key, values) in sorted {
            for value in values {
                if !query.is_empty() {
                    query.push('&');
                }
                query.push_str(&urlencoding::encode(key));
                query.push('=');
                query.push_str(&urlencoding::encode(value));
            }
        }
        query
    }

    fn to_canonical_headers(&self, ignored: &[&str]) -> (String, String) {
        let mut entries: BTreeMap<String, String> = BTreeMap::new();

        for (key, values) in self.iter_all() {
            let name = key.to_lowercase();
            if ignored.contains(&name.as_str()) {
                continue;
            }
            let joined = values
                .iter()
                .map(|v| collapse_spaces(v.trim()))
                .collect::<Vec<Cow<'_, str>>>()
                .join(",");
            entries.insert(name, joined);
        }

        let signed_headers = entries.keys().cloned().collect::<Vec<String>>().join(";");

        let mut canonical = String::new();
        for (name, value) in &entries {
            if !canonical.is_empty() {
                canonical.push('\n');
            }
            canonical.push_str(name);
            canonical.push(':');
            canonical.push_str(value);
        }

        (signed_headers, canonical)
    }
}

/// Collapses each run of whitespace to a single space, borrowing when no
/// rewrite is needed.
pub fn collapse_spaces(value: &str) -> Cow<'_, str> {
    let needs_rewrite = {
        let mut prev_space = false;
        let mut found = false;
        for c in value.chars() {
            let is_space = c.is_whitespace();
            if is_space && (prev_space || c != ' ') {
                found = true;
                break;
            }
            prev_space = is_space;
        }
        found
    };
    if !needs_rewrite {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len());
    let mut prev_space = false;
    for c in value.chars() {
        if c.is_whitespace() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_spaces_borrows_when_clean() {
        let v = "already clean value";
        assert!(matches!(collapse_spaces(v), Cow::Borrowed(_)));
    }

    #[test]
    fn collapse_spaces_collapses_runs() {
        assert_eq!(collapse_spaces("a  b   c"), "a b c");
        assert_eq!(collapse_spaces("a\t b"), "a b");
        assert_eq!(collapse_spaces("a\n\nb"), "a b");
    }

    #[test]
    fn canonical_query_sorts_by_key_only() {
        let mut q = Multimap::new();
        q.add("prefix", "b");
        q.add("prefix", "a");
        q.add("delimiter", "/");
        // values under "prefix" keep insertion order even though "b" > "a"
        assert_eq!(
            q.to_canonical_query_string(),
            "delimiter=%2F&prefix=b&prefix=a"
        );
    }

    #[test]
    fn canonical_headers_exclude_and_sort() {
        let mut h = Multimap::new();
        h.add("Host", "example.com");
        h.add("x-amz-date", "20130524T000000Z");
        h.add("Authorization", "secret");
        h.add("User-Agent", "test-agent");
        let (signed, canonical) = h.to_canonical_headers(CANONICAL_IGNORED_HEADERS);
        assert_eq!(signed, "host;x-amz-date");
        assert_eq!(canonical, "host:example.com\nx-amz-date:20130524T000000Z");
    }

    #[test]
    fn canonical_headers_join_repeats() {
        let mut h = Multimap::new();
        h.add("x-test", "one  two");
        h.add("x-test", "three");
        let (signed, canonical) = h.to_canonical_headers(CANONICAL_IGNORED_HEADERS);
        assert_eq!(signed, "x-test");
        assert_eq!(canonical, "x-test:one two,three");
    }

    #[test]
    fn presign_ignore_set_drops_amz_headers() {
        let mut h = Multimap::new();
        h.add("host", "example.com");
        h.add("x-amz-date", "20130524T000000Z");
        h.add("x-amz-content-sha256", "UNSIGNED-PAYLOAD");
        let (signed, _) = h.to_canonical_headers(PRESIGN_IGNORED_HEADERS);
        assert_eq!(signed, "host");
    }
}
