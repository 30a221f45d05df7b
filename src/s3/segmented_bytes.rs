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

use bytes::{Bytes, BytesMut};

/// A request or part body held as a chain of [`Bytes`] segments.
///
/// Streamed reads arrive in chunks; chaining them avoids copying every
/// part into one contiguous allocation. Segments are cheap to clone and
/// iterate for hashing and for the HTTP body stream.
#[derive(Clone, Debug, Default)]
pub struct SegmentedBytes {
    segments: Vec<Bytes>,
    total_size: usize,
}

impl SegmentedBytes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total length in bytes across all segments.
    pub fn len(&self) -> usize {
        self.total_size
    }

    pub fn is_empty(&self) -> bool {
        self.total_size == 0
    }

    pub fn append(&mut self, bytes: Bytes) {
        self.total_size += bytes.len();
        self.segments.push(bytes);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.segments.iter()
    }

    /// Copies all segments into a single contiguous `Bytes`.
    pub fn to_bytes(&self) -> Bytes {
        if self.segments.len() == 1 {
            return self.segments[0].clone();
        }
        let mut out = BytesMut::with_capacity(self.total_size);
        for segment in &self.segments {
            out.extend_from_slice(segment);
        }
        out.freeze()
    }
}

impl From<Bytes> for SegmentedBytes {
    fn from(value: Bytes) -> Self {
        let total_size = value.len();
        Self {
            segments: vec![value],
            total_size,
        }
    }
}

impl From<String> for SegmentedBytes {
    fn from(value: String) -> Self {
        SegmentedBytes::from(Bytes::from(value))
    }
}

impl From<Vec<u8>> for SegmentedBytes {
    fn from(value: Vec<u8>) -> Self {
        SegmentedBytes::from(Bytes::from(value))
    }
}

impl IntoIterator for SegmentedBytes {
    type Item = Bytes;
    type IntoIter = std::vec::IntoIter<Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty() {
        let sb = SegmentedBytes::new();
        assert_eq!(sb.len(), 0);
        assert!(sb.is_empty());
        assert_eq!(sb.to_bytes(), Bytes::new());
    }

    #[test]
    fn append_tracks_total_size() {
        let mut sb = SegmentedBytes::new();
        sb.append(Bytes::from_static(b"hello "));
        sb.append(Bytes::from_static(b"world"));
        assert_eq!(sb.len(), 11);
        assert_eq!(sb.to_bytes(), Bytes::from_static(b"hello world"));
    }

    #[test]
    fn iteration_preserves_order() {
        let mut sb = SegmentedBytes::new();
        sb.append(Bytes::from_static(b"a"));
        sb.append(Bytes::from_static(b"b"));
        sb.append(Bytes::from_static(b"c"));
        let joined: Vec<u8> = sb.into_iter().flatten().collect();
        assert_eq!(joined, b"abc");
    }
}
