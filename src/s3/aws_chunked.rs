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

//! `aws-chunked` content encoding with a trailing checksum.
//!
//! Used for streaming uploads where the checksum is only known after the
//! body has been read. The unsigned form pairs with the
//! `STREAMING-UNSIGNED-PAYLOAD-TRAILER` content hash sentinel:
//!
//! ```text
//! <hex-chunk-size>\r\n
//! <chunk-data>\r\n
//! ...
//! 0\r\n
//! x-amz-checksum-<algorithm>:<base64-value>\r\n
//! \r\n
//! ```
//!
//! The signed form (`STREAMING-AWS4-HMAC-SHA256-PAYLOAD-TRAILER`) carries
//! a signature per chunk, chained from the request's seed signature, and
//! a final trailer signature:
//!
//! ```text
//! <hex-chunk-size>;chunk-signature=<sig>\r\n
//! <chunk-data>\r\n
//! ...
//! 0;chunk-signature=<final-sig>\r\n
//! x-amz-checksum-<algorithm>:<base64-value>\r\n
//! x-amz-trailer-signature:<trailer-sig>\r\n
//! \r\n
//! ```
//!
//! Line endings differ between the wire and the signature input: bytes on
//! the wire use CRLF per RFC 9112, while the canonical trailer that gets
//! hashed for the trailer signature uses a bare LF.
//!
//! Reference: <https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-streaming-trailers.html>
//!
//! The encoded-length calculators assume the input stream yields the body
//! in `chunk_size` pieces with only the final piece short; [`rechunk`]
//! reslices arbitrary buffers into that shape before wrapping them.

use crate::s3::checksum::{ChecksumAlgorithm, Hasher};
use crate::s3::signer::{ChunkSigningContext, sign_chunk, sign_trailer};
use crate::s3::utils::{EMPTY_SHA256, sha256_hash};
use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

/// Default chunk size for aws-chunked encoding (64 KiB).
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

pub fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

/// Base64 length of a finalized checksum for the given algorithm.
fn checksum_b64_len(algorithm: ChecksumAlgorithm) -> u64 {
    match algorithm {
        ChecksumAlgorithm::Crc32 | ChecksumAlgorithm::Crc32c => 8,
        ChecksumAlgorithm::Crc64Nvme => 12,
        ChecksumAlgorithm::Sha1 => 28,
        ChecksumAlgorithm::Sha256 => 44,
        ChecksumAlgorithm::Md5 => 24,
    }
}

/// Reslices buffers into `chunk_size` pieces, merging across buffer
/// boundaries, so the encoders emit exactly the frames the encoded-length
/// calculators assume. Slicing a large buffer is zero-copy; only pieces
/// spanning a boundary are copied.
pub fn rechunk(segments: Vec<Bytes>, chunk_size: usize) -> Vec<Bytes> {
    let mut out = Vec::new();
    let mut spill = BytesMut::new();
    for mut segment in segments {
        if !spill.is_empty() {
            let take = (chunk_size - spill.len()).min(segment.len());
            spill.extend_from_slice(&segment.split_to(take));
            if spill.len() == chunk_size {
                out.push(spill.split().freeze());
            }
        }
        while segment.len() >= chunk_size {
            out.push(segment.split_to(chunk_size));
        }
        if !segment.is_empty() {
            spill.extend_from_slice(&segment);
        }
    }
    if !spill.is_empty() {
        out.push(spill.freeze());
    }
    out
}

#[derive(Clone, Copy)]
enum EncoderState {
    /// Emitting data chunks
    Streaming,
    /// Emitting the final zero-length chunk marker
    FinalChunk,
    /// Emitting the trailer with checksum
    Trailer,
    /// Done
    Done,
}

/// Wraps a byte stream in unsigned aws-chunked framing, appending the
/// checksum of everything streamed as a trailer.
pub struct AwsChunkedEncoder<S> {
    inner: S,
    algorithm: ChecksumAlgorithm,
    hasher: Box<dyn Hasher>,
    state: EncoderState,
}

impl<S> AwsChunkedEncoder<S> {
    pub fn new(inner: S, algorithm: ChecksumAlgorithm) -> Self {
        Self {
            inner,
            algorithm,
            hasher: algorithm.hasher(),
            state: EncoderState::Streaming,
        }
    }
}

impl<S, E> Stream for AwsChunkedEncoder<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.state {
                EncoderState::Streaming => {
                    let inner = Pin::new(&mut self.inner);
                    match inner.poll_next(cx) {
                        Poll::Ready(Some(Ok(chunk))) => {
                            if chunk.is_empty() {
                                continue;
                            }
                            self.hasher.update(&chunk);

                            // <hex-size>\r\n<data>\r\n
                            let header = format!("{:x}\r\n", chunk.len());
                            let mut out = Vec::with_capacity(header.len() + chunk.len() + 2);
                            out.extend_from_slice(header.as_bytes());
                            out.extend_from_slice(&chunk);
                            out.extend_from_slice(b"\r\n");
                            return Poll::Ready(Some(Ok(Bytes::from(out))));
                        }
                        Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                        Poll::Ready(None) => self.state = EncoderState::FinalChunk,
                        Poll::Pending => return Poll::Pending,
                    }
                }

                EncoderState::FinalChunk => {
                    self.state = EncoderState::Trailer;
                    return Poll::Ready(Some(Ok(Bytes::from_static(b"0\r\n"))));
                }

                EncoderState::Trailer => {
                    let trailer =
                        format!("{}:{}\r\n\r\n", self.algorithm.header_name(), self.hasher.sum());
                    self.state = EncoderState::Done;
                    return Poll::Ready(Some(Ok(Bytes::from(trailer))));
                }

                EncoderState::Done => return Poll::Ready(None),
            }
        }
    }
}

/// Total body length after unsigned aws-chunked framing, for the
/// `Content-Length` header.
pub fn calculate_encoded_length(
    content_length: u64,
    chunk_size: usize,
    algorithm: ChecksumAlgorithm,
) -> u64 {
    let chunk_size = chunk_size as u64;
    let full_chunks = content_length / chunk_size;
    let last_chunk_size = content_length % chunk_size;

    // Each chunk: "<hex-size>\r\n<data>\r\n"
    let hex_len_full = format!("{chunk_size:x}").len() as u64;
    let full_chunk_overhead = full_chunks * (hex_len_full + 2 + chunk_size + 2);
    let partial_chunk_overhead = if last_chunk_size > 0 {
        format!("{last_chunk_size:x}").len() as u64 + 2 + last_chunk_size + 2
    } else {
        0
    };

    // "0\r\n" plus "<header>:<base64>\r\n\r\n"
    let final_chunk = 3;
    let trailer_len = algorithm.header_name().len() as u64 + 1 + checksum_b64_len(algorithm) + 4;

    full_chunk_overhead + partial_chunk_overhead + final_chunk + trailer_len
}

#[derive(Clone, Copy)]
enum SignedEncoderState {
    Streaming,
    FinalChunk,
    Trailer,
    TrailerSignature,
    Done,
}

/// Signed aws-chunked framing. Each chunk signature chains from the
/// previous one, starting at the request's seed signature; the trailer
/// signature chains from the final (empty) chunk's signature.
pub struct SignedAwsChunkedEncoder<S> {
    inner: S,
    algorithm: ChecksumAlgorithm,
    hasher: Box<dyn Hasher>,
    state: SignedEncoderState,
    context: ChunkSigningContext,
    current_signature: String,
}

impl<S> SignedAwsChunkedEncoder<S> {
    pub fn new(inner: S, algorithm: ChecksumAlgorithm, context: ChunkSigningContext) -> Self {
        let current_signature = context.seed_signature.clone();
        Self {
            inner,
            algorithm,
            hasher: algorithm.hasher(),
            state: SignedEncoderState::Streaming,
            context,
            current_signature,
        }
    }

    fn sign_chunk_data(&mut self, chunk_sha256: &str) -> String {
        let signature = sign_chunk(&self.context, &self.current_signature, chunk_sha256);
        self.current_signature = signature.clone();
        signature
    }
}

impl<S, E> Stream for SignedAwsChunkedEncoder<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.state {
                SignedEncoderState::Streaming => {
                    let inner = Pin::new(&mut self.inner);
                    match inner.poll_next(cx) {
                        Poll::Ready(Some(Ok(chunk))) => {
                            if chunk.is_empty() {
                                continue;
                            }
                            self.hasher.update(&chunk);

                            let chunk_hash = sha256_hash(&chunk);
                            let signature = self.sign_chunk_data(&chunk_hash);

                            // <hex-size>;chunk-signature=<sig>\r\n<data>\r\n
                            let header =
                                format!("{:x};chunk-signature={signature}\r\n", chunk.len());
                            let mut out = Vec::with_capacity(header.len() + chunk.len() + 2);
                            out.extend_from_slice(header.as_bytes());
                            out.extend_from_slice(&chunk);
                            out.extend_from_slice(b"\r\n");
                            return Poll::Ready(Some(Ok(Bytes::from(out))));
                        }
                        Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                        Poll::Ready(None) => self.state = SignedEncoderState::FinalChunk,
                        Poll::Pending => return Poll::Pending,
                    }
                }

                SignedEncoderState::FinalChunk => {
                    let signature = self.sign_chunk_data(EMPTY_SHA256);
                    self.state = SignedEncoderState::Trailer;
                    return Poll::Ready(Some(Ok(Bytes::from(format!(
                        "0;chunk-signature={signature}\r\n"
                    )))));
                }

                SignedEncoderState::Trailer => {
                    let trailer =
                        format!("{}:{}\r\n", self.algorithm.header_name(), self.hasher.sum());
                    self.state = SignedEncoderState::TrailerSignature;
                    return Poll::Ready(Some(Ok(Bytes::from(trailer))));
                }

                SignedEncoderState::TrailerSignature => {
                    // The canonical trailer hashed for signing ends in a
                    // bare LF, unlike the CRLF sent on the wire.
                    let canonical_trailer =
                        format!("{}:{}\n", self.algorithm.header_name(), self.hasher.sum());
                    let trailer_hash = sha256_hash(canonical_trailer.as_bytes());
                    let trailer_signature =
                        sign_trailer(&self.context, &self.current_signature, &trailer_hash);

                    self.state = SignedEncoderState::Done;
                    return Poll::Ready(Some(Ok(Bytes::from(format!(
                        "x-amz-trailer-signature:{trailer_signature}\r\n\r\n"
                    )))));
                }

                SignedEncoderState::Done => return Poll::Ready(None),
            }
        }
    }
}

/// Total body length after signed aws-chunked framing, for the
/// `Content-Length` header.
pub fn calculate_signed_encoded_length(
    content_length: u64,
    chunk_size: usize,
    algorithm: ChecksumAlgorithm,
) -> u64 {
    let chunk_size = chunk_size as u64;
    let full_chunks = content_length / chunk_size;
    let last_chunk_size = content_length % chunk_size;

    // ";chunk-signature=" (17) plus 64 hex chars
    let signature_overhead: u64 = 81;

    let hex_len_full = format!("{chunk_size:x}").len() as u64;
    let full_chunk_overhead =
        full_chunks * (hex_len_full + signature_overhead + 2 + chunk_size + 2);
    let partial_chunk_overhead = if last_chunk_size > 0 {
        format!("{last_chunk_size:x}").len() as u64 + signature_overhead + 2 + last_chunk_size + 2
    } else {
        0
    };

    // "0;chunk-signature=<64-hex>\r\n"
    let final_chunk = 1 + signature_overhead + 2;
    // "<header>:<base64>\r\n"
    let checksum_trailer =
        algorithm.header_name().len() as u64 + 1 + checksum_b64_len(algorithm) + 2;
    // "x-amz-trailer-signature:<64-hex>\r\n\r\n"
    let trailer_signature = 24 + 64 + 4;

    full_chunk_overhead
        + partial_chunk_overhead
        + final_chunk
        + checksum_trailer
        + trailer_signature
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::utils::b64_encode;
    use futures_util::StreamExt;
    use std::sync::Arc;

    async fn collect_bytes<S, E>(mut stream: S) -> Vec<u8>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Debug,
    {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    async fn collect<S, E>(stream: S) -> String
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Debug,
    {
        String::from_utf8(collect_bytes(stream).await).unwrap()
    }

    fn byte_stream(
        data: &[u8],
        chunk_size: usize,
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        futures_util::stream::iter(
            data.chunks(chunk_size)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn unsigned_framing_and_trailer() {
        let encoder = AwsChunkedEncoder::new(
            byte_stream(b"Hello, World!", 64 * 1024),
            ChecksumAlgorithm::Crc32,
        );
        let out = collect(encoder).await;

        // "Hello, World!" is 13 = 0xd bytes
        assert!(out.starts_with("d\r\nHello, World!\r\n"));
        assert!(out.contains("\r\n0\r\n"));
        let mut expected = ChecksumAlgorithm::Crc32.hasher();
        expected.update(b"Hello, World!");
        assert!(out.ends_with(&format!("x-amz-checksum-crc32:{}\r\n\r\n", expected.sum())));
    }

    #[tokio::test]
    async fn unsigned_encoded_length_matches_output() {
        for (len, chunk_size) in [(0usize, 8), (100, 64), (128, 64), (129, 64)] {
            let data = vec![0x5Au8; len];
            let encoder =
                AwsChunkedEncoder::new(byte_stream(&data, chunk_size), ChecksumAlgorithm::Sha256);
            let out = collect(encoder).await;
            assert_eq!(
                out.len() as u64,
                calculate_encoded_length(len as u64, chunk_size, ChecksumAlgorithm::Sha256),
                "len={len} chunk_size={chunk_size}"
            );
        }
    }

    #[test]
    fn rechunk_slices_and_merges_segments() {
        let segments = vec![
            Bytes::from(vec![1u8; 40]),
            Bytes::from(vec![2u8; 40]),
            Bytes::from(vec![3u8; 200]),
        ];
        let chunks = rechunk(segments, 64);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![64, 64, 64, 64, 24]);

        let flat: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        let mut expected = vec![1u8; 40];
        expected.extend(vec![2u8; 40]);
        expected.extend(vec![3u8; 200]);
        assert_eq!(flat, expected);
    }

    #[tokio::test]
    async fn oversized_segment_rechunked_matches_announced_length() {
        // A part body typically arrives as one buffer much larger than
        // the chunk size; on the wire it must become chunk-size frames
        // or the computed Content-Length disagrees with the bytes sent.
        let chunks = rechunk(vec![Bytes::from(vec![0x42u8; 128 * 1024])], default_chunk_size());
        let stream = futures_util::stream::iter(
            chunks
                .into_iter()
                .map(Ok::<_, std::io::Error>)
                .collect::<Vec<_>>(),
        );
        let out = collect(AwsChunkedEncoder::new(stream, ChecksumAlgorithm::Crc32)).await;
        assert_eq!(
            out.len() as u64,
            calculate_encoded_length(128 * 1024, default_chunk_size(), ChecksumAlgorithm::Crc32)
        );

        let chunks = rechunk(
            vec![Bytes::from(vec![0x42u8; 128 * 1024 + 5])],
            default_chunk_size(),
        );
        let stream = futures_util::stream::iter(
            chunks
                .into_iter()
                .map(Ok::<_, std::io::Error>)
                .collect::<Vec<_>>(),
        );
        let out = collect(SignedAwsChunkedEncoder::new(
            stream,
            ChecksumAlgorithm::Crc32,
            streaming_context(),
        ))
        .await;
        assert_eq!(
            out.len() as u64,
            calculate_signed_encoded_length(
                128 * 1024 + 5,
                default_chunk_size(),
                ChecksumAlgorithm::Crc32
            )
        );
    }

    #[tokio::test]
    async fn unsigned_hashes_across_input_chunks() {
        let encoder = AwsChunkedEncoder::new(
            byte_stream(b"Hello, World!", 4),
            ChecksumAlgorithm::Crc64Nvme,
        );
        let out = collect(encoder).await;
        let mut expected = ChecksumAlgorithm::Crc64Nvme.hasher();
        expected.update(b"Hello, World!");
        assert!(out.contains(&format!("x-amz-checksum-crc64nvme:{}", expected.sum())));
    }

    fn streaming_context() -> ChunkSigningContext {
        use chrono::TimeZone;
        let date = chrono::Utc.with_ymd_and_hms(2013, 5, 24, 0, 0, 0).unwrap();
        ChunkSigningContext {
            signing_key: Arc::from(
                crate::s3::signer::get_signing_key(
                    "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY",
                    date,
                    "us-east-1",
                    "s3",
                )
                .as_slice(),
            ),
            date,
            scope: "20130524/us-east-1/s3/aws4_request".to_string(),
            seed_signature: "4f232c4386841ef735655705268965c44a0e4690baa4adea153f7db9fa80a0a9"
                .to_string(),
        }
    }

    #[tokio::test]
    async fn signed_framing_chains_signatures() {
        let encoder = SignedAwsChunkedEncoder::new(
            byte_stream(b"Hello, World!", 7),
            ChecksumAlgorithm::Crc32c,
            streaming_context(),
        );
        let out = collect(encoder).await;

        // 2 data chunks plus the final empty chunk
        assert_eq!(out.matches(";chunk-signature=").count(), 3);
        assert!(out.starts_with("7;chunk-signature="));
        assert!(out.contains("0;chunk-signature="));
        assert!(out.contains("x-amz-checksum-crc32c:"));
        assert!(out.contains("x-amz-trailer-signature:"));
        assert!(out.ends_with("\r\n\r\n"));

        // Chained signatures differ chunk to chunk.
        let sigs: Vec<&str> = out
            .match_indices(";chunk-signature=")
            .map(|(i, m)| &out[i + m.len()..i + m.len() + 64])
            .collect();
        assert_ne!(sigs[0], sigs[1]);
        assert_ne!(sigs[1], sigs[2]);
        for sig in sigs {
            assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[tokio::test]
    async fn signed_chunk_signatures_match_reference_vector() {
        // 65 KiB of 'a' in 64 KiB chunks under the documented 2013-05-24
        // streaming example credentials.
        let data = vec![b'a'; 65 * 1024];
        let encoder = SignedAwsChunkedEncoder::new(
            byte_stream(&data, 64 * 1024),
            ChecksumAlgorithm::Crc32,
            streaming_context(),
        );
        let out = collect(encoder).await;

        assert!(out.starts_with(
            "10000;chunk-signature=ad80c730a21e5b8d04586a2213dd63b9a0e99e0e2307b0ade35a65485a288648\r\n"
        ));
        assert!(out.contains(
            "400;chunk-signature=0055627c9e194cb4542bae2aa5492e3c1575bbb81b612b7d234b86a503ef5497\r\n"
        ));
        assert!(out.contains(
            "0;chunk-signature=b6c6ea8a5354eaf15b3cb7646744f4275b71ea724fed81ceb9323e279d449df9\r\n"
        ));
    }

    #[tokio::test]
    async fn signed_encoded_length_matches_output() {
        for (len, chunk_size) in [(0usize, 8), (100, 64), (128, 64), (129, 64)] {
            let data = vec![0xC3u8; len];
            let encoder = SignedAwsChunkedEncoder::new(
                byte_stream(&data, chunk_size),
                ChecksumAlgorithm::Crc32,
                streaming_context(),
            );
            let out = collect_bytes(encoder).await;
            assert_eq!(
                out.len() as u64,
                calculate_signed_encoded_length(len as u64, chunk_size, ChecksumAlgorithm::Crc32),
                "len={len} chunk_size={chunk_size}"
            );
        }
    }

    #[tokio::test]
    async fn signed_trailer_checksum_is_of_raw_data() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let encoder = SignedAwsChunkedEncoder::new(
            byte_stream(data, 16),
            ChecksumAlgorithm::Sha1,
            streaming_context(),
        );
        let out = collect(encoder).await;

        use sha1::Digest;
        let digest = sha1::Sha1::digest(data);
        assert!(out.contains(&format!("x-amz-checksum-sha1:{}\r\n", b64_encode(digest))));
    }
}
