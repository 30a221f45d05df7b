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

//! Splits a data source into ordered, hashed upload parts.
//!
//! File-backed sources are hashed by streaming through the byte range and
//! re-read by the transport at send time, so no part is held in memory
//! between hashing and sending. Forward-only streams are buffered one
//! part at a time; a one-byte lookahead after each full part decides
//! end-of-stream without consuming more than one part ahead.

use crate::s3::checksum::{ChecksumAlgorithm, ChecksumSet};
use crate::s3::client::{MAX_MULTIPART_COUNT, MAX_OBJECT_SIZE, MAX_PART_SIZE, MIN_PART_SIZE};
use crate::s3::error::{Error, ValidationErr};
use crate::s3::object_content::{ContentStream, ObjectContent, Size};
use crate::s3::segmented_bytes::SegmentedBytes;
use crate::s3::utils::hex_encode;
use async_std::io::prelude::SeekExt;
use async_std::io::{ReadExt, SeekFrom};
use bytes::Bytes;
use std::path::PathBuf;

/// Negotiates part size and count before a multipart upload starts.
///
/// With a known object size and no part size given, picks the smallest
/// multiple of the minimum part size that keeps the part count within
/// bounds, capped at the maximum part size. With an unknown object size a
/// part size must be supplied, and the count resolves only once the
/// stream ends.
pub fn calc_part_info(
    object_size: Size,
    part_size: Size,
) -> Result<(u64, Option<u16>), ValidationErr> {
    if let Size::Known(psize) = part_size {
        if psize < MIN_PART_SIZE {
            return Err(ValidationErr::InvalidMinPartSize(psize));
        }
        if psize > MAX_PART_SIZE {
            return Err(ValidationErr::InvalidMaxPartSize(psize));
        }
    }

    let osize = match object_size {
        Size::Unknown => {
            return match part_size {
                Size::Known(psize) => Ok((psize, None)),
                Size::Unknown => Err(ValidationErr::MissingPartSize),
            };
        }
        Size::Known(v) => v,
    };

    if osize > MAX_OBJECT_SIZE {
        return Err(ValidationErr::InvalidObjectSize(osize));
    }

    let psize = match part_size {
        Size::Known(v) => v,
        Size::Unknown => {
            let per_part = osize.div_ceil(MAX_MULTIPART_COUNT as u64);
            let rounded = per_part.div_ceil(MIN_PART_SIZE).max(1) * MIN_PART_SIZE;
            rounded.min(MAX_PART_SIZE)
        }
    };

    let count = if osize == 0 { 1 } else { osize.div_ceil(psize) };
    if count > MAX_MULTIPART_COUNT as u64 {
        return Err(ValidationErr::InvalidPartCount {
            object_size: osize,
            part_size: psize,
            count: MAX_MULTIPART_COUNT,
        });
    }

    Ok((psize, Some(count as u16)))
}

/// Where one part's bytes live.
#[derive(Clone, Debug)]
pub enum PartSource {
    /// A byte range of a file on disk, re-read at send time.
    File {
        path: PathBuf,
        offset: u64,
        length: u64,
    },
    /// A chain of in-memory buffers.
    Chunks(SegmentedBytes),
}

impl PartSource {
    pub fn len(&self) -> u64 {
        match self {
            PartSource::File { length, .. } => *length,
            PartSource::Chunks(sb) => sb.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materializes the part body for the transport. File ranges are
    /// re-read from disk here.
    pub async fn into_segmented_bytes(self) -> Result<SegmentedBytes, Error> {
        match self {
            PartSource::Chunks(sb) => Ok(sb),
            PartSource::File {
                path,
                offset,
                length,
            } => {
                let mut file = async_std::fs::File::open(&path).await?;
                file.seek(SeekFrom::Start(offset)).await?;
                let mut sb = SegmentedBytes::new();
                let mut remaining = length as usize;
                let mut buf = vec![0u8; 64 * 1024];
                while remaining > 0 {
                    let want = remaining.min(buf.len());
                    let n = file.read(&mut buf[..want]).await?;
                    if n == 0 {
                        return Err(Error::Network(
                            std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "file shrank while uploading",
                            )
                            .into(),
                        ));
                    }
                    sb.append(Bytes::copy_from_slice(&buf[..n]));
                    remaining -= n;
                }
                Ok(sb)
            }
        }
    }
}

/// One hashed part, ready for upload.
#[derive(Clone, Debug)]
pub struct PartPayload {
    /// 1-based ascending part number.
    pub number: u16,
    pub size: u64,
    /// Whether this is the final part of the object.
    pub last: bool,
    pub source: PartSource,
    /// Hex SHA-256 of the part body.
    pub sha256: String,
    /// Base64 sums for the configured extra checksum algorithms.
    pub checksums: Vec<(ChecksumAlgorithm, String)>,
}

enum ReaderSource {
    File {
        path: PathBuf,
        size: u64,
        offset: u64,
    },
    Stream {
        stream: ContentStream,
        /// Bytes produced by the lookahead read, owed to the next part.
        pending: Option<Bytes>,
    },
}

/// Reads one part at a time from a file or a forward-only stream.
pub struct PartReader {
    source: ReaderSource,
    part_size: u64,
    expected_parts: Option<u16>,
    next_number: u16,
    algorithms: Vec<ChecksumAlgorithm>,
    done: bool,
}

impl PartReader {
    /// Builds a reader over the given content, negotiating the part size
    /// against the content's size.
    pub async fn from_content(
        content: ObjectContent,
        part_size: Size,
        algorithms: &[ChecksumAlgorithm],
    ) -> Result<PartReader, Error> {
        if let Some(path) = content.file_path() {
            let path = path.to_path_buf();
            let size = async_std::fs::metadata(&path).await?.len();
            let (part_size, expected_parts) = calc_part_info(Size::Known(size), part_size)?;
            return Ok(PartReader {
                source: ReaderSource::File {
                    path,
                    size,
                    offset: 0,
                },
                part_size,
                expected_parts,
                next_number: 1,
                algorithms: algorithms.to_vec(),
                done: false,
            });
        }

        let stream = content.to_content_stream().await?;
        let (part_size, expected_parts) = calc_part_info(stream.get_size(), part_size)?;
        Ok(PartReader {
            source: ReaderSource::Stream {
                stream,
                pending: None,
            },
            part_size,
            expected_parts,
            next_number: 1,
            algorithms: algorithms.to_vec(),
            done: false,
        })
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// The negotiated part count, when the object size was known.
    pub fn expected_parts(&self) -> Option<u16> {
        self.expected_parts
    }

    /// Reads the next part, or `None` once the source is exhausted. The
    /// first part of an empty source is returned (empty) so zero-byte
    /// objects still upload.
    pub async fn next_part(&mut self) -> Result<Option<PartPayload>, Error> {
        if self.done {
            return Ok(None);
        }
        let number = self.next_number;
        if number > MAX_MULTIPART_COUNT {
            return Err(ValidationErr::InvalidPartNumber(number).into());
        }

        let payload = match &mut self.source {
            ReaderSource::File { path, size, offset } => {
                let length = self.part_size.min(*size - *offset);
                let source = PartSource::File {
                    path: path.clone(),
                    offset: *offset,
                    length,
                };
                let (sha256, checksums) =
                    hash_file_range(path, *offset, length, &self.algorithms).await?;
                *offset += length;
                let last = *offset >= *size;
                PartPayload {
                    number,
                    size: length,
                    last,
                    source,
                    sha256,
                    checksums,
                }
            }

            ReaderSource::Stream { stream, pending } => {
                let mut body = SegmentedBytes::new();
                if let Some(b) = pending.take() {
                    body.append(b);
                }
                let more = stream
                    .read_upto(self.part_size as usize - body.len())
                    .await?;
                for segment in more.iter() {
                    body.append(segment.clone());
                }

                if body.is_empty() && number > 1 {
                    self.done = true;
                    return Ok(None);
                }

                let last = if (body.len() as u64) < self.part_size {
                    true
                } else if self.expected_parts == Some(number) {
                    true
                } else {
                    // Full part: peek one byte to learn whether the
                    // stream has ended without over-reading.
                    let peek = stream.read_upto(1).await?;
                    if peek.is_empty() {
                        true
                    } else {
                        *pending = Some(peek.to_bytes());
                        false
                    }
                };

                let (sha256, checksums) = hash_segments(&body, &self.algorithms);
                PartPayload {
                    number,
                    size: body.len() as u64,
                    last,
                    source: PartSource::Chunks(body),
                    sha256,
                    checksums,
                }
            }
        };

        self.done = payload.last;
        self.next_number += 1;
        Ok(Some(payload))
    }
}

fn hash_segments(
    body: &SegmentedBytes,
    algorithms: &[ChecksumAlgorithm],
) -> (String, Vec<(ChecksumAlgorithm, String)>) {
    use sha2::Digest;
    let mut sha = sha2::Sha256::new();
    let mut set = ChecksumSet::new(algorithms);
    for segment in body.iter() {
        sha.update(segment.as_ref());
        set.update(segment.as_ref());
    }
    (hex_encode(sha.finalize().as_slice()), set.sums())
}

async fn hash_file_range(
    path: &PathBuf,
    offset: u64,
    length: u64,
    algorithms: &[ChecksumAlgorithm],
) -> Result<(String, Vec<(ChecksumAlgorithm, String)>), Error> {
    use sha2::Digest;
    let mut file = async_std::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;

    let mut sha = sha2::Sha256::new();
    let mut set = ChecksumSet::new(algorithms);
    let mut remaining = length as usize;
    let mut buf = vec![0u8; 64 * 1024];
    while remaining > 0 {
        let want = remaining.min(buf.len());
        let n = file.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(Error::Network(
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "file shrank while hashing",
                )
                .into(),
            ));
        }
        sha.update(&buf[..n]);
        set.update(&buf[..n]);
        remaining -= n;
    }
    Ok((hex_encode(sha.finalize().as_slice()), set.sums()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::checksum::Hasher;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn part_info_small_object_single_part() {
        let (psize, count) = calc_part_info(Size::Known(1024), Size::Unknown).unwrap();
        assert_eq!(psize, MIN_PART_SIZE);
        assert_eq!(count, Some(1));
    }

    #[test]
    fn part_info_unknown_size_requires_part_size() {
        assert!(matches!(
            calc_part_info(Size::Unknown, Size::Unknown),
            Err(ValidationErr::MissingPartSize)
        ));
        let (psize, count) =
            calc_part_info(Size::Unknown, Size::Known(8 * MIB)).unwrap();
        assert_eq!(psize, 8 * MIB);
        assert_eq!(count, None);
    }

    #[test]
    fn part_info_rejects_out_of_range_part_sizes() {
        assert!(matches!(
            calc_part_info(Size::Known(100 * MIB), Size::Known(MIN_PART_SIZE - 1)),
            Err(ValidationErr::InvalidMinPartSize(_))
        ));
        assert!(matches!(
            calc_part_info(Size::Known(100 * MIB), Size::Known(MAX_PART_SIZE + 1)),
            Err(ValidationErr::InvalidMaxPartSize(_))
        ));
    }

    #[test]
    fn part_info_rejects_oversized_object() {
        assert!(matches!(
            calc_part_info(Size::Known(MAX_OBJECT_SIZE + 1), Size::Unknown),
            Err(ValidationErr::InvalidObjectSize(_))
        ));
    }

    #[test]
    fn part_info_rejects_too_many_parts() {
        // 5 MiB parts cannot cover 100 TiB-ish sizes within 10k parts.
        let osize = MIN_PART_SIZE * (MAX_MULTIPART_COUNT as u64 + 1);
        assert!(matches!(
            calc_part_info(Size::Known(osize), Size::Known(MIN_PART_SIZE)),
            Err(ValidationErr::InvalidPartCount { .. })
        ));
    }

    #[test]
    fn part_info_picks_smallest_min_multiple() {
        // 100_000 MiB needs 10 MiB parts to fit in 10_000 parts.
        let osize = 100_000 * MIB;
        let (psize, count) = calc_part_info(Size::Known(osize), Size::Unknown).unwrap();
        assert_eq!(psize, 2 * MIN_PART_SIZE);
        assert_eq!(count, Some(10_000));
    }

    quickcheck! {
        fn part_info_invariants(object_size: u64) -> bool {
            let osize = object_size % MAX_OBJECT_SIZE + 1;
            let Ok((psize, Some(count))) =
                calc_part_info(Size::Known(osize), Size::Unknown) else {
                return false;
            };
            let count = count as u64;
            let last = osize - (count - 1) * psize;
            count * psize >= osize
                && count <= MAX_MULTIPART_COUNT as u64
                && last > 0
                && last <= psize
        }
    }

    #[tokio::test]
    async fn twelve_mib_stream_in_three_parts() {
        let data = vec![0xA5u8; (12 * MIB) as usize];
        let content = ObjectContent::from(data);
        let mut reader =
            PartReader::from_content(content, Size::Known(5 * MIB), &[]).await.unwrap();
        assert_eq!(reader.expected_parts(), Some(3));

        let p1 = reader.next_part().await.unwrap().unwrap();
        assert_eq!((p1.number, p1.size, p1.last), (1, 5 * MIB, false));
        let p2 = reader.next_part().await.unwrap().unwrap();
        assert_eq!((p2.number, p2.size, p2.last), (2, 5 * MIB, false));
        let p3 = reader.next_part().await.unwrap().unwrap();
        assert_eq!((p3.number, p3.size, p3.last), (3, 2 * MIB, true));
        assert!(reader.next_part().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exact_multiple_terminates_via_lookahead() {
        // Unknown-size stream of exactly 2 parts; the reader must flag
        // part 2 as last without reading a third part.
        let data = vec![1u8; (10 * MIB) as usize];
        let content = ObjectContent::new_from_stream(
            futures_util::stream::iter(
                data.chunks(1024 * 1024)
                    .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
                    .collect::<Vec<_>>(),
            ),
            Size::Unknown,
        );
        let mut reader =
            PartReader::from_content(content, Size::Known(5 * MIB), &[]).await.unwrap();
        assert_eq!(reader.expected_parts(), None);

        let p1 = reader.next_part().await.unwrap().unwrap();
        assert!(!p1.last);
        let p2 = reader.next_part().await.unwrap().unwrap();
        assert_eq!(p2.size, 5 * MIB);
        assert!(p2.last);
        assert!(reader.next_part().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_content_yields_one_empty_part() {
        let content = ObjectContent::from("");
        let mut reader =
            PartReader::from_content(content, Size::Unknown, &[]).await.unwrap();
        let p1 = reader.next_part().await.unwrap().unwrap();
        assert_eq!((p1.number, p1.size, p1.last), (1, 0, true));
        assert!(reader.next_part().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn part_checksums_match_whole_read() {
        let data: Vec<u8> = (0..1000u32).flat_map(|v| v.to_le_bytes()).collect();
        let content = ObjectContent::from(data.clone());
        let mut reader = PartReader::from_content(
            content,
            Size::Unknown,
            &[ChecksumAlgorithm::Crc32c],
        )
        .await
        .unwrap();

        let part = reader.next_part().await.unwrap().unwrap();
        assert_eq!(part.sha256, crate::s3::utils::sha256_hash(&data));

        let mut expected = ChecksumAlgorithm::Crc32c.hasher();
        expected.update(&data);
        assert_eq!(part.checksums, vec![(ChecksumAlgorithm::Crc32c, expected.sum())]);
    }

    #[tokio::test]
    async fn file_backed_parts_reference_ranges() {
        let path = std::env::temp_dir().join(format!(
            "stratus-part-reader-{}.bin",
            uuid::Uuid::new_v4()
        ));
        let data = vec![7u8; (6 * MIB) as usize];
        async_std::fs::write(&path, &data).await.unwrap();

        let content = ObjectContent::from(path.as_path());
        let mut reader =
            PartReader::from_content(content, Size::Known(5 * MIB), &[]).await.unwrap();
        assert_eq!(reader.expected_parts(), Some(2));

        let p1 = reader.next_part().await.unwrap().unwrap();
        let PartSource::File { offset, length, .. } = &p1.source else {
            panic!("expected file source");
        };
        assert_eq!((*offset, *length), (0, 5 * MIB));
        assert!(!p1.last);

        let p2 = reader.next_part().await.unwrap().unwrap();
        assert_eq!(p2.size, MIB);
        assert!(p2.last);

        // Transport re-reads the range from disk.
        let body = p2.source.clone().into_segmented_bytes().await.unwrap();
        assert_eq!(body.len() as u64, MIB);

        async_std::fs::remove_file(&path).await.unwrap();
    }
}
