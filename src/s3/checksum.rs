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

//! Streaming content checksums.
//!
//! Every algorithm implements the same [`Hasher`] capability so that a
//! single read pass can feed any number of configured hashers. Digest
//! algorithms delegate to the usual crates; CRC32C and CRC64NVME carry
//! their own tables because S3 object-integrity checksums predate crate
//! support for the NVMe polynomial.

use crate::s3::error::ValidationErr;
use crate::s3::utils::b64_encode;
use crc::{CRC_32_ISO_HDLC, Crc, Digest};
use md5::Context as Md5Context;
use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Content checksum algorithms understood by S3-compatible servers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    Crc32,
    Crc32c,
    Crc64Nvme,
    Sha1,
    Sha256,
    Md5,
}

impl ChecksumAlgorithm {
    /// The `x-amz-checksum-*` header carrying this checksum.
    pub fn header_name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Crc32 => "x-amz-checksum-crc32",
            ChecksumAlgorithm::Crc32c => "x-amz-checksum-crc32c",
            ChecksumAlgorithm::Crc64Nvme => "x-amz-checksum-crc64nvme",
            ChecksumAlgorithm::Sha1 => "x-amz-checksum-sha1",
            ChecksumAlgorithm::Sha256 => "x-amz-checksum-sha256",
            ChecksumAlgorithm::Md5 => "x-amz-checksum-md5",
        }
    }

    /// Whether a single checksum of this algorithm may span multipart
    /// boundaries ("full object" checksums).
    pub fn supports_full_object(&self) -> bool {
        matches!(
            self,
            ChecksumAlgorithm::Crc32 | ChecksumAlgorithm::Crc32c | ChecksumAlgorithm::Crc64Nvme
        )
    }

    /// Whether per-part checksums of this algorithm may be combined into a
    /// composite object checksum.
    pub fn supports_composite(&self) -> bool {
        matches!(
            self,
            ChecksumAlgorithm::Crc32
                | ChecksumAlgorithm::Crc32c
                | ChecksumAlgorithm::Sha1
                | ChecksumAlgorithm::Sha256
        )
    }

    /// Picks the checksum type used when completing a multipart upload.
    /// MD5 supports neither type and is rejected here, before any request
    /// is sent.
    pub fn multipart_checksum_type(&self) -> Result<ChecksumType, ValidationErr> {
        if self.supports_full_object() {
            Ok(ChecksumType::FullObject)
        } else if self.supports_composite() {
            Ok(ChecksumType::Composite)
        } else {
            Err(ValidationErr::UnsupportedMultipartChecksum(*self))
        }
    }

    /// Creates a fresh hasher for this algorithm.
    pub fn hasher(&self) -> Box<dyn Hasher> {
        match self {
            ChecksumAlgorithm::Crc32 => Box::new(Crc32Hasher::new()),
            ChecksumAlgorithm::Crc32c => Box::new(Crc32cHasher::new()),
            ChecksumAlgorithm::Crc64Nvme => Box::new(Crc64NvmeHasher::new()),
            ChecksumAlgorithm::Sha1 => Box::new(Sha1Hasher::new()),
            ChecksumAlgorithm::Sha256 => Box::new(Sha256Hasher::new()),
            ChecksumAlgorithm::Md5 => Box::new(Md5Hasher::new()),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChecksumAlgorithm::Crc32 => "CRC32",
            ChecksumAlgorithm::Crc32c => "CRC32C",
            ChecksumAlgorithm::Crc64Nvme => "CRC64NVME",
            ChecksumAlgorithm::Sha1 => "SHA1",
            ChecksumAlgorithm::Sha256 => "SHA256",
            ChecksumAlgorithm::Md5 => "MD5",
        })
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = ValidationErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CRC32" => Ok(ChecksumAlgorithm::Crc32),
            "CRC32C" => Ok(ChecksumAlgorithm::Crc32c),
            "CRC64NVME" => Ok(ChecksumAlgorithm::Crc64Nvme),
            "SHA1" => Ok(ChecksumAlgorithm::Sha1),
            "SHA256" => Ok(ChecksumAlgorithm::Sha256),
            "MD5" => Ok(ChecksumAlgorithm::Md5),
            _ => Err(ValidationErr::UnknownChecksumAlgorithm(s.to_string())),
        }
    }
}

/// How a multipart object checksum is derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumType {
    /// One checksum over the entire object contents.
    FullObject,
    /// Per-part checksums combined by the server.
    Composite,
}

impl fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChecksumType::FullObject => "FULL_OBJECT",
            ChecksumType::Composite => "COMPOSITE",
        })
    }
}

/// Streaming hash capability: feed bytes, read the base64 sum, start over.
/// `sum` does not disturb the running state, so intermediate sums are
/// allowed.
pub trait Hasher: Send {
    fn update(&mut self, data: &[u8]);
    fn sum(&self) -> String;
    fn reset(&mut self);
}

// region: digest-backed hashers

pub struct Md5Hasher(Md5Context);

impl Md5Hasher {
    pub fn new() -> Self {
        Self(Md5Context::new())
    }
}

impl Default for Md5Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Md5Hasher {
    fn update(&mut self, data: &[u8]) {
        self.0.consume(data);
    }

    fn sum(&self) -> String {
        b64_encode(self.0.clone().finalize().as_ref())
    }

    fn reset(&mut self) {
        self.0 = Md5Context::new();
    }
}

pub struct Sha1Hasher(Sha1);

impl Sha1Hasher {
    pub fn new() -> Self {
        Self(Sha1::new())
    }
}

impl Default for Sha1Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Sha1Hasher {
    fn update(&mut self, data: &[u8]) {
        sha1::Digest::update(&mut self.0, data);
    }

    fn sum(&self) -> String {
        b64_encode(sha1::Digest::finalize(self.0.clone()))
    }

    fn reset(&mut self) {
        self.0 = Sha1::new();
    }
}

pub struct Sha256Hasher(Sha256);

impl Sha256Hasher {
    pub fn new() -> Self {
        Self(Sha256::new())
    }
}

impl Default for Sha256Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        sha2::Digest::update(&mut self.0, data);
    }

    fn sum(&self) -> String {
        b64_encode(self.0.clone().finalize())
    }

    fn reset(&mut self) {
        self.0 = Sha256::new();
    }
}

// endregion: digest-backed hashers

// region: CRC hashers

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub struct Crc32Hasher(Digest<'static, u32>);

impl Crc32Hasher {
    pub fn new() -> Self {
        Self(CRC32.digest())
    }
}

impl Default for Crc32Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Crc32Hasher {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn sum(&self) -> String {
        b64_encode(self.0.clone().finalize().to_be_bytes())
    }

    fn reset(&mut self) {
        self.0 = CRC32.digest();
    }
}

// Castagnoli polynomial, reflected form.
const CRC32C_POLY: u32 = 0x82F6_3B78;

const fn crc32c_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32C_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC32C_TABLE: [u32; 256] = crc32c_table();

pub struct Crc32cHasher {
    state: u32,
}

impl Crc32cHasher {
    pub fn new() -> Self {
        Self { state: !0 }
    }

    fn value(&self) -> u32 {
        !self.state
    }
}

impl Default for Crc32cHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Crc32cHasher {
    fn update(&mut self, data: &[u8]) {
        let mut crc = self.state;
        for &b in data {
            crc = CRC32C_TABLE[((crc ^ b as u32) & 0xff) as usize] ^ (crc >> 8);
        }
        self.state = crc;
    }

    fn sum(&self) -> String {
        b64_encode(self.value().to_be_bytes())
    }

    fn reset(&mut self) {
        self.state = !0;
    }
}

// NVMe polynomial, reflected form of 0xAD93D23594C93659.
const CRC64NVME_POLY: u64 = 0x9A6C_9329_AC4B_C9B5;

const fn crc64nvme_tables() -> [[u64; 256]; 8] {
    let mut tables = [[0u64; 256]; 8];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u64;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC64NVME_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        tables[0][i] = crc;
        i += 1;
    }
    let mut t = 1;
    while t < 8 {
        let mut i = 0;
        while i < 256 {
            let prev = tables[t - 1][i];
            tables[t][i] = tables[0][(prev & 0xff) as usize] ^ (prev >> 8);
            i += 1;
        }
        t += 1;
    }
    tables
}

static CRC64NVME_TABLES: [[u64; 256]; 8] = crc64nvme_tables();

#[inline]
fn crc64nvme_byte(crc: u64, b: u8) -> u64 {
    CRC64NVME_TABLES[0][((crc ^ b as u64) & 0xff) as usize] ^ (crc >> 8)
}

/// CRC64NVME over full 8-byte words via slicing-by-8, byte-at-a-time for
/// the remainder.
fn crc64nvme_update(mut crc: u64, data: &[u8]) -> u64 {
    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let word = u64::from_le_bytes([
            chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
        ]);
        let x = crc ^ word;
        crc = CRC64NVME_TABLES[7][(x & 0xff) as usize]
            ^ CRC64NVME_TABLES[6][((x >> 8) & 0xff) as usize]
            ^ CRC64NVME_TABLES[5][((x >> 16) & 0xff) as usize]
            ^ CRC64NVME_TABLES[4][((x >> 24) & 0xff) as usize]
            ^ CRC64NVME_TABLES[3][((x >> 32) & 0xff) as usize]
            ^ CRC64NVME_TABLES[2][((x >> 40) & 0xff) as usize]
            ^ CRC64NVME_TABLES[1][((x >> 48) & 0xff) as usize]
            ^ CRC64NVME_TABLES[0][((x >> 56) & 0xff) as usize];
    }
    for &b in chunks.remainder() {
        crc = crc64nvme_byte(crc, b);
    }
    crc
}

pub struct Crc64NvmeHasher {
    state: u64,
}

impl Crc64NvmeHasher {
    pub fn new() -> Self {
        Self { state: !0 }
    }

    fn value(&self) -> u64 {
        !self.state
    }
}

impl Default for Crc64NvmeHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Crc64NvmeHasher {
    fn update(&mut self, data: &[u8]) {
        self.state = crc64nvme_update(self.state, data);
    }

    fn sum(&self) -> String {
        b64_encode(self.value().to_be_bytes())
    }

    fn reset(&mut self) {
        self.state = !0;
    }
}

// endregion: CRC hashers

/// A set of hashers fed from one read pass, keyed by algorithm.
#[derive(Default)]
pub struct ChecksumSet {
    hashers: HashMap<ChecksumAlgorithm, Box<dyn Hasher>>,
}

impl ChecksumSet {
    pub fn new(algorithms: &[ChecksumAlgorithm]) -> Self {
        let mut hashers: HashMap<ChecksumAlgorithm, Box<dyn Hasher>> = HashMap::new();
        for a in algorithms {
            hashers.entry(*a).or_insert_with(|| a.hasher());
        }
        Self { hashers }
    }

    pub fn is_empty(&self) -> bool {
        self.hashers.is_empty()
    }

    /// Feeds all configured hashers without re-reading the source.
    pub fn update(&mut self, data: &[u8]) {
        for hasher in self.hashers.values_mut() {
            hasher.update(data);
        }
    }

    /// Base64 sums per algorithm.
    pub fn sums(&self) -> Vec<(ChecksumAlgorithm, String)> {
        let mut out: Vec<(ChecksumAlgorithm, String)> = self
            .hashers
            .iter()
            .map(|(a, h)| (*a, h.sum()))
            .collect();
        out.sort_by_key(|(a, _)| a.header_name());
        out
    }

    pub fn reset(&mut self) {
        for hasher in self.hashers.values_mut() {
            hasher.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    const CHECK_INPUT: &[u8] = b"123456789";

    fn crc64nvme_bytewise(data: &[u8]) -> u64 {
        let mut crc = !0u64;
        for &b in data {
            crc = crc64nvme_byte(crc, b);
        }
        !crc
    }

    #[test]
    fn crc32_check_value() {
        let mut h = Crc32Hasher::new();
        h.update(CHECK_INPUT);
        assert_eq!(h.sum(), b64_encode(0xCBF4_3926u32.to_be_bytes()));
    }

    #[test]
    fn crc32c_check_value() {
        let mut h = Crc32cHasher::new();
        h.update(CHECK_INPUT);
        assert_eq!(h.value(), 0xE306_9283);
    }

    #[test]
    fn crc64nvme_check_value() {
        let mut h = Crc64NvmeHasher::new();
        h.update(CHECK_INPUT);
        assert_eq!(h.value(), 0xAE8B_1486_0A79_9888);
    }

    #[test]
    fn crc64nvme_slicing_matches_bytewise_at_boundaries() {
        let mut rng = rand::rng();
        for len in [0usize, 1, 7, 8, 9, 64, 65] {
            let mut data = vec![0u8; len];
            rng.fill_bytes(&mut data);
            let mut h = Crc64NvmeHasher::new();
            h.update(&data);
            assert_eq!(h.value(), crc64nvme_bytewise(&data), "length {len}");
        }
    }

    #[test]
    fn crc64nvme_split_updates_match_single_update() {
        let mut rng = rand::rng();
        let mut data = vec![0u8; 4096 + 3];
        rng.fill_bytes(&mut data);

        let mut whole = Crc64NvmeHasher::new();
        whole.update(&data);

        let mut split = Crc64NvmeHasher::new();
        for chunk in data.chunks(13) {
            split.update(chunk);
        }
        assert_eq!(whole.value(), split.value());
    }

    quickcheck! {
        fn crc64nvme_slicing_matches_bytewise(data: Vec<u8>) -> bool {
            let mut h = Crc64NvmeHasher::new();
            h.update(&data);
            h.value() == crc64nvme_bytewise(&data)
        }
    }

    #[test]
    fn sum_is_non_destructive() {
        let mut h = Sha256Hasher::new();
        h.update(b"part one");
        let first = h.sum();
        assert_eq!(first, h.sum());
        h.update(b" and more");
        assert_ne!(first, h.sum());
    }

    #[test]
    fn reset_restores_initial_state() {
        for algorithm in [
            ChecksumAlgorithm::Crc32,
            ChecksumAlgorithm::Crc32c,
            ChecksumAlgorithm::Crc64Nvme,
            ChecksumAlgorithm::Sha1,
            ChecksumAlgorithm::Sha256,
            ChecksumAlgorithm::Md5,
        ] {
            let mut h = algorithm.hasher();
            let empty = h.sum();
            h.update(b"some data");
            h.reset();
            assert_eq!(h.sum(), empty, "{algorithm}");
        }
    }

    #[test]
    fn checksum_set_feeds_all_hashers_in_one_pass() {
        let algorithms = [ChecksumAlgorithm::Crc32c, ChecksumAlgorithm::Sha256];
        let mut set = ChecksumSet::new(&algorithms);
        set.update(b"hello ");
        set.update(b"world");

        for (algorithm, sum) in set.sums() {
            let mut single = algorithm.hasher();
            single.update(b"hello world");
            assert_eq!(sum, single.sum(), "{algorithm}");
        }
    }

    #[test]
    fn md5_rejected_for_multipart() {
        assert!(matches!(
            ChecksumAlgorithm::Md5.multipart_checksum_type(),
            Err(ValidationErr::UnsupportedMultipartChecksum(
                ChecksumAlgorithm::Md5
            ))
        ));
    }

    #[test]
    fn multipart_checksum_types() {
        assert_eq!(
            ChecksumAlgorithm::Crc64Nvme.multipart_checksum_type().unwrap(),
            ChecksumType::FullObject
        );
        assert_eq!(
            ChecksumAlgorithm::Sha256.multipart_checksum_type().unwrap(),
            ChecksumType::Composite
        );
    }

    #[test]
    fn algorithm_parse_roundtrip() {
        for name in ["CRC32", "CRC32C", "CRC64NVME", "SHA1", "SHA256", "MD5"] {
            let a: ChecksumAlgorithm = name.parse().unwrap();
            assert_eq!(a.to_string(), name);
        }
        assert!("CRC16".parse::<ChecksumAlgorithm>().is_err());
    }
}
