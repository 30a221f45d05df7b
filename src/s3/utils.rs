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

//! Various utility and helper functions

use crate::s3::error::{Error, ValidationErr};
use crate::s3::segmented_bytes::SegmentedBytes;
use base64::engine::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use sha2::{Digest, Sha256};
use xmltree::Element;

/// Date and time with UTC timezone
pub type UtcTime = DateTime<Utc>;

/// SHA-256 of the empty byte string, hex-encoded.
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Gets current UTC time
pub fn utc_now() -> UtcTime {
    Utc::now()
}

/// Formats a date in `yyyyMMdd` form for signer scope.
pub fn to_signer_date(time: UtcTime) -> String {
    time.format("%Y%m%d").to_string()
}

/// Formats a timestamp in `yyyyMMddTHHmmssZ` form for the `x-amz-date`
/// header.
pub fn to_amz_date(time: UtcTime) -> String {
    time.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Encodes data using base64 (standard alphabet, padded).
pub fn b64_encode<T: AsRef<[u8]>>(input: T) -> String {
    BASE64_STANDARD.encode(input)
}

/// Hex-encoded SHA-256 of a byte slice.
pub fn sha256_hash(data: &[u8]) -> String {
    hex_encode(&Sha256::digest(data))
}

/// Hex-encoded SHA-256 over a segmented buffer without flattening it.
pub fn sha256_hash_sb(data: &SegmentedBytes) -> String {
    let mut hasher = Sha256::new();
    for chunk in data.iter() {
        hasher.update(chunk.as_ref());
    }
    hex_encode(&hasher.finalize())
}

/// Base64-encoded MD5 of a byte slice, used for the `Content-MD5` header.
pub fn md5sum_hash(data: &[u8]) -> String {
    b64_encode(md5::compute(data).as_ref())
}

pub fn hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for b in data {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

// Object keys keep `/` and unreserved characters; everything else,
// including the S3 reserved set `! $ & ' ( ) * + , : ; = @ [ ]`, is
// percent-encoded per character. The signer canonicalizes the same path,
// so the encodings must match byte for byte.
const OBJECT_KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Percent-encodes an object key for use in a URL path.
pub fn urlencode_object_key(key: &str) -> String {
    utf8_percent_encode(key, OBJECT_KEY_ENCODE_SET).to_string()
}

lazy_static! {
    static ref HOSTNAME_REGEX: Regex =
        Regex::new(r"^([a-zA-Z0-9_\-]{1,63}\.)*[a-zA-Z0-9_\-]{1,63}$").unwrap();
    static ref IPV4_REGEX: Regex = Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").unwrap();
    static ref VALID_BUCKET_REGEX: Regex = Regex::new(r"^[a-z0-9][a-z0-9.\-]+[a-z0-9]$").unwrap();
}

/// Checks whether the given value is a syntactically valid hostname.
pub fn match_hostname(value: &str) -> bool {
    HOSTNAME_REGEX.is_match(value)
}

/// Validates a bucket name against the S3 naming rules.
pub fn check_bucket_name(name: &str, strict: bool) -> Result<(), ValidationErr> {
    let err = |message: &str| ValidationErr::InvalidBucketName {
        name: name.to_string(),
        message: message.to_string(),
    };

    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(err("bucket name cannot be empty"));
    }
    if trimmed.len() < 3 {
        return Err(err("bucket name cannot be less than 3 characters"));
    }
    if trimmed.len() > 63 {
        return Err(err("bucket name cannot be greater than 63 characters"));
    }
    if IPV4_REGEX.is_match(trimmed) {
        return Err(err("bucket name cannot be an IP address"));
    }
    if trimmed.contains("..") || trimmed.contains(".-") || trimmed.contains("-.") {
        return Err(err(
            "bucket name cannot have successive characters '..', '.-' or '-.'",
        ));
    }
    if strict && !VALID_BUCKET_REGEX.is_match(trimmed) {
        return Err(err("bucket name does not follow S3 standards"));
    }
    Ok(())
}

/// Validates an object key: non-empty and at most 1024 bytes.
pub fn check_object_name(name: &str) -> Result<(), ValidationErr> {
    if name.is_empty() {
        return Err(ValidationErr::InvalidObjectName(
            "object name cannot be empty".into(),
        ));
    }
    if name.len() > 1024 {
        return Err(ValidationErr::InvalidObjectName(
            "object name cannot be greater than 1024 bytes".into(),
        ));
    }
    Ok(())
}

/// Gets the text of a required child element.
pub fn get_text(element: &Element, tag: &str) -> Result<String, Error> {
    Ok(element
        .get_child(tag)
        .ok_or(Error::Xml(format!("<{tag}> tag not found")))?
        .get_text()
        .unwrap_or_default()
        .to_string())
}

/// Gets the text of an optional child element.
pub fn get_text_opt(element: &Element, tag: &str) -> Option<String> {
    element
        .get_child(tag)
        .and_then(|e| e.get_text())
        .map(|t| t.to_string())
}

/// Gets the text of a child element, or an empty string.
pub fn get_text_default(element: &Element, tag: &str) -> String {
    get_text_opt(element, tag).unwrap_or_default()
}

/// Strips surrounding double quotes, as found around ETag values.
pub fn trim_quotes(value: String) -> String {
    value.trim_matches('"').to_string()
}
