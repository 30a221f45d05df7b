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

//! Error definitions for this library.
//!
//! Errors fall into three layers: [`ValidationErr`] for anything caught
//! before a request leaves the process (bad endpoints, bad arguments,
//! signing preconditions), [`NetworkError`] for transport failures, and
//! [`S3ErrorResponse`] for typed faults returned by the server.

use crate::s3::checksum::ChecksumAlgorithm;
use crate::s3::s3_error_response::{S3ErrorCode, S3ErrorResponse};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors detected locally, before any network call. Never retryable.
#[derive(Error, Debug)]
pub enum ValidationErr {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("URL build error: {0}")]
    UrlBuildError(String),

    #[error("invalid bucket name '{name}': {message}")]
    InvalidBucketName { name: String, message: String },

    #[error("invalid object name: {0}")]
    InvalidObjectName(String),

    #[error("region must be '{base_url_region}', but passed '{requested}'")]
    RegionMismatch {
        base_url_region: String,
        requested: String,
    },

    #[error("part size {0} is not supported; minimum allowed 5MiB")]
    InvalidMinPartSize(u64),

    #[error("part size {0} is not supported; maximum allowed 5GiB")]
    InvalidMaxPartSize(u64),

    #[error("object size {0} is not supported; maximum allowed 5TiB")]
    InvalidObjectSize(u64),

    #[error("valid part size must be provided when object size is unknown")]
    MissingPartSize,

    #[error(
        "object size {object_size} and part size {part_size} make more than {count} parts for upload"
    )]
    InvalidPartCount {
        object_size: u64,
        part_size: u64,
        count: u16,
    },

    #[error("part number {0} is not in the range 1..=10000")]
    InvalidPartNumber(u16),

    #[error("{0} cannot be used as a multipart upload checksum")]
    UnsupportedMultipartChecksum(ChecksumAlgorithm),

    #[error("unknown checksum algorithm '{0}'")]
    UnknownChecksumAlgorithm(String),

    #[error("empty upload id")]
    EmptyUploadId,

    #[error("region is required for the host '{0}'")]
    RegionRequired(String),

    #[error("bucket names with '.' are not allowed with accelerate endpoint")]
    DottedBucketWithAccelerate,
}

/// Transport-level failures. The caller may retry; the engine itself
/// retries only the single redirect-driven HEAD case.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server failed with HTTP status code {0}")]
    ServerError(u16),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationErr),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    S3Server(Box<S3ErrorResponse>),

    #[error("XML error: {0}")]
    Xml(String),
}

impl Error {
    /// The typed S3 error code, if this error came from the server.
    pub fn s3_error_code(&self) -> Option<&S3ErrorCode> {
        match self {
            Error::S3Server(resp) => Some(resp.code()),
            _ => None,
        }
    }
}

impl From<S3ErrorResponse> for Error {
    fn from(value: S3ErrorResponse) -> Self {
        Error::S3Server(Box::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(NetworkError::Http(value))
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Network(NetworkError::Io(value))
    }
}

impl From<xmltree::ParseError> for Error {
    fn from(value: xmltree::ParseError) -> Self {
        Error::Xml(value.to_string())
    }
}
