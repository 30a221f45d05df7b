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

//! Typed responses of the S3 APIs.

use crate::s3::checksum::ChecksumAlgorithm;
use crate::s3::client::DEFAULT_REGION;
use crate::s3::error::{Error, ValidationErr};
use crate::s3::types::{FromS3Response, S3Request};
use crate::s3::utils::{get_text, trim_quotes};
use async_trait::async_trait;
use bytes::Buf;
use http::HeaderMap;
use std::mem;
use std::str::FromStr;
use xmltree::Element;

fn require_bucket(bucket: Option<String>) -> Result<String, Error> {
    bucket.ok_or_else(|| {
        Error::Validation(ValidationErr::InvalidBucketName {
            name: String::new(),
            message: "no bucket specified".to_string(),
        })
    })
}

fn require_object(object: Option<String>) -> Result<String, Error> {
    object.ok_or_else(|| {
        Error::Validation(ValidationErr::InvalidObjectName(
            "no object specified".to_string(),
        ))
    })
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Pulls all `x-amz-checksum-*` headers the server echoed back.
fn checksum_headers(headers: &HeaderMap) -> Vec<(ChecksumAlgorithm, String)> {
    let mut out = Vec::new();
    for (name, value) in headers {
        let Some(suffix) = name.as_str().strip_prefix("x-amz-checksum-") else {
            continue;
        };
        let Ok(algorithm) = ChecksumAlgorithm::from_str(suffix) else {
            continue;
        };
        if let Ok(v) = value.to_str() {
            out.push((algorithm, v.to_string()));
        }
    }
    out.sort_by_key(|(a, _)| a.header_name());
    out
}

/// Response of an object upload that carries its metadata in headers:
/// [PutObject](crate::s3::builders::PutObject) and
/// [UploadPart](crate::s3::builders::UploadPart).
#[derive(Clone, Debug)]
pub struct PutObjectResponse {
    pub headers: HeaderMap,
    pub bucket: String,
    pub object: String,
    pub region: String,
    pub etag: String,
    pub version_id: Option<String>,
    /// Checksum values echoed back by the server.
    pub checksums: Vec<(ChecksumAlgorithm, String)>,
}

#[async_trait]
impl FromS3Response for PutObjectResponse {
    async fn from_s3response(
        req: S3Request,
        resp: Result<reqwest::Response, Error>,
    ) -> Result<Self, Error> {
        let bucket = require_bucket(req.bucket)?;
        let object = require_object(req.object)?;

        let mut resp = resp?;
        let headers: HeaderMap = mem::take(resp.headers_mut());

        let etag = header_str(&headers, "etag")
            .map(trim_quotes)
            .unwrap_or_default();
        let version_id = header_str(&headers, "x-amz-version-id");
        let checksums = checksum_headers(&headers);

        Ok(PutObjectResponse {
            headers,
            bucket,
            object,
            region: req.inner_region,
            etag,
            version_id,
            checksums,
        })
    }
}

pub type UploadPartResponse = PutObjectResponse;

/// Response of [CreateMultipartUpload](crate::s3::builders::CreateMultipartUpload).
#[derive(Clone, Debug)]
pub struct CreateMultipartUploadResponse {
    pub headers: HeaderMap,
    pub region: String,
    pub bucket: String,
    pub object: String,
    pub upload_id: String,
}

#[async_trait]
impl FromS3Response for CreateMultipartUploadResponse {
    async fn from_s3response(
        req: S3Request,
        resp: Result<reqwest::Response, Error>,
    ) -> Result<Self, Error> {
        let bucket = require_bucket(req.bucket)?;
        let object = require_object(req.object)?;

        let mut resp = resp?;
        let headers: HeaderMap = mem::take(resp.headers_mut());
        let body = resp.bytes().await?;
        let root = Element::parse(body.reader())?;

        let upload_id = get_text(&root, "UploadId")?;
        if upload_id.is_empty() {
            return Err(ValidationErr::EmptyUploadId.into());
        }

        Ok(CreateMultipartUploadResponse {
            headers,
            region: req.inner_region,
            bucket,
            object,
            upload_id,
        })
    }
}

/// Response of [AbortMultipartUpload](crate::s3::builders::AbortMultipartUpload).
#[derive(Clone, Debug)]
pub struct AbortMultipartUploadResponse {
    pub headers: HeaderMap,
    pub region: String,
    pub bucket: String,
    pub object: String,
}

#[async_trait]
impl FromS3Response for AbortMultipartUploadResponse {
    async fn from_s3response(
        req: S3Request,
        resp: Result<reqwest::Response, Error>,
    ) -> Result<Self, Error> {
        let bucket = require_bucket(req.bucket)?;
        let object = require_object(req.object)?;

        let mut resp = resp?;
        let headers: HeaderMap = mem::take(resp.headers_mut());

        Ok(AbortMultipartUploadResponse {
            headers,
            region: req.inner_region,
            bucket,
            object,
        })
    }
}

/// Response of [CompleteMultipartUpload](crate::s3::builders::CompleteMultipartUpload).
///
/// Unlike a plain upload, the ETag of the assembled object arrives in
/// the XML body, not in a header.
#[derive(Clone, Debug)]
pub struct CompleteMultipartUploadResponse {
    pub headers: HeaderMap,
    pub bucket: String,
    pub object: String,
    pub region: String,
    pub etag: String,
    pub version_id: Option<String>,
}

#[async_trait]
impl FromS3Response for CompleteMultipartUploadResponse {
    async fn from_s3response(
        req: S3Request,
        resp: Result<reqwest::Response, Error>,
    ) -> Result<Self, Error> {
        let bucket = require_bucket(req.bucket)?;
        let object = require_object(req.object)?;

        let mut resp = resp?;
        let headers: HeaderMap = mem::take(resp.headers_mut());
        let version_id = header_str(&headers, "x-amz-version-id");
        let body = resp.bytes().await?;
        let root = Element::parse(body.reader())?;
        let etag = trim_quotes(get_text(&root, "ETag")?);

        Ok(CompleteMultipartUploadResponse {
            headers,
            bucket,
            object,
            region: req.inner_region,
            etag,
            version_id,
        })
    }
}

/// Response of [PutObjectContent](crate::s3::builders::PutObjectContent),
/// covering both the single-request and the multipart path.
#[derive(Clone, Debug)]
pub struct PutObjectContentResponse {
    pub headers: HeaderMap,
    pub bucket: String,
    pub object: String,
    pub region: String,
    /// Total bytes uploaded across all parts.
    pub object_size: u64,
    pub etag: String,
    pub version_id: Option<String>,
}

/// Response of [GetBucketLocation](crate::s3::builders::GetBucketLocation).
#[derive(Clone, Debug)]
pub struct GetBucketLocationResponse {
    pub headers: HeaderMap,
    pub bucket: String,
    /// The bucket's region, normalized: an empty `LocationConstraint`
    /// means `us-east-1` and the legacy value `EU` means `eu-west-1`.
    pub region: String,
}

#[async_trait]
impl FromS3Response for GetBucketLocationResponse {
    async fn from_s3response(
        req: S3Request,
        resp: Result<reqwest::Response, Error>,
    ) -> Result<Self, Error> {
        let bucket = require_bucket(req.bucket)?;

        let mut resp = resp?;
        let headers: HeaderMap = mem::take(resp.headers_mut());
        let body = resp.bytes().await?;
        let root = Element::parse(body.reader())?;

        let location = root.get_text().unwrap_or_default().to_string();
        let region = match location.as_str() {
            "" => DEFAULT_REGION.to_string(),
            "EU" => "eu-west-1".to_string(),
            _ => location,
        };

        Ok(GetBucketLocationResponse {
            headers,
            bucket,
            region,
        })
    }
}

/// Response of [GetPresignedObjectUrl](crate::s3::builders::GetPresignedObjectUrl).
///
/// Produced entirely client-side; presigning makes no network request.
#[derive(Clone, Debug)]
pub struct GetPresignedObjectUrlResponse {
    pub region: String,
    pub bucket: String,
    pub object: String,
    pub version_id: Option<String>,
    /// The presigned URL for the object.
    pub url: String,
}
