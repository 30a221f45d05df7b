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

//! The low-level object-write operations: single-request PutObject and
//! the four multipart primitives.

use crate::s3::checksum::ChecksumAlgorithm;
use crate::s3::client::Client;
use crate::s3::error::ValidationErr;
use crate::s3::header_constants::{
    CONTENT_MD5, CONTENT_TYPE, X_AMZ_CHECKSUM_ALGORITHM, X_AMZ_CHECKSUM_TYPE,
};
use crate::s3::multimap::{Multimap, MultimapExt};
use crate::s3::response::{
    AbortMultipartUploadResponse, CompleteMultipartUploadResponse, CreateMultipartUploadResponse,
    PutObjectResponse, UploadPartResponse,
};
use crate::s3::segmented_bytes::SegmentedBytes;
use crate::s3::types::{Part, S3Api, S3Request, ToS3Request};
use crate::s3::utils::{check_bucket_name, check_object_name, md5sum_hash};
use bytes::BytesMut;
use http::Method;

/// XML element name for a part-level checksum in the
/// CompleteMultipartUpload body. MD5 has none; it travels as
/// `Content-MD5` only.
fn checksum_xml_tag(algorithm: ChecksumAlgorithm) -> Option<&'static str> {
    match algorithm {
        ChecksumAlgorithm::Crc32 => Some("ChecksumCRC32"),
        ChecksumAlgorithm::Crc32c => Some("ChecksumCRC32C"),
        ChecksumAlgorithm::Crc64Nvme => Some("ChecksumCRC64NVME"),
        ChecksumAlgorithm::Sha1 => Some("ChecksumSHA1"),
        ChecksumAlgorithm::Sha256 => Some("ChecksumSHA256"),
        ChecksumAlgorithm::Md5 => None,
    }
}

/// Argument for
/// [create_multipart_upload()](crate::s3::client::Client::create_multipart_upload)
/// API
#[derive(Clone, Debug)]
pub struct CreateMultipartUpload {
    client: Client,

    extra_headers: Option<Multimap>,
    extra_query_params: Option<Multimap>,
    region: Option<String>,
    bucket: String,
    object: String,
    content_type: Option<String>,
    checksum_algorithm: Option<ChecksumAlgorithm>,
}

impl CreateMultipartUpload {
    pub fn new(client: Client, bucket: &str, object: &str) -> Self {
        CreateMultipartUpload {
            client,
            extra_headers: None,
            extra_query_params: None,
            region: None,
            bucket: bucket.to_string(),
            object: object.to_string(),
            content_type: None,
            checksum_algorithm: None,
        }
    }

    pub fn extra_headers(mut self, extra_headers: Option<Multimap>) -> Self {
        self.extra_headers = extra_headers;
        self
    }

    pub fn extra_query_params(mut self, extra_query_params: Option<Multimap>) -> Self {
        self.extra_query_params = extra_query_params;
        self
    }

    pub fn region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    /// Declares the extra checksum the parts of this upload will carry.
    pub fn checksum_algorithm(mut self, algorithm: Option<ChecksumAlgorithm>) -> Self {
        self.checksum_algorithm = algorithm;
        self
    }
}

impl ToS3Request for CreateMultipartUpload {
    fn to_s3request(self) -> Result<S3Request, ValidationErr> {
        check_bucket_name(&self.bucket, true)?;
        check_object_name(&self.object)?;

        let mut headers = Multimap::new();
        if let Some(v) = self.extra_headers {
            headers.add_multimap(v);
        }
        if !headers.contains_key(CONTENT_TYPE) {
            headers.add(
                CONTENT_TYPE,
                self.content_type
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
            );
        }
        if let Some(algorithm) = self.checksum_algorithm {
            // Fails for MD5, which S3 does not accept for multipart.
            let checksum_type = algorithm.multipart_checksum_type()?;
            headers.add(X_AMZ_CHECKSUM_ALGORITHM, algorithm.to_string());
            headers.add(X_AMZ_CHECKSUM_TYPE, checksum_type.to_string());
        }

        let mut query_params = Multimap::new();
        if let Some(v) = self.extra_query_params {
            query_params.add_multimap(v);
        }
        query_params.add("uploads", "");

        Ok(S3Request::builder()
            .client(self.client)
            .method(Method::POST)
            .region(self.region)
            .bucket(Some(self.bucket))
            .object(Some(self.object))
            .query_params(query_params)
            .headers(headers)
            .build())
    }
}

impl S3Api for CreateMultipartUpload {
    type S3Response = CreateMultipartUploadResponse;
}

/// Argument for
/// [abort_multipart_upload()](crate::s3::client::Client::abort_multipart_upload)
/// API
#[derive(Clone, Debug)]
pub struct AbortMultipartUpload {
    client: Client,

    extra_headers: Option<Multimap>,
    extra_query_params: Option<Multimap>,
    region: Option<String>,
    bucket: String,
    object: String,
    upload_id: String,
}

impl AbortMultipartUpload {
    pub fn new(client: Client, bucket: &str, object: &str, upload_id: &str) -> Self {
        AbortMultipartUpload {
            client,
            extra_headers: None,
            extra_query_params: None,
            region: None,
            bucket: bucket.to_string(),
            object: object.to_string(),
            upload_id: upload_id.to_string(),
        }
    }

    pub fn extra_headers(mut self, extra_headers: Option<Multimap>) -> Self {
        self.extra_headers = extra_headers;
        self
    }

    pub fn extra_query_params(mut self, extra_query_params: Option<Multimap>) -> Self {
        self.extra_query_params = extra_query_params;
        self
    }

    pub fn region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }
}

impl ToS3Request for AbortMultipartUpload {
    fn to_s3request(self) -> Result<S3Request, ValidationErr> {
        check_bucket_name(&self.bucket, true)?;
        check_object_name(&self.object)?;
        if self.upload_id.is_empty() {
            return Err(ValidationErr::EmptyUploadId);
        }

        let mut headers = Multimap::new();
        if let Some(v) = self.extra_headers {
            headers.add_multimap(v);
        }

        let mut query_params = Multimap::new();
        if let Some(v) = self.extra_query_params {
            query_params.add_multimap(v);
        }
        query_params.add("uploadId", self.upload_id);

        Ok(S3Request::builder()
            .client(self.client)
            .method(Method::DELETE)
            .region(self.region)
            .bucket(Some(self.bucket))
            .object(Some(self.object))
            .query_params(query_params)
            .headers(headers)
            .build())
    }
}

impl S3Api for AbortMultipartUpload {
    type S3Response = AbortMultipartUploadResponse;
}

/// Argument for
/// [complete_multipart_upload()](crate::s3::client::Client::complete_multipart_upload)
/// API
#[derive(Clone, Debug)]
pub struct CompleteMultipartUpload {
    client: Client,

    extra_headers: Option<Multimap>,
    extra_query_params: Option<Multimap>,
    region: Option<String>,
    bucket: String,
    object: String,
    upload_id: String,
    parts: Vec<Part>,
}

impl CompleteMultipartUpload {
    pub fn new(
        client: Client,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: Vec<Part>,
    ) -> Self {
        CompleteMultipartUpload {
            client,
            extra_headers: None,
            extra_query_params: None,
            region: None,
            bucket: bucket.to_string(),
            object: object.to_string(),
            upload_id: upload_id.to_string(),
            parts,
        }
    }

    pub fn extra_headers(mut self, extra_headers: Option<Multimap>) -> Self {
        self.extra_headers = extra_headers;
        self
    }

    pub fn extra_query_params(mut self, extra_query_params: Option<Multimap>) -> Self {
        self.extra_query_params = extra_query_params;
        self
    }

    pub fn region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    fn build_body(&self) -> bytes::Bytes {
        // Sized to avoid reallocation while the part list is appended.
        let mut data = BytesMut::with_capacity(150 * self.parts.len() + 100);
        data.extend_from_slice(b"<CompleteMultipartUpload>");
        for part in self.parts.iter() {
            data.extend_from_slice(b"<Part><PartNumber>");
            data.extend_from_slice(part.number.to_string().as_bytes());
            data.extend_from_slice(b"</PartNumber><ETag>");
            data.extend_from_slice(part.etag.as_bytes());
            data.extend_from_slice(b"</ETag>");
            for (algorithm, value) in &part.checksums {
                if let Some(tag) = checksum_xml_tag(*algorithm) {
                    data.extend_from_slice(b"<");
                    data.extend_from_slice(tag.as_bytes());
                    data.extend_from_slice(b">");
                    data.extend_from_slice(value.as_bytes());
                    data.extend_from_slice(b"</");
                    data.extend_from_slice(tag.as_bytes());
                    data.extend_from_slice(b">");
                }
            }
            data.extend_from_slice(b"</Part>");
        }
        data.extend_from_slice(b"</CompleteMultipartUpload>");
        data.freeze()
    }
}

impl ToS3Request for CompleteMultipartUpload {
    fn to_s3request(self) -> Result<S3Request, ValidationErr> {
        check_bucket_name(&self.bucket, true)?;
        check_object_name(&self.object)?;
        if self.upload_id.is_empty() {
            return Err(ValidationErr::EmptyUploadId);
        }
        for part in &self.parts {
            if !(1..=10000).contains(&part.number) {
                return Err(ValidationErr::InvalidPartNumber(part.number));
            }
        }

        let data = self.build_body();

        let mut headers = Multimap::new();
        if let Some(v) = self.extra_headers {
            headers.add_multimap(v);
        }
        headers.add(CONTENT_TYPE, "application/xml");
        headers.add(CONTENT_MD5, md5sum_hash(data.as_ref()));

        let mut query_params = Multimap::new();
        if let Some(v) = self.extra_query_params {
            query_params.add_multimap(v);
        }
        query_params.add("uploadId", self.upload_id);

        Ok(S3Request::builder()
            .client(self.client)
            .method(Method::POST)
            .region(self.region)
            .bucket(Some(self.bucket))
            .object(Some(self.object))
            .query_params(query_params)
            .headers(headers)
            .body(Some(SegmentedBytes::from(data).into()))
            .build())
    }
}

impl S3Api for CompleteMultipartUpload {
    type S3Response = CompleteMultipartUploadResponse;
}

/// Argument for [upload_part()](crate::s3::client::Client::upload_part) API
#[derive(Clone, Debug)]
pub struct UploadPart {
    client: Client,

    extra_headers: Option<Multimap>,
    extra_query_params: Option<Multimap>,
    region: Option<String>,
    bucket: String,
    object: String,
    data: SegmentedBytes,
    /// Base64 checksum values sent as `x-amz-checksum-*` headers.
    checksums: Vec<(ChecksumAlgorithm, String)>,
    content_type: Option<String>,

    // Absent when the struct backs a plain PutObject.
    upload_id: Option<String>,
    part_number: Option<u16>,
}

impl UploadPart {
    pub fn new(
        client: Client,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: u16,
        data: SegmentedBytes,
    ) -> Self {
        UploadPart {
            client,
            extra_headers: None,
            extra_query_params: None,
            region: None,
            bucket: bucket.to_string(),
            object: object.to_string(),
            data,
            checksums: Vec::new(),
            content_type: None,
            upload_id: Some(upload_id.to_string()),
            part_number: Some(part_number),
        }
    }

    pub fn extra_headers(mut self, extra_headers: Option<Multimap>) -> Self {
        self.extra_headers = extra_headers;
        self
    }

    pub fn extra_query_params(mut self, extra_query_params: Option<Multimap>) -> Self {
        self.extra_query_params = extra_query_params;
        self
    }

    pub fn region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn checksums(mut self, checksums: Vec<(ChecksumAlgorithm, String)>) -> Self {
        self.checksums = checksums;
        self
    }

    fn validate(&self) -> Result<(), ValidationErr> {
        check_bucket_name(&self.bucket, true)?;
        check_object_name(&self.object)?;

        if let Some(upload_id) = &self.upload_id {
            if upload_id.is_empty() {
                return Err(ValidationErr::EmptyUploadId);
            }
        }
        if let Some(part_number) = self.part_number {
            if !(1..=10000).contains(&part_number) {
                return Err(ValidationErr::InvalidPartNumber(part_number));
            }
        }
        Ok(())
    }
}

impl ToS3Request for UploadPart {
    fn to_s3request(self) -> Result<S3Request, ValidationErr> {
        self.validate()?;

        let mut headers = Multimap::new();
        if let Some(v) = self.extra_headers {
            headers.add_multimap(v);
        }
        if let Some(content_type) = self.content_type {
            headers.add(CONTENT_TYPE, content_type);
        }
        for (algorithm, value) in &self.checksums {
            headers.add(algorithm.header_name(), value.clone());
        }

        let mut query_params = Multimap::new();
        if let Some(v) = self.extra_query_params {
            query_params.add_multimap(v);
        }
        if let Some(upload_id) = self.upload_id {
            query_params.add("uploadId", upload_id);
        }
        if let Some(part_number) = self.part_number {
            query_params.add("partNumber", part_number.to_string());
        }

        Ok(S3Request::builder()
            .client(self.client)
            .method(Method::PUT)
            .region(self.region)
            .bucket(Some(self.bucket))
            .object(Some(self.object))
            .query_params(query_params)
            .headers(headers)
            .body(Some(self.data.into()))
            .build())
    }
}

impl S3Api for UploadPart {
    type S3Response = UploadPartResponse;
}

/// Argument for [put_object()](crate::s3::client::Client::put_object) API.
/// Uploads the whole body in one request; see
/// [PutObjectContent](crate::s3::builders::PutObjectContent) for the
/// multipart-aware variant.
#[derive(Clone, Debug)]
pub struct PutObject(UploadPart);

impl PutObject {
    pub fn new(client: Client, bucket: &str, object: &str, data: SegmentedBytes) -> Self {
        PutObject(UploadPart {
            client,
            extra_headers: None,
            extra_query_params: None,
            region: None,
            bucket: bucket.to_string(),
            object: object.to_string(),
            data,
            checksums: Vec::new(),
            content_type: None,
            upload_id: None,
            part_number: None,
        })
    }

    pub fn extra_headers(mut self, extra_headers: Option<Multimap>) -> Self {
        self.0.extra_headers = extra_headers;
        self
    }

    pub fn extra_query_params(mut self, extra_query_params: Option<Multimap>) -> Self {
        self.0.extra_query_params = extra_query_params;
        self
    }

    pub fn region(mut self, region: Option<String>) -> Self {
        self.0.region = region;
        self
    }

    pub fn content_type(mut self, content_type: Option<String>) -> Self {
        self.0.content_type = content_type;
        self
    }

    pub fn checksums(mut self, checksums: Vec<(ChecksumAlgorithm, String)>) -> Self {
        self.0.checksums = checksums;
        self
    }
}

impl ToS3Request for PutObject {
    fn to_s3request(self) -> Result<S3Request, ValidationErr> {
        self.0.to_s3request()
    }
}

impl S3Api for PutObject {
    type S3Response = PutObjectResponse;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(number: u16, etag: &str) -> Part {
        Part {
            number,
            etag: etag.to_string(),
            size: 5 * 1024 * 1024,
            checksums: Vec::new(),
        }
    }

    #[test]
    fn complete_body_lists_parts_in_order() {
        let cmu = CompleteMultipartUpload {
            client: Client::test_client(),
            extra_headers: None,
            extra_query_params: None,
            region: None,
            bucket: "bucket".to_string(),
            object: "object".to_string(),
            upload_id: "uid".to_string(),
            parts: vec![part(1, "\"etag1\""), part(2, "\"etag2\"")],
        };
        let body = cmu.build_body();
        assert_eq!(
            std::str::from_utf8(&body).unwrap(),
            "<CompleteMultipartUpload>\
             <Part><PartNumber>1</PartNumber><ETag>\"etag1\"</ETag></Part>\
             <Part><PartNumber>2</PartNumber><ETag>\"etag2\"</ETag></Part>\
             </CompleteMultipartUpload>"
        );
    }

    #[test]
    fn complete_body_carries_part_checksums() {
        let mut p = part(1, "\"e\"");
        p.checksums = vec![(ChecksumAlgorithm::Crc32c, "sOO8/Q==".to_string())];
        let cmu = CompleteMultipartUpload {
            client: Client::test_client(),
            extra_headers: None,
            extra_query_params: None,
            region: None,
            bucket: "bucket".to_string(),
            object: "object".to_string(),
            upload_id: "uid".to_string(),
            parts: vec![p],
        };
        let body = cmu.build_body();
        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.contains("<ChecksumCRC32C>sOO8/Q==</ChecksumCRC32C>"));
    }

    #[test]
    fn complete_rejects_out_of_range_part_number() {
        let cmu = CompleteMultipartUpload::new(
            Client::test_client(),
            "bucket",
            "object",
            "uid",
            vec![part(0, "\"e\"")],
        );
        assert!(matches!(
            cmu.to_s3request(),
            Err(ValidationErr::InvalidPartNumber(0))
        ));
    }

    #[test]
    fn abort_requires_upload_id() {
        let req = AbortMultipartUpload::new(Client::test_client(), "bucket", "object", "")
            .to_s3request();
        assert!(matches!(req, Err(ValidationErr::EmptyUploadId)));
    }

    #[test]
    fn upload_part_rejects_part_number_out_of_range() {
        let req = UploadPart::new(
            Client::test_client(),
            "bucket",
            "object",
            "uid",
            10_001,
            SegmentedBytes::new(),
        )
        .to_s3request();
        assert!(matches!(req, Err(ValidationErr::InvalidPartNumber(10_001))));
    }

    #[test]
    fn create_rejects_md5_checksum() {
        let req = CreateMultipartUpload::new(Client::test_client(), "bucket", "object")
            .checksum_algorithm(Some(ChecksumAlgorithm::Md5))
            .to_s3request();
        assert!(matches!(
            req,
            Err(ValidationErr::UnsupportedMultipartChecksum(
                ChecksumAlgorithm::Md5
            ))
        ));
    }
}
