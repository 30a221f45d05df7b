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

use crate::s3::builders::{
    AbortMultipartUpload, CompleteMultipartUpload, CreateMultipartUpload, PutObject, UploadPart,
};
use crate::s3::checksum::ChecksumAlgorithm;
use crate::s3::client::Client;
use crate::s3::error::Error;
use crate::s3::multimap::Multimap;
use crate::s3::object_content::{ObjectContent, Size};
use crate::s3::part_reader::{PartPayload, PartReader};
use crate::s3::response::PutObjectContentResponse;
use crate::s3::types::{Part, S3Api};
use crate::s3::utils::{check_bucket_name, check_object_name};

/// Argument for
/// [put_object_content()](crate::s3::client::Client::put_object_content)
/// API. Uploads arbitrary content, switching to a multipart upload when
/// the content exceeds one part; partial multipart state is aborted on
/// failure.
pub struct PutObjectContent {
    client: Client,

    extra_headers: Option<Multimap>,
    extra_query_params: Option<Multimap>,
    region: Option<String>,
    bucket: String,
    object: String,
    content: ObjectContent,
    part_size: Size,
    content_type: String,
    checksum_algorithm: Option<ChecksumAlgorithm>,
}

impl PutObjectContent {
    pub fn new(
        client: Client,
        bucket: &str,
        object: &str,
        content: impl Into<ObjectContent>,
    ) -> Self {
        PutObjectContent {
            client,
            extra_headers: None,
            extra_query_params: None,
            region: None,
            bucket: bucket.to_string(),
            object: object.to_string(),
            content: content.into(),
            part_size: Size::Unknown,
            content_type: "application/octet-stream".to_string(),
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

    pub fn part_size(mut self, part_size: impl Into<Size>) -> Self {
        self.part_size = part_size.into();
        self
    }

    pub fn content_type(mut self, content_type: String) -> Self {
        self.content_type = content_type;
        self
    }

    /// An extra checksum computed over each part and sent with it.
    pub fn checksum_algorithm(mut self, algorithm: Option<ChecksumAlgorithm>) -> Self {
        self.checksum_algorithm = algorithm;
        self
    }

    pub async fn send(mut self) -> Result<PutObjectContentResponse, Error> {
        check_bucket_name(&self.bucket, true)?;
        check_object_name(&self.object)?;

        let algorithms: Vec<ChecksumAlgorithm> =
            self.checksum_algorithm.into_iter().collect();
        let content = std::mem::take(&mut self.content);
        let mut reader = PartReader::from_content(content, self.part_size, &algorithms).await?;

        let first = reader.next_part().await?;
        let first = match first {
            Some(p) => p,
            // The reader yields at least one (possibly empty) part, so
            // this only guards against a misbehaving source.
            None => {
                return self
                    .send_single(crate::s3::segmented_bytes::SegmentedBytes::new(), 0, Vec::new())
                    .await;
            }
        };

        if first.last {
            let size = first.size;
            let checksums = first.checksums.clone();
            let body = first.source.into_segmented_bytes().await?;
            return self.send_single(body, size, checksums).await;
        }

        // More than one part: full multipart upload. The checksum
        // algorithm is validated for multipart use before any request
        // is sent.
        let create = CreateMultipartUpload::new(self.client.clone(), &self.bucket, &self.object)
            .extra_headers(self.extra_headers.clone())
            .extra_query_params(self.extra_query_params.clone())
            .region(self.region.clone())
            .content_type(Some(self.content_type.clone()))
            .checksum_algorithm(self.checksum_algorithm);
        let created = create.send().await?;
        let upload_id = created.upload_id;

        let res = self.upload_parts(&mut reader, first, &upload_id).await;
        match res {
            Ok(v) => Ok(v),
            Err(e) => {
                log::warn!(
                    "aborting multipart upload {upload_id} of {}/{} after failure: {e}",
                    self.bucket,
                    self.object
                );
                let _ = AbortMultipartUpload::new(
                    self.client.clone(),
                    &self.bucket,
                    &self.object,
                    &upload_id,
                )
                .region(self.region.clone())
                .send()
                .await;
                Err(e)
            }
        }
    }

    async fn send_single(
        self,
        body: crate::s3::segmented_bytes::SegmentedBytes,
        size: u64,
        checksums: Vec<(ChecksumAlgorithm, String)>,
    ) -> Result<PutObjectContentResponse, Error> {
        let resp = PutObject::new(self.client, &self.bucket, &self.object, body)
            .extra_headers(self.extra_headers)
            .extra_query_params(self.extra_query_params)
            .region(self.region)
            .content_type(Some(self.content_type))
            .checksums(checksums)
            .send()
            .await?;

        Ok(PutObjectContentResponse {
            headers: resp.headers,
            bucket: resp.bucket,
            object: resp.object,
            region: resp.region,
            object_size: size,
            etag: resp.etag,
            version_id: resp.version_id,
        })
    }

    async fn upload_parts(
        &self,
        reader: &mut PartReader,
        first: PartPayload,
        upload_id: &str,
    ) -> Result<PutObjectContentResponse, Error> {
        let mut parts: Vec<Part> =
            Vec::with_capacity(reader.expected_parts().unwrap_or(16) as usize);
        let mut object_size: u64 = 0;
        let mut pending = Some(first);

        loop {
            let payload = match pending.take() {
                Some(p) => p,
                None => match reader.next_part().await? {
                    Some(p) => p,
                    None => break,
                },
            };

            object_size += payload.size;
            let last = payload.last;
            let body = payload.source.into_segmented_bytes().await?;

            let resp = UploadPart::new(
                self.client.clone(),
                &self.bucket,
                &self.object,
                upload_id,
                payload.number,
                body,
            )
            .region(self.region.clone())
            .checksums(payload.checksums.clone())
            .send()
            .await?;

            parts.push(Part {
                number: payload.number,
                etag: resp.etag,
                size: payload.size,
                checksums: payload.checksums,
            });

            if last {
                break;
            }
        }

        let resp = CompleteMultipartUpload::new(
            self.client.clone(),
            &self.bucket,
            &self.object,
            upload_id,
            parts,
        )
        .extra_query_params(self.extra_query_params.clone())
        .region(self.region.clone())
        .send()
        .await?;

        Ok(PutObjectContentResponse {
            headers: resp.headers,
            bucket: resp.bucket,
            object: resp.object,
            region: resp.region,
            object_size,
            etag: resp.etag,
            version_id: resp.version_id,
        })
    }
}
