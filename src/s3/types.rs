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

//! Request plumbing shared by all operations.

use crate::s3::checksum::ChecksumAlgorithm;
use crate::s3::client::{Client, DEFAULT_REGION};
use crate::s3::error::{Error, ValidationErr};
use crate::s3::multimap::Multimap;
use crate::s3::segmented_bytes::SegmentedBytes;
use async_trait::async_trait;
use http::Method;
use std::sync::Arc;
use typed_builder::TypedBuilder;

/// One completed part of a multipart upload.
#[derive(Clone, Debug)]
pub struct Part {
    /// 1-based part number.
    pub number: u16,
    pub etag: String,
    pub size: u64,
    /// Base64 checksum values keyed by algorithm, echoed back when
    /// completing the upload.
    pub checksums: Vec<(ChecksumAlgorithm, String)>,
}

/// A fully built request, ready for the execution engine.
#[derive(Clone, Debug, TypedBuilder)]
pub struct S3Request {
    #[builder(!default)]
    pub(crate) client: Client,

    #[builder(!default)]
    method: Method,

    #[builder(default, setter(into))]
    region: Option<String>,

    #[builder(default, setter(into))]
    pub(crate) bucket: Option<String>,

    #[builder(default, setter(into))]
    pub(crate) object: Option<String>,

    #[builder(default)]
    pub(crate) query_params: Multimap,

    #[builder(default)]
    headers: Multimap,

    #[builder(default, setter(into))]
    body: Option<Arc<SegmentedBytes>>,

    /// When set, the body is sent aws-chunked with this checksum
    /// appended as a trailer.
    #[builder(default)]
    pub(crate) trailing_checksum: Option<ChecksumAlgorithm>,

    /// Sign each aws-chunked chunk (`STREAMING-AWS4-HMAC-SHA256-PAYLOAD-TRAILER`)
    /// instead of relying on TLS (`STREAMING-UNSIGNED-PAYLOAD-TRAILER`).
    #[builder(default = false)]
    pub(crate) use_signed_streaming: bool,

    /// Region resolved by [`S3Request::execute`].
    #[builder(default, setter(skip))]
    pub(crate) inner_region: String,
}

impl S3Request {
    async fn compute_inner_region(&self) -> Result<String, Error> {
        match &self.bucket {
            Some(b) => self.client.get_region_cached(b, &self.region).await,
            None => Ok(DEFAULT_REGION.to_string()),
        }
    }

    /// Resolves the region and executes the request. Only used by
    /// [`S3Api::send`].
    pub async fn execute(&mut self) -> Result<reqwest::Response, Error> {
        self.inner_region = self.compute_inner_region().await?;

        self.client
            .execute(
                self.method.clone(),
                &self.inner_region,
                &self.headers,
                &self.query_params,
                self.bucket.as_deref(),
                self.object.as_deref(),
                self.body.as_ref().map(Arc::clone),
                self.trailing_checksum,
                self.use_signed_streaming,
            )
            .await
    }
}

/// Converts a typed request builder into a concrete [`S3Request`].
///
/// Validation of names, sizes and parameter combinations happens here,
/// before anything touches the network.
pub trait ToS3Request: Sized {
    fn to_s3request(self) -> Result<S3Request, ValidationErr>;
}

/// Converts the HTTP response (or transport error) of an executed
/// request into a typed response.
#[async_trait]
pub trait FromS3Response: Sized {
    async fn from_s3response(
        s3req: S3Request,
        response: Result<reqwest::Response, Error>,
    ) -> Result<Self, Error>;
}

/// Common interface of all request builders: build, execute, parse.
#[async_trait]
pub trait S3Api: ToS3Request {
    type S3Response: FromS3Response;

    async fn send(self) -> Result<Self::S3Response, Error> {
        let mut req: S3Request = self.to_s3request()?;
        let resp: Result<reqwest::Response, Error> = req.execute().await;
        Self::S3Response::from_s3response(req, resp).await
    }
}
