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

use crate::s3::client::{Client, DEFAULT_EXPIRY_SECONDS};
use crate::s3::error::Error;
use crate::s3::header_constants::X_AMZ_SECURITY_TOKEN;
use crate::s3::multimap::{Multimap, MultimapExt};
use crate::s3::response::GetPresignedObjectUrlResponse;
use crate::s3::signer::presign_v4;
use crate::s3::utils::{UtcTime, check_bucket_name, check_object_name, utc_now};
use http::Method;

/// Argument for
/// [get_presigned_object_url()](crate::s3::client::Client::get_presigned_object_url)
/// API. Produces a URL embedding query-string authentication; no request
/// is sent to the server.
#[derive(Clone, Debug)]
pub struct GetPresignedObjectUrl {
    client: Client,

    extra_query_params: Option<Multimap>,
    region: Option<String>,
    bucket: String,
    object: String,
    version_id: Option<String>,
    method: Method,
    expiry_seconds: u32,
    /// Signing time override, for reproducible URLs.
    request_time: Option<UtcTime>,
}

impl GetPresignedObjectUrl {
    pub fn new(client: Client, bucket: &str, object: &str, method: Method) -> Self {
        GetPresignedObjectUrl {
            client,
            extra_query_params: None,
            region: None,
            bucket: bucket.to_string(),
            object: object.to_string(),
            version_id: None,
            method,
            expiry_seconds: DEFAULT_EXPIRY_SECONDS,
            request_time: None,
        }
    }

    pub fn extra_query_params(mut self, extra_query_params: Option<Multimap>) -> Self {
        self.extra_query_params = extra_query_params;
        self
    }

    pub fn region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn version_id(mut self, version_id: Option<String>) -> Self {
        self.version_id = version_id;
        self
    }

    pub fn expiry_seconds(mut self, expiry_seconds: u32) -> Self {
        self.expiry_seconds = expiry_seconds;
        self
    }

    pub fn request_time(mut self, request_time: UtcTime) -> Self {
        self.request_time = Some(request_time);
        self
    }

    pub async fn send(self) -> Result<GetPresignedObjectUrlResponse, Error> {
        check_bucket_name(&self.bucket, true)?;
        check_object_name(&self.object)?;

        let region: String = self
            .client
            .get_region_cached(&self.bucket, &self.region)
            .await?;

        let mut query_params: Multimap = self.extra_query_params.unwrap_or_default();
        query_params.add_version(self.version_id.clone());

        let mut url = self.client.base_url().build_url(
            &self.method,
            &region,
            &query_params,
            Some(&self.bucket),
            Some(&self.object),
        )?;

        if let Some(p) = self.client.provider() {
            let creds = p.fetch();
            if let Some(t) = creds.session_token {
                query_params.add(X_AMZ_SECURITY_TOKEN, t);
            }

            let date = self.request_time.unwrap_or_else(utc_now);

            presign_v4(
                &self.method,
                &url.host_header_value(),
                &url.path,
                &region,
                &mut query_params,
                &creds.access_key,
                &creds.secret_key,
                date,
                self.expiry_seconds,
            );

            url.query = query_params;
        }

        Ok(GetPresignedObjectUrlResponse {
            region,
            bucket: self.bucket,
            object: self.object,
            version_id: self.version_id,
            url: url.to_string(),
        })
    }
}
