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

use crate::s3::client::{Client, DEFAULT_REGION};
use crate::s3::error::{Error, ValidationErr};
use crate::s3::types::S3Api;

impl Client {
    /// Resolves the region for a bucket, consulting (in order) the
    /// caller-provided region, the endpoint's fixed region, the region
    /// cache, and finally a `GetBucketLocation` call whose result is
    /// cached.
    ///
    /// The lookup request itself is pinned to the default region so it
    /// cannot recurse into another lookup.
    pub async fn get_region_cached(
        &self,
        bucket: &str,
        region: &Option<String>,
    ) -> Result<String, Error> {
        if let Some(requested) = region
            && !requested.is_empty()
        {
            let base_region = &self.shared.base_url.region;
            if !base_region.is_empty() && base_region != requested {
                return Err(ValidationErr::RegionMismatch {
                    base_url_region: base_region.clone(),
                    requested: requested.clone(),
                }
                .into());
            }
            return Ok(requested.clone());
        }

        if !self.shared.base_url.region.is_empty() {
            return Ok(self.shared.base_url.region.clone());
        }

        // Anonymous clients cannot call GetBucketLocation.
        if bucket.is_empty() || self.shared.provider.is_none() {
            return Ok(DEFAULT_REGION.to_string());
        }

        if let Some(v) = self.shared.region_map.get(bucket) {
            return Ok(v.value().clone());
        }

        let resp = self
            .get_bucket_location(bucket)
            .region(Some(DEFAULT_REGION.to_string()))
            .send()
            .await?;

        self.shared
            .region_map
            .insert(bucket.to_string(), resp.region.clone());
        Ok(resp.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::client::ClientBuilder;
    use crate::s3::creds::StaticProvider;
    use crate::s3::http::BaseUrl;

    fn client_for(endpoint: &str) -> Client {
        let base_url: BaseUrl = endpoint.parse().unwrap();
        ClientBuilder::new(base_url)
            .provider(Some(StaticProvider::new("access", "secret", None)))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn explicit_region_wins() {
        let client = client_for("http://127.0.0.1:9000");
        let region = client
            .get_region_cached("bucket", &Some("ap-south-1".to_string()))
            .await
            .unwrap();
        assert_eq!(region, "ap-south-1");
    }

    #[tokio::test]
    async fn explicit_region_must_match_endpoint_region() {
        let client = client_for("https://s3.eu-west-2.amazonaws.com");
        let err = client
            .get_region_cached("bucket", &Some("us-west-1".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationErr::RegionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn endpoint_region_is_used_without_a_request() {
        let client = client_for("https://s3.eu-west-2.amazonaws.com");
        let region = client.get_region_cached("bucket", &None).await.unwrap();
        assert_eq!(region, "eu-west-2");
    }

    #[tokio::test]
    async fn anonymous_client_falls_back_to_default_region() {
        let base_url: BaseUrl = "http://127.0.0.1:9000".parse().unwrap();
        let client = ClientBuilder::new(base_url).build().unwrap();
        let region = client.get_region_cached("bucket", &None).await.unwrap();
        assert_eq!(region, DEFAULT_REGION);
    }

    #[tokio::test]
    async fn cached_region_short_circuits_the_lookup() {
        let client = client_for("http://127.0.0.1:9000");
        client
            .shared
            .region_map
            .insert("bucket".to_string(), "us-west-2".to_string());
        let region = client.get_region_cached("bucket", &None).await.unwrap();
        assert_eq!(region, "us-west-2");
    }
}
