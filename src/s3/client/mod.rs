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

//! S3 client and the request execution engine.
//!
//! # HTTP Version Support
//!
//! The client supports both HTTP/1.1 and HTTP/2. When connecting over TLS,
//! the client negotiates HTTP/2 via ALPN if the server supports it and
//! falls back to HTTP/1.1 otherwise.
//!
//! HTTP/2 support is enabled by default via the `http2` feature flag. For
//! HTTP/1.1-only S3-compatible services, you can disable it:
//!
//! ```toml
//! [dependencies]
//! stratus = { version = "0.1", default-features = false, features = ["default-tls"] }
//! ```

use bytes::Bytes;
use dashmap::DashMap;
use http::HeaderMap;
pub use hyper::http::Method;
use reqwest::Body;
pub use reqwest::Response;
use std::fs::File;
use std::io::prelude::*;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::s3::aws_chunked::{
    AwsChunkedEncoder, SignedAwsChunkedEncoder, calculate_encoded_length,
    calculate_signed_encoded_length, default_chunk_size, rechunk,
};
use crate::s3::builders::{
    AbortMultipartUpload, CompleteMultipartUpload, CreateMultipartUpload, GetBucketLocation,
    GetPresignedObjectUrl, PutObject, PutObjectContent, UploadPart,
};
use crate::s3::checksum::ChecksumAlgorithm;
use crate::s3::creds::Provider;
use crate::s3::error::{Error, NetworkError};
use crate::s3::header_constants::*;
use crate::s3::http::BaseUrl;
use crate::s3::multimap::{Multimap, MultimapExt};
use crate::s3::object_content::ObjectContent;
use crate::s3::s3_error_response::{S3ErrorCode, S3ErrorResponse};
use crate::s3::segmented_bytes::SegmentedBytes;
use crate::s3::signer::{ChunkSigningContext, sign_v4_s3};
use crate::s3::types::Part;
use crate::s3::utils::{EMPTY_SHA256, sha256_hash_sb, to_amz_date, utc_now};

mod get_region;

/// The default AWS region used when no other region can be determined.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Minimum allowed size (in bytes) for a multipart upload part, except
/// the last one.
pub const MIN_PART_SIZE: u64 = 5_242_880; // 5 MiB

/// Maximum allowed size (in bytes) for a single multipart upload part.
pub const MAX_PART_SIZE: u64 = 5_368_709_120; // 5 GiB

/// Maximum allowed size (in bytes) for a single object.
pub const MAX_OBJECT_SIZE: u64 = 5_497_558_138_880; // 5 TiB

/// Maximum number of parts allowed in a multipart upload.
pub const MAX_MULTIPART_COUNT: u16 = 10_000;

/// Default expiry of presigned URLs: 7 days, the maximum AWS accepts.
pub const DEFAULT_EXPIRY_SECONDS: u32 = 604_800;

/// Payload hash sentinel for requests whose body is not covered by the
/// signature. Only used over TLS.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Payload hash sentinel for aws-chunked uploads with an unsigned body
/// and a trailing checksum.
pub const STREAMING_UNSIGNED_PAYLOAD_TRAILER: &str = "STREAMING-UNSIGNED-PAYLOAD-TRAILER";

/// Payload hash sentinel for aws-chunked uploads with per-chunk
/// signatures and a signed trailing checksum.
pub const STREAMING_AWS4_HMAC_SHA256_PAYLOAD_TRAILER: &str =
    "STREAMING-AWS4-HMAC-SHA256-PAYLOAD-TRAILER";

/// Configuration for the HTTP connection pool.
///
/// Defaults are tuned for parallel S3 operations; reduce
/// `max_idle_per_host` and `idle_timeout` for resource-constrained
/// environments.
#[derive(Debug, Clone)]
pub struct ConnectionPoolConfig {
    /// Maximum number of idle connections per host. Default: 32.
    pub max_idle_per_host: usize,

    /// How long idle connections are kept in the pool. Default: 90s.
    pub idle_timeout: std::time::Duration,

    /// TCP keepalive interval. Keeps connections alive through
    /// NAT/firewalls. Default: 60s.
    pub tcp_keepalive: std::time::Duration,

    /// Enable TCP_NODELAY. Default: true.
    pub tcp_nodelay: bool,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 32,
            idle_timeout: std::time::Duration::from_secs(90),
            tcp_keepalive: std::time::Duration::from_secs(60),
            tcp_nodelay: true,
        }
    }
}

/// Request timeouts, applied once when the client is built.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Time allowed for establishing a connection. Default: 30s.
    pub connect_timeout: std::time::Duration,

    /// Idle time allowed between reads of a response. Default: 120s.
    pub read_timeout: std::time::Duration,

    /// Deadline for a whole request. Default: none, so large transfers
    /// are bounded by the read timeout instead of a fixed total.
    pub request_timeout: Option<std::time::Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: std::time::Duration::from_secs(30),
            read_timeout: std::time::Duration::from_secs(120),
            request_timeout: None,
        }
    }
}

impl TimeoutConfig {
    pub fn connect_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Option<std::time::Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl ConnectionPoolConfig {
    pub fn max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }

    pub fn idle_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn tcp_keepalive(mut self, interval: std::time::Duration) -> Self {
        self.tcp_keepalive = interval;
        self
    }

    pub fn tcp_nodelay(mut self, enable: bool) -> Self {
        self.tcp_nodelay = enable;
        self
    }
}

/// Builds a [`Client`] for a given base URL of an S3-compatible object
/// storage service.
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: BaseUrl,
    provider: Option<Arc<dyn Provider + Send + Sync + 'static>>,
    ssl_cert_file: Option<PathBuf>,
    ignore_cert_check: Option<bool>,
    app_info: Option<(String, String)>,
    connection_pool_config: ConnectionPoolConfig,
    timeout_config: TimeoutConfig,
}

impl ClientBuilder {
    pub fn new(base_url: BaseUrl) -> Self {
        Self {
            base_url,
            provider: None,
            ssl_cert_file: None,
            ignore_cert_check: None,
            app_info: None,
            connection_pool_config: ConnectionPoolConfig::default(),
            timeout_config: TimeoutConfig::default(),
        }
    }

    /// Set the credential provider. Without one, all requests are sent
    /// anonymously.
    pub fn provider<P: Provider + Send + Sync + 'static>(mut self, provider: Option<P>) -> Self {
        self.provider = provider.map(|p| Arc::new(p) as Arc<dyn Provider + Send + Sync + 'static>);
        self
    }

    /// Set the app info as an (app_name, app_version) pair. This shows up
    /// in the client's user-agent.
    pub fn app_info(mut self, app_info: Option<(String, String)>) -> Self {
        self.app_info = app_info;
        self
    }

    /// Set a file of PEM encoded certificates to trust, in addition to
    /// the system trust store.
    pub fn ssl_cert_file(mut self, ssl_cert_file: Option<&Path>) -> Self {
        self.ssl_cert_file = ssl_cert_file.map(PathBuf::from);
        self
    }

    /// Skip certificate verification. Insecure; only for testing.
    pub fn ignore_cert_check(mut self, ignore_cert_check: Option<bool>) -> Self {
        self.ignore_cert_check = ignore_cert_check;
        self
    }

    /// Configure the HTTP connection pool settings.
    pub fn connection_pool_config(mut self, config: ConnectionPoolConfig) -> Self {
        self.connection_pool_config = config;
        self
    }

    /// Configure the request timeouts.
    pub fn timeout_config(mut self, config: TimeoutConfig) -> Self {
        self.timeout_config = config;
        self
    }

    /// Build the [`Client`].
    pub fn build(self) -> Result<Client, Error> {
        let pool_config = &self.connection_pool_config;
        let timeout_config = &self.timeout_config;
        let mut builder = reqwest::Client::builder()
            .no_gzip()
            .tcp_nodelay(pool_config.tcp_nodelay)
            .tcp_keepalive(pool_config.tcp_keepalive)
            .pool_max_idle_per_host(pool_config.max_idle_per_host)
            .pool_idle_timeout(pool_config.idle_timeout)
            .connect_timeout(timeout_config.connect_timeout)
            .read_timeout(timeout_config.read_timeout);
        if let Some(total) = timeout_config.request_timeout {
            builder = builder.timeout(total);
        }

        // No effect with HTTP/1.1-only servers.
        #[cfg(feature = "http2")]
        {
            builder = builder.http2_adaptive_window(true);
        }

        let mut user_agent = String::from("Stratus (")
            + std::env::consts::OS
            + "; "
            + std::env::consts::ARCH
            + ") stratus/"
            + env!("CARGO_PKG_VERSION");

        if let Some((app_name, app_version)) = self.app_info {
            user_agent.push_str(format!(" {app_name}/{app_version}").as_str());
        }
        builder = builder.user_agent(user_agent);

        #[cfg(any(
            feature = "default-tls",
            feature = "native-tls",
            feature = "rustls-tls"
        ))]
        if let Some(v) = self.ignore_cert_check {
            builder = builder.danger_accept_invalid_certs(v);
        }

        #[cfg(any(
            feature = "default-tls",
            feature = "native-tls",
            feature = "rustls-tls"
        ))]
        if let Some(v) = self.ssl_cert_file {
            let mut buf = Vec::new();
            let mut file = File::open(v).map_err(NetworkError::Io)?;
            file.read_to_end(&mut buf).map_err(NetworkError::Io)?;

            let certs = reqwest::Certificate::from_pem_bundle(&buf)?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        Ok(Client {
            http_client: builder.build().map_err(Error::from)?,
            shared: Arc::new(SharedClientItems {
                base_url: self.base_url,
                provider: self.provider,
                region_map: Default::default(),
            }),
        })
    }
}

/// Simple Storage Service (aka S3) client to perform object operations.
///
/// If a credential provider is configured, all requests are signed using
/// AWS Signature Version 4; else they are performed anonymously.
#[derive(Clone, Debug)]
pub struct Client {
    http_client: reqwest::Client,
    pub(crate) shared: Arc<SharedClientItems>,
}

impl Client {
    /// Returns an S3 client with the given base URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use stratus::s3::client::Client;
    /// use stratus::s3::creds::StaticProvider;
    /// use stratus::s3::http::BaseUrl;
    ///
    /// let base_url: BaseUrl = "play.min.io".parse().unwrap();
    /// let static_provider = StaticProvider::new(
    ///     "Q3AM3UQ867SPQQA43P2F",
    ///     "zuf+tfteSlswRu7BJ86wekitnifILbZam1KYY3TG",
    ///     None,
    /// );
    /// let client = Client::new(base_url, Some(static_provider), None, None).unwrap();
    /// ```
    pub fn new<P: Provider + Send + Sync + 'static>(
        base_url: BaseUrl,
        provider: Option<P>,
        ssl_cert_file: Option<&Path>,
        ignore_cert_check: Option<bool>,
    ) -> Result<Self, Error> {
        ClientBuilder::new(base_url)
            .provider(provider)
            .ssl_cert_file(ssl_cert_file)
            .ignore_cert_check(ignore_cert_check)
            .build()
    }

    /// Returns a [`ClientBuilder`] for the given base URL.
    pub fn builder(base_url: BaseUrl) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    /// The endpoint this client talks to.
    pub fn base_url(&self) -> &BaseUrl {
        &self.shared.base_url
    }

    /// The credential provider, if any.
    pub fn provider(&self) -> Option<&Arc<dyn Provider + Send + Sync + 'static>> {
        self.shared.provider.as_ref()
    }

    /// Returns whether this client uses an AWS host.
    pub fn is_aws_host(&self) -> bool {
        self.shared.base_url.is_aws_host()
    }

    /// Returns whether this client is configured to use HTTPS.
    pub fn is_secure(&self) -> bool {
        self.shared.base_url.https
    }

    /// Creates a [`CreateMultipartUpload`] request builder.
    pub fn create_multipart_upload(&self, bucket: &str, object: &str) -> CreateMultipartUpload {
        CreateMultipartUpload::new(self.clone(), bucket, object)
    }

    /// Creates an [`AbortMultipartUpload`] request builder.
    pub fn abort_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> AbortMultipartUpload {
        AbortMultipartUpload::new(self.clone(), bucket, object, upload_id)
    }

    /// Creates a [`CompleteMultipartUpload`] request builder.
    pub fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: Vec<Part>,
    ) -> CompleteMultipartUpload {
        CompleteMultipartUpload::new(self.clone(), bucket, object, upload_id, parts)
    }

    /// Creates an [`UploadPart`] request builder.
    pub fn upload_part(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: u16,
        data: SegmentedBytes,
    ) -> UploadPart {
        UploadPart::new(self.clone(), bucket, object, upload_id, part_number, data)
    }

    /// Creates a [`PutObject`] request builder for a single-request
    /// upload of data already in memory.
    pub fn put_object(&self, bucket: &str, object: &str, data: SegmentedBytes) -> PutObject {
        PutObject::new(self.clone(), bucket, object, data)
    }

    /// Creates a [`PutObjectContent`] request builder uploading arbitrary
    /// content, switching to a multipart upload when the content exceeds
    /// one part.
    pub fn put_object_content(
        &self,
        bucket: &str,
        object: &str,
        content: impl Into<ObjectContent>,
    ) -> PutObjectContent {
        PutObjectContent::new(self.clone(), bucket, object, content)
    }

    /// Creates a [`GetBucketLocation`] request builder.
    pub fn get_bucket_location(&self, bucket: &str) -> GetBucketLocation {
        GetBucketLocation::new(self.clone(), bucket)
    }

    /// Creates a [`GetPresignedObjectUrl`] request builder. No request is
    /// sent to the server; the URL is produced locally.
    pub fn get_presigned_object_url(
        &self,
        bucket: &str,
        object: &str,
        method: Method,
    ) -> GetPresignedObjectUrl {
        GetPresignedObjectUrl::new(self.clone(), bucket, object, method)
    }

    /// A client for unit tests; points at a local endpoint that is never
    /// contacted.
    #[cfg(test)]
    pub(crate) fn test_client() -> Client {
        use crate::s3::creds::StaticProvider;

        let base_url: BaseUrl = "http://127.0.0.1:9000".parse().unwrap();
        ClientBuilder::new(base_url)
            .provider(Some(StaticProvider::new("minioadmin", "minioadmin", None)))
            .build()
            .unwrap()
    }

    async fn execute_internal(
        &self,
        method: &Method,
        region: &str,
        headers: &mut Multimap,
        query_params: &Multimap,
        bucket_name: Option<&str>,
        object_name: Option<&str>,
        body: Option<Arc<SegmentedBytes>>,
        trailing_checksum: Option<ChecksumAlgorithm>,
        use_signed_streaming: bool,
        retry: bool,
    ) -> Result<reqwest::Response, Error> {
        let url =
            self.shared
                .base_url
                .build_url(method, region, query_params, bucket_name, object_name)?;

        headers.add(HOST, url.host_header_value());

        // Trailing checksums imply aws-chunked encoding, which only makes
        // sense for uploads with a body.
        let trailing: Option<ChecksumAlgorithm> = match *method {
            Method::PUT | Method::POST if body.is_some() => trailing_checksum,
            _ => None,
        };
        // Signing chunks requires credentials.
        let use_signed_trailing =
            trailing.is_some() && use_signed_streaming && self.shared.provider.is_some();

        let sha256: String = match *method {
            Method::PUT | Method::POST => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.add(CONTENT_TYPE, "application/octet-stream");
                }
                let raw_len: usize = body.as_ref().map_or(0, |b| b.len());

                if let Some(algorithm) = trailing {
                    headers.add(CONTENT_ENCODING, "aws-chunked");
                    headers.add(X_AMZ_DECODED_CONTENT_LENGTH, raw_len.to_string());
                    headers.add(X_AMZ_TRAILER, algorithm.header_name());

                    let encoded_len = if use_signed_trailing {
                        calculate_signed_encoded_length(
                            raw_len as u64,
                            default_chunk_size(),
                            algorithm,
                        )
                    } else {
                        calculate_encoded_length(raw_len as u64, default_chunk_size(), algorithm)
                    };
                    headers.add(CONTENT_LENGTH, encoded_len.to_string());

                    if use_signed_trailing {
                        STREAMING_AWS4_HMAC_SHA256_PAYLOAD_TRAILER.into()
                    } else {
                        STREAMING_UNSIGNED_PAYLOAD_TRAILER.into()
                    }
                } else {
                    headers.add(CONTENT_LENGTH, raw_len.to_string());
                    match body {
                        None => EMPTY_SHA256.into(),
                        // Hashing large bodies is wasted work when TLS
                        // already protects them in transit.
                        Some(_) if self.is_secure() => UNSIGNED_PAYLOAD.into(),
                        Some(ref v) => {
                            let clone = Arc::clone(v);
                            async_std::task::spawn_blocking(move || sha256_hash_sb(&clone)).await
                        }
                    }
                }
            }
            _ => EMPTY_SHA256.into(),
        };
        headers.add(X_AMZ_CONTENT_SHA256, sha256.clone());

        let date = utc_now();
        headers.add(X_AMZ_DATE, to_amz_date(date));

        let chunk_signing_context: Option<ChunkSigningContext> =
            if let Some(p) = &self.shared.provider {
                let creds = p.fetch();
                if let Some(t) = creds.session_token {
                    headers.add(X_AMZ_SECURITY_TOKEN, t);
                }

                let context = sign_v4_s3(
                    method,
                    &url.path,
                    region,
                    headers,
                    query_params,
                    &creds.access_key,
                    &creds.secret_key,
                    &sha256,
                    date,
                );
                use_signed_trailing.then_some(context)
            } else {
                None
            };

        let mut req = self.http_client.request(method.clone(), url.to_string());

        for (key, values) in headers.iter_all() {
            for value in values {
                req = req.header(key, value);
            }
        }

        if (*method == Method::PUT) || (*method == Method::POST) {
            // Unwrap the Arc when we are the sole owner; else clone the
            // refcounted Bytes handles, not the data.
            let mut segments: Vec<Bytes> = match body {
                Some(v) => match Arc::try_unwrap(v) {
                    Ok(segmented) => segmented.into_iter().collect(),
                    Err(arc) => arc.iter().cloned().collect(),
                },
                None => Vec::new(),
            };
            if trailing.is_some() {
                // The encoder frames each buffer as one chunk; the
                // announced Content-Length assumes chunk-size frames.
                segments = rechunk(segments, default_chunk_size());
            }
            let stream = futures_util::stream::iter(
                segments.into_iter().map(|b| -> Result<_, Error> { Ok(b) }),
            );

            req = match (trailing, chunk_signing_context) {
                (Some(algorithm), Some(context)) => req.body(Body::wrap_stream(
                    SignedAwsChunkedEncoder::new(stream, algorithm, context),
                )),
                (Some(algorithm), None) => {
                    req.body(Body::wrap_stream(AwsChunkedEncoder::new(stream, algorithm)))
                }
                _ => req.body(Body::wrap_stream(stream)),
            };
        }

        let resp = req.send().await?;
        if resp.status().is_success() {
            return Ok(resp);
        }

        let mut resp = resp;
        let status_code = resp.status().as_u16();
        let headers: HeaderMap = mem::take(resp.headers_mut());
        let body: Bytes = resp.bytes().await?;

        let e: S3ErrorResponse = self.shared.create_error_response(
            body,
            status_code,
            headers,
            method,
            &url.path,
            bucket_name,
            object_name,
            retry,
        )?;

        // A stale region cache entry produced this failure; drop it so
        // the next request resolves the region afresh.
        if matches!(e.code(), S3ErrorCode::NoSuchBucket | S3ErrorCode::RetryHead)
            && let Some(v) = bucket_name
        {
            self.shared.region_map.remove(v);
        }

        Err(Error::S3Server(Box::new(e)))
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn execute(
        &self,
        method: Method,
        region: &str,
        headers: &Multimap,
        query_params: &Multimap,
        bucket_name: Option<&str>,
        object_name: Option<&str>,
        body: Option<Arc<SegmentedBytes>>,
        trailing_checksum: Option<ChecksumAlgorithm>,
        use_signed_streaming: bool,
    ) -> Result<reqwest::Response, Error> {
        // Each attempt signs a fresh copy of the caller's headers; the
        // Host, date, content-hash and Authorization entries added while
        // signing must not stack up across attempts.
        let mut attempt_headers = headers.clone();
        let resp = self
            .execute_internal(
                &method,
                region,
                &mut attempt_headers,
                query_params,
                bucket_name,
                object_name,
                body.as_ref().map(Arc::clone),
                trailing_checksum,
                use_signed_streaming,
                true,
            )
            .await;
        match resp {
            Ok(r) => return Ok(r),
            Err(e) => match e {
                Error::S3Server(ref er) => {
                    if !matches!(er.code(), S3ErrorCode::RetryHead) {
                        return Err(e);
                    }
                }
                _ => return Err(e),
            },
        };

        // Retry only once on RetryHead.
        let mut attempt_headers = headers.clone();
        self.execute_internal(
            &method,
            region,
            &mut attempt_headers,
            query_params,
            bucket_name,
            object_name,
            body,
            trailing_checksum,
            use_signed_streaming,
            false,
        )
        .await
    }
}

#[derive(Debug)]
pub(crate) struct SharedClientItems {
    pub(crate) base_url: BaseUrl,
    pub(crate) provider: Option<Arc<dyn Provider + Send + Sync + 'static>>,
    pub(crate) region_map: DashMap<String, String>,
}

impl SharedClientItems {
    fn handle_redirect_response(
        &self,
        status_code: u16,
        method: &Method,
        header_map: &HeaderMap,
        bucket_name: Option<&str>,
        retry: bool,
    ) -> (S3ErrorCode, String) {
        let (mut code, mut message) = match status_code {
            301 => (S3ErrorCode::PermanentRedirect, "Moved Permanently".into()),
            307 => (S3ErrorCode::Redirect, "Temporary redirect".into()),
            _ => (S3ErrorCode::BadRequest, String::from("Bad request")),
        };

        let region: &str = header_map
            .get(X_AMZ_BUCKET_REGION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if !message.is_empty() && !region.is_empty() {
            message.push_str("; use region ");
            message.push_str(region);
        }

        // A redirected HEAD with a cached region means the cache entry
        // went stale; ask for one transparent retry after eviction.
        if retry
            && !region.is_empty()
            && (method == Method::HEAD)
            && let Some(v) = bucket_name
            && self.region_map.contains_key(v)
        {
            code = S3ErrorCode::RetryHead;
            message = String::new();
        }

        (code, message)
    }

    #[allow(clippy::too_many_arguments)]
    fn create_error_response(
        &self,
        body: Bytes,
        http_status_code: u16,
        headers: HeaderMap,
        method: &Method,
        resource: &str,
        bucket_name: Option<&str>,
        object_name: Option<&str>,
        retry: bool,
    ) -> Result<S3ErrorResponse, Error> {
        // If a body is present, it is the standard <Error> XML document.
        if !body.is_empty() {
            let content_type = headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if !content_type.to_lowercase().contains("application/xml") {
                return Err(Error::Xml(format!(
                    "expected content-type 'application/xml' for HTTP {http_status_code} error body, but got '{content_type}'"
                )));
            }
            return S3ErrorResponse::new_from_body(headers, body);
        }

        // No body; decide code and message by status.
        let (code, message) = match http_status_code {
            301 | 307 | 400 => {
                self.handle_redirect_response(http_status_code, method, &headers, bucket_name, retry)
            }
            403 => (S3ErrorCode::AccessDenied, "Access denied".into()),
            404 => match object_name {
                Some(_) => (S3ErrorCode::NoSuchKey, "Object does not exist".into()),
                None => match bucket_name {
                    Some(_) => (S3ErrorCode::NoSuchBucket, "Bucket does not exist".into()),
                    None => (
                        S3ErrorCode::ResourceNotFound,
                        "Request resource not found".into(),
                    ),
                },
            },
            405 | 501 => (
                S3ErrorCode::MethodNotAllowed,
                "The specified method is not allowed against this resource".into(),
            ),
            409 => match bucket_name {
                Some(_) => (S3ErrorCode::NoSuchBucket, "Bucket does not exist".into()),
                None => (
                    S3ErrorCode::ResourceConflict,
                    "Request resource conflicts".into(),
                ),
            },
            412 => (S3ErrorCode::PreconditionFailed, "Precondition failed".into()),
            416 => (
                S3ErrorCode::InvalidRange,
                "The requested range cannot be satisfied".into(),
            ),
            _ => {
                return Err(Error::Network(NetworkError::ServerError(http_status_code)));
            }
        };

        Ok(S3ErrorResponse::new(
            headers,
            code,
            message,
            resource.to_string(),
            bucket_name.map(String::from),
            object_name.map(String::from),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> SharedClientItems {
        SharedClientItems {
            base_url: "http://127.0.0.1:9000".parse().unwrap(),
            provider: None,
            region_map: Default::default(),
        }
    }

    #[test]
    fn bodyless_404_maps_by_specificity() {
        let s = shared();
        let e = s
            .create_error_response(
                Bytes::new(),
                404,
                HeaderMap::new(),
                &Method::GET,
                "/bucket/object",
                Some("bucket"),
                Some("object"),
                true,
            )
            .unwrap();
        assert_eq!(*e.code(), S3ErrorCode::NoSuchKey);

        let e = s
            .create_error_response(
                Bytes::new(),
                404,
                HeaderMap::new(),
                &Method::GET,
                "/bucket",
                Some("bucket"),
                None,
                true,
            )
            .unwrap();
        assert_eq!(*e.code(), S3ErrorCode::NoSuchBucket);

        let e = s
            .create_error_response(
                Bytes::new(),
                404,
                HeaderMap::new(),
                &Method::GET,
                "/",
                None,
                None,
                true,
            )
            .unwrap();
        assert_eq!(*e.code(), S3ErrorCode::ResourceNotFound);
    }

    #[test]
    fn unclassified_status_is_a_network_error() {
        let s = shared();
        let res = s.create_error_response(
            Bytes::new(),
            503,
            HeaderMap::new(),
            &Method::GET,
            "/",
            None,
            None,
            true,
        );
        assert!(matches!(
            res,
            Err(Error::Network(NetworkError::ServerError(503)))
        ));
    }

    #[test]
    fn redirected_head_with_cached_region_asks_for_retry() {
        let s = shared();
        s.region_map
            .insert("bucket".to_string(), "us-east-1".to_string());

        let mut headers = HeaderMap::new();
        headers.insert(X_AMZ_BUCKET_REGION, "eu-west-1".parse().unwrap());

        let (code, message) =
            s.handle_redirect_response(301, &Method::HEAD, &headers, Some("bucket"), true);
        assert_eq!(code, S3ErrorCode::RetryHead);
        assert!(message.is_empty());

        // Second attempt must not loop.
        let (code, _) =
            s.handle_redirect_response(301, &Method::HEAD, &headers, Some("bucket"), false);
        assert_eq!(code, S3ErrorCode::PermanentRedirect);
    }

    #[test]
    fn redirect_message_names_the_advertised_region() {
        let s = shared();
        let mut headers = HeaderMap::new();
        headers.insert(X_AMZ_BUCKET_REGION, "eu-central-1".parse().unwrap());

        let (code, message) =
            s.handle_redirect_response(307, &Method::GET, &headers, Some("bucket"), true);
        assert_eq!(code, S3ErrorCode::Redirect);
        assert!(message.contains("use region eu-central-1"));
    }

    #[test]
    fn xml_error_body_is_parsed() {
        let s = shared();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/xml".parse().unwrap());

        let body = Bytes::from_static(
            b"<Error><Code>AccessDenied</Code><Message>denied</Message></Error>",
        );
        let e = s
            .create_error_response(
                body,
                403,
                headers,
                &Method::GET,
                "/bucket",
                Some("bucket"),
                None,
                true,
            )
            .unwrap();
        assert_eq!(*e.code(), S3ErrorCode::AccessDenied);
        assert_eq!(e.message, "denied");
    }

    #[test]
    fn test_client_targets_a_plain_http_local_endpoint() {
        let client = Client::test_client();
        assert!(!client.is_aws_host());
        assert!(!client.is_secure());
        assert!(client.provider().is_some());
    }

    #[test]
    fn timeout_defaults_leave_the_total_unbounded() {
        use std::time::Duration;

        let t = TimeoutConfig::default();
        assert_eq!(t.connect_timeout, Duration::from_secs(30));
        assert_eq!(t.read_timeout, Duration::from_secs(120));
        assert!(t.request_timeout.is_none());
    }

    #[test]
    fn client_builds_with_custom_timeouts() {
        use std::time::Duration;

        let base_url: BaseUrl = "http://127.0.0.1:9000".parse().unwrap();
        let client = ClientBuilder::new(base_url)
            .timeout_config(
                TimeoutConfig::default()
                    .connect_timeout(Duration::from_secs(5))
                    .read_timeout(Duration::from_secs(10))
                    .request_timeout(Some(Duration::from_secs(60))),
            )
            .build();
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn execute_keeps_signing_headers_out_of_caller_headers() {
        use crate::s3::creds::StaticProvider;

        // Nothing listens on port 1; the attempt fails at the transport,
        // after signing. The caller's map must stay as handed in, so a
        // retried request never carries doubled signing headers.
        let base_url: BaseUrl = "http://127.0.0.1:1".parse().unwrap();
        let client = ClientBuilder::new(base_url)
            .provider(Some(StaticProvider::new("access", "secret", None)))
            .build()
            .unwrap();

        let mut headers = Multimap::new();
        headers.add("x-custom", "kept");
        let query_params = Multimap::new();
        let _ = client
            .execute(
                Method::GET,
                DEFAULT_REGION,
                &headers,
                &query_params,
                Some("bucket"),
                None,
                None,
                None,
                false,
            )
            .await;

        assert!(!headers.contains_key(HOST));
        assert!(!headers.contains_key(X_AMZ_DATE));
        assert!(!headers.contains_key(X_AMZ_CONTENT_SHA256));
        assert!(!headers.contains_key(AUTHORIZATION));
        assert_eq!(headers.get("x-custom"), Some(&"kept".to_string()));
    }
}
