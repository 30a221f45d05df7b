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

//! Endpoint resolution: base-URL parsing, AWS host detection, and
//! per-request URL construction with addressing-style selection.

use crate::s3::error::ValidationErr;
use crate::s3::multimap::{Multimap, MultimapExt};
use crate::s3::utils::{match_hostname, urlencode_object_key};
use hyper::Uri;
use hyper::http::Method;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_REGION: &str = "us-east-1";

const AWS_S3_PREFIX: &str = r"^(((bucket\.|accesspoint\.)vpce(-[a-z_\d]+)+\.s3\.)|([a-z_\d-]{1,63}\.)s3-control(-[a-z_\d]+)*\.|(s3(-[a-z_\d]+)*\.))";

// Legacy hostnames that predate the regional naming scheme; used verbatim.
const LEGACY_AWS_HOSTS: &[&str] = &[
    "s3-external-1.amazonaws.com",
    "s3-us-gov-west-1.amazonaws.com",
    "s3-fips-us-gov-west-1.amazonaws.com",
];

lazy_static! {
    static ref AWS_ELB_ENDPOINT_REGEX: Regex =
        Regex::new(r"^[a-z_\d-]{1,63}\.[a-z_\d-]{1,63}\.elb\.amazonaws\.com$").unwrap();
    static ref AWS_S3_PREFIX_REGEX: Regex = Regex::new(AWS_S3_PREFIX).unwrap();
    static ref AWS_ENDPOINT_REGEX: Regex = Regex::new(r".*\.amazonaws\.com(|\.cn)$").unwrap();
    static ref AWS_S3_ENDPOINT_REGEX: Regex = Regex::new(
        &(AWS_S3_PREFIX.to_string() + r"([a-z_\d-]{1,63}\.)*amazonaws\.com(|\.cn)$")
    )
    .unwrap();
}

fn is_legacy_aws_host(host: &str) -> bool {
    LEGACY_AWS_HOSTS.iter().any(|h| host.eq_ignore_ascii_case(h))
}

/// Represents HTTP URL
#[derive(Clone, Debug)]
pub struct Url {
    pub https: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query: Multimap,
}

impl Url {
    /// Value for the `Host` header; includes the port only when it is
    /// non-default.
    pub fn host_header_value(&self) -> String {
        if self.port > 0 {
            return format!("{}:{}", self.host, self.port);
        }
        self.host.clone()
    }
}

impl Default for Url {
    fn default() -> Self {
        Self {
            https: true,
            host: String::default(),
            port: 0,
            path: String::default(),
            query: Multimap::default(),
        }
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.host.is_empty() {
            return Err(std::fmt::Error);
        }

        f.write_str(if self.https { "https://" } else { "http://" })?;

        if self.port > 0 {
            write!(f, "{}:{}", self.host, self.port)?;
        } else {
            f.write_str(&self.host)?;
        }

        if !self.path.starts_with('/') {
            f.write_str("/")?;
        }
        f.write_str(&self.path)?;

        if !self.query.is_empty() {
            f.write_str("?")?;
            f.write_str(&self.query.to_query_string())?;
        }

        Ok(())
    }
}

pub fn match_aws_endpoint(value: &str) -> bool {
    AWS_ENDPOINT_REGEX.is_match(value.to_lowercase().as_str())
}

pub fn match_aws_s3_endpoint(value: &str) -> bool {
    let lvalue = value.to_lowercase();

    if !AWS_S3_ENDPOINT_REGEX.is_match(&lvalue) {
        return false;
    }

    // The regex alone admits label edge cases; reject them here.
    for token in lvalue.split('.') {
        if token.starts_with('-')
            || token.starts_with('_')
            || token.ends_with('-')
            || token.ends_with('_')
            || token.starts_with("vpce-_")
            || token.starts_with("s3-control-_")
            || token.starts_with("s3-_")
        {
            return false;
        }
    }

    true
}

/// What AWS-host detection learned about an endpoint host.
#[derive(Clone, Debug, Default)]
struct AwsHostInfo {
    region: String,
    s3_prefix: String,
    domain_suffix: String,
    dualstack: bool,
}

/// Inspects a host for AWS naming patterns. Non-AWS hosts yield an empty
/// info; recognizably-AWS hosts that do not fit the S3 naming scheme are
/// rejected.
fn get_aws_info(host: &str, https: bool, region: &str) -> Result<AwsHostInfo, ValidationErr> {
    let mut info = AwsHostInfo::default();

    if !match_hostname(host) {
        return Ok(info);
    }

    if AWS_ELB_ENDPOINT_REGEX.is_match(host) {
        // ELB endpoints carry the region in their last label before the
        // elb.amazonaws.com suffix.
        let prefix = &host[..host.rfind(".elb.amazonaws.com").unwrap()];
        info.region = prefix[prefix.rfind('.').map_or(0, |i| i + 1)..].to_string();
        return Ok(info);
    }

    if !match_aws_endpoint(host) {
        return Ok(info);
    }

    if !match_aws_s3_endpoint(host) {
        return Err(ValidationErr::UrlBuildError(format!(
            "invalid Amazon AWS host {host}"
        )));
    }

    let matched = AWS_S3_PREFIX_REGEX.find(host).unwrap();
    let s3_prefix = &host[..matched.end()];

    if s3_prefix.contains("s3-accesspoint") && !https {
        return Err(ValidationErr::UrlBuildError(format!(
            "use HTTPS scheme for host {host}"
        )));
    }

    let mut tokens: Vec<&str> = host[matched.end()..].split('.').collect();
    info.dualstack = tokens[0].eq_ignore_ascii_case("dualstack");
    if info.dualstack {
        tokens.remove(0);
    }

    let mut region_in_host = String::new();
    if tokens[0] != "vpce" && tokens[0] != "amazonaws" {
        region_in_host = tokens[0].to_string();
        tokens.remove(0);
    }

    let domain_suffix = tokens.join(".");

    if host.eq_ignore_ascii_case("s3-external-1.amazonaws.com") {
        region_in_host = DEFAULT_REGION.to_string();
    }
    if host.eq_ignore_ascii_case("s3-us-gov-west-1.amazonaws.com")
        || host.eq_ignore_ascii_case("s3-fips-us-gov-west-1.amazonaws.com")
    {
        region_in_host = "us-gov-west-1".to_string();
    }

    if domain_suffix.ends_with(".cn")
        && !s3_prefix.ends_with("s3-accelerate.")
        && region_in_host.is_empty()
        && region.is_empty()
    {
        return Err(ValidationErr::RegionRequired(host.to_string()));
    }

    info.region = region_in_host;
    info.s3_prefix = s3_prefix.to_string();
    info.domain_suffix = domain_suffix;

    Ok(info)
}

/// Represents Base URL of S3 endpoint
#[derive(Clone, Debug)]
pub struct BaseUrl {
    pub https: bool,
    host: String,
    port: u16,
    pub region: String,
    aws_s3_prefix: String,
    aws_domain_suffix: String,
    dualstack: bool,
    virtual_style: bool,
}

impl Default for BaseUrl {
    fn default() -> Self {
        Self {
            https: true,
            host: "127.0.0.1".to_string(),
            port: 9000,
            region: String::new(),
            aws_s3_prefix: String::new(),
            aws_domain_suffix: String::new(),
            dualstack: false,
            virtual_style: false,
        }
    }
}

impl FromStr for BaseUrl {
    type Err = ValidationErr;

    /// Converts a string to a BaseUrl.
    ///
    /// Accepts a bare host or IP (with optional port), or an http/https URL
    /// with an empty path and no query.
    ///
    /// # Examples
    ///
    /// ```
    /// use stratus::s3::http::BaseUrl;
    /// use std::str::FromStr;
    ///
    /// let base_url = "play.min.io".parse::<BaseUrl>().unwrap();
    /// let base_url = BaseUrl::from_str("play.min.io").unwrap();
    /// let base_url: BaseUrl = "play.min.io:9000".parse().unwrap();
    /// let base_url: BaseUrl = "http://192.168.124.63:9000".parse().unwrap();
    /// let base_url: BaseUrl = "[0:0:0:0:0:ffff:c0a8:7c3f]:9000".parse().unwrap();
    /// ```
    fn from_str(s: &str) -> Result<Self, ValidationErr> {
        let url = s
            .parse::<Uri>()
            .map_err(|e| ValidationErr::InvalidBaseUrl(e.to_string()))?;

        let https = match url.scheme() {
            None => true,
            Some(scheme) => match scheme.as_str() {
                "http" => false,
                "https" => true,
                _ => {
                    return Err(ValidationErr::InvalidBaseUrl(
                        "scheme must be http or https".into(),
                    ));
                }
            },
        };

        let mut host = match url.host() {
            Some(h) => h,
            _ => {
                return Err(ValidationErr::InvalidBaseUrl(
                    "valid host must be provided".into(),
                ));
            }
        };

        let ipv6host = format!("[{host}]");
        if host.parse::<std::net::Ipv6Addr>().is_ok() {
            host = &ipv6host;
        }

        let mut port = url.port().map_or(0u16, |p| p.as_u16());
        if (https && port == 443) || (!https && port == 80) {
            port = 0;
        }

        if url.path() != "/" && !url.path().is_empty() {
            return Err(ValidationErr::InvalidBaseUrl(
                "path must be empty for base URL".into(),
            ));
        }

        if url.query().is_some() {
            return Err(ValidationErr::InvalidBaseUrl(
                "query must be none for base URL".into(),
            ));
        }

        let info = get_aws_info(host, https, "")?;
        let virtual_style = !info.domain_suffix.is_empty() || host.ends_with("aliyuncs.com");

        Ok(BaseUrl {
            https,
            host: host.to_string(),
            port,
            region: info.region,
            aws_s3_prefix: info.s3_prefix,
            aws_domain_suffix: info.domain_suffix,
            dualstack: info.dualstack,
            virtual_style,
        })
    }
}

impl BaseUrl {
    /// Checks base URL is AWS host
    pub fn is_aws_host(&self) -> bool {
        !self.aws_domain_suffix.is_empty()
    }

    pub fn dualstack(&self) -> bool {
        self.dualstack
    }

    pub fn virtual_style(&self) -> bool {
        self.virtual_style
    }

    /// Enables or disables dual-stack (IPv4 + IPv6) hosts. Ignored for
    /// non-AWS endpoints.
    pub fn enable_dualstack(&mut self, enable: bool) {
        if self.is_aws_host() {
            self.dualstack = enable;
        }
    }

    /// Enables or disables transfer acceleration. Ignored for non-AWS
    /// endpoints and for the legacy verbatim hosts.
    pub fn enable_accelerate(&mut self, enable: bool) {
        if !self.is_aws_host() || is_legacy_aws_host(&(self.aws_s3_prefix.clone() + &self.aws_domain_suffix)) {
            return;
        }
        if enable && !self.aws_s3_prefix.contains("s3-accelerate") {
            self.aws_s3_prefix = self.aws_s3_prefix.replacen("s3.", "s3-accelerate.", 1);
        } else if !enable {
            self.aws_s3_prefix = self.aws_s3_prefix.replacen("s3-accelerate.", "s3.", 1);
        }
    }

    /// Enables or disables virtual-style addressing for non-AWS endpoints;
    /// AWS endpoints are always virtual-style unless a rule forces
    /// path-style for a particular request.
    pub fn enable_virtual_style(&mut self, enable: bool) {
        self.virtual_style = enable || self.is_aws_host();
    }

    fn build_aws_url(
        &self,
        url: &mut Url,
        bucket_name: &str,
        enforce_path_style: bool,
        region: &str,
    ) -> Result<(), ValidationErr> {
        let full_host = self.aws_s3_prefix.clone() + &self.aws_domain_suffix;
        if is_legacy_aws_host(&full_host) {
            url.host = full_host;
            return Ok(());
        }

        let mut host = self.aws_s3_prefix.clone();
        if self.aws_s3_prefix.contains("s3-accelerate") {
            if bucket_name.contains('.') {
                return Err(ValidationErr::DottedBucketWithAccelerate);
            }

            if enforce_path_style {
                host = host.replacen("-accelerate", "", 1);
            }
        }

        if self.dualstack {
            host.push_str("dualstack.");
        }
        if !self.aws_s3_prefix.contains("s3-accelerate") {
            host.push_str(region);
            host.push('.');
        }
        host.push_str(&self.aws_domain_suffix);

        url.host = host;

        Ok(())
    }

    fn build_list_buckets_url(&self, url: &mut Url, region: &str) {
        if self.aws_domain_suffix.is_empty() {
            return;
        }

        let full_host = self.aws_s3_prefix.clone() + &self.aws_domain_suffix;
        if is_legacy_aws_host(&full_host) {
            url.host = full_host;
            return;
        }

        let mut s3_prefix = self.aws_s3_prefix.clone();
        let mut domain_suffix = self.aws_domain_suffix.clone();
        if s3_prefix.starts_with("s3.") || s3_prefix.starts_with("s3-") {
            s3_prefix = "s3.".to_string();
            domain_suffix = "amazonaws.com".to_string();
            if self.aws_domain_suffix.ends_with(".cn") {
                domain_suffix.push_str(".cn");
            }
        }
        url.host = s3_prefix + region + "." + &domain_suffix;
    }

    /// Builds URL from base URL for given parameters for S3 operation
    pub fn build_url(
        &self,
        method: &Method,
        region: &str,
        query: &Multimap,
        bucket_name: Option<&str>,
        object_name: Option<&str>,
    ) -> Result<Url, ValidationErr> {
        let mut url = Url {
            https: self.https,
            host: self.host.clone(),
            port: self.port,
            path: String::from("/"),
            query: query.clone(),
        };

        let bucket: &str = match bucket_name {
            None => {
                self.build_list_buckets_url(&mut url, region);
                return Ok(url);
            }
            Some(v) => v,
        };

        // CreateBucket requires path style in Amazon AWS S3, as does
        // GetBucketLocation; a '.' in the bucket name breaks TLS
        // certificate validation under virtual style.
        let enforce_path_style = (method == Method::PUT
            && object_name.is_none()
            && query.is_empty())
            || query.contains_key("location")
            || (bucket.contains('.') && self.https);

        if !self.aws_domain_suffix.is_empty() {
            self.build_aws_url(&mut url, bucket, enforce_path_style, region)?;
        }

        let mut host = url.host.clone();
        let mut path = String::new();

        if enforce_path_style || !self.virtual_style {
            path.push('/');
            path.push_str(bucket);
        } else {
            host = format!("{}.{}", bucket, url.host);
        }

        if let Some(v) = object_name {
            if !v.starts_with('/') {
                path.push('/');
            }
            path.push_str(&urlencode_object_key(v));
        }

        url.host = host;
        url.path = path;

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(s: &str) -> BaseUrl {
        s.parse::<BaseUrl>().unwrap()
    }

    #[test]
    fn parse_rejects_path_and_query() {
        assert!("https://s3.amazonaws.com/bucket".parse::<BaseUrl>().is_err());
        assert!("https://s3.amazonaws.com?x=1".parse::<BaseUrl>().is_err());
        assert!("ftp://example.com".parse::<BaseUrl>().is_err());
    }

    #[test]
    fn parse_normalizes_default_ports() {
        let b = base("https://example.com:443");
        let url = b
            .build_url(&Method::GET, "us-east-1", &Multimap::new(), Some("bkt"), None)
            .unwrap();
        assert_eq!(url.host_header_value(), "example.com");

        let b = base("http://example.com:8080");
        let url = b
            .build_url(&Method::GET, "us-east-1", &Multimap::new(), Some("bkt"), None)
            .unwrap();
        assert_eq!(url.host_header_value(), "example.com:8080");
    }

    #[test]
    fn elb_host_yields_region() {
        let b = base("my-load-balancer.us-west-2.elb.amazonaws.com");
        assert_eq!(b.region, "us-west-2");
        assert!(!b.is_aws_host());
    }

    #[test]
    fn standard_aws_host_detected() {
        let b = base("s3.us-east-2.amazonaws.com");
        assert!(b.is_aws_host());
        assert_eq!(b.region, "us-east-2");
        assert!(b.virtual_style());
    }

    #[test]
    fn virtual_style_host_assembly() {
        let b = base("https://s3.amazonaws.com");
        let url = b
            .build_url(
                &Method::GET,
                "us-west-2",
                &Multimap::new(),
                Some("bucket"),
                Some("object"),
            )
            .unwrap();
        assert_eq!(url.host, "bucket.s3.us-west-2.amazonaws.com");
        assert_eq!(url.path, "/object");
    }

    #[test]
    fn dotted_bucket_forces_path_style_under_https() {
        let b = base("https://s3.amazonaws.com");
        let url = b
            .build_url(
                &Method::GET,
                "us-east-1",
                &Multimap::new(),
                Some("my.bucket"),
                Some("object"),
            )
            .unwrap();
        assert_eq!(url.host, "s3.us-east-1.amazonaws.com");
        assert_eq!(url.path, "/my.bucket/object");
    }

    #[test]
    fn dotted_bucket_virtual_style_under_http() {
        let b = base("http://s3.amazonaws.com");
        let url = b
            .build_url(
                &Method::GET,
                "us-east-1",
                &Multimap::new(),
                Some("my.bucket"),
                Some("object"),
            )
            .unwrap();
        assert_eq!(url.host, "my.bucket.s3.us-east-1.amazonaws.com");
    }

    #[test]
    fn bucket_creation_put_forces_path_style() {
        let b = base("https://s3.amazonaws.com");
        let url = b
            .build_url(&Method::PUT, "us-east-1", &Multimap::new(), Some("newbucket"), None)
            .unwrap();
        assert_eq!(url.host, "s3.us-east-1.amazonaws.com");
        assert_eq!(url.path, "/newbucket");
    }

    #[test]
    fn location_query_forces_path_style() {
        let b = base("https://s3.amazonaws.com");
        let mut query = Multimap::new();
        query.add("location", "");
        let url = b
            .build_url(&Method::GET, "us-east-1", &query, Some("bucket"), None)
            .unwrap();
        assert_eq!(url.host, "s3.us-east-1.amazonaws.com");
        assert_eq!(url.path, "/bucket");
    }

    #[test]
    fn accelerate_rejects_dotted_bucket() {
        let b = base("https://s3-accelerate.amazonaws.com");
        let err = b.build_url(
            &Method::GET,
            "us-east-1",
            &Multimap::new(),
            Some("my.bucket"),
            Some("object"),
        );
        assert!(matches!(
            err,
            Err(ValidationErr::DottedBucketWithAccelerate)
        ));
    }

    #[test]
    fn accelerate_host_has_no_region() {
        let b = base("https://s3-accelerate.amazonaws.com");
        let url = b
            .build_url(
                &Method::GET,
                "us-east-1",
                &Multimap::new(),
                Some("bucket"),
                Some("object"),
            )
            .unwrap();
        assert_eq!(url.host, "bucket.s3-accelerate.amazonaws.com");
    }

    #[test]
    fn dualstack_host_assembly() {
        let mut b = base("https://s3.us-east-1.amazonaws.com");
        b.enable_dualstack(true);
        let url = b
            .build_url(
                &Method::GET,
                "us-east-1",
                &Multimap::new(),
                Some("bucket"),
                Some("object"),
            )
            .unwrap();
        assert_eq!(url.host, "bucket.s3.dualstack.us-east-1.amazonaws.com");
    }

    #[test]
    fn legacy_hosts_used_verbatim() {
        let b = base("https://s3-external-1.amazonaws.com");
        assert_eq!(b.region, "us-east-1");
        let url = b
            .build_url(
                &Method::GET,
                "us-east-1",
                &Multimap::new(),
                Some("bucket"),
                Some("object"),
            )
            .unwrap();
        assert_eq!(url.host, "bucket.s3-external-1.amazonaws.com");

        let b = base("https://s3-us-gov-west-1.amazonaws.com");
        assert_eq!(b.region, "us-gov-west-1");
    }

    #[test]
    fn list_buckets_rewrites_aws_host() {
        let b = base("https://s3.us-west-1.amazonaws.com");
        let url = b
            .build_url(&Method::GET, "us-west-1", &Multimap::new(), None, None)
            .unwrap();
        assert_eq!(url.host, "s3.us-west-1.amazonaws.com");
        assert_eq!(url.path, "/");
    }

    #[test]
    fn china_endpoint_requires_region() {
        assert!("s3.amazonaws.com.cn".parse::<BaseUrl>().is_err());
        let b = base("s3.cn-north-1.amazonaws.com.cn");
        assert_eq!(b.region, "cn-north-1");
    }

    #[test]
    fn non_aws_host_stays_path_style() {
        let b = base("http://localhost:9000");
        let url = b
            .build_url(
                &Method::GET,
                "us-east-1",
                &Multimap::new(),
                Some("bucket"),
                Some("dir/object name.txt"),
            )
            .unwrap();
        assert_eq!(url.host_header_value(), "localhost:9000");
        assert_eq!(url.path, "/bucket/dir/object%20name.txt");
        assert_eq!(
            url.to_string(),
            "http://localhost:9000/bucket/dir/object%20name.txt"
        );
    }

    #[test]
    fn accelerate_toggle() {
        let mut b = base("https://s3.us-east-1.amazonaws.com");
        b.enable_accelerate(true);
        let url = b
            .build_url(
                &Method::GET,
                "us-east-1",
                &Multimap::new(),
                Some("bucket"),
                Some("o"),
            )
            .unwrap();
        assert_eq!(url.host, "bucket.s3-accelerate.amazonaws.com");

        b.enable_accelerate(false);
        let url = b
            .build_url(
                &Method::GET,
                "us-east-1",
                &Multimap::new(),
                Some("bucket"),
                Some("o"),
            )
            .unwrap();
        assert_eq!(url.host, "bucket.s3.us-east-1.amazonaws.com");
    }
}
