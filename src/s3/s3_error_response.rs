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

//! Typed server-side error responses.

use crate::s3::error::Error;
use crate::s3::header_constants::{X_AMZ_ID_2, X_AMZ_REQUEST_ID};
use crate::s3::utils::get_text_opt;
use bytes::{Buf, Bytes};
use http::HeaderMap;
use std::fmt;
use std::str::FromStr;

/// Error codes returned by S3-compatible servers, plus two internal
/// sentinels used by the execution engine: [`S3ErrorCode::Redirect`] /
/// [`S3ErrorCode::PermanentRedirect`] carry the advertised bucket region,
/// and [`S3ErrorCode::RetryHead`] asks for one transparent retry of a HEAD
/// call after a fresh region lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum S3ErrorCode {
    AccessDenied,
    BadRequest,
    BucketAlreadyExists,
    BucketAlreadyOwnedByYou,
    BucketNotEmpty,
    EntityTooLarge,
    EntityTooSmall,
    InternalError,
    InvalidAccessKeyId,
    InvalidPart,
    InvalidPartOrder,
    InvalidRange,
    InvalidRegion,
    MalformedXML,
    MethodNotAllowed,
    NoSuchBucket,
    NoSuchKey,
    NoSuchUpload,
    PermanentRedirect,
    PreconditionFailed,
    Redirect,
    ResourceConflict,
    ResourceNotFound,
    RetryHead,
    SignatureDoesNotMatch,
    SlowDown,
    /// Any code this library has no variant for; the original code string
    /// is preserved.
    OtherError(String),
}

impl S3ErrorCode {
    /// Parses a wire-format code string; unknown codes map to
    /// [`S3ErrorCode::OtherError`].
    pub fn parse(s: &str) -> S3ErrorCode {
        match s.to_lowercase().as_str() {
            "accessdenied" => S3ErrorCode::AccessDenied,
            "badrequest" => S3ErrorCode::BadRequest,
            "bucketalreadyexists" => S3ErrorCode::BucketAlreadyExists,
            "bucketalreadyownedbyyou" => S3ErrorCode::BucketAlreadyOwnedByYou,
            "bucketnotempty" => S3ErrorCode::BucketNotEmpty,
            "entitytoolarge" => S3ErrorCode::EntityTooLarge,
            "entitytoosmall" => S3ErrorCode::EntityTooSmall,
            "internalerror" => S3ErrorCode::InternalError,
            "invalidaccesskeyid" => S3ErrorCode::InvalidAccessKeyId,
            "invalidpart" => S3ErrorCode::InvalidPart,
            "invalidpartorder" => S3ErrorCode::InvalidPartOrder,
            "invalidrange" => S3ErrorCode::InvalidRange,
            "invalidregion" => S3ErrorCode::InvalidRegion,
            "malformedxml" => S3ErrorCode::MalformedXML,
            "methodnotallowed" => S3ErrorCode::MethodNotAllowed,
            "nosuchbucket" => S3ErrorCode::NoSuchBucket,
            "nosuchkey" => S3ErrorCode::NoSuchKey,
            "nosuchupload" => S3ErrorCode::NoSuchUpload,
            "permanentredirect" => S3ErrorCode::PermanentRedirect,
            "preconditionfailed" => S3ErrorCode::PreconditionFailed,
            "redirect" => S3ErrorCode::Redirect,
            "resourceconflict" => S3ErrorCode::ResourceConflict,
            "resourcenotfound" => S3ErrorCode::ResourceNotFound,
            "retryhead" => S3ErrorCode::RetryHead,
            "signaturedoesnotmatch" => S3ErrorCode::SignatureDoesNotMatch,
            "slowdown" => S3ErrorCode::SlowDown,
            _ => S3ErrorCode::OtherError(s.to_string()),
        }
    }
}

impl FromStr for S3ErrorCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(S3ErrorCode::parse(s))
    }
}

impl fmt::Display for S3ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            S3ErrorCode::AccessDenied => "AccessDenied",
            S3ErrorCode::BadRequest => "BadRequest",
            S3ErrorCode::BucketAlreadyExists => "BucketAlreadyExists",
            S3ErrorCode::BucketAlreadyOwnedByYou => "BucketAlreadyOwnedByYou",
            S3ErrorCode::BucketNotEmpty => "BucketNotEmpty",
            S3ErrorCode::EntityTooLarge => "EntityTooLarge",
            S3ErrorCode::EntityTooSmall => "EntityTooSmall",
            S3ErrorCode::InternalError => "InternalError",
            S3ErrorCode::InvalidAccessKeyId => "InvalidAccessKeyId",
            S3ErrorCode::InvalidPart => "InvalidPart",
            S3ErrorCode::InvalidPartOrder => "InvalidPartOrder",
            S3ErrorCode::InvalidRange => "InvalidRange",
            S3ErrorCode::InvalidRegion => "InvalidRegion",
            S3ErrorCode::MalformedXML => "MalformedXML",
            S3ErrorCode::MethodNotAllowed => "MethodNotAllowed",
            S3ErrorCode::NoSuchBucket => "NoSuchBucket",
            S3ErrorCode::NoSuchKey => "NoSuchKey",
            S3ErrorCode::NoSuchUpload => "NoSuchUpload",
            S3ErrorCode::PermanentRedirect => "PermanentRedirect",
            S3ErrorCode::PreconditionFailed => "PreconditionFailed",
            S3ErrorCode::Redirect => "Redirect",
            S3ErrorCode::ResourceConflict => "ResourceConflict",
            S3ErrorCode::ResourceNotFound => "ResourceNotFound",
            S3ErrorCode::RetryHead => "RetryHead",
            S3ErrorCode::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            S3ErrorCode::SlowDown => "SlowDown",
            S3ErrorCode::OtherError(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

/// A typed S3 fault: code, message, resource, and the request/host ids the
/// server attached for tracing.
#[derive(Clone, Debug, thiserror::Error)]
#[error("S3 operation failed; code: {code}, message: {message}")]
pub struct S3ErrorResponse {
    pub headers: HeaderMap,
    pub code: S3ErrorCode,
    pub message: String,
    pub resource: String,
    pub request_id: String,
    pub host_id: String,
    pub bucket_name: Option<String>,
    pub object_name: Option<String>,
}

impl S3ErrorResponse {
    pub fn new(
        headers: HeaderMap,
        code: S3ErrorCode,
        message: String,
        resource: String,
        bucket_name: Option<String>,
        object_name: Option<String>,
    ) -> Self {
        let request_id = header_value(&headers, X_AMZ_REQUEST_ID);
        let host_id = header_value(&headers, X_AMZ_ID_2);
        Self {
            headers,
            code,
            message,
            resource,
            request_id,
            host_id,
            bucket_name,
            object_name,
        }
    }

    /// Parses the standard `<Error>` XML document returned with 4xx/5xx
    /// statuses.
    pub fn new_from_body(headers: HeaderMap, body: Bytes) -> Result<Self, Error> {
        let root = xmltree::Element::parse(body.reader())?;

        let code = match get_text_opt(&root, "Code") {
            Some(c) => S3ErrorCode::parse(&c),
            None => S3ErrorCode::OtherError(String::new()),
        };
        let message = get_text_opt(&root, "Message").unwrap_or_default();
        let resource = get_text_opt(&root, "Resource").unwrap_or_default();
        let bucket_name = get_text_opt(&root, "BucketName");
        let object_name = get_text_opt(&root, "Key");

        Ok(Self::new(
            headers,
            code,
            message,
            resource,
            bucket_name,
            object_name,
        ))
    }

    pub fn code(&self) -> &S3ErrorCode {
        &self.code
    }
}

fn header_value(headers: &HeaderMap, key: &str) -> String {
    headers
        .get(key)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_through_display() {
        let codes = [
            "AccessDenied",
            "NoSuchBucket",
            "NoSuchKey",
            "MethodNotAllowed",
            "PreconditionFailed",
            "InvalidRange",
            "RetryHead",
            "PermanentRedirect",
        ];
        for c in codes {
            assert_eq!(S3ErrorCode::parse(c).to_string(), c);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(S3ErrorCode::parse("nosuchbucket"), S3ErrorCode::NoSuchBucket);
        assert_eq!(S3ErrorCode::parse("NOSUCHKEY"), S3ErrorCode::NoSuchKey);
    }

    #[test]
    fn unknown_code_is_preserved() {
        let code = S3ErrorCode::parse("SomeVendorSpecificCode");
        assert_eq!(
            code,
            S3ErrorCode::OtherError("SomeVendorSpecificCode".to_string())
        );
        assert_eq!(code.to_string(), "SomeVendorSpecificCode");
    }

    #[test]
    fn error_body_parses() {
        let body = Bytes::from_static(
            b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
              <Error><Code>NoSuchKey</Code>\
              <Message>The resource you requested does not exist</Message>\
              <Resource>/mybucket/myfoto.jpg</Resource>\
              <RequestId>4442587FB7D0A2F9</RequestId></Error>",
        );
        let resp = S3ErrorResponse::new_from_body(HeaderMap::new(), body).unwrap();
        assert_eq!(resp.code, S3ErrorCode::NoSuchKey);
        assert_eq!(resp.message, "The resource you requested does not exist");
        assert_eq!(resp.resource, "/mybucket/myfoto.jpg");
    }
}
