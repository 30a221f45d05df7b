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

//! AWS Signature Version 4 signing.
//!
//! A pure pipeline: canonicalize, hash, derive the signing key, HMAC,
//! format. Three entry points cover the header-signed, query-presigned and
//! streaming-chunk variants.

use crate::s3::header_constants::{
    X_AMZ_ALGORITHM, X_AMZ_CREDENTIAL, X_AMZ_DATE, X_AMZ_EXPIRES, X_AMZ_SIGNATURE,
    X_AMZ_SIGNED_HEADERS,
};
use crate::s3::multimap::{CANONICAL_IGNORED_HEADERS, Multimap, MultimapExt};
use crate::s3::utils::{EMPTY_SHA256, UtcTime, hex_encode, sha256_hash, to_amz_date, to_signer_date};
use hmac::{Hmac, Mac};
use http::Method;
use sha2::Sha256;
use std::sync::Arc;

const SIGN_V4_ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SIGN_V4_CHUNK_ALGORITHM: &str = "AWS4-HMAC-SHA256-PAYLOAD";
const SIGN_V4_TRAILER_ALGORITHM: &str = "AWS4-HMAC-SHA256-TRAILER";

type HmacSha256 = Hmac<Sha256>;

fn hmac_hash(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(key).expect("HMAC can take a key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Scope string `yyyyMMdd/region/service/aws4_request`.
pub fn get_scope(date: UtcTime, region: &str, service_name: &str) -> String {
    format!(
        "{}/{}/{}/aws4_request",
        to_signer_date(date),
        region,
        service_name
    )
}

fn get_canonical_request_hash(
    method: &Method,
    uri: &str,
    query_string: &str,
    headers: &str,
    signed_headers: &str,
    content_sha256: &str,
) -> String {
    let canonical_request =
        format!("{method}\n{uri}\n{query_string}\n{headers}\n\n{signed_headers}\n{content_sha256}");
    sha256_hash(canonical_request.as_bytes())
}

fn get_string_to_sign(date: UtcTime, scope: &str, canonical_request_hash: &str) -> String {
    format!(
        "{SIGN_V4_ALGORITHM}\n{}\n{scope}\n{canonical_request_hash}",
        to_amz_date(date)
    )
}

/// Derives the scoped signing key
/// `HMAC(HMAC(HMAC(HMAC("AWS4"+secret, date), region), service), "aws4_request")`.
pub fn get_signing_key(
    secret_key: &str,
    date: UtcTime,
    region: &str,
    service_name: &str,
) -> Vec<u8> {
    let date_key = hmac_hash(
        format!("AWS4{secret_key}").as_bytes(),
        to_signer_date(date).as_bytes(),
    );
    let date_region_key = hmac_hash(&date_key, region.as_bytes());
    let date_region_service_key = hmac_hash(&date_region_key, service_name.as_bytes());
    hmac_hash(&date_region_service_key, b"aws4_request")
}

pub fn get_signature(signing_key: &[u8], string_to_sign: &str) -> String {
    hex_encode(&hmac_hash(signing_key, string_to_sign.as_bytes()))
}

fn get_authorization(
    access_key: &str,
    scope: &str,
    signed_headers: &str,
    signature: &str,
) -> String {
    format!(
        "{SIGN_V4_ALGORITHM} Credential={access_key}/{scope},SignedHeaders={signed_headers},Signature={signature}"
    )
}

/// State carried from header signing into streaming chunk signatures.
/// Chunks must be signed, and transmitted, strictly in order; each
/// signature chains from the previous one starting at `seed_signature`.
#[derive(Clone, Debug)]
pub struct ChunkSigningContext {
    pub signing_key: Arc<[u8]>,
    pub date: UtcTime,
    pub scope: String,
    pub seed_signature: String,
}

/// Signs a request for the given service, adding the `Authorization`
/// header, and returns the context needed to sign any streaming chunks
/// that follow.
pub fn sign_v4(
    service_name: &str,
    method: &Method,
    uri: &str,
    region: &str,
    headers: &mut Multimap,
    query_params: &Multimap,
    access_key: &str,
    secret_key: &str,
    content_sha256: &str,
    date: UtcTime,
) -> ChunkSigningContext {
    let scope = get_scope(date, region, service_name);
    let (signed_headers, canonical_headers) =
        headers.to_canonical_headers(CANONICAL_IGNORED_HEADERS);
    let canonical_query_string = query_params.to_canonical_query_string();
    let canonical_request_hash = get_canonical_request_hash(
        method,
        uri,
        &canonical_query_string,
        &canonical_headers,
        &signed_headers,
        content_sha256,
    );
    let string_to_sign = get_string_to_sign(date, &scope, &canonical_request_hash);
    let signing_key = get_signing_key(secret_key, date, region, service_name);
    let signature = get_signature(&signing_key, &string_to_sign);
    let authorization = get_authorization(access_key, &scope, &signed_headers, &signature);
    headers.add("Authorization", authorization);

    ChunkSigningContext {
        signing_key: signing_key.into(),
        date,
        scope,
        seed_signature: signature,
    }
}

/// Signs a request against the S3 service.
pub fn sign_v4_s3(
    method: &Method,
    uri: &str,
    region: &str,
    headers: &mut Multimap,
    query_params: &Multimap,
    access_key: &str,
    secret_key: &str,
    content_sha256: &str,
    date: UtcTime,
) -> ChunkSigningContext {
    sign_v4(
        "s3",
        method,
        uri,
        region,
        headers,
        query_params,
        access_key,
        secret_key,
        content_sha256,
        date,
    )
}

/// Signs a request against the STS service.
pub fn sign_v4_sts(
    method: &Method,
    uri: &str,
    region: &str,
    headers: &mut Multimap,
    query_params: &Multimap,
    access_key: &str,
    secret_key: &str,
    content_sha256: &str,
    date: UtcTime,
) -> ChunkSigningContext {
    sign_v4(
        "sts",
        method,
        uri,
        region,
        headers,
        query_params,
        access_key,
        secret_key,
        content_sha256,
        date,
    )
}

/// Signs one streaming chunk, chaining from the previous chunk's
/// signature.
pub fn sign_chunk(
    context: &ChunkSigningContext,
    previous_signature: &str,
    chunk_sha256: &str,
) -> String {
    let string_to_sign = format!(
        "{SIGN_V4_CHUNK_ALGORITHM}\n{}\n{}\n{previous_signature}\n{EMPTY_SHA256}\n{chunk_sha256}",
        to_amz_date(context.date),
        context.scope,
    );
    get_signature(&context.signing_key, &string_to_sign)
}

/// Signs the trailer of a streaming upload, chaining from the final
/// chunk's signature.
pub fn sign_trailer(
    context: &ChunkSigningContext,
    previous_signature: &str,
    trailer_sha256: &str,
) -> String {
    let string_to_sign = format!(
        "{SIGN_V4_TRAILER_ALGORITHM}\n{}\n{}\n{previous_signature}\n{trailer_sha256}",
        to_amz_date(context.date),
        context.scope,
    );
    get_signature(&context.signing_key, &string_to_sign)
}

/// Presigns a URL by embedding the signature in `query_params`. The
/// payload is left unsigned; expiry is caller-supplied seconds with no
/// server round trip.
pub fn presign_v4(
    method: &Method,
    host: &str,
    uri: &str,
    region: &str,
    query_params: &mut Multimap,
    access_key: &str,
    secret_key: &str,
    date: UtcTime,
    expires: u32,
) {
    let scope = get_scope(date, region, "s3");
    let canonical_headers = format!("host:{host}");
    let signed_headers = "host";

    query_params.add(X_AMZ_ALGORITHM, SIGN_V4_ALGORITHM);
    query_params.add(X_AMZ_CREDENTIAL, format!("{access_key}/{scope}"));
    query_params.add(X_AMZ_DATE, to_amz_date(date));
    query_params.add(X_AMZ_EXPIRES, expires.to_string());
    query_params.add(X_AMZ_SIGNED_HEADERS, signed_headers);

    let canonical_query_string = query_params.to_canonical_query_string();
    let canonical_request_hash = get_canonical_request_hash(
        method,
        uri,
        &canonical_query_string,
        &canonical_headers,
        signed_headers,
        "UNSIGNED-PAYLOAD",
    );
    let string_to_sign = get_string_to_sign(date, &scope, &canonical_request_hash);
    let signing_key = get_signing_key(secret_key, date, region, "s3");
    let signature = get_signature(&signing_key, &string_to_sign);

    query_params.add(X_AMZ_SIGNATURE, signature);
}

/// Signs a POST-policy form; the caller supplies the base64 policy as the
/// string to sign.
pub fn post_presign_v4(
    string_to_sign: &str,
    secret_key: &str,
    date: UtcTime,
    region: &str,
) -> String {
    let signing_key = get_signing_key(secret_key, date, region, "s3");
    get_signature(&signing_key, string_to_sign)
}
