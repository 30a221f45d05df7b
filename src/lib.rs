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

//! # Stratus
//!
//! An async client engine for Amazon S3 and S3-compatible object storage.
//!
//! This crate implements the shared machinery every S3 operation rides on:
//! SigV4 request signing (header, presigned-query and streaming-chunk
//! variants), endpoint resolution and addressing-style selection, streaming
//! checksums, multipart-upload orchestration, and an async execution engine
//! with a bucket-to-region cache.
//!
//! Operations are exposed as request builders (e.g.
//! [`s3::builders::PutObjectContent`], [`s3::builders::CreateMultipartUpload`]).
//! All builders implement the [`s3::types::S3Api`] trait, whose async
//! [`send`](crate::s3::types::S3Api::send) method executes the request and
//! returns a typed response.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use stratus::s3::Client;
//! use stratus::s3::creds::StaticProvider;
//! use stratus::s3::response::PutObjectContentResponse;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::builder("https://play.min.io".parse().unwrap())
//!         .provider(Some(StaticProvider::new("minioadmin", "minioadmin", None)))
//!         .build()
//!         .unwrap();
//!
//!     let resp: PutObjectContentResponse = client
//!         .put_object_content("my-bucket", "my-object", "hello world")
//!         .send()
//!         .await
//!         .expect("request failed");
//!
//!     println!("uploaded, etag: {}", resp.etag);
//! }
//! ```
//!
//! ## Design
//! - Each API method on [`s3::Client`] returns a builder struct
//! - Builders implement [`s3::types::ToS3Request`] for request conversion and
//!   [`s3::types::S3Api`] for execution
//! - Responses implement [`s3::types::FromS3Response`] for consistent
//!   deserialization

#![allow(clippy::result_large_err)]
#![allow(clippy::too_many_arguments)]
pub mod s3;

#[cfg(test)]
#[macro_use]
extern crate quickcheck;
