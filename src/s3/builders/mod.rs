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

//! Request builders, one per S3 operation.

mod get_bucket_location;
mod get_presigned_object_url;
mod multipart;
mod put_object_content;

pub use get_bucket_location::GetBucketLocation;
pub use get_presigned_object_url::GetPresignedObjectUrl;
pub use multipart::{
    AbortMultipartUpload, CompleteMultipartUpload, CreateMultipartUpload, PutObject, UploadPart,
};
pub use put_object_content::PutObjectContent;
