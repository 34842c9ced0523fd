// Copyright Elasticsearch B.V. and/or licensed to Elasticsearch B.V. under one
// or more contributor license agreements. See the NOTICE file distributed with
// this work for additional information regarding copyright
// ownership. Elasticsearch B.V. licenses this file to you under
// the Apache License, Version 2.0 (the "License"); you may
// not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Messages of the `parca.debuginfo.v1alpha1` protocol.
//!
//! Only the subset used by the uploader is declared here.

/// Fully qualified gRPC service name.
pub const SERVICE: &str = "parca.debuginfo.v1alpha1.DebuginfoService";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ShouldInitiateUploadRequest {
    #[prost(string, tag = "1")]
    pub build_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub hash: ::prost::alloc::string::String,
    #[prost(bool, tag = "3")]
    pub force: bool,
    #[prost(enumeration = "DebuginfoType", tag = "4")]
    pub r#type: i32,
    #[prost(enumeration = "BuildIdType", tag = "5")]
    pub build_id_type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ShouldInitiateUploadResponse {
    #[prost(bool, tag = "1")]
    pub should_initiate_upload: bool,
    #[prost(string, tag = "2")]
    pub reason: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InitiateUploadRequest {
    #[prost(string, tag = "1")]
    pub build_id: ::prost::alloc::string::String,
    #[prost(int64, tag = "2")]
    pub size: i64,
    #[prost(string, tag = "3")]
    pub hash: ::prost::alloc::string::String,
    #[prost(bool, tag = "4")]
    pub force: bool,
    #[prost(enumeration = "DebuginfoType", tag = "5")]
    pub r#type: i32,
    #[prost(enumeration = "BuildIdType", tag = "6")]
    pub build_id_type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InitiateUploadResponse {
    #[prost(message, optional, tag = "1")]
    pub upload_instructions: ::core::option::Option<UploadInstructions>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UploadInstructions {
    #[prost(string, tag = "1")]
    pub build_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub upload_id: ::prost::alloc::string::String,
    #[prost(enumeration = "upload_instructions::UploadStrategy", tag = "3")]
    pub upload_strategy: i32,
    #[prost(string, tag = "4")]
    pub signed_url: ::prost::alloc::string::String,
    #[prost(enumeration = "DebuginfoType", tag = "5")]
    pub r#type: i32,
}

pub mod upload_instructions {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum UploadStrategy {
        Unspecified = 0,
        Grpc = 1,
        SignedUrl = 2,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MarkUploadFinishedRequest {
    #[prost(string, tag = "1")]
    pub build_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub upload_id: ::prost::alloc::string::String,
    #[prost(enumeration = "DebuginfoType", tag = "3")]
    pub r#type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MarkUploadFinishedResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UploadRequest {
    #[prost(oneof = "upload_request::Data", tags = "1, 2")]
    pub data: ::core::option::Option<upload_request::Data>,
}

pub mod upload_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "1")]
        Info(super::UploadInfo),
        #[prost(bytes, tag = "2")]
        ChunkData(::prost::alloc::vec::Vec<u8>),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UploadInfo {
    #[prost(string, tag = "1")]
    pub build_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub upload_id: ::prost::alloc::string::String,
    #[prost(enumeration = "DebuginfoType", tag = "3")]
    pub r#type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UploadResponse {
    #[prost(string, tag = "1")]
    pub build_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum DebuginfoType {
    DebuginfoUnspecified = 0,
    Executable = 1,
    Sources = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum BuildIdType {
    UnknownUnspecified = 0,
    Gnu = 1,
    Hash = 2,
    Go = 3,
}
