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

//! Transport for the debug info upload protocol.

use super::pb::{self, upload_request::Data};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::io;
use std::sync::{Arc, Mutex};
use tonic::client::Grpc;
use tonic::codec::{CompressionEncoding, ProstCodec};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request, Status};

/// Remote symbol store.
#[tonic::async_trait]
pub trait DebuginfoClient: Send + Sync + 'static {
    async fn should_initiate_upload(
        &self,
        req: pb::ShouldInitiateUploadRequest,
    ) -> Result<pb::ShouldInitiateUploadResponse, Status>;

    async fn initiate_upload(
        &self,
        req: pb::InitiateUploadRequest,
    ) -> Result<pb::InitiateUploadResponse, Status>;

    /// Streams the file in `chunks` to the store. `info` is sent first.
    async fn upload(
        &self,
        info: pb::UploadInfo,
        chunks: BoxStream<'static, io::Result<Vec<u8>>>,
    ) -> Result<pb::UploadResponse, Status>;

    async fn mark_upload_finished(
        &self,
        req: pb::MarkUploadFinishedRequest,
    ) -> Result<pb::MarkUploadFinishedResponse, Status>;
}

/// [`DebuginfoClient`] talking gRPC over a tonic channel.
#[derive(Debug, Clone)]
pub struct GrpcDebuginfoClient {
    inner: Grpc<Channel>,
}

impl GrpcDebuginfoClient {
    pub async fn connect(endpoint: String) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::new(endpoint)?.connect().await?;
        Ok(Self::new(channel))
    }

    pub fn new(channel: Channel) -> Self {
        let inner = Grpc::new(channel)
            .send_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Gzip);
        Self { inner }
    }

    async fn ready(&self) -> Result<Grpc<Channel>, Status> {
        let mut grpc = self.inner.clone();
        grpc.ready()
            .await
            .map_err(|e| Status::new(Code::Unknown, format!("service was not ready: {e}")))?;
        Ok(grpc)
    }

    async fn unary<Req, Resp>(&self, method: &str, req: Req) -> Result<Resp, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.ready().await?;
        let resp = grpc
            .unary(Request::new(req), method_path(method)?, ProstCodec::default())
            .await?;
        Ok(resp.into_inner())
    }
}

fn method_path(method: &str) -> Result<PathAndQuery, Status> {
    format!("/{}/{method}", pb::SERVICE)
        .parse()
        .map_err(|e| Status::internal(format!("invalid method path: {e}")))
}

#[tonic::async_trait]
impl DebuginfoClient for GrpcDebuginfoClient {
    async fn should_initiate_upload(
        &self,
        req: pb::ShouldInitiateUploadRequest,
    ) -> Result<pb::ShouldInitiateUploadResponse, Status> {
        self.unary("ShouldInitiateUpload", req).await
    }

    async fn initiate_upload(
        &self,
        req: pb::InitiateUploadRequest,
    ) -> Result<pb::InitiateUploadResponse, Status> {
        self.unary("InitiateUpload", req).await
    }

    async fn upload(
        &self,
        info: pb::UploadInfo,
        chunks: BoxStream<'static, io::Result<Vec<u8>>>,
    ) -> Result<pb::UploadResponse, Status> {
        // Read errors end the request stream early; they are reported after
        // the call returns.
        let read_error = Arc::new(Mutex::new(None::<io::Error>));
        let read_error2 = Arc::clone(&read_error);

        let header = pb::UploadRequest {
            data: Some(Data::Info(info)),
        };
        let body = chunks.scan((), move |_, chunk| {
            future::ready(match chunk {
                Ok(chunk) => Some(pb::UploadRequest {
                    data: Some(Data::ChunkData(chunk)),
                }),
                Err(e) => {
                    *read_error2.lock().unwrap() = Some(e);
                    None
                }
            })
        });
        let requests = stream::once(future::ready(header)).chain(body);

        let mut grpc = self.ready().await?;
        let resp = grpc
            .client_streaming(
                Request::new(requests),
                method_path("Upload")?,
                ProstCodec::default(),
            )
            .await;

        if let Some(e) = read_error.lock().unwrap().take() {
            return Err(e.into());
        }
        Ok(resp?.into_inner())
    }

    async fn mark_upload_finished(
        &self,
        req: pb::MarkUploadFinishedRequest,
    ) -> Result<pb::MarkUploadFinishedResponse, Status> {
        self.unary("MarkUploadFinished", req).await
    }
}
