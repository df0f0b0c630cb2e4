//! # Generic gRPC Client
//!
//! This module wraps a standard `tonic` client to provide a generic interface for unary gRPC
//! calls. It is agnostic to the specific Protobuf messages being exchanged.
//!
//! ## How it works
//!
//! The [`GrpcClient`] uses the [`super::codec::DynamicCodec`] to handle serialization. It does not
//! need to know the structure of the data it is sending: it builds the HTTP/2 path
//! (`/package.Service/Method`) from the `MethodDescriptor` at runtime and hands the message to the
//! codec.
//!
//! Every call has the same shape: a request message plus [`CallOptions`] (metadata and an
//! optional deadline, both absent by default). Cancelling a call means dropping its future.
//!
//! [`UnaryInvoker`] is the object-safe view of a client that the gateway stores per upstream, so
//! that callers never have to name the underlying transport type.
use super::codec::DynamicCodec;
use crate::BoxError;
use crate::config::MAX_TIMEOUT;
use futures_util::future::BoxFuture;
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use std::str::FromStr;
use std::time::Duration;
use tonic::{
    client::GrpcService,
    metadata::{
        MetadataKey, MetadataValue,
        errors::{InvalidMetadataKey, InvalidMetadataValue},
    },
    transport::Channel,
};

#[derive(thiserror::Error, Debug)]
pub enum GrpcRequestError {
    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
    #[error("Invalid metadata (header) key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        source: InvalidMetadataKey,
    },
    #[error("Invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        source: InvalidMetadataValue,
    },
    #[error("Invalid gRPC path '{path}': '{source}'")]
    InvalidPath {
        path: String,
        source: http::uri::InvalidUri,
    },
}

/// Per-call options. The default is no metadata and no deadline.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// ASCII metadata entries sent with the request.
    pub metadata: Vec<(String, String)>,
    /// Sent as `grpc-timeout` and enforced locally, at most [`MAX_TIMEOUT`].
    pub timeout: Option<Duration>,
}

/// * `Ok(Ok(message))` - Successful RPC execution.
/// * `Ok(Err(Status))` - RPC executed, but the server returned an error.
/// * `Err(GrpcRequestError)` - Failed to build or send the request.
pub type UnaryResult = Result<Result<DynamicMessage, tonic::Status>, GrpcRequestError>;

/// Object-safe unary call seam.
pub trait UnaryInvoker: Send + Sync {
    fn invoke(
        &self,
        method: MethodDescriptor,
        request: DynamicMessage,
        options: CallOptions,
    ) -> BoxFuture<'static, UnaryResult>;

    /// Name of the client implementation, reported back to HTTP callers.
    fn implementation(&self) -> &'static str;
}

/// A dynamic client for unary gRPC calls.
#[derive(Debug, Clone)]
pub struct GrpcClient<S = Channel> {
    client: tonic::client::Grpc<S>,
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client }
    }

    /// Performs a Unary gRPC call (Single Request -> Single Response).
    ///
    /// `request` must be an instance of the method's input type.
    pub async fn unary(
        &mut self,
        method: MethodDescriptor,
        request: DynamicMessage,
        options: CallOptions,
    ) -> UnaryResult {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))?;

        let codec = DynamicCodec::new(method.output());
        let path = http_path(&method)?;
        let timeout = options.timeout.map(|t| t.min(MAX_TIMEOUT));
        let request = build_request(request, options)?;

        let call = self.client.unary(request, path, codec);

        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                Err(tonic::Status::deadline_exceeded(format!(
                    "Call to '{}' exceeded its {limit:?} deadline",
                    method.full_name()
                )))
            }),
            None => call.await,
        };

        match result {
            Ok(response) => Ok(Ok(response.into_inner())),
            Err(status) => Ok(Err(status)),
        }
    }
}

impl<S> UnaryInvoker for GrpcClient<S>
where
    S: GrpcService<tonic::body::Body> + Clone + Send + Sync + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    fn invoke(
        &self,
        method: MethodDescriptor,
        request: DynamicMessage,
        options: CallOptions,
    ) -> BoxFuture<'static, UnaryResult> {
        // Clones share the underlying transport; each call gets its own readiness state.
        let mut client = self.clone();
        Box::pin(async move { client.unary(method, request, options).await })
    }

    fn implementation(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

fn http_path(method: &MethodDescriptor) -> Result<http::uri::PathAndQuery, GrpcRequestError> {
    let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
    http::uri::PathAndQuery::from_str(&path)
        .map_err(|source| GrpcRequestError::InvalidPath { path, source })
}

fn build_request<T>(
    payload: T,
    options: CallOptions,
) -> Result<tonic::Request<T>, GrpcRequestError> {
    let mut request = tonic::Request::new(payload);
    for (k, v) in options.metadata {
        let key =
            MetadataKey::from_str(&k).map_err(|source| GrpcRequestError::InvalidMetadataKey {
                key: k.clone(),
                source,
            })?;
        let val = MetadataValue::from_str(&v)
            .map_err(|source| GrpcRequestError::InvalidMetadataValue { key: k, source })?;
        request.metadata_mut().insert(key, val);
    }
    if let Some(timeout) = options.timeout {
        request.set_timeout(timeout.min(MAX_TIMEOUT));
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_applies_metadata_and_timeout() {
        let options = CallOptions {
            metadata: vec![("x-request-id".into(), "42".into())],
            timeout: Some(Duration::from_millis(250)),
        };

        let request = build_request((), options).unwrap();

        assert_eq!(request.metadata().get("x-request-id").unwrap(), "42");
        assert!(request.metadata().get("grpc-timeout").is_some());
    }

    #[test]
    fn test_build_request_clamps_huge_timeouts() {
        let options = CallOptions {
            metadata: Vec::new(),
            timeout: Some(Duration::MAX),
        };

        let request = build_request((), options).unwrap();

        assert!(request.metadata().get("grpc-timeout").is_some());
    }

    #[test]
    fn test_build_request_rejects_invalid_metadata_key() {
        let options = CallOptions {
            metadata: vec![("bad key".into(), "v".into())],
            timeout: None,
        };

        let result = build_request((), options);

        assert!(matches!(
            result,
            Err(GrpcRequestError::InvalidMetadataKey { key, .. }) if key == "bad key"
        ));
    }
}
