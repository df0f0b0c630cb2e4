//! # Reflection Client
//!
//! A client implementation for `grpc.reflection.v1`.
//!
//! The client answers the two questions discovery asks an upstream:
//!
//! * which services do you expose? ([`ReflectionClient::list_services`])
//! * which descriptor files define this service? ([`ReflectionClient::fetch_descriptors`])
//!
//! Every exchange opens its own `ServerReflectionInfo` stream. A writer half (an `mpsc`
//! channel, or a single-item stream) pushes the requests and is closed once nothing else has to
//! be asked, while the reader half consumes responses until the exchange is complete.
//!
//! Both operations are bounded by a deadline. When it expires the in-flight stream is dropped and
//! whatever was already read is discarded.
//!
//! ## References
//!
//! * [gRPC Server Reflection Protocol](https://github.com/grpc/grpc/blob/master/doc/server-reflection.md)
use crate::BoxError;
use crate::descriptor::RawFile;
use futures_util::stream::once;
use http_body::Body as HttpBody;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Streaming, client::GrpcService};
use tonic_reflection::pb::v1::{
    ServerReflectionRequest, ServerReflectionResponse,
    server_reflection_client::ServerReflectionClient, server_reflection_request::MessageRequest,
    server_reflection_response::MessageResponse,
};

#[derive(Debug, thiserror::Error)]
pub enum ReflectionError {
    #[error(
        "Failed to start a stream request with the reflection server, reflection might not be supported: '{0}'"
    )]
    ServerStreamInitFailed(#[source] tonic::Status),

    #[error("The server stream returned an error status: '{0}'")]
    ServerStreamFailure(#[source] tonic::Status),

    #[error("Reflection stream closed unexpectedly")]
    StreamClosed,

    #[error("Internal error: Failed to send request to stream")]
    SendFailed,

    #[error("Server returned reflection error code {code}: {message}")]
    ServerError { code: i32, message: String },

    #[error("Protocol error: Received unexpected response type: {0}")]
    UnexpectedResponseType(String),

    #[error("Failed to decode FileDescriptorProto: {0}")]
    DecodeError(#[from] prost::DecodeError),

    #[error("Reflection deadline exceeded")]
    DeadlineExceeded,
}

/// Fully qualified names of the reflection services themselves.
pub const REFLECTION_SERVICES: &[&str] = &[
    "grpc.reflection.v1.ServerReflection",
    "grpc.reflection.v1alpha.ServerReflection",
];

/// The filter used by discovery: every service except the reflection service.
pub fn default_service_filter(service: &str) -> bool {
    !REFLECTION_SERVICES.contains(&service)
}

// The host defined in the reflection requests doesn't seem to be a mandatory field
// and there is no documentation about what it is about.
// So we won't enforce it from the user.
const EMPTY_HOST: &str = "";

/// A generic client for the gRPC Server Reflection Protocol.
#[derive(Debug, Clone)]
pub struct ReflectionClient<T = Channel> {
    client: ServerReflectionClient<T>,
}

impl<S> ReflectionClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(channel: S) -> Self {
        let client = ServerReflectionClient::new(channel);
        Self { client }
    }

    /// Lists the services exposed by the server, keeping only the names accepted by `filter`.
    ///
    /// Names are returned in the order the server reported them.
    pub async fn list_services<F>(
        &mut self,
        deadline: Instant,
        filter: F,
    ) -> Result<Vec<String>, ReflectionError>
    where
        F: Fn(&str) -> bool,
    {
        timeout_at(deadline, self.read_service_list(filter))
            .await
            .map_err(|_| ReflectionError::DeadlineExceeded)?
    }

    /// Fetches the descriptor file defining `symbol` (e.g. `my.package.MyService`) together with
    /// every file it transitively imports.
    ///
    /// **Recursive Resolution**:
    ///    - The server returns the `FileDescriptorProto` that defines the symbol.
    ///    - The client inspects the imports (dependencies) of that file.
    ///    - It requests any missing dependency on the same stream until nothing is in flight.
    ///
    /// Files are deduplicated by name, the first occurrence wins.
    ///
    /// # Returns
    ///
    /// * `Ok(files)` - Every file needed to resolve the symbol, raw bytes included.
    /// * `Err(ReflectionError)` - The exchange failed or the deadline expired.
    pub async fn fetch_descriptors(
        &mut self,
        symbol: &str,
        deadline: Instant,
    ) -> Result<Vec<RawFile>, ReflectionError> {
        timeout_at(deadline, self.read_descriptor_files(symbol))
            .await
            .map_err(|_| ReflectionError::DeadlineExceeded)?
    }

    async fn read_service_list<F>(&mut self, filter: F) -> Result<Vec<String>, ReflectionError>
    where
        F: Fn(&str) -> bool,
    {
        let req = ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(MessageRequest::ListServices(String::new())),
        };

        // A single-item request stream: the writer side closes right after the request.
        let mut response_stream = self
            .client
            .server_reflection_info(once(async { req }))
            .await
            .map_err(ReflectionError::ServerStreamInitFailed)?
            .into_inner();

        let mut services = Vec::new();

        while let Some(response) = response_stream
            .message()
            .await
            .map_err(ReflectionError::ServerStreamFailure)?
        {
            match response.message_response {
                Some(MessageResponse::ListServicesResponse(resp)) => services.extend(
                    resp.service
                        .into_iter()
                        .map(|s| s.name)
                        .filter(|name| filter(name)),
                ),
                Some(MessageResponse::ErrorResponse(e)) => {
                    return Err(ReflectionError::ServerError {
                        code: e.error_code,
                        message: e.error_message,
                    });
                }
                Some(other) => {
                    return Err(ReflectionError::UnexpectedResponseType(format!(
                        "{other:?}",
                    )));
                }
                None => {
                    return Err(ReflectionError::UnexpectedResponseType(
                        "Empty Message".into(),
                    ));
                }
            }
        }

        Ok(services)
    }

    async fn read_descriptor_files(&mut self, symbol: &str) -> Result<Vec<RawFile>, ReflectionError> {
        let (tx, rx) = mpsc::channel(100);

        let mut response_stream = self
            .client
            .server_reflection_info(ReceiverStream::new(rx))
            .await
            .map_err(ReflectionError::ServerStreamInitFailed)?
            .into_inner();

        let req = ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(MessageRequest::FileContainingSymbol(symbol.to_string())),
        };

        tx.send(req)
            .await
            .map_err(|_| ReflectionError::SendFailed)?;

        collect_descriptors(&mut response_stream, tx).await
    }
}

/// Reads responses until every request written on `request_channel` has been answered.
///
/// The sender is consumed: it is dropped on return, which closes the writer half of the stream.
async fn collect_descriptors(
    response_stream: &mut Streaming<ServerReflectionResponse>,
    request_channel: mpsc::Sender<ServerReflectionRequest>,
) -> Result<Vec<RawFile>, ReflectionError> {
    let mut inflight = 1;
    let mut collected = Vec::new();
    let mut seen = HashSet::new();
    let mut requested = HashSet::new();

    while inflight > 0 {
        let response = response_stream
            .message()
            .await
            .map_err(ReflectionError::ServerStreamFailure)?
            .ok_or(ReflectionError::StreamClosed)?;

        inflight -= 1;

        match response.message_response {
            Some(MessageResponse::FileDescriptorResponse(res)) => {
                let sent_count = process_descriptor_batch(
                    res.file_descriptor_proto,
                    &mut collected,
                    &mut seen,
                    &mut requested,
                    &request_channel,
                )
                .await?;

                inflight += sent_count;
            }
            Some(MessageResponse::ErrorResponse(e)) => {
                return Err(ReflectionError::ServerError {
                    message: e.error_message,
                    code: e.error_code,
                });
            }
            Some(other) => {
                return Err(ReflectionError::UnexpectedResponseType(format!(
                    "{:?}",
                    other
                )));
            }
            None => {
                return Err(ReflectionError::UnexpectedResponseType(
                    "Empty Message".into(),
                ));
            }
        }
    }

    Ok(collected)
}

async fn process_descriptor_batch(
    raw_protos: Vec<Vec<u8>>,
    collected: &mut Vec<RawFile>,
    seen: &mut HashSet<String>,
    requested: &mut HashSet<String>,
    tx: &mpsc::Sender<ServerReflectionRequest>,
) -> Result<usize, ReflectionError> {
    let mut sent_count = 0;

    for raw in raw_protos {
        let file = RawFile::decode(raw)?;

        if !file.name.is_empty() && seen.insert(file.name.clone()) {
            sent_count += queue_dependencies(&file, seen, requested, tx).await?;
            collected.push(file);
        }
    }

    Ok(sent_count)
}

async fn queue_dependencies(
    file: &RawFile,
    seen: &HashSet<String>,
    requested: &mut HashSet<String>,
    tx: &mpsc::Sender<ServerReflectionRequest>,
) -> Result<usize, ReflectionError> {
    let mut count = 0;

    for dep in &file.dependencies {
        if !seen.contains(dep) && requested.insert(dep.clone()) {
            let req = ServerReflectionRequest {
                host: EMPTY_HOST.to_string(),
                message_request: Some(MessageRequest::FileByFilename(dep.clone())),
            };

            tx.send(req)
                .await
                .map_err(|_| ReflectionError::SendFailed)?;
            count += 1;
        }
    }

    Ok(count)
}
