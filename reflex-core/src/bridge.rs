//! # Dynamic Call Bridge
//!
//! Bridges one JSON request into one unary RPC and back.
//!
//! Each bridged method gets a [`DispatchEntry`] when the registry is built. The entry owns
//! everything a call needs: the method descriptor (from which request messages are constructed),
//! the JSON decoder for the input type, the invoker of the upstream the method lives on, and the
//! JSON encoder for the output type. Nothing is looked up by type at call time and no state is
//! shared between concurrent calls.
use crate::grpc::client::{CallOptions, GrpcRequestError, UnaryInvoker};
use prost_reflect::{DynamicMessage, MethodDescriptor};
use std::sync::Arc;
use tonic::Code;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Invalid JSON request body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode the response as JSON: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("RPC failed with status {:?}: {}", .0.code(), .0.message())]
    Rpc(tonic::Status),

    #[error("Failed to send the RPC: {0}")]
    Transport(#[from] GrpcRequestError),
}

impl BridgeError {
    /// HTTP status reported to the caller.
    pub fn status_code(&self) -> http::StatusCode {
        match self {
            BridgeError::Decode(_) => http::StatusCode::BAD_REQUEST,
            BridgeError::Encode(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
            BridgeError::Rpc(status) => http_status_of(status.code()),
            BridgeError::Transport(_) => http::StatusCode::BAD_GATEWAY,
        }
    }

    /// JSON error body reported to the caller.
    ///
    /// RPC failures carry the gRPC code and message: `{"error":"rpc","code":5,"status":"NotFound",
    /// "message":"..."}`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            BridgeError::Decode(e) => serde_json::json!({
                "error": "invalid_payload",
                "message": e.to_string(),
            }),
            BridgeError::Rpc(status) => serde_json::json!({
                "error": "rpc",
                "code": status.code() as i32,
                "status": format!("{:?}", status.code()),
                "message": status.message(),
            }),
            other => serde_json::json!({
                "error": "bridge",
                "message": other.to_string(),
            }),
        }
    }
}

/// The usual gRPC to HTTP status mapping.
pub fn http_status_of(code: Code) -> http::StatusCode {
    use http::StatusCode;

    match code {
        Code::Ok => StatusCode::OK,
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
            StatusCode::BAD_REQUEST
        }
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists | Code::Aborted => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::Unknown | Code::Internal | Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A successfully bridged call.
#[derive(Debug, Clone)]
pub struct BridgeResponse {
    /// JSON encoding of the reply.
    pub body: Vec<u8>,
    /// Service full name, e.g. `greet.Greeter`.
    pub service: String,
    /// Method name, e.g. `SayHello`.
    pub method: String,
    /// Client implementation that performed the call.
    pub client: &'static str,
}

/// Everything needed to bridge calls to one method.
#[derive(Clone)]
pub struct DispatchEntry {
    service: String,
    method: MethodDescriptor,
    invoker: Arc<dyn UnaryInvoker>,
    options: CallOptions,
}

impl std::fmt::Debug for DispatchEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEntry")
            .field("method", &self.method.full_name())
            .field("client", &self.invoker.implementation())
            .field("options", &self.options)
            .finish()
    }
}

impl DispatchEntry {
    pub fn new(
        method: MethodDescriptor,
        invoker: Arc<dyn UnaryInvoker>,
        options: CallOptions,
    ) -> Self {
        Self {
            service: method.parent_service().full_name().to_string(),
            method,
            invoker,
            options,
        }
    }

    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn client(&self) -> &'static str {
        self.invoker.implementation()
    }

    /// A fresh, empty instance of the input type.
    pub fn new_request(&self) -> DynamicMessage {
        DynamicMessage::new(self.method.input())
    }

    /// Parses `body` with the proto3 JSON rules of the input type.
    ///
    /// An empty (or blank) body is the default message. Unknown fields and trailing data are
    /// rejected.
    pub fn decode_request(&self, body: &[u8]) -> Result<DynamicMessage, BridgeError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(self.new_request());
        }

        let mut deserializer = serde_json::Deserializer::from_slice(body);
        let request = DynamicMessage::deserialize(self.method.input(), &mut deserializer)
            .map_err(BridgeError::Decode)?;
        deserializer.end().map_err(BridgeError::Decode)?;

        Ok(request)
    }

    /// Runs the RPC. A non-OK status is an error, never retried.
    pub async fn invoke(&self, request: DynamicMessage) -> Result<DynamicMessage, BridgeError> {
        let result = self
            .invoker
            .invoke(self.method.clone(), request, self.options.clone())
            .await?;

        result.map_err(BridgeError::Rpc)
    }

    /// Serializes `response` with the proto3 JSON rules of the output type.
    pub fn encode_response(&self, response: &DynamicMessage) -> Result<Vec<u8>, BridgeError> {
        serde_json::to_vec(response).map_err(BridgeError::Encode)
    }
}

/// Decodes `body`, performs the call and encodes the reply.
pub async fn call(entry: &DispatchEntry, body: &[u8]) -> Result<BridgeResponse, BridgeError> {
    let request = entry.decode_request(body)?;
    let response = entry.invoke(request).await?;
    let body = entry.encode_response(&response)?;

    Ok(BridgeResponse {
        body,
        service: entry.service.clone(),
        method: entry.method.name().to_string(),
        client: entry.client(),
    })
}
