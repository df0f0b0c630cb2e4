//! # HTTP surface
//!
//! An axum router exposing the gateway:
//!
//! * `POST /{route}`: bridges the JSON body to the method registered under `route`.
//! * `GET /openapi`: index of the generated documents, `[{"group": ..., "url": ...}]`.
//! * `GET /openapi/{group}/openapi.json`: the document of one group.
//!
//! Every request reads the gateway's current registry, so the first request of a generation
//! triggers discovery.
use crate::bridge::{self, BridgeError};
use crate::gateway::{Gateway, GatewayError};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderName, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;

pub const X_GRPC_SERVICE: HeaderName = HeaderName::from_static("x-grpc-service");
pub const X_GRPC_METHOD: HeaderName = HeaderName::from_static("x-grpc-method");
pub const X_GRPC_CLIENT: HeaderName = HeaderName::from_static("x-grpc-client");

const JSON: &str = "application/json";

/// An entry of the document index.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct DocumentLink {
    pub group: String,
    pub url: String,
}

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/openapi", get(handle_index))
        .route("/openapi/{group}/openapi.json", get(handle_document))
        .route("/{*route}", post(handle_rpc))
        .with_state(gateway)
}

async fn handle_rpc(State(gateway): State<Arc<Gateway>>, uri: Uri, body: Bytes) -> Response {
    let registry = match gateway.registry().await {
        Ok(registry) => registry,
        Err(e) => return registry_unavailable(&e),
    };

    let route = uri.path();

    let Some(entry) = registry.dispatch(route) else {
        return error_response(
            StatusCode::NOT_FOUND,
            serde_json::json!({
                "error": "unknown_route",
                "message": format!("No method is bridged at '{route}'"),
            }),
        );
    };

    match bridge::call(entry, &body).await {
        Ok(response) => {
            tracing::debug!(route, client = response.client, "call bridged");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, JSON.to_string()),
                    (X_GRPC_SERVICE, response.service),
                    (X_GRPC_METHOD, response.method),
                    (X_GRPC_CLIENT, response.client.to_string()),
                ],
                response.body,
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(route, error = %e, "call failed");
            e.into_response()
        }
    }
}

async fn handle_index(State(gateway): State<Arc<Gateway>>) -> Response {
    match gateway.registry().await {
        Ok(registry) => {
            let links: Vec<DocumentLink> = registry
                .groups()
                .map(|group| DocumentLink {
                    group: group.to_string(),
                    url: format!("/openapi/{group}/openapi.json"),
                })
                .collect();
            Json(links).into_response()
        }
        Err(e) => registry_unavailable(&e),
    }
}

async fn handle_document(
    State(gateway): State<Arc<Gateway>>,
    Path(group): Path<String>,
) -> Response {
    let registry = match gateway.registry().await {
        Ok(registry) => registry,
        Err(e) => return registry_unavailable(&e),
    };

    match registry.document(&group) {
        Some(document) => Json(document).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            serde_json::json!({
                "error": "unknown_group",
                "message": format!("No document for group '{group}'"),
            }),
        ),
    }
}

fn registry_unavailable(error: &GatewayError) -> Response {
    let status = match error {
        GatewayError::Discovery(_) => StatusCode::BAD_GATEWAY,
        GatewayError::Build(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    error_response(
        status,
        serde_json::json!({
            "error": "discovery",
            "message": error.to_string(),
        }),
    )
}

fn error_response(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        error_response(self.status_code(), self.to_json())
    }
}
