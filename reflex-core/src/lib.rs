//! # Reflex Core
//!
//! `reflex-core` is the library powering the `reflex` gateway. It discovers gRPC services at
//! runtime through server reflection and exposes every unary method as a JSON-over-HTTP endpoint,
//! together with a generated OpenAPI document. No Protobuf schema is compiled in.
//!
//! ## Pipeline
//!
//! 1. **[`reflection`]:** lists an upstream's services and fetches their raw descriptor files.
//! 2. **[`descriptor`]:** orders those files by dependency and links them into a
//!    `DescriptorPool`.
//! 3. **[`schema`]:** maps messages to [`schema::DataContract`]s, the JSON shape of a type.
//! 4. **[`api`]:** turns each discovered method into an [`api::ApiEndpoint`].
//! 5. **[`openapi`]:** generates one OpenAPI document per service.
//! 6. **[`bridge`]** and **[`grpc`]:** decode a JSON request, run the RPC, encode the reply.
//!
//! [`discovery`] drives steps 1 and 2 for each upstream, [`registry::Registry`] holds the output
//! of a whole run, and [`gateway::Gateway`] builds it lazily and rebuilds it on demand.
//! [`http::router`] exposes the gateway with axum.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod api;
pub mod bridge;
pub mod config;
pub mod descriptor;
pub mod discovery;
pub mod gateway;
pub mod grpc;
pub mod http;
pub mod openapi;
pub mod reflection;
pub mod registry;
pub mod schema;

pub use config::GatewayOptions;
pub use discovery::{Upstream, UpstreamSource};
pub use gateway::{Gateway, GatewayError};

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
