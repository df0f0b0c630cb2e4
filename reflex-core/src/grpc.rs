//! # Generic gRPC Transport
//!
//! Low-level building blocks for performing unary gRPC calls with dynamic message types.
//!
//! Unlike standard `tonic` clients, which are strongly typed (e.g. `HelloRequest`), these
//! components work with `prost_reflect::DynamicMessage`s built against descriptors discovered at
//! runtime.
pub mod client;
pub mod codec;
