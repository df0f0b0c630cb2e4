//! # Server Reflection
//!
//! This module contains the logic necessary to interact with the gRPC Server Reflection Protocol.
//!
//! It lets the gateway query an upstream for its service list and raw descriptor files at runtime,
//! so that no Protobuf schema has to be compiled into `reflex`.
//!
//! The protocol stubs come from `tonic-reflection`'s generated `grpc.reflection.v1` module.
pub mod client;
