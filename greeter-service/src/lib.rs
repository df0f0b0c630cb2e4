//! # Greeter Service
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide gRPC server traits and a
//! descriptor set for integration testing the `reflex` gateway.
//! It is not intended for production use.
//!
//! It compiles three protos into a single descriptor set:
//!
//! * `common.proto`: shared messages, imported by both services.
//! * `greet.proto`: the `greet.Greeter` service (one unary and one streaming method).
//! * `catalog.proto`: the `catalog.Catalog` service, whose messages are recursive and use
//!   maps, enums and well-known types.

pub mod pb {
    pub mod common {
        include!(concat!(env!("OUT_DIR"), "/common.rs"));
    }

    pub mod greet {
        include!(concat!(env!("OUT_DIR"), "/greet.rs"));
    }

    pub mod catalog {
        include!(concat!(env!("OUT_DIR"), "/catalog.rs"));
    }
}

pub use pb::catalog::catalog_server::{Catalog, CatalogServer};
pub use pb::greet::greeter_server::{Greeter, GreeterServer};
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("descriptors");
