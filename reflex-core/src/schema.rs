//! # Schema Mapper
//!
//! Converts Protobuf descriptors into [`DataContract`]s: a small, language-neutral model of the
//! JSON shape a message takes on the wire (scalar, object, array, dictionary or enum).
//!
//! Contracts drive both the API description (per-parameter typing) and the OpenAPI document.
mod contract;
mod resolver;
mod well_known;

pub use contract::*;
pub use resolver::ContractResolver;
pub use well_known::WellKnownType;
