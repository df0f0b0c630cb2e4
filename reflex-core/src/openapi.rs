//! # Document Generator
//!
//! Assembles one OpenAPI 3.0 document per endpoint group: a deduplicated set of named schemas in
//! `components.schemas` and one `POST` path item per bridged method.
mod generator;
mod model;

pub use generator::DocumentGenerator;
pub use model::*;
