use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const OPENAPI_VERSION: &str = "3.0.3";
pub const JSON_CONTENT_TYPE: &str = "application/json";

const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";

/// An OpenAPI 3.0 document. Maps are ordered so that the rendered JSON is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenApiDocument {
    pub openapi: String,
    pub info: Info,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
    #[serde(default)]
    pub paths: BTreeMap<String, PathItem>,
    #[serde(default)]
    pub components: Components,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub title: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Components {
    #[serde(default)]
    pub schemas: BTreeMap<String, Schema>,
}

/// Only `POST` is ever generated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PathItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "operationId")]
    pub operation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(rename = "requestBody")]
    pub request_body: RequestBody,
    pub responses: BTreeMap<String, Response>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub required: bool,
    pub content: BTreeMap<String, MediaType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub content: BTreeMap<String, MediaType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaType {
    pub schema: Schema,
}

/// A JSON schema, restricted to what descriptors can produce.
///
/// The empty schema (`{}`) accepts any JSON value. Properties keep field-number order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "$ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(
        rename = "additionalProperties",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<Box<Schema>>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl Schema {
    /// `{"$ref": "#/components/schemas/{name}"}`.
    pub fn reference(name: &str) -> Self {
        Self {
            reference: Some(format!("{SCHEMA_REF_PREFIX}{name}")),
            ..Default::default()
        }
    }

    pub fn primitive(schema_type: &str, format: Option<&str>) -> Self {
        Self {
            schema_type: Some(schema_type.to_string()),
            format: format.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn array(items: Schema) -> Self {
        Self {
            schema_type: Some("array".to_string()),
            items: Some(Box::new(items)),
            ..Default::default()
        }
    }

    /// An object with only open-ended properties of type `values`.
    pub fn map(values: Schema) -> Self {
        Self {
            schema_type: Some("object".to_string()),
            additional_properties: Some(Box::new(values)),
            ..Default::default()
        }
    }

    /// Name of the component this schema points at, if it is a reference.
    pub fn referenced_name(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .and_then(|r| r.strip_prefix(SCHEMA_REF_PREFIX))
    }
}

impl MediaType {
    pub fn json(schema: Schema) -> BTreeMap<String, MediaType> {
        BTreeMap::from([(JSON_CONTENT_TYPE.to_string(), MediaType { schema })])
    }
}
