use super::model::{
    Components, Info, MediaType, OPENAPI_VERSION, OpenApiDocument, Operation, PathItem,
    RequestBody, Response, Schema, Server,
};
use crate::api::ApiEndpoint;
use crate::schema::{ContractResolver, DataContract, ObjectContract, ScalarKind};
use std::collections::BTreeMap;

const DOCUMENT_VERSION: &str = "v1";

/// Generates the OpenAPI document of an endpoint group.
#[derive(Debug, Clone, Default)]
pub struct DocumentGenerator {
    public_url: Option<String>,
}

impl DocumentGenerator {
    /// `public_url` is advertised in `servers` when set.
    pub fn new(public_url: Option<String>) -> Self {
        Self { public_url }
    }

    /// Builds the document of `group` from its endpoints.
    ///
    /// Every input message, then every output message, is a root schema. Nested named objects
    /// reached from a root are collected in a side table while the root is expanded. Roots are
    /// registered first and side entries afterwards, and in both cases a name that is already
    /// registered keeps its first definition.
    ///
    /// `resolver` must be the resolver of the pool the endpoints were built from.
    pub fn generate(
        &self,
        group: &str,
        endpoints: &[&ApiEndpoint],
        resolver: &mut ContractResolver,
    ) -> OpenApiDocument {
        let roots = endpoints
            .iter()
            .map(|e| e.method.input())
            .chain(endpoints.iter().map(|e| e.method.output()));

        let mut schemas = BTreeMap::new();
        let mut side_table = BTreeMap::new();

        for root in roots {
            let contract = resolver.resolve(&root);

            let schema = match &contract {
                DataContract::Object(object) => {
                    // Back references to the root itself must not expand it a second time.
                    side_table
                        .entry(object.name.clone())
                        .or_insert_with(Schema::default);
                    object_schema(object, resolver, &mut side_table)
                }
                other => resolve_openapi_shape(other, resolver, &mut side_table),
            };

            schemas.entry(root.full_name().to_string()).or_insert(schema);
        }

        for (name, schema) in side_table {
            schemas.entry(name).or_insert(schema);
        }

        let paths = endpoints
            .iter()
            .map(|endpoint| {
                let output = resolver.resolve(&endpoint.method.output());
                let item = PathItem {
                    post: Some(operation(endpoint, &output)),
                };
                (endpoint.route.clone(), item)
            })
            .collect();

        OpenApiDocument {
            openapi: OPENAPI_VERSION.to_string(),
            info: Info {
                title: group.to_string(),
                version: DOCUMENT_VERSION.to_string(),
            },
            servers: self
                .public_url
                .iter()
                .map(|url| Server { url: url.clone() })
                .collect(),
            paths,
            components: Components { schemas },
        }
    }
}

fn operation(endpoint: &ApiEndpoint, output: &DataContract) -> Operation {
    let input_name = endpoint.method.input().full_name().to_string();
    let output_name = endpoint.method.output().full_name().to_string();

    Operation {
        tags: vec![endpoint.group.clone()],
        operation_id: endpoint.operation_id(),
        summary: Some(endpoint.method.full_name().to_string()),
        request_body: RequestBody {
            required: true,
            content: MediaType::json(Schema::reference(&input_name)),
        },
        responses: BTreeMap::from([(
            "200".to_string(),
            Response {
                description: "Success".to_string(),
                content: MediaType::json(response_schema(&output_name, output)),
            },
        )]),
    }
}

/// The 200 response schema of a method returning `output`.
///
/// Objects point at the output message; collections point at their element or value type when it
/// is a named message, and are inlined otherwise.
fn response_schema(output_name: &str, output: &DataContract) -> Schema {
    match output {
        DataContract::Object(_) => Schema::reference(output_name),
        DataContract::Array(element) => Schema::array(named_or_inline(element)),
        DataContract::Dictionary(value) => Schema::map(named_or_inline(value)),
        other => scalar_like_schema(other),
    }
}

fn named_or_inline(contract: &DataContract) -> Schema {
    match contract {
        DataContract::Object(object) => Schema::reference(&object.name),
        DataContract::Reference(name) => Schema::reference(name),
        DataContract::Array(element) => Schema::array(named_or_inline(element)),
        DataContract::Dictionary(value) => Schema::map(named_or_inline(value)),
        other => scalar_like_schema(other),
    }
}

/// Returns the schema of a value of shape `contract`.
///
/// Named objects are returned as references; their definitions are expanded into `side_table`.
/// A reference is followed through `resolver`, since the contract holding it may have been
/// memoized while the referenced type was still being resolved.
fn resolve_openapi_shape(
    contract: &DataContract,
    resolver: &ContractResolver,
    side_table: &mut BTreeMap<String, Schema>,
) -> Schema {
    match contract {
        DataContract::Object(object) => {
            expand_named(object, resolver, side_table);
            Schema::reference(&object.name)
        }
        DataContract::Reference(name) => {
            if !side_table.contains_key(name)
                && let Some(DataContract::Object(object)) = resolver.contract_of(name)
            {
                expand_named(object, resolver, side_table);
            }
            Schema::reference(name)
        }
        DataContract::Array(element) => {
            Schema::array(resolve_openapi_shape(element, resolver, side_table))
        }
        DataContract::Dictionary(value) => {
            Schema::map(resolve_openapi_shape(value, resolver, side_table))
        }
        other => scalar_like_schema(other),
    }
}

/// Adds the definition of `object` to `side_table` unless it is already there.
///
/// The name is inserted before the properties are expanded, so an object is expanded at most once.
fn expand_named(
    object: &ObjectContract,
    resolver: &ContractResolver,
    side_table: &mut BTreeMap<String, Schema>,
) {
    if side_table.contains_key(&object.name) {
        return;
    }

    side_table.insert(object.name.clone(), Schema::default());
    let schema = object_schema(object, resolver, side_table);
    side_table.insert(object.name.clone(), schema);
}

fn object_schema(
    object: &ObjectContract,
    resolver: &ContractResolver,
    side_table: &mut BTreeMap<String, Schema>,
) -> Schema {
    let properties = object
        .properties
        .iter()
        .map(|p| {
            let schema = resolve_openapi_shape(&p.contract, resolver, side_table);
            (p.name.clone(), schema)
        })
        .collect();

    Schema {
        schema_type: Some("object".to_string()),
        properties,
        additional_properties: object
            .additional_properties
            .as_ref()
            .map(|extra| Box::new(resolve_openapi_shape(extra, resolver, side_table))),
        ..Default::default()
    }
}

fn scalar_like_schema(contract: &DataContract) -> Schema {
    match contract {
        DataContract::Scalar(kind) => scalar_schema(*kind),
        DataContract::Enum(enumeration) => Schema {
            schema_type: Some("string".to_string()),
            enum_values: Some(enumeration.values.clone()),
            ..Default::default()
        },
        DataContract::Object(object) => Schema::reference(&object.name),
        DataContract::Reference(name) => Schema::reference(name),
        DataContract::Array(element) => Schema::array(scalar_like_schema(element)),
        DataContract::Dictionary(value) => Schema::map(scalar_like_schema(value)),
    }
}

/// Follows the proto3 JSON mapping: 64-bit integers travel as strings.
fn scalar_schema(kind: ScalarKind) -> Schema {
    match kind {
        ScalarKind::Double => Schema::primitive("number", Some("double")),
        ScalarKind::Float => Schema::primitive("number", Some("float")),
        ScalarKind::Int32 => Schema::primitive("integer", Some("int32")),
        ScalarKind::UInt32 => Schema::primitive("integer", Some("uint32")),
        ScalarKind::Int64 => Schema::primitive("string", Some("int64")),
        ScalarKind::UInt64 => Schema::primitive("string", Some("uint64")),
        ScalarKind::Bool => Schema::primitive("boolean", None),
        ScalarKind::String => Schema::primitive("string", None),
        ScalarKind::Bytes => Schema::primitive("string", Some("byte")),
        ScalarKind::Unknown => Schema::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiDescriptionBuilder;
    use crate::schema::{DataProperty, EnumContract};
    use greeter_service::FILE_DESCRIPTOR_SET;
    use prost_reflect::DescriptorPool;
    use std::sync::Arc;

    fn endpoints(services: &[&str], resolver: &mut ContractResolver) -> Vec<ApiEndpoint> {
        let pool = DescriptorPool::decode(FILE_DESCRIPTOR_SET).unwrap();
        let services: Vec<_> = services
            .iter()
            .map(|s| pool.get_service_by_name(s).unwrap())
            .collect();
        ApiDescriptionBuilder::new(None).build("local", &services, resolver)
    }

    fn object(name: &str, properties: Vec<(&str, DataContract)>) -> DataContract {
        DataContract::Object(Arc::new(ObjectContract {
            name: name.to_string(),
            properties: properties
                .into_iter()
                .enumerate()
                .map(|(i, (n, contract))| DataProperty {
                    name: n.to_string(),
                    field_name: n.to_string(),
                    number: i as u32 + 1,
                    contract,
                })
                .collect(),
            additional_properties: None,
        }))
    }

    #[test]
    fn test_greeter_document() {
        let mut resolver = ContractResolver::new();
        let endpoints = endpoints(&["greet.Greeter"], &mut resolver);
        let refs: Vec<&ApiEndpoint> = endpoints.iter().collect();

        let doc = DocumentGenerator::new(Some("http://gateway.local".into())).generate(
            "greet.Greeter",
            &refs,
            &mut resolver,
        );

        assert_eq!(doc.openapi, "3.0.3");
        assert_eq!(doc.info.title, "greet.Greeter");
        assert_eq!(doc.servers[0].url, "http://gateway.local");

        let schemas = &doc.components.schemas;
        assert!(schemas.contains_key("greet.HelloRequest"));
        assert!(schemas.contains_key("greet.HelloReply"));
        assert!(schemas.contains_key("common.Tag"));

        let reply = &schemas["greet.HelloReply"];
        assert_eq!(reply.schema_type.as_deref(), Some("object"));
        assert_eq!(
            reply.properties["tags"],
            Schema::array(Schema::reference("common.Tag"))
        );

        let operation = doc.paths["/greet.Greeter/SayHello"].post.as_ref().unwrap();
        assert_eq!(operation.operation_id, "Greeter_SayHello");
        assert_eq!(operation.tags, vec!["greet.Greeter"]);
        assert_eq!(
            operation.request_body.content["application/json"]
                .schema
                .referenced_name(),
            Some("greet.HelloRequest")
        );
        assert_eq!(
            operation.responses["200"].content["application/json"]
                .schema
                .referenced_name(),
            Some("greet.HelloReply")
        );

        assert!(!doc.paths.contains_key("/greet.Greeter/SayHelloStream"));
    }

    #[test]
    fn test_recursive_schemas_are_referenced_by_name() {
        let mut resolver = ContractResolver::new();
        let endpoints = endpoints(&["catalog.Catalog"], &mut resolver);
        let refs: Vec<&ApiEndpoint> = endpoints.iter().collect();

        let doc = DocumentGenerator::default().generate("catalog.Catalog", &refs, &mut resolver);
        let schemas = &doc.components.schemas;

        let node = &schemas["catalog.Node"];
        assert_eq!(
            node.properties["children"],
            Schema::array(Schema::reference("catalog.Node"))
        );
        assert_eq!(node.properties["edge"], Schema::reference("catalog.Edge"));
        assert_eq!(
            node.properties["counters"],
            Schema::map(Schema::primitive("string", Some("int64")))
        );
        assert_eq!(
            node.properties["checksum"],
            Schema::primitive("string", Some("byte"))
        );
        assert_eq!(
            node.properties["status"].enum_values.as_deref(),
            Some(
                &[
                    "STATUS_UNSPECIFIED".to_string(),
                    "STATUS_ACTIVE".to_string(),
                    "STATUS_ARCHIVED".to_string()
                ][..]
            )
        );
        assert_eq!(
            schemas["catalog.Edge"].properties["target"],
            Schema::reference("catalog.Node")
        );

        let order: Vec<&str> = node.properties.keys().map(String::as_str).collect();
        assert_eq!(
            order,
            vec![
                "id",
                "children",
                "labels",
                "counters",
                "createdAt",
                "status",
                "edge",
                "attributes",
                "checksum"
            ]
        );
        let rendered = serde_json::to_string(node).unwrap();
        assert!(rendered.find("\"id\"").unwrap() < rendered.find("\"checksum\"").unwrap());

        let wrapper = &schemas["google.protobuf.Int32Value"];
        assert_eq!(
            wrapper.properties["value"],
            Schema::primitive("integer", Some("int32"))
        );

        let structure = &schemas["google.protobuf.Struct"];
        assert_eq!(structure.additional_properties, Some(Box::new(Schema::default())));

        // ListLabels returns a ListValue: an array of anything, inlined.
        let list_labels = doc.paths["/catalog.Catalog/ListLabels"].post.as_ref().unwrap();
        assert_eq!(
            list_labels.responses["200"].content["application/json"].schema,
            Schema::array(Schema::default())
        );
    }

    #[test]
    fn test_back_references_are_defined_when_only_the_inner_type_is_a_root() {
        use prost_types::{
            FileDescriptorProto, MethodDescriptorProto, ServiceDescriptorProto,
        };

        // A service whose only message is `catalog.Edge`: `catalog.Node` is reached through
        // `Edge.target` alone, and `Edge` is memoized while `Node` is still being resolved.
        let mut pool = DescriptorPool::decode(FILE_DESCRIPTOR_SET).unwrap();
        pool.add_file_descriptor_proto(FileDescriptorProto {
            name: Some("graph.proto".into()),
            package: Some("graph".into()),
            dependency: vec!["catalog.proto".into()],
            syntax: Some("proto3".into()),
            service: vec![ServiceDescriptorProto {
                name: Some("Graph".into()),
                method: vec![MethodDescriptorProto {
                    name: Some("Link".into()),
                    input_type: Some(".catalog.Edge".into()),
                    output_type: Some(".catalog.Edge".into()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        })
        .unwrap();

        let graph = pool.get_service_by_name("graph.Graph").unwrap();
        let mut resolver = ContractResolver::new();
        let endpoints = ApiDescriptionBuilder::new(None).build("local", [&graph], &mut resolver);
        let refs: Vec<&ApiEndpoint> = endpoints.iter().collect();

        let doc = DocumentGenerator::default().generate("graph.Graph", &refs, &mut resolver);
        let schemas = &doc.components.schemas;

        assert_eq!(
            schemas["catalog.Edge"].properties["target"],
            Schema::reference("catalog.Node")
        );

        let node = schemas
            .get("catalog.Node")
            .expect("catalog.Node must be defined");
        assert_eq!(node.schema_type.as_deref(), Some("object"));
        assert_eq!(node.properties["edge"], Schema::reference("catalog.Edge"));

        // Every reference in the document points at a defined schema.
        let json = serde_json::to_string(&doc).unwrap();
        for reference in json.split("\"$ref\":\"#/components/schemas/").skip(1) {
            let name = &reference[..reference.find('"').unwrap()];
            assert!(schemas.contains_key(name), "dangling reference to {name}");
        }
    }

    #[test]
    fn test_response_schema_rules() {
        let tag = object("common.Tag", vec![("key", DataContract::Scalar(ScalarKind::String))]);

        assert_eq!(
            response_schema("x.Out", &DataContract::Scalar(ScalarKind::Bool)),
            Schema::primitive("boolean", None)
        );
        assert_eq!(
            response_schema("x.Out", &tag),
            Schema::reference("x.Out")
        );
        assert_eq!(
            response_schema("x.Out", &DataContract::Array(Box::new(tag.clone()))),
            Schema::array(Schema::reference("common.Tag"))
        );
        assert_eq!(
            response_schema("x.Out", &DataContract::Dictionary(Box::new(tag))),
            Schema::map(Schema::reference("common.Tag"))
        );

        let color = DataContract::Enum(Arc::new(EnumContract {
            name: "x.Color".into(),
            values: vec!["RED".into()],
        }));
        assert_eq!(
            response_schema("x.Out", &color).enum_values,
            Some(vec!["RED".to_string()])
        );
    }

    #[test]
    fn test_side_table_keeps_first_definition() {
        let first = object("x.Shared", vec![("a", DataContract::Scalar(ScalarKind::String))]);
        let second = object("x.Shared", vec![("b", DataContract::Scalar(ScalarKind::Int32))]);

        let resolver = ContractResolver::new();
        let mut side_table = BTreeMap::new();
        resolve_openapi_shape(&first, &resolver, &mut side_table);
        resolve_openapi_shape(&second, &resolver, &mut side_table);

        let shared = &side_table["x.Shared"];
        assert!(shared.properties.contains_key("a"));
        assert!(!shared.properties.contains_key("b"));
    }

    #[test]
    fn test_document_serializes_as_openapi_json() {
        let mut resolver = ContractResolver::new();
        let endpoints = endpoints(&["greet.Greeter"], &mut resolver);
        let refs: Vec<&ApiEndpoint> = endpoints.iter().collect();
        let doc = DocumentGenerator::default().generate("greet.Greeter", &refs, &mut resolver);

        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["openapi"], "3.0.3");
        assert!(json.get("servers").is_none());
        assert_eq!(
            json["paths"]["/greet.Greeter/SayHello"]["post"]["requestBody"]["content"]
                ["application/json"]["schema"]["$ref"],
            "#/components/schemas/greet.HelloRequest"
        );
        assert_eq!(
            json["components"]["schemas"]["greet.HelloRequest"]["properties"]["name"]["type"],
            "string"
        );
    }
}
