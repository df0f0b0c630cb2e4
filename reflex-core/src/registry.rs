//! # Registry
//!
//! The immutable product of one discovery run: every bridged endpoint, the route to
//! [`DispatchEntry`] table used at call time and one OpenAPI document per group.
//!
//! A registry is never mutated. Picking up schema changes means building a new one.
use crate::api::{ApiBuildError, ApiDescriptionBuilder, ApiEndpoint, ensure_unique_routes};
use crate::bridge::DispatchEntry;
use crate::config::GatewayOptions;
use crate::discovery::UpstreamSchema;
use crate::grpc::client::{CallOptions, UnaryInvoker};
use crate::openapi::{DocumentGenerator, OpenApiDocument};
use crate::schema::ContractResolver;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug)]
pub struct Registry {
    endpoints: Vec<ApiEndpoint>,
    dispatch: HashMap<String, DispatchEntry>,
    documents: BTreeMap<String, OpenApiDocument>,
}

impl Registry {
    /// Builds the registry of the discovered upstreams, each paired with its invoker.
    ///
    /// Each upstream gets its own [`ContractResolver`], since type names are only unique within
    /// one descriptor pool. Routes must be unique across all upstreams: a conflict fails the
    /// whole build.
    pub fn build(
        options: &GatewayOptions,
        upstreams: Vec<(UpstreamSchema, Arc<dyn UnaryInvoker>)>,
    ) -> Result<Self, ApiBuildError> {
        let builder = ApiDescriptionBuilder::new(options.route_prefix.as_deref());
        let generator = DocumentGenerator::new(options.public_url.clone());
        let call_options = CallOptions {
            metadata: Vec::new(),
            timeout: options.call_timeout(),
        };

        let mut batches = Vec::with_capacity(upstreams.len());

        for (schema, invoker) in upstreams {
            let mut resolver = ContractResolver::new();
            let endpoints = builder.build(&schema.name, &schema.services, &mut resolver);
            batches.push((endpoints, resolver, invoker));
        }

        let endpoints: Vec<ApiEndpoint> = batches
            .iter()
            .flat_map(|(endpoints, _, _)| endpoints.iter().cloned())
            .collect();

        ensure_unique_routes(&endpoints)?;

        let mut dispatch = HashMap::with_capacity(endpoints.len());
        let mut documents = BTreeMap::new();

        for (upstream_endpoints, mut resolver, invoker) in batches {
            let mut groups: BTreeMap<&str, Vec<&ApiEndpoint>> = BTreeMap::new();

            for endpoint in &upstream_endpoints {
                groups.entry(&endpoint.group).or_default().push(endpoint);

                let entry = DispatchEntry::new(
                    endpoint.method.clone(),
                    invoker.clone(),
                    call_options.clone(),
                );
                dispatch.insert(endpoint.route.clone(), entry);
            }

            for (group, members) in groups {
                let document = generator.generate(group, &members, &mut resolver);
                documents.insert(group.to_string(), document);
            }
        }

        tracing::info!(
            endpoints = endpoints.len(),
            groups = documents.len(),
            "registry built"
        );

        Ok(Self {
            endpoints,
            dispatch,
            documents,
        })
    }

    pub fn endpoints(&self) -> &[ApiEndpoint] {
        &self.endpoints
    }

    /// The dispatch entry of a route, e.g. `/greet.Greeter/SayHello`.
    pub fn dispatch(&self, route: &str) -> Option<&DispatchEntry> {
        self.dispatch.get(route)
    }

    pub fn document(&self, group: &str) -> Option<&OpenApiDocument> {
        self.documents.get(group)
    }

    /// Group names, sorted.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grpc::client::UnaryResult;
    use futures_util::future::BoxFuture;
    use greeter_service::FILE_DESCRIPTOR_SET;
    use prost_reflect::{DescriptorPool, DynamicMessage, MethodDescriptor};

    struct Unreachable;

    impl UnaryInvoker for Unreachable {
        fn invoke(
            &self,
            _method: MethodDescriptor,
            _request: DynamicMessage,
            _options: CallOptions,
        ) -> BoxFuture<'static, UnaryResult> {
            unimplemented!("registry tests never call upstreams")
        }

        fn implementation(&self) -> &'static str {
            "unreachable"
        }
    }

    fn schema(name: &str, services: &[&str]) -> UpstreamSchema {
        let pool = DescriptorPool::decode(FILE_DESCRIPTOR_SET).unwrap();
        UpstreamSchema {
            name: name.to_string(),
            services: services
                .iter()
                .map(|s| pool.get_service_by_name(s).unwrap())
                .collect(),
            pool,
        }
    }

    fn invoker() -> Arc<dyn UnaryInvoker> {
        Arc::new(Unreachable)
    }

    #[test]
    fn test_build_indexes_routes_and_documents() {
        let options = GatewayOptions {
            route_prefix: Some("api".into()),
            ..Default::default()
        };

        let registry = Registry::build(
            &options,
            vec![
                (schema("greeter", &["greet.Greeter"]), invoker()),
                (schema("catalog", &["catalog.Catalog"]), invoker()),
            ],
        )
        .expect("registry must build");

        assert_eq!(registry.endpoints().len(), 3);
        assert_eq!(
            registry.groups().collect::<Vec<_>>(),
            vec!["catalog.Catalog", "greet.Greeter"]
        );

        let entry = registry.dispatch("/api/greet.Greeter/SayHello").unwrap();
        assert_eq!(entry.service(), "greet.Greeter");
        assert_eq!(entry.client(), "unreachable");
        assert!(registry.dispatch("/greet.Greeter/SayHello").is_none());

        let document = registry.document("catalog.Catalog").unwrap();
        assert!(document.paths.contains_key("/api/catalog.Catalog/GetNode"));
        assert!(!document.paths.contains_key("/api/greet.Greeter/SayHello"));
    }

    #[test]
    fn test_build_rejects_conflicting_upstreams() {
        let result = Registry::build(
            &GatewayOptions::default(),
            vec![
                (schema("east", &["greet.Greeter"]), invoker()),
                (schema("west", &["greet.Greeter", "catalog.Catalog"]), invoker()),
            ],
        );

        assert!(matches!(
            result,
            Err(ApiBuildError::RouteConflict { route, .. }) if route == "/greet.Greeter/SayHello"
        ));
    }

    #[test]
    fn test_build_without_upstreams_is_empty() {
        let registry = Registry::build(&GatewayOptions::default(), Vec::new()).unwrap();

        assert!(registry.endpoints().is_empty());
        assert_eq!(registry.groups().count(), 0);
    }
}
