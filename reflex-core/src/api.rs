//! # API Description Builder
//!
//! Turns discovered services into [`ApiEndpoint`]s: one JSON-over-HTTP endpoint per unary method,
//! routed as `POST /{prefix}/{package}.{Service}/{Method}`.
//!
//! Endpoints are grouped by service full name (`package.Service`). A group is the unit the
//! document generator emits one OpenAPI document for.
use crate::schema::{ContractResolver, DataContract};
use prost_reflect::{MethodDescriptor, ServiceDescriptor};
use std::collections::HashMap;

/// A single bridged method, as exposed over HTTP.
#[derive(Debug, Clone)]
pub struct ApiEndpoint {
    /// Name of the upstream the method was discovered on.
    pub upstream: String,
    /// Service full name, e.g. `greet.Greeter`.
    pub group: String,
    pub verb: http::Method,
    pub route: String,
    pub method: MethodDescriptor,
    /// Input message fields, in field-number order.
    pub parameters: Vec<ApiParameter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiParameter {
    pub name: String,
    pub json_name: String,
    pub contract: DataContract,
}

impl ApiEndpoint {
    /// `{Service}_{Method}`, unique within a group.
    pub fn operation_id(&self) -> String {
        format!(
            "{}_{}",
            self.method.parent_service().name(),
            self.method.name()
        )
    }

    /// Human readable origin of the endpoint, used in conflict reports.
    fn origin(&self) -> String {
        format!("{} ({})", self.method.full_name(), self.upstream)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiBuildError {
    #[error("Route '{route}' is exposed twice: by {first} and by {second}")]
    RouteConflict {
        route: String,
        first: String,
        second: String,
    },
}

/// Builds [`ApiEndpoint`]s for the services of one upstream.
#[derive(Debug, Clone, Default)]
pub struct ApiDescriptionBuilder {
    prefix: Option<String>,
}

impl ApiDescriptionBuilder {
    /// `prefix` is normalised: surrounding and repeated slashes are dropped, and an empty prefix
    /// means none. `"api/"`, `"/api"` and `"//api//"` all produce routes under `/api/`.
    pub fn new(prefix: Option<&str>) -> Self {
        Self {
            prefix: prefix.and_then(normalize_prefix),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Route of `method` under this builder's prefix.
    pub fn route(&self, method: &MethodDescriptor) -> String {
        let path = format!("{}/{}", method.parent_service().full_name(), method.name());

        match &self.prefix {
            Some(prefix) => format!("/{prefix}/{path}"),
            None => format!("/{path}"),
        }
    }

    /// One endpoint per unary method of `services`, in service then method declaration order.
    ///
    /// Streaming methods cannot be bridged over a single request/response exchange and are
    /// skipped.
    pub fn build<'a, I>(
        &self,
        upstream: &str,
        services: I,
        resolver: &mut ContractResolver,
    ) -> Vec<ApiEndpoint>
    where
        I: IntoIterator<Item = &'a ServiceDescriptor>,
    {
        let mut endpoints = Vec::new();

        for service in services {
            for method in service.methods() {
                if method.is_client_streaming() || method.is_server_streaming() {
                    tracing::debug!(
                        upstream,
                        method = method.full_name(),
                        "skipping streaming method"
                    );
                    continue;
                }

                endpoints.push(self.endpoint(upstream, method, resolver));
            }
        }

        endpoints
    }

    fn endpoint(
        &self,
        upstream: &str,
        method: MethodDescriptor,
        resolver: &mut ContractResolver,
    ) -> ApiEndpoint {
        let mut fields: Vec<_> = method.input().fields().collect();
        fields.sort_by_key(|f| f.number());

        let parameters = fields
            .iter()
            .map(|field| ApiParameter {
                name: field.name().to_string(),
                json_name: field.json_name().to_string(),
                contract: resolver.resolve_field(field),
            })
            .collect();

        ApiEndpoint {
            upstream: upstream.to_string(),
            group: method.parent_service().full_name().to_string(),
            verb: http::Method::POST,
            route: self.route(&method),
            method,
            parameters,
        }
    }
}

/// Fails on the first route shared by two endpoints.
pub fn ensure_unique_routes(endpoints: &[ApiEndpoint]) -> Result<(), ApiBuildError> {
    let mut seen: HashMap<&str, &ApiEndpoint> = HashMap::with_capacity(endpoints.len());

    for endpoint in endpoints {
        if let Some(first) = seen.insert(&endpoint.route, endpoint) {
            return Err(ApiBuildError::RouteConflict {
                route: endpoint.route.clone(),
                first: first.origin(),
                second: endpoint.origin(),
            });
        }
    }

    Ok(())
}

fn normalize_prefix(prefix: &str) -> Option<String> {
    let segments: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ScalarKind;
    use greeter_service::FILE_DESCRIPTOR_SET;
    use prost_reflect::DescriptorPool;

    fn services(names: &[&str]) -> Vec<ServiceDescriptor> {
        let pool = DescriptorPool::decode(FILE_DESCRIPTOR_SET).unwrap();
        names
            .iter()
            .map(|name| pool.get_service_by_name(name).unwrap())
            .collect()
    }

    #[test]
    fn test_prefix_normalisation() {
        assert_eq!(ApiDescriptionBuilder::new(None).prefix(), None);
        assert_eq!(ApiDescriptionBuilder::new(Some("")).prefix(), None);
        assert_eq!(ApiDescriptionBuilder::new(Some("/")).prefix(), None);
        assert_eq!(ApiDescriptionBuilder::new(Some("api/")).prefix(), Some("api"));
        assert_eq!(
            ApiDescriptionBuilder::new(Some("//api//v1/")).prefix(),
            Some("api/v1")
        );
    }

    #[test]
    fn test_build_creates_post_endpoints_for_unary_methods() {
        let services = services(&["greet.Greeter"]);
        let mut resolver = ContractResolver::new();

        let endpoints = ApiDescriptionBuilder::new(None).build("local", &services, &mut resolver);

        // SayHelloStream is server streaming and must not be exposed.
        assert_eq!(endpoints.len(), 1);

        let endpoint = &endpoints[0];
        assert_eq!(endpoint.upstream, "local");
        assert_eq!(endpoint.group, "greet.Greeter");
        assert_eq!(endpoint.verb, http::Method::POST);
        assert_eq!(endpoint.route, "/greet.Greeter/SayHello");
        assert_eq!(endpoint.operation_id(), "Greeter_SayHello");
        assert_eq!(
            endpoint.parameters,
            vec![ApiParameter {
                name: "name".into(),
                json_name: "name".into(),
                contract: DataContract::Scalar(ScalarKind::String),
            }]
        );
    }

    #[test]
    fn test_build_applies_prefix_and_field_order() {
        let services = services(&["catalog.Catalog"]);
        let mut resolver = ContractResolver::new();

        let endpoints =
            ApiDescriptionBuilder::new(Some("/api/")).build("local", &services, &mut resolver);

        let routes: Vec<&str> = endpoints.iter().map(|e| e.route.as_str()).collect();
        assert_eq!(
            routes,
            vec!["/api/catalog.Catalog/GetNode", "/api/catalog.Catalog/ListLabels"]
        );

        let names: Vec<&str> = endpoints[0]
            .parameters
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "depth"]);
        assert_eq!(
            endpoints[0].parameters[1].contract.type_name(),
            Some("google.protobuf.Int32Value")
        );
    }

    #[test]
    fn test_ensure_unique_routes_rejects_duplicates() {
        let services = services(&["greet.Greeter"]);
        let mut resolver = ContractResolver::new();
        let builder = ApiDescriptionBuilder::new(None);

        let mut endpoints = builder.build("east", &services, &mut resolver);
        assert!(ensure_unique_routes(&endpoints).is_ok());

        endpoints.extend(builder.build("west", &services, &mut resolver));

        match ensure_unique_routes(&endpoints) {
            Err(ApiBuildError::RouteConflict {
                route,
                first,
                second,
            }) => {
                assert_eq!(route, "/greet.Greeter/SayHello");
                assert!(first.contains("east"));
                assert!(second.contains("west"));
            }
            other => panic!("Expected RouteConflict, got {other:?}"),
        }
    }
}
