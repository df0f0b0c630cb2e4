//! # Discovery
//!
//! Asks an upstream, through server reflection, which services it exposes and which descriptor
//! files define them, then links those files into a [`DescriptorPool`].
//!
//! One `ServerReflectionInfo` stream is opened per service and all of them run concurrently. The
//! join is all-or-nothing and the whole batch shares a single deadline: when it expires, every
//! stream still in flight is dropped.
use crate::BoxError;
use crate::descriptor::{self, ResolveError};
use crate::grpc::client::{GrpcClient, UnaryInvoker};
use crate::reflection::client::{ReflectionClient, ReflectionError, default_service_filter};
use futures_util::future::{BoxFuture, try_join_all};
use http_body::Body as HttpBody;
use prost_reflect::{DescriptorPool, ServiceDescriptor};
use std::sync::Arc;
use tokio::time::Instant;
use tonic::client::GrpcService;
use tonic::transport::{Channel, Endpoint};

/// Errors that can occur when connecting to an upstream.
#[derive(Debug, thiserror::Error)]
pub enum ClientConnectError {
    #[error("Invalid URL '{0}': {1}")]
    InvalidUrl(String, #[source] tonic::transport::Error),
    #[error("Failed to connect to '{0}': {1}")]
    ConnectionFailed(String, #[source] tonic::transport::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Reflection failed on upstream '{upstream}': {source}")]
    Reflection {
        upstream: String,
        #[source]
        source: ReflectionError,
    },

    #[error("Failed to resolve the descriptors of upstream '{upstream}': {source}")]
    Resolve {
        upstream: String,
        #[source]
        source: ResolveError,
    },

    #[error("Service '{service}' listed by upstream '{upstream}' is not in its descriptors")]
    ServiceNotFound { upstream: String, service: String },

    #[error("Discovery of upstream '{upstream}' exceeded its deadline")]
    DeadlineExceeded { upstream: String },
}

impl DiscoveryError {
    fn reflection(upstream: &str, source: ReflectionError) -> Self {
        match source {
            ReflectionError::DeadlineExceeded => DiscoveryError::DeadlineExceeded {
                upstream: upstream.to_string(),
            },
            source => DiscoveryError::Reflection {
                upstream: upstream.to_string(),
                source,
            },
        }
    }
}

/// What discovery learned about one upstream.
#[derive(Debug, Clone)]
pub struct UpstreamSchema {
    pub name: String,
    /// Discovered services, in the order the upstream listed them.
    pub services: Vec<ServiceDescriptor>,
    pub pool: DescriptorPool,
}

/// An upstream as seen by the gateway: something that can be discovered and called.
pub trait UpstreamSource: Send + Sync {
    fn name(&self) -> &str;

    /// Discovers the upstream's schema. Must complete before `deadline`.
    fn discover(&self, deadline: Instant) -> BoxFuture<'_, Result<UpstreamSchema, DiscoveryError>>;

    /// The invoker bridged calls to this upstream go through.
    fn invoker(&self) -> Arc<dyn UnaryInvoker>;
}

/// A named gRPC upstream.
#[derive(Debug, Clone)]
pub struct Upstream<S = Channel> {
    name: String,
    service: S,
}

impl Upstream<Channel> {
    /// Connects to `url` (e.g. `http://localhost:50051`).
    pub async fn connect(name: &str, url: &str) -> Result<Self, ClientConnectError> {
        let endpoint = Endpoint::new(url.to_string())
            .map_err(|e| ClientConnectError::InvalidUrl(url.to_string(), e))?;

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ClientConnectError::ConnectionFailed(url.to_string(), e))?;

        Ok(Self::from_service(name, channel))
    }

    /// Like [`Upstream::connect`], but the connection is only established on first use.
    pub fn connect_lazy(name: &str, url: &str) -> Result<Self, ClientConnectError> {
        let endpoint = Endpoint::new(url.to_string())
            .map_err(|e| ClientConnectError::InvalidUrl(url.to_string(), e))?;

        Ok(Self::from_service(name, endpoint.connect_lazy()))
    }
}

impl<S> Upstream<S>
where
    S: GrpcService<tonic::body::Body> + Clone + Send + Sync + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    /// Wraps any gRPC service, e.g. an in-process `tonic::service::Routes`.
    pub fn from_service(name: &str, service: S) -> Self {
        Self {
            name: name.to_string(),
            service,
        }
    }

    /// Lists the upstream's services, fetches their descriptors concurrently and links them.
    pub async fn discover_schema(&self, deadline: Instant) -> Result<UpstreamSchema, DiscoveryError> {
        let upstream = self.name.as_str();
        let mut client = ReflectionClient::new(self.service.clone());

        let services = client
            .list_services(deadline, default_service_filter)
            .await
            .map_err(|e| DiscoveryError::reflection(upstream, e))?;

        tracing::debug!(upstream, services = ?services, "listed services");

        let fetches = services.iter().map(|service| {
            let mut client = client.clone();
            async move { client.fetch_descriptors(service, deadline).await }
        });

        let batches = try_join_all(fetches)
            .await
            .map_err(|e| DiscoveryError::reflection(upstream, e))?;

        let files = descriptor::merge_files(batches);

        let pool = descriptor::build_pool(files).map_err(|source| DiscoveryError::Resolve {
            upstream: upstream.to_string(),
            source,
        })?;

        let services = services
            .into_iter()
            .map(|service| {
                pool.get_service_by_name(&service)
                    .ok_or_else(|| DiscoveryError::ServiceNotFound {
                        upstream: upstream.to_string(),
                        service,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            upstream,
            services = services.len(),
            files = pool.files().count(),
            "upstream discovered"
        );

        Ok(UpstreamSchema {
            name: self.name.clone(),
            services,
            pool,
        })
    }
}

impl<S> UpstreamSource for Upstream<S>
where
    S: GrpcService<tonic::body::Body> + Clone + Send + Sync + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn discover(&self, deadline: Instant) -> BoxFuture<'_, Result<UpstreamSchema, DiscoveryError>> {
        Box::pin(self.discover_schema(deadline))
    }

    fn invoker(&self) -> Arc<dyn UnaryInvoker> {
        Arc::new(GrpcClient::new(self.service.clone()))
    }
}
