//! # Gateway
//!
//! Owns the upstreams and the current [`Registry`].
//!
//! The registry is built lazily, the first time someone asks for it, and at most once per
//! generation: the build is a shared future, so concurrent callers all await the same discovery
//! run and observe the same outcome. A failed build is kept as well. Nothing is retried until
//! [`Gateway::invalidate`] starts a new generation.
use crate::api::ApiBuildError;
use crate::config::{GatewayOptions, MAX_TIMEOUT};
use crate::discovery::{DiscoveryError, UpstreamSource};
use crate::registry::Registry;
use futures_util::future::{BoxFuture, FutureExt, Shared, TryFutureExt, try_join_all};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("Failed to build the gateway registry: {0}")]
    Build(#[from] ApiBuildError),
}

pub type RegistryResult = Result<Arc<Registry>, Arc<GatewayError>>;

type RegistryBuild = Shared<BoxFuture<'static, RegistryResult>>;

pub struct Gateway {
    upstreams: Arc<[Arc<dyn UpstreamSource>]>,
    options: GatewayOptions,
    current: Mutex<RegistryBuild>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field(
                "upstreams",
                &self.upstreams.iter().map(|u| u.name()).collect::<Vec<_>>(),
            )
            .field("options", &self.options)
            .finish()
    }
}

impl Gateway {
    /// Creates a gateway. No discovery happens until the registry is first requested.
    pub fn new(options: GatewayOptions, upstreams: Vec<Arc<dyn UpstreamSource>>) -> Self {
        let upstreams: Arc<[Arc<dyn UpstreamSource>]> = upstreams.into();
        let current = Mutex::new(registry_build(upstreams.clone(), options.clone()));

        Self {
            upstreams,
            options,
            current,
        }
    }

    /// The registry of the current generation, building it if needed.
    pub async fn registry(&self) -> RegistryResult {
        let build = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        build.await
    }

    /// Starts a new generation. The next [`Gateway::registry`] call runs discovery again.
    ///
    /// Callers already awaiting the previous generation still get its result.
    pub fn invalidate(&self) {
        let build = registry_build(self.upstreams.clone(), self.options.clone());
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = build;

        tracing::info!("gateway registry invalidated");
    }

    /// [`Gateway::invalidate`], then wait for the new registry.
    pub async fn rebuild(&self) -> RegistryResult {
        self.invalidate();
        self.registry().await
    }
}

/// The discovery and build of one generation. Nothing runs until the future is first polled.
fn registry_build(
    upstreams: Arc<[Arc<dyn UpstreamSource>]>,
    options: GatewayOptions,
) -> RegistryBuild {
    async move {
        let now = Instant::now();
        let deadline = now
            .checked_add(options.discovery_timeout())
            .unwrap_or(now + MAX_TIMEOUT);

        tracing::info!(upstreams = upstreams.len(), "starting discovery");

        let discovered = try_join_all(upstreams.iter().map(|upstream| async move {
            let schema = upstream.discover(deadline).await?;
            Ok::<_, DiscoveryError>((schema, upstream.invoker()))
        }))
        .await?;

        let registry = Registry::build(&options, discovered)?;

        Ok::<_, GatewayError>(Arc::new(registry))
    }
    .inspect_err(|e| tracing::error!(error = %e, "gateway registry build failed"))
    .map_err(Arc::new)
    .boxed()
    .shared()
}
