//! # Configuration
//!
//! `reflex` reads an optional JSON file:
//!
//! ```json
//! {
//!   "listen": "0.0.0.0:8080",
//!   "upstreams": [{ "name": "users", "url": "http://localhost:50051" }],
//!   "gateway": { "route_prefix": "api", "call_timeout_ms": 5000 }
//! }
//! ```
//!
//! Every key is optional. Command-line flags are applied on top of the file.
use crate::cli::Cli;
use anyhow::{Context, Result, bail};
use reflex_core::GatewayOptions;
use reflex_core::config::MAX_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    pub listen: String,
    pub upstreams: Vec<UpstreamConfig>,
    pub gateway: GatewayOptions,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UpstreamConfig {
    pub name: String,
    pub url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            upstreams: Vec::new(),
            gateway: GatewayOptions::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file '{}'", path.display()))
    }

    /// Reads the file named by `--config`, if any, then applies the remaining flags.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        let config = config.merge(cli);
        config.validate()?;
        Ok(config)
    }

    fn merge(mut self, cli: Cli) -> Self {
        if let Some(listen) = cli.listen {
            self.listen = listen;
        }

        // Flag upstreams replace a file entry of the same name and are appended otherwise.
        for (name, url) in cli.upstreams {
            match self.upstreams.iter_mut().find(|u| u.name == name) {
                Some(existing) => existing.url = url,
                None => self.upstreams.push(UpstreamConfig { name, url }),
            }
        }

        let gateway = &mut self.gateway;
        if cli.prefix.is_some() {
            gateway.route_prefix = cli.prefix;
        }
        if cli.public_url.is_some() {
            gateway.public_url = cli.public_url;
        }
        if let Some(secs) = cli.discovery_timeout {
            gateway.discovery_timeout_secs = secs;
        }
        if cli.call_timeout.is_some() {
            gateway.call_timeout_ms = cli.call_timeout;
        }

        self
    }

    fn validate(&self) -> Result<()> {
        if self.upstreams.is_empty() {
            bail!("No upstream configured. Pass --upstream name=url or list them in the config file");
        }

        let mut names = HashSet::new();
        for upstream in &self.upstreams {
            if !names.insert(upstream.name.as_str()) {
                bail!("Upstream '{}' is configured twice", upstream.name);
            }
        }

        if self.gateway.discovery_timeout_secs == 0 {
            bail!("The discovery timeout must be at least one second");
        }

        let max_secs = MAX_TIMEOUT.as_secs();
        if self.gateway.discovery_timeout_secs > max_secs {
            bail!("The discovery timeout cannot exceed {max_secs} seconds");
        }
        if let Some(ms) = self.gateway.call_timeout_ms
            && u128::from(ms) > MAX_TIMEOUT.as_millis()
        {
            bail!("The call timeout cannot exceed {} milliseconds", MAX_TIMEOUT.as_millis());
        }

        Ok(())
    }
}
