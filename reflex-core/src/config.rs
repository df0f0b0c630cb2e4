//! Gateway options.
//!
//! Options are plain serde data so that the binary can read them from a JSON file and override
//! single values from the command line.
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 30;

/// Upper bound of both timeouts. Longer values are clamped to it.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GatewayOptions {
    /// Prepended to every bridged route, e.g. `api` gives `/api/greet.Greeter/SayHello`.
    pub route_prefix: Option<String>,
    /// Deadline of one whole discovery batch, across all upstreams.
    pub discovery_timeout_secs: u64,
    /// Deadline of each bridged call. No deadline when unset.
    pub call_timeout_ms: Option<u64>,
    /// Base URL advertised in the generated documents.
    pub public_url: Option<String>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            route_prefix: None,
            discovery_timeout_secs: DEFAULT_DISCOVERY_TIMEOUT_SECS,
            call_timeout_ms: None,
            public_url: None,
        }
    }
}

impl GatewayOptions {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs).min(MAX_TIMEOUT)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms
            .map(|ms| Duration::from_millis(ms).min(MAX_TIMEOUT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let options: GatewayOptions = serde_json::from_str(r#"{"route_prefix":"api"}"#).unwrap();

        assert_eq!(options.route_prefix.as_deref(), Some("api"));
        assert_eq!(options.discovery_timeout(), Duration::from_secs(30));
        assert_eq!(options.call_timeout(), None);
    }

    #[test]
    fn test_timeouts_are_clamped() {
        let options = GatewayOptions {
            discovery_timeout_secs: u64::MAX,
            call_timeout_ms: Some(u64::MAX),
            ..Default::default()
        };

        assert_eq!(options.discovery_timeout(), MAX_TIMEOUT);
        assert_eq!(options.call_timeout(), Some(MAX_TIMEOUT));
    }
}
