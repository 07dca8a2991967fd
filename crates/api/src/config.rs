//! Worker configuration loaded from environment variables.

use std::time::Duration;

use saga::{RuntimeConfig, SimulatedLatency, StepPacing};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `SIMULATED_LATENCY`: `realistic` or `instant` (default: `realistic`)
/// - `STEP_PACING`: pause between saga steps, `true`/`false` (default: `true`)
/// - `ADDRESS_WAIT_SECS`: human-in-the-loop wait (default: `60`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub realistic_latency: bool,
    pub step_pacing: bool,
    pub address_wait: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            realistic_latency: lookup("SIMULATED_LATENCY").as_deref() != Some("instant"),
            step_pacing: lookup("STEP_PACING")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.step_pacing),
            address_wait: lookup("ADDRESS_WAIT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.address_wait),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the workflow runtime settings.
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            pacing: if self.step_pacing {
                StepPacing::default()
            } else {
                StepPacing::none()
            },
            address_wait: self.address_wait,
            latency: if self.realistic_latency {
                SimulatedLatency::default()
            } else {
                SimulatedLatency::instant()
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            realistic_latency: true,
            step_pacing: true,
            address_wait: Duration::from_secs(60),
        }
    }
}
