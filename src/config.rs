use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Backend root; the REST API lives under `{backend_url}/api`
    pub backend_url: String,
    pub host: String,
    pub port: u16,
    pub card_identifier: String,
    pub request_timeout_ms: u64,

    // Remote/mock routing
    pub probe_timeout_ms: u64,
    pub route_ttl_secs: u64,

    // Provisioning sequence
    pub provisioning_duration_ms: u64,
    pub status_poll_interval_ms: u64,
    pub status_poll_attempts: u32,

    pub mock_latency: bool,

    // Security
    pub secure_cookies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8001".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            card_identifier: "default_card".to_string(),
            request_timeout_ms: 10_000,
            probe_timeout_ms: 1500,
            route_ttl_secs: 30,
            provisioning_duration_ms: 6000,
            status_poll_interval_ms: 500,
            status_poll_attempts: 10,
            mock_latency: true,
            secure_cookies: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        let defaults = Self::default();

        Ok(Self {
            backend_url: config
                .get::<String>("backend_url")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.backend_url),
            host: config.get("host").unwrap_or(defaults.host),
            port: config.get("port").unwrap_or(defaults.port),
            card_identifier: config
                .get("card_identifier")
                .unwrap_or(defaults.card_identifier),
            request_timeout_ms: config
                .get("request_timeout_ms")
                .unwrap_or(defaults.request_timeout_ms),

            probe_timeout_ms: config
                .get("probe_timeout_ms")
                .unwrap_or(defaults.probe_timeout_ms),
            route_ttl_secs: config
                .get("route_ttl_secs")
                .unwrap_or(defaults.route_ttl_secs),

            provisioning_duration_ms: config
                .get("provisioning_duration_ms")
                .unwrap_or(defaults.provisioning_duration_ms),
            status_poll_interval_ms: config
                .get("status_poll_interval_ms")
                .unwrap_or(defaults.status_poll_interval_ms),
            status_poll_attempts: config
                .get("status_poll_attempts")
                .unwrap_or(defaults.status_poll_attempts),

            mock_latency: config.get("mock_latency").unwrap_or(defaults.mock_latency),
            secure_cookies: config
                .get("secure_cookies")
                .unwrap_or(defaults.secure_cookies),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn route_ttl(&self) -> Duration {
        Duration::from_secs(self.route_ttl_secs)
    }

    pub fn sequencer(&self) -> crate::services::SequencerConfig {
        crate::services::SequencerConfig {
            total_duration: Duration::from_millis(self.provisioning_duration_ms),
            poll_interval: Duration::from_millis(self.status_poll_interval_ms),
            max_polls: self.status_poll_attempts,
        }
    }
}
