//! Configuration management

use std::time::Duration;

use anyhow::{Context, Result};

use crate::services::hos::{CyclePolicy, EngineConfig, RestStatus};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// PostgreSQL connection string (required to serve or migrate)
    pub database_url: Option<String>,

    /// Nominatim API URL (for geocoding)
    pub nominatim_url: String,

    /// Valhalla routing engine URL (optional, falls back to mock if unavailable)
    pub valhalla_url: Option<String>,

    /// "mock" or "nominatim"
    pub geocoder_backend: String,

    /// Timeout for each geocoding or routing call
    pub routing_timeout: Duration,

    /// Duty status used for 10-hour resets
    pub rest_status: RestStatus,

    /// What to do when the 70-hour cycle runs out mid-trip
    pub cycle_policy: CyclePolicy,
}

const DEFAULT_ROUTING_TIMEOUT_SECS: u64 = 5;

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let nats_url = get("NATS_URL").unwrap_or_else(|| "nats://localhost:4222".to_string());

        let database_url = get("DATABASE_URL").filter(|s| !s.is_empty());

        let nominatim_url = get("NOMINATIM_URL")
            .unwrap_or_else(|| crate::services::geocoding::DEFAULT_NOMINATIM_URL.to_string());

        let valhalla_url = get("VALHALLA_URL").filter(|s| !s.is_empty());

        let geocoder_backend = get("GEOCODER_BACKEND").unwrap_or_else(|| "mock".to_string());

        let routing_timeout_secs = match get("ROUTING_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("ROUTING_TIMEOUT_SECS must be a whole number of seconds, got '{}'", raw))?,
            None => DEFAULT_ROUTING_TIMEOUT_SECS,
        };
        if routing_timeout_secs == 0 {
            anyhow::bail!("ROUTING_TIMEOUT_SECS must be greater than zero");
        }

        let rest_status = match get("HOS_REST_STATUS") {
            Some(raw) => raw.parse::<RestStatus>().map_err(anyhow::Error::msg)?,
            None => RestStatus::default(),
        };

        let cycle_policy = match get("HOS_CYCLE_POLICY") {
            Some(raw) => raw.parse::<CyclePolicy>().map_err(anyhow::Error::msg)?,
            None => CyclePolicy::default(),
        };

        Ok(Self {
            nats_url,
            database_url,
            nominatim_url,
            valhalla_url,
            geocoder_backend,
            routing_timeout: Duration::from_secs(routing_timeout_secs),
            rest_status,
            cycle_policy,
        })
    }

    /// Database URL, or an error naming the missing variable.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set")
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            rest_status: self.rest_status,
            cycle_policy: self.cycle_policy,
            ..EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_config_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.nats_url, "nats://localhost:4222");
        assert!(config.database_url.is_none());
        assert!(config.valhalla_url.is_none());
        assert_eq!(config.nominatim_url, "https://nominatim.openstreetmap.org");
        assert_eq!(config.geocoder_backend, "mock");
        assert_eq!(config.routing_timeout, Duration::from_secs(5));
        assert_eq!(config.rest_status, RestStatus::SleeperBerth);
        assert_eq!(config.cycle_policy, CyclePolicy::Reject);
    }

    #[test]
    fn test_config_valhalla_url_some_when_set() {
        let config = config(&[("VALHALLA_URL", "http://localhost:8002")]).unwrap();
        assert_eq!(config.valhalla_url, Some("http://localhost:8002".to_string()));
    }

    #[test]
    fn test_config_engine_settings() {
        let config = config(&[
            ("HOS_REST_STATUS", "off_duty"),
            ("HOS_CYCLE_POLICY", "truncate"),
            ("ROUTING_TIMEOUT_SECS", "12"),
        ])
        .unwrap();
        assert_eq!(config.routing_timeout, Duration::from_secs(12));
        let engine = config.engine();
        assert_eq!(engine.rest_status, RestStatus::OffDuty);
        assert_eq!(engine.cycle_policy, CyclePolicy::Truncate);
        assert_eq!(engine.limits.max_driving_hours, 11.0);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(config(&[("ROUTING_TIMEOUT_SECS", "soon")]).is_err());
        assert!(config(&[("ROUTING_TIMEOUT_SECS", "0")]).is_err());
        assert!(config(&[("HOS_CYCLE_POLICY", "restart")]).is_err());
        assert!(config(&[("HOS_REST_STATUS", "nap")]).is_err());
    }

    #[test]
    fn test_config_requires_database_url_on_demand() {
        let missing = config(&[]).unwrap();
        assert!(missing.require_database_url().is_err());

        let present = config(&[("DATABASE_URL", "postgres://test")]).unwrap();
        assert_eq!(present.require_database_url().unwrap(), "postgres://test");
    }

    #[test]
    #[ignore] // requires --test-threads=1 due to env var race
    fn test_config_from_process_env() {
        std::env::set_var("NOMINATIM_URL", "http://localhost:8080");
        let config = Config::from_env().unwrap();
        assert_eq!(config.nominatim_url, "http://localhost:8080");
        std::env::remove_var("NOMINATIM_URL");
    }
}
