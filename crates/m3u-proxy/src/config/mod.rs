//! Application configuration (spec §6.4).
//!
//! Loaded with `figment`: a TOML file layered under environment variables
//! (`M3U_PROXY__HTTP_CLIENT__TIMEOUT_SECS=10`, double-underscore nesting).
//! Config *loading* (a CLI wizard, validation UI) is out of scope per spec
//! §1; this module only owns the shape every other component reads from.

mod duration_serde;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_dsn: String,
    pub storage_base_dir: PathBuf,
    pub base_url: String,
    pub http_client: HttpClientConfig,
    pub circuitbreaker: CircuitBreakerConfig,
    pub scheduler: SchedulerConfig,
    /// Absence means encoding profiles that require it are rejected at
    /// proxy creation time (spec §6.4).
    pub transcoder_binary: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_dsn: "memory://".to_string(),
            storage_base_dir: PathBuf::from("./data"),
            base_url: "http://localhost:8080".to_string(),
            http_client: HttpClientConfig::default(),
            circuitbreaker: CircuitBreakerConfig::default(),
            scheduler: SchedulerConfig::default(),
            transcoder_binary: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file overlaid with `M3U_PROXY__`-prefixed
    /// environment variables, falling back to [`Config::default`] for
    /// anything neither source sets.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("M3U_PROXY__").split("__"));
        figment.extract().context("failed to load configuration")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub json: bool,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { json: false, filter: "info".to_string() }
    }
}

/// Default timeout/retry/backoff settings plus per-service overrides (spec
/// §4.1: "configured timeout, retry count N, base delay D, multiplier M, max
/// delay Dmax").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    #[serde(with = "duration_serde")]
    pub timeout: std::time::Duration,
    pub max_retries: u32,
    #[serde(with = "duration_serde")]
    pub base_delay: std::time::Duration,
    pub backoff_multiplier: f64,
    #[serde(with = "duration_serde")]
    pub max_delay: std::time::Duration,
    /// 0 disables the byte-count limiter.
    pub max_response_size: u64,
    pub user_agent: String,
    /// Per-service overrides of the fields above, keyed by service name
    /// (`source_m3u`, `logo_fetch`, ...).
    #[serde(default)]
    pub services: HashMap<String, HttpServiceOverride>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: std::time::Duration::from_secs(30),
            max_retries: 3,
            base_delay: std::time::Duration::from_millis(200),
            backoff_multiplier: 2.0,
            max_delay: std::time::Duration::from_secs(10),
            max_response_size: 100 * 1024 * 1024,
            user_agent: "m3u-proxy/0.1".to_string(),
            services: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpServiceOverride {
    pub max_retries: Option<u32>,
    pub max_response_size: Option<u64>,
}

/// Circuit breaker configuration with named per-service profiles, mirroring
/// §4.1's "profile (threshold, reset_timeout, half_open_max, acceptable
/// status codes)".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub global: CircuitBreakerProfile,
    #[serde(default)]
    pub profiles: HashMap<String, CircuitBreakerProfile>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        // spec §4.1: "logo_fetch defaults to treating 404 as acceptable so
        // missing artwork does not trip the breaker."
        profiles.insert(
            "logo_fetch".to_string(),
            CircuitBreakerProfile { acceptable_status_codes: vec!["200-299".to_string(), "404".to_string()], ..CircuitBreakerProfile::default() },
        );
        Self { global: CircuitBreakerProfile::default(), profiles }
    }
}

impl CircuitBreakerConfig {
    pub fn profile_for(&self, service_name: &str) -> &CircuitBreakerProfile {
        self.profiles.get(service_name).unwrap_or(&self.global)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerProfile {
    pub failure_threshold: u32,
    #[serde(with = "duration_serde")]
    pub reset_timeout: std::time::Duration,
    pub half_open_max: u32,
    /// Individual codes ("404") or ranges ("200-299"); empty means "default
    /// to 2xx" per spec §4.1.
    pub acceptable_status_codes: Vec<String>,
}

impl Default for CircuitBreakerProfile {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: std::time::Duration::from_secs(30),
            half_open_max: 1,
            acceptable_status_codes: vec!["200-299".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub queue_capacity: usize,
    pub worker_count: usize,
    #[serde(with = "duration_serde")]
    pub poll_interval: std::time::Duration,
    #[serde(with = "duration_serde")]
    pub failure_backoff: std::time::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            worker_count: 4,
            poll_interval: std::time::Duration::from_secs(5),
            failure_backoff: std::time::Duration::from_secs(60),
        }
    }
}
