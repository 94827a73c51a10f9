//! Configuration for the Survey Monkey webhook service.

use std::{collections::HashMap, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use surveyhook_dispatch::{
    retry::{BackoffStrategy, RetryPolicy},
    HandlerMapping, WorkerConfig,
};

const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "SURVEYHOOK_";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Environment variables use the `SURVEYHOOK_` prefix and `__` for nesting,
/// so `SURVEYHOOK_JOBS__RESPONSE_COMPLETED=handle_response_completed` maps
/// the `response.completed` event type. `DATABASE_URL`, `RUST_LOG` and
/// `SURVEYMONKEY_API_SECRET` are also read without the prefix.
///
/// # Example
///
/// ```no_run
/// use surveyhook_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Server will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Database
    /// PostgreSQL connection URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Maximum number of database connections in the pool.
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,
    /// Minimum number of connections to maintain in the pool.
    #[serde(default = "default_min_connections")]
    pub database_min_connections: u32,
    /// Database connection acquire timeout in seconds.
    #[serde(default = "default_acquire_timeout")]
    pub database_connection_timeout: u64,

    // Server
    /// Server bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Server bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Largest accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    // Webhook
    /// Name stored on every delivery record.
    #[serde(default = "default_webhook_name")]
    pub webhook_name: String,
    /// Default signing secret (the Survey Monkey api secret).
    ///
    /// Environment variable: `SURVEYMONKEY_API_SECRET`
    #[serde(default)]
    pub signing_secret: String,
    /// Per-endpoint signing secrets, selected by the route's config key.
    #[serde(default)]
    pub signing_secrets: HashMap<String, String>,
    /// Sanitised event type to handler identifier.
    #[serde(default)]
    pub jobs: HandlerMapping,
    /// Payload field holding the event type. Dots walk into nested objects.
    #[serde(default = "default_event_type_key")]
    pub event_type_key: String,
    /// Header carrying the api key.
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    /// Header carrying the signature.
    #[serde(default = "default_signature_header")]
    pub signature_header: String,

    // Workers
    /// Number of concurrent handler workers.
    #[serde(default = "default_worker_count")]
    pub worker_pool_size: usize,
    /// Capacity of the handler job queue.
    #[serde(default = "default_queue_capacity")]
    pub worker_queue_capacity: usize,
    /// Seconds to wait for workers on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    // Retry
    /// Maximum runs per handler job.
    #[serde(default = "default_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Base delay for exponential backoff in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Jitter factor for retry timing (0.0 to 1.0).
    #[serde(default = "default_jitter_factor")]
    pub retry_jitter_factor: f64,

    // Logging
    /// Log filter directives.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

impl Config {
    /// Loads configuration from defaults, `config.toml` and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    /// Returns the layered providers `load` reads from.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw().only(&["DATABASE_URL", "RUST_LOG"]))
            .merge(Env::raw().only(&["SURVEYMONKEY_API_SECRET"]).map(|_| "signing_secret".into()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extracts and validates configuration from custom providers.
    ///
    /// # Errors
    ///
    /// Returns an error if extraction or validation fails.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Converts to the worker pool configuration.
    pub fn to_worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            worker_count: self.worker_pool_size,
            queue_capacity: self.worker_queue_capacity,
            retry_policy: self.to_retry_policy(),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout),
        }
    }

    /// Converts to the handler retry policy.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter_factor: self.retry_jitter_factor,
            backoff_strategy: BackoffStrategy::Exponential,
        }
    }

    /// Parses the server socket address from host and port.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Returns the database URL with its password masked for logging.
    pub fn database_url_masked(&self) -> String {
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let mut masked = self.database_url.clone();
                masked.replace_range(colon_pos + 1..at_pos, "***");
                return masked;
            }
        }
        self.database_url.clone()
    }

    /// Validates configuration values.
    ///
    /// A missing signing secret is allowed: every signed request then fails
    /// verification.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.database_max_connections == 0 {
            anyhow::bail!("database max_connections must be greater than 0");
        }

        if self.database_min_connections > self.database_max_connections {
            anyhow::bail!("database min_connections cannot exceed max_connections");
        }

        if self.max_body_bytes == 0 {
            anyhow::bail!("max_body_bytes must be greater than 0");
        }

        if self.worker_pool_size == 0 {
            anyhow::bail!("worker_pool_size must be greater than 0");
        }

        if self.worker_queue_capacity == 0 {
            anyhow::bail!("worker_queue_capacity must be greater than 0");
        }

        if self.max_retry_attempts == 0 {
            anyhow::bail!("max_retry_attempts must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            anyhow::bail!("retry_jitter_factor must be between 0.0 and 1.0");
        }

        for (name, value) in [
            ("event_type_key", &self.event_type_key),
            ("api_key_header", &self.api_key_header),
            ("signature_header", &self.signature_header),
            ("webhook_name", &self.webhook_name),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{name} must not be empty");
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            database_max_connections: default_max_connections(),
            database_min_connections: default_min_connections(),
            database_connection_timeout: default_acquire_timeout(),
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
            webhook_name: default_webhook_name(),
            signing_secret: String::new(),
            signing_secrets: HashMap::new(),
            jobs: HandlerMapping::default(),
            event_type_key: default_event_type_key(),
            api_key_header: default_api_key_header(),
            signature_header: default_signature_header(),
            worker_pool_size: default_worker_count(),
            worker_queue_capacity: default_queue_capacity(),
            shutdown_timeout: default_shutdown_timeout(),
            max_retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_base_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            retry_jitter_factor: default_jitter_factor(),
            rust_log: default_log_level(),
        }
    }
}

fn default_database_url() -> String {
    "postgresql://localhost/surveyhook".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_webhook_name() -> String {
    surveyhook_dispatch::DEFAULT_WEBHOOK_NAME.to_string()
}

fn default_event_type_key() -> String {
    surveyhook_dispatch::DEFAULT_EVENT_TYPE_KEY.to_string()
}

fn default_api_key_header() -> String {
    "sm-apikey".to_string()
}

fn default_signature_header() -> String {
    "sm-signature".to_string()
}

fn default_worker_count() -> usize {
    surveyhook_dispatch::DEFAULT_WORKER_COUNT
}

fn default_queue_capacity() -> usize {
    surveyhook_dispatch::DEFAULT_QUEUE_CAPACITY
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60000
}

fn default_jitter_factor() -> f64 {
    0.25
}

fn default_log_level() -> String {
    "info".to_string()
}
