//! Configuration management for the fanout gateway.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use fanout_delivery::{ClientConfig, WrapperConfig};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// The service works out-of-the-box with production-ready defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    // Intake front door
    /// Workers in the intake front-door pool.
    ///
    /// Environment variable: `INTAKE_WORKERS`
    #[serde(default = "default_intake_workers", alias = "INTAKE_WORKERS")]
    pub intake_workers: usize,
    /// Queue capacity of the intake front-door pool.
    ///
    /// Environment variable: `INTAKE_QUEUE_SIZE`
    #[serde(default = "default_intake_queue_size", alias = "INTAKE_QUEUE_SIZE")]
    pub intake_queue_size: usize,

    // Dispatch
    /// Workers draining each listener's delivery queue.
    ///
    /// Environment variable: `SENDER_WORKERS`
    #[serde(default = "default_sender_workers", alias = "SENDER_WORKERS")]
    pub sender_workers: usize,
    /// Capacity of each listener's delivery queue.
    ///
    /// Environment variable: `SENDER_QUEUE_SIZE`
    #[serde(default = "default_sender_queue_size", alias = "SENDER_QUEUE_SIZE")]
    pub sender_queue_size: usize,
    /// Minimum seconds between cut-off notifications per listener.
    ///
    /// Environment variable: `SENDER_CUT_OFF_PERIOD`
    #[serde(default = "default_cut_off_period", alias = "SENDER_CUT_OFF_PERIOD")]
    pub sender_cut_off_period: u64,
    /// Seconds an expired sender lingers before eviction.
    ///
    /// Environment variable: `SENDER_LINGER`
    #[serde(default = "default_linger", alias = "SENDER_LINGER")]
    pub sender_linger: u64,

    // Outbound client
    /// HTTP request timeout for outbound delivery in seconds.
    ///
    /// Environment variable: `DELIVERY_TIMEOUT_SECONDS`
    #[serde(default = "default_delivery_timeout", alias = "DELIVERY_TIMEOUT_SECONDS")]
    pub delivery_timeout_seconds: u64,

    // Registration
    /// Store TTL, and default lifetime, of a registration in seconds.
    ///
    /// Environment variable: `REGISTRATION_TTL_SECONDS`
    #[serde(default = "default_registration_ttl", alias = "REGISTRATION_TTL_SECONDS")]
    pub registration_ttl_seconds: u64,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment
    /// variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when a source cannot be read or validation fails.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to the dispatch engine's configuration type.
    pub fn to_wrapper_config(&self) -> WrapperConfig {
        WrapperConfig {
            num_workers_per_sender: self.sender_workers,
            queue_size_per_sender: self.sender_queue_size,
            cut_off_period: Duration::from_secs(self.sender_cut_off_period),
            linger: Duration::from_secs(self.sender_linger),
        }
    }

    /// Convert to the outbound client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.delivery_timeout_seconds),
            ..ClientConfig::default()
        }
    }

    /// Parse server socket address from host and port configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the combined address does not parse.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.intake_workers == 0 {
            anyhow::bail!("intake_workers must be greater than 0");
        }

        if self.intake_queue_size == 0 {
            anyhow::bail!("intake_queue_size must be greater than 0");
        }

        if self.sender_workers == 0 {
            anyhow::bail!("sender_workers must be greater than 0");
        }

        if self.sender_queue_size == 0 {
            anyhow::bail!("sender_queue_size must be greater than 0");
        }

        if self.sender_cut_off_period == 0 {
            anyhow::bail!("sender_cut_off_period must be greater than 0");
        }

        if self.sender_linger == 0 {
            anyhow::bail!("sender_linger must be greater than 0");
        }

        if self.registration_ttl_seconds == 0 {
            anyhow::bail!("registration_ttl_seconds must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            intake_workers: default_intake_workers(),
            intake_queue_size: default_intake_queue_size(),
            sender_workers: default_sender_workers(),
            sender_queue_size: default_sender_queue_size(),
            sender_cut_off_period: default_cut_off_period(),
            sender_linger: default_linger(),
            delivery_timeout_seconds: default_delivery_timeout(),
            registration_ttl_seconds: default_registration_ttl(),
            rust_log: default_log_level(),
        }
    }
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

fn default_intake_workers() -> usize {
    50
}

fn default_intake_queue_size() -> usize {
    100
}

fn default_sender_workers() -> usize {
    fanout_delivery::DEFAULT_WORKERS_PER_SENDER
}

fn default_sender_queue_size() -> usize {
    fanout_delivery::DEFAULT_QUEUE_SIZE_PER_SENDER
}

fn default_cut_off_period() -> u64 {
    30
}

fn default_linger() -> u64 {
    180
}

fn default_delivery_timeout() -> u64 {
    fanout_delivery::DEFAULT_TIMEOUT_SECONDS
}

fn default_registration_ttl() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}
