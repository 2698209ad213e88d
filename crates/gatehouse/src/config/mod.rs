use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::workflows::intake::{ChannelId, RetryPolicy, RoleId};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application, loaded once at process start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub intake: IntakeConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            intake: IntakeConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Identifiers and tunables for the intake workflow. Every identifier is
/// required; the process refuses to start without them rather than failing at
/// first use.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub entry_channel: ChannelId,
    pub review_channel: ChannelId,
    pub approved_channel: ChannelId,
    pub rejected_channel: ChannelId,
    pub provisioning_channel: ChannelId,
    pub staff_role: RoleId,
    pub approved_role: RoleId,
    /// Wait for each questionnaire answer.
    pub answer_timeout: Duration,
    /// Wait for a rejection reason from the deciding staff member.
    pub reason_timeout: Duration,
    /// Retry policy for durable record-store writes.
    pub retry: RetryPolicy,
}

impl IntakeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            entry_channel: ChannelId(require("INTAKE_ENTRY_CHANNEL_ID")?),
            review_channel: ChannelId(require("INTAKE_REVIEW_CHANNEL_ID")?),
            approved_channel: ChannelId(require("INTAKE_APPROVED_CHANNEL_ID")?),
            rejected_channel: ChannelId(require("INTAKE_REJECTED_CHANNEL_ID")?),
            provisioning_channel: ChannelId(require("INTAKE_PROVISIONING_CHANNEL_ID")?),
            staff_role: RoleId(require("INTAKE_STAFF_ROLE_ID")?),
            approved_role: RoleId(require("INTAKE_APPROVED_ROLE_ID")?),
            answer_timeout: Duration::from_secs(positive_secs("INTAKE_ANSWER_TIMEOUT_SECS", 300)?),
            reason_timeout: Duration::from_secs(positive_secs("INTAKE_REASON_TIMEOUT_SECS", 120)?),
            retry: RetryPolicy {
                attempts: positive_u32("INTAKE_STORE_RETRY_ATTEMPTS", 3)?,
                delay: Duration::from_secs(positive_secs("INTAKE_STORE_RETRY_DELAY_SECS", 3)?),
            },
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingVar { name }),
    }
}

fn positive_secs(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidNumber { name }),
        },
    }
}

fn positive_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().parse::<u32>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidNumber { name }),
        },
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    MissingVar { name: &'static str },
    InvalidNumber { name: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::MissingVar { name } => {
                write!(f, "required environment variable {name} is not set")
            }
            ConfigError::InvalidNumber { name } => {
                write!(f, "{name} must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
