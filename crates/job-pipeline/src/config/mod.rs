use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub pipeline: PipelineConfig,
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
            pipeline: PipelineConfig::from_env()?,
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for the status pipeline and its analytics.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Longest a mutation waits for the per-application lock.
    pub lock_timeout: Duration,
    /// Offset used to cut timestamps into activity days.
    pub activity_offset: FixedOffset,
    pub recent_window_days: u32,
    pub catalog_csv: Option<PathBuf>,
}

const MAX_OFFSET_MINUTES: u32 = 24 * 60;

impl PipelineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let lock_timeout_ms = env::var("PIPELINE_LOCK_TIMEOUT_MS")
            .unwrap_or_else(|_| "250".to_string())
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or(ConfigError::InvalidLockTimeout)?;

        let offset_minutes = env::var("PIPELINE_UTC_OFFSET_MINUTES")
            .unwrap_or_else(|_| "0".to_string())
            .parse::<i32>()
            .map_err(|_| ConfigError::InvalidUtcOffset)?;
        if offset_minutes.unsigned_abs() >= MAX_OFFSET_MINUTES {
            return Err(ConfigError::InvalidUtcOffset);
        }
        let activity_offset =
            FixedOffset::east_opt(offset_minutes * 60).ok_or(ConfigError::InvalidUtcOffset)?;

        let recent_window_days = env::var("PIPELINE_RECENT_WINDOW_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidRecentWindow)?;

        let catalog_csv = env::var("PIPELINE_CATALOG_CSV")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            activity_offset,
            recent_window_days,
            catalog_csv,
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(250),
            activity_offset: Utc.fix(),
            recent_window_days: 30,
            catalog_csv: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidLockTimeout,
    InvalidUtcOffset,
    InvalidRecentWindow,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLockTimeout => {
                write!(f, "PIPELINE_LOCK_TIMEOUT_MS must be a positive integer")
            }
            ConfigError::InvalidUtcOffset => write!(
                f,
                "PIPELINE_UTC_OFFSET_MINUTES must be an integer strictly within +/-1440"
            ),
            ConfigError::InvalidRecentWindow => {
                write!(f, "PIPELINE_RECENT_WINDOW_DAYS must be a non-negative integer")
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
