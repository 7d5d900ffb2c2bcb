use core_lib::CoreError;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:3500";

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub api_url: String,
    pub request_timeout: Duration,
    pub session_ttl_seconds: u64,
    pub event_capacity: usize,
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            session_ttl_seconds: 3600,
            event_capacity: 100,
            log_level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let defaults = Self::default();
        let timeout_secs = number(&lookup, "GATEWAY_TIMEOUT_SECS", defaults.request_timeout.as_secs())?;
        let event_capacity = number(&lookup, "SESSION_EVENT_CAPACITY", defaults.event_capacity)?;
        if event_capacity == 0 {
            return Err(CoreError::Configuration(
                "SESSION_EVENT_CAPACITY must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            api_url: lookup("ATTENDANCE_API_URL")
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.api_url),
            request_timeout: Duration::from_secs(timeout_secs),
            session_ttl_seconds: number(&lookup, "SESSION_TTL_SECONDS", defaults.session_ttl_seconds)?,
            event_capacity,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }
}

fn number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, CoreError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Configuration(format!("{} is not a valid number: {:?}", key, raw))),
        None => Ok(default),
    }
}
