// src/config/app.rs
use std::net::SocketAddr;
use std::time::Duration;

use tracing::debug;

use crate::error::ConfigError;
use crate::listen::providers::prime::{
    PrimeCredentials, DEFAULT_PRIME_API_URL, ENV_PRIME_CREDENTIALS,
};
use crate::listen::ListenerConfig;

pub const ENV_NAME: &str = "ENV_NAME";
pub const AWS_REGION: &str = "AWS_REGION";
pub const LRU_CACHE_SIZE: &str = "LRU_CACHE_SIZE";
pub const ACTIVITY_POLL_FREQUENCY: &str = "ACTIVITY_POLL_FREQUENCY";
pub const LIST_ACTIVITIES_TIMEOUT: &str = "LIST_ACTIVITIES_TIMEOUT";
pub const SNS_PUBLISH_TIMEOUT: &str = "SNS_PUBLISH_TIMEOUT";
pub const ACTIVITY_PAGE_LIMIT: &str = "ACTIVITY_PAGE_LIMIT";
pub const HTTP_CONNECT_TIMEOUT: &str = "HTTP_CONNECT_TIMEOUT";
pub const HTTP_CONN_KEEP_ALIVE: &str = "HTTP_CONN_KEEP_ALIVE";
pub const HTTP_IDLE_CONN: &str = "HTTP_IDLE_CONN";
pub const HTTP_MAX_HOST_IDLE_CONNS: &str = "HTTP_MAX_HOST_IDLE_CONNS";
pub const HTTP_RESPONSE_HEADER: &str = "HTTP_RESPONSE_HEADER";
pub const ACTIVITY_TOPIC_ARN: &str = "ACTIVITY_TOPIC_ARN";
pub const PRIME_API_URL: &str = "PRIME_API_URL";
pub const METRICS_ADDR: &str = "METRICS_ADDR";

const TOPIC_NOT_SET: &str = "NOTSET";
const SECOND: Duration = Duration::from_secs(1);

/// Outbound HTTP tuning for the feed client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub keep_alive: Duration,
    pub idle_conn: Duration,
    pub max_host_idle_conns: usize,
    /// Deadline for the response headers only. Body reads are bounded by the
    /// caller's fetch timeout.
    pub response_header_timeout: Duration,
}

impl HttpConfig {
    pub fn build_client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .tcp_keepalive(self.keep_alive)
            .pool_idle_timeout(self.idle_conn)
            .pool_max_idle_per_host(self.max_host_idle_conns)
            .build()
            .map_err(|e| ConfigError::Invalid {
                name: "HTTP_*",
                reason: format!("cannot build http client: {e}"),
            })
    }
}

/// Everything the process needs, validated up front.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env_name: String,
    pub aws_region: String,
    pub activity_topic_arn: String,
    pub cache_capacity: usize,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub publish_timeout: Duration,
    pub page_limit: u32,
    pub http: HttpConfig,
    pub prime_api_url: String,
    pub prime_credentials: PrimeCredentials,
    pub metrics_addr: Option<SocketAddr>,
}

impl AppConfig {
    /// Read from the process environment (call `dotenvy::dotenv()` first to pick up `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let or = |key: &'static str, default: &str| value(key).unwrap_or_else(|| default.to_string());

        let secs = |key: &'static str, default: &str| -> Result<Duration, ConfigError> {
            let d = duration_from_str_int(key, &or(key, default), SECOND)?;
            require_positive(key, d.as_secs())?;
            Ok(d)
        };
        let count = |key: &'static str, default: &str| -> Result<u64, ConfigError> {
            let n = parse_int(key, &or(key, default))?;
            require_positive(key, n)?;
            Ok(n)
        };

        let activity_topic_arn = or(ACTIVITY_TOPIC_ARN, TOPIC_NOT_SET);
        if activity_topic_arn == TOPIC_NOT_SET {
            return Err(ConfigError::Missing(ACTIVITY_TOPIC_ARN));
        }

        let prime_credentials = value(ENV_PRIME_CREDENTIALS)
            .ok_or(ConfigError::Missing(ENV_PRIME_CREDENTIALS))
            .and_then(|raw| PrimeCredentials::from_json(&raw))?;

        let metrics_addr = match value(METRICS_ADDR) {
            None => None,
            Some(raw) => Some(raw.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
                name: METRICS_ADDR,
                reason: e.to_string(),
            })?),
        };

        let page_limit = count(ACTIVITY_PAGE_LIMIT, "100")?;
        let page_limit = u32::try_from(page_limit).map_err(|_| ConfigError::Invalid {
            name: ACTIVITY_PAGE_LIMIT,
            reason: "page limit out of range".to_string(),
        })?;

        let cfg = Self {
            env_name: or(ENV_NAME, "local"),
            aws_region: or(AWS_REGION, "us-east-1"),
            activity_topic_arn,
            cache_capacity: usize::try_from(count(LRU_CACHE_SIZE, "100000")?).map_err(|_| {
                ConfigError::Invalid {
                    name: LRU_CACHE_SIZE,
                    reason: "capacity out of range".to_string(),
                }
            })?,
            poll_interval: secs(ACTIVITY_POLL_FREQUENCY, "5")?,
            fetch_timeout: secs(LIST_ACTIVITIES_TIMEOUT, "10")?,
            publish_timeout: secs(SNS_PUBLISH_TIMEOUT, "10")?,
            page_limit,
            http: HttpConfig {
                connect_timeout: secs(HTTP_CONNECT_TIMEOUT, "5")?,
                keep_alive: secs(HTTP_CONN_KEEP_ALIVE, "30")?,
                idle_conn: secs(HTTP_IDLE_CONN, "90")?,
                max_host_idle_conns: count(HTTP_MAX_HOST_IDLE_CONNS, "5")? as usize,
                response_header_timeout: secs(HTTP_RESPONSE_HEADER, "5")?,
            },
            prime_api_url: or(PRIME_API_URL, DEFAULT_PRIME_API_URL),
            prime_credentials,
            metrics_addr,
        };

        debug!(target: "config", ?cfg, "configuration loaded");
        Ok(cfg)
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            portfolio_id: self.prime_credentials.portfolio_id.clone(),
            cache_capacity: self.cache_capacity,
            poll_interval: self.poll_interval,
            fetch_timeout: self.fetch_timeout,
            publish_timeout: self.publish_timeout,
            page_limit: self.page_limit,
        }
    }
}

/// `ENV_NAME` unset, blank, or `local` selects human-readable local logging.
pub fn is_local_env(env_name: Option<&str>) -> bool {
    env_name
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or(true, |v| v == "local")
}

/// `"10"` with a unit of one second is ten seconds.
pub fn duration_from_str_int(
    name: &'static str,
    value: &str,
    unit: Duration,
) -> Result<Duration, ConfigError> {
    let n = parse_int(name, value)?;
    let n = u32::try_from(n).map_err(|_| ConfigError::Invalid {
        name,
        reason: format!("{n} is out of range"),
    })?;
    unit.checked_mul(n).ok_or_else(|| ConfigError::Invalid {
        name,
        reason: "duration overflows".to_string(),
    })
}

fn parse_int(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::Malformed {
        name,
        value: value.to_string(),
    })
}

fn require_positive(name: &'static str, n: u64) -> Result<(), ConfigError> {
    if n == 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
