//! Environment configuration
//!
//! Reads the listening port and upstream credentials from process
//! environment variables. A `.env` file is honoured by the binary before
//! this module is consulted.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::server::ServerConfig;
use crate::supervisor::SupervisorConfig;
use crate::upstream::sse::SseConfig;

pub const TCP_PORT: &str = "TCP_PORT";
pub const CONNECTION_STRING: &str = "CONNECTION_STRING";
pub const EVENT_HUB_NAME: &str = "EVENT_HUB_NAME";
pub const CONSUMER_GROUP: &str = "CONSUMER_GROUP";
pub const BIND_ADDRESS: &str = "BIND_ADDRESS";
pub const HEALTH_CHECK_INTERVAL_MS: &str = "HEALTH_CHECK_INTERVAL_MS";
pub const WRITE_TIMEOUT_MS: &str = "WRITE_TIMEOUT_MS";
pub const MAX_BATCH_SIZE: &str = "MAX_BATCH_SIZE";

/// Consumer group used when `CONSUMER_GROUP` is unset
pub const DEFAULT_CONSUMER_GROUP: &str = "$Default";

/// Configuration loading errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is not defined")]
    Missing(&'static str),

    #[error("Environment variable {name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("Connection string has no Endpoint")]
    MissingEndpoint,
}

/// Parsed upstream connection string
///
/// Accepts either a bare URL or a `Key=Value;` list carrying `Endpoint`
/// and an optional `SharedAccessKey`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub endpoint: String,
    pub access_key: Option<String>,
}

impl FromStr for ConnectionString {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let is_key_value = s.contains(';') || s.to_ascii_lowercase().starts_with("endpoint=");
        if !is_key_value {
            if s.is_empty() {
                return Err(ConfigError::MissingEndpoint);
            }
            return Ok(Self {
                endpoint: s.trim_end_matches('/').to_string(),
                access_key: None,
            });
        }

        let mut endpoint = None;
        let mut access_key = None;
        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim() {
                k if k.eq_ignore_ascii_case("Endpoint") => {
                    endpoint = Some(value.trim().trim_end_matches('/').to_string());
                }
                k if k.eq_ignore_ascii_case("SharedAccessKey") => {
                    access_key = Some(value.trim().to_string());
                }
                _ => {}
            }
        }

        match endpoint {
            Some(endpoint) if !endpoint.is_empty() => Ok(Self {
                endpoint,
                access_key,
            }),
            _ => Err(ConfigError::MissingEndpoint),
        }
    }
}

/// Complete relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub supervisor: SupervisorConfig,
    pub upstream: SseConfig,
}

impl RelayConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let connection_string = required(&lookup, CONNECTION_STRING)?;
        let event_hub_name = required(&lookup, EVENT_HUB_NAME)?;
        let port: u16 = parse(TCP_PORT, required(&lookup, TCP_PORT)?)?;

        let connection: ConnectionString = connection_string.parse()?;

        let bind_ip = match lookup(BIND_ADDRESS) {
            Some(value) => parse::<IpAddr>(BIND_ADDRESS, value)?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let mut server = ServerConfig::with_addr(SocketAddr::new(bind_ip, port));
        if let Some(value) = lookup(WRITE_TIMEOUT_MS) {
            let ms: u64 = parse(WRITE_TIMEOUT_MS, value)?;
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    name: WRITE_TIMEOUT_MS,
                    value: ms.to_string(),
                });
            }
            server = server.write_timeout(Duration::from_millis(ms));
        }

        let mut supervisor = SupervisorConfig::default();
        if let Some(value) = lookup(HEALTH_CHECK_INTERVAL_MS) {
            let ms: u64 = parse(HEALTH_CHECK_INTERVAL_MS, value)?;
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    name: HEALTH_CHECK_INTERVAL_MS,
                    value: ms.to_string(),
                });
            }
            supervisor = supervisor.health_check_interval(Duration::from_millis(ms));
        }

        let mut upstream = SseConfig::new(connection, event_hub_name);
        if let Some(group) = lookup(CONSUMER_GROUP) {
            upstream = upstream.consumer_group(group);
        }
        if let Some(value) = lookup(MAX_BATCH_SIZE) {
            let size: usize = parse(MAX_BATCH_SIZE, value)?;
            if size == 0 {
                return Err(ConfigError::Invalid {
                    name: MAX_BATCH_SIZE,
                    value: size.to_string(),
                });
            }
            upstream = upstream.max_batch_size(size);
        }

        Ok(Self {
            server,
            supervisor,
            upstream,
        })
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).ok_or(ConfigError::Missing(name))
}

fn parse<T: FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}
