//! Controller settings read from the environment

use std::time::Duration;
use thiserror::Error;

pub const ENV_WORKERS: &str = "FOO_CONTROLLER_WORKERS";
pub const ENV_NAMESPACE: &str = "FOO_CONTROLLER_NAMESPACE";
pub const ENV_RESYNC_SECONDS: &str = "FOO_CONTROLLER_RESYNC_SECONDS";
pub const ENV_HEALTH_PORT: &str = "FOO_CONTROLLER_HEALTH_PORT";

const DEFAULT_WORKERS: usize = 2;
const DEFAULT_RESYNC_SECONDS: u64 = 30;
const DEFAULT_HEALTH_PORT: u16 = 8080;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    InvalidValue { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Number of concurrent workers draining the queue
    pub workers: usize,
    /// Watch only this namespace; `None` watches all
    pub namespace: Option<String>,
    /// Periodic re-delivery of every cached object; `None` disables it
    pub resync_period: Option<Duration>,
    pub health_port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            namespace: None,
            resync_period: Some(Duration::from_secs(DEFAULT_RESYNC_SECONDS)),
            health_port: DEFAULT_HEALTH_PORT,
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let workers = match parse::<usize>(&lookup, ENV_WORKERS)? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    var: ENV_WORKERS,
                    value: "0".to_string(),
                })
            }
            Some(n) => n,
            None => defaults.workers,
        };

        let namespace = lookup(ENV_NAMESPACE)
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty());

        let resync_period = match parse::<u64>(&lookup, ENV_RESYNC_SECONDS)? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.resync_period,
        };

        let health_port = parse::<u16>(&lookup, ENV_HEALTH_PORT)?.unwrap_or(defaults.health_port);

        Ok(Self {
            workers,
            namespace,
            resync_period,
            health_port,
        })
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}
