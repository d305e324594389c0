//! Service configuration, read from environment variables.

use crate::error::ServerError;
use cluster_client::NamespaceScope;
use pod_watch::{ActionPolicy, WatchConfig};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub watch: WatchConfig,
    pub action_policy: ActionPolicy,
    /// Scope for requests that do not name a namespace. `None` means all.
    pub default_namespace: Option<String>,
    /// Period for re-sending the full snapshot on pod streams.
    pub snapshot_interval: Option<Duration>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let listen_addr = parse_or("LISTEN_ADDR", get("LISTEN_ADDR"), DEFAULT_LISTEN_ADDR)?;

        let mut watch = WatchConfig::default();
        if let Some(secs) = get("SYNC_TIMEOUT_SECS") {
            let secs: u64 = parse("SYNC_TIMEOUT_SECS", &secs)?;
            if secs == 0 {
                return Err(ServerError::InvalidConfig(
                    "SYNC_TIMEOUT_SECS must be greater than zero".to_string(),
                ));
            }
            watch = watch.with_sync_timeout(Duration::from_secs(secs));
        }
        if let Some(capacity) = get("SUBSCRIBER_QUEUE_CAPACITY") {
            let capacity: usize = parse("SUBSCRIBER_QUEUE_CAPACITY", &capacity)?;
            if capacity == 0 {
                return Err(ServerError::InvalidConfig(
                    "SUBSCRIBER_QUEUE_CAPACITY must be greater than zero".to_string(),
                ));
            }
            watch = watch.with_subscriber_capacity(capacity);
        }
        if let Some(secs) = get("IDLE_TIMEOUT_SECS") {
            let secs: u64 = parse("IDLE_TIMEOUT_SECS", &secs)?;
            if secs == 0 {
                return Err(ServerError::InvalidConfig(
                    "IDLE_TIMEOUT_SECS must be greater than zero".to_string(),
                ));
            }
            watch = watch.with_idle_timeout(Duration::from_secs(secs));
        }

        let action_policy = match get("LEGACY_UPDATE_AS_ADD") {
            Some(flag) if parse_bool("LEGACY_UPDATE_AS_ADD", &flag)? => {
                ActionPolicy::LegacyUpdateAsAdd
            }
            _ => ActionPolicy::Distinct,
        };

        let snapshot_interval = match get("SNAPSHOT_INTERVAL_SECS") {
            Some(secs) => match parse::<u64>("SNAPSHOT_INTERVAL_SECS", &secs)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => None,
        };

        Ok(Self {
            listen_addr,
            watch,
            action_policy,
            default_namespace: get("DEFAULT_NAMESPACE"),
            snapshot_interval,
        })
    }

    /// Scope for an optional `ns` request parameter.
    pub fn scope_for(&self, ns: Option<&str>) -> NamespaceScope {
        match ns.map(str::trim).filter(|ns| !ns.is_empty()) {
            Some(ns) => NamespaceScope::Namespace(ns.to_string()),
            None => NamespaceScope::from_option(self.default_namespace.as_deref()),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ServerError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ServerError::InvalidConfig(format!("{}={:?}: {}", key, value, e)))
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: &str) -> Result<T, ServerError>
where
    T::Err: std::fmt::Display,
{
    parse(key, value.as_deref().unwrap_or(default))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ServerError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ServerError::InvalidConfig(format!(
            "{}={:?}: expected true or false",
            key, value
        ))),
    }
}
