//! Environment settings
//!
//! Every variable is optional. Unparseable values fall back to the default
//! with a warning.
//!
//! | Variable                              | Default |
//! |---------------------------------------|---------|
//! | `ACTORBUS_PROXY_VERBOSE`              | false   |
//! | `ACTORBUS_REGISTRAR_VERBOSE`          | false   |
//! | `ACTORBUS_POST_CONNECTION_SLEEP_MS`   | 10      |
//! | `ACTORBUS_POST_SUBSCRIPTION_SLEEP_MS` | 10      |
//! | `ACTORBUS_CONNECTION_TIMEOUT_MS`      | 2000    |
//! | `ACTORBUS_SUBSCRIPTION_TIMEOUT_MS`    | 2000    |

use std::str::FromStr;
use std::time::Duration;

pub const PROXY_VERBOSE: &str = "ACTORBUS_PROXY_VERBOSE";
pub const REGISTRAR_VERBOSE: &str = "ACTORBUS_REGISTRAR_VERBOSE";
pub const POST_CONNECTION_SLEEP_MS: &str = "ACTORBUS_POST_CONNECTION_SLEEP_MS";
pub const POST_SUBSCRIPTION_SLEEP_MS: &str = "ACTORBUS_POST_SUBSCRIPTION_SLEEP_MS";
pub const CONNECTION_TIMEOUT_MS: &str = "ACTORBUS_CONNECTION_TIMEOUT_MS";
pub const SUBSCRIPTION_TIMEOUT_MS: &str = "ACTORBUS_SUBSCRIPTION_TIMEOUT_MS";

/// Settings read from the process environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSettings {
    pub proxy_verbose: bool,
    pub registrar_verbose: bool,
    pub post_connection_sleep: Duration,
    pub post_subscription_sleep: Duration,
    pub connection_timeout: Duration,
    pub subscription_timeout: Duration,
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self {
            proxy_verbose: false,
            registrar_verbose: false,
            post_connection_sleep: Duration::from_millis(10),
            post_subscription_sleep: Duration::from_millis(10),
            connection_timeout: Duration::from_millis(2000),
            subscription_timeout: Duration::from_millis(2000),
        }
    }
}

impl EnvSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let flag = |key: &str, default: bool| match lookup(key) {
            None => default,
            Some(value) => parse_bool(&value).unwrap_or_else(|| {
                tracing::warn!(variable = key, value = %value, "Invalid boolean, using default");
                default
            }),
        };
        let millis = |key: &str, default: Duration| {
            let default_ms = default.as_millis() as u64;
            Duration::from_millis(parse_or(key, lookup(key), default_ms))
        };

        Self {
            proxy_verbose: flag(PROXY_VERBOSE, defaults.proxy_verbose),
            registrar_verbose: flag(REGISTRAR_VERBOSE, defaults.registrar_verbose),
            post_connection_sleep: millis(POST_CONNECTION_SLEEP_MS, defaults.post_connection_sleep),
            post_subscription_sleep: millis(
                POST_SUBSCRIPTION_SLEEP_MS,
                defaults.post_subscription_sleep,
            ),
            connection_timeout: millis(CONNECTION_TIMEOUT_MS, defaults.connection_timeout),
            subscription_timeout: millis(SUBSCRIPTION_TIMEOUT_MS, defaults.subscription_timeout),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Copy,
{
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = key, value = %raw, "Invalid number, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> EnvSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(settings(&[]), EnvSettings::default());
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            (PROXY_VERBOSE, "true"),
            (CONNECTION_TIMEOUT_MS, "500"),
            (POST_SUBSCRIPTION_SLEEP_MS, " 0 "),
        ]);
        assert!(s.proxy_verbose);
        assert!(!s.registrar_verbose);
        assert_eq!(s.connection_timeout, Duration::from_millis(500));
        assert_eq!(s.post_subscription_sleep, Duration::ZERO);
    }

    #[test]
    fn test_garbage_falls_back() {
        let s = settings(&[(REGISTRAR_VERBOSE, "maybe"), (SUBSCRIPTION_TIMEOUT_MS, "-3")]);
        assert!(!s.registrar_verbose);
        assert_eq!(s.subscription_timeout, Duration::from_millis(2000));
    }
}
