//! Connection setup options

use std::time::Duration;

use crate::config::EnvSettings;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a new connection is confirmed before use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSetup {
    /// Run the connect handshake after connecting
    pub check_connection: bool,

    /// Run the subscribe handshake after subscribing
    pub check_subscription: bool,

    /// Give up on the connect handshake after this long
    pub connection_timeout: Duration,

    /// Give up on the subscribe handshake after this long
    pub subscription_timeout: Duration,

    /// Pause after a confirmed connection
    pub post_connection_sleep: Duration,

    /// Pause after a confirmed subscription
    pub post_subscription_sleep: Duration,

    /// Interval between handshake attempts, set through
    /// [`ConnectionSetup::poll_interval`]
    poll_interval: Duration,
}

impl Default for ConnectionSetup {
    fn default() -> Self {
        Self::from_settings(&EnvSettings::default())
    }
}

impl ConnectionSetup {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Self {
        Self::from_settings(&EnvSettings::from_env())
    }

    pub fn from_settings(settings: &EnvSettings) -> Self {
        Self {
            check_connection: true,
            check_subscription: true,
            connection_timeout: settings.connection_timeout,
            subscription_timeout: settings.subscription_timeout,
            post_connection_sleep: settings.post_connection_sleep,
            post_subscription_sleep: settings.post_subscription_sleep,
            poll_interval: MAX_POLL_INTERVAL,
        }
    }

    pub fn check_connection(mut self, enabled: bool) -> Self {
        self.check_connection = enabled;
        self
    }

    pub fn check_subscription(mut self, enabled: bool) -> Self {
        self.check_subscription = enabled;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn subscription_timeout(mut self, timeout: Duration) -> Self {
        self.subscription_timeout = timeout;
        self
    }

    pub fn post_connection_sleep(mut self, sleep: Duration) -> Self {
        self.post_connection_sleep = sleep;
        self
    }

    pub fn post_subscription_sleep(mut self, sleep: Duration) -> Self {
        self.post_subscription_sleep = sleep;
        self
    }

    /// Handshake retry interval, kept between 10 and 100 ms
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        self
    }

    pub fn retry_interval(&self) -> Duration {
        self.poll_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_is_clamped() {
        let setup = ConnectionSetup::default();
        assert_eq!(setup.retry_interval(), MAX_POLL_INTERVAL);

        let zero = setup.clone().poll_interval(Duration::ZERO);
        assert_eq!(zero.retry_interval(), MIN_POLL_INTERVAL);

        let slow = setup.clone().poll_interval(Duration::from_secs(5));
        assert_eq!(slow.retry_interval(), MAX_POLL_INTERVAL);

        let mid = setup.poll_interval(Duration::from_millis(40));
        assert_eq!(mid.retry_interval(), Duration::from_millis(40));
    }
}
