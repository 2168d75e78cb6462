use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const RECONNECT_TIMER_START: Duration = Duration::from_secs(1);
pub const RECONNECT_TIMER_MAX_TIME: Duration = Duration::from_secs(15 * 60);

/// Reconnect timings, read from the plugin configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_initial_delay_ms() -> u64 {
    RECONNECT_TIMER_START.as_millis() as u64
}

fn default_max_delay_ms() -> u64 {
    RECONNECT_TIMER_MAX_TIME.as_millis() as u64
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Exponential backoff for reconnecting to the billing service.
///
/// Each failed attempt waits for the current delay and doubles it for the
/// next one, up to `max`. A successful connection resets it.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait before the next attempt. Advances the counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(RECONNECT_TIMER_START, RECONNECT_TIMER_MAX_TIME)
    }
}

impl From<ReconnectConfig> for ReconnectBackoff {
    fn from(config: ReconnectConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_fifteen_minutes() {
        let mut backoff = ReconnectBackoff::default();
        let delays: Vec<u64> = (0..12).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 900, 900]);
        assert_eq!(backoff.current(), RECONNECT_TIMER_MAX_TIME);
    }

    #[test]
    fn reset_returns_to_initial_delay() {
        let mut backoff = ReconnectBackoff::default();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current(), Duration::from_secs(4));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn config_defaults_match_constants() {
        let config: ReconnectConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ReconnectConfig::default());

        let mut backoff = ReconnectBackoff::from(ReconnectConfig {
            initial_delay_ms: 500,
            max_delay_ms: 1_200,
        });
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1_000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1_200));
    }
}
