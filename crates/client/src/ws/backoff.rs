//! Reconnect delay policy.

use std::time::Duration;

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first retry, and after every successful open
    pub initial_delay: Duration,
    /// Upper bound on the delay
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30000),
        }
    }
}

/// Doubling reconnect delay, bounded by [`ReconnectConfig`].
///
/// The delay handed out by [`Backoff::next_delay`] is the current value; the
/// doubling applies to the call after it.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            current: config.initial_delay,
            config,
        }
    }

    /// Delay the next scheduled reconnect should use.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Take the delay for this reconnect and advance for the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.config.max_delay);
        delay
    }

    /// Back to the floor; called on every successful open.
    pub fn reset(&mut self) {
        self.current = self.config.initial_delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn doubles_up_to_the_ceiling() {
        let mut backoff = Backoff::new(ReconnectConfig::default());
        let delays: Vec<_> = (0..8).map(|_| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![ms(1000), ms(2000), ms(4000), ms(8000), ms(16000), ms(30000), ms(30000), ms(30000)]
        );
    }

    #[test]
    fn reset_returns_to_floor() {
        let mut backoff = Backoff::new(ReconnectConfig::default());
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current(), ms(4000));
        backoff.reset();
        assert_eq!(backoff.next_delay(), ms(1000));
    }

    #[test]
    fn caps_the_first_doubling() {
        let mut backoff = Backoff::new(ReconnectConfig {
            initial_delay: ms(50),
            max_delay: ms(80),
        });
        assert_eq!(backoff.next_delay(), ms(50));
        assert_eq!(backoff.next_delay(), ms(80));
        assert_eq!(backoff.next_delay(), ms(80));
    }
}
