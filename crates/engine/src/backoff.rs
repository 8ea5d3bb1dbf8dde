//! Exponential backoff for the wait-for-database loop.
use std::time::Duration;

use crate::BackoffConfig;

/// Yields the sequence base, base*multiplier, base*multiplier^2, ...
pub struct ExponentialBackoff {
    next: f64,
    multiplier: f64,
}

impl ExponentialBackoff {
    pub fn new(config: &BackoffConfig) -> ExponentialBackoff {
        ExponentialBackoff {
            next: config.base,
            multiplier: config.multiplier,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let current = self.next;
        self.next *= self.multiplier;
        Duration::from_secs_f64(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_geometrically() {
        let mut backoff = ExponentialBackoff::new(&BackoffConfig {
            base: 1.0,
            multiplier: 2.0,
            max_retries: 3,
        });
        assert_eq!(backoff.next_delay(), Duration::from_secs_f64(1.0));
        assert_eq!(backoff.next_delay(), Duration::from_secs_f64(2.0));
        assert_eq!(backoff.next_delay(), Duration::from_secs_f64(4.0));
    }
}
