//! Retry schedule for failed or dropped connections

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Wait before the first retry
    pub initial_delay: Duration,
    /// Growth factor between consecutive waits
    pub backoff_multiplier: f64,
    /// Upper bound on a single wait
    pub max_delay: Duration,
    /// Retries allowed after the initial attempt
    pub max_attempts: u32,
    /// Relative spread applied to each wait, in [0, 1]
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
            jitter: 0.25,
        }
    }
}

impl ReconnectConfig {
    /// Fresh retry schedule; one per `connect` call
    pub fn schedule(&self) -> Backoff {
        Backoff {
            config: self.clone(),
            retries: 0,
            base: self.initial_delay,
        }
    }
}

/// Waits between connection attempts, ending once retries run out
#[derive(Debug)]
pub struct Backoff {
    config: ReconnectConfig,
    retries: u32,
    base: Duration,
}

impl Backoff {
    /// Retries handed out so far
    pub fn retries(&self) -> u32 {
        self.retries
    }

    fn spread(&self, base: Duration) -> Duration {
        let jitter = self.config.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        base.mul_f64(rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter)))
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.retries >= self.config.max_attempts {
            return None;
        }
        self.retries += 1;

        let wait = self.spread(self.base).min(self.config.max_delay);
        self.base = self
            .base
            .mul_f64(self.config.backoff_multiplier)
            .min(self.config.max_delay);
        Some(wait)
    }
}
