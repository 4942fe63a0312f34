//! Bounded reconnect policy.

use std::time::{Duration, Instant};

/// Gate for the single reconnect attempt an engine may make after losing
/// its transport.
///
/// Reconnecting is never transparent: the engine asks the policy whether an
/// attempt is currently allowed, makes at most one, and surfaces a terminal
/// error otherwise. The minimum interval keeps a flapping network from
/// turning into a reconnect loop.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    min_interval: Duration,
    last_attempt: Option<Instant>,
}

impl ReconnectPolicy {
    /// Creates a policy with the given minimum interval between attempts.
    #[must_use]
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_attempt: None,
        }
    }

    /// Returns true if enough time has passed since the last attempt.
    #[must_use]
    pub fn may_attempt(&self) -> bool {
        self.last_attempt
            .is_none_or(|t| t.elapsed() >= self.min_interval)
    }

    /// Records that an attempt was made now.
    pub fn record_attempt(&mut self) {
        self.last_attempt = Some(Instant::now());
    }

    /// Forgets the last attempt, e.g. after a deliberate close.
    pub fn reset(&mut self) {
        self.last_attempt = None;
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_allowed() {
        let policy = ReconnectPolicy::new(Duration::from_secs(10));
        assert!(policy.may_attempt());
    }

    #[test]
    fn test_attempt_blocked_within_interval() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(10));
        policy.record_attempt();
        assert!(!policy.may_attempt());
    }

    #[test]
    fn test_zero_interval_always_allows() {
        let mut policy = ReconnectPolicy::new(Duration::ZERO);
        policy.record_attempt();
        assert!(policy.may_attempt());
    }

    #[test]
    fn test_reset_allows_again() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(10));
        policy.record_attempt();
        policy.reset();
        assert!(policy.may_attempt());
    }
}
