//! Reconnect policy with linear back-off and a bounded attempt count.

use std::time::Duration;

use jw_protocol::NORMAL_CLOSURE;

use crate::config::ReconnectConfig;

/// Controls how the client reconnects after an abnormal close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay unit; attempt `n` waits `base_delay × n`.
    pub base_delay: Duration,
    /// Reconnects allowed between two successful opens.  `0` disables
    /// reconnecting entirely.
    pub max_attempts: u32,
    /// Optional ceiling on a single delay.
    pub max_delay: Option<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(cfg: &ReconnectConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_attempts: cfg.max_attempts,
            max_delay: cfg.max_delay_ms.map(Duration::from_millis),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given 1-based attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.checked_mul(attempt).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Whether `attempts` already made exhaust the budget.
    pub fn should_give_up(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// What to do after the transport closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Normal or caller-initiated closure; stay down.
    Stop,
    /// Schedule reconnect number `attempt` after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Budget used up.
    GiveUp { attempts: u32 },
}

/// Attempt counter owned by one client instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectState {
    attempts: u32,
}

impl ReconnectState {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Called on every successful open and on explicit teardown.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Decide the follow-up to a close with `code`.
    ///
    /// `caller_closing` is true when the close was requested through
    /// `disconnect()`; that never reconnects, whatever the code.
    pub fn on_close(
        &mut self,
        code: u16,
        caller_closing: bool,
        policy: &ReconnectPolicy,
    ) -> CloseDecision {
        if code == NORMAL_CLOSURE || caller_closing {
            return CloseDecision::Stop;
        }
        if policy.should_give_up(self.attempts) {
            return CloseDecision::GiveUp {
                attempts: self.attempts,
            };
        }
        self.attempts += 1;
        CloseDecision::Retry {
            attempt: self.attempts,
            delay: policy.delay_for_attempt(self.attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jw_protocol::ABNORMAL_CLOSURE;

    fn policy(base_ms: u64, max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(base_ms),
            max_attempts,
            max_delay: None,
        }
    }

    #[test]
    fn default_policy_values() {
        let p = ReconnectPolicy::default();
        assert_eq!(p.base_delay, Duration::from_secs(2));
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.max_delay, None);
    }

    #[test]
    fn delay_grows_linearly() {
        let p = policy(2000, 5);
        let delays: Vec<u64> = (1..=5)
            .map(|n| p.delay_for_attempt(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![2000, 4000, 6000, 8000, 10_000]);
    }

    #[test]
    fn delay_respects_cap() {
        let p = ReconnectPolicy {
            max_delay: Some(Duration::from_secs(5)),
            ..policy(2000, 10)
        };
        assert_eq!(p.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(p.delay_for_attempt(3), Duration::from_secs(5));
        assert_eq!(p.delay_for_attempt(9), Duration::from_secs(5));
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let p = ReconnectPolicy {
            base_delay: Duration::MAX,
            ..policy(0, 10)
        };
        assert_eq!(p.delay_for_attempt(3), Duration::MAX);
    }

    #[test]
    fn normal_closure_never_reconnects() {
        let p = policy(100, 5);
        let mut state = ReconnectState::default();
        assert_eq!(state.on_close(NORMAL_CLOSURE, false, &p), CloseDecision::Stop);
        assert_eq!(state.attempts(), 0);
    }

    #[test]
    fn caller_close_never_reconnects_even_when_abnormal() {
        let p = policy(100, 5);
        let mut state = ReconnectState::default();
        assert_eq!(state.on_close(ABNORMAL_CLOSURE, true, &p), CloseDecision::Stop);
    }

    #[test]
    fn abnormal_close_schedules_base_times_next_attempt() {
        let p = policy(100, 5);
        let mut state = ReconnectState::default();
        assert_eq!(
            state.on_close(ABNORMAL_CLOSURE, false, &p),
            CloseDecision::Retry {
                attempt: 1,
                delay: Duration::from_millis(100)
            }
        );
        assert_eq!(
            state.on_close(4000, false, &p),
            CloseDecision::Retry {
                attempt: 2,
                delay: Duration::from_millis(200)
            }
        );
    }

    #[test]
    fn five_abnormal_closes_then_give_up() {
        let p = policy(100, 5);
        let mut state = ReconnectState::default();
        let mut retries = 0;
        for _ in 0..5 {
            match state.on_close(ABNORMAL_CLOSURE, false, &p) {
                CloseDecision::Retry { .. } => retries += 1,
                other => panic!("expected Retry, got {other:?}"),
            }
        }
        assert_eq!(retries, 5);
        assert_eq!(
            state.on_close(ABNORMAL_CLOSURE, false, &p),
            CloseDecision::GiveUp { attempts: 5 }
        );
        assert_eq!(state.attempts(), 5);
    }

    #[test]
    fn reset_restores_full_budget() {
        let p = policy(100, 1);
        let mut state = ReconnectState::default();
        assert!(matches!(
            state.on_close(ABNORMAL_CLOSURE, false, &p),
            CloseDecision::Retry { attempt: 1, .. }
        ));
        state.reset();
        assert!(matches!(
            state.on_close(ABNORMAL_CLOSURE, false, &p),
            CloseDecision::Retry { attempt: 1, .. }
        ));
    }

    #[test]
    fn zero_attempts_disables_reconnect() {
        let p = policy(100, 0);
        let mut state = ReconnectState::default();
        assert_eq!(
            state.on_close(ABNORMAL_CLOSURE, false, &p),
            CloseDecision::GiveUp { attempts: 0 }
        );
    }
}
