//! Restart policy for crashed workers.
//!
//! Each worker slot carries a [`RestartTracker`]. The first crash after a
//! quiet period is restarted after `initial_backoff` (immediately by
//! default); every further crash inside the crash-loop window doubles the
//! delay up to `max_backoff`. Once `crash_loop_threshold` crashes land in one
//! window the slot is flagged as crash-looping. Restarts never stop.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use skirmish_core::ServerConfig;

use crate::error::{SupervisorError, SupervisorResult};

/// Smallest non-zero delay once backoff kicks in from a zero initial value.
pub const BACKOFF_FLOOR: Duration = Duration::from_millis(250);

/// Restart timing shared by every slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub crash_loop_threshold: u32,
    pub crash_loop_window: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(30),
            crash_loop_threshold: 5,
            crash_loop_window: Duration::from_secs(60),
        }
    }
}

impl RestartPolicy {
    pub fn from_config(config: &ServerConfig) -> SupervisorResult<Self> {
        let invalid = |e: skirmish_core::ConfigError| SupervisorError::Config(e.to_string());
        Ok(Self {
            initial_backoff: config.initial_backoff().map_err(invalid)?,
            max_backoff: config.max_backoff().map_err(invalid)?,
            crash_loop_threshold: config.restart.crash_loop_threshold.max(1),
            crash_loop_window: config.crash_loop_window().map_err(invalid)?,
        })
    }
}

/// What to do about one worker exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartDecision {
    /// Wait this long before respawning.
    pub delay: Duration,
    /// The slot is currently crash-looping.
    pub crash_looping: bool,
    /// This exit is the one that tripped the crash-loop alarm.
    pub entered_crash_loop: bool,
}

/// Crash history of a single worker slot.
#[derive(Debug)]
pub struct RestartTracker {
    policy: RestartPolicy,
    /// Crash instants inside the current window, oldest first.
    recent: VecDeque<Instant>,
    /// Delay handed out for the previous crash.
    current_backoff: Option<Duration>,
    crash_looping: bool,
    total_restarts: u32,
}

impl RestartTracker {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            recent: VecDeque::new(),
            current_backoff: None,
            crash_looping: false,
            total_restarts: 0,
        }
    }

    /// Record an exit at `now` and decide how long to wait before respawning.
    pub fn record_exit(&mut self, now: Instant) -> RestartDecision {
        let window = self.policy.crash_loop_window;
        while let Some(&oldest) = self.recent.front() {
            if now.saturating_duration_since(oldest) > window {
                self.recent.pop_front();
            } else {
                break;
            }
        }

        // Quiet period: nothing left in the window resets the backoff.
        if self.recent.is_empty() {
            if self.crash_looping {
                debug!("crash loop cleared after quiet period");
            }
            self.current_backoff = None;
            self.crash_looping = false;
        }
        self.recent.push_back(now);
        self.total_restarts += 1;

        let delay = match self.current_backoff {
            None => self.policy.initial_backoff,
            Some(prev) if prev.is_zero() => BACKOFF_FLOOR,
            Some(prev) => prev * 2,
        }
        .min(self.policy.max_backoff);
        self.current_backoff = Some(delay);

        let was_looping = self.crash_looping;
        self.crash_looping = self.recent.len() >= self.policy.crash_loop_threshold as usize;
        let entered_crash_loop = self.crash_looping && !was_looping;
        if entered_crash_loop {
            warn!(
                crashes = self.recent.len(),
                window_secs = window.as_secs(),
                "worker crash loop detected"
            );
        }

        RestartDecision {
            delay,
            crash_looping: self.crash_looping,
            entered_crash_loop,
        }
    }

    pub fn is_crash_looping(&self) -> bool {
        self.crash_looping
    }

    /// Restarts recorded over the slot's lifetime.
    pub fn total_restarts(&self) -> u32 {
        self.total_restarts
    }

    /// Delay that would apply to the next crash inside the window.
    pub fn current_backoff(&self) -> Duration {
        self.current_backoff.unwrap_or(self.policy.initial_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RestartPolicy {
        RestartPolicy {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(2),
            crash_loop_threshold: 3,
            crash_loop_window: Duration::from_secs(60),
        }
    }

    #[test]
    fn first_restart_is_immediate() {
        let mut t = RestartTracker::new(policy());
        let d = t.record_exit(Instant::now());
        assert_eq!(d.delay, Duration::ZERO);
        assert!(!d.crash_looping);
        assert_eq!(t.total_restarts(), 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut t = RestartTracker::new(policy());
        let start = Instant::now();
        let delays: Vec<Duration> = (0..8)
            .map(|i| t.record_exit(start + Duration::from_secs(i)).delay)
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::ZERO,
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(2),
                Duration::from_secs(2),
                Duration::from_secs(2),
            ]
        );
    }

    #[test]
    fn non_zero_initial_backoff_doubles() {
        let mut t = RestartTracker::new(RestartPolicy {
            initial_backoff: Duration::from_millis(100),
            ..policy()
        });
        let now = Instant::now();
        assert_eq!(t.record_exit(now).delay, Duration::from_millis(100));
        assert_eq!(t.record_exit(now).delay, Duration::from_millis(200));
        assert_eq!(t.current_backoff(), Duration::from_millis(200));
    }

    #[test]
    fn crash_loop_trips_at_threshold_once() {
        let mut t = RestartTracker::new(policy());
        let now = Instant::now();
        assert!(!t.record_exit(now).crash_looping);
        assert!(!t.record_exit(now).crash_looping);

        let third = t.record_exit(now);
        assert!(third.crash_looping);
        assert!(third.entered_crash_loop);

        let fourth = t.record_exit(now);
        assert!(fourth.crash_looping);
        assert!(!fourth.entered_crash_loop);
        assert!(t.is_crash_looping());
    }

    #[test]
    fn quiet_period_resets_backoff_and_alarm() {
        let mut t = RestartTracker::new(policy());
        let start = Instant::now();
        for i in 0..4 {
            t.record_exit(start + Duration::from_secs(i));
        }
        assert!(t.is_crash_looping());

        let later = start + Duration::from_secs(200);
        let d = t.record_exit(later);
        assert_eq!(d.delay, Duration::ZERO);
        assert!(!d.crash_looping);
        assert_eq!(t.total_restarts(), 5);
    }

    #[test]
    fn crashes_spread_across_windows_never_loop() {
        let mut t = RestartTracker::new(policy());
        let start = Instant::now();
        for i in 0..10 {
            let d = t.record_exit(start + Duration::from_secs(61 * i));
            assert!(!d.crash_looping);
            assert_eq!(d.delay, Duration::ZERO);
        }
    }

    #[test]
    fn policy_from_default_config() {
        let p = RestartPolicy::from_config(&ServerConfig::default()).unwrap();
        assert_eq!(p, RestartPolicy::default());
    }
}
