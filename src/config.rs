//! # Session runtime configuration.
//!
//! Provides [`Config`], the timing knobs of a test session.
//!
//! Config is used in two ways:
//! 1. **Session creation**: `Session::new(config, runtime)`
//! 2. **Resource deadlines**: stop/kill/remove timeouts bound the teardown phases
//!
//! ## Sentinel values
//! - `poll_timeout = 0s` → falls back to the default poll timeout
//! - `tick_interval = 0s` → falls back to the default tick interval
//! - `session_id = None` → a random id is generated per session

use std::time::Duration;

const DEFAULT_TICK: Duration = Duration::from_secs(1);
const DEFAULT_POLL: Duration = Duration::from_millis(300);

/// Configuration for one test session.
///
/// ## Field semantics
/// - `tick_interval`: period of the synthetic `Tick` event
/// - `poll_timeout`: how long the runner blocks on the queue before looping again
/// - `stop_timeout`: graceful stop window before escalating to kill
/// - `kill_timeout`: window after a kill before force-removing
/// - `remove_timeout`: window after a remove before re-issuing it
/// - `session_id`: prefix of container names and value of the session label
#[derive(Clone, Debug)]
pub struct Config {
    /// Period of the timer's `Tick` events.
    pub tick_interval: Duration,

    /// Receive timeout of the runner loop.
    ///
    /// Only keeps the loop responsive; a timeout does nothing but loop again.
    pub poll_timeout: Duration,

    /// Time a resource may stay in `StopInProgress` after a stop request.
    pub stop_timeout: Duration,

    /// Time a resource may stay in `StopInProgress` after a kill.
    pub kill_timeout: Duration,

    /// Time a resource may stay in `DestroyInProgress` before remove is re-issued.
    pub remove_timeout: Duration,

    /// Session identifier. Generated when `None`.
    pub session_id: Option<String>,
}

impl Config {
    /// Returns the tick interval, replacing the zero sentinel by the default.
    #[inline]
    pub fn tick(&self) -> Duration {
        if self.tick_interval == Duration::ZERO {
            DEFAULT_TICK
        } else {
            self.tick_interval
        }
    }

    /// Returns the poll timeout, replacing the zero sentinel by the default.
    #[inline]
    pub fn poll(&self) -> Duration {
        if self.poll_timeout == Duration::ZERO {
            DEFAULT_POLL
        } else {
            self.poll_timeout
        }
    }

    /// Returns the configured session id or a fresh random one.
    pub fn resolve_session_id(&self) -> String {
        match &self.session_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `tick_interval = 1s`
    /// - `poll_timeout = 300ms`
    /// - `stop_timeout = 10s`
    /// - `kill_timeout = 3s`
    /// - `remove_timeout = 10s`
    /// - `session_id = None` (random)
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK,
            poll_timeout: DEFAULT_POLL,
            stop_timeout: Duration::from_secs(10),
            kill_timeout: Duration::from_secs(3),
            remove_timeout: Duration::from_secs(10),
            session_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sentinels_fall_back() {
        let cfg = Config {
            tick_interval: Duration::ZERO,
            poll_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(cfg.tick(), Duration::from_secs(1));
        assert_eq!(cfg.poll(), Duration::from_millis(300));
    }

    #[test]
    fn test_session_id_generated_when_missing() {
        let cfg = Config::default();
        let a = cfg.resolve_session_id();
        let b = cfg.resolve_session_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);

        let fixed = Config {
            session_id: Some("ci42".into()),
            ..Config::default()
        };
        assert_eq!(fixed.resolve_session_id(), "ci42");
    }
}
