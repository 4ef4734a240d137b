//! # Transaction layer configuration
//!
//! Timer base values follow RFC 3261 Table 4:
//!
//! | Name    | Default | Meaning                                       |
//! |---------|---------|-----------------------------------------------|
//! | T1      | 500 ms  | RTT estimate, first retransmit interval       |
//! | T2      | 4 s     | Maximum retransmit interval                   |
//! | T4      | 5 s     | Maximum time a message remains in the network |
//! | Timer D | 32 s    | Wait time for response retransmits (ICT)      |
//!
//! Derived values (Timers B, F, H and J) are `64 * T1`.
//!
//! ```rust
//! use std::time::Duration;
//! use siptx_transaction_core::{ThreadingModel, TransactionLayerConfig};
//!
//! let config = TransactionLayerConfig::default()
//!     .with_t1(Duration::from_millis(250))
//!     .with_threading(ThreadingModel::Multithreaded);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.timers.timer_b(), Duration::from_secs(16));
//! ```

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding T1, in milliseconds
pub const ENV_T1_MS: &str = "SIPTX_T1_MS";
/// Environment variable overriding T2, in milliseconds
pub const ENV_T2_MS: &str = "SIPTX_T2_MS";
/// Environment variable overriding T4, in milliseconds
pub const ENV_T4_MS: &str = "SIPTX_T4_MS";
/// Environment variable overriding Timer D, in milliseconds
pub const ENV_TIMER_D_MS: &str = "SIPTX_TIMER_D_MS";

/// Upper bound accepted for T1, T2, T4 and Timer D
pub const MAX_TIMER_VALUE: Duration = Duration::from_secs(60 * 60);

/// Base timer durations used by every transaction of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSettings {
    pub t1: Duration,
    pub t2: Duration,
    pub t4: Duration,
    pub timer_d: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
            t4: Duration::from_secs(5),
            timer_d: Duration::from_secs(32),
        }
    }
}

impl TimerSettings {
    /// Defaults overridden by any `SIPTX_*_MS` variable present in the environment.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();
        if let Some(t1) = read_millis(ENV_T1_MS)? {
            settings.t1 = t1;
        }
        if let Some(t2) = read_millis(ENV_T2_MS)? {
            settings.t2 = t2;
        }
        if let Some(t4) = read_millis(ENV_T4_MS)? {
            settings.t4 = t4;
        }
        if let Some(timer_d) = read_millis(ENV_TIMER_D_MS)? {
            settings.timer_d = timer_d;
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects settings that would stall or spin the state machines.
    pub fn validate(&self) -> Result<()> {
        if self.t1.is_zero() {
            return Err(Error::Configuration("T1 must be greater than zero".into()));
        }
        let bounded = [("T1", self.t1), ("T2", self.t2), ("T4", self.t4), ("Timer D", self.timer_d)];
        for (name, value) in bounded {
            if value > MAX_TIMER_VALUE {
                return Err(Error::Configuration(format!(
                    "{} ({:?}) exceeds the maximum of {:?}",
                    name, value, MAX_TIMER_VALUE
                )));
            }
        }
        if self.t2 < self.t1 {
            return Err(Error::Configuration(format!(
                "T2 ({:?}) must not be shorter than T1 ({:?})",
                self.t2, self.t1
            )));
        }
        if self.timer_d < self.t1 {
            return Err(Error::Configuration(format!(
                "Timer D ({:?}) must not be shorter than T1 ({:?})",
                self.timer_d, self.t1
            )));
        }
        Ok(())
    }

    /// INVITE transaction timeout (Timer B), `64 * T1`
    pub fn timer_b(&self) -> Duration {
        self.t1.saturating_mul(64)
    }

    /// Non-INVITE transaction timeout (Timer F), `64 * T1`
    pub fn timer_f(&self) -> Duration {
        self.t1.saturating_mul(64)
    }

    /// Wait time for ACK receipt (Timer H), `64 * T1`
    pub fn timer_h(&self) -> Duration {
        self.t1.saturating_mul(64)
    }

    /// Wait time for non-INVITE request retransmits (Timer J), `64 * T1`
    pub fn timer_j(&self) -> Duration {
        self.t1.saturating_mul(64)
    }
}

fn read_millis(name: &str) -> Result<Option<Duration>> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| Error::Configuration(format!("{} is not a millisecond count: {:?}", name, value))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => {
            Err(Error::Configuration(format!("{} is not valid unicode", name)))
        }
    }
}

/// How the embedding application drives the layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadingModel {
    /// One thread calls dispatch, execute and timer passes in turn
    #[default]
    Cooperative,
    /// Dispatch and scheduling run on different threads or tasks
    Multithreaded,
}

/// Settings applied when a [`TransactionLayer`](crate::TransactionLayer) is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLayerConfig {
    pub timers: TimerSettings,
    pub threading: ThreadingModel,
}

impl TransactionLayerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timers(mut self, timers: TimerSettings) -> Self {
        self.timers = timers;
        self
    }

    pub fn with_threading(mut self, threading: ThreadingModel) -> Self {
        self.threading = threading;
        self
    }

    pub fn with_t1(mut self, t1: Duration) -> Self {
        self.timers.t1 = t1;
        self
    }

    pub fn with_t2(mut self, t2: Duration) -> Self {
        self.timers.t2 = t2;
        self
    }

    pub fn with_t4(mut self, t4: Duration) -> Self {
        self.timers.t4 = t4;
        self
    }

    pub fn with_timer_d(mut self, timer_d: Duration) -> Self {
        self.timers.timer_d = timer_d;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.timers.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in [ENV_T1_MS, ENV_T2_MS, ENV_T4_MS, ENV_TIMER_D_MS] {
            unsafe { env::remove_var(name) };
        }
    }

    #[test]
    fn test_rfc_defaults() {
        let timers = TimerSettings::default();
        assert_eq!(timers.t1, Duration::from_millis(500));
        assert_eq!(timers.t2, Duration::from_secs(4));
        assert_eq!(timers.t4, Duration::from_secs(5));
        assert_eq!(timers.timer_d, Duration::from_secs(32));
        assert_eq!(timers.timer_b(), Duration::from_secs(32));
        assert_eq!(timers.timer_j(), Duration::from_secs(32));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let zero_t1 = TransactionLayerConfig::default().with_t1(Duration::ZERO);
        assert!(matches!(zero_t1.validate(), Err(Error::Configuration(_))));

        let short_t2 = TransactionLayerConfig::default().with_t2(Duration::from_millis(100));
        assert!(matches!(short_t2.validate(), Err(Error::Configuration(_))));

        let short_d = TransactionLayerConfig::default().with_timer_d(Duration::from_millis(10));
        assert!(matches!(short_d.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_timers() {
        let huge_t4 = TransactionLayerConfig::default().with_t4(Duration::MAX);
        assert!(matches!(huge_t4.validate(), Err(Error::Configuration(_))));

        let huge = Duration::from_secs(u64::MAX / 32);
        let huge_t1 = TransactionLayerConfig::default()
            .with_t1(huge)
            .with_t2(huge)
            .with_timer_d(huge);
        assert!(matches!(huge_t1.validate(), Err(Error::Configuration(_))));

        let at_limit = TransactionLayerConfig::default()
            .with_t1(MAX_TIMER_VALUE)
            .with_t2(MAX_TIMER_VALUE)
            .with_t4(MAX_TIMER_VALUE)
            .with_timer_d(MAX_TIMER_VALUE);
        assert!(at_limit.validate().is_ok());
        assert_eq!(at_limit.timers.timer_b(), MAX_TIMER_VALUE * 64);
    }

    #[test]
    fn test_derived_timers_saturate() {
        let timers = TimerSettings {
            t1: Duration::MAX,
            ..TimerSettings::default()
        };
        assert_eq!(timers.timer_f(), Duration::MAX);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        unsafe {
            env::set_var(ENV_T1_MS, "100");
            env::set_var(ENV_TIMER_D_MS, "2000");
        }

        let timers = TimerSettings::from_env().unwrap();
        assert_eq!(timers.t1, Duration::from_millis(100));
        assert_eq!(timers.t2, Duration::from_secs(4));
        assert_eq!(timers.timer_d, Duration::from_secs(2));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        clear_env();
        unsafe { env::set_var(ENV_T2_MS, "four seconds") };

        assert!(matches!(TimerSettings::from_env(), Err(Error::Configuration(_))));

        clear_env();
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = TransactionLayerConfig::default().with_threading(ThreadingModel::Multithreaded);
        let json = serde_json::to_string(&config).unwrap();
        let back: TransactionLayerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
