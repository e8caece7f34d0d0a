//! Static queue configuration.
//!
//! All knobs are fixed for the process lifetime; there is no runtime
//! reconfiguration. Validation happens once, at build time.

use std::time::Duration;

use thiserror::Error;

/// Configuration for the queue, worker pool, supervisor, and sweeper.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of concurrent workers (the fixed pool size).
    pub max_concurrent: usize,

    /// Ceiling on tasks in `Pending` state; submissions beyond it are
    /// rejected with `QueueFull`.
    pub max_queue_size: usize,

    /// Deadline for a single task, measured from dispatch.
    pub task_timeout: Duration,

    /// How often the timeout supervisor scans running tasks. A task is
    /// declared timed out within `task_timeout + supervisor_tick` of its
    /// start.
    pub supervisor_tick: Duration,

    /// Records older than this are purged regardless of state.
    pub retention: Duration,

    /// How often the retention sweeper runs.
    pub sweep_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_queue_size: 64,
            task_timeout: Duration::from_secs(300),
            supervisor_tick: Duration::from_secs(1),
            retention: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max_concurrent must be at least 1")]
    NoWorkers,

    #[error("max_queue_size must be at least 1")]
    NoCapacity,

    #[error("task_timeout must be non-zero")]
    ZeroTimeout,

    #[error("supervisor_tick must be non-zero")]
    ZeroTick,

    #[error("sweep_interval must be non-zero")]
    ZeroSweepInterval,
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::NoCapacity);
        }
        if self.task_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.supervisor_tick.is_zero() {
            return Err(ConfigError::ZeroTick);
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroSweepInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(QueueConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let cfg = QueueConfig {
            max_concurrent: 0,
            ..QueueConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::NoWorkers));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let cfg = QueueConfig {
            max_queue_size: 0,
            ..QueueConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::NoCapacity));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cfg = QueueConfig {
            task_timeout: Duration::ZERO,
            ..QueueConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroTimeout));
    }
}
