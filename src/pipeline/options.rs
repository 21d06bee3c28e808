use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Environment variable overriding the default worker count
pub const MAX_WORKERS_ENV: &str = "PIPELINE_GROUP_MAX_WORKERS";

/// Worker count used by sequential groups and by default
pub const SEQUENTIAL_MAX_WORKERS: usize = 1;

/// How long a worker may wait for an item before it retires
pub const DEFAULT_IDLE_DURATION: Duration = Duration::from_secs(60);

/// Options for worker groups and parallel collectors
///
/// # Example
/// ```rust,ignore
/// // One worker, the default
/// GroupOptions::default()
///
/// // Twice the available cores, workers retire after 5s without work
/// GroupOptions::default().parallel().with_idle_duration(Duration::from_secs(5))
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupOptions {
    pub max_workers: usize,
    pub idle_duration: Duration,
    pub emit_progress: bool,
}

impl GroupOptions {
    /// Run at most one worker
    pub fn sequential(mut self) -> Self {
        self.max_workers = SEQUENTIAL_MAX_WORKERS;
        self
    }

    /// Run up to twice the available parallelism
    pub fn parallel(mut self) -> Self {
        let cores = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        self.max_workers = 2 * cores;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_idle_duration(mut self, idle_duration: Duration) -> Self {
        self.idle_duration = idle_duration;
        self
    }

    /// Emit every processed item on the group's progress channel
    ///
    /// The progress source must be drained by the caller. Workers block on
    /// progress sends, so an undrained channel stalls the whole group.
    pub fn with_progress(mut self) -> Self {
        self.emit_progress = true;
        self
    }

    /// Clamp values that would make a group unusable
    pub fn sanitise(mut self) -> Self {
        let before = self.clone();
        if self.max_workers == 0 {
            self.max_workers = SEQUENTIAL_MAX_WORKERS;
        }
        if self.idle_duration.is_zero() {
            self.idle_duration = DEFAULT_IDLE_DURATION;
        }
        if before != self {
            tracing::debug!(?before, after = ?self, "Sanitised group options");
        }
        self
    }

    /// Defaults, with the worker count taken from `PIPELINE_GROUP_MAX_WORKERS` when set
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(MAX_WORKERS_ENV) {
            let max_workers = value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnv {
                key: MAX_WORKERS_ENV,
                value: value.clone(),
            })?;
            if max_workers == 0 {
                return Err(ConfigError::ZeroWorkers {
                    key: MAX_WORKERS_ENV,
                });
            }
            self.max_workers = max_workers;
        }
        Ok(self)
    }
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            max_workers: SEQUENTIAL_MAX_WORKERS,
            idle_duration: DEFAULT_IDLE_DURATION,
            emit_progress: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sequential() {
        let opts = GroupOptions::default();
        assert_eq!(opts.max_workers, 1);
        assert_eq!(opts.idle_duration, Duration::from_secs(60));
        assert!(!opts.emit_progress);
    }

    #[test]
    fn parallel_uses_twice_the_cores() {
        let cores = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        assert_eq!(GroupOptions::default().parallel().max_workers, 2 * cores);
        assert_eq!(GroupOptions::default().parallel().sequential().max_workers, 1);
    }

    #[test]
    fn builder_methods() {
        let opts = GroupOptions::default()
            .with_max_workers(7)
            .with_idle_duration(Duration::from_millis(10))
            .with_progress();
        assert_eq!(opts.max_workers, 7);
        assert_eq!(opts.idle_duration, Duration::from_millis(10));
        assert!(opts.emit_progress);
    }

    #[test]
    fn sanitise_clamps_zero_values() {
        let opts = GroupOptions::default()
            .with_max_workers(0)
            .with_idle_duration(Duration::ZERO)
            .sanitise();
        assert_eq!(opts.max_workers, 1);
        assert_eq!(opts.idle_duration, DEFAULT_IDLE_DURATION);
    }

    #[test]
    fn env_override_sets_max_workers() {
        let opts = GroupOptions::default()
            .with_env_overrides(|key| (key == MAX_WORKERS_ENV).then(|| " 12 ".to_string()))
            .unwrap();
        assert_eq!(opts.max_workers, 12);
    }

    #[test]
    fn env_override_absent_keeps_defaults() {
        let opts = GroupOptions::default().with_env_overrides(|_| None).unwrap();
        assert_eq!(opts, GroupOptions::default());
    }

    #[test]
    fn env_override_rejects_garbage() {
        let err = GroupOptions::default()
            .with_env_overrides(|_| Some("lots".to_string()))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnv {
                key: MAX_WORKERS_ENV,
                value: "lots".to_string()
            }
        );

        let err = GroupOptions::default()
            .with_env_overrides(|_| Some("0".to_string()))
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroWorkers { key: MAX_WORKERS_ENV });
    }

    #[test]
    fn deserializes_with_defaults() {
        let opts: GroupOptions = serde_json::from_str(r#"{"max_workers": 3}"#).unwrap();
        assert_eq!(opts.max_workers, 3);
        assert_eq!(opts.idle_duration, DEFAULT_IDLE_DURATION);
        assert!(!opts.emit_progress);
    }
}
