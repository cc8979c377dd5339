use crate::prefetch::RetryPolicy;
use marquee_config::Config;
use std::time::Duration;

/// Timing and sizing knobs for a playback session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Continuous unreachability after which the offline indicator is shown.
    pub offline_escalation: Duration,
    /// Upper bound for every individual call to the backend.
    pub remote_timeout: Duration,
    pub max_cache_bytes: u64,
    pub prefetch_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(60),
            offline_escalation: Duration::from_secs(30 * 60),
            remote_timeout: Duration::from_secs(8),
            max_cache_bytes: 500 * 1024 * 1024,
            prefetch_concurrency: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            heartbeat_interval: config.heartbeat_interval(),
            offline_escalation: config.offline_escalation(),
            remote_timeout: config.remote_timeout(),
            max_cache_bytes: config.max_cache_bytes,
            prefetch_concurrency: config.prefetch_concurrency,
            retry: RetryPolicy {
                attempts: config.fetch_attempts,
                backoff_base: config.backoff_base(),
                attempt_timeout: config.media_fetch_timeout(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_config_defaults() {
        assert_eq!(Settings::from(&Config::default()), Settings::default());
    }

    #[test]
    fn test_from_config() {
        let config = Config {
            poll_interval_seconds: 10,
            fetch_attempts: 5,
            backoff_base_ms: 100,
            ..Config::default()
        };
        let settings = Settings::from(&config);
        assert_eq!(settings.poll_interval, Duration::from_secs(10));
        assert_eq!(settings.retry.attempts, 5);
        assert_eq!(settings.retry.backoff(3), Duration::from_millis(400));
    }
}
