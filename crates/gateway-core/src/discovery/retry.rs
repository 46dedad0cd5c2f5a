//! Retry-until-found with a fixed interval or exponential backoff.
//!
//! Discovery distinguishes "nothing there yet" (retry) from "the query itself
//! failed" (give up at once), so the operation returns `Result<Option<T>, E>`
//! instead of relying on a retry predicate.

use crate::config::DiscoveryConfig;
use rand::Rng;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts including the first. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay after the first empty attempt.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Growth factor per attempt. 1.0 keeps the interval fixed.
    pub exponential_base: f64,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::fixed(DiscoveryConfig::FIND_SERVICE_RETRY_INTERVAL)
    }
}

impl RetryConfig {
    /// Unbounded retry at a constant interval.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            max_attempts: None,
            base_delay: interval,
            max_delay: interval,
            exponential_base: 1.0,
            jitter: false,
        }
    }

    /// Doubling backoff from `base_delay` up to `max_delay`, with jitter.
    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: None,
            base_delay,
            max_delay,
            exponential_base: 2.0,
            jitter: true,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the delay after a given attempt number (0-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.exponential_base.powi(attempt.min(i32::MAX as u32) as i32);
        let max_secs = self.max_delay.max(self.base_delay).as_secs_f64();
        let capped_secs = (self.base_delay.as_secs_f64() * multiplier).min(max_secs);

        let final_secs = if self.jitter {
            // Factor in 0.5..1.5 keeps the mean while avoiding near-zero delays.
            let jitter_factor = rand::rng().random_range(0.5..1.5);
            (capped_secs * jitter_factor).min(max_secs)
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }

    fn allows_another(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

/// Statistics about a retry operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryStats {
    /// Number of attempts made.
    pub attempts: u32,
    /// Total delay accumulated.
    pub total_delay: Duration,
    pub success: bool,
}

/// Why [`retry_until_found`] gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError<E> {
    /// The operation failed; no further attempts were made.
    #[error("{0}")]
    Failed(E),
    /// Every allowed attempt came back empty.
    #[error("nothing found after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Repeat `operation` until it yields a value.
///
/// `Ok(None)` waits per `config` and tries again. `Err` stops immediately.
pub async fn retry_until_found<F, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> (Result<T, RetryError<E>>, RetryStats)
where
    F: FnMut() -> Result<Option<T>, E>,
    E: fmt::Display,
{
    let mut stats = RetryStats::default();

    loop {
        let attempt = stats.attempts;
        stats.attempts += 1;

        match operation() {
            Ok(Some(value)) => {
                stats.success = true;
                if attempt > 0 {
                    debug!("Found after {} attempts", stats.attempts);
                }
                return (Ok(value), stats);
            }
            Ok(None) => {
                if !config.allows_another(stats.attempts) {
                    warn!("All {} attempts came back empty", stats.attempts);
                    return (
                        Err(RetryError::Exhausted {
                            attempts: stats.attempts,
                        }),
                        stats,
                    );
                }

                let delay = config.calculate_delay(attempt);
                stats.total_delay += delay;
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                debug!("Attempt {} failed, not retrying: {}", stats.attempts, e);
                return (Err(RetryError::Failed(e)), stats);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let config = RetryConfig::fixed(Duration::from_millis(10));
        assert_eq!(config.calculate_delay(0), Duration::from_millis(10));
        assert_eq!(config.calculate_delay(50), Duration::from_millis(10));
        assert_eq!(config.max_attempts, None);
    }

    #[test]
    fn test_default_is_discovery_interval() {
        let config = RetryConfig::default();
        assert_eq!(
            config.calculate_delay(3),
            DiscoveryConfig::FIND_SERVICE_RETRY_INTERVAL
        );
    }

    #[test]
    fn test_exponential_delay_no_jitter() {
        let config = RetryConfig::exponential(Duration::from_secs(1), Duration::from_secs(30))
            .with_jitter(false);

        assert_eq!(config.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(config.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(config.calculate_delay(2), Duration::from_secs(4));
        // 2^5 = 32s, capped at 30s
        assert_eq!(config.calculate_delay(5), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_with_jitter() {
        let config = RetryConfig::exponential(Duration::from_secs(2), Duration::from_secs(60));

        for _ in 0..20 {
            let delay = config.calculate_delay(0);
            assert!(
                delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3),
                "Delay {:?} should be between 1s and 3s",
                delay
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_first_try() {
        let config = RetryConfig::default();
        let (result, stats) = retry_until_found(&config, || Ok::<_, String>(Some(42))).await;

        assert_eq!(result, Ok(42));
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.total_delay, Duration::ZERO);
        assert!(stats.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_after_empty_attempts() {
        let config = RetryConfig::fixed(Duration::from_millis(10));
        let mut calls = 0;

        let (result, stats) = retry_until_found(&config, || {
            calls += 1;
            Ok::<_, String>((calls > 4).then_some("handle"))
        })
        .await;

        assert_eq!(result, Ok("handle"));
        assert_eq!(calls, 5);
        assert_eq!(stats.attempts, 5);
        assert_eq!(stats.total_delay, Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_stops_immediately() {
        let config = RetryConfig::default();
        let mut calls = 0;

        let (result, stats) = retry_until_found(&config, || {
            calls += 1;
            Err::<Option<u8>, _>("query failed".to_string())
        })
        .await;

        assert_eq!(result, Err(RetryError::Failed("query failed".to_string())));
        assert_eq!(calls, 1);
        assert!(!stats.success);
    }

    #[test]
    fn test_retry_error_display() {
        let failed: RetryError<String> = RetryError::Failed("registry unreachable".into());
        assert_eq!(failed.to_string(), "registry unreachable");

        let exhausted: RetryError<String> = RetryError::Exhausted { attempts: 5 };
        assert_eq!(exhausted.to_string(), "nothing found after 5 attempts");
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_retry_exhausts() {
        let config = RetryConfig::fixed(Duration::from_millis(5)).with_max_attempts(3);

        let (result, stats) = retry_until_found(&config, || Ok::<Option<u8>, String>(None)).await;

        assert_eq!(result, Err(RetryError::Exhausted { attempts: 3 }));
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.total_delay, Duration::from_millis(10));
    }
}
