use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Outcome of classifying a failed action: whether the primitive should
/// retry it or surface it to the caller immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Transient,
    Permanent,
}

/// Exponential-backoff-with-jitter retry policy shared by every
/// cloud-facing call. Defaults match spec: 3 retries, 1s initial delay,
/// 10s cap, x2 multiplier, jitter on.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Upper bound on the delay before attempt `k` (0-indexed), pre-jitter.
    pub fn bound_for_attempt(&self, k: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(k as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// The actual delay that would be slept before attempt `k`, jitter applied.
    pub fn delay_for_attempt(&self, k: u32) -> Duration {
        let bound = self.bound_for_attempt(k);
        if self.jitter {
            let factor: f64 = rand::rng().random_range(0.0..1.0);
            Duration::from_secs_f64(bound.as_secs_f64() * factor)
        } else {
            bound
        }
    }

    /// Run `action` up to `max_retries + 1` times, retrying only errors the
    /// `classify` closure marks transient. `operation` is a label for logging.
    pub async fn run<T, E, Fut, F, C>(
        &self,
        operation: &str,
        classify: C,
        mut action: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> Classification,
        E: fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            match action().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let transient = classify(&err) == Classification::Transient;
                    if !transient || attempt >= self.max_retries {
                        if attempt > 0 {
                            warn!(operation, attempt, error = %err, "retry exhausted");
                        }
                        return Err(err);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    debug!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Boom;
    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_up_to_n_plus_one_attempts() {
        let policy = RetryPolicy { max_retries: 3, jitter: false, ..Default::default() };
        let attempts = AtomicU32::new(0);

        let result: Result<(), Boom> = policy
            .run(
                "list_devices",
                |_: &Boom| Classification::Transient,
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err(Boom) }
                },
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn permanent_error_stops_after_one_attempt() {
        let policy = RetryPolicy::default();
        let attempts = AtomicU32::new(0);

        let result: Result<(), Boom> = policy
            .run(
                "execute_commands",
                |_: &Boom| Classification::Permanent,
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err(Boom) }
                },
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_ok() {
        let policy = RetryPolicy::default();
        let attempts = AtomicU32::new(0);

        let result = policy
            .run(
                "get_status",
                |_: &Boom| Classification::Transient,
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, Boom>(42) }
                },
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_bound_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            ..Default::default()
        };

        assert_eq!(policy.bound_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.bound_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.bound_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.bound_for_attempt(3), Duration::from_secs(8));
        // 1 * 2^4 = 16, capped at 10
        assert_eq!(policy.bound_for_attempt(4), Duration::from_secs(10));
    }

    #[test]
    fn jittered_delay_never_exceeds_bound() {
        let policy = RetryPolicy { jitter: true, ..Default::default() };
        for k in 0..6 {
            let bound = policy.bound_for_attempt(k);
            for _ in 0..50 {
                let delay = policy.delay_for_attempt(k);
                assert!(delay <= bound);
            }
        }
    }

    #[test]
    fn disabled_jitter_always_equals_bound() {
        let policy = RetryPolicy { jitter: false, ..Default::default() };
        for k in 0..6 {
            assert_eq!(policy.delay_for_attempt(k), policy.bound_for_attempt(k));
        }
    }
}
