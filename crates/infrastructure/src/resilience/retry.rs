use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use coordinator_core::config::RetryConfig;
use coordinator_core::{CallContext, SchedulerError, SchedulerResult};
use metrics::counter;
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 判断错误是否值得重试
pub type RetryPredicate = Arc<dyn Fn(&SchedulerError) -> bool + Send + Sync>;

/// 指数退避重试策略
///
/// 每次失败后的等待时间按倍数增长并加入随机抖动，受单次间隔上限、总耗时上限
/// 和最大尝试次数共同约束。不可重试的错误和上下文取消会立即结束重试。
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    predicate: RetryPredicate,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            predicate: Arc::new(SchedulerError::is_retryable),
        }
    }

    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&SchedulerError) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    pub async fn execute<F, Fut, T>(&self, ctx: &CallContext, mut operation: F) -> SchedulerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SchedulerResult<T>>,
    {
        let started = Instant::now();
        let mut interval = self.config.initial_interval();
        let mut attempt: u32 = 0;

        loop {
            if ctx.is_done() {
                return Err(SchedulerError::DeadlineExceeded(format!(
                    "调用上下文已结束，共尝试 {attempt} 次"
                )));
            }

            attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !(self.predicate)(&error) {
                debug!(attempt, error = %error, "不可重试的错误，停止重试");
                return Err(error);
            }

            if attempt >= self.config.max_attempts {
                warn!(attempt, error = %error, "已达到最大尝试次数");
                return Err(error);
            }

            let delay = jittered(interval, self.config.randomization_factor);
            if started.elapsed() + delay > self.config.max_elapsed_time() {
                return Err(SchedulerError::DeadlineExceeded(format!(
                    "重试总耗时超过 {:?}，最后一次错误: {error}",
                    self.config.max_elapsed_time()
                )));
            }

            counter!("coordinator_retries_total").increment(1);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "调用失败，等待后重试"
            );

            tokio::select! {
                _ = ctx.done() => {
                    return Err(SchedulerError::DeadlineExceeded(format!(
                        "退避等待期间上下文结束，最后一次错误: {error}"
                    )));
                }
                _ = tokio::time::sleep(delay) => {}
            }

            interval = next_interval(interval, self.config.multiplier, self.config.max_interval());
        }
    }
}

/// 按倍数放大间隔，结果不超过 `max`
///
/// 在浮点秒上计算并先行截断，倍数过大或非有限值时直接取上限。
fn next_interval(current: Duration, multiplier: f64, max: Duration) -> Duration {
    let next = current.as_secs_f64() * multiplier;
    if !next.is_finite() || next >= max.as_secs_f64() {
        return max;
    }
    Duration::try_from_secs_f64(next).unwrap_or(max)
}

/// 在 `interval * (1 ± factor)` 范围内随机取值
fn jittered(interval: Duration, factor: f64) -> Duration {
    if factor.is_nan() || factor <= 0.0 {
        return interval;
    }
    let factor = factor.min(1.0);
    let base = interval.as_secs_f64();
    let low = base * (1.0 - factor);
    let high = base * (1.0 + factor);
    Duration::try_from_secs_f64(rand::rng().random_range(low..=high)).unwrap_or(interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> RetryConfig {
        RetryConfig {
            initial_interval_ms: 100,
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval_ms: 10_000,
            max_elapsed_time_ms: 60_000,
            max_attempts: 5,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let policy = RetryPolicy::new(config());
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: SchedulerResult<()> = policy
            .execute(&CallContext::background(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SchedulerError::Permanent("invalid argument".into()))
            })
            .await;

        assert!(matches!(result, Err(SchedulerError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::new(config());
        let calls = AtomicU32::new(0);

        let result = policy
            .execute(&CallContext::background(), || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SchedulerError::Network("reset by peer".into()))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(config());
        let calls = AtomicU32::new(0);

        let result: SchedulerResult<()> = policy
            .execute(&CallContext::background(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SchedulerError::Network("unreachable".into()))
            })
            .await;

        assert!(matches!(result, Err(SchedulerError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_budget_returns_deadline_exceeded() {
        let policy = RetryPolicy::new(RetryConfig {
            initial_interval_ms: 1_000,
            randomization_factor: 0.0,
            max_elapsed_time_ms: 1_500,
            ..config()
        });
        let calls = AtomicU32::new(0);

        let result: SchedulerResult<()> = policy
            .execute(&CallContext::background(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SchedulerError::Unavailable("busy".into()))
            })
            .await;

        // 第二次退避 1.5s 会超出 1.5s 的总预算
        assert!(matches!(result, Err(SchedulerError::DeadlineExceeded(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff() {
        let policy = RetryPolicy::new(RetryConfig {
            initial_interval_ms: 5_000,
            max_interval_ms: 10_000,
            ..config()
        });
        let ctx = CallContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let calls = AtomicU32::new(0);
        let result: SchedulerResult<()> = policy
            .execute(&ctx, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SchedulerError::Network("timeout".into()))
            })
            .await;

        assert!(matches!(result, Err(SchedulerError::DeadlineExceeded(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_multiplier_is_capped_at_max_interval() {
        let policy = RetryPolicy::new(RetryConfig {
            initial_interval_ms: 100,
            multiplier: 1e300,
            randomization_factor: 0.0,
            max_interval_ms: 2_000,
            max_elapsed_time_ms: 60_000,
            max_attempts: 4,
        });
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: SchedulerResult<()> = policy
            .execute(&CallContext::background(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SchedulerError::Unavailable("busy".into()))
            })
            .await;

        assert!(matches!(result, Err(SchedulerError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 100ms 之后每次退避都被截断到 2s
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(4_100));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_next_interval_saturates() {
        let max = Duration::from_secs(10);
        let current = Duration::from_secs(1);

        assert_eq!(next_interval(current, 1.5, max), Duration::from_millis(1_500));
        assert_eq!(next_interval(current, 1e300, max), max);
        assert_eq!(next_interval(Duration::from_secs(u64::MAX), 2.0, max), max);
        assert_eq!(next_interval(current, f64::INFINITY, max), max);
        assert_eq!(next_interval(current, f64::NAN, max), max);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let interval = Duration::from_millis(100);
        for _ in 0..100 {
            let delay = jittered(interval, 0.5);
            assert!(delay >= Duration::from_millis(49));
            assert!(delay <= Duration::from_millis(151));
        }
    }
}
