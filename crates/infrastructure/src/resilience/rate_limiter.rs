use std::num::NonZeroU32;

use coordinator_core::config::RateLimitConfig;
use coordinator_core::{CallContext, SchedulerError, SchedulerResult};
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::Quota;

type DirectLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// 令牌桶限流器
///
/// 按配置速率补充令牌，桶容量即突发上限。获取令牌时会一直等待，直到拿到令牌
/// 或调用上下文被取消/超时。
pub struct RateLimiter {
    limiter: DirectLimiter,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(burst);

        Self {
            limiter: governor::RateLimiter::direct(quota),
            config: config.clone(),
        }
    }

    /// 等待一个令牌；上下文结束时返回 `ResourceExhausted` 且不消耗令牌
    pub async fn acquire(&self, ctx: &CallContext) -> SchedulerResult<()> {
        if ctx.is_done() {
            return Err(SchedulerError::ResourceExhausted(
                "调用上下文已结束，放弃等待限流令牌".to_string(),
            ));
        }

        if self.limiter.check().is_ok() {
            return Ok(());
        }

        tokio::select! {
            _ = self.limiter.until_ready() => Ok(()),
            _ = ctx.done() => Err(SchedulerError::ResourceExhausted(format!(
                "等待限流令牌时上下文结束 (rate={}/s, burst={})",
                self.config.requests_per_second, self.config.burst_size
            ))),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_burst_then_wait_for_refill() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            requests_per_second: 10,
            burst_size: 3,
        });
        let ctx = CallContext::background();

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire(&ctx).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(50));

        let before_fourth = Instant::now();
        limiter.acquire(&ctx).await.unwrap();
        // 10/s 的补充间隔为 100ms
        assert!(before_fourth.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_deadline_fails_with_resource_exhausted() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            requests_per_second: 1,
            burst_size: 1,
        });
        limiter.acquire(&CallContext::background()).await.unwrap();

        let ctx = CallContext::background().with_timeout(Duration::from_millis(20));
        let result = limiter.acquire(&ctx).await;
        assert!(matches!(result, Err(SchedulerError::ResourceExhausted(_))));
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_immediately() {
        let limiter = RateLimiter::new(&RateLimitConfig::default());
        let ctx = CallContext::background();
        ctx.cancel();

        let result = limiter.acquire(&ctx).await;
        assert!(matches!(result, Err(SchedulerError::ResourceExhausted(_))));
    }
}
