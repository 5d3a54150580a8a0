use std::future::Future;

use coordinator_core::config::ResilienceConfig;
use coordinator_core::{CallContext, SchedulerResult};
use metrics::histogram;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitState};
use super::rate_limiter::RateLimiter;
use super::retry::RetryPolicy;

/// 远程调用的弹性包装
///
/// 拦截顺序为 日志 → 限流 → 熔断 → 重试 → 实际调用：限流在最外层以最低代价
/// 削减负载；熔断在重试之前，打开后直接失败而不经历退避；重试在最内层，只重发
/// 实际的网络调用。
pub struct ResilientCaller {
    service: String,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl ResilientCaller {
    pub fn new(service: impl Into<String>, config: &ResilienceConfig) -> Self {
        let service = service.into();
        Self {
            limiter: RateLimiter::new(&config.rate_limit),
            breaker: CircuitBreaker::new(service.clone(), config.circuit_breaker.clone()),
            retry: RetryPolicy::new(config.retry.clone()),
            service,
        }
    }

    /// 替换默认的重试策略，例如使用自定义的可重试判定
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn call<F, Fut, T>(
        &self,
        ctx: &CallContext,
        operation: &str,
        call: F,
    ) -> SchedulerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SchedulerResult<T>>,
    {
        let started = Instant::now();

        let result = match self.limiter.acquire(ctx).await {
            Ok(()) => {
                self.breaker
                    .execute(|| self.retry.execute(ctx, call))
                    .await
            }
            Err(e) => Err(e),
        };

        let elapsed = started.elapsed();
        histogram!(
            "coordinator_remote_call_duration_seconds",
            "service" => self.service.clone(),
            "operation" => operation.to_string()
        )
        .record(elapsed.as_secs_f64());

        match &result {
            Ok(_) => debug!(
                service = %self.service,
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                "远程调用成功"
            ),
            Err(e) => warn!(
                service = %self.service,
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "远程调用失败"
            ),
        }

        result
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinator_core::config::{CircuitBreakerConfig, RetryConfig};
    use coordinator_core::SchedulerError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> ResilienceConfig {
        ResilienceConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                timeout_ms: 60_000,
                half_open_max_calls: 1,
            },
            retry: RetryConfig {
                initial_interval_ms: 10,
                max_interval_ms: 100,
                max_attempts: 3,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_skips_retries() {
        let caller = ResilientCaller::new("task-store", &config());
        let ctx = CallContext::background();
        let calls = AtomicU32::new(0);

        // 两轮完整的重试序列失败后熔断器打开
        for _ in 0..2 {
            let result: SchedulerResult<()> = caller
                .call(&ctx, "get_task", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(SchedulerError::Network("down".into()))
                })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(caller.circuit_state(), CircuitState::Open);

        let result: SchedulerResult<()> = caller
            .call(&ctx, "get_task", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(SchedulerError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_cancelled_context_never_reaches_call() {
        let caller = ResilientCaller::new("worker-directory", &config());
        let ctx = CallContext::background();
        ctx.cancel();

        let calls = AtomicU32::new(0);
        let result: SchedulerResult<()> = caller
            .call(&ctx, "list_workers", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(SchedulerError::ResourceExhausted(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
