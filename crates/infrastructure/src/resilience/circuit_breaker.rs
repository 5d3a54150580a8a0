use std::future::Future;

use coordinator_core::config::CircuitBreakerConfig;
use coordinator_core::{SchedulerError, SchedulerResult};
use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 熔断器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// 关闭，正常放行
    Closed,
    /// 打开，直接拒绝调用
    Open,
    /// 半开，放行少量试探调用判断依赖是否恢复
    HalfOpen,
}

impl CircuitState {
    fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// 熔断器统计信息
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    /// 连续失败次数
    pub consecutive_failures: u32,
    /// 最近一次打开的时间
    pub opened_at: Option<Instant>,
    /// 半开状态下正在执行的试探调用数
    pub half_open_in_flight: u32,
    pub total_calls: u64,
    pub failed_calls: u64,
    /// 未执行即被拒绝的调用数
    pub rejected_calls: u64,
    /// 每次进入半开状态加一，用于识别过期的试探名额
    trial_generation: u64,
}

impl CircuitBreakerStats {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            half_open_in_flight: 0,
            total_calls: 0,
            failed_calls: 0,
            rejected_calls: 0,
            trial_generation: 0,
        }
    }
}

/// 一次被放行的调用
///
/// 试探调用的 future 在完成前被丢弃时，由 `Drop` 归还半开名额。
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    /// 试探调用所属的半开周期，普通调用为 `None`
    trial: Option<u64>,
}

impl Permit<'_> {
    fn settle(mut self, failed: bool) {
        let trial = self.trial.take();
        if failed {
            self.breaker.record_failure(trial);
        } else {
            self.breaker.record_success(trial);
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if let Some(generation) = self.trial.take() {
            debug!(breaker = %self.breaker.name, "试探调用未完成即被丢弃，归还半开名额");
            self.breaker.release_trial(&mut self.breaker.stats.lock(), generation);
        }
    }
}

/// 熔断器
///
/// 连续失败超过阈值后打开，恢复时间过后进入半开状态放行有限的试探调用。
/// 所有计数都在同一把锁内更新，是跳闸与恢复判定的唯一依据。
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    stats: Mutex<CircuitBreakerStats>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            stats: Mutex::new(CircuitBreakerStats::new()),
        }
    }

    /// 在熔断保护下执行调用
    pub async fn execute<F, Fut, T>(&self, operation: F) -> SchedulerResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SchedulerResult<T>>,
    {
        let permit = self.admit()?;

        let result = operation().await;
        permit.settle(matches!(&result, Err(e) if e.counts_as_failure()));
        result
    }

    /// 根据当前状态决定是否放行
    fn admit(&self) -> SchedulerResult<Permit<'_>> {
        let mut stats = self.stats.lock();

        if stats.state == CircuitState::Open {
            let elapsed = stats
                .opened_at
                .map(|opened| opened.elapsed())
                .unwrap_or_default();
            if elapsed >= self.config.timeout() {
                self.transition(&mut stats, CircuitState::HalfOpen);
            } else {
                stats.rejected_calls += 1;
                return Err(SchedulerError::Unavailable(format!(
                    "熔断器 {} 处于打开状态，调用被拒绝",
                    self.name
                )));
            }
        }

        if stats.state != CircuitState::HalfOpen {
            return Ok(Permit {
                breaker: self,
                trial: None,
            });
        }

        if stats.half_open_in_flight >= self.config.half_open_max_calls {
            stats.rejected_calls += 1;
            return Err(SchedulerError::Unavailable(format!(
                "熔断器 {} 处于半开状态，试探调用数已满",
                self.name
            )));
        }
        stats.half_open_in_flight += 1;
        Ok(Permit {
            breaker: self,
            trial: Some(stats.trial_generation),
        })
    }

    /// 归还试探名额，名额属于已结束的半开周期时忽略
    fn release_trial(&self, stats: &mut CircuitBreakerStats, generation: u64) {
        if stats.state == CircuitState::HalfOpen && stats.trial_generation == generation {
            stats.half_open_in_flight = stats.half_open_in_flight.saturating_sub(1);
        }
    }

    fn record_success(&self, trial: Option<u64>) {
        let mut stats = self.stats.lock();
        stats.total_calls += 1;
        stats.consecutive_failures = 0;

        if let Some(generation) = trial {
            self.release_trial(&mut stats, generation);
            if stats.state == CircuitState::HalfOpen {
                self.transition(&mut stats, CircuitState::Closed);
            }
        }
    }

    fn record_failure(&self, trial: Option<u64>) {
        let mut stats = self.stats.lock();
        stats.total_calls += 1;
        stats.failed_calls += 1;
        stats.consecutive_failures += 1;

        match trial {
            Some(generation) => {
                self.release_trial(&mut stats, generation);
                if stats.state == CircuitState::HalfOpen {
                    self.transition(&mut stats, CircuitState::Open);
                }
            }
            None if stats.state == CircuitState::Closed
                && stats.consecutive_failures > self.config.failure_threshold =>
            {
                self.transition(&mut stats, CircuitState::Open);
            }
            None => {}
        }
    }

    fn transition(&self, stats: &mut CircuitBreakerStats, to: CircuitState) {
        let from = stats.state;
        stats.state = to;
        match to {
            CircuitState::Open => {
                stats.opened_at = Some(Instant::now());
                stats.half_open_in_flight = 0;
                warn!(
                    breaker = %self.name,
                    from = from.as_str(),
                    consecutive_failures = stats.consecutive_failures,
                    "熔断器打开"
                );
            }
            CircuitState::HalfOpen => {
                stats.half_open_in_flight = 0;
                stats.trial_generation += 1;
                info!(breaker = %self.name, "熔断器进入半开状态");
            }
            CircuitState::Closed => {
                stats.consecutive_failures = 0;
                stats.opened_at = None;
                info!(breaker = %self.name, from = from.as_str(), "熔断器关闭");
            }
        }
        counter!(
            "coordinator_circuit_breaker_transitions_total",
            "breaker" => self.name.clone(),
            "to" => to.as_str()
        )
        .increment(1);
    }

    /// 当前状态
    pub fn state(&self) -> CircuitState {
        self.stats.lock().state
    }

    /// 统计信息快照
    pub fn stats(&self) -> CircuitBreakerStats {
        self.stats.lock().clone()
    }

    /// 重置为关闭状态并清空统计
    pub fn reset(&self) {
        *self.stats.lock() = CircuitBreakerStats::new();
    }
}
