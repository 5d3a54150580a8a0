use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 令牌桶限流配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// 稳定速率（每秒令牌数）
    pub requests_per_second: u32,
    /// 桶容量，即允许的突发请求数
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 100,
            burst_size: 200,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.requests_per_second == 0 {
            return Err(anyhow::anyhow!("限流速率必须大于0"));
        }
        if self.burst_size == 0 {
            return Err(anyhow::anyhow!("突发容量必须大于0"));
        }
        Ok(())
    }
}

/// 熔断器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// 容忍的连续失败次数，超过后熔断器打开
    pub failure_threshold: u32,
    /// 打开状态持续多久后允许试探调用（毫秒）
    pub timeout_ms: u64,
    /// 半开状态下允许并发执行的试探调用数
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_ms: 60_000,
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_ms == 0 {
            return Err(anyhow::anyhow!("熔断恢复时间必须大于0"));
        }
        if self.half_open_max_calls == 0 {
            return Err(anyhow::anyhow!("半开状态试探调用数必须大于0"));
        }
        Ok(())
    }
}

/// 指数退避重试配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_interval_ms: u64,
    pub multiplier: f64,
    /// 抖动系数，实际间隔在 `interval * (1 ± factor)` 内随机
    pub randomization_factor: f64,
    pub max_interval_ms: u64,
    /// 所有尝试的总耗时上限
    pub max_elapsed_time_ms: u64,
    /// 最大尝试次数（包含首次调用）
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 100,
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval_ms: 10_000,
            max_elapsed_time_ms: 60_000,
            max_attempts: 5,
        }
    }
}

impl RetryConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn max_elapsed_time(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_time_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("最大尝试次数必须大于0"));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(anyhow::anyhow!(
                "退避倍数必须是不小于1.0的有限值: {}",
                self.multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.randomization_factor) {
            return Err(anyhow::anyhow!(
                "抖动系数必须在0.0到1.0之间: {}",
                self.randomization_factor
            ));
        }
        if self.max_interval_ms < self.initial_interval_ms {
            return Err(anyhow::anyhow!("最大退避间隔不能小于初始间隔"));
        }
        Ok(())
    }
}

/// 远程调用弹性配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResilienceConfig {
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
}

impl ResilienceConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.rate_limit.validate()?;
        self.circuit_breaker.validate()?;
        self.retry.validate()
    }
}
