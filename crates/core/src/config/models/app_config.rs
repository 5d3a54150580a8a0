use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    cluster::{DiscoveryConfig, RegistryConfig, RunnerConfig, SchedulerConfig},
    event_bus::EventBusConfig,
    observability::LoggingConfig,
    resilience::ResilienceConfig,
};

/// 默认配置文件查找路径
const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/coordinator.toml",
    "coordinator.toml",
    "/etc/coordinator/config.toml",
];

/// System configuration
///
/// 每个部分都是独立的具名子配置，缺省字段由各子配置的 `Default` 实现补齐。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub event_bus: EventBusConfig,
    pub registry: RegistryConfig,
    pub discovery: DiscoveryConfig,
    pub scheduler: SchedulerConfig,
    pub resilience: ResilienceConfig,
    pub runner: RunnerConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides, e.g. `COORDINATOR__REGISTRY__HEARTBEAT_TIMEOUT_MS`
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        match config_path {
            Some(path) => {
                if !Path::new(path).exists() {
                    return Err(anyhow::anyhow!("配置文件不存在: {}", path));
                }
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
            None => {
                if let Some(path) = DEFAULT_CONFIG_PATHS
                    .iter()
                    .find(|path| Path::new(path).exists())
                {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("COORDINATOR")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("discovery.static_addresses")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize::<AppConfig>()
            .context("反序列化配置失败")?
            .merge_defaults();

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = ConfigBuilder::builder()
            .add_source(File::from_str(toml_str, FileFormat::Toml))
            .build()
            .context("解析TOML配置失败")?
            .try_deserialize::<AppConfig>()
            .context("反序列化配置失败")?
            .merge_defaults();

        config.validate()?;
        Ok(config)
    }

    /// 用默认值补齐显式写成零值或空字符串的字段
    ///
    /// 缺失的字段已由 `#[serde(default)]` 处理，这里处理的是环境变量或配置文件中
    /// 写了 `0`/`""` 的情况。
    pub fn merge_defaults(mut self) -> Self {
        let defaults = AppConfig::default();

        let bus = &mut self.event_bus;
        fill_str(&mut bus.redis_url, &defaults.event_bus.redis_url);
        fill_str(&mut bus.group_id, &defaults.event_bus.group_id);
        fill(&mut bus.block_ms, defaults.event_bus.block_ms);
        fill(&mut bus.read_count, defaults.event_bus.read_count);
        fill(&mut bus.read_error_backoff_ms, defaults.event_bus.read_error_backoff_ms);
        fill(&mut bus.in_memory_retention, defaults.event_bus.in_memory_retention);

        let topics = &mut bus.topics;
        let default_topics = &defaults.event_bus.topics;
        for (topic, default) in [
            (&mut topics.task_created, &default_topics.task_created),
            (&mut topics.task_status_changed, &default_topics.task_status_changed),
            (&mut topics.task_completed, &default_topics.task_completed),
            (&mut topics.task_failed, &default_topics.task_failed),
            (&mut topics.task_scheduled, &default_topics.task_scheduled),
            (&mut topics.task_assigned, &default_topics.task_assigned),
            (&mut topics.subtask_completed, &default_topics.subtask_completed),
            (&mut topics.worker_status_changed, &default_topics.worker_status_changed),
            (&mut topics.worker_heartbeat, &default_topics.worker_heartbeat),
            (&mut topics.audit_event, &default_topics.audit_event),
        ] {
            fill_str(topic, default);
        }

        fill(&mut self.registry.heartbeat_interval_ms, defaults.registry.heartbeat_interval_ms);
        fill(&mut self.registry.heartbeat_timeout_ms, defaults.registry.heartbeat_timeout_ms);

        fill_str(&mut self.discovery.service_name, &defaults.discovery.service_name);
        fill(&mut self.discovery.port, defaults.discovery.port);
        fill(&mut self.discovery.interval_seconds, defaults.discovery.interval_seconds);

        fill_str(
            &mut self.scheduler.selection_strategy,
            &defaults.scheduler.selection_strategy,
        );
        fill(
            &mut self.scheduler.request_timeout_seconds,
            defaults.scheduler.request_timeout_seconds,
        );

        let resilience = &mut self.resilience;
        let default_resilience = &defaults.resilience;
        fill(
            &mut resilience.rate_limit.requests_per_second,
            default_resilience.rate_limit.requests_per_second,
        );
        fill(&mut resilience.rate_limit.burst_size, default_resilience.rate_limit.burst_size);
        fill(
            &mut resilience.circuit_breaker.failure_threshold,
            default_resilience.circuit_breaker.failure_threshold,
        );
        fill(
            &mut resilience.circuit_breaker.timeout_ms,
            default_resilience.circuit_breaker.timeout_ms,
        );
        fill(
            &mut resilience.circuit_breaker.half_open_max_calls,
            default_resilience.circuit_breaker.half_open_max_calls,
        );
        fill(
            &mut resilience.retry.initial_interval_ms,
            default_resilience.retry.initial_interval_ms,
        );
        fill(&mut resilience.retry.multiplier, default_resilience.retry.multiplier);
        fill(&mut resilience.retry.max_interval_ms, default_resilience.retry.max_interval_ms);
        fill(
            &mut resilience.retry.max_elapsed_time_ms,
            default_resilience.retry.max_elapsed_time_ms,
        );
        fill(&mut resilience.retry.max_attempts, default_resilience.retry.max_attempts);

        fill(
            &mut self.runner.shutdown_timeout_seconds,
            defaults.runner.shutdown_timeout_seconds,
        );
        fill_str(&mut self.logging.level, &defaults.logging.level);

        self
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.event_bus.validate().context("事件总线配置验证失败")?;
        self.registry.validate().context("注册表配置验证失败")?;
        self.discovery.validate().context("服务发现配置验证失败")?;
        self.scheduler.validate().context("调度器配置验证失败")?;
        self.resilience.validate().context("弹性调用配置验证失败")?;
        self.runner.validate().context("运行器配置验证失败")?;
        self.logging.validate().context("日志配置验证失败")?;
        Ok(())
    }
}

fn fill<T: Default + PartialEq>(value: &mut T, default: T) {
    if *value == T::default() {
        *value = default;
    }
}

fn fill_str(value: &mut String, default: &str) {
    if value.trim().is_empty() {
        *value = default.to_string();
    }
}
