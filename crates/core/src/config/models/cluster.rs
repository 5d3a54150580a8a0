use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Worker注册表与心跳检测配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Worker上报心跳的预期间隔（毫秒）
    pub heartbeat_interval_ms: u64,
    /// 超过该时长未收到心跳即判定为失活（毫秒）
    pub heartbeat_timeout_ms: u64,
    /// 是否在Worker状态变化时发布 worker-status-changed 事件
    pub publish_status_changes: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 10_000,
            heartbeat_timeout_ms: 30_000,
            publish_status_changes: true,
        }
    }
}

impl RegistryConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }

        if self.heartbeat_timeout_ms <= self.heartbeat_interval_ms {
            return Err(anyhow::anyhow!(
                "心跳超时({}ms)必须大于心跳间隔({}ms)",
                self.heartbeat_timeout_ms,
                self.heartbeat_interval_ms
            ));
        }

        Ok(())
    }
}

/// 服务发现配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    /// 要发现的服务名称（DNS 模式下为主机名）
    pub service_name: String,
    /// DNS 解析时附带的端口
    pub port: u16,
    pub interval_seconds: u64,
    /// 非空时使用静态地址列表代替 DNS 解析
    pub static_addresses: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "worker-service".to_string(),
            port: 50051,
            interval_seconds: 10,
            static_addresses: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.service_name.is_empty() && self.static_addresses.is_empty() {
            return Err(anyhow::anyhow!("启用服务发现时必须配置服务名称或静态地址"));
        }

        if self.interval_seconds == 0 {
            return Err(anyhow::anyhow!("服务发现间隔必须大于0"));
        }

        Ok(())
    }
}

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// "least_loaded" 或 "round_robin"
    pub selection_strategy: String,
    /// 远端Worker目录服务地址，未配置时只使用本地注册表
    pub worker_directory_url: Option<String>,
    /// 远端任务存储服务地址，未配置时使用进程内存储
    pub task_store_url: Option<String>,
    pub request_timeout_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            selection_strategy: "least_loaded".to_string(),
            worker_directory_url: None,
            task_store_url: None,
            request_timeout_seconds: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_strategies = ["least_loaded", "round_robin"];
        if !valid_strategies.contains(&self.selection_strategy.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的Worker选择策略: {}，支持的策略: {:?}",
                self.selection_strategy,
                valid_strategies
            ));
        }

        for url in [&self.worker_directory_url, &self.task_store_url]
            .into_iter()
            .flatten()
        {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(anyhow::anyhow!("远端服务地址格式无效: {}", url));
            }
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }

        Ok(())
    }
}

/// 组件运行器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub shutdown_timeout_seconds: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_seconds: 30,
        }
    }
}

impl RunnerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.shutdown_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("关停超时时间必须大于0"));
        }
        Ok(())
    }
}
