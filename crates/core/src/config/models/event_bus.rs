use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::topics;

/// 事件总线传输类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// 进程内传输，用于嵌入式模式和测试
    #[default]
    InMemory,
    RedisStream,
}

/// 主题名称配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TopicConfig {
    pub task_created: String,
    pub task_status_changed: String,
    pub task_completed: String,
    pub task_failed: String,
    pub task_scheduled: String,
    pub task_assigned: String,
    pub subtask_completed: String,
    pub worker_status_changed: String,
    pub worker_heartbeat: String,
    pub audit_event: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            task_created: topics::TASK_CREATED.to_string(),
            task_status_changed: topics::TASK_STATUS_CHANGED.to_string(),
            task_completed: topics::TASK_COMPLETED.to_string(),
            task_failed: topics::TASK_FAILED.to_string(),
            task_scheduled: topics::TASK_SCHEDULED.to_string(),
            task_assigned: topics::TASK_ASSIGNED.to_string(),
            subtask_completed: topics::SUBTASK_COMPLETED.to_string(),
            worker_status_changed: topics::WORKER_STATUS_CHANGED.to_string(),
            worker_heartbeat: topics::WORKER_HEARTBEAT.to_string(),
            audit_event: topics::AUDIT_EVENT.to_string(),
        }
    }
}

impl TopicConfig {
    fn all(&self) -> [(&'static str, &str); 10] {
        [
            ("task_created", &self.task_created),
            ("task_status_changed", &self.task_status_changed),
            ("task_completed", &self.task_completed),
            ("task_failed", &self.task_failed),
            ("task_scheduled", &self.task_scheduled),
            ("task_assigned", &self.task_assigned),
            ("subtask_completed", &self.subtask_completed),
            ("worker_status_changed", &self.worker_status_changed),
            ("worker_heartbeat", &self.worker_heartbeat),
            ("audit_event", &self.audit_event),
        ]
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (field, topic) in self.all() {
            if topic.trim().is_empty() {
                return Err(anyhow::anyhow!("主题名称不能为空: {}", field));
            }
        }
        Ok(())
    }
}

/// 事件总线配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    pub transport: TransportKind,
    pub redis_url: String,
    /// 消费组名称，同组内的消费者分摊消息
    pub group_id: String,
    /// 组内消费者名称，为空时使用主机名
    pub consumer_name: String,
    /// XREADGROUP 单次阻塞时长（毫秒）
    pub block_ms: u64,
    /// 单次读取的最大消息数
    pub read_count: usize,
    /// 读取失败后的退避时长（毫秒）
    pub read_error_backoff_ms: u64,
    /// 进程内传输每个主题最多保留的消息数
    pub in_memory_retention: usize,
    pub topics: TopicConfig,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::InMemory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            group_id: "scheduler-service".to_string(),
            consumer_name: String::new(),
            block_ms: 1000,
            read_count: 100,
            read_error_backoff_ms: 500,
            in_memory_retention: 10_000,
            topics: TopicConfig::default(),
        }
    }
}

impl EventBusConfig {
    pub fn read_error_backoff(&self) -> Duration {
        Duration::from_millis(self.read_error_backoff_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.transport == TransportKind::RedisStream {
            if self.redis_url.is_empty() {
                return Err(anyhow::anyhow!("Redis连接地址不能为空"));
            }
            if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://")
            {
                return Err(anyhow::anyhow!("Redis连接地址格式无效: {}", self.redis_url));
            }
        }

        if self.group_id.is_empty() {
            return Err(anyhow::anyhow!("消费组名称不能为空"));
        }

        if self.block_ms == 0 {
            return Err(anyhow::anyhow!("读取阻塞时长必须大于0"));
        }

        if self.read_count == 0 {
            return Err(anyhow::anyhow!("单次读取数量必须大于0"));
        }

        if self.in_memory_retention == 0 {
            return Err(anyhow::anyhow!("内存传输保留消息数必须大于0"));
        }

        self.topics.validate()
    }
}
