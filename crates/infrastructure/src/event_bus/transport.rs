use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coordinator_core::{SchedulerError, SchedulerResult};
use serde::de::DeserializeOwned;

/// 从传输层读到的一条事件记录
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// 传输层分配的消息ID
    pub id: String,
    pub topic: String,
    /// 关联键，通常是任务ID或Worker ID
    pub key: String,
    /// JSON 载荷
    pub payload: String,
    pub published_at: DateTime<Utc>,
}

impl EventRecord {
    /// 将载荷反序列化为具体的事件类型
    pub fn decode<T: DeserializeOwned>(&self) -> SchedulerResult<T> {
        serde_json::from_str(&self.payload).map_err(|e| {
            SchedulerError::Serialization(format!(
                "无法解析主题 {} 上的消息 {}: {e}",
                self.topic, self.id
            ))
        })
    }
}

/// 基于主题的发布/订阅传输抽象
///
/// 实现必须保证同一主题内相同键的消息按发布顺序投递；同一消费组内的读取者
/// 分摊消息，不同消费组各自收到全部消息。
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// 写入一条消息，返回传输层分配的ID
    async fn publish(&self, topic: &str, key: &str, payload: String) -> SchedulerResult<String>;

    /// 为指定主题和消费组创建读取者
    async fn reader(&self, topic: &str, group_id: &str) -> SchedulerResult<Box<dyn TopicReader>>;

    /// 检查传输层是否可用
    async fn ping(&self) -> SchedulerResult<()> {
        Ok(())
    }
}

/// 单个主题的读取者，由一个读取循环独占使用
#[async_trait]
pub trait TopicReader: Send {
    /// 阻塞直到读取到下一条记录
    async fn next(&mut self) -> SchedulerResult<EventRecord>;

    /// 确认记录已处理
    async fn ack(&mut self, record: &EventRecord) -> SchedulerResult<()>;

    async fn close(&mut self) -> SchedulerResult<()> {
        Ok(())
    }
}

/// 事件处理器
///
/// 投递语义为至少一次，处理器必须是幂等的；处理失败的消息不会被重新投递。
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, record: &EventRecord) -> SchedulerResult<()>;
}
