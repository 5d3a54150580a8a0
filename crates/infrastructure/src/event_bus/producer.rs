use std::sync::Arc;

use async_trait::async_trait;
use coordinator_core::{CallContext, Component, SchedulerError, SchedulerResult};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, error, info};

use super::transport::EventTransport;

/// 事件生产者
///
/// 将事件序列化为 JSON 后按键写入主题。发布失败直接返回给调用方，内部不重试。
pub struct EventProducer {
    transport: Arc<dyn EventTransport>,
}

impl EventProducer {
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        Self { transport }
    }

    pub async fn publish<E>(&self, topic: &str, key: &str, event: &E) -> SchedulerResult<()>
    where
        E: Serialize + Sync,
    {
        let payload = serde_json::to_string(event).map_err(|e| {
            SchedulerError::Serialization(format!("无法序列化发往 {topic} 的事件: {e}"))
        })?;

        match self.transport.publish(topic, key, payload).await {
            Ok(id) => {
                counter!("coordinator_events_published_total", "topic" => topic.to_string())
                    .increment(1);
                debug!(topic, key, id = %id, "事件已发布");
                Ok(())
            }
            Err(e) => {
                counter!("coordinator_events_publish_failed_total", "topic" => topic.to_string())
                    .increment(1);
                error!(topic, key, error = %e, "事件发布失败");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Component for EventProducer {
    fn name(&self) -> &str {
        "event-producer"
    }

    async fn start(&self, _ctx: &CallContext) -> SchedulerResult<()> {
        self.transport.ping().await?;
        info!("事件生产者已就绪");
        Ok(())
    }

    async fn stop(&self, _ctx: &CallContext) -> SchedulerResult<()> {
        info!("事件生产者已停止");
        Ok(())
    }
}
