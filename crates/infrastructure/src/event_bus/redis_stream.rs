use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coordinator_core::{SchedulerError, SchedulerResult};
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client};
use tracing::{debug, info, warn};

use super::transport::{EventRecord, EventTransport, TopicReader};

const FIELD_KEY: &str = "key";
const FIELD_PAYLOAD: &str = "payload";
const FIELD_PUBLISHED_AT: &str = "published_at";

/// Redis Streams 传输设置
#[derive(Debug, Clone)]
pub struct RedisStreamSettings {
    pub url: String,
    /// 组内消费者名称
    pub consumer_name: String,
    pub block_ms: u64,
    pub read_count: usize,
}

/// 基于 Redis Streams 的事件传输
///
/// 每个主题对应一个 Stream，消费组对应 Stream 上的 consumer group。单个 Stream
/// 内的消息全局有序，因此同键消息的发布顺序自然得到保留。
pub struct RedisStreamTransport {
    client: Client,
    publisher: ConnectionManager,
    settings: RedisStreamSettings,
}

impl RedisStreamTransport {
    pub async fn connect(settings: RedisStreamSettings) -> SchedulerResult<Self> {
        let client = Client::open(settings.url.as_str()).map_err(|e| {
            SchedulerError::MessageQueue(format!("Failed to create Redis client: {e}"))
        })?;
        let publisher = ConnectionManager::new(client.clone()).await.map_err(|e| {
            SchedulerError::MessageQueue(format!("Failed to connect to Redis: {e}"))
        })?;

        info!(url = %settings.url, consumer = %settings.consumer_name, "已连接 Redis Streams");
        Ok(Self {
            client,
            publisher,
            settings,
        })
    }

    async fn ensure_consumer_group(
        conn: &mut MultiplexedConnection,
        stream: &str,
        group: &str,
    ) -> SchedulerResult<()> {
        let created: redis::RedisResult<()> = conn.xgroup_create_mkstream(stream, group, "0").await;
        match created {
            Ok(()) => {
                debug!("Successfully created consumer group {} on {}", group, stream);
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group {} already exists", group);
                Ok(())
            }
            Err(e) => Err(SchedulerError::MessageQueue(format!(
                "Failed to create consumer group {group}: {e}"
            ))),
        }
    }
}

#[async_trait]
impl EventTransport for RedisStreamTransport {
    async fn publish(&self, topic: &str, key: &str, payload: String) -> SchedulerResult<String> {
        let mut conn = self.publisher.clone();
        let published_at = Utc::now().to_rfc3339();
        let fields = [
            (FIELD_KEY, key),
            (FIELD_PAYLOAD, payload.as_str()),
            (FIELD_PUBLISHED_AT, published_at.as_str()),
        ];
        let id: String = conn.xadd(topic, "*", &fields).await.map_err(|e| {
            SchedulerError::MessageQueue(format!("Failed to publish to stream {topic}: {e}"))
        })?;
        Ok(id)
    }

    async fn reader(&self, topic: &str, group_id: &str) -> SchedulerResult<Box<dyn TopicReader>> {
        // 阻塞读取会占住连接，每个读取循环使用独立连接
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                SchedulerError::MessageQueue(format!("Failed to open Redis connection: {e}"))
            })?;
        Self::ensure_consumer_group(&mut conn, topic, group_id).await?;

        Ok(Box::new(RedisStreamReader {
            conn,
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            settings: self.settings.clone(),
            buffer: VecDeque::new(),
            draining_pending: true,
        }))
    }

    async fn ping(&self) -> SchedulerResult<()> {
        let mut conn = self.publisher.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("Redis ping failed: {e}")))?;
        Ok(())
    }
}

struct RedisStreamReader {
    conn: MultiplexedConnection,
    topic: String,
    group_id: String,
    settings: RedisStreamSettings,
    buffer: VecDeque<EventRecord>,
    /// 启动时先重读本消费者已读未确认的消息，读空后再读取新消息
    draining_pending: bool,
}

impl RedisStreamReader {
    async fn fill(&mut self) -> SchedulerResult<()> {
        let start_id = if self.draining_pending { "0" } else { ">" };
        let mut opts = StreamReadOptions::default()
            .group(&self.group_id, &self.settings.consumer_name)
            .count(self.settings.read_count);
        if !self.draining_pending {
            opts = opts.block(self.settings.block_ms as usize);
        }

        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[self.topic.as_str()], &[start_id], &opts)
            .await
            .map_err(|e| {
                SchedulerError::MessageQueue(format!(
                    "Failed to read from stream {}: {e}",
                    self.topic
                ))
            })?;

        let entries: Vec<StreamId> = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();

        if self.draining_pending && entries.is_empty() {
            debug!(topic = %self.topic, "未确认消息已重放完毕");
            self.draining_pending = false;
        }

        for entry in entries {
            match self.to_record(&entry) {
                Some(record) => self.buffer.push_back(record),
                None => {
                    warn!(topic = %self.topic, id = %entry.id, "丢弃格式错误的消息");
                    let _: redis::RedisResult<i64> = self
                        .conn
                        .xack(&self.topic, &self.group_id, &[&entry.id])
                        .await;
                }
            }
        }
        Ok(())
    }

    fn to_record(&self, entry: &StreamId) -> Option<EventRecord> {
        let payload: String = entry.get(FIELD_PAYLOAD)?;
        let key: String = entry.get(FIELD_KEY).unwrap_or_default();
        let published_at = entry
            .get::<String>(FIELD_PUBLISHED_AT)
            .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Some(EventRecord {
            id: entry.id.clone(),
            topic: self.topic.clone(),
            key,
            payload,
            published_at,
        })
    }
}

#[async_trait]
impl TopicReader for RedisStreamReader {
    async fn next(&mut self) -> SchedulerResult<EventRecord> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(record);
            }
            self.fill().await?;
        }
    }

    async fn ack(&mut self, record: &EventRecord) -> SchedulerResult<()> {
        let _: i64 = self
            .conn
            .xack(&self.topic, &self.group_id, &[&record.id])
            .await
            .map_err(|e| {
                SchedulerError::MessageQueue(format!(
                    "Failed to ack message {} on {}: {e}",
                    record.id, self.topic
                ))
            })?;
        Ok(())
    }
}
