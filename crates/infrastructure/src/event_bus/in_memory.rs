use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use coordinator_core::SchedulerResult;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use super::transport::{EventRecord, EventTransport, TopicReader};

/// 每个主题默认保留的消息数
pub const DEFAULT_RETENTION: usize = 10_000;

/// 内存事件传输实现
///
/// 每个主题维护一份有序日志，每个消费组在日志上持有一个共享游标，适用于
/// 嵌入式部署和测试场景。读取即推进游标，进程退出后消息不会保留。
///
/// 所有已注册消费组都读过的记录会被立即丢弃；没有消费组的主题最多保留
/// `retention` 条记录，超出时丢弃最旧的记录。
pub struct InMemoryTransport {
    topics: Mutex<HashMap<String, Arc<TopicLog>>>,
    retention: usize,
}

struct TopicLog {
    state: Mutex<TopicState>,
    notify: Notify,
    retention: usize,
}

#[derive(Default)]
struct TopicState {
    records: VecDeque<EventRecord>,
    /// `records[0]` 在日志中的绝对位置
    base: usize,
    /// 消费组 -> 下一条待读取记录的绝对位置
    cursors: HashMap<String, usize>,
    next_id: u64,
}

impl TopicState {
    fn end(&self) -> usize {
        self.base + self.records.len()
    }

    fn drop_front(&mut self, count: usize) {
        let count = count.min(self.records.len());
        self.records.drain(..count);
        self.base += count;
    }

    /// 丢弃所有消费组都已读过的前缀
    fn compact(&mut self) {
        let Some(low) = self.cursors.values().copied().min() else {
            return;
        };
        if low > self.base {
            self.drop_front(low - self.base);
        }
    }
}

impl TopicLog {
    fn new(retention: usize) -> Self {
        Self {
            state: Mutex::new(TopicState::default()),
            notify: Notify::new(),
            retention,
        }
    }

    /// 新消费组从最旧的保留记录开始读取
    fn join(&self, group_id: &str) {
        let mut state = self.state.lock();
        let base = state.base;
        state.cursors.entry(group_id.to_string()).or_insert(base);
    }

    fn append(&self, topic: &str, key: &str, payload: String) -> String {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = format!("{}-0", state.next_id);
        state.records.push_back(EventRecord {
            id: id.clone(),
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
            published_at: Utc::now(),
        });

        let overflow = state.records.len().saturating_sub(self.retention);
        if overflow > 0 {
            state.drop_front(overflow);
        }
        id
    }

    fn take_next(&self, group_id: &str) -> Option<EventRecord> {
        let mut state = self.state.lock();
        let cursor = state
            .cursors
            .get(group_id)
            .copied()
            .unwrap_or(state.base)
            .max(state.base);
        if cursor >= state.end() {
            return None;
        }

        let record = state.records.get(cursor - state.base).cloned()?;
        state.cursors.insert(group_id.to_string(), cursor + 1);
        state.compact();
        Some(record)
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            retention: retention.max(1),
        }
    }

    fn topic(&self, topic: &str) -> Arc<TopicLog> {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(TopicLog::new(self.retention)))
            .clone()
    }

    /// 返回某个主题上仍被保留的记录
    pub fn published(&self, topic: &str) -> Vec<EventRecord> {
        self.topics
            .lock()
            .get(topic)
            .map(|log| log.state.lock().records.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventTransport for InMemoryTransport {
    async fn publish(&self, topic: &str, key: &str, payload: String) -> SchedulerResult<String> {
        let log = self.topic(topic);
        let id = log.append(topic, key, payload);
        log.notify.notify_waiters();
        debug!(topic, key, id = %id, "内存传输写入消息");
        Ok(id)
    }

    async fn reader(&self, topic: &str, group_id: &str) -> SchedulerResult<Box<dyn TopicReader>> {
        let log = self.topic(topic);
        log.join(group_id);
        Ok(Box::new(InMemoryReader {
            log,
            group_id: group_id.to_string(),
        }))
    }
}

struct InMemoryReader {
    log: Arc<TopicLog>,
    group_id: String,
}

#[async_trait]
impl TopicReader for InMemoryReader {
    async fn next(&mut self) -> SchedulerResult<EventRecord> {
        loop {
            let notified = self.log.notify.notified();
            tokio::pin!(notified);
            // 先注册唤醒再检查日志，避免错过检查与等待之间的发布
            notified.as_mut().enable();

            if let Some(record) = self.log.take_next(&self.group_id) {
                return Ok(record);
            }
            notified.await;
        }
    }

    async fn ack(&mut self, _record: &EventRecord) -> SchedulerResult<()> {
        Ok(())
    }
}
