use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coordinator_core::{CallContext, Component, SchedulerError, SchedulerResult};
use futures::future::join_all;
use metrics::counter;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::transport::{EventHandler, EventTransport, TopicReader};

/// 事件消费者
///
/// 每个订阅主题运行一个独立的读取循环：读取下一条消息后同步调用处理器，因此
/// 慢处理器只会拖慢它所在的主题。处理器返回的错误只记录日志，消息照常确认，
/// 不会重新投递。
pub struct EventConsumer {
    name: String,
    transport: Arc<dyn EventTransport>,
    topics: Vec<String>,
    group_id: String,
    handler: Arc<dyn EventHandler>,
    read_error_backoff: Duration,
    stop_token: Mutex<Option<CancellationToken>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl EventConsumer {
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn EventTransport>,
        topics: Vec<String>,
        group_id: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            topics,
            group_id: group_id.into(),
            handler,
            read_error_backoff: Duration::from_millis(500),
            stop_token: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn with_read_error_backoff(mut self, backoff: Duration) -> Self {
        self.read_error_backoff = backoff;
        self
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }
}

async fn run_topic_loop(
    topic: String,
    mut reader: Box<dyn TopicReader>,
    handler: Arc<dyn EventHandler>,
    stop: CancellationToken,
    read_error_backoff: Duration,
) {
    info!(topic = %topic, "开始消费主题");

    loop {
        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            next = reader.next() => next,
        };

        match next {
            Ok(record) => {
                match handler.handle(&record).await {
                    Ok(()) => {
                        counter!("coordinator_events_handled_total", "topic" => topic.clone())
                            .increment(1);
                    }
                    Err(e) => {
                        counter!("coordinator_event_handler_errors_total", "topic" => topic.clone())
                            .increment(1);
                        error!(
                            topic = %topic,
                            key = %record.key,
                            id = %record.id,
                            error = %e,
                            "事件处理失败，消息被丢弃"
                        );
                    }
                }

                if let Err(e) = reader.ack(&record).await {
                    warn!(topic = %topic, id = %record.id, error = %e, "消息确认失败");
                }
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "读取消息失败");
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(read_error_backoff) => {}
                }
            }
        }
    }

    if let Err(e) = reader.close().await {
        warn!(topic = %topic, error = %e, "关闭读取者失败");
    }
    info!(topic = %topic, "停止消费主题");
}

#[async_trait]
impl Component for EventConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, ctx: &CallContext) -> SchedulerResult<()> {
        if self.stop_token.lock().is_some() {
            return Err(SchedulerError::Internal(format!(
                "消费者 {} 已经启动",
                self.name
            )));
        }

        let stop = ctx.token().child_token();
        let mut handles = Vec::with_capacity(self.topics.len());

        for topic in &self.topics {
            let reader = match self.transport.reader(topic, &self.group_id).await {
                Ok(reader) => reader,
                Err(e) => {
                    stop.cancel();
                    return Err(e);
                }
            };

            handles.push(tokio::spawn(run_topic_loop(
                topic.clone(),
                reader,
                self.handler.clone(),
                stop.clone(),
                self.read_error_backoff,
            )));
        }

        *self.stop_token.lock() = Some(stop);
        *self.handles.lock() = handles;

        info!(
            consumer = %self.name,
            group = %self.group_id,
            topics = ?self.topics,
            "事件消费者已启动"
        );
        Ok(())
    }

    async fn stop(&self, ctx: &CallContext) -> SchedulerResult<()> {
        if let Some(stop) = self.stop_token.lock().take() {
            stop.cancel();
        }
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        if handles.is_empty() {
            return Ok(());
        }

        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        tokio::select! {
            results = join_all(handles) => {
                for result in results {
                    if let Err(e) = result {
                        if e.is_panic() {
                            error!(consumer = %self.name, "读取循环异常退出: {}", e);
                        }
                    }
                }
                debug!(consumer = %self.name, "所有读取循环已退出");
                Ok(())
            }
            _ = ctx.done() => {
                for abort in aborts {
                    abort.abort();
                }
                Err(SchedulerError::DeadlineExceeded(format!(
                    "等待消费者 {} 的读取循环退出超时",
                    self.name
                )))
            }
        }
    }
}
