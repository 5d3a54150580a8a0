use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use coordinator_core::config::RegistryConfig;
use coordinator_core::models::{WorkerHeartbeatEvent, WorkerStatusChangedEvent};
use coordinator_core::{CallContext, Component, SchedulerError, SchedulerResult, WorkerStatus};
use coordinator_infrastructure::event_bus::{EventHandler, EventProducer, EventRecord};

use crate::registry::WorkerRegistry;

/// 固定超时的心跳失效检测器
///
/// 每隔 `max(heartbeat_interval / 2, 1s)` 扫描一次注册表，超过 `timeout` 未收到
/// 心跳的Worker被标记为 Inactive。扫描是幂等的，之后到达的心跳总能让Worker恢复。
///
/// 克隆开销很小，后台扫描循环运行在一个克隆上。
#[derive(Clone)]
pub struct HeartbeatTracker {
    registry: Arc<WorkerRegistry>,
    heartbeat_interval: Duration,
    timeout: Duration,
    publisher: Option<(Arc<EventProducer>, String)>,
    stop_token: Arc<Mutex<Option<CancellationToken>>>,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl HeartbeatTracker {
    pub fn new(registry: Arc<WorkerRegistry>, config: &RegistryConfig) -> Self {
        Self::with_timing(registry, config.heartbeat_interval(), config.heartbeat_timeout())
    }

    pub fn with_timing(registry: Arc<WorkerRegistry>, heartbeat_interval: Duration, timeout: Duration) -> Self {
        Self {
            registry,
            heartbeat_interval,
            timeout,
            publisher: None,
            stop_token: Arc::new(Mutex::new(None)),
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// 状态变化时发布到 `topic`
    pub fn with_publisher(mut self, producer: Arc<EventProducer>, topic: impl Into<String>) -> Self {
        self.publisher = Some((producer, topic.into()));
        self
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn check_interval(&self) -> Duration {
        (self.heartbeat_interval / 2).max(Duration::from_secs(1))
    }

    fn chrono_timeout(&self) -> ChronoDuration {
        ChronoDuration::milliseconds(self.timeout.as_millis().min(i64::MAX as u128) as i64)
    }

    /// 以给定时间执行一次扫描，返回本次发生的状态变化
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Vec<WorkerStatusChangedEvent> {
        let timeout = self.chrono_timeout();
        let mut changes = Vec::new();

        for worker in self.registry.get_all() {
            if let Some(old_status) = worker.expire_if_stale(now, timeout) {
                warn!(
                    worker_id = %worker.id(),
                    last_heartbeat = %worker.last_heartbeat(),
                    "Worker心跳超时，标记为 inactive"
                );
                changes.push(WorkerStatusChangedEvent {
                    worker_id: worker.id().to_string(),
                    old_status,
                    new_status: WorkerStatus::Inactive,
                    changed_at: now,
                });
            }
        }

        changes
    }

    pub fn record_heartbeat(&self, worker_id: &str) -> SchedulerResult<Option<WorkerStatusChangedEvent>> {
        self.record_heartbeat_at(worker_id, Utc::now())
    }

    pub fn record_heartbeat_at(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Option<WorkerStatusChangedEvent>> {
        let worker = self.registry.get(worker_id)?;
        let revived = worker.record_heartbeat_at(now).map(|old_status| {
            info!(worker_id = %worker_id, "Worker恢复心跳，重新标记为 active");
            WorkerStatusChangedEvent {
                worker_id: worker_id.to_string(),
                old_status,
                new_status: WorkerStatus::Active,
                changed_at: now,
            }
        });
        Ok(revived)
    }

    /// 发布状态变化事件，失败只记录日志
    pub async fn announce(&self, changes: &[WorkerStatusChangedEvent]) {
        let Some((producer, topic)) = &self.publisher else {
            return;
        };

        for change in changes {
            if let Err(e) = producer.publish(topic, &change.worker_id, change).await {
                warn!(worker_id = %change.worker_id, error = %e, "发布Worker状态变化事件失败");
            }
        }
    }

    async fn run(self, stop: CancellationToken) {
        let mut ticker = tokio::time::interval(self.check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let changes = self.sweep_at(Utc::now());
                    if !changes.is_empty() {
                        self.announce(&changes).await;
                    }
                }
            }
        }
        debug!("心跳扫描循环已退出");
    }
}

#[async_trait]
impl Component for HeartbeatTracker {
    fn name(&self) -> &str {
        "heartbeat-tracker"
    }

    async fn start(&self, ctx: &CallContext) -> SchedulerResult<()> {
        if self.stop_token.lock().is_some() {
            return Err(SchedulerError::Internal("心跳检测已经启动".to_string()));
        }

        let stop = ctx.token().child_token();
        let handle = tokio::spawn(self.clone().run(stop.clone()));
        *self.stop_token.lock() = Some(stop);
        *self.handle.lock() = Some(handle);

        info!(
            interval = ?self.check_interval(),
            timeout = ?self.timeout,
            "心跳检测已启动"
        );
        Ok(())
    }

    async fn stop(&self, ctx: &CallContext) -> SchedulerResult<()> {
        if let Some(stop) = self.stop_token.lock().take() {
            stop.cancel();
        }
        let Some(handle) = self.handle.lock().take() else {
            return Ok(());
        };

        let abort = handle.abort_handle();
        tokio::select! {
            _ = handle => {
                info!("心跳检测已停止");
                Ok(())
            }
            _ = ctx.done() => {
                abort.abort();
                Err(SchedulerError::DeadlineExceeded("等待心跳扫描循环退出超时".to_string()))
            }
        }
    }
}

/// 消费 worker-heartbeat 事件
pub struct HeartbeatEventHandler {
    tracker: Arc<HeartbeatTracker>,
}

impl HeartbeatEventHandler {
    pub fn new(tracker: Arc<HeartbeatTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl EventHandler for HeartbeatEventHandler {
    async fn handle(&self, record: &EventRecord) -> SchedulerResult<()> {
        let heartbeat: WorkerHeartbeatEvent = record.decode()?;

        // 以接收时间为准，不信任Worker自身的时钟
        let revived = self.tracker.record_heartbeat(&heartbeat.worker_id)?;
        if let Some(load) = heartbeat.current_load {
            self.tracker.registry.get(&heartbeat.worker_id)?.set_load(load);
        }

        if let Some(change) = revived {
            self.tracker.announce(std::slice::from_ref(&change)).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use coordinator_infrastructure::event_bus::{EventTransport, InMemoryTransport};

    fn tracker(interval_secs: u64, timeout_secs: u64) -> HeartbeatTracker {
        HeartbeatTracker::with_timing(
            Arc::new(WorkerRegistry::new()),
            Duration::from_secs(interval_secs),
            Duration::from_secs(timeout_secs),
        )
    }

    #[test]
    fn test_check_interval_has_one_second_floor() {
        assert_eq!(tracker(10, 30).check_interval(), Duration::from_secs(5));
        assert_eq!(
            HeartbeatTracker::with_timing(
                Arc::new(WorkerRegistry::new()),
                Duration::from_millis(500),
                Duration::from_secs(2),
            )
            .check_interval(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_heartbeat_timeline() {
        let tracker = tracker(2, 5);
        tracker.registry().register("w1", "a", BTreeSet::new()).unwrap();

        let t0 = Utc::now();
        assert!(tracker.record_heartbeat_at("w1", t0).unwrap().is_none());

        assert!(tracker.sweep_at(t0 + ChronoDuration::seconds(4)).is_empty());
        assert_eq!(tracker.registry().get("w1").unwrap().status(), WorkerStatus::Active);

        let changes = tracker.sweep_at(t0 + ChronoDuration::seconds(6));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_status, WorkerStatus::Active);
        assert_eq!(changes[0].new_status, WorkerStatus::Inactive);
        assert_eq!(tracker.registry().get("w1").unwrap().status(), WorkerStatus::Inactive);

        // 已经失活的Worker不会重复产生事件
        assert!(tracker.sweep_at(t0 + ChronoDuration::seconds(7)).is_empty());

        let revived = tracker
            .record_heartbeat_at("w1", t0 + ChronoDuration::milliseconds(6_100))
            .unwrap()
            .unwrap();
        assert_eq!(revived.new_status, WorkerStatus::Active);
        assert_eq!(tracker.registry().get("w1").unwrap().status(), WorkerStatus::Active);
    }

    #[test]
    fn test_heartbeat_for_unknown_worker() {
        let err = tracker(2, 5).record_heartbeat("ghost").unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_heartbeat_event_updates_load_and_announces_revival() {
        let transport = Arc::new(InMemoryTransport::new());
        let tracker = Arc::new(
            tracker(2, 5).with_publisher(
                Arc::new(EventProducer::new(transport.clone())),
                "worker-status-changed",
            ),
        );
        let worker = tracker.registry().register("w1", "a", BTreeSet::new()).unwrap();
        worker.set_status(WorkerStatus::Inactive);

        let handler = HeartbeatEventHandler::new(tracker.clone());
        transport
            .publish(
                "worker-heartbeat",
                "w1",
                r#"{"worker_id":"w1","current_load":42,"timestamp":"2026-01-01T00:00:00Z"}"#
                    .to_string(),
            )
            .await
            .unwrap();
        let record = transport.published("worker-heartbeat").remove(0);
        handler.handle(&record).await.unwrap();

        assert_eq!(worker.status(), WorkerStatus::Active);
        assert_eq!(worker.current_load(), 42);

        let announced = transport.published("worker-status-changed");
        assert_eq!(announced.len(), 1);
        let event: WorkerStatusChangedEvent = announced[0].decode().unwrap();
        assert_eq!(event.old_status, WorkerStatus::Inactive);
        assert_eq!(event.new_status, WorkerStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_component_stops_on_request() {
        let component = tracker(2, 5);
        let ctx = CallContext::background();

        component.start(&ctx).await.unwrap();
        assert!(component.start(&ctx).await.is_err());
        tokio::time::sleep(Duration::from_secs(3)).await;

        component
            .stop(&CallContext::background().with_timeout(Duration::from_secs(1)))
            .await
            .unwrap();
    }
}
