use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use coordinator_core::config::TopicConfig;
use coordinator_core::models::{
    TaskCompletedEvent, TaskCreatedEvent, TaskFailedEvent, TaskStatusChangedEvent,
};
use coordinator_core::{
    CallContext, SchedulerError, SchedulerResult, SchedulerService, Task, TaskStatus, TaskStore,
};
use coordinator_infrastructure::event_bus::{EventHandler, EventRecord};

const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// 收到 task-created 后调度任务
///
/// 重复投递的消息会遇到任务已不处于 Pending 的情况，这类 `InvalidTransition`
/// 视为已处理。
pub struct TaskCreatedHandler {
    scheduler: Arc<dyn SchedulerService>,
    timeout: Duration,
}

impl TaskCreatedHandler {
    pub fn new(scheduler: Arc<dyn SchedulerService>) -> Self {
        Self {
            scheduler,
            timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl EventHandler for TaskCreatedHandler {
    async fn handle(&self, record: &EventRecord) -> SchedulerResult<()> {
        let event: TaskCreatedEvent = record.decode()?;
        let ctx = CallContext::background().with_timeout(self.timeout);

        match self.scheduler.schedule_task(&ctx, &event.task_id).await {
            Ok(_) => Ok(()),
            Err(SchedulerError::InvalidTransition { from, .. }) => {
                info!(task_id = %event.task_id, status = %from, "任务已不处于 PENDING，忽略重复的创建事件");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// 把外部上报的任务状态变化写回任务存储
///
/// 只接受向前的流转；Worker可能不单独上报 RUNNING，所以 SCHEDULED 状态下收到
/// 终态事件时会先经过 RUNNING。其余非法流转记录日志后丢弃。
pub struct TaskLifecycleHandler {
    task_store: Arc<dyn TaskStore>,
    topics: TopicConfig,
    timeout: Duration,
}

impl TaskLifecycleHandler {
    pub fn new(task_store: Arc<dyn TaskStore>, topics: TopicConfig) -> Self {
        Self {
            task_store,
            topics,
            timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 订阅的主题
    pub fn topics(&self) -> Vec<String> {
        vec![
            self.topics.task_status_changed.clone(),
            self.topics.task_completed.clone(),
            self.topics.task_failed.clone(),
        ]
    }

    async fn advance<F>(&self, task_id: &str, target: TaskStatus, finish: F) -> SchedulerResult<()>
    where
        F: FnOnce(&mut Task) + Send,
    {
        let ctx = CallContext::background().with_timeout(self.timeout);
        let mut task = self.task_store.get_task(&ctx, task_id).await?;

        let Some(path) = forward_path(task.status, target) else {
            warn!(
                task_id = %task_id,
                from = %task.status,
                to = %target,
                "忽略非法的任务状态流转"
            );
            return Ok(());
        };

        for status in path {
            task.transition_to(status)
                .map_err(|(from, to)| SchedulerError::InvalidTransition { from, to })?;
        }
        finish(&mut task);
        self.task_store.update_task(&ctx, &task).await?;

        debug!(task_id = %task_id, status = %target, "任务状态已更新");
        Ok(())
    }
}

/// 从 `from` 向前推进到 `to` 需要经过的状态
fn forward_path(from: TaskStatus, to: TaskStatus) -> Option<Vec<TaskStatus>> {
    if from.can_transition_to(to) {
        return Some(vec![to]);
    }
    if from == TaskStatus::Scheduled && to.is_terminal() {
        return Some(vec![TaskStatus::Running, to]);
    }
    None
}

#[async_trait]
impl EventHandler for TaskLifecycleHandler {
    async fn handle(&self, record: &EventRecord) -> SchedulerResult<()> {
        if record.topic == self.topics.task_status_changed {
            let event: TaskStatusChangedEvent = record.decode()?;
            self.advance(&event.task_id, event.new_status, |_| {}).await
        } else if record.topic == self.topics.task_completed {
            let TaskCompletedEvent {
                task_id,
                result,
                completed_at,
            } = record.decode()?;
            self.advance(&task_id, TaskStatus::Completed, move |task| {
                task.output = result;
                task.completed_at = Some(completed_at);
            })
            .await
        } else if record.topic == self.topics.task_failed {
            let TaskFailedEvent {
                task_id,
                error,
                failed_at,
            } = record.decode()?;
            self.advance(&task_id, TaskStatus::Failed, move |task| {
                task.output.insert("error".to_string(), error);
                task.completed_at = Some(failed_at);
            })
            .await
        } else {
            debug!(topic = %record.topic, "生命周期处理器收到未订阅主题的消息");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        assert_eq!(
            forward_path(TaskStatus::Running, TaskStatus::Completed),
            Some(vec![TaskStatus::Completed])
        );
        assert_eq!(
            forward_path(TaskStatus::Scheduled, TaskStatus::Failed),
            Some(vec![TaskStatus::Running, TaskStatus::Failed])
        );
        assert_eq!(forward_path(TaskStatus::Pending, TaskStatus::Completed), None);
        assert_eq!(forward_path(TaskStatus::Completed, TaskStatus::Running), None);
        assert_eq!(forward_path(TaskStatus::Running, TaskStatus::Running), None);
    }
}
