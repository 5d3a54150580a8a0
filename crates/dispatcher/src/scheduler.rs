use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use tracing::{debug, info, warn};

use coordinator_core::config::TopicConfig;
use coordinator_core::models::{TaskAssignedEvent, TaskScheduledEvent};
use coordinator_core::{
    CallContext, SchedulerError, SchedulerResult, SchedulerService, SubTask, Task, TaskSchedule,
    TaskStatus, TaskStore, WorkerDirectory, WorkerInfo,
};
use coordinator_infrastructure::event_bus::EventProducer;

use crate::registry::WorkerRegistry;
use crate::strategies::{
    LeastLoadedStrategy, NoDivision, TaskDivisionStrategy, WorkerSelectionStrategy,
};

/// 贪心调度器
///
/// 调度步骤依次执行，任一步失败即返回错误，已发布的事件不做回滚。
pub struct TaskScheduler {
    task_store: Arc<dyn TaskStore>,
    registry: Arc<WorkerRegistry>,
    directory: Option<Arc<dyn WorkerDirectory>>,
    producer: Arc<EventProducer>,
    topics: TopicConfig,
    selection: Arc<dyn WorkerSelectionStrategy>,
    division: Arc<dyn TaskDivisionStrategy>,
}

impl TaskScheduler {
    pub fn new(
        task_store: Arc<dyn TaskStore>,
        registry: Arc<WorkerRegistry>,
        producer: Arc<EventProducer>,
        topics: TopicConfig,
    ) -> Self {
        Self {
            task_store,
            registry,
            directory: None,
            producer,
            topics,
            selection: Arc::new(LeastLoadedStrategy::new()),
            division: Arc::new(NoDivision),
        }
    }

    /// 除本地注册表外，同时向远端目录查询候选Worker
    pub fn with_directory(mut self, directory: Arc<dyn WorkerDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_selection_strategy(mut self, selection: Arc<dyn WorkerSelectionStrategy>) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_division_strategy(mut self, division: Arc<dyn TaskDivisionStrategy>) -> Self {
        self.division = division;
        self
    }

    /// 本地注册表与远端目录的候选集合，按 ID 去重，本地条目优先
    async fn find_candidates(&self, ctx: &CallContext, task: &Task) -> SchedulerResult<Vec<WorkerInfo>> {
        let mut candidates: Vec<WorkerInfo> = self
            .registry
            .get_available(&task.required_capabilities)
            .iter()
            .map(|w| w.snapshot())
            .collect();

        if let Some(directory) = &self.directory {
            let remote = directory
                .find_available_workers(ctx, &task.required_capabilities, &task.resources)
                .await?;
            let mut seen: HashSet<String> = candidates.iter().map(|w| w.id.clone()).collect();
            for worker in remote {
                if seen.insert(worker.id.clone()) {
                    candidates.push(worker);
                }
            }
        }

        Ok(candidates)
    }

    /// 任务与子任务共用的分配路径，`key` 决定分配事件落在哪个分区
    async fn assign_keyed(
        &self,
        ctx: &CallContext,
        key: &str,
        task_id: &str,
        worker_id: &str,
    ) -> SchedulerResult<()> {
        if ctx.is_done() {
            return Err(SchedulerError::DeadlineExceeded(format!(
                "分配任务 {task_id} 前调用上下文已结束"
            )));
        }

        info!(task_id = %task_id, worker_id = %worker_id, key = %key, "分配任务");
        let event = TaskAssignedEvent {
            task_id: task_id.to_string(),
            worker_id: worker_id.to_string(),
            assigned_at: Utc::now(),
        };
        self.producer
            .publish(&self.topics.task_assigned, key, &event)
            .await?;
        debug!(task_id = %task_id, worker_id = %worker_id, "分配事件已发布");
        Ok(())
    }

    /// 子任务按策略给出的偏好顺序轮流分配，分配事件以父任务 ID 为键
    async fn assign_subtasks(
        &self,
        ctx: &CallContext,
        task: &Task,
        subtasks: &mut [SubTask],
        ranked: &[WorkerInfo],
    ) -> SchedulerResult<Vec<String>> {
        let mut worker_ids = Vec::new();
        for (index, subtask) in subtasks.iter_mut().enumerate() {
            let worker = &ranked[index % ranked.len()];
            self.assign_keyed(ctx, &task.id, &subtask.id, &worker.id)
                .await?;
            subtask.worker_id = Some(worker.id.clone());
            if !worker_ids.contains(&worker.id) {
                worker_ids.push(worker.id.clone());
            }
        }
        Ok(worker_ids)
    }

    async fn schedule(&self, ctx: &CallContext, task_id: &str) -> SchedulerResult<TaskSchedule> {
        let task = self.task_store.get_task(ctx, task_id).await?;
        if task.status != TaskStatus::Pending {
            return Err(SchedulerError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Scheduled,
            });
        }

        let candidates = self.find_candidates(ctx, &task).await?;
        if candidates.is_empty() {
            return Err(SchedulerError::Unavailable(format!(
                "no workers found for task {} (capabilities: {:?})",
                task.id, task.required_capabilities
            )));
        }

        let mut subtasks = self.division.divide(&task);
        let worker_ids = if subtasks.is_empty() {
            let worker = self
                .selection
                .select_worker(&task, &candidates)
                .ok_or_else(|| SchedulerError::Unavailable(format!("no workers found for task {}", task.id)))?;
            self.assign_task(ctx, &task.id, &worker.id).await?;
            vec![worker.id]
        } else {
            let ranked = self.selection.rank(&task, &candidates);
            if ranked.is_empty() {
                return Err(SchedulerError::Unavailable(format!("no workers found for task {}", task.id)));
            }
            self.assign_subtasks(ctx, &task, &mut subtasks, &ranked).await?
        };

        self.task_store
            .update_task_status(ctx, &task.id, TaskStatus::Scheduled)
            .await?;

        let scheduled = TaskScheduledEvent {
            task_id: task.id.clone(),
            worker_ids: worker_ids.clone(),
            scheduled_at: Utc::now(),
        };
        self.producer
            .publish(&self.topics.task_scheduled, &task.id, &scheduled)
            .await?;

        Ok(TaskSchedule {
            task_id: task.id,
            worker_ids,
            subtask_ids: subtasks.into_iter().map(|s| s.id).collect(),
        })
    }
}

fn failure_reason(error: &SchedulerError) -> &'static str {
    match error {
        SchedulerError::TaskNotFound { .. } => "not_found",
        SchedulerError::InvalidTransition { .. } => "invalid_transition",
        SchedulerError::Unavailable(_) => "unavailable",
        SchedulerError::DeadlineExceeded(_) => "deadline_exceeded",
        SchedulerError::ResourceExhausted(_) => "resource_exhausted",
        _ => "error",
    }
}

#[async_trait]
impl SchedulerService for TaskScheduler {
    async fn schedule_task(&self, ctx: &CallContext, task_id: &str) -> SchedulerResult<TaskSchedule> {
        info!(task_id = %task_id, "开始调度任务");

        match self.schedule(ctx, task_id).await {
            Ok(schedule) => {
                counter!("coordinator_tasks_scheduled_total").increment(1);
                info!(
                    task_id = %task_id,
                    workers = ?schedule.worker_ids,
                    subtasks = schedule.subtask_ids.len(),
                    "任务调度完成"
                );
                Ok(schedule)
            }
            Err(e) => {
                counter!("coordinator_schedule_failures_total", "reason" => failure_reason(&e))
                    .increment(1);
                warn!(task_id = %task_id, error = %e, "任务调度失败");
                Err(e)
            }
        }
    }

    async fn divide_task(&self, ctx: &CallContext, task_id: &str) -> SchedulerResult<Vec<SubTask>> {
        let task = self.task_store.get_task(ctx, task_id).await?;
        let subtasks = self.division.divide(&task);
        debug!(
            task_id = %task_id,
            strategy = self.division.name(),
            subtasks = subtasks.len(),
            "任务拆分完成"
        );
        Ok(subtasks)
    }

    async fn assign_task(&self, ctx: &CallContext, task_id: &str, worker_id: &str) -> SchedulerResult<()> {
        self.assign_keyed(ctx, task_id, task_id, worker_id).await
    }

    async fn get_task_status(&self, ctx: &CallContext, task_id: &str) -> SchedulerResult<TaskStatus> {
        Ok(self.task_store.get_task(ctx, task_id).await?.status)
    }
}
