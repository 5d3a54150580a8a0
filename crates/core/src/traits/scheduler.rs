use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    models::{SubTask, TaskStatus},
    CallContext, SchedulerResult,
};

/// 一次成功调度的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSchedule {
    pub task_id: String,
    /// 参与该任务的Worker，按分配顺序去重
    pub worker_ids: Vec<String>,
    pub subtask_ids: Vec<String>,
}

/// 调度服务接口
#[async_trait]
pub trait SchedulerService: Send + Sync {
    /// 将 Pending 任务分配给可用Worker并推进到 Scheduled
    async fn schedule_task(&self, ctx: &CallContext, task_id: &str)
        -> SchedulerResult<TaskSchedule>;

    /// 按配置的拆分策略生成子任务
    async fn divide_task(&self, ctx: &CallContext, task_id: &str) -> SchedulerResult<Vec<SubTask>>;

    /// 发布分配事件，不等待确认
    async fn assign_task(
        &self,
        ctx: &CallContext,
        task_id: &str,
        worker_id: &str,
    ) -> SchedulerResult<()>;

    async fn get_task_status(&self, ctx: &CallContext, task_id: &str)
        -> SchedulerResult<TaskStatus>;
}
