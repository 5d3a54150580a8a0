use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    models::{Task, TaskStatus},
    CallContext, SchedulerError, SchedulerResult,
};

/// 任务查询过滤条件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// 任务存储接口
///
/// 任务的持久化由外部服务负责，协调层通过该接口读取任务并请求更新。
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, ctx: &CallContext, task: &Task) -> SchedulerResult<Task>;

    /// 获取任务，不存在时返回 `TaskNotFound`
    async fn get_task(&self, ctx: &CallContext, id: &str) -> SchedulerResult<Task>;

    async fn update_task(&self, ctx: &CallContext, task: &Task) -> SchedulerResult<Task>;

    async fn delete_task(&self, ctx: &CallContext, id: &str) -> SchedulerResult<()>;

    async fn list_tasks(&self, ctx: &CallContext, filter: &TaskFilter)
        -> SchedulerResult<Vec<Task>>;

    /// 读取任务并按状态机推进到目标状态
    async fn update_task_status(
        &self,
        ctx: &CallContext,
        id: &str,
        status: TaskStatus,
    ) -> SchedulerResult<Task> {
        let mut task = self.get_task(ctx, id).await?;
        task.transition_to(status)
            .map_err(|(from, to)| SchedulerError::InvalidTransition { from, to })?;
        self.update_task(ctx, &task).await
    }
}
