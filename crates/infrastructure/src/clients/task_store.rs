use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use coordinator_core::{
    CallContext, SchedulerError, SchedulerResult, Task, TaskFilter, TaskStore,
};
use parking_lot::RwLock;
use tracing::debug;

use super::http::{JsonClient, Resource};

/// 远端任务服务的 HTTP 客户端
pub struct HttpTaskStore {
    client: JsonClient,
}

impl HttpTaskStore {
    pub fn new(base_url: &str, timeout: Duration) -> SchedulerResult<Self> {
        Ok(Self {
            client: JsonClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl TaskStore for HttpTaskStore {
    async fn create_task(&self, ctx: &CallContext, task: &Task) -> SchedulerResult<Task> {
        let request = self.client.http().post(self.client.url("/api/v1/tasks")).json(task);
        self.client
            .send_json(ctx, request, Resource::Task(&task.id))
            .await
    }

    async fn get_task(&self, ctx: &CallContext, id: &str) -> SchedulerResult<Task> {
        let request = self
            .client
            .http()
            .get(self.client.url(&format!("/api/v1/tasks/{id}")));
        self.client.send_json(ctx, request, Resource::Task(id)).await
    }

    async fn update_task(&self, ctx: &CallContext, task: &Task) -> SchedulerResult<Task> {
        let request = self
            .client
            .http()
            .put(self.client.url(&format!("/api/v1/tasks/{}", task.id)))
            .json(task);
        self.client
            .send_json(ctx, request, Resource::Task(&task.id))
            .await
    }

    async fn delete_task(&self, ctx: &CallContext, id: &str) -> SchedulerResult<()> {
        let request = self
            .client
            .http()
            .delete(self.client.url(&format!("/api/v1/tasks/{id}")));
        self.client.send(ctx, request, Resource::Task(id)).await?;
        Ok(())
    }

    async fn list_tasks(&self, ctx: &CallContext, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        let request = self
            .client
            .http()
            .get(self.client.url("/api/v1/tasks"))
            .query(filter);
        self.client.send_json(ctx, request, Resource::Other).await
    }
}

/// 进程内任务存储，用于嵌入式模式
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(&self, _ctx: &CallContext, task: &Task) -> SchedulerResult<Task> {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&task.id) {
            return Err(SchedulerError::Permanent(format!("任务已存在: {}", task.id)));
        }
        tasks.insert(task.id.clone(), task.clone());
        debug!(task_id = %task.id, "任务已创建");
        Ok(task.clone())
    }

    async fn get_task(&self, _ctx: &CallContext, id: &str) -> SchedulerResult<Task> {
        self.tasks
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SchedulerError::TaskNotFound { id: id.to_string() })
    }

    async fn update_task(&self, _ctx: &CallContext, task: &Task) -> SchedulerResult<Task> {
        let mut tasks = self.tasks.write();
        match tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(task.clone())
            }
            None => Err(SchedulerError::TaskNotFound {
                id: task.id.clone(),
            }),
        }
    }

    async fn delete_task(&self, _ctx: &CallContext, id: &str) -> SchedulerResult<()> {
        self.tasks
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SchedulerError::TaskNotFound { id: id.to_string() })
    }

    async fn list_tasks(&self, _ctx: &CallContext, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        let tasks = self.tasks.read();
        let mut matched: Vec<Task> = tasks
            .values()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        matched.sort_by_key(|t| t.created_at);
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }
}
