use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use coordinator_core::models::{ResourceRequirement, WorkerRegistration};
use coordinator_core::{
    CallContext, SchedulerResult, Task, TaskFilter, TaskStore, WorkerDirectory, WorkerInfo,
    WorkerStatus,
};

use super::caller::ResilientCaller;

/// 为任意任务存储加上弹性调用链
pub struct ResilientTaskStore {
    inner: Arc<dyn TaskStore>,
    caller: Arc<ResilientCaller>,
}

impl ResilientTaskStore {
    pub fn new(inner: Arc<dyn TaskStore>, caller: Arc<ResilientCaller>) -> Self {
        Self { inner, caller }
    }
}

#[async_trait]
impl TaskStore for ResilientTaskStore {
    async fn create_task(&self, ctx: &CallContext, task: &Task) -> SchedulerResult<Task> {
        self.caller
            .call(ctx, "create_task", || self.inner.create_task(ctx, task))
            .await
    }

    async fn get_task(&self, ctx: &CallContext, id: &str) -> SchedulerResult<Task> {
        self.caller
            .call(ctx, "get_task", || self.inner.get_task(ctx, id))
            .await
    }

    async fn update_task(&self, ctx: &CallContext, task: &Task) -> SchedulerResult<Task> {
        self.caller
            .call(ctx, "update_task", || self.inner.update_task(ctx, task))
            .await
    }

    async fn delete_task(&self, ctx: &CallContext, id: &str) -> SchedulerResult<()> {
        self.caller
            .call(ctx, "delete_task", || self.inner.delete_task(ctx, id))
            .await
    }

    async fn list_tasks(&self, ctx: &CallContext, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        self.caller
            .call(ctx, "list_tasks", || self.inner.list_tasks(ctx, filter))
            .await
    }
}

/// 为任意Worker目录加上弹性调用链
pub struct ResilientWorkerDirectory {
    inner: Arc<dyn WorkerDirectory>,
    caller: Arc<ResilientCaller>,
}

impl ResilientWorkerDirectory {
    pub fn new(inner: Arc<dyn WorkerDirectory>, caller: Arc<ResilientCaller>) -> Self {
        Self { inner, caller }
    }
}

#[async_trait]
impl WorkerDirectory for ResilientWorkerDirectory {
    async fn register_worker(
        &self,
        ctx: &CallContext,
        registration: &WorkerRegistration,
    ) -> SchedulerResult<WorkerInfo> {
        self.caller
            .call(ctx, "register_worker", || {
                self.inner.register_worker(ctx, registration)
            })
            .await
    }

    async fn get_worker(&self, ctx: &CallContext, id: &str) -> SchedulerResult<WorkerInfo> {
        self.caller
            .call(ctx, "get_worker", || self.inner.get_worker(ctx, id))
            .await
    }

    async fn update_worker_status(
        &self,
        ctx: &CallContext,
        id: &str,
        status: WorkerStatus,
    ) -> SchedulerResult<()> {
        self.caller
            .call(ctx, "update_worker_status", || {
                self.inner.update_worker_status(ctx, id, status)
            })
            .await
    }

    async fn list_workers(&self, ctx: &CallContext) -> SchedulerResult<Vec<WorkerInfo>> {
        self.caller
            .call(ctx, "list_workers", || self.inner.list_workers(ctx))
            .await
    }

    async fn find_available_workers(
        &self,
        ctx: &CallContext,
        capabilities: &BTreeSet<String>,
        resources: &[ResourceRequirement],
    ) -> SchedulerResult<Vec<WorkerInfo>> {
        self.caller
            .call(ctx, "find_available_workers", || {
                self.inner
                    .find_available_workers(ctx, capabilities, resources)
            })
            .await
    }
}
