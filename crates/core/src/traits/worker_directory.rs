use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::{
    models::{ResourceRequirement, WorkerInfo, WorkerRegistration, WorkerStatus},
    CallContext, SchedulerResult,
};

/// Worker目录接口
///
/// 既可以由本地注册表实现，也可以是远端目录服务的客户端。
#[async_trait]
pub trait WorkerDirectory: Send + Sync {
    async fn register_worker(
        &self,
        ctx: &CallContext,
        registration: &WorkerRegistration,
    ) -> SchedulerResult<WorkerInfo>;

    async fn get_worker(&self, ctx: &CallContext, id: &str) -> SchedulerResult<WorkerInfo>;

    async fn update_worker_status(
        &self,
        ctx: &CallContext,
        id: &str,
        status: WorkerStatus,
    ) -> SchedulerResult<()>;

    async fn list_workers(&self, ctx: &CallContext) -> SchedulerResult<Vec<WorkerInfo>>;

    /// 查找具备全部所需能力且处于活跃状态的Worker
    async fn find_available_workers(
        &self,
        ctx: &CallContext,
        capabilities: &BTreeSet<String>,
        resources: &[ResourceRequirement],
    ) -> SchedulerResult<Vec<WorkerInfo>>;
}
