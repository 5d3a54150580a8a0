use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use coordinator_core::models::{ResourceRequirement, WorkerRegistration};
use coordinator_core::{CallContext, SchedulerResult, WorkerDirectory, WorkerInfo, WorkerStatus};

use crate::registry::WorkerRegistry;

/// 以 `WorkerDirectory` 接口对外暴露本地注册表
///
/// 本地注册表不跟踪资源容量，`find_available_workers` 只按状态和能力过滤。
pub struct RegistryWorkerDirectory {
    registry: Arc<WorkerRegistry>,
}

impl RegistryWorkerDirectory {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl WorkerDirectory for RegistryWorkerDirectory {
    async fn register_worker(
        &self,
        _ctx: &CallContext,
        registration: &WorkerRegistration,
    ) -> SchedulerResult<WorkerInfo> {
        let worker = self.registry.register(
            &registration.worker_id,
            &registration.address,
            registration.capabilities.clone(),
        )?;
        Ok(worker.snapshot())
    }

    async fn get_worker(&self, _ctx: &CallContext, id: &str) -> SchedulerResult<WorkerInfo> {
        Ok(self.registry.get(id)?.snapshot())
    }

    async fn update_worker_status(
        &self,
        _ctx: &CallContext,
        id: &str,
        status: WorkerStatus,
    ) -> SchedulerResult<()> {
        let old = self.registry.get(id)?.set_status(status);
        debug!(worker_id = %id, from = %old, to = %status, "Worker状态已更新");
        Ok(())
    }

    async fn list_workers(&self, _ctx: &CallContext) -> SchedulerResult<Vec<WorkerInfo>> {
        Ok(self.registry.get_all().iter().map(|w| w.snapshot()).collect())
    }

    async fn find_available_workers(
        &self,
        _ctx: &CallContext,
        capabilities: &BTreeSet<String>,
        _resources: &[ResourceRequirement],
    ) -> SchedulerResult<Vec<WorkerInfo>> {
        Ok(self
            .registry
            .get_available(capabilities)
            .iter()
            .map(|w| w.snapshot())
            .collect())
    }
}
