use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use coordinator_core::models::{ResourceRequirement, WorkerRegistration};
use coordinator_core::{CallContext, SchedulerResult, WorkerDirectory, WorkerInfo, WorkerStatus};
use serde::Serialize;
use serde_json::json;

use super::http::{JsonClient, Resource};

#[derive(Serialize)]
struct AvailabilityQuery<'a> {
    capabilities: &'a BTreeSet<String>,
    resources: &'a [ResourceRequirement],
}

/// 远端Worker目录服务的 HTTP 客户端
pub struct HttpWorkerDirectory {
    client: JsonClient,
}

impl HttpWorkerDirectory {
    pub fn new(base_url: &str, timeout: Duration) -> SchedulerResult<Self> {
        Ok(Self {
            client: JsonClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl WorkerDirectory for HttpWorkerDirectory {
    async fn register_worker(
        &self,
        ctx: &CallContext,
        registration: &WorkerRegistration,
    ) -> SchedulerResult<WorkerInfo> {
        let request = self
            .client
            .http()
            .post(self.client.url("/api/v1/workers"))
            .json(registration);
        self.client
            .send_json(ctx, request, Resource::Worker(&registration.worker_id))
            .await
    }

    async fn get_worker(&self, ctx: &CallContext, id: &str) -> SchedulerResult<WorkerInfo> {
        let request = self
            .client
            .http()
            .get(self.client.url(&format!("/api/v1/workers/{id}")));
        self.client.send_json(ctx, request, Resource::Worker(id)).await
    }

    async fn update_worker_status(
        &self,
        ctx: &CallContext,
        id: &str,
        status: WorkerStatus,
    ) -> SchedulerResult<()> {
        let request = self
            .client
            .http()
            .put(self.client.url(&format!("/api/v1/workers/{id}/status")))
            .json(&json!({ "status": status }));
        self.client.send(ctx, request, Resource::Worker(id)).await?;
        Ok(())
    }

    async fn list_workers(&self, ctx: &CallContext) -> SchedulerResult<Vec<WorkerInfo>> {
        let request = self.client.http().get(self.client.url("/api/v1/workers"));
        self.client.send_json(ctx, request, Resource::Other).await
    }

    async fn find_available_workers(
        &self,
        ctx: &CallContext,
        capabilities: &BTreeSet<String>,
        resources: &[ResourceRequirement],
    ) -> SchedulerResult<Vec<WorkerInfo>> {
        let request = self
            .client
            .http()
            .post(self.client.url("/api/v1/workers/available"))
            .json(&AvailabilityQuery {
                capabilities,
                resources,
            });
        self.client.send_json(ctx, request, Resource::Other).await
    }
}
