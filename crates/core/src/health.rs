//! 服务健康状态
//!
//! [`HealthRegistry`] 保存每个服务最近一次上报的状态。为某个服务设置了
//! [`HealthChecker`] 时，查询该服务会实时调用检查器，而不是读取上报值。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{CallContext, SchedulerResult};

/// 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    /// 已登记但尚未上报状态
    Unknown,
    Serving,
    NotServing,
    /// 从未登记过的服务
    ServiceUnknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "UNKNOWN",
            HealthStatus::Serving => "SERVING",
            HealthStatus::NotServing => "NOT_SERVING",
            HealthStatus::ServiceUnknown => "SERVICE_UNKNOWN",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 实时健康检查
#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check(&self, ctx: &CallContext) -> SchedulerResult<HealthStatus>;
}

/// 服务健康状态注册表
#[derive(Default)]
pub struct HealthRegistry {
    statuses: RwLock<HashMap<String, HealthStatus>>,
    checkers: RwLock<HashMap<String, Arc<dyn HealthChecker>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记服务，初始状态为 [`HealthStatus::Unknown`]
    pub fn register_service(&self, service: &str) {
        self.set_status(service, HealthStatus::Unknown);
    }

    pub fn unregister_service(&self, service: &str) {
        self.statuses.write().remove(service);
        self.checkers.write().remove(service);
    }

    pub fn set_status(&self, service: &str, status: HealthStatus) {
        let previous = self.statuses.write().insert(service.to_string(), status);
        if previous != Some(status) {
            debug!(service, status = status.as_str(), "健康状态变更");
        }
    }

    /// 为服务设置实时检查器，之后对该服务的查询都交给检查器
    pub fn set_checker(&self, service: &str, checker: Arc<dyn HealthChecker>) {
        self.checkers.write().insert(service.to_string(), checker);
    }

    /// 查询服务状态
    ///
    /// 有检查器时调用检查器，否则返回上报值；从未登记的服务返回
    /// [`HealthStatus::ServiceUnknown`]。
    pub async fn check(&self, ctx: &CallContext, service: &str) -> SchedulerResult<HealthStatus> {
        let checker = self.checkers.read().get(service).cloned();
        if let Some(checker) = checker {
            return checker.check(ctx).await;
        }

        Ok(self
            .statuses
            .read()
            .get(service)
            .copied()
            .unwrap_or(HealthStatus::ServiceUnknown))
    }

    /// 查询全部已登记服务，检查失败的服务记为 [`HealthStatus::NotServing`]
    pub async fn check_all(&self, ctx: &CallContext) -> BTreeMap<String, HealthStatus> {
        let mut services: Vec<String> = self.statuses.read().keys().cloned().collect();
        services.extend(self.checkers.read().keys().cloned());
        services.sort();
        services.dedup();

        let mut result = BTreeMap::new();
        for service in services {
            let status = match self.check(ctx, &service).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(service = %service, error = %e, "健康检查失败");
                    HealthStatus::NotServing
                }
            };
            result.insert(service, status);
        }
        result
    }

    /// 已上报状态的快照，不调用检查器
    pub fn statuses(&self) -> BTreeMap<String, HealthStatus> {
        self.statuses
            .read()
            .iter()
            .map(|(service, status)| (service.clone(), *status))
            .collect()
    }

    pub async fn is_serving(&self, ctx: &CallContext, service: &str) -> bool {
        matches!(self.check(ctx, service).await, Ok(HealthStatus::Serving))
    }
}
