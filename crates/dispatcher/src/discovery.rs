use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use coordinator_core::config::DiscoveryConfig;
use coordinator_core::{CallContext, Component, SchedulerError, SchedulerResult, ServiceDiscovery};

use crate::registry::{ReconcileOutcome, WorkerRegistry};

/// 固定地址列表
pub struct StaticDiscovery {
    addresses: Vec<String>,
}

impl StaticDiscovery {
    pub fn new(addresses: Vec<String>) -> Self {
        Self { addresses }
    }
}

#[async_trait]
impl ServiceDiscovery for StaticDiscovery {
    async fn discover_services(&self, _ctx: &CallContext, _name: &str) -> SchedulerResult<Vec<String>> {
        Ok(self.addresses.clone())
    }
}

/// 通过 DNS 解析 `name:port` 发现服务实例
///
/// 对 Kubernetes headless service 这类每个 Pod 一条 A 记录的服务名，解析结果就是
/// 当前全部实例的地址。
pub struct DnsDiscovery {
    port: u16,
}

impl DnsDiscovery {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl ServiceDiscovery for DnsDiscovery {
    async fn discover_services(&self, ctx: &CallContext, name: &str) -> SchedulerResult<Vec<String>> {
        let target = format!("{}:{}", name, self.port);
        let resolved = tokio::select! {
            resolved = tokio::net::lookup_host(target.as_str()) => resolved,
            _ = ctx.done() => {
                return Err(SchedulerError::DeadlineExceeded(format!("解析 {target} 被取消")));
            }
        };

        let addresses: BTreeSet<String> = resolved
            .map_err(|e| SchedulerError::Network(format!("解析 {target} 失败: {e}")))?
            .map(|addr| addr.to_string())
            .collect();
        Ok(addresses.into_iter().collect())
    }
}

/// 按配置选择发现实现：有静态地址时使用静态列表，否则走 DNS
pub fn discovery_from_config(config: &DiscoveryConfig) -> Arc<dyn ServiceDiscovery> {
    if config.static_addresses.is_empty() {
        Arc::new(DnsDiscovery::new(config.port))
    } else {
        Arc::new(StaticDiscovery::new(config.static_addresses.clone()))
    }
}

/// 周期性地用发现结果对齐注册表
#[derive(Clone)]
pub struct DiscoveryReconciler {
    discovery: Arc<dyn ServiceDiscovery>,
    registry: Arc<WorkerRegistry>,
    service_name: String,
    interval: Duration,
    stop_token: Arc<Mutex<Option<CancellationToken>>>,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DiscoveryReconciler {
    pub fn new(
        discovery: Arc<dyn ServiceDiscovery>,
        registry: Arc<WorkerRegistry>,
        service_name: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            discovery,
            registry,
            service_name: service_name.into(),
            interval,
            stop_token: Arc::new(Mutex::new(None)),
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// 执行一次发现与对账；发现失败时注册表保持不变
    pub async fn run_once(&self, ctx: &CallContext) -> SchedulerResult<ReconcileOutcome> {
        let addresses = self
            .discovery
            .discover_services(ctx, &self.service_name)
            .await?;
        Ok(self.registry.reconcile(&addresses))
    }

    async fn run(self, stop: CancellationToken) {
        let ctx = CallContext::new(stop.clone());
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    match self.run_once(&ctx).await {
                        Ok(outcome) if !outcome.is_empty() => {
                            info!(
                                service = %self.service_name,
                                added = ?outcome.added,
                                removed = ?outcome.removed,
                                "服务发现更新了注册表"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(service = %self.service_name, error = %e, "服务发现失败");
                        }
                    }
                }
            }
        }
        debug!(service = %self.service_name, "服务发现循环已退出");
    }
}

#[async_trait]
impl Component for DiscoveryReconciler {
    fn name(&self) -> &str {
        "discovery-reconciler"
    }

    async fn start(&self, ctx: &CallContext) -> SchedulerResult<()> {
        if self.stop_token.lock().is_some() {
            return Err(SchedulerError::Internal("服务发现已经启动".to_string()));
        }

        let stop = ctx.token().child_token();
        let handle = tokio::spawn(self.clone().run(stop.clone()));
        *self.stop_token.lock() = Some(stop);
        *self.handle.lock() = Some(handle);

        info!(service = %self.service_name, interval = ?self.interval, "服务发现已启动");
        Ok(())
    }

    async fn stop(&self, ctx: &CallContext) -> SchedulerResult<()> {
        if let Some(stop) = self.stop_token.lock().take() {
            stop.cancel();
        }
        let Some(handle) = self.handle.lock().take() else {
            return Ok(());
        };

        let abort = handle.abort_handle();
        tokio::select! {
            _ = handle => Ok(()),
            _ = ctx.done() => {
                abort.abort();
                Err(SchedulerError::DeadlineExceeded("等待服务发现循环退出超时".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingDiscovery;

    #[async_trait]
    impl ServiceDiscovery for FailingDiscovery {
        async fn discover_services(&self, _ctx: &CallContext, _name: &str) -> SchedulerResult<Vec<String>> {
            Err(SchedulerError::Network("cluster api down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_run_once_registers_discovered_addresses() {
        let registry = Arc::new(WorkerRegistry::new());
        let reconciler = DiscoveryReconciler::new(
            Arc::new(StaticDiscovery::new(vec![
                "10.0.0.1:50051".to_string(),
                "10.0.0.2:50051".to_string(),
            ])),
            registry.clone(),
            "worker-service",
            Duration::from_secs(10),
        );

        let outcome = reconciler.run_once(&CallContext::background()).await.unwrap();
        assert_eq!(outcome.added.len(), 2);
        assert_eq!(registry.get("10.0.0.1:50051").unwrap().address(), "10.0.0.1:50051");
    }

    #[tokio::test]
    async fn test_discovery_failure_keeps_registry() {
        let registry = Arc::new(WorkerRegistry::new());
        registry.register("w1", "10.0.0.9:50051", BTreeSet::new()).unwrap();

        let reconciler = DiscoveryReconciler::new(
            Arc::new(FailingDiscovery),
            registry.clone(),
            "worker-service",
            Duration::from_secs(10),
        );
        assert!(reconciler.run_once(&CallContext::background()).await.is_err());
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_dns_discovery_resolves_literal_address() {
        let addresses = DnsDiscovery::new(8080)
            .discover_services(&CallContext::background(), "127.0.0.1")
            .await
            .unwrap();
        assert_eq!(addresses, vec!["127.0.0.1:8080"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconciler_polls_until_stopped() {
        let registry = Arc::new(WorkerRegistry::new());
        let reconciler = DiscoveryReconciler::new(
            Arc::new(StaticDiscovery::new(vec!["10.0.0.1:50051".to_string()])),
            registry.clone(),
            "worker-service",
            Duration::from_secs(10),
        );

        reconciler.start(&CallContext::background()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.count(), 1);

        reconciler
            .stop(&CallContext::background().with_timeout(Duration::from_secs(1)))
            .await
            .unwrap();
    }
}
