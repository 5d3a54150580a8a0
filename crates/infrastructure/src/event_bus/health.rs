use std::sync::Arc;

use async_trait::async_trait;
use coordinator_core::{CallContext, HealthChecker, HealthStatus, SchedulerError, SchedulerResult};
use tracing::warn;

use super::transport::EventTransport;

/// 通过 `ping` 判断事件传输是否可用
pub struct TransportHealthChecker {
    transport: Arc<dyn EventTransport>,
}

impl TransportHealthChecker {
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl HealthChecker for TransportHealthChecker {
    async fn check(&self, ctx: &CallContext) -> SchedulerResult<HealthStatus> {
        let result = tokio::select! {
            result = self.transport.ping() => result,
            _ = ctx.done() => Err(SchedulerError::DeadlineExceeded("事件传输健康检查超时".into())),
        };

        match result {
            Ok(()) => Ok(HealthStatus::Serving),
            Err(e) => {
                warn!(error = %e, "事件传输不可用");
                Ok(HealthStatus::NotServing)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::{InMemoryTransport, TopicReader};
    use std::time::Duration;

    /// 所有操作都失败的传输
    struct Unreachable;

    #[async_trait]
    impl EventTransport for Unreachable {
        async fn publish(&self, _topic: &str, _key: &str, _payload: String) -> SchedulerResult<String> {
            Err(SchedulerError::MessageQueue("connection refused".into()))
        }

        async fn reader(&self, _topic: &str, _group_id: &str) -> SchedulerResult<Box<dyn TopicReader>> {
            Err(SchedulerError::MessageQueue("connection refused".into()))
        }

        async fn ping(&self) -> SchedulerResult<()> {
            Err(SchedulerError::MessageQueue("connection refused".into()))
        }
    }

    /// `ping` 永不返回的传输
    struct Stalled;

    #[async_trait]
    impl EventTransport for Stalled {
        async fn publish(&self, _topic: &str, _key: &str, _payload: String) -> SchedulerResult<String> {
            std::future::pending().await
        }

        async fn reader(&self, _topic: &str, _group_id: &str) -> SchedulerResult<Box<dyn TopicReader>> {
            std::future::pending().await
        }

        async fn ping(&self) -> SchedulerResult<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_reachable_transport_is_serving() {
        let checker = TransportHealthChecker::new(Arc::new(InMemoryTransport::new()));
        let status = checker.check(&CallContext::background()).await.unwrap();
        assert_eq!(status, HealthStatus::Serving);
    }

    #[tokio::test]
    async fn test_failed_ping_is_not_serving() {
        let checker = TransportHealthChecker::new(Arc::new(Unreachable));
        let status = checker.check(&CallContext::background()).await.unwrap();
        assert_eq!(status, HealthStatus::NotServing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_ping_is_bounded_by_context() {
        let checker = TransportHealthChecker::new(Arc::new(Stalled));
        let ctx = CallContext::background().with_timeout(Duration::from_secs(1));
        let status = checker.check(&ctx).await.unwrap();
        assert_eq!(status, HealthStatus::NotServing);
    }
}
