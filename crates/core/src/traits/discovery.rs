use async_trait::async_trait;

use crate::{CallContext, SchedulerResult};

/// 集群服务发现接口，返回某个服务当前的网络地址列表
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    async fn discover_services(&self, ctx: &CallContext, name: &str)
        -> SchedulerResult<Vec<String>>;
}
