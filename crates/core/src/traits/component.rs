use async_trait::async_trait;

use crate::{CallContext, SchedulerResult};

/// 可统一启停的长期运行组件
///
/// `start` 必须尽快返回：长期运行的工作应交给独立的后台任务，并由该任务
/// 观察 `ctx` 的取消信号。`stop` 的 `ctx` 携带关停截止时间。
#[async_trait]
pub trait Component: Send + Sync {
    /// 组件名称，用于日志与错误报告
    fn name(&self) -> &str;

    async fn start(&self, ctx: &CallContext) -> SchedulerResult<()>;

    async fn stop(&self, ctx: &CallContext) -> SchedulerResult<()>;
}
