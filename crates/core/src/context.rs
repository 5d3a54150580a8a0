use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// 调用上下文
///
/// 携带取消信号与可选的截止时间，沿调用链向下传递。所有可能阻塞的操作
/// （限流等待、重试退避、消费读取）都应当观察它。
#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

impl CallContext {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// 不会被取消、没有截止时间的根上下文
    pub fn background() -> Self {
        Self::new(CancellationToken::new())
    }

    /// 设置相对截止时间，已有更早的截止时间时保留更早的那个
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// 派生子上下文：父级取消会传递给子级，反之不会
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// 距离截止时间的剩余时长，没有截止时间时返回 None
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// 等待上下文被取消或到达截止时间
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_completes_done() {
        let ctx = CallContext::background().with_timeout(Duration::from_secs(5));
        assert!(!ctx.is_done());

        ctx.done().await;
        assert!(ctx.is_done());
        assert!(!ctx.is_cancelled());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_child_observes_parent_cancellation() {
        let parent = CallContext::background();
        let child = parent.child();

        parent.cancel();
        child.done().await;
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_earlier_deadline_wins() {
        let near = Instant::now() + Duration::from_secs(1);
        let ctx = CallContext::background()
            .with_deadline(near)
            .with_timeout(Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(near));
    }
}
