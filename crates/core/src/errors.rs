use thiserror::Error;

use crate::models::TaskStatus;

/// 协调层错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: String },

    #[error("Worker已注册: {id}")]
    WorkerAlreadyExists { id: String },

    #[error("无效的任务状态转换: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("资源耗尽: {0}")]
    ResourceExhausted(String),

    #[error("服务不可用: {0}")]
    Unavailable(String),

    #[error("不可重试的错误: {0}")]
    Permanent(String),

    #[error("超过截止时间: {0}")]
    DeadlineExceeded(String),

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// 是否属于可以通过重试恢复的瞬时错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::Network(_)
                | SchedulerError::Unavailable(_)
                | SchedulerError::ResourceExhausted(_)
                | SchedulerError::MessageQueue(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SchedulerError::TaskNotFound { .. } | SchedulerError::WorkerNotFound { .. }
        )
    }

    /// 熔断器是否应将该错误计为一次失败
    ///
    /// 远端给出的业务性应答（未找到、冲突、非法状态、参数错误）说明对端是健康的，
    /// 不计入连续失败次数。
    pub fn counts_as_failure(&self) -> bool {
        !matches!(
            self,
            SchedulerError::TaskNotFound { .. }
                | SchedulerError::WorkerNotFound { .. }
                | SchedulerError::WorkerAlreadyExists { .. }
                | SchedulerError::InvalidTransition { .. }
                | SchedulerError::Permanent(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SchedulerError::Network("reset".into()).is_retryable());
        assert!(SchedulerError::Unavailable("circuit open".into()).is_retryable());
        assert!(!SchedulerError::Permanent("bad request".into()).is_retryable());
        assert!(!SchedulerError::TaskNotFound { id: "t1".into() }.is_retryable());
        assert!(!SchedulerError::DeadlineExceeded("ctx".into()).is_retryable());
    }

    #[test]
    fn test_breaker_failure_classification() {
        assert!(SchedulerError::Network("timeout".into()).counts_as_failure());
        assert!(!SchedulerError::WorkerNotFound { id: "w1".into() }.counts_as_failure());
        assert!(!SchedulerError::InvalidTransition {
            from: TaskStatus::Completed,
            to: TaskStatus::Pending,
        }
        .counts_as_failure());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = SchedulerError::InvalidTransition {
            from: TaskStatus::Scheduled,
            to: TaskStatus::Pending,
        };
        assert_eq!(err.to_string(), "无效的任务状态转换: SCHEDULED -> PENDING");
    }
}
