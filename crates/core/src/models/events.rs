//! 跨服务编排事件
//!
//! 所有事件以 JSON 形式发布，消息键为主实体 ID（任务 ID 或 Worker ID），
//! 只有相同键的事件之间保证顺序。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TaskStatus, WorkerStatus};

/// 默认主题名称
pub mod topics {
    pub const TASK_CREATED: &str = "task-created";
    pub const TASK_STATUS_CHANGED: &str = "task-status-changed";
    pub const TASK_COMPLETED: &str = "task-completed";
    pub const TASK_FAILED: &str = "task-failed";
    pub const TASK_SCHEDULED: &str = "task-scheduled";
    pub const TASK_ASSIGNED: &str = "task-assigned";
    pub const SUBTASK_COMPLETED: &str = "subtask-completed";
    pub const WORKER_STATUS_CHANGED: &str = "worker-status-changed";
    pub const WORKER_HEARTBEAT: &str = "worker-heartbeat";
    pub const AUDIT_EVENT: &str = "audit-event";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCreatedEvent {
    pub task_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusChangedEvent {
    pub task_id: String,
    pub old_status: TaskStatus,
    pub new_status: TaskStatus,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompletedEvent {
    pub task_id: String,
    #[serde(default)]
    pub result: HashMap<String, String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailedEvent {
    pub task_id: String,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskScheduledEvent {
    pub task_id: String,
    pub worker_ids: Vec<String>,
    pub scheduled_at: DateTime<Utc>,
}

/// 任务（或子任务）分配事件，发布后不等待确认
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignedEvent {
    pub task_id: String,
    pub worker_id: String,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTaskCompletedEvent {
    pub subtask_id: String,
    pub task_id: String,
    pub worker_id: String,
    #[serde(default)]
    pub result: HashMap<String, String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatusChangedEvent {
    pub worker_id: String,
    pub old_status: WorkerStatus,
    pub new_status: WorkerStatus,
    pub changed_at: DateTime<Utc>,
}

/// Worker心跳信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHeartbeatEvent {
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_load: Option<u8>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub user_id: String,
    pub action: String,
    pub resource: String,
    pub resource_id: String,
    pub timestamp: DateTime<Utc>,
}
