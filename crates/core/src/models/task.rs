use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 任务定义
///
/// 任务由外部任务存储持有，协调层只读取任务并请求状态更新。
///
/// # 字段说明
///
/// - `resources`: 资源需求列表，如 `{resource_type: "gpu", amount: 1}`
/// - `required_capabilities`: Worker 必须声明的能力集合，调度时用作匹配键
/// - `completed_at`: 仅在任务进入终态后设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub input: HashMap<String, String>,
    #[serde(default)]
    pub output: HashMap<String, String>,
    #[serde(default)]
    pub resources: Vec<ResourceRequirement>,
    #[serde(default)]
    pub required_capabilities: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// 资源需求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub resource_type: String,
    pub amount: u32,
}

/// 任务状态
///
/// ```text
/// Pending → Scheduled → Running → Completed
///                              ↘ Failed
/// ```
///
/// 只能向前流转，Completed 和 Failed 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Scheduled => "SCHEDULED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// 判断是否允许流转到目标状态（相同状态不视为流转）
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Scheduled)
                | (TaskStatus::Scheduled, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Task {
    /// 创建处于 Pending 状态的新任务
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            status: TaskStatus::Pending,
            input: HashMap::new(),
            output: HashMap::new(),
            resources: Vec::new(),
            required_capabilities: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.required_capabilities.insert(capability.into());
        self
    }

    pub fn with_resource(mut self, resource_type: impl Into<String>, amount: u32) -> Self {
        self.resources.push(ResourceRequirement {
            resource_type: resource_type.into(),
            amount,
        });
        self
    }

    /// 状态流转；非法流转时返回原状态与目标状态
    pub fn transition_to(&mut self, next: TaskStatus) -> Result<(), (TaskStatus, TaskStatus)> {
        if !self.status.can_transition_to(next) {
            return Err((self.status, next));
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }
}

/// 子任务，由任务拆分策略生成，生命周期从属于父任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub input: HashMap<String, String>,
    #[serde(default)]
    pub output: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubTask {
    pub fn new(parent: &Task, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: parent.id.clone(),
            name: name.into(),
            status: TaskStatus::Pending,
            input: HashMap::new(),
            output: HashMap::new(),
            worker_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_only_transitions() {
        use TaskStatus::*;

        assert!(Pending.can_transition_to(Scheduled));
        assert!(Scheduled.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Running));
        assert!(!Scheduled.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_terminal_transition_sets_completed_at() {
        let mut task = Task::new("render");
        task.transition_to(TaskStatus::Scheduled).unwrap();
        task.transition_to(TaskStatus::Running).unwrap();
        assert!(task.completed_at.is_none());

        task.transition_to(TaskStatus::Failed).unwrap();
        assert!(task.completed_at.is_some());
        assert_eq!(
            task.transition_to(TaskStatus::Running),
            Err((TaskStatus::Failed, TaskStatus::Running))
        );
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&TaskStatus::Scheduled).unwrap();
        assert_eq!(json, "\"SCHEDULED\"");

        let task = Task::new("infer").with_capability("gpu").with_resource("gpu", 1);
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["status"], "PENDING");
        assert_eq!(value["required_capabilities"][0], "gpu");
        assert!(value.get("completed_at").is_none());
    }
}
