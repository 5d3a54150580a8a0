//! Test data builders with sensible defaults

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use coordinator_core::models::ResourceRequirement;
use coordinator_core::{Task, TaskStatus, WorkerInfo, WorkerStatus};

/// Builder for creating test Task entities
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task::new("test_task"),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_capability(mut self, capability: &str) -> Self {
        self.task.required_capabilities.insert(capability.to_string());
        self
    }

    pub fn with_resource(mut self, resource_type: &str, amount: u32) -> Self {
        self.task.resources.push(ResourceRequirement {
            resource_type: resource_type.to_string(),
            amount,
        });
        self
    }

    pub fn with_input(mut self, key: &str, value: &str) -> Self {
        self.task.input.insert(key.to_string(), value.to_string());
        self
    }

    pub fn pending(self) -> Self {
        self.with_status(TaskStatus::Pending)
    }

    pub fn running(self) -> Self {
        self.with_status(TaskStatus::Running)
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating WorkerInfo snapshots
pub struct WorkerInfoBuilder {
    worker: WorkerInfo,
}

impl WorkerInfoBuilder {
    pub fn new(id: &str) -> Self {
        let now = Utc::now();
        Self {
            worker: WorkerInfo {
                id: id.to_string(),
                address: format!("{id}:50051"),
                status: WorkerStatus::Active,
                capabilities: BTreeSet::new(),
                last_heartbeat: now,
                registered_at: now,
                current_load: 0,
                last_error: None,
            },
        }
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.worker.address = address.to_string();
        self
    }

    pub fn with_capability(mut self, capability: &str) -> Self {
        self.worker.capabilities.insert(capability.to_string());
        self
    }

    pub fn with_status(mut self, status: WorkerStatus) -> Self {
        self.worker.status = status;
        self
    }

    pub fn with_load(mut self, load: u8) -> Self {
        self.worker.current_load = load;
        self
    }

    pub fn with_last_heartbeat(mut self, last_heartbeat: DateTime<Utc>) -> Self {
        self.worker.last_heartbeat = last_heartbeat;
        self
    }

    pub fn build(self) -> WorkerInfo {
        self.worker
    }
}
