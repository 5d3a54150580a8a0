pub mod config;
pub mod context;
pub mod errors;
pub mod health;
pub mod logging;
pub mod models;
pub mod traits;

pub use context::CallContext;
pub use errors::*;
pub use health::{HealthChecker, HealthRegistry, HealthStatus};
pub use logging::init_logging;
pub use models::{SubTask, Task, TaskStatus, WorkerInfo, WorkerStatus};
pub use traits::{
    Component, SchedulerService, ServiceDiscovery, TaskFilter, TaskSchedule, TaskStore,
    WorkerDirectory,
};

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
