//! Worker registry, liveness tracking, discovery and task scheduling

pub mod directory;
pub mod discovery;
pub mod handlers;
pub mod heartbeat;
pub mod registry;
pub mod scheduler;
pub mod strategies;

pub use directory::RegistryWorkerDirectory;
pub use discovery::{discovery_from_config, DiscoveryReconciler, DnsDiscovery, StaticDiscovery};
pub use handlers::{TaskCreatedHandler, TaskLifecycleHandler};
pub use heartbeat::{HeartbeatEventHandler, HeartbeatTracker};
pub use registry::{ReconcileOutcome, Worker, WorkerRegistry};
pub use scheduler::TaskScheduler;
pub use strategies::*;
