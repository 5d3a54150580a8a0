//! 任务存储与Worker目录的客户端实现

mod http;
pub mod task_store;
pub mod worker_directory;

pub use task_store::{HttpTaskStore, InMemoryTaskStore};
pub use worker_directory::HttpWorkerDirectory;
