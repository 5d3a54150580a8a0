pub mod component;
pub mod discovery;
pub mod scheduler;
pub mod task_store;
pub mod worker_directory;

pub use component::*;
pub use discovery::*;
pub use scheduler::*;
pub use task_store::*;
pub use worker_directory::*;
