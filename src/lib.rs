pub mod app;
pub mod runner;
pub mod shutdown;

pub use app::Application;
pub use runner::{ComponentRunner, RunnerError, ShutdownFailure};
