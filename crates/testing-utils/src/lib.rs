//! # Coordinator Testing Utils
//!
//! Shared testing utilities for the coordinator workspace.
//!
//! ## Features
//!
//! - **Mock Task Store**: in-memory `TaskStore` with failure injection and call counters
//! - **Mock Worker Directory**: in-memory `WorkerDirectory`
//! - **Recording Component**: a `Component` that records start/stop calls
//! - **Test Data Builders**: builders for tasks and worker snapshots
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! coordinator-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
