//! Worker pool and run supervision.

pub mod supervisor;
pub mod worker;

pub use supervisor::Supervisor;
pub use worker::{Worker, WorkerDeps};
