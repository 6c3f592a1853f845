//! Persistence layer — libSQL-backed durable task queue.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{NewTask, Progress, Task, TaskStatus, TaskStore};
