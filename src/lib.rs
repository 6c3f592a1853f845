//! Odin — resumable, concurrent batch decompilation engine.
//!
//! Work items live in a durable libSQL-backed queue; a pool of workers
//! claims batches, sends them to an AI model through a LiteLLM proxy, and
//! records the outcomes. Completed sources are assembled into per-class
//! output files.

pub mod assemble;
pub mod config;
pub mod error;
pub mod llm;
pub mod progress;
pub mod scan;
pub mod store;
pub mod worker;
