//! Engine configuration.

use std::path::PathBuf;

/// Settings for one decompilation run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory scanned for assembly inputs.
    pub input_dir: PathBuf,
    /// Directory receiving the assembled per-class files.
    pub output_dir: PathBuf,
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Tasks claimed per model call.
    pub batch_size: usize,
    /// Chat-completion endpoint URL.
    pub litellm_url: String,
    /// Model identifier passed through to the endpoint.
    pub model: String,
    /// Retry cap for transport-class failures.
    pub max_retries: u32,
    /// Location of the durable task store.
    pub db_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("decompiled"),
            concurrency: 4,
            batch_size: 10,
            litellm_url: "http://localhost:4000/v1/chat/completions".to_string(),
            model: "ollama/codellama".to_string(),
            max_retries: 3,
            db_path: PathBuf::from("decompile.db"),
        }
    }
}
