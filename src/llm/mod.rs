//! Model client — prompt/response round-trip to the LiteLLM proxy.

pub mod client;

pub use client::{build_prompt, LiteLlmClient, LlmClient, SymbolOutcome};
