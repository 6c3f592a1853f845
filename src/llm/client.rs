//! LiteLLM chat-completion client.
//!
//! One POST per batch. The reply envelope nests a JSON string inside
//! `choices[0].message.content`; that string parses as the per-symbol
//! outcome array. The client never retries and never touches task state.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::store::Task;

/// Deadline for a single model call.
const CALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Longest error-body snippet carried in a ModelError.
const BODY_SNIPPET_CHARS: usize = 512;

/// Fixed instruction that pins the reply shape.
const PROMPT_PREAMBLE: &str = "Please decompile the following Objective-C methods. \
Return a JSON array where each object has 'symbol_name', 'decompiled_source', \
'success', and 'error_message' fields.";

/// Per-symbol outcome parsed from the model reply.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolOutcome {
    pub symbol_name: String,
    #[serde(default)]
    pub decompiled_source: String,
    pub success: bool,
    #[serde(default)]
    pub error_message: String,
}

#[derive(Serialize)]
struct PromptMethod<'a> {
    symbol_name: &'a str,
    assembly_code: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Build the prompt for a claimed batch: the fixed preamble followed by an
/// indented JSON array of `{symbol_name, assembly_code}` objects.
pub fn build_prompt(tasks: &[Task]) -> Result<String, serde_json::Error> {
    let methods: Vec<PromptMethod<'_>> = tasks
        .iter()
        .map(|task| PromptMethod {
            symbol_name: &task.symbol_name,
            assembly_code: &task.assembly_code,
        })
        .collect();

    let body = serde_json::to_string_pretty(&methods)?;
    Ok(format!("{PROMPT_PREAMBLE}\n\n{body}"))
}

/// Stateless inference client the workers dispatch through.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one prompt and parse the per-symbol outcomes.
    async fn infer(&self, prompt: &str) -> Result<Vec<SymbolOutcome>, ModelError>;
}

/// HTTP client for a LiteLLM-compatible chat-completion endpoint.
pub struct LiteLlmClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl LiteLlmClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| ModelError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl LlmClient for LiteLlmClient {
    async fn infer(&self, prompt: &str) -> Result<Vec<SymbolOutcome>, ModelError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout
                } else {
                    ModelError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Http {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }

        let envelope: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout
            } else {
                ModelError::Malformed(format!("reply envelope: {e}"))
            }
        })?;

        let content = envelope
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(ModelError::Empty)?;

        serde_json::from_str(&content)
            .map_err(|e| ModelError::Malformed(format!("nested content: {e}")))
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_CHARS).collect()
}
