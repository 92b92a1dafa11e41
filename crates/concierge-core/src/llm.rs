//! Completion backend abstraction over genai
//!
//! The router never talks to genai directly; it goes through the
//! [`CompletionBackend`] trait so tests can substitute a scripted fake.
//! The genai implementation turns each enabled capability into a function
//! tool with a single `query` string argument and interprets the model's
//! reply as either a final answer or a capability invocation.

use anyhow::anyhow;
use async_trait::async_trait;
use concierge_common::{ConciergeError, Result, Role, Turn};
use genai::Client as GenaiClient;
use genai::chat::{
    ChatMessage as GenaiChatMessage, ChatRequest, ContentPart, MessageContent, Tool,
};
use tracing::{debug, warn};

/// A capability surfaced to the completion backend as a callable tool
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        ToolSpec {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Convert to a genai Tool with the single `query` argument every
    /// capability accepts
    pub fn to_genai_tool(&self) -> Tool {
        Tool::new(&self.name)
            .with_description(&self.description)
            .with_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Natural-language sub-query for this capability"
                    }
                },
                "required": ["query"]
            }))
    }
}

/// A request from the backend to invoke one named capability
#[derive(Debug, Clone)]
pub struct CapabilityCall {
    pub name: String,
    pub query: String,
    pub call_id: String,
}

/// Outcome of one routing decision
#[derive(Debug, Clone)]
pub enum BackendReply {
    /// Final natural-language answer, ends the loop
    Answer(String),
    /// Delegate to exactly one capability and feed its output back
    Invoke(CapabilityCall),
}

/// A completion backend that makes routing and generation decisions
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send the conversation so far plus the available capabilities and
    /// interpret the response
    async fn decide(&self, turns: &[Turn], tools: &[ToolSpec]) -> Result<BackendReply>;

    /// Plain one-shot completion with no tools, used by capabilities for
    /// their internal generation calls
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// genai-backed implementation of [`CompletionBackend`]
pub struct GenaiBackend {
    client: GenaiClient,
    provider: String,
    system_prompt: Option<String>,
}

impl GenaiBackend {
    pub fn new(provider: &str, system_prompt: Option<&str>) -> Self {
        let client = GenaiClient::builder()
            .with_chat_options(genai::chat::ChatOptions {
                capture_content: Some(true),
                capture_tool_calls: Some(true),
                capture_usage: Some(true),
                ..Default::default()
            })
            .build();

        GenaiBackend {
            client,
            provider: provider.to_string(),
            system_prompt: system_prompt.map(|s| s.to_string()),
        }
    }

    fn turn_to_genai(turn: &Turn) -> GenaiChatMessage {
        match turn.role {
            Role::User => GenaiChatMessage::user(&turn.content),
            Role::Assistant => GenaiChatMessage::assistant(&turn.content),
            // genai has no portable tool-result constructor across providers,
            // so tool output travels as an assistant turn tagged with the
            // capability name
            Role::Tool => {
                let capability = turn.capability.as_deref().unwrap_or("tool");
                GenaiChatMessage::assistant(format!(
                    "Tool result from {}: {}",
                    capability, turn.content
                ))
            }
        }
    }

    fn extract_text(content: MessageContent) -> Result<String> {
        match content {
            MessageContent::Text(text) => Ok(text),
            MessageContent::Parts(parts) => {
                let combined = parts
                    .into_iter()
                    .filter_map(|part| match part {
                        ContentPart::Text(text) => Some(text),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                if combined.is_empty() {
                    Err(ConciergeError::Backend(
                        "response contained no text parts".to_string(),
                    ))
                } else {
                    Ok(combined)
                }
            }
            other => Err(ConciergeError::Backend(format!(
                "unexpected response content: {:?}",
                std::mem::discriminant(&other)
            ))),
        }
    }
}

#[async_trait]
impl CompletionBackend for GenaiBackend {
    async fn decide(&self, turns: &[Turn], tools: &[ToolSpec]) -> Result<BackendReply> {
        debug!(
            "Routing decision for {} turns with {} capabilities",
            turns.len(),
            tools.len()
        );

        let messages: Vec<GenaiChatMessage> = turns.iter().map(Self::turn_to_genai).collect();
        let mut chat_req = ChatRequest::new(messages);

        if !tools.is_empty() {
            chat_req = chat_req.with_tools(tools.iter().map(ToolSpec::to_genai_tool).collect());
        }
        if let Some(prompt) = &self.system_prompt {
            chat_req = chat_req.with_system(prompt.clone());
        }

        let response = self
            .client
            .exec_chat(&self.provider, chat_req, None)
            .await
            .map_err(|e| ConciergeError::Backend(format!("genai request failed: {}", e)))?;

        let content = response
            .content
            .first()
            .cloned()
            .ok_or_else(|| ConciergeError::Backend("empty chat response".to_string()))?;

        match content {
            MessageContent::ToolCalls(calls) => {
                if calls.len() > 1 {
                    warn!(
                        "Backend requested {} capability calls, taking the first",
                        calls.len()
                    );
                }
                let call = calls
                    .into_iter()
                    .next()
                    .ok_or_else(|| ConciergeError::Backend("empty tool call list".to_string()))?;

                // The sub-query lives in the `query` argument; fall back to
                // the raw argument text if the model strayed from the schema
                let query = call
                    .fn_arguments
                    .get("query")
                    .and_then(|value| value.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| call.fn_arguments.to_string());

                debug!("Backend selected capability '{}'", call.fn_name);
                Ok(BackendReply::Invoke(CapabilityCall {
                    name: call.fn_name,
                    query,
                    call_id: call.call_id,
                }))
            }
            other => Ok(BackendReply::Answer(Self::extract_text(other)?)),
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let chat_req = ChatRequest::new(vec![GenaiChatMessage::user(prompt)]);

        let response = self
            .client
            .exec_chat(&self.provider, chat_req, None)
            .await
            .map_err(|e| ConciergeError::Backend(format!("genai request failed: {}", e)))?;

        let content = response
            .content
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("empty chat response"))?;

        Self::extract_text(content)
    }
}
