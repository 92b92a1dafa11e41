//! Generic remote-tool capability
//!
//! Shared by the project-management and analytics registry entries. The
//! flow is two-phase: the completion backend first translates the user's
//! request into a structured invocation constrained to the remote service's
//! operation catalog, then the structured result is rendered back into
//! natural language. All remote failures resolve to fixed user-facing
//! messages; diagnostic detail goes to the log only.

use async_trait::async_trait;
use concierge_common::{ConciergeError, RemoteServiceConfig, Result};
use concierge_core::CompletionBackend;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::capability::{Capability, CapabilityDescriptor};

/// Fixed reply when phase 1 cannot produce a valid invocation
pub const CANNOT_PARSE_REQUEST: &str =
    "I could not determine which operation this request needs. Please rephrase it.";

/// Fixed reply for remote timeouts and transport errors
pub const SERVICE_UNAVAILABLE: &str =
    "The service is temporarily unavailable. Please try again later.";

/// One entry of the remote operation catalog
#[derive(Debug, Clone, Deserialize)]
pub struct OperationSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "inputSchema")]
    pub input_schema: Value,
}

/// Application-level outcome of a remote call
#[derive(Debug, Clone)]
pub enum RemoteOutcome {
    Success(Value),
    /// Structured error payload from the service itself
    ServiceError { code: i64, message: String },
}

/// Seam to the remote tool service
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Fetch the operation catalog
    async fn operations(&self) -> Result<Vec<OperationSpec>>;

    /// Invoke one operation; transport failures are `Err`, service-reported
    /// errors are `Ok(ServiceError)`
    async fn invoke(&self, operation: &str, arguments: Value) -> Result<RemoteOutcome>;
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 client over HTTP with a bounded request timeout
pub struct JsonRpcService {
    client: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl JsonRpcService {
    pub fn new(config: &RemoteServiceConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(JsonRpcService {
            client,
            endpoint: config.endpoint.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::SeqCst),
            "method": method,
            "params": params,
        });

        debug!("JSON-RPC request '{}' to {}", method, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ConciergeError::Capability(format!("remote call '{}' timed out", method))
                } else {
                    ConciergeError::Capability(format!("remote call '{}' failed: {}", method, e))
                }
            })?;

        if !response.status().is_success() {
            return Err(ConciergeError::Capability(format!(
                "remote service returned status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ConciergeError::Capability(format!("bad JSON-RPC response: {}", e)))
    }
}

#[async_trait]
impl RemoteService for JsonRpcService {
    async fn operations(&self) -> Result<Vec<OperationSpec>> {
        let envelope = self.request("tools/list", serde_json::json!({})).await?;

        if let Some(err) = envelope.get("error") {
            return Err(ConciergeError::Capability(format!(
                "catalog fetch rejected: {}",
                err
            )));
        }

        let tools = envelope
            .get("result")
            .and_then(|result| result.get("tools"))
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));

        let specs: Vec<OperationSpec> = serde_json::from_value(tools)
            .map_err(|e| ConciergeError::Capability(format!("bad catalog shape: {}", e)))?;
        info!("Loaded {} operations from remote service", specs.len());
        Ok(specs)
    }

    async fn invoke(&self, operation: &str, arguments: Value) -> Result<RemoteOutcome> {
        let envelope = self
            .request(
                "tools/call",
                serde_json::json!({ "name": operation, "arguments": arguments }),
            )
            .await?;

        if let Some(err) = envelope.get("error") {
            let err: RpcError = serde_json::from_value(err.clone())
                .unwrap_or_else(|_| RpcError {
                    code: 0,
                    message: "unknown error".to_string(),
                });
            return Ok(RemoteOutcome::ServiceError {
                code: err.code,
                message: err.message,
            });
        }

        Ok(RemoteOutcome::Success(
            envelope.get("result").cloned().unwrap_or(Value::Null),
        ))
    }
}

/// Endpoint settings carried in the descriptor config map
#[derive(Debug, Deserialize)]
struct RemoteSettings {
    endpoint: String,
    timeout_seconds: Option<u64>,
}

pub struct RemoteToolCapability {
    name: String,
    completion: Arc<dyn CompletionBackend>,
    service: Arc<dyn RemoteService>,
    /// Operation catalog, fetched once on first use
    catalog: Mutex<Option<Arc<Vec<OperationSpec>>>>,
}

impl RemoteToolCapability {
    pub fn new(
        name: impl Into<String>,
        completion: Arc<dyn CompletionBackend>,
        service: Arc<dyn RemoteService>,
    ) -> Self {
        RemoteToolCapability {
            name: name.into(),
            completion,
            service,
            catalog: Mutex::new(None),
        }
    }

    pub fn from_descriptor(
        descriptor: &CapabilityDescriptor,
        completion: Arc<dyn CompletionBackend>,
    ) -> anyhow::Result<Self> {
        let settings: RemoteSettings = serde_json::from_value(descriptor.config.clone())?;
        let config = RemoteServiceConfig {
            endpoint: settings.endpoint,
            timeout_seconds: settings
                .timeout_seconds
                .unwrap_or_else(|| RemoteServiceConfig::default().timeout_seconds),
        };
        let service = Arc::new(JsonRpcService::new(&config)?);
        Ok(Self::new(&descriptor.name, completion, service))
    }

    async fn catalog(&self) -> Result<Arc<Vec<OperationSpec>>> {
        let mut cached = self.catalog.lock().await;
        if let Some(catalog) = cached.as_ref() {
            return Ok(catalog.clone());
        }
        let catalog = Arc::new(self.service.operations().await?);
        *cached = Some(catalog.clone());
        Ok(catalog)
    }

    fn describe_operations(catalog: &[OperationSpec]) -> String {
        let mut description = String::from("Available operations:\n\n");
        for op in catalog {
            description.push_str(&format!("### {}\n{}\n", op.name, op.description));
            if let Some(properties) = op.input_schema.get("properties").and_then(Value::as_object)
            {
                let required: Vec<&str> = op
                    .input_schema
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|names| names.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                description.push_str("Arguments:\n");
                for (arg_name, arg_info) in properties {
                    let arg_type = arg_info
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("any");
                    let arg_desc = arg_info
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    let tag = if required.contains(&arg_name.as_str()) {
                        "required"
                    } else {
                        "optional"
                    };
                    description.push_str(&format!(
                        "  - {} ({}, {}): {}\n",
                        arg_name, arg_type, tag, arg_desc
                    ));
                }
            }
            description.push('\n');
        }
        description
    }

    fn phase_one_prompt(catalog: &[OperationSpec], query: &str) -> String {
        format!(
            "You translate user requests into operation invocations.\n\n{}\n\
Analyze the request and pick the SINGLE most suitable operation.\n\
Extract every argument that is stated explicitly; never add arguments the \
user did not give.\n\
If no operation fits, reply with exactly: null\n\n\
User request: {}\n\n\
Reply ONLY with JSON, no markdown:\n\
{{\"operation\": \"name\", \"arguments\": {{\"arg\": \"value\"}}}}",
            Self::describe_operations(catalog),
            query
        )
    }

    /// Parse the phase-1 reply into (operation, arguments). Returns `None`
    /// for null replies, invalid JSON, or operations outside the catalog.
    fn parse_invocation(reply: &str, catalog: &[OperationSpec]) -> Option<(String, Value)> {
        let mut text = reply.trim();

        // Models sometimes wrap JSON in markdown fences despite instructions
        if let Some(stripped) = text.strip_prefix("```") {
            let stripped = stripped.strip_prefix("json").unwrap_or(stripped);
            text = stripped.split("```").next().unwrap_or("").trim();
        }

        if text.is_empty() || text.eq_ignore_ascii_case("null") {
            return None;
        }

        let parsed: Value = serde_json::from_str(text).ok()?;
        let operation = parsed.get("operation")?.as_str()?.to_string();

        if !catalog.iter().any(|op| op.name == operation) {
            warn!("Phase 1 chose unknown operation '{}'", operation);
            return None;
        }

        let arguments = parsed
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        Some((operation, arguments))
    }

    /// Keep only the first line of a service error and cap its length so
    /// stack traces never reach the user
    fn sanitize_error(message: &str) -> String {
        let first_line = message.lines().next().unwrap_or("").trim();
        let mut sanitized: String = first_line.chars().take(200).collect();
        if sanitized.is_empty() {
            sanitized = "unknown error".to_string();
        }
        sanitized
    }

    fn format_list(items: &[Value]) -> String {
        if items.is_empty() {
            return "Nothing was found.".to_string();
        }

        let mut out = format!("Found {} items:\n\n", items.len());
        for (i, item) in items.iter().enumerate() {
            match item.as_object() {
                Some(map) => {
                    let label = map
                        .get("name")
                        .or_else(|| map.get("title"))
                        .or_else(|| map.get("id"))
                        .and_then(Value::as_str)
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| format!("#{}", i + 1));
                    out.push_str(&format!("{}. {}\n", i + 1, label));
                    for (key, value) in map {
                        if matches!(key.as_str(), "name" | "title" | "id") {
                            continue;
                        }
                        match value {
                            Value::String(s) if !s.is_empty() => {
                                out.push_str(&format!("   - {}: {}\n", key, s));
                            }
                            Value::Number(n) => {
                                out.push_str(&format!("   - {}: {}\n", key, n));
                            }
                            Value::Bool(b) => {
                                out.push_str(&format!("   - {}: {}\n", key, b));
                            }
                            _ => {}
                        }
                    }
                }
                None => out.push_str(&format!("{}. {}\n", i + 1, item)),
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }

    /// Render the structured result as natural language. Text-content
    /// arrays and item lists have direct renderings; anything else goes
    /// through a second completion call.
    async fn format_result(&self, operation: &str, result: Value) -> Result<String> {
        match &result {
            Value::String(text) => return Ok(text.clone()),
            Value::Array(items) => return Ok(Self::format_list(items)),
            Value::Object(map) => {
                if let Some(Value::Array(content)) = map.get("content") {
                    let texts: Vec<&str> = content
                        .iter()
                        .filter(|item| {
                            item.get("type").and_then(Value::as_str) == Some("text")
                        })
                        .filter_map(|item| item.get("text").and_then(Value::as_str))
                        .collect();
                    if !texts.is_empty() {
                        return Ok(texts.join("\n"));
                    }
                }
                if let Some(Value::Array(data)) = map.get("data") {
                    return Ok(Self::format_list(data));
                }
            }
            Value::Null => {
                return Ok(format!("Operation {} completed successfully.", operation));
            }
            _ => {}
        }

        let prompt = format!(
            "Summarize the following result of the '{}' operation for the \
user in short, plain language. Do not mention JSON.\n\n{}",
            operation,
            serde_json::to_string_pretty(&result)?
        );
        self.completion.complete(&prompt).await
    }
}

#[async_trait]
impl Capability for RemoteToolCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, query: &str) -> Result<String> {
        info!("Remote capability '{}' processing query", self.name);

        let catalog = match self.catalog().await {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("Failed to fetch operation catalog: {}", e);
                return Ok(SERVICE_UNAVAILABLE.to_string());
            }
        };

        let reply = self
            .completion
            .complete(&Self::phase_one_prompt(&catalog, query))
            .await?;

        let Some((operation, arguments)) = Self::parse_invocation(&reply, &catalog) else {
            warn!("Could not parse phase-1 reply into an invocation");
            return Ok(CANNOT_PARSE_REQUEST.to_string());
        };

        debug!("Invoking '{}' with {}", operation, arguments);

        match self.service.invoke(&operation, arguments).await {
            Ok(RemoteOutcome::Success(result)) => self.format_result(&operation, result).await,
            Ok(RemoteOutcome::ServiceError { code, message }) => {
                warn!("Service error {} from '{}': {}", code, operation, message);
                Ok(format!(
                    "The operation failed: {}",
                    Self::sanitize_error(&message)
                ))
            }
            Err(e) => {
                error!("Remote invocation failed: {}", e);
                Ok(SERVICE_UNAVAILABLE.to_string())
            }
        }
    }
}
