//! Chat-completion seam.
//!
//! The orchestrator only sees [`LlmClient`]. [`OpenAiCompatibleClient`] speaks
//! the `/chat/completions` dialect shared by OpenAI and Ollama;
//! [`ScriptedLlmClient`] replays canned completions for tests and dry runs.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use wagewiz_core::config::{LlmConfig, LlmProvider};
use wagewiz_core::domain::conversation::ToolCall;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry of the context sent to the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: Some(text.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: Some(text.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn assistant(text: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self { role: ChatRole::Assistant, content: text, tool_calls, tool_call_id: None }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// A capability advertised to the model, with a JSON schema for its arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

impl CompletionRequest {
    pub fn with_tools(messages: Vec<ChatMessage>, tools: Vec<ToolDefinition>) -> Self {
        Self { messages, tools }
    }

    pub fn without_tools(messages: Vec<ChatMessage>) -> Self {
        Self { messages, tools: Vec::new() }
    }

    pub fn offers_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), tool_calls: Vec::new() }
    }

    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self { text: None, tool_calls }
    }

    /// Non-blank reply text, if any.
    pub fn reply(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|text| !text.is_empty())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("model transport failure: {0}")]
    Transport(String),
    #[error("model returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("model response could not be decoded: {0}")]
    Decode(String),
    #[error("model call timed out")]
    Timeout,
    #[error("model returned neither text nor tool calls")]
    EmptyResponse,
    #[error("model client misconfigured: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;
}

/// Client for any server exposing the OpenAI chat-completions API.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = match (config.provider, config.base_url.as_deref()) {
            (_, Some(base_url)) => base_url,
            (LlmProvider::OpenAi, None) => OPENAI_BASE_URL,
            (LlmProvider::Ollama, None) => {
                return Err(LlmError::Configuration("ollama requires llm.base_url".to_string()))
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Configuration(error.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let messages = request.messages.iter().map(wire_message).collect::<Vec<_>>();
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });

        if request.offers_tools() {
            let tools = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect::<Vec<_>>();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = Value::String("auto".to_string());
        }

        body
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let mut http = self.client.post(&self.endpoint).json(&self.request_body(&request));
        if let Some(api_key) = &self.api_key {
            http = http.bearer_auth(api_key.expose_secret());
        }

        let response = http.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, body));
        }

        let parsed = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|error| LlmError::Decode(error.to_string()))?;

        completion_from_response(parsed)
    }
}

fn wire_message(message: &ChatMessage) -> Value {
    let mut wire = json!({
        "role": message.role,
        "content": message.content,
    });
    if !message.tool_calls.is_empty() {
        wire["tool_calls"] = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.call_id,
                    "type": "function",
                    "function": { "name": call.function_name, "arguments": call.arguments },
                })
            })
            .collect();
    }
    if let Some(call_id) = &message.tool_call_id {
        wire["tool_call_id"] = Value::String(call_id.clone());
    }
    wire
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ResponseFunction,
}

#[derive(Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn completion_from_response(response: ChatCompletionResponse) -> Result<Completion, LlmError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| LlmError::Decode("response contained no choices".to_string()))?;

    let mut seen_ids = HashSet::new();
    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|call| ToolCall {
            // Some local servers omit or repeat ids; results must still pair with their call.
            call_id: call
                .id
                .filter(|id| !id.trim().is_empty() && seen_ids.insert(id.clone()))
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
            function_name: call.function.name,
            arguments: match call.function.arguments {
                None | Some(Value::Null) => "{}".to_string(),
                Some(Value::String(raw)) => raw,
                // Ollama sends arguments as an object rather than encoded text.
                Some(other) => other.to_string(),
            },
        })
        .collect::<Vec<_>>();

    let completion = Completion { text: message.content, tool_calls };
    if completion.tool_calls.is_empty() && completion.reply().is_none() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(completion)
}

fn map_transport_error(error: reqwest::Error) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Transport(error.to_string())
    }
}

fn map_http_error(status: StatusCode, body: String) -> LlmError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);
    LlmError::Status { status: status.as_u16(), message }
}

/// Replays a fixed queue of outcomes and records every request it receives.
#[derive(Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<Completion, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlmClient {
    pub fn new(script: impl IntoIterator<Item = Result<Completion, LlmError>>) -> Self {
        Self { script: Mutex::new(script.into_iter().collect()), requests: Mutex::default() }
    }

    pub async fn push(&self, outcome: Result<Completion, LlmError>) {
        self.script.lock().await.push_back(outcome);
    }

    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        self.requests.lock().await.push(request);
        self.script.lock().await.pop_front().unwrap_or(Err(LlmError::Transport(
            "scripted client has no completions left".to_string(),
        )))
    }
}
