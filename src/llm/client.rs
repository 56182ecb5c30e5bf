//! OpenAI chat completions client
//!
//! POST `{base_url}/chat/completions` with bearer auth. Streaming responses
//! arrive as SSE; content and tool-call deltas are accumulated into one
//! final message.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::retry::RetryManager;
use super::sse::{SseEvent, SseParser};
use super::types::{ChatMessage, ChatRequest, ChatResponse, Role, ToolCall, ToolDefinition};
use super::{ChatModel, TokenSink};
use crate::cli::config::OpenAiConfig;
use crate::errors::{LexiError, Result};

/// Default API endpoint
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat client
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryManager,
}

impl OpenAiClient {
    /// Create client from configuration
    pub fn with_config(config: &OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(LexiError::HttpError)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry: RetryManager::with_config(config.max_retries, 500),
        })
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| LexiError::ConfigError("OPENAI_API_KEY is not set".to_string()))
    }

    /// Send the request, retrying transient failures, and return a 2xx response
    async fn send(&self, body: &CompletionBody<'_>) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let url = url.as_str();
        let key = self.api_key()?;
        let client = &self.client;

        self.retry
            .execute_with_retry(move || async move {
                let response = client
                    .post(url)
                    .bearer_auth(key)
                    .json(body)
                    .send()
                    .await?;

                if !response.status().is_success() {
                    let status = response.status();
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(LexiError::OpenAiError(format!(
                        "HTTP {}: {}",
                        status, error_text
                    )));
                }

                Ok(response)
            })
            .await
    }

    /// Check the API key against the models endpoint
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.base_url);
        let key = self.api_key()?;

        match self.client.get(&url).bearer_auth(key).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let body = CompletionBody::new(&request, false);
        let response = self.send(&body).await?;

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LexiError::OpenAiError(format!("Failed to parse completion: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LexiError::OpenAiError("Completion returned no choices".to_string()))?;

        Ok(ChatResponse {
            message: choice.message,
            finish_reason: choice.finish_reason,
        })
    }

    async fn complete_streaming(
        &self,
        request: ChatRequest,
        on_token: TokenSink<'_>,
    ) -> Result<ChatResponse> {
        let body = CompletionBody::new(&request, true);
        let response = self.send(&body).await?;

        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();
        let mut accumulator = StreamAccumulator::default();

        'outer: while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| LexiError::StreamingError(e.to_string()))?;
            for event in parser.push(&bytes)? {
                match event {
                    SseEvent::Done => break 'outer,
                    SseEvent::Data(data) => {
                        if let Some(token) = accumulator.apply(&data)? {
                            on_token(&token);
                        }
                    }
                }
            }
        }

        if let Some(SseEvent::Data(data)) = parser.finish() {
            if let Some(token) = accumulator.apply(&data)? {
                on_token(&token);
            }
        }

        Ok(accumulator.into_response())
    }
}

/// Request body for `/chat/completions`
#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolDefinition],
    stream: bool,
}

impl<'a> CompletionBody<'a> {
    fn new(request: &'a ChatRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            tools: &request.tools,
            stream,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    id: Option<String>,
    #[serde(default)]
    function: FunctionDelta,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Folds streamed deltas into a single assistant message
#[derive(Debug, Default)]
pub(crate) struct StreamAccumulator {
    content: String,
    tool_calls: Vec<ToolCall>,
    finish_reason: Option<String>,
}

impl StreamAccumulator {
    /// Apply one `data:` payload; returns the content token it carried, if any
    pub(crate) fn apply(&mut self, data: &str) -> Result<Option<String>> {
        let chunk: StreamChunk = serde_json::from_str(data)
            .map_err(|e| LexiError::StreamingError(format!("Bad stream chunk: {}", e)))?;

        let mut token = None;
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                self.content.push_str(&content);
                token = Some(content);
            }

            for delta in choice.delta.tool_calls {
                while self.tool_calls.len() <= delta.index {
                    self.tool_calls.push(ToolCall::new("", "", ""));
                }
                let call = &mut self.tool_calls[delta.index];
                if let Some(id) = delta.id {
                    call.id = id;
                }
                if let Some(name) = delta.function.name {
                    call.function.name.push_str(&name);
                }
                if let Some(arguments) = delta.function.arguments {
                    call.function.arguments.push_str(&arguments);
                }
            }

            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
        }

        Ok(token)
    }

    pub(crate) fn into_response(self) -> ChatResponse {
        let content = if self.content.is_empty() && !self.tool_calls.is_empty() {
            None
        } else {
            Some(self.content)
        };

        ChatResponse {
            message: ChatMessage {
                role: Role::Assistant,
                content,
                tool_calls: self.tool_calls,
                tool_call_id: None,
            },
            finish_reason: self.finish_reason,
        }
    }
}
