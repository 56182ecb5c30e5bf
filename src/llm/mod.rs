//! Chat model access
//!
//! `ChatModel` is the seam every agent, router and filter talks through;
//! `OpenAiClient` is the production implementation.

pub mod client;
pub mod retry;
pub mod sse;
pub mod types;

use async_trait::async_trait;

use crate::errors::Result;

pub use client::OpenAiClient;
pub use retry::RetryManager;
pub use sse::{SseEvent, SseParser};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, FunctionCall, Role, ToolCall, ToolDefinition,
};

/// Callback receiving streamed content tokens
pub type TokenSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// A chat completion backend
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run a request to completion
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Run a request, forwarding content tokens as they arrive.
    ///
    /// The default delivers the whole answer as one token.
    async fn complete_streaming(
        &self,
        request: ChatRequest,
        on_token: TokenSink<'_>,
    ) -> Result<ChatResponse> {
        let response = self.complete(request).await?;
        if let Some(text) = response.message.content.as_deref() {
            if !text.is_empty() {
                on_token(text);
            }
        }
        Ok(response)
    }
}
