//! Tool-calling specialist agents
//!
//! Each specialist loops: ask the model, run any tool calls it makes, feed
//! the results back, until it answers in plain text or runs out of steps.

use std::sync::Arc;

use super::supervisor::Route;
use crate::errors::{LexiError, Result};
use crate::llm::{ChatMessage, ChatModel, ChatRequest, TokenSink};
use crate::tools::ToolRegistry;

/// One specialist: prompt, model and the tools it may call
pub struct Specialist {
    route: Route,
    model: Arc<dyn ChatModel>,
    model_name: String,
    system_prompt: String,
    tools: ToolRegistry,
    recursion_limit: usize,
}

impl Specialist {
    pub fn new(
        route: Route,
        model: Arc<dyn ChatModel>,
        model_name: impl Into<String>,
        system_prompt: impl Into<String>,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            route,
            model,
            model_name: model_name.into(),
            system_prompt: system_prompt.into(),
            tools,
            recursion_limit: 20,
        }
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit.max(1);
        self
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.tool_names()
    }

    /// Answer `question` given earlier turns of the conversation.
    ///
    /// Content tokens of every model step are forwarded to `on_token`.
    pub async fn run(
        &self,
        history: Vec<ChatMessage>,
        question: &str,
        on_token: TokenSink<'_>,
    ) -> Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(history);
        messages.push(ChatMessage::user(question));

        let definitions = self.tools.definitions();

        for step in 1..=self.recursion_limit {
            let request = ChatRequest::new(self.model_name.clone(), messages.clone())
                .with_tools(definitions.clone());
            let response = self.model.complete_streaming(request, on_token).await?;

            if !response.wants_tools() {
                tracing::debug!(agent = %self.route, steps = step, "agent answered");
                return Ok(response.message.text_content().to_string());
            }

            let calls = response.message.tool_calls.clone();
            messages.push(response.message);

            for call in &calls {
                tracing::info!(agent = %self.route, tool = %call.function.name, "tool call");
                let result = self.tools.execute(call).await;
                messages.push(ChatMessage::tool(call.id.clone(), result.message_content()));
            }
        }

        tracing::warn!(agent = %self.route, limit = self.recursion_limit, "agent step limit reached");
        Err(LexiError::RecursionLimit {
            limit: self.recursion_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, Role, ToolCall, ToolDefinition};
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Replies from a script, then repeats the last reply
    struct Scripted {
        replies: Mutex<Vec<ChatMessage>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<ChatMessage>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
            self.requests.lock().unwrap().push(request);
            let mut replies = self.replies.lock().unwrap();
            let message = if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies[0].clone()
            };
            Ok(ChatResponse {
                message,
                finish_reason: None,
            })
        }
    }

    struct Lookup;

    #[async_trait]
    impl Tool for Lookup {
        fn name(&self) -> &str {
            "laws_db_lookup"
        }
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::function("laws_db_lookup", "lookup", json!({"type": "object"}))
        }
        async fn call(&self, _args: Value) -> Result<String> {
            Ok(r#"[{"metadata":{},"text":"Bail Act 1977 s 4"}]"#.to_string())
        }
    }

    fn tool_call_message() -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_calls: vec![ToolCall::new("call_1", "laws_db_lookup", r#"{"query":"bail"}"#)],
            tool_call_id: None,
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Lookup));
        registry
    }

    #[tokio::test]
    async fn test_tool_loop_then_answer() {
        let model = Scripted::new(vec![
            tool_call_message(),
            ChatMessage::assistant("Under s 4 there is a presumption in favour of bail."),
        ]);
        let agent = Specialist::new(Route::Law, model.clone(), "gpt-4o-mini", "law", registry());

        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let tokens = Mutex::new(String::new());
        let sink = |t: &str| tokens.lock().unwrap().push_str(t);
        let answer = agent.run(history, "When is bail granted?", &sink).await.unwrap();

        assert!(answer.contains("presumption"));
        assert_eq!(*tokens.lock().unwrap(), answer);

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].messages.len(), 4);
        assert_eq!(requests[0].tools.len(), 1);
        let tool_reply = requests[1].messages.last().unwrap();
        assert_eq!(tool_reply.role, Role::Tool);
        assert_eq!(tool_reply.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_reply.text_content().contains("Bail Act 1977"));
    }

    #[tokio::test]
    async fn test_recursion_limit() {
        let model = Scripted::new(vec![tool_call_message()]);
        let agent = Specialist::new(Route::Law, model, "gpt-4o-mini", "law", registry())
            .with_recursion_limit(3);

        let sink = |_: &str| {};
        let err = agent.run(Vec::new(), "loop forever", &sink).await.unwrap_err();
        assert!(matches!(err, LexiError::RecursionLimit { limit: 3 }));
    }

    #[tokio::test]
    async fn test_no_tools_sends_no_definitions() {
        let model = Scripted::new(vec![ChatMessage::assistant("Hello, I am Lexi.")]);
        let agent = Specialist::new(Route::General, model.clone(), "gpt-4.1-nano", "general", ToolRegistry::new());

        let sink = |_: &str| {};
        let answer = agent.run(Vec::new(), "hi", &sink).await.unwrap();
        assert_eq!(answer, "Hello, I am Lexi.");
        assert!(model.requests.lock().unwrap()[0].tools.is_empty());
    }
}
