//! Query routing
//!
//! One cheap completion picks the specialist for each question.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::prompts::SUPERVISOR_PROMPT;
use crate::errors::Result;
use crate::llm::{ChatMessage, ChatModel, ChatRequest};

/// Where a question goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Law,
    Procedure,
    General,
    Finish,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Law => "law",
            Route::Procedure => "procedure",
            Route::General => "general",
            Route::Finish => "finish",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a router reply to a route; anything unrecognised is `General`
pub fn parse_route(decision: &str) -> Route {
    let word = decision
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();

    match word.as_str() {
        "law" => Route::Law,
        "procedure" => Route::Procedure,
        "general" => Route::General,
        "finish" => Route::Finish,
        _ => Route::General,
    }
}

/// Routing supervisor
pub struct Supervisor {
    model: Arc<dyn ChatModel>,
    model_name: String,
}

impl Supervisor {
    pub fn new(model: Arc<dyn ChatModel>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
        }
    }

    /// Classify `query`
    pub async fn route(&self, query: &str) -> Result<Route> {
        let request = ChatRequest::new(
            self.model_name.clone(),
            vec![
                ChatMessage::system(SUPERVISOR_PROMPT),
                ChatMessage::user(format!("Route this question: {}", query)),
            ],
        );

        let response = self.model.complete(request).await?;
        let decision = response.message.text_content();
        let route = parse_route(decision);
        tracing::debug!(decision = %decision, %route, "supervisor decision");
        Ok(route)
    }
}
