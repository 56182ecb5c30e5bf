// LLM relevance filter: one YES/NO judgement per candidate
use futures_util::future::join_all;
use std::sync::Arc;

use crate::llm::{ChatMessage, ChatModel, ChatRequest};
use crate::rag::retrieval::RetrievedDocument;

const FILTER_PROMPT: &str = "Given the following question and context, return YES if the context is relevant to the question and NO if it isn't.";

/// Drops candidates the chat model judges irrelevant
pub struct RelevanceFilter {
    model: Arc<dyn ChatModel>,
    model_name: String,
}

impl RelevanceFilter {
    pub fn new(model: Arc<dyn ChatModel>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
        }
    }

    /// Keep documents judged relevant. Judgements run concurrently; one that
    /// fails or is unparseable keeps its document.
    pub async fn filter(&self, query: &str, documents: Vec<RetrievedDocument>) -> Vec<RetrievedDocument> {
        let verdicts = join_all(documents.iter().map(|doc| self.judge(query, doc))).await;

        documents
            .into_iter()
            .zip(verdicts)
            .filter_map(|(doc, keep)| keep.then_some(doc))
            .collect()
    }

    async fn judge(&self, query: &str, doc: &RetrievedDocument) -> bool {
        let prompt = build_prompt(query, &doc.content);
        let request = ChatRequest::new(self.model_name.clone(), vec![ChatMessage::user(prompt)]);

        match self.model.complete(request).await {
            Ok(response) => match parse_verdict(response.message.text_content()) {
                Some(relevant) => relevant,
                None => {
                    tracing::warn!(id = %doc.id, "unparseable relevance verdict, keeping document");
                    true
                }
            },
            Err(e) => {
                tracing::warn!(id = %doc.id, error = %e, "relevance judgement failed, keeping document");
                true
            }
        }
    }
}

fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "{}\n\n> Question: {}\n> Context:\n>>>\n{}\n>>>\n> Relevant (YES / NO):",
        FILTER_PROMPT, question, context
    )
}

/// `Some(true)` for YES, `Some(false)` for NO, `None` when neither or both appear
fn parse_verdict(text: &str) -> Option<bool> {
    let upper = text.to_uppercase();
    let words: Vec<&str> = upper
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();

    let yes = words.contains(&"YES");
    let no = words.contains(&"NO");
    match (yes, no) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}
