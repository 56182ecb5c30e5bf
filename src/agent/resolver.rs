//! Query resolution: route, run the specialist, tidy the answer, remember
//! the turn

use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;

use super::memory::ConversationStore;
use super::specialist::Specialist;
use super::supervisor::{Route, Supervisor};
use crate::documents::{detect_kind, DocumentContext};
use crate::errors::Result;
use crate::llm::TokenSink;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};

/// Outcome of one question
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub route: Route,
    pub answer: String,
    /// Court form written while answering, if any
    pub form_path: Option<PathBuf>,
}

/// Question text given to law/procedure agents when a document is attached
pub fn enhanced_query(query: &str, context: &str) -> String {
    format!(
        "User question: {}\nUser question context document:\n{}",
        query, context
    )
}

/// Drop a leading agent-name tag such as `law:` or `procedure!`
pub fn clean_agent_prefix(text: &str) -> String {
    let mut text = text.trim();
    loop {
        let before = text;
        for name in ["procedure", "general", "law"] {
            if let Some(rest) = text.strip_prefix(name) {
                if let Some(rest) = rest.strip_prefix(['!', ':']) {
                    text = rest.trim_start();
                } else if rest.starts_with('\n') {
                    text = rest.trim_start();
                }
            }
        }
        if text == before {
            return text.trim_end().to_string();
        }
    }
}

fn pdf_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"([A-Za-z]:\\[^\s'"`()]+\.pdf|[^\s'"`()]+\.pdf)"#)
            .unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

/// First existing PDF mentioned in `answer`; bare file names are looked up
/// in `forms_dir`
pub fn detect_form_path(answer: &str, forms_dir: &Path) -> Option<PathBuf> {
    pdf_path_pattern().find_iter(answer).find_map(|m| {
        let candidate = PathBuf::from(m.as_str());
        if candidate.is_file() {
            return Some(candidate);
        }
        let in_forms = forms_dir.join(candidate.file_name()?);
        in_forms.is_file().then_some(in_forms)
    })
}

/// Routes questions to specialists and keeps per-thread history
pub struct QueryResolver {
    supervisor: Supervisor,
    law: Specialist,
    procedure: Specialist,
    general: Specialist,
    conversations: ConversationStore,
    documents: Option<DocumentContext>,
    forms_dir: PathBuf,
    telemetry: Option<TelemetryCollector>,
}

impl QueryResolver {
    pub fn new(
        supervisor: Supervisor,
        law: Specialist,
        procedure: Specialist,
        general: Specialist,
        conversations: ConversationStore,
    ) -> Self {
        Self {
            supervisor,
            law,
            procedure,
            general,
            conversations,
            documents: None,
            forms_dir: PathBuf::from("forms"),
            telemetry: None,
        }
    }

    pub fn with_documents(mut self, documents: DocumentContext) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn with_forms_dir(mut self, forms_dir: PathBuf) -> Self {
        self.forms_dir = forms_dir;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn forms_dir(&self) -> &Path {
        &self.forms_dir
    }

    /// Forget a thread's history
    pub fn clear(&self, thread: &str) {
        self.conversations.clear(thread);
    }

    /// Answer `query` for `thread`, optionally against an attached file
    pub async fn resolve(
        &self,
        thread: &str,
        query: &str,
        attachment: Option<&Path>,
        on_token: TokenSink<'_>,
    ) -> Result<Resolution> {
        let start = Instant::now();
        let outcome = self.resolve_inner(thread, query, attachment, on_token).await;

        if let Some(telemetry) = &self.telemetry {
            telemetry.record(TelemetryEvent::QueryCompleted {
                duration_ms: start.elapsed().as_millis() as u64,
                success: outcome.is_ok(),
                timestamp: Instant::now(),
            });
        }
        outcome
    }

    async fn resolve_inner(
        &self,
        thread: &str,
        query: &str,
        attachment: Option<&Path>,
        on_token: TokenSink<'_>,
    ) -> Result<Resolution> {
        if let Some(path) = attachment {
            detect_kind(path)?;
        }

        let route = self.supervisor.route(query).await?;
        if let Some(telemetry) = &self.telemetry {
            telemetry.route_selected(route.as_str());
        }
        tracing::info!(%thread, %route, "query routed");

        let agent = match route {
            Route::Finish => {
                return Ok(Resolution {
                    route,
                    answer: String::new(),
                    form_path: None,
                })
            }
            Route::Law => &self.law,
            Route::Procedure => &self.procedure,
            Route::General => &self.general,
        };

        let question = match (route, attachment, &self.documents) {
            (Route::Law | Route::Procedure, Some(path), Some(documents)) => {
                let context = documents.context_for(path, query).await?;
                if context.is_empty() {
                    query.to_string()
                } else {
                    enhanced_query(query, &context)
                }
            }
            _ => query.to_string(),
        };

        let history = self.conversations.history(thread);
        let raw = agent.run(history, &question, on_token).await?;
        let answer = clean_agent_prefix(&raw);
        let form_path = detect_form_path(&answer, &self.forms_dir);

        self.conversations.record_turn(thread, query, &answer);

        Ok(Resolution {
            route,
            answer,
            form_path,
        })
    }
}
