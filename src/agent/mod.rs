//! Multi-agent query resolution
//!
//! A supervisor routes each question to the law, procedure or general
//! specialist; the resolver ties routing, attachments and history together.

pub mod memory;
pub mod prompts;
pub mod resolver;
pub mod specialist;
pub mod supervisor;

use std::sync::Arc;

use crate::cache::CacheService;
use crate::cli::config::Config;
use crate::documents::{DocumentContext, OcrEngine, TextExtractor};
use crate::knowledge::{IndexKind, KnowledgeBase};
use crate::llm::ChatModel;
use crate::rag::{RagConfig, RagPipeline};
use crate::telemetry::TelemetryCollector;
use crate::tools::{
    CourtFormTool, FormGenerator, LookupTool, ToolRegistry, GENERATE_COURT_FORM, LAWS_LOOKUP,
    PROCEDURES_LOOKUP,
};

pub use memory::{ConversationStore, MemoryManager, MAX_HISTORY_MESSAGES};
pub use resolver::{clean_agent_prefix, detect_form_path, enhanced_query, QueryResolver, Resolution};
pub use specialist::Specialist;
pub use supervisor::{parse_route, Route, Supervisor};

/// Wire the full agent graph from configuration
pub fn build_resolver(
    config: &Config,
    model: Arc<dyn ChatModel>,
    knowledge: KnowledgeBase,
    cache: CacheService,
    telemetry: TelemetryCollector,
) -> QueryResolver {
    let rag_config = RagConfig::from_config(config);
    let lookup = |index: IndexKind| {
        let pipeline = RagPipeline::with_config(knowledge.clone(), index, model.clone(), rag_config.clone());
        Arc::new(LookupTool::new(Arc::new(pipeline)).with_cache(cache.clone()))
    };

    let mut tools = ToolRegistry::new().with_telemetry(telemetry.clone());
    tools.register(lookup(IndexKind::Laws));
    tools.register(lookup(IndexKind::Procedures));
    tools.register(Arc::new(CourtFormTool::new(FormGenerator::new(config.forms_dir()))));

    let openai = &config.openai;
    let limit = config.agent.recursion_limit;
    let law = Specialist::new(
        Route::Law,
        model.clone(),
        openai.agent_model.clone(),
        prompts::LAW_PROMPT,
        tools.subset(&[LAWS_LOOKUP]),
    )
    .with_recursion_limit(limit);
    let procedure = Specialist::new(
        Route::Procedure,
        model.clone(),
        openai.agent_model.clone(),
        prompts::PROCEDURE_PROMPT,
        tools.subset(&[PROCEDURES_LOOKUP, GENERATE_COURT_FORM]),
    )
    .with_recursion_limit(limit);
    let general = Specialist::new(
        Route::General,
        model.clone(),
        openai.general_model.clone(),
        prompts::GENERAL_PROMPT,
        ToolRegistry::new(),
    )
    .with_recursion_limit(limit);

    let supervisor = Supervisor::new(model, openai.router_model.clone());
    let extractor = TextExtractor::new(OcrEngine::default()).with_cache(cache);
    let documents = DocumentContext::new(extractor, knowledge.embedder(), &config.retrieval);

    QueryResolver::new(
        supervisor,
        law,
        procedure,
        general,
        ConversationStore::new(config.agent.max_history_turns),
    )
    .with_documents(documents)
    .with_forms_dir(config.forms_dir())
    .with_telemetry(telemetry)
}
