//! Lexi - multi-agent legal assistant
//!
//! A supervisor routes each question to a laws, procedures or general
//! specialist. Specialists answer from two vector indexes of Victorian
//! legislation and court procedure, and can fill in court forms as PDFs.
//!
//! # Layout
//!
//! - **agent**: supervisor, specialists and per-thread conversation memory
//! - **rag** / **knowledge**: retrieval, reranking and vector index access
//! - **documents**: text extraction from attached PDFs and images
//! - **cache**: Redis or in-process query cache
//! - **auth**: user accounts and sessions
//! - **server** / **repl**: HTTP and terminal front ends

pub mod agent;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod doctor;
pub mod documents;
pub mod errors;
pub mod knowledge;
pub mod llm;
pub mod rag;
pub mod repl;
pub mod server;
pub mod sync;
pub mod telemetry;
pub mod tools;

pub use errors::{LexiError, Result};
