//! Agent tools
//!
//! - laws_db_lookup / procedures_db_lookup: cached RAG lookups
//! - generate_court_form: printable PDF court forms
//!
//! The registry executes model tool calls and reports failures back to the
//! model as tool output.

pub mod forms;
pub mod lookup;
pub mod registry;
pub mod types;

pub use forms::{CourtFormTool, FormGenerator, FormRequest, GENERATE_COURT_FORM};
pub use lookup::{LookupTool, LAWS_LOOKUP, PROCEDURES_LOOKUP};
pub use registry::ToolRegistry;
pub use types::{Tool, ToolResult};
