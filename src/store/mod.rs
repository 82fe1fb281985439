//! Persistence layer — libSQL-backed storage for leads, profiles, and LLM
//! usage accounting.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{LeadStore, LlmCallRecord, LlmUsageSummary, UpsertOutcome};
