//! LeadWise — mailbox lead ingestion, classification, and reply drafting.

pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod identity;
pub mod leads;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod reply;
pub mod store;
