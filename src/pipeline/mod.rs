//! Lead pipeline.
//!
//! Inbound mailbox traffic flows through:
//! 1. `Ingestor` — list, dedupe, fetch, parse
//! 2. `Classifier` — LLM judgment with a confidence gate
//! 3. `scoring` — pure heuristic prioritization over the stored snapshot
//!
//! Classification runs once at ingest; scores are recomputed on demand.

pub mod classifier;
pub mod ingest;
pub mod schedule;
pub mod scoring;

pub use classifier::Classifier;
pub use ingest::{IngestReport, Ingestor};
pub use schedule::spawn_ingest_loop;
