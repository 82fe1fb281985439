//! Mail provider integration — candidate listing, detail fetch, message
//! parsing, and reply sending.

pub mod http;
pub mod parser;
pub mod types;

use async_trait::async_trait;

pub use http::HttpMailProvider;
pub use parser::{ParsedEmail, UrgencyLevel, UrgencyReport};
pub use types::{MessageRef, OutgoingReply, RawMessage};

use crate::error::MailError;

/// Contract with the upstream mailbox. The pipeline depends on nothing
/// beyond these three calls.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Short provider name for logs and error context.
    fn provider_name(&self) -> &str;

    /// List candidate message refs matching `query`, newest first, capped
    /// at `max_results`.
    async fn list_messages(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<MessageRef>, MailError>;

    /// Fetch one message in full.
    async fn get_message(&self, id: &str) -> Result<RawMessage, MailError>;

    /// Send a reply through the provider's outbox. Returns the provider-side
    /// id of the sent message.
    async fn send_reply(&self, reply: &OutgoingReply) -> Result<String, MailError>;
}
