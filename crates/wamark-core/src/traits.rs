//! The messaging-gateway contract.
//!
//! The actual WhatsApp session (authentication, QR pairing, sockets,
//! reconnects) lives outside this workspace; the engine only depends on
//! this trait. Implementations must deliver history pages newest-first.

use async_trait::async_trait;
use futures::stream::Stream;

use crate::error::{Result, WamarkError};
use crate::types::{ConversationInfo, Envelope, MessageKey};

/// Messaging gateway the dispatch engine talks to.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Whether the underlying session is connected and usable.
    fn is_ready(&self) -> bool;

    /// All group conversations the session participates in.
    async fn list_conversations(&self) -> Result<Vec<ConversationInfo>>;

    /// Fetch up to `limit` historical envelopes for a conversation,
    /// newest-first, continuing backwards from `cursor` when given.
    async fn fetch_history(
        &self,
        conversation_id: &str,
        limit: usize,
        cursor: Option<MessageKey>,
    ) -> Result<Vec<Envelope>>;

    /// Send a text message, optionally quoting another message.
    async fn send_text(
        &self,
        conversation_id: &str,
        text: &str,
        quoted: Option<&MessageKey>,
    ) -> Result<()>;

    /// React to a message with an emoji.
    async fn send_reaction(
        &self,
        conversation_id: &str,
        key: &MessageKey,
        emoji: &str,
    ) -> Result<()>;

    /// Live push stream of inbound envelopes.
    async fn listen(&self) -> Result<Box<dyn Stream<Item = Envelope> + Send + Unpin>>;
}

/// Placeholder gateway used until a real transport session is attached.
/// Every operation fails with `NotReady`; the listen stream stays pending.
#[derive(Debug, Default)]
pub struct NullGateway;

#[async_trait]
impl Gateway for NullGateway {
    fn is_ready(&self) -> bool {
        false
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationInfo>> {
        Err(WamarkError::NotReady)
    }

    async fn fetch_history(
        &self,
        _conversation_id: &str,
        _limit: usize,
        _cursor: Option<MessageKey>,
    ) -> Result<Vec<Envelope>> {
        Err(WamarkError::NotReady)
    }

    async fn send_text(
        &self,
        _conversation_id: &str,
        _text: &str,
        _quoted: Option<&MessageKey>,
    ) -> Result<()> {
        Err(WamarkError::NotReady)
    }

    async fn send_reaction(
        &self,
        _conversation_id: &str,
        _key: &MessageKey,
        _emoji: &str,
    ) -> Result<()> {
        Err(WamarkError::NotReady)
    }

    async fn listen(&self) -> Result<Box<dyn Stream<Item = Envelope> + Send + Unpin>> {
        Ok(Box::new(futures::stream::pending()))
    }
}
