use async_trait::async_trait;
use thiserror::Error;

use crate::markup::RenderedMarkup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
  pub chat_id: i64,
  pub message_id: i32,
}

#[derive(Debug, Error)]
pub enum TransportError {
  /// The message to edit is gone or can no longer be edited. Callers fall back to
  /// sending a new message.
  #[error("message {message_id} in chat {chat_id} cannot be edited")]
  NotEditable { chat_id: i64, message_id: i32 },
  #[error(transparent)]
  Api(#[from] teloxide::RequestError),
  #[error("transport failed: {0}")]
  Other(String),
}

/// Outgoing side of the bot API. Implementations turn a [`RenderedMarkup`] into the
/// platform's keyboard payload.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send_message(
    &self,
    chat_id: i64,
    text: &str,
    markup: Option<&RenderedMarkup>,
  ) -> Result<SentMessage, TransportError>;

  async fn edit_message(
    &self,
    chat_id: i64,
    message_id: i32,
    text: &str,
    markup: Option<&RenderedMarkup>,
  ) -> Result<SentMessage, TransportError>;

  async fn answer_callback(&self, query_id: &str, text: Option<&str>) -> Result<(), TransportError>;
}
