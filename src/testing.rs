use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::context::Keyboards;
use crate::markup::RenderedMarkup;
use crate::storage::MemoryStorage;
use crate::transport::SentMessage;
use crate::transport::Transport;
use crate::transport::TransportError;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
  Send {
    chat_id: i64,
    text: String,
    markup: Option<RenderedMarkup>,
  },
  Edit {
    chat_id: i64,
    message_id: i32,
    text: String,
    markup: Option<RenderedMarkup>,
  },
  Answer {
    query_id: String,
    text: Option<String>,
  },
}

#[derive(Default)]
struct Recorded {
  calls: Vec<Call>,
  next_message_id: i32,
  fail_edits: bool,
  failing_sends: usize,
}

/// Transport that records every outgoing call.
#[derive(Default)]
pub struct RecordingTransport {
  recorded: Mutex<Recorded>,
}

impl RecordingTransport {
  pub async fn calls(&self) -> Vec<Call> {
    self.recorded.lock().await.calls.clone()
  }

  /// Every later edit fails as if the message were gone.
  pub async fn fail_edits(&self) {
    self.recorded.lock().await.fail_edits = true;
  }

  /// The next `count` sends fail without being recorded.
  pub async fn fail_next_sends(&self, count: usize) {
    self.recorded.lock().await.failing_sends = count;
  }
}

#[async_trait]
impl Transport for RecordingTransport {
  async fn send_message(
    &self,
    chat_id: i64,
    text: &str,
    markup: Option<&RenderedMarkup>,
  ) -> Result<SentMessage, TransportError> {
    let mut recorded = self.recorded.lock().await;
    if recorded.failing_sends > 0 {
      recorded.failing_sends -= 1;
      return Err(TransportError::Other("network blip".to_string()));
    }
    recorded.next_message_id += 1;
    recorded.calls.push(Call::Send {
      chat_id,
      text: text.to_string(),
      markup: markup.cloned(),
    });
    Ok(SentMessage {
      chat_id,
      message_id: recorded.next_message_id,
    })
  }

  async fn edit_message(
    &self,
    chat_id: i64,
    message_id: i32,
    text: &str,
    markup: Option<&RenderedMarkup>,
  ) -> Result<SentMessage, TransportError> {
    let mut recorded = self.recorded.lock().await;
    if recorded.fail_edits {
      return Err(TransportError::NotEditable { chat_id, message_id });
    }
    recorded.calls.push(Call::Edit {
      chat_id,
      message_id,
      text: text.to_string(),
      markup: markup.cloned(),
    });
    Ok(SentMessage { chat_id, message_id })
  }

  async fn answer_callback(&self, query_id: &str, text: Option<&str>) -> Result<(), TransportError> {
    self.recorded.lock().await.calls.push(Call::Answer {
      query_id: query_id.to_string(),
      text: text.map(str::to_string),
    });
    Ok(())
  }
}

pub fn keyboards() -> (Keyboards, Arc<RecordingTransport>, Arc<MemoryStorage>) {
  let transport = Arc::new(RecordingTransport::default());
  let storage = MemoryStorage::shared();
  let ctx = Keyboards::builder()
    .storage(storage.clone())
    .transport(transport.clone())
    .build()
    .expect("keyboards with storage and transport");
  (ctx, transport, storage)
}
