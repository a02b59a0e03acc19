use teloxide::types::CallbackQuery;
use teloxide::types::Message;

use crate::error::Error;
use crate::event::Attachment;
use crate::event::Event;
use crate::event::EventKind;

/// Reduces a teloxide message to an [`Event`]. Messages without a sender (channel
/// posts) cannot be keyed to a conversation.
pub fn event_from_message(msg: &Message) -> Result<Event, Error> {
  let user = msg.from.as_ref().ok_or_else(|| Error::TypeMismatch {
    expected: "message with a sender",
    found: format!("message {} in chat {}", msg.id, msg.chat.id),
  })?;

  let attachment = if let Some(photo) = msg.photo().and_then(|photos| photos.last()) {
    Some(Attachment::Photo {
      file_id: photo.file.id.to_string(),
    })
  } else if let Some(document) = msg.document() {
    Some(Attachment::Document {
      file_id: document.file.id.to_string(),
    })
  } else if msg.text().is_none() {
    Some(Attachment::Other)
  } else {
    None
  };

  Ok(Event {
    chat_id: msg.chat.id.0,
    user_id: user.id.0 as i64,
    state: None,
    kind: EventKind::Message {
      message_id: msg.id.0,
      text: msg.text().map(str::to_string),
      attachment,
    },
  })
}

/// Reduces a callback query to an [`Event`]. Queries whose message is unknown (inline
/// mode) have no chat to answer in.
pub fn event_from_callback(query: &CallbackQuery) -> Result<Event, Error> {
  let (chat_id, message_id) = query
    .message
    .as_ref()
    .map(|message| (message.chat().id, message.id()))
    .ok_or_else(|| Error::TypeMismatch {
      expected: "callback query with a message",
      found: format!("callback query {}", query.id),
    })?;

  Ok(Event {
    chat_id: chat_id.0,
    user_id: query.from.id.0 as i64,
    state: None,
    kind: EventKind::Callback {
      query_id: query.id.to_string(),
      message_id: Some(message_id.0),
      data: query.data.clone(),
    },
  })
}
