use std::sync::Arc;

use crate::button::Button;
use crate::event::ChatKey;
use crate::event::Event;
use crate::event::MarkupType;

/// Read-only view of an event after resolution.
///
/// `content` is the matched button's data when it has any, else its text, else the raw
/// message text or callback data.
#[derive(Debug, Clone)]
pub struct DialogMeta {
  pub chat_id: i64,
  pub user_id: i64,
  pub active_message_id: Option<i32>,
  pub markup_type: MarkupType,
  pub content: Option<String>,
  pub state: Option<String>,
  pub button: Option<Arc<Button>>,
  pub source: Option<Event>,
}

impl DialogMeta {
  pub fn from_event(event: &Event, button: Option<Arc<Button>>) -> Self {
    let content = match button.as_deref() {
      Some(button) => button
        .payload()
        .or_else(|| button.text())
        .or_else(|| event.content())
        .map(str::to_string),
      None => event.content().map(str::to_string),
    };

    Self {
      chat_id: event.chat_id,
      user_id: event.user_id,
      active_message_id: event.message_id(),
      markup_type: event.markup_type(),
      content,
      state: event.state.clone(),
      button,
      source: Some(event.clone()),
    }
  }

  /// Meta for a conversation without a triggering event, e.g. when a dialog shows its
  /// first prompt.
  pub fn for_chat(key: ChatKey) -> Self {
    Self {
      chat_id: key.chat_id,
      user_id: key.user_id,
      active_message_id: None,
      markup_type: MarkupType::Text,
      content: None,
      state: None,
      button: None,
      source: None,
    }
  }

  pub fn key(&self) -> ChatKey {
    ChatKey::new(self.chat_id, self.user_id)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::DialogMeta;
  use crate::button::Button;
  use crate::event::ChatKey;
  use crate::event::Event;
  use crate::event::MarkupType;

  #[test]
  fn substitutes_button_data() {
    let event = Event::text(10, 20, 30, "Bitcoin").with_state("menu");
    let button = Arc::new(Button::new("Bitcoin").data("BTC"));
    let meta = DialogMeta::from_event(&event, Some(button));

    assert_eq!(meta.content.as_deref(), Some("BTC"));
    assert_eq!(meta.state.as_deref(), Some("menu"));
    assert_eq!(meta.active_message_id, Some(30));
    assert_eq!(meta.key(), ChatKey::new(10, 20));
  }

  #[test]
  fn falls_back_to_button_text_then_raw_content() {
    let event = Event::callback(1, 2, "q", Some(5), "::button::abc");
    let with_button = DialogMeta::from_event(&event, Some(Arc::new(Button::new("Yes"))));
    assert_eq!(with_button.content.as_deref(), Some("Yes"));
    assert_eq!(with_button.markup_type, MarkupType::Inline);

    let raw = DialogMeta::from_event(&event, None);
    assert_eq!(raw.content.as_deref(), Some("::button::abc"));
  }

  #[test]
  fn chat_meta_defaults_to_text() {
    let meta = DialogMeta::for_chat(ChatKey::new(3, 4));
    assert_eq!(meta.markup_type, MarkupType::Text);
    assert!(meta.active_message_id.is_none());
    assert!(meta.source.is_none());
  }
}
