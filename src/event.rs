use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

static COMMAND_PATTERN: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^/([A-Za-z0-9_]+)(?:@[A-Za-z0-9_]+)?(?:\s|$)").expect("valid regex"));

/// Conversation key: FSM state and dialog runs are partitioned by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatKey {
  pub chat_id: i64,
  pub user_id: i64,
}

impl ChatKey {
  pub fn new(chat_id: i64, user_id: i64) -> Self {
    Self { chat_id, user_id }
  }
}

/// How a markup is shown: as a reply keyboard under a new message or inline under an
/// existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkupType {
  Text,
  Inline,
}

/// Event kinds a markup may be processed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkupScope {
  Message,
  Callback,
  Any,
}

impl MarkupScope {
  /// `None` means "whatever the triggering event is".
  pub fn fixed_type(self) -> Option<MarkupType> {
    match self {
      Self::Message => Some(MarkupType::Text),
      Self::Callback => Some(MarkupType::Inline),
      Self::Any => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
  Photo { file_id: String },
  Document { file_id: String },
  Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
  Message {
    message_id: i32,
    text: Option<String>,
    attachment: Option<Attachment>,
  },
  Callback {
    query_id: String,
    message_id: Option<i32>,
    data: Option<String>,
  },
}

/// An incoming update reduced to what matching needs. `state` is the persisted FSM
/// state of the chat/user at the time the event is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
  pub chat_id: i64,
  pub user_id: i64,
  pub state: Option<String>,
  pub kind: EventKind,
}

impl Event {
  pub fn text(chat_id: i64, user_id: i64, message_id: i32, text: impl Into<String>) -> Self {
    Self {
      chat_id,
      user_id,
      state: None,
      kind: EventKind::Message {
        message_id,
        text: Some(text.into()),
        attachment: None,
      },
    }
  }

  pub fn callback(
    chat_id: i64,
    user_id: i64,
    query_id: impl Into<String>,
    message_id: Option<i32>,
    data: impl Into<String>,
  ) -> Self {
    Self {
      chat_id,
      user_id,
      state: None,
      kind: EventKind::Callback {
        query_id: query_id.into(),
        message_id,
        data: Some(data.into()),
      },
    }
  }

  pub fn with_state(mut self, state: impl Into<String>) -> Self {
    self.state = Some(state.into());
    self
  }

  pub fn key(&self) -> ChatKey {
    ChatKey::new(self.chat_id, self.user_id)
  }

  pub fn is_callback(&self) -> bool {
    matches!(self.kind, EventKind::Callback { .. })
  }

  pub fn markup_type(&self) -> MarkupType {
    match self.kind {
      EventKind::Message { .. } => MarkupType::Text,
      EventKind::Callback { .. } => MarkupType::Inline,
    }
  }

  /// Message text or callback data.
  pub fn content(&self) -> Option<&str> {
    match &self.kind {
      EventKind::Message { text, .. } => text.as_deref(),
      EventKind::Callback { data, .. } => data.as_deref(),
    }
  }

  /// Message the event refers to: the message itself, or the one carrying the tapped
  /// inline keyboard.
  pub fn message_id(&self) -> Option<i32> {
    match self.kind {
      EventKind::Message { message_id, .. } => Some(message_id),
      EventKind::Callback { message_id, .. } => message_id,
    }
  }

  pub fn attachment(&self) -> Option<&Attachment> {
    match &self.kind {
      EventKind::Message { attachment, .. } => attachment.as_ref(),
      EventKind::Callback { .. } => None,
    }
  }

  /// Bot command of a text message, without the leading slash and bot mention.
  pub fn command(&self) -> Option<&str> {
    let EventKind::Message { text: Some(text), .. } = &self.kind else {
      return None;
    };
    COMMAND_PATTERN
      .captures(text)
      .and_then(|captures| captures.get(1))
      .map(|command| command.as_str())
  }
}
