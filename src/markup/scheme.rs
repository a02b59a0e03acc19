use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::button::Button;
use crate::button::CallbackPrefix;
use crate::event::MarkupType;
use crate::meta::DialogMeta;

/// Platform-neutral button about to be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ButtonView {
  pub text: String,
  pub callback_data: Option<String>,
}

impl ButtonView {
  pub fn new(text: impl Into<String>, callback_data: Option<String>) -> Self {
    Self {
      text: text.into(),
      callback_data,
    }
  }

  /// `None` for buttons without content.
  pub fn from_button(button: &Button, prefix: &CallbackPrefix) -> Option<Self> {
    let text = button.text()?;
    Some(Self::new(text, Some(button.callback_data(prefix))))
  }
}

pub type Rows = Vec<Vec<ButtonView>>;

/// Keyboard ready to be handed to a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedMarkup {
  pub markup_type: MarkupType,
  pub rows: Rows,
  pub one_time_keyboard: bool,
}

/// Runtime hook run on the rows before a markup is rendered. It may add or remove
/// buttons; returning `false` sends the message without a keyboard.
#[async_trait]
pub trait MarkupScheme: Send + Sync {
  async fn construct(&self, meta: &DialogMeta, rows: &mut Rows) -> bool;
}

pub type SharedScheme = Arc<dyn MarkupScheme>;

/// Groups visible buttons into rows of `width`.
pub fn chunk_rows(buttons: &[Arc<Button>], width: usize, prefix: &CallbackPrefix) -> Rows {
  let views: Vec<ButtonView> = buttons
    .iter()
    .filter_map(|button| ButtonView::from_button(button, prefix))
    .collect();
  views.chunks(width.max(1)).map(<[ButtonView]>::to_vec).collect()
}
