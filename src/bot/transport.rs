use async_trait::async_trait;
use teloxide::ApiError;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::CallbackQueryId;
use teloxide::types::ChatId;
use teloxide::types::InlineKeyboardButton;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::types::KeyboardButton;
use teloxide::types::KeyboardMarkup;
use teloxide::types::MessageId;
use teloxide::types::ReplyMarkup;
use tracing::debug;
use tracing::instrument;

use crate::event::MarkupType;
use crate::markup::ButtonView;
use crate::markup::RenderedMarkup;
use crate::markup::Rows;
use crate::transport::SentMessage;
use crate::transport::Transport;
use crate::transport::TransportError;

/// [`Transport`] over the Telegram Bot API.
#[derive(Clone)]
pub struct TeloxideTransport {
  bot: Bot,
}

impl TeloxideTransport {
  pub fn new(bot: Bot) -> Self {
    Self { bot }
  }
}

fn inline_button(view: &ButtonView) -> InlineKeyboardButton {
  let data = view.callback_data.clone().unwrap_or_else(|| view.text.clone());
  InlineKeyboardButton::callback(view.text.clone(), data)
}

fn inline_keyboard(rows: &Rows) -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(rows.iter().map(|row| row.iter().map(inline_button).collect::<Vec<_>>()))
}

fn reply_keyboard(markup: &RenderedMarkup) -> KeyboardMarkup {
  let rows = markup
    .rows
    .iter()
    .map(|row| row.iter().map(|view| KeyboardButton::new(view.text.clone())).collect::<Vec<_>>());
  let keyboard = KeyboardMarkup::new(rows).resize_keyboard();
  if markup.one_time_keyboard {
    keyboard.one_time_keyboard()
  } else {
    keyboard
  }
}

fn reply_markup(markup: &RenderedMarkup) -> ReplyMarkup {
  match markup.markup_type {
    MarkupType::Text => ReplyMarkup::Keyboard(reply_keyboard(markup)),
    MarkupType::Inline => ReplyMarkup::InlineKeyboard(inline_keyboard(&markup.rows)),
  }
}

#[async_trait]
impl Transport for TeloxideTransport {
  #[instrument(skip(self, text, markup))]
  async fn send_message(
    &self,
    chat_id: i64,
    text: &str,
    markup: Option<&RenderedMarkup>,
  ) -> Result<SentMessage, TransportError> {
    let mut request = self.bot.send_message(ChatId(chat_id), text);
    if let Some(markup) = markup {
      request = request.reply_markup(reply_markup(markup));
    }
    let message = request.await?;
    Ok(SentMessage {
      chat_id: message.chat.id.0,
      message_id: message.id.0,
    })
  }

  #[instrument(skip(self, text, markup))]
  async fn edit_message(
    &self,
    chat_id: i64,
    message_id: i32,
    text: &str,
    markup: Option<&RenderedMarkup>,
  ) -> Result<SentMessage, TransportError> {
    let mut request = self.bot.edit_message_text(ChatId(chat_id), MessageId(message_id), text);
    if let Some(markup) = markup {
      request = request.reply_markup(inline_keyboard(&markup.rows));
    }
    match request.await {
      Ok(message) => Ok(SentMessage {
        chat_id: message.chat.id.0,
        message_id: message.id.0,
      }),
      Err(RequestError::Api(ApiError::MessageNotModified)) => {
        debug!(chat_id, message_id, "message already current");
        Ok(SentMessage { chat_id, message_id })
      },
      Err(RequestError::Api(ApiError::MessageCantBeEdited | ApiError::MessageToEditNotFound)) => {
        Err(TransportError::NotEditable { chat_id, message_id })
      },
      Err(err) => Err(err.into()),
    }
  }

  #[instrument(skip(self))]
  async fn answer_callback(&self, query_id: &str, text: Option<&str>) -> Result<(), TransportError> {
    let request = self.bot.answer_callback_query(CallbackQueryId(query_id.to_string()));
    if let Some(text) = text {
      request.text(text).await?;
    } else {
      request.await?;
    }
    Ok(())
  }
}
