use std::sync::Arc;

use teloxide::dispatching::UpdateHandler;
use teloxide::dptree;
use teloxide::prelude::*;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::bot::TeloxideTransport;
use crate::bot::event_from_callback;
use crate::bot::event_from_message;
use crate::config::Config;
use crate::context::Keyboards;
use crate::db::PgStorage;
use crate::handler::HandlerResult;
use crate::storage::MemoryStorage;
use crate::storage::StateStorage;

/// Long-polling runner feeding every message and callback query into
/// [`Keyboards::dispatch`].
pub struct App {
  bot: Bot,
  keyboards: Keyboards,
  handler: UpdateHandler<anyhow::Error>,
}

impl App {
  pub fn new(bot: Bot, keyboards: Keyboards) -> Self {
    Self {
      bot,
      keyboards,
      handler: build_schema(),
    }
  }

  /// Bot and keyboards wired from `config`: Postgres FSM storage when a database is
  /// configured, in-memory otherwise.
  pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
    let bot = Bot::new(config.bot_token.clone());
    let storage: Arc<dyn StateStorage> = match &config.database_url {
      Some(url) => Arc::new(PgStorage::connect(url).await?),
      None => {
        warn!("DATABASE_URL is not set, FSM states are kept in memory");
        MemoryStorage::shared()
      },
    };
    let keyboards = Keyboards::builder()
      .storage(storage)
      .transport(Arc::new(TeloxideTransport::new(bot.clone())))
      .callback_prefix(config.callback_prefix.clone())
      .conflict_policy(config.conflict_policy)
      .build()?;
    Ok(Self::new(bot, keyboards))
  }

  pub fn keyboards(&self) -> &Keyboards {
    &self.keyboards
  }

  pub async fn run(self) -> anyhow::Result<()> {
    let me = self.bot.get_me().await?;
    info!(username = ?me.username, "starting dispatcher");

    Dispatcher::builder(self.bot.clone(), self.handler)
      .dependencies(dptree::deps![self.keyboards.clone()])
      .enable_ctrlc_handler()
      .build()
      .dispatch()
      .await;

    Ok(())
  }
}

pub fn build_schema() -> UpdateHandler<anyhow::Error> {
  dptree::entry()
    .branch(Update::filter_message().endpoint(handle_message))
    .branch(Update::filter_callback_query().endpoint(handle_callback_query))
}

#[instrument(skip(ctx, msg), fields(chat_id = %msg.chat.id))]
async fn handle_message(ctx: Keyboards, msg: Message) -> HandlerResult {
  let event = event_from_message(&msg)?;
  ctx.dispatch(event).await?;
  Ok(())
}

#[instrument(skip(ctx, query), fields(user_id = %query.from.id))]
async fn handle_callback_query(ctx: Keyboards, query: CallbackQuery) -> HandlerResult {
  let event = event_from_callback(&query)?;
  ctx.dispatch(event).await?;
  Ok(())
}
