use std::sync::Arc;

use anyhow::Result;
use tracing::debug;
use tracing::instrument;

use crate::button::ButtonId;
use crate::button::CallbackPrefix;
use crate::error::Error;
use crate::event::Event;
use crate::event::EventKind;
use crate::event::MarkupScope;
use crate::filter::SharedFilter;
use crate::handler::on_event;
use crate::markup::ButtonFilter;
use crate::markup::Markup;
use crate::meta::DialogMeta;
use crate::registry::ConflictPolicy;
use crate::registry::Registry;
use crate::router::HandlerId;
use crate::router::Router;
use crate::storage::StateStorage;
use crate::transport::Transport;

struct Shared {
  registry: Arc<Registry>,
  router: Router,
  storage: Arc<dyn StateStorage>,
  transport: Arc<dyn Transport>,
}

/// Everything keyboards and dialogs need at runtime. Cheap to clone; bots and tests
/// each build their own instead of sharing process globals.
#[derive(Clone)]
pub struct Keyboards {
  shared: Arc<Shared>,
}

#[derive(Default)]
pub struct KeyboardsBuilder {
  registry: Option<Arc<Registry>>,
  storage: Option<Arc<dyn StateStorage>>,
  transport: Option<Arc<dyn Transport>>,
  prefix: CallbackPrefix,
  policy: ConflictPolicy,
}

impl KeyboardsBuilder {
  pub fn storage(mut self, storage: Arc<dyn StateStorage>) -> Self {
    self.storage = Some(storage);
    self
  }

  pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
    self.transport = Some(transport);
    self
  }

  /// Shares an existing registry; `callback_prefix` and `conflict_policy` are then ignored.
  pub fn registry(mut self, registry: Arc<Registry>) -> Self {
    self.registry = Some(registry);
    self
  }

  pub fn callback_prefix(mut self, prefix: CallbackPrefix) -> Self {
    self.prefix = prefix;
    self
  }

  pub fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn build(self) -> Result<Keyboards, Error> {
    let storage = self.storage.ok_or_else(|| {
      Error::Configuration("FSM storage is not installed, call KeyboardsBuilder::storage".to_string())
    })?;
    let transport = self.transport.ok_or_else(|| {
      Error::Configuration("transport is not installed, call KeyboardsBuilder::transport".to_string())
    })?;
    let registry = self
      .registry
      .unwrap_or_else(|| Arc::new(Registry::new(self.prefix, self.policy)));

    Ok(Keyboards {
      shared: Arc::new(Shared {
        registry,
        router: Router::new(),
        storage,
        transport,
      }),
    })
  }
}

impl Keyboards {
  pub fn builder() -> KeyboardsBuilder {
    KeyboardsBuilder::default()
  }

  pub fn registry(&self) -> &Arc<Registry> {
    &self.shared.registry
  }

  pub fn router(&self) -> &Router {
    &self.shared.router
  }

  pub fn storage(&self) -> &dyn StateStorage {
    self.shared.storage.as_ref()
  }

  pub fn transport(&self) -> &dyn Transport {
    self.shared.transport.as_ref()
  }

  /// Resolves the button behind `event` and wraps both into a [`DialogMeta`].
  pub async fn meta(&self, event: &Event) -> DialogMeta {
    let button = self.registry().resolve(event).await;
    DialogMeta::from_event(event, button)
  }

  /// Runs one incoming event through the keyboard pipeline: loads the FSM state,
  /// applies the pressed button's side effects (state reset, callback answer), then
  /// calls the first matching handler. Returns whether any handler ran.
  #[instrument(skip(self, event), fields(chat_id = event.chat_id, user_id = event.user_id))]
  pub async fn dispatch(&self, mut event: Event) -> Result<bool> {
    let key = event.key();
    event.state = self.storage().get_state(key).await?;

    if let Some(button) = self.registry().resolve(&event).await {
      debug!(button = %button, state = ?event.state, "detected button press");
      if button.ignores_state() {
        self.storage().reset_state(key).await?;
        event.state = None;
      }
      if let EventKind::Callback { query_id, .. } = &event.kind
        && let Some(answer) = button.callback_answer()
      {
        self.transport().answer_callback(query_id, Some(answer)).await?;
      }
    }

    let Some(handler) = self.router().select(&event).await else {
      debug!(state = ?event.state, "event left unhandled");
      return Ok(false);
    };
    handler(self.clone(), event).await?;
    Ok(true)
  }

  /// Shows `target` whenever `origin` passes: as a new message for text events, in
  /// place for callbacks.
  pub fn bind(&self, origin: SharedFilter, target: Arc<Markup>) -> [HandlerId; 2] {
    let for_messages = target.clone();
    let text = self.router().register_text_handler(
      origin.clone(),
      on_event(move |ctx, event| {
        let target = for_messages.clone();
        async move {
          let meta = ctx.meta(&event).await;
          target.process(&ctx, &meta, Some(MarkupScope::Message)).await?;
          Ok(())
        }
      }),
    );
    let callback = self.router().register_callback_handler(
      origin,
      on_event(move |ctx, event| {
        let target = target.clone();
        async move {
          let meta = ctx.meta(&event).await;
          target.process(&ctx, &meta, Some(MarkupScope::Callback)).await?;
          Ok(())
        }
      }),
    );
    [text, callback]
  }

  /// Pressing `button` (within its scope) shows `target`.
  pub fn bind_button(&self, button: ButtonId, target: Arc<Markup>) -> Result<[HandlerId; 2], Error> {
    self.registry().get(button).ok_or(Error::UnknownButton(button))?;
    let filter = ButtonFilter::new(self.registry().clone(), button, true);
    Ok(self.bind(Arc::new(filter), target))
  }

  /// Pressing any button of `origin` shows `target`.
  pub fn bind_markup(&self, origin: &Markup, target: Arc<Markup>) -> [HandlerId; 2] {
    self.bind(origin.filter(true), target)
  }
}
