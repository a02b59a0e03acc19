use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;
use tracing::info;
use tracing::instrument;

use crate::button::Button;
use crate::button::ButtonId;
use crate::button::Orientation;
use crate::context::Keyboards;
use crate::error::Error;
use crate::event::Event;
use crate::event::MarkupScope;
use crate::event::MarkupType;
use crate::filter::EventFilter;
use crate::filter::SharedFilter;
use crate::filter::accept;
use crate::filter::all_of;
use crate::filter::any_of;
use crate::handler::EventHandler;
use crate::handler::MetaHandler;
use crate::handler::on_event;
use crate::hash::hash_parts;
use crate::meta::DialogMeta;
use crate::registry::Registry;
use crate::router::HandlerId;
use crate::scope::DefinitionScope;
use crate::transport::SentMessage;
use crate::transport::TransportError;
use crate::validator::SharedValidator;

mod scheme;

pub use scheme::ButtonView;
pub use scheme::MarkupScheme;
pub use scheme::RenderedMarkup;
pub use scheme::Rows;
pub use scheme::SharedScheme;
pub use scheme::chunk_rows;

pub type TextProducer = Arc<dyn Fn(DialogMeta) -> BoxFuture<'static, String> + Send + Sync>;

/// Message text shown with a markup.
#[derive(Clone)]
pub enum MarkupText {
  Literal(String),
  Dynamic(TextProducer),
}

impl fmt::Debug for MarkupText {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
      Self::Dynamic(_) => f.write_str("Dynamic(..)"),
    }
  }
}

/// Declarative description of a keyboard. Clone a builder to derive keyboards that
/// share its buttons, then [`build`](Self::build) each one.
#[derive(Clone)]
pub struct MarkupBuilder {
  name: String,
  text: MarkupText,
  buttons: Vec<Button>,
  orientation: Option<Orientation>,
  ignore_state: bool,
  row_width: usize,
  one_time_keyboard: bool,
  scope: Option<DefinitionScope>,
  markup_scope: Option<MarkupScope>,
  scheme: Option<SharedScheme>,
}

impl MarkupBuilder {
  pub fn new(name: impl Into<String>) -> Self {
    let name = name.into();
    Self {
      text: MarkupText::Literal(name.clone()),
      name,
      buttons: Vec::new(),
      orientation: None,
      ignore_state: false,
      row_width: 1,
      one_time_keyboard: true,
      scope: None,
      markup_scope: None,
      scheme: None,
    }
  }

  pub fn text(mut self, text: impl Into<String>) -> Self {
    self.text = MarkupText::Literal(text.into());
    self
  }

  /// Text computed for every render.
  pub fn dynamic_text<F, Fut>(mut self, producer: F) -> Self
  where
    F: Fn(DialogMeta) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = String> + Send + 'static,
  {
    self.text = MarkupText::Dynamic(Arc::new(move |meta| producer(meta).boxed()));
    self
  }

  pub fn button(mut self, button: Button) -> Self {
    self.buttons.push(button);
    self
  }

  pub fn buttons(mut self, buttons: impl IntoIterator<Item = Button>) -> Self {
    self.buttons.extend(buttons);
    self
  }

  /// Default placement for buttons that do not set their own.
  pub fn orientation(mut self, orientation: Orientation) -> Self {
    self.orientation = Some(orientation);
    self
  }

  pub fn ignore_state(mut self, ignore_state: bool) -> Self {
    self.ignore_state = ignore_state;
    self
  }

  pub fn row_width(mut self, row_width: usize) -> Self {
    self.row_width = row_width.max(1);
    self
  }

  pub fn one_time_keyboard(mut self, one_time_keyboard: bool) -> Self {
    self.one_time_keyboard = one_time_keyboard;
    self
  }

  pub fn scope(mut self, scope: DefinitionScope) -> Self {
    self.scope = Some(scope);
    self
  }

  pub fn markup_scope(mut self, markup_scope: MarkupScope) -> Self {
    self.markup_scope = Some(markup_scope);
    self
  }

  pub fn scheme(mut self, scheme: SharedScheme) -> Self {
    self.scheme = Some(scheme);
    self
  }

  pub(crate) fn map_buttons(mut self, change: impl Fn(&mut Button)) -> Self {
    self.buttons.iter_mut().for_each(change);
    self
  }

  pub(crate) fn declared_buttons(&self) -> &[Button] {
    &self.buttons
  }

  /// State tag used when no scope is given: derived from the name and button contents
  /// so it survives restarts.
  pub fn default_state(&self) -> String {
    let mut parts = vec!["markup:".to_string(), self.name.clone()];
    parts.extend(self.buttons.iter().map(|button| button.content_hash().to_string()));
    hash_parts(parts).to_string()
  }

  pub fn build(self, ctx: &Keyboards) -> Result<Markup, Error> {
    self.build_in(ctx.registry().clone())
  }

  /// Registers the buttons in `registry`. On a denied scope conflict the buttons
  /// registered so far are removed again.
  pub fn build_in(self, registry: Arc<Registry>) -> Result<Markup, Error> {
    let scope = self
      .scope
      .clone()
      .unwrap_or_else(|| DefinitionScope::new().with_state(self.default_state()));

    let mut markup = Markup {
      name: self.name,
      registry,
      buttons: Vec::new(),
      text: self.text,
      orientation: self.orientation,
      ignore_state: self.ignore_state,
      row_width: self.row_width,
      one_time_keyboard: self.one_time_keyboard,
      scope,
      markup_scope: self.markup_scope,
      scheme: self.scheme,
    };

    if let Err(err) = markup.extend(self.buttons) {
      for id in markup.buttons.drain(..) {
        markup.registry.unregister(id);
      }
      return Err(err);
    }
    Ok(markup)
  }
}

/// A keyboard: ordered buttons plus rendering and behaviour settings.
#[derive(Clone)]
pub struct Markup {
  name: String,
  registry: Arc<Registry>,
  buttons: Vec<ButtonId>,
  text: MarkupText,
  orientation: Option<Orientation>,
  ignore_state: bool,
  row_width: usize,
  one_time_keyboard: bool,
  scope: DefinitionScope,
  markup_scope: Option<MarkupScope>,
  scheme: Option<SharedScheme>,
}

impl fmt::Debug for Markup {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Markup")
      .field("name", &self.name)
      .field("buttons", &self.buttons)
      .field("text", &self.text)
      .field("row_width", &self.row_width)
      .field("scope", &self.scope)
      .field("markup_scope", &self.markup_scope)
      .finish_non_exhaustive()
  }
}

impl Markup {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn definition_scope(&self) -> &DefinitionScope {
    &self.scope
  }

  pub fn button_ids(&self) -> &[ButtonId] {
    &self.buttons
  }

  pub fn row_width(&self) -> usize {
    self.row_width
  }

  /// Buttons in display order.
  pub fn choices(&self) -> Vec<Arc<Button>> {
    self.registry.get_many(&self.buttons)
  }

  /// Copy sharing the same buttons but showing different text.
  pub fn customize(&self, text: impl Into<String>) -> Self {
    let mut copy = self.clone();
    copy.text = MarkupText::Literal(text.into());
    copy
  }

  pub fn append(&mut self, button: Button) -> Result<ButtonId, Error> {
    let id = self.adopt(button)?;
    self.struct_buttons();
    Ok(id)
  }

  pub fn extend(&mut self, buttons: impl IntoIterator<Item = Button>) -> Result<Vec<ButtonId>, Error> {
    let mut ids = Vec::new();
    for button in buttons {
      ids.push(self.adopt(button)?);
    }
    self.struct_buttons();
    Ok(ids)
  }

  /// Reorders buttons with `compare`, overriding orientation order.
  pub fn sort_by<F>(&mut self, mut compare: F)
  where
    F: FnMut(&Button, &Button) -> Ordering,
  {
    let mut choices = self.choices();
    choices.sort_by(|a, b| compare(a, b));
    self.buttons = choices.iter().filter_map(|button| button.id()).collect();
  }

  fn adopt(&mut self, mut button: Button) -> Result<ButtonId, Error> {
    if let Some(orientation) = self.orientation {
      button.fill_orientation(orientation);
    }
    button.fill_ignore_state(self.ignore_state);
    button.fill_scope(&self.scope);
    let id = self.registry.register(button)?;
    self.buttons.push(id);
    Ok(id)
  }

  /// Stable sort by orientation: declaration order survives among equal placements.
  fn struct_buttons(&mut self) {
    let mut choices = self.choices();
    choices.sort_by_key(|button| button.placement());
    self.buttons = choices.iter().filter_map(|button| button.id()).collect();
  }

  /// No visible button, so nothing to render.
  pub fn is_null(&self) -> bool {
    self.choices().iter().all(|button| button.is_placeholder())
  }

  /// OR over the buttons: content and scope (and validator) when `include_scope`,
  /// content only otherwise.
  pub fn filter(&self, include_scope: bool) -> SharedFilter {
    any_of(
      self
        .buttons
        .iter()
        .map(|id| Arc::new(ButtonFilter::new(self.registry.clone(), *id, include_scope)) as SharedFilter)
        .collect(),
    )
  }

  pub fn rows(&self) -> Rows {
    chunk_rows(&self.choices(), self.row_width, self.registry.prefix())
  }

  /// `None` means "send without a keyboard": the markup has no visible button or the
  /// scheme vetoed it.
  pub async fn render(&self, meta: &DialogMeta, markup_type: MarkupType) -> Option<RenderedMarkup> {
    if self.is_null() {
      return None;
    }
    let mut rows = self.rows();
    if let Some(scheme) = &self.scheme
      && !scheme.construct(meta, &mut rows).await
    {
      return None;
    }
    Some(RenderedMarkup {
      markup_type,
      rows,
      one_time_keyboard: self.one_time_keyboard,
    })
  }

  pub async fn text_for(&self, meta: &DialogMeta) -> String {
    match &self.text {
      MarkupText::Literal(text) => text.clone(),
      MarkupText::Dynamic(producer) => producer(meta.clone()).await,
    }
  }

  /// Shows the markup in the conversation of `meta` and makes its scope the current
  /// FSM state.
  ///
  /// Markup type precedence: `markup_scope` argument, then the markup's own scope, then
  /// the kind of the triggering event. Inline markups edit the active message and fall
  /// back to a new message when it cannot be edited.
  #[instrument(skip(self, ctx, meta), fields(markup = %self.name, chat_id = meta.chat_id, user_id = meta.user_id))]
  pub async fn process(
    &self,
    ctx: &Keyboards,
    meta: &DialogMeta,
    markup_scope: Option<MarkupScope>,
  ) -> Result<SentMessage, Error> {
    let markup_type = [markup_scope, self.markup_scope]
      .into_iter()
      .flatten()
      .find_map(MarkupScope::fixed_type)
      .unwrap_or(meta.markup_type);
    debug!(state = ?self.scope.state(), ?markup_type, "processing markup");

    let text = self.text_for(meta).await;
    let reply_markup = self.render(meta, markup_type).await;
    let transport = ctx.transport();

    let sent = match (markup_type, meta.active_message_id) {
      (MarkupType::Inline, Some(message_id)) => {
        match transport
          .edit_message(meta.chat_id, message_id, &text, reply_markup.as_ref())
          .await
        {
          Ok(sent) => sent,
          Err(TransportError::NotEditable { .. }) => {
            info!(message_id, "active message not editable, sending a new one");
            transport.send_message(meta.chat_id, &text, reply_markup.as_ref()).await?
          },
          Err(err) => return Err(err.into()),
        }
      },
      _ => transport.send_message(meta.chat_id, &text, reply_markup.as_ref()).await?,
    };

    self.scope.set_state(ctx.storage(), meta.key()).await?;
    Ok(sent)
  }

  /// Calls `handler` for presses of this markup's buttons, in this markup's scope.
  pub fn handle(&self, ctx: &Keyboards, handler: MetaHandler) -> [HandlerId; 2] {
    ctx.router().register_both(self.filter(true), meta_callback(handler, None))
  }

  /// Installs `behavior`: its handler runs for events accepted by the content check
  /// (this markup's buttons, or the behaviour's validator when global) inside this
  /// markup's scope. Buttons without their own validator or global flag inherit them.
  pub fn apply_behavior(&self, ctx: &Keyboards, behavior: MarkupBehavior) -> Result<Vec<HandlerId>, Error> {
    let MarkupBehavior {
      handler,
      validator,
      is_global,
    } = behavior;

    let mut handlers = Vec::new();
    if let Some(handler) = handler {
      let content: SharedFilter = if is_global {
        match &validator {
          Some(validator) => Arc::new(ValidatorFilter {
            registry: self.registry.clone(),
            validator: validator.clone(),
          }),
          None => accept(),
        }
      } else {
        self.filter(false)
      };
      let filter = all_of(vec![content, Arc::new(self.scope.clone()) as SharedFilter]);
      handlers.extend(ctx.router().register_both(filter, meta_callback(handler, validator.clone())));
    }

    for id in &self.buttons {
      self.registry.update(*id, |button| {
        button.fill_validator(validator.as_ref());
        button.fill_global(is_global);
      })?;
    }
    Ok(handlers)
  }
}

/// Handler, validator and global flag applied to a whole markup.
#[derive(Clone, Default)]
pub struct MarkupBehavior {
  handler: Option<MetaHandler>,
  validator: Option<SharedValidator>,
  is_global: bool,
}

impl MarkupBehavior {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn handler(mut self, handler: MetaHandler) -> Self {
    self.handler = Some(handler);
    self
  }

  pub fn validator(mut self, validator: SharedValidator) -> Self {
    self.validator = Some(validator);
    self
  }

  pub fn global(mut self, is_global: bool) -> Self {
    self.is_global = is_global;
    self
  }
}

fn meta_callback(handler: MetaHandler, validator: Option<SharedValidator>) -> EventHandler {
  on_event(move |ctx, event| {
    let handler = handler.clone();
    let validator = validator.clone();
    async move {
      let meta = ctx.meta(&event).await;
      if let Some(validator) = validator
        && !validator.validate(&meta).await
      {
        debug!(chat_id = meta.chat_id, "behaviour validator rejected event");
        return Ok(());
      }
      handler(ctx, meta).await
    }
  })
}

/// Matches events produced by one registered button. Reads the button from the
/// registry on every check, so later behaviour updates apply.
pub struct ButtonFilter {
  registry: Arc<Registry>,
  id: ButtonId,
  include_scope: bool,
}

impl ButtonFilter {
  pub fn new(registry: Arc<Registry>, id: ButtonId, include_scope: bool) -> Self {
    Self {
      registry,
      id,
      include_scope,
    }
  }
}

#[async_trait]
impl EventFilter for ButtonFilter {
  async fn check(&self, event: &Event) -> bool {
    let Some(button) = self.registry.get(self.id) else {
      return false;
    };
    if !button.check_linked_content(event, self.registry.prefix()) {
      return false;
    }
    if !self.include_scope {
      return true;
    }
    if let Some(scope) = button.definition_scope()
      && !scope.matches(event).await
    {
      return false;
    }
    let Some(validator) = button.content_validator().cloned() else {
      return true;
    };
    validator.validate(&DialogMeta::from_event(event, Some(button))).await
  }
}

struct ValidatorFilter {
  registry: Arc<Registry>,
  validator: SharedValidator,
}

#[async_trait]
impl EventFilter for ValidatorFilter {
  async fn check(&self, event: &Event) -> bool {
    let button = self.registry.resolve(event).await;
    self.validator.validate(&DialogMeta::from_event(event, button)).await
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use async_trait::async_trait;

  use super::MarkupBehavior;
  use super::MarkupBuilder;
  use super::MarkupScheme;
  use super::Rows;
  use crate::button::Button;
  use crate::button::Orientation;
  use crate::error::Error;
  use crate::event::ChatKey;
  use crate::event::Event;
  use crate::event::MarkupScope;
  use crate::event::MarkupType;
  use crate::handler::on_meta;
  use crate::meta::DialogMeta;
  use crate::registry::ConflictPolicy;
  use crate::registry::Registry;
  use crate::scope::DefinitionScope;
  use crate::storage::StateStorage;
  use crate::testing::Call;
  use crate::testing::keyboards;
  use crate::validator::IntegerValidator;

  #[test]
  fn orders_buttons_by_orientation_stably() {
    let (ctx, _, _) = keyboards();
    let markup = MarkupBuilder::new("Ordered")
      .button(Button::new("bottom").orientation(Orientation::Bottom))
      .button(Button::new("first"))
      .button(Button::new("top").orientation(Orientation::Top))
      .button(Button::new("second"))
      .build(&ctx)
      .unwrap();

    let texts: Vec<String> = markup
      .choices()
      .iter()
      .filter_map(|button| button.text().map(str::to_string))
      .collect();
    assert_eq!(texts, ["top", "first", "second", "bottom"]);
  }

  #[test]
  fn markup_settings_fill_unset_button_fields() {
    let (ctx, _, _) = keyboards();
    let own = DefinitionScope::new().with_state("own");
    let markup = MarkupBuilder::new("Undo")
      .orientation(Orientation::Bottom)
      .button(Button::new("Undo"))
      .button(Button::new("Keep").scope(own).orientation(Orientation::Top))
      .build(&ctx)
      .unwrap();

    let choices = markup.choices();
    assert_eq!(choices[0].text(), Some("Keep"));
    assert_eq!(choices[0].definition_scope().and_then(DefinitionScope::state), Some("own"));
    assert_eq!(choices[1].placement(), Orientation::Bottom);
    assert_eq!(
      choices[1].definition_scope().and_then(DefinitionScope::state),
      markup.definition_scope().state()
    );
  }

  #[test]
  fn default_scope_is_stable_and_unique() {
    let menu = MarkupBuilder::new("Menu").button(Button::new("A"));
    assert_eq!(menu.default_state(), menu.clone().default_state());
    assert_ne!(menu.default_state(), MarkupBuilder::new("Other").button(Button::new("A")).default_state());
  }

  #[test]
  fn denied_conflict_rolls_back_registration() {
    let registry = Arc::new(Registry::new(Default::default(), ConflictPolicy::Deny));
    let scope = DefinitionScope::new().with_state("shared");
    MarkupBuilder::new("First")
      .scope(scope.clone())
      .button(Button::new("Back"))
      .build_in(registry.clone())
      .unwrap();

    let err = MarkupBuilder::new("Second")
      .scope(scope)
      .button(Button::new("Fresh"))
      .button(Button::new("Back"))
      .build_in(registry.clone())
      .unwrap_err();
    assert!(matches!(err, Error::ScopeConflict { .. }));
    assert_eq!(registry.len(), 1);
  }

  #[test]
  fn customize_shares_buttons() {
    let (ctx, _, _) = keyboards();
    let markup = MarkupBuilder::new("Menu").text("Hi").button(Button::new("A")).build(&ctx).unwrap();
    let custom = markup.customize("Hello again");

    assert_eq!(custom.button_ids(), markup.button_ids());
    assert_eq!(ctx.registry().len(), 1);
  }

  #[test]
  fn append_and_sort() {
    let (ctx, _, _) = keyboards();
    let mut markup = MarkupBuilder::new("Menu")
      .button(Button::new("b"))
      .button(Button::new("c"))
      .build(&ctx)
      .unwrap();
    markup.append(Button::new("top").orientation(Orientation::Top)).unwrap();
    markup.extend([Button::new("a")]).unwrap();
    assert_eq!(markup.choices()[0].text(), Some("top"));

    markup.sort_by(|x, y| x.text().cmp(&y.text()));
    let texts: Vec<_> = markup.choices().iter().map(|b| b.text().unwrap_or_default().to_string()).collect();
    assert_eq!(texts, ["a", "b", "c", "top"]);
  }

  #[tokio::test]
  async fn filter_with_and_without_scope() {
    let (ctx, _, _) = keyboards();
    let markup = MarkupBuilder::new("Menu")
      .scope(DefinitionScope::new().with_state("menu"))
      .button(Button::new("Yes"))
      .button(Button::new("No"))
      .build(&ctx)
      .unwrap();

    let outside = Event::text(1, 1, 1, "No");
    let inside = Event::text(1, 1, 1, "No").with_state("menu");
    assert!(markup.filter(false).check(&outside).await);
    assert!(!markup.filter(true).check(&outside).await);
    assert!(markup.filter(true).check(&inside).await);
    assert!(!markup.filter(true).check(&Event::text(1, 1, 1, "Maybe").with_state("menu")).await);
  }

  #[tokio::test]
  async fn filter_accepts_alias_content() {
    let (ctx, _, _) = keyboards();
    let scope = DefinitionScope::new().with_state("menu");
    let mut cancel = Button::new("Cancel").scope(scope.clone());
    let stop = cancel.alias("Stop");
    let menu = MarkupBuilder::new("Menu").scope(scope).button(cancel).build(&ctx).unwrap();
    let shortcuts = MarkupBuilder::new("Shortcuts").button(stop).build(&ctx).unwrap();

    let inside = Event::text(1, 1, 1, "Stop").with_state("menu");
    assert!(menu.filter(true).check(&inside).await);
    assert!(menu.filter(false).check(&Event::text(1, 1, 1, "Stop")).await);
    assert!(!menu.filter(true).check(&Event::text(1, 1, 1, "Stop")).await);
    assert!(!shortcuts.filter(true).check(&Event::text(1, 1, 1, "Cancel").with_state("menu")).await);

    let resolved = ctx.registry().resolve(&inside).await.unwrap();
    assert_eq!(resolved.id(), shortcuts.button_ids().first().copied());
    assert!(resolved.ignores_state());
  }

  #[tokio::test]
  async fn renders_rows_by_width() {
    let (ctx, _, _) = keyboards();
    let markup = MarkupBuilder::new("Grid")
      .row_width(2)
      .buttons(["1", "2", "3"].map(Button::new))
      .build(&ctx)
      .unwrap();

    let rendered = markup
      .render(&DialogMeta::for_chat(ChatKey::new(1, 1)), MarkupType::Inline)
      .await
      .unwrap();
    assert_eq!(rendered.markup_type, MarkupType::Inline);
    assert_eq!(rendered.rows.len(), 2);
    assert_eq!(rendered.rows[1][0].text, "3");
  }

  struct DropLastRow {
    veto: bool,
  }

  #[async_trait]
  impl MarkupScheme for DropLastRow {
    async fn construct(&self, _meta: &DialogMeta, rows: &mut Rows) -> bool {
      rows.pop();
      !self.veto
    }
  }

  #[tokio::test]
  async fn scheme_can_mutate_or_veto() {
    let (ctx, _, _) = keyboards();
    let meta = DialogMeta::for_chat(ChatKey::new(1, 1));
    let base = MarkupBuilder::new("Schemed").buttons(["a", "b"].map(Button::new));

    let mutated = base
      .clone()
      .scheme(Arc::new(DropLastRow { veto: false }))
      .build(&ctx)
      .unwrap();
    assert_eq!(mutated.render(&meta, MarkupType::Text).await.unwrap().rows.len(), 1);

    let vetoed = MarkupBuilder::new("Vetoed")
      .buttons(["c"].map(Button::new))
      .scheme(Arc::new(DropLastRow { veto: true }))
      .build(&ctx)
      .unwrap();
    assert!(vetoed.render(&meta, MarkupType::Text).await.is_none());
  }

  #[tokio::test]
  async fn null_markup_renders_nothing() {
    let (ctx, _, _) = keyboards();
    let markup = MarkupBuilder::new("Prompt").button(Button::placeholder()).build(&ctx).unwrap();
    assert!(markup.is_null());
    assert!(markup.render(&DialogMeta::for_chat(ChatKey::new(1, 1)), MarkupType::Text).await.is_none());
  }

  #[tokio::test]
  async fn process_sends_text_and_sets_state() {
    let (ctx, transport, storage) = keyboards();
    let markup = MarkupBuilder::new("Menu")
      .dynamic_text(|meta: DialogMeta| async move { format!("Hello, {}", meta.user_id) })
      .button(Button::new("A"))
      .build(&ctx)
      .unwrap();

    let meta = DialogMeta::from_event(&Event::text(5, 6, 7, "/start"), None);
    let sent = markup.process(&ctx, &meta, None).await.unwrap();

    assert_eq!(sent.chat_id, 5);
    let calls = transport.calls().await;
    assert!(matches!(&calls[..], [Call::Send { text, markup: Some(_), .. }] if text == "Hello, 6"));
    assert_eq!(
      storage.get_state(ChatKey::new(5, 6)).await.unwrap().as_deref(),
      markup.definition_scope().state()
    );
  }

  #[tokio::test]
  async fn inline_process_edits_active_message() {
    let (ctx, transport, _) = keyboards();
    let markup = MarkupBuilder::new("Menu").button(Button::new("A")).build(&ctx).unwrap();
    let meta = DialogMeta::from_event(&Event::callback(5, 6, "q", Some(70), "x"), None);

    markup.process(&ctx, &meta, None).await.unwrap();
    let calls = transport.calls().await;
    assert!(matches!(&calls[..], [Call::Edit { message_id: 70, .. }]));
  }

  #[tokio::test]
  async fn inline_edit_failure_falls_back_to_send() {
    let (ctx, transport, _) = keyboards();
    transport.fail_edits().await;
    let markup = MarkupBuilder::new("Menu").button(Button::new("A")).build(&ctx).unwrap();
    let meta = DialogMeta::from_event(&Event::text(5, 6, 70, "hi"), None);

    let sent = markup.process(&ctx, &meta, Some(MarkupScope::Callback)).await.unwrap();
    let calls = transport.calls().await;
    let sends = calls.iter().filter(|call| matches!(call, Call::Send { .. })).count();
    assert_eq!(sends, 1);
    assert!(matches!(calls.last(), Some(Call::Send { markup: Some(rendered), .. }) if rendered.markup_type == MarkupType::Inline));
    assert_eq!(sent.chat_id, 5);
  }

  #[tokio::test]
  async fn markup_scope_overrides_event_type() {
    let (ctx, transport, _) = keyboards();
    let markup = MarkupBuilder::new("Menu")
      .markup_scope(MarkupScope::Message)
      .button(Button::new("A"))
      .build(&ctx)
      .unwrap();
    let meta = DialogMeta::from_event(&Event::callback(5, 6, "q", Some(70), "x"), None);

    markup.process(&ctx, &meta, None).await.unwrap();
    assert!(matches!(&transport.calls().await[..], [Call::Send { .. }]));
  }

  #[tokio::test]
  async fn handle_receives_substituted_content() {
    let (ctx, _, storage) = keyboards();
    let markup = MarkupBuilder::new("Cryptos")
      .button(Button::new("Bitcoin").data("BTC"))
      .build(&ctx)
      .unwrap();
    let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    markup.handle(
      &ctx,
      on_meta(move |_, meta| {
        let sink = sink.clone();
        async move {
          sink.lock().await.push(meta.content.unwrap_or_default());
          Ok(())
        }
      }),
    );

    markup
      .definition_scope()
      .set_state(ctx.storage(), ChatKey::new(1, 2))
      .await
      .unwrap();
    assert!(ctx.dispatch(Event::text(1, 2, 3, "Bitcoin")).await.unwrap());
    storage.reset_state(ChatKey::new(1, 2)).await.unwrap();
    assert!(!ctx.dispatch(Event::text(1, 2, 3, "Bitcoin")).await.unwrap());
    assert_eq!(*seen.lock().await, ["BTC"]);
  }

  #[tokio::test]
  async fn behavior_validator_gates_markup_buttons() {
    let (ctx, _, _) = keyboards();
    let markup = MarkupBuilder::new("Rating")
      .row_width(3)
      .buttons(["1", "2", "3"].map(Button::new))
      .button(Button::new("5").validator(Arc::new(IntegerValidator::one_of([5]))))
      .build(&ctx)
      .unwrap();
    let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    markup
      .apply_behavior(
        &ctx,
        MarkupBehavior::new()
          .validator(Arc::new(IntegerValidator::one_of([1, 2])))
          .handler(on_meta(move |_, meta| {
            let sink = sink.clone();
            async move {
              sink.lock().await.push(meta.content.unwrap_or_default());
              Ok(())
            }
          })),
      )
      .unwrap();

    let choices = markup.choices();
    assert!(choices.iter().all(|button| !button.is_global()));
    assert!(choices.iter().all(|button| button.content_validator().is_some()));

    let key = ChatKey::new(1, 2);
    markup.definition_scope().set_state(ctx.storage(), key).await.unwrap();
    for text in ["1", "3", "4", "2"] {
      ctx.dispatch(Event::text(1, 2, 3, text)).await.unwrap();
    }
    assert!(!ctx.dispatch(Event::text(1, 2, 3, "4")).await.unwrap());
    assert_eq!(*seen.lock().await, ["1", "2"]);
  }

  #[tokio::test]
  async fn global_behavior_accepts_validated_free_input() {
    let (ctx, _, _) = keyboards();
    let markup = MarkupBuilder::new("Age")
      .text("How old are you?")
      .button(Button::placeholder())
      .build(&ctx)
      .unwrap();
    let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    markup
      .apply_behavior(
        &ctx,
        MarkupBehavior::new()
          .global(true)
          .validator(Arc::new(IntegerValidator::any()))
          .handler(on_meta(move |_, meta| {
            let sink = sink.clone();
            async move {
              sink.lock().await.push(meta.content.unwrap_or_default());
              Ok(())
            }
          })),
      )
      .unwrap();

    let placeholder = markup.choices().remove(0);
    assert!(placeholder.is_global());
    assert!(placeholder.content_validator().is_some());

    markup
      .definition_scope()
      .set_state(ctx.storage(), ChatKey::new(1, 2))
      .await
      .unwrap();
    assert!(!ctx.dispatch(Event::text(1, 2, 3, "old")).await.unwrap());
    assert!(ctx.dispatch(Event::text(1, 2, 3, "42")).await.unwrap());
    assert_eq!(*seen.lock().await, ["42"]);
  }
}
