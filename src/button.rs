use std::fmt;
use std::panic::Location;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::event::Event;
use crate::event::EventKind;
use crate::hash::HexDigest;
use crate::hash::NULL_DIGEST;
use crate::hash::content_hash;
use crate::hash::hash_parts;
use crate::scope::DefinitionScope;
use crate::validator::SharedValidator;

pub const DEFAULT_CALLBACK_PREFIX: &str = "::button::";

/// Arena handle of a registered button. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ButtonId(pub(crate) usize);

impl fmt::Display for ButtonId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Placement hint. Markups order buttons `Top`, `Undefined`, `Bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
  Top,
  #[default]
  Undefined,
  Bottom,
}

/// Prefix of inline callback data. The encoding `<prefix><content hash>` is what lets a
/// restarted bot recognise keyboards it sent before, so it must not change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPrefix(String);

impl CallbackPrefix {
  pub fn new(prefix: impl Into<String>) -> Result<Self, Error> {
    let prefix = prefix.into();
    if !prefix.ends_with(':') {
      return Err(Error::InvalidCallbackPrefix(prefix));
    }
    Ok(Self(prefix))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn encode(&self, digest: &HexDigest) -> String {
    format!("{}{}", self.0, digest)
  }
}

impl Default for CallbackPrefix {
  fn default() -> Self {
    Self(DEFAULT_CALLBACK_PREFIX.to_string())
  }
}

/// Extracts the content hash after the last colon. Malformed data yields `None`.
pub fn decode_callback_data(data: &str) -> Option<HexDigest> {
  let (_, tail) = data.rsplit_once(':')?;
  HexDigest::parse(tail)
}

/// A selectable choice. Built with the setters below, then registered through a
/// [`Registry`](crate::registry::Registry) (usually by a markup builder).
///
/// Optional settings left unset here are filled in by the owning markup.
#[derive(Clone)]
pub struct Button {
  pub(crate) id: Option<ButtonId>,
  text: Option<String>,
  data: Option<String>,
  ignore_state: Option<bool>,
  on_callback: Option<String>,
  orientation: Option<Orientation>,
  validator: Option<SharedValidator>,
  is_global: Option<bool>,
  scope: Option<DefinitionScope>,
  linked: Vec<String>,
  declared_at: &'static Location<'static>,
}

impl Button {
  #[track_caller]
  pub fn new(text: impl Into<String>) -> Self {
    Self::with_text(Some(text.into()))
  }

  /// Button without content. It still carries scope and behaviour but is never rendered.
  #[track_caller]
  pub fn placeholder() -> Self {
    Self::with_text(None)
  }

  #[track_caller]
  fn with_text(text: Option<String>) -> Self {
    Self {
      id: None,
      text,
      data: None,
      ignore_state: None,
      on_callback: None,
      orientation: None,
      validator: None,
      is_global: None,
      scope: None,
      linked: Vec::new(),
      declared_at: Location::caller(),
    }
  }

  /// Payload handlers see instead of the button text.
  pub fn data(mut self, data: impl Into<String>) -> Self {
    self.data = Some(data.into());
    self
  }

  /// When set, pressing the button resets any pending FSM state first.
  pub fn ignore_state(mut self, ignore_state: bool) -> Self {
    self.ignore_state = Some(ignore_state);
    self
  }

  pub fn on_callback(mut self, text: impl Into<String>) -> Self {
    self.on_callback = Some(text.into());
    self
  }

  pub fn orientation(mut self, orientation: Orientation) -> Self {
    self.orientation = Some(orientation);
    self
  }

  pub fn validator(mut self, validator: SharedValidator) -> Self {
    self.validator = Some(validator);
    self
  }

  /// Global buttons are considered for any content their validator accepts.
  pub fn global(mut self, is_global: bool) -> Self {
    self.is_global = Some(is_global);
    self
  }

  pub fn scope(mut self, scope: DefinitionScope) -> Self {
    self.scope = Some(scope);
    self
  }

  /// Creates a button linked to this one: markup filters built from `self` also accept
  /// the alias content. The alias copies the current scope and validator and ignores
  /// state unless told otherwise. Links are one-way.
  #[track_caller]
  pub fn alias(&mut self, text: impl Into<String>) -> Button {
    let text = text.into();
    self.linked.push(text.clone());
    let mut alias = Self::with_text(Some(text)).ignore_state(true);
    alias.scope = self.scope.clone();
    alias.validator = self.validator.clone();
    alias
  }

  /// Alias contents, in link order.
  pub fn linked(&self) -> &[String] {
    &self.linked
  }

  pub fn id(&self) -> Option<ButtonId> {
    self.id
  }

  pub fn text(&self) -> Option<&str> {
    self.text.as_deref()
  }

  pub fn payload(&self) -> Option<&str> {
    self.data.as_deref()
  }

  pub fn ignores_state(&self) -> bool {
    self.ignore_state.unwrap_or(false)
  }

  pub fn callback_answer(&self) -> Option<&str> {
    self.on_callback.as_deref()
  }

  pub fn placement(&self) -> Orientation {
    self.orientation.unwrap_or_default()
  }

  pub fn content_validator(&self) -> Option<&SharedValidator> {
    self.validator.as_ref()
  }

  pub fn is_global(&self) -> bool {
    self.is_global.unwrap_or(false)
  }

  pub fn definition_scope(&self) -> Option<&DefinitionScope> {
    self.scope.as_ref()
  }

  pub fn declared_at(&self) -> &'static Location<'static> {
    self.declared_at
  }

  pub fn is_placeholder(&self) -> bool {
    self.text.is_none()
  }

  pub fn content_hash(&self) -> HexDigest {
    content_hash(self.text.as_deref())
  }

  /// Identity inside a definite scope: content plus the scope's state tag.
  pub fn scope_hash(&self) -> HexDigest {
    match self.scope.as_ref().and_then(DefinitionScope::state) {
      Some(state) => hash_parts([self.text.as_deref().unwrap_or(NULL_DIGEST), state]),
      None => self.content_hash(),
    }
  }

  pub fn callback_data(&self, prefix: &CallbackPrefix) -> String {
    prefix.encode(&self.content_hash())
  }

  /// Content equality only: message text equals the button text, or callback data
  /// equals this button's encoded callback data.
  pub fn check_content(&self, event: &Event, prefix: &CallbackPrefix) -> bool {
    let Some(text) = self.text.as_deref() else {
      return false;
    };
    match &event.kind {
      EventKind::Message { text: Some(content), .. } => content == text,
      EventKind::Callback { data: Some(data), .. } => *data == self.callback_data(prefix),
      _ => false,
    }
  }

  /// [`check_content`](Self::check_content) over this button and its aliases.
  pub fn check_linked_content(&self, event: &Event, prefix: &CallbackPrefix) -> bool {
    if self.check_content(event, prefix) {
      return true;
    }
    self.linked.iter().any(|alias| match &event.kind {
      EventKind::Message { text: Some(content), .. } => content == alias,
      EventKind::Callback { data: Some(data), .. } => *data == prefix.encode(&content_hash(Some(alias))),
      _ => false,
    })
  }

  /// Reports whether the scope was assigned; an existing scope is kept.
  pub(crate) fn fill_scope(&mut self, scope: &DefinitionScope) -> bool {
    if self.scope.is_some() {
      return false;
    }
    self.scope = Some(scope.clone());
    true
  }

  pub(crate) fn fill_orientation(&mut self, orientation: Orientation) {
    self.orientation.get_or_insert(orientation);
  }

  pub(crate) fn fill_ignore_state(&mut self, ignore_state: bool) {
    self.ignore_state.get_or_insert(ignore_state);
  }

  pub(crate) fn fill_validator(&mut self, validator: Option<&SharedValidator>) {
    if self.validator.is_none() {
      self.validator = validator.cloned();
    }
  }

  pub(crate) fn fill_global(&mut self, is_global: bool) {
    self.is_global.get_or_insert(is_global);
  }

  pub(crate) fn force_ignore_state(&mut self, ignore_state: bool) {
    self.ignore_state = Some(ignore_state);
  }
}

impl fmt::Debug for Button {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Button")
      .field("id", &self.id)
      .field("text", &self.text)
      .field("data", &self.data)
      .field("scope", &self.scope)
      .field("linked", &self.linked)
      .field("is_global", &self.is_global)
      .finish_non_exhaustive()
  }
}

impl fmt::Display for Button {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (&self.text, &self.scope) {
      (None, Some(scope)) => write!(f, "<Abstract Button at {scope}>"),
      (None, None) => write!(f, "<Abstract Button>"),
      (Some(text), _) => write!(f, "<Button text='{text}'>"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::Button;
  use super::CallbackPrefix;
  use super::Orientation;
  use super::decode_callback_data;
  use crate::error::Error;
  use crate::event::Event;
  use crate::hash::content_hash;
  use crate::scope::DefinitionScope;

  #[test]
  fn prefix_must_end_with_colon() {
    assert!(CallbackPrefix::new("::kb::").is_ok());
    assert!(matches!(CallbackPrefix::new("kb"), Err(Error::InvalidCallbackPrefix(_))));
  }

  #[test]
  fn callback_data_encodes_content_hash() {
    let button = Button::new("Yes");
    let data = button.callback_data(&CallbackPrefix::default());
    assert_eq!(data, format!("::button::{}", content_hash(Some("Yes"))));
    assert_eq!(decode_callback_data(&data), Some(button.content_hash()));
  }

  #[test]
  fn malformed_callback_data_does_not_decode() {
    assert_eq!(decode_callback_data("no separator"), None);
    assert_eq!(decode_callback_data("menu:root"), None);
    assert_eq!(decode_callback_data("::button::"), None);
  }

  #[test]
  fn checks_content_by_event_kind() {
    let prefix = CallbackPrefix::default();
    let button = Button::new("Yes");

    assert!(button.check_content(&Event::text(1, 1, 1, "Yes"), &prefix));
    assert!(!button.check_content(&Event::text(1, 1, 1, "No"), &prefix));
    let data = button.callback_data(&prefix);
    assert!(button.check_content(&Event::callback(1, 1, "q", Some(1), data), &prefix));
    assert!(!button.check_content(&Event::callback(1, 1, "q", Some(1), "Yes"), &prefix));
    assert!(!Button::placeholder().check_content(&Event::text(1, 1, 1, ""), &prefix));
  }

  #[test]
  fn scope_hash_folds_in_state() {
    let plain = Button::new("Continue");
    let scoped = Button::new("Continue").scope(DefinitionScope::new().with_state("step1"));
    assert_eq!(plain.scope_hash(), plain.content_hash());
    assert_ne!(scoped.scope_hash(), scoped.content_hash());
    assert_eq!(scoped.content_hash(), plain.content_hash());
  }

  #[test]
  fn fill_keeps_explicit_settings() {
    let mut button = Button::new("x").orientation(Orientation::Top).ignore_state(true);
    button.fill_orientation(Orientation::Bottom);
    button.fill_ignore_state(false);
    assert_eq!(button.placement(), Orientation::Top);
    assert!(button.ignores_state());

    let mut bare = Button::new("y");
    bare.fill_orientation(Orientation::Bottom);
    assert_eq!(bare.placement(), Orientation::Bottom);
    assert!(bare.fill_scope(&DefinitionScope::any()));
    assert!(!bare.fill_scope(&DefinitionScope::new()));
  }

  #[test]
  fn alias_content_counts_as_linked_content() {
    let prefix = CallbackPrefix::default();
    let mut parent = Button::new("Cancel").scope(DefinitionScope::new().with_state("form"));
    let alias = parent.alias("Stop");

    assert_eq!(parent.linked(), ["Stop".to_string()]);
    assert!(alias.ignores_state());
    assert_eq!(
      alias.definition_scope().map(ToString::to_string),
      parent.definition_scope().map(ToString::to_string)
    );

    assert!(!parent.check_content(&Event::text(1, 1, 1, "Stop"), &prefix));
    assert!(parent.check_linked_content(&Event::text(1, 1, 1, "Stop"), &prefix));
    assert!(parent.check_linked_content(&Event::text(1, 1, 1, "Cancel"), &prefix));
    let data = alias.callback_data(&prefix);
    assert!(parent.check_linked_content(&Event::callback(1, 1, "q", Some(1), data), &prefix));
    assert!(!parent.check_linked_content(&Event::text(1, 1, 1, "Quit"), &prefix));
    assert!(alias.linked().is_empty());
  }

  #[test]
  fn records_declaration_site() {
    let button = Button::new("here");
    assert!(button.declared_at().file().ends_with("button.rs"));
  }
}
