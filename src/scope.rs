use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use tracing::instrument;

use crate::error::StorageError;
use crate::event::ChatKey;
use crate::event::Event;
use crate::filter::EventFilter;
use crate::filter::Opaque;
use crate::filter::SharedFilter;
use crate::storage::StateStorage;

/// State value matching any persisted state, including none.
pub const ANY_STATE: &str = "*";

/// Conversational precondition under which a button or markup is active.
///
/// Every dimension that is set must match; unset dimensions are skipped. A scope
/// without any dimension matches every event.
#[derive(Clone, Default)]
pub struct DefinitionScope {
  commands: Option<BTreeSet<String>>,
  state: Option<String>,
  text: Option<BTreeSet<String>>,
  extra: Vec<SharedFilter>,
}

impl DefinitionScope {
  pub fn new() -> Self {
    Self::default()
  }

  /// Wildcard scope: active in every state.
  pub fn any() -> Self {
    Self::new().with_state(ANY_STATE)
  }

  pub fn with_state(mut self, state: impl Into<String>) -> Self {
    self.state = Some(state.into());
    self
  }

  /// Commands are matched case-insensitively, without the leading slash.
  pub fn with_commands<I, S>(mut self, commands: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.commands = Some(
      commands
        .into_iter()
        .map(|command| command.into().to_ascii_lowercase())
        .collect(),
    );
    self
  }

  pub fn with_text<I, S>(mut self, text: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.text = Some(text.into_iter().map(Into::into).collect());
    self
  }

  pub fn with_filter(mut self, filter: SharedFilter) -> Self {
    self.extra.push(filter);
    self
  }

  pub fn state(&self) -> Option<&str> {
    self.state.as_deref()
  }

  pub fn commands(&self) -> Option<&BTreeSet<String>> {
    self.commands.as_ref()
  }

  pub fn text(&self) -> Option<&BTreeSet<String>> {
    self.text.as_ref()
  }

  pub fn is_unconstrained(&self) -> bool {
    self.commands.is_none() && self.state.is_none() && self.text.is_none() && self.extra.is_empty()
  }

  pub async fn matches(&self, event: &Event) -> bool {
    if let Some(commands) = &self.commands {
      let Some(command) = event.command() else {
        return false;
      };
      if !commands.contains(&command.to_ascii_lowercase()) {
        return false;
      }
    }

    if let Some(state) = &self.state
      && state != ANY_STATE
      && event.state.as_deref() != Some(state.as_str())
    {
      return false;
    }

    if let Some(text) = &self.text {
      match event.content() {
        Some(content) if text.contains(content) => {},
        _ => return false,
      }
    }

    for filter in &self.extra {
      if !filter.check(event).await {
        return false;
      }
    }

    true
  }

  /// Both scopes could accept the same event. Scopes conflict only when the same
  /// dimensions are set on both and each of them overlaps. Extra predicates are opaque
  /// and do not take part.
  pub fn conflicts_with(&self, other: &Self) -> bool {
    if self.shape() != other.shape() {
      return false;
    }

    let state = match (&self.state, &other.state) {
      (Some(a), Some(b)) => a == b || a == ANY_STATE || b == ANY_STATE,
      _ => true,
    };

    state && overlaps(&self.commands, &other.commands) && overlaps(&self.text, &other.text)
  }

  /// Persists this scope's state for the conversation; a scope without a state clears it.
  #[instrument(skip(self, storage), fields(state = ?self.state))]
  pub async fn set_state(&self, storage: &dyn StateStorage, key: ChatKey) -> Result<(), StorageError> {
    match &self.state {
      Some(state) => storage.set_state(key, state).await,
      None => storage.reset_state(key).await,
    }
  }

  fn shape(&self) -> (bool, bool, bool) {
    (self.commands.is_some(), self.state.is_some(), self.text.is_some())
  }
}

#[async_trait]
impl EventFilter for DefinitionScope {
  async fn check(&self, event: &Event) -> bool {
    self.matches(event).await
  }
}

fn overlaps(a: &Option<BTreeSet<String>>, b: &Option<BTreeSet<String>>) -> bool {
  match (a, b) {
    (Some(a), Some(b)) => a == b || !a.is_disjoint(b),
    _ => true,
  }
}

impl fmt::Debug for DefinitionScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DefinitionScope")
      .field("commands", &self.commands)
      .field("state", &self.state)
      .field("text", &self.text)
      .field("extra", &Opaque(self.extra.len()))
      .finish()
  }
}

impl fmt::Display for DefinitionScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "<Scope")?;
    if let Some(state) = &self.state {
      write!(f, " state=\"{state}\"")?;
    }
    if let Some(commands) = &self.commands {
      write!(f, " commands={commands:?}")?;
    }
    if let Some(text) = &self.text {
      write!(f, " text={text:?}")?;
    }
    write!(f, ">")
  }
}

#[cfg(test)]
mod tests {
  use super::DefinitionScope;
  use crate::event::ChatKey;
  use crate::event::Event;
  use crate::filter::from_fn;
  use crate::storage::MemoryStorage;
  use crate::storage::StateStorage;

  #[tokio::test]
  async fn commands_dimension() {
    let scope = DefinitionScope::new().with_commands(["start", "ex"]);

    assert!(scope.matches(&Event::text(1, 1, 1, "/start")).await);
    assert!(scope.matches(&Event::text(1, 1, 1, "/ex")).await);
    assert!(!scope.matches(&Event::text(1, 1, 1, "/noway")).await);
    assert!(!scope.matches(&Event::text(1, 1, 1, "not command.")).await);
  }

  #[tokio::test]
  async fn commands_ignore_case() {
    let scope = DefinitionScope::new().with_commands(["Start"]);

    assert!(scope.matches(&Event::text(1, 1, 1, "/start")).await);
    assert!(scope.matches(&Event::text(1, 1, 1, "/START@my_bot")).await);
    assert!(scope.conflicts_with(&DefinitionScope::new().with_commands(["start"])));
  }

  #[tokio::test]
  async fn text_dimension() {
    let scope = DefinitionScope::new().with_text(["start", "other text."]);

    assert!(!scope.matches(&Event::text(1, 1, 1, "other text./")).await);
    assert!(!scope.matches(&Event::text(1, 1, 1, "other")).await);
    assert!(scope.matches(&Event::text(1, 1, 1, "other text.")).await);
    assert!(scope.matches(&Event::text(1, 1, 1, "start")).await);
  }

  #[tokio::test]
  async fn dimensions_combine_with_and() {
    let scope = DefinitionScope::new().with_state("A").with_commands(["x"]);

    assert!(scope.matches(&Event::text(1, 1, 1, "/x").with_state("A")).await);
    assert!(!scope.matches(&Event::text(1, 1, 1, "/x").with_state("B")).await);
    assert!(!scope.matches(&Event::text(1, 1, 1, "/y").with_state("A")).await);
    assert!(!scope.matches(&Event::text(1, 1, 1, "/x")).await);
  }

  #[tokio::test]
  async fn wildcard_state_matches_every_state() {
    let scope = DefinitionScope::any();

    assert!(scope.matches(&Event::text(1, 1, 1, "hi")).await);
    assert!(scope.matches(&Event::text(1, 1, 1, "hi").with_state("anything")).await);
  }

  #[tokio::test]
  async fn unconstrained_scope_matches_everything() {
    let scope = DefinitionScope::new();
    assert!(scope.is_unconstrained());
    assert!(scope.matches(&Event::callback(1, 1, "q", None, "data")).await);
  }

  #[tokio::test]
  async fn extra_predicates_must_all_pass() {
    let scope = DefinitionScope::new()
      .with_filter(from_fn(|event| event.chat_id == 7))
      .with_filter(from_fn(|event| event.user_id == 8));

    assert!(scope.matches(&Event::text(7, 8, 1, "hi")).await);
    assert!(!scope.matches(&Event::text(7, 9, 1, "hi")).await);
  }

  #[test]
  fn conflict_detection_is_symmetric() {
    let scopes = [
      DefinitionScope::new().with_state("step1"),
      DefinitionScope::new().with_state("step2"),
      DefinitionScope::any(),
      DefinitionScope::new().with_commands(["a", "b"]),
      DefinitionScope::new().with_commands(["b", "c"]),
      DefinitionScope::new().with_state("step1").with_text(["x"]),
      DefinitionScope::new(),
    ];

    for a in &scopes {
      for b in &scopes {
        assert_eq!(a.conflicts_with(b), b.conflicts_with(a), "{a} vs {b}");
      }
    }
  }

  #[test]
  fn conflicts_need_overlap_on_every_dimension() {
    let step1 = DefinitionScope::new().with_state("step1");
    let step2 = DefinitionScope::new().with_state("step2");
    assert!(step1.conflicts_with(&step1.clone()));
    assert!(!step1.conflicts_with(&step2));
    assert!(step1.conflicts_with(&DefinitionScope::any()));

    let ab = DefinitionScope::new().with_commands(["a", "b"]);
    let bc = DefinitionScope::new().with_commands(["b", "c"]);
    let cd = DefinitionScope::new().with_commands(["c", "d"]);
    assert!(ab.conflicts_with(&bc));
    assert!(!ab.conflicts_with(&cd));

    let state_and_text = DefinitionScope::new().with_state("step1").with_text(["x"]);
    let state_and_other_text = DefinitionScope::new().with_state("step1").with_text(["y"]);
    assert!(!state_and_text.conflicts_with(&state_and_other_text));
  }

  #[test]
  fn different_shapes_never_conflict() {
    let by_state = DefinitionScope::new().with_state("A");
    let by_command = DefinitionScope::new().with_commands(["start"]);
    assert!(!by_state.conflicts_with(&by_command));
    assert!(!by_state.conflicts_with(&DefinitionScope::new()));
  }

  #[tokio::test]
  async fn set_state_persists_or_clears() {
    let storage = MemoryStorage::new();
    let key = ChatKey::new(1, 2);

    DefinitionScope::new().with_state("menu").set_state(&storage, key).await.unwrap();
    assert_eq!(storage.get_state(key).await.unwrap().as_deref(), Some("menu"));

    DefinitionScope::new().set_state(&storage, key).await.unwrap();
    assert_eq!(storage.get_state(key).await.unwrap(), None);
  }

  #[test]
  fn display_names_dimensions() {
    let scope = DefinitionScope::new().with_state("menu").with_commands(["start"]);
    assert_eq!(scope.to_string(), "<Scope state=\"menu\" commands={\"start\"}>");
  }
}
