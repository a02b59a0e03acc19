use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::button::Button;
use crate::button::ButtonId;
use crate::button::CallbackPrefix;
use crate::button::decode_callback_data;
use crate::error::Error;
use crate::event::Event;
use crate::event::EventKind;
use crate::hash::HexDigest;
use crate::hash::content_hash;
use crate::meta::DialogMeta;
use crate::scope::DefinitionScope;

/// What registration does when two same-content buttons have conflicting scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
  #[default]
  Warn,
  Deny,
}

impl FromStr for ConflictPolicy {
  type Err = String;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    match raw.trim().to_ascii_lowercase().as_str() {
      "warn" => Ok(Self::Warn),
      "deny" => Ok(Self::Deny),
      other => Err(format!("unknown conflict policy `{other}`")),
    }
  }
}

#[derive(Default)]
struct Inner {
  slots: Vec<Option<Arc<Button>>>,
  buckets: HashMap<HexDigest, Vec<ButtonId>>,
}

impl Inner {
  fn live(&self, id: ButtonId) -> Option<&Arc<Button>> {
    self.slots.get(id.0).and_then(Option::as_ref)
  }

  fn bucket(&self, digest: &HexDigest) -> Vec<Arc<Button>> {
    self
      .buckets
      .get(digest)
      .map(|ids| ids.iter().filter_map(|id| self.live(*id).cloned()).collect())
      .unwrap_or_default()
  }

  /// First other member of the button's bucket whose scope conflicts with it.
  fn find_conflict(&self, button: &Button) -> Option<Arc<Button>> {
    let scope = button.definition_scope()?;
    self
      .bucket(&button.content_hash())
      .into_iter()
      .filter(|other| other.id() != button.id())
      .find(|other| other.definition_scope().is_some_and(|theirs| scope.conflicts_with(theirs)))
  }
}

/// Directory of every live button, bucketed by content hash.
///
/// Buttons live in an arena addressed by [`ButtonId`]; updates swap the stored `Arc`, so
/// readers always see a consistent snapshot. Registration happens while keyboards are
/// declared and is not expected to race with traffic.
pub struct Registry {
  prefix: CallbackPrefix,
  policy: ConflictPolicy,
  inner: RwLock<Inner>,
}

impl Default for Registry {
  fn default() -> Self {
    Self::new(CallbackPrefix::default(), ConflictPolicy::default())
  }
}

impl Registry {
  pub fn new(prefix: CallbackPrefix, policy: ConflictPolicy) -> Self {
    Self {
      prefix,
      policy,
      inner: RwLock::new(Inner::default()),
    }
  }

  pub fn prefix(&self) -> &CallbackPrefix {
    &self.prefix
  }

  pub fn policy(&self) -> ConflictPolicy {
    self.policy
  }

  fn read(&self) -> RwLockReadGuard<'_, Inner> {
    self.inner.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, Inner> {
    self.inner.write().unwrap_or_else(PoisonError::into_inner)
  }

  /// Adds `button` to the bucket of its content hash. Registering a button that is
  /// already live returns its existing handle.
  pub fn register(&self, mut button: Button) -> Result<ButtonId, Error> {
    let mut inner = self.write();
    if let Some(id) = button.id()
      && inner.live(id).is_some()
    {
      return Ok(id);
    }

    let id = ButtonId(inner.slots.len());
    button.id = Some(id);
    self.check_conflicts(&inner, &button)?;

    let digest = button.content_hash();
    inner.slots.push(Some(Arc::new(button)));
    inner.buckets.entry(digest).or_default().push(id);
    Ok(id)
  }

  /// Removes the button from its bucket. Its handle stays dead afterwards.
  pub fn unregister(&self, id: ButtonId) -> Option<Arc<Button>> {
    let mut inner = self.write();
    let button = inner.slots.get_mut(id.0).and_then(Option::take)?;
    let digest = button.content_hash();
    if let Some(bucket) = inner.buckets.get_mut(&digest) {
      bucket.retain(|member| *member != id);
      if bucket.is_empty() {
        inner.buckets.remove(&digest);
      }
    }
    Some(button)
  }

  pub fn get(&self, id: ButtonId) -> Option<Arc<Button>> {
    self.read().live(id).cloned()
  }

  /// Live buttons among `ids`, in the given order.
  pub fn get_many(&self, ids: &[ButtonId]) -> Vec<Arc<Button>> {
    let inner = self.read();
    ids.iter().filter_map(|id| inner.live(*id).cloned()).collect()
  }

  /// Same-content buttons in registration order.
  pub fn bucket(&self, digest: &HexDigest) -> Vec<Arc<Button>> {
    self.read().bucket(digest)
  }

  pub fn len(&self) -> usize {
    self.read().slots.iter().flatten().count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Re-assigns a button's scope and re-runs conflict detection for it.
  pub fn set_scope(&self, id: ButtonId, scope: DefinitionScope) -> Result<Arc<Button>, Error> {
    self.update(id, |button| *button = button.clone().scope(scope))
  }

  pub(crate) fn update<F>(&self, id: ButtonId, change: F) -> Result<Arc<Button>, Error>
  where
    F: FnOnce(&mut Button),
  {
    let mut inner = self.write();
    let current = inner.live(id).ok_or(Error::UnknownButton(id))?;
    let mut button = Button::clone(current);
    let scope_before = button.definition_scope().map(ToString::to_string);
    change(&mut button);
    if button.definition_scope().map(ToString::to_string) != scope_before {
      self.check_conflicts(&inner, &button)?;
    }

    let button = Arc::new(button);
    inner.slots[id.0] = Some(button.clone());
    Ok(button)
  }

  fn check_conflicts(&self, inner: &Inner, button: &Button) -> Result<(), Error> {
    let Some(other) = inner.find_conflict(button) else {
      return Ok(());
    };
    let scope = other.definition_scope().map(ToString::to_string).unwrap_or_default();
    let content = button.text().unwrap_or("<abstract>").to_string();
    match self.policy {
      ConflictPolicy::Warn => {
        warn!(
          content = %content,
          scope = %scope,
          button = ?button.id(),
          conflicts_with = ?other.id(),
          declared_at = %button.declared_at(),
          other_declared_at = %other.declared_at(),
          "definition scope conflict"
        );
        Ok(())
      },
      ConflictPolicy::Deny => Err(Error::ScopeConflict { content, scope }),
    }
  }

  /// Hash key an event points at: the hash of message text, or the digest carried in
  /// callback data.
  pub fn lookup_key(&self, event: &Event) -> Option<HexDigest> {
    let digest = match &event.kind {
      EventKind::Message { text, .. } => text.as_deref().map(|text| content_hash(Some(text))),
      EventKind::Callback { data, .. } => data.as_deref().and_then(decode_callback_data),
    };
    digest.filter(|digest| !digest.is_null())
  }

  /// Maps an event back to the button that produced it.
  ///
  /// Same-content buttons are narrowed by hash, then the first (in registration order)
  /// whose scope matches wins. Content nobody registered falls back to global buttons
  /// whose validator accepts the event.
  pub async fn resolve(&self, event: &Event) -> Option<Arc<Button>> {
    let bucket = self.lookup_key(event).map(|digest| self.bucket(&digest)).unwrap_or_default();
    if bucket.is_empty() {
      return self.search_global(event).await;
    }

    for button in bucket {
      if scope_matches(&button, event).await {
        return Some(button);
      }
    }
    debug!(chat_id = event.chat_id, state = ?event.state, "no button scope matched");
    None
  }

  async fn search_global(&self, event: &Event) -> Option<Arc<Button>> {
    let globals: Vec<Arc<Button>> = self
      .read()
      .slots
      .iter()
      .flatten()
      .filter(|button| button.is_global() && button.content_validator().is_some())
      .cloned()
      .collect();
    if globals.is_empty() {
      return None;
    }

    let meta = DialogMeta::from_event(event, None);
    for button in globals {
      let Some(validator) = button.content_validator() else {
        continue;
      };
      if validator.validate(&meta).await && scope_matches(&button, event).await {
        return Some(button);
      }
    }
    None
  }
}

async fn scope_matches(button: &Button, event: &Event) -> bool {
  match button.definition_scope() {
    Some(scope) => scope.matches(event).await,
    None => true,
  }
}
