use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::event::Event;

/// Predicate over an incoming event. Extra scope predicates and router routes use it.
#[async_trait]
pub trait EventFilter: Send + Sync {
  async fn check(&self, event: &Event) -> bool;
}

pub type SharedFilter = Arc<dyn EventFilter>;

struct FnFilter<F>(F);

#[async_trait]
impl<F> EventFilter for FnFilter<F>
where
  F: Fn(&Event) -> bool + Send + Sync,
{
  async fn check(&self, event: &Event) -> bool {
    (self.0)(event)
  }
}

/// Wraps a synchronous closure.
pub fn from_fn<F>(predicate: F) -> SharedFilter
where
  F: Fn(&Event) -> bool + Send + Sync + 'static,
{
  Arc::new(FnFilter(predicate))
}

pub fn accept() -> SharedFilter {
  from_fn(|_| true)
}

struct AnyOf(Vec<SharedFilter>);

#[async_trait]
impl EventFilter for AnyOf {
  async fn check(&self, event: &Event) -> bool {
    for filter in &self.0 {
      if filter.check(event).await {
        return true;
      }
    }
    false
  }
}

struct AllOf(Vec<SharedFilter>);

#[async_trait]
impl EventFilter for AllOf {
  async fn check(&self, event: &Event) -> bool {
    for filter in &self.0 {
      if !filter.check(event).await {
        return false;
      }
    }
    true
  }
}

/// OR over `filters`; empty means nothing passes.
pub fn any_of(filters: Vec<SharedFilter>) -> SharedFilter {
  Arc::new(AnyOf(filters))
}

/// AND over `filters`; empty means everything passes.
pub fn all_of(filters: Vec<SharedFilter>) -> SharedFilter {
  Arc::new(AllOf(filters))
}

pub(crate) struct Opaque(pub(crate) usize);

impl fmt::Debug for Opaque {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "<{} predicate(s)>", self.0)
  }
}
