use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::event::Event;
use crate::filter::SharedFilter;
use crate::handler::EventHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
  Message,
  Callback,
}

impl RouteKind {
  fn accepts(self, event: &Event) -> bool {
    match self {
      Self::Message => !event.is_callback(),
      Self::Callback => event.is_callback(),
    }
  }
}

#[derive(Clone)]
struct Route {
  id: HandlerId,
  kind: RouteKind,
  filter: SharedFilter,
  handler: EventHandler,
}

/// Handler table. Routes are tried in registration order; the first whose filter
/// passes handles the event.
#[derive(Default)]
pub struct Router {
  routes: RwLock<Vec<Route>>,
  next_id: AtomicU64,
}

impl Router {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&self, kind: RouteKind, filter: SharedFilter, handler: EventHandler) -> HandlerId {
    let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
    self
      .routes
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .push(Route {
        id,
        kind,
        filter,
        handler,
      });
    id
  }

  pub fn register_text_handler(&self, filter: SharedFilter, handler: EventHandler) -> HandlerId {
    self.register(RouteKind::Message, filter, handler)
  }

  pub fn register_callback_handler(&self, filter: SharedFilter, handler: EventHandler) -> HandlerId {
    self.register(RouteKind::Callback, filter, handler)
  }

  /// Registers the same filter and handler for messages and callbacks.
  pub fn register_both(&self, filter: SharedFilter, handler: EventHandler) -> [HandlerId; 2] {
    [
      self.register_text_handler(filter.clone(), handler.clone()),
      self.register_callback_handler(filter, handler),
    ]
  }

  pub fn unregister(&self, id: HandlerId) -> bool {
    let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
    let before = routes.len();
    routes.retain(|route| route.id != id);
    routes.len() != before
  }

  pub fn len(&self) -> usize {
    self.routes.read().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Handler of the first route accepting `event`.
  pub async fn select(&self, event: &Event) -> Option<EventHandler> {
    let candidates: Vec<Route> = self
      .routes
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .filter(|route| route.kind.accepts(event))
      .cloned()
      .collect();

    for route in candidates {
      if route.filter.check(event).await {
        return Some(route.handler);
      }
    }
    None
  }
}
