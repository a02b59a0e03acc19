use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::context::Keyboards;
use crate::event::Event;
use crate::meta::DialogMeta;

pub type HandlerResult = anyhow::Result<()>;

/// Route callback receiving the raw event.
pub type EventHandler = Arc<dyn Fn(Keyboards, Event) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// User handler receiving the resolved [`DialogMeta`].
pub type MetaHandler = Arc<dyn Fn(Keyboards, DialogMeta) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

pub fn on_event<F, Fut>(handler: F) -> EventHandler
where
  F: Fn(Keyboards, Event) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = HandlerResult> + Send + 'static,
{
  Arc::new(move |ctx, event| handler(ctx, event).boxed())
}

pub fn on_meta<F, Fut>(handler: F) -> MetaHandler
where
  F: Fn(Keyboards, DialogMeta) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = HandlerResult> + Send + 'static,
{
  Arc::new(move |ctx, meta| handler(ctx, meta).boxed())
}
