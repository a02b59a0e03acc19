//! Declarative keyboards and multi-step dialogs on top of a teloxide bot.
//!
//! Buttons are registered in a [`Registry`] under the hash of their text, so callback
//! data sent by a previous process still resolves after a restart. A [`DefinitionScope`]
//! picks the right button when several share the same text.

pub mod bot;
pub mod button;
pub mod config;
pub mod context;
pub mod db;
pub mod dialog;
pub mod error;
pub mod event;
pub mod filter;
pub mod handler;
pub mod hash;
pub mod markup;
pub mod meta;
pub mod registry;
pub mod router;
pub mod scope;
pub mod storage;
pub mod telemetry;
pub mod transport;
pub mod validator;

#[cfg(test)]
mod testing;

pub use button::Button;
pub use button::ButtonId;
pub use button::CallbackPrefix;
pub use button::Orientation;
pub use context::Keyboards;
pub use dialog::Dialog;
pub use dialog::DialogBuilder;
pub use dialog::Step;
pub use error::Error;
pub use event::ChatKey;
pub use event::Event;
pub use markup::Markup;
pub use markup::MarkupBuilder;
pub use meta::DialogMeta;
pub use registry::ConflictPolicy;
pub use registry::Registry;
pub use scope::DefinitionScope;
