use thiserror::Error;

use crate::button::ButtonId;
use crate::transport::TransportError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Storage(#[from] StorageError),
  #[error(transparent)]
  Transport(#[from] TransportError),
  #[error("keyboards are not configured: {0}")]
  Configuration(String),
  #[error("expected {expected}, got {found}")]
  TypeMismatch { expected: &'static str, found: String },
  #[error("content `{content}` conflicts at definition scope {scope}")]
  ScopeConflict { content: String, scope: String },
  #[error("callback prefix must end with a colon, got `{0}`")]
  InvalidCallbackPrefix(String),
  #[error("dialog `{0}` is not finished")]
  DialogNotFinished(String),
  #[error("dialog `{0}` has no steps")]
  EmptyDialog(String),
  #[error("button {0} is not registered")]
  UnknownButton(ButtonId),
}

#[derive(Debug, Error)]
pub enum StorageError {
  #[error(transparent)]
  Sqlx(#[from] sqlx::Error),
  #[error(transparent)]
  Migrate(#[from] sqlx::migrate::MigrateError),
  #[error("storage backend failed: {0}")]
  Backend(String),
}

/// Raised by a dialog converter when the input does not fit the step.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConvertError {
  #[error("input has no content")]
  Missing,
  #[error("invalid {expected}: `{input}`")]
  Invalid { expected: &'static str, input: String },
}
