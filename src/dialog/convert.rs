use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ConvertError;
use crate::event::Attachment;
use crate::event::Event;
use crate::meta::DialogMeta;

/// Value accepted by a dialog step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StepValue {
  /// The step was skipped through its skip button.
  Skipped,
  Text(String),
  Integer(i64),
  Float(f64),
  Photo(String),
  Document(String),
}

impl StepValue {
  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Text(text) => Some(text),
      _ => None,
    }
  }

  pub fn as_integer(&self) -> Option<i64> {
    match self {
      Self::Integer(value) => Some(*value),
      _ => None,
    }
  }

  pub fn as_float(&self) -> Option<f64> {
    match self {
      Self::Float(value) => Some(*value),
      Self::Integer(value) => Some(*value as f64),
      _ => None,
    }
  }

  pub fn is_skipped(&self) -> bool {
    matches!(self, Self::Skipped)
  }
}

impl fmt::Display for StepValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Skipped => write!(f, "<skipped>"),
      Self::Text(text) => write!(f, "{text}"),
      Self::Integer(value) => write!(f, "{value}"),
      Self::Float(value) => write!(f, "{value}"),
      Self::Photo(file_id) => write!(f, "<photo {file_id}>"),
      Self::Document(file_id) => write!(f, "<document {file_id}>"),
    }
  }
}

/// Turns the input of a dialog step into its value. An error makes the dialog show
/// the same step again.
pub trait Converter: Send + Sync {
  fn convert(&self, meta: &DialogMeta) -> Result<StepValue, ConvertError>;
}

pub type SharedConverter = Arc<dyn Converter>;

struct FnConverter<F>(F);

impl<F> Converter for FnConverter<F>
where
  F: Fn(&DialogMeta) -> Result<StepValue, ConvertError> + Send + Sync,
{
  fn convert(&self, meta: &DialogMeta) -> Result<StepValue, ConvertError> {
    (self.0)(meta)
  }
}

pub fn from_fn<F>(convert: F) -> SharedConverter
where
  F: Fn(&DialogMeta) -> Result<StepValue, ConvertError> + Send + Sync + 'static,
{
  Arc::new(FnConverter(convert))
}

fn content(meta: &DialogMeta) -> Result<&str, ConvertError> {
  meta.content.as_deref().ok_or(ConvertError::Missing)
}

fn attachment(meta: &DialogMeta) -> Option<&Attachment> {
  meta.source.as_ref().and_then(Event::attachment)
}

/// Message text or callback payload as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Text;

impl Converter for Text {
  fn convert(&self, meta: &DialogMeta) -> Result<StepValue, ConvertError> {
    content(meta).map(|text| StepValue::Text(text.to_string()))
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Integer;

impl Converter for Integer {
  fn convert(&self, meta: &DialogMeta) -> Result<StepValue, ConvertError> {
    let input = content(meta)?;
    input
      .trim()
      .parse()
      .map(StepValue::Integer)
      .map_err(|_| ConvertError::Invalid {
        expected: "integer",
        input: input.to_string(),
      })
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Float;

impl Converter for Float {
  fn convert(&self, meta: &DialogMeta) -> Result<StepValue, ConvertError> {
    let input = content(meta)?;
    input
      .trim()
      .parse::<f64>()
      .ok()
      .filter(|value| value.is_finite())
      .map(StepValue::Float)
      .ok_or_else(|| ConvertError::Invalid {
        expected: "number",
        input: input.to_string(),
      })
  }
}

/// File id of a sent photo.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhotoId;

impl Converter for PhotoId {
  fn convert(&self, meta: &DialogMeta) -> Result<StepValue, ConvertError> {
    match attachment(meta) {
      Some(Attachment::Photo { file_id }) => Ok(StepValue::Photo(file_id.clone())),
      _ => Err(ConvertError::Invalid {
        expected: "photo",
        input: meta.content.clone().unwrap_or_default(),
      }),
    }
  }
}

/// File id of a sent document.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentId;

impl Converter for DocumentId {
  fn convert(&self, meta: &DialogMeta) -> Result<StepValue, ConvertError> {
    match attachment(meta) {
      Some(Attachment::Document { file_id }) => Ok(StepValue::Document(file_id.clone())),
      _ => Err(ConvertError::Invalid {
        expected: "document",
        input: meta.content.clone().unwrap_or_default(),
      }),
    }
  }
}
