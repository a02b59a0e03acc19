use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::event::Event;
use crate::meta::DialogMeta;

static INTEGER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));
static FLOAT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(?:\.\d+)?$").expect("valid regex"));

/// Content acceptance predicate for buttons and markup behaviours.
#[async_trait]
pub trait Validator: Send + Sync {
  async fn validate(&self, meta: &DialogMeta) -> bool;
}

pub type SharedValidator = Arc<dyn Validator>;

struct FnValidator<F>(F);

#[async_trait]
impl<F> Validator for FnValidator<F>
where
  F: Fn(&DialogMeta) -> bool + Send + Sync,
{
  async fn validate(&self, meta: &DialogMeta) -> bool {
    (self.0)(meta)
  }
}

pub fn from_fn<F>(predicate: F) -> SharedValidator
where
  F: Fn(&DialogMeta) -> bool + Send + Sync + 'static,
{
  Arc::new(FnValidator(predicate))
}

/// Accepts one of a fixed set of literals, or, with an empty set, any non-empty text.
#[derive(Debug, Clone, Default)]
pub struct StringValidator {
  literals: BTreeSet<String>,
}

impl StringValidator {
  pub fn any() -> Self {
    Self::default()
  }

  pub fn one_of<I, S>(literals: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      literals: literals.into_iter().map(Into::into).collect(),
    }
  }

  fn accepts(&self, meta: &DialogMeta, shape: impl Fn(&str) -> bool) -> bool {
    let Some(content) = meta.content.as_deref() else {
      return false;
    };
    if !self.literals.is_empty() {
      return self.literals.contains(content);
    }
    // A message with an attachment is not plain text even when captioned.
    let is_text = meta.source.as_ref().and_then(Event::attachment).is_none();
    is_text && shape(content)
  }
}

#[async_trait]
impl Validator for StringValidator {
  async fn validate(&self, meta: &DialogMeta) -> bool {
    self.accepts(meta, |content| !content.is_empty())
  }
}

/// Accepts unsigned integers, or one of the given numbers.
#[derive(Debug, Clone, Default)]
pub struct IntegerValidator {
  inner: StringValidator,
}

impl IntegerValidator {
  pub fn any() -> Self {
    Self::default()
  }

  pub fn one_of<I>(numbers: I) -> Self
  where
    I: IntoIterator<Item = i64>,
  {
    Self {
      inner: StringValidator::one_of(numbers.into_iter().map(|n| n.to_string())),
    }
  }
}

#[async_trait]
impl Validator for IntegerValidator {
  async fn validate(&self, meta: &DialogMeta) -> bool {
    self.inner.accepts(meta, |content| INTEGER_PATTERN.is_match(content))
  }
}

/// Accepts unsigned decimals such as `3` or `2.50`, or one of the given literals.
#[derive(Debug, Clone, Default)]
pub struct FloatValidator {
  inner: StringValidator,
}

impl FloatValidator {
  pub fn any() -> Self {
    Self::default()
  }

  pub fn one_of<I, S>(literals: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      inner: StringValidator::one_of(literals),
    }
  }
}

#[async_trait]
impl Validator for FloatValidator {
  async fn validate(&self, meta: &DialogMeta) -> bool {
    self.inner.accepts(meta, |content| FLOAT_PATTERN.is_match(content))
  }
}
