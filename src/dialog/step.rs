use std::collections::HashMap;
use std::sync::Arc;

use crate::button::Button;
use crate::button::ButtonId;
use crate::dialog::convert::Converter;
use crate::dialog::convert::SharedConverter;
use crate::markup::Markup;
use crate::markup::MarkupBuilder;

/// What a step shows when it becomes current.
#[derive(Clone)]
pub enum Prompt {
  /// Plain text without a keyboard.
  Text(String),
  Markup(MarkupBuilder),
}

impl From<&str> for Prompt {
  fn from(text: &str) -> Self {
    Self::Text(text.to_string())
  }
}

impl From<String> for Prompt {
  fn from(text: String) -> Self {
    Self::Text(text)
  }
}

impl From<MarkupBuilder> for Prompt {
  fn from(builder: MarkupBuilder) -> Self {
    Self::Markup(builder)
  }
}

/// Navigation triggered by a step's action buttons instead of converting input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
  /// Store [`StepValue::Skipped`](crate::dialog::StepValue::Skipped) and move on.
  Skip,
  /// Show the previous step again.
  Back,
}

/// Declaration of one dialog step.
#[derive(Clone)]
pub struct Step {
  pub(crate) name: String,
  pub(crate) prompt: Prompt,
  pub(crate) converter: SharedConverter,
  pub(crate) actions: Vec<(Button, StepAction)>,
}

impl Step {
  pub fn new(name: impl Into<String>, prompt: impl Into<Prompt>, converter: impl Converter + 'static) -> Self {
    Self::with_converter(name, prompt, Arc::new(converter))
  }

  pub fn with_converter(name: impl Into<String>, prompt: impl Into<Prompt>, converter: SharedConverter) -> Self {
    Self {
      name: name.into(),
      prompt: prompt.into(),
      converter,
      actions: Vec::new(),
    }
  }

  pub fn skip_button(self, button: Button) -> Self {
    self.action(button, StepAction::Skip)
  }

  pub fn back_button(self, button: Button) -> Self {
    self.action(button, StepAction::Back)
  }

  pub fn action(mut self, button: Button, action: StepAction) -> Self {
    self.actions.push((button, action));
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Prompt builder with the action buttons appended and state resets disabled: a
  /// button pressed inside a dialog must not clear the step's state.
  pub(crate) fn prompt_builder(&self) -> MarkupBuilder {
    let builder = match &self.prompt {
      Prompt::Text(text) => MarkupBuilder::new(self.name.clone()).text(text.clone()),
      Prompt::Markup(builder) => builder.clone(),
    };
    builder.map_buttons(|button| button.force_ignore_state(false))
  }
}

/// A built step: its prompt is registered and scoped to the step's state tag.
pub struct DialogState {
  pub(crate) name: String,
  pub(crate) tag: String,
  pub(crate) markup: Markup,
  pub(crate) converter: SharedConverter,
  pub(crate) actions: HashMap<ButtonId, StepAction>,
}

impl DialogState {
  pub fn name(&self) -> &str {
    &self.name
  }

  /// FSM state persisted while this step waits for input.
  pub fn tag(&self) -> &str {
    &self.tag
  }

  pub fn markup(&self) -> &Markup {
    &self.markup
  }

  pub(crate) fn action_for(&self, button: Option<ButtonId>) -> Option<StepAction> {
    button.and_then(|id| self.actions.get(&id).copied())
  }
}
