use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use chrono::DateTime;
use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::instrument;

use crate::context::Keyboards;
use crate::error::Error;
use crate::event::ChatKey;
use crate::event::Event;
use crate::filter::SharedFilter;
use crate::filter::all_of;
use crate::filter::from_fn;
use crate::handler::HandlerResult;
use crate::handler::on_event;
use crate::hash::HexDigest;
use crate::hash::content_hash;
use crate::hash::hash_parts;
use crate::meta::DialogMeta;
use crate::router::HandlerId;
use crate::scope::DefinitionScope;

pub mod convert;
mod step;

pub use convert::Converter;
pub use convert::DocumentId;
pub use convert::Float;
pub use convert::Integer;
pub use convert::PhotoId;
pub use convert::SharedConverter;
pub use convert::StepValue;
pub use convert::Text;
pub use step::DialogState;
pub use step::Prompt;
pub use step::Step;
pub use step::StepAction;

/// Called once with the collected values when a run completes.
pub type FinishHandler = Arc<dyn Fn(Keyboards, DialogResult) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

pub fn on_finish<F, Fut>(handler: F) -> FinishHandler
where
  F: Fn(Keyboards, DialogResult) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = HandlerResult> + Send + 'static,
{
  Arc::new(move |ctx, result| handler(ctx, result).boxed())
}

/// Values collected by a finished run, keyed by step name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialogResult {
  pub dialog: String,
  pub key: ChatKey,
  pub values: BTreeMap<String, StepValue>,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
}

impl DialogResult {
  pub fn get(&self, step: &str) -> Option<&StepValue> {
    self.values.get(step)
  }
}

/// Progress of one conversation through a dialog.
pub struct DialogRun {
  key: ChatKey,
  index: usize,
  values: HashMap<String, StepValue>,
  handlers: Vec<HandlerId>,
  on_finish: FinishHandler,
  started_at: DateTime<Utc>,
  finished_at: Option<DateTime<Utc>>,
}

impl DialogRun {
  fn new(key: ChatKey, on_finish: FinishHandler) -> Self {
    Self {
      key,
      index: 0,
      values: HashMap::new(),
      handlers: Vec::new(),
      on_finish,
      started_at: Utc::now(),
      finished_at: None,
    }
  }

  pub fn key(&self) -> ChatKey {
    self.key
  }

  pub fn index(&self) -> usize {
    self.index
  }

  pub fn value(&self, step: &str) -> Option<&StepValue> {
    self.values.get(step)
  }

  pub fn is_finished(&self) -> bool {
    self.finished_at.is_some()
  }

  pub fn to_result(&self, dialog: &str) -> Result<DialogResult, Error> {
    let finished_at = self
      .finished_at
      .ok_or_else(|| Error::DialogNotFinished(dialog.to_string()))?;
    Ok(DialogResult {
      dialog: dialog.to_string(),
      key: self.key,
      values: self.values.iter().map(|(name, value)| (name.clone(), value.clone())).collect(),
      started_at: self.started_at,
      finished_at,
    })
  }
}

/// What a step event did to its run.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogOutcome {
  /// No run is waiting on this step for the conversation.
  Ignored,
  Advanced { index: usize },
  /// The input did not convert; the same step was shown again.
  Rejected { index: usize },
  SteppedBack { index: usize },
  Finished(DialogResult),
}

pub struct DialogBuilder {
  name: String,
  steps: Vec<Step>,
}

impl DialogBuilder {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      steps: Vec::new(),
    }
  }

  pub fn step(mut self, step: Step) -> Self {
    self.steps.push(step);
    self
  }

  /// Identity of the dialog, derived from its name, step names and prompt buttons.
  fn dialog_hash(&self) -> HexDigest {
    let mut parts = vec!["dialog:".to_string(), self.name.clone()];
    for step in &self.steps {
      parts.push(step.name.clone());
      let prompt = step.prompt_builder();
      let buttons = prompt
        .declared_buttons()
        .iter()
        .chain(step.actions.iter().map(|(button, _)| button));
      parts.extend(buttons.map(|button| button.content_hash().to_string()));
    }
    hash_parts(parts)
  }

  pub fn build(self, ctx: &Keyboards) -> Result<Arc<Dialog>, Error> {
    if self.steps.is_empty() {
      return Err(Error::EmptyDialog(self.name));
    }
    let mut seen = HashSet::new();
    if let Some(step) = self.steps.iter().find(|step| !seen.insert(step.name.as_str())) {
      return Err(Error::Configuration(format!(
        "dialog `{}` declares step `{}` twice",
        self.name, step.name
      )));
    }

    let dialog_hash = self.dialog_hash();
    let mut states = Vec::with_capacity(self.steps.len());
    for step in &self.steps {
      let step_hash = content_hash(Some(format!("::state-{}::", step.name).as_str()));
      let tag = hash_parts([dialog_hash.as_str(), step_hash.as_str()]).to_string();

      let mut markup = step
        .prompt_builder()
        .scope(DefinitionScope::new().with_state(tag.clone()))
        .build(ctx)?;
      let mut actions = HashMap::new();
      for (button, action) in &step.actions {
        let mut button = button.clone();
        button.force_ignore_state(false);
        actions.insert(markup.append(button)?, *action);
      }

      states.push(DialogState {
        name: step.name.clone(),
        tag,
        markup,
        converter: step.converter.clone(),
        actions,
      });
    }

    Ok(Arc::new(Dialog {
      name: self.name,
      hash: dialog_hash,
      states,
      runs: Mutex::new(HashMap::new()),
    }))
  }
}

type SharedRun = Arc<tokio::sync::Mutex<DialogRun>>;

/// A sequential input flow. Each conversation walking through it gets its own
/// [`DialogRun`]; runs never share values.
pub struct Dialog {
  name: String,
  hash: HexDigest,
  states: Vec<DialogState>,
  runs: Mutex<HashMap<ChatKey, SharedRun>>,
}

impl Dialog {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn hash(&self) -> &HexDigest {
    &self.hash
  }

  pub fn states(&self) -> &[DialogState] {
    &self.states
  }

  fn run(&self, key: ChatKey) -> Option<SharedRun> {
    self.runs.lock().unwrap_or_else(PoisonError::into_inner).get(&key).cloned()
  }

  fn take_run(&self, key: ChatKey) -> Option<SharedRun> {
    self.runs.lock().unwrap_or_else(PoisonError::into_inner).remove(&key)
  }

  /// Index of the step the conversation is waiting on.
  pub async fn current_step(&self, key: ChatKey) -> Option<usize> {
    let run = self.run(key)?;
    let run = run.lock().await;
    Some(run.index)
  }

  /// Value the conversation gave for `step` so far.
  pub async fn value(&self, key: ChatKey, step: &str) -> Option<StepValue> {
    let run = self.run(key)?;
    let run = run.lock().await;
    run.value(step).cloned()
  }

  /// Starts (or restarts) the dialog for `key` and shows the first prompt.
  #[instrument(skip(self, ctx, on_finish), fields(dialog = %self.name, chat_id = key.chat_id, user_id = key.user_id))]
  pub async fn start(self: &Arc<Self>, ctx: &Keyboards, key: ChatKey, on_finish: FinishHandler) -> Result<(), Error> {
    let mut run = DialogRun::new(key, on_finish);
    for (index, state) in self.states.iter().enumerate() {
      let filter = all_of(vec![
        from_fn(move |event: &Event| event.key() == key),
        Arc::new(state.markup.definition_scope().clone()) as SharedFilter,
      ]);
      let dialog = self.clone();
      let handler = on_event(move |ctx, event| {
        let dialog = dialog.clone();
        async move {
          dialog.handle_step(&ctx, index, event).await?;
          Ok(())
        }
      });
      run.handlers.extend(ctx.router().register_both(filter, handler));
    }

    let run = Arc::new(tokio::sync::Mutex::new(run));
    let previous = self
      .runs
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(key, run.clone());
    if let Some(previous) = previous {
      debug!("restarting dialog, dropping previous run");
      release(ctx, &previous.lock().await.handlers);
    }

    if let Err(err) = self.states[0].markup.process(ctx, &DialogMeta::for_chat(key), None).await {
      self.discard_run(ctx, key, &run).await;
      return Err(err);
    }
    info!("dialog started");
    Ok(())
  }

  /// Removes `run` if it is still the conversation's current run and drops its routes.
  async fn discard_run(&self, ctx: &Keyboards, key: ChatKey, run: &SharedRun) {
    {
      let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
      if runs.get(&key).is_some_and(|current| Arc::ptr_eq(current, run)) {
        runs.remove(&key);
      }
    }
    release(ctx, &run.lock().await.handlers);
  }

  /// Registers a handler starting the dialog for whichever conversation passes `origin`.
  pub fn entry_point(self: &Arc<Self>, ctx: &Keyboards, origin: SharedFilter, on_finish: FinishHandler) -> [HandlerId; 2] {
    let dialog = self.clone();
    ctx.router().register_both(
      origin,
      on_event(move |ctx, event| {
        let dialog = dialog.clone();
        let on_finish = on_finish.clone();
        async move {
          dialog.start(&ctx, event.key(), on_finish).await?;
          Ok(())
        }
      }),
    )
  }

  /// Feeds an event routed to step `index` into the conversation's run.
  #[instrument(skip(self, ctx, event), fields(dialog = %self.name, chat_id = event.chat_id, user_id = event.user_id))]
  pub async fn handle_step(&self, ctx: &Keyboards, index: usize, event: Event) -> anyhow::Result<DialogOutcome> {
    let key = event.key();
    let Some(shared) = self.run(key) else {
      debug!("no dialog run for conversation");
      return Ok(DialogOutcome::Ignored);
    };
    let mut run = shared.lock().await;
    if run.index != index || run.is_finished() {
      debug!(step = index, current = run.index, "event for a step that is not current");
      return Ok(DialogOutcome::Ignored);
    }

    let meta = ctx.meta(&event).await;
    let state = &self.states[index];
    let action = state.action_for(meta.button.as_ref().and_then(|button| button.id()));

    // The run only moves once the next prompt is shown, so it never disagrees with
    // the stored FSM state.
    let value = match action {
      Some(StepAction::Back) => {
        let previous = index.saturating_sub(1);
        self.states[previous].markup.process(ctx, &meta, None).await?;
        run.index = previous;
        return Ok(DialogOutcome::SteppedBack { index: previous });
      },
      Some(StepAction::Skip) => StepValue::Skipped,
      None => match state.converter.convert(&meta) {
        Ok(value) => value,
        Err(err) => {
          debug!(step = %state.name, error = %err, "step input rejected");
          state.markup.process(ctx, &meta, None).await?;
          return Ok(DialogOutcome::Rejected { index });
        },
      },
    };

    let next = index + 1;
    if next < self.states.len() {
      self.states[next].markup.process(ctx, &meta, None).await?;
      run.values.insert(state.name.clone(), value);
      run.index = next;
      return Ok(DialogOutcome::Advanced { index: next });
    }

    run.values.insert(state.name.clone(), value);
    run.finished_at = Some(Utc::now());
    let result = run.to_result(&self.name)?;
    let on_finish = run.on_finish.clone();
    release(ctx, &run.handlers);
    drop(run);
    self.take_run(key);

    ctx.storage().reset_state(key).await?;
    info!(steps = result.values.len(), "dialog finished");
    on_finish(ctx.clone(), result.clone()).await?;
    Ok(DialogOutcome::Finished(result))
  }

  /// Abandons the conversation's run without calling its finish handler.
  pub async fn cancel(&self, ctx: &Keyboards, key: ChatKey) -> Result<bool, Error> {
    let Some(run) = self.take_run(key) else {
      return Ok(false);
    };
    release(ctx, &run.lock().await.handlers);
    ctx.storage().reset_state(key).await?;
    Ok(true)
  }
}

fn release(ctx: &Keyboards, handlers: &[HandlerId]) {
  for id in handlers {
    ctx.router().unregister(*id);
  }
}
