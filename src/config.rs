use std::env;

use anyhow::Context;
use anyhow::Result;

use crate::button::CallbackPrefix;
use crate::registry::ConflictPolicy;

#[derive(Debug, Clone)]
pub struct Config {
  pub bot_token: String,
  pub database_url: Option<String>,
  pub callback_prefix: CallbackPrefix,
  pub conflict_policy: ConflictPolicy,
}

impl Config {
  pub fn from_env() -> Result<Self> {
    let bot_token = env::var("BOT_TOKEN")
      .or_else(|_| env::var("TELOXIDE_TOKEN"))
      .context("BOT_TOKEN or TELOXIDE_TOKEN must be set")?;
    let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());
    let callback_prefix = match env::var("KEYBOARDS_CALLBACK_PREFIX") {
      Ok(raw) => CallbackPrefix::new(raw).context("invalid KEYBOARDS_CALLBACK_PREFIX")?,
      Err(_) => CallbackPrefix::default(),
    };
    let conflict_policy = parse_conflict_policy(&env::var("KEYBOARDS_CONFLICT_POLICY").unwrap_or_default());
    Ok(Self {
      bot_token,
      database_url,
      callback_prefix,
      conflict_policy,
    })
  }
}

fn parse_conflict_policy(raw: &str) -> ConflictPolicy {
  if raw.trim().is_empty() {
    return ConflictPolicy::default();
  }
  match raw.parse() {
    Ok(policy) => policy,
    Err(err) => {
      tracing::warn!(value = raw, error = %err, "invalid KEYBOARDS_CONFLICT_POLICY, using warn");
      ConflictPolicy::default()
    },
  }
}
