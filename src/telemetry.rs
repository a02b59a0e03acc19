use anyhow::Result;
use anyhow::anyhow;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Used when `RUST_LOG` is unset: dependencies at `warn`, keyboards at `info`. Button
/// resolution and routing decisions log at `debug` under `tg_keyboards`.
pub const DEFAULT_DIRECTIVE: &str = "warn,tg_keyboards=info";

pub fn init() -> Result<()> {
  init_with(DEFAULT_DIRECTIVE)
}

/// Installs the global subscriber, falling back to `default_directive`. Fails when a
/// subscriber is already installed.
pub fn init_with(default_directive: &str) -> Result<()> {
  let env_filter = match EnvFilter::try_from_default_env() {
    Ok(filter) => filter,
    Err(_) => EnvFilter::try_new(default_directive)?,
  };
  fmt()
    .with_env_filter(env_filter)
    .with_target(true)
    .try_init()
    .map_err(|err| anyhow!(err))
}
