use async_trait::async_trait;
use sqlx::Pool;
use sqlx::Postgres;
use sqlx::Row;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tracing::instrument;

use crate::error::StorageError;
use crate::event::ChatKey;
use crate::storage::StateStorage;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// FSM states persisted in Postgres, so conversations survive a restart together with
/// the callback data of the keyboards already sent.
#[derive(Clone)]
pub struct PgStorage {
  pool: Pool<Postgres>,
}

impl PgStorage {
  pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
    MIGRATOR.run(&pool).await?;
    Ok(Self { pool })
  }

  pub fn from_pool(pool: Pool<Postgres>) -> Self {
    Self { pool }
  }

  pub fn pool(&self) -> &Pool<Postgres> {
    &self.pool
  }
}

#[async_trait]
impl StateStorage for PgStorage {
  #[instrument(skip(self))]
  async fn get_state(&self, key: ChatKey) -> Result<Option<String>, StorageError> {
    let row = sqlx::query(r#"SELECT state FROM fsm_states WHERE chat_id = $1 AND user_id = $2"#)
      .bind(key.chat_id)
      .bind(key.user_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(row.map(|row| row.get("state")))
  }

  #[instrument(skip(self))]
  async fn set_state(&self, key: ChatKey, state: &str) -> Result<(), StorageError> {
    sqlx::query(
      r#"
      INSERT INTO fsm_states (chat_id, user_id, state, updated_at)
      VALUES ($1, $2, $3, NOW())
      ON CONFLICT (chat_id, user_id) DO UPDATE SET
        state = EXCLUDED.state,
        updated_at = EXCLUDED.updated_at
      "#,
    )
    .bind(key.chat_id)
    .bind(key.user_id)
    .bind(state)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  async fn reset_state(&self, key: ChatKey) -> Result<(), StorageError> {
    sqlx::query(r#"DELETE FROM fsm_states WHERE chat_id = $1 AND user_id = $2"#)
      .bind(key.chat_id)
      .bind(key.user_id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }
}
