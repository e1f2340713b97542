use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use vellum_client::{Command, Connection, ConnectionFactory, SqlFragment, TransactionOptions};
use vellum_common::constants::HILO_TABLE;
use vellum_common::{VellumError, VellumResult};

use super::hilo::HiloCounter;

/// Hi counter stored in the `mt_hilo` table.
///
/// The row for an entity is created on first use with a hi of 0; every later
/// reservation adds the increment. Each reservation runs on its own
/// connection in a serializable transaction.
#[derive(Clone)]
pub struct DatabaseHiloCounter {
    factory: Arc<dyn ConnectionFactory>,
}

impl DatabaseHiloCounter {
    /// Creates a counter using connections from `factory`.
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self { factory }
    }

    /// The statement that reserves the next hi.
    pub fn reserve_command(entity: &str, increment: i32) -> Command {
        Command::single(
            SqlFragment::raw(format!(
                "insert into {t} (entity_name, hi_value) values (",
                t = HILO_TABLE
            ))
            .bind(entity)
            .sql(format!(
                ", 0) on conflict (entity_name) do update set hi_value = {t}.hi_value + ",
                t = HILO_TABLE
            ))
            .bind(i64::from(increment))
            .sql(" returning hi_value"),
        )
    }

    async fn reserve(conn: &mut Box<dyn Connection>, command: &Command) -> VellumResult<i64> {
        let mut reader = conn.execute_reader(command).await?;
        let row = reader
            .next_row()
            .await?
            .ok_or_else(|| VellumError::execution("hi reservation returned no row"))?;
        row.i64(0)
    }
}

#[async_trait]
impl HiloCounter for DatabaseHiloCounter {
    async fn next_hi(&self, entity: &str, increment: i32) -> VellumResult<i64> {
        let command = Self::reserve_command(entity, increment);
        let mut conn = self.factory.create().await?;
        conn.begin(TransactionOptions::serializable()).await?;

        match Self::reserve(&mut conn, &command).await {
            Ok(hi) => {
                conn.commit().await?;
                debug!(entity, hi, "advanced hi counter");
                Ok(hi)
            }
            Err(e) => {
                // The reservation error is the one worth reporting.
                let _ = conn.rollback().await;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for DatabaseHiloCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseHiloCounter").finish_non_exhaustive()
    }
}
