use std::{path::Path, sync::Arc};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteConnection},
    ConnectOptions, Connection, FromRow,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("temperature log database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct TemperatureEntry {
    pub id: i64,
    #[sqlx(rename = "ttime")]
    pub timestamp: String,
    #[sqlx(rename = "temp")]
    pub temperature: f64,
}

/// Append-only temperature log. Every call opens and closes its own
/// connection.
#[derive(Clone)]
pub struct EntryStore {
    options: Arc<SqliteConnectOptions>,
}

impl EntryStore {
    pub fn new(path: &Path) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self {
            options: Arc::new(options),
        }
    }

    async fn connect(&self) -> Result<SqliteConnection, StoreError> {
        Ok(self.options.connect().await?)
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        let mut conn = self.connect().await?;
        sqlx::query(
            "create table if not exists entries (
                id integer primary key autoincrement,
                ttime text not null,
                temp real not null
            )",
        )
        .execute(&mut conn)
        .await?;
        conn.close().await?;
        Ok(())
    }

    pub async fn append(&self, timestamp: &str, temperature: f64) -> Result<i64, StoreError> {
        let mut conn = self.connect().await?;
        let id = sqlx::query("insert into entries (ttime, temp) values (?, ?)")
            .bind(timestamp)
            .bind(temperature)
            .execute(&mut conn)
            .await?
            .last_insert_rowid();
        conn.close().await?;
        Ok(id)
    }

    /// Newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<TemperatureEntry>, StoreError> {
        let mut conn = self.connect().await?;
        let entries = sqlx::query_as::<_, TemperatureEntry>(
            "select id, ttime, temp from entries order by id desc limit ?",
        )
        .bind(limit)
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;
        Ok(entries)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let mut conn = self.connect().await?;
        let count = sqlx::query_scalar::<_, i64>("select count(*) from entries")
            .fetch_one(&mut conn)
            .await?;
        conn.close().await?;
        Ok(count)
    }
}
