//! Leaderboard records for retired players.
//!
//! The store exposes exactly two operations: append a retired-player record
//! and read a page of the leaderboard. Production uses PostgreSQL through a
//! connection pool; tests use the in-memory variant with identical
//! ordering.

use std::cmp::Reverse;
use std::sync::{Arc, Mutex};

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{DogId, SessionId};

#[derive(Debug, Error)]
pub enum RecordsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Everything worth keeping about a player leaving the game.
#[derive(Debug, Clone, PartialEq)]
pub struct RetiredPlayerInfo {
    pub id: Uuid,
    pub name: String,
    pub score: i32,
    pub play_time_ms: i64,
    pub session_id: SessionId,
    pub dog_id: DogId,
}

/// One leaderboard row as served by the records endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    pub name: String,
    pub score: i32,
    pub play_time_ms: i64,
}

/// The records store: PostgreSQL in production, a plain vector in tests.
#[derive(Clone)]
pub enum RecordsStore {
    Postgres(PgPool),
    Memory(Arc<Mutex<Vec<RetiredPlayerInfo>>>),
}

impl RecordsStore {
    /// Connects to the database and makes sure the table and its
    /// leaderboard index exist.
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, RecordsError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS retired_players (
                id UUID PRIMARY KEY,
                name varchar(100) NOT NULL,
                score int NOT NULL,
                play_time_ms bigint NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS retired_players_score_time_name_idx
             ON retired_players (score DESC, play_time_ms, name)",
        )
        .execute(&pool)
        .await?;

        Ok(Self::Postgres(pool))
    }

    /// An empty in-memory store for tests and tools.
    pub fn in_memory() -> Self {
        Self::Memory(Arc::new(Mutex::new(Vec::new())))
    }

    /// Appends one retired-player record.
    pub async fn save(&self, info: &RetiredPlayerInfo) -> Result<(), RecordsError> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query(
                    "INSERT INTO retired_players (id, name, score, play_time_ms)
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(info.id)
                .bind(&info.name)
                .bind(info.score)
                .bind(info.play_time_ms)
                .execute(pool)
                .await?;
            }
            Self::Memory(rows) => {
                let mut rows = rows.lock().unwrap_or_else(|e| e.into_inner());
                rows.push(info.clone());
            }
        }
        Ok(())
    }

    /// Reads a leaderboard page ordered by score descending, then play
    /// time ascending, then name.
    pub async fn records(&self, start: i64, max_items: i64) -> Result<Vec<RecordRow>, RecordsError> {
        match self {
            Self::Postgres(pool) => {
                let rows = sqlx::query(
                    "SELECT name, score, play_time_ms FROM retired_players
                     ORDER BY score DESC, play_time_ms, name
                     OFFSET $1 LIMIT $2",
                )
                .bind(start)
                .bind(max_items)
                .fetch_all(pool)
                .await?;

                Ok(rows
                    .into_iter()
                    .map(|row| RecordRow {
                        name: row.get("name"),
                        score: row.get("score"),
                        play_time_ms: row.get("play_time_ms"),
                    })
                    .collect())
            }
            Self::Memory(rows) => {
                let mut all: Vec<RecordRow> = {
                    let rows = rows.lock().unwrap_or_else(|e| e.into_inner());
                    rows.iter()
                        .map(|info| RecordRow {
                            name: info.name.clone(),
                            score: info.score,
                            play_time_ms: info.play_time_ms,
                        })
                        .collect()
                };
                all.sort_by_key(|row| {
                    (Reverse(row.score), row.play_time_ms, row.name.clone())
                });
                Ok(all
                    .into_iter()
                    .skip(start.max(0) as usize)
                    .take(max_items.max(0) as usize)
                    .collect())
            }
        }
    }

    /// Number of stored records; test support for the in-memory variant.
    pub async fn len(&self) -> Result<usize, RecordsError> {
        match self {
            Self::Postgres(pool) => {
                let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM retired_players")
                    .fetch_one(pool)
                    .await?;
                Ok(count as usize)
            }
            Self::Memory(rows) => {
                Ok(rows.lock().unwrap_or_else(|e| e.into_inner()).len())
            }
        }
    }
}
