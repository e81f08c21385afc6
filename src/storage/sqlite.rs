//! SQLite store backed by an `sqlx` pool.
//!
//! The schema is created on connect. Amounts are stored as decimal text so
//! no precision is lost; timestamps are unix seconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::{Store, StoreError, StoreResult};
use crate::types::{
    BalancePatch, Bet, NewBet, NewParticipant, Outcome, Participant, ParticipantId, Round,
    RoundId, RoundPatch, Selector, FIRST_PARTICIPANT_ID,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS participants (
        id INTEGER PRIMARY KEY,
        external_key TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        balance TEXT NOT NULL,
        created INTEGER NOT NULL,
        updated INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS rounds (
        id INTEGER PRIMARY KEY,
        started INTEGER NOT NULL,
        stopped INTEGER NOT NULL,
        result TEXT,
        total_staked TEXT NOT NULL,
        total_rewarded TEXT NOT NULL,
        created INTEGER NOT NULL,
        updated INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS bets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        round_id INTEGER NOT NULL,
        participant_id INTEGER NOT NULL,
        selector TEXT NOT NULL,
        amount TEXT NOT NULL,
        reward TEXT NOT NULL,
        created INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS bets_by_round ON bets (round_id, participant_id)",
    "CREATE TABLE IF NOT EXISTS config (
        name TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
];

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct ParticipantRow {
    id: i64,
    external_key: String,
    display_name: String,
    balance: String,
    created: i64,
    updated: i64,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = StoreError;

    fn try_from(row: ParticipantRow) -> StoreResult<Self> {
        Ok(Participant {
            id: row.id as ParticipantId,
            key: row.external_key,
            display_name: row.display_name,
            balance: decimal("participants", &row.balance)?,
            created: timestamp("participants", row.created)?,
            updated: timestamp("participants", row.updated)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RoundRow {
    id: i64,
    started: bool,
    stopped: bool,
    result: Option<String>,
    total_staked: String,
    total_rewarded: String,
    created: i64,
    updated: i64,
}

impl TryFrom<RoundRow> for Round {
    type Error = StoreError;

    fn try_from(row: RoundRow) -> StoreResult<Self> {
        let result = row
            .result
            .map(|r| {
                Outcome::from_str(&r).map_err(|e| StoreError::Corrupt {
                    table: "rounds",
                    message: e.to_string(),
                })
            })
            .transpose()?;
        Ok(Round {
            id: row.id as RoundId,
            started: row.started,
            stopped: row.stopped,
            result,
            total_staked: decimal("rounds", &row.total_staked)?,
            total_rewarded: decimal("rounds", &row.total_rewarded)?,
            created: timestamp("rounds", row.created)?,
            updated: timestamp("rounds", row.updated)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BetRow {
    id: i64,
    round_id: i64,
    participant_id: i64,
    selector: String,
    amount: String,
    reward: String,
    created: i64,
}

impl TryFrom<BetRow> for Bet {
    type Error = StoreError;

    fn try_from(row: BetRow) -> StoreResult<Self> {
        let selector = Selector::from_storage(&row.selector).map_err(|e| StoreError::Corrupt {
            table: "bets",
            message: e.to_string(),
        })?;
        Ok(Bet {
            id: row.id as u64,
            round_id: row.round_id as RoundId,
            participant_id: row.participant_id as ParticipantId,
            selector,
            amount: decimal("bets", &row.amount)?,
            reward: decimal("bets", &row.reward)?,
            created: timestamp("bets", row.created)?,
        })
    }
}

fn decimal(table: &'static str, s: &str) -> StoreResult<Decimal> {
    Decimal::from_str(s).map_err(|e| StoreError::Corrupt { table, message: format!("{s:?}: {e}") })
}

fn timestamp(table: &'static str, secs: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::Corrupt { table, message: format!("bad timestamp {secs}") })
}

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `url` (e.g. `sqlite://dice_house.db?mode=rwc` or
    /// `sqlite::memory:`) and create the schema if missing.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let mut options = SqlitePoolOptions::new().max_connections(max_connections.max(1));
        if url.contains(":memory:") {
            // Each connection to an in-memory database is a separate database.
            options = options
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }
        let pool = options.connect(url).await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!(url, "SQLite store ready");
        Ok(Self { pool })
    }
}

const PARTICIPANT_COLUMNS: &str = "id, external_key, display_name, balance, created, updated";
const ROUND_COLUMNS: &str =
    "id, started, stopped, result, total_staked, total_rewarded, created, updated";
const BET_COLUMNS: &str = "id, round_id, participant_id, selector, amount, reward, created";

#[async_trait]
impl Store for SqliteStore {
    async fn find_participant_by_key(&self, key: &str) -> StoreResult<Option<Participant>> {
        let sql = format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE external_key = ?");
        let row = sqlx::query_as::<_, ParticipantRow>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Participant::try_from).transpose()
    }

    async fn find_participant(&self, id: ParticipantId) -> StoreResult<Option<Participant>> {
        let sql = format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE id = ?");
        let row = sqlx::query_as::<_, ParticipantRow>(&sql)
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Participant::try_from).transpose()
    }

    async fn insert_participant(&self, new: NewParticipant) -> StoreResult<Participant> {
        let mut tx = self.pool.begin().await?;
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM participants")
            .fetch_one(&mut *tx)
            .await?;
        let id = max.map(|m| m as u64 + 1).unwrap_or(FIRST_PARTICIPANT_ID);
        let inserted = sqlx::query(
            "INSERT INTO participants (id, external_key, display_name, balance, created, updated)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id as i64)
        .bind(&new.key)
        .bind(&new.display_name)
        .bind(Decimal::ZERO.to_string())
        .bind(new.created.timestamp())
        .bind(new.created.timestamp())
        .execute(&mut *tx)
        .await;
        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(StoreError::Duplicate { table: "participants", key: new.key });
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit().await?;
        debug!(participant_id = id, key = %new.key, "Participant inserted");
        Ok(Participant {
            id,
            key: new.key,
            display_name: new.display_name,
            balance: Decimal::ZERO,
            created: new.created,
            updated: new.created,
        })
    }

    async fn update_participant(&self, id: ParticipantId, patch: BalancePatch) -> StoreResult<()> {
        let done = sqlx::query("UPDATE participants SET balance = ?, updated = ? WHERE id = ?")
            .bind(patch.balance.to_string())
            .bind(patch.updated.timestamp())
            .bind(id as i64)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::Missing { table: "participants", key: id.to_string() });
        }
        Ok(())
    }

    async fn list_participants(&self) -> StoreResult<Vec<Participant>> {
        let sql = format!("SELECT {PARTICIPANT_COLUMNS} FROM participants ORDER BY id");
        let rows = sqlx::query_as::<_, ParticipantRow>(&sql).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn max_round_id(&self) -> StoreResult<Option<RoundId>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM rounds")
            .fetch_one(&self.pool)
            .await?;
        Ok(max.map(|m| m as RoundId))
    }

    async fn insert_round(&self, round: Round) -> StoreResult<()> {
        let inserted = sqlx::query(
            "INSERT INTO rounds (id, started, stopped, result, total_staked, total_rewarded, created, updated)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(round.id as i64)
        .bind(round.started)
        .bind(round.stopped)
        .bind(round.result.map(|r| r.to_string()))
        .bind(round.total_staked.to_string())
        .bind(round.total_rewarded.to_string())
        .bind(round.created.timestamp())
        .bind(round.updated.timestamp())
        .execute(&self.pool)
        .await;
        match inserted {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Duplicate { table: "rounds", key: round.id.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_round(&self, id: RoundId, patch: RoundPatch) -> StoreResult<()> {
        let query = match patch {
            RoundPatch::Locked { updated } => {
                sqlx::query("UPDATE rounds SET stopped = 1, updated = ? WHERE id = ?")
                    .bind(updated.timestamp())
                    .bind(id as i64)
            }
            RoundPatch::Settled { result, total_staked, total_rewarded, updated } => sqlx::query(
                "UPDATE rounds SET result = ?, total_staked = ?, total_rewarded = ?, updated = ?
                 WHERE id = ?",
            )
            .bind(result.to_string())
            .bind(total_staked.to_string())
            .bind(total_rewarded.to_string())
            .bind(updated.timestamp())
            .bind(id as i64),
        };
        let done = query.execute(&self.pool).await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::Missing { table: "rounds", key: id.to_string() });
        }
        Ok(())
    }

    async fn find_round(&self, id: RoundId) -> StoreResult<Option<Round>> {
        let sql = format!("SELECT {ROUND_COLUMNS} FROM rounds WHERE id = ?");
        let row = sqlx::query_as::<_, RoundRow>(&sql)
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Round::try_from).transpose()
    }

    async fn find_active_round(&self) -> StoreResult<Option<Round>> {
        let sql = format!("SELECT {ROUND_COLUMNS} FROM rounds WHERE result IS NULL ORDER BY id LIMIT 1");
        let row = sqlx::query_as::<_, RoundRow>(&sql).fetch_optional(&self.pool).await?;
        row.map(Round::try_from).transpose()
    }

    async fn recent_settled_rounds(&self, limit: usize) -> StoreResult<Vec<Round>> {
        let sql = format!(
            "SELECT {ROUND_COLUMNS} FROM rounds WHERE result IS NOT NULL ORDER BY id DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, RoundRow>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn insert_bets(&self, bets: Vec<NewBet>) -> StoreResult<Vec<Bet>> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(bets.len());
        for new in bets {
            let done = sqlx::query(
                "INSERT INTO bets (round_id, participant_id, selector, amount, reward, created)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(new.round_id as i64)
            .bind(new.participant_id as i64)
            .bind(new.selector.to_storage())
            .bind(new.amount.to_string())
            .bind(Decimal::ZERO.to_string())
            .bind(new.created.timestamp())
            .execute(&mut *tx)
            .await?;
            inserted.push(Bet {
                id: done.last_insert_rowid() as u64,
                round_id: new.round_id,
                participant_id: new.participant_id,
                selector: new.selector,
                amount: new.amount,
                reward: Decimal::ZERO,
                created: new.created,
            });
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn find_bets(
        &self,
        round_id: RoundId,
        participant_id: Option<ParticipantId>,
    ) -> StoreResult<Vec<Bet>> {
        let rows = match participant_id {
            Some(pid) => {
                let sql = format!(
                    "SELECT {BET_COLUMNS} FROM bets WHERE round_id = ? AND participant_id = ? ORDER BY id"
                );
                sqlx::query_as::<_, BetRow>(&sql)
                    .bind(round_id as i64)
                    .bind(pid as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!("SELECT {BET_COLUMNS} FROM bets WHERE round_id = ? ORDER BY id");
                sqlx::query_as::<_, BetRow>(&sql)
                    .bind(round_id as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        collect(rows)
    }

    async fn delete_bets(&self, round_id: RoundId, participant_id: ParticipantId) -> StoreResult<u64> {
        let done = sqlx::query("DELETE FROM bets WHERE round_id = ? AND participant_id = ?")
            .bind(round_id as i64)
            .bind(participant_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    async fn set_bet_reward(&self, bet_id: u64, reward: Decimal) -> StoreResult<()> {
        let done = sqlx::query("UPDATE bets SET reward = ? WHERE id = ?")
            .bind(reward.to_string())
            .bind(bet_id as i64)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::Missing { table: "bets", key: bet_id.to_string() });
        }
        Ok(())
    }

    async fn get_config(&self, key: &str) -> StoreResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM config WHERE name = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_config(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO config (name, value) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
