//! Persistence layer.
//!
//! Defines the `Store` trait the engine consumes (find/insert/update/delete
//! over participants, rounds, bets and config entries) and provides two
//! implementations:
//! - `MemoryStore`: in-process maps, used by tests and throwaway runs
//! - `SqliteStore`: `sqlx` SQLite pool, the default for real deployments

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{
    BalancePatch, Bet, NewBet, NewParticipant, Participant, ParticipantId, Round, RoundId,
    RoundPatch,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Store failures. The engine reports any of these as "storage unavailable"
/// and never retries.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record in {table}: {message}")]
    Corrupt { table: &'static str, message: String },

    #[error("duplicate key in {table}: {key}")]
    Duplicate { table: &'static str, key: String },

    #[error("record not found in {table}: {key}")]
    Missing { table: &'static str, key: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Abstraction over the document store backing the house.
///
/// Every method is a single persistence round-trip. Implementors must
/// allocate participant ids as `max + 1` (first id 1001) and bet ids
/// uniquely; round ids are chosen by the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    // -- participants --

    async fn find_participant_by_key(&self, key: &str) -> StoreResult<Option<Participant>>;

    async fn find_participant(&self, id: ParticipantId) -> StoreResult<Option<Participant>>;

    /// Insert a participant, allocating the next id.
    async fn insert_participant(&self, new: NewParticipant) -> StoreResult<Participant>;

    async fn update_participant(&self, id: ParticipantId, patch: BalancePatch) -> StoreResult<()>;

    /// All participants ordered by id.
    async fn list_participants(&self) -> StoreResult<Vec<Participant>>;

    // -- rounds --

    async fn max_round_id(&self) -> StoreResult<Option<RoundId>>;

    async fn insert_round(&self, round: Round) -> StoreResult<()>;

    async fn update_round(&self, id: RoundId, patch: RoundPatch) -> StoreResult<()>;

    async fn find_round(&self, id: RoundId) -> StoreResult<Option<Round>>;

    /// The round with no result, if any.
    async fn find_active_round(&self) -> StoreResult<Option<Round>>;

    /// Up to `limit` settled rounds, newest first.
    async fn recent_settled_rounds(&self, limit: usize) -> StoreResult<Vec<Round>>;

    // -- bets --

    /// Insert all bets atomically, returning them with ids assigned.
    async fn insert_bets(&self, bets: Vec<NewBet>) -> StoreResult<Vec<Bet>>;

    /// Bets of a round in insertion order, optionally for one participant.
    async fn find_bets(
        &self,
        round_id: RoundId,
        participant_id: Option<ParticipantId>,
    ) -> StoreResult<Vec<Bet>>;

    /// Delete one participant's bets in a round, returning how many went.
    async fn delete_bets(&self, round_id: RoundId, participant_id: ParticipantId) -> StoreResult<u64>;

    async fn set_bet_reward(&self, bet_id: u64, reward: Decimal) -> StoreResult<()>;

    // -- config --

    async fn get_config(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_config(&self, key: &str, value: &str) -> StoreResult<()>;
}
