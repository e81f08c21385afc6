//! Store wrapper for fault-injection tests.
//!
//! Delegates to a `MemoryStore` and fails the named operation on demand,
//! so tests can drive the house into a store outage at a chosen point.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Mutex;

use dice_house::storage::{MemoryStore, Store, StoreError, StoreResult};
use dice_house::types::*;

#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    /// Operation name that fails while set.
    failing: Mutex<Option<&'static str>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call to `operation` until `heal` is called.
    pub fn fail(&self, operation: &'static str) {
        *self.failing.lock().unwrap() = Some(operation);
    }

    pub fn heal(&self) {
        *self.failing.lock().unwrap() = None;
    }

    fn check(&self, operation: &'static str) -> StoreResult<()> {
        match *self.failing.lock().unwrap() {
            Some(failing) if failing == operation => {
                Err(StoreError::Unavailable(format!("{operation} forced to fail")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn find_participant_by_key(&self, key: &str) -> StoreResult<Option<Participant>> {
        self.check("find_participant_by_key")?;
        self.inner.find_participant_by_key(key).await
    }

    async fn find_participant(&self, id: ParticipantId) -> StoreResult<Option<Participant>> {
        self.check("find_participant")?;
        self.inner.find_participant(id).await
    }

    async fn insert_participant(&self, new: NewParticipant) -> StoreResult<Participant> {
        self.check("insert_participant")?;
        self.inner.insert_participant(new).await
    }

    async fn update_participant(&self, id: ParticipantId, patch: BalancePatch) -> StoreResult<()> {
        self.check("update_participant")?;
        self.inner.update_participant(id, patch).await
    }

    async fn list_participants(&self) -> StoreResult<Vec<Participant>> {
        self.check("list_participants")?;
        self.inner.list_participants().await
    }

    async fn max_round_id(&self) -> StoreResult<Option<RoundId>> {
        self.check("max_round_id")?;
        self.inner.max_round_id().await
    }

    async fn insert_round(&self, round: Round) -> StoreResult<()> {
        self.check("insert_round")?;
        self.inner.insert_round(round).await
    }

    async fn update_round(&self, id: RoundId, patch: RoundPatch) -> StoreResult<()> {
        self.check("update_round")?;
        self.inner.update_round(id, patch).await
    }

    async fn find_round(&self, id: RoundId) -> StoreResult<Option<Round>> {
        self.check("find_round")?;
        self.inner.find_round(id).await
    }

    async fn find_active_round(&self) -> StoreResult<Option<Round>> {
        self.check("find_active_round")?;
        self.inner.find_active_round().await
    }

    async fn recent_settled_rounds(&self, limit: usize) -> StoreResult<Vec<Round>> {
        self.check("recent_settled_rounds")?;
        self.inner.recent_settled_rounds(limit).await
    }

    async fn insert_bets(&self, bets: Vec<NewBet>) -> StoreResult<Vec<Bet>> {
        self.check("insert_bets")?;
        self.inner.insert_bets(bets).await
    }

    async fn find_bets(
        &self,
        round_id: RoundId,
        participant_id: Option<ParticipantId>,
    ) -> StoreResult<Vec<Bet>> {
        self.check("find_bets")?;
        self.inner.find_bets(round_id, participant_id).await
    }

    async fn delete_bets(&self, round_id: RoundId, participant_id: ParticipantId) -> StoreResult<u64> {
        self.check("delete_bets")?;
        self.inner.delete_bets(round_id, participant_id).await
    }

    async fn set_bet_reward(&self, bet_id: u64, reward: Decimal) -> StoreResult<()> {
        self.check("set_bet_reward")?;
        self.inner.set_bet_reward(bet_id, reward).await
    }

    async fn get_config(&self, key: &str) -> StoreResult<Option<String>> {
        self.check("get_config")?;
        self.inner.get_config(key).await
    }

    async fn set_config(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check("set_config")?;
        self.inner.set_config(key, value).await
    }
}
