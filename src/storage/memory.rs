//! In-memory store.
//!
//! Keeps every collection in a single `RwLock`-guarded struct. Nothing
//! survives a restart; used by tests and for `backend = "memory"`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{Store, StoreError, StoreResult};
use crate::types::{
    BalancePatch, Bet, NewBet, NewParticipant, Participant, ParticipantId, Round, RoundId,
    RoundPatch, FIRST_PARTICIPANT_ID,
};

#[derive(Default)]
struct Collections {
    participants: BTreeMap<ParticipantId, Participant>,
    rounds: BTreeMap<RoundId, Round>,
    bets: Vec<Bet>,
    next_bet_id: u64,
    config: HashMap<String, String>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_participant_by_key(&self, key: &str) -> StoreResult<Option<Participant>> {
        let inner = self.inner.read().await;
        Ok(inner.participants.values().find(|p| p.key == key).cloned())
    }

    async fn find_participant(&self, id: ParticipantId) -> StoreResult<Option<Participant>> {
        Ok(self.inner.read().await.participants.get(&id).cloned())
    }

    async fn insert_participant(&self, new: NewParticipant) -> StoreResult<Participant> {
        let mut inner = self.inner.write().await;
        if inner.participants.values().any(|p| p.key == new.key) {
            return Err(StoreError::Duplicate { table: "participants", key: new.key });
        }
        let id = inner
            .participants
            .keys()
            .next_back()
            .map(|max| max + 1)
            .unwrap_or(FIRST_PARTICIPANT_ID);
        let participant = Participant {
            id,
            key: new.key,
            display_name: new.display_name,
            balance: Decimal::ZERO,
            created: new.created,
            updated: new.created,
        };
        inner.participants.insert(id, participant.clone());
        Ok(participant)
    }

    async fn update_participant(&self, id: ParticipantId, patch: BalancePatch) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let participant = inner.participants.get_mut(&id).ok_or_else(|| StoreError::Missing {
            table: "participants",
            key: id.to_string(),
        })?;
        participant.balance = patch.balance;
        participant.updated = patch.updated;
        Ok(())
    }

    async fn list_participants(&self) -> StoreResult<Vec<Participant>> {
        Ok(self.inner.read().await.participants.values().cloned().collect())
    }

    async fn max_round_id(&self) -> StoreResult<Option<RoundId>> {
        Ok(self.inner.read().await.rounds.keys().next_back().copied())
    }

    async fn insert_round(&self, round: Round) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.rounds.contains_key(&round.id) {
            return Err(StoreError::Duplicate { table: "rounds", key: round.id.to_string() });
        }
        inner.rounds.insert(round.id, round);
        Ok(())
    }

    async fn update_round(&self, id: RoundId, patch: RoundPatch) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let round = inner.rounds.get_mut(&id).ok_or_else(|| StoreError::Missing {
            table: "rounds",
            key: id.to_string(),
        })?;
        match patch {
            RoundPatch::Locked { updated } => {
                round.stopped = true;
                round.updated = updated;
            }
            RoundPatch::Settled { result, total_staked, total_rewarded, updated } => {
                round.result = Some(result);
                round.total_staked = total_staked;
                round.total_rewarded = total_rewarded;
                round.updated = updated;
            }
        }
        Ok(())
    }

    async fn find_round(&self, id: RoundId) -> StoreResult<Option<Round>> {
        Ok(self.inner.read().await.rounds.get(&id).cloned())
    }

    async fn find_active_round(&self) -> StoreResult<Option<Round>> {
        let inner = self.inner.read().await;
        Ok(inner.rounds.values().find(|r| r.result.is_none()).cloned())
    }

    async fn recent_settled_rounds(&self, limit: usize) -> StoreResult<Vec<Round>> {
        let inner = self.inner.read().await;
        Ok(inner
            .rounds
            .values()
            .rev()
            .filter(|r| r.is_settled())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_bets(&self, bets: Vec<NewBet>) -> StoreResult<Vec<Bet>> {
        let mut inner = self.inner.write().await;
        let mut inserted = Vec::with_capacity(bets.len());
        for new in bets {
            inner.next_bet_id += 1;
            let bet = Bet {
                id: inner.next_bet_id,
                round_id: new.round_id,
                participant_id: new.participant_id,
                selector: new.selector,
                amount: new.amount,
                reward: Decimal::ZERO,
                created: new.created,
            };
            inner.bets.push(bet.clone());
            inserted.push(bet);
        }
        Ok(inserted)
    }

    async fn find_bets(
        &self,
        round_id: RoundId,
        participant_id: Option<ParticipantId>,
    ) -> StoreResult<Vec<Bet>> {
        let inner = self.inner.read().await;
        Ok(inner
            .bets
            .iter()
            .filter(|b| b.round_id == round_id)
            .filter(|b| participant_id.map_or(true, |p| b.participant_id == p))
            .cloned()
            .collect())
    }

    async fn delete_bets(&self, round_id: RoundId, participant_id: ParticipantId) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.bets.len();
        inner
            .bets
            .retain(|b| !(b.round_id == round_id && b.participant_id == participant_id));
        Ok((before - inner.bets.len()) as u64)
    }

    async fn set_bet_reward(&self, bet_id: u64, reward: Decimal) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let bet = inner.bets.iter_mut().find(|b| b.id == bet_id).ok_or_else(|| {
            StoreError::Missing { table: "bets", key: bet_id.to_string() }
        })?;
        bet.reward = reward;
        Ok(())
    }

    async fn get_config(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.inner.read().await.config.get(key).cloned())
    }

    async fn set_config(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner.write().await.config.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
