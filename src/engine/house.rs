//! House: the single entry point to the wagering engine.
//!
//! Owns the round machine behind one async mutex. Every operation that
//! changes rounds or balances holds it for its whole duration, so no bet
//! lands once a lock has started and settlement runs at most once.
//! Registering a participant only serializes against other registrations.
//! Reports read straight from the store and never wait on the mutex.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::engine::ledger::Ledger;
use crate::engine::parser::{BetLine, BetParser, BetSlip, ParseError};
use crate::engine::round::RoundMachine;
use crate::storage::Store;
use crate::types::{
    Bet, BetSummary, EngineError, Participant, ParticipantId, PhaseKind, RoundId, RoundResult,
    Settlement,
};

/// Config key holding the account text shown by `/Y`.
const BANK_ACCOUNT_KEY: &str = "bank";

/// Number of results returned when the caller gives no limit.
pub const DEFAULT_RESULTS_LIMIT: usize = 10;

/// Snapshot of the active round for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HouseStatus {
    pub phase: PhaseKind,
    pub round_id: Option<RoundId>,
    pub bets: usize,
    pub staked: Decimal,
}

pub struct House {
    store: Arc<dyn Store>,
    parser: BetParser,
    ledger: Ledger,
    machine: Mutex<RoundMachine>,
    registry: Mutex<()>,
}

impl House {
    /// Build a house over `store`, resuming any round left active.
    pub async fn start(store: Arc<dyn Store>, parser: BetParser) -> Result<Self, EngineError> {
        let machine = RoundMachine::rehydrate(store.as_ref()).await?;
        Ok(Self {
            ledger: Ledger::new(store.clone()),
            store,
            parser,
            machine: Mutex::new(machine),
            registry: Mutex::new(()),
        })
    }

    pub fn parser(&self) -> &BetParser {
        &self.parser
    }

    pub fn parse_message(&self, text: &str) -> Result<BetSlip, ParseError> {
        self.parser.parse_message(text)
    }

    pub fn parse_line(&self, text: &str) -> Result<BetLine, ParseError> {
        self.parser.parse_line(text)
    }

    // -----------------------------------------------------------------------
    // Round lifecycle
    // -----------------------------------------------------------------------

    pub async fn open_round(&self) -> Result<RoundId, EngineError> {
        let mut machine = self.machine.lock().await;
        machine.open(self.store.as_ref()).await
    }

    pub async fn lock_round(&self) -> Result<RoundId, EngineError> {
        let mut machine = self.machine.lock().await;
        machine.lock(self.store.as_ref()).await
    }

    pub async fn settle_round(&self, outcome: &str) -> Result<Settlement, EngineError> {
        let mut machine = self.machine.lock().await;
        self.ledger.settle_round(&mut machine, outcome).await
    }

    // -----------------------------------------------------------------------
    // Participants and balances
    // -----------------------------------------------------------------------

    /// Get or create the participant behind an external key.
    pub async fn participant(
        &self,
        key: &str,
        display_name: &str,
    ) -> Result<Participant, EngineError> {
        if let Some(existing) = self.store.find_participant_by_key(key).await? {
            return Ok(existing);
        }
        let _guard = self.registry.lock().await;
        self.ledger.get_or_create(key, display_name).await
    }

    pub async fn place_bet(
        &self,
        participant_key: &str,
        slip: &BetSlip,
    ) -> Result<Vec<Bet>, EngineError> {
        let machine = self.machine.lock().await;
        self.ledger.place_bets(&machine, participant_key, slip).await
    }

    pub async fn cancel_bets(&self, participant_key: &str) -> Result<Decimal, EngineError> {
        let machine = self.machine.lock().await;
        self.ledger.cancel_bets(&machine, participant_key).await
    }

    pub async fn deposit(
        &self,
        participant_id: ParticipantId,
        delta: Decimal,
    ) -> Result<Participant, EngineError> {
        let _guard = self.machine.lock().await;
        self.ledger.adjust_balance(participant_id, delta).await
    }

    pub async fn get_balance(&self, participant_key: &str) -> Result<Decimal, EngineError> {
        Ok(self.ledger.find_by_key(participant_key).await?.balance)
    }

    pub async fn list_participants(&self) -> Result<Vec<Participant>, EngineError> {
        Ok(self.store.list_participants().await?)
    }

    // -----------------------------------------------------------------------
    // Reports
    // -----------------------------------------------------------------------

    /// Current phase as recorded by the store.
    pub async fn status(&self) -> Result<HouseStatus, EngineError> {
        let Some(round) = self.store.find_active_round().await? else {
            return Ok(HouseStatus {
                phase: PhaseKind::Idle,
                round_id: None,
                bets: 0,
                staked: Decimal::ZERO,
            });
        };
        let bets = self.store.find_bets(round.id, None).await?;
        Ok(HouseStatus {
            phase: if round.stopped { PhaseKind::Locked } else { PhaseKind::Open },
            round_id: Some(round.id),
            bets: bets.len(),
            staked: bets.iter().fold(Decimal::ZERO, |acc, b| acc.saturating_add(b.amount)),
        })
    }

    /// Bets of `round_id` grouped per participant, in order of first bet.
    pub async fn list_open_bets_summary(
        &self,
        round_id: RoundId,
    ) -> Result<Vec<BetSummary>, EngineError> {
        let bets = self.store.find_bets(round_id, None).await?;

        let mut grouped: Vec<(ParticipantId, Vec<String>)> = Vec::new();
        for bet in &bets {
            let entry = format!("{}={}", bet.selector, bet.amount.normalize());
            match grouped.iter_mut().find(|(id, _)| *id == bet.participant_id) {
                Some((_, entries)) => entries.push(entry),
                None => grouped.push((bet.participant_id, vec![entry])),
            }
        }

        let mut summaries = Vec::with_capacity(grouped.len());
        for (participant_id, entries) in grouped {
            let display_name = self
                .store
                .find_participant(participant_id)
                .await?
                .map(|p| p.display_name)
                .unwrap_or_default();
            summaries.push(BetSummary { participant_id, display_name, details: entries.join(" ") });
        }
        Ok(summaries)
    }

    /// The newest `limit` settled rounds, oldest first.
    pub async fn list_recent_results(&self, limit: usize) -> Result<Vec<RoundResult>, EngineError> {
        let mut results: Vec<RoundResult> = self
            .store
            .recent_settled_rounds(limit)
            .await?
            .into_iter()
            .filter_map(|r| r.result.map(|result| RoundResult { round_id: r.id, result }))
            .collect();
        results.reverse();
        Ok(results)
    }

    pub async fn bank_account(&self) -> Result<Option<String>, EngineError> {
        Ok(self.store.get_config(BANK_ACCOUNT_KEY).await?)
    }

    pub async fn set_bank_account(&self, text: &str) -> Result<(), EngineError> {
        self.store.set_config(BANK_ACCOUNT_KEY, text.trim()).await?;
        info!("Bank account updated");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
