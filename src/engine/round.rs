//! Round state machine.
//!
//! Tracks the single active round: `Idle → Open → Locked → (settled) Idle`.
//! The machine holds only the in-memory phase; the store is the source of
//! truth and `rehydrate` rebuilds the phase from it on start.

use chrono::Utc;
use tracing::{info, warn};

use crate::storage::Store;
use crate::types::{EngineError, PhaseKind, Round, RoundId, RoundPatch, FIRST_ROUND_ID};

/// Lifecycle phase of the active round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundPhase {
    /// No active round.
    #[default]
    Idle,
    /// Accepting bets.
    Open(RoundId),
    /// No new bets; waiting for the outcome.
    Locked(RoundId),
}

impl RoundPhase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            RoundPhase::Idle => PhaseKind::Idle,
            RoundPhase::Open(_) => PhaseKind::Open,
            RoundPhase::Locked(_) => PhaseKind::Locked,
        }
    }

    pub fn round_id(&self) -> Option<RoundId> {
        match self {
            RoundPhase::Idle => None,
            RoundPhase::Open(id) | RoundPhase::Locked(id) => Some(*id),
        }
    }

    fn from_record(round: &Round) -> Self {
        if round.stopped {
            RoundPhase::Locked(round.id)
        } else {
            RoundPhase::Open(round.id)
        }
    }
}

#[derive(Debug, Default)]
pub struct RoundMachine {
    phase: RoundPhase,
}

impl RoundMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the phase from the one round lacking a result.
    pub async fn rehydrate(store: &dyn Store) -> Result<Self, EngineError> {
        let phase = match store.find_active_round().await? {
            Some(round) => {
                let phase = RoundPhase::from_record(&round);
                info!(round_id = round.id, phase = %phase.kind(), "Resumed active round");
                phase
            }
            None => {
                info!("No active round, starting idle");
                RoundPhase::Idle
            }
        };
        Ok(Self { phase })
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Id of the round accepting bets.
    pub fn require_open(&self) -> Result<RoundId, EngineError> {
        match self.phase {
            RoundPhase::Open(id) => Ok(id),
            other => Err(wrong_state(PhaseKind::Open, other)),
        }
    }

    /// Id of the round awaiting its outcome.
    pub fn require_locked(&self) -> Result<RoundId, EngineError> {
        match self.phase {
            RoundPhase::Locked(id) => Ok(id),
            other => Err(wrong_state(PhaseKind::Locked, other)),
        }
    }

    /// Open the next round. Only allowed while idle.
    pub async fn open(&mut self, store: &dyn Store) -> Result<RoundId, EngineError> {
        if let Some(active) = self.phase.round_id() {
            warn!(round_id = active, "Open rejected, round already active");
            return Err(EngineError::AlreadyOpen(active));
        }

        let id = store.max_round_id().await?.map_or(FIRST_ROUND_ID, |max| max + 1);
        store.insert_round(Round::opened(id)).await?;
        self.phase = RoundPhase::Open(id);

        info!(round_id = id, "Round opened");
        Ok(id)
    }

    /// Stop accepting bets on the open round.
    pub async fn lock(&mut self, store: &dyn Store) -> Result<RoundId, EngineError> {
        let id = self.require_open()?;
        store.update_round(id, RoundPatch::Locked { updated: Utc::now() }).await?;
        self.phase = RoundPhase::Locked(id);

        info!(round_id = id, "Round locked");
        Ok(id)
    }

    /// Mark the locked round as settled, returning the machine to idle.
    /// The caller persists the result first.
    pub(crate) fn finish(&mut self, id: RoundId) {
        debug_assert_eq!(self.phase, RoundPhase::Locked(id));
        self.phase = RoundPhase::Idle;
    }
}

fn wrong_state(expected: PhaseKind, actual: RoundPhase) -> EngineError {
    EngineError::WrongState { expected, actual: actual.kind() }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
