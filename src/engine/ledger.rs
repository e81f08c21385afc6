//! Ledger and settlement coordinator.
//!
//! The only code that changes participant balances. Callers hand in the
//! round machine they hold under the house lock, so phase checks and the
//! writes that depend on them cannot interleave with a lock or settle.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{info, warn};

use crate::engine::odds;
use crate::engine::parser::BetSlip;
use crate::engine::round::RoundMachine;
use crate::storage::Store;
use crate::types::{
    BalancePatch, Bet, EngineError, NewBet, NewParticipant, Outcome, Participant, ParticipantId,
    ParticipantSettlement, RoundPatch, Settlement,
};

/// Highest balance an admin adjustment may leave behind. Winnings may
/// carry a balance past it.
pub const MAX_BALANCE: Decimal = dec!(1000000000000000000);

pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Look up a participant by external key, creating it with a zero
    /// balance on first contact.
    pub async fn get_or_create(
        &self,
        key: &str,
        display_name: &str,
    ) -> Result<Participant, EngineError> {
        if let Some(existing) = self.store.find_participant_by_key(key).await? {
            return Ok(existing);
        }
        let participant = self
            .store
            .insert_participant(NewParticipant {
                key: key.to_string(),
                display_name: display_name.to_string(),
                created: Utc::now(),
            })
            .await?;
        info!(participant_id = participant.id, name = %participant.display_name, "Participant registered");
        Ok(participant)
    }

    pub async fn find_by_key(&self, key: &str) -> Result<Participant, EngineError> {
        self.store
            .find_participant_by_key(key)
            .await?
            .ok_or_else(|| EngineError::UnknownParticipant(key.to_string()))
    }

    async fn find_by_id(&self, id: ParticipantId) -> Result<Participant, EngineError> {
        self.store
            .find_participant(id)
            .await?
            .ok_or_else(|| EngineError::UnknownParticipant(id.to_string()))
    }

    async fn write_balance(&self, id: ParticipantId, balance: Decimal) -> Result<(), EngineError> {
        self.store.update_participant(id, BalancePatch::now(balance)).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Betting
    // -----------------------------------------------------------------------

    /// Debit the slip total and record one bet per line. Returns every bet
    /// the participant holds in the open round.
    pub async fn place_bets(
        &self,
        machine: &RoundMachine,
        participant_key: &str,
        slip: &BetSlip,
    ) -> Result<Vec<Bet>, EngineError> {
        let round_id = machine.require_open()?;
        if slip.is_empty() {
            return Err(EngineError::EmptySlip);
        }

        let participant = self.find_by_key(participant_key).await?;
        if slip.total > participant.balance {
            warn!(
                participant_id = participant.id,
                needed = %slip.total,
                available = %participant.balance,
                "Bet rejected, insufficient balance"
            );
            return Err(EngineError::InsufficientBalance {
                needed: slip.total,
                available: participant.balance,
            });
        }

        // Debit before inserting: a failed insert loses the stake rather
        // than recording an unpaid bet.
        self.write_balance(participant.id, participant.balance - slip.total).await?;

        let now = Utc::now();
        let new_bets = slip
            .lines
            .iter()
            .map(|line| NewBet {
                round_id,
                participant_id: participant.id,
                selector: line.selector.clone(),
                amount: line.amount,
                created: now,
            })
            .collect();
        self.store.insert_bets(new_bets).await?;

        info!(
            round_id,
            participant_id = participant.id,
            lines = slip.lines.len(),
            total = %slip.total,
            "Bets placed"
        );

        Ok(self.store.find_bets(round_id, Some(participant.id)).await?)
    }

    /// Remove the participant's bets in the open round and refund them.
    pub async fn cancel_bets(
        &self,
        machine: &RoundMachine,
        participant_key: &str,
    ) -> Result<Decimal, EngineError> {
        let round_id = machine.require_open()?;
        let participant = self.find_by_key(participant_key).await?;

        let bets = self.store.find_bets(round_id, Some(participant.id)).await?;
        if bets.is_empty() {
            return Err(EngineError::NoBets);
        }
        let refund = checked_sum(bets.iter().map(|b| b.amount))?;
        let balance = checked_add(participant.balance, refund)?;

        self.store.delete_bets(round_id, participant.id).await?;
        self.write_balance(participant.id, balance).await?;

        info!(round_id, participant_id = participant.id, refund = %refund, "Bets cancelled");
        Ok(refund)
    }

    // -----------------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------------

    /// Settle the locked round against `outcome`.
    ///
    /// Every reward and new balance is computed before the round result is
    /// written. The machine returns to idle before any credit, so a retried
    /// settle can never pay twice.
    pub async fn settle_round(
        &self,
        machine: &mut RoundMachine,
        outcome: &str,
    ) -> Result<Settlement, EngineError> {
        let round_id = machine.require_locked()?;
        let outcome: Outcome = outcome.parse()?;

        let bets = self.store.find_bets(round_id, None).await?;

        // (participant, staked, reward) in order of first bet.
        let mut tally: Vec<(ParticipantId, Decimal, Decimal)> = Vec::new();
        let mut rewards = Vec::with_capacity(bets.len());
        for bet in &bets {
            let reward = odds::calculate_reward(&outcome, bet.amount, &bet.selector)
                .ok_or(EngineError::AmountOverflow)?;
            rewards.push((bet.id, reward));
            match tally.iter_mut().find(|(id, _, _)| *id == bet.participant_id) {
                Some(entry) => {
                    entry.1 = checked_add(entry.1, bet.amount)?;
                    entry.2 = checked_add(entry.2, reward)?;
                }
                None => tally.push((bet.participant_id, bet.amount, reward)),
            }
        }
        let total_staked = checked_sum(tally.iter().map(|t| t.1))?;
        let total_rewarded = checked_sum(tally.iter().map(|t| t.2))?;

        let mut participants = Vec::with_capacity(tally.len());
        for (participant_id, staked, reward) in tally {
            let participant = self.find_by_id(participant_id).await?;
            participants.push(ParticipantSettlement {
                participant_id,
                display_name: participant.display_name,
                staked,
                reward,
                net: reward - staked,
                balance: checked_add(participant.balance, reward)?,
            });
        }

        self.store
            .update_round(
                round_id,
                RoundPatch::Settled {
                    result: outcome,
                    total_staked,
                    total_rewarded,
                    updated: Utc::now(),
                },
            )
            .await?;
        machine.finish(round_id);

        for (bet_id, reward) in rewards {
            self.store.set_bet_reward(bet_id, reward).await?;
        }
        for entry in participants.iter().filter(|p| !p.reward.is_zero()) {
            self.write_balance(entry.participant_id, entry.balance).await?;
        }

        info!(
            round_id,
            outcome = %outcome,
            bets = bets.len(),
            staked = %total_staked,
            rewarded = %total_rewarded,
            "Round settled"
        );

        Ok(Settlement { round_id, outcome, total_staked, total_rewarded, participants })
    }

    // -----------------------------------------------------------------------
    // Admin adjustments
    // -----------------------------------------------------------------------

    /// Deposit (positive `delta`) or withdraw (negative) on a participant.
    pub async fn adjust_balance(
        &self,
        participant_id: ParticipantId,
        delta: Decimal,
    ) -> Result<Participant, EngineError> {
        let mut participant = self.find_by_id(participant_id).await?;
        let balance = match participant.balance.checked_add(delta) {
            Some(balance) if balance <= MAX_BALANCE => balance,
            _ => {
                warn!(participant_id, delta = %delta, balance = %participant.balance, "Deposit rejected, amount out of range");
                return Err(EngineError::AmountOverflow);
            }
        };
        if balance < Decimal::ZERO {
            warn!(participant_id, delta = %delta, balance = %participant.balance, "Withdrawal rejected");
            return Err(EngineError::InsufficientBalance {
                needed: -delta,
                available: participant.balance,
            });
        }

        self.write_balance(participant_id, balance).await?;
        participant.balance = balance;

        info!(participant_id, delta = %delta, balance = %balance, "Balance adjusted");
        Ok(participant)
    }
}

fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal, EngineError> {
    a.checked_add(b).ok_or(EngineError::AmountOverflow)
}

fn checked_sum(amounts: impl IntoIterator<Item = Decimal>) -> Result<Decimal, EngineError> {
    amounts.into_iter().try_fold(Decimal::ZERO, checked_add)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
