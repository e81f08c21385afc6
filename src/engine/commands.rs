//! Chat command dispatch.
//!
//! Turns one incoming chat message into house operations and plain-text
//! reply lines. Command words match case-insensitively. Admin commands are
//! honoured only for the configured admin key and ignored from anyone
//! else, so command letters that double as bet symbols never place a bet.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, warn};

use crate::engine::house::House;
use crate::types::{EngineError, Mark, PhaseKind};

const MSG_INVALID_COMMAND: &str = "Invalid command";
const MSG_INVALID_PARAMS: &str = "Invalid parameters";
const MSG_NOT_OPEN: &str = "No round is open";
const MSG_INTERNAL: &str = "Something went wrong, please try again later";

/// One chat message addressed to the house.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub sender_key: String,
    #[serde(default)]
    pub display_name: String,
    pub text: String,
}

/// Reply lines for one message. Empty means stay silent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reply {
    pub lines: Vec<String>,
}

impl Reply {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn line(text: impl Into<String>) -> Self {
        Self { lines: vec![text.into()] }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl From<Vec<String>> for Reply {
    fn from(lines: Vec<String>) -> Self {
        Self { lines }
    }
}

// ---------------------------------------------------------------------------
// Command recognition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command<'a> {
    Open,
    Lock,
    Settle(&'a str),
    Deposit(&'a str),
    ListParticipants,
    Results,
    BetList,
    SetBank(&'a str),
    Cancel,
    Balance,
    Rules,
    Bank,
    Bet(&'a str),
}

impl<'a> Command<'a> {
    fn parse(text: &'a str) -> Self {
        let text = text.trim();
        let (cmd, params) = match text.split_once(' ') {
            Some((cmd, params)) => (cmd.trim(), params.trim()),
            None => (text, ""),
        };
        match cmd.to_ascii_uppercase().as_str() {
            "/Q" => Command::Open,
            "/B" => Command::Lock,
            "/S" => Command::Settle(params),
            "/D" => Command::Deposit(params),
            "/L" => Command::ListParticipants,
            "/N" => Command::Results,
            "/K" => Command::BetList,
            "/SET" => Command::SetBank(params),
            "/X" => Command::Cancel,
            "/C" => Command::Balance,
            "/A" => Command::Rules,
            "/Y" => Command::Bank,
            _ => Command::Bet(text),
        }
    }

    fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Command::Open
                | Command::Lock
                | Command::Settle(_)
                | Command::Deposit(_)
                | Command::ListParticipants
                | Command::Results
                | Command::BetList
                | Command::SetBank(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    house: Arc<House>,
    admin_key: Option<String>,
    results_limit: usize,
}

impl Dispatcher {
    pub fn new(house: Arc<House>, admin_key: Option<String>, results_limit: usize) -> Self {
        Self { house, admin_key, results_limit }
    }

    pub fn house(&self) -> &Arc<House> {
        &self.house
    }

    fn is_admin(&self, key: &str) -> bool {
        self.admin_key.as_deref() == Some(key)
    }

    /// Handle one message. Engine errors become reply text; nothing here
    /// fails the caller.
    pub async fn handle(&self, message: &IncomingMessage) -> Reply {
        let key = message.sender_key.as_str();
        let name = if message.display_name.is_empty() { key } else { message.display_name.as_str() };

        if let Err(e) = self.house.participant(key, name).await {
            return self.engine_error(e);
        }

        let command = Command::parse(&message.text);
        if command.is_admin_only() && !self.is_admin(key) {
            warn!(sender = key, "Admin command from non-admin ignored");
            return Reply::none();
        }

        let result = match command {
            Command::Open => self.open().await,
            Command::Lock => self.lock().await,
            Command::Settle(outcome) => self.settle(outcome).await,
            Command::Deposit(params) => self.deposit(params).await,
            Command::ListParticipants => self.list_participants().await,
            Command::Results => self.results().await,
            Command::BetList => self.bet_list().await,
            Command::SetBank(text) => self.set_bank(text).await,
            Command::Cancel => self.cancel(key).await,
            Command::Balance => self.balance(key).await,
            Command::Rules => Ok(self.rules()),
            Command::Bank => self.bank().await,
            Command::Bet(text) => self.bet(key, text).await,
        };
        result.unwrap_or_else(|e| self.engine_error(e))
    }

    /// Reply text for errors no command handled itself.
    fn engine_error(&self, e: EngineError) -> Reply {
        match e {
            EngineError::AlreadyOpen(id) => Reply::line(format!("Round #{id} is already open")),
            EngineError::WrongState { actual: PhaseKind::Idle, .. } => Reply::line(MSG_NOT_OPEN),
            EngineError::WrongState { actual: PhaseKind::Locked, .. } => {
                Reply::line("Betting is closed for this round")
            }
            EngineError::WrongState { actual: PhaseKind::Open, .. } => {
                Reply::line("Close betting with /B first")
            }
            EngineError::InvalidOutcome(_) => {
                Reply::line("Invalid result, expected three dice 1-6 such as 114")
            }
            EngineError::InsufficientBalance { available, .. } => {
                Reply::line(format!("Insufficient balance ({})", available.normalize()))
            }
            EngineError::NoBets => Reply::line("You have no bets in this round"),
            EngineError::EmptySlip => Reply::none(),
            EngineError::UnknownParticipant(id) => Reply::line(format!("No such participant: {id}")),
            EngineError::AmountOverflow => Reply::line("Amount out of range"),
            EngineError::StorageUnavailable(e) => {
                error!(error = %e, "Store failure while handling message");
                Reply::line(MSG_INTERNAL)
            }
        }
    }

    // -- admin --

    async fn open(&self) -> Result<Reply, EngineError> {
        let id = self.house.open_round().await?;
        Ok(Reply::line(format!("Round #{id} is open, place your bets")))
    }

    async fn lock(&self) -> Result<Reply, EngineError> {
        let id = self.house.lock_round().await?;
        Ok(Reply::line(format!("Round #{id} is closed, no more bets")))
    }

    async fn settle(&self, outcome: &str) -> Result<Reply, EngineError> {
        if outcome.is_empty() {
            return Ok(Reply::line(MSG_INVALID_PARAMS));
        }
        let settlement = self.house.settle_round(outcome).await?;

        let mut lines = vec![format!("Round #{} result {}", settlement.round_id, settlement.outcome)];
        if settlement.participants.is_empty() {
            lines.push("No bets this round".to_string());
        }
        lines.extend(settlement.participants.iter().map(ToString::to_string));
        Ok(lines.into())
    }

    async fn deposit(&self, params: &str) -> Result<Reply, EngineError> {
        let mut parts = params.split_whitespace();
        let parsed = match (parts.next(), parts.next(), parts.next()) {
            (Some(id), Some(amount), None) => {
                u64::from_str(id).ok().zip(Decimal::from_str(amount).ok())
            }
            _ => None,
        };
        let Some((id, delta)) = parsed else {
            return Ok(Reply::line(MSG_INVALID_PARAMS));
        };

        let participant = match self.house.deposit(id, delta).await {
            Err(EngineError::InsufficientBalance { .. }) => {
                return Ok(Reply::line(format!("#{id} balance too low to withdraw {}", -delta)));
            }
            other => other?,
        };

        let action = if delta >= Decimal::ZERO {
            format!("Deposited {}", delta.normalize())
        } else {
            format!("Withdrew {}", (-delta).normalize())
        };
        Ok(vec![action, participant.to_string()].into())
    }

    async fn list_participants(&self) -> Result<Reply, EngineError> {
        let participants = self.house.list_participants().await?;
        if participants.is_empty() {
            return Ok(Reply::line("No participants yet"));
        }
        Ok(participants.iter().map(ToString::to_string).collect::<Vec<_>>().into())
    }

    async fn results(&self) -> Result<Reply, EngineError> {
        let results = self.house.list_recent_results(self.results_limit).await?;
        if results.is_empty() {
            return Ok(Reply::line("No results yet"));
        }
        Ok(results.iter().map(ToString::to_string).collect::<Vec<_>>().into())
    }

    async fn bet_list(&self) -> Result<Reply, EngineError> {
        let Some(round_id) = self.house.status().await?.round_id else {
            return Ok(Reply::line(MSG_NOT_OPEN));
        };
        let summary = self.house.list_open_bets_summary(round_id).await?;
        if summary.is_empty() {
            return Ok(Reply::line(format!("Round #{round_id}: no bets yet")));
        }
        let mut lines = vec![format!("Round #{round_id} bets")];
        lines.extend(
            summary
                .iter()
                .map(|s| format!("#{} ({}) {}", s.participant_id, s.display_name, s.details)),
        );
        Ok(lines.into())
    }

    async fn set_bank(&self, text: &str) -> Result<Reply, EngineError> {
        if text.is_empty() {
            return Ok(Reply::line(MSG_INVALID_PARAMS));
        }
        self.house.set_bank_account(text).await?;
        Ok(Reply::line("Bank account updated"))
    }

    // -- everyone --

    async fn cancel(&self, key: &str) -> Result<Reply, EngineError> {
        let refund = self.house.cancel_bets(key).await?;
        let balance = self.house.get_balance(key).await?;
        Ok(vec![
            format!("Bets cancelled, refunded {}", refund.normalize()),
            format!("Balance: {}", balance.normalize()),
        ]
        .into())
    }

    async fn balance(&self, key: &str) -> Result<Reply, EngineError> {
        let balance = self.house.get_balance(key).await?;
        Ok(Reply::line(format!("Balance: {}", balance.normalize())))
    }

    fn rules(&self) -> Reply {
        let parser = self.house.parser();
        let sym = |mark: Mark| parser.symbol(mark).unwrap_or_default().to_string();
        let (big, small, odd, even) =
            (sym(Mark::Big), sym(Mark::Small), sym(Mark::Odd), sym(Mark::Even));
        vec![
            "Bet one line per wager: <selector> <amount>".to_string(),
            format!("{big} big (11-17), {small} small (4-10), {odd} odd, {even} even: pays 2x, loses on triples"),
            "Face 1-6: pays 2x, 3x or 4x when it shows once, twice or three times".to_string(),
            format!("Category plus face, e.g. {small}3: pays 3.3x when both hit"),
            "Two faces, e.g. 12: pays 6x when both show".to_string(),
            "/X cancel your bets, /C balance, /Y bank account".to_string(),
        ]
        .into()
    }

    async fn bank(&self) -> Result<Reply, EngineError> {
        Ok(match self.house.bank_account().await? {
            Some(bank) if !bank.is_empty() => vec!["Bank account:".to_string(), bank].into(),
            _ => Reply::none(),
        })
    }

    async fn bet(&self, key: &str, text: &str) -> Result<Reply, EngineError> {
        let slip = match self.house.parse_message(text) {
            Ok(slip) => slip,
            Err(_) => return Ok(Reply::line(MSG_INVALID_COMMAND)),
        };
        if slip.is_empty() {
            return Ok(Reply::none());
        }

        let bets = self.house.place_bet(key, &slip).await?;
        let balance = self.house.get_balance(key).await?;
        let total = bets.iter().fold(Decimal::ZERO, |acc, b| acc.saturating_add(b.amount));

        let mut lines: Vec<String> = bets.iter().map(|b| format!("✅ {b}")).collect();
        lines.push(format!("Total staked: {}", total.normalize()));
        lines.push(format!("Balance: {}", balance.normalize()));
        Ok(lines.into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
