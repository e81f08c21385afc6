//! Shared types for the dice house.
//!
//! These types form the data model used across all modules: the parser
//! produces selectors, the odds engine reads outcomes, and the ledger and
//! store pass participants, rounds and bets between each other.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::storage::StoreError;

/// Round identifiers are monotonic, starting at [`FIRST_ROUND_ID`].
pub type RoundId = u64;

/// Internal participant identifiers are monotonic, starting at
/// [`FIRST_PARTICIPANT_ID`].
pub type ParticipantId = u64;

pub const FIRST_ROUND_ID: RoundId = 1001;
pub const FIRST_PARTICIPANT_ID: ParticipantId = 1001;

// ---------------------------------------------------------------------------
// Bet marks
// ---------------------------------------------------------------------------

/// One thing a bet is placed on: a categorical range over the dice sum,
/// or a single die face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    Big,
    Small,
    Odd,
    Even,
    Face(u8),
}

impl Mark {
    /// Categorical marks in parser priority order.
    pub const CATEGORIES: [Mark; 4] = [Mark::Big, Mark::Small, Mark::Odd, Mark::Even];

    pub fn is_categorical(&self) -> bool {
        !matches!(self, Mark::Face(_))
    }

    /// Build a face mark from an ASCII digit `'1'..='6'`.
    pub fn from_face_char(c: char) -> Option<Self> {
        match c {
            '1'..='6' => Some(Mark::Face(c as u8 - b'0')),
            _ => None,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::Big => write!(f, "big"),
            Mark::Small => write!(f, "small"),
            Mark::Odd => write!(f, "odd"),
            Mark::Even => write!(f, "even"),
            Mark::Face(d) => write!(f, "{d}"),
        }
    }
}

/// Parse the canonical storage name of a mark (case-insensitive).
impl FromStr for Mark {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "big" => Ok(Mark::Big),
            "small" => Ok(Mark::Small),
            "odd" => Ok(Mark::Odd),
            "even" => Ok(Mark::Even),
            other => {
                let mut chars = other.chars();
                match (chars.next().and_then(Mark::from_face_char), chars.next()) {
                    (Some(mark), None) => Ok(mark),
                    _ => Err(anyhow::anyhow!("Unknown bet mark: {s}")),
                }
            }
        }
    }
}

/// The ordered marks of a single bet. Order is significant for payouts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Selector(Vec<Mark>);

impl Selector {
    pub fn new(marks: Vec<Mark>) -> Self {
        Self(marks)
    }

    pub fn marks(&self) -> &[Mark] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comma-joined canonical names, as persisted by the store.
    pub fn to_storage(&self) -> String {
        self.0.iter().map(Mark::to_string).collect::<Vec<_>>().join(",")
    }

    /// Inverse of [`Selector::to_storage`].
    pub fn from_storage(s: &str) -> anyhow::Result<Self> {
        let marks = s
            .split(',')
            .filter(|p| !p.is_empty())
            .map(Mark::from_str)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self(marks))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(Mark::to_string).collect();
        write!(f, "{}", parts.join("+"))
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// A drawn three-dice result, each face 1–6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Outcome([u8; 3]);

impl Outcome {
    pub fn dice(&self) -> [u8; 3] {
        self.0
    }

    pub fn sum(&self) -> u8 {
        self.0.iter().sum()
    }

    /// All three dice show the same face ("leopard").
    pub fn is_triple(&self) -> bool {
        self.0[0] == self.0[1] && self.0[1] == self.0[2]
    }

    /// How many dice show `face`.
    pub fn count(&self, face: u8) -> usize {
        self.0.iter().filter(|&&d| d == face).count()
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.0[0], self.0[1], self.0[2])
    }
}

/// Accepts exactly `^[1-6]{3}$`.
impl FromStr for Outcome {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let faces: Vec<u8> = s
            .chars()
            .map(|c| match c {
                '1'..='6' => Some(c as u8 - b'0'),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| EngineError::InvalidOutcome(s.to_string()))?;
        match faces.as_slice() {
            [a, b, c] => Ok(Outcome([*a, *b, *c])),
            _ => Err(EngineError::InvalidOutcome(s.to_string())),
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Outcome {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// A chat participant with a house balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    /// Stable external identity (the chat platform's user id).
    pub key: String,
    pub display_name: String,
    pub balance: Decimal,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({}): balance {}", self.id, self.display_name, self.balance.normalize())
    }
}

/// Fields needed to create a participant. The store allocates the id.
#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub key: String,
    pub display_name: String,
    pub created: DateTime<Utc>,
}

/// The only participant fields the ledger may change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalancePatch {
    pub balance: Decimal,
    pub updated: DateTime<Utc>,
}

impl BalancePatch {
    pub fn now(balance: Decimal) -> Self {
        Self { balance, updated: Utc::now() }
    }
}

/// One game cycle from open to settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub started: bool,
    pub stopped: bool,
    pub result: Option<Outcome>,
    pub total_staked: Decimal,
    pub total_rewarded: Decimal,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Round {
    /// A freshly opened round.
    pub fn opened(id: RoundId) -> Self {
        let now = Utc::now();
        Self {
            id,
            started: true,
            stopped: false,
            result: None,
            total_staked: Decimal::ZERO,
            total_rewarded: Decimal::ZERO,
            created: now,
            updated: now,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.result.is_some()
    }
}

/// Changes applied to a round by lock and settle.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundPatch {
    Locked {
        updated: DateTime<Utc>,
    },
    Settled {
        result: Outcome,
        total_staked: Decimal,
        total_rewarded: Decimal,
        updated: DateTime<Utc>,
    },
}

/// A persisted wager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub id: u64,
    pub round_id: RoundId,
    pub participant_id: ParticipantId,
    pub selector: Selector,
    pub amount: Decimal,
    /// Zero until settlement writes it.
    pub reward: Decimal,
    pub created: DateTime<Utc>,
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.selector, self.amount.normalize())
    }
}

/// A wager about to be inserted. The store allocates the id.
#[derive(Debug, Clone)]
pub struct NewBet {
    pub round_id: RoundId,
    pub participant_id: ParticipantId,
    pub selector: Selector,
    pub amount: Decimal,
    pub created: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Per-participant line of a settlement report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantSettlement {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub staked: Decimal,
    pub reward: Decimal,
    /// `reward - staked`.
    pub net: Decimal,
    pub balance: Decimal,
}

impl fmt::Display for ParticipantSettlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.net > Decimal::ZERO { "+" } else { "" };
        write!(
            f,
            "#{} ({}) {sign}{} = {}",
            self.participant_id,
            self.display_name,
            self.net.normalize(),
            self.balance.normalize(),
        )
    }
}

/// Outcome of settling a round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    pub round_id: RoundId,
    pub outcome: Outcome,
    pub total_staked: Decimal,
    pub total_rewarded: Decimal,
    pub participants: Vec<ParticipantSettlement>,
}

/// A settled round's id and dice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundResult {
    pub round_id: RoundId,
    pub result: Outcome,
}

impl fmt::Display for RoundResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.round_id, self.result)
    }
}

/// Admin view of one participant's bets in a round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetSummary {
    pub participant_id: ParticipantId,
    pub display_name: String,
    /// `selector=amount` pairs separated by spaces.
    pub details: String,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Round lifecycle phase names, used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhaseKind {
    Idle,
    Open,
    Locked,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseKind::Idle => write!(f, "idle"),
            PhaseKind::Open => write!(f, "open"),
            PhaseKind::Locked => write!(f, "locked"),
        }
    }
}

/// Domain errors returned by every engine operation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Round #{0} is already open")]
    AlreadyOpen(RoundId),

    #[error("Round must be {expected}, but is {actual}")]
    WrongState { expected: PhaseKind, actual: PhaseKind },

    #[error("Invalid outcome {0:?}: expected three dice 1-6")]
    InvalidOutcome(String),

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    #[error("No bets placed in the current round")]
    NoBets,

    #[error("Bet slip is empty")]
    EmptySlip,

    #[error("Participant not found: {0}")]
    UnknownParticipant(String),

    #[error("Amount out of range")]
    AmountOverflow,

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
