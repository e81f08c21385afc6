//! Bet command parser.
//!
//! Turns free-text bet messages into `(selector, amount)` lines. A message
//! may hold several lines; each line is `<selector> <amount>` or
//! `<part> <part> <amount>`, where any character that is neither a digit
//! nor part of a categorical symbol separates tokens.
//!
//! Selector errors abort the whole message. A line with the wrong token
//! count or an unusable stake is dropped on its own.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::str::FromStr;
use tracing::debug;

use crate::types::{Mark, Selector};

/// Most marks a selector may carry.
pub const MAX_MARKS: usize = 2;

/// Largest stake a single line may carry. Keeps every reward and balance
/// well inside `Decimal` range.
pub const MAX_STAKE: Decimal = dec!(1000000000000);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Text symbols for the categorical marks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub big: String,
    pub small: String,
    pub odd: String,
    pub even: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            big: "b".to_string(),
            small: "s".to_string(),
            odd: "o".to_string(),
            even: "e".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// One parsed bet line.
#[derive(Debug, Clone, PartialEq)]
pub struct BetLine {
    pub selector: Selector,
    pub amount: Decimal,
}

/// All bet lines of a message with their summed stake.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BetSlip {
    pub lines: Vec<BetLine>,
    pub total: Decimal,
}

impl BetSlip {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn push(&mut self, line: BetLine) -> Result<(), ParseError> {
        self.total = self.total.checked_add(line.amount).ok_or(ParseError::StakeTooLarge)?;
        self.lines.push(line);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expected 2 or 3 tokens, found {0}")]
    WrongTokenCount(usize),

    #[error("invalid bet selector {0:?}")]
    InvalidSelector(String),

    #[error("selector has more than one categorical mark")]
    DuplicateCategory,

    #[error("selector repeats face {0}")]
    DuplicateFace(u8),

    #[error("selector has {0} marks, at most 2 allowed")]
    TooManyMarks(usize),

    #[error("stake {0:?} is not a number")]
    NonNumericStake(String),

    #[error("stake must be greater than zero")]
    ZeroStake,

    #[error("stake exceeds the per-line limit")]
    StakeTooLarge,
}

impl ParseError {
    /// Whether this error rejects the whole message rather than one line.
    pub fn aborts_message(&self) -> bool {
        matches!(
            self,
            ParseError::InvalidSelector(_)
                | ParseError::DuplicateCategory
                | ParseError::DuplicateFace(_)
                | ParseError::TooManyMarks(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

pub struct BetParser {
    /// Categorical marks with their lower-cased symbol, in match priority.
    symbols: Vec<(Mark, String)>,
}

impl Default for BetParser {
    fn default() -> Self {
        // The default symbols always pass validation.
        Self::from_validated(&ParserConfig::default())
    }
}

impl BetParser {
    /// Build a parser, rejecting empty, duplicate or digit-bearing symbols.
    pub fn new(config: &ParserConfig) -> anyhow::Result<Self> {
        let parser = Self::from_validated(config);
        for (i, (mark, symbol)) in parser.symbols.iter().enumerate() {
            if symbol.is_empty() {
                anyhow::bail!("symbol for {mark} is empty");
            }
            if symbol.chars().any(|c| c.is_ascii_digit()) {
                anyhow::bail!("symbol {symbol:?} for {mark} contains a digit");
            }
            if parser.symbols[..i].iter().any(|(_, other)| other == symbol) {
                anyhow::bail!("symbol {symbol:?} is used for more than one mark");
            }
        }
        Ok(parser)
    }

    fn from_validated(config: &ParserConfig) -> Self {
        let symbols = Mark::CATEGORIES
            .iter()
            .zip([&config.big, &config.small, &config.odd, &config.even])
            .map(|(mark, symbol)| (*mark, symbol.trim().to_lowercase()))
            .collect();
        Self { symbols }
    }

    /// The configured symbol for a categorical mark.
    pub fn symbol(&self, mark: Mark) -> Option<&str> {
        self.symbols.iter().find(|(m, _)| *m == mark).map(|(_, s)| s.as_str())
    }

    /// Parse every line of a message.
    ///
    /// Returns the first message-aborting error; lines failing for any
    /// other reason are skipped.
    pub fn parse_message(&self, text: &str) -> Result<BetSlip, ParseError> {
        let mut slip = BetSlip::default();
        for line in text.split(['\r', '\n']) {
            match self.parse_line(line).and_then(|bet| slip.push(bet)) {
                Ok(()) => {}
                Err(e) if e.aborts_message() => return Err(e),
                Err(ParseError::WrongTokenCount(_)) => {}
                Err(e) => debug!(line, reason = %e, "Bet line dropped"),
            }
        }
        Ok(slip)
    }

    /// Parse a single `<selector> <amount>` line.
    pub fn parse_line(&self, line: &str) -> Result<BetLine, ParseError> {
        let line = line.trim().to_lowercase();
        let tokens = self.tokenize(&line);

        let (parts, stake) = match tokens.as_slice() {
            [selector, stake] => (vec![*selector], *stake),
            [first, second, stake] => (vec![*first, *second], *stake),
            other => return Err(ParseError::WrongTokenCount(other.len())),
        };

        let mut marks = Vec::with_capacity(MAX_MARKS);
        for part in parts {
            self.scan(part, &mut marks)?;
        }
        validate(&marks)?;

        let amount = Decimal::from_str(stake)
            .map_err(|_| ParseError::NonNumericStake(stake.to_string()))?;
        if amount <= Decimal::ZERO {
            return Err(ParseError::ZeroStake);
        }
        if amount > MAX_STAKE {
            return Err(ParseError::StakeTooLarge);
        }

        Ok(BetLine { selector: Selector::new(marks), amount })
    }

    /// Split on runs of separator characters.
    fn tokenize<'a>(&self, line: &'a str) -> Vec<&'a str> {
        line.split(|c: char| self.is_separator(c))
            .filter(|t| !t.is_empty())
            .collect()
    }

    fn is_separator(&self, c: char) -> bool {
        !c.is_ascii_digit() && !self.symbols.iter().any(|(_, s)| s.contains(c))
    }

    /// Consume one selector part left to right, appending marks.
    fn scan(&self, part: &str, marks: &mut Vec<Mark>) -> Result<(), ParseError> {
        let mut rest = part;
        while let Some(c) = rest.chars().next() {
            if let Some((mark, symbol)) =
                self.symbols.iter().find(|(_, s)| rest.starts_with(s.as_str()))
            {
                if marks.iter().any(Mark::is_categorical) {
                    return Err(ParseError::DuplicateCategory);
                }
                marks.push(*mark);
                rest = &rest[symbol.len()..];
                continue;
            }
            match Mark::from_face_char(c) {
                Some(face) => {
                    marks.push(face);
                    rest = &rest[c.len_utf8()..];
                }
                None => return Err(ParseError::InvalidSelector(part.to_string())),
            }
        }
        Ok(())
    }
}

fn validate(marks: &[Mark]) -> Result<(), ParseError> {
    if marks.len() > MAX_MARKS {
        return Err(ParseError::TooManyMarks(marks.len()));
    }
    if let [Mark::Face(a), Mark::Face(b)] = marks {
        if a == b {
            return Err(ParseError::DuplicateFace(*a));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parser() -> BetParser {
        BetParser::default()
    }

    fn marks(line: &str) -> Vec<Mark> {
        parser().parse_line(line).unwrap().selector.marks().to_vec()
    }

    #[test]
    fn test_single_categorical() {
        let bet = parser().parse_line("b 100").unwrap();
        assert_eq!(bet.selector.marks(), &[Mark::Big]);
        assert_eq!(bet.amount, dec!(100));
    }

    #[test]
    fn test_categorical_with_face() {
        assert_eq!(marks("s3 10"), vec![Mark::Small, Mark::Face(3)]);
        assert_eq!(marks("3s 10"), vec![Mark::Face(3), Mark::Small]);
    }

    #[test]
    fn test_two_faces() {
        assert_eq!(marks("12 50"), vec![Mark::Face(1), Mark::Face(2)]);
    }

    #[test]
    fn test_three_tokens_concatenate() {
        assert_eq!(marks("s 3 10"), vec![Mark::Small, Mark::Face(3)]);
        assert_eq!(marks("4/e/20"), vec![Mark::Face(4), Mark::Even]);
    }

    #[test]
    fn test_case_insensitive_and_separator_runs() {
        let bet = parser().parse_line("  S3 ,, 10  ").unwrap();
        assert_eq!(bet.selector.marks(), &[Mark::Small, Mark::Face(3)]);
        assert_eq!(bet.amount, dec!(10));
    }

    #[test]
    fn test_duplicate_face_rejected() {
        assert_eq!(parser().parse_line("55 10"), Err(ParseError::DuplicateFace(5)));
        assert_eq!(parser().parse_line("5 5 10"), Err(ParseError::DuplicateFace(5)));
    }

    #[test]
    fn test_duplicate_category_rejected() {
        assert_eq!(parser().parse_line("ss3 10"), Err(ParseError::DuplicateCategory));
        assert_eq!(parser().parse_line("bo 10"), Err(ParseError::DuplicateCategory));
        assert_eq!(parser().parse_line("b o 10"), Err(ParseError::DuplicateCategory));
    }

    #[test]
    fn test_too_many_marks_rejected() {
        assert_eq!(parser().parse_line("123 10"), Err(ParseError::TooManyMarks(3)));
        assert_eq!(parser().parse_line("s12 10"), Err(ParseError::TooManyMarks(3)));
    }

    #[test]
    fn test_bad_face_rejected() {
        assert_eq!(parser().parse_line("s7 10"), Err(ParseError::InvalidSelector("s7".into())));
        assert_eq!(parser().parse_line("0 10"), Err(ParseError::InvalidSelector("0".into())));
    }

    #[test]
    fn test_wrong_token_count() {
        assert_eq!(parser().parse_line("hi"), Err(ParseError::WrongTokenCount(0)));
        assert_eq!(parser().parse_line("b"), Err(ParseError::WrongTokenCount(1)));
        assert_eq!(parser().parse_line("b 1 2 3"), Err(ParseError::WrongTokenCount(4)));
    }

    #[test]
    fn test_non_numeric_stake() {
        let err = parser().parse_line("b 1o").unwrap_err();
        assert_eq!(err, ParseError::NonNumericStake("1o".into()));
        assert!(!err.aborts_message());
    }

    #[test]
    fn test_zero_stake_dropped() {
        assert_eq!(parser().parse_line("b 0"), Err(ParseError::ZeroStake));
    }

    #[test]
    fn test_oversized_stake_dropped() {
        let err = parser().parse_line("b 1000000000001").unwrap_err();
        assert_eq!(err, ParseError::StakeTooLarge);
        assert!(!err.aborts_message());
        assert!(parser().parse_line("b 1000000000000").is_ok());
    }

    #[test]
    fn test_message_with_huge_stakes_does_not_overflow() {
        let max = Decimal::MAX.to_string();
        let slip = parser().parse_message(&format!("b {max}\ns {max}\no 5")).unwrap();
        assert_eq!(slip.lines.len(), 1);
        assert_eq!(slip.total, dec!(5));
    }

    #[test]
    fn test_slip_total_overflow_rejected() {
        let line = BetLine { selector: Selector::new(vec![Mark::Big]), amount: Decimal::MAX };
        let mut slip = BetSlip::default();
        slip.push(line.clone()).unwrap();
        assert_eq!(slip.push(line), Err(ParseError::StakeTooLarge));
        assert_eq!(slip.lines.len(), 1);
        assert_eq!(slip.total, Decimal::MAX);
    }

    #[test]
    fn test_message_accumulates_lines() {
        let slip = parser().parse_message("b 10\ns3 20\r\n12 5").unwrap();
        assert_eq!(slip.lines.len(), 3);
        assert_eq!(slip.total, dec!(35));
        assert_eq!(slip.lines[2].selector.marks(), &[Mark::Face(1), Mark::Face(2)]);
    }

    #[test]
    fn test_message_drops_bad_stake_line_only() {
        let slip = parser().parse_message("b 10\ns 1e\nhi all\no 5").unwrap();
        assert_eq!(slip.lines.len(), 2);
        assert_eq!(slip.total, dec!(15));
    }

    #[test]
    fn test_message_aborts_on_bad_selector() {
        let err = parser().parse_message("b 10\n55 10\no 5").unwrap_err();
        assert_eq!(err, ParseError::DuplicateFace(5));
        assert!(err.aborts_message());
    }

    #[test]
    fn test_plain_chat_yields_empty_slip() {
        let slip = parser().parse_message("hi all!").unwrap();
        assert!(slip.is_empty());
    }

    #[test]
    fn test_custom_multibyte_symbols() {
        let parser = BetParser::new(&ParserConfig {
            big: "大".into(),
            small: "小".into(),
            odd: "单".into(),
            even: "双".into(),
        })
        .unwrap();
        let bet = parser.parse_line("小3 10").unwrap();
        assert_eq!(bet.selector.marks(), &[Mark::Small, Mark::Face(3)]);
        assert_eq!(parser.parse_line("单双 10"), Err(ParseError::DuplicateCategory));
        assert_eq!(parser.symbol(Mark::Even), Some("双"));
        // Latin letters are separators once they are no longer symbols.
        assert_eq!(parser.parse_line("b 10"), Err(ParseError::WrongTokenCount(1)));
    }

    #[test]
    fn test_invalid_symbol_config() {
        let dup = ParserConfig { odd: "s".into(), ..ParserConfig::default() };
        assert!(BetParser::new(&dup).is_err());
        let empty = ParserConfig { big: " ".into(), ..ParserConfig::default() };
        assert!(BetParser::new(&empty).is_err());
        let digit = ParserConfig { even: "e2".into(), ..ParserConfig::default() };
        assert!(BetParser::new(&digit).is_err());
    }

    #[test]
    fn test_valid_two_token_lines_yield_one_pair() {
        let p = parser();
        let cats = ["b", "s", "o", "e"];
        let faces = ["1", "2", "3", "4", "5", "6"];
        for c in cats {
            assert!(p.parse_line(&format!("{c} 10")).is_ok());
            for f in faces {
                assert!(p.parse_line(&format!("{c}{f} 10")).is_ok());
                assert!(p.parse_line(&format!("{f}{c} 10")).is_ok());
            }
            for c2 in cats {
                assert!(p.parse_line(&format!("{c}{c2} 10")).is_err());
            }
        }
        for f in faces {
            for f2 in faces {
                let result = p.parse_line(&format!("{f}{f2} 10"));
                assert_eq!(result.is_ok(), f != f2, "{f}{f2}");
            }
        }
    }
}
