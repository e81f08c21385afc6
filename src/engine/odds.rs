//! Odds engine.
//!
//! Pure payout calculation for one bet against a drawn outcome. Marks are
//! folded left to right carrying a running rate; any losing mark loses the
//! whole bet.
//!
//! | Selector                    | Rate                       |
//! |-----------------------------|----------------------------|
//! | one categorical             | 2                          |
//! | one face, seen 1/2/3 times  | 2 / 3 / 4                  |
//! | categorical then face       | 3.3                        |
//! | two faces, both seen        | 6                          |
//!
//! Any categorical mark loses on a triple.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::{Mark, Outcome, Selector};

const RATE_SINGLE: Decimal = dec!(2);
const RATE_COMBINED: Decimal = dec!(3.3);
const RATE_TWO_FACES: Decimal = dec!(6);

/// Sum range covered by a categorical mark, or `None` for a face.
fn covers(mark: Mark, sum: u8) -> Option<bool> {
    let odd = sum % 2 == 1;
    match mark {
        Mark::Small => Some((4..=10).contains(&sum)),
        Mark::Big => Some((11..=17).contains(&sum)),
        Mark::Odd => Some(odd && (5..=17).contains(&sum)),
        Mark::Even => Some(!odd && (4..=16).contains(&sum)),
        Mark::Face(_) => None,
    }
}

/// Rate for a lone face seen `matches` times.
fn face_rate(matches: usize) -> Decimal {
    match matches {
        1 => dec!(2),
        2 => dec!(3),
        _ => dec!(4),
    }
}

/// Payout multiplier for `selector` on `outcome`; zero means the bet lost.
pub fn payout_rate(outcome: &Outcome, selector: &Selector) -> Decimal {
    if selector.is_empty() {
        return Decimal::ZERO;
    }

    let sum = outcome.sum();
    let triple = outcome.is_triple();
    let mut rate = Decimal::ZERO;
    let mut categorical_matched = false;

    for &mark in selector.marks() {
        match mark {
            Mark::Face(face) => {
                let matches = outcome.count(face);
                if matches == 0 {
                    return Decimal::ZERO;
                }
                rate = if categorical_matched {
                    RATE_COMBINED
                } else if !rate.is_zero() {
                    RATE_TWO_FACES
                } else {
                    face_rate(matches)
                };
            }
            categorical => {
                if triple || covers(categorical, sum) != Some(true) {
                    return Decimal::ZERO;
                }
                rate = if rate.is_zero() { RATE_SINGLE } else { RATE_COMBINED };
                categorical_matched = true;
            }
        }
    }

    rate
}

/// Reward paid for staking `amount` on `selector`. The stake itself has
/// already been debited, so this is the full amount credited back.
///
/// `None` when the reward does not fit in a `Decimal`.
pub fn calculate_reward(
    outcome: &Outcome,
    amount: Decimal,
    selector: &Selector,
) -> Option<Decimal> {
    amount.checked_mul(payout_rate(outcome, selector))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn reward(outcome: &str, amount: Decimal, marks: &[Mark]) -> Decimal {
        let outcome: Outcome = outcome.parse().unwrap();
        calculate_reward(&outcome, amount, &Selector::new(marks.to_vec())).unwrap()
    }

    #[test]
    fn test_small_and_big_on_low_sum() {
        assert_eq!(reward("123", dec!(10), &[Mark::Small]), dec!(20));
        assert_eq!(reward("123", dec!(10), &[Mark::Big]), Decimal::ZERO);
    }

    #[test]
    fn test_big_on_high_sum() {
        assert_eq!(reward("456", dec!(10), &[Mark::Big]), dec!(20));
        assert_eq!(reward("456", dec!(10), &[Mark::Small]), Decimal::ZERO);
    }

    #[test]
    fn test_triple_loses_categorical() {
        assert_eq!(reward("555", dec!(10), &[Mark::Big]), Decimal::ZERO);
        assert_eq!(reward("222", dec!(10), &[Mark::Small]), Decimal::ZERO);
        assert_eq!(reward("222", dec!(10), &[Mark::Even]), Decimal::ZERO);
        assert_eq!(reward("333", dec!(10), &[Mark::Odd, Mark::Face(3)]), Decimal::ZERO);
    }

    #[test]
    fn test_triple_pays_face() {
        assert_eq!(reward("555", dec!(10), &[Mark::Face(5)]), dec!(40));
    }

    #[test]
    fn test_odd_even_ranges() {
        assert_eq!(reward("124", dec!(10), &[Mark::Odd]), dec!(20)); // 7
        assert_eq!(reward("124", dec!(10), &[Mark::Even]), Decimal::ZERO);
        assert_eq!(reward("134", dec!(10), &[Mark::Even]), dec!(20)); // 8
        assert_eq!(reward("665", dec!(10), &[Mark::Odd]), dec!(20)); // 17
        assert_eq!(reward("664", dec!(10), &[Mark::Even]), dec!(20)); // 16
    }

    #[test]
    fn test_face_match_counts() {
        assert_eq!(reward("146", dec!(10), &[Mark::Face(1)]), dec!(20));
        assert_eq!(reward("114", dec!(10), &[Mark::Face(1)]), dec!(30));
        assert_eq!(reward("111", dec!(10), &[Mark::Face(1)]), dec!(40));
        assert_eq!(reward("234", dec!(10), &[Mark::Face(1)]), Decimal::ZERO);
    }

    #[test]
    fn test_categorical_then_face() {
        assert_eq!(reward("114", dec!(10), &[Mark::Small, Mark::Face(1)]), dec!(33));
        assert_eq!(reward("114", dec!(10), &[Mark::Small, Mark::Face(5)]), Decimal::ZERO);
        assert_eq!(reward("114", dec!(10), &[Mark::Big, Mark::Face(1)]), Decimal::ZERO);
    }

    #[test]
    fn test_two_faces() {
        assert_eq!(reward("125", dec!(10), &[Mark::Face(1), Mark::Face(2)]), dec!(60));
        assert_eq!(reward("115", dec!(10), &[Mark::Face(1), Mark::Face(5)]), dec!(60));
        assert_eq!(reward("125", dec!(10), &[Mark::Face(1), Mark::Face(3)]), Decimal::ZERO);
    }

    #[test]
    fn test_face_then_categorical_uses_literal_fold() {
        // The face is evaluated before the categorical has matched, so it
        // takes its own rate and the categorical then lifts it to 3.3.
        assert_eq!(reward("114", dec!(10), &[Mark::Face(1), Mark::Small]), dec!(33));
        // A lone face seen once gives 2; the categorical replaces it.
        assert_eq!(reward("146", dec!(10), &[Mark::Face(1), Mark::Odd]), dec!(33));
        // The categorical still loses the whole bet when out of range.
        assert_eq!(reward("114", dec!(10), &[Mark::Face(1), Mark::Big]), Decimal::ZERO);
    }

    #[test]
    fn test_empty_selector_pays_nothing() {
        assert_eq!(reward("123", dec!(10), &[]), Decimal::ZERO);
    }

    #[test]
    fn test_fractional_stake() {
        assert_eq!(reward("114", dec!(2.5), &[Mark::Small, Mark::Face(4)]), dec!(8.25));
    }

    #[test]
    fn test_reward_overflow_is_none() {
        let outcome: Outcome = "126".parse().unwrap();
        let two_faces = Selector::new(vec![Mark::Face(1), Mark::Face(2)]);
        assert_eq!(calculate_reward(&outcome, Decimal::MAX, &two_faces), None);
        // A losing bet never overflows.
        let big = Selector::new(vec![Mark::Big]);
        assert_eq!(calculate_reward(&outcome, Decimal::MAX, &big), Some(Decimal::ZERO));
    }
}
