//! End-to-end rounds through the house facade.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use dice_house::engine::parser::{BetParser, ParseError};
use dice_house::engine::House;
use dice_house::storage::{MemoryStore, Store};
use dice_house::types::{EngineError, PhaseKind};

use crate::flaky_store::FlakyStore;

async fn house_over(store: Arc<dyn Store>) -> House {
    House::start(store, BetParser::default()).await.unwrap()
}

async fn fund(house: &House, key: &str, amount: Decimal) {
    let p = house.participant(key, key).await.unwrap();
    house.deposit(p.id, amount).await.unwrap();
}

async fn bet(house: &House, key: &str, text: &str) -> Result<usize, EngineError> {
    let slip = house.parse_message(text).unwrap();
    house.place_bet(key, &slip).await.map(|bets| bets.len())
}

#[tokio::test]
async fn test_two_rounds_with_several_players() {
    let house = house_over(Arc::new(MemoryStore::new())).await;
    fund(&house, "ann", dec!(100)).await;
    fund(&house, "bob", dec!(100)).await;
    fund(&house, "cat", dec!(100)).await;

    // Round 1: low sum with a pair of ones.
    assert_eq!(house.open_round().await.unwrap(), 1001);
    bet(&house, "ann", "s 10\n1 10").await.unwrap();
    bet(&house, "bob", "b 20").await.unwrap();
    bet(&house, "cat", "s1 10").await.unwrap();
    house.lock_round().await.unwrap();
    let first = house.settle_round("114").await.unwrap();

    assert_eq!(first.total_staked, dec!(50));
    assert_eq!(first.total_rewarded, dec!(83));
    let nets: Vec<_> = first.participants.iter().map(|p| p.net).collect();
    assert_eq!(nets, vec![dec!(30), dec!(-20), dec!(23)]);
    assert_eq!(house.get_balance("ann").await.unwrap(), dec!(130));
    assert_eq!(house.get_balance("bob").await.unwrap(), dec!(80));
    assert_eq!(house.get_balance("cat").await.unwrap(), dec!(123));

    // Round 2: a triple beats every categorical bet.
    assert_eq!(house.open_round().await.unwrap(), 1002);
    bet(&house, "ann", "b 30").await.unwrap();
    bet(&house, "bob", "5 10").await.unwrap();
    house.lock_round().await.unwrap();
    let second = house.settle_round("555").await.unwrap();
    assert_eq!(second.participants[0].reward, Decimal::ZERO);
    assert_eq!(second.participants[1].reward, dec!(40));
    assert_eq!(house.get_balance("ann").await.unwrap(), dec!(100));
    assert_eq!(house.get_balance("bob").await.unwrap(), dec!(110));

    let results: Vec<String> =
        house.list_recent_results(10).await.unwrap().iter().map(|r| r.to_string()).collect();
    assert_eq!(results, vec!["#1001 114", "#1002 555"]);
}

#[tokio::test]
async fn test_double_open_and_double_settle() {
    let house = house_over(Arc::new(MemoryStore::new())).await;
    fund(&house, "ann", dec!(50)).await;

    house.open_round().await.unwrap();
    assert!(matches!(house.open_round().await, Err(EngineError::AlreadyOpen(1001))));

    bet(&house, "ann", "s 10").await.unwrap();
    house.lock_round().await.unwrap();
    house.settle_round("123").await.unwrap();
    assert_eq!(house.get_balance("ann").await.unwrap(), dec!(60));

    let err = house.settle_round("123").await.unwrap_err();
    assert!(matches!(err, EngineError::WrongState { expected: PhaseKind::Locked, .. }));
    assert_eq!(house.get_balance("ann").await.unwrap(), dec!(60));
}

#[tokio::test]
async fn test_bet_and_cancel_restore_balance() {
    let house = house_over(Arc::new(MemoryStore::new())).await;
    fund(&house, "ann", dec!(75)).await;
    house.open_round().await.unwrap();

    assert_eq!(bet(&house, "ann", "b 25\no 5").await.unwrap(), 2);
    assert_eq!(house.get_balance("ann").await.unwrap(), dec!(45));
    assert_eq!(house.cancel_bets("ann").await.unwrap(), dec!(30));
    assert_eq!(house.get_balance("ann").await.unwrap(), dec!(75));

    let err = bet(&house, "ann", "b 80").await.unwrap_err();
    assert!(matches!(err, EngineError::InsufficientBalance { .. }));
    assert_eq!(house.get_balance("ann").await.unwrap(), dec!(75));
}

#[tokio::test]
async fn test_parser_acceptance() {
    let house = house_over(Arc::new(MemoryStore::new())).await;
    assert!(matches!(house.parse_line("55 10"), Err(ParseError::DuplicateFace(5))));
    assert!(matches!(house.parse_line("ss3 10"), Err(ParseError::DuplicateCategory)));
    assert_eq!(house.parse_line("s3 10").unwrap().selector.to_string(), "small+3");
}

#[tokio::test]
async fn test_failed_result_write_leaves_round_locked() {
    let store = Arc::new(FlakyStore::new());
    let house = house_over(store.clone()).await;
    fund(&house, "ann", dec!(20)).await;
    house.open_round().await.unwrap();
    bet(&house, "ann", "s 10").await.unwrap();
    house.lock_round().await.unwrap();

    store.fail("update_round");
    let err = house.settle_round("123").await.unwrap_err();
    assert!(matches!(err, EngineError::StorageUnavailable(_)));
    assert_eq!(house.status().await.unwrap().phase, PhaseKind::Locked);
    assert_eq!(house.get_balance("ann").await.unwrap(), dec!(10));

    store.heal();
    house.settle_round("123").await.unwrap();
    assert_eq!(house.get_balance("ann").await.unwrap(), dec!(30));
}

#[tokio::test]
async fn test_failure_after_commit_never_pays_twice() {
    let store = Arc::new(FlakyStore::new());
    let house = house_over(store.clone()).await;
    fund(&house, "ann", dec!(20)).await;
    house.open_round().await.unwrap();
    bet(&house, "ann", "s 10").await.unwrap();
    house.lock_round().await.unwrap();

    store.fail("set_bet_reward");
    let err = house.settle_round("123").await.unwrap_err();
    assert!(matches!(err, EngineError::StorageUnavailable(_)));
    store.heal();

    // The result is recorded, so the round cannot be settled again.
    assert_eq!(house.status().await.unwrap().phase, PhaseKind::Idle);
    assert!(matches!(house.settle_round("123").await, Err(EngineError::WrongState { .. })));
    assert_eq!(house.get_balance("ann").await.unwrap(), dec!(10));
}

#[tokio::test]
async fn test_failed_bet_insert_keeps_debit() {
    let store = Arc::new(FlakyStore::new());
    let house = house_over(store.clone()).await;
    fund(&house, "ann", dec!(20)).await;
    house.open_round().await.unwrap();

    store.fail("insert_bets");
    let err = bet(&house, "ann", "b 5").await.unwrap_err();
    assert!(matches!(err, EngineError::StorageUnavailable(_)));
    store.heal();

    assert_eq!(house.get_balance("ann").await.unwrap(), dec!(15));
    assert!(matches!(house.cancel_bets("ann").await, Err(EngineError::NoBets)));
}
