//! Rounds surviving a house restart on the SQLite store.

use rust_decimal_macros::dec;
use std::sync::Arc;

use dice_house::engine::parser::BetParser;
use dice_house::engine::House;
use dice_house::storage::{SqliteStore, Store};
use dice_house::types::{EngineError, PhaseKind};

async fn sqlite() -> Arc<dyn Store> {
    Arc::new(SqliteStore::connect("sqlite::memory:", 1).await.unwrap())
}

#[tokio::test]
async fn test_restart_resumes_open_round() {
    let store = sqlite().await;

    let house = House::start(store.clone(), BetParser::default()).await.unwrap();
    let ann = house.participant("U-ann", "ann").await.unwrap();
    house.deposit(ann.id, dec!(100)).await.unwrap();
    house.open_round().await.unwrap();
    let slip = house.parse_message("o4 10\nb 15").unwrap();
    house.place_bet("U-ann", &slip).await.unwrap();
    drop(house);

    let house = House::start(store, BetParser::default()).await.unwrap();
    let status = house.status().await.unwrap();
    assert_eq!(status.phase, PhaseKind::Open);
    assert_eq!(status.round_id, Some(1001));
    assert_eq!(status.bets, 2);
    assert_eq!(status.staked, dec!(25));
    assert!(matches!(house.open_round().await, Err(EngineError::AlreadyOpen(1001))));

    let summary = house.list_open_bets_summary(1001).await.unwrap();
    assert_eq!(summary[0].details, "odd+4=10 big=15");

    house.lock_round().await.unwrap();
    // 4 + 4 + 5 = 13: odd and big both hit, the face shows twice.
    let settlement = house.settle_round("445").await.unwrap();
    assert_eq!(settlement.total_rewarded, dec!(63));
    assert_eq!(house.get_balance("U-ann").await.unwrap(), dec!(138));
    assert_eq!(house.open_round().await.unwrap(), 1002);
}

#[tokio::test]
async fn test_bank_account_persists() {
    let store = sqlite().await;
    let house = House::start(store.clone(), BetParser::default()).await.unwrap();
    house.set_bank_account("ACME 001").await.unwrap();
    drop(house);

    let house = House::start(store, BetParser::default()).await.unwrap();
    assert_eq!(house.bank_account().await.unwrap().as_deref(), Some("ACME 001"));
}
