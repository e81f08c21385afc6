//! Core engine: parse bets, run rounds, settle the ledger.

pub mod parser;
pub mod odds;
pub mod round;
pub mod ledger;
pub mod house;
pub mod commands;

pub use house::House;
