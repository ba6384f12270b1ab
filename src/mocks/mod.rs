//! Test doubles for the ledger connection

pub mod ledger_mock;

pub use ledger_mock::{encode_liquidity, encode_one, MockLedger};
