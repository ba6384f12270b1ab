//! Shared helpers used across the scanner pipeline

pub mod formatting;

pub use formatting::format_balance;
