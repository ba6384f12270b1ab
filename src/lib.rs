// Comptroller shortfall monitor library

pub mod config;
pub mod common;
pub mod core;
pub mod protocols;
pub mod mocks;
pub mod blockchain;

// Core types
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use core::{BorrowerCache, ShortfallMonitor};
pub use protocols::{AssetResolver, MarketRegistry, ShortfallScanner};
pub use common::format_balance;
pub use types::{ScannerError, ScannerResult};
