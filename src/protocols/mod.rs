//! Compound-style comptroller logic: market classification, shortfall
//! detection and per-account asset resolution.

pub mod markets;
pub mod resolver;
pub mod shortfall;

pub use markets::MarketRegistry;
pub use resolver::AssetResolver;
pub use shortfall::{rank_by_shortfall, AccountLiquidity, ShortfallScanner};
