use alloy::primitives::{Address, U256};
use std::fmt;

/// An account known to the comptroller together with the markets it has entered.
///
/// `shortfall` stays `None` while the borrower sits in the cache and is only
/// populated by the shortfall scanner for accounts found underwater.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Borrower {
    pub address: Address,
    pub markets: Vec<Address>,
    pub shortfall: Option<U256>,
}

impl Borrower {
    pub fn new(address: Address, markets: Vec<Address>) -> Self {
        Self {
            address,
            markets,
            shortfall: None,
        }
    }

    pub fn with_shortfall(mut self, shortfall: U256) -> Self {
        self.shortfall = Some(shortfall);
        self
    }
}

/// Name and precision of the token wrapped by a market
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnderlyingInfo {
    pub name: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionKind {
    Supplied,
    Borrowed,
}

impl fmt::Display for PositionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionKind::Supplied => write!(f, "supplied"),
            PositionKind::Borrowed => write!(f, "borrowed"),
        }
    }
}

/// One line of an account's exposure report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPosition {
    pub market: Address,
    pub asset_name: String,
    pub kind: PositionKind,
    /// Raw amount in the underlying token's smallest unit
    pub amount: U256,
    pub decimals: u8,
}

impl AssetPosition {
    /// Human readable amount, see [`crate::common::format_balance`].
    pub fn formatted_amount(&self) -> ScannerResult<String> {
        crate::common::format_balance(self.amount, self.decimals)
    }
}

impl fmt::Display for AssetPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.formatted_amount() {
            Ok(amount) => write!(f, "{} {} {}", self.kind, amount, self.asset_name),
            // Unsupported precision falls back to the raw amount
            Err(_) => write!(f, "{} {} raw units of {}", self.kind, self.amount, self.asset_name),
        }
    }
}

/// Per-market supply/borrow exposure of a single underwater account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountReport {
    pub account: Address,
    pub shortfall: Option<U256>,
    pub positions: Vec<AssetPosition>,
}

impl AccountReport {
    pub fn supplied(&self) -> impl Iterator<Item = &AssetPosition> {
        self.positions.iter().filter(|p| p.kind == PositionKind::Supplied)
    }

    pub fn borrowed(&self) -> impl Iterator<Item = &AssetPosition> {
        self.positions.iter().filter(|p| p.kind == PositionKind::Borrowed)
    }
}

/// Error types
#[derive(thiserror::Error, Debug)]
pub enum ScannerError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode {method} output: {reason}")]
    Decode { method: &'static str, reason: String },

    #[error("Batch returned {actual} results for {expected} calls")]
    BatchLength { expected: usize, actual: usize },

    #[error("No support for {0} decimals")]
    UnsupportedDecimals(u8),

    #[error("Market {0} was not listed at startup")]
    UnknownMarket(Address),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias
pub type ScannerResult<T> = Result<T, ScannerError>;
