use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tracing::debug;

use super::markets::MarketRegistry;
use crate::blockchain::abi::ICToken;
use crate::blockchain::{read_contract, ContractReader};
use crate::types::{AccountReport, AssetPosition, PositionKind, ScannerError, ScannerResult};

/// Turns an account's market memberships into supply and borrow positions.
///
/// Membership alone does not say which side of a market the account is on.
/// Borrow markets are probed with `borrowBalanceStored`, and a zero balance
/// there is read as a supply-side membership and left out. Every other market
/// is reported as supplied, using `balanceOfUnderlying`.
pub struct AssetResolver {
    reader: Arc<dyn ContractReader>,
    registry: Arc<MarketRegistry>,
}

impl AssetResolver {
    pub fn new(reader: Arc<dyn ContractReader>, registry: Arc<MarketRegistry>) -> Self {
        Self { reader, registry }
    }

    pub async fn resolve(&self, account: Address, markets: &[Address]) -> ScannerResult<AccountReport> {
        let mut positions = Vec::with_capacity(markets.len());

        for &market in markets {
            let info = self
                .registry
                .underlying(&market)
                .ok_or(ScannerError::UnknownMarket(market))?;

            let (kind, amount) = if self.registry.is_borrow_market(&market) {
                let borrowed = read_contract(
                    self.reader.as_ref(),
                    market,
                    &ICToken::borrowBalanceStoredCall { account },
                )
                .await?;
                if borrowed == U256::ZERO {
                    debug!("계정 {} {} 부채 없음; 공급으로 간주", account, info.name);
                    continue;
                }
                (PositionKind::Borrowed, borrowed)
            } else {
                let supplied = read_contract(
                    self.reader.as_ref(),
                    market,
                    &ICToken::balanceOfUnderlyingCall { owner: account },
                )
                .await?;
                (PositionKind::Supplied, supplied)
            };

            positions.push(AssetPosition {
                market,
                asset_name: info.name.clone(),
                kind,
                amount,
                decimals: info.decimals,
            });
        }

        Ok(AccountReport {
            account,
            shortfall: None,
            positions,
        })
    }
}
