use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tracing::{debug, info, warn};

use crate::blockchain::abi::IComptroller;
use crate::blockchain::{decode_returns, ensure_positional, BatchCall, BatchCaller, BatchEntry};
use crate::types::{Borrower, ScannerResult};

/// Liquidity and shortfall of one account, both in the oracle's unit of account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLiquidity {
    pub liquidity: U256,
    pub shortfall: U256,
}

impl AccountLiquidity {
    /// Strict comparison; equal liquidity and shortfall is not underwater
    pub fn is_underwater(&self) -> bool {
        self.liquidity < self.shortfall
    }
}

/// Finds underwater borrowers with one batched `getAccountLiquidity` round trip
pub struct ShortfallScanner {
    comptroller: Address,
    batcher: Arc<dyn BatchCaller>,
}

impl ShortfallScanner {
    pub fn new(comptroller: Address, batcher: Arc<dyn BatchCaller>) -> Self {
        Self { comptroller, batcher }
    }

    /// Return the underwater subset of `borrowers`, worst shortfall first.
    ///
    /// An empty input means the cache is not primed and makes no network call.
    pub async fn scan(&self, borrowers: &[Borrower]) -> ScannerResult<Vec<Borrower>> {
        if borrowers.is_empty() {
            return Ok(Vec::new());
        }

        let calls: Vec<BatchCall> = borrowers
            .iter()
            .map(|b| {
                BatchCall::new(
                    self.comptroller,
                    &IComptroller::getAccountLiquidityCall { account: b.address },
                )
            })
            .collect();

        let results = self.batcher.aggregate(calls).await?;
        ensure_positional(borrowers.len(), &results)?;

        let mut underwater = Vec::new();
        for (borrower, data) in borrowers.iter().zip(results.iter()) {
            match decode_liquidity(data)? {
                BatchEntry::ContractError(code) => {
                    warn!(
                        "⚠️ 계정 {} 유동성 조회 중 컨트랙트 오류 {}; 건너뜀",
                        borrower.address, code
                    );
                }
                BatchEntry::Ok(account) if account.is_underwater() => {
                    underwater.push(
                        Borrower::new(borrower.address, borrower.markets.clone())
                            .with_shortfall(account.shortfall),
                    );
                }
                BatchEntry::Ok(_) => {}
            }
        }

        rank_by_shortfall(&mut underwater);

        debug!("차입자 {}명 확인", borrowers.len());
        info!("🔍 담보 부족 계정 {}개 발견", underwater.len());
        Ok(underwater)
    }
}

/// Decode a `getAccountLiquidity` payload into a tagged entry
pub fn decode_liquidity(data: &[u8]) -> ScannerResult<BatchEntry<AccountLiquidity>> {
    let out = decode_returns::<IComptroller::getAccountLiquidityCall>(data)?;
    Ok(BatchEntry::from_code(
        out.errorCode,
        AccountLiquidity {
            liquidity: out.liquidity,
            shortfall: out.shortfall,
        },
    ))
}

/// Stable sort by shortfall, largest first. Equal shortfalls keep their order.
pub fn rank_by_shortfall(accounts: &mut [Borrower]) {
    accounts.sort_by(|a, b| b.shortfall.cmp(&a.shortfall));
}
