use std::collections::{HashMap, HashSet};

use alloy::primitives::{Address, U256};
use tracing::{debug, info};

use crate::blockchain::abi::{ICToken, IComptroller, IERC20Metadata, IPriceOracle};
use crate::blockchain::{decode_returns, ensure_positional, read_contract, BatchCall, BatchCaller, ContractReader};
use crate::types::{ScannerResult, UnderlyingInfo};

/// Markets listed by the comptroller, classified once at startup.
///
/// Borrow markets had outstanding borrows when the process started; every
/// listed market is a lend market. The classification is never refreshed,
/// so markets listed later are unknown to the resolver.
#[derive(Debug, Clone, Default)]
pub struct MarketRegistry {
    oracle: Address,
    lend_markets: Vec<Address>,
    borrow_markets: HashSet<Address>,
    underlying: HashMap<Address, UnderlyingInfo>,
}

impl MarketRegistry {
    pub fn new(
        oracle: Address,
        lend_markets: Vec<Address>,
        borrow_markets: HashSet<Address>,
        underlying: HashMap<Address, UnderlyingInfo>,
    ) -> Self {
        Self {
            oracle,
            lend_markets,
            borrow_markets,
            underlying,
        }
    }

    /// Query every listed market's borrows and underlying token metadata
    pub async fn discover(reader: &dyn ContractReader, comptroller: Address) -> ScannerResult<Self> {
        info!("🏦 컴트롤러 마켓 조회 중...");

        let oracle = read_contract(reader, comptroller, &IComptroller::oracleCall {}).await?;
        let markets = read_contract(reader, comptroller, &IComptroller::getAllMarketsCall {}).await?;

        let mut borrow_markets = HashSet::new();
        let mut underlying = HashMap::with_capacity(markets.len());

        for &market in &markets {
            let total_borrows = read_contract(reader, market, &ICToken::totalBorrowsCall {}).await?;
            if total_borrows > U256::ZERO {
                borrow_markets.insert(market);
            }

            let token = read_contract(reader, market, &ICToken::underlyingCall {}).await?;
            let name = read_contract(reader, token, &IERC20Metadata::nameCall {}).await?;
            let decimals = read_contract(reader, token, &IERC20Metadata::decimalsCall {}).await?;
            debug!("마켓 {} 기초 자산 {} (소수점 {}자리)", market, name, decimals);

            underlying.insert(market, UnderlyingInfo { name, decimals });
        }

        info!(
            "✅ 마켓 {}개 발견 (대출 잔액 있는 마켓 {}개)",
            markets.len(),
            borrow_markets.len()
        );

        Ok(Self::new(oracle, markets, borrow_markets, underlying))
    }

    pub fn oracle(&self) -> Address {
        self.oracle
    }

    pub fn lend_markets(&self) -> &[Address] {
        &self.lend_markets
    }

    pub fn is_borrow_market(&self, market: &Address) -> bool {
        self.borrow_markets.contains(market)
    }

    pub fn underlying(&self, market: &Address) -> Option<&UnderlyingInfo> {
        self.underlying.get(market)
    }

    /// Log every market with its symbol and oracle price, in one batch
    pub async fn log_markets(&self, batcher: &dyn BatchCaller, explorer_url: &str) -> ScannerResult<()> {
        if self.lend_markets.is_empty() {
            return Ok(());
        }

        let calls: Vec<BatchCall> = self
            .lend_markets
            .iter()
            .flat_map(|&market| {
                [
                    BatchCall::new(market, &ICToken::symbolCall {}),
                    BatchCall::new(self.oracle, &IPriceOracle::getUnderlyingPriceCall { cToken: market }),
                ]
            })
            .collect();

        let results = batcher.aggregate(calls).await?;
        ensure_positional(self.lend_markets.len() * 2, &results)?;

        info!("📊 마켓 목록");
        for (market, pair) in self.lend_markets.iter().zip(results.chunks_exact(2)) {
            let symbol = decode_returns::<ICToken::symbolCall>(&pair[0])?;
            let price = decode_returns::<IPriceOracle::getUnderlyingPriceCall>(&pair[1])?;
            let borrowable = if self.is_borrow_market(market) { " [대출]" } else { "" };
            info!(
                "  - {}/address/{} ({}){} 가격: {}",
                explorer_url.trim_end_matches('/'),
                market,
                symbol,
                borrowable,
                price
            );
        }

        Ok(())
    }
}
