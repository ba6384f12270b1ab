use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use tracing::debug;

use super::abi::{decode_returns, BatchCall, IMulticall};
use super::rpc::ContractReader;
use crate::types::{ScannerError, ScannerResult};

/// Executes many independent contract reads in one round trip.
///
/// Implementations must return exactly one result per call, in call order.
/// A failure of the batch as a whole is returned as an error; no partial
/// results are ever handed back.
#[async_trait]
pub trait BatchCaller: Send + Sync {
    async fn aggregate(&self, calls: Vec<BatchCall>) -> ScannerResult<Vec<Bytes>>;
}

/// Reject a batch response that cannot be matched index-wise to its calls
pub fn ensure_positional<T>(expected: usize, results: &[T]) -> ScannerResult<()> {
    if results.len() != expected {
        return Err(ScannerError::BatchLength {
            expected,
            actual: results.len(),
        });
    }
    Ok(())
}

/// [`BatchCaller`] that goes through an on-chain Multicall contract
pub struct Multicall {
    address: Address,
    reader: Arc<dyn ContractReader>,
}

impl Multicall {
    pub fn new(address: Address, reader: Arc<dyn ContractReader>) -> Self {
        Self { address, reader }
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

#[async_trait]
impl BatchCaller for Multicall {
    async fn aggregate(&self, calls: Vec<BatchCall>) -> ScannerResult<Vec<Bytes>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let expected = calls.len();
        let request = IMulticall::aggregateCall {
            calls: calls.into_iter().map(Into::into).collect(),
        };

        let output = self
            .reader
            .call(self.address, request.abi_encode().into())
            .await?;
        let response = decode_returns::<IMulticall::aggregateCall>(&output)?;

        debug!(
            "🧮 Multicall 응답: {}개 호출 (블록 {})",
            response.returnData.len(),
            response.blockNumber
        );

        ensure_positional(expected, &response.returnData)?;
        Ok(response.returnData)
    }
}

/// Outcome of a single batch entry whose payload carries an in-band error code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEntry<T> {
    Ok(T),
    ContractError(U256),
}

impl<T> BatchEntry<T> {
    /// Tag `value` with the protocol error code returned alongside it
    pub fn from_code(code: U256, value: T) -> Self {
        if code.is_zero() {
            BatchEntry::Ok(value)
        } else {
            BatchEntry::ContractError(code)
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, BatchEntry::Ok(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::abi::{IComptroller, IERC20Metadata};
    use crate::mocks::{encode_one, MockLedger};

    fn multicall_address() -> Address {
        Address::repeat_byte(0xee)
    }

    #[tokio::test]
    async fn test_results_follow_call_order() {
        let ledger = MockLedger::new().with_multicall(multicall_address());
        let mut calls = Vec::new();
        for i in 1..=8u8 {
            let token = Address::repeat_byte(i);
            let call = IERC20Metadata::nameCall {};
            ledger
                .respond(token, &call, encode_one(format!("token-{i}")))
                .await;
            calls.push(BatchCall::new(token, &call));
        }

        let multicall = Multicall::new(multicall_address(), Arc::new(ledger.clone()));
        let results = multicall.aggregate(calls).await.unwrap();

        assert_eq!(results.len(), 8);
        for (i, data) in results.iter().enumerate() {
            let name = decode_returns::<IERC20Metadata::nameCall>(data).unwrap();
            assert_eq!(name, format!("token-{}", i + 1));
        }
        assert_eq!(ledger.round_trips(), 1);
    }

    #[tokio::test]
    async fn test_mixed_methods_in_one_batch() {
        let comptroller = Address::repeat_byte(0x01);
        let account = Address::repeat_byte(0x02);
        let market = Address::repeat_byte(0x03);
        let ledger = MockLedger::new().with_multicall(multicall_address());

        let assets = IComptroller::getAssetsInCall { account };
        let decimals = IERC20Metadata::decimalsCall {};
        ledger
            .respond(comptroller, &assets, encode_one(vec![market]))
            .await;
        ledger.respond(market, &decimals, encode_one(U256::from(18u8))).await;

        let multicall = Multicall::new(multicall_address(), Arc::new(ledger));
        let results = multicall
            .aggregate(vec![
                BatchCall::new(market, &decimals),
                BatchCall::new(comptroller, &assets),
            ])
            .await
            .unwrap();

        assert_eq!(decode_returns::<IERC20Metadata::decimalsCall>(&results[0]).unwrap(), 18);
        assert_eq!(
            decode_returns::<IComptroller::getAssetsInCall>(&results[1]).unwrap(),
            vec![market]
        );
    }

    #[tokio::test]
    async fn test_empty_batch_skips_network() {
        let ledger = MockLedger::new().with_multicall(multicall_address());
        let multicall = Multicall::new(multicall_address(), Arc::new(ledger.clone()));

        assert!(multicall.aggregate(Vec::new()).await.unwrap().is_empty());
        assert_eq!(ledger.round_trips(), 0);
    }

    #[tokio::test]
    async fn test_short_response_is_hard_error() {
        let token = Address::repeat_byte(0x05);
        let call = IERC20Metadata::decimalsCall {};
        let ledger = MockLedger::new().with_multicall(multicall_address());
        ledger.respond(token, &call, encode_one(U256::from(6u8))).await;
        ledger.drop_last_batch_entry(true);

        let multicall = Multicall::new(multicall_address(), Arc::new(ledger));
        let err = multicall
            .aggregate(vec![BatchCall::new(token, &call), BatchCall::new(token, &call)])
            .await
            .unwrap_err();

        assert!(matches!(err, ScannerError::BatchLength { expected: 2, actual: 1 }));
    }

    #[tokio::test]
    async fn test_transport_failure_aborts_batch() {
        let token = Address::repeat_byte(0x05);
        let call = IERC20Metadata::decimalsCall {};
        let ledger = MockLedger::new().with_multicall(multicall_address());
        ledger.respond(token, &call, encode_one(U256::from(6u8))).await;
        ledger.set_offline(true);

        let multicall = Multicall::new(multicall_address(), Arc::new(ledger));
        let err = multicall
            .aggregate(vec![BatchCall::new(token, &call)])
            .await
            .unwrap_err();

        assert!(matches!(err, ScannerError::Transport(_)));
    }

    #[test]
    fn test_batch_entry_tags_error_code() {
        assert_eq!(BatchEntry::from_code(U256::ZERO, 7u32), BatchEntry::Ok(7));
        assert_eq!(
            BatchEntry::from_code(U256::from(3u64), 7u32),
            BatchEntry::ContractError(U256::from(3u64))
        );
    }
}
