use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::blockchain::abi::IMulticall;
use crate::blockchain::rpc::ContractReader;
use crate::types::{ScannerError, ScannerResult};

/// Block number reported by mocked multicall responses
const MOCK_BLOCK_NUMBER: u64 = 18_000_000;

#[derive(Debug, Clone)]
enum MockResponse {
    Return(Bytes),
    Revert,
}

/// In-memory ledger node answering pre-registered contract calls.
///
/// Calls to the configured multicall address are unpacked and every inner
/// call is answered from the same table, so the real [`crate::blockchain::Multicall`]
/// encoding path is exercised end to end.
#[derive(Clone, Default)]
pub struct MockLedger {
    multicall: Option<Address>,
    responses: Arc<RwLock<HashMap<(Address, Bytes), MockResponse>>>,
    round_trips: Arc<AtomicUsize>,
    latency: Option<Duration>,
    offline: Arc<AtomicBool>,
    drop_last_entry: Arc<AtomicBool>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_multicall(mut self, address: Address) -> Self {
        self.multicall = Some(address);
        self
    }

    /// Delay every round trip, to simulate network latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register the raw return data for `call` sent to `target`
    pub async fn respond<C: SolCall>(&self, target: Address, call: &C, returns: Vec<u8>) {
        let key = (target, Bytes::from(call.abi_encode()));
        self.responses
            .write()
            .await
            .insert(key, MockResponse::Return(returns.into()));
    }

    /// Make `call` sent to `target` revert
    pub async fn revert<C: SolCall>(&self, target: Address, call: &C) {
        let key = (target, Bytes::from(call.abi_encode()));
        self.responses.write().await.insert(key, MockResponse::Revert);
    }

    /// Simulate an unreachable node
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Simulate a malformed aggregate response missing its last entry
    pub fn drop_last_batch_entry(&self, enabled: bool) {
        self.drop_last_entry.store(enabled, Ordering::SeqCst);
    }

    /// Number of `eth_call` round trips served so far
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    async fn lookup(&self, target: Address, data: &Bytes) -> ScannerResult<Bytes> {
        let responses = self.responses.read().await;
        match responses.get(&(target, data.clone())) {
            Some(MockResponse::Return(output)) => Ok(output.clone()),
            Some(MockResponse::Revert) => Err(ScannerError::Transport(format!(
                "execution reverted: {target}"
            ))),
            None => Err(ScannerError::Transport(format!(
                "no mock response for 0x{} on {}",
                hex::encode(&data[..data.len().min(4)]),
                target
            ))),
        }
    }

    async fn aggregate(&self, data: &Bytes) -> ScannerResult<Bytes> {
        let request = IMulticall::aggregateCall::abi_decode(data)
            .map_err(|e| ScannerError::Transport(format!("malformed aggregate: {e}")))?;

        // Multicall v1 reverts as a whole when any inner call fails
        let mut return_data = Vec::with_capacity(request.calls.len());
        for call in &request.calls {
            return_data.push(self.lookup(call.target, &call.callData).await?);
        }

        if self.drop_last_entry.load(Ordering::SeqCst) {
            return_data.pop();
        }

        debug!("🎭 [MOCK] aggregate 호출 {}개 응답", return_data.len());
        Ok((U256::from(MOCK_BLOCK_NUMBER), return_data)
            .abi_encode_params()
            .into())
    }
}

#[async_trait]
impl ContractReader for MockLedger {
    async fn call(&self, target: Address, data: Bytes) -> ScannerResult<Bytes> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(ScannerError::Transport("mock ledger offline".to_string()));
        }

        if Some(target) == self.multicall && data.starts_with(&IMulticall::aggregateCall::SELECTOR) {
            return self.aggregate(&data).await;
        }

        self.lookup(target, &data).await
    }
}

/// ABI-encode a single return value
pub fn encode_one<T: SolValue>(value: T) -> Vec<u8> {
    (value,).abi_encode_params()
}

/// ABI-encode a `getAccountLiquidity` result triple
pub fn encode_liquidity(error_code: u64, liquidity: u64, shortfall: u64) -> Vec<u8> {
    (
        U256::from(error_code),
        U256::from(liquidity),
        U256::from(shortfall),
    )
        .abi_encode_params()
}
