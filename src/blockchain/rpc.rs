use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use ethers::{
    providers::{Middleware, Provider, Ws},
    types::{transaction::eip2718::TypedTransaction, TransactionRequest, H160},
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::abi::decode_returns;
use crate::types::{ScannerError, ScannerResult};

/// Read-only access to contract state on the ledger node
#[async_trait]
pub trait ContractReader: Send + Sync {
    /// Execute `eth_call` against the latest block and return the raw output
    async fn call(&self, target: Address, data: Bytes) -> ScannerResult<Bytes>;
}

/// Encode `call`, send it to `target` and decode the typed result
pub async fn read_contract<C: SolCall>(
    reader: &dyn ContractReader,
    target: Address,
    call: &C,
) -> ScannerResult<C::Return> {
    let output = reader.call(target, call.abi_encode().into()).await?;
    decode_returns::<C>(&output)
}

/// [`ContractReader`] backed by an ethers provider (HTTP or WebSocket)
pub struct EthersReader<M> {
    provider: Arc<M>,
}

impl<M: Middleware> EthersReader<M> {
    pub fn new(provider: Arc<M>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<M: Middleware + 'static> ContractReader for EthersReader<M> {
    async fn call(&self, target: Address, data: Bytes) -> ScannerResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new()
            .to(H160::from_slice(target.as_slice()))
            .data(data.to_vec())
            .into();

        let output = self
            .provider
            .call(&tx, None)
            .await
            .map_err(|e| ScannerError::Transport(e.to_string()))?;

        Ok(Bytes::from(output.to_vec()))
    }
}

/// New block notifications from a WebSocket subscription
pub struct BlockSource {
    provider: Arc<Provider<Ws>>,
    reconnect_delay: Duration,
}

impl BlockSource {
    pub fn new(provider: Arc<Provider<Ws>>) -> Self {
        Self {
            provider,
            reconnect_delay: Duration::from_secs(5),
        }
    }

    /// Forward block numbers into `sink` until the receiver goes away.
    ///
    /// A dropped or failed subscription is logged and re-established after
    /// `reconnect_delay`.
    pub async fn forward(self, sink: mpsc::Sender<u64>) {
        loop {
            match self.provider.subscribe_blocks().await {
                Ok(mut stream) => {
                    info!("📡 새 블록 헤더 구독 시작");
                    while let Some(block) = stream.next().await {
                        let number = block.number.map(|n| n.as_u64()).unwrap_or_default();
                        debug!("📦 새 블록 {}", number);
                        if sink.send(number).await.is_err() {
                            return;
                        }
                    }
                    warn!("⚠️ 블록 구독 종료됨");
                }
                Err(e) => {
                    warn!("⚠️ 구독 오류: {}", e);
                }
            }

            if sink.is_closed() {
                return;
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }
}
