use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::schedule::Schedule;
use crate::blockchain::abi::IComptroller;
use crate::blockchain::{decode_returns, ensure_positional, read_contract, BatchCall, BatchCaller, ContractReader};
use crate::types::{Borrower, ScannerResult};

/// A complete, immutable view of the comptroller's borrowers
#[derive(Debug, Clone, Default)]
pub struct BorrowerSnapshot {
    /// Number of successful refreshes that produced this snapshot, 0 if never primed
    pub version: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub borrowers: Vec<Borrower>,
}

impl BorrowerSnapshot {
    pub fn is_primed(&self) -> bool {
        self.version > 0
    }
}

/// Periodically refreshed cache of borrowers and the markets they entered.
///
/// Readers always see a whole snapshot. A refresh builds the next snapshot
/// without holding any lock and only takes the write lock to swap it in.
pub struct BorrowerCache {
    comptroller: Address,
    reader: Arc<dyn ContractReader>,
    batcher: Arc<dyn BatchCaller>,
    snapshot: RwLock<Arc<BorrowerSnapshot>>,
}

impl BorrowerCache {
    pub fn new(
        comptroller: Address,
        reader: Arc<dyn ContractReader>,
        batcher: Arc<dyn BatchCaller>,
    ) -> Self {
        Self {
            comptroller,
            reader,
            batcher,
            snapshot: RwLock::new(Arc::new(BorrowerSnapshot::default())),
        }
    }

    /// Independent copy of the latest committed borrowers.
    ///
    /// Empty until the first refresh succeeds; callers must treat that as
    /// "not primed yet" rather than "no borrowers".
    pub async fn read(&self) -> Vec<Borrower> {
        self.snapshot().await.borrowers.clone()
    }

    /// The latest committed snapshot
    pub async fn snapshot(&self) -> Arc<BorrowerSnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Fetch the full borrower set and replace the committed snapshot.
    ///
    /// Any failure leaves the previous snapshot in place.
    pub async fn refresh(&self) -> ScannerResult<u64> {
        info!("🔄 차입자 캐시 갱신 시작...");
        let started = Instant::now();

        let addresses = read_contract(
            self.reader.as_ref(),
            self.comptroller,
            &IComptroller::getAllBorrowersCall {},
        )
        .await?;

        let calls: Vec<BatchCall> = addresses
            .iter()
            .map(|account| {
                BatchCall::new(
                    self.comptroller,
                    &IComptroller::getAssetsInCall { account: *account },
                )
            })
            .collect();

        let results = self.batcher.aggregate(calls).await?;
        ensure_positional(addresses.len(), &results)?;

        let mut borrowers = Vec::with_capacity(addresses.len());
        for (address, data) in addresses.into_iter().zip(results.iter()) {
            let markets = decode_returns::<IComptroller::getAssetsInCall>(data)?;
            borrowers.push(Borrower::new(address, markets));
        }
        let count = borrowers.len();

        let version = {
            let mut current = self.snapshot.write().await;
            let version = current.version + 1;
            *current = Arc::new(BorrowerSnapshot {
                version,
                refreshed_at: Some(Utc::now()),
                borrowers,
            });
            version
        };

        info!(
            "✅ 차입자 캐시 갱신 완료: 차입자 {}명 (v{}, {:?})",
            count,
            version,
            started.elapsed()
        );
        Ok(version)
    }

    /// Prime the cache, then refresh on every tick of `schedule`.
    ///
    /// Failures are logged and retried on the next tick; the loop only ends
    /// when the schedule does.
    pub async fn run<S: Schedule>(self: Arc<Self>, mut schedule: S) {
        if let Err(e) = self.refresh().await {
            warn!("⚠️ 차입자 캐시 초기화 실패: {}", e);
        }

        while schedule.tick().await {
            if let Err(e) = self.refresh().await {
                warn!("⚠️ 차입자 캐시 갱신 실패: {}", e);
            }
        }

        debug!("차입자 캐시 스케줄 종료");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Multicall;
    use crate::core::schedule::ManualSchedule;
    use crate::mocks::{encode_one, MockLedger};
    use std::collections::HashSet;
    use std::time::Duration;

    fn comptroller() -> Address {
        Address::repeat_byte(0xc0)
    }

    fn multicall() -> Address {
        Address::repeat_byte(0xee)
    }

    fn cache_over(ledger: &MockLedger) -> Arc<BorrowerCache> {
        let reader: Arc<dyn ContractReader> = Arc::new(ledger.clone());
        let batcher = Arc::new(Multicall::new(multicall(), Arc::clone(&reader)));
        Arc::new(BorrowerCache::new(comptroller(), reader, batcher))
    }

    async fn seed(ledger: &MockLedger, borrowers: &[(Address, Vec<Address>)]) {
        let addresses: Vec<Address> = borrowers.iter().map(|(a, _)| *a).collect();
        ledger
            .respond(
                comptroller(),
                &IComptroller::getAllBorrowersCall {},
                encode_one(addresses),
            )
            .await;
        for (account, markets) in borrowers {
            ledger
                .respond(
                    comptroller(),
                    &IComptroller::getAssetsInCall { account: *account },
                    encode_one(markets.clone()),
                )
                .await;
        }
    }

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[tokio::test]
    async fn test_unprimed_cache_is_empty() {
        let ledger = MockLedger::new().with_multicall(multicall());
        let cache = cache_over(&ledger);

        assert!(cache.read().await.is_empty());
        assert!(!cache.snapshot().await.is_primed());
    }

    #[tokio::test]
    async fn test_refresh_builds_snapshot_in_source_order() {
        let ledger = MockLedger::new().with_multicall(multicall());
        seed(
            &ledger,
            &[
                (addr(1), vec![addr(0xa1), addr(0xa2)]),
                (addr(2), vec![]),
                (addr(3), vec![addr(0xa2)]),
            ],
        )
        .await;
        let cache = cache_over(&ledger);

        assert_eq!(cache.refresh().await.unwrap(), 1);

        let borrowers = cache.read().await;
        assert_eq!(borrowers.len(), 3);
        assert_eq!(borrowers[0], Borrower::new(addr(1), vec![addr(0xa1), addr(0xa2)]));
        assert_eq!(borrowers[1], Borrower::new(addr(2), vec![]));
        assert_eq!(borrowers[2], Borrower::new(addr(3), vec![addr(0xa2)]));
        assert!(borrowers.iter().all(|b| b.shortfall.is_none()));

        // getAllBorrowers + one aggregate
        assert_eq!(ledger.round_trips(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let ledger = MockLedger::new().with_multicall(multicall());
        seed(&ledger, &[(addr(1), vec![addr(0xa1)])]).await;
        let cache = cache_over(&ledger);
        cache.refresh().await.unwrap();

        ledger.set_offline(true);
        assert!(cache.refresh().await.is_err());

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.borrowers, vec![Borrower::new(addr(1), vec![addr(0xa1)])]);
    }

    #[tokio::test]
    async fn test_undecodable_entry_aborts_whole_refresh() {
        let ledger = MockLedger::new().with_multicall(multicall());
        seed(&ledger, &[(addr(1), vec![addr(0xa1)])]).await;
        let cache = cache_over(&ledger);
        cache.refresh().await.unwrap();

        // Borrower 2 appears but its membership payload is garbage
        seed(&ledger, &[(addr(1), vec![addr(0xa1)]), (addr(2), vec![])]).await;
        ledger
            .respond(
                comptroller(),
                &IComptroller::getAssetsInCall { account: addr(2) },
                vec![0xde, 0xad],
            )
            .await;

        assert!(cache.refresh().await.is_err());
        assert_eq!(cache.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_read_returns_independent_copy() {
        let ledger = MockLedger::new().with_multicall(multicall());
        seed(&ledger, &[(addr(1), vec![addr(0xa1)])]).await;
        let cache = cache_over(&ledger);
        cache.refresh().await.unwrap();

        let mut copy = cache.read().await;
        copy[0].markets.clear();
        copy.push(Borrower::new(addr(9), vec![]));

        let fresh = cache.read().await;
        assert_eq!(fresh, vec![Borrower::new(addr(1), vec![addr(0xa1)])]);
    }

    #[tokio::test]
    async fn test_reads_never_observe_partial_refresh() {
        let old: Vec<(Address, Vec<Address>)> =
            (1..=20u8).map(|i| (addr(i), vec![addr(0xa1)])).collect();
        let new: Vec<(Address, Vec<Address>)> =
            (101..=140u8).map(|i| (addr(i), vec![addr(0xa2), addr(0xa3)])).collect();

        let ledger = MockLedger::new()
            .with_multicall(multicall())
            .with_latency(Duration::from_millis(5));
        seed(&ledger, &old).await;
        let cache = cache_over(&ledger);
        cache.refresh().await.unwrap();

        seed(&ledger, &new).await;
        let refresher = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.refresh().await })
        };

        let old_set: HashSet<Address> = old.iter().map(|(a, _)| *a).collect();
        let new_set: HashSet<Address> = new.iter().map(|(a, _)| *a).collect();
        let mut saw_new = false;
        for _ in 0..200 {
            let seen: HashSet<Address> = cache.read().await.iter().map(|b| b.address).collect();
            assert!(seen == old_set || seen == new_set, "observed a mixed snapshot");
            saw_new |= seen == new_set;
            if saw_new {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(refresher.await.unwrap().unwrap(), 2);
        let seen: HashSet<Address> = cache.read().await.iter().map(|b| b.address).collect();
        assert_eq!(seen, new_set);
    }

    #[tokio::test]
    async fn test_run_survives_failed_prime() {
        let ledger = MockLedger::new().with_multicall(multicall());
        seed(&ledger, &[(addr(1), vec![addr(0xa1)])]).await;
        ledger.set_offline(true);
        let cache = cache_over(&ledger);

        let (trigger, schedule) = ManualSchedule::channel();
        let runner = tokio::spawn(Arc::clone(&cache).run(schedule));

        // Let the prime attempt fail first
        while ledger.round_trips() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!cache.snapshot().await.is_primed());

        ledger.set_offline(false);
        trigger.fire();
        trigger.fire();
        drop(trigger);
        runner.await.unwrap();

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.version, 2);
        assert!(snapshot.refreshed_at.is_some());
        assert_eq!(snapshot.borrowers.len(), 1);
    }
}
