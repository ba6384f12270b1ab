use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::borrower_cache::BorrowerCache;
use super::schedule::Schedule;
use crate::protocols::{AssetResolver, ShortfallScanner};
use crate::types::{AccountReport, Borrower, ScannerResult};

/// Outcome of one scan cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Version of the borrower snapshot the cycle ran against
    pub snapshot_version: u64,
    pub borrowers_checked: usize,
    pub underwater: Vec<Borrower>,
    pub reports: Vec<AccountReport>,
    /// Underwater accounts whose assets could not be resolved
    pub failed_accounts: usize,
}

/// Drives scan cycles: snapshot → shortfall scan → asset resolution → logs
pub struct ShortfallMonitor {
    cache: Arc<BorrowerCache>,
    scanner: ShortfallScanner,
    resolver: AssetResolver,
    explorer_url: String,
    skip_overlapping: bool,
    in_flight: AtomicBool,
}

impl ShortfallMonitor {
    pub fn new(
        cache: Arc<BorrowerCache>,
        scanner: ShortfallScanner,
        resolver: AssetResolver,
        explorer_url: impl Into<String>,
        skip_overlapping: bool,
    ) -> Self {
        let explorer_url: String = explorer_url.into();
        Self {
            cache,
            scanner,
            resolver,
            explorer_url: explorer_url.trim_end_matches('/').to_string(),
            skip_overlapping,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one full scan over the current borrower snapshot.
    ///
    /// An unprimed cache ends the cycle early with an empty report. Resolution
    /// failures only drop the affected account.
    pub async fn run_cycle(&self) -> ScannerResult<CycleReport> {
        info!("🔍 부족분(shortfall) 검사 시작...");
        let started = Instant::now();

        let snapshot = self.cache.snapshot().await;
        let borrowers = snapshot.borrowers.clone();
        info!("👥 차입자 수: {}", borrowers.len());

        let primed = snapshot.is_primed();
        let mut report = CycleReport {
            snapshot_version: snapshot.version,
            borrowers_checked: borrowers.len(),
            ..Default::default()
        };
        drop(snapshot);

        if !primed {
            info!("⏳ 차입자 캐시가 아직 준비되지 않음; 검사 건너뜀");
            return Ok(report);
        }
        if borrowers.is_empty() {
            info!("📭 차입자 없음; 검사 건너뜀");
            return Ok(report);
        }

        let underwater = self.scanner.scan(&borrowers).await?;

        for account in &underwater {
            let shortfall = account.shortfall.unwrap_or_default();
            warn!(
                "🚨 계정 {}/address/{} 담보 부족: {}",
                self.explorer_url, account.address, shortfall
            );

            match self.resolver.resolve(account.address, &account.markets).await {
                Ok(mut resolved) => {
                    resolved.shortfall = account.shortfall;
                    log_account_report(&resolved);
                    report.reports.push(resolved);
                }
                Err(e) => {
                    warn!("⚠️ 계정 {} 자산 조회 실패: {}", account.address, e);
                    report.failed_accounts += 1;
                }
            }
        }

        report.underwater = underwater;
        info!(
            "✅ 부족분 검사 완료: {}/{} 계정 담보 부족 ({:?})",
            report.underwater.len(),
            report.borrowers_checked,
            started.elapsed()
        );
        Ok(report)
    }

    /// Start a cycle in the background.
    ///
    /// Returns `None` when the overlap guard is on and a cycle is already running.
    pub fn trigger(self: &Arc<Self>, source: &str) -> Option<JoinHandle<()>> {
        if self.skip_overlapping && self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("검사가 이미 진행 중; {} 트리거 건너뜀", source);
            return None;
        }

        // Released on drop, so a panicking cycle cannot wedge later triggers
        let guard = self.skip_overlapping.then(|| InFlightGuard(Arc::clone(self)));
        let monitor = Arc::clone(self);
        Some(tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = monitor.run_cycle().await {
                warn!("⚠️ 부족분 검사 실패: {}", e);
            }
        }))
    }

    /// Trigger a cycle on every tick of `schedule`
    pub async fn run_on_schedule<S: Schedule>(self: Arc<Self>, mut schedule: S) {
        while schedule.tick().await {
            self.trigger("timer");
        }
        debug!("검사 스케줄 종료");
    }

    /// Trigger a cycle for every new block number received
    pub async fn run_on_blocks(self: Arc<Self>, mut blocks: mpsc::Receiver<u64>) {
        while let Some(number) = blocks.recv().await {
            info!("📦 블록 {} 처리 중", number);
            self.trigger("block");
        }
        error!("❌ 블록 알림 스트림 종료됨");
    }
}

/// Clears the in-flight flag when the cycle task finishes or unwinds
struct InFlightGuard(Arc<ShortfallMonitor>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

fn log_account_report(report: &AccountReport) {
    for position in &report.positions {
        match position.formatted_amount() {
            Ok(amount) => info!(
                "💰 계정 {} {} 잔액 {} {}",
                report.account, position.kind, amount, position.asset_name
            ),
            Err(e) => error!(
                "❌ 계정 {} {} 잔액 포맷 실패 ({}): {}",
                report.account, position.kind, position.asset_name, e
            ),
        }
    }
}
