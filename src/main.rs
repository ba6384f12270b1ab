use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, Command};
use ethers::providers::{Http, Provider, Ws};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comptroller_shortfall_monitor::blockchain::{BlockSource, ContractReader, EthersReader, Multicall};
use comptroller_shortfall_monitor::config::{Config, ScanTrigger};
use comptroller_shortfall_monitor::core::{BorrowerCache, IntervalSchedule, ShortfallMonitor};
use comptroller_shortfall_monitor::protocols::{AssetResolver, MarketRegistry, ShortfallScanner};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("shortfall_monitor")
        .version(env!("CARGO_PKG_VERSION"))
        .about("🔍 컴트롤러 부족분 모니터 - 담보 부족 차입자 탐지 및 보고")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("설정 파일 경로")
                .default_value("config/default.toml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("로그 레벨 (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("trigger")
                .short('t')
                .long("trigger")
                .value_name("TRIGGER")
                .help("검사 트리거 (blocks, interval)"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("차입자 캐시를 채우고 한 번 검사한 뒤 종료")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    dotenvy::dotenv().ok();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config/default.toml");
    // 설정 파일 로드
    let mut config = Config::load(config_path)
        .await
        .with_context(|| format!("설정 파일 로드 실패: {}", config_path))?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.monitoring.log_level.clone());
    let log_filter = match log_level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => log_level.as_str(),
        _ => "info",
    };

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("📋 설정 파일 로드 완료: {}", config_path);

    if let Some(trigger) = matches.get_one::<String>("trigger") {
        config.scanner.trigger = trigger.parse()?;
    }
    config.apply_env_overrides();

    // 설정 검증
    if let Err(e) = config.validate() {
        error!("❌ 설정 검증 실패: {:#}", e);
        std::process::exit(1);
    }

    let comptroller = config.comptroller_address()?;
    let multicall = config.multicall_address()?;
    info!(
        "✅ 설정 준비 완료: {} (체인 {}), 컴트롤러 {}",
        config.network.name, config.network.chain_id, comptroller
    );

    // 프로바이더 초기화
    let mut ws_provider: Option<Arc<Provider<Ws>>> = None;
    let reader: Arc<dyn ContractReader> = match &config.network.ws_url {
        Some(ws_url) => {
            info!("🔌 WebSocket 연결 중: {}", ws_url);
            let ws = Ws::connect(ws_url.as_str())
                .await
                .context("WebSocket 연결 실패")?;
            let provider = Arc::new(Provider::new(ws));
            ws_provider = Some(Arc::clone(&provider));
            Arc::new(EthersReader::new(provider))
        }
        None => {
            info!("🌐 HTTP 연결 중: {}", config.network.rpc_url);
            let provider = Provider::<Http>::try_from(config.network.rpc_url.as_str())
                .context("잘못된 RPC URL")?;
            Arc::new(EthersReader::new(Arc::new(provider)))
        }
    };

    let batcher = Arc::new(Multicall::new(multicall, Arc::clone(&reader)));
    info!("🧮 Multicall 컨트랙트: {}", batcher.address());

    let registry = Arc::new(
        MarketRegistry::discover(reader.as_ref(), comptroller)
            .await
            .context("마켓 조회 실패")?,
    );
    info!("🔮 가격 오라클: {}", registry.oracle());
    if let Err(e) = registry
        .log_markets(batcher.as_ref(), &config.network.explorer_url)
        .await
    {
        warn!("⚠️ 마켓 목록 출력 실패: {}", e);
    }

    let cache = Arc::new(BorrowerCache::new(
        comptroller,
        Arc::clone(&reader),
        batcher.clone(),
    ));
    let monitor = Arc::new(ShortfallMonitor::new(
        Arc::clone(&cache),
        ShortfallScanner::new(comptroller, batcher),
        AssetResolver::new(reader, registry),
        config.network.explorer_url.clone(),
        config.scanner.skip_overlapping_scans,
    ));

    if matches.get_flag("once") {
        cache.refresh().await.context("차입자 캐시 갱신 실패")?;
        let report = monitor.run_cycle().await?;
        info!(
            "🏁 단일 검사 완료: 담보 부족 {}개, 조회 실패 {}개",
            report.underwater.len(),
            report.failed_accounts
        );
        return Ok(());
    }

    let cache_interval = config.borrower_cache_interval()?;
    tokio::spawn(Arc::clone(&cache).run(IntervalSchedule::new(cache_interval)));

    match config.scanner.trigger {
        ScanTrigger::Blocks => {
            let provider =
                ws_provider.ok_or_else(|| anyhow!("블록 트리거에는 WebSocket 프로바이더가 필요합니다"))?;
            let (tx, rx) = mpsc::channel(16);
            tokio::spawn(BlockSource::new(provider).forward(tx));
            tokio::spawn(Arc::clone(&monitor).run_on_blocks(rx));
            info!("📦 새 블록마다 검사");
        }
        ScanTrigger::Interval => {
            let scan_interval = config.scan_interval()?;
            tokio::spawn(Arc::clone(&monitor).run_on_schedule(IntervalSchedule::new(scan_interval)));
            info!("⏱️ {:?}마다 검사", scan_interval);
        }
    }

    info!("🎯 부족분 모니터 시작됨");

    // 종료 신호 대기
    match signal::ctrl_c().await {
        Ok(()) => warn!("🛑 종료 신호 수신됨"),
        Err(e) => error!("❌ 신호 처리 오류: {}", e),
    }

    info!("✅ 부족분 모니터 종료됨");
    Ok(())
}
