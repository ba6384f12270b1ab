use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::ScannerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    /// Enables block subscriptions when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    pub explorer_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    pub comptroller: String,
    pub multicall: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanTrigger {
    /// One scan per new block header
    Blocks,
    /// One scan per `scan_interval`
    Interval,
}

impl FromStr for ScanTrigger {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "blocks" | "block" => Ok(Self::Blocks),
            "interval" | "timer" => Ok(Self::Interval),
            other => Err(anyhow!("Unknown scan trigger: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// e.g. "30s", "1m30s", "500ms", "1.5h" or plain seconds
    pub borrower_cache_interval: String,
    pub trigger: ScanTrigger,
    pub scan_interval: String,
    #[serde(default = "default_skip_overlapping")]
    pub skip_overlapping_scans: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub contracts: ContractConfig,
    pub scanner: ScannerConfig,
    pub monitoring: MonitoringConfig,
}

fn default_skip_overlapping() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                name: "polygon".to_string(),
                chain_id: 137,
                rpc_url: "https://polygon-rpc.com".to_string(),
                ws_url: None,
                explorer_url: "https://polygonscan.com".to_string(),
            },
            contracts: ContractConfig {
                comptroller: String::new(),
                multicall: "0xcA11bde05977b3631167028862bE2a173976CA11".to_string(),
            },
            scanner: ScannerConfig {
                borrower_cache_interval: "5m".to_string(),
                trigger: ScanTrigger::Interval,
                scan_interval: "15s".to_string(),
                skip_overlapping_scans: true,
            },
            monitoring: MonitoringConfig {
                log_level: "info".to_string(),
            },
        }
    }
}

impl Config {
    pub async fn load(path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("Failed to parse config file {}", path))?;
        Ok(config)
    }

    /// Overlay values from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("NODE_API_URL") {
            // A websocket endpoint also serves plain calls
            if url.starts_with("ws") {
                self.network.ws_url = Some(url.clone());
            }
            self.network.rpc_url = url;
        }
        if let Some(address) = lookup("COMPTROLLER_ADDRESS") {
            self.contracts.comptroller = address;
        }
        if let Some(address) = lookup("MULTICALL_ADDRESS") {
            self.contracts.multicall = address;
        }
        if let Some(interval) = lookup("BORROWER_CACHE_INTERVAL") {
            self.scanner.borrower_cache_interval = interval;
        }
        if let Some(url) = lookup("BLOCKCHAIN_EXPLORER_URL") {
            self.network.explorer_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.rpc_url.is_empty() {
            return Err(anyhow!("Network RPC URL cannot be empty"));
        }

        if self.network.explorer_url.is_empty() {
            return Err(anyhow!("Blockchain explorer URL cannot be empty"));
        }

        self.comptroller_address()?;
        self.multicall_address()?;

        let cache_interval = self.borrower_cache_interval()?;
        if cache_interval.is_zero() {
            return Err(anyhow!("Borrower cache interval must be greater than 0"));
        }

        match self.scanner.trigger {
            ScanTrigger::Interval => {
                if self.scan_interval()?.is_zero() {
                    return Err(anyhow!("Scan interval must be greater than 0"));
                }
            }
            ScanTrigger::Blocks => {
                if self.network.ws_url.is_none() {
                    return Err(anyhow!("Block trigger requires network.ws_url"));
                }
            }
        }

        Ok(())
    }

    pub fn comptroller_address(&self) -> Result<Address> {
        parse_address("contracts.comptroller", &self.contracts.comptroller)
    }

    pub fn multicall_address(&self) -> Result<Address> {
        parse_address("contracts.multicall", &self.contracts.multicall)
    }

    pub fn borrower_cache_interval(&self) -> Result<Duration> {
        parse_duration(&self.scanner.borrower_cache_interval)
            .context("Invalid scanner.borrower_cache_interval")
    }

    pub fn scan_interval(&self) -> Result<Duration> {
        parse_duration(&self.scanner.scan_interval).context("Invalid scanner.scan_interval")
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    if value.is_empty() {
        return Err(ScannerError::Config(format!("{} must be configured", field)).into());
    }
    value.parse().map_err(|e| {
        ScannerError::Config(format!("Invalid {} address {}: {}", field, value, e)).into()
    })
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

const DURATION_UNITS: [(&str, u128); 7] = [
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("ms", 1_000_000),
    ("s", NANOS_PER_SEC),
    ("m", 60 * NANOS_PER_SEC),
    ("h", 3_600 * NANOS_PER_SEC),
];

/// Parse a duration such as "30s", "1m30s", "500ms" or "1.5h".
///
/// A bare integer is a number of seconds.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return Err(anyhow!("Empty duration"));
    }

    if value.bytes().all(|b| b.is_ascii_digit()) {
        let seconds: u64 = value
            .parse()
            .map_err(|_| anyhow!("Duration out of range: {:?}", value))?;
        return Ok(Duration::from_secs(seconds));
    }

    let mut rest = value;
    let mut total: u128 = 0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| anyhow!("Missing unit in duration {:?}", value))?;
        let (number, tail) = rest.split_at(number_end);

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);

        let scale = DURATION_UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| anyhow!("Unknown duration unit {:?} in {:?}", unit, value))?;

        let nanos = scale_component(number, scale)
            .ok_or_else(|| anyhow!("Invalid duration component {:?} in {:?}", number, value))?;
        total = total
            .checked_add(nanos)
            .ok_or_else(|| anyhow!("Duration out of range: {:?}", value))?;
        rest = tail;
    }

    let seconds = u64::try_from(total / NANOS_PER_SEC)
        .map_err(|_| anyhow!("Duration out of range: {:?}", value))?;
    // Remainder is below one second, so it fits in u32
    let nanos = (total % NANOS_PER_SEC) as u32;
    Ok(Duration::new(seconds, nanos))
}

/// `number` (optionally fractional) times `scale` nanoseconds, `None` on
/// malformed input or overflow. Fraction digits below a nanosecond are dropped.
fn scale_component(number: &str, scale: u128) -> Option<u128> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(scale)?;

    let mut place = scale;
    for digit in fraction.bytes() {
        place /= 10;
        if place == 0 {
            break;
        }
        nanos = nanos.checked_add(u128::from(digit - b'0') * place)?;
    }
    Some(nanos)
}
