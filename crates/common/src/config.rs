use anyhow::{Context, Result};
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: General,
    pub database: Database,
    pub polymarket: Polymarket,
    pub tracker: Tracker,
    pub telegram: Telegram,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Polymarket {
    pub data_api_url: String,
    pub gamma_api_url: String,
    pub page_size: u32,
    pub request_timeout_secs: u64,
    pub rate_limit_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tracker {
    pub poll_interval_secs: u64,
    pub dead_zone_shares: f64,
    pub closure_confirm_cycles: u32,
    pub max_concurrent_wallets: usize,
    pub recent_trades_limit: u32,
    pub recent_activity_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Telegram {
    pub api_url: String,
    pub poll_timeout_secs: u64,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.polymarket.page_size > 0,
            "polymarket.page_size must be > 0"
        );
        anyhow::ensure!(
            self.polymarket.request_timeout_secs > 0,
            "polymarket.request_timeout_secs must be > 0"
        );
        anyhow::ensure!(
            self.tracker.poll_interval_secs > 0,
            "tracker.poll_interval_secs must be > 0"
        );
        anyhow::ensure!(
            self.tracker.dead_zone_shares >= 0.0,
            "tracker.dead_zone_shares must be >= 0"
        );
        anyhow::ensure!(
            self.tracker.closure_confirm_cycles > 0,
            "tracker.closure_confirm_cycles must be > 0"
        );
        anyhow::ensure!(
            self.tracker.max_concurrent_wallets > 0,
            "tracker.max_concurrent_wallets must be > 0"
        );
        Ok(())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}
