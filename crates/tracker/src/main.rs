mod commands;
mod engine;
mod fetchers;
mod notifier;
mod telegram;
mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use common::config::Config;
use common::db::TrackerDb;
use common::polymarket::PolymarketClient;

use engine::categories::CategoryCache;
use engine::debounce::DebounceTracker;
use engine::reconciler::ReconcileSettings;
use engine::{EngineSettings, TrackerContext};
use notifier::Notifier;
use telegram::TelegramClient;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());
    let config = Config::load(&config_path)?;

    let dispatch = common::observability::build_dispatch(&config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch)
        .context("failed to install tracing subscriber")?;
    info!(path = %config_path, "config loaded");

    let bot_token = std::env::var("POLYTRACKER_BOT_TOKEN")
        .context("POLYTRACKER_BOT_TOKEN must be set")?;
    let chat_id: i64 = std::env::var("POLYTRACKER_CHAT_ID")
        .context("POLYTRACKER_CHAT_ID must be set")?
        .parse()
        .context("POLYTRACKER_CHAT_ID must be a numeric chat id")?;

    let db = TrackerDb::open(&config.database.path).await?;

    let client = Arc::new(PolymarketClient::new(
        &config.polymarket.data_api_url,
        &config.polymarket.gamma_api_url,
        Duration::from_secs(config.polymarket.request_timeout_secs),
        Duration::from_millis(config.polymarket.rate_limit_delay_ms),
    ));

    let tg = Arc::new(TelegramClient::new(
        &config.telegram.api_url,
        &bot_token,
        Duration::from_secs(config.telegram.poll_timeout_secs),
        Duration::from_secs(config.polymarket.request_timeout_secs),
    ));

    let ctx = Arc::new(TrackerContext {
        db,
        client,
        notifier: Arc::new(Notifier::new(Arc::clone(&tg), chat_id)),
        debounce: Arc::new(DebounceTracker::new()),
        categories: Arc::new(CategoryCache::new()),
        settings: EngineSettings {
            page_size: config.polymarket.page_size,
            recent_trades_limit: config.tracker.recent_trades_limit,
            recent_activity_limit: config.tracker.recent_activity_limit,
            max_concurrent_wallets: config.tracker.max_concurrent_wallets,
            poll_interval: Duration::from_secs(config.tracker.poll_interval_secs),
            reconcile: ReconcileSettings {
                dead_zone_shares: config.tracker.dead_zone_shares,
                closure_confirm_cycles: config.tracker.closure_confirm_cycles,
            },
        },
    });

    let cancel = CancellationToken::new();

    let command_loop = tokio::spawn(commands::run_command_loop(
        Arc::clone(&ctx),
        tg,
        chat_id,
        config.telegram.poll_timeout_secs,
        cancel.clone(),
    ));
    let tracking_loop = tokio::spawn(engine::run_tracking_loop(
        Arc::clone(&ctx),
        cancel.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    cancel.cancel();

    let _ = tracking_loop.await;
    let _ = command_loop.await;
    info!("shutdown complete");
    Ok(())
}
