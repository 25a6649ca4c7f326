//! Polling engine: pagination, per-wallet tracking cycles, and the
//! round scheduler.

pub mod categories;
pub mod debounce;
pub mod reconciler;

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common::polymarket::{FetchResult, PolymarketClient};
use common::types::{ApiActivity, ApiPosition, ApiTrade, TrackedWallet};

use crate::engine::categories::{decorate, CategoryCache};
use crate::engine::debounce::DebounceTracker;
use crate::engine::reconciler::{reconcile, ReconcileSettings};
use crate::fetchers::PositionsPager;
use crate::notifier::Notifier;
use common::db::TrackerDb;

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub page_size: u32,
    pub recent_trades_limit: u32,
    pub recent_activity_limit: u32,
    pub max_concurrent_wallets: usize,
    pub poll_interval: Duration,
    pub reconcile: ReconcileSettings,
}

/// Shared state for the tracking loop and the command surface.
pub struct TrackerContext {
    pub db: TrackerDb,
    pub client: Arc<PolymarketClient>,
    pub notifier: Arc<Notifier>,
    pub debounce: Arc<DebounceTracker>,
    pub categories: Arc<CategoryCache>,
    pub settings: EngineSettings,
}

/// Concatenate position pages until a short or empty page. Any page
/// failing fails the whole fetch, so a partial result is never
/// mistaken for the full position set.
pub async fn fetch_all_positions<P: PositionsPager>(
    pager: &P,
    user: &str,
    page_size: u32,
) -> FetchResult<Vec<ApiPosition>> {
    let mut all = Vec::new();
    let mut offset = 0u32;
    loop {
        let page = pager.fetch_positions_page(user, page_size, offset).await?;
        let got = page.len() as u32;
        all.extend(page);
        if got < page_size {
            break;
        }
        offset += page_size;
    }
    Ok(all)
}

impl TrackerContext {
    /// One full tracking cycle for one wallet: fetch, reconcile,
    /// notify, then persist. Persisting last means a crashed or failed
    /// cycle replays from the previous snapshot.
    pub async fn track_wallet_once(&self, wallet: &TrackedWallet) {
        let old_snapshot = match self.db.load_snapshot(&wallet.address).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(wallet = %wallet.address, error = %err, "failed to load snapshot");
                return;
            }
        };

        let fetched = match fetch_all_positions(
            self.client.as_ref(),
            &wallet.address,
            self.settings.page_size,
        )
        .await
        {
            Ok(positions) => positions,
            Err(err) => {
                warn!(wallet = %wallet.address, error = %err, "positions fetch failed, skipping cycle");
                return;
            }
        };

        // Fills and ledger activity are best effort; either side
        // failing degrades price attribution, not correctness.
        let trades = self.fetch_trades_or_empty(&wallet.address).await;
        let activity = self.fetch_activity_or_empty(&wallet.address).await;

        let outcome = reconcile(
            wallet,
            &old_snapshot,
            &fetched,
            &trades,
            &activity,
            &self.debounce,
            &self.settings.reconcile,
        );

        if outcome.events.is_empty() && outcome.upserts.is_empty() && outcome.removals.is_empty() {
            return;
        }

        counter!("tracker_events_emitted_total").increment(outcome.events.len() as u64);
        for event in &outcome.events {
            let category = match &event.event_id {
                Some(id) => decorate(&self.categories.resolve(self.client.as_ref(), id).await),
                None => String::new(),
            };
            self.notifier.notify(event, &category).await;
        }

        if let Err(err) = self
            .db
            .apply_snapshot_changes(&wallet.address, outcome.upserts, outcome.removals)
            .await
        {
            error!(wallet = %wallet.address, error = %err, "failed to persist snapshot changes");
        }
    }

    async fn fetch_trades_or_empty(&self, address: &str) -> Vec<ApiTrade> {
        match self
            .client
            .fetch_trades(address, self.settings.recent_trades_limit)
            .await
        {
            Ok(trades) => trades,
            Err(err) => {
                warn!(wallet = %address, error = %err, "trades fetch failed, continuing without fills");
                Vec::new()
            }
        }
    }

    async fn fetch_activity_or_empty(&self, address: &str) -> Vec<ApiActivity> {
        match self
            .client
            .fetch_activity(address, self.settings.recent_activity_limit)
            .await
        {
            Ok(activity) => activity,
            Err(err) => {
                warn!(wallet = %address, error = %err, "activity fetch failed, continuing without ledger");
                Vec::new()
            }
        }
    }

    /// Seed the snapshot for a freshly added wallet without emitting
    /// any events. Returns the number of positions seeded.
    pub async fn seed_wallet(&self, address: &str) -> anyhow::Result<usize> {
        let fetched =
            fetch_all_positions(self.client.as_ref(), address, self.settings.page_size).await?;
        let snapshot: Vec<_> = {
            let mut seen = std::collections::HashSet::new();
            fetched
                .iter()
                .filter_map(crate::types::ParsedPosition::from_api)
                .filter(|p| seen.insert(p.position_id.clone()))
                .map(crate::types::ParsedPosition::into_snapshot)
                .collect()
        };
        let count = snapshot.len();
        self.db.seed_snapshot(address, snapshot).await?;
        Ok(count)
    }
}

/// One round: every tracked wallet, concurrently up to the configured
/// bound. The round joins fully before returning, so rounds never
/// overlap and a wallet is never tracked twice at once.
pub async fn run_round(ctx: &Arc<TrackerContext>) {
    let wallets = match ctx.db.list_wallets().await {
        Ok(wallets) => wallets,
        Err(err) => {
            error!(error = %err, "failed to list wallets");
            return;
        }
    };
    if wallets.is_empty() {
        debug!("no wallets tracked, idle round");
        return;
    }

    counter!("tracker_rounds_total").increment(1);
    let semaphore = Arc::new(Semaphore::new(ctx.settings.max_concurrent_wallets));
    let mut tasks = JoinSet::new();

    for wallet in wallets {
        let ctx = Arc::clone(ctx);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            // Closing the semaphore never happens, acquire cannot fail.
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            ctx.track_wallet_once(&wallet).await;
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "wallet tracking task panicked");
        }
    }
}

/// Drive rounds on a fixed cadence until cancelled. Each round is
/// awaited to completion before the next tick is honored; ticks that
/// arrive while a round is still running are skipped rather than
/// queued, so rounds never overlap.
pub async fn run_rounds<F, Fut>(poll_interval: Duration, cancel: CancellationToken, mut round: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => round().await,
        }
    }
}

pub async fn run_tracking_loop(ctx: Arc<TrackerContext>, cancel: CancellationToken) {
    info!(
        interval_secs = ctx.settings.poll_interval.as_secs(),
        "tracking loop started"
    );
    run_rounds(ctx.settings.poll_interval, cancel, || {
        let ctx = Arc::clone(&ctx);
        async move { run_round(&ctx).await }
    })
    .await;
    info!("tracking loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::polymarket::FetchError;
    use std::sync::Mutex;

    struct PagedPositions {
        pages: Mutex<Vec<FetchResult<Vec<ApiPosition>>>>,
        requested_offsets: Mutex<Vec<u32>>,
    }

    impl PagedPositions {
        fn new(pages: Vec<FetchResult<Vec<ApiPosition>>>) -> Self {
            Self {
                pages: Mutex::new(pages),
                requested_offsets: Mutex::new(Vec::new()),
            }
        }
    }

    impl PositionsPager for PagedPositions {
        async fn fetch_positions_page(
            &self,
            _user: &str,
            _limit: u32,
            offset: u32,
        ) -> FetchResult<Vec<ApiPosition>> {
            self.requested_offsets.lock().unwrap().push(offset);
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                Ok(Vec::new())
            } else {
                pages.remove(0)
            }
        }
    }

    fn pos(id: &str) -> ApiPosition {
        ApiPosition {
            proxy_wallet: None,
            asset: Some(id.to_string()),
            condition_id: None,
            size: Some("1".to_string()),
            avg_price: Some("0.5".to_string()),
            title: None,
            outcome: None,
            outcome_label: None,
            slug: None,
            event_id: None,
        }
    }

    fn full_page(prefix: &str, n: u32) -> Vec<ApiPosition> {
        (0..n).map(|i| pos(&format!("{prefix}-{i}"))).collect()
    }

    #[tokio::test]
    async fn test_pagination_concatenates_until_short_page() {
        let pager = PagedPositions::new(vec![
            Ok(full_page("p0", 3)),
            Ok(full_page("p1", 3)),
            Ok(vec![pos("last")]),
        ]);
        let all = fetch_all_positions(&pager, "0xabc", 3).await.unwrap();
        assert_eq!(all.len(), 7);
        let ids: Vec<_> = all.iter().map(|p| p.asset.clone().unwrap()).collect();
        assert_eq!(ids[0], "p0-0");
        assert_eq!(ids[3], "p1-0");
        assert_eq!(ids[6], "last");
        assert_eq!(*pager.requested_offsets.lock().unwrap(), vec![0, 3, 6]);
    }

    #[tokio::test]
    async fn test_pagination_stops_on_empty_page() {
        let pager = PagedPositions::new(vec![Ok(full_page("p0", 2)), Ok(Vec::new())]);
        let all = fetch_all_positions(&pager, "0xabc", 2).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_pagination_error_fails_the_whole_fetch() {
        let pager = PagedPositions::new(vec![
            Ok(full_page("p0", 2)),
            Err(FetchError::Status {
                endpoint: "positions",
                status: reqwest::StatusCode::BAD_GATEWAY,
            }),
        ]);
        assert!(fetch_all_positions(&pager, "0xabc", 2).await.is_err());
    }

    #[tokio::test]
    async fn test_short_first_page_makes_one_request() {
        let pager = PagedPositions::new(vec![Ok(vec![pos("only")])]);
        let all = fetch_all_positions(&pager, "0xabc", 500).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(*pager.requested_offsets.lock().unwrap(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rounds_never_overlap_and_missed_ticks_are_skipped() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let cancel = CancellationToken::new();
        let active = Arc::new(AtomicU32::new(0));
        let max_active = Arc::new(AtomicU32::new(0));
        let runs = Arc::new(AtomicU32::new(0));

        let handle = {
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            let runs = Arc::clone(&runs);
            tokio::spawn(run_rounds(
                Duration::from_secs(30),
                cancel.clone(),
                move || {
                    let active = Arc::clone(&active);
                    let max_active = Arc::clone(&max_active);
                    let runs = Arc::clone(&runs);
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        runs.fetch_add(1, Ordering::SeqCst);
                        // Each round outlasts two ticks of the cadence.
                        tokio::time::sleep(Duration::from_secs(70)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    }
                },
            ))
        };

        tokio::time::sleep(Duration::from_secs(200)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(max_active.load(Ordering::SeqCst), 1, "rounds overlapped");
        // 70 s rounds on a 30 s cadence fit three starts into 200 s
        // when the missed ticks are skipped instead of queued.
        assert!(runs.load(Ordering::SeqCst) <= 3);
        assert!(runs.load(Ordering::SeqCst) >= 2);
    }

    fn pos_sized(id: &str, size: &str, avg: &str) -> ApiPosition {
        let mut p = pos(id);
        p.size = Some(size.to_string());
        p.avg_price = Some(avg.to_string());
        p
    }

    #[tokio::test]
    async fn test_multi_cycle_flow_through_the_store() {
        use crate::engine::debounce::DebounceTracker;
        use crate::engine::reconciler::{reconcile, ReconcileSettings};
        use crate::types::ChangeKind;

        let db = TrackerDb::open_memory().await.unwrap();
        let wallet = TrackedWallet {
            address: "0xabc123def".to_string(),
            name: "whale".to_string(),
        };
        db.upsert_wallet(wallet.clone()).await.unwrap();

        let debounce = DebounceTracker::new();
        let settings = ReconcileSettings {
            dead_zone_shares: 1.0,
            closure_confirm_cycles: 3,
        };

        let cycle = |fetched: Vec<ApiPosition>| {
            let db = &db;
            let wallet = &wallet;
            let debounce = &debounce;
            async move {
                let old = db.load_snapshot(&wallet.address).await.unwrap();
                let out = reconcile(wallet, &old, &fetched, &[], &[], debounce, &settings);
                db.apply_snapshot_changes(&wallet.address, out.upserts.clone(), out.removals.clone())
                    .await
                    .unwrap();
                out
            }
        };

        // Cycle 1: position appears.
        let out = cycle(vec![pos_sized("a1", "10", "0.20")]).await;
        assert!(matches!(out.events[0].kind, ChangeKind::Opened { .. }));

        // Cycle 2: unchanged fetch, nothing to report.
        let out = cycle(vec![pos_sized("a1", "10", "0.20")]).await;
        assert!(out.events.is_empty());

        // Cycles 3-4: position missing, still below the threshold.
        for _ in 0..2 {
            let out = cycle(Vec::new()).await;
            assert!(out.events.is_empty());
            assert_eq!(db.load_snapshot(&wallet.address).await.unwrap().len(), 1);
        }

        // Cycle 5: third consecutive absence closes it out.
        let out = cycle(Vec::new()).await;
        assert!(matches!(out.events[0].kind, ChangeKind::Closed { .. }));
        assert!(db.load_snapshot(&wallet.address).await.unwrap().is_empty());
    }
}
