use common::polymarket::{FetchResult, PolymarketClient};
use common::types::{ApiActivity, ApiPosition, ApiTrade, GammaEvent};

/// Fetch seams for the engine, so tests can substitute fakes for the
/// live client.
pub trait PositionsPager {
    fn fetch_positions_page(
        &self,
        user: &str,
        limit: u32,
        offset: u32,
    ) -> impl std::future::Future<Output = FetchResult<Vec<ApiPosition>>> + Send;
}

pub trait TradesFetcher {
    fn fetch_trades(
        &self,
        user: &str,
        limit: u32,
    ) -> impl std::future::Future<Output = FetchResult<Vec<ApiTrade>>> + Send;
}

pub trait ActivityFetcher {
    fn fetch_activity(
        &self,
        user: &str,
        limit: u32,
    ) -> impl std::future::Future<Output = FetchResult<Vec<ApiActivity>>> + Send;
}

pub trait EventFetcher {
    fn fetch_event(
        &self,
        event_id: &str,
    ) -> impl std::future::Future<Output = FetchResult<GammaEvent>> + Send;
}

impl PositionsPager for PolymarketClient {
    async fn fetch_positions_page(
        &self,
        user: &str,
        limit: u32,
        offset: u32,
    ) -> FetchResult<Vec<ApiPosition>> {
        PolymarketClient::fetch_positions_page(self, user, limit, offset).await
    }
}

impl TradesFetcher for PolymarketClient {
    async fn fetch_trades(&self, user: &str, limit: u32) -> FetchResult<Vec<ApiTrade>> {
        PolymarketClient::fetch_trades(self, user, limit).await
    }
}

impl ActivityFetcher for PolymarketClient {
    async fn fetch_activity(&self, user: &str, limit: u32) -> FetchResult<Vec<ApiActivity>> {
        PolymarketClient::fetch_activity(self, user, limit).await
    }
}

impl EventFetcher for PolymarketClient {
    async fn fetch_event(&self, event_id: &str) -> FetchResult<GammaEvent> {
        PolymarketClient::fetch_event(self, event_id).await
    }
}
