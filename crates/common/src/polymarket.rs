use crate::types::{ApiActivity, ApiPosition, ApiTrade, GammaEvent};
use reqwest::Url;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Structural fetch failure. Callers must treat any variant as "skip
/// this wallet/field this cycle", never as an empty result.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned HTTP {status}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Minimal Polymarket API client for the tracker: positions, recent
/// fills, ledger activity, and Gamma event metadata.
pub struct PolymarketClient {
    data_api_url: String,
    gamma_api_url: String,
    client: reqwest::Client,
    rate_limit_delay: Duration,
}

impl PolymarketClient {
    pub fn new(
        data_api_url: &str,
        gamma_api_url: &str,
        request_timeout: Duration,
        rate_limit_delay: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("failed to build HTTP client");

        Self {
            data_api_url: data_api_url.trim_end_matches('/').to_string(),
            gamma_api_url: gamma_api_url.trim_end_matches('/').to_string(),
            client,
            rate_limit_delay,
        }
    }

    pub fn positions_url(&self, user: &str, limit: u32, offset: u32) -> String {
        let mut url = Url::parse(&format!("{}/positions", self.data_api_url))
            .expect("data_api_url must be a valid absolute URL");
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("user", user);
            qp.append_pair("sortBy", "CURRENT");
            qp.append_pair("sortDirection", "DESC");
            qp.append_pair("limit", &limit.to_string());
            qp.append_pair("offset", &offset.to_string());
        }
        url.to_string()
    }

    pub fn trades_url(&self, user: &str, limit: u32) -> String {
        let mut url = Url::parse(&format!("{}/trades", self.data_api_url))
            .expect("data_api_url must be a valid absolute URL");
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("user", user);
            qp.append_pair("limit", &limit.to_string());
        }
        url.to_string()
    }

    pub fn activity_url(&self, user: &str, limit: u32) -> String {
        let mut url = Url::parse(&format!("{}/activity", self.data_api_url))
            .expect("data_api_url must be a valid absolute URL");
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("user", user);
            qp.append_pair("limit", &limit.to_string());
        }
        url.to_string()
    }

    pub fn event_url(&self, event_id: &str) -> String {
        format!(
            "{}/events/{}",
            self.gamma_api_url,
            urlencoding::encode(event_id)
        )
    }

    /// Fetch one page of open positions, sorted by current size descending.
    pub async fn fetch_positions_page(
        &self,
        user: &str,
        limit: u32,
        offset: u32,
    ) -> FetchResult<Vec<ApiPosition>> {
        let url = self.positions_url(user, limit, offset);
        self.get_json("positions", &url).await
    }

    /// Fetch the most recent trade fills for a wallet.
    pub async fn fetch_trades(&self, user: &str, limit: u32) -> FetchResult<Vec<ApiTrade>> {
        let url = self.trades_url(user, limit);
        self.get_json("trades", &url).await
    }

    /// Fetch recent ledger activity (redemptions among it) for a wallet.
    pub async fn fetch_activity(&self, user: &str, limit: u32) -> FetchResult<Vec<ApiActivity>> {
        let url = self.activity_url(user, limit);
        self.get_json("activity", &url).await
    }

    /// Fetch event metadata from the Gamma API.
    pub async fn fetch_event(&self, event_id: &str) -> FetchResult<GammaEvent> {
        let url = self.event_url(event_id);
        self.get_json("events", &url).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: &str,
    ) -> FetchResult<T> {
        debug!(url = %url, "fetching");

        // Politeness delay so a burst of wallets does not hammer the API.
        if !self.rate_limit_delay.is_zero() {
            tokio::time::sleep(self.rate_limit_delay).await;
        }

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport { endpoint, source })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { endpoint, status });
        }

        resp.json::<T>()
            .await
            .map_err(|source| FetchError::Decode { endpoint, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> PolymarketClient {
        PolymarketClient::new(
            "https://data-api.polymarket.com",
            "https://gamma-api.polymarket.com",
            Duration::from_secs(10),
            Duration::ZERO,
        )
    }

    #[test]
    fn test_positions_url_carries_sort_and_paging() {
        let url = test_client().positions_url("0xabc123", 500, 1000);
        assert!(url.contains("/positions"));
        assert!(url.contains("user=0xabc123"));
        assert!(url.contains("sortBy=CURRENT"));
        assert!(url.contains("sortDirection=DESC"));
        assert!(url.contains("limit=500"));
        assert!(url.contains("offset=1000"));
    }

    #[test]
    fn test_trades_url() {
        let url = test_client().trades_url("0xabc", 100);
        assert!(url.contains("/trades"));
        assert!(url.contains("user=0xabc"));
        assert!(url.contains("limit=100"));
    }

    #[test]
    fn test_event_url_encodes_id() {
        let url = test_client().event_url("90 01");
        assert_eq!(url, "https://gamma-api.polymarket.com/events/90%2001");
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = PolymarketClient::new(
            "https://data-api.polymarket.com/",
            "https://gamma-api.polymarket.com/",
            Duration::from_secs(10),
            Duration::ZERO,
        );
        assert!(!client.positions_url("0x1", 10, 0).contains("com//"));
    }
}
