use serde::{Deserialize, Serialize};

/// A wallet on the watchlist. Row in `wallets`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedWallet {
    pub address: String,
    pub name: String,
}

/// Last-confirmed state of one position, keyed by (asset, address).
/// Row in `positions`.
///
/// A stored snapshot is the last state the operator has been notified
/// about; during a pending closure it is deliberately stale.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSnapshot {
    pub asset: String,
    pub size: f64,
    pub avg_price: f64,
    pub title: String,
    pub outcome: String,
    pub slug: String,
    pub condition_id: Option<String>,
    pub event_id: Option<String>,
}

/// Position from Data API `/positions`.
///
/// Every field is optional: the provider omits fields freely and flips
/// between string and numeric encodings for sizes and prices, so the
/// raw record stays permissive and validation happens per record in
/// the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPosition {
    #[serde(rename = "proxyWallet")]
    pub proxy_wallet: Option<String>,
    pub asset: Option<String>,
    #[serde(rename = "conditionId")]
    pub condition_id: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub size: Option<String>,
    #[serde(rename = "avgPrice", deserialize_with = "de_opt_string_any", default)]
    pub avg_price: Option<String>,
    pub title: Option<String>,
    pub outcome: Option<String>,
    #[serde(rename = "outcomeLabel")]
    pub outcome_label: Option<String>,
    pub slug: Option<String>,
    #[serde(rename = "eventId", deserialize_with = "de_opt_string_any", default)]
    pub event_id: Option<String>,
}

/// Trade fill from Data API `/trades`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTrade {
    #[serde(rename = "proxyWallet")]
    pub proxy_wallet: Option<String>,
    #[serde(rename = "conditionId")]
    pub condition_id: Option<String>,
    pub asset: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub size: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub price: Option<String>,
    pub side: Option<String>,
    pub timestamp: Option<i64>,
    #[serde(rename = "transactionHash")]
    pub transaction_hash: Option<String>,
}

/// Ledger entry from Data API `/activity` (trades, redemptions, splits).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiActivity {
    #[serde(rename = "proxyWallet")]
    pub proxy_wallet: Option<String>,
    #[serde(rename = "conditionId")]
    pub condition_id: Option<String>,
    #[serde(rename = "type")]
    pub activity_type: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub size: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub price: Option<String>,
    pub side: Option<String>,
    pub timestamp: Option<i64>,
}

/// Event from Gamma API `/events/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GammaEvent {
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub id: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub markets: Vec<GammaMarket>,
}

/// Market nested in a Gamma event.
#[derive(Debug, Clone, Deserialize)]
pub struct GammaMarket {
    #[serde(rename = "conditionId")]
    pub condition_id: Option<String>,
    pub slug: Option<String>,
    pub category: Option<String>,
}

/// Deserialize a field that can be either a string or a number into `Option<String>`.
pub fn de_opt_string_any<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrNumber;

    impl<'de> de::Visitor<'de> for StringOrNumber {
        type Value = Option<String>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a string or number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_position_string_fields() {
        let json = r#"{
            "proxyWallet": "0xabc",
            "asset": "123456",
            "conditionId": "0xcond",
            "size": "42.5",
            "avgPrice": "0.55",
            "title": "Will it rain?",
            "outcome": "Yes",
            "slug": "will-it-rain",
            "eventId": 9001
        }"#;
        let pos: ApiPosition = serde_json::from_str(json).unwrap();
        assert_eq!(pos.asset.as_deref(), Some("123456"));
        assert_eq!(pos.size.as_deref(), Some("42.5"));
        assert_eq!(pos.avg_price.as_deref(), Some("0.55"));
        assert_eq!(pos.event_id.as_deref(), Some("9001"));
    }

    #[test]
    fn test_deserialize_position_numeric_fields() {
        let json = r#"{"asset": "a1", "size": 10, "avgPrice": 0.25}"#;
        let pos: ApiPosition = serde_json::from_str(json).unwrap();
        assert_eq!(pos.size.as_deref(), Some("10"));
        assert_eq!(pos.avg_price.as_deref(), Some("0.25"));
        assert!(pos.condition_id.is_none());
    }

    #[test]
    fn test_deserialize_trade() {
        let json = r#"{
            "proxyWallet": "0xabc",
            "conditionId": "0xcond",
            "asset": "a1",
            "size": 5,
            "price": "0.60",
            "side": "SELL",
            "timestamp": 1700000000
        }"#;
        let trade: ApiTrade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.side.as_deref(), Some("SELL"));
        assert_eq!(trade.price.as_deref(), Some("0.60"));
    }

    #[test]
    fn test_deserialize_activity_type_field() {
        let json = r#"{"conditionId": "0xcond", "type": "REDEEM", "size": "10", "timestamp": 1}"#;
        let a: ApiActivity = serde_json::from_str(json).unwrap();
        assert_eq!(a.activity_type.as_deref(), Some("REDEEM"));
    }

    #[test]
    fn test_deserialize_gamma_event() {
        let json = r#"{
            "id": "17",
            "title": "US Election",
            "markets": [{"conditionId": "0xc", "slug": "us-election", "category": "Politics"}]
        }"#;
        let event: GammaEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.markets.len(), 1);
        assert_eq!(event.markets[0].category.as_deref(), Some("Politics"));
    }

    #[test]
    fn test_deserialize_gamma_event_no_markets() {
        let event: GammaEvent = serde_json::from_str(r#"{"id": "17"}"#).unwrap();
        assert!(event.markets.is_empty());
    }
}
