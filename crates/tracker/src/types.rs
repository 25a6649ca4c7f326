use common::types::{ApiPosition, PositionSnapshot, TrackedWallet};
use std::fmt;

/// A provider position record validated into the fields the tracker
/// needs. Conversion fails per record, never per batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPosition {
    pub position_id: String,
    pub size: f64,
    pub avg_price: f64,
    pub title: String,
    pub outcome: String,
    pub slug: String,
    pub condition_id: Option<String>,
    pub event_id: Option<String>,
}

impl ParsedPosition {
    /// Validate a raw provider record. Returns `None` when the record
    /// cannot be tracked: no asset or condition identifier, or a size
    /// that does not parse. A missing average price coerces to 0.
    pub fn from_api(raw: &ApiPosition) -> Option<Self> {
        let position_id = raw
            .asset
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(raw.condition_id.as_deref().filter(|s| !s.is_empty()))?
            .to_string();

        let size = raw.size.as_deref()?.parse::<f64>().ok()?;
        let avg_price = raw
            .avg_price
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);

        let outcome = raw
            .outcome
            .clone()
            .or_else(|| raw.outcome_label.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        Some(Self {
            position_id,
            size,
            avg_price,
            title: raw
                .title
                .clone()
                .unwrap_or_else(|| "Unknown Event".to_string()),
            outcome,
            slug: raw.slug.clone().unwrap_or_default(),
            condition_id: raw.condition_id.clone(),
            event_id: raw.event_id.clone(),
        })
    }

    pub fn into_snapshot(self) -> PositionSnapshot {
        PositionSnapshot {
            asset: self.position_id,
            size: self.size,
            avg_price: self.avg_price,
            title: self.title,
            outcome: self.outcome,
            slug: self.slug,
            condition_id: self.condition_id,
            event_id: self.event_id,
        }
    }
}

/// Whether a reported trade price comes from an actual fill or is a
/// fallback estimate from the position's average price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceConfidence {
    Confirmed,
    Estimated,
}

/// How a closed position left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    SoldAll,
    Redeemed,
    Expired,
}

impl ExitReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SoldAll => "Sold All",
            Self::Redeemed => "Redeemed (Won)",
            Self::Expired => "Expired (Lost)",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One classified position change, produced and consumed within a
/// single reconciliation cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub wallet: TrackedWallet,
    pub title: String,
    pub outcome: String,
    pub slug: String,
    pub event_id: Option<String>,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    Opened {
        size: f64,
        avg_price: f64,
        value: f64,
    },
    Increased {
        added: f64,
        added_value: f64,
        est_trade_price: f64,
        old_avg: f64,
        new_avg: f64,
    },
    Decreased {
        removed: f64,
        trade_price: f64,
        confidence: PriceConfidence,
        pnl: Option<f64>,
    },
    Closed {
        size: f64,
        exit: ExitReason,
        exit_price: f64,
        pnl: Option<f64>,
        pnl_pct: Option<f64>,
    },
}
