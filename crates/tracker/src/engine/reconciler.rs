//! Pure diffing of a fetched position set against the stored snapshot.
//!
//! Classification happens here and nowhere else; fetching, persistence
//! and notification all live in the surrounding engine so this module
//! stays deterministic and directly testable.

use std::collections::{HashMap, HashSet};

use common::types::{ApiActivity, ApiPosition, ApiTrade, PositionSnapshot, TrackedWallet};

use crate::engine::debounce::DebounceTracker;
use crate::types::{ChangeEvent, ChangeKind, ExitReason, ParsedPosition, PriceConfidence};

#[derive(Debug, Clone, Copy)]
pub struct ReconcileSettings {
    /// Minimum share delta before a size change is reported.
    pub dead_zone_shares: f64,
    /// Consecutive absent cycles required before a closure is emitted.
    pub closure_confirm_cycles: u32,
}

/// Result of one reconciliation cycle for one wallet. `upserts` and
/// `removals` are only persisted after notification, so a failed cycle
/// replays unchanged next round.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub events: Vec<ChangeEvent>,
    pub upserts: Vec<PositionSnapshot>,
    pub removals: Vec<String>,
}

pub fn reconcile(
    wallet: &TrackedWallet,
    old_snapshot: &HashMap<String, PositionSnapshot>,
    fetched: &[ApiPosition],
    trades: &[ApiTrade],
    activity: &[ApiActivity],
    debounce: &DebounceTracker,
    settings: &ReconcileSettings,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    let mut seen = HashSet::new();

    for raw in fetched {
        let Some(parsed) = ParsedPosition::from_api(raw) else {
            tracing::debug!(wallet = %wallet.address, "skipping unparseable position record");
            continue;
        };
        if !seen.insert(parsed.position_id.clone()) {
            continue;
        }
        debounce.clear(&wallet.address, &parsed.position_id);

        match old_snapshot.get(&parsed.position_id) {
            None => {
                outcome.events.push(event(
                    wallet,
                    &parsed,
                    ChangeKind::Opened {
                        size: parsed.size,
                        avg_price: parsed.avg_price,
                        value: parsed.size * parsed.avg_price,
                    },
                ));
            }
            Some(old) if parsed.size > old.size + settings.dead_zone_shares => {
                let added = parsed.size - old.size;
                let added_value = parsed.size * parsed.avg_price - old.size * old.avg_price;
                let est_trade_price = (added_value / added).max(0.0);
                outcome.events.push(event(
                    wallet,
                    &parsed,
                    ChangeKind::Increased {
                        added,
                        added_value,
                        est_trade_price,
                        old_avg: old.avg_price,
                        new_avg: parsed.avg_price,
                    },
                ));
            }
            Some(old) if parsed.size < old.size - settings.dead_zone_shares => {
                let removed = old.size - parsed.size;
                let kind = match latest_sell_price(trades, &parsed.position_id) {
                    Some(fill) => ChangeKind::Decreased {
                        removed,
                        trade_price: fill,
                        confidence: PriceConfidence::Confirmed,
                        pnl: Some((fill - old.avg_price) * removed),
                    },
                    None => ChangeKind::Decreased {
                        removed,
                        trade_price: parsed.avg_price,
                        confidence: PriceConfidence::Estimated,
                        pnl: None,
                    },
                };
                outcome.events.push(event(wallet, &parsed, kind));
            }
            Some(_) => {}
        }
        outcome.upserts.push(parsed.into_snapshot());
    }

    let mut missing: Vec<&String> = old_snapshot
        .keys()
        .filter(|id| !seen.contains(*id))
        .collect();
    missing.sort();

    for id in missing {
        let old = &old_snapshot[id];
        let count = debounce.bump(&wallet.address, id);
        if count < settings.closure_confirm_cycles {
            continue;
        }
        debounce.clear(&wallet.address, id);

        let (exit, exit_price) = resolve_exit(trades, activity, id, old.condition_id.as_deref());
        let pnl = (old.avg_price > 0.0).then(|| (exit_price - old.avg_price) * old.size);
        // An expiry settles at exactly zero, so the percent loss is
        // exactly -100 rather than a division artifact.
        let pnl_pct = (old.avg_price > 0.0).then(|| match exit {
            ExitReason::Expired => -100.0,
            _ => (exit_price / old.avg_price - 1.0) * 100.0,
        });

        outcome.events.push(ChangeEvent {
            wallet: wallet.clone(),
            title: old.title.clone(),
            outcome: old.outcome.clone(),
            slug: old.slug.clone(),
            event_id: old.event_id.clone(),
            kind: ChangeKind::Closed {
                size: old.size,
                exit,
                exit_price,
                pnl,
                pnl_pct,
            },
        });
        outcome.removals.push(id.clone());
    }

    outcome
}

fn event(wallet: &TrackedWallet, parsed: &ParsedPosition, kind: ChangeKind) -> ChangeEvent {
    ChangeEvent {
        wallet: wallet.clone(),
        title: parsed.title.clone(),
        outcome: parsed.outcome.clone(),
        slug: parsed.slug.clone(),
        event_id: parsed.event_id.clone(),
        kind,
    }
}

/// Price of the most recent SELL fill for the asset, if any.
fn latest_sell_price(trades: &[ApiTrade], position_id: &str) -> Option<f64> {
    trades
        .iter()
        .filter(|t| {
            t.asset.as_deref() == Some(position_id)
                && t.side.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("SELL"))
        })
        .max_by_key(|t| t.timestamp.unwrap_or(0))
        .and_then(|t| t.price.as_deref())
        .and_then(|p| p.parse::<f64>().ok())
}

/// A sell fill wins over a redemption; a redemption of the position's
/// market settles at 1.0; anything else is an expiry at 0.0.
fn resolve_exit(
    trades: &[ApiTrade],
    activity: &[ApiActivity],
    position_id: &str,
    condition_id: Option<&str>,
) -> (ExitReason, f64) {
    if let Some(fill) = latest_sell_price(trades, position_id) {
        return (ExitReason::SoldAll, fill);
    }
    let redeemed = condition_id.is_some_and(|cond| {
        activity.iter().any(|a| {
            a.activity_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("REDEEM"))
                && a.condition_id.as_deref() == Some(cond)
        })
    });
    if redeemed {
        (ExitReason::Redeemed, 1.0)
    } else {
        (ExitReason::Expired, 0.0)
    }
}
