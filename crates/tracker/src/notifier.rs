//! Renders classified position changes into Telegram Markdown and
//! dispatches them. Rendering is pure so the formatting is testable
//! without a bot token.

use metrics::counter;
use tracing::warn;

use crate::telegram::TelegramClient;
use crate::types::{ChangeEvent, ChangeKind, PriceConfidence};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLink {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub link: Option<MessageLink>,
}

pub fn profile_url(address: &str) -> String {
    format!("https://polymarket.com/profile/{address}")
}

pub fn market_url(slug: &str) -> String {
    format!("https://polymarket.com/event/{slug}")
}

/// Display names come from operator input and may contain Markdown
/// control characters; underscores are the one that breaks parsing.
fn sanitize_name(name: &str) -> String {
    name.replace('_', " ")
}

fn fmt_shares(shares: f64) -> String {
    format!("{shares:.1}")
}

fn fmt_usd(value: f64) -> String {
    if value < 0.0 {
        format!("-${:.2}", value.abs())
    } else {
        format!("${value:.2}")
    }
}

/// Prices live on the provider's 0-1 scale; humans read cents.
fn fmt_cents(price: f64) -> String {
    format!("{:.1}\u{a2}", price * 100.0)
}

fn fmt_pct(pct: f64) -> String {
    format!("{pct:+.1}%")
}

/// Render one change event. Section order is fixed: header, event
/// title and category, pick, monetary fields, size, price.
pub fn render(event: &ChangeEvent, category: &str) -> Message {
    let name = sanitize_name(&event.wallet.name);
    let mut lines = Vec::new();

    let header = match &event.kind {
        ChangeKind::Opened { .. } => "\u{2705} *New Position*".to_string(),
        ChangeKind::Increased { .. } => "\u{1f4c8} *Position Increased*".to_string(),
        ChangeKind::Decreased { .. } => "\u{1f4c9} *Position Decreased*".to_string(),
        ChangeKind::Closed { exit, .. } => {
            format!("\u{1f6aa} *Position Closed: {}*", exit.label())
        }
    };
    lines.push(header);
    lines.push(format!(
        "\u{1f464} [{name}]({})",
        profile_url(&event.wallet.address)
    ));
    lines.push(format!("\u{1f4cb} *Event:* {}", event.title));
    if !category.is_empty() {
        lines.push(format!("*Category:* {category}"));
    }
    lines.push(format!("\u{1f3af} *Pick:* {}", event.outcome));

    match &event.kind {
        ChangeKind::Opened {
            size,
            avg_price,
            value,
        } => {
            lines.push(format!("\u{1f4b0} *Value:* {}", fmt_usd(*value)));
            lines.push(format!("\u{1f4ca} *Size:* {} shares", fmt_shares(*size)));
            lines.push(format!("\u{1f4b5} *Avg Price:* {}", fmt_cents(*avg_price)));
        }
        ChangeKind::Increased {
            added,
            added_value,
            est_trade_price,
            old_avg,
            new_avg,
        } => {
            lines.push(format!("\u{1f4b0} *Added Value:* {}", fmt_usd(*added_value)));
            lines.push(format!("\u{1f4ca} *Added:* {} shares", fmt_shares(*added)));
            lines.push(format!(
                "\u{1f4b5} *Est. Trade Price:* {} (avg {} \u{2192} {})",
                fmt_cents(*est_trade_price),
                fmt_cents(*old_avg),
                fmt_cents(*new_avg)
            ));
        }
        ChangeKind::Decreased {
            removed,
            trade_price,
            confidence,
            pnl,
        } => {
            if let Some(pnl) = pnl {
                lines.push(format!("\u{1f4b0} *Realized PnL:* {}", fmt_usd(*pnl)));
            }
            lines.push(format!("\u{1f4ca} *Sold:* {} shares", fmt_shares(*removed)));
            let price_line = match confidence {
                PriceConfidence::Confirmed => {
                    format!("\u{1f4b5} *Trade Price:* {}", fmt_cents(*trade_price))
                }
                PriceConfidence::Estimated => {
                    format!("\u{1f4b5} *Trade Price:* ~{} (est.)", fmt_cents(*trade_price))
                }
            };
            lines.push(price_line);
        }
        ChangeKind::Closed {
            size,
            exit_price,
            pnl,
            pnl_pct,
            ..
        } => {
            match (pnl, pnl_pct) {
                (Some(pnl), Some(pct)) => lines.push(format!(
                    "\u{1f4b0} *PnL:* {} ({})",
                    fmt_usd(*pnl),
                    fmt_pct(*pct)
                )),
                (Some(pnl), None) => {
                    lines.push(format!("\u{1f4b0} *PnL:* {}", fmt_usd(*pnl)));
                }
                _ => {}
            }
            lines.push(format!("\u{1f4ca} *Size:* {} shares", fmt_shares(*size)));
            lines.push(format!("\u{1f4b5} *Exit Price:* {}", fmt_cents(*exit_price)));
        }
    }

    let link = (!event.slug.is_empty()).then(|| MessageLink {
        label: "View Market".to_string(),
        url: market_url(&event.slug),
    });

    Message {
        text: lines.join("\n"),
        link,
    }
}

pub struct Notifier {
    telegram: std::sync::Arc<TelegramClient>,
    chat_id: i64,
}

impl Notifier {
    pub fn new(telegram: std::sync::Arc<TelegramClient>, chat_id: i64) -> Self {
        Self { telegram, chat_id }
    }

    /// Send one rendered event. Failures are logged and counted; the
    /// caller decides nothing based on the outcome.
    pub async fn notify(&self, event: &ChangeEvent, category: &str) {
        let message = render(event, category);
        let button = message
            .link
            .as_ref()
            .map(|l| (l.label.as_str(), l.url.as_str()));
        if let Err(err) = self
            .telegram
            .send_message(self.chat_id, &message.text, button)
            .await
        {
            counter!("tracker_notify_failures_total").increment(1);
            warn!(wallet = %event.wallet.address, error = %err, "failed to send notification");
        }
    }

    /// Plain-text operator reply for the command surface.
    pub async fn reply(&self, text: &str) {
        if let Err(err) = self.telegram.send_message(self.chat_id, text, None).await {
            counter!("tracker_notify_failures_total").increment(1);
            warn!(error = %err, "failed to send reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExitReason;
    use common::types::TrackedWallet;

    fn event(kind: ChangeKind) -> ChangeEvent {
        ChangeEvent {
            wallet: TrackedWallet {
                address: "0xabc".to_string(),
                name: "big_whale".to_string(),
            },
            title: "Will it rain?".to_string(),
            outcome: "Yes".to_string(),
            slug: "will-it-rain".to_string(),
            event_id: Some("17".to_string()),
            kind,
        }
    }

    #[test]
    fn test_opened_sections_in_order() {
        let msg = render(
            &event(ChangeKind::Opened {
                size: 10.0,
                avg_price: 0.20,
                value: 2.0,
            }),
            "🏛️ Politics",
        );
        let lines: Vec<&str> = msg.text.lines().collect();
        assert!(lines[0].contains("New Position"));
        assert!(lines[1].contains("big whale"), "underscore not sanitized");
        assert!(lines[1].contains("https://polymarket.com/profile/0xabc"));
        assert!(lines[2].contains("Will it rain?"));
        assert!(lines[3].contains("Politics"));
        assert!(lines[4].contains("Pick"));
        assert!(lines[5].contains("$2.00"));
        assert!(lines[6].contains("10.0 shares"));
        assert!(lines[7].contains("20.0¢"));
    }

    #[test]
    fn test_empty_category_line_is_omitted() {
        let msg = render(
            &event(ChangeKind::Opened {
                size: 10.0,
                avg_price: 0.20,
                value: 2.0,
            }),
            "",
        );
        assert!(!msg.text.contains("Category"));
    }

    #[test]
    fn test_increase_renders_marginal_price_in_cents() {
        let msg = render(
            &event(ChangeKind::Increased {
                added: 5.0,
                added_value: 1.30,
                est_trade_price: 0.26,
                old_avg: 0.20,
                new_avg: 0.22,
            }),
            "",
        );
        assert!(msg.text.contains("$1.30"));
        assert!(msg.text.contains("26.0¢"));
        assert!(msg.text.contains("20.0¢ → 22.0¢"));
    }

    #[test]
    fn test_estimated_price_carries_marker() {
        let msg = render(
            &event(ChangeKind::Decreased {
                removed: 6.0,
                trade_price: 0.22,
                confidence: PriceConfidence::Estimated,
                pnl: None,
            }),
            "",
        );
        assert!(msg.text.contains("~22.0¢ (est.)"));
        assert!(!msg.text.contains("Realized PnL"));
    }

    #[test]
    fn test_confirmed_price_has_no_marker() {
        let msg = render(
            &event(ChangeKind::Decreased {
                removed: 6.0,
                trade_price: 0.40,
                confidence: PriceConfidence::Confirmed,
                pnl: Some(1.20),
            }),
            "",
        );
        assert!(msg.text.contains("*Trade Price:* 40.0¢"));
        assert!(msg.text.contains("$1.20"));
    }

    #[test]
    fn test_closed_expiry_renders_full_loss() {
        let msg = render(
            &event(ChangeKind::Closed {
                size: 10.0,
                exit: ExitReason::Expired,
                exit_price: 0.0,
                pnl: Some(-2.0),
                pnl_pct: Some(-100.0),
            }),
            "",
        );
        assert!(msg.text.contains("Expired (Lost)"));
        assert!(msg.text.contains("-$2.00"));
        assert!(msg.text.contains("-100.0%"));
        assert!(msg.text.contains("0.0¢"));
    }

    #[test]
    fn test_market_link_from_slug() {
        let msg = render(
            &event(ChangeKind::Opened {
                size: 1.0,
                avg_price: 0.5,
                value: 0.5,
            }),
            "",
        );
        let link = msg.link.unwrap();
        assert_eq!(link.label, "View Market");
        assert_eq!(link.url, "https://polymarket.com/event/will-it-rain");
    }

    #[test]
    fn test_missing_slug_means_no_link() {
        let mut e = event(ChangeKind::Opened {
            size: 1.0,
            avg_price: 0.5,
            value: 0.5,
        });
        e.slug = String::new();
        assert!(render(&e, "").link.is_none());
    }
}
