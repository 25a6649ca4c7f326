use std::collections::HashMap;
use std::sync::Mutex;

use crate::fetchers::EventFetcher;

/// Per-process cache of event id to category label. Categories never
/// change once an event exists, so entries are kept for the lifetime
/// of the process. Lookup failures are cached as nothing and retried.
#[derive(Debug, Default)]
pub struct CategoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl CategoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Category label for an event, fetched from the Gamma API on a
    /// cache miss. Returns an empty string when no category is known;
    /// empty results are not cached so a later fetch can fill them in.
    pub async fn resolve<F: EventFetcher>(&self, fetcher: &F, event_id: &str) -> String {
        if let Some(hit) = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(event_id)
        {
            return hit.clone();
        }

        let category = match fetcher.fetch_event(event_id).await {
            Ok(event) => event
                .markets
                .iter()
                .find_map(|m| m.category.clone().filter(|c| !c.is_empty()))
                .unwrap_or_default(),
            Err(err) => {
                tracing::debug!(event_id, error = %err, "category lookup failed");
                String::new()
            }
        };

        if !category.is_empty() {
            self.entries
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(event_id.to_string(), category.clone());
        }
        category
    }
}

/// Emoji-decorated display label for a raw category string.
pub fn decorate(category: &str) -> String {
    if category.is_empty() {
        return String::new();
    }
    let lower = category.to_lowercase();
    if lower.contains("politic") {
        "🏛️ Politics".to_string()
    } else if lower.contains("sport") {
        "🏟️ Sports".to_string()
    } else if lower.contains("crypto") {
        "🪙 Crypto".to_string()
    } else if lower.contains("econ") || lower.contains("business") || lower.contains("finance") {
        "💹 Economy".to_string()
    } else if lower.contains("science") || lower.contains("tech") {
        "🔬 Science & Tech".to_string()
    } else if lower.contains("culture") || lower.contains("pop") {
        "🎬 Culture".to_string()
    } else {
        format!("🏷️ {category}")
    }
}
