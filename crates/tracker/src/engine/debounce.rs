use std::collections::HashMap;
use std::sync::Mutex;

/// Counts consecutive polling cycles in which a known position was
/// missing from the fetched snapshot. A position is only treated as
/// closed once the count reaches the configured threshold, which
/// filters out transient API omissions.
#[derive(Debug, Default)]
pub struct DebounceTracker {
    counts: Mutex<HashMap<(String, String), u32>>,
}

impl DebounceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record another cycle of absence and return the new count.
    pub fn bump(&self, wallet: &str, position_id: &str) -> u32 {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let entry = counts
            .entry((wallet.to_string(), position_id.to_string()))
            .or_insert(0);
        *entry += 1;
        *entry
    }

    /// Reset the counter when the position shows up again, or once a
    /// closure has been emitted.
    pub fn clear(&self, wallet: &str, position_id: &str) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.remove(&(wallet.to_string(), position_id.to_string()));
    }

    /// Drop all counters for a wallet, used when the wallet is removed.
    pub fn clear_wallet(&self, wallet: &str) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.retain(|(w, _), _| w != wallet);
    }

    pub fn pending(&self, wallet: &str, position_id: &str) -> u32 {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts
            .get(&(wallet.to_string(), position_id.to_string()))
            .copied()
            .unwrap_or(0)
    }
}
