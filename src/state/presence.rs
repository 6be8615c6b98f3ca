use std::collections::HashMap;

use crate::common::Status;

/// Last-known status per peer, fed by retained presence messages and the
/// broker's last-will delivery.
///
/// Latest write wins. Entries are never removed; a peer that goes offline
/// stays listed as offline for the process lifetime. Listing order is the
/// order of first sighting, not alphabetical and not recency.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    statuses: HashMap<String, Status>,
    order: Vec<String>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent upsert.
    pub fn record(&mut self, peer: &str, status: Status) {
        if !self.statuses.contains_key(peer) {
            self.order.push(peer.to_string());
        }
        self.statuses.insert(peer.to_string(), status);
    }

    pub fn status(&self, peer: &str) -> Option<Status> {
        self.statuses.get(peer).copied()
    }

    pub fn all(&self) -> impl Iterator<Item = (&str, Status)> + '_ {
        self.order
            .iter()
            .map(|peer| (peer.as_str(), self.statuses[peer]))
    }
}
