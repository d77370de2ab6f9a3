//! Destination selection within a cluster

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::config::SelectionPolicy;

/// Picks one destination of a cluster per forwarding attempt.
///
/// Selection is deterministic: `RoundRobin` walks the destinations in their
/// configured order with a shared counter, `First` always returns the first one.
#[derive(Debug)]
pub struct DestinationSelector {
    policy: SelectionPolicy,
    round_robin_index: AtomicUsize,
}

impl DestinationSelector {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            round_robin_index: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Select a destination, `None` only when the slice is empty
    pub fn select<'a>(&self, destinations: &'a [String]) -> Option<&'a str> {
        if destinations.is_empty() {
            return None;
        }

        let selected = match self.policy {
            SelectionPolicy::First => &destinations[0],
            SelectionPolicy::RoundRobin => {
                let index = self.round_robin_index.fetch_add(1, Ordering::Relaxed);
                &destinations[index % destinations.len()]
            }
        };

        debug!(destination = %selected, policy = ?self.policy, "Selected destination");
        Some(selected.as_str())
    }
}
