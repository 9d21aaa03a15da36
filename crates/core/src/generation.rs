//! Freshness guard for overlapping fetches.

use std::sync::atomic::{AtomicU64, Ordering};

/// Issue counter for fetches.
///
/// Every fetch takes a number from [`Generation::issue`]; its result may be
/// applied only while [`Generation::is_current`] still holds for that number.
/// A slower response from an older fetch is therefore discarded instead of
/// overwriting a newer one.
#[derive(Debug, Default)]
pub struct Generation {
    latest: AtomicU64,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumps the counter and returns the number for the new fetch.
    pub fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == generation
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}
