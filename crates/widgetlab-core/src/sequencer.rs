//! Latest-wins coordination for overlapping async work.

use std::sync::atomic::{AtomicU64, Ordering};

/// Issues monotonically increasing tokens; only the newest token's result is applied.
///
/// Superseded work is not cancelled. It finishes and its result is dropped.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request. Tokens begin at 1.
    pub fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `token` is still the most recent request.
    pub fn is_latest(&self, token: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == token
    }

    pub fn current(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}
