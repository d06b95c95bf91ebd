use std::sync::atomic::{AtomicU64, Ordering};

/// Shared corpus-wide maximum frequency, the denominator of the confidence
/// frequency term.
///
/// Batch extraction and the retention sweep recompute it exactly; the online
/// learner only ever raises it. Between refreshes it may lag the true value,
/// which the scorer tolerates by clamping the frequency term.
#[derive(Debug, Default)]
pub struct CorpusStats {
    max_frequency: AtomicU64,
}

impl CorpusStats {
    pub fn new(max_frequency: u64) -> Self {
        Self { max_frequency: AtomicU64::new(max_frequency) }
    }

    pub fn snapshot(&self) -> u64 {
        self.max_frequency.load(Ordering::Relaxed)
    }

    /// Exact refresh after a full-corpus recount.
    pub fn set(&self, max_frequency: u64) {
        self.max_frequency.store(max_frequency, Ordering::Relaxed);
    }

    /// Monotone raise from a single freshly merged pattern. Never lowers the
    /// value; concurrent raisers cannot lose each other's updates.
    pub fn raise(&self, candidate: u64) {
        self.max_frequency.fetch_max(candidate, Ordering::Relaxed);
    }
}
