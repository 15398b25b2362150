//! Concurrency-safe outcome counters.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::policy::ItemOutcome;

/// Per-request counters, updated once per item from any task.
#[derive(Debug, Default)]
pub struct Aggregator {
    processed: AtomicU64,
    ok: AtomicU64,
    fail: AtomicU64,
    retries: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub processed: u64,
    pub ok: u64,
    pub fail: u64,
    pub retries: u64,
}

impl Tally {
    /// Fold one outcome in. Used where results are reduced in a single task.
    pub fn add(mut self, outcome: ItemOutcome) -> Self {
        self.processed += 1;
        if outcome.ok {
            self.ok += 1;
        } else {
            self.fail += 1;
        }
        self.retries += u64::from(outcome.retries());
        self
    }

    pub fn merge(self, other: Tally) -> Self {
        Self {
            processed: self.processed + other.processed,
            ok: self.ok + other.ok,
            fail: self.fail + other.fail,
            retries: self.retries + other.retries,
        }
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one item's terminal outcome. Must be called exactly once per item.
    pub fn record(&self, outcome: ItemOutcome) {
        if outcome.ok {
            self.ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.fail.fetch_add(1, Ordering::Relaxed);
        }
        self.retries
            .fetch_add(u64::from(outcome.retries()), Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_tally(&self, tally: Tally) {
        self.ok.fetch_add(tally.ok, Ordering::Relaxed);
        self.fail.fetch_add(tally.fail, Ordering::Relaxed);
        self.retries.fetch_add(tally.retries, Ordering::Relaxed);
        self.processed.fetch_add(tally.processed, Ordering::AcqRel);
    }

    /// Read the counters. Only meaningful once every item has been recorded.
    pub fn snapshot(&self) -> Tally {
        let processed = self.processed.load(Ordering::Acquire);
        Tally {
            processed,
            ok: self.ok.load(Ordering::Relaxed),
            fail: self.fail.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const OK: ItemOutcome = ItemOutcome { ok: true, attempts: 1 };
    const FAIL: ItemOutcome = ItemOutcome { ok: false, attempts: 2 };

    #[test]
    fn each_record_hits_one_side() {
        let agg = Aggregator::new();
        agg.record(OK);
        agg.record(FAIL);
        agg.record(OK);
        let t = agg.snapshot();
        assert_eq!(t.processed, 3);
        assert_eq!(t.ok, 2);
        assert_eq!(t.fail, 1);
        assert_eq!(t.retries, 1);
    }

    #[test]
    fn tally_fold_matches_atomic_path() {
        let folded = [OK, FAIL, FAIL].into_iter().fold(Tally::default(), Tally::add);
        let agg = Aggregator::new();
        agg.record_tally(folded);
        assert_eq!(agg.snapshot(), folded);
        assert_eq!(folded.ok + folded.fail, folded.processed);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let agg = Arc::new(Aggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let agg = Arc::clone(&agg);
                std::thread::spawn(move || {
                    for i in 0..1_000 {
                        agg.record(if (i + t) % 3 == 0 { FAIL } else { OK });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let t = agg.snapshot();
        assert_eq!(t.processed, 8_000);
        assert_eq!(t.ok + t.fail, t.processed);
    }
}
