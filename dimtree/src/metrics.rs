//! Pre-filter rejection counters
//!
//! The tree only reports rejections; storage and export belong to the caller.
//!
//! ## Implementations
//!
//! - `NoopMetrics`: discards every event (the default)
//! - `PreFilterCounters`: one atomic counter per dimension

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sink for pre-filter rejections
///
/// Called from concurrent `find` calls, so implementations must be safe for
/// concurrent use.
pub trait PreFilterMetrics: Send + Sync + std::fmt::Debug {
    /// A query was rejected by the pre-filter of dimension `dimension_index`
    fn record_reject(&self, dimension_index: usize, dimension_name: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl PreFilterMetrics for NoopMetrics {
    #[inline]
    fn record_reject(&self, _dimension_index: usize, _dimension_name: &str) {}
}

/// Atomic per-dimension rejection counters
#[derive(Debug)]
pub struct PreFilterCounters {
    names: Vec<String>,
    counts: Vec<AtomicU64>,
}

impl PreFilterCounters {
    /// One counter per dimension name, positionally aligned with the tree's dimensions
    pub fn new<I, S>(dimension_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = dimension_names.into_iter().map(Into::into).collect();
        let counts = names.iter().map(|_| AtomicU64::new(0)).collect();
        Self { names, counts }
    }

    pub fn reject_count(&self, dimension_index: usize) -> u64 {
        self.counts
            .get(dimension_index)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Non-zero counts keyed by dimension name
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.names
            .iter()
            .zip(&self.counts)
            .map(|(name, count)| (name.clone(), count.load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }
}

impl PreFilterMetrics for PreFilterCounters {
    fn record_reject(&self, dimension_index: usize, _dimension_name: &str) {
        if let Some(count) = self.counts.get(dimension_index) {
            count.fetch_add(1, Ordering::Relaxed);
        }
    }
}
