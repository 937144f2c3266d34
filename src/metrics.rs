//! Prometheus metrics (lock-free atomics, zero allocation on the hot path).

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // --- NearCache ---
    pub near_cache_hits: AtomicU64,
    pub near_cache_misses: AtomicU64,
    pub near_cache_admits: AtomicU64,
    pub near_cache_admit_aborts: AtomicU64,

    // --- Change feed ---
    pub change_feed_records: AtomicU64,
    pub change_feed_invalidations: AtomicU64,
    pub change_feed_self_echoes: AtomicU64,
    pub change_feed_tick_errors: AtomicU64,

    // --- Global store ---
    pub global_store_errors: AtomicU64,
}

impl Metrics {
    const fn new() -> Self {
        Self {
            near_cache_hits: AtomicU64::new(0),
            near_cache_misses: AtomicU64::new(0),
            near_cache_admits: AtomicU64::new(0),
            near_cache_admit_aborts: AtomicU64::new(0),
            change_feed_records: AtomicU64::new(0),
            change_feed_invalidations: AtomicU64::new(0),
            change_feed_self_echoes: AtomicU64::new(0),
            change_feed_tick_errors: AtomicU64::new(0),
            global_store_errors: AtomicU64::new(0),
        }
    }

    /// Render in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let hits = self.near_cache_hits.load(Ordering::Relaxed);
        let misses = self.near_cache_misses.load(Ordering::Relaxed);
        let admits = self.near_cache_admits.load(Ordering::Relaxed);
        let admit_aborts = self.near_cache_admit_aborts.load(Ordering::Relaxed);
        let records = self.change_feed_records.load(Ordering::Relaxed);
        let invalidations = self.change_feed_invalidations.load(Ordering::Relaxed);
        let self_echoes = self.change_feed_self_echoes.load(Ordering::Relaxed);
        let tick_errors = self.change_feed_tick_errors.load(Ordering::Relaxed);
        let store_errors = self.global_store_errors.load(Ordering::Relaxed);

        format!(
            "\
# HELP tiered_cache_near_cache_hits_total Near-cache hits.\n\
# TYPE tiered_cache_near_cache_hits_total counter\n\
tiered_cache_near_cache_hits_total {hits}\n\
# HELP tiered_cache_near_cache_misses_total Near-cache misses.\n\
# TYPE tiered_cache_near_cache_misses_total counter\n\
tiered_cache_near_cache_misses_total {misses}\n\
# HELP tiered_cache_near_cache_admits_total Values admitted into the near-cache.\n\
# TYPE tiered_cache_near_cache_admits_total counter\n\
tiered_cache_near_cache_admits_total {admits}\n\
# HELP tiered_cache_near_cache_admit_aborts_total Admissions dropped by canAdmit.\n\
# TYPE tiered_cache_near_cache_admit_aborts_total counter\n\
tiered_cache_near_cache_admit_aborts_total {admit_aborts}\n\
# HELP tiered_cache_change_feed_records_total Change-feed records observed.\n\
# TYPE tiered_cache_change_feed_records_total counter\n\
tiered_cache_change_feed_records_total {records}\n\
# HELP tiered_cache_change_feed_invalidations_total Near-cache invalidations fired from the change feed.\n\
# TYPE tiered_cache_change_feed_invalidations_total counter\n\
tiered_cache_change_feed_invalidations_total {invalidations}\n\
# HELP tiered_cache_change_feed_self_echoes_total Records suppressed as self-originated.\n\
# TYPE tiered_cache_change_feed_self_echoes_total counter\n\
tiered_cache_change_feed_self_echoes_total {self_echoes}\n\
# HELP tiered_cache_change_feed_tick_errors_total Consumer ticks that errored.\n\
# TYPE tiered_cache_change_feed_tick_errors_total counter\n\
tiered_cache_change_feed_tick_errors_total {tick_errors}\n\
# HELP tiered_cache_global_store_errors_total Authoritative-store operation errors.\n\
# TYPE tiered_cache_global_store_errors_total counter\n\
tiered_cache_global_store_errors_total {store_errors}\n"
        )
    }
}
