//! Heap and remembered-set statistics.
//!
//! Counters are updated with relaxed atomics from mutators (barrier, allocation)
//! and from the collector (card aging, scans).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Statistics about heap and card-tracking activity.
#[derive(Debug)]
pub struct GcStats {
    // =========================================================================
    // Allocation
    // =========================================================================
    /// Total bytes allocated since start.
    pub bytes_allocated: AtomicU64,
    /// Total objects allocated since start.
    pub objects_allocated: AtomicU64,

    // =========================================================================
    // Cards
    // =========================================================================
    /// Cards dirtied by the write barrier (including re-dirtying).
    pub cards_dirtied: AtomicU64,
    /// Dirty cards moved into remembered sets by card aging.
    pub cards_collected: AtomicU64,
    /// Cards visited by remembered-set scans.
    pub cards_scanned: AtomicU64,
    /// Scanned cards kept because they still reference the target space.
    pub cards_retained: AtomicU64,
    /// Cards removed by scans or range drops.
    pub cards_dropped: AtomicU64,

    // =========================================================================
    // Marking
    // =========================================================================
    /// References handed to a collector from remembered-set scans.
    pub references_marked: AtomicU64,
    /// Number of remembered-set scans.
    pub scans: AtomicU64,
    /// Total time spent scanning remembered sets (nanoseconds).
    pub scan_time_ns: AtomicU64,
}

impl GcStats {
    /// Create new empty statistics.
    pub const fn new() -> Self {
        Self {
            bytes_allocated: AtomicU64::new(0),
            objects_allocated: AtomicU64::new(0),
            cards_dirtied: AtomicU64::new(0),
            cards_collected: AtomicU64::new(0),
            cards_scanned: AtomicU64::new(0),
            cards_retained: AtomicU64::new(0),
            cards_dropped: AtomicU64::new(0),
            references_marked: AtomicU64::new(0),
            scans: AtomicU64::new(0),
            scan_time_ns: AtomicU64::new(0),
        }
    }

    /// Record an allocation.
    #[inline]
    pub fn record_allocation(&self, size: usize) {
        self.bytes_allocated
            .fetch_add(size as u64, Ordering::Relaxed);
        self.objects_allocated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a card dirtied by the write barrier.
    #[inline]
    pub fn record_card_dirtied(&self) {
        self.cards_dirtied.fetch_add(1, Ordering::Relaxed);
    }

    /// Record cards moved from the card table into a remembered set.
    pub fn record_cards_collected(&self, count: usize) {
        self.cards_collected
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record cards removed from a remembered set.
    pub fn record_cards_dropped(&self, count: usize) {
        self.cards_dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record references marked through a remembered set.
    #[inline]
    pub fn record_references_marked(&self, count: usize) {
        self.references_marked.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record a finished remembered-set scan.
    pub fn record_scan(&self, scanned: usize, retained: usize, duration: Duration) {
        self.scans.fetch_add(1, Ordering::Relaxed);
        self.cards_scanned
            .fetch_add(scanned as u64, Ordering::Relaxed);
        self.cards_retained
            .fetch_add(retained as u64, Ordering::Relaxed);
        self.record_cards_dropped(scanned - retained);
        self.scan_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Average time per remembered-set scan.
    pub fn avg_scan_time(&self) -> Duration {
        let count = self.scans.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.scan_time_ns.load(Ordering::Relaxed) / count)
    }

    /// Fraction of scanned cards that were retained (0.0 when nothing was scanned).
    pub fn retention_ratio(&self) -> f64 {
        let scanned = self.cards_scanned.load(Ordering::Relaxed);
        if scanned == 0 {
            return 0.0;
        }
        self.cards_retained.load(Ordering::Relaxed) as f64 / scanned as f64
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        for counter in [
            &self.bytes_allocated,
            &self.objects_allocated,
            &self.cards_dirtied,
            &self.cards_collected,
            &self.cards_scanned,
            &self.cards_retained,
            &self.cards_dropped,
            &self.references_marked,
            &self.scans,
            &self.scan_time_ns,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Emit a summary of the counters as a single `tracing` event.
    pub fn log_summary(&self) {
        tracing::info!(
            objects = self.objects_allocated.load(Ordering::Relaxed),
            bytes = %format_bytes(self.bytes_allocated.load(Ordering::Relaxed)),
            cards_dirtied = self.cards_dirtied.load(Ordering::Relaxed),
            cards_collected = self.cards_collected.load(Ordering::Relaxed),
            cards_scanned = self.cards_scanned.load(Ordering::Relaxed),
            cards_retained = self.cards_retained.load(Ordering::Relaxed),
            cards_dropped = self.cards_dropped.load(Ordering::Relaxed),
            references_marked = self.references_marked.load(Ordering::Relaxed),
            avg_scan = ?self.avg_scan_time(),
            "heap statistics"
        );
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Format bytes in human-readable form.
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Timer for collection phases; reports through `tracing` when stopped.
pub struct GcTimer {
    start: Instant,
    label: &'static str,
}

impl GcTimer {
    /// Start a new timer with the given label.
    pub fn start(label: &'static str) -> Self {
        Self {
            start: Instant::now(),
            label,
        }
    }

    /// Stop the timer and return the elapsed duration.
    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();
        tracing::debug!(phase = self.label, elapsed_us = elapsed.as_micros() as u64, "gc phase finished");
        elapsed
    }
}
