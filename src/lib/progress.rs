//! Progress logging for the site stream.

use std::sync::atomic::{AtomicU64, Ordering};

use log::info;

/// Interval-based progress logger over processed sites.
///
/// Thread-safe; the counters are atomic so a driver that fans sites out
/// across workers can share one tracker.
pub struct SiteProgress {
    interval: u64,
    seen: AtomicU64,
    processed: AtomicU64,
}

impl SiteProgress {
    /// Creates a tracker logging every `interval` sites seen.
    #[must_use]
    pub fn new(interval: u64) -> Self {
        SiteProgress { interval: interval.max(1), seen: AtomicU64::new(0), processed: AtomicU64::new(0) }
    }

    /// Counts one site from the input stream, logging on interval
    /// boundaries. `processed` marks sites that reached full evaluation.
    pub fn record_site(&self, chrom: &str, pos: u64, processed: bool) {
        let seen = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        if processed {
            self.processed.fetch_add(1, Ordering::Relaxed);
        }
        if seen % self.interval == 0 {
            info!("Sites seen: {seen} (at {chrom}:{pos})");
        }
    }

    /// Sites seen so far.
    #[must_use]
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }

    /// Sites that reached full evaluation.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Logs the end-of-run summary with the processed ratio.
    pub fn log_summary(&self) {
        let seen = self.seen();
        let processed = self.processed();
        let ratio = if seen == 0 { 0.0 } else { processed as f64 / seen as f64 };
        info!("Total sites: {seen}");
        info!("Processed sites: {processed} ({:.2}%)", ratio * 100.0);
    }
}
