//! Run-level metrics and their TSV writer.

use std::path::Path;

use anyhow::{Context, Result};
use fgoxide::io::DelimFile;
use serde::{Deserialize, Serialize};

use crate::site::SkipReason;

/// Trait for metrics types that can name themselves in error messages.
pub trait Metric: Serialize {
    /// Short name of the metric family.
    fn metric_name() -> &'static str;
}

/// Counters accumulated over one calling run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CallMetrics {
    /// Sites seen on the input stream
    pub total_sites: u64,
    /// Sites that reached full evaluation
    pub processed_sites: u64,
    /// Sites that passed the call threshold
    pub called_sites: u64,
    /// Variant records written
    pub records_written: u64,
    /// Skips: reference base outside {A, C, G, T}
    pub skipped_non_canonical_reference: u64,
    /// Skips: outside the configured targets
    pub skipped_outside_targets: u64,
    /// Skips: no observations after filtering
    pub skipped_zero_coverage: u64,
    /// Skips: coverage below the minimum
    pub skipped_low_coverage: u64,
    /// Skips: no sufficiently supported alternate
    pub skipped_insufficient_alternates: u64,
    /// Skips: fewer than two viable genotype alleles
    pub skipped_no_viable_alleles: u64,
}

impl CallMetrics {
    /// A zeroed metrics record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one skipped site.
    pub fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::NonCanonicalReference => self.skipped_non_canonical_reference += 1,
            SkipReason::OutsideTargets => self.skipped_outside_targets += 1,
            SkipReason::ZeroCoverage => self.skipped_zero_coverage += 1,
            SkipReason::LowCoverage => self.skipped_low_coverage += 1,
            SkipReason::InsufficientAlternates => self.skipped_insufficient_alternates += 1,
            SkipReason::NoViableAlleles => self.skipped_no_viable_alleles += 1,
        }
    }

    /// Total skipped sites.
    #[must_use]
    pub fn total_skipped(&self) -> u64 {
        self.skipped_non_canonical_reference
            + self.skipped_outside_targets
            + self.skipped_zero_coverage
            + self.skipped_low_coverage
            + self.skipped_insufficient_alternates
            + self.skipped_no_viable_alleles
    }

    /// Fraction of seen sites that reached evaluation.
    #[must_use]
    pub fn processed_ratio(&self) -> f64 {
        if self.total_sites == 0 {
            0.0
        } else {
            self.processed_sites as f64 / self.total_sites as f64
        }
    }
}

impl Metric for CallMetrics {
    fn metric_name() -> &'static str {
        "call"
    }
}

/// Writes metrics to a TSV file with consistent error handling.
pub fn write_metrics<P: AsRef<Path>, T: Metric>(path: P, metrics: &[T]) -> Result<()> {
    let path_ref = path.as_ref();
    DelimFile::default().write_tsv(&path_ref, metrics).with_context(|| {
        format!("Failed to write {} metrics: {}", T::metric_name(), path_ref.display())
    })
}
