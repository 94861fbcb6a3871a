//! Output writers: variant records, the trace log, and failed-site report.
//!
//! The record writer emits one tab-separated line per called alternate,
//! preceded by a header naming the fixed columns and one column per
//! sample. The trace writer appends CSV-shaped rows describing every
//! observation, the sample list, the posterior normalizer, and every
//! scored combo; the pure prior sum and the posterior are separate
//! columns. The failed-site writer emits BED lines for the alternates of
//! sites that missed the call threshold.
//!
//! All three formats are opaque to the inference core; they only consume
//! [`SiteEvaluation`] values.

use std::io::Write;

use anyhow::{Context, Result};

use crate::logprob::{prob_to_phred, safe_exp};
use crate::site::SiteEvaluation;

/// Ceiling applied to reported Phred-scaled qualities.
const MAX_REPORTED_QUALITY: f64 = 10_000.0;

fn fmt_quality(quality: f64) -> String {
    format!("{:.4}", quality.min(MAX_REPORTED_QUALITY))
}

/// Writes called variant records as a tab-separated table.
pub struct RecordWriter<W: Write> {
    out: W,
    sample_list: Vec<String>,
    wrote_header: bool,
}

impl<W: Write> RecordWriter<W> {
    /// Creates a writer emitting one genotype column per listed sample.
    pub fn new(out: W, sample_list: Vec<String>) -> Self {
        RecordWriter { out, sample_list, wrote_header: false }
    }

    fn write_header(&mut self) -> Result<()> {
        let mut columns = vec![
            "chrom".to_string(),
            "pos".to_string(),
            "ref".to_string(),
            "alt".to_string(),
            "qual".to_string(),
            "p_var".to_string(),
            "coverage".to_string(),
            "alt_count".to_string(),
            "het_best".to_string(),
        ];
        if self.sample_list.is_empty() {
            // No fixed sample list: genotypes are packed into one column
            columns.push("genotypes".to_string());
        } else {
            columns.extend(self.sample_list.iter().cloned());
        }
        writeln!(self.out, "#{}", columns.join("\t")).context("Failed to write record header")?;
        self.wrote_header = true;
        Ok(())
    }

    /// Writes the records for one evaluated site; returns how many were
    /// emitted (one per alternate in report-all mode, else at most one).
    pub fn write_site(&mut self, eval: &SiteEvaluation, report_all: bool) -> Result<usize> {
        if !self.wrote_header {
            self.write_header()?;
        }

        let alternates: &[_] = if report_all {
            &eval.alternates
        } else {
            &eval.alternates[..eval.alternates.len().min(1)]
        };

        // Site quality: Phred-scaled probability that the site does not vary
        let qual = fmt_quality(prob_to_phred(eval.p_hom));

        let fmt_call = |call: &crate::site::SampleCall| {
            let wrong = 1.0 - safe_exp(call.log_marginal);
            format!("{}:{}:{}", call.genotype, fmt_quality(prob_to_phred(wrong)), call.observations)
        };
        let genotype_columns: Vec<String> = if self.sample_list.is_empty() {
            let packed: Vec<String> = eval
                .sample_calls
                .iter()
                .map(|call| format!("{}={}", call.name, fmt_call(call)))
                .collect();
            vec![if packed.is_empty() { ".".to_string() } else { packed.join(",") }]
        } else {
            self.sample_list
                .iter()
                .map(|name| {
                    eval.sample_calls
                        .iter()
                        .find(|call| call.name == *name)
                        .map_or_else(|| "./.".to_string(), &fmt_call)
                })
                .collect()
        };

        let mut written = 0;
        for alternate in alternates {
            let fields = [
                eval.chrom.clone(),
                eval.pos.to_string(),
                eval.ref_base.clone(),
                alternate.allele.to_string(),
                qual.clone(),
                format!("{:.6}", eval.p_var),
                eval.coverage.to_string(),
                alternate.count.to_string(),
                (if eval.best_overall_combo_is_het { "1" } else { "0" }).to_string(),
            ];
            let mut line = fields.join("\t");
            if !genotype_columns.is_empty() {
                line.push('\t');
                line.push_str(&genotype_columns.join("\t"));
            }
            writeln!(self.out, "{line}")
                .with_context(|| format!("Failed to write record at {}:{}", eval.chrom, eval.pos))?;
            written += 1;
        }
        Ok(written)
    }

    /// Flushes the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().context("Failed to flush records")
    }
}

/// Appends CSV-shaped trace rows for evaluated sites.
pub struct TraceWriter<W: Write> {
    out: W,
}

impl<W: Write> TraceWriter<W> {
    /// Creates a trace writer over any byte sink.
    pub fn new(out: W) -> Self {
        TraceWriter { out }
    }

    /// Writes the full trace of one site.
    pub fn write_site(&mut self, eval: &SiteEvaluation) -> Result<()> {
        let Some(trace) = &eval.trace else {
            return Ok(());
        };
        let site = format!("{},{}", eval.chrom, eval.pos);

        for row in &trace.alleles {
            writeln!(
                self.out,
                "{site},allele,{},{},{},{},{}",
                row.sample, row.read_id, row.allele, row.base_qual, row.map_qual
            )
            .context("Failed to write allele trace")?;
        }

        let samples: Vec<String> = trace
            .samples_with_data
            .iter()
            .map(|(name, has_data)| format!("{name}={}", u8::from(*has_data)))
            .collect();
        writeln!(self.out, "{site},samples,{}", samples.join(":"))
            .context("Failed to write sample trace")?;

        writeln!(self.out, "{site},posterior_normalizer,{}", trace.posterior_normalizer)
            .context("Failed to write normalizer trace")?;

        for row in &trace.combos {
            writeln!(
                self.out,
                "{site},genotypecombo,{},{},{},{},{},{},{},{}",
                row.genotypes,
                row.data_likelihood,
                row.prior,
                row.prior_g_af,
                row.prior_af,
                row.prior_obs,
                row.posterior,
                row.normalized_posterior
            )
            .context("Failed to write combo trace")?;
        }
        Ok(())
    }

    /// Flushes the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().context("Failed to flush trace")
    }
}

/// Writes BED-shaped rows for sites that missed the call threshold.
pub struct FailedSiteWriter<W: Write> {
    out: W,
}

impl<W: Write> FailedSiteWriter<W> {
    /// Creates a failed-site writer over any byte sink.
    pub fn new(out: W) -> Self {
        FailedSiteWriter { out }
    }

    /// Writes one BED line per non-reference genotype allele of the site.
    pub fn write_site(&mut self, eval: &SiteEvaluation) -> Result<()> {
        let start = eval.pos.saturating_sub(1);
        for allele in &eval.genotype_alleles {
            if allele.is_reference() {
                continue;
            }
            writeln!(
                self.out,
                "{}\t{}\t{}\t{}",
                eval.chrom,
                start,
                start + u64::from(allele.length),
                allele
            )
            .with_context(|| {
                format!("Failed to write failed-site report at {}:{}", eval.chrom, eval.pos)
            })?;
        }
        Ok(())
    }

    /// Flushes the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().context("Failed to flush failed-site report")
    }
}
