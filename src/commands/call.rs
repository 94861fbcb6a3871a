//! The `call` command: walk a pileup stream and emit variant records.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info};

use bayescall_lib::config::Config;
use bayescall_lib::metrics::{write_metrics, CallMetrics};
use bayescall_lib::pileup::{PileupReader, TargetRegions};
use bayescall_lib::progress::SiteProgress;
use bayescall_lib::report::{FailedSiteWriter, RecordWriter, TraceWriter};
use bayescall_lib::site::{evaluate_site, SiteStatus};

use super::command::Command;

/// Calls small variants from a sorted pileup observation stream.
///
/// Walks every site of the input, runs the Bayesian genotype model across
/// all samples, and writes one record per called alternate.
#[derive(Parser, Debug)]
#[command(
    name = "call",
    about = "Call small variants from a pileup observation stream",
    long_about = r#"
Calls SNPs, MNPs, and short indels from a tab-separated pileup observation
stream sorted by reference coordinate.

At every site the caller groups observations into allele classes, scores
p(observations | genotype) for each sample, searches the joint space of
per-sample genotype assignments under a composite population prior, and
reports the most probable joint genotype assignment together with the
posterior probability that the site varies.

Input format (one observation per line, tab-separated):

    chrom  pos  ref  sample  read_id  class  seq  base_qual  map_qual  strand

where class is R (reference), S (SNP), M (MNP), I (insertion), or
D (deletion), and strand is + or -.
"#
)]
pub struct Call {
    /// Input pileup observation file (sorted by chrom, pos)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output record file (stdout when omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// BED file restricting calling to target regions
    #[arg(short = 't', long = "targets")]
    pub targets: Option<PathBuf>,

    /// Sample names fixing the canonical sample order (repeatable)
    #[arg(short = 's', long = "sample")]
    pub samples: Vec<String>,

    /// Default ploidy for all samples
    #[arg(short = 'p', long = "ploidy", default_value = "2")]
    pub ploidy: u32,

    /// Per-sample ploidy override as NAME=PLOIDY (repeatable)
    #[arg(long = "ploidy-override")]
    pub ploidy_overrides: Vec<String>,

    /// Disable SNP alleles
    #[arg(long = "no-snps")]
    pub no_snps: bool,

    /// Disable insertion/deletion alleles
    #[arg(long = "no-indels")]
    pub no_indels: bool,

    /// Disable MNP alleles
    #[arg(long = "no-mnps")]
    pub no_mnps: bool,

    /// Include the reference as a synthetic pseudo-sample
    #[arg(long = "use-ref-allele")]
    pub use_ref_allele: bool,

    /// Minimum total observations to attempt a call
    #[arg(long = "min-coverage", default_value = "0")]
    pub min_coverage: usize,

    /// Minimum observations supporting an alternate in one sample
    #[arg(short = 'C', long = "min-alt-count", default_value = "2")]
    pub min_alt_count: usize,

    /// Minimum fraction of observations supporting an alternate
    #[arg(short = 'F', long = "min-alt-fraction", default_value = "0.2")]
    pub min_alt_fraction: f64,

    /// Minimum base quality for an observation to be used
    #[arg(short = 'q', long = "min-base-quality", default_value = "0")]
    pub min_base_quality: u8,

    /// Minimum mapping quality for an observation to be used
    #[arg(short = 'm', long = "min-mapping-quality", default_value = "0")]
    pub min_mapping_quality: u8,

    /// Drop genotypes with no supported allele
    #[arg(long = "exclude-unobserved-genotypes")]
    pub exclude_unobserved_genotypes: bool,

    /// Drop genotypes with any unsupported allele
    #[arg(long = "exclude-partially-observed-genotypes")]
    pub exclude_partially_observed_genotypes: bool,

    /// Read-dependence factor attenuating same-read observations
    #[arg(short = 'D', long = "read-dependence-factor", default_value = "0.9")]
    pub read_dependence_factor: f64,

    /// Fold mapping quality into per-observation error
    #[arg(long = "use-mapping-quality")]
    pub use_mapping_quality: bool,

    /// Banded-search band width
    #[arg(short = 'W', long = "band-width", default_value = "2")]
    pub band_width: usize,

    /// Banded-search band depth
    #[arg(short = 'B', long = "band-depth", default_value = "3")]
    pub band_depth: usize,

    /// Maximum substitutions relative to the search seed
    #[arg(long = "combo-step-max", default_value = "3")]
    pub combo_step_max: usize,

    /// Log-space pruning threshold below the best posterior
    #[arg(long = "prune-threshold", default_value = "20.0")]
    pub prune_threshold: f64,

    /// Uniform genotype prior (pooled sequencing)
    #[arg(short = 'J', long = "pooled")]
    pub pooled: bool,

    /// Disable accounting for genotype multiset orderings
    #[arg(long = "no-permute")]
    pub no_permute: bool,

    /// Disable the Hardy-Weinberg genotype prior
    #[arg(long = "no-hwe-priors")]
    pub no_hwe_priors: bool,

    /// Disable the binomial observation prior
    #[arg(long = "no-binomial-obs-priors")]
    pub no_binomial_obs_priors: bool,

    /// Enable the strand-balance prior on heterozygotes
    #[arg(long = "allele-balance-priors")]
    pub allele_balance_priors: bool,

    /// Scalar multiplier on the log-prior
    #[arg(long = "diffusion-prior-scalar", default_value = "1.0")]
    pub diffusion_prior_scalar: f64,

    /// Concentration of the allele-frequency prior
    #[arg(short = 'T', long = "theta", default_value = "0.001")]
    pub theta: f64,

    /// Wrap the search in an expectation-maximization loop
    #[arg(short = 'E', long = "em")]
    pub expectation_maximization: bool,

    /// Iteration cap for the EM loop
    #[arg(long = "em-max-iterations", default_value = "10")]
    pub em_max_iterations: usize,

    /// Disable per-sample marginal computation
    #[arg(long = "no-marginals")]
    pub no_marginals: bool,

    /// Iteration cap for marginal refinement
    #[arg(long = "genotyping-max-iterations", default_value = "25")]
    pub genotyping_max_iterations: usize,

    /// Phred threshold for the variant/invariant sample partition
    #[arg(long = "genotype-variant-threshold", default_value = "0.0")]
    pub genotype_variant_threshold: f64,

    /// Call threshold on 1 - p(hom)
    #[arg(short = 'P', long = "pvl", default_value = "0.0")]
    pub pvl: f64,

    /// Emit one record per alternate instead of best-only
    #[arg(long = "report-all-alternates")]
    pub report_all_alternates: bool,

    /// Append a CSV-shaped inference trace to this file
    #[arg(long = "trace")]
    pub trace: Option<PathBuf>,

    /// Write BED lines for sites missing the call threshold
    #[arg(long = "failed-sites")]
    pub failed_sites: Option<PathBuf>,

    /// Write run metrics to this TSV file
    #[arg(long = "metrics")]
    pub metrics: Option<PathBuf>,

    /// Progress logging interval in sites
    #[arg(long = "progress-interval", default_value = "100000")]
    pub progress_interval: u64,
}

impl Call {
    fn build_config(&self) -> Result<Config> {
        let mut config = Config {
            allow_snps: !self.no_snps,
            allow_indels: !self.no_indels,
            allow_mnps: !self.no_mnps,
            use_ref_allele: self.use_ref_allele,
            min_coverage: self.min_coverage,
            min_alt_count: self.min_alt_count,
            min_alt_fraction: self.min_alt_fraction,
            min_base_quality: self.min_base_quality,
            min_mapping_quality: self.min_mapping_quality,
            exclude_partially_observed_genotypes: self.exclude_partially_observed_genotypes,
            exclude_unobserved_genotypes: self.exclude_unobserved_genotypes,
            read_dependence_factor: self.read_dependence_factor,
            use_mapping_quality: self.use_mapping_quality,
            band_width: self.band_width,
            band_depth: self.band_depth,
            genotype_combo_step_max: self.combo_step_max,
            prune_threshold: self.prune_threshold,
            pooled: self.pooled,
            permute: !self.no_permute,
            hwe_priors: !self.no_hwe_priors,
            obs_binomial_priors: !self.no_binomial_obs_priors,
            allele_balance_priors: self.allele_balance_priors,
            diffusion_prior_scalar: self.diffusion_prior_scalar,
            theta: self.theta,
            expectation_maximization: self.expectation_maximization,
            expectation_maximization_max_iterations: self.em_max_iterations,
            calculate_marginals: !self.no_marginals,
            genotyping_max_iterations: self.genotyping_max_iterations,
            genotype_variant_threshold: self.genotype_variant_threshold,
            pvl: self.pvl,
            report_all_alternates: self.report_all_alternates,
            default_ploidy: self.ploidy,
            ..Config::default()
        };

        for entry in &self.ploidy_overrides {
            let Some((name, ploidy)) = entry.split_once('=') else {
                bail!("Invalid ploidy override '{entry}': expected NAME=PLOIDY");
            };
            let ploidy: u32 = ploidy
                .parse()
                .with_context(|| format!("Invalid ploidy in override '{entry}'"))?;
            config.ploidy_overrides.insert(name.to_string(), ploidy);
        }

        config.validate()?;
        Ok(config)
    }
}

impl Command for Call {
    fn execute(&self) -> Result<()> {
        let config = self.build_config()?;

        info!("Calling variants");
        info!("  Input: {}", self.input.display());
        match &self.output {
            Some(path) => info!("  Output: {}", path.display()),
            None => info!("  Output: stdout"),
        }
        info!("  Ploidy: {}", config.default_ploidy);
        info!("  Theta: {}", config.theta);
        info!("  Call threshold (PVL): {}", config.pvl);

        let targets = match &self.targets {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open targets: {}", path.display()))?;
                TargetRegions::from_bed(BufReader::new(file))?
            }
            None => TargetRegions::default(),
        };

        let input = File::open(&self.input)
            .with_context(|| format!("Failed to open input: {}", self.input.display()))?;
        let sample_list = (!self.samples.is_empty()).then(|| self.samples.clone());
        let mut reader =
            PileupReader::new(BufReader::new(input), config.clone(), targets, sample_list);

        let out: Box<dyn Write> = match &self.output {
            Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
                format!("Failed to create output: {}", path.display())
            })?)),
            None => Box::new(BufWriter::new(std::io::stdout())),
        };
        let mut records = RecordWriter::new(out, self.samples.clone());

        let mut trace = match &self.trace {
            Some(path) => {
                let file = File::options().create(true).append(true).open(path).with_context(
                    || format!("Failed to open trace: {}", path.display()),
                )?;
                Some(TraceWriter::new(BufWriter::new(file)))
            }
            None => None,
        };
        let mut failed = match &self.failed_sites {
            Some(path) => {
                let file = File::create(path).with_context(|| {
                    format!("Failed to create failed-site report: {}", path.display())
                })?;
                Some(FailedSiteWriter::new(BufWriter::new(file)))
            }
            None => None,
        };

        let progress = SiteProgress::new(self.progress_interval);
        let mut metrics = CallMetrics::new();

        while let Some(site) = reader.next_site()? {
            metrics.total_sites += 1;
            match evaluate_site(&site, &config, trace.is_some()) {
                SiteStatus::Skip(reason) => {
                    debug!("{}:{} skipped: {}", site.chrom, site.pos, reason.label());
                    metrics.record_skip(reason);
                    progress.record_site(&site.chrom, site.pos, false);
                }
                SiteStatus::Evaluated(eval) => {
                    metrics.processed_sites += 1;
                    if let Some(writer) = &mut trace {
                        writer.write_site(&eval)?;
                    }
                    if eval.called && !eval.alternates.is_empty() {
                        metrics.called_sites += 1;
                        metrics.records_written +=
                            records.write_site(&eval, config.report_all_alternates)? as u64;
                    } else if let Some(writer) = &mut failed {
                        writer.write_site(&eval)?;
                    }
                    progress.record_site(&site.chrom, site.pos, true);
                }
            }
        }

        records.flush()?;
        if let Some(writer) = &mut trace {
            writer.flush()?;
        }
        if let Some(writer) = &mut failed {
            writer.flush()?;
        }

        progress.log_summary();
        info!("Called sites: {}", metrics.called_sites);
        info!("Records written: {}", metrics.records_written);
        if metrics.total_skipped() > 0 {
            info!("Skipped sites: {}", metrics.total_skipped());
        }

        if let Some(path) = &self.metrics {
            write_metrics(path, &[metrics])?;
        }
        Ok(())
    }
}
