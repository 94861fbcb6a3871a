//! Caller configuration.
//!
//! [`Config`] carries every knob of the inference engine. It is built once
//! (normally from the CLI), validated once, and treated as immutable for
//! the life of the run; the core assumes validated input and never
//! re-checks.

use ahash::AHashMap;

use crate::errors::{CallerError, Result};
use crate::likelihood::GenotypeFilter;

/// Maximum representable Phred quality in standard encodings.
pub const MAX_QUALITY: u8 = 93;

/// Full configuration surface of the caller.
#[derive(Debug, Clone)]
pub struct Config {
    /// Admit SNP alleles for grouping
    pub allow_snps: bool,
    /// Admit insertion and deletion alleles for grouping
    pub allow_indels: bool,
    /// Admit MNP alleles for grouping
    pub allow_mnps: bool,
    /// Include a synthetic reference pseudo-sample
    pub use_ref_allele: bool,
    /// Minimum total observations to attempt a call
    pub min_coverage: usize,
    /// Minimum per-sample observations supporting an alternate
    pub min_alt_count: usize,
    /// Minimum fraction of observations supporting an alternate
    pub min_alt_fraction: f64,
    /// Minimum base quality for an observation to enter the pileup
    pub min_base_quality: u8,
    /// Minimum mapping quality for an observation to enter the pileup
    pub min_mapping_quality: u8,
    /// Drop genotypes with any unsupported allele
    pub exclude_partially_observed_genotypes: bool,
    /// Drop genotypes with no supported allele
    pub exclude_unobserved_genotypes: bool,
    /// Read-dependence factor attenuating same-read observations
    pub read_dependence_factor: f64,
    /// Fold mapping quality into per-observation error
    pub use_mapping_quality: bool,
    /// Banded-search band width (genotype ranks explored per swap)
    pub band_width: usize,
    /// Banded-search recursion depth
    pub band_depth: usize,
    /// Maximum simultaneous substitutions relative to the seed
    pub genotype_combo_step_max: usize,
    /// Log-space pruning threshold below the best-seen posterior
    pub prune_threshold: f64,
    /// Uniform genotype-given-frequency prior (pooled sequencing)
    pub pooled: bool,
    /// Account for orderings of the genotype multiset in the priors
    pub permute: bool,
    /// Hardy-Weinberg genotype-given-frequency prior
    pub hwe_priors: bool,
    /// Binomial prior on observed allele counts
    pub obs_binomial_priors: bool,
    /// Strand-balance prior on heterozygous genotypes
    pub allele_balance_priors: bool,
    /// Scalar multiplier on the log-prior
    pub diffusion_prior_scalar: f64,
    /// Concentration of the allele-frequency prior
    pub theta: f64,
    /// Wrap the banded search in an expectation-maximization loop
    pub expectation_maximization: bool,
    /// Iteration cap for the EM loop
    pub expectation_maximization_max_iterations: usize,
    /// Compute per-sample genotype marginals for called sites
    pub calculate_marginals: bool,
    /// Iteration cap for marginal refinement
    pub genotyping_max_iterations: usize,
    /// Phred threshold for the variant/invariant sample partition
    /// (zero disables the partition)
    pub genotype_variant_threshold: f64,
    /// Site-call threshold on `1 - p(hom)`
    pub pvl: f64,
    /// Emit one record per alternate instead of best-only
    pub report_all_alternates: bool,
    /// Ploidy assumed for samples without an explicit override
    pub default_ploidy: u32,
    /// Per-sample ploidy overrides
    pub ploidy_overrides: AHashMap<String, u32>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            allow_snps: true,
            allow_indels: true,
            allow_mnps: true,
            use_ref_allele: false,
            min_coverage: 0,
            min_alt_count: 2,
            min_alt_fraction: 0.2,
            min_base_quality: 0,
            min_mapping_quality: 0,
            exclude_partially_observed_genotypes: false,
            exclude_unobserved_genotypes: false,
            read_dependence_factor: 0.9,
            use_mapping_quality: false,
            band_width: 2,
            band_depth: 3,
            genotype_combo_step_max: 3,
            prune_threshold: 20.0,
            pooled: false,
            permute: true,
            hwe_priors: true,
            obs_binomial_priors: true,
            allele_balance_priors: false,
            diffusion_prior_scalar: 1.0,
            theta: 0.001,
            expectation_maximization: false,
            expectation_maximization_max_iterations: 10,
            calculate_marginals: true,
            genotyping_max_iterations: 25,
            genotype_variant_threshold: 0.0,
            pvl: 0.0,
            report_all_alternates: false,
            default_ploidy: 2,
            ploidy_overrides: AHashMap::new(),
        }
    }
}

impl Config {
    /// Validates the configuration; nonsense combinations are fatal.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: usize) -> Result<()> {
            if value < 1 {
                return Err(CallerError::InvalidParameter {
                    parameter: name.to_string(),
                    reason: format!("must be >= 1, got {value}"),
                });
            }
            Ok(())
        }
        fn fraction(name: &str, value: f64) -> Result<()> {
            if !(0.0..=1.0).contains(&value) {
                return Err(CallerError::InvalidFraction {
                    parameter: name.to_string(),
                    value,
                    min: 0.0,
                    max: 1.0,
                });
            }
            Ok(())
        }

        positive("band-width", self.band_width)?;
        positive("band-depth", self.band_depth)?;
        positive("combo-step-max", self.genotype_combo_step_max)?;
        positive("genotyping-max-iterations", self.genotyping_max_iterations)?;
        positive("em-max-iterations", self.expectation_maximization_max_iterations)?;
        positive("ploidy", self.default_ploidy as usize)?;

        if self.prune_threshold < 0.0 {
            return Err(CallerError::InvalidParameter {
                parameter: "prune-threshold".to_string(),
                reason: format!("must be non-negative, got {}", self.prune_threshold),
            });
        }
        if self.theta <= 0.0 {
            return Err(CallerError::InvalidParameter {
                parameter: "theta".to_string(),
                reason: format!("must be positive, got {}", self.theta),
            });
        }
        if self.diffusion_prior_scalar <= 0.0 {
            return Err(CallerError::InvalidParameter {
                parameter: "diffusion-prior-scalar".to_string(),
                reason: format!("must be positive, got {}", self.diffusion_prior_scalar),
            });
        }
        if self.genotype_variant_threshold < 0.0 {
            return Err(CallerError::InvalidParameter {
                parameter: "genotype-variant-threshold".to_string(),
                reason: format!("must be non-negative, got {}", self.genotype_variant_threshold),
            });
        }

        fraction("read-dependence-factor", self.read_dependence_factor)?;
        fraction("min-alt-fraction", self.min_alt_fraction)?;
        fraction("pvl", self.pvl)?;

        for quality in [self.min_base_quality, self.min_mapping_quality] {
            if quality > MAX_QUALITY {
                return Err(CallerError::InvalidQuality { value: quality, max: MAX_QUALITY });
            }
        }

        for (sample, &ploidy) in &self.ploidy_overrides {
            if ploidy < 1 {
                return Err(CallerError::InvalidParameter {
                    parameter: "ploidy-override".to_string(),
                    reason: format!("sample '{sample}' has ploidy 0"),
                });
            }
        }
        Ok(())
    }

    /// The genotype admission policy implied by the exclusion flags;
    /// the stricter flag wins when both are set.
    #[must_use]
    pub fn genotype_filter(&self) -> GenotypeFilter {
        if self.exclude_partially_observed_genotypes {
            GenotypeFilter::ExcludePartiallyObserved
        } else if self.exclude_unobserved_genotypes {
            GenotypeFilter::ExcludeUnobserved
        } else {
            GenotypeFilter::All
        }
    }

    /// Ploidy of the named sample.
    #[must_use]
    pub fn ploidy_of(&self, sample: &str) -> u32 {
        self.ploidy_overrides.get(sample).copied().unwrap_or(self.default_ploidy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[rstest]
    #[case::band_width(Config { band_width: 0, ..Config::default() }, "band-width")]
    #[case::band_depth(Config { band_depth: 0, ..Config::default() }, "band-depth")]
    #[case::step_max(Config { genotype_combo_step_max: 0, ..Config::default() }, "combo-step-max")]
    #[case::prune(Config { prune_threshold: -1.0, ..Config::default() }, "prune-threshold")]
    #[case::theta(Config { theta: 0.0, ..Config::default() }, "theta")]
    #[case::diffusion(Config { diffusion_prior_scalar: 0.0, ..Config::default() }, "diffusion")]
    #[case::rdf(Config { read_dependence_factor: 1.5, ..Config::default() }, "read-dependence-factor")]
    #[case::alt_fraction(Config { min_alt_fraction: -0.1, ..Config::default() }, "min-alt-fraction")]
    #[case::pvl(Config { pvl: 1.5, ..Config::default() }, "pvl")]
    fn test_invalid_configs(#[case] config: Config, #[case] needle: &str) {
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains(needle), "missing '{needle}' in: {err}");
    }

    #[test]
    fn test_quality_ceiling() {
        let config = Config { min_base_quality: 94, ..Config::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("quality"));
    }

    #[test]
    fn test_genotype_filter_precedence() {
        let mut config = Config::default();
        assert_eq!(config.genotype_filter(), GenotypeFilter::All);

        config.exclude_unobserved_genotypes = true;
        assert_eq!(config.genotype_filter(), GenotypeFilter::ExcludeUnobserved);

        config.exclude_partially_observed_genotypes = true;
        assert_eq!(config.genotype_filter(), GenotypeFilter::ExcludePartiallyObserved);
    }

    #[test]
    fn test_ploidy_lookup() {
        let mut config = Config::default();
        config.ploidy_overrides.insert("tumor".to_string(), 4);
        assert_eq!(config.ploidy_of("tumor"), 4);
        assert_eq!(config.ploidy_of("normal"), 2);
    }
}
