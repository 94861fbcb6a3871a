//! The composite prior over a joint genotype assignment.
//!
//! A combo's posterior log-score is the sum of its data likelihood and
//! three prior components:
//!
//! 1. an allele-frequency prior on the combo's allele-count spectrum
//!    (Ewens sampling formula with concentration `theta`, or a product over
//!    externally estimated frequencies during EM refinement),
//! 2. a genotype-given-frequency prior (Hardy-Weinberg multinomial
//!    sampling, uniform in pooled mode, with optional accounting for the
//!    orderings of each genotype multiset),
//! 3. an observation prior (per-allele binomial sampling of observed
//!    counts against genotype expectations, plus strand-balance binomials
//!    on heterozygous genotypes).
//!
//! The diffusion scalar multiplies each prior component as it is computed,
//! so a combo's stored `posterior_prob` is always exactly the sum of its
//! stored components.

use crate::allele::Allele;
use crate::combo::{GenotypeCombo, GenotypePool, SampleLikelihoods};
use crate::config::Config;
use crate::logprob::{
    ln_binomial_pmf, ln_factorial, ln_rising_factorial, LogProb,
};
use crate::sample::Sample;

/// Prior configuration for combo scoring.
#[derive(Debug, Clone, Copy)]
pub struct PriorParams {
    /// Concentration of the allele-frequency prior
    pub theta: f64,
    /// Pooled mode: uniform genotype-given-frequency prior
    pub pooled: bool,
    /// Account for all orderings of each genotype multiset
    pub permute: bool,
    /// Hardy-Weinberg genotype-given-frequency prior
    pub hwe_priors: bool,
    /// Binomial prior on observed allele counts
    pub obs_binomial_priors: bool,
    /// Strand-balance prior on heterozygous genotypes
    pub allele_balance_priors: bool,
    /// Scalar multiplier on every log-prior component
    pub diffusion_prior_scalar: f64,
}

impl PriorParams {
    /// Extracts the prior configuration from the full caller configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        PriorParams {
            theta: config.theta,
            pooled: config.pooled,
            permute: config.permute,
            hwe_priors: config.hwe_priors,
            obs_binomial_priors: config.obs_binomial_priors,
            allele_balance_priors: config.allele_balance_priors,
            diffusion_prior_scalar: config.diffusion_prior_scalar,
        }
    }

    /// The override used during marginal refinement: pooled and HWE are
    /// forced on so that marginals are not biased by the discovery-time
    /// prior choices.
    #[must_use]
    pub fn marginal_pass(&self) -> Self {
        PriorParams { pooled: true, hwe_priors: true, ..*self }
    }
}

/// Log Ewens sampling probability of an allele-count spectrum.
///
/// With `a_j` the number of distinct alleles represented exactly `j` times
/// among `n` sampled alleles:
///
/// ```text
/// P = n! / (theta * (theta+1) * ... * (theta+n-1))
///     * prod_j theta^a_j / (j^a_j * a_j!)
/// ```
#[must_use]
pub fn ln_ewens_spectrum_prob(counts: &[u32], theta: f64) -> LogProb {
    let n: u64 = counts.iter().map(|&c| u64::from(c)).sum();
    if n == 0 {
        return 0.0;
    }
    // Multiplicity classes: multiplicity[j - 1] = number of alleles seen j times
    let mut multiplicity = vec![0u64; n as usize];
    for &count in counts {
        if count > 0 {
            multiplicity[count as usize - 1] += 1;
        }
    }
    let mut ln_prob = ln_factorial(n) - ln_rising_factorial(theta, n);
    for (j_minus_1, &a_j) in multiplicity.iter().enumerate() {
        if a_j == 0 {
            continue;
        }
        let j = (j_minus_1 + 1) as f64;
        ln_prob += a_j as f64 * theta.ln() - a_j as f64 * j.ln() - ln_factorial(a_j);
    }
    ln_prob
}

/// Scores a joint genotype assignment: data likelihood plus the composite
/// prior, with every component stored separately.
///
/// `freq_override`, when present, replaces the Ewens spectrum prior with a
/// product over the given per-allele frequencies (the EM refinement path).
///
/// Returns `None` when some sample has no scored likelihood for its
/// assigned genotype, which makes the combo unscorable.
#[must_use]
pub fn score_combo(
    assignment: Vec<usize>,
    likelihoods: &[SampleLikelihoods],
    pool: &GenotypePool,
    alleles: &[Allele],
    samples: &[(String, Sample)],
    params: &PriorParams,
    freq_override: Option<&[f64]>,
) -> Option<GenotypeCombo> {
    debug_assert_eq!(assignment.len(), likelihoods.len());

    // Data likelihood: sum of the per-sample scores for the assignment
    let mut prob_obs: LogProb = 0.0;
    for (entry, &gt_idx) in likelihoods.iter().zip(&assignment) {
        let pos = entry.position_of(gt_idx)?;
        prob_obs += entry.entries[pos].log_likelihood;
    }

    let mut combo = GenotypeCombo::unscored(assignment);
    let counts = combo.allele_counts(likelihoods, pool, alleles.len());
    let total: u64 = counts.iter().map(|&c| u64::from(c)).sum();

    // Allele-frequency prior
    let prior_af = match freq_override {
        Some(freqs) => {
            let mut ln_p = 0.0;
            for (allele, &count) in counts.iter().enumerate() {
                if count > 0 {
                    ln_p += f64::from(count) * freqs[allele].ln();
                }
            }
            ln_p
        }
        None => ln_ewens_spectrum_prob(&counts, params.theta),
    };

    // Genotype-given-frequency prior
    let mut prior_g_af = 0.0;
    if !params.pooled {
        for (entry, &gt_idx) in likelihoods.iter().zip(&combo.genotypes) {
            let genotype = &pool.get(entry.ploidy)[gt_idx];
            if params.hwe_priors {
                for (allele, count) in &genotype.elems {
                    let freq = f64::from(counts[*allele]) / total as f64;
                    prior_g_af += f64::from(*count) * freq.ln();
                }
            }
            if params.permute {
                prior_g_af += genotype.ln_permutations();
            }
        }
    }

    // Observation prior: binomial sampling of allele counts, plus strand
    // balance on heterozygous genotypes
    let mut prior_observations = 0.0;
    if params.obs_binomial_priors || params.allele_balance_priors {
        for (entry, &gt_idx) in likelihoods.iter().zip(&combo.genotypes) {
            let genotype = &pool.get(entry.ploidy)[gt_idx];
            let sample = &samples[entry.sample].1;
            let sample_obs = sample.observation_count() as u64;
            if sample_obs == 0 {
                continue;
            }
            if params.obs_binomial_priors {
                // Condition on the observations drawn from the genotype's
                // own alleles; stray observations of other alleles are the
                // likelihood's business, not the sampling prior's. A
                // homozygote is thus never zeroed by one mismatching read.
                let supporting: u64 = genotype
                    .elems
                    .iter()
                    .map(|(allele, _)| sample.count_of(&alleles[*allele].key) as u64)
                    .sum();
                if supporting > 0 {
                    for (allele, count) in &genotype.elems {
                        let observed = sample.count_of(&alleles[*allele].key) as u64;
                        let expected = f64::from(*count) / f64::from(genotype.ploidy);
                        prior_observations += ln_binomial_pmf(observed, supporting, expected);
                    }
                }
            }
            if params.allele_balance_priors && !genotype.is_homozygous() {
                let mut supporting = 0u64;
                let mut forward = 0u64;
                for (allele, _) in &genotype.elems {
                    supporting += sample.count_of(&alleles[*allele].key) as u64;
                    forward += sample.forward_count_of(&alleles[*allele].key) as u64;
                }
                if supporting > 0 {
                    prior_observations += ln_binomial_pmf(forward, supporting, 0.5);
                }
            }
        }
    }

    let scalar = params.diffusion_prior_scalar;
    combo.prob_obs_given_genotypes = prob_obs;
    combo.prior_prob_af = scalar * prior_af;
    combo.prior_prob_g_af = scalar * prior_g_af;
    combo.prior_prob_observations = scalar * prior_observations;
    combo.posterior_prob = combo.prob_obs_given_genotypes
        + combo.prior_prob_af
        + combo.prior_prob_g_af
        + combo.prior_prob_observations;
    Some(combo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allele::{Observation, Strand};
    use crate::combo::SampleDataLikelihood;
    use crate::logprob::LN_ZERO;

    fn params() -> PriorParams {
        PriorParams {
            theta: 0.001,
            pooled: false,
            permute: true,
            hwe_priors: true,
            obs_binomial_priors: false,
            allele_balance_priors: false,
            diffusion_prior_scalar: 1.0,
        }
    }

    #[test]
    fn test_ewens_diploid_single_sample() {
        let theta = 0.001;
        // Monomorphic spectrum {2}: P = 1 / (1 + theta)
        let hom = ln_ewens_spectrum_prob(&[2, 0], theta);
        assert!((hom - (1.0 / (1.0 + theta)).ln()).abs() < 1e-9);

        // Two singletons {1,1}: P = theta / (1 + theta)
        let het = ln_ewens_spectrum_prob(&[1, 1], theta);
        assert!((het - (theta / (1.0 + theta)).ln()).abs() < 1e-9);

        // Together they exhaust the diploid spectra
        let total = hom.exp() + het.exp();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ewens_prefers_monomorphic_for_small_theta() {
        let hom = ln_ewens_spectrum_prob(&[4, 0], 0.001);
        let poly = ln_ewens_spectrum_prob(&[2, 2], 0.001);
        assert!(hom > poly);
    }

    #[test]
    fn test_ewens_empty_spectrum() {
        assert_eq!(ln_ewens_spectrum_prob(&[0, 0], 0.001), 0.0);
    }

    fn fixture() -> (Vec<SampleLikelihoods>, GenotypePool, Vec<Allele>, Vec<(String, Sample)>) {
        let alleles =
            vec![Allele::reference("A").to_genotype_allele(), Allele::snp("T").to_genotype_allele()];
        let mut pool = GenotypePool::new();
        pool.ensure(2, 2);

        let mut sample = Sample::new();
        for i in 0..6 {
            let allele = if i < 3 { Allele::reference("A") } else { Allele::snp("T") };
            let strand = if i % 2 == 0 { Strand::Forward } else { Strand::Reverse };
            sample.add_observation(Observation {
                allele,
                read_id: format!("r{i}"),
                base_qual: 30,
                map_qual: 60,
                strand,
            });
        }

        let likelihoods = vec![SampleLikelihoods {
            sample: 0,
            ploidy: 2,
            entries: vec![
                SampleDataLikelihood { genotype: 1, log_likelihood: -2.0, marginal: LN_ZERO },
                SampleDataLikelihood { genotype: 0, log_likelihood: -10.0, marginal: LN_ZERO },
                SampleDataLikelihood { genotype: 2, log_likelihood: -10.5, marginal: LN_ZERO },
            ],
        }];
        let samples = vec![("s1".to_string(), sample)];
        (likelihoods, pool, alleles, samples)
    }

    #[test]
    fn test_posterior_is_component_sum() {
        let (likelihoods, pool, alleles, samples) = fixture();
        let mut p = params();
        p.obs_binomial_priors = true;
        p.allele_balance_priors = true;

        for assignment in [vec![0], vec![1], vec![2]] {
            let combo =
                score_combo(assignment, &likelihoods, &pool, &alleles, &samples, &p, None).unwrap();
            let sum = combo.prob_obs_given_genotypes
                + combo.prior_prob_af
                + combo.prior_prob_g_af
                + combo.prior_prob_observations;
            assert_eq!(combo.posterior_prob.to_bits(), sum.to_bits());
        }
    }

    #[test]
    fn test_hwe_het_prior_includes_orderings() {
        let (likelihoods, pool, alleles, samples) = fixture();
        let p = params();

        // Het A/T: spectrum {1,1}, f_A = f_T = 1/2; HWE term 2 * (1/2 * 1/2)
        let combo =
            score_combo(vec![1], &likelihoods, &pool, &alleles, &samples, &p, None).unwrap();
        let expected = (2.0 * 0.25_f64).ln();
        assert!((combo.prior_prob_g_af - expected).abs() < 1e-9);

        // Without permute the ordering factor disappears
        let mut no_permute = p;
        no_permute.permute = false;
        let combo =
            score_combo(vec![1], &likelihoods, &pool, &alleles, &samples, &no_permute, None)
                .unwrap();
        assert!((combo.prior_prob_g_af - 0.25_f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_pooled_is_uniform() {
        let (likelihoods, pool, alleles, samples) = fixture();
        let mut p = params();
        p.pooled = true;
        let combo =
            score_combo(vec![1], &likelihoods, &pool, &alleles, &samples, &p, None).unwrap();
        assert_eq!(combo.prior_prob_g_af, 0.0);
    }

    #[test]
    fn test_marginal_pass_forces_pooled() {
        let p = params().marginal_pass();
        assert!(p.pooled);
        assert!(p.hwe_priors);
        assert!((p.theta - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_binomial_obs_prior_on_supporting_observations() {
        let (likelihoods, pool, alleles, samples) = fixture();
        let mut p = params();
        p.obs_binomial_priors = true;

        // The pileup is 3 A / 3 T. A homozygote's sampling prior is
        // conditioned on its own supporting observations (3 of 3 reference
        // draws), so it carries no penalty; mismatching reads are already
        // priced by the likelihood.
        let hom =
            score_combo(vec![0], &likelihoods, &pool, &alleles, &samples, &p, None).unwrap();
        assert_eq!(hom.prior_prob_observations, 0.0);

        // The balanced het pays the binomial mass of a 3/3 split
        let het =
            score_combo(vec![1], &likelihoods, &pool, &alleles, &samples, &p, None).unwrap();
        let expected = 2.0 * crate::logprob::ln_binomial_pmf(3, 6, 0.5);
        assert!((het.prior_prob_observations - expected).abs() < 1e-9);

        // A lopsided split pays more than a balanced one: compare against
        // a sample with 5 A / 1 T
        let mut lopsided = Sample::new();
        for i in 0..6 {
            let allele = if i < 5 { Allele::reference("A") } else { Allele::snp("T") };
            lopsided.add_observation(Observation {
                allele,
                read_id: format!("l{i}"),
                base_qual: 30,
                map_qual: 60,
                strand: Strand::Forward,
            });
        }
        let lopsided_samples = vec![("s1".to_string(), lopsided)];
        let skewed =
            score_combo(vec![1], &likelihoods, &pool, &alleles, &lopsided_samples, &p, None)
                .unwrap();
        assert!(skewed.prior_prob_observations < het.prior_prob_observations);
    }

    #[test]
    fn test_diffusion_scalar_scales_priors_not_likelihood() {
        let (likelihoods, pool, alleles, samples) = fixture();
        let base = params();
        let mut diffuse = params();
        diffuse.diffusion_prior_scalar = 0.5;

        let a = score_combo(vec![1], &likelihoods, &pool, &alleles, &samples, &base, None).unwrap();
        let b =
            score_combo(vec![1], &likelihoods, &pool, &alleles, &samples, &diffuse, None).unwrap();
        assert_eq!(a.prob_obs_given_genotypes.to_bits(), b.prob_obs_given_genotypes.to_bits());
        assert!((b.prior_prob_af - 0.5 * a.prior_prob_af).abs() < 1e-12);
        assert!((b.prior_prob_g_af - 0.5 * a.prior_prob_g_af).abs() < 1e-12);
    }

    #[test]
    fn test_frequency_override_replaces_af_prior() {
        let (likelihoods, pool, alleles, samples) = fixture();
        let p = params();
        let freqs = vec![0.9, 0.1];
        let combo =
            score_combo(vec![1], &likelihoods, &pool, &alleles, &samples, &p, Some(&freqs))
                .unwrap();
        // One A and one T sampled under the estimated frequencies
        let expected = 0.9_f64.ln() + 0.1_f64.ln();
        assert!((combo.prior_prob_af - expected).abs() < 1e-9);
    }

    #[test]
    fn test_unscorable_assignment() {
        let (mut likelihoods, pool, alleles, samples) = fixture();
        likelihoods[0].entries.retain(|e| e.genotype != 2);
        let p = params();
        assert!(score_combo(vec![2], &likelihoods, &pool, &alleles, &samples, &p, None).is_none());
    }
}
