//! Data likelihoods: `p(observations | genotype)` per sample.
//!
//! Each observation is modeled as an independent draw from the genotype's
//! allele mixture. An observation matching allele `a` of a genotype with
//! count `c` at ploidy `m` contributes `c/m * (1 - e)`; a mismatch
//! contributes `c/m * e/3`, where `e` is the observation's error
//! probability derived from base quality and, when configured, mapping
//! quality (combined with the two-trial error formula).
//!
//! Observations from an already-seen originating read are attenuated by the
//! read-dependence factor: their log contribution is scaled by `rdf`, which
//! keeps duplicate-like evidence from inflating the likelihood.

use ahash::AHashSet;

use crate::allele::Allele;
use crate::combo::SampleDataLikelihood;
use crate::genotype::Genotype;
use crate::logprob::{
    ln_error_prob_two_trials, phred_to_ln_prob, prob_to_phred, safe_exp, LogProb, LN_ZERO,
};
use crate::sample::Sample;

/// Genotype admission policy applied per sample before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenotypeFilter {
    /// Keep every genotype
    All,
    /// Drop genotypes in which no allele has a supporting observation
    ExcludeUnobserved,
    /// Drop genotypes in which any allele lacks a supporting observation
    ExcludePartiallyObserved,
}

/// Selects the genotypes to score for one sample under the given policy.
///
/// Homozygous genotypes are always admitted: the site decision integrates
/// over every all-homozygous combination, so their likelihoods must exist
/// even when the policy would drop them for lack of support.
#[must_use]
pub fn filter_genotypes(
    sample: &Sample,
    genotypes: &[Genotype],
    alleles: &[Allele],
    filter: GenotypeFilter,
) -> Vec<usize> {
    genotypes
        .iter()
        .enumerate()
        .filter(|(_, g)| {
            g.is_homozygous()
                || match filter {
                    GenotypeFilter::All => true,
                    GenotypeFilter::ExcludeUnobserved => g.partially_supported_by(sample, alleles),
                    GenotypeFilter::ExcludePartiallyObserved => {
                        g.fully_supported_by(sample, alleles)
                    }
                }
        })
        .map(|(idx, _)| idx)
        .collect()
}

/// Scores `ln p(observations | genotype)` for each candidate genotype of
/// one sample.
///
/// Returns entries sorted by descending log-likelihood; ties break on the
/// canonical genotype ordering (ascending enumeration index). Marginals are
/// initialized to the log-zero sentinel.
#[must_use]
pub fn genotype_likelihoods(
    sample: &Sample,
    candidate_indices: &[usize],
    genotypes: &[Genotype],
    alleles: &[Allele],
    rdf: f64,
    use_mapping_quality: bool,
) -> Vec<SampleDataLikelihood> {
    let observations = sample.sorted_groups();

    let mut entries: Vec<SampleDataLikelihood> = candidate_indices
        .iter()
        .map(|&gt_idx| {
            let genotype = &genotypes[gt_idx];
            let ploidy = f64::from(genotype.ploidy);
            let mut log_likelihood: LogProb = 0.0;
            let mut seen_reads: AHashSet<&str> = AHashSet::new();

            for (key, group) in &observations {
                for obs in *group {
                    let ln_base_err = phred_to_ln_prob(f64::from(obs.base_qual));
                    let ln_err = if use_mapping_quality {
                        let ln_map_err = phred_to_ln_prob(f64::from(obs.map_qual));
                        ln_error_prob_two_trials(ln_base_err, ln_map_err)
                    } else {
                        ln_base_err
                    };
                    let error = safe_exp(ln_err);

                    let mut prob = 0.0;
                    for (allele_idx, count) in &genotype.elems {
                        let weight = f64::from(*count) / ploidy;
                        if alleles[*allele_idx].key == **key {
                            prob += weight * (1.0 - error);
                        } else {
                            prob += weight * (error / 3.0);
                        }
                    }

                    let contribution = if prob > 0.0 { prob.ln() } else { LN_ZERO };
                    let weight = if seen_reads.insert(obs.read_id.as_str()) { 1.0 } else { rdf };
                    log_likelihood += weight * contribution;
                }
            }

            SampleDataLikelihood { genotype: gt_idx, log_likelihood, marginal: LN_ZERO }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.log_likelihood
            .partial_cmp(&a.log_likelihood)
            .expect("data likelihoods must not be NaN")
            .then_with(|| a.genotype.cmp(&b.genotype))
    });
    entries
}

/// Variance partition for search pruning.
///
/// A sample is a variant candidate when its top two genotype hypotheses
/// are closer than `threshold` Phred units; invariant samples are frozen at
/// their argmax during combination search. A zero threshold disables the
/// partition and treats every sample as a variant candidate.
#[must_use]
pub fn is_variant_candidate(entries: &[SampleDataLikelihood], threshold: f64) -> bool {
    if threshold == 0.0 || entries.len() < 2 {
        return threshold == 0.0;
    }
    let top = safe_exp(entries[0].log_likelihood);
    let runner_up = safe_exp(entries[1].log_likelihood);
    prob_to_phred(1.0 - (top - runner_up)) < threshold
}
