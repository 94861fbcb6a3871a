//! Joint genotype assignments across samples.
//!
//! A [`GenotypeCombo`] assigns one genotype to each sample that has
//! observations, in the canonical sample order fixed by the site driver.
//! Genotypes are referenced by index into the per-ploidy enumeration, so a
//! combo is just a vector of small integers plus its log-score components.
//! Deduplication is equality on that vector; the sort is descending by
//! posterior with an explicit lexicographic tie-break on the assignment, so
//! tie-broken orderings are reproducible.

use std::collections::HashSet;

use ahash::AHashMap;

use crate::genotype::{all_possible_genotypes, Genotype};
use crate::logprob::{LogProb, LN_ZERO};

/// One scored genotype hypothesis for one sample.
#[derive(Debug, Clone)]
pub struct SampleDataLikelihood {
    /// Index into the per-ploidy genotype enumeration
    pub genotype: usize,
    /// `ln p(observations | genotype)`
    pub log_likelihood: LogProb,
    /// Evolving log posterior marginal, filled in by the marginalizer
    pub marginal: LogProb,
}

/// A sample's scored genotype hypotheses, in their current sort order.
#[derive(Debug, Clone)]
pub struct SampleLikelihoods {
    /// Index into the site's canonical sample vector
    pub sample: usize,
    /// The sample's ploidy
    pub ploidy: u32,
    /// Scored hypotheses; sorted descending by data likelihood after C3,
    /// re-sorted by marginal during marginal refinement
    pub entries: Vec<SampleDataLikelihood>,
}

impl SampleLikelihoods {
    /// Position of a genotype in the current sort order.
    #[must_use]
    pub fn position_of(&self, genotype: usize) -> Option<usize> {
        self.entries.iter().position(|e| e.genotype == genotype)
    }

    /// The current top-ranked hypothesis.
    #[must_use]
    pub fn top(&self) -> &SampleDataLikelihood {
        &self.entries[0]
    }
}

/// Cache of genotype enumerations keyed by ploidy, local to one site.
#[derive(Debug, Default)]
pub struct GenotypePool {
    by_ploidy: AHashMap<u32, Vec<Genotype>>,
}

impl GenotypePool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerates (once) and returns the genotypes for the given ploidy.
    pub fn ensure(&mut self, ploidy: u32, allele_count: usize) -> &[Genotype] {
        self.by_ploidy.entry(ploidy).or_insert_with(|| all_possible_genotypes(ploidy, allele_count))
    }

    /// Returns the cached genotypes for a ploidy.
    ///
    /// The ploidy must have been enumerated via [`GenotypePool::ensure`].
    #[must_use]
    pub fn get(&self, ploidy: u32) -> &[Genotype] {
        &self.by_ploidy[&ploidy]
    }

    /// Iterates over `(ploidy, genotypes)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&u32, &Vec<Genotype>)> {
        self.by_ploidy.iter()
    }
}

/// An assignment of one genotype to every sample with observations, plus
/// its log-score decomposition.
#[derive(Debug, Clone)]
pub struct GenotypeCombo {
    /// `genotypes[k]` is the genotype (index into the per-ploidy
    /// enumeration) assigned to the k-th entry of the site's sample
    /// likelihood vector
    pub genotypes: Vec<usize>,
    /// Sum of the per-sample data log-likelihoods
    pub prob_obs_given_genotypes: LogProb,
    /// Prior on the combo's allele-frequency spectrum
    pub prior_prob_af: LogProb,
    /// Prior on the genotype assignment given that spectrum
    pub prior_prob_g_af: LogProb,
    /// Observation-level prior (binomial and allele-balance terms)
    pub prior_prob_observations: LogProb,
    /// Sum of the four components above
    pub posterior_prob: LogProb,
}

impl GenotypeCombo {
    /// An unscored combo for the given assignment.
    #[must_use]
    pub fn unscored(genotypes: Vec<usize>) -> Self {
        GenotypeCombo {
            genotypes,
            prob_obs_given_genotypes: LN_ZERO,
            prior_prob_af: LN_ZERO,
            prior_prob_g_af: LN_ZERO,
            prior_prob_observations: LN_ZERO,
            posterior_prob: LN_ZERO,
        }
    }

    /// Per-allele counts across the whole combo, dense over the candidate
    /// allele arena.
    #[must_use]
    pub fn allele_counts(
        &self,
        likelihoods: &[SampleLikelihoods],
        pool: &GenotypePool,
        allele_count: usize,
    ) -> Vec<u32> {
        let mut counts = vec![0u32; allele_count];
        for (entry, &gt_idx) in likelihoods.iter().zip(&self.genotypes) {
            let genotype = &pool.get(entry.ploidy)[gt_idx];
            for (allele, count) in &genotype.elems {
                counts[*allele] += count;
            }
        }
        counts
    }

    /// True iff the combo is monomorphic: a single distinct allele across
    /// every sample's genotype.
    #[must_use]
    pub fn is_homozygous(
        &self,
        likelihoods: &[SampleLikelihoods],
        pool: &GenotypePool,
        allele_count: usize,
    ) -> bool {
        let counts = self.allele_counts(likelihoods, pool, allele_count);
        counts.iter().filter(|&&c| c > 0).count() == 1
    }

    /// True iff the combo assigns at least one non-reference allele to some
    /// sample; such combos represent variation relative to the reference.
    #[must_use]
    pub fn is_variant(
        &self,
        likelihoods: &[SampleLikelihoods],
        pool: &GenotypePool,
        allele_count: usize,
        reference_allele: usize,
    ) -> bool {
        let counts = self.allele_counts(likelihoods, pool, allele_count);
        counts.iter().enumerate().any(|(allele, &count)| allele != reference_allele && count > 0)
    }
}

/// Removes duplicate assignments (keeping the first occurrence) and sorts
/// descending by posterior with the canonical assignment tie-break.
pub fn sort_and_dedup_combos(combos: &mut Vec<GenotypeCombo>) {
    let mut seen: HashSet<Vec<usize>> = HashSet::with_capacity(combos.len());
    combos.retain(|combo| seen.insert(combo.genotypes.clone()));
    combos.sort_by(|a, b| {
        b.posterior_prob
            .partial_cmp(&a.posterior_prob)
            .expect("posterior probabilities must not be NaN")
            .then_with(|| a.genotypes.cmp(&b.genotypes))
    });
}
