//! Search over joint genotype assignments.
//!
//! The banded search seeds at the combo assigning every sample its
//! top-likelihood genotype and explores local substitutions: at each of up
//! to `band_depth` levels, any variant-candidate sample's genotype may be
//! advanced to one of the next `band_width` entries on its sorted
//! likelihood list, bounded by `step_max` substitutions relative to the
//! seed. Invariant samples stay frozen at their argmax. Candidates whose
//! posterior falls more than `prune_threshold` (log units) below the best
//! seen so far are rejected and not expanded further.
//!
//! Every all-homozygous combination over the candidate alleles is injected
//! unconditionally: the site decision integrates over exactly those combos
//! to obtain `p(variant | data)`, so they must be present no matter how the
//! search went.
//!
//! The EM variant wraps the banded search in an outer loop that
//! re-estimates allele frequencies from the best combo and re-runs the
//! search with those frequencies as the allele-frequency prior base, until
//! the best combo stops changing or an iteration cap is hit.

use std::collections::HashSet;

use crate::allele::Allele;
use crate::combo::{sort_and_dedup_combos, GenotypeCombo, GenotypePool, SampleLikelihoods};
use crate::priors::{score_combo, PriorParams};
use crate::sample::Sample;

/// Banded-search shape parameters.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    /// Genotype ranks explored per substitution
    pub band_width: usize,
    /// Expansion levels
    pub band_depth: usize,
    /// Maximum substitutions relative to the seed
    pub step_max: usize,
    /// Log-space rejection threshold below the best-seen posterior
    pub prune_threshold: f64,
}

/// Shared read-only inputs of a search pass.
pub struct SearchContext<'a> {
    /// Per-sample scored genotype hypotheses, in canonical sample order
    pub likelihoods: &'a [SampleLikelihoods],
    /// Parallel to `likelihoods`: true when the sample may vary in search
    pub variant_mask: &'a [bool],
    /// Genotype enumerations by ploidy
    pub pool: &'a GenotypePool,
    /// Candidate allele arena
    pub alleles: &'a [Allele],
    /// Site samples (canonical order), for the observation priors
    pub samples: &'a [(String, Sample)],
}

impl<'a> SearchContext<'a> {
    fn score(
        &self,
        assignment: Vec<usize>,
        priors: &PriorParams,
        freq_override: Option<&[f64]>,
    ) -> Option<GenotypeCombo> {
        score_combo(
            assignment,
            self.likelihoods,
            self.pool,
            self.alleles,
            self.samples,
            priors,
            freq_override,
        )
    }

    fn assignment_of(&self, positions: &[usize]) -> Vec<usize> {
        positions
            .iter()
            .zip(self.likelihoods)
            .map(|(&pos, entry)| entry.entries[pos].genotype)
            .collect()
    }
}

/// Runs the banded search and injects every all-homozygous combo.
///
/// The result is deduplicated and sorted descending by posterior; its head
/// is the argmax assignment.
#[must_use]
pub fn banded_search_including_all_homozygous_combos(
    ctx: &SearchContext<'_>,
    params: &SearchParams,
    priors: &PriorParams,
    freq_override: Option<&[f64]>,
) -> Vec<GenotypeCombo> {
    if ctx.likelihoods.is_empty() {
        return Vec::new();
    }

    let seed_positions = vec![0usize; ctx.likelihoods.len()];
    let mut accepted: Vec<GenotypeCombo> = Vec::new();
    let mut best_posterior = f64::NEG_INFINITY;

    let mut seen: HashSet<Vec<usize>> = HashSet::new();
    seen.insert(seed_positions.clone());

    // The seed is always accepted so the search has a frontier even when
    // its posterior is poor.
    if let Some(combo) = ctx.score(ctx.assignment_of(&seed_positions), priors, freq_override) {
        best_posterior = combo.posterior_prob;
        accepted.push(combo);
    }

    let mut frontier: Vec<Vec<usize>> = vec![seed_positions];

    for _level in 0..params.band_depth {
        let mut next_frontier: Vec<Vec<usize>> = Vec::new();

        for positions in &frontier {
            for (k, entry) in ctx.likelihoods.iter().enumerate() {
                if !ctx.variant_mask[k] {
                    continue;
                }
                for step in 1..=params.band_width {
                    let new_pos = positions[k] + step;
                    if new_pos >= entry.entries.len() {
                        break;
                    }
                    let mut candidate = positions.clone();
                    candidate[k] = new_pos;
                    let substitutions = candidate.iter().filter(|&&p| p != 0).count();
                    if substitutions > params.step_max {
                        continue;
                    }
                    if !seen.insert(candidate.clone()) {
                        continue;
                    }
                    let Some(combo) =
                        ctx.score(ctx.assignment_of(&candidate), priors, freq_override)
                    else {
                        continue;
                    };
                    if combo.posterior_prob < best_posterior - params.prune_threshold {
                        continue; // rejected, not expanded
                    }
                    best_posterior = best_posterior.max(combo.posterior_prob);
                    accepted.push(combo);
                    next_frontier.push(candidate);
                }
            }
        }

        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
    }

    // Unconditional injection: the site decision integrates over these.
    for allele in 0..ctx.alleles.len() {
        let assignment: Option<Vec<usize>> = ctx
            .likelihoods
            .iter()
            .map(|entry| {
                ctx.pool
                    .get(entry.ploidy)
                    .iter()
                    .position(|g| g.is_homozygous() && g.elems[0].0 == allele)
            })
            .collect();
        if let Some(assignment) = assignment {
            if let Some(combo) = ctx.score(assignment, priors, freq_override) {
                accepted.push(combo);
            }
        }
    }

    sort_and_dedup_combos(&mut accepted);
    accepted
}

/// Banded search wrapped in an expectation-maximization loop over allele
/// frequencies.
#[must_use]
pub fn expectation_maximization_search_including_all_homozygous_combos(
    ctx: &SearchContext<'_>,
    params: &SearchParams,
    priors: &PriorParams,
    max_iterations: usize,
) -> Vec<GenotypeCombo> {
    let mut freqs: Option<Vec<f64>> = None;
    let mut previous_best: Option<Vec<usize>> = None;
    let mut combos = Vec::new();

    for _iteration in 0..max_iterations {
        combos =
            banded_search_including_all_homozygous_combos(ctx, params, priors, freqs.as_deref());
        let Some(best) = combos.first() else {
            break;
        };
        if previous_best.as_ref() == Some(&best.genotypes) {
            break; // converged: best combo unchanged
        }
        previous_best = Some(best.genotypes.clone());
        freqs = Some(estimate_allele_frequencies(best, ctx));
    }
    combos
}

/// Allele frequencies implied by a combo, smoothed so every candidate
/// allele keeps positive support for the next search pass.
#[must_use]
fn estimate_allele_frequencies(combo: &GenotypeCombo, ctx: &SearchContext<'_>) -> Vec<f64> {
    let counts = combo.allele_counts(ctx.likelihoods, ctx.pool, ctx.alleles.len());
    let total: f64 = counts.iter().map(|&c| f64::from(c)).sum();
    let k = counts.len() as f64;
    counts.iter().map(|&c| (f64::from(c) + 0.5) / (total + 0.5 * k)).collect()
}

/// Expands every single-sample substitution around a seed assignment, with
/// every sample free to vary regardless of the variance partition.
///
/// Used by the marginalizer, which needs marginal mass for all
/// (sample, genotype) pairs near the optimum.
#[must_use]
pub fn all_local_genotype_combinations(
    ctx: &SearchContext<'_>,
    seed: &[usize],
    priors: &PriorParams,
    prune_threshold: f64,
) -> Vec<GenotypeCombo> {
    let mut combos: Vec<GenotypeCombo> = Vec::new();
    if let Some(combo) = ctx.score(seed.to_vec(), priors, None) {
        combos.push(combo);
    }

    for (k, entry) in ctx.likelihoods.iter().enumerate() {
        for hypothesis in &entry.entries {
            if hypothesis.genotype == seed[k] {
                continue;
            }
            let mut assignment = seed.to_vec();
            assignment[k] = hypothesis.genotype;
            if let Some(combo) = ctx.score(assignment, priors, None) {
                combos.push(combo);
            }
        }
    }

    let best = combos.iter().map(|c| c.posterior_prob).fold(f64::NEG_INFINITY, f64::max);
    combos.retain(|c| c.posterior_prob >= best - prune_threshold);
    sort_and_dedup_combos(&mut combos);
    combos
}

/// The combo assigning every sample the head of its current likelihood
/// ordering, scored under the given priors.
#[must_use]
pub fn data_likelihood_max_genotype_combo(
    ctx: &SearchContext<'_>,
    priors: &PriorParams,
) -> Option<GenotypeCombo> {
    let assignment: Vec<usize> = ctx.likelihoods.iter().map(|entry| entry.top().genotype).collect();
    ctx.score(assignment, priors, None)
}
