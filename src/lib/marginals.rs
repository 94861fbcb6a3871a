//! Per-sample genotype marginals and their iterated refinement.
//!
//! Given a list of scored combos, the marginal of a (sample, genotype)
//! pair is the log-sum of the posteriors of every combo assigning that
//! genotype to that sample, normalized by the log-sum over all combos.
//!
//! Refinement alternates between expanding all local single-sample
//! substitutions around the current best assignment (every sample free,
//! with pooled and HWE priors forced on) and re-sorting each sample's
//! hypotheses by marginal. The loop exits when a re-sort changes nothing,
//! when the largest marginal movement drops below [`MARGINAL_EPSILON`], or
//! at the iteration cap.

use crate::allele::Allele;
use crate::combo::{GenotypeCombo, GenotypePool, SampleLikelihoods};
use crate::logprob::{ln_sum_exp, safe_exp, LN_ZERO};
use crate::priors::PriorParams;
use crate::sample::Sample;
use crate::search::{all_local_genotype_combinations, SearchContext};

/// Early-exit threshold on the largest linear-space marginal movement.
pub const MARGINAL_EPSILON: f64 = 1e-9;

/// Outcome of marginal refinement.
#[derive(Debug, Clone, Copy)]
pub struct MarginalOutcome {
    /// Iterations actually run
    pub iterations: usize,
    /// True when the loop exited on a stable sort order or epsilon, false
    /// when it hit the iteration cap
    pub converged: bool,
}

/// Computes the marginal for every (sample, genotype) pair from the given
/// combos and stores it on the likelihood entries.
///
/// Returns the largest absolute movement of any marginal, measured in
/// linear probability space so that it is bounded and comparable across
/// iterations. Pairs covered by no combo get the log-zero sentinel.
pub fn marginal_genotype_likelihoods(
    combos: &[GenotypeCombo],
    likelihoods: &mut [SampleLikelihoods],
) -> f64 {
    let posteriors: Vec<f64> = combos.iter().map(|c| c.posterior_prob).collect();
    let ln_z = ln_sum_exp(&posteriors);

    let mut delta: f64 = 0.0;
    for (k, entry) in likelihoods.iter_mut().enumerate() {
        for hypothesis in &mut entry.entries {
            let supporting: Vec<f64> = combos
                .iter()
                .filter(|c| c.genotypes[k] == hypothesis.genotype)
                .map(|c| c.posterior_prob)
                .collect();
            let total = ln_sum_exp(&supporting);
            let new_marginal = if total == LN_ZERO { LN_ZERO } else { total - ln_z };
            delta = delta.max((safe_exp(new_marginal) - safe_exp(hypothesis.marginal)).abs());
            hypothesis.marginal = new_marginal;
        }
    }
    delta
}

/// Re-sorts every sample's hypotheses descending by marginal, with the
/// canonical genotype tie-break.
///
/// Returns true when any sample's ordering changed.
pub fn sort_sample_likelihoods_by_marginals(likelihoods: &mut [SampleLikelihoods]) -> bool {
    let mut changed = false;
    for entry in likelihoods.iter_mut() {
        let before: Vec<usize> = entry.entries.iter().map(|e| e.genotype).collect();
        entry.entries.sort_by(|a, b| {
            b.marginal
                .partial_cmp(&a.marginal)
                .expect("marginals must not be NaN")
                .then_with(|| a.genotype.cmp(&b.genotype))
        });
        if entry.entries.iter().map(|e| e.genotype).ne(before.iter().copied()) {
            changed = true;
        }
    }
    changed
}

/// Runs the marginal refinement loop.
///
/// `best_assignment` seeds the first expansion; later iterations expand
/// around the current marginal-sorted heads. `priors` must already be the
/// marginal-pass override (pooled and HWE forced on).
#[allow(clippy::too_many_arguments)]
pub fn refine_marginals(
    likelihoods: &mut [SampleLikelihoods],
    pool: &GenotypePool,
    alleles: &[Allele],
    samples: &[(String, Sample)],
    best_assignment: &[usize],
    priors: &PriorParams,
    prune_threshold: f64,
    max_iterations: usize,
) -> MarginalOutcome {
    let variant_mask = vec![true; likelihoods.len()];

    for iteration in 0..max_iterations {
        let seed: Vec<usize> = if iteration == 0 {
            best_assignment.to_vec()
        } else {
            likelihoods.iter().map(|entry| entry.top().genotype).collect()
        };

        let combos = {
            let ctx = SearchContext {
                likelihoods: &*likelihoods,
                variant_mask: &variant_mask,
                pool,
                alleles,
                samples,
            };
            all_local_genotype_combinations(&ctx, &seed, priors, prune_threshold)
        };

        let delta = marginal_genotype_likelihoods(&combos, likelihoods);

        if !sort_sample_likelihoods_by_marginals(likelihoods) {
            return MarginalOutcome { iterations: iteration + 1, converged: true };
        }
        if delta < MARGINAL_EPSILON {
            return MarginalOutcome { iterations: iteration + 1, converged: true };
        }
    }
    MarginalOutcome { iterations: max_iterations, converged: false }
}
