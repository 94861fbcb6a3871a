//! Per-site orchestration: from pileup to verdict.
//!
//! [`evaluate_site`] runs the whole inference chain for one position:
//! candidate allele selection, genotype enumeration, per-sample data
//! likelihoods, combination search, marginal refinement, and the site
//! decision. Positions that cannot yield a call are skipped with a
//! [`SkipReason`]; skips are expected outcomes, not errors.
//!
//! The site decision integrates the posterior mass of the no-variation
//! combinations (every sample homozygous for the reference) to obtain
//! `p(hom)`, and calls the site a variant when `1 - p(hom)` reaches the
//! configured threshold. The reported best combo is the first in sort
//! order carrying a non-reference allele, falling back to the overall
//! argmax when none exists.

use log::debug;

use crate::allele::Allele;
use crate::combo::{GenotypeCombo, GenotypePool, SampleLikelihoods};
use crate::config::Config;
use crate::likelihood::{filter_genotypes, genotype_likelihoods, is_variant_candidate};
use crate::logprob::{ln_sum_exp, safe_exp, LogProb, LN_ZERO};
use crate::marginals::refine_marginals;
use crate::pileup::SitePileup;
use crate::priors::PriorParams;
use crate::sample::{
    count_alleles, group_alleles, sufficient_alternate_observations, AlleleGroup, Sample,
};
use crate::search::{
    banded_search_including_all_homozygous_combos, data_likelihood_max_genotype_combo,
    expectation_maximization_search_including_all_homozygous_combos, SearchContext, SearchParams,
};

/// Why a site was skipped without evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Reference base outside {A, C, G, T}
    NonCanonicalReference,
    /// Position outside the configured target regions
    OutsideTargets,
    /// No observations survived upstream filtering
    ZeroCoverage,
    /// Coverage below the configured minimum
    LowCoverage,
    /// No alternate allele with sufficient support
    InsufficientAlternates,
    /// Fewer than two viable genotype alleles after filtering
    NoViableAlleles,
}

impl SkipReason {
    /// Short label used in logs and counters.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            SkipReason::NonCanonicalReference => "non_canonical_reference",
            SkipReason::OutsideTargets => "outside_targets",
            SkipReason::ZeroCoverage => "zero_coverage",
            SkipReason::LowCoverage => "low_coverage",
            SkipReason::InsufficientAlternates => "insufficient_alternates",
            SkipReason::NoViableAlleles => "no_viable_alleles",
        }
    }
}

/// A ranked alternate allele of the best combo.
#[derive(Debug, Clone)]
pub struct AlternateAllele {
    /// The alternate
    pub allele: Allele,
    /// Its allele count within the best combo
    pub count: u32,
}

/// One sample's reported genotype at a called site.
#[derive(Debug, Clone)]
pub struct SampleCall {
    /// Sample name
    pub name: String,
    /// Reported genotype, e.g. `A/T`
    pub genotype: String,
    /// Log marginal posterior of the reported genotype (log-zero when
    /// marginals were not computed)
    pub log_marginal: LogProb,
    /// Observations backing the sample at this site
    pub observations: usize,
}

/// Trace row describing one observation at the site.
#[derive(Debug, Clone)]
pub struct TraceAllele {
    /// Sample name
    pub sample: String,
    /// Originating read identifier
    pub read_id: String,
    /// Observed allele
    pub allele: String,
    /// Phred base quality
    pub base_qual: u8,
    /// Phred mapping quality
    pub map_qual: u8,
}

/// Trace row describing one scored combo.
///
/// `prior` is the pure prior sum (frequency, genotype-given-frequency, and
/// observation components); it is deliberately distinct from `posterior`,
/// which additionally contains the data likelihood.
#[derive(Debug, Clone)]
pub struct TraceCombo {
    /// Per-sample genotype names, `?` for samples without data
    pub genotypes: String,
    /// Data log-likelihood of the combo
    pub data_likelihood: LogProb,
    /// Pure prior sum
    pub prior: LogProb,
    /// Genotype-given-frequency component
    pub prior_g_af: LogProb,
    /// Allele-frequency component
    pub prior_af: LogProb,
    /// Observation-prior component
    pub prior_obs: LogProb,
    /// Joint posterior log-score
    pub posterior: LogProb,
    /// Posterior normalized over the combo list, linear space
    pub normalized_posterior: f64,
}

/// Optional per-site trace data for the trace log.
#[derive(Debug, Clone, Default)]
pub struct SiteTrace {
    /// One row per observation
    pub alleles: Vec<TraceAllele>,
    /// Canonical sample list with data-presence flags
    pub samples_with_data: Vec<(String, bool)>,
    /// Log normalizer over the combo list
    pub posterior_normalizer: LogProb,
    /// One row per scored combo, in sort order
    pub combos: Vec<TraceCombo>,
}

/// The structured result of evaluating one site.
#[derive(Debug, Clone)]
pub struct SiteEvaluation {
    /// Reference sequence name
    pub chrom: String,
    /// 1-based position
    pub pos: u64,
    /// Reference base
    pub ref_base: String,
    /// Total observations at the site
    pub coverage: usize,
    /// Posterior probability that the site carries no variation relative
    /// to the reference
    pub p_hom: f64,
    /// `1 - p_hom`
    pub p_var: f64,
    /// True when `1 - p_hom` reached the call threshold
    pub called: bool,
    /// True when the overall argmax combo carries a non-reference allele
    pub best_overall_combo_is_het: bool,
    /// Ranked alternates of the best combo (may be empty when even the
    /// best polymorphic interpretation contains no alternate)
    pub alternates: Vec<AlternateAllele>,
    /// Per-sample reported genotypes
    pub sample_calls: Vec<SampleCall>,
    /// Allele groups across samples, canonical order
    pub allele_groups: Vec<AlleleGroup>,
    /// The candidate genotype alleles used at the site
    pub genotype_alleles: Vec<Allele>,
    /// `(ploidy, genotype count)` pairs of the enumerations used
    pub genotypes_by_ploidy: Vec<(u32, usize)>,
    /// Trace data when requested
    pub trace: Option<SiteTrace>,
}

/// Outcome of the per-site driver.
#[derive(Debug)]
pub enum SiteStatus {
    /// Skipped before inference
    Skip(SkipReason),
    /// Fully evaluated
    Evaluated(Box<SiteEvaluation>),
}

/// Selects the candidate genotype alleles: the reference plus every
/// alternate group that reaches the support thresholds in at least one
/// sample. The result is in canonical key order (reference first).
#[must_use]
pub fn viable_genotype_alleles(
    samples: &[(String, Sample)],
    groups: &[AlleleGroup],
    ref_base: &str,
    min_alt_count: usize,
    min_alt_fraction: f64,
) -> Vec<Allele> {
    let mut alleles = vec![Allele::reference(ref_base).to_genotype_allele()];
    for group in groups {
        if group.allele.is_reference() {
            continue;
        }
        let supported = samples.iter().any(|(_, sample)| {
            let count = sample.count_of(&group.allele.key);
            let total = sample.observation_count();
            count >= min_alt_count
                && total > 0
                && count as f64 / total as f64 >= min_alt_fraction
        });
        if supported {
            alleles.push(group.allele.to_genotype_allele());
        }
    }
    alleles.sort_by(|a, b| a.key.cmp(&b.key));
    alleles
}

/// Runs the full inference chain for one site.
#[must_use]
pub fn evaluate_site(pileup: &SitePileup, config: &Config, want_trace: bool) -> SiteStatus {
    if !matches!(pileup.ref_base.as_str(), "A" | "C" | "G" | "T") {
        return SiteStatus::Skip(SkipReason::NonCanonicalReference);
    }
    if !pileup.in_target {
        return SiteStatus::Skip(SkipReason::OutsideTargets);
    }

    // The synthetic reference pseudo-sample contributes one high-quality
    // reference observation under the sequence's own name.
    let mut samples: Vec<(String, Sample)> = pileup.samples.clone();
    let mut ploidies: Vec<u32> = pileup.ploidies.clone();
    if config.use_ref_allele {
        let mut ref_sample = Sample::new();
        ref_sample.add_observation(crate::allele::Observation {
            allele: Allele::reference(&pileup.ref_base),
            read_id: "reference".to_string(),
            base_qual: 60,
            map_qual: 60,
            strand: crate::allele::Strand::Forward,
        });
        samples.push((pileup.chrom.clone(), ref_sample));
        ploidies.push(config.default_ploidy);
    }

    let coverage = count_alleles(&samples);
    if coverage == 0 {
        return SiteStatus::Skip(SkipReason::ZeroCoverage);
    }
    if coverage < config.min_coverage {
        debug!(
            "{}:{} coverage {} below minimum {}",
            pileup.chrom, pileup.pos, coverage, config.min_coverage
        );
        return SiteStatus::Skip(SkipReason::LowCoverage);
    }

    if !sufficient_alternate_observations(&samples, config.min_alt_count, config.min_alt_fraction)
    {
        return SiteStatus::Skip(SkipReason::InsufficientAlternates);
    }

    let allele_groups = group_alleles(&samples);
    let alleles = viable_genotype_alleles(
        &samples,
        &allele_groups,
        &pileup.ref_base,
        config.min_alt_count,
        config.min_alt_fraction,
    );
    if alleles.len() <= 1 {
        return SiteStatus::Skip(SkipReason::NoViableAlleles);
    }

    // Genotype enumerations, cached per ploidy for the site
    let mut pool = GenotypePool::new();
    for (idx, (_, sample)) in samples.iter().enumerate() {
        if !sample.is_empty() {
            pool.ensure(ploidies[idx], alleles.len());
        }
    }

    // Per-sample data likelihoods and the variance partition
    let filter = config.genotype_filter();
    let mut likelihoods: Vec<SampleLikelihoods> = Vec::new();
    let mut variant_mask: Vec<bool> = Vec::new();
    for (idx, (_, sample)) in samples.iter().enumerate() {
        if sample.is_empty() {
            continue;
        }
        let ploidy = ploidies[idx];
        let genotypes = pool.get(ploidy);
        let candidates = filter_genotypes(sample, genotypes, &alleles, filter);
        if candidates.is_empty() {
            continue;
        }
        let entries = genotype_likelihoods(
            sample,
            &candidates,
            genotypes,
            &alleles,
            config.read_dependence_factor,
            config.use_mapping_quality,
        );
        variant_mask.push(is_variant_candidate(&entries, config.genotype_variant_threshold));
        likelihoods.push(SampleLikelihoods { sample: idx, ploidy, entries });
    }
    if likelihoods.is_empty() {
        return SiteStatus::Skip(SkipReason::ZeroCoverage);
    }

    let priors = PriorParams::from_config(config);
    let search_params = SearchParams {
        band_width: config.band_width,
        band_depth: config.band_depth,
        step_max: config.genotype_combo_step_max,
        prune_threshold: config.prune_threshold,
    };

    let combos = {
        let ctx = SearchContext {
            likelihoods: &likelihoods,
            variant_mask: &variant_mask,
            pool: &pool,
            alleles: &alleles,
            samples: &samples,
        };
        if config.expectation_maximization {
            expectation_maximization_search_including_all_homozygous_combos(
                &ctx,
                &search_params,
                &priors,
                config.expectation_maximization_max_iterations,
            )
        } else {
            banded_search_including_all_homozygous_combos(&ctx, &search_params, &priors, None)
        }
    };
    if combos.is_empty() {
        return SiteStatus::Skip(SkipReason::NoViableAlleles);
    }

    // Site decision: pHom integrates the no-variation mass (combos
    // monomorphic for the reference allele); the best combo is the first
    // in sort order carrying any non-reference allele. The injected
    // all-homozygous combos keep the normalizer honest even when the
    // search never wandered near them.
    let posteriors: Vec<f64> = combos.iter().map(|c| c.posterior_prob).collect();
    let normalizer = ln_sum_exp(&posteriors);
    let reference_allele =
        alleles.iter().position(Allele::is_reference).unwrap_or(0);
    let mut p_hom = 0.0;
    let mut best_combo: Option<&GenotypeCombo> = None;
    let mut best_overall_combo_is_het = false;
    for (idx, combo) in combos.iter().enumerate() {
        if combo.is_variant(&likelihoods, &pool, alleles.len(), reference_allele) {
            if best_combo.is_none() {
                best_combo = Some(combo);
                if idx == 0 {
                    best_overall_combo_is_het = true;
                }
            }
        } else {
            p_hom += safe_exp(combo.posterior_prob - normalizer);
        }
    }
    let best_combo = best_combo.unwrap_or(&combos[0]);
    let p_hom = p_hom.clamp(0.0, 1.0);
    let p_var = 1.0 - p_hom;
    let called = p_var >= config.pvl;

    debug!(
        "{}:{} pVar = {p_var:.6} pHom = {p_hom:.6} threshold {}",
        pileup.chrom, pileup.pos, config.pvl
    );

    // Alternate ranking from the best (polymorphic) combo
    let counts = best_combo.allele_counts(&likelihoods, &pool, alleles.len());
    let mut alternates: Vec<AlternateAllele> = alleles
        .iter()
        .zip(&counts)
        .filter(|(allele, &count)| !allele.is_reference() && count > 0)
        .map(|(allele, &count)| AlternateAllele { allele: allele.clone(), count })
        .collect();
    alternates.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.allele.length.cmp(&b.allele.length))
            .then_with(|| a.allele.key.seq.cmp(&b.allele.key.seq))
    });

    // Marginal refinement for called sites; the reported per-sample
    // genotypes come from the marginal-sorted argmax when enabled
    let mut reported_assignment = best_combo.genotypes.clone();
    let best_assignment = combos[0].genotypes.clone();
    if called && config.calculate_marginals {
        let outcome = refine_marginals(
            &mut likelihoods,
            &pool,
            &alleles,
            &samples,
            &best_assignment,
            &priors.marginal_pass(),
            config.prune_threshold,
            config.genotyping_max_iterations,
        );
        debug!(
            "{}:{} marginals: {} iterations, converged = {}",
            pileup.chrom, pileup.pos, outcome.iterations, outcome.converged
        );
        let ctx = SearchContext {
            likelihoods: &likelihoods,
            variant_mask: &variant_mask,
            pool: &pool,
            alleles: &alleles,
            samples: &samples,
        };
        if let Some(by_marginals) = data_likelihood_max_genotype_combo(&ctx, &priors) {
            reported_assignment = by_marginals.genotypes;
        }
    }

    let sample_calls: Vec<SampleCall> = likelihoods
        .iter()
        .zip(&reported_assignment)
        .map(|(entry, &gt_idx)| {
            let genotype = &pool.get(entry.ploidy)[gt_idx];
            let marginal = entry
                .position_of(gt_idx)
                .map_or(LN_ZERO, |pos| entry.entries[pos].marginal);
            SampleCall {
                name: samples[entry.sample].0.clone(),
                genotype: genotype.name(&alleles),
                log_marginal: marginal,
                observations: samples[entry.sample].1.observation_count(),
            }
        })
        .collect();

    let trace = want_trace.then(|| {
        build_trace(&samples, &likelihoods, &combos, &pool, &alleles, normalizer)
    });

    let genotypes_by_ploidy: Vec<(u32, usize)> = {
        let mut summary: Vec<(u32, usize)> =
            pool.iter().map(|(&ploidy, genotypes)| (ploidy, genotypes.len())).collect();
        summary.sort_unstable();
        summary
    };

    SiteStatus::Evaluated(Box::new(SiteEvaluation {
        chrom: pileup.chrom.clone(),
        pos: pileup.pos,
        ref_base: pileup.ref_base.clone(),
        coverage,
        p_hom,
        p_var,
        called,
        best_overall_combo_is_het,
        alternates,
        sample_calls,
        allele_groups,
        genotype_alleles: alleles,
        genotypes_by_ploidy,
        trace,
    }))
}

fn build_trace(
    samples: &[(String, Sample)],
    likelihoods: &[SampleLikelihoods],
    combos: &[GenotypeCombo],
    pool: &GenotypePool,
    alleles: &[Allele],
    normalizer: LogProb,
) -> SiteTrace {
    let mut trace = SiteTrace {
        posterior_normalizer: normalizer,
        ..SiteTrace::default()
    };

    for (name, sample) in samples {
        for (_, group) in sample.sorted_groups() {
            for obs in group {
                trace.alleles.push(TraceAllele {
                    sample: name.clone(),
                    read_id: obs.read_id.clone(),
                    allele: obs.allele.to_string(),
                    base_qual: obs.base_qual,
                    map_qual: obs.map_qual,
                });
            }
        }
    }

    let with_data: Vec<usize> = likelihoods.iter().map(|l| l.sample).collect();
    trace.samples_with_data = samples
        .iter()
        .enumerate()
        .map(|(idx, (name, _))| (name.clone(), with_data.contains(&idx)))
        .collect();

    for combo in combos {
        let mut names: Vec<String> = Vec::with_capacity(samples.len());
        for (idx, _) in samples.iter().enumerate() {
            let assigned =
                likelihoods.iter().zip(&combo.genotypes).find(|(entry, _)| entry.sample == idx);
            match assigned {
                Some((entry, &gt_idx)) => {
                    names.push(pool.get(entry.ploidy)[gt_idx].name(alleles));
                }
                None => names.push("?".to_string()),
            }
        }

        let prior = combo.prior_prob_af + combo.prior_prob_g_af + combo.prior_prob_observations;
        trace.combos.push(TraceCombo {
            genotypes: names.join("|"),
            data_likelihood: combo.prob_obs_given_genotypes,
            prior,
            prior_g_af: combo.prior_prob_g_af,
            prior_af: combo.prior_prob_af,
            prior_obs: combo.prior_prob_observations,
            posterior: combo.posterior_prob,
            normalized_posterior: safe_exp(combo.posterior_prob - normalizer),
        });
    }
    trace
}
