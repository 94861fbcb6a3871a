//! Samples as bags of observations partitioned by allele group.
//!
//! A [`Sample`] maps each allele group key to the ordered sequence of
//! observations supporting it. Site-level helpers aggregate groups across
//! samples ([`group_alleles`]), count coverage ([`count_alleles`]), and
//! apply the cheap early-rejection check for alternate support
//! ([`sufficient_alternate_observations`]).

use ahash::AHashMap;

use crate::allele::{Allele, AlleleKey, Observation, Strand};

/// A named sample's observations at one site, partitioned by allele group.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    groups: AHashMap<AlleleKey, Vec<Observation>>,
}

impl Sample {
    /// Creates an empty sample.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one observation, appending it to its allele group.
    pub fn add_observation(&mut self, obs: Observation) {
        self.groups.entry(obs.allele.key.clone()).or_default().push(obs);
    }

    /// Total number of observations across all groups.
    #[must_use]
    pub fn observation_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Number of observations supporting the given allele group.
    #[must_use]
    pub fn count_of(&self, key: &AlleleKey) -> usize {
        self.groups.get(key).map_or(0, Vec::len)
    }

    /// Number of forward-strand observations supporting the given group.
    #[must_use]
    pub fn forward_count_of(&self, key: &AlleleKey) -> usize {
        self.groups
            .get(key)
            .map_or(0, |obs| obs.iter().filter(|o| o.strand == Strand::Forward).count())
    }

    /// True if at least one observation supports the given allele group.
    #[must_use]
    pub fn supports(&self, key: &AlleleKey) -> bool {
        self.groups.get(key).is_some_and(|obs| !obs.is_empty())
    }

    /// True if the sample has no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.values().all(Vec::is_empty)
    }

    /// Iterates over (group key, observations) pairs in unspecified order.
    ///
    /// Callers needing determinism must sort by key; see [`group_alleles`].
    pub fn groups(&self) -> impl Iterator<Item = (&AlleleKey, &Vec<Observation>)> {
        self.groups.iter()
    }

    /// Iterates over every observation in the sample in unspecified order.
    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.groups.values().flatten()
    }

    /// Returns (group key, observations) pairs sorted by the canonical key
    /// ordering; within a group, observations keep insertion order.
    #[must_use]
    pub fn sorted_groups(&self) -> Vec<(&AlleleKey, &[Observation])> {
        let mut groups: Vec<(&AlleleKey, &[Observation])> =
            self.groups.iter().map(|(k, v)| (k, v.as_slice())).collect();
        groups.sort_by(|a, b| a.0.cmp(b.0));
        groups
    }
}

/// Aggregate of one allele group across all samples at a site.
#[derive(Debug, Clone)]
pub struct AlleleGroup {
    /// Representative allele of the group
    pub allele: Allele,
    /// Total supporting observations across samples
    pub count: usize,
    /// Forward-strand subset of `count`
    pub forward: usize,
}

/// Groups all observations across samples by allele equivalence.
///
/// The result is sorted by the canonical [`AlleleKey`] ordering so that
/// downstream consumers iterate deterministically.
#[must_use]
pub fn group_alleles(samples: &[(String, Sample)]) -> Vec<AlleleGroup> {
    let mut by_key: AHashMap<AlleleKey, AlleleGroup> = AHashMap::new();
    for (_, sample) in samples {
        for (key, observations) in sample.groups() {
            let entry = by_key.entry(key.clone()).or_insert_with(|| AlleleGroup {
                allele: observations[0].allele.clone(),
                count: 0,
                forward: 0,
            });
            entry.count += observations.len();
            entry.forward +=
                observations.iter().filter(|o| o.strand == Strand::Forward).count();
        }
    }
    let mut groups: Vec<AlleleGroup> = by_key.into_values().collect();
    groups.sort_by(|a, b| a.allele.key.cmp(&b.allele.key));
    groups
}

/// Total observation count (coverage) across all samples.
#[must_use]
pub fn count_alleles(samples: &[(String, Sample)]) -> usize {
    samples.iter().map(|(_, s)| s.observation_count()).sum()
}

/// Cheap early rejection: true iff some sample carries a non-reference
/// allele group with at least `min_count` observations that represents at
/// least `min_fraction` of that sample's observations.
///
/// The check is per sample, so a cohort-wide rare alternate with solid
/// support in a single individual still passes.
#[must_use]
pub fn sufficient_alternate_observations(
    samples: &[(String, Sample)],
    min_count: usize,
    min_fraction: f64,
) -> bool {
    samples.iter().any(|(_, sample)| {
        let total = sample.observation_count();
        if total == 0 {
            return false;
        }
        sample.groups().any(|(key, observations)| {
            key.class != crate::allele::AlleleClass::Reference
                && observations.len() >= min_count
                && observations.len() as f64 / total as f64 >= min_fraction
        })
    })
}
