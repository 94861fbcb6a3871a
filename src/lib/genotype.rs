//! Genotypes as multisets of candidate alleles.
//!
//! A [`Genotype`] assigns a positive count to each of a subset of the
//! site's candidate alleles; the counts sum to the sample's ploidy.
//! Alleles are referenced by index into the site's candidate allele arena,
//! which keeps genotypes cheap to copy, hash, and compare, and makes the
//! enumeration order canonical: genotypes are produced in lexicographic
//! order of their sorted allele-index sequences.

use itertools::Itertools;

use crate::allele::Allele;
use crate::logprob::ln_multinomial_coeff;
use crate::sample::Sample;

/// An unordered multiset of candidate alleles sized to a sample's ploidy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Genotype {
    /// The sample ploidy this genotype was built for
    pub ploidy: u32,
    /// `(allele index, count)` pairs, sorted by allele index; counts are
    /// positive and sum to `ploidy`
    pub elems: Vec<(usize, u32)>,
}

impl Genotype {
    /// Builds a genotype from an ordered sequence of allele indices.
    #[must_use]
    pub fn from_indices(indices: &[usize]) -> Self {
        let mut elems: Vec<(usize, u32)> = Vec::new();
        for &idx in indices {
            match elems.last_mut() {
                Some((last, count)) if *last == idx => *count += 1,
                _ => elems.push((idx, 1)),
            }
        }
        debug_assert!(elems.windows(2).all(|w| w[0].0 < w[1].0), "indices must be sorted");
        Genotype { ploidy: indices.len() as u32, elems }
    }

    /// The homozygous genotype of `ploidy` copies of one allele.
    #[must_use]
    pub fn homozygous(allele: usize, ploidy: u32) -> Self {
        Genotype { ploidy, elems: vec![(allele, ploidy)] }
    }

    /// True iff the genotype contains a single distinct allele.
    #[must_use]
    pub fn is_homozygous(&self) -> bool {
        self.elems.len() == 1
    }

    /// Count of the given allele within the genotype (zero if absent).
    #[must_use]
    pub fn count_of(&self, allele: usize) -> u32 {
        self.elems.iter().find(|(idx, _)| *idx == allele).map_or(0, |(_, count)| *count)
    }

    /// True if the genotype contains the given allele.
    #[must_use]
    pub fn contains(&self, allele: usize) -> bool {
        self.count_of(allele) > 0
    }

    /// Log count of distinct orderings of the multiset,
    /// `ln(ploidy! / prod(count_i!))`.
    #[must_use]
    pub fn ln_permutations(&self) -> f64 {
        let counts: Vec<u64> = self.elems.iter().map(|(_, c)| u64::from(*c)).collect();
        ln_multinomial_coeff(u64::from(self.ploidy), &counts)
    }

    /// Strong support: every allele of the genotype has at least one
    /// observation in the sample.
    #[must_use]
    pub fn fully_supported_by(&self, sample: &Sample, alleles: &[Allele]) -> bool {
        self.elems.iter().all(|(idx, _)| sample.supports(&alleles[*idx].key))
    }

    /// Weak support: at least one allele of the genotype has an observation
    /// in the sample.
    #[must_use]
    pub fn partially_supported_by(&self, sample: &Sample, alleles: &[Allele]) -> bool {
        self.elems.iter().any(|(idx, _)| sample.supports(&alleles[*idx].key))
    }

    /// Human-readable form, e.g. `A/T` for a diploid heterozygote.
    #[must_use]
    pub fn name(&self, alleles: &[Allele]) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(self.ploidy as usize);
        for (idx, count) in &self.elems {
            for _ in 0..*count {
                parts.push(alleles[*idx].base());
            }
        }
        parts.join("/")
    }
}

/// Enumerates every multiset of size `ploidy` drawn with replacement from
/// `allele_count` candidate alleles, in canonical (lexicographic) order.
#[must_use]
pub fn all_possible_genotypes(ploidy: u32, allele_count: usize) -> Vec<Genotype> {
    (0..allele_count)
        .combinations_with_replacement(ploidy as usize)
        .map(|indices| Genotype::from_indices(&indices))
        .collect()
}
